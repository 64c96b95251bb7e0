pub mod admin;
pub mod attendance;
pub mod auth;
pub mod classes;
pub mod core;
pub mod grades;
pub mod profile;
pub mod results;
pub mod students;
pub mod subjects;
pub mod teachers;
