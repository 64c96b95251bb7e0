//! School records daemon: credential verification, a role-scoped record
//! repository over SQLite, and the JSON-lines IPC surface in front of it.

pub mod auth;
pub mod backup;
pub mod config;
pub mod db;
pub mod error;
pub mod grade;
pub mod ipc;
pub mod repo;
