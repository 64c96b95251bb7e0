use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

use crate::auth::Session;
use crate::config::AppConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Daemon state carried between requests. No database connection is held
/// here; each request opens its own.
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub config: AppConfig,
    /// Open sessions keyed by opaque token.
    pub sessions: HashMap<String, Session>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        AppState {
            workspace: None,
            config,
            sessions: HashMap::new(),
        }
    }
}
