use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use registrard::config::AppConfig;
use registrard::ipc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    // stdout carries the protocol; logs go to stderr.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();
}

fn main() {
    let (config, config_error) = match AppConfig::load() {
        Ok(c) => (c, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    init_logging(&config.log.level);
    if let Some(e) = config_error {
        warn!(error = %e, "failed to load configuration; using defaults");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "registrard starting");

    let mut state = ipc::AppState::new(config);
    if let Some(path) = state.config.workspace.path.clone() {
        if let Err(e) = ipc::select_workspace(&mut state, PathBuf::from(&path)) {
            warn!(path = %path, code = e.code, message = %e.message, "configured workspace not opened");
        }
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    info!("stdin closed; exiting");
}
