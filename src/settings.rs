use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

/// API credentials kept on disk between runs.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Credentials {
    pub perplexity_api_key: Option<String>,
    pub github_token: Option<String>,
}

pub fn load_credentials(path: &Path) -> Credentials {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring unreadable credential file {:?}: {}", path, e);
            Credentials::default()
        }),
        Err(_) => Credentials::default(),
    }
}

pub fn save_credentials(path: &Path, credentials: &Credentials) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("Failed to create credential directory {:?}: {}", parent, e);
            return;
        }
    }

    match serde_json::to_string_pretty(credentials) {
        Ok(json) => {
            if let Err(e) = std::fs::write(path, json) {
                warn!("Failed to save credentials to {:?}: {}", path, e);
            }
        }
        Err(e) => {
            warn!("Failed to serialize credentials: {}", e);
        }
    }
}
