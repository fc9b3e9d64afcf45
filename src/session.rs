use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Session file structure
///
/// Format:
/// ```toml
/// server_url = "http://localhost:3001"
/// token = "pt_..."
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionFile {
    pub server_url: Option<String>,
    pub token: Option<String>,
}

/// Where and as whom the client talks to the API
///
/// Passed explicitly to every client call; there is no process-wide session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub server_url: String,
    pub token: String,
}

/// Get the default session file path: ~/.config/process_tracker/session.toml
pub fn get_session_path() -> Result<PathBuf, String> {
    let home = std::env::var("HOME").map_err(|_| "HOME environment variable not set".to_string())?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("process_tracker")
        .join("session.toml"))
}

/// Load a session file; returns None if it doesn't exist
pub fn load_session_file(
    path: &Path,
) -> Result<Option<SessionFile>, Box<dyn std::error::Error + Send + Sync>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)?;
    let file: SessionFile = toml::from_str(&content)
        .map_err(|e| format!("Failed to parse session file {}: {}", path.display(), e))?;

    Ok(Some(file))
}

impl Session {
    /// Command-line values win over the session file
    pub fn resolve(
        server_flag: Option<String>,
        token_flag: Option<String>,
        file: Option<SessionFile>,
        file_path: &Path,
    ) -> Result<Self, String> {
        let file = file.unwrap_or_default();

        let server_url = server_flag.or(file.server_url).ok_or_else(|| {
            format!(
                "No server URL given. Pass --server or set server_url in {}",
                file_path.display()
            )
        })?;
        let token = token_flag.or(file.token).ok_or_else(|| {
            format!(
                "No API token given. Pass --token or set token in {}",
                file_path.display()
            )
        })?;

        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Resolve against the default session file
    pub fn from_flags(
        server_flag: Option<String>,
        token_flag: Option<String>,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let path = get_session_path()?;
        let file = load_session_file(&path)?;
        Ok(Self::resolve(server_flag, token_flag, file, &path)?)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.server_url, path)
    }
}
