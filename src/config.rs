use clap::ValueEnum;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigType {
    /// HTTP API server configuration
    Server,
}

fn default_api_port() -> u16 {
    3001
}

fn default_cors_allow_any() -> bool {
    true
}

/// Server configuration file structure
///
/// Format:
/// ```toml
/// config_type = "server"
/// database_path = "data/process_tracker.sqlite"
/// api_port = 3001
/// cors_allow_any = true
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Configuration type (must be "server")
    pub config_type: ConfigType,
    /// SQLite database file, created on first start (required)
    pub database_path: PathBuf,
    /// API server port (default: 3001)
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Allow cross-origin requests from any origin (default: true)
    #[serde(default = "default_cors_allow_any")]
    pub cors_allow_any: bool,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {}", path.display(), e))?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| format!("Failed to parse config file {}: {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.config_type != ConfigType::Server {
            return Err(format!(
                "config_type must be 'server', found {:?}",
                self.config_type
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err("database_path must not be empty".to_string());
        }
        Ok(())
    }
}
