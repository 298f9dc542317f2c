use std::path::{Path, PathBuf};

use orchestrator::EngineConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

pub const CONFIG_DIR: &str = ".data-pipes";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_PORT: u16 = 3001;

/// Settings stored in `.data-pipes/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// SQLite database, relative paths resolve against the project directory
    pub database: PathBuf,
    /// Directory for run log files
    pub log_dir: PathBuf,
    /// Write trace level lines to run logs
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            database: Path::new(CONFIG_DIR).join("pipes.db"),
            log_dir: Path::new(CONFIG_DIR).join("logs"),
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn config_path(project_path: &Path) -> PathBuf {
        project_path.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Read config from the project directory, falling back to defaults
    pub async fn read(project_path: &Path) -> Self {
        let config_path = Self::config_path(project_path);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Write config to the project directory
    pub async fn write(&self, project_path: &Path) -> std::io::Result<()> {
        let config_dir = project_path.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(&config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved successfully");

        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_url(&self, project_path: &Path) -> String {
        format!("sqlite:{}", project_path.join(&self.database).display())
    }

    /// Engine settings; `DATA_PIPES_DEBUG` can turn debug on but never off.
    pub fn engine_config(&self, project_path: &Path) -> EngineConfig {
        let defaults = EngineConfig::default();
        let debug = self.debug || defaults.debug;
        defaults
            .with_log_dir(project_path.join(&self.log_dir))
            .with_debug(debug)
    }
}
