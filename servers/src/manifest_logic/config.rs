use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[command(about = "Dropzone manifest aggregation server", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[arg(long, env = "MANIFEST_PORT", help = "Port to listen on for client connections.")]
    pub port: Option<u16>,

    #[arg(long, env = "MANIFEST_CONFIG_PATH", help = "Path to the JSON server configuration file.")]
    pub config_path: Option<PathBuf>,

    #[arg(long, env = "MANIFEST_SETTINGS_PATH", help = "Path to the JSON dropzone settings file.")]
    pub settings_path: Option<PathBuf>,

    #[arg(long, env = "MANIFEST_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[arg(long, env = "MANIFEST_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[arg(long, env = "MANIFEST_LOG_KEEP", help = "Number of previous log files to keep.")]
    pub log_keep: Option<usize>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            port: other.port.or(self.port),
            config_path: other.config_path.or(self.config_path),
            settings_path: other.settings_path.or(self.settings_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_keep: other.log_keep.or(self.log_keep),
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(8080)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }
}

pub fn load_config() -> Config {
    // 1. Load defaults
    let default_config = Config {
        port: Some(8080),
        log_dir: Some(PathBuf::from("./logs")),
        log_level: Some("info".to_string()),
        log_keep: Some(1),
        ..Default::default()
    };

    // 2. Load from config file (server_manifest.conf) if present.
    //    The CLI may point at a different file, so parse it first.
    let cli_args = Config::parse();

    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_manifest.conf"));

    let mut current_config = default_config;

    // Logging is not set up yet, so problems go to stderr.
    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => eprintln!("Failed to parse config file {}: {}", config_file_path.display(), e),
            },
            Err(e) => eprintln!("Failed to read config file {}: {}", config_file_path.display(), e),
        }
    }

    // 3. Override with environment variables and CLI arguments
    current_config = current_config.merge(cli_args);

    // 4. Fall back to the per-user settings file
    if current_config.settings_path.is_none() {
        if let Some(config_dir) = dirs::config_dir() {
            let candidate = config_dir.join("manifest-server").join("settings.json");
            if candidate.exists() {
                current_config.settings_path = Some(candidate);
            }
        }
    }

    current_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_sources_win_only_where_set() {
        let file = Config {
            port: Some(9000),
            log_level: Some("debug".to_string()),
            ..Default::default()
        };
        let cli = Config {
            port: Some(9100),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.port(), 9100);
        assert_eq!(merged.log_level(), "debug");
        assert_eq!(merged.log_dir(), PathBuf::from("./logs"));
    }
}
