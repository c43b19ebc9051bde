//! Logging configuration
//!
//! Per-component log levels and output destinations.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const VALID_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Global log level (trace, debug, info, warn, error)
    pub global_level: String,

    /// Enable console output
    pub console_output: bool,

    /// Directory for JSON log files (None = no file logging)
    pub log_directory: Option<PathBuf>,

    /// Include file location in logs
    pub include_file_location: bool,

    /// Level for spectral estimation, optical flow and the batch pipeline
    pub engine_level: String,

    /// Level for the alignment cache
    pub cache_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            global_level: "info".to_string(),
            console_output: true,
            log_directory: None,
            include_file_location: false,
            engine_level: "info".to_string(),
            cache_level: "info".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Verbose console logging plus JSON files under `logs/`
    pub fn development() -> Self {
        Self {
            global_level: "debug".to_string(),
            console_output: true,
            log_directory: Some(PathBuf::from("logs")),
            include_file_location: true,
            engine_level: "trace".to_string(),
            cache_level: "debug".to_string(),
        }
    }

    /// Warnings only, files only
    pub fn production() -> Self {
        Self {
            global_level: "warn".to_string(),
            console_output: false,
            log_directory: Some(PathBuf::from("/var/log/spectral-align")),
            include_file_location: false,
            engine_level: "info".to_string(),
            cache_level: "info".to_string(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, level) in [
            ("global_level", &self.global_level),
            ("engine_level", &self.engine_level),
            ("cache_level", &self.cache_level),
        ] {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(format!(
                    "Invalid {}: {}. Must be one of: {:?}",
                    name, level, VALID_LEVELS
                ));
            }
        }

        if let Some(ref log_dir) = self.log_directory {
            if let Some(parent) = log_dir.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(format!("Log directory parent does not exist: {:?}", parent));
                }
            }
        }

        Ok(())
    }

    /// Effective level for a component
    pub fn get_component_level(&self, component: &str) -> &str {
        match component {
            "algorithms" | "pipeline" | "engine" => &self.engine_level,
            "cache" => &self.cache_level,
            _ => &self.global_level,
        }
    }

    /// `EnvFilter` directives for the crate and its components.
    pub fn filter_directives(&self, crate_name: &str) -> String {
        let mut directives = vec![format!("{}={}", crate_name, self.global_level)];
        for component in ["algorithms", "pipeline", "cache"] {
            directives.push(format!(
                "{}::{}={}",
                crate_name,
                component,
                self.get_component_level(component)
            ));
        }
        directives.join(",")
    }
}
