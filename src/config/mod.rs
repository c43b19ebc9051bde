use crate::algorithms::{Normalization, DEFAULT_HIGH_SIGMA, DEFAULT_LOW_SIGMA};
use crate::data::DEFAULT_SUFFIXES;
use crate::logging::LoggingConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub spectrum: SpectrumConfig,
    pub registration: RegistrationConfig,
    pub flow: FlowConfig,
    pub image: ImageConfig,
    pub batch: BatchConfig,
    pub logging: LoggingConfig,
}

/// Band-pass applied before the Fourier transform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumConfig {
    pub low_sigma: f64,
    pub high_sigma: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Log-polar radius is `height / radius_divisor`.
    pub radius_divisor: usize,
    pub upsample_factor: usize,
    pub normalization: Normalization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub window_radius: usize,
    pub num_warp: usize,
    pub pyramid_levels: usize,
    pub min_level_size: usize,
    /// Flow standard deviation (px) above which a warning is emitted.
    pub max_spread: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Longer side of the working copy used for registration. `None`
    /// registers at full resolution.
    pub max_dimension: Option<u32>,
    pub suffixes: Vec<String>,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker threads; 0 uses one per core.
    pub threads: usize,
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            low_sigma: DEFAULT_LOW_SIGMA,
            high_sigma: DEFAULT_HIGH_SIGMA,
        }
    }
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            radius_divisor: 8,
            upsample_factor: 10,
            normalization: Normalization::None,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window_radius: 7,
            num_warp: 10,
            pyramid_levels: 4,
            min_level_size: 16,
            max_spread: 2.0,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_dimension: Some(1024),
            suffixes: DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            output_dir: "preprocessed".to_string(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;

        if content.trim_start().starts_with('{') {
            serde_json::from_str(&content).with_context(|| format!("invalid JSON config {}", path.display()))
        } else {
            toml::from_str(&content).with_context(|| format!("invalid TOML config {}", path.display()))
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, format: ConfigFormat) -> anyhow::Result<()> {
        let content = match format {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        fs::write(path.as_ref(), content)
            .with_context(|| format!("failed to write config {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(self.spectrum.low_sigma > 0.0 && self.spectrum.low_sigma < self.spectrum.high_sigma) {
            errors.push("spectrum sigmas must satisfy 0 < low_sigma < high_sigma".to_string());
        }

        if self.registration.radius_divisor == 0 {
            errors.push("registration radius_divisor must be positive".to_string());
        }

        if self.registration.upsample_factor == 0 {
            errors.push("registration upsample_factor must be positive".to_string());
        }

        if self.flow.window_radius == 0 {
            errors.push("flow window_radius must be positive".to_string());
        }

        if self.flow.num_warp == 0 || self.flow.pyramid_levels == 0 {
            errors.push("flow num_warp and pyramid_levels must be positive".to_string());
        }

        if self.flow.max_spread <= 0.0 {
            errors.push("flow max_spread must be positive".to_string());
        }

        if self.image.max_dimension == Some(0) {
            errors.push("image max_dimension must be positive when set".to_string());
        }

        if self.image.suffixes.is_empty() {
            errors.push("image suffixes must not be empty".to_string());
        }

        if self.image.output_dir.trim().is_empty() {
            errors.push("image output_dir must not be empty".to_string());
        }

        if let Err(logging_error) = self.logging.validate() {
            errors.push(logging_error);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Clone)]
pub enum ConfigFormat {
    Json,
    Toml,
}

pub fn load_config_or_default(config_path: Option<&str>) -> Config {
    match config_path {
        Some(path) => match Config::load_from_file(path) {
            Ok(config) => {
                if let Err(errors) = config.validate() {
                    eprintln!("Configuration validation errors:");
                    for error in errors {
                        eprintln!("  - {}", error);
                    }
                    eprintln!("Using default configuration instead.");
                    Config::default()
                } else {
                    config
                }
            }
            Err(e) => {
                eprintln!("Failed to load config from '{}': {:#}", path, e);
                eprintln!("Using default configuration.");
                Config::default()
            }
        },
        None => Config::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [registration]
            upsample_factor = 20

            [image]
            max_dimension = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.registration.upsample_factor, 20);
        assert_eq!(config.registration.radius_divisor, 8);
        assert_eq!(config.image.max_dimension, Some(512));
        assert_eq!(config.flow.window_radius, 7);
    }

    #[test]
    fn test_validation_collects_errors() {
        let mut config = Config::default();
        config.spectrum.low_sigma = 12.0;
        config.registration.upsample_factor = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_round_trip_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.batch.threads = 3;
        config.registration.normalization = Normalization::Phase;

        for (name, format) in [("c.toml", ConfigFormat::Toml), ("c.json", ConfigFormat::Json)] {
            let path = dir.path().join(name);
            config.save_to_file(&path, format).unwrap();
            let loaded = Config::load_from_file(&path).unwrap();
            assert_eq!(loaded.batch.threads, 3);
            assert_eq!(loaded.registration.normalization, Normalization::Phase);
        }
    }
}
