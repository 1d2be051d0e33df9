use anyhow::Result;
use figment::{providers::{Env, Format, Serialized, Toml}, Figment};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct Config {
    pub server: ServerConfig,
    pub model: ModelConfig,
    #[validate(nested)]
    pub bounds: InputBounds,
    #[validate(nested)]
    pub training: TrainingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub body_limit_bytes: usize,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(format!("{}:{}", self.host, self.port).parse()?)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 10,
            body_limit_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Where `train` writes the artifact and the server reads it from
    pub artifact_path: PathBuf,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("solar_model.bin"),
        }
    }
}

/// Practical input bounds enforced by the range gate of `/predict`.
///
/// Both ranges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_bounds"))]
pub struct InputBounds {
    pub temperature_min: f64,
    pub temperature_max: f64,
    pub irradiation_min: f64,
    pub irradiation_max: f64,
}

impl Default for InputBounds {
    fn default() -> Self {
        Self {
            temperature_min: -10.0,
            temperature_max: 60.0,
            irradiation_min: 0.0,
            irradiation_max: 1.5,
        }
    }
}

fn validate_bounds(bounds: &InputBounds) -> Result<(), ValidationError> {
    if bounds.temperature_min > bounds.temperature_max {
        return Err(ValidationError::new("temperature_min_exceeds_max"));
    }
    if bounds.irradiation_min > bounds.irradiation_max {
        return Err(ValidationError::new("irradiation_min_exceeds_max"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TrainingSettings {
    pub dataset_path: PathBuf,
    /// Fraction of rows held out for evaluation
    #[validate(range(exclusive_min = 0.0, exclusive_max = 1.0))]
    pub test_ratio: f64,
    pub seed: u64,
    #[validate(range(min = 1))]
    pub n_trees: usize,
    pub max_depth: Option<u16>,
    #[validate(range(min = 2))]
    pub min_samples_split: usize,
    #[validate(range(min = 1))]
    pub min_samples_leaf: usize,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("final_solar_training_dataset.csv"),
            test_ratio: 0.2,
            seed: 42,
            n_trees: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file("config/default.toml"))
            .merge(Env::prefixed("SOLAR__").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let cfg: Config = figment.extract()?;
        cfg.validate()?;
        Ok(cfg)
    }
}
