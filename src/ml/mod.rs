//! Machine Learning Module
//!
//! Solar AC power regression shared by the offline trainer and the HTTP
//! server:
//! - Feature columns and feature vectors in training order
//! - Target transform and its inverse
//! - Random forest wrapper and the model trait the server calls
//! - Artifact format written by training and read at server startup
//!
//! # Architecture
//! - `training` turns a CSV file into a fitted, evaluated bundle
//! - `artifact` persists and classifies bundles
//! - `inference` serves single predictions from a loaded artifact

use anyhow::Result;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

pub mod artifact;
pub mod inference;
pub mod models;
pub mod smartcore;
pub mod training;
pub mod transform;

pub const DATE_TIME: &str = "DATE_TIME";
pub const AC_POWER: &str = "AC_POWER";
pub const AMBIENT_TEMPERATURE: &str = "AMBIENT_TEMPERATURE";
pub const IRRADIATION: &str = "IRRADIATION";

/// Columns a training CSV must carry. Extra columns are ignored.
pub const REQUIRED_COLUMNS: [&str; 4] = [DATE_TIME, AC_POWER, AMBIENT_TEMPERATURE, IRRADIATION];

/// Column order used at fit time, and assumed for bare artifacts.
pub const DEFAULT_FEATURE_COLUMNS: [FeatureColumn; 2] =
    [FeatureColumn::AmbientTemperature, FeatureColumn::Irradiation];

/// A model input the server knows how to fill from a request
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
    EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureColumn {
    AmbientTemperature,
    Irradiation,
}

impl FeatureColumn {
    pub fn value_from(&self, reading: &WeatherReading) -> f64 {
        match self {
            FeatureColumn::AmbientTemperature => reading.temperature_c,
            FeatureColumn::Irradiation => reading.irradiation,
        }
    }
}

/// Weather inputs of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature_c: f64,
    pub irradiation: f64,
}

/// Feature Vector for ML models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub features: Vec<f64>,
    pub feature_names: Vec<String>,
}

impl FeatureVector {
    pub fn new(features: Vec<f64>, feature_names: Vec<String>) -> Result<Self> {
        if features.len() != feature_names.len() {
            anyhow::bail!(
                "Feature count mismatch: {} features, {} names",
                features.len(),
                feature_names.len()
            );
        }
        Ok(Self {
            features,
            feature_names,
        })
    }

    /// Lay out a reading in exactly the given column order
    pub fn from_reading(columns: &[FeatureColumn], reading: &WeatherReading) -> Self {
        Self {
            features: columns.iter().map(|c| c.value_from(reading)).collect(),
            feature_names: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Hold-out metrics, computed in watts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub rmse: f64, // Root Mean Square Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    pub fn new(mae: f64, rmse: f64, r2: f64) -> Self {
        Self { mae, rmse, r2 }
    }
}
