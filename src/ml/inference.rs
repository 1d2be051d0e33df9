//! ML Model Inference Engine
//!
//! Runs the loaded artifact for one weather reading at a time.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    artifact::{ArtifactError, ArtifactFormat, ModelArtifact, ServingArtifact},
    transform::{clamp_non_negative, round_to, TargetTransform},
    FeatureColumn, FeatureVector, WeatherReading,
};

/// Response body of `POST /predict`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPrediction {
    pub predicted_ac_power_watts: f64,
    pub predicted_ac_power_kw: f64,
}

impl PowerPrediction {
    /// Round for presentation. Kilowatts come from the unrounded watts.
    pub fn from_watts(watts: f64) -> Self {
        Self {
            predicted_ac_power_watts: round_to(watts, 2),
            predicted_ac_power_kw: round_to(watts / 1000.0, 3),
        }
    }
}

/// Read-only model state shared by every request
#[derive(Debug)]
pub struct SolarPredictor {
    artifact: ServingArtifact,
}

impl SolarPredictor {
    pub fn new(artifact: ServingArtifact) -> Self {
        Self { artifact }
    }

    /// Load, classify and validate the artifact at `path`
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let artifact = ModelArtifact::load(path)?.into_serving()?;
        Ok(Self::new(artifact))
    }

    pub fn feature_columns(&self) -> &[FeatureColumn] {
        &self.artifact.feature_columns
    }

    pub fn transform(&self) -> TargetTransform {
        self.artifact.transform
    }

    pub fn format(&self) -> ArtifactFormat {
        self.artifact.format
    }

    pub fn version(&self) -> Option<u32> {
        self.artifact.version
    }

    pub fn target_unit(&self) -> &str {
        &self.artifact.target_unit
    }

    /// Predicted AC power in watts, never negative
    pub fn predict_watts(&self, reading: &WeatherReading) -> Result<f64> {
        let features = FeatureVector::from_reading(&self.artifact.feature_columns, reading);
        let raw = self.artifact.model.predict(&features)?;
        let watts = self.artifact.transform.invert(raw);

        if watts.is_nan() || watts == f64::INFINITY {
            anyhow::bail!("Model produced a non-finite prediction (raw output {raw})");
        }
        Ok(clamp_non_negative(watts))
    }

    pub fn predict(&self, reading: &WeatherReading) -> Result<PowerPrediction> {
        self.predict_watts(reading).map(PowerPrediction::from_watts)
    }
}
