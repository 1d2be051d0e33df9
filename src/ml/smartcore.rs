//! SmartCore ML Model Wrapper
//!
//! Wraps SmartCore's `RandomForestRegressor` and records the input arity so
//! a bundle can be checked against its feature columns at load time.

use super::{models::PowerModel, FeatureVector};
use crate::config::TrainingSettings;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use smartcore::ensemble::random_forest_regressor::{
    RandomForestRegressor, RandomForestRegressorParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;

/// The concrete forest type persisted in artifacts
pub type Forest = RandomForestRegressor<f64, f64, DenseMatrix<f64>, Vec<f64>>;

/// Fitted random forest plus the number of inputs it expects
#[derive(Debug, Serialize, Deserialize)]
pub struct SolarForest {
    n_features: usize,
    forest: Forest,
}

impl SolarForest {
    /// Parameters mirroring a plain sklearn forest: every feature is a split
    /// candidate and trees grow until `min_samples_*` stops them.
    pub fn parameters(settings: &TrainingSettings, n_features: usize) -> RandomForestRegressorParameters {
        RandomForestRegressorParameters {
            max_depth: settings.max_depth,
            min_samples_leaf: settings.min_samples_leaf,
            min_samples_split: settings.min_samples_split,
            n_trees: settings.n_trees,
            m: Some(n_features),
            keep_samples: false,
            seed: settings.seed,
        }
    }

    /// Fit a forest on row-major features
    pub fn fit(x: &[Vec<f64>], y: &[f64], params: RandomForestRegressorParameters) -> Result<Self> {
        if x.is_empty() || y.is_empty() {
            anyhow::bail!("Cannot train on empty dataset");
        }

        if x.len() != y.len() {
            anyhow::bail!(
                "Feature and target count mismatch: {} features, {} targets",
                x.len(),
                y.len()
            );
        }

        let n_features = x[0].len();
        let x_matrix = to_matrix(x, n_features)?;
        let y_vec = y.to_vec();

        let forest = RandomForestRegressor::fit(&x_matrix, &y_vec, params)
            .map_err(|e| anyhow::anyhow!("RandomForest training failed: {:?}", e))?;

        Ok(Self { n_features, forest })
    }

    pub fn forest(&self) -> &Forest {
        &self.forest
    }

    pub fn into_forest(self) -> Forest {
        self.forest
    }
}

fn to_matrix(rows: &[Vec<f64>], n_features: usize) -> Result<DenseMatrix<f64>> {
    let mut flat_data = Vec::with_capacity(rows.len() * n_features);
    for row in rows {
        if row.len() != n_features {
            anyhow::bail!("All feature vectors must have the same length");
        }
        flat_data.extend_from_slice(row);
    }
    Ok(DenseMatrix::new(rows.len(), n_features, flat_data, false))
}

fn predict_with(forest: &Forest, rows: &[Vec<f64>], n_features: usize) -> Result<Vec<f64>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let x = to_matrix(rows, n_features)?;
    let predictions = forest
        .predict(&x)
        .map_err(|e| anyhow::anyhow!("Prediction failed: {:?}", e))?;

    if predictions.len() != rows.len() {
        anyhow::bail!(
            "Model returned {} predictions for {} rows",
            predictions.len(),
            rows.len()
        );
    }
    Ok(predictions)
}

impl PowerModel for SolarForest {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        if features.len() != self.n_features {
            anyhow::bail!(
                "Feature count mismatch: expected {}, got {}",
                self.n_features,
                features.len()
            );
        }
        let predictions = predict_with(&self.forest, &[features.features.clone()], self.n_features)?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))
    }

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        predict_with(&self.forest, rows, self.n_features)
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }
}

/// A forest loaded from a legacy artifact, with no recorded arity
#[derive(Debug)]
pub struct BareForest(pub Forest);

impl PowerModel for BareForest {
    fn predict(&self, features: &FeatureVector) -> Result<f64> {
        let predictions = predict_with(&self.0, &[features.features.clone()], features.len())?;
        predictions
            .first()
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Model returned empty predictions"))
    }

    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        let n_features = rows.first().map(|r| r.len()).unwrap_or_default();
        predict_with(&self.0, rows, n_features)
    }

    fn n_features(&self) -> Option<usize> {
        None
    }
}
