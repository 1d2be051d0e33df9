//! ML Model Definitions
//!
//! The regression capability the trainer evaluates and the server calls.

use super::FeatureVector;
use anyhow::Result;

/// Trait for fitted regressors
///
/// Outputs are in the model's fit space; callers own the inverse transform.
#[cfg_attr(test, mockall::automock)]
pub trait PowerModel: Send + Sync {
    /// Predict one value from a single feature row
    fn predict(&self, features: &FeatureVector) -> Result<f64>;

    /// Predict a batch of rows laid out in fit order
    fn predict_batch(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>>;

    /// Number of inputs the model was fitted on, when the artifact records it
    fn n_features(&self) -> Option<usize>;
}
