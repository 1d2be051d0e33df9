//! Offline training: CSV in, model bundle out.

use std::process::ExitCode;

use anyhow::Result;
use solar_power_predictor::{config::Config, ml::training::ModelTrainer, telemetry::init_tracing};
use tracing::error;

fn main() -> Result<ExitCode> {
    init_tracing();

    let cfg = Config::load()?;
    let trainer = ModelTrainer::new(cfg.training.clone());

    let report = match trainer.run(&cfg.training.dataset_path, &cfg.model.artifact_path) {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "training failed");
            eprintln!("Training failed: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    println!("Training completed successfully.");
    println!("Rows used: {}", report.rows_used);
    println!("Train/test rows: {}/{}", report.train_rows, report.test_rows);
    println!("R-squared (R^2): {:.4}", report.metrics.r2);
    println!("MAE (watts): {:.2}", report.metrics.mae);
    println!("RMSE (watts): {:.2}", report.metrics.rmse);
    println!("Model saved to: {}", cfg.model.artifact_path.display());
    Ok(ExitCode::SUCCESS)
}
