//! ML Model Training Pipeline
//!
//! CSV loading, schema checks, null dropping, seeded train/test split,
//! random forest fit in `log1p` space, and hold-out evaluation in watts.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::{
    artifact::{save_bundle, ArtifactError, ModelBundle},
    models::PowerModel,
    smartcore::SolarForest,
    transform::{clamp_non_negative, TargetTransform},
    ValidationMetrics, AC_POWER, AMBIENT_TEMPERATURE, DEFAULT_FEATURE_COLUMNS, IRRADIATION,
    REQUIRED_COLUMNS,
};
use crate::config::TrainingSettings;

/// Cell values read as missing, matching the usual CSV/dataframe conventions
const NULL_TOKENS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-NaN", "-nan", "<NA>", "N/A", "NA", "NULL", "NaN", "None",
    "n/a", "nan", "null",
];

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("Dataset file not found: {}", .0.display())]
    DatasetNotFound(PathBuf),

    #[error("Failed to read dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing required column(s): {missing:?}")]
    Schema { missing: Vec<String> },

    #[error("Invalid value {value:?} in column {column} on line {line}")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },

    #[error("No valid rows remain after dropping nulls.")]
    EmptyDataset,

    #[error("AC_POWER value {value} has no finite image under the {transform} target transform")]
    UnrepresentableTarget { value: f64, transform: TargetTransform },

    #[error("Not enough rows to split into train and test sets: {rows} row(s)")]
    InsufficientRows { rows: usize },

    #[error("Model fitting failed: {0}")]
    Fit(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Fail with the sorted list of required columns absent from `columns`
pub fn validate_required_columns<S: AsRef<str>>(columns: &[S]) -> Result<(), TrainingError> {
    let present: BTreeSet<&str> = columns.iter().map(|c| c.as_ref()).collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .difference(&present)
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrainingError::Schema { missing })
    }
}

/// One CSV row reduced to the model columns. `None` marks a null cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolarRecord {
    pub ac_power: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub irradiation: Option<f64>,
}

pub fn load_dataset(path: &Path) -> Result<Vec<SolarRecord>, TrainingError> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            TrainingError::DatasetNotFound(path.to_path_buf())
        } else {
            TrainingError::Io(e)
        }
    })?;
    read_dataset(file)
}

pub fn read_dataset<R: Read>(reader: R) -> Result<Vec<SolarRecord>, TrainingError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let names: Vec<&str> = headers.iter().collect();
    validate_required_columns(&names)?;

    let power_idx = column_index(&names, AC_POWER)?;
    let temp_idx = column_index(&names, AMBIENT_TEMPERATURE)?;
    let irr_idx = column_index(&names, IRRADIATION)?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let cell = |idx: usize, column: &'static str| parse_cell(record.get(idx), line, column);

        records.push(SolarRecord {
            ac_power: cell(power_idx, AC_POWER)?,
            ambient_temperature: cell(temp_idx, AMBIENT_TEMPERATURE)?,
            irradiation: cell(irr_idx, IRRADIATION)?,
        });
    }

    debug!(rows = records.len(), "dataset read");
    Ok(records)
}

fn column_index(names: &[&str], column: &str) -> Result<usize, TrainingError> {
    names
        .iter()
        .position(|n| *n == column)
        .ok_or_else(|| TrainingError::Schema {
            missing: vec![column.to_string()],
        })
}

fn parse_cell(raw: Option<&str>, line: u64, column: &'static str) -> Result<Option<f64>, TrainingError> {
    let raw = raw.unwrap_or_default();
    if NULL_TOKENS.contains(&raw) {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(value) if value.is_nan() => Ok(None),
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(TrainingError::InvalidValue {
            line,
            column,
            value: raw.to_string(),
        }),
    }
}

/// Feature rows in fit order with their raw watt targets
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingDataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl TrainingDataset {
    /// Keep `[AMBIENT_TEMPERATURE, IRRADIATION] -> AC_POWER` rows with no nulls
    pub fn select(records: &[SolarRecord]) -> Result<Self, TrainingError> {
        let mut dataset = TrainingDataset::default();
        for record in records {
            if let (Some(power), Some(temp), Some(irr)) =
                (record.ac_power, record.ambient_temperature, record.irradiation)
            {
                dataset.features.push(vec![temp, irr]);
                dataset.targets.push(power);
            }
        }

        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Seeded shuffle split into `(train, test)`; the test side gets
    /// `ceil(len * test_ratio)` rows.
    pub fn split(&self, test_ratio: f64, seed: u64) -> Result<(Self, Self), TrainingError> {
        let rows = self.len();
        let n_test = (rows as f64 * test_ratio).ceil() as usize;
        if n_test == 0 || n_test >= rows {
            return Err(TrainingError::InsufficientRows { rows });
        }

        let mut indices: Vec<usize> = (0..rows).collect();
        indices.shuffle(&mut StdRng::seed_from_u64(seed));

        let (test_idx, train_idx) = indices.split_at(n_test);
        Ok((self.subset(train_idx), self.subset(test_idx)))
    }

    fn subset(&self, indices: &[usize]) -> Self {
        Self {
            features: indices.iter().map(|&i| self.features[i].clone()).collect(),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
        }
    }
}

/// Hold-out metrics. R-squared of a constant target is 1.0 for an exact fit
/// and 0.0 otherwise.
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> anyhow::Result<ValidationMetrics> {
    if predictions.len() != targets.len() {
        anyhow::bail!("Prediction and target count mismatch");
    }

    if predictions.is_empty() {
        anyhow::bail!("No predictions to evaluate");
    }

    let n = predictions.len() as f64;

    let mae: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum::<f64>()
        / n;

    let ss_res: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (t - p).powi(2))
        .sum();
    let rmse = (ss_res / n).sqrt();

    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        if ss_res.abs() < 1e-10 {
            1.0
        } else {
            0.0
        }
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics::new(mae, rmse, r2))
}

/// Predict in fit space, map back to watts, floor at zero, score against raw watts
pub fn evaluate(
    model: &dyn PowerModel,
    transform: TargetTransform,
    test: &TrainingDataset,
) -> anyhow::Result<ValidationMetrics> {
    let predicted_watts: Vec<f64> = model
        .predict_batch(&test.features)?
        .into_iter()
        .map(|raw| clamp_non_negative(transform.invert(raw)))
        .collect();
    calculate_metrics(&predicted_watts, &test.targets)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub rows_used: usize,
    pub train_rows: usize,
    pub test_rows: usize,
    pub metrics: ValidationMetrics,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub bundle: ModelBundle,
    pub report: TrainingReport,
}

/// Model Trainer
pub struct ModelTrainer {
    settings: TrainingSettings,
    transform: TargetTransform,
}

impl ModelTrainer {
    pub fn new(settings: TrainingSettings) -> Self {
        Self {
            settings,
            transform: TargetTransform::Log1p,
        }
    }

    pub fn with_transform(mut self, transform: TargetTransform) -> Self {
        self.transform = transform;
        self
    }

    /// Fit and evaluate on already selected rows
    pub fn fit(&self, dataset: &TrainingDataset) -> Result<TrainingOutcome, TrainingError> {
        // Every target needs a finite image in fit space (log1p is undefined at or below -1 W)
        if let Some(&value) = dataset
            .targets
            .iter()
            .find(|&&w| !self.transform.apply(w).is_finite())
        {
            return Err(TrainingError::UnrepresentableTarget {
                value,
                transform: self.transform,
            });
        }

        let (train, test) = dataset.split(self.settings.test_ratio, self.settings.seed)?;
        info!(
            train_rows = train.len(),
            test_rows = test.len(),
            transform = %self.transform,
            "fitting random forest"
        );

        let y_fit: Vec<f64> = train.targets.iter().map(|&w| self.transform.apply(w)).collect();
        let params = SolarForest::parameters(&self.settings, DEFAULT_FEATURE_COLUMNS.len());
        let model = SolarForest::fit(&train.features, &y_fit, params)
            .map_err(|e| TrainingError::Fit(format!("{e:#}")))?;

        let metrics = evaluate(&model, self.transform, &test)
            .map_err(|e| TrainingError::Fit(format!("{e:#}")))?;
        info!(r2 = metrics.r2, mae = metrics.mae, rmse = metrics.rmse, "evaluation complete");

        Ok(TrainingOutcome {
            bundle: ModelBundle::new(model, &DEFAULT_FEATURE_COLUMNS, self.transform),
            report: TrainingReport {
                rows_used: dataset.len(),
                train_rows: train.len(),
                test_rows: test.len(),
                metrics,
            },
        })
    }

    /// Full batch run: CSV in, bundle on disk, report out
    pub fn run(&self, dataset_path: &Path, artifact_path: &Path) -> Result<TrainingReport, TrainingError> {
        info!(dataset = %dataset_path.display(), "loading dataset");
        let records = load_dataset(dataset_path)?;
        let dataset = TrainingDataset::select(&records)?;
        info!(rows = records.len(), usable = dataset.len(), "dropped rows with nulls");

        let outcome = self.fit(&dataset)?;
        save_bundle(artifact_path, &outcome.bundle)?;
        info!(artifact = %artifact_path.display(), "model bundle saved");

        Ok(outcome.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::MockPowerModel;

    const CSV: &str = "\
DATE_TIME,PLANT_ID,AC_POWER,AMBIENT_TEMPERATURE,IRRADIATION
2020-05-15 00:00,1,0,25.1,0
2020-05-15 12:00,1,900.5,34.2,0.81
2020-05-15 12:15,1,,34.0,0.80
2020-05-15 12:30,1,880,NaN,0.79
2020-05-15 12:45,1,870.25,33.9,
";

    #[test]
    fn test_validate_required_columns_sorted() {
        let err = validate_required_columns(&["AC_POWER", "DATE_TIME"]).unwrap_err();
        match err {
            TrainingError::Schema { missing } => {
                assert_eq!(missing, vec!["AMBIENT_TEMPERATURE", "IRRADIATION"]);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert!(validate_required_columns(&REQUIRED_COLUMNS).is_ok());
    }

    #[test]
    fn test_read_dataset_marks_nulls() {
        let records = read_dataset(CSV.as_bytes()).unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[1].ac_power, Some(900.5));
        assert_eq!(records[2].ac_power, None);
        assert_eq!(records[3].ambient_temperature, None);
        assert_eq!(records[4].irradiation, None);
    }

    #[test]
    fn test_read_dataset_missing_column() {
        let csv = "DATE_TIME,AC_POWER,AMBIENT_TEMPERATURE\n2020-05-15,1,2\n";
        let err = read_dataset(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("IRRADIATION"));
    }

    #[test]
    fn test_read_dataset_rejects_text_in_numeric_column() {
        let csv = "DATE_TIME,AC_POWER,AMBIENT_TEMPERATURE,IRRADIATION\nx,12,warm,0.5\n";
        let err = read_dataset(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::InvalidValue { column: AMBIENT_TEMPERATURE, .. }
        ));
    }

    #[rstest::rstest]
    #[case("inf")]
    #[case("-inf")]
    #[case("Infinity")]
    fn test_read_dataset_rejects_non_finite(#[case] token: &str) {
        let csv = format!("DATE_TIME,AC_POWER,AMBIENT_TEMPERATURE,IRRADIATION\nx,{token},25,0.5\n");
        let err = read_dataset(csv.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::InvalidValue { column: AC_POWER, line: 2, .. }
        ));
    }

    #[test]
    fn test_select_drops_null_rows() {
        let records = read_dataset(CSV.as_bytes()).unwrap();
        let dataset = TrainingDataset::select(&records).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.features[1], vec![34.2, 0.81]);
        assert_eq!(dataset.targets, vec![0.0, 900.5]);
    }

    #[test]
    fn test_select_all_null_is_empty_dataset() {
        let records = vec![SolarRecord {
            ac_power: None,
            ambient_temperature: Some(20.0),
            irradiation: Some(0.2),
        }];
        assert!(matches!(
            TrainingDataset::select(&records),
            Err(TrainingError::EmptyDataset)
        ));
    }

    #[test]
    fn test_split_is_seeded_and_sized() {
        let dataset = TrainingDataset {
            features: (0..10).map(|i| vec![i as f64, 0.0]).collect(),
            targets: (0..10).map(|i| i as f64).collect(),
        };

        let (train, test) = dataset.split(0.2, 42).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let (train_again, test_again) = dataset.split(0.2, 42).unwrap();
        assert_eq!(train, train_again);
        assert_eq!(test, test_again);

        let mut all: Vec<f64> = train.targets.iter().chain(test.targets.iter()).copied().collect();
        all.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(all, dataset.targets);
    }

    #[test]
    fn test_split_needs_two_rows() {
        let dataset = TrainingDataset {
            features: vec![vec![1.0, 0.1]],
            targets: vec![5.0],
        };
        assert!(matches!(
            dataset.split(0.2, 42),
            Err(TrainingError::InsufficientRows { rows: 1 })
        ));
    }

    #[test]
    fn test_calculate_metrics() {
        let predictions = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let targets = vec![1.1, 2.1, 2.9, 4.2, 4.8];

        let metrics = calculate_metrics(&predictions, &targets).unwrap();

        assert!(metrics.mae < 0.3);
        assert!(metrics.rmse < 0.4);
        assert!(metrics.r2 > 0.9);
    }

    #[test]
    fn test_calculate_metrics_constant_target() {
        let exact = calculate_metrics(&[3.0, 3.0], &[3.0, 3.0]).unwrap();
        assert_eq!(exact.r2, 1.0);

        let off = calculate_metrics(&[2.0, 4.0], &[3.0, 3.0]).unwrap();
        assert_eq!(off.r2, 0.0);
        assert_eq!(off.mae, 1.0);

        assert!(calculate_metrics(&[], &[]).is_err());
        assert!(calculate_metrics(&[1.0], &[]).is_err());
    }

    #[test]
    fn test_evaluate_inverts_and_clamps() {
        let mut model = MockPowerModel::new();
        // expm1(-1) is negative and must count as 0 W
        model
            .expect_predict_batch()
            .returning(|_| Ok(vec![-1.0, 100f64.ln_1p()]));

        let test = TrainingDataset {
            features: vec![vec![20.0, 0.0], vec![30.0, 0.5]],
            targets: vec![0.0, 100.0],
        };

        let metrics = evaluate(&model, TargetTransform::Log1p, &test).unwrap();
        assert!(metrics.mae < 1e-9);
        assert!((metrics.r2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_reports_rows() {
        let features: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![20.0 + (i % 15) as f64, (i % 10) as f64 * 0.1])
            .collect();
        let targets: Vec<f64> = features.iter().map(|r| 1000.0 * r[1]).collect();
        let dataset = TrainingDataset { features, targets };

        let settings = TrainingSettings {
            n_trees: 10,
            ..TrainingSettings::default()
        };
        let outcome = ModelTrainer::new(settings).fit(&dataset).unwrap();

        assert_eq!(outcome.report.rows_used, 40);
        assert_eq!(outcome.report.train_rows, 32);
        assert_eq!(outcome.report.test_rows, 8);
        assert_eq!(outcome.bundle.target_transform, "log1p");
        assert_eq!(outcome.bundle.version, 2);
        assert!(outcome.report.metrics.mae >= 0.0);
    }

    #[test]
    fn test_fit_without_transform_tags_bundle() {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![20.0 + i as f64, 0.05 * i as f64]).collect();
        let targets: Vec<f64> = features.iter().map(|r| 500.0 * r[1]).collect();
        let dataset = TrainingDataset { features, targets };

        let settings = TrainingSettings {
            n_trees: 5,
            ..TrainingSettings::default()
        };
        let outcome = ModelTrainer::new(settings)
            .with_transform(TargetTransform::None)
            .fit(&dataset)
            .unwrap();
        assert_eq!(outcome.bundle.target_transform, "none");
    }

    #[rstest::rstest]
    #[case(-5.0)]
    #[case(-1.0)]
    fn test_fit_rejects_targets_log1p_cannot_map(#[case] bad_watts: f64) {
        let features: Vec<Vec<f64>> = (0..20).map(|i| vec![20.0 + i as f64, 0.05 * i as f64]).collect();
        let mut targets: Vec<f64> = features.iter().map(|r| 500.0 * r[1]).collect();
        targets[7] = bad_watts;
        let dataset = TrainingDataset { features, targets };

        let settings = TrainingSettings {
            n_trees: 5,
            ..TrainingSettings::default()
        };
        let err = ModelTrainer::new(settings.clone()).fit(&dataset).unwrap_err();
        assert!(matches!(
            err,
            TrainingError::UnrepresentableTarget { value, transform: TargetTransform::Log1p }
                if value == bad_watts
        ));
        assert!(err.to_string().contains("log1p"));

        // Raw targets have no such restriction
        assert!(ModelTrainer::new(settings)
            .with_transform(TargetTransform::None)
            .fit(&dataset)
            .is_ok());
    }

    #[test]
    fn test_run_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let trainer = ModelTrainer::new(TrainingSettings::default());
        let err = trainer
            .run(&dir.path().join("missing.csv"), &dir.path().join("model.bin"))
            .unwrap_err();
        assert!(matches!(err, TrainingError::DatasetNotFound(_)));
    }
}
