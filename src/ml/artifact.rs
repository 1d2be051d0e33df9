//! Model artifact persistence
//!
//! Training writes a v2 bundle (forest plus serving metadata). Older
//! deployments may still hold a bare forest with no wrapper; the loader
//! tells the two apart by strict decoding and both end up as a validated
//! [`ServingArtifact`].

use std::path::{Path, PathBuf};
use std::str::FromStr;

use bincode::Options;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use thiserror::Error;

use super::{
    models::PowerModel,
    smartcore::{BareForest, Forest, SolarForest},
    transform::TargetTransform,
    FeatureColumn, DEFAULT_FEATURE_COLUMNS,
};

/// Bundle format version written by this build
pub const BUNDLE_VERSION: u32 = 2;

pub const TARGET_UNIT: &str = "watts";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Model file not found: {}. Run the `train` command first.", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on model file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load model from {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Failed to save model: {0}")]
    Save(String),

    #[error("Unsupported target transform: {0:?}")]
    UnsupportedTransform(String),

    #[error("Unsupported bundle version {found} (newest supported is {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Unknown feature column: {0:?}")]
    UnknownFeatureColumn(String),

    #[error("Duplicate feature column: {0}")]
    DuplicateFeatureColumn(FeatureColumn),

    #[error("Artifact lists no feature columns")]
    NoFeatureColumns,

    #[error("Artifact lists {columns} feature column(s) but the model expects {expected}")]
    FeatureArityMismatch { columns: usize, expected: usize },
}

/// v2 artifact: fitted model plus what serving needs to use it correctly
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    pub model: SolarForest,
    pub feature_columns: Vec<String>,
    pub target_transform: String,
    pub target_unit: String,
    pub version: u32,
}

impl ModelBundle {
    pub fn new(model: SolarForest, feature_columns: &[FeatureColumn], transform: TargetTransform) -> Self {
        Self {
            model,
            feature_columns: feature_columns.iter().map(|c| c.to_string()).collect(),
            target_transform: transform.to_string(),
            target_unit: TARGET_UNIT.to_string(),
            version: BUNDLE_VERSION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Bundle,
    Bare,
}

/// What was found on disk, before validation
#[derive(Debug)]
pub enum ModelArtifact {
    Bundle(ModelBundle),
    Bare(Forest),
}

// Trailing bytes are rejected so a bundle never decodes as a bare forest.
fn codec() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

pub fn save_bundle(path: &Path, bundle: &ModelBundle) -> Result<(), ArtifactError> {
    let bytes = codec()
        .serialize(bundle)
        .map_err(|e| ArtifactError::Save(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    std::fs::write(path, bytes).map_err(|source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    })
}

impl ModelArtifact {
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        let bytes = std::fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                ArtifactError::NotFound(path.to_path_buf())
            } else {
                ArtifactError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        Self::from_bytes(&bytes).map_err(|reason| ArtifactError::Load {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err("file is empty".to_string());
        }
        match codec().deserialize::<ModelBundle>(bytes) {
            Ok(bundle) => Ok(ModelArtifact::Bundle(bundle)),
            Err(bundle_err) => match codec().deserialize::<Forest>(bytes) {
                Ok(forest) => Ok(ModelArtifact::Bare(forest)),
                Err(bare_err) => Err(format!(
                    "not a model bundle ({bundle_err}) nor a bare model ({bare_err})"
                )),
            },
        }
    }

    pub fn format(&self) -> ArtifactFormat {
        match self {
            ModelArtifact::Bundle(_) => ArtifactFormat::Bundle,
            ModelArtifact::Bare(_) => ArtifactFormat::Bare,
        }
    }

    /// Check the metadata against the model and resolve tags into types
    pub fn into_serving(self) -> Result<ServingArtifact, ArtifactError> {
        match self {
            ModelArtifact::Bundle(bundle) => {
                if bundle.version > BUNDLE_VERSION {
                    return Err(ArtifactError::UnsupportedVersion {
                        found: bundle.version,
                        supported: BUNDLE_VERSION,
                    });
                }
                ServingArtifact::new(
                    Box::new(bundle.model),
                    &bundle.feature_columns,
                    &bundle.target_transform,
                    bundle.target_unit,
                    Some(bundle.version),
                    ArtifactFormat::Bundle,
                )
            }
            ModelArtifact::Bare(forest) => Ok(ServingArtifact {
                model: Box::new(BareForest(forest)),
                feature_columns: DEFAULT_FEATURE_COLUMNS.to_vec(),
                transform: TargetTransform::None,
                target_unit: TARGET_UNIT.to_string(),
                version: None,
                format: ArtifactFormat::Bare,
            }),
        }
    }
}

/// A model with validated serving metadata
pub struct ServingArtifact {
    pub model: Box<dyn PowerModel>,
    pub feature_columns: Vec<FeatureColumn>,
    pub transform: TargetTransform,
    pub target_unit: String,
    pub version: Option<u32>,
    pub format: ArtifactFormat,
}

impl std::fmt::Debug for ServingArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServingArtifact")
            .field("feature_columns", &self.feature_columns)
            .field("transform", &self.transform)
            .field("target_unit", &self.target_unit)
            .field("version", &self.version)
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl ServingArtifact {
    pub fn new(
        model: Box<dyn PowerModel>,
        feature_columns: &[String],
        transform_tag: &str,
        target_unit: String,
        version: Option<u32>,
        format: ArtifactFormat,
    ) -> Result<Self, ArtifactError> {
        let transform = TargetTransform::from_str(transform_tag)
            .map_err(|_| ArtifactError::UnsupportedTransform(transform_tag.to_string()))?;

        if feature_columns.is_empty() {
            return Err(ArtifactError::NoFeatureColumns);
        }

        let mut columns = Vec::with_capacity(feature_columns.len());
        for name in feature_columns {
            let column = FeatureColumn::from_str(name)
                .map_err(|_| ArtifactError::UnknownFeatureColumn(name.clone()))?;
            if columns.contains(&column) {
                return Err(ArtifactError::DuplicateFeatureColumn(column));
            }
            columns.push(column);
        }

        if let Some(expected) = model.n_features() {
            if expected != columns.len() {
                return Err(ArtifactError::FeatureArityMismatch {
                    columns: columns.len(),
                    expected,
                });
            }
        }

        Ok(Self {
            model,
            feature_columns: columns,
            transform,
            target_unit,
            version,
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrainingSettings;
    use crate::ml::models::MockPowerModel;

    fn tiny_forest() -> SolarForest {
        let x: Vec<Vec<f64>> = (0..12)
            .map(|i| vec![20.0 + i as f64, 0.1 * i as f64])
            .collect();
        let y: Vec<f64> = x.iter().map(|r| (1000.0 * r[1]).ln_1p()).collect();
        let settings = TrainingSettings {
            n_trees: 4,
            max_depth: Some(4),
            ..TrainingSettings::default()
        };
        SolarForest::fit(&x, &y, SolarForest::parameters(&settings, 2)).unwrap()
    }

    fn mock_with_arity(n: Option<usize>) -> Box<dyn PowerModel> {
        let mut model = MockPowerModel::new();
        model.expect_n_features().return_const(n);
        Box::new(model)
    }

    fn names(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_bundle_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("solar_model.bin");

        let bundle = ModelBundle::new(tiny_forest(), &DEFAULT_FEATURE_COLUMNS, TargetTransform::Log1p);
        save_bundle(&path, &bundle).unwrap();

        let loaded = ModelArtifact::load(&path).unwrap();
        assert_eq!(loaded.format(), ArtifactFormat::Bundle);

        let serving = loaded.into_serving().unwrap();
        assert_eq!(serving.feature_columns, DEFAULT_FEATURE_COLUMNS.to_vec());
        assert_eq!(serving.transform, TargetTransform::Log1p);
        assert_eq!(serving.target_unit, "watts");
        assert_eq!(serving.version, Some(BUNDLE_VERSION));
    }

    #[test]
    fn test_bare_forest_is_classified_as_legacy() {
        let forest = tiny_forest().into_forest();
        let bytes = bincode::serialize(&forest).unwrap();

        let loaded = ModelArtifact::from_bytes(&bytes).unwrap();
        assert_eq!(loaded.format(), ArtifactFormat::Bare);

        let serving = loaded.into_serving().unwrap();
        assert_eq!(serving.format, ArtifactFormat::Bare);
        assert_eq!(serving.transform, TargetTransform::None);
        assert_eq!(serving.feature_columns, DEFAULT_FEATURE_COLUMNS.to_vec());
        assert_eq!(serving.version, None);
    }

    #[test]
    fn test_missing_file_points_to_training() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelArtifact::load(&dir.path().join("absent.bin")).unwrap_err();
        assert!(matches!(err, ArtifactError::NotFound(_)));
        assert!(err.to_string().contains("Run the `train` command first"));
    }

    #[test]
    fn test_garbage_file_is_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.bin");
        std::fs::write(&path, b"definitely not a model").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path).unwrap_err(),
            ArtifactError::Load { .. }
        ));

        std::fs::write(&path, b"").unwrap();
        assert!(matches!(
            ModelArtifact::load(&path).unwrap_err(),
            ArtifactError::Load { .. }
        ));
    }

    #[test]
    fn test_unsupported_transform_rejected() {
        let err = ServingArtifact::new(
            mock_with_arity(Some(2)),
            &names(&["AMBIENT_TEMPERATURE", "IRRADIATION"]),
            "sqrt",
            TARGET_UNIT.to_string(),
            Some(2),
            ArtifactFormat::Bundle,
        )
        .unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedTransform(tag) if tag == "sqrt"));
    }

    #[test]
    fn test_feature_columns_validated() {
        let build = |cols: &[&str], arity| {
            ServingArtifact::new(
                mock_with_arity(arity),
                &names(cols),
                "log1p",
                TARGET_UNIT.to_string(),
                Some(2),
                ArtifactFormat::Bundle,
            )
        };

        assert!(matches!(
            build(&["AMBIENT_TEMPERATURE", "HUMIDITY"], Some(2)).unwrap_err(),
            ArtifactError::UnknownFeatureColumn(name) if name == "HUMIDITY"
        ));
        assert!(matches!(
            build(&["IRRADIATION", "IRRADIATION"], Some(2)).unwrap_err(),
            ArtifactError::DuplicateFeatureColumn(FeatureColumn::Irradiation)
        ));
        assert!(matches!(
            build(&["IRRADIATION"], Some(2)).unwrap_err(),
            ArtifactError::FeatureArityMismatch { columns: 1, expected: 2 }
        ));
        assert!(matches!(build(&[], None).unwrap_err(), ArtifactError::NoFeatureColumns));

        let reordered = build(&["IRRADIATION", "AMBIENT_TEMPERATURE"], Some(2)).unwrap();
        assert_eq!(
            reordered.feature_columns,
            vec![FeatureColumn::Irradiation, FeatureColumn::AmbientTemperature]
        );
    }

    #[test]
    fn test_newer_bundle_version_rejected() {
        let mut bundle = ModelBundle::new(tiny_forest(), &DEFAULT_FEATURE_COLUMNS, TargetTransform::Log1p);
        bundle.version = BUNDLE_VERSION + 1;
        let err = ModelArtifact::Bundle(bundle).into_serving().unwrap_err();
        assert!(matches!(err, ArtifactError::UnsupportedVersion { found: 3, supported: 2 }));
    }
}
