use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::batch::BatchOptions;
use crate::error::{FeatureError, Result};

/// Batch pipeline settings. Every field has a default, so `{}` is a valid file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_path: PathBuf,
    pub zones_path: PathBuf,
    pub output_dir: PathBuf,
    pub target_column: String,
    pub max_trip_minutes: f64,
    pub remove_invalid: bool,
    pub keep_trip_id: bool,
    pub train_fraction: f64,
    pub val_fraction: f64,
    pub train_file: String,
    pub val_file: String,
    pub test_file: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/data.csv"),
            zones_path: PathBuf::from("data/zones.csv"),
            output_dir: PathBuf::from("data"),
            target_column: "trip_time".to_string(),
            max_trip_minutes: 300.0,
            remove_invalid: true,
            keep_trip_id: false,
            train_fraction: 0.70,
            val_fraction: 0.15,
            train_file: "train.csv".to_string(),
            val_file: "val.csv".to_string(),
            test_file: "test.csv".to_string(),
        }
    }
}

impl PipelineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|e| {
            FeatureError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let in_unit = |v: f64| v > 0.0 && v < 1.0;
        if !in_unit(self.train_fraction) || !in_unit(self.val_fraction) {
            return Err(FeatureError::Config(format!(
                "split fractions must lie in (0, 1), got train={} val={}",
                self.train_fraction, self.val_fraction
            )));
        }
        if self.train_fraction + self.val_fraction >= 1.0 {
            return Err(FeatureError::Config(
                "train and val fractions leave no room for a test split".into(),
            ));
        }
        if self.max_trip_minutes.is_nan() || self.max_trip_minutes <= 0.0 {
            return Err(FeatureError::Config(format!(
                "max_trip_minutes must be positive, got {}",
                self.max_trip_minutes
            )));
        }
        if self.target_column.trim().is_empty() {
            return Err(FeatureError::Config("target_column is empty".into()));
        }
        Ok(())
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            target_column: self.target_column.clone(),
            remove_invalid: self.remove_invalid,
            keep_trip_id: self.keep_trip_id,
            max_trip_minutes: self.max_trip_minutes,
        }
    }

    /// Schema artifact written by the batch run and read by the server.
    pub fn schema_path(&self) -> PathBuf {
        self.output_dir.join(&self.test_file)
    }
}
