use std::{collections::HashSet, path::Path, sync::Arc};
use tracing::info;

use crate::error::{FeatureError, Result};

/// Canonical ordered feature columns for one model version.
///
/// Built once from the header of a processed table with the target column
/// removed, then shared read-only. Cloning shares the same column storage.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    columns: Arc<[String]>,
    index: Arc<HashSet<String>>,
}

impl SchemaCatalog {
    /// Builds a catalog from column names, dropping `target` wherever it appears.
    pub fn from_header<I, S>(header: I, target: &str) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns: Vec<String> = header
            .into_iter()
            .map(Into::into)
            .filter(|c| c != target)
            .collect();
        Self::from_columns(columns)
    }

    pub fn from_columns(columns: Vec<String>) -> Result<Self> {
        if columns.is_empty() {
            return Err(FeatureError::SchemaLoad {
                path: "<memory>".into(),
                reason: "no feature columns".into(),
            });
        }
        let mut index = HashSet::with_capacity(columns.len());
        for c in &columns {
            if !index.insert(c.clone()) {
                return Err(FeatureError::SchemaLoad {
                    path: "<memory>".into(),
                    reason: format!("duplicate column {:?}", c),
                });
            }
        }
        Ok(Self {
            columns: columns.into(),
            index: Arc::new(index),
        })
    }

    /// Reads only the header row of a CSV artifact.
    pub fn load<P: AsRef<Path>>(path: P, target: &str) -> Result<Self> {
        let path = path.as_ref();
        let load_err = |reason: String| FeatureError::SchemaLoad {
            path: path.display().to_string(),
            reason,
        };
        let mut rdr = csv::Reader::from_path(path).map_err(|e| load_err(e.to_string()))?;
        let header = rdr.headers().map_err(|e| load_err(e.to_string()))?.clone();
        let catalog = Self::from_header(header.iter(), target).map_err(|e| match e {
            FeatureError::SchemaLoad { reason, .. } => load_err(reason),
            other => other,
        })?;
        info!(
            "loaded schema with {} feature columns from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.index.contains(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl PartialEq for SchemaCatalog {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn drops_target_and_keeps_order() {
        let cat = SchemaCatalog::from_header(
            ["trip_distance", "pickup_hour", "trip_time", "is_from_airport"],
            "trip_time",
        )
        .unwrap();
        assert_eq!(cat.columns(), ["trip_distance", "pickup_hour", "is_from_airport"]);
        assert!(cat.contains("is_from_airport"));
        assert!(!cat.contains("trip_time"));
    }

    #[test]
    fn loads_header_from_file() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "trip_distance,trip_time,pickup_borough_Queens")?;
        writeln!(file, "1.5,12.0,1.0")?;
        file.flush()?;
        let cat = SchemaCatalog::load(file.path(), "trip_time")?;
        assert_eq!(cat.len(), 2);
        assert_eq!(cat.columns()[1], "pickup_borough_Queens");
        Ok(())
    }

    #[test]
    fn missing_file_and_duplicates_fail() {
        assert!(matches!(
            SchemaCatalog::load("/definitely/not/here.csv", "trip_time"),
            Err(FeatureError::SchemaLoad { .. })
        ));
        assert!(SchemaCatalog::from_header(["a", "b", "a"], "t").is_err());
        assert!(SchemaCatalog::from_header(["t"], "t").is_err());
    }
}
