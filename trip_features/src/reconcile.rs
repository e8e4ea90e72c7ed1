//! Alignment of loosely built feature records to the schema catalog.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::{collections::HashMap, fmt, sync::Arc};

use crate::error::{FeatureError, Result};
use crate::schema::SchemaCatalog;

/// A single cell of an intermediate record, before casting.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Integer(i64),
    Flag(bool),
    Text(String),
}

impl CellValue {
    /// Cast to a finite float. `None` for text that is not a number and for NaN.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            CellValue::Number(v) => *v,
            CellValue::Integer(v) => *v as f64,
            CellValue::Flag(b) => f64::from(u8::from(*b)),
            CellValue::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        v.is_finite().then_some(v)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(v) => write!(f, "{}", v),
            CellValue::Integer(v) => write!(f, "{}", v),
            CellValue::Flag(b) => write!(f, "{}", b),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Number(v)
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Integer(v)
    }
}

impl From<u32> for CellValue {
    fn from(v: u32) -> Self {
        CellValue::Integer(i64::from(v))
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

/// Unordered column → value record. May hold columns outside the schema and
/// may lack schema columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    cells: HashMap<String, CellValue>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.cells.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells.get(column)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Fixed-order numeric row in schema layout.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    columns: Arc<[String]>,
    values: Vec<f64>,
}

impl FeatureVector {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<f64> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.columns
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Largest absolute per-column difference, `None` when layouts differ.
    pub fn max_abs_diff(&self, other: &FeatureVector) -> Option<f64> {
        if self.columns != other.columns {
            return None;
        }
        Some(
            self.values
                .iter()
                .zip(&other.values)
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max),
        )
    }
}

// Serialized as a JSON object in schema order.
impl Serialize for FeatureVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}

/// Projects `record` onto `schema`: absent columns become 0.0, extra columns
/// are dropped, every value is cast to float. Only an uncastable value fails.
pub fn reconcile(record: &FeatureRecord, schema: &SchemaCatalog) -> Result<FeatureVector> {
    let mut values = Vec::with_capacity(schema.len());
    for column in schema.columns() {
        let value = match record.get(column) {
            None => 0.0,
            Some(cell) => cell.as_f64().ok_or_else(|| FeatureError::SchemaMismatch {
                column: column.clone(),
                value: cell.to_string(),
            })?,
        };
        values.push(value);
    }
    Ok(FeatureVector {
        columns: schema.shared_columns(),
        values,
    })
}
