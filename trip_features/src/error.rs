use thiserror::Error;

/// Errors raised while turning raw trips into feature vectors.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Neither the strict request format nor any fallback format matched.
    #[error("unparseable timestamp {input:?}: expected %Y-%m-%dT%H/%M/%S%z or a general date")]
    TimestampParse { input: String },

    /// A request field outside its allowed domain.
    #[error("invalid {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    /// A reconciled column holds a value that is not a finite number.
    #[error("column {column:?} has non-numeric value {value:?}")]
    SchemaMismatch { column: String, value: String },

    /// The schema artifact is missing or has no usable header.
    #[error("failed to load schema from {path}: {reason}")]
    SchemaLoad { path: String, reason: String },

    /// The catalog has no indicator column at all for a categorical group.
    #[error("schema has no indicator columns for categorical group {group:?}")]
    MissingCategoryGroup { group: String },

    #[error("zone table error: {0}")]
    ZoneTable(String),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FeatureError>;
