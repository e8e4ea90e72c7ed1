//! Feature transformation for trip-duration prediction.
//!
//! Turns either a historical trip export (batch) or a single prediction request
//! (online) into numeric vectors laid out exactly like the model's training
//! table.

pub mod audit;
pub mod batch;
pub mod config;
pub mod encoder;
pub mod error;
pub mod pipeline;
pub mod reconcile;
pub mod schema;
pub mod temporal;
pub mod zones;

pub use audit::PredictionAudit;
pub use batch::{build_training_table, BatchOptions, BatchReport, RawTripRecord, TrainingTable};
pub use config::PipelineConfig;
pub use encoder::CategoricalEncoder;
pub use error::{FeatureError, Result};
pub use pipeline::{FeatureEngine, PredictionRequest, TripFeatures};
pub use reconcile::{reconcile, CellValue, FeatureRecord, FeatureVector};
pub use schema::SchemaCatalog;
pub use temporal::{decompose, CalendarFeatures};
pub use zones::{Side, ZoneLookup, ZoneRecord};
