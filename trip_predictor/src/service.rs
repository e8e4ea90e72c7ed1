use std::sync::Arc;
use thiserror::Error;
use tracing::error;
use trip_features::{FeatureEngine, FeatureError, PredictionAudit, PredictionRequest};

use crate::model::{ModelError, Scorer};
use crate::types::Prediction;

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Features(#[from] FeatureError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl PredictError {
    /// Caller mistakes, as opposed to server-side faults.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PredictError::Features(
                FeatureError::TimestampParse { .. } | FeatureError::InvalidField { .. }
            )
        )
    }
}

/// Feature engine plus model, built once at startup and shared by handlers.
#[derive(Clone)]
pub struct PredictionService {
    engine: Arc<FeatureEngine>,
    model: Arc<dyn Scorer>,
}

impl PredictionService {
    pub fn new(engine: Arc<FeatureEngine>, model: Arc<dyn Scorer>) -> Self {
        Self { engine, model }
    }

    pub fn engine(&self) -> &FeatureEngine {
        &self.engine
    }

    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction, PredictError> {
        let features = self.engine.extract(request)?;
        let value = self.model.score(&features)?;

        if let Err(e) = PredictionAudit::new(&features, value, &request.trip_id).emit() {
            error!("failed to serialize audit record for trip {}: {}", request.trip_id, e);
        }
        Ok(Prediction { value, features })
    }
}
