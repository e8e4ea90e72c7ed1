use serde::Serialize;
use trip_features::FeatureVector;

// Request body is trip_features::PredictionRequest.

#[derive(Debug, Serialize, Clone)]
pub struct PredictionResponse {
    pub trip_id: String,
    /// Predicted trip duration in minutes.
    pub prediction: f64,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub features: usize,
}

/// Prediction plus the exact vector the model saw.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub value: f64,
    pub features: FeatureVector,
}
