use serde::Serialize;
use tracing::info;

use crate::reconcile::FeatureVector;

/// Bump when the audit line layout changes; monitoring parses these lines.
pub const AUDIT_VERSION: u32 = 1;

/// Structured record logged for every online prediction.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionAudit<'a> {
    pub extracted_features: &'a FeatureVector,
    pub prediction: f64,
    pub trip_id: &'a str,
    pub audit_version: u32,
}

impl<'a> PredictionAudit<'a> {
    pub fn new(features: &'a FeatureVector, prediction: f64, trip_id: &'a str) -> Self {
        Self {
            extracted_features: features,
            prediction,
            trip_id,
            audit_version: AUDIT_VERSION,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Logs `prediction_result: <json>` on the audit target.
    pub fn emit(&self) -> serde_json::Result<()> {
        let line = self.to_json()?;
        info!(target: "trip_predictor::audit", "prediction_result: {}", line);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{reconcile, FeatureRecord};
    use crate::schema::SchemaCatalog;

    #[test]
    fn audit_line_layout() {
        let catalog = SchemaCatalog::from_header(["trip_distance", "pickup_hour"], "trip_time").unwrap();
        let mut rec = FeatureRecord::new();
        rec.set("trip_distance", 1.5);
        rec.set("pickup_hour", 8_u32);
        let features = reconcile(&rec, &catalog).unwrap();
        let json = PredictionAudit::new(&features, 12.25, "trip-7").to_json().unwrap();
        assert_eq!(
            json,
            r#"{"extracted_features":{"trip_distance":1.5,"pickup_hour":8.0},"prediction":12.25,"trip_id":"trip-7","audit_version":1}"#
        );
    }
}
