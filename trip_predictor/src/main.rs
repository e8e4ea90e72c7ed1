use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use trip_features::{FeatureEngine, PredictionRequest, SchemaCatalog, ZoneLookup};

mod config;
mod model;
mod service;
mod types;

use model::{Scorer, XgbModel};
use service::PredictionService;
use types::{HealthResponse, PredictionResponse};

type ApiError = (StatusCode, Json<serde_json::Value>);

// ---------- Handlers ----------

async fn predict(
    State(svc): State<Arc<PredictionService>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let prediction = svc.predict(&request).map_err(|e| {
        let status = if e.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(json!({ "error": e.to_string() })))
    })?;

    // Debug signal so we can confirm we're not sending all-zeros
    if tracing::enabled!(tracing::Level::DEBUG) {
        let v = prediction.features.values();
        let nz = v.iter().filter(|x| **x != 0.0).count();
        let sample: Vec<String> = prediction
            .features
            .iter()
            .take(6)
            .map(|(name, x)| format!("{}={:.3}", name, x))
            .collect();
        tracing::debug!(
            "trip={} in_dim={} nonzero={} sample=[{}] prediction={:.3}",
            request.trip_id,
            v.len(),
            nz,
            sample.join(", "),
            prediction.value
        );
    }

    Ok(Json(PredictionResponse {
        trip_id: request.trip_id,
        prediction: prediction.value,
    }))
}

async fn health(State(svc): State<Arc<PredictionService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        features: svc.engine().catalog().len(),
    })
}

fn app(svc: Arc<PredictionService>) -> Router {
    Router::new()
        .route("/api/v1/predict", post(predict))
        .route("/health", get(health))
        .with_state(svc)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = config::ServerConfig::from_env()?;
    tracing::info!("config: {:?}", cfg);

    let zones = ZoneLookup::from_csv(&cfg.zones_path)
        .with_context(|| format!("failed to load zones from {}", cfg.zones_path.display()))?;
    let catalog = SchemaCatalog::load(&cfg.schema_path, &cfg.target_column)?;
    let engine = FeatureEngine::new(Arc::new(zones), catalog)?;

    let mdl = XgbModel::load(&cfg.model_path)
        .with_context(|| format!("failed to load model {}", cfg.model_path.display()))?;
    mdl.check_schema(engine.catalog())?;

    // Warmup on an all-zero row so a broken model fails before serving
    let warm = mdl.predict(&vec![0.0; engine.catalog().len()])?;
    tracing::info!("warmup score ok ({:.3})", warm);
    tracing::info!(
        "serving {} features: {:?}",
        engine.catalog().len(),
        engine.catalog().columns()
    );

    let model: Arc<dyn Scorer> = Arc::new(mdl);
    let svc = Arc::new(PredictionService::new(Arc::new(engine), model));

    tracing::info!("listening on {}", cfg.bind_addr);
    let listener = tokio::net::TcpListener::bind(cfg.bind_addr).await?;
    axum::serve(listener, app(svc)).await?;
    Ok(())
}
