use anyhow::{Context, Result};
use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub model_path: PathBuf,
    pub zones_path: PathBuf,
    pub schema_path: PathBuf,
    pub target_column: String,
    pub bind_addr: SocketAddr,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let bind = env_or("BIND_ADDR", "0.0.0.0:8000");
        Ok(Self {
            model_path: env_or("MODEL_PATH", "models/xgb.json").into(),
            zones_path: env_or("ZONES_PATH", "data/zones.csv").into(),
            schema_path: env_or("SCHEMA_PATH", "data/test.csv").into(),
            target_column: env_or("TARGET_COLUMN", "trip_time"),
            bind_addr: bind
                .parse()
                .with_context(|| format!("BIND_ADDR {:?} is not a socket address", bind))?,
        })
    }
}
