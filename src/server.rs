//! HTTP surface: a greeting on `/` and single-record predictions on `/predict`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::PredictionError;
use crate::model::PricePipeline;

pub const GREETING: &str = "Price model ready. Use POST /predict";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: f64,
}

pub fn router(pipeline: Arc<PricePipeline>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/predict", post(predict))
        .with_state(pipeline)
}

async fn home() -> &'static str {
    GREETING
}

async fn predict(
    State(pipeline): State<Arc<PricePipeline>>,
    Json(record): Json<Map<String, Value>>,
) -> Result<Json<PredictionResponse>, PredictionError> {
    let prediction = pipeline.predict_record(&record)?;
    debug!("Predicted {prediction} for {} fields", record.len());

    Ok(Json(PredictionResponse { prediction }))
}

pub async fn serve(addr: SocketAddr, pipeline: Arc<PricePipeline>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("Serving predictions on http://{addr}");

    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
