//! 🌐 Server: the front desk. Takes a bucket, hands back a document.
//!
//! 🎬 *[a POST request walks into a bar]*
//! *["One consolidated JSON document, please. Here are my AWS keys."]*
//! *[the bartender squints at the keys, walks to the back, comes out 40 files later]*
//!
//! Two routes, no drama:
//! - `GET /`: `{"status":"OK"}`, for load balancers and the anxious.
//! - `POST /transform`: fetch → consolidate → reshape → respond.
//!
//! 🧠 Knowledge graph:
//! - State: [`AppState`] holds the [`Fetcher`] and the [`Transformer`] behind `Arc`s;
//!   both are read-only, requests share nothing mutable
//! - Errors: [`ApiError`] owns the status-code mapping
//! - Logging: `TraceLayer` for the HTTP envelope, `tracing` macros for the rest

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::consolidate::{BucketConfig, Fetcher};
use crate::transforms::Transformer;

pub mod error;

pub use error::ApiError;

// ============================================================
//  🔧 ServerConfig
// ============================================================

/// 🔧 Where to listen. From the `[server]` table (or `JLX_SERVER__*`).
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

fn default_bind_address() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

// ============================================================
//  📦 AppState + router
// ============================================================

/// 📦 Everything a request needs, none of it mutable.
#[derive(Debug, Clone)]
pub struct AppState {
    fetcher: Arc<Fetcher>,
    transformer: Arc<Transformer>,
}

impl AppState {
    pub fn new(fetcher: Fetcher, transformer: Transformer) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            transformer: Arc::new(transformer),
        }
    }
}

/// 🗺️ The whole HTTP surface.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/transform", post(transform))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({"status": "OK"}))
}

/// 🔄 Fetch the caller's bucket, reshape it, send it back.
async fn transform(
    State(state): State<AppState>,
    body: Result<Json<BucketConfig>, JsonRejection>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    // 📨 A body that doesn't parse still gets a `{"detail": ...}` answer.
    let Json(request) = body.map_err(|rejection| ApiError::InvalidRequest(rejection.body_text()))?;

    if request.s3_bucket_name.trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "s3_bucket_name must not be empty.".to_string(),
        ));
    }
    if request.base_path().trim().is_empty() {
        return Err(ApiError::InvalidRequest(
            "s3_bucket_path must not be empty.".to_string(),
        ));
    }

    let the_consolidated = state.fetcher.fetch(&request).await?;

    info!(
        "📦 Consolidated {} records across {} streams from s3://{}/{}",
        the_consolidated.record_count(),
        the_consolidated.streams.len(),
        request.s3_bucket_name,
        request.base_path()
    );
    if !the_consolidated.skipped_files.is_empty() {
        warn!(
            "⚠️ {} file(s) were skipped and contributed no records: {:?}",
            the_consolidated.skipped_files.len(),
            the_consolidated
                .skipped_files
                .iter()
                .map(|skipped| skipped.key.as_str())
                .collect::<Vec<_>>()
        );
    }

    Ok(Json(state.transformer.apply(the_consolidated.into_document())))
}

// ============================================================
//  🚀 serve
// ============================================================

/// 🚀 Bind, serve, and bow out gracefully on Ctrl-C.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let the_listener = tokio::net::TcpListener::bind(config.bind_address.as_str())
        .await
        .context(format!(
            "💀 Could not bind to '{}'. Something else is sitting in our chair, \
             or the address is not an address.",
            config.bind_address
        ))?;

    info!(
        "🚀 Listening on {}",
        the_listener
            .local_addr()
            .context("💀 The listener bound, then forgot where it lives.")?
    );

    axum::serve(the_listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("💀 The server stopped serving, and not because we asked it to.")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("⚠️ Could not listen for Ctrl-C ({}); shutting down now", err);
        return;
    }
    info!("🛑 Ctrl-C received, draining in-flight requests");
}
