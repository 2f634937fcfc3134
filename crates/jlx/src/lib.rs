//! 🧺 jlx: S3 JSONL in, one reshaped JSON document out.
//!
//! 🎬 An ingestion tool dumps a folder of `.jsonl` files per stream into a
//! bucket. A dashboard wants one JSON object with a list per stream, in a
//! shape it can actually render. We are the bit in between.
//!
//! 🧠 Knowledge graph:
//! - [`backends`]: the object-store seam ([`backends::ObjectStore`]), S3 and in-memory
//! - [`consolidate`]: walk the bucket, parse the lines, group by stream
//! - [`transforms`]: per-stream reshaping rules, with a fall back to the raw records
//! - [`server`]: the axum surface, `GET /` and `POST /transform`
//! - [`app_config`]: figment-loaded `[server]`, `[store]`, `[fetch]`

use anyhow::Result;
use tracing::info;

pub mod app_config;
pub mod backends;
pub mod consolidate;
pub mod server;
pub mod transforms;

use crate::app_config::AppConfig;
use crate::backends::StoreConnector;
use crate::consolidate::Fetcher;
use crate::server::AppState;
use crate::transforms::Transformer;

/// 🚀 Wire config into a running server and block until Ctrl-C.
pub async fn run(app_config: AppConfig) -> Result<()> {
    info!(
        "🪣 Object store: region '{}', endpoint {}",
        app_config.store.region,
        app_config.store.endpoint_url.as_deref().unwrap_or("<aws default>")
    );

    let the_fetcher = Fetcher::new(StoreConnector::S3(app_config.store), app_config.fetch);
    let the_state = AppState::new(the_fetcher, Transformer::default());

    server::serve(&app_config.server, the_state).await?;

    info!("✅ Server stopped. Goodnight, bucket.");
    Ok(())
}
