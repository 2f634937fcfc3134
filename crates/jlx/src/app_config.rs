//! 🔧 App Configuration: the TOML-and-env-vars-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! Three tables, all optional, all with defaults that boot a working server:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:8000"
//!
//! [store]
//! region = "us-east-1"
//! # endpoint_url = "http://localhost:9000"   # MinIO, LocalStack, friends
//! force_path_style = false
//! max_attempts = 3
//!
//! [fetch]
//! decompress_gzip = false
//! ```
//!
//! Env vars use the `JLX_` prefix and `__` between table and key:
//! `JLX_SERVER__BIND_ADDRESS=127.0.0.1:9000`. The file wins on conflicts.
//!
//! 🔒 Caller credentials are NOT config. They arrive per request, in the body.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::S3StoreConfig;
use crate::consolidate::FetchConfig;
use crate::server::ServerConfig;

const ENV_PREFIX: &str = "JLX_";

/// 📦 Everything the service knows about itself before the first request.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// 🪣 How to reach S3 (or something wearing an S3 costume).
    #[serde(default)]
    pub store: S3StoreConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
}

/// 🚀 Load the config from `JLX_*` env vars, plus a TOML file when one is given.
///
/// - `None` → env vars only, defaults for the rest.
/// - `Some(path)` → env vars + TOML file, merged. TOML wins.
///
/// 💀 Errors when the merged result doesn't fit [`AppConfig`], with a message
/// naming where we looked.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables ({ENV_PREFIX}*). \
             The file exists in our hearts, but the schema disagrees.",
            path.display()
        ),
        None => format!(
            "💀 Failed to parse configuration from environment variables ({ENV_PREFIX}*). \
             No file was provided, so this one's all on the environment."
        ),
    };

    config.extract().context(context_msg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn a_config_file(contents: &str) -> NamedTempFile {
        let mut the_file = tempfile::Builder::new()
            .prefix("jlx_app_config_")
            .suffix(".toml")
            .tempfile()
            .expect("💀 temp dir said 'new phone who dis'");
        the_file
            .write_all(contents.as_bytes())
            .expect("💀 failed to write test config");
        the_file
    }

    #[test]
    fn the_one_where_every_table_is_filled_in() {
        let the_file = a_config_file(
            r#"
            [server]
            bind_address = "127.0.0.1:9999"

            [store]
            region = "eu-west-1"
            endpoint_url = "http://localhost:9000"
            force_path_style = true
            max_attempts = 5

            [fetch]
            decompress_gzip = true
            "#,
        );

        let the_config = load_config(Some(the_file.path()))
            .expect("💀 a complete config should parse");

        assert_eq!(the_config.server.bind_address, "127.0.0.1:9999");
        assert_eq!(
            the_config.store,
            S3StoreConfig {
                region: "eu-west-1".to_string(),
                endpoint_url: Some("http://localhost:9000".to_string()),
                force_path_style: true,
                max_attempts: 5,
            }
        );
        assert!(the_config.fetch.decompress_gzip);
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let the_file = a_config_file(
            r#"
            [store]
            endpoint_url = "http://minio:9000"
            "#,
        );

        // 🧪 file only, so stray JLX_* vars on the test machine can't sneak in
        let the_config: AppConfig = Figment::new()
            .merge(Toml::file(the_file.path()))
            .extract()
            .expect("💀 a sparse config should fill in its own blanks");

        assert_eq!(the_config.server, ServerConfig::default());
        assert_eq!(the_config.store.region, "us-east-1");
        assert_eq!(the_config.store.max_attempts, 3);
        assert!(!the_config.store.force_path_style);
        assert_eq!(the_config.store.endpoint_url.as_deref(), Some("http://minio:9000"));
        assert!(!the_config.fetch.decompress_gzip);
    }

    #[test]
    fn the_one_where_a_typo_in_a_type_is_a_loud_error() {
        let the_file = a_config_file(
            r#"
            [store]
            max_attempts = "lots"
            "#,
        );

        let the_error = load_config(Some(the_file.path()))
            .expect_err("💀 a string where a number goes should not parse");
        assert!(format!("{the_error:#}").contains("Failed to parse configuration from file"));
    }
}
