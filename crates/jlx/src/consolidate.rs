//! 🧺 Consolidate: many small files in, one grouped document out.
//!
//! 🎬 COLD OPEN. INT. S3 BUCKET, TIME IS MEANINGLESS HERE.
//!
//! An ingestion tool has been busy. Under `vapormedia/` there is a folder per
//! stream (`commits/`, `projects/`, `users/`) and in each folder a pile of
//! `.jsonl` files, every line a record, most of them gift-wrapped in an
//! `_airbyte_data` envelope nobody asked for.
//!
//! The [`Fetcher`] walks that layout exactly once per request:
//!
//! ```text
//!   {base}/            ── delimiter listing ──▶  {base}/commits/, {base}/users/, ...
//!   {base}/commits/    ── flat listing ───────▶  a.jsonl, b.jsonl, notes.txt
//!   a.jsonl            ── get + parse ────────▶  [record, record, ...]
//! ```
//!
//! and files every record under its stream name, in listing order then line order.
//!
//! ## Failure tiers 💀
//! - Listing failures end the request ([`FetchError`]).
//! - A file that can't be read or parsed is skipped whole, logged, and noted in
//!   [`ConsolidatedData::skipped_files`]. Its siblings carry on.
//!
//! 🦆 The duck has read every line. The duck has opinions about line 2.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::backends::{ObjectStore, StoreConnector, StoreError};

pub mod jsonl;

pub use jsonl::{ENVELOPE_KEY, unwrap_envelope};

// 📂 S3 has no folders. It has a slash and a dream.
const DELIMITER: &str = "/";
const JSONL_SUFFIX: &str = ".jsonl";
const GZIPPED_JSONL_SUFFIX: &str = ".jsonl.gz";

// ============================================================
//  📦 Data model
// ============================================================

/// 🔑 Where to look and whose keys to look with. Arrives in the request body.
#[derive(Clone, Deserialize)]
pub struct BucketConfig {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    pub s3_bucket_name: String,
    /// 📂 Base path inside the bucket where the stream folders live.
    pub s3_bucket_path: String,
}

// 🔒 The secret stays secret, even in a Debug dump at 3am.
impl std::fmt::Debug for BucketConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketConfig")
            .field("aws_access_key_id", &self.aws_access_key_id)
            .field("aws_secret_access_key", &"<redacted>")
            .field("s3_bucket_name", &self.s3_bucket_name)
            .field("s3_bucket_path", &self.s3_bucket_path)
            .finish()
    }
}

impl BucketConfig {
    /// 📂 The base path without trailing slashes. `"vapormedia/"` and `"vapormedia"` are the same place.
    pub fn base_path(&self) -> &str {
        self.s3_bucket_path.trim_end_matches(DELIMITER)
    }

    fn has_credentials(&self) -> bool {
        !self.aws_access_key_id.trim().is_empty() && !self.aws_secret_access_key.trim().is_empty()
    }
}

/// 🗑️ A file that didn't make it, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub stream: String,
    pub key: String,
    pub reason: String,
}

/// 🧺 Every stream's records, grouped, ordered, and ready for reshaping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidatedData {
    /// stream name → records, in listing order then line order
    pub streams: BTreeMap<String, Vec<Value>>,
    /// files dropped by read/parse failures; logged, never returned to callers
    pub skipped_files: Vec<SkippedFile>,
}

impl ConsolidatedData {
    pub fn record_count(&self) -> usize {
        self.streams.values().map(Vec::len).sum()
    }

    /// 🔄 The streams as one JSON object: `{"commits": [...], "users": [...]}`.
    pub fn into_document(self) -> Map<String, Value> {
        self.streams
            .into_iter()
            .map(|(the_stream, the_records)| (the_stream, Value::Array(the_records)))
            .collect()
    }
}

// ============================================================
//  💀 Errors that end the request
// ============================================================

/// 💀 Fetch failures that abort the whole request. File-level trouble never lands here.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("AWS credentials not found or invalid.")]
    MissingCredentials,
    #[error("AWS credentials were rejected: {0}")]
    InvalidCredentials(String),
    #[error("S3 bucket '{bucket}' not found.")]
    BucketNotFound { bucket: String },
    #[error("No stream directories found under the path '{path}/' in bucket '{bucket}'.")]
    NoPartitionsFound { bucket: String, path: String },
    #[error("An S3 client error occurred: {0}")]
    Store(#[source] StoreError),
    #[error("An unexpected error occurred during S3 connection: {0}")]
    Unexpected(String),
}

impl FetchError {
    fn from_listing(err: StoreError, bucket: &str) -> Self {
        match err {
            StoreError::InvalidCredentials(the_details) => FetchError::InvalidCredentials(the_details),
            StoreError::NoSuchBucket(_) => FetchError::BucketNotFound {
                bucket: bucket.to_string(),
            },
            other => FetchError::Store(other),
        }
    }
}

// ============================================================
//  🔧 FetchConfig + Fetcher
// ============================================================

/// 🔧 Fetch behaviour knobs, from the `[fetch]` table of the app config.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct FetchConfig {
    /// 🫁 Also read `.jsonl.gz` objects, gunzipping them first. Off by default: only `.jsonl` counts.
    #[serde(default)]
    pub decompress_gzip: bool,
}

impl FetchConfig {
    fn wants(&self, key: &str) -> bool {
        key.ends_with(JSONL_SUFFIX) || (self.decompress_gzip && key.ends_with(GZIPPED_JSONL_SUFFIX))
    }
}

/// 🧺 Connects with the caller's credentials and consolidates their bucket.
#[derive(Debug, Clone)]
pub struct Fetcher {
    connector: StoreConnector,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(connector: StoreConnector, config: FetchConfig) -> Self {
        Self { connector, config }
    }

    /// 🚀 Connect, discover streams, read every file, group the records.
    ///
    /// # Errors
    /// 💀 Missing or rejected credentials, a missing bucket, an empty base path,
    /// or a listing call that blew up. Broken files are NOT errors; see
    /// [`ConsolidatedData::skipped_files`].
    pub async fn fetch(&self, bucket: &BucketConfig) -> Result<ConsolidatedData, FetchError> {
        if !bucket.has_credentials() {
            return Err(FetchError::MissingCredentials);
        }

        info!("🔧 Opening object store for bucket '{}'", bucket.s3_bucket_name);
        let the_store = self
            .connector
            .connect(&bucket.aws_access_key_id, &bucket.aws_secret_access_key)
            .await
            .map_err(|err| match err {
                StoreError::InvalidCredentials(the_details) => {
                    FetchError::InvalidCredentials(the_details)
                }
                other => FetchError::Unexpected(other.to_string()),
            })?;

        consolidate(&the_store, &bucket.s3_bucket_name, bucket.base_path(), &self.config).await
    }
}

/// 📂 `"base/commits/"` → `"commits"`. The segment right before the trailing slash.
pub fn stream_name_of(prefix: &str) -> &str {
    let the_folder = prefix.strip_suffix(DELIMITER).unwrap_or(prefix);
    the_folder.rsplit(DELIMITER).next().unwrap_or(the_folder)
}

/// 🧺 The store-agnostic half of [`Fetcher::fetch`]: walk `base_path` and group records by stream.
pub async fn consolidate<S>(
    store: &S,
    bucket: &str,
    base_path: &str,
    config: &FetchConfig,
) -> Result<ConsolidatedData, FetchError>
where
    S: ObjectStore + ?Sized,
{
    let the_root = format!("{base_path}{DELIMITER}");
    let the_prefixes = store
        .list_common_prefixes(bucket, &the_root, DELIMITER)
        .await
        .map_err(|err| FetchError::from_listing(err, bucket))?;

    if the_prefixes.is_empty() {
        return Err(FetchError::NoPartitionsFound {
            bucket: bucket.to_string(),
            path: base_path.to_string(),
        });
    }

    info!(
        "📂 Found stream directories: {:?}",
        the_prefixes.iter().map(|p| stream_name_of(p)).collect::<Vec<_>>()
    );

    let mut the_data = ConsolidatedData::default();
    for the_prefix in &the_prefixes {
        let the_stream = stream_name_of(the_prefix).to_string();
        info!("🔄 Processing stream: {}", the_stream);

        let the_keys = store
            .list_keys(bucket, the_prefix)
            .await
            .map_err(|err| FetchError::from_listing(err, bucket))?;

        // 📦 present even if nothing below fills it; empty streams are still streams
        let mut the_records = the_data.streams.remove(&the_stream).unwrap_or_default();
        if the_keys.is_empty() {
            debug!("📭 No files found in '{}'", the_prefix);
        }

        for the_key in the_keys {
            if !config.wants(&the_key) {
                debug!("🙈 Ignoring non-JSONL object '{}'", the_key);
                continue;
            }

            debug!("📖 Reading file: {}", the_key);
            match read_file(store, bucket, &the_key).await {
                Ok(mut the_file_records) => the_records.append(&mut the_file_records),
                Err(the_reason) => {
                    warn!("⚠️ Failed to process file {}: {}", the_key, the_reason);
                    the_data.skipped_files.push(SkippedFile {
                        stream: the_stream.clone(),
                        key: the_key,
                        reason: the_reason,
                    });
                }
            }
        }

        the_data.streams.insert(the_stream, the_records);
    }

    Ok(the_data)
}

// 📖 One file, all or nothing. The error is already a sentence for the logs.
async fn read_file<S>(store: &S, bucket: &str, key: &str) -> Result<Vec<Value>, String>
where
    S: ObjectStore + ?Sized,
{
    let the_bytes = store
        .get_object(bucket, key)
        .await
        .map_err(|err| err.to_string())?;
    let the_bytes = if key.ends_with(GZIPPED_JSONL_SUFFIX) {
        jsonl::gunzip(&the_bytes).map_err(|err| format!("{err:#}"))?
    } else {
        the_bytes
    };
    jsonl::parse_records(&the_bytes).map_err(|err| format!("{err:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::InMemoryStore;
    use serde_json::json;

    const BUCKET: &str = "airbyte-out";

    fn a_bucket_config(path: &str) -> BucketConfig {
        BucketConfig {
            aws_access_key_id: "AKIA".to_string(),
            aws_secret_access_key: "shh".to_string(),
            s3_bucket_name: BUCKET.to_string(),
            s3_bucket_path: path.to_string(),
        }
    }

    #[test]
    fn the_one_where_stream_names_come_from_the_last_folder() {
        assert_eq!(stream_name_of("vapormedia/commits/"), "commits");
        assert_eq!(stream_name_of("a/b/c/projects/"), "projects");
        assert_eq!(stream_name_of("users/"), "users");
    }

    #[test]
    fn the_one_where_the_secret_never_shows_up_in_debug_output() {
        let the_dump = format!("{:?}", a_bucket_config("base"));
        assert!(!the_dump.contains("shh"));
        assert!(the_dump.contains("<redacted>"));
    }

    #[test]
    fn the_one_where_trailing_slashes_on_the_base_path_are_forgiven() {
        assert_eq!(a_bucket_config("vapormedia/").base_path(), "vapormedia");
        assert_eq!(a_bucket_config("vapormedia").base_path(), "vapormedia");
    }

    #[tokio::test]
    async fn the_one_where_envelopes_are_opened_and_empty_streams_still_show_up() {
        let the_store = InMemoryStore::new()
            .with_object(
                BUCKET,
                "data/commits/part-0.jsonl",
                "{\"_airbyte_ab_id\":\"x\",\"_airbyte_data\":{\"id\":\"abc\"}}\n{\"id\":\"def\"}\n",
            )
            .with_object(BUCKET, "data/empty_stream/", "");

        let the_data = consolidate(&the_store, BUCKET, "data", &FetchConfig::default())
            .await
            .expect("💀 a healthy bucket should consolidate");

        assert_eq!(
            Value::Object(the_data.into_document()),
            json!({
                "commits": [{"id": "abc"}, {"id": "def"}],
                "empty_stream": []
            })
        );
    }

    #[tokio::test]
    async fn the_one_where_records_keep_listing_order_then_line_order() {
        let the_store = InMemoryStore::new()
            .with_object(BUCKET, "data/users/b.jsonl", "{\"n\":3}\n{\"n\":4}\n")
            .with_object(BUCKET, "data/users/a.jsonl", "{\"n\":1}\n{\"n\":2}\n")
            .with_object(BUCKET, "data/users/readme.md", "# not data")
            .with_page_size(1);

        let the_data = consolidate(&the_store, BUCKET, "data", &FetchConfig::default())
            .await
            .expect("💀 should consolidate");

        assert_eq!(
            the_data.streams["users"],
            vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3}), json!({"n": 4})]
        );
        assert_eq!(the_data.record_count(), 4);
        assert!(the_data.skipped_files.is_empty());
    }

    #[tokio::test]
    async fn the_one_where_a_bad_second_line_costs_the_whole_file_but_nothing_else() {
        let the_store = InMemoryStore::new()
            .with_object(BUCKET, "data/commits/a.jsonl", "{\"id\":1}\n{oops\n{\"id\":3}\n")
            .with_object(BUCKET, "data/commits/b.jsonl", "{\"id\":4}\n")
            .with_object(BUCKET, "data/users/u.jsonl", "{\"id\":9}\n")
            .with_object(BUCKET, "data/users/v.jsonl", "{\"id\":10}\n")
            .with_unreadable_key("data/users/v.jsonl");

        let the_data = consolidate(&the_store, BUCKET, "data", &FetchConfig::default())
            .await
            .expect("💀 file failures must not fail the fetch");

        // 💀 a.jsonl contributed nothing, not even its good first line
        assert_eq!(the_data.streams["commits"], vec![json!({"id": 4})]);
        assert_eq!(the_data.streams["users"], vec![json!({"id": 9})]);

        let the_skipped_keys: Vec<&str> =
            the_data.skipped_files.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(the_skipped_keys, vec!["data/commits/a.jsonl", "data/users/v.jsonl"]);
        assert!(the_data.skipped_files[0].reason.contains("line 2"));
    }

    #[tokio::test]
    async fn the_one_where_nothing_lives_under_the_base_path() {
        let the_store = InMemoryStore::new().with_object(BUCKET, "other/commits/a.jsonl", "{}");

        match consolidate(&the_store, BUCKET, "data", &FetchConfig::default()).await {
            Err(err @ FetchError::NoPartitionsFound { .. }) => {
                let the_message = err.to_string();
                assert!(the_message.contains("'data/'"), "got: {the_message}");
                assert!(the_message.contains(BUCKET), "got: {the_message}");
            }
            honestly_who_knows => panic!("💀 expected NoPartitionsFound, got {:?}", honestly_who_knows),
        }
    }

    #[tokio::test]
    async fn the_one_where_gzip_files_only_count_when_invited() {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        use std::io::Write;

        let mut the_encoder = GzEncoder::new(Vec::new(), Compression::default());
        the_encoder
            .write_all(b"{\"id\":42}\n")
            .expect("💀 writing to a Vec should not fail");
        let the_squished = the_encoder.finish().expect("💀 finishing a gzip stream into a Vec");

        let the_store = InMemoryStore::new()
            .with_object(BUCKET, "data/projects/p.jsonl.gz", the_squished);

        let the_default = consolidate(&the_store, BUCKET, "data", &FetchConfig::default())
            .await
            .expect("💀 should consolidate");
        assert_eq!(the_default.streams["projects"], Vec::<Value>::new());

        let the_invited = consolidate(
            &the_store,
            BUCKET,
            "data",
            &FetchConfig {
                decompress_gzip: true,
            },
        )
        .await
        .expect("💀 should consolidate");
        assert_eq!(the_invited.streams["projects"], vec![json!({"id": 42})]);
    }

    #[tokio::test]
    async fn the_one_where_the_fetcher_sorts_store_errors_into_the_right_drawer() {
        let the_fetcher = Fetcher::new(
            StoreConnector::InMemory(
                InMemoryStore::new()
                    .with_bucket(BUCKET)
                    .with_credentials("AKIA", "shh"),
            ),
            FetchConfig::default(),
        );

        let mut the_config = a_bucket_config("data");
        the_config.aws_secret_access_key = "  ".to_string();
        assert!(matches!(
            the_fetcher.fetch(&the_config).await,
            Err(FetchError::MissingCredentials)
        ));

        the_config.aws_secret_access_key = "wrong".to_string();
        assert!(matches!(
            the_fetcher.fetch(&the_config).await,
            Err(FetchError::InvalidCredentials(_))
        ));

        let mut the_config = a_bucket_config("data");
        the_config.s3_bucket_name = "ghost".to_string();
        match the_fetcher.fetch(&the_config).await {
            Err(FetchError::BucketNotFound { bucket }) => assert_eq!(bucket, "ghost"),
            honestly_who_knows => panic!("💀 expected BucketNotFound, got {:?}", honestly_who_knows),
        }

        assert!(matches!(
            the_fetcher.fetch(&a_bucket_config("data")).await,
            Err(FetchError::NoPartitionsFound { .. })
        ));
    }
}
