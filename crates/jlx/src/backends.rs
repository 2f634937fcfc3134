//! 🔌 Backends: where the bytes actually live.
//!
//! 🪣 Somewhere out there is a bucket. In that bucket is a prefix. Under that
//! prefix are folders that aren't really folders, full of `.jsonl` files that
//! an ingestion tool dropped off at 3am and never called back about.
//!
//! This module is the casting agency for object stores. The consolidator only
//! ever asks three questions of a store:
//!
//! 1. "What folders live directly under this prefix?" (`list_common_prefixes`)
//! 2. "What keys live under this folder?" (`list_keys`)
//! 3. "Give me the bytes for this key." (`get_object`)
//!
//! Pagination is the store's problem, not the caller's. Every listing returns
//! the whole answer, however many pages it took to get there.
//!
//! 🧠 Knowledge graph:
//! - Trait: [`ObjectStore`] (three capabilities, nothing more)
//! - Impls: [`S3Store`] (aws-sdk-s3), [`InMemoryStore`] (test-only; the binary always wires S3)
//! - Enum dispatch: [`StoreBackend`], same trick as a universal remote
//! - Per-request wiring: [`StoreConnector`] turns request credentials into a backend
//!
//! 🦆 The duck is here because every file must have one. This is law.

use async_trait::async_trait;

pub mod in_mem;
pub mod s3;

pub use in_mem::InMemoryStore;
pub use s3::{S3Store, S3StoreConfig};

// ===== Errors =====

/// 💀 The ways an object store can let us down, sorted by who to blame.
///
/// The fetcher maps these onto its own taxonomy. Listing errors are fatal to
/// the request; read errors just cost us one file.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 🔒 The store looked at our keys and said "new phone who dis".
    #[error("credentials were rejected by the object store: {0}")]
    InvalidCredentials(String),
    /// 🪣 The bucket is not there. It may never have been there.
    #[error("bucket '{0}' does not exist")]
    NoSuchBucket(String),
    /// 🗝️ The key vanished between listing it and reading it. Or it never existed.
    #[error("object '{0}' does not exist")]
    NoSuchKey(String),
    /// 🤷 Everything else: transport, throttling, cosmic rays.
    #[error("{0:#}")]
    Other(anyhow::Error),
}

// ===== ObjectStore Trait and Backend Enum =====

/// 🪣 A credential-scoped view of an object store.
///
/// # Contract
/// - Listing calls follow pagination to the end and return everything, in the
///   order the store listed it.
/// - `list_common_prefixes` is one level deep: it returns each prefix up to and
///   including the first `delimiter` after `prefix`, never deeper.
/// - `get_object` returns the raw bytes. Decoding is the caller's business.
#[async_trait]
pub trait ObjectStore: std::fmt::Debug + Send + Sync {
    /// 📂 Directory-like prefixes directly under `prefix`, each ending in `delimiter`.
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError>;

    /// 📜 Every key under `prefix`, flat, no delimiter games.
    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError>;

    /// 📦 The object body, all of it.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError>;
}

/// 🎭 The many faces of an object store.
///
/// Callers hold a `StoreBackend` and never need to know whether the bytes come
/// from us-east-1 or from a `BTreeMap` that will be dropped at the end of a test.
#[derive(Debug)]
pub enum StoreBackend {
    S3(S3Store),
    InMemory(InMemoryStore),
}

#[async_trait]
impl ObjectStore for StoreBackend {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError> {
        match self {
            StoreBackend::S3(store) => store.list_common_prefixes(bucket, prefix, delimiter).await,
            StoreBackend::InMemory(store) => {
                store.list_common_prefixes(bucket, prefix, delimiter).await
            }
        }
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        match self {
            StoreBackend::S3(store) => store.list_keys(bucket, prefix).await,
            StoreBackend::InMemory(store) => store.list_keys(bucket, prefix).await,
        }
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        match self {
            StoreBackend::S3(store) => store.get_object(bucket, key).await,
            StoreBackend::InMemory(store) => store.get_object(bucket, key).await,
        }
    }
}

// ===== Connector =====

/// 🔑 Turns per-request credentials into a ready-to-use [`StoreBackend`].
///
/// Credentials arrive in the request body, so there is no long-lived client.
/// The connector holds the static half of the wiring (region, endpoint, or a
/// seeded in-memory store) and mints a fresh backend per request.
#[derive(Debug, Clone)]
pub enum StoreConnector {
    /// 🪣 What `jlx::run` wires up. The only connector the binary ever builds.
    S3(S3StoreConfig),
    /// 🧪 Test-only: a pre-seeded bucket for router and fetcher tests. No config switch reaches it.
    InMemory(InMemoryStore),
}

impl StoreConnector {
    /// 🚀 Open a backend scoped to the given credentials.
    pub async fn connect(
        &self,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<StoreBackend, StoreError> {
        match self {
            StoreConnector::S3(config) => Ok(StoreBackend::S3(
                S3Store::connect(config, access_key_id, secret_access_key).await,
            )),
            StoreConnector::InMemory(store) => {
                store.check_credentials(access_key_id, secret_access_key)?;
                Ok(StoreBackend::InMemory(store.clone()))
            }
        }
    }
}
