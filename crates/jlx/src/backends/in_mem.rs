//! # Previously, on jlx...
//!
//! 🎬 The bucket was too far away. us-east-1 was a plane ride for the bytes,
//! the CI runner had no credentials, and the test suite was getting impatient.
//! Someone had to build a bucket so simple it lives entirely in RAM, gone the
//! moment you blink.
//!
//! That someone was this module.
//!
//! [`InMemoryStore`] behaves like S3 where it matters to us: keys are listed in
//! lexicographic order, delimiter listings collapse keys into common prefixes,
//! and every listing is served in pages of `page_size` so the pagination loop
//! actually loops. It can also be told that certain keys are cursed, so reads
//! of those keys fail the way a flaky network would.
//!
//! 🧪 Test-only. The server binary never builds one; tests hand it to
//! `StoreConnector::InMemory` directly.
//!
//! ✅ No network calls. No disk I/O. Just vibes and heap memory. 🦆

use std::collections::{BTreeMap, BTreeSet};

use anyhow::anyhow;
use async_trait::async_trait;
use tracing::trace;

use crate::backends::{ObjectStore, StoreError};

// 📄 S3 hands out 1000 keys per page. We are more frugal, so pagination shows up in tests.
const DEFAULT_PAGE_SIZE: usize = 2;

/// 🪣 A bucket-shaped `BTreeMap`. Cloned per request; the data is tiny, the tests are fast.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    // bucket -> key -> body
    buckets: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
    // 💀 keys whose reads fail on purpose
    cursed_keys: BTreeSet<String>,
    // 🔒 if set, only this (access key id, secret) pair gets in
    credentials: Option<(String, String)>,
    page_size: usize,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            buckets: BTreeMap::new(),
            cursed_keys: BTreeSet::new(),
            credentials: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl InMemoryStore {
    /// 🚀 An empty store. No buckets. No opinions.
    pub fn new() -> Self {
        Self::default()
    }

    /// 📦 Put an object, creating the bucket if this is its first tenant.
    pub fn with_object(mut self, bucket: &str, key: &str, body: impl Into<Vec<u8>>) -> Self {
        self.buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), body.into());
        self
    }

    /// 🪣 An empty bucket. Exists, technically. Contains nothing, emotionally.
    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.buckets.entry(bucket.to_string()).or_default();
        self
    }

    /// 💀 Make reads of `key` fail, like a packet dropped in the worst possible place.
    pub fn with_unreadable_key(mut self, key: &str) -> Self {
        self.cursed_keys.insert(key.to_string());
        self
    }

    /// 🔒 Only accept this credential pair in [`check_credentials`](Self::check_credentials).
    pub fn with_credentials(mut self, access_key_id: &str, secret_access_key: &str) -> Self {
        self.credentials = Some((access_key_id.to_string(), secret_access_key.to_string()));
        self
    }

    /// 📄 Listing page size. Zero is bumped to one; an infinite loop is not a feature.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub(crate) fn check_credentials(
        &self,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Result<(), StoreError> {
        match &self.credentials {
            Some((expected_id, expected_secret))
                if expected_id != access_key_id || expected_secret != secret_access_key =>
            {
                Err(StoreError::InvalidCredentials(format!(
                    "access key '{access_key_id}' is not known to this store"
                )))
            }
            _ => Ok(()),
        }
    }

    fn bucket(&self, bucket: &str) -> Result<&BTreeMap<String, Vec<u8>>, StoreError> {
        self.buckets
            .get(bucket)
            .ok_or_else(|| StoreError::NoSuchBucket(bucket.to_string()))
    }

    // 📄 Walk the listing one page at a time, the way a paginator would.
    fn paginate(&self, listing: Vec<String>, what: &str) -> Vec<String> {
        let mut collected = Vec::with_capacity(listing.len());
        for (page_number, page) in listing.chunks(self.page_size).enumerate() {
            trace!(
                "📄 in-memory {} page {} carried {} entries",
                what,
                page_number + 1,
                page.len()
            );
            collected.extend_from_slice(page);
        }
        collected
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError> {
        // 🧮 A BTreeSet keeps prefixes sorted and unique, which is exactly what S3 promises.
        let the_prefixes: BTreeSet<String> = self
            .bucket(bucket)?
            .keys()
            .filter_map(|key| {
                let rest = key.strip_prefix(prefix)?;
                let cut = rest.find(delimiter)?;
                Some(format!("{}{}", prefix, &rest[..cut + delimiter.len()]))
            })
            .collect();
        Ok(self.paginate(the_prefixes.into_iter().collect(), "prefix"))
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let the_keys: Vec<String> = self
            .bucket(bucket)?
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        Ok(self.paginate(the_keys, "key"))
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        if self.cursed_keys.contains(key) {
            return Err(StoreError::Other(anyhow!(
                "💀 simulated read failure for '{key}'. The bytes were right there. Then they weren't."
            )));
        }
        self.bucket(bucket)?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NoSuchKey(key.to_string()))
    }
}
