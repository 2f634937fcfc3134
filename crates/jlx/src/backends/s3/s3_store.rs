//! 🪣📡🏗️ S3 Store: listing folders that aren't folders, one page at a time.
//!
//! COLD OPEN. EXT. DATA CENTER, 3:47 AM.
//!
//! A request arrives with an access key in its hand and a bucket name on its
//! lips. "I need every stream under `vapormedia/`," it whispers. The S3Store
//! builds a client just for this caller, pages through ListObjectsV2 until
//! `IsTruncated` finally says false, and hands the answer back.
//!
//! 🧠 Knowledge graph:
//! - `S3StoreConfig`: region, optional endpoint override, path style, retry attempts
//! - `S3Store`: one `aws_sdk_s3::Client` per request, built from request credentials
//! - Listing: `list_objects_v2().into_paginator()`, collected until exhausted
//! - Reads: `GetObject` then `ByteStream::collect()`; the files are small, we read them whole
//! - S3 error codes → `StoreError`: `NoSuchBucket`, `NoSuchKey`, bad keys, and the rest

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backends::{ObjectStore, StoreError};

// 🏷️ Shows up in the SDK's credential provider name. Honest about where the keys came from.
const CREDENTIALS_PROVIDER_NAME: &str = "jlx-request-body";

// ============================================================
//  🔧 S3StoreConfig: knobs that don't change between requests
// ============================================================

/// 🔧 Static S3 settings. Credentials are NOT here; they arrive with every request.
///
/// KNOWLEDGE GRAPH: config lives co-located with the backend that uses it.
/// Loaded from the `[store]` table of the app config (or `JLX_STORE__*` env vars).
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct S3StoreConfig {
    /// 🌎 AWS region. Defaults to us-east-1 because that's where data goes to retire.
    #[serde(default = "default_s3_region")]
    pub region: String,
    /// 🧭 Endpoint override for S3-compatible stores (MinIO, LocalStack, a wiremock in a test).
    #[serde(default)]
    pub endpoint_url: Option<String>,
    /// 🛣️ `https://host/bucket/key` instead of `https://bucket.host/key`. MinIO likes this.
    #[serde(default)]
    pub force_path_style: bool,
    /// 🔄 Total attempts per S3 call, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for S3StoreConfig {
    fn default() -> Self {
        Self {
            region: default_s3_region(),
            endpoint_url: None,
            force_path_style: false,
            max_attempts: default_max_attempts(),
        }
    }
}

// ============================================================
//  🪣 S3Store
// ============================================================

/// 🪣 An S3 client scoped to one caller's credentials.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
}

impl S3Store {
    /// 🚀 Build a client from static config plus the caller's keys.
    ///
    /// Nothing goes over the wire here. Bad keys are discovered on the first
    /// listing call, where S3 gets to tell us about them in its own words.
    pub async fn connect(
        config: &S3StoreConfig,
        access_key_id: &str,
        secret_access_key: &str,
    ) -> Self {
        let the_credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER_NAME,
        );

        let mut the_loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(the_credentials)
            .retry_config(RetryConfig::standard().with_max_attempts(config.max_attempts.max(1)));
        if let Some(ref the_endpoint) = config.endpoint_url {
            the_loader = the_loader.endpoint_url(the_endpoint);
        }
        let the_sdk_config = the_loader.load().await;

        let the_s3_config = aws_sdk_s3::config::Builder::from(&the_sdk_config)
            .force_path_style(config.force_path_style)
            .build();

        debug!(
            "🔧 S3 client ready: region={}, endpoint={:?}, path_style={}",
            config.region, config.endpoint_url, config.force_path_style
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(the_s3_config),
        }
    }
}

/// 🕵️ Sort an SDK error into the bucket (heh) it belongs in.
///
/// S3 error codes are the only reliable signal; HTTP status alone can't tell
/// a missing bucket from a missing key.
fn classify<E>(err: SdkError<E, HttpResponse>, bucket: &str, key: Option<&str>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let the_code = err
        .as_service_error()
        .and_then(|service_err| service_err.code())
        .map(str::to_owned);

    match the_code.as_deref() {
        Some("NoSuchBucket") => StoreError::NoSuchBucket(bucket.to_string()),
        Some("NoSuchKey") => StoreError::NoSuchKey(key.unwrap_or_default().to_string()),
        Some("InvalidAccessKeyId") | Some("SignatureDoesNotMatch") => {
            StoreError::InvalidCredentials(DisplayErrorContext(&err).to_string())
        }
        _ => StoreError::Other(anyhow::Error::new(err)),
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_common_prefixes(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: &str,
    ) -> Result<Vec<String>, StoreError> {
        let mut the_pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .delimiter(delimiter)
            .into_paginator()
            .send();

        let mut the_prefixes = Vec::new();
        let mut the_page_number = 0usize;
        while let Some(page) = the_pages.next().await {
            let page = page.map_err(|err| classify(err, bucket, None))?;
            the_page_number += 1;
            trace!(
                "📄 s3://{}/{} prefix page {} carried {} common prefixes",
                bucket,
                prefix,
                the_page_number,
                page.common_prefixes().len()
            );
            the_prefixes.extend(
                page.common_prefixes()
                    .iter()
                    .filter_map(|common| common.prefix())
                    .map(str::to_owned),
            );
        }
        Ok(the_prefixes)
    }

    async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut the_pages = self
            .client
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .into_paginator()
            .send();

        let mut the_keys = Vec::new();
        let mut the_page_number = 0usize;
        while let Some(page) = the_pages.next().await {
            let page = page.map_err(|err| classify(err, bucket, None))?;
            the_page_number += 1;
            trace!(
                "📄 s3://{}/{} key page {} carried {} objects",
                bucket,
                prefix,
                the_page_number,
                page.contents().len()
            );
            the_keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key())
                    .map(str::to_owned),
            );
        }
        Ok(the_keys)
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, StoreError> {
        let the_response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| classify(err, bucket, Some(key)))?;

        // 📦 The whole body, in memory. JSONL exports are small; the heap will cope.
        let the_bytes = the_response.body.collect().await.map_err(|err| {
            StoreError::Other(anyhow::Error::new(err).context(format!(
                "💀 s3://{bucket}/{key} started streaming and then stopped mid-sentence"
            )))
        })?;
        Ok(the_bytes.into_bytes().to_vec())
    }
}

// ============================================================
//  🧪 Tests: a fake S3 made of wiremock and XML.
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn a_store_pointed_at(the_server: &MockServer) -> S3Store {
        let the_config = S3StoreConfig {
            region: "us-east-1".to_string(),
            endpoint_url: Some(the_server.uri()),
            force_path_style: true,
            max_attempts: 1,
        };
        S3Store::connect(&the_config, "AKIATEST", "not-a-real-secret").await
    }

    fn a_listing_page(prefixes: &[&str], next_token: Option<&str>) -> String {
        let the_common_prefixes: String = prefixes
            .iter()
            .map(|p| format!("<CommonPrefixes><Prefix>{p}</Prefix></CommonPrefixes>"))
            .collect();
        let the_truncation = match next_token {
            Some(token) => format!(
                "<IsTruncated>true</IsTruncated><NextContinuationToken>{token}</NextContinuationToken>"
            ),
            None => "<IsTruncated>false</IsTruncated>".to_string(),
        };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>my-bucket</Name><Prefix>data/</Prefix><Delimiter>/</Delimiter><MaxKeys>1000</MaxKeys><KeyCount>{}</KeyCount>{}{}</ListBucketResult>"#,
            prefixes.len(),
            the_truncation,
            the_common_prefixes
        )
    }

    #[test]
    fn the_one_where_store_config_defaults_to_the_florida_of_aws() {
        let the_config: S3StoreConfig = serde_json::from_str("{}")
            .expect("💀 an empty store table should parse; every field has a default");
        assert_eq!(the_config, S3StoreConfig::default());
        assert_eq!(the_config.region, "us-east-1");
        assert_eq!(the_config.max_attempts, 3);
    }

    #[tokio::test]
    async fn the_one_where_the_paginator_follows_the_continuation_token() {
        let the_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/my-bucket/?$"))
            .and(query_param("list-type", "2"))
            .and(query_param_is_missing("continuation-token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(
                    a_listing_page(&["data/commits/"], Some("page-2-please")),
                    "application/xml",
                ),
            )
            .expect(1)
            .mount(&the_server)
            .await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/my-bucket/?$"))
            .and(query_param("list-type", "2"))
            .and(query_param("continuation-token", "page-2-please"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                a_listing_page(&["data/users/"], None),
                "application/xml",
            ))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_prefixes = a_store_pointed_at(&the_server)
            .await
            .list_common_prefixes("my-bucket", "data/", "/")
            .await
            .expect("💀 two pages of listing should come back as one answer");

        assert_eq!(
            the_prefixes,
            vec!["data/commits/".to_string(), "data/users/".to_string()]
        );
    }

    #[tokio::test]
    async fn the_one_where_no_such_bucket_gets_its_own_name_tag() {
        let the_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/ghost-bucket/?$"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>NoSuchBucket</Code><Message>The specified bucket does not exist</Message><BucketName>ghost-bucket</BucketName><RequestId>R1</RequestId><HostId>H1</HostId></Error>"#,
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_result = a_store_pointed_at(&the_server)
            .await
            .list_common_prefixes("ghost-bucket", "data/", "/")
            .await;

        match the_result {
            Err(StoreError::NoSuchBucket(the_bucket)) => assert_eq!(the_bucket, "ghost-bucket"),
            honestly_who_knows => panic!("💀 expected NoSuchBucket, got {:?}", honestly_who_knows),
        }
    }

    #[tokio::test]
    async fn the_one_where_s3_hates_our_access_key() {
        let the_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path_regex(r"^/my-bucket/?$"))
            .respond_with(ResponseTemplate::new(403).set_body_raw(
                r#"<?xml version="1.0" encoding="UTF-8"?>
<Error><Code>InvalidAccessKeyId</Code><Message>The AWS Access Key Id you provided does not exist in our records.</Message><RequestId>R2</RequestId><HostId>H2</HostId></Error>"#,
                "application/xml",
            ))
            .mount(&the_server)
            .await;

        let the_result = a_store_pointed_at(&the_server)
            .await
            .list_keys("my-bucket", "data/commits/")
            .await;

        assert!(
            matches!(the_result, Err(StoreError::InvalidCredentials(_))),
            "💀 a rejected access key should be classified as invalid credentials, got {:?}",
            the_result
        );
    }

    #[tokio::test]
    async fn the_one_where_get_object_brings_back_the_whole_body() {
        let the_server = MockServer::start().await;
        let the_body = "{\"_airbyte_data\":{\"id\":1}}\n{\"id\":2}\n";

        Mock::given(method("GET"))
            .and(path("/my-bucket/data/commits/part-0.jsonl"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(the_body, "application/octet-stream"))
            .mount(&the_server)
            .await;

        let the_bytes = a_store_pointed_at(&the_server)
            .await
            .get_object("my-bucket", "data/commits/part-0.jsonl")
            .await
            .expect("💀 the object is right there, S3 (well, wiremock) said 200");

        assert_eq!(the_bytes, the_body.as_bytes());
    }
}
