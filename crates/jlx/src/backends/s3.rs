//! 🪣🌐 S3 Backend: the cloud-to-ground data paratrooper.
//!
//! INT. AWS CONSOLE, NIGHT. A lone bucket sits in us-east-1, full of folders
//! that are not folders. Each one holds `.jsonl` files an ingestion tool wrote
//! and forgot. The data has been waiting. Patient. Paginated.
//!
//! This module wraps the AWS S3 SDK and exposes an [`ObjectStore`](super::ObjectStore)
//! implementation built from credentials supplied per request.
//!
//! 🧠 Knowledge graph:
//! - Config co-located: `S3StoreConfig` lives in `s3_store.rs`
//! - Trait impl: `impl ObjectStore for S3Store`
//! - Enum variant: `StoreBackend::S3(S3Store)`
//! - Transport: `ListObjectsV2` paginator for listings, `GetObject` + `collect()` for reads
//! - Errors: S3 error codes are sorted into [`StoreError`](super::StoreError) variants
//!
//! 🦆 The duck has no clearance for AWS. It watches from the edge of the VPC.

mod s3_store;

pub use s3_store::{S3Store, S3StoreConfig};
