//! Network adapters for the catalog engine: the Atlan metadata REST API as a
//! [`CatalogService`](catalink::catalog::CatalogService) and public S3 buckets
//! as an [`ObjectStore`](catalink::storage::ObjectStore).

pub mod client;
pub mod error;
pub mod retry;
pub mod s3;
pub mod wire;

pub use client::AtlanClient;
pub use error::{AtlanError, Result};
pub use retry::RetryPolicy;
pub use s3::S3Reader;
