use async_trait::async_trait;
use catalink::errors::{LinkError, Result};
use catalink::storage::ObjectStore;
use log::info;
use url::Url;

/// Reads objects from public S3 buckets with unsigned GET requests.
#[derive(Clone, Debug)]
pub struct S3Reader {
    http_client: reqwest::Client,
    /// Path-style endpoint (`{endpoint}/{bucket}/{key}`) instead of the
    /// virtual-hosted AWS host, for S3-compatible stores.
    endpoint: Option<Url>,
}

impl Default for S3Reader {
    fn default() -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: None,
        }
    }
}

impl S3Reader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(endpoint: Url) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            endpoint: Some(endpoint),
        }
    }

    pub fn object_url(&self, bucket: &str, key: &str) -> Result<Url> {
        let (mut url, bucket_segment) = match &self.endpoint {
            Some(endpoint) => (endpoint.clone(), Some(bucket)),
            None => {
                let raw = format!("https://{bucket}.s3.amazonaws.com/");
                let url = Url::parse(&raw)
                    .map_err(|err| LinkError::Storage(format!("invalid bucket host '{raw}': {err}")))?;
                (url, None)
            }
        };
        url.path_segments_mut()
            .map_err(|_| LinkError::Storage(format!("endpoint for bucket '{bucket}' cannot hold a path")))?
            .pop_if_empty()
            .extend(bucket_segment)
            .extend(key.split('/'));
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for S3Reader {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key)?;
        info!("Fetching s3://{bucket}/{key}");
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|err| LinkError::Storage(format!("GET s3://{bucket}/{key} failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LinkError::Storage(format!(
                "GET s3://{bucket}/{key} returned HTTP {status}"
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| LinkError::Storage(format!("reading s3://{bucket}/{key} failed: {err}")))?;
        Ok(bytes.to_vec())
    }
}
