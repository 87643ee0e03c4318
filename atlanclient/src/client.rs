use crate::error::{AtlanError, Result};
use crate::retry::RetryPolicy;
use crate::wire::{self, BulkResponse, SearchResponse};
use async_trait::async_trait;
use catalink::catalog::CatalogService;
use catalink::config::LinkConfig;
use catalink::errors::{LinkError, Result as LinkResult};
use catalink::models::{AssetDraft, AssetKind, CatalogAsset, SaveResponse};
use catalink::query::SearchRequest;
use log::{debug, info};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

const SEARCH_PATH: &str = "api/meta/search/indexsearch";
const BULK_PATH: &str = "api/meta/entity/bulk";
const UNIQUE_ATTRIBUTE_PATH: &str = "api/meta/entity/uniqueAttribute/type/";
const ROLES_PATH: &str = "api/service/roles";

/// Client for an Atlan tenant's metadata API.
///
/// Reads are retried under `retry`; bulk saves are sent exactly once.
#[derive(Clone, Debug)]
pub struct AtlanClient {
    http_client: reqwest::Client,
    base_url: Url,
    api_token: String,
    retry: RetryPolicy,
}

impl AtlanClient {
    pub fn new(base_url: Url, api_token: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("catalink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        // `Url::join` drops the last path segment unless it ends in '/'.
        let base_url = if base_url.path().ends_with('/') {
            base_url
        } else {
            Url::parse(&format!("{base_url}/"))?
        };
        Ok(Self {
            http_client,
            base_url,
            api_token: api_token.into(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn from_config(config: &LinkConfig) -> LinkResult<Self> {
        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| LinkError::Config("CATALOG_BASE_URL must be set".into()))?;
        let token = LinkConfig::require(&config.api_token, "CATALOG_API_TOKEN")?;
        Ok(Self::new(base_url, token)?)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.api_token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AtlanError::Api {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    /// Runs one search page.
    pub async fn search_assets(&self, request: &SearchRequest) -> Result<Vec<CatalogAsset>> {
        let url = self.endpoint(SEARCH_PATH)?;
        let body = wire::search_body(request);
        debug!("indexsearch: {body}");

        let response: SearchResponse = self
            .retry
            .run("search", || {
                self.send_json(self.http_client.post(url.clone()).json(&body))
            })
            .await?;

        let mut assets = Vec::with_capacity(response.entities.len());
        for entity in &response.entities {
            if let Some(asset) = wire::decode_entity(entity)? {
                assets.push(asset);
            }
        }
        Ok(assets)
    }

    /// Submits drafts in one bulk call. Never retried.
    pub async fn save_assets(&self, drafts: &[AssetDraft]) -> Result<SaveResponse> {
        if drafts.is_empty() {
            return Ok(SaveResponse::default());
        }
        let url = self.endpoint(BULK_PATH)?;
        let body = wire::bulk_body(drafts)?;
        let response: BulkResponse = self
            .send_json(self.http_client.post(url).json(&body))
            .await?;
        let saved = wire::decode_mutations(response, drafts)?;
        info!(
            "Bulk save of {} drafts: {} created, {} updated",
            drafts.len(),
            saved.created.len(),
            saved.updated.len()
        );
        Ok(saved)
    }

    /// Point lookup by qualified name; `None` on 404.
    pub async fn get_asset(
        &self,
        kind: AssetKind,
        qualified_name: &str,
    ) -> Result<Option<CatalogAsset>> {
        let mut url = self.endpoint(&format!("{UNIQUE_ATTRIBUTE_PATH}{}", kind.type_name()))?;
        url.query_pairs_mut()
            .append_pair("attr:qualifiedName", qualified_name)
            .append_pair("minExtInfo", "true")
            .append_pair("ignoreRelationships", "false");

        #[derive(Deserialize)]
        struct EntityResponse {
            entity: Value,
        }

        let url = &url;
        let found: Option<EntityResponse> = self
            .retry
            .run("get by qualified name", || async move {
                match self.send_json(self.http_client.get(url.clone())).await {
                    Ok(found) => Ok(Some(found)),
                    Err(AtlanError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                        Ok(None)
                    }
                    Err(err) => Err(err),
                }
            })
            .await?;

        match found {
            Some(found) => wire::decode_entity(&found.entity),
            None => Ok(None),
        }
    }

    pub async fn find_role_guid(&self, role_name: &str) -> Result<Option<String>> {
        let mut url = self.endpoint(ROLES_PATH)?;
        url.query_pairs_mut()
            .append_pair("limit", "100")
            .append_pair("filter", &json!({ "name": { "$eq": role_name } }).to_string());

        #[derive(Deserialize)]
        struct Role {
            id: String,
            name: String,
        }
        #[derive(Deserialize)]
        struct Roles {
            #[serde(default)]
            records: Vec<Role>,
        }

        let roles: Roles = self
            .retry
            .run("role lookup", || self.send_json(self.http_client.get(url.clone())))
            .await?;
        Ok(roles
            .records
            .into_iter()
            .find(|role| role.name == role_name)
            .map(|role| role.id))
    }
}

#[async_trait]
impl CatalogService for AtlanClient {
    async fn search(&self, request: &SearchRequest) -> LinkResult<Vec<CatalogAsset>> {
        Ok(self.search_assets(request).await?)
    }

    async fn save(&self, drafts: Vec<AssetDraft>) -> LinkResult<SaveResponse> {
        Ok(self.save_assets(&drafts).await?)
    }

    async fn get_by_qualified_name(
        &self,
        kind: AssetKind,
        qualified_name: &str,
    ) -> LinkResult<Option<CatalogAsset>> {
        Ok(self.get_asset(kind, qualified_name).await?)
    }

    async fn role_guid(&self, role_name: &str) -> LinkResult<Option<String>> {
        Ok(self.find_role_guid(role_name).await?)
    }
}
