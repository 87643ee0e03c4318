use crate::errors::{LinkError, Result};
use crate::lineage::LineageSource;
use serde::Deserialize;
use std::path::PathBuf;
use url::Url;

/// Settings shared by the registration and lineage runs.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub base_url: Option<Url>,
    pub api_token: Option<String>,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub s3_connection_name: Option<String>,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    pub bucket_name: Option<String>,
    pub object_names: Vec<String>,
    pub admin_users: Vec<String>,
    pub admin_groups: Vec<String>,
    pub postgres_connection_name: Option<String>,
    pub snowflake_connection_name: Option<String>,
    /// Connection names in lineage order. Empty means postgres → s3 → snowflake.
    pub lineage_chain: Vec<String>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_token: None,
            log_level: "info".to_string(),
            log_file: None,
            s3_connection_name: None,
            database_name: None,
            schema_name: None,
            bucket_name: None,
            object_names: Vec::new(),
            admin_users: Vec::new(),
            admin_groups: Vec::new(),
            postgres_connection_name: None,
            snowflake_connection_name: None,
            lineage_chain: Vec::new(),
        }
    }
}

impl LinkConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(LinkError::Config(format!("failed to load .env file: {err}")));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("CATALOG_BASE_URL")
            .map(|raw| {
                Url::parse(&raw)
                    .map_err(|err| LinkError::Config(format!("CATALOG_BASE_URL '{raw}' is not a valid url: {err}")))
            })
            .transpose()?;

        Ok(Self {
            base_url,
            api_token: get("CATALOG_API_TOKEN"),
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_file: get("LOG_FILE").map(PathBuf::from),
            s3_connection_name: get("S3_CONNECTION_NAME"),
            database_name: get("DATABASE_NAME"),
            schema_name: get("SCHEMA_NAME"),
            bucket_name: get("S3_BUCKET_NAME"),
            object_names: split_list(get("S3_OBJECT_NAMES")),
            admin_users: split_list(get("ADMIN_USERS")),
            admin_groups: split_list(get("ADMIN_GROUPS")),
            postgres_connection_name: get("POSTGRES_CONNECTION_NAME"),
            snowflake_connection_name: get("SNOWFLAKE_CONNECTION_NAME"),
            lineage_chain: split_list(get("LINEAGE_CHAIN")),
        })
    }

    pub fn require<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| LinkError::Config(format!("{key} must be set")))
    }

    /// The sources to link, in flow order.
    pub fn lineage_sources(&self) -> Result<Vec<LineageSource>> {
        if !self.lineage_chain.is_empty() {
            if self.lineage_chain.len() < 2 {
                return Err(LinkError::Config(
                    "LINEAGE_CHAIN needs at least two connection names".into(),
                ));
            }
            return Ok(self
                .lineage_chain
                .iter()
                .map(|name| LineageSource::new(name.clone(), name.clone()))
                .collect());
        }

        Ok(vec![
            LineageSource::new(
                "Postgres",
                Self::require(&self.postgres_connection_name, "POSTGRES_CONNECTION_NAME")?,
            ),
            LineageSource::new(
                "S3",
                Self::require(&self.s3_connection_name, "S3_CONNECTION_NAME")?,
            ),
            LineageSource::new(
                "Snowflake",
                Self::require(&self.snowflake_connection_name, "SNOWFLAKE_CONNECTION_NAME")?,
            ),
        ])
    }
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}
