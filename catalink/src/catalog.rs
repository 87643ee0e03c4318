use crate::errors::{LinkError, Result};
use crate::models::{AssetAttributes, AssetDraft, AssetKind, CatalogAsset, EntityStatus, SaveResponse};
use crate::query::{Attribute, SearchRequest};
use async_trait::async_trait;
use log::warn;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

/// The catalog contract the engine depends on.
///
/// "Not found" is never an error: searches return an empty page and point
/// lookups return `None`. Errors are reserved for transport and protocol
/// failures.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Returns at most `request.page_size` assets matching every predicate.
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CatalogAsset>>;

    /// Creates or updates a batch of assets. Drafts that failed individually
    /// are absent from both lists of the response.
    async fn save(&self, drafts: Vec<AssetDraft>) -> Result<SaveResponse>;

    async fn get_by_qualified_name(
        &self,
        kind: AssetKind,
        qualified_name: &str,
    ) -> Result<Option<CatalogAsset>>;

    /// Resolves a role name such as `$admin` to its guid.
    async fn role_guid(&self, role_name: &str) -> Result<Option<String>>;
}

pub const ADMIN_ROLE: &str = "$admin";

/// A catalog kept in a local SQLite database.
///
/// Used as an offline backend and, opened in memory, as the catalog fake in
/// tests. Saves are keyed by (type, qualified name): saving a draft whose
/// identity already exists merges its attributes into the stored asset.
pub struct SqliteCatalog {
    conn: Arc<Mutex<Connection>>,
}

type AssetRow = (String, String, String, String, String, String);

impl SqliteCatalog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| LinkError::Catalog("catalog connection lock poisoned".into()))
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS assets (
                guid TEXT PRIMARY KEY,
                type_name TEXT NOT NULL,
                name TEXT NOT NULL,
                qualified_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'ACTIVE',
                attributes TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_assets_identity
                ON assets (type_name, qualified_name);
            CREATE TABLE IF NOT EXISTS roles (
                guid TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE
            );
            COMMIT;",
        )?;
        let admin_guid = Uuid::new_v5(&Uuid::NAMESPACE_OID, ADMIN_ROLE.as_bytes()).to_string();
        conn.execute(
            "INSERT OR IGNORE INTO roles (guid, name) VALUES (?1, ?2)",
            params![admin_guid, ADMIN_ROLE],
        )?;
        Ok(())
    }

    /// Marks an asset archived. The engine never archives; this exists for
    /// seeding catalogs in tests and for manual cleanup.
    pub fn archive(&self, guid: &str) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE assets SET status = ?1, updated_at = ?2 WHERE guid = ?3",
            params![
                EntityStatus::Archived.as_str(),
                chrono::Utc::now().timestamp(),
                guid
            ],
        )?;
        Ok(changed > 0)
    }

    /// Number of stored assets of `kind`, or of every kind, whatever their status.
    pub fn count_assets(&self, kind: Option<AssetKind>) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = match kind {
            Some(kind) => conn.query_row(
                "SELECT COUNT(*) FROM assets WHERE type_name = ?1",
                params![kind.type_name()],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM assets", [], |row| row.get(0))?,
        };
        Ok(count as usize)
    }

    fn row_to_asset(row: AssetRow) -> Result<CatalogAsset> {
        let (guid, type_name, name, qualified_name, status, attributes) = row;
        let kind = AssetKind::from_type_name(&type_name)
            .ok_or_else(|| LinkError::Catalog(format!("unknown asset type '{type_name}'")))?;
        Ok(CatalogAsset {
            guid,
            kind,
            name,
            qualified_name,
            status: EntityStatus::parse(&status),
            attributes: serde_json::from_str(&attributes)?,
        })
    }

    fn find_row(conn: &Connection, where_clause: &str, args: &[&str]) -> Result<Option<AssetRow>> {
        let sql = format!(
            "SELECT guid, type_name, name, qualified_name, status, attributes FROM assets WHERE {where_clause}"
        );
        let row = conn
            .query_row(&sql, params_from_iter(args.iter()), |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .optional()?;
        Ok(row)
    }

    fn merge_into(
        conn: &Connection,
        existing: AssetRow,
        patch: &AssetAttributes,
        now: i64,
    ) -> Result<(CatalogAsset, bool)> {
        let mut asset = Self::row_to_asset(existing)?;
        let was_archived = !asset.is_active();
        asset.attributes.merge_from(patch);
        asset.status = EntityStatus::Active;
        conn.execute(
            "UPDATE assets SET attributes = ?1, status = ?2, updated_at = ?3 WHERE guid = ?4",
            params![
                serde_json::to_string(&asset.attributes)?,
                asset.status.as_str(),
                now,
                asset.guid
            ],
        )?;
        Ok((asset, was_archived))
    }
}

#[async_trait]
impl CatalogService for SqliteCatalog {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<CatalogAsset>> {
        let mut sql = String::from(
            "SELECT guid, type_name, name, qualified_name, status, attributes FROM assets WHERE 1 = 1",
        );
        let mut args: Vec<String> = Vec::with_capacity(request.predicates.len());
        for predicate in &request.predicates {
            let column = match predicate.attribute {
                Attribute::TypeName => "type_name".to_string(),
                Attribute::Status => "status".to_string(),
                Attribute::Name => "name".to_string(),
                Attribute::QualifiedName => "qualified_name".to_string(),
                other => format!("json_extract(attributes, '$.{}')", other.as_str()),
            };
            sql.push_str(&format!(" AND {column} = ?"));
            if predicate.case_insensitive {
                sql.push_str(" COLLATE NOCASE");
            }
            args.push(predicate.value.clone());
        }
        sql.push_str(&format!(" ORDER BY rowid LIMIT {}", request.page_size));

        let rows: Vec<AssetRow> = {
            let conn = self.conn()?;
            let mut stmt = conn.prepare(&sql)?;
            let mapped = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })?;
            let rows = mapped.collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };
        rows.into_iter().map(Self::row_to_asset).collect()
    }

    async fn save(&self, drafts: Vec<AssetDraft>) -> Result<SaveResponse> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().timestamp();
        let mut response = SaveResponse::default();

        for draft in drafts {
            if draft.name.trim().is_empty() || draft.qualified_name.trim().is_empty() {
                warn!(
                    "Rejecting {} draft without a name or qualified name",
                    draft.kind
                );
                continue;
            }

            if let Some(guid) = draft.guid.as_deref() {
                match Self::find_row(&tx, "guid = ?1", &[guid])? {
                    Some(existing) => {
                        let (asset, _) = Self::merge_into(&tx, existing, &draft.attributes, now)?;
                        response.updated.push(asset);
                    }
                    None => warn!("Cannot update {} '{}': unknown guid {guid}", draft.kind, draft.name),
                }
                continue;
            }

            let identity = Self::find_row(
                &tx,
                "type_name = ?1 AND qualified_name = ?2",
                &[draft.kind.type_name(), &draft.qualified_name],
            )?;
            match identity {
                Some(existing) => {
                    let (asset, was_archived) =
                        Self::merge_into(&tx, existing, &draft.attributes, now)?;
                    if was_archived {
                        response.created.push(asset);
                    } else {
                        response.updated.push(asset);
                    }
                }
                None => {
                    let asset = CatalogAsset {
                        guid: Uuid::new_v4().to_string(),
                        kind: draft.kind,
                        name: draft.name,
                        qualified_name: draft.qualified_name,
                        status: EntityStatus::Active,
                        attributes: draft.attributes,
                    };
                    tx.execute(
                        "INSERT INTO assets (guid, type_name, name, qualified_name, status, attributes, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                        params![
                            asset.guid,
                            asset.kind.type_name(),
                            asset.name,
                            asset.qualified_name,
                            asset.status.as_str(),
                            serde_json::to_string(&asset.attributes)?,
                            now
                        ],
                    )?;
                    response.created.push(asset);
                }
            }
        }

        tx.commit()?;
        Ok(response)
    }

    async fn get_by_qualified_name(
        &self,
        kind: AssetKind,
        qualified_name: &str,
    ) -> Result<Option<CatalogAsset>> {
        let row = {
            let conn = self.conn()?;
            Self::find_row(
                &conn,
                "type_name = ?1 AND qualified_name = ?2",
                &[kind.type_name(), qualified_name],
            )?
        };
        row.map(Self::row_to_asset).transpose()
    }

    async fn role_guid(&self, role_name: &str) -> Result<Option<String>> {
        let conn = self.conn()?;
        let guid: Option<String> = conn
            .query_row(
                "SELECT guid FROM roles WHERE name = ?1",
                params![role_name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(guid)
    }
}
