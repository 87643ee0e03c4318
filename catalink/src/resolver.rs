use crate::catalog::CatalogService;
use crate::errors::Result;
use crate::models::{AssetKind, CatalogAsset};
use crate::query::{Attribute, SearchRequest, COLUMN_PAGE_SIZE, TABLE_PAGE_SIZE};
use log::{error, info};
use std::sync::Arc;

/// What identifies an entity that may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaturalKey<'a> {
    /// A hierarchy node: its name, compared case-insensitively, under the
    /// parent with the given qualified name.
    Named {
        name: &'a str,
        parent_qualified_name: Option<&'a str>,
    },
    /// Any entity by exact qualified name. Lineage edges are always looked up
    /// this way since their qualified names are derived deterministically.
    Qualified(&'a str),
}

impl<'a> NaturalKey<'a> {
    pub fn named(name: &'a str, parent_qualified_name: &'a str) -> Self {
        NaturalKey::Named {
            name,
            parent_qualified_name: Some(parent_qualified_name),
        }
    }

    fn describe(&self) -> &'a str {
        match *self {
            NaturalKey::Named { name, .. } => name,
            NaturalKey::Qualified(qualified_name) => qualified_name,
        }
    }
}

/// Finds active entities that already exist in the catalog.
///
/// Absence is a normal `Ok(None)` / empty result. Transport failures are
/// logged and returned; they never degrade into "assume absent".
#[derive(Clone)]
pub struct ExistenceResolver {
    catalog: Arc<dyn CatalogService>,
}

impl ExistenceResolver {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        Self { catalog }
    }

    pub async fn find_existing(
        &self,
        kind: AssetKind,
        key: NaturalKey<'_>,
    ) -> Result<Option<CatalogAsset>> {
        let request = SearchRequest::new().of_kind(kind).active();
        let request = match key {
            NaturalKey::Named {
                name,
                parent_qualified_name,
            } => {
                let request = request.eq_ignore_case(Attribute::Name, name);
                match (kind.parent_attribute(), parent_qualified_name) {
                    (Some(attribute), Some(parent)) => request.eq(attribute, parent),
                    _ => request,
                }
            }
            NaturalKey::Qualified(qualified_name) => {
                request.eq(Attribute::QualifiedName, qualified_name)
            }
        };

        let candidates = self.catalog.search(&request).await.inspect_err(|err| {
            error!("Error searching for {kind} '{}': {err}", key.describe());
        })?;

        // The store's matching semantics are not trusted: re-check each hit.
        Ok(candidates.into_iter().find(|asset| {
            asset.kind == kind
                && asset.is_active()
                && match key {
                    NaturalKey::Named { name, .. } => asset.name_matches(name),
                    NaturalKey::Qualified(qualified_name) => {
                        asset.qualified_name == qualified_name
                    }
                }
        }))
    }

    pub async fn connection_by_name(&self, name: &str) -> Result<Option<CatalogAsset>> {
        self.find_existing(
            AssetKind::Connection,
            NaturalKey::Named {
                name,
                parent_qualified_name: None,
            },
        )
        .await
    }

    /// Every active table under a connection, up to the table page size.
    pub async fn tables_in_connection(&self, connection_qualified_name: &str) -> Result<Vec<CatalogAsset>> {
        let request = SearchRequest::new()
            .of_kind(AssetKind::Table)
            .active()
            .eq(Attribute::ConnectionQualifiedName, connection_qualified_name)
            .page_size(TABLE_PAGE_SIZE);
        let tables: Vec<CatalogAsset> = self
            .catalog
            .search(&request)
            .await
            .inspect_err(|err| {
                error!(
                    "Error occurred while searching for tables under connection '{connection_qualified_name}': {err}"
                );
            })?
            .into_iter()
            .filter(|asset| asset.kind == AssetKind::Table && asset.is_active())
            .collect();
        info!(
            "Found {} tables under connection '{connection_qualified_name}'.",
            tables.len()
        );
        Ok(tables)
    }

    /// Every active column of a table, in column order.
    pub async fn columns_of_table(&self, table: &CatalogAsset) -> Result<Vec<CatalogAsset>> {
        let request = SearchRequest::new()
            .of_kind(AssetKind::Column)
            .active()
            .eq(Attribute::TableQualifiedName, table.qualified_name.clone())
            .page_size(COLUMN_PAGE_SIZE);
        let mut columns: Vec<CatalogAsset> = self
            .catalog
            .search(&request)
            .await
            .inspect_err(|err| {
                error!(
                    "Error occurred while retrieving columns for table '{}': {err}",
                    table.name
                );
            })?
            .into_iter()
            .filter(|asset| asset.kind == AssetKind::Column && asset.is_active())
            .collect();
        columns.sort_by_key(|column| column.attributes.order.unwrap_or(u32::MAX));
        info!("Found {} columns for table '{}'.", columns.len(), table.name);
        Ok(columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SqliteCatalog;
    use crate::models::AssetDraft;

    async fn seeded() -> (Arc<SqliteCatalog>, ExistenceResolver) {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        catalog.initialize_schema().unwrap();
        catalog
            .save(vec![
                AssetDraft::database("Sales", "default/postgres/1"),
                AssetDraft::database("Sales", "default/postgres/2"),
            ])
            .await
            .unwrap();
        let resolver = ExistenceResolver::new(catalog.clone());
        (catalog, resolver)
    }

    #[tokio::test]
    async fn named_lookup_ignores_case_and_respects_parent() {
        let (_catalog, resolver) = seeded().await;
        let found = resolver
            .find_existing(AssetKind::Database, NaturalKey::named("SALES", "default/postgres/2"))
            .await
            .unwrap()
            .expect("database exists");
        assert_eq!(found.qualified_name, "default/postgres/2/Sales");

        let missing = resolver
            .find_existing(AssetKind::Database, NaturalKey::named("sales", "default/postgres/3"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn qualified_lookup_is_exact() {
        let (_catalog, resolver) = seeded().await;
        assert!(resolver
            .find_existing(AssetKind::Database, NaturalKey::Qualified("default/postgres/1/Sales"))
            .await
            .unwrap()
            .is_some());
        assert!(resolver
            .find_existing(AssetKind::Schema, NaturalKey::Qualified("default/postgres/1/Sales"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn archived_entities_are_absent() {
        let (catalog, resolver) = seeded().await;
        let existing = resolver
            .find_existing(AssetKind::Database, NaturalKey::named("sales", "default/postgres/1"))
            .await
            .unwrap()
            .unwrap();
        catalog.archive(&existing.guid).unwrap();

        assert!(resolver
            .find_existing(AssetKind::Database, NaturalKey::named("sales", "default/postgres/1"))
            .await
            .unwrap()
            .is_none());
    }
}
