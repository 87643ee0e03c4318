use crate::errors::Result;
use crate::gate::ConfirmationGate;
use crate::matcher::{match_by_name, NameCollision};
use crate::models::CatalogAsset;
use crate::upsert::{UpsertOrchestrator, Upserted};
use log::{error, info, warn};

/// One link of the lineage chain: a display label and the catalog connection
/// holding that system's tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineageSource {
    pub label: String,
    pub connection_name: String,
}

impl LineageSource {
    pub fn new(label: impl Into<String>, connection_name: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            connection_name: connection_name.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct ResolvedSource {
    label: String,
    connection_qualified_name: Option<String>,
    tables: Vec<CatalogAsset>,
}

/// An ensured lineage edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeRecord {
    pub name: String,
    pub qualified_name: String,
    pub guid: String,
    pub created: bool,
}

impl From<&Upserted> for EdgeRecord {
    fn from(upserted: &Upserted) -> Self {
        let asset = upserted.asset();
        Self {
            name: asset.name.clone(),
            qualified_name: asset.qualified_name.clone(),
            guid: asset.guid.clone(),
            created: upserted.was_created(),
        }
    }
}

/// Result for one matched table pair.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableLink {
    pub source_table: String,
    pub target_table: String,
    /// `None` when the table edge could not be ensured; columns were skipped.
    pub edge: Option<EdgeRecord>,
    pub column_edges: Vec<EdgeRecord>,
    pub failed_column_edges: Vec<String>,
    pub unmatched_source_columns: Vec<String>,
    pub unmatched_target_columns: Vec<String>,
    pub collisions: Vec<NameCollision>,
}

/// Result for one adjacent pair of sources.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageReport {
    pub source: String,
    pub target: String,
    pub links: Vec<TableLink>,
    pub unmatched_source_tables: Vec<String>,
    pub unmatched_target_tables: Vec<String>,
    pub collisions: Vec<NameCollision>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageReport {
    /// The operator declined a confirmation; later stages did not run.
    pub aborted: bool,
    pub stages: Vec<StageReport>,
}

impl LineageReport {
    fn edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        self.stages
            .iter()
            .flat_map(|stage| &stage.links)
            .flat_map(|link| link.edge.iter().chain(&link.column_edges))
    }

    pub fn edges_created(&self) -> usize {
        self.edges().filter(|edge| edge.created).count()
    }

    pub fn edges_total(&self) -> usize {
        self.edges().count()
    }
}

/// Links tables and columns across a chain of sources.
pub struct LineageBuilder {
    upsert: UpsertOrchestrator,
}

impl LineageBuilder {
    pub fn new(upsert: UpsertOrchestrator) -> Self {
        Self { upsert }
    }

    /// Lists every source's tables, asking `gate` after each, then links each
    /// adjacent pair `chain[i] -> chain[i + 1]`.
    ///
    /// Edges are owned by the downstream source's connection. Nothing written
    /// before a declined confirmation is undone.
    pub async fn run(
        &self,
        chain: &[LineageSource],
        gate: &mut dyn ConfirmationGate,
    ) -> Result<LineageReport> {
        let mut report = LineageReport::default();
        let mut resolved = Vec::with_capacity(chain.len());

        for source in chain {
            let resolved_source = self.resolve_source(source).await?;
            if !gate.confirm(&format!("Proceed with {} tables?", source.label))? {
                info!("Aborting before linking; {} tables not confirmed.", source.label);
                report.aborted = true;
                return Ok(report);
            }
            resolved.push(resolved_source);
        }

        for pair in resolved.windows(2) {
            let stage = self.link_sources(&pair[0], &pair[1]).await?;
            report.stages.push(stage);
        }

        info!(
            "Lineage establishment completed: {} edges ensured, {} created.",
            report.edges_total(),
            report.edges_created()
        );
        Ok(report)
    }

    async fn resolve_source(&self, source: &LineageSource) -> Result<ResolvedSource> {
        let resolver = self.upsert.resolver();
        let Some(connection) = resolver.connection_by_name(&source.connection_name).await? else {
            warn!(
                "Connection '{}' for {} not found; treating it as having no tables.",
                source.connection_name, source.label
            );
            return Ok(ResolvedSource {
                label: source.label.clone(),
                connection_qualified_name: None,
                tables: Vec::new(),
            });
        };

        let tables = resolver
            .tables_in_connection(&connection.qualified_name)
            .await?;
        for table in &tables {
            info!(
                "{} table: {} (qualified name: {})",
                source.label, table.name, table.qualified_name
            );
        }
        Ok(ResolvedSource {
            label: source.label.clone(),
            connection_qualified_name: Some(connection.qualified_name),
            tables,
        })
    }

    async fn link_sources(&self, source: &ResolvedSource, target: &ResolvedSource) -> Result<StageReport> {
        let mut stage = StageReport {
            source: source.label.clone(),
            target: target.label.clone(),
            ..Default::default()
        };

        let outcome = match_by_name(&source.tables, &target.tables);
        for collision in &outcome.collisions {
            warn!(
                "Duplicate table name '{}' in {:?} side; using '{}', ignoring {:?}.",
                collision.key, collision.side, collision.kept, collision.dropped
            );
        }
        for table in &outcome.unmatched_left {
            warn!(
                "No matching {} table found for {} table '{}'.",
                target.label, source.label, table.name
            );
        }
        stage.unmatched_source_tables = outcome.unmatched_left.iter().map(|t| t.name.clone()).collect();
        stage.unmatched_target_tables = outcome.unmatched_right.iter().map(|t| t.name.clone()).collect();
        stage.collisions = outcome.collisions.clone();

        let Some(owner) = target.connection_qualified_name.as_deref() else {
            return Ok(stage);
        };

        for pair in &outcome.pairs {
            info!(
                "Matched {} table '{}' with {} table '{}'.",
                source.label, pair.source.name, target.label, pair.target.name
            );
            let link = self.link_tables(pair.source, pair.target, owner).await?;
            stage.links.push(link);
        }
        Ok(stage)
    }

    async fn link_tables(
        &self,
        source: &CatalogAsset,
        target: &CatalogAsset,
        owner: &str,
    ) -> Result<TableLink> {
        let mut link = TableLink {
            source_table: source.name.clone(),
            target_table: target.name.clone(),
            ..Default::default()
        };

        let Some(edge) = self.upsert.ensure_table_edge(source, target, owner).await? else {
            error!(
                "Failed to create table lineage '{}' -> '{}'; skipping column lineage.",
                source.name, target.name
            );
            return Ok(link);
        };
        link.edge = Some(EdgeRecord::from(&edge));
        let parent = edge.into_asset();

        let resolver = self.upsert.resolver();
        let source_columns = resolver.columns_of_table(source).await?;
        let target_columns = resolver.columns_of_table(target).await?;
        let outcome = match_by_name(&source_columns, &target_columns);

        for collision in &outcome.collisions {
            warn!(
                "Duplicate column name '{}' in table '{}' ({:?} side); using '{}'.",
                collision.key, source.name, collision.side, collision.kept
            );
        }
        for column in &outcome.unmatched_left {
            warn!(
                "No matching column found for column '{}' in table '{}'.",
                column.name, source.name
            );
        }
        for column in &outcome.unmatched_right {
            warn!(
                "Column '{}' of table '{}' has no upstream column in table '{}'.",
                column.name, target.name, source.name
            );
        }
        link.unmatched_source_columns = outcome.unmatched_left.iter().map(|c| c.name.clone()).collect();
        link.unmatched_target_columns = outcome.unmatched_right.iter().map(|c| c.name.clone()).collect();
        link.collisions = outcome.collisions.clone();

        for pair in &outcome.pairs {
            info!(
                "Establishing lineage between columns '{}' and '{}'.",
                pair.source.name, pair.target.name
            );
            match self
                .upsert
                .ensure_column_edge(pair.source, pair.target, &parent, owner)
                .await?
            {
                Some(edge) => link.column_edges.push(EdgeRecord::from(&edge)),
                None => {
                    warn!(
                        "Column lineage '{}' -> '{}' was not created.",
                        pair.source.name, pair.target.name
                    );
                    link.failed_column_edges.push(pair.source.name.clone());
                }
            }
        }
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogService, SqliteCatalog};
    use crate::gate::{AutoApprove, ScriptedGate};
    use crate::models::{AssetDraft, AssetKind, ConnectorType};
    use std::sync::Arc;

    async fn seed_connection(catalog: &SqliteCatalog, name: &str, qualified_name: &str, tables: &[(&str, &[&str])]) {
        let mut connection = AssetDraft::connection(name, ConnectorType::Postgres, vec![], vec![], vec![]);
        connection.qualified_name = qualified_name.to_string();
        catalog.save(vec![connection]).await.unwrap();
        let schema = catalog
            .save(vec![AssetDraft::database("db", qualified_name)])
            .await
            .unwrap()
            .created
            .remove(0);
        let schema = catalog
            .save(vec![AssetDraft::schema("public", &schema)])
            .await
            .unwrap()
            .created
            .remove(0);
        for (table, columns) in tables {
            let table = catalog
                .save(vec![AssetDraft::table(table, &schema)])
                .await
                .unwrap()
                .created
                .remove(0);
            let drafts = columns
                .iter()
                .enumerate()
                .map(|(i, c)| AssetDraft::column(c, &table, i as u32 + 1))
                .collect();
            catalog.save(drafts).await.unwrap();
        }
    }

    async fn builder() -> (Arc<SqliteCatalog>, LineageBuilder) {
        let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
        catalog.initialize_schema().unwrap();
        seed_connection(&catalog, "pg", "default/postgres/1", &[("Orders", &["id", "Total"]), ("Users", &["id"])]).await;
        seed_connection(&catalog, "lake", "default/s3/2", &[("orders", &["ID", "total"]), ("ADDRESSES", &["id"])]).await;
        let builder = LineageBuilder::new(UpsertOrchestrator::new(catalog.clone()));
        (catalog, builder)
    }

    fn chain() -> Vec<LineageSource> {
        vec![LineageSource::new("Postgres", "pg"), LineageSource::new("S3", "lake")]
    }

    #[tokio::test]
    async fn links_matched_tables_and_columns() {
        let (catalog, builder) = builder().await;
        let report = builder.run(&chain(), &mut AutoApprove).await.unwrap();

        assert!(!report.aborted);
        let stage = &report.stages[0];
        assert_eq!(stage.links.len(), 1);
        assert_eq!(stage.unmatched_source_tables, vec!["Users"]);
        assert_eq!(stage.unmatched_target_tables, vec!["ADDRESSES"]);

        let link = &stage.links[0];
        let edge = link.edge.as_ref().unwrap();
        assert_eq!(edge.name, "Orders -> orders");
        assert!(edge.qualified_name.starts_with("default/s3/2/"));
        assert_eq!(link.column_edges.len(), 2);
        assert_eq!(report.edges_created(), 3);
        assert_eq!(catalog.count_assets(Some(AssetKind::ColumnProcess)).unwrap(), 2);
    }

    #[tokio::test]
    async fn declined_gate_aborts_before_linking() {
        let (catalog, builder) = builder().await;
        let mut gate = ScriptedGate::new([true, false]);
        let report = builder.run(&chain(), &mut gate).await.unwrap();

        assert!(report.aborted);
        assert!(report.stages.is_empty());
        assert_eq!(gate.prompts, vec!["Proceed with Postgres tables?", "Proceed with S3 tables?"]);
        assert_eq!(catalog.count_assets(Some(AssetKind::Process)).unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_connection_links_nothing() {
        let (_catalog, builder) = builder().await;
        let chain = vec![LineageSource::new("Postgres", "pg"), LineageSource::new("Snowflake", "absent")];
        let report = builder.run(&chain, &mut AutoApprove).await.unwrap();
        assert!(report.stages[0].links.is_empty());
        assert_eq!(report.stages[0].unmatched_source_tables, vec!["Orders", "Users"]);
    }
}
