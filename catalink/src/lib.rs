pub mod catalog;
pub mod config;
pub mod errors;
pub mod gate;
pub mod hierarchy;
pub mod lineage;
pub mod matcher;
pub mod models;
pub mod query;
pub mod resolver;
pub mod schema;
pub mod storage;
pub mod upsert;
pub mod utils;

use crate::catalog::CatalogService;
use crate::errors::Result;
use crate::gate::ConfirmationGate;
use crate::hierarchy::{HierarchyRegistrar, RegistrationPlan, RegistrationReport};
use crate::lineage::{LineageBuilder, LineageReport, LineageSource};
use crate::storage::ObjectStore;
use crate::upsert::UpsertOrchestrator;
use std::sync::Arc;

/// The main entry point for the `catalink` library.
///
/// `Catalink` holds the catalog client every pipeline writes through and
/// hands out the two runs built on top of it:
/// - hierarchy registration of delimited files kept in object storage;
/// - table and column lineage across a chain of connections.
///
/// Every write is create-if-absent, so either run can be repeated against
/// the same catalog without producing duplicates.
///
/// # Example
///
/// ```rust,no_run
/// use catalink::{Catalink, catalog::SqliteCatalog, gate::AutoApprove, lineage::LineageSource};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let catalog = SqliteCatalog::open("catalog.sqlite").unwrap();
///     catalog.initialize_schema().unwrap();
///     let engine = Catalink::new(Arc::new(catalog));
///
///     let chain = [LineageSource::new("Postgres", "pg"), LineageSource::new("S3", "lake")];
///     let report = engine.link(&chain, &mut AutoApprove).await.unwrap();
///     println!("{} edges created", report.edges_created());
/// }
/// ```
#[derive(Clone)]
pub struct Catalink {
    pub catalog: Arc<dyn CatalogService>,
    upsert: UpsertOrchestrator,
}

impl Catalink {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        let upsert = UpsertOrchestrator::new(Arc::clone(&catalog));
        Self { catalog, upsert }
    }

    pub fn upsert(&self) -> &UpsertOrchestrator {
        &self.upsert
    }

    /// Registers connection, database, schema, tables and columns for the
    /// objects named in `plan`.
    pub async fn register(
        &self,
        store: Arc<dyn ObjectStore>,
        plan: &RegistrationPlan,
    ) -> Result<RegistrationReport> {
        HierarchyRegistrar::new(self.upsert.clone(), store)
            .run(plan)
            .await
    }

    /// Links matching tables and columns of each adjacent pair in `chain`.
    pub async fn link(
        &self,
        chain: &[LineageSource],
        gate: &mut dyn ConfirmationGate,
    ) -> Result<LineageReport> {
        LineageBuilder::new(self.upsert.clone()).run(chain, gate).await
    }
}
