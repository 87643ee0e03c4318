use crate::errors::{LinkError, Result};
use crate::models::CatalogAsset;
use crate::schema::{infer_columns, table_name_for_key};
use crate::storage::ObjectStore;
use crate::upsert::{ColumnReport, ConnectionSpec, UpsertOrchestrator, Upserted};
use log::{error, info, warn};
use std::sync::Arc;

/// What to register: one connection/database/schema and the tables found in
/// a set of objects of one bucket.
#[derive(Debug, Clone)]
pub struct RegistrationPlan {
    pub connection: ConnectionSpec,
    pub database_name: String,
    pub schema_name: String,
    pub bucket: String,
    pub object_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableOutcome {
    Registered {
        table_qualified_name: String,
        columns: ColumnReport,
    },
    /// The object had no usable column.
    Empty,
    /// The object was fetched but is not a readable CSV document.
    Unreadable(String),
    /// The table itself could not be created.
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRegistration {
    pub object_key: String,
    pub table_name: String,
    pub outcome: TableOutcome,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationReport {
    pub connection_qualified_name: Option<String>,
    pub database_qualified_name: Option<String>,
    pub schema_qualified_name: Option<String>,
    pub objects: Vec<ObjectRegistration>,
    /// False when a hierarchy node could not be ensured and the run stopped.
    pub complete: bool,
}

impl RegistrationReport {
    pub fn registered_tables(&self) -> usize {
        self.objects
            .iter()
            .filter(|object| matches!(object.outcome, TableOutcome::Registered { .. }))
            .count()
    }
}

/// Builds the connection → database → schema → table → column hierarchy for
/// delimited files in object storage.
pub struct HierarchyRegistrar {
    upsert: UpsertOrchestrator,
    store: Arc<dyn ObjectStore>,
}

impl HierarchyRegistrar {
    pub fn new(upsert: UpsertOrchestrator, store: Arc<dyn ObjectStore>) -> Self {
        Self { upsert, store }
    }

    pub async fn run(&self, plan: &RegistrationPlan) -> Result<RegistrationReport> {
        let mut report = RegistrationReport::default();

        let Some(connection) = self.upsert.ensure_connection(&plan.connection).await? else {
            error!("Failed to create or retrieve Connection '{}'.", plan.connection.name);
            return Ok(report);
        };
        let connection = connection.into_asset();
        report.connection_qualified_name = Some(connection.qualified_name.clone());

        let Some(database) = self
            .upsert
            .ensure_database(&plan.database_name, &connection.qualified_name)
            .await?
            .map(Upserted::into_asset)
        else {
            error!("Failed to create or retrieve Database '{}'.", plan.database_name);
            return Ok(report);
        };
        report.database_qualified_name = Some(database.qualified_name.clone());

        let Some(schema) = self
            .upsert
            .ensure_schema(&plan.schema_name, &database)
            .await?
            .map(Upserted::into_asset)
        else {
            error!("Failed to create or retrieve Schema '{}'.", plan.schema_name);
            return Ok(report);
        };
        report.schema_qualified_name = Some(schema.qualified_name.clone());
        report.complete = true;

        if plan.object_keys.is_empty() {
            warn!("No objects configured for bucket '{}'.", plan.bucket);
            return Ok(report);
        }

        for key in &plan.object_keys {
            let registration = self.register_object(&plan.bucket, key, &schema).await?;
            report.objects.push(registration);
        }

        info!(
            "Schema extraction and update completed: {} of {} objects registered under '{}'.",
            report.registered_tables(),
            plan.object_keys.len(),
            schema.qualified_name
        );
        Ok(report)
    }

    async fn register_object(
        &self,
        bucket: &str,
        key: &str,
        schema: &CatalogAsset,
    ) -> Result<ObjectRegistration> {
        let table_name = table_name_for_key(key);
        let mut registration = ObjectRegistration {
            object_key: key.to_string(),
            table_name: table_name.clone(),
            outcome: TableOutcome::Failed,
        };

        info!("Processing object '{key}' from bucket '{bucket}'.");
        let content = self.store.get_object(bucket, key).await.inspect_err(|err| {
            error!("Error fetching object '{key}' from bucket '{bucket}': {err}");
        })?;
        let columns = match infer_columns(&content) {
            Ok(columns) => columns,
            Err(err @ LinkError::Csv(_)) => {
                error!("Error processing object '{key}': {err}");
                registration.outcome = TableOutcome::Unreadable(err.to_string());
                return Ok(registration);
            }
            Err(err) => return Err(err),
        };
        if columns.is_empty() {
            warn!("No valid columns found in '{key}'. Skipping.");
            registration.outcome = TableOutcome::Empty;
            return Ok(registration);
        }

        let Some(table) = self
            .upsert
            .ensure_table(&table_name, schema)
            .await?
            .map(Upserted::into_asset)
        else {
            error!("Failed to create or retrieve Table '{table_name}'. Skipping columns creation.");
            return Ok(registration);
        };

        let report = self.upsert.ensure_columns(&table, &columns).await?;
        if !report.patch_failed.is_empty() || !report.create_failed.is_empty() {
            warn!(
                "Table '{table_name}': {} columns not created, {} data types not set.",
                report.create_failed.len(),
                report.patch_failed.len()
            );
        }
        registration.outcome = TableOutcome::Registered {
            table_qualified_name: table.qualified_name,
            columns: report,
        };
        Ok(registration)
    }
}
