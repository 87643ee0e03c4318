use crate::catalog::{CatalogService, ADMIN_ROLE};
use crate::errors::Result;
use crate::models::{
    child_qualified_name, AssetDraft, AssetKind, CatalogAsset, ColumnSpec, ConnectorType,
};
use crate::matcher::normalize;
use crate::resolver::{ExistenceResolver, NaturalKey};
use crate::utils::id::derive_process_id;
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Outcome of a create-or-reuse call.
#[derive(Debug, Clone, PartialEq)]
pub enum Upserted {
    Existing(CatalogAsset),
    Created(CatalogAsset),
}

impl Upserted {
    pub fn asset(&self) -> &CatalogAsset {
        match self {
            Upserted::Existing(asset) | Upserted::Created(asset) => asset,
        }
    }

    pub fn into_asset(self) -> CatalogAsset {
        match self {
            Upserted::Existing(asset) | Upserted::Created(asset) => asset,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Upserted::Created(_))
    }
}

/// Desired state of a connection.
#[derive(Debug, Clone)]
pub struct ConnectionSpec {
    pub name: String,
    pub connector: ConnectorType,
    pub admin_users: Vec<String>,
    pub admin_groups: Vec<String>,
}

/// What happened to each column of one table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnReport {
    pub table: String,
    /// Created by this run.
    pub created: Vec<String>,
    /// Already present; left untouched by phase 1.
    pub existing: Vec<String>,
    /// Source columns dropped because an earlier one has the same name
    /// ignoring case.
    pub duplicates: Vec<String>,
    /// Missing from the batch create response.
    pub create_failed: Vec<String>,
    /// Data type written by phase 2.
    pub patched: Vec<String>,
    /// Phase 2 failures with the reason.
    pub patch_failed: Vec<(String, String)>,
}

/// Create-or-reuse for every entity kind.
///
/// An existing active match always wins and is returned unchanged. Creation
/// is attempted once; a response without the created entity is a soft
/// failure (`Ok(None)`), transport errors are returned.
#[derive(Clone)]
pub struct UpsertOrchestrator {
    catalog: Arc<dyn CatalogService>,
    resolver: ExistenceResolver,
}

impl UpsertOrchestrator {
    pub fn new(catalog: Arc<dyn CatalogService>) -> Self {
        let resolver = ExistenceResolver::new(Arc::clone(&catalog));
        Self { catalog, resolver }
    }

    pub fn resolver(&self) -> &ExistenceResolver {
        &self.resolver
    }

    /// Returns the existing entity for `key`, or submits `draft`.
    pub async fn ensure(&self, key: NaturalKey<'_>, draft: AssetDraft) -> Result<Option<Upserted>> {
        if let Some(existing) = self.resolver.find_existing(draft.kind, key).await? {
            info!(
                "Found existing {}: {}",
                existing.kind, existing.qualified_name
            );
            return Ok(Some(Upserted::Existing(existing)));
        }
        self.create(draft).await
    }

    async fn create(&self, draft: AssetDraft) -> Result<Option<Upserted>> {
        let kind = draft.kind;
        let name = draft.name.clone();
        let qualified_name = draft.qualified_name.clone();
        info!("Creating {kind} '{name}' with qualified name '{qualified_name}'.");

        let response = self.catalog.save(vec![draft]).await.inspect_err(|err| {
            error!("Error ensuring {kind} '{name}': {err}");
        })?;

        if let Some(created) = response.created_for(kind, &qualified_name) {
            info!("Created {kind} '{name}' with qualified name '{qualified_name}'.");
            return Ok(Some(Upserted::Created(created.clone())));
        }
        if let Some(updated) = response.updated_for(kind, &qualified_name) {
            // Another writer created it between our lookup and our save.
            warn!("{kind} '{qualified_name}' already existed when saved; reusing it.");
            return Ok(Some(Upserted::Existing(updated.clone())));
        }
        error!("Failed to create {kind} '{name}'.");
        Ok(None)
    }

    pub async fn ensure_connection(&self, spec: &ConnectionSpec) -> Result<Option<Upserted>> {
        info!("Ensuring connection '{}' exists.", spec.name);
        if let Some(existing) = self.resolver.connection_by_name(&spec.name).await? {
            info!("Found existing Connection: {}", existing.qualified_name);
            return Ok(Some(Upserted::Existing(existing)));
        }

        let admin_roles = match self.catalog.role_guid(ADMIN_ROLE).await? {
            Some(guid) => vec![guid],
            None => {
                warn!("Role '{ADMIN_ROLE}' not found; creating connection '{}' without admin roles.", spec.name);
                Vec::new()
            }
        };
        // Qualified names only have second resolution; step past any taken one.
        let mut epoch = chrono::Utc::now().timestamp();
        loop {
            let candidate = format!("default/{}/{epoch}", spec.connector.as_str());
            let taken = self
                .catalog
                .get_by_qualified_name(AssetKind::Connection, &candidate)
                .await?;
            if taken.is_none() {
                break;
            }
            epoch += 1;
        }
        let draft = AssetDraft::connection_at(
            &spec.name,
            spec.connector,
            epoch,
            admin_roles,
            spec.admin_users.clone(),
            spec.admin_groups.clone(),
        );
        self.create(draft).await
    }

    pub async fn ensure_database(
        &self,
        name: &str,
        connection_qualified_name: &str,
    ) -> Result<Option<Upserted>> {
        info!("Ensuring Database '{name}' exists under Connection '{connection_qualified_name}'.");
        self.ensure(
            NaturalKey::named(name, connection_qualified_name),
            AssetDraft::database(name, connection_qualified_name),
        )
        .await
    }

    pub async fn ensure_schema(&self, name: &str, database: &CatalogAsset) -> Result<Option<Upserted>> {
        info!(
            "Ensuring Schema '{name}' exists under Database '{}'.",
            database.qualified_name
        );
        self.ensure(
            NaturalKey::named(name, &database.qualified_name),
            AssetDraft::schema(name, database),
        )
        .await
    }

    pub async fn ensure_table(&self, name: &str, schema: &CatalogAsset) -> Result<Option<Upserted>> {
        info!(
            "Ensuring Table '{name}' exists under Schema '{}'.",
            schema.qualified_name
        );
        self.ensure(
            NaturalKey::named(name, &schema.qualified_name),
            AssetDraft::table(name, schema),
        )
        .await
    }

    /// Two-phase column registration for one table.
    ///
    /// Phase 1 creates every column that does not exist yet in a single batch,
    /// numbered by its position in the source. Existing columns keep their
    /// order. Of several source columns with the same name ignoring case only
    /// the first is kept. Phase 2 fetches each column by qualified name and
    /// writes its data type when none is recorded; a failure there is logged
    /// against that column only.
    pub async fn ensure_columns(&self, table: &CatalogAsset, specs: &[ColumnSpec]) -> Result<ColumnReport> {
        let mut report = ColumnReport {
            table: table.name.clone(),
            ..Default::default()
        };

        let existing: HashMap<String, CatalogAsset> = self
            .resolver
            .columns_of_table(table)
            .await?
            .into_iter()
            .map(|column| (normalize(&column.name), column))
            .collect();

        let mut seen = HashSet::new();
        let mut columns: Vec<&ColumnSpec> = Vec::with_capacity(specs.len());
        for spec in specs {
            if seen.insert(normalize(&spec.name)) {
                columns.push(spec);
            } else {
                warn!(
                    "Column '{}' of Table '{}' repeats an earlier column name; skipping it.",
                    spec.name, table.name
                );
                report.duplicates.push(spec.name.clone());
            }
        }

        let drafts: Vec<AssetDraft> = columns
            .iter()
            .filter(|spec| !existing.contains_key(&normalize(&spec.name)))
            .map(|spec| {
                info!(
                    "Creating Column '{}' (order {}) under Table '{}'.",
                    spec.name, spec.order, table.name
                );
                AssetDraft::column(&spec.name, table, spec.order)
            })
            .collect();

        if !drafts.is_empty() {
            let response = self.catalog.save(drafts.clone()).await.inspect_err(|err| {
                error!("Error creating columns for Table '{}': {err}", table.name);
            })?;
            info!(
                "Created {} columns for Table '{}'.",
                response.created_of_kind(AssetKind::Column),
                table.name
            );
            for draft in &drafts {
                if response.created_for(AssetKind::Column, &draft.qualified_name).is_some() {
                    report.created.push(draft.name.clone());
                    continue;
                }
                match response.updated_for(AssetKind::Column, &draft.qualified_name) {
                    Some(column) => {
                        warn!(
                            "Column '{}' of Table '{}' already existed but was not listed; keeping it as existing.",
                            draft.name, table.name
                        );
                        report.existing.push(column.name.clone());
                    }
                    None => {
                        warn!(
                            "Column '{}' of Table '{}' was not created; skipping it.",
                            draft.name, table.name
                        );
                        report.create_failed.push(draft.name.clone());
                    }
                }
            }
        }

        for spec in columns {
            let key = normalize(&spec.name);
            let qualified_name = match existing.get(&key) {
                Some(column) => {
                    report.existing.push(column.name.clone());
                    if column.attributes.data_type.is_some() {
                        continue;
                    }
                    column.qualified_name.clone()
                }
                None if report.created.contains(&spec.name) => {
                    child_qualified_name(&table.qualified_name, &spec.name)
                }
                None => continue,
            };

            match self.patch_data_type(&qualified_name, &spec.data_type).await {
                Ok(()) => {
                    info!(
                        "Updated Column '{}' with data_type '{}'.",
                        spec.name, spec.data_type
                    );
                    report.patched.push(spec.name.clone());
                }
                Err(reason) => {
                    error!(
                        "An error occurred while updating the column '{}': {reason}",
                        spec.name
                    );
                    report.patch_failed.push((spec.name.clone(), reason));
                }
            }
        }

        Ok(report)
    }

    async fn patch_data_type(&self, qualified_name: &str, data_type: &str) -> std::result::Result<(), String> {
        let column = self
            .catalog
            .get_by_qualified_name(AssetKind::Column, qualified_name)
            .await
            .map_err(|err| err.to_string())?
            .ok_or_else(|| format!("Column with qualified name '{qualified_name}' not found."))?;
        info!(
            "Retrieved Column '{}' with current data type '{}'.",
            column.name,
            column.attributes.data_type.as_deref().unwrap_or("none")
        );

        let response = self
            .catalog
            .save(vec![AssetDraft::updater(&column).with_data_type(data_type)])
            .await
            .map_err(|err| err.to_string())?;
        if response.is_empty() {
            return Err(format!("Failed to update data_type for Column '{}'.", column.name));
        }
        Ok(())
    }

    /// Table-level lineage edge from `source` to `target`, owned by the
    /// connection `connection_qualified_name`.
    pub async fn ensure_table_edge(
        &self,
        source: &CatalogAsset,
        target: &CatalogAsset,
        connection_qualified_name: &str,
    ) -> Result<Option<Upserted>> {
        let process_id = derive_process_id(&source.qualified_name, &target.qualified_name);
        let draft = AssetDraft::process(
            &format!("{} -> {}", source.name, target.name),
            &process_id,
            connection_qualified_name,
            source.to_ref(),
            target.to_ref(),
        )
        .with_description(format!("Lineage from {} to {}", source.name, target.name));
        self.ensure_edge(draft).await
    }

    /// Column-level lineage edge, parented to the table-level edge. Its
    /// identity depends only on the two columns.
    pub async fn ensure_column_edge(
        &self,
        source: &CatalogAsset,
        target: &CatalogAsset,
        parent: &CatalogAsset,
        connection_qualified_name: &str,
    ) -> Result<Option<Upserted>> {
        let process_id = derive_process_id(&source.qualified_name, &target.qualified_name);
        let draft = AssetDraft::column_process(
            &format!("{} -> {}", source.name, target.name),
            &process_id,
            connection_qualified_name,
            source.to_ref(),
            target.to_ref(),
            parent.to_ref(),
        )
        .with_description(format!("Lineage from {} to {}", source.name, target.name));
        self.ensure_edge(draft).await
    }

    async fn ensure_edge(&self, draft: AssetDraft) -> Result<Option<Upserted>> {
        let existing = self
            .resolver
            .find_existing(draft.kind, NaturalKey::Qualified(&draft.qualified_name))
            .await?;
        if let Some(existing) = existing {
            info!(
                "{} with qualified_name '{}' already exists. Using existing {}.",
                draft.kind, draft.qualified_name, draft.kind
            );
            return Ok(Some(Upserted::Existing(existing)));
        }
        self.create(draft).await
    }
}
