use serde::{Deserialize, Serialize};
use std::fmt;

use crate::query::Attribute;

/// The kinds of catalog entities the engine reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetKind {
    Connection,
    Database,
    Schema,
    Table,
    Column,
    Process,
    ColumnProcess,
}

impl AssetKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            AssetKind::Connection => "Connection",
            AssetKind::Database => "Database",
            AssetKind::Schema => "Schema",
            AssetKind::Table => "Table",
            AssetKind::Column => "Column",
            AssetKind::Process => "Process",
            AssetKind::ColumnProcess => "ColumnProcess",
        }
    }

    pub fn from_type_name(type_name: &str) -> Option<Self> {
        match type_name {
            "Connection" => Some(AssetKind::Connection),
            "Database" => Some(AssetKind::Database),
            "Schema" => Some(AssetKind::Schema),
            "Table" => Some(AssetKind::Table),
            "Column" => Some(AssetKind::Column),
            "Process" => Some(AssetKind::Process),
            "ColumnProcess" => Some(AssetKind::ColumnProcess),
            _ => None,
        }
    }

    /// The attribute holding the qualified name of a hierarchy node's parent.
    /// Connections and lineage edges have none.
    pub fn parent_attribute(&self) -> Option<Attribute> {
        match self {
            AssetKind::Database => Some(Attribute::ConnectionQualifiedName),
            AssetKind::Schema => Some(Attribute::DatabaseQualifiedName),
            AssetKind::Table => Some(Attribute::SchemaQualifiedName),
            AssetKind::Column => Some(Attribute::TableQualifiedName),
            _ => None,
        }
    }

    pub fn is_lineage(&self) -> bool {
        matches!(self, AssetKind::Process | AssetKind::ColumnProcess)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "DELETED")]
    Archived,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Active => "ACTIVE",
            EntityStatus::Archived => "DELETED",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("ACTIVE") {
            EntityStatus::Active
        } else {
            EntityStatus::Archived
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorType {
    S3,
    Postgres,
    Snowflake,
}

impl ConnectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectorType::S3 => "s3",
            ConnectorType::Postgres => "postgres",
            ConnectorType::Snowflake => "snowflake",
        }
    }
}

/// Non-owning reference to another asset, by guid or by qualified name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub type_name: AssetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualified_name: Option<String>,
}

impl AssetRef {
    pub fn by_guid(kind: AssetKind, guid: impl Into<String>) -> Self {
        Self {
            type_name: kind,
            guid: Some(guid.into()),
            qualified_name: None,
        }
    }

    pub fn by_qualified_name(kind: AssetKind, qualified_name: impl Into<String>) -> Self {
        Self {
            type_name: kind,
            guid: None,
            qualified_name: Some(qualified_name.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssetAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_qualified_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connector_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_qualified_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_qualified_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_qualified_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<AssetRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<AssetRef>,
    /// Containing asset: database for a schema, schema for a table, table for
    /// a column, table-level process for a column process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<AssetRef>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub admin_roles: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub admin_users: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub admin_groups: Vec<String>,
}

impl AssetAttributes {
    /// Applies a partial update: populated fields of `patch` overwrite, empty
    /// ones leave the current value alone.
    pub fn merge_from(&mut self, patch: &AssetAttributes) {
        fn take<T: Clone>(current: &mut Option<T>, patch: &Option<T>) {
            if patch.is_some() {
                current.clone_from(patch);
            }
        }
        fn take_all<T: Clone>(current: &mut Vec<T>, patch: &[T]) {
            if !patch.is_empty() {
                *current = patch.to_vec();
            }
        }

        take(&mut self.connection_qualified_name, &patch.connection_qualified_name);
        take(&mut self.connector_name, &patch.connector_name);
        take(&mut self.database_qualified_name, &patch.database_qualified_name);
        take(&mut self.schema_qualified_name, &patch.schema_qualified_name);
        take(&mut self.table_qualified_name, &patch.table_qualified_name);
        take(&mut self.order, &patch.order);
        take(&mut self.data_type, &patch.data_type);
        take(&mut self.description, &patch.description);
        take(&mut self.process_id, &patch.process_id);
        take_all(&mut self.inputs, &patch.inputs);
        take_all(&mut self.outputs, &patch.outputs);
        take(&mut self.parent, &patch.parent);
        take_all(&mut self.admin_roles, &patch.admin_roles);
        take_all(&mut self.admin_users, &patch.admin_users);
        take_all(&mut self.admin_groups, &patch.admin_groups);
    }

    /// Value of a searchable parent attribute, if this asset carries it.
    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        match attribute {
            Attribute::ConnectionQualifiedName => self.connection_qualified_name.as_deref(),
            Attribute::DatabaseQualifiedName => self.database_qualified_name.as_deref(),
            Attribute::SchemaQualifiedName => self.schema_qualified_name.as_deref(),
            Attribute::TableQualifiedName => self.table_qualified_name.as_deref(),
            _ => None,
        }
    }
}

/// An entity as stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogAsset {
    pub guid: String,
    #[serde(rename = "typeName")]
    pub kind: AssetKind,
    pub name: String,
    pub qualified_name: String,
    pub status: EntityStatus,
    #[serde(default)]
    pub attributes: AssetAttributes,
}

impl CatalogAsset {
    pub fn to_ref(&self) -> AssetRef {
        AssetRef::by_guid(self.kind, self.guid.clone())
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    /// Case-insensitive name comparison.
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Qualified name of a hierarchy node created under `parent_qualified_name`.
pub fn child_qualified_name(parent_qualified_name: &str, name: &str) -> String {
    format!("{parent_qualified_name}/{name}")
}

/// A create or update request for a single asset.
///
/// Constructors compute the qualified name client-side, the same way the
/// catalog SDK's creators do, so that a later run can look the entity up by
/// qualified name without having seen the create response.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetDraft {
    pub kind: AssetKind,
    pub name: String,
    pub qualified_name: String,
    /// Set when the draft updates an existing asset.
    pub guid: Option<String>,
    pub attributes: AssetAttributes,
}

impl AssetDraft {
    pub fn connection(
        name: &str,
        connector: ConnectorType,
        admin_roles: Vec<String>,
        admin_users: Vec<String>,
        admin_groups: Vec<String>,
    ) -> Self {
        Self::connection_at(
            name,
            connector,
            chrono::Utc::now().timestamp(),
            admin_roles,
            admin_users,
            admin_groups,
        )
    }

    /// Connection whose qualified name carries the given epoch second.
    pub fn connection_at(
        name: &str,
        connector: ConnectorType,
        epoch: i64,
        admin_roles: Vec<String>,
        admin_users: Vec<String>,
        admin_groups: Vec<String>,
    ) -> Self {
        let qualified_name = format!("default/{}/{epoch}", connector.as_str());
        Self {
            kind: AssetKind::Connection,
            name: name.to_string(),
            qualified_name,
            guid: None,
            attributes: AssetAttributes {
                connector_name: Some(connector.as_str().to_string()),
                admin_roles,
                admin_users,
                admin_groups,
                ..Default::default()
            },
        }
    }

    pub fn database(name: &str, connection_qualified_name: &str) -> Self {
        Self {
            kind: AssetKind::Database,
            name: name.to_string(),
            qualified_name: child_qualified_name(connection_qualified_name, name),
            guid: None,
            attributes: AssetAttributes {
                connection_qualified_name: Some(connection_qualified_name.to_string()),
                ..Default::default()
            },
        }
    }

    pub fn schema(name: &str, database: &CatalogAsset) -> Self {
        Self {
            kind: AssetKind::Schema,
            name: name.to_string(),
            qualified_name: child_qualified_name(&database.qualified_name, name),
            guid: None,
            attributes: AssetAttributes {
                connection_qualified_name: database.attributes.connection_qualified_name.clone(),
                database_qualified_name: Some(database.qualified_name.clone()),
                parent: Some(AssetRef::by_qualified_name(
                    AssetKind::Database,
                    database.qualified_name.clone(),
                )),
                ..Default::default()
            },
        }
    }

    pub fn table(name: &str, schema: &CatalogAsset) -> Self {
        Self {
            kind: AssetKind::Table,
            name: name.to_string(),
            qualified_name: child_qualified_name(&schema.qualified_name, name),
            guid: None,
            attributes: AssetAttributes {
                connection_qualified_name: schema.attributes.connection_qualified_name.clone(),
                database_qualified_name: schema.attributes.database_qualified_name.clone(),
                schema_qualified_name: Some(schema.qualified_name.clone()),
                parent: Some(AssetRef::by_qualified_name(
                    AssetKind::Schema,
                    schema.qualified_name.clone(),
                )),
                ..Default::default()
            },
        }
    }

    pub fn column(name: &str, table: &CatalogAsset, order: u32) -> Self {
        Self {
            kind: AssetKind::Column,
            name: name.to_string(),
            qualified_name: child_qualified_name(&table.qualified_name, name),
            guid: None,
            attributes: AssetAttributes {
                connection_qualified_name: table.attributes.connection_qualified_name.clone(),
                database_qualified_name: table.attributes.database_qualified_name.clone(),
                schema_qualified_name: table.attributes.schema_qualified_name.clone(),
                table_qualified_name: Some(table.qualified_name.clone()),
                order: Some(order),
                parent: Some(AssetRef::by_qualified_name(
                    AssetKind::Table,
                    table.qualified_name.clone(),
                )),
                ..Default::default()
            },
        }
    }

    /// Table-level lineage edge. The qualified name is the process id scoped
    /// under the owning connection, never the endpoint names.
    pub fn process(
        name: &str,
        process_id: &str,
        connection_qualified_name: &str,
        input: AssetRef,
        output: AssetRef,
    ) -> Self {
        Self {
            kind: AssetKind::Process,
            name: name.to_string(),
            qualified_name: child_qualified_name(connection_qualified_name, process_id),
            guid: None,
            attributes: AssetAttributes {
                connection_qualified_name: Some(connection_qualified_name.to_string()),
                process_id: Some(process_id.to_string()),
                inputs: vec![input],
                outputs: vec![output],
                ..Default::default()
            },
        }
    }

    pub fn column_process(
        name: &str,
        process_id: &str,
        connection_qualified_name: &str,
        input: AssetRef,
        output: AssetRef,
        parent: AssetRef,
    ) -> Self {
        let mut draft = Self::process(name, process_id, connection_qualified_name, input, output);
        draft.kind = AssetKind::ColumnProcess;
        draft.attributes.parent = Some(parent);
        draft
    }

    /// Partial update of an existing asset; only attributes set on the draft
    /// afterwards are written.
    pub fn updater(asset: &CatalogAsset) -> Self {
        Self {
            kind: asset.kind,
            name: asset.name.clone(),
            qualified_name: asset.qualified_name.clone(),
            guid: Some(asset.guid.clone()),
            attributes: AssetAttributes::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.attributes.description = Some(description.into());
        self
    }

    pub fn with_data_type(mut self, data_type: impl Into<String>) -> Self {
        self.attributes.data_type = Some(data_type.into());
        self
    }
}

/// Result of a save call. A draft that appears in neither list failed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveResponse {
    pub created: Vec<CatalogAsset>,
    pub updated: Vec<CatalogAsset>,
}

impl SaveResponse {
    pub fn created_for(&self, kind: AssetKind, qualified_name: &str) -> Option<&CatalogAsset> {
        self.created
            .iter()
            .find(|asset| asset.kind == kind && asset.qualified_name == qualified_name)
    }

    pub fn updated_for(&self, kind: AssetKind, qualified_name: &str) -> Option<&CatalogAsset> {
        self.updated
            .iter()
            .find(|asset| asset.kind == kind && asset.qualified_name == qualified_name)
    }

    pub fn created_of_kind(&self, kind: AssetKind) -> usize {
        self.created.iter().filter(|asset| asset.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty()
    }
}

/// Typed view of a `Process` or `ColumnProcess` asset.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageEdge {
    pub guid: String,
    pub kind: AssetKind,
    pub name: String,
    pub process_id: String,
    pub qualified_name: String,
    pub input: AssetRef,
    pub output: AssetRef,
    pub parent: Option<AssetRef>,
}

impl LineageEdge {
    pub fn from_asset(asset: &CatalogAsset) -> Option<Self> {
        if !asset.kind.is_lineage() {
            return None;
        }
        let attributes = &asset.attributes;
        Some(Self {
            guid: asset.guid.clone(),
            kind: asset.kind,
            name: asset.name.clone(),
            process_id: attributes.process_id.clone().unwrap_or_default(),
            qualified_name: asset.qualified_name.clone(),
            input: attributes.inputs.first()?.clone(),
            output: attributes.outputs.first()?.clone(),
            parent: attributes.parent.clone(),
        })
    }

    pub fn to_ref(&self) -> AssetRef {
        AssetRef::by_guid(self.kind, self.guid.clone())
    }
}

/// A column discovered in a source file, in left-to-right order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    /// 1-based position in the source.
    pub order: u32,
    pub data_type: String,
}
