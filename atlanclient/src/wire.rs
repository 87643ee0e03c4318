//! JSON shapes of the Atlan metadata API.
//!
//! Search requests are Elasticsearch DSL wrapped in `{"dsl": ...}`. Entities
//! travel as `{typeName, guid, status, attributes}` where references to other
//! entities are `{typeName, guid}` or `{typeName, uniqueAttributes:
//! {qualifiedName}}`.

use crate::error::Result;
use catalink::models::{
    AssetAttributes, AssetDraft, AssetKind, AssetRef, CatalogAsset, EntityStatus, SaveResponse,
};
use catalink::query::{Attribute, SearchRequest};
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};

/// Attributes requested on every search hit.
pub const SEARCH_ATTRIBUTES: &[&str] = &[
    "name",
    "qualifiedName",
    "connectionQualifiedName",
    "connectorName",
    "databaseQualifiedName",
    "schemaQualifiedName",
    "tableQualifiedName",
    "order",
    "dataType",
    "description",
    "inputs",
    "outputs",
    "adminRoles",
    "adminUsers",
    "adminGroups",
    "database",
    "atlanSchema",
    "table",
    "process",
];

/// Attribute carrying an entity's containment relationship.
pub fn parent_relationship(kind: AssetKind) -> Option<&'static str> {
    match kind {
        AssetKind::Schema => Some("database"),
        AssetKind::Table => Some("atlanSchema"),
        AssetKind::Column => Some("table"),
        AssetKind::ColumnProcess => Some("process"),
        _ => None,
    }
}

fn index_field(attribute: Attribute) -> &'static str {
    match attribute {
        Attribute::TypeName => "__typeName.keyword",
        Attribute::Status => "__state",
        Attribute::Name => "name.keyword",
        other => other.as_str(),
    }
}

pub fn search_body(request: &SearchRequest) -> Value {
    let filters: Vec<Value> = request
        .predicates
        .iter()
        .map(|predicate| {
            let field = index_field(predicate.attribute);
            if predicate.case_insensitive {
                json!({ "term": { field: { "value": predicate.value, "case_insensitive": true } } })
            } else {
                json!({ "term": { field: predicate.value } })
            }
        })
        .collect();

    json!({
        "dsl": {
            "from": 0,
            "size": request.page_size,
            "query": { "bool": { "filter": filters } },
            "sort": [{ "__guid": { "order": "asc" } }]
        },
        "attributes": SEARCH_ATTRIBUTES,
        "relationAttributes": ["name", "qualifiedName"],
        "suppressLogs": true
    })
}

pub fn encode_ref(reference: &AssetRef) -> Value {
    match (&reference.guid, &reference.qualified_name) {
        (Some(guid), _) => json!({ "typeName": reference.type_name.type_name(), "guid": guid }),
        (None, Some(qualified_name)) => json!({
            "typeName": reference.type_name.type_name(),
            "uniqueAttributes": { "qualifiedName": qualified_name }
        }),
        (None, None) => json!({ "typeName": reference.type_name.type_name() }),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireRef {
    type_name: String,
    guid: Option<String>,
    unique_attributes: Option<WireUnique>,
    attributes: Option<WireUnique>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUnique {
    qualified_name: Option<String>,
}

pub fn decode_ref(value: &Value) -> Option<AssetRef> {
    let wire: WireRef = serde_json::from_value(value.clone()).ok()?;
    let kind = AssetKind::from_type_name(&wire.type_name)?;
    let qualified_name = wire
        .unique_attributes
        .and_then(|u| u.qualified_name)
        .or_else(|| wire.attributes.and_then(|a| a.qualified_name));
    Some(AssetRef {
        type_name: kind,
        guid: wire.guid,
        qualified_name,
    })
}

/// Request body entity for one draft. New entities get the negative
/// placeholder guid `placeholder`, existing ones their real guid.
pub fn encode_draft(draft: &AssetDraft, placeholder: i64) -> Result<Value> {
    let mut attributes = match serde_json::to_value(&draft.attributes)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for local_only in ["processId", "parent", "inputs", "outputs"] {
        attributes.remove(local_only);
    }
    attributes.insert("name".into(), json!(draft.name));
    attributes.insert("qualifiedName".into(), json!(draft.qualified_name));

    let refs = |list: &[AssetRef]| Value::Array(list.iter().map(encode_ref).collect());
    if !draft.attributes.inputs.is_empty() {
        attributes.insert("inputs".into(), refs(&draft.attributes.inputs));
    }
    if !draft.attributes.outputs.is_empty() {
        attributes.insert("outputs".into(), refs(&draft.attributes.outputs));
    }
    if let (Some(key), Some(parent)) = (parent_relationship(draft.kind), &draft.attributes.parent) {
        attributes.insert(key.into(), encode_ref(parent));
    }

    let guid = draft
        .guid
        .clone()
        .unwrap_or_else(|| placeholder.to_string());
    Ok(json!({
        "typeName": draft.kind.type_name(),
        "guid": guid,
        "attributes": attributes
    }))
}

pub fn bulk_body(drafts: &[AssetDraft]) -> Result<Value> {
    let entities = drafts
        .iter()
        .enumerate()
        .map(|(index, draft)| encode_draft(draft, -(index as i64) - 1))
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({ "entities": entities }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntity {
    type_name: String,
    guid: String,
    status: Option<String>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    relationship_attributes: Map<String, Value>,
}

/// Decodes one entity. Entities of kinds the engine does not handle yield
/// `None`.
pub fn decode_entity(value: &Value) -> Result<Option<CatalogAsset>> {
    let wire: WireEntity = serde_json::from_value(value.clone())?;
    let Some(kind) = AssetKind::from_type_name(&wire.type_name) else {
        debug!("Skipping entity {} of unhandled type {}", wire.guid, wire.type_name);
        return Ok(None);
    };

    let mut raw = wire.attributes;
    raw.retain(|_, v| !v.is_null());
    let take_str = |raw: &Map<String, Value>, key: &str| {
        raw.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
    };
    let name = take_str(&raw, "name");
    let qualified_name = take_str(&raw, "qualifiedName");

    let relation = |key: &str| {
        raw.get(key)
            .or_else(|| wire.relationship_attributes.get(key))
            .cloned()
    };
    let ref_list = |value: Option<Value>| -> Vec<AssetRef> {
        match value {
            Some(Value::Array(items)) => items.iter().filter_map(decode_ref).collect(),
            _ => Vec::new(),
        }
    };
    let inputs = ref_list(relation("inputs"));
    let outputs = ref_list(relation("outputs"));
    let parent = parent_relationship(kind)
        .and_then(|key| relation(key))
        .and_then(|value| decode_ref(&value));

    let mut scalars = raw.clone();
    for key in ["inputs", "outputs", "database", "atlanSchema", "table", "process", "parent"] {
        scalars.remove(key);
    }
    let mut attributes: AssetAttributes = serde_json::from_value(Value::Object(scalars))?;
    attributes.inputs = inputs;
    attributes.outputs = outputs;
    attributes.parent = parent;
    if kind.is_lineage() && attributes.process_id.is_none() {
        attributes.process_id = qualified_name.rsplit('/').next().map(str::to_string);
    }

    Ok(Some(CatalogAsset {
        guid: wire.guid,
        kind,
        name,
        qualified_name,
        status: wire
            .status
            .as_deref()
            .map(EntityStatus::parse)
            .unwrap_or(EntityStatus::Active),
        attributes,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub entities: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResponse {
    #[serde(default)]
    pub mutated_entities: Mutations,
}

#[derive(Debug, Default, Deserialize)]
pub struct Mutations {
    #[serde(rename = "CREATE", default)]
    pub create: Vec<Value>,
    #[serde(rename = "UPDATE", default)]
    pub update: Vec<Value>,
    #[serde(rename = "PARTIAL_UPDATE", default)]
    pub partial_update: Vec<Value>,
}

/// Maps the mutation headers of a bulk save back onto the submitted drafts.
///
/// Headers carry only a few attributes, so each returned asset is completed
/// with the attributes of the draft it answers. Drafts with no header are
/// simply absent from the result.
pub fn decode_mutations(response: BulkResponse, drafts: &[AssetDraft]) -> Result<SaveResponse> {
    let complete = |headers: Vec<Value>| -> Result<Vec<CatalogAsset>> {
        let mut assets = Vec::with_capacity(headers.len());
        for header in &headers {
            let Some(mut asset) = decode_entity(header)? else {
                continue;
            };
            let draft = drafts.iter().find(|draft| {
                draft.kind == asset.kind
                    && (draft.guid.as_deref() == Some(asset.guid.as_str())
                        || draft.qualified_name == asset.qualified_name)
            });
            if let Some(draft) = draft {
                if asset.name.is_empty() {
                    asset.name = draft.name.clone();
                }
                if asset.qualified_name.is_empty() {
                    asset.qualified_name = draft.qualified_name.clone();
                }
                asset.attributes.merge_from(&draft.attributes);
            }
            assets.push(asset);
        }
        Ok(assets)
    };

    let mutations = response.mutated_entities;
    let mut updates = mutations.update;
    updates.extend(mutations.partial_update);
    Ok(SaveResponse {
        created: complete(mutations.create)?,
        updated: complete(updates)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CatalogAsset {
        CatalogAsset {
            guid: "t-1".into(),
            kind: AssetKind::Table,
            name: "customers".into(),
            qualified_name: "default/s3/1/raw/csv/customers".into(),
            status: EntityStatus::Active,
            attributes: AssetAttributes {
                connection_qualified_name: Some("default/s3/1".into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn search_body_uses_keyword_fields() {
        let request = SearchRequest::new()
            .of_kind(AssetKind::Table)
            .active()
            .eq_ignore_case(Attribute::Name, "Customers")
            .eq(Attribute::SchemaQualifiedName, "default/s3/1/raw/csv")
            .page_size(1000);
        let body = search_body(&request);

        assert_eq!(body["dsl"]["size"], 1000);
        let filters = body["dsl"]["query"]["bool"]["filter"].as_array().unwrap();
        assert_eq!(filters[0], json!({"term": {"__typeName.keyword": "Table"}}));
        assert_eq!(filters[1], json!({"term": {"__state": "ACTIVE"}}));
        assert_eq!(
            filters[2],
            json!({"term": {"name.keyword": {"value": "Customers", "case_insensitive": true}}})
        );
        assert_eq!(
            filters[3],
            json!({"term": {"schemaQualifiedName": "default/s3/1/raw/csv"}})
        );
    }

    #[test]
    fn column_draft_references_its_table() {
        let draft = AssetDraft::column("id", &table(), 1);
        let body = encode_draft(&draft, -1).unwrap();

        assert_eq!(body["guid"], "-1");
        assert_eq!(body["typeName"], "Column");
        assert_eq!(body["attributes"]["order"], 1);
        assert_eq!(body["attributes"]["qualifiedName"], "default/s3/1/raw/csv/customers/id");
        assert_eq!(
            body["attributes"]["table"],
            json!({"typeName": "Table", "uniqueAttributes": {"qualifiedName": "default/s3/1/raw/csv/customers"}})
        );
        assert!(body["attributes"].get("parent").is_none());
    }

    #[test]
    fn process_draft_carries_guid_refs_and_no_local_fields() {
        let source = table();
        let mut target = table();
        target.guid = "t-2".into();
        let draft = AssetDraft::process("a -> b", "abc", "default/s3/1", source.to_ref(), target.to_ref());
        let body = encode_draft(&draft, -3).unwrap();

        assert_eq!(body["attributes"]["inputs"], json!([{"typeName": "Table", "guid": "t-1"}]));
        assert_eq!(body["attributes"]["outputs"], json!([{"typeName": "Table", "guid": "t-2"}]));
        assert!(body["attributes"].get("processId").is_none());
    }

    #[test]
    fn decodes_search_hit_with_nulls_and_relationships() {
        let hit = json!({
            "typeName": "ColumnProcess",
            "guid": "cp-1",
            "status": "ACTIVE",
            "attributes": {
                "name": "id -> id",
                "qualifiedName": "default/s3/1/0123abcd",
                "connectionQualifiedName": "default/s3/1",
                "adminRoles": null,
                "inputs": [{"typeName": "Column", "guid": "c-1"}],
                "outputs": [{"typeName": "Column", "guid": "c-2", "uniqueAttributes": {"qualifiedName": "x/id"}}],
                "ownerUsers": ["someone"]
            },
            "relationshipAttributes": {
                "process": {"typeName": "Process", "guid": "p-1"}
            }
        });
        let asset = decode_entity(&hit).unwrap().unwrap();

        assert_eq!(asset.kind, AssetKind::ColumnProcess);
        assert_eq!(asset.attributes.process_id.as_deref(), Some("0123abcd"));
        assert_eq!(asset.attributes.inputs[0].guid.as_deref(), Some("c-1"));
        assert_eq!(asset.attributes.outputs[0].qualified_name.as_deref(), Some("x/id"));
        assert_eq!(asset.attributes.parent.as_ref().and_then(|p| p.guid.as_deref()), Some("p-1"));
        assert!(asset.attributes.admin_roles.is_empty());
    }

    #[test]
    fn unknown_types_are_skipped() {
        let hit = json!({"typeName": "Readme", "guid": "r", "attributes": {}});
        assert!(decode_entity(&hit).unwrap().is_none());
    }

    #[test]
    fn mutations_are_matched_back_to_drafts() {
        let drafts = vec![
            AssetDraft::column("id", &table(), 1),
            AssetDraft::column("name", &table(), 2),
        ];
        let response: BulkResponse = serde_json::from_value(json!({
            "mutatedEntities": {
                "CREATE": [{
                    "typeName": "Column",
                    "guid": "c-9",
                    "status": "ACTIVE",
                    "attributes": {"qualifiedName": "default/s3/1/raw/csv/customers/id", "name": "id"}
                }]
            },
            "guidAssignments": {"-1": "c-9"}
        }))
        .unwrap();

        let saved = decode_mutations(response, &drafts).unwrap();
        assert_eq!(saved.created.len(), 1);
        assert_eq!(saved.created[0].attributes.order, Some(1));
        assert!(saved
            .created_for(AssetKind::Column, "default/s3/1/raw/csv/customers/name")
            .is_none());
        assert!(saved.updated.is_empty());
    }
}
