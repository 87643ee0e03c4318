use uuid::Uuid;

/// Separator placed between the two endpoint names before hashing.
/// Qualified names never contain it.
const ENDPOINT_SEPARATOR: char = '|';

pub fn uuid_v5_u128(ns: Uuid, name: &str) -> u128 {
    Uuid::new_v5(&ns, name.as_bytes()).as_u128()
}

pub fn stable_edge_id_u128(from: &str, to: &str) -> u128 {
    // name 形如 "default/postgres/1700000000/db/public/orders|default/s3/1700000001/db/raw/orders"
    let name = format!("{from}{ENDPOINT_SEPARATOR}{to}");
    uuid_v5_u128(Uuid::NAMESPACE_OID, &name)
}

/// Derives the process id of a lineage edge from the qualified names of its
/// endpoints. Direction matters: `(a, b)` and `(b, a)` hash differently.
///
/// The result is a 32 character lowercase hex token, safe to embed in a
/// `/`-separated qualified name whatever the endpoint names contain.
pub fn derive_process_id(source_qualified_name: &str, target_qualified_name: &str) -> String {
    format!(
        "{:032x}",
        stable_edge_id_u128(source_qualified_name, target_qualified_name)
    )
}
