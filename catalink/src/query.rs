use crate::models::{AssetKind, EntityStatus};

/// Single-entity lookups only ever need the first hit.
pub const LOOKUP_PAGE_SIZE: usize = 1;
/// Upper bound when listing every table under a connection.
pub const TABLE_PAGE_SIZE: usize = 1000;
/// Upper bound when listing the columns of one table.
pub const COLUMN_PAGE_SIZE: usize = 1000;

/// Searchable catalog attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    TypeName,
    Status,
    Name,
    QualifiedName,
    ConnectionQualifiedName,
    DatabaseQualifiedName,
    SchemaQualifiedName,
    TableQualifiedName,
}

impl Attribute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attribute::TypeName => "__typeName",
            Attribute::Status => "__state",
            Attribute::Name => "name",
            Attribute::QualifiedName => "qualifiedName",
            Attribute::ConnectionQualifiedName => "connectionQualifiedName",
            Attribute::DatabaseQualifiedName => "databaseQualifiedName",
            Attribute::SchemaQualifiedName => "schemaQualifiedName",
            Attribute::TableQualifiedName => "tableQualifiedName",
        }
    }
}

/// An equality predicate. Comparison is exact unless `case_insensitive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    pub attribute: Attribute,
    pub value: String,
    pub case_insensitive: bool,
}

/// A conjunction of predicates plus a page size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub predicates: Vec<Predicate>,
    pub page_size: usize,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            predicates: Vec::new(),
            page_size: LOOKUP_PAGE_SIZE,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(self, kind: AssetKind) -> Self {
        self.eq(Attribute::TypeName, kind.type_name())
    }

    pub fn active(self) -> Self {
        self.eq(Attribute::Status, EntityStatus::Active.as_str())
    }

    pub fn eq(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate {
            attribute,
            value: value.into(),
            case_insensitive: false,
        });
        self
    }

    pub fn eq_ignore_case(mut self, attribute: Attribute, value: impl Into<String>) -> Self {
        self.predicates.push(Predicate {
            attribute,
            value: value.into(),
            case_insensitive: true,
        });
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// The kind this request is restricted to, if any.
    pub fn kind(&self) -> Option<AssetKind> {
        self.predicates
            .iter()
            .find(|predicate| predicate.attribute == Attribute::TypeName)
            .and_then(|predicate| AssetKind::from_type_name(&predicate.value))
    }
}
