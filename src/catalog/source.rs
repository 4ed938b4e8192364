//! The catalog query surface the resolver reads from.
//!
//! [`CatalogSource`] is the seam between resolution and the database: the
//! resolver only ever asks these four questions. [`CatalogSnapshot`] answers
//! them from memory; `db::catalog::load_snapshot` fills one from `pg_catalog`.
use std::collections::HashMap;

use super::descriptor::{BaseType, Oid, PG_CATALOG};

/// `pg_type.typtype`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeClass {
    Base,
    Composite,
    Domain,
    Enum,
    Pseudo,
    Range,
    Multirange,
    Other(String),
}

impl TypeClass {
    pub fn from_typtype(code: &str) -> Self {
        match code {
            "b" => TypeClass::Base,
            "c" => TypeClass::Composite,
            "d" => TypeClass::Domain,
            "e" => TypeClass::Enum,
            "p" => TypeClass::Pseudo,
            "r" => TypeClass::Range,
            "m" => TypeClass::Multirange,
            other => TypeClass::Other(other.to_string()),
        }
    }
}

/// One `pg_type` row, reduced to what resolution needs.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRow {
    pub oid: Oid,
    pub name: String,
    pub schema: String,
    pub class: TypeClass,
    /// Element type when the row is array-shaped.
    pub element: Option<Oid>,
    /// `typarray`: the array type over this one.
    pub array_oid: Option<Oid>,
    /// Wrapped type of a domain.
    pub base_type: Option<Oid>,
    /// `typnotnull` of a domain.
    pub not_null: bool,
}

impl TypeRow {
    pub fn new(oid: Oid, name: impl Into<String>, schema: impl Into<String>, class: TypeClass) -> Self {
        Self {
            oid,
            name: name.into(),
            schema: schema.into(),
            class,
            element: None,
            array_oid: None,
            base_type: None,
            not_null: false,
        }
    }

    pub fn with_array(mut self, array_oid: Oid) -> Self {
        self.array_oid = Some(array_oid);
        self
    }

    pub fn array_of(mut self, element: Oid) -> Self {
        self.element = Some(element);
        self
    }

    pub fn domain_over(mut self, base_type: Oid, not_null: bool) -> Self {
        self.base_type = Some(base_type);
        self.not_null = not_null;
        self
    }
}

/// One live attribute of a composite type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRow {
    pub name: String,
    pub type_oid: Oid,
    pub not_null: bool,
}

impl AttributeRow {
    pub fn new(name: impl Into<String>, type_oid: Oid, not_null: bool) -> Self {
        Self {
            name: name.into(),
            type_oid,
            not_null,
        }
    }
}

pub trait CatalogSource {
    /// The `pg_type` row for `oid`, if the catalog has one.
    fn type_row(&self, oid: Oid) -> Option<TypeRow>;

    /// Attributes of a composite type in attribute-number order.
    fn attributes(&self, oid: Oid) -> Vec<AttributeRow>;

    /// Labels of an enum type in sort order.
    fn enum_labels(&self, oid: Oid) -> Vec<String>;

    /// Subtype of a range type.
    fn range_subtype(&self, oid: Oid) -> Option<Oid>;
}

/// An in-memory copy of the catalog rows for one schema plus `pg_catalog`.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    types: HashMap<Oid, TypeRow>,
    attributes: HashMap<Oid, Vec<AttributeRow>>,
    enums: HashMap<Oid, Vec<String>>,
    ranges: HashMap<Oid, Oid>,
}

impl CatalogSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot that already knows every built-in base type and its array.
    pub fn with_builtins() -> Self {
        let mut snapshot = Self::new();
        for base in BaseType::ALL {
            let (oid, array_oid) = base.oids();
            snapshot.insert_type(
                TypeRow::new(oid, base.type_name(), PG_CATALOG, TypeClass::Base)
                    .with_array(array_oid),
            );
            snapshot.insert_type(
                TypeRow::new(
                    array_oid,
                    format!("_{}", base.type_name()),
                    PG_CATALOG,
                    TypeClass::Base,
                )
                .array_of(oid),
            );
        }
        snapshot
    }

    pub fn insert_type(&mut self, row: TypeRow) {
        self.types.insert(row.oid, row);
    }

    pub fn insert_attributes(&mut self, oid: Oid, rows: Vec<AttributeRow>) {
        self.attributes.insert(oid, rows);
    }

    pub fn push_attribute(&mut self, oid: Oid, row: AttributeRow) {
        self.attributes.entry(oid).or_default().push(row);
    }

    pub fn insert_enum(&mut self, oid: Oid, labels: Vec<String>) {
        self.enums.insert(oid, labels);
    }

    pub fn push_enum_label(&mut self, oid: Oid, label: String) {
        self.enums.entry(oid).or_default().push(label);
    }

    pub fn insert_range(&mut self, oid: Oid, subtype: Oid) {
        self.ranges.insert(oid, subtype);
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Find a type by schema and name.
    pub fn find_type(&self, schema: &str, name: &str) -> Option<&TypeRow> {
        self.types
            .values()
            .find(|row| row.schema == schema && row.name == name)
    }
}

impl CatalogSource for CatalogSnapshot {
    fn type_row(&self, oid: Oid) -> Option<TypeRow> {
        self.types.get(&oid).cloned()
    }

    fn attributes(&self, oid: Oid) -> Vec<AttributeRow> {
        self.attributes.get(&oid).cloned().unwrap_or_default()
    }

    fn enum_labels(&self, oid: Oid) -> Vec<String> {
        self.enums.get(&oid).cloned().unwrap_or_default()
    }

    fn range_subtype(&self, oid: Oid) -> Option<Oid> {
        self.ranges.get(&oid).copied()
    }
}
