//! Catalog type resolution.
//!
//! [`TypeCatalog`] is the session cache: it owns every descriptor resolved so
//! far and is passed by `&mut` into each resolution, so two sessions never
//! share state. Once warm it can be read through [`TypeCatalog::lookup`]
//! without mutation.
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use super::descriptor::{BaseType, Field, Oid, TypeDescriptor, TypeKind, TypeRef};
use super::source::{CatalogSource, TypeClass, TypeRow};
use crate::error::{Error, ResolutionFailure, Result};

#[derive(Debug, Default)]
pub struct TypeCatalog {
    cache: HashMap<Oid, Arc<TypeDescriptor>>,
    in_progress: HashSet<Oid>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `oid` into a descriptor, reading whatever catalog rows are
    /// needed from `source`. `nullable` is the nullability of this particular
    /// use and is not remembered.
    pub fn resolve<S>(&mut self, source: &S, oid: Oid, nullable: bool) -> Result<TypeRef>
    where
        S: CatalogSource + ?Sized,
    {
        let descriptor = self.resolve_descriptor(source, oid)?;
        Ok(TypeRef::new(descriptor, nullable))
    }

    /// Read-only access to an already resolved type.
    pub fn lookup(&self, oid: Oid, nullable: bool) -> Option<TypeRef> {
        self.cache
            .get(&oid)
            .map(|descriptor| TypeRef::new(Arc::clone(descriptor), nullable))
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn resolve_descriptor<S>(&mut self, source: &S, oid: Oid) -> Result<Arc<TypeDescriptor>>
    where
        S: CatalogSource + ?Sized,
    {
        if let Some(descriptor) = self.cache.get(&oid) {
            trace!(oid, "type cache hit");
            return Ok(Arc::clone(descriptor));
        }

        if oid == 0 {
            let sentinel = TypeDescriptor::unknown();
            self.cache.insert(0, Arc::clone(&sentinel));
            return Ok(sentinel);
        }

        let row = source
            .type_row(oid)
            .ok_or_else(|| Error::schema(oid, ResolutionFailure::UnknownType))?;

        // Mark before descending into members so a type that contains itself
        // is caught instead of recursing forever.
        if !self.in_progress.insert(oid) {
            return Err(Error::schema(oid, ResolutionFailure::Cycle(row.name)));
        }
        let kind = self.resolve_kind(source, &row);
        self.in_progress.remove(&oid);
        let kind = kind?;

        debug!(oid, name = %row.name, kind = kind.label(), "resolved type");
        let descriptor = Arc::new(TypeDescriptor::new(
            row.oid,
            row.name,
            row.schema,
            row.array_oid,
            kind,
        ));
        self.cache.insert(oid, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    fn resolve_kind<S>(&mut self, source: &S, row: &TypeRow) -> Result<TypeKind>
    where
        S: CatalogSource + ?Sized,
    {
        // Array elements are always nullable in PostgreSQL.
        if let Some(element) = row.element {
            return Ok(TypeKind::Array(self.resolve(source, element, true)?));
        }

        match &row.class {
            TypeClass::Base => BaseType::from_type_name(&row.name)
                .map(TypeKind::Base)
                .ok_or_else(|| {
                    Error::schema(
                        row.oid,
                        ResolutionFailure::UnsupportedBaseType(row.name.clone()),
                    )
                }),
            TypeClass::Composite => {
                let mut fields = Vec::new();
                for attr in source.attributes(row.oid) {
                    let ty = self.resolve(source, attr.type_oid, !attr.not_null)?;
                    fields.push(Field {
                        name: attr.name,
                        ty,
                    });
                }
                Ok(TypeKind::Composite(fields))
            }
            TypeClass::Domain => {
                let base = row.base_type.ok_or_else(|| {
                    Error::schema(row.oid, ResolutionFailure::UnknownKind("domain".into()))
                })?;
                Ok(TypeKind::Domain(self.resolve(source, base, !row.not_null)?))
            }
            TypeClass::Enum => Ok(TypeKind::Enum(source.enum_labels(row.oid))),
            TypeClass::Range => {
                let subtype = source.range_subtype(row.oid).ok_or_else(|| {
                    Error::schema(row.oid, ResolutionFailure::UnknownKind("range".into()))
                })?;
                Ok(TypeKind::Range(self.resolve(source, subtype, false)?))
            }
            TypeClass::Pseudo => Err(Error::schema(
                row.oid,
                ResolutionFailure::PseudoType(row.name.clone()),
            )),
            TypeClass::Multirange => Err(Error::schema(
                row.oid,
                ResolutionFailure::UnknownKind("multirange".into()),
            )),
            TypeClass::Other(code) => Err(Error::schema(
                row.oid,
                ResolutionFailure::UnknownKind(code.clone()),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::catalog::fixtures::{self, ADDRESS, EMAIL, MOOD, MOOD_ARRAY, SPAN};
    use crate::catalog::source::{AttributeRow, CatalogSnapshot, TypeClass, TypeRow};

    struct CountingSource<'a> {
        inner: &'a CatalogSnapshot,
        lookups: RefCell<HashMap<Oid, usize>>,
    }

    impl CatalogSource for CountingSource<'_> {
        fn type_row(&self, oid: Oid) -> Option<TypeRow> {
            *self.lookups.borrow_mut().entry(oid).or_default() += 1;
            self.inner.type_row(oid)
        }

        fn attributes(&self, oid: Oid) -> Vec<AttributeRow> {
            self.inner.attributes(oid)
        }

        fn enum_labels(&self, oid: Oid) -> Vec<String> {
            self.inner.enum_labels(oid)
        }

        fn range_subtype(&self, oid: Oid) -> Option<Oid> {
            self.inner.range_subtype(oid)
        }
    }

    #[test]
    fn test_same_oid_same_instance() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let a = catalog.resolve(&source, MOOD, true).unwrap();
        let b = catalog.resolve(&source, MOOD, false).unwrap();
        assert!(a.same_instance(&b));
        assert!(a.nullable());
        assert!(!b.nullable());
    }

    #[test]
    fn test_repeated_references_are_not_requeried() {
        let snapshot = fixtures::snapshot();
        let source = CountingSource {
            inner: &snapshot,
            lookups: RefCell::new(HashMap::new()),
        };
        let mut catalog = TypeCatalog::new();
        // address has two text-typed members
        catalog.resolve(&source, ADDRESS, true).unwrap();
        catalog.resolve(&source, ADDRESS, true).unwrap();
        catalog.resolve(&source, 25, true).unwrap();
        let lookups = source.lookups.borrow();
        assert_eq!(lookups.get(&ADDRESS), Some(&1));
        assert_eq!(lookups.get(&25), Some(&1));
    }

    #[test]
    fn test_unknown_sentinel() {
        let source = CatalogSnapshot::new();
        let mut catalog = TypeCatalog::new();
        let a = catalog.resolve(&source, 0, true).unwrap();
        let b = catalog.resolve(&source, 0, true).unwrap();
        assert_eq!(a.kind(), &TypeKind::Unknown);
        assert!(a.same_instance(&b));
    }

    #[test]
    fn test_composite_member_nullability() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let address = catalog.resolve(&source, ADDRESS, true).unwrap();
        let TypeKind::Composite(fields) = address.kind() else {
            panic!("expected composite, got {:?}", address.kind());
        };
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["street", "city", "zip"]);
        assert!(!fields[0].ty.nullable());
        assert!(fields[1].ty.nullable());
        assert!(fields[0].ty.same_instance(&fields[1].ty));
    }

    #[test]
    fn test_domain_nullability() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let email = catalog.resolve(&source, EMAIL, true).unwrap();
        match email.kind() {
            TypeKind::Domain(inner) => {
                assert_eq!(inner.name(), "text");
                assert!(!inner.nullable());
            }
            other => panic!("expected domain, got {:?}", other),
        }
    }

    #[test]
    fn test_enum_and_array_of_enum() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let moods = catalog.resolve(&source, MOOD_ARRAY, false).unwrap();
        assert_eq!(moods.sql_name(), "mood[]");
        match moods.kind() {
            TypeKind::Array(element) => match element.kind() {
                TypeKind::Enum(labels) => assert_eq!(labels, &["sad", "ok", "happy"]),
                other => panic!("expected enum, got {:?}", other),
            },
            other => panic!("expected array, got {:?}", other),
        }
        let mood = catalog.lookup(MOOD, true).unwrap();
        assert_eq!(mood.array_oid(), Some(MOOD_ARRAY));
    }

    #[test]
    fn test_range() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let span = catalog.resolve(&source, SPAN, true).unwrap();
        match span.kind() {
            TypeKind::Range(sub) => assert_eq!(sub.name(), "int4"),
            other => panic!("expected range, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_oid_fails() {
        let source = fixtures::snapshot();
        let mut catalog = TypeCatalog::new();
        let err = catalog.resolve(&source, 424242, true).unwrap_err();
        assert_eq!(
            err,
            Error::schema(424242, ResolutionFailure::UnknownType)
        );
    }

    #[test]
    fn test_pseudo_type_fails() {
        let mut source = fixtures::snapshot();
        source.insert_type(TypeRow::new(2249, "record", "pg_catalog", TypeClass::Pseudo));
        let mut catalog = TypeCatalog::new();
        let err = catalog.resolve(&source, 2249, true).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaResolution {
                reason: ResolutionFailure::PseudoType(_),
                ..
            }
        ));
    }

    #[test]
    fn test_unsupported_base_fails() {
        let mut source = fixtures::snapshot();
        source.insert_type(TypeRow::new(3614, "tsvector", "pg_catalog", TypeClass::Base));
        let mut catalog = TypeCatalog::new();
        assert!(catalog.resolve(&source, 3614, true).is_err());
        assert!(catalog.lookup(3614, true).is_none());
    }

    #[test]
    fn test_self_referencing_composite_fails() {
        let mut source = fixtures::snapshot();
        source.insert_type(
            TypeRow::new(91000, "node", "public", TypeClass::Composite).with_array(91001),
        );
        source.insert_type(TypeRow::new(91001, "_node", "public", TypeClass::Base).array_of(91000));
        source.insert_attributes(
            91000,
            vec![
                AttributeRow::new("id", 23, true),
                AttributeRow::new("children", 91001, false),
            ],
        );
        let mut catalog = TypeCatalog::new();
        let err = catalog.resolve(&source, 91000, true).unwrap_err();
        assert!(matches!(
            err,
            Error::SchemaResolution {
                reason: ResolutionFailure::Cycle(_),
                ..
            }
        ));
    }
}
