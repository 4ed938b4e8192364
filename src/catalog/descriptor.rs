//! In-memory model of catalog types.
//!
//! A [`TypeDescriptor`] is shared: resolving the same oid twice in one
//! session hands out the same `Arc`. Nullability is a property of the place
//! a type is used (a column, a composite field, a domain), so it lives on
//! [`TypeRef`] and never on the shared descriptor.
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Catalog object identifier (`pg_type.oid`).
pub type Oid = u32;

/// Schema holding the built-in types.
pub const PG_CATALOG: &str = "pg_catalog";

/// The Rust value form a base type is marshalled to and from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeRepr {
    Bool,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Json,
}

impl NativeRepr {
    pub fn label(&self) -> &'static str {
        match self {
            NativeRepr::Bool => "bool",
            NativeRepr::Int16 => "int16",
            NativeRepr::Int32 => "int32",
            NativeRepr::Int64 => "int64",
            NativeRepr::Float32 => "float32",
            NativeRepr::Float64 => "float64",
            NativeRepr::Text => "text",
            NativeRepr::Bytes => "bytes",
            NativeRepr::Uuid => "uuid",
            NativeRepr::Date => "date",
            NativeRepr::Time => "time",
            NativeRepr::Timestamp => "timestamp",
            NativeRepr::TimestampTz => "timestamptz",
            NativeRepr::Json => "json",
        }
    }
}

/// Base types we know how to marshal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Varchar,
    Bpchar,
    Name,
    Bytea,
    Uuid,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Interval,
    Json,
    Jsonb,
    Xml,
    Inet,
    Cidr,
    MacAddr,
}

impl BaseType {
    pub const ALL: [BaseType; 24] = [
        BaseType::Bool,
        BaseType::Int2,
        BaseType::Int4,
        BaseType::Int8,
        BaseType::Float4,
        BaseType::Float8,
        BaseType::Numeric,
        BaseType::Text,
        BaseType::Varchar,
        BaseType::Bpchar,
        BaseType::Name,
        BaseType::Bytea,
        BaseType::Uuid,
        BaseType::Date,
        BaseType::Time,
        BaseType::Timestamp,
        BaseType::Timestamptz,
        BaseType::Interval,
        BaseType::Json,
        BaseType::Jsonb,
        BaseType::Xml,
        BaseType::Inet,
        BaseType::Cidr,
        BaseType::MacAddr,
    ];

    /// Look up a base type by its `pg_type.typname`.
    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.type_name() == name)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            BaseType::Bool => "bool",
            BaseType::Int2 => "int2",
            BaseType::Int4 => "int4",
            BaseType::Int8 => "int8",
            BaseType::Float4 => "float4",
            BaseType::Float8 => "float8",
            BaseType::Numeric => "numeric",
            BaseType::Text => "text",
            BaseType::Varchar => "varchar",
            BaseType::Bpchar => "bpchar",
            BaseType::Name => "name",
            BaseType::Bytea => "bytea",
            BaseType::Uuid => "uuid",
            BaseType::Date => "date",
            BaseType::Time => "time",
            BaseType::Timestamp => "timestamp",
            BaseType::Timestamptz => "timestamptz",
            BaseType::Interval => "interval",
            BaseType::Json => "json",
            BaseType::Jsonb => "jsonb",
            BaseType::Xml => "xml",
            BaseType::Inet => "inet",
            BaseType::Cidr => "cidr",
            BaseType::MacAddr => "macaddr",
        }
    }

    /// Well-known oid of the built-in type and of its array type.
    pub fn oids(&self) -> (Oid, Oid) {
        match self {
            BaseType::Bool => (16, 1000),
            BaseType::Bytea => (17, 1001),
            BaseType::Name => (19, 1003),
            BaseType::Int8 => (20, 1016),
            BaseType::Int2 => (21, 1005),
            BaseType::Int4 => (23, 1007),
            BaseType::Text => (25, 1009),
            BaseType::Json => (114, 199),
            BaseType::Xml => (142, 143),
            BaseType::Cidr => (650, 651),
            BaseType::Float4 => (700, 1021),
            BaseType::Float8 => (701, 1022),
            BaseType::MacAddr => (829, 1040),
            BaseType::Inet => (869, 1041),
            BaseType::Bpchar => (1042, 1014),
            BaseType::Varchar => (1043, 1015),
            BaseType::Date => (1082, 1182),
            BaseType::Time => (1083, 1183),
            BaseType::Timestamp => (1114, 1115),
            BaseType::Timestamptz => (1184, 1185),
            BaseType::Interval => (1186, 1187),
            BaseType::Numeric => (1700, 1231),
            BaseType::Uuid => (2950, 2951),
            BaseType::Jsonb => (3802, 3807),
        }
    }

    pub fn native(&self) -> NativeRepr {
        match self {
            BaseType::Bool => NativeRepr::Bool,
            BaseType::Int2 => NativeRepr::Int16,
            BaseType::Int4 => NativeRepr::Int32,
            BaseType::Int8 => NativeRepr::Int64,
            BaseType::Float4 => NativeRepr::Float32,
            BaseType::Float8 => NativeRepr::Float64,
            BaseType::Bytea => NativeRepr::Bytes,
            BaseType::Uuid => NativeRepr::Uuid,
            BaseType::Date => NativeRepr::Date,
            BaseType::Time => NativeRepr::Time,
            BaseType::Timestamp => NativeRepr::Timestamp,
            BaseType::Timestamptz => NativeRepr::TimestampTz,
            BaseType::Json | BaseType::Jsonb => NativeRepr::Json,
            BaseType::Numeric
            | BaseType::Text
            | BaseType::Varchar
            | BaseType::Bpchar
            | BaseType::Name
            | BaseType::Interval
            | BaseType::Xml
            | BaseType::Inet
            | BaseType::Cidr
            | BaseType::MacAddr => NativeRepr::Text,
        }
    }

    /// Types whose parameters must be written as `CAST(? AS type)` because
    /// the server cannot infer them from a textual or document value.
    pub fn needs_cast(&self) -> bool {
        matches!(
            self,
            BaseType::Numeric
                | BaseType::Interval
                | BaseType::Json
                | BaseType::Jsonb
                | BaseType::Xml
                | BaseType::Inet
                | BaseType::Cidr
                | BaseType::MacAddr
        )
    }
}

/// A member of a composite type, in attribute-number order.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    /// Sentinel for oid 0: a slot with no meaningful type, such as DEFAULT.
    Unknown,
    Base(BaseType),
    Domain(TypeRef),
    Composite(Vec<Field>),
    Enum(Vec<String>),
    Array(TypeRef),
    Range(TypeRef),
}

impl TypeKind {
    pub fn label(&self) -> &'static str {
        match self {
            TypeKind::Unknown => "unknown",
            TypeKind::Base(_) => "base",
            TypeKind::Domain(_) => "domain",
            TypeKind::Composite(_) => "composite",
            TypeKind::Enum(_) => "enum",
            TypeKind::Array(_) => "array",
            TypeKind::Range(_) => "range",
        }
    }
}

#[derive(Debug)]
pub struct TypeDescriptor {
    oid: Oid,
    name: String,
    schema: String,
    array_oid: Option<Oid>,
    kind: TypeKind,
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.oid == other.oid
    }
}

impl TypeDescriptor {
    pub fn new(
        oid: Oid,
        name: impl Into<String>,
        schema: impl Into<String>,
        array_oid: Option<Oid>,
        kind: TypeKind,
    ) -> Self {
        Self {
            oid,
            name: name.into(),
            schema: schema.into(),
            array_oid,
            kind,
        }
    }

    /// The oid-0 sentinel.
    pub fn unknown() -> Arc<Self> {
        Arc::new(Self::new(0, "unknown", PG_CATALOG, None, TypeKind::Unknown))
    }

    /// A descriptor for a built-in base type that does not require a catalog
    /// round trip, e.g. for LIMIT parameters.
    pub fn builtin(base: BaseType) -> Arc<Self> {
        let (oid, array_oid) = base.oids();
        Arc::new(Self::new(
            oid,
            base.type_name(),
            PG_CATALOG,
            Some(array_oid),
            TypeKind::Base(base),
        ))
    }

    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Unqualified catalog name (`typname`).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    /// Oid of the array type whose elements are this type, if the catalog
    /// has one.
    pub fn array_oid(&self) -> Option<Oid> {
        self.array_oid
    }

    /// Name usable in a cast expression. Arrays are spelled `element[]`.
    pub fn sql_name(&self) -> String {
        match &self.kind {
            TypeKind::Array(element) => format!("{}[]", element.sql_name()),
            _ => self.name.clone(),
        }
    }

    /// Whether a parameter of this type must be rendered with an explicit
    /// cast.
    pub fn needs_cast(&self) -> bool {
        match &self.kind {
            TypeKind::Unknown => false,
            TypeKind::Base(base) => base.needs_cast(),
            TypeKind::Domain(inner) => inner.needs_cast(),
            TypeKind::Array(element) => element.needs_cast(),
            TypeKind::Enum(_) | TypeKind::Composite(_) | TypeKind::Range(_) => true,
        }
    }
}

/// A use of a shared descriptor, carrying the nullability of that use.
#[derive(Debug, Clone)]
pub struct TypeRef {
    descriptor: Arc<TypeDescriptor>,
    nullable: bool,
}

impl PartialEq for TypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.nullable == other.nullable && self.descriptor == other.descriptor
    }
}

impl std::ops::Deref for TypeRef {
    type Target = TypeDescriptor;

    fn deref(&self) -> &TypeDescriptor {
        &self.descriptor
    }
}

impl TypeRef {
    pub fn new(descriptor: Arc<TypeDescriptor>, nullable: bool) -> Self {
        Self {
            descriptor,
            nullable,
        }
    }

    pub fn builtin(base: BaseType, nullable: bool) -> Self {
        Self::new(TypeDescriptor::builtin(base), nullable)
    }

    pub fn unknown() -> Self {
        Self::new(TypeDescriptor::unknown(), true)
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }

    pub fn with_nullable(&self, nullable: bool) -> Self {
        Self {
            descriptor: Arc::clone(&self.descriptor),
            nullable,
        }
    }

    /// True when both uses point at the very same descriptor instance.
    pub fn same_instance(&self, other: &TypeRef) -> bool {
        Arc::ptr_eq(&self.descriptor, &other.descriptor)
    }

    /// The array type whose elements are this type. Fails when the catalog
    /// never told us which oid that array type has.
    ///
    /// This builds a fresh descriptor outside the session cache, so two calls
    /// on the same column yield equal but distinct instances. Resolve the
    /// array oid through [`TypeCatalog`](crate::catalog::TypeCatalog) when a
    /// shared instance matters.
    pub fn array_of(&self) -> Result<TypeRef> {
        let array_oid = self.descriptor.array_oid().ok_or_else(|| {
            Error::ParameterShape(format!("type {} has no array type", self.sql_name()))
        })?;
        let descriptor = TypeDescriptor::new(
            array_oid,
            format!("_{}", self.name()),
            self.schema(),
            None,
            TypeKind::Array(self.with_nullable(true)),
        );
        Ok(TypeRef::new(Arc::new(descriptor), false))
    }

    /// Multi-line rendering of the descriptor tree, one node per line.
    pub fn tree(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let null_str = if self.nullable { "" } else { " not null" };
        out.push_str(&format!(
            "{}{} ({} {}){}\n",
            pad,
            self.sql_name(),
            self.kind().label(),
            self.oid(),
            null_str
        ));
        match self.kind() {
            TypeKind::Domain(inner) | TypeKind::Array(inner) | TypeKind::Range(inner) => {
                inner.write_tree(out, depth + 1)
            }
            TypeKind::Composite(fields) => {
                for field in fields {
                    out.push_str(&format!("{}  .{}\n", pad, field.name));
                    field.ty.write_tree(out, depth + 2);
                }
            }
            TypeKind::Enum(labels) => {
                out.push_str(&format!("{}  [{}]\n", pad, labels.join(", ")));
            }
            TypeKind::Unknown | TypeKind::Base(_) => {}
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "{}", self.sql_name())
        } else {
            write!(f, "{} not null", self.sql_name())
        }
    }
}
