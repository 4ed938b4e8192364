//! Catalog type resolution.
//!
//! ```text
//! CatalogSource (pg_catalog rows)
//!       ↓
//! TypeCatalog::resolve   (resolver.rs, session cache)
//!       ↓
//! TypeRef → TypeDescriptor (descriptor.rs)
//! ```
pub mod descriptor;
pub mod resolver;
pub mod source;

pub use descriptor::{BaseType, Field, NativeRepr, Oid, TypeDescriptor, TypeKind, TypeRef};
pub use resolver::TypeCatalog;
pub use source::{AttributeRow, CatalogSnapshot, CatalogSource, TypeClass, TypeRow};
