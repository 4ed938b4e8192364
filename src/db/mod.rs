//! Everything that talks to a live server.
pub mod catalog;
pub mod connection;
pub mod describe;
pub mod exec;
pub mod wire;

pub use catalog::{list_relations, load_snapshot, load_table, RelationInfo, RelationKind};
pub use connection::{create_client, AppConfig, ConnectionConfig, SslMode};
pub use describe::{describe_query, ColumnMeta, QueryMetadata, ResolvedQuery};
pub use exec::{decode_row, execute, query, ErrorCategory, Record, ServerError};
