//! Parameter and result metadata for ad hoc query text.
//!
//! The text is prepared but never executed. Result nullability is looked up
//! in `pg_attribute` for columns that come straight from a table; computed
//! columns are taken as nullable.
use anyhow::{Context, Result};
use tokio_postgres::Client;
use tracing::debug;

use super::exec::server_error;
use crate::ast::number_placeholders;
use crate::catalog::{CatalogSource, Oid, TypeCatalog, TypeRef};

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMeta {
    pub name: String,
    pub type_oid: Oid,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryMetadata {
    /// Parameter type ids by position.
    pub params: Vec<Oid>,
    pub columns: Vec<ColumnMeta>,
}

/// [`QueryMetadata`] with every type id resolved.
#[derive(Debug, Clone)]
pub struct ResolvedQuery {
    pub params: Vec<TypeRef>,
    pub columns: Vec<(String, TypeRef)>,
}

impl QueryMetadata {
    pub fn resolve<S>(&self, catalog: &mut TypeCatalog, source: &S) -> crate::Result<ResolvedQuery>
    where
        S: CatalogSource + ?Sized,
    {
        let params = self
            .params
            .iter()
            .map(|oid| catalog.resolve(source, *oid, true))
            .collect::<crate::Result<Vec<_>>>()?;
        let columns = self
            .columns
            .iter()
            .map(|c| Ok((c.name.clone(), catalog.resolve(source, c.type_oid, c.nullable)?)))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(ResolvedQuery { params, columns })
    }
}

pub async fn describe_query(client: &Client, sql: &str) -> Result<QueryMetadata> {
    let numbered = number_placeholders(sql)?;
    let statement = client
        .prepare(&numbered)
        .await
        .map_err(|e| server_error(e, &numbered))?;

    let params = statement.params().iter().map(|ty| ty.oid()).collect();
    let mut columns = Vec::with_capacity(statement.columns().len());
    for column in statement.columns() {
        let nullable = match (column.table_oid(), column.column_id()) {
            (Some(table), Some(attnum)) => !attribute_not_null(client, table, attnum).await?,
            _ => true,
        };
        columns.push(ColumnMeta {
            name: column.name().to_string(),
            type_oid: column.type_().oid(),
            nullable,
        });
    }

    let metadata = QueryMetadata { params, columns };
    debug!(
        params = metadata.params.len(),
        columns = metadata.columns.len(),
        "described query"
    );
    Ok(metadata)
}

async fn attribute_not_null(client: &Client, table: Oid, attnum: i16) -> Result<bool> {
    let row = client
        .query_opt(
            "SELECT attnotnull FROM pg_catalog.pg_attribute WHERE attrelid = $1 AND attnum = $2",
            &[&table, &attnum],
        )
        .await
        .context("looking up column nullability")?;
    Ok(row.map(|r| r.get::<_, bool>("attnotnull")).unwrap_or(false))
}
