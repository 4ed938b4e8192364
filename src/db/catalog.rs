//! Loading catalog rows from a live server.
//!
//! The snapshot covers `pg_catalog` plus one user schema. It is read once
//! per session; resolution then runs against it without further queries.
use anyhow::{bail, Context, Result};
use tokio_postgres::Client;
use tracing::{debug, info};

use crate::ast::Table;
use crate::catalog::{
    AttributeRow, CatalogSnapshot, CatalogSource, Oid, TypeCatalog, TypeClass, TypeRow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    Table,
    View,
    MaterializedView,
    ForeignTable,
    Partitioned,
}

impl RelationKind {
    fn from_relkind(code: &str) -> Option<Self> {
        match code {
            "r" => Some(RelationKind::Table),
            "v" => Some(RelationKind::View),
            "m" => Some(RelationKind::MaterializedView),
            "f" => Some(RelationKind::ForeignTable),
            "p" => Some(RelationKind::Partitioned),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RelationKind::Table => "TABLE",
            RelationKind::View => "VIEW",
            RelationKind::MaterializedView => "MVIEW",
            RelationKind::ForeignTable => "FOREIGN",
            RelationKind::Partitioned => "PARTITIONED",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RelationInfo {
    pub name: String,
    pub kind: RelationKind,
    pub row_estimate: i64,
}

/// Read every type visible from `schema` together with the composite
/// attributes, enum labels and range subtypes resolution needs.
pub async fn load_snapshot(client: &Client, schema: &str) -> Result<CatalogSnapshot> {
    let mut snapshot = CatalogSnapshot::new();

    let rows = client
        .query(
            r#"
            SELECT
                t.oid,
                t.typname::text AS name,
                n.nspname::text AS schema,
                t.typtype::text AS typtype,
                t.typcategory::text AS category,
                COALESCE(e.typarray = t.oid, false) AS element_links_back,
                t.typelem AS element,
                t.typarray AS array_oid,
                t.typbasetype AS base_type,
                t.typnotnull AS not_null
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            LEFT JOIN pg_catalog.pg_type e ON e.oid = t.typelem
            WHERE n.nspname IN ('pg_catalog', $1)
            "#,
            &[&schema],
        )
        .await
        .context("loading pg_type")?;
    for row in &rows {
        let typtype: String = row.get("typtype");
        let category: String = row.get("category");
        let links_back: bool = row.get("element_links_back");
        let element: Oid = row.get("element");
        let array_oid: Oid = row.get("array_oid");
        let class = TypeClass::from_typtype(&typtype);

        let mut type_row = TypeRow::new(
            row.get("oid"),
            row.get::<_, String>("name"),
            row.get::<_, String>("schema"),
            class.clone(),
        );
        if is_true_array(&category, element, links_back) {
            type_row = type_row.array_of(element);
        }
        if array_oid != 0 {
            type_row = type_row.with_array(array_oid);
        }
        if class == TypeClass::Domain {
            type_row = type_row.domain_over(row.get("base_type"), row.get("not_null"));
        }
        snapshot.insert_type(type_row);
    }

    let rows = client
        .query(
            r#"
            SELECT t.oid AS type_oid, a.attname::text AS name, a.atttypid, a.attnotnull
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.typrelid
            WHERE t.typtype = 'c'
              AND n.nspname = $1
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY t.oid, a.attnum
            "#,
            &[&schema],
        )
        .await
        .context("loading composite attributes")?;
    for row in &rows {
        snapshot.push_attribute(
            row.get("type_oid"),
            AttributeRow::new(
                row.get::<_, String>("name"),
                row.get("atttypid"),
                row.get("attnotnull"),
            ),
        );
    }

    let rows = client
        .query(
            r#"
            SELECT e.enumtypid, e.enumlabel::text AS label
            FROM pg_catalog.pg_enum e
            JOIN pg_catalog.pg_type t ON t.oid = e.enumtypid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname IN ('pg_catalog', $1)
            ORDER BY e.enumtypid, e.enumsortorder
            "#,
            &[&schema],
        )
        .await
        .context("loading enum labels")?;
    for row in &rows {
        snapshot.push_enum_label(row.get("enumtypid"), row.get("label"));
    }

    let rows = client
        .query(
            "SELECT rngtypid, rngsubtype FROM pg_catalog.pg_range",
            &[],
        )
        .await
        .context("loading range subtypes")?;
    for row in &rows {
        snapshot.insert_range(row.get("rngtypid"), row.get("rngsubtype"));
    }

    info!(schema, types = snapshot.type_count(), "loaded catalog snapshot");
    Ok(snapshot)
}

/// A general array type is the `typarray` of its own element. `int2vector`
/// and `oidvector` share category `A` and a `typelem` but are not.
fn is_true_array(category: &str, element: Oid, element_links_back: bool) -> bool {
    category == "A" && element != 0 && element_links_back
}

/// Build a [`Table`] whose columns carry resolved types.
pub async fn load_table<S>(
    client: &Client,
    catalog: &mut TypeCatalog,
    source: &S,
    schema: &str,
    name: &str,
) -> Result<Table>
where
    S: CatalogSource + ?Sized,
{
    let rows = client
        .query(
            r#"
            SELECT a.attname::text AS name, a.atttypid, a.attnotnull
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
            "#,
            &[&schema, &name],
        )
        .await
        .with_context(|| format!("loading columns of {}.{}", schema, name))?;
    if rows.is_empty() {
        bail!("relation {}.{} does not exist or has no columns", schema, name);
    }
    let columns: Vec<AttributeRow> = rows
        .iter()
        .map(|row| {
            AttributeRow::new(
                row.get::<_, String>("name"),
                row.get("atttypid"),
                row.get("attnotnull"),
            )
        })
        .collect();
    let table = build_table(name, &columns, catalog, source)?;
    debug!(table = name, columns = columns.len(), "loaded table");
    Ok(table)
}

/// Resolve each attribute's type and assemble the table.
pub fn build_table<S>(
    name: &str,
    columns: &[AttributeRow],
    catalog: &mut TypeCatalog,
    source: &S,
) -> crate::Result<Table>
where
    S: CatalogSource + ?Sized,
{
    let mut resolved = Vec::with_capacity(columns.len());
    for column in columns {
        let ty = catalog.resolve(source, column.type_oid, !column.not_null)?;
        resolved.push((column.name.clone(), ty));
    }
    Ok(Table::new(name, resolved))
}

pub async fn list_relations(client: &Client, schema: &str) -> Result<Vec<RelationInfo>> {
    let rows = client
        .query(
            r#"
            SELECT
                c.relname::text AS name,
                c.relkind::text AS kind,
                COALESCE(c.reltuples::bigint, 0) AS row_estimate
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN ('r', 'v', 'm', 'f', 'p')
            ORDER BY c.relname
            "#,
            &[&schema],
        )
        .await
        .with_context(|| format!("listing relations in {}", schema))?;

    let relations = rows
        .iter()
        .filter_map(|row| {
            let kind: String = row.get("kind");
            Some(RelationInfo {
                name: row.get("name"),
                kind: RelationKind::from_relkind(&kind)?,
                row_estimate: row.get("row_estimate"),
            })
        })
        .collect();
    Ok(relations)
}
