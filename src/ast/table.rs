//! Tables and their typed columns.
use std::sync::Arc;

use crate::catalog::TypeRef;
use crate::error::{Error, Result};

/// Name given to the synthetic row alias inside `ON CONFLICT ... DO UPDATE`.
pub const EXCLUDED: &str = "excluded";

/// A column owned by one table. Two columns are the same column when they
/// belong to the same SQL-visible table name and share a name, so an
/// aliased copy of a table has distinct columns.
#[derive(Debug, Clone)]
pub struct Column {
    table: Arc<str>,
    name: String,
    ty: TypeRef,
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.name == other.name
    }
}

impl Eq for Column {}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The SQL name of the owning table (its alias when aliased).
    pub fn table_name(&self) -> &str {
        &self.table
    }

    pub fn ty(&self) -> &TypeRef {
        &self.ty
    }

    /// The same column on the `excluded` row of an `ON CONFLICT` clause.
    pub fn excluded(&self) -> Column {
        Column {
            table: Arc::from(EXCLUDED),
            name: self.name.clone(),
            ty: self.ty.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    alias: Option<String>,
    columns: Vec<Column>,
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.sql_name() == other.sql_name()
    }
}

impl Table {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeRef)>,
        S: Into<String>,
    {
        let name = name.into();
        let owner: Arc<str> = Arc::from(name.as_str());
        let columns = columns
            .into_iter()
            .map(|(column, ty)| Column {
                table: Arc::clone(&owner),
                name: column.into(),
                ty,
            })
            .collect();
        Self {
            name,
            alias: None,
            columns,
        }
    }

    /// The same columns under a different SQL name, for self-joins and the
    /// conflict clause's `excluded` row.
    pub fn aliased(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        let owner: Arc<str> = Arc::from(alias.as_str());
        let columns = self
            .columns
            .iter()
            .map(|c| Column {
                table: Arc::clone(&owner),
                name: c.name.clone(),
                ty: c.ty.clone(),
            })
            .collect();
        Self {
            name: self.name.clone(),
            alias: Some(alias),
            columns,
        }
    }

    pub fn excluded(&self) -> Self {
        self.aliased(EXCLUDED)
    }

    /// Catalog name of the table.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The name columns are qualified with.
    pub fn sql_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Like [`Table::column`] but a missing column is an error.
    pub fn col(&self, name: &str) -> Result<Column> {
        self.column(name).cloned().ok_or_else(|| {
            Error::invariant(format!("table {} has no column {}", self.sql_name(), name))
        })
    }

    pub fn owns(&self, column: &Column) -> bool {
        self.columns.iter().any(|c| c == column)
    }
}
