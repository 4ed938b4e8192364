//! Running rendered statements and decoding their rows.
use std::fmt;

use anyhow::{Context, Result};
use tokio_postgres::error::ErrorPosition;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Row};
use tracing::{debug, warn};

use crate::ast::{OutputColumn, RenderedStatement};
use crate::marshal::{Value, WireValue};

/// Broad class of a server-side failure, taken from the SQLSTATE class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Constraint,
    Data,
    Transaction,
    Connection,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorCategory::Syntax => "syntax error",
            ErrorCategory::Semantic => "semantic error",
            ErrorCategory::Constraint => "constraint violation",
            ErrorCategory::Data => "data error",
            ErrorCategory::Transaction => "transaction error",
            ErrorCategory::Connection => "connection error",
            ErrorCategory::Unknown => "error",
        };
        f.write_str(label)
    }
}

/// A server error with its position mapped back onto the statement text.
#[derive(Debug, Clone)]
pub struct ServerError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub constraint: Option<String>,
    /// One-based line and column of the error position, if the server gave one.
    pub location: Option<(usize, usize)>,
}

impl ServerError {
    pub fn from_pg_error(err: &tokio_postgres::Error, sql: &str) -> Self {
        let Some(db) = err.as_db_error() else {
            return ServerError {
                category: if err.is_closed() {
                    ErrorCategory::Connection
                } else {
                    ErrorCategory::Unknown
                },
                code: String::new(),
                message: err.to_string(),
                detail: None,
                hint: None,
                constraint: None,
                location: None,
            };
        };
        let code = db.code().code().to_string();
        let location = match db.position() {
            Some(ErrorPosition::Original(pos)) => Some(line_col(sql, *pos as usize)),
            _ => None,
        };
        ServerError {
            category: categorize_sqlstate(&code),
            code,
            message: db.message().to_string(),
            detail: db.detail().map(str::to_string),
            hint: db.hint().map(str::to_string),
            constraint: db.constraint().map(str::to_string),
            location,
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.message)?;
        if !self.code.is_empty() {
            write!(f, " (SQLSTATE {})", self.code)?;
        }
        if let Some((line, col)) = self.location {
            write!(f, " at line {}, column {}", line, col)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  detail: {}", detail)?;
        }
        if let Some(constraint) = &self.constraint {
            write!(f, "\n  constraint: {}", constraint)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for ServerError {}

/// Server positions are one-based character offsets.
fn line_col(sql: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut col = 1;
    for ch in sql.chars().take(position.saturating_sub(1)) {
        if ch == '\n' {
            line += 1;
            col = 1;
        } else {
            col += 1;
        }
    }
    (line, col)
}

fn categorize_sqlstate(code: &str) -> ErrorCategory {
    match code.get(..2) {
        Some("42") if code == "42601" => ErrorCategory::Syntax,
        Some("42") => ErrorCategory::Semantic,
        Some("23") => ErrorCategory::Constraint,
        Some("22") => ErrorCategory::Data,
        Some("25") | Some("40") => ErrorCategory::Transaction,
        Some("08") => ErrorCategory::Connection,
        _ => ErrorCategory::Unknown,
    }
}

/// One decoded result row, keyed by the field names of the statement's
/// targets.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Record(self.fields)
    }
}

/// Decode one row of protocol values against the statement's outputs.
///
/// A deduplicated output carries several field names; each of them receives
/// the decoded value.
pub fn decode_row(outputs: &[OutputColumn], wire: Vec<WireValue>) -> crate::Result<Record> {
    if wire.len() != outputs.len() {
        return Err(crate::Error::Decode(format!(
            "row has {} columns, statement has {} outputs",
            wire.len(),
            outputs.len()
        )));
    }
    let mut fields = Vec::new();
    for (output, value) in outputs.iter().zip(wire) {
        if matches!(value, WireValue::Null) && !output.ty.nullable() {
            return Err(crate::Error::Decode(format!(
                "null in non-nullable column {}",
                output.alias
            )));
        }
        let value = output.ty.from_wire(value)?;
        for field in &output.fields {
            fields.push((field.clone(), value.clone()));
        }
    }
    Ok(Record { fields })
}

fn params(statement: &RenderedStatement) -> Vec<&(dyn ToSql + Sync)> {
    statement
        .params
        .iter()
        .map(|p| &p.value as &(dyn ToSql + Sync))
        .collect()
}

pub(crate) fn server_error(err: tokio_postgres::Error, sql: &str) -> anyhow::Error {
    let server = ServerError::from_pg_error(&err, sql);
    warn!(code = %server.code, category = %server.category, "statement failed");
    anyhow::Error::new(server)
}

/// Run a statement that returns no rows and report the affected row count.
pub async fn execute(client: &Client, statement: &RenderedStatement) -> Result<u64> {
    let sql = statement.numbered_sql()?;
    let params = params(statement);
    let affected = client
        .execute(sql.as_str(), &params)
        .await
        .map_err(|e| server_error(e, &sql))?;
    debug!(kind = %statement.kind, affected, "executed statement");
    Ok(affected)
}

/// Run a statement and decode every row it returns.
pub async fn query(client: &Client, statement: &RenderedStatement) -> Result<Vec<Record>> {
    let sql = statement.numbered_sql()?;
    let params = params(statement);
    let rows = client
        .query(sql.as_str(), &params)
        .await
        .map_err(|e| server_error(e, &sql))?;
    debug!(kind = %statement.kind, rows = rows.len(), "queried statement");
    rows.iter()
        .map(|row| {
            let wire = row_values(row, &statement.outputs)?;
            decode_row(&statement.outputs, wire).context("decoding result row")
        })
        .collect()
}

fn row_values(row: &Row, outputs: &[OutputColumn]) -> Result<Vec<WireValue>> {
    outputs
        .iter()
        .map(|output| {
            row.try_get::<_, WireValue>(output.alias.as_str())
                .with_context(|| format!("reading column {}", output.alias))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{self, ADDRESS, MOOD};
    use crate::catalog::{BaseType, TypeRef};

    fn output(alias: &str, ty: TypeRef, fields: &[&str]) -> OutputColumn {
        OutputColumn {
            alias: alias.to_string(),
            ty,
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_decode_row_fans_out_shared_outputs() {
        let outputs = vec![
            output("_0", TypeRef::builtin(BaseType::Int4, false), &["id", "owner_id"]),
            output("_1", TypeRef::builtin(BaseType::Text, true), &["name"]),
        ];
        let record = decode_row(&outputs, vec![WireValue::from(7), WireValue::Null]).unwrap();
        assert_eq!(record.len(), 3);
        assert_eq!(record.get("id"), Some(&Value::from(7)));
        assert_eq!(record.get("owner_id"), Some(&Value::from(7)));
        assert_eq!(record.get("name"), Some(&Value::Null));
    }

    #[test]
    fn test_decode_row_rejects_null_in_not_null_output() {
        let outputs = vec![output("_0", TypeRef::builtin(BaseType::Int4, false), &["id"])];
        let err = decode_row(&outputs, vec![WireValue::Null]).unwrap_err();
        assert!(matches!(err, crate::Error::Decode(_)));
    }

    #[test]
    fn test_decode_row_width_mismatch() {
        let outputs = vec![output("_0", TypeRef::builtin(BaseType::Int4, true), &["id"])];
        assert!(decode_row(&outputs, vec![]).is_err());
    }

    #[test]
    fn test_decode_row_user_types() {
        let outputs = vec![
            output("_0", fixtures::resolve(MOOD, false), &["mood"]),
            output("_1", fixtures::resolve(ADDRESS, true), &["home"]),
        ];
        let wire = vec![
            WireValue::text("happy"),
            WireValue::Record(vec![WireValue::text("Main"), WireValue::Null, WireValue::from(5)]),
        ];
        let record = decode_row(&outputs, wire).unwrap();
        assert_eq!(record.get("mood"), Some(&Value::enum_label("happy")));
        let home = record.get("home").unwrap();
        assert_eq!(home.field("street"), Some(&Value::from("Main")));
        assert_eq!(home.field("city"), Some(&Value::Null));
    }

    #[test]
    fn test_decode_row_two_dimensional_array() {
        let outputs = vec![output("_0", fixtures::resolve(1007, true), &["grid"])];
        let row = |a: i32, b: i32| WireValue::Array {
            element_type: "int4".into(),
            elements: vec![WireValue::from(a), WireValue::from(b)],
        };
        let wire = WireValue::Array {
            element_type: "int4".into(),
            elements: vec![row(1, 2), row(3, 4)],
        };
        let record = decode_row(&outputs, vec![wire]).unwrap();
        assert_eq!(
            record.get("grid"),
            Some(&Value::array([Value::array([1, 2]), Value::array([3, 4])]))
        );
    }

    #[test]
    fn test_line_col() {
        assert_eq!(line_col("SELECT x", 8), (1, 8));
        assert_eq!(line_col("SELECT a\nFROM t", 11), (2, 2));
        assert_eq!(line_col("", 0), (1, 1));
    }

    #[test]
    fn test_categorize_sqlstate() {
        assert_eq!(categorize_sqlstate("42601"), ErrorCategory::Syntax);
        assert_eq!(categorize_sqlstate("42P01"), ErrorCategory::Semantic);
        assert_eq!(categorize_sqlstate("23505"), ErrorCategory::Constraint);
        assert_eq!(categorize_sqlstate("22012"), ErrorCategory::Data);
        assert_eq!(categorize_sqlstate("40001"), ErrorCategory::Transaction);
        assert_eq!(categorize_sqlstate("08006"), ErrorCategory::Connection);
        assert_eq!(categorize_sqlstate("X"), ErrorCategory::Unknown);
    }

    #[test]
    fn test_server_error_display() {
        let err = ServerError {
            category: ErrorCategory::Constraint,
            code: "23505".into(),
            message: "duplicate key".into(),
            detail: Some("Key (id)=(1) already exists.".into()),
            hint: None,
            constraint: Some("users_pkey".into()),
            location: None,
        };
        assert_eq!(
            err.to_string(),
            "constraint violation: duplicate key (SQLSTATE 23505)\n  detail: Key (id)=(1) already exists.\n  constraint: users_pkey"
        );
    }
}
