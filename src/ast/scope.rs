//! Per-render bookkeeping of visible columns and output aliases.
//!
//! A `Scope` lives for exactly one call to `render`. Tables are entered
//! before the clauses that can reference them and left afterwards, so a
//! temporarily visible table (the conflict clause's `excluded` row) never
//! changes how later clauses qualify their columns.
use std::collections::HashMap;

use tracing::trace;

use super::render::Fragment;
use super::table::{Column, Table};
use crate::catalog::TypeRef;

/// One entry of the alias table: a result column of the outermost target
/// list and the logical fields it feeds.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    pub alias: String,
    pub ty: TypeRef,
    /// Logical result fields sharing this column, in the order they were
    /// requested.
    pub fields: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Scope {
    /// Visible columns by bare name. A table entered twice contributes its
    /// columns twice so that leaving it once keeps them visible.
    visible: HashMap<String, Vec<Column>>,
    outputs: Vec<(Fragment, OutputColumn)>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, table: &Table) {
        trace!(table = table.sql_name(), "enter scope");
        for column in table.columns() {
            self.visible
                .entry(column.name().to_string())
                .or_default()
                .push(column.clone());
        }
    }

    pub fn leave(&mut self, table: &Table) {
        trace!(table = table.sql_name(), "leave scope");
        for column in table.columns() {
            let Some(list) = self.visible.get_mut(column.name()) else {
                continue;
            };
            if let Some(pos) = list.iter().rposition(|c| c == column) {
                list.remove(pos);
            }
            if list.is_empty() {
                self.visible.remove(column.name());
            }
        }
    }

    pub fn is_visible(&self, column: &Column) -> bool {
        self.visible
            .get(column.name())
            .is_some_and(|list| list.contains(column))
    }

    /// A reference must be written `table.column` when its bare name is
    /// ambiguous among visible columns or the column is not visible at all.
    pub fn needs_qualification(&self, column: &Column) -> bool {
        let Some(list) = self.visible.get(column.name()) else {
            return true;
        };
        if !list.contains(column) {
            return true;
        }
        list.iter()
            .enumerate()
            .any(|(i, c)| c != column && !list[..i].contains(c))
    }

    /// Register an outermost target. Returns the alias to emit, or `None`
    /// when an identical expression already claimed one; the field is then
    /// mapped onto that earlier column.
    pub(crate) fn claim_output(
        &mut self,
        fragment: &Fragment,
        field: &str,
        ty: &TypeRef,
    ) -> Option<String> {
        if let Some((_, existing)) = self.outputs.iter_mut().find(|(f, _)| f == fragment) {
            existing.fields.push(field.to_string());
            return None;
        }
        let alias = format!("_{}", self.outputs.len());
        self.outputs.push((
            fragment.clone(),
            OutputColumn {
                alias: alias.clone(),
                ty: ty.clone(),
                fields: vec![field.to_string()],
            },
        ));
        Some(alias)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &OutputColumn> {
        self.outputs.iter().map(|(_, column)| column)
    }

    pub(crate) fn into_outputs(self) -> Vec<OutputColumn> {
        self.outputs.into_iter().map(|(_, column)| column).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::BaseType;

    fn users() -> Table {
        Table::new(
            "users",
            [
                ("id", TypeRef::builtin(BaseType::Int8, false)),
                ("name", TypeRef::builtin(BaseType::Text, true)),
            ],
        )
    }

    fn orders() -> Table {
        Table::new(
            "orders",
            [
                ("id", TypeRef::builtin(BaseType::Int8, false)),
                ("user_id", TypeRef::builtin(BaseType::Int8, false)),
            ],
        )
    }

    #[test]
    fn test_single_table_is_bare() {
        let users = users();
        let mut scope = Scope::new();
        scope.enter(&users);
        for column in users.columns() {
            assert!(!scope.needs_qualification(column));
        }
    }

    #[test]
    fn test_shared_name_is_qualified() {
        let (users, orders) = (users(), orders());
        let mut scope = Scope::new();
        scope.enter(&users);
        scope.enter(&orders);
        assert!(scope.needs_qualification(users.column("id").unwrap()));
        assert!(scope.needs_qualification(orders.column("id").unwrap()));
        assert!(!scope.needs_qualification(users.column("name").unwrap()));
        assert!(!scope.needs_qualification(orders.column("user_id").unwrap()));
    }

    #[test]
    fn test_invisible_column_is_qualified() {
        let (users, orders) = (users(), orders());
        let mut scope = Scope::new();
        scope.enter(&users);
        assert!(scope.needs_qualification(orders.column("user_id").unwrap()));
        assert!(!scope.is_visible(orders.column("user_id").unwrap()));
    }

    #[test]
    fn test_leave_restores_previous_state() {
        let users = users();
        let excluded = users.excluded();
        let mut scope = Scope::new();
        scope.enter(&users);
        scope.enter(&excluded);
        assert!(scope.needs_qualification(users.column("name").unwrap()));
        scope.leave(&excluded);
        assert!(!scope.needs_qualification(users.column("name").unwrap()));
        assert!(!scope.is_visible(excluded.column("name").unwrap()));
    }

    #[test]
    fn test_same_table_twice_is_not_ambiguous() {
        let users = users();
        let mut scope = Scope::new();
        scope.enter(&users);
        scope.enter(&users);
        assert!(!scope.needs_qualification(users.column("id").unwrap()));
        scope.leave(&users);
        assert!(scope.is_visible(users.column("id").unwrap()));
    }

    #[test]
    fn test_claim_output_dedupes() {
        let mut scope = Scope::new();
        let ty = TypeRef::builtin(BaseType::Int8, false);
        let id = Fragment::from("id");
        let name = Fragment::from("name");
        assert_eq!(scope.claim_output(&id, "id", &ty), Some("_0".to_string()));
        assert_eq!(scope.claim_output(&name, "name", &ty), Some("_1".to_string()));
        assert_eq!(scope.claim_output(&id, "key", &ty), None);
        let outputs = scope.into_outputs();
        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].fields, vec!["id", "key"]);
    }
}
