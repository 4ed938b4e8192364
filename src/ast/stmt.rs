//! Statement builders.
//!
//! Each statement kind has its own builder exposing only the clauses that
//! kind accepts. Rendering walks the accumulated clauses once, entering
//! tables into a fresh [`Scope`] around the clauses that can see them, and
//! returns SQL text with `?` placeholders plus the bound parameters in
//! placeholder order.
use std::fmt;

use tracing::debug;

use super::expr::{BinaryOperator, Expr};
use super::placeholders::number_placeholders;
use super::render::{render_list, render_operand, BoundParam, Render, SqlWriter};
use super::scope::{OutputColumn, Scope};
use super::table::{Column, Table};
use crate::catalog::{BaseType, TypeRef};
use crate::error::{Error, Result};
use crate::marshal::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatementKind::Select => "SELECT",
            StatementKind::Insert => "INSERT",
            StatementKind::Update => "UPDATE",
            StatementKind::Delete => "DELETE",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Row locking requested by a SELECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lock {
    ForUpdate,
    ForUpdateSkipLocked,
}

/// An entry of a SELECT or RETURNING list: the expression and the logical
/// result field it fills.
#[derive(Debug, Clone)]
pub struct Target {
    pub field: String,
    pub expr: Expr,
    pub ty: TypeRef,
}

impl Target {
    pub fn new(field: impl Into<String>, expr: Expr, ty: TypeRef) -> Self {
        Self {
            field: field.into(),
            expr,
            ty,
        }
    }
}

impl From<&Column> for Target {
    fn from(column: &Column) -> Self {
        Target::new(column.name(), Expr::column(column), column.ty().clone())
    }
}

/// Output of a render: SQL text, parameters in placeholder order and, for
/// statements with a target list, the alias table used to decode rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<BoundParam>,
    pub outputs: Vec<OutputColumn>,
}

impl RenderedStatement {
    /// The SQL with `?` rewritten to `$1..$n` for drivers that require it.
    pub fn numbered_sql(&self) -> Result<String> {
        number_placeholders(&self.sql)
    }

    pub fn output(&self, alias: &str) -> Option<&OutputColumn> {
        self.outputs.iter().find(|o| o.alias == alias)
    }
}

fn render_statement(
    kind: StatementKind,
    body: impl FnOnce(&mut Scope, &mut SqlWriter) -> Result<()>,
) -> Result<RenderedStatement> {
    let mut scope = Scope::new();
    let mut out = SqlWriter::new();
    body(&mut scope, &mut out)?;
    let fragment = out.finish();
    let outputs = scope.into_outputs();
    debug!(
        %kind,
        params = fragment.params.len(),
        outputs = outputs.len(),
        "rendered statement"
    );
    Ok(RenderedStatement {
        kind,
        sql: fragment.sql,
        params: fragment.params,
        outputs,
    })
}

/// Write a target list. Only the outermost list claims `_n` aliases; an
/// expression equal to one already listed is folded into its column.
fn write_targets(
    targets: &[Target],
    outermost: bool,
    scope: &mut Scope,
    out: &mut SqlWriter,
) -> Result<()> {
    let mut first = true;
    for target in targets {
        if !outermost {
            if !first {
                out.push(", ");
            }
            first = false;
            target.expr.render(scope, out)?;
            continue;
        }
        let fragment = target.expr.to_fragment(scope)?;
        if let Some(alias) = scope.claim_output(&fragment, &target.field, &target.ty) {
            if !first {
                out.push(", ");
            }
            first = false;
            out.push_fragment(fragment);
            out.push(" AS ");
            out.push(&alias);
        }
    }
    Ok(())
}

fn write_filters(filters: &[Expr], scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
    if filters.is_empty() {
        return Ok(());
    }
    out.push(" WHERE ");
    let and = BinaryOperator::And;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            out.push(" AND ");
        }
        render_operand(filter, and.precedence(), |op| op == and, scope, out)?;
    }
    Ok(())
}

fn write_returning(targets: &[Target], scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
    if targets.is_empty() {
        return Ok(());
    }
    out.push(" RETURNING ");
    write_targets(targets, true, scope, out)
}

/// `a = ?, b = ?` with bare names on the left.
fn write_assignments(
    assignments: &[(Column, Expr)],
    scope: &mut Scope,
    out: &mut SqlWriter,
) -> Result<()> {
    for (i, (column, value)) in assignments.iter().enumerate() {
        if i > 0 {
            out.push(", ");
        }
        out.push_ident(column.name());
        out.push(" = ");
        value.render(scope, out)?;
    }
    Ok(())
}

fn check_owned<'a>(
    table: &Table,
    columns: impl IntoIterator<Item = &'a Column>,
    clause: &str,
) -> Result<()> {
    for column in columns {
        if !table.owns(column) {
            return Err(Error::invariant(format!(
                "{} column {}.{} does not belong to {}",
                clause,
                column.table_name(),
                column.name(),
                table.sql_name()
            )));
        }
    }
    Ok(())
}

fn check_distinct<'a>(
    columns: impl IntoIterator<Item = &'a Column>,
    clause: &str,
) -> Result<()> {
    let mut seen: Vec<&Column> = Vec::new();
    for column in columns {
        if seen.contains(&column) {
            return Err(Error::invariant(format!(
                "{} sets column {} twice",
                clause,
                column.name()
            )));
        }
        seen.push(column);
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Select {
    from: Table,
    joins: Vec<Table>,
    targets: Vec<Target>,
    filters: Vec<Expr>,
    order_by: Vec<(Expr, Order)>,
    lock: Option<Lock>,
    limit: Option<i64>,
}

impl Select {
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: &Table) -> Self {
        Self {
            from: table.clone(),
            joins: Vec::new(),
            targets: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            lock: None,
            limit: None,
        }
    }

    pub fn join(mut self, table: &Table) -> Self {
        self.joins.push(table.clone());
        self
    }

    pub fn column(mut self, column: &Column) -> Self {
        self.targets.push(Target::from(column));
        self
    }

    pub fn columns<'a>(mut self, columns: impl IntoIterator<Item = &'a Column>) -> Self {
        self.targets.extend(columns.into_iter().map(Target::from));
        self
    }

    /// Every column of the primary table, in declaration order.
    pub fn all_columns(self) -> Self {
        let columns = self.from.columns().to_vec();
        self.columns(columns.iter())
    }

    pub fn target(mut self, target: Target) -> Self {
        self.targets.push(target);
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn order_by(mut self, expr: impl Into<Expr>, order: Order) -> Self {
        self.order_by.push((expr.into(), order));
        self
    }

    pub fn for_update(mut self) -> Self {
        if self.lock.is_none() {
            self.lock = Some(Lock::ForUpdate);
        }
        self
    }

    /// Implies FOR UPDATE.
    pub fn skip_locked(mut self) -> Self {
        self.lock = Some(Lock::ForUpdateSkipLocked);
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn render(&self) -> Result<RenderedStatement> {
        render_statement(StatementKind::Select, |scope, out| {
            self.write(true, scope, out)
        })
    }

    /// Shared by the top-level render and by subqueries, which pass
    /// `outermost = false` and so never claim output aliases.
    pub(crate) fn write(
        &self,
        outermost: bool,
        scope: &mut Scope,
        out: &mut SqlWriter,
    ) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::invariant("SELECT needs at least one target"));
        }
        if let Some(limit) = self.limit.filter(|l| *l < 0) {
            return Err(Error::invariant(format!("negative LIMIT {}", limit)));
        }

        scope.enter(&self.from);
        for table in &self.joins {
            scope.enter(table);
        }

        out.push("SELECT ");
        write_targets(&self.targets, outermost, scope, out)?;
        out.push(" FROM ");
        self.from.render(scope, out)?;
        for table in &self.joins {
            out.push(", ");
            table.render(scope, out)?;
        }
        write_filters(&self.filters, scope, out)?;

        if !self.order_by.is_empty() {
            out.push(" ORDER BY ");
            for (i, (expr, order)) in self.order_by.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                expr.render(scope, out)?;
                if *order == Order::Desc {
                    out.push(" DESC");
                }
            }
        }

        match self.lock {
            Some(Lock::ForUpdate) => out.push(" FOR UPDATE"),
            Some(Lock::ForUpdateSkipLocked) => out.push(" FOR UPDATE SKIP LOCKED"),
            None => {}
        }

        if let Some(limit) = self.limit {
            out.push(" LIMIT ");
            out.push_param(&TypeRef::builtin(BaseType::Int8, false), &Value::from(limit))?;
        }

        for table in self.joins.iter().rev() {
            scope.leave(table);
        }
        scope.leave(&self.from);
        Ok(())
    }
}

/// One row of an INSERT. Columns a row leaves out are written as DEFAULT.
#[derive(Debug, Clone, Default)]
pub struct Row {
    values: Vec<(Column, Expr)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(self, column: &Column, value: impl Into<Value>) -> Self {
        let expr = Expr::value(column, value);
        self.set_expr(column, expr)
    }

    pub fn set_expr(mut self, column: &Column, expr: Expr) -> Self {
        self.values.push((column.clone(), expr));
        self
    }

    fn get(&self, column: &Column) -> Option<&Expr> {
        self.values.iter().find(|(c, _)| c == column).map(|(_, e)| e)
    }
}

#[derive(Debug, Clone)]
pub enum ConflictAction {
    Nothing,
    Update {
        assignments: Vec<(Column, Expr)>,
        filters: Vec<Expr>,
    },
}

/// `ON CONFLICT` handling for an INSERT. Starts as DO NOTHING; the first
/// assignment turns it into DO UPDATE. While the DO UPDATE clause renders,
/// the proposed row is visible as `excluded` (see [`Column::excluded`]).
#[derive(Debug, Clone)]
pub struct OnConflict {
    target: Vec<Column>,
    action: ConflictAction,
}

impl Default for OnConflict {
    fn default() -> Self {
        Self::new()
    }
}

impl OnConflict {
    pub fn new() -> Self {
        Self {
            target: Vec::new(),
            action: ConflictAction::Nothing,
        }
    }

    /// Conflict target: the columns of a unique index.
    pub fn on<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Self {
        Self {
            target: columns.into_iter().cloned().collect(),
            action: ConflictAction::Nothing,
        }
    }

    pub fn set(self, column: &Column, value: impl Into<Value>) -> Self {
        let expr = Expr::value(column, value);
        self.set_expr(column, expr)
    }

    /// `column = excluded.column`
    pub fn set_excluded(self, column: &Column) -> Self {
        let expr = Expr::column(&column.excluded());
        self.set_expr(column, expr)
    }

    pub fn set_expr(mut self, column: &Column, expr: Expr) -> Self {
        match &mut self.action {
            ConflictAction::Update { assignments, .. } => {
                assignments.push((column.clone(), expr));
            }
            ConflictAction::Nothing => {
                self.action = ConflictAction::Update {
                    assignments: vec![(column.clone(), expr)],
                    filters: Vec::new(),
                };
            }
        }
        self
    }

    /// WHERE on the DO UPDATE branch. Only valid once something is set.
    pub fn filter(mut self, expr: Expr) -> Self {
        match &mut self.action {
            ConflictAction::Update { filters, .. } => filters.push(expr),
            ConflictAction::Nothing => {
                self.action = ConflictAction::Update {
                    assignments: Vec::new(),
                    filters: vec![expr],
                };
            }
        }
        self
    }

    pub fn action(&self) -> &ConflictAction {
        &self.action
    }

    fn write(&self, table: &Table, scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
        check_owned(table, &self.target, "ON CONFLICT")?;
        out.push(" ON CONFLICT");
        if !self.target.is_empty() {
            out.push(" (");
            for (i, column) in self.target.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                out.push_ident(column.name());
            }
            out.push(")");
        }

        let (assignments, filters) = match &self.action {
            ConflictAction::Nothing => {
                out.push(" DO NOTHING");
                return Ok(());
            }
            ConflictAction::Update {
                assignments,
                filters,
            } => (assignments, filters),
        };
        if self.target.is_empty() {
            return Err(Error::invariant("ON CONFLICT DO UPDATE needs a conflict target"));
        }
        if assignments.is_empty() {
            return Err(Error::invariant("ON CONFLICT DO UPDATE needs at least one assignment"));
        }
        check_owned(table, assignments.iter().map(|(c, _)| c), "DO UPDATE")?;
        check_distinct(assignments.iter().map(|(c, _)| c), "DO UPDATE")?;

        let excluded = table.excluded();
        scope.enter(&excluded);
        out.push(" DO UPDATE SET ");
        write_assignments(assignments, scope, out)?;
        write_filters(filters, scope, out)?;
        scope.leave(&excluded);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct Insert {
    table: Table,
    rows: Vec<Row>,
    conflict: Option<OnConflict>,
    returning: Vec<Target>,
}

impl Insert {
    pub fn into_table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            rows: Vec::new(),
            conflict: None,
            returning: Vec::new(),
        }
    }

    pub fn row(mut self, row: Row) -> Self {
        self.rows.push(row);
        self
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = Row>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn on_conflict(mut self, conflict: OnConflict) -> Self {
        self.conflict = Some(conflict);
        self
    }

    pub fn returning(mut self, column: &Column) -> Self {
        self.returning.push(Target::from(column));
        self
    }

    pub fn returning_target(mut self, target: Target) -> Self {
        self.returning.push(target);
        self
    }

    /// Columns any row sets, in table order.
    fn columns(&self) -> Vec<&Column> {
        self.table
            .columns()
            .iter()
            .filter(|c| self.rows.iter().any(|row| row.get(c).is_some()))
            .collect()
    }

    pub fn render(&self) -> Result<RenderedStatement> {
        if self.rows.is_empty() {
            return Err(Error::invariant("INSERT needs at least one row"));
        }
        for row in &self.rows {
            check_owned(&self.table, row.values.iter().map(|(c, _)| c), "INSERT")?;
            check_distinct(row.values.iter().map(|(c, _)| c), "INSERT row")?;
        }
        let columns = self.columns();
        if columns.is_empty() {
            return Err(Error::invariant("INSERT rows set no columns"));
        }

        render_statement(StatementKind::Insert, |scope, out| {
            scope.enter(&self.table);

            out.push("INSERT INTO ");
            self.table.render(scope, out)?;
            out.push("(");
            for (i, column) in columns.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                out.push_ident(column.name());
            }
            out.push(") VALUES ");

            for (i, row) in self.rows.iter().enumerate() {
                if i > 0 {
                    out.push(", ");
                }
                out.push("(");
                for (j, column) in columns.iter().enumerate() {
                    if j > 0 {
                        out.push(", ");
                    }
                    match row.get(column) {
                        Some(expr) => expr.render(scope, out)?,
                        None => Expr::Default.render(scope, out)?,
                    }
                }
                out.push(")");
            }

            if let Some(conflict) = &self.conflict {
                conflict.write(&self.table, scope, out)?;
            }
            write_returning(&self.returning, scope, out)?;

            scope.leave(&self.table);
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct Update {
    table: Table,
    from: Vec<Table>,
    assignments: Vec<(Column, Expr)>,
    filters: Vec<Expr>,
    returning: Vec<Target>,
}

impl Update {
    pub fn table(table: &Table) -> Self {
        Self {
            table: table.clone(),
            from: Vec::new(),
            assignments: Vec::new(),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn set(self, column: &Column, value: impl Into<Value>) -> Self {
        let expr = Expr::value(column, value);
        self.set_expr(column, expr)
    }

    pub fn set_expr(mut self, column: &Column, expr: Expr) -> Self {
        self.assignments.push((column.clone(), expr));
        self
    }

    pub fn from(mut self, table: &Table) -> Self {
        self.from.push(table.clone());
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn returning(mut self, column: &Column) -> Self {
        self.returning.push(Target::from(column));
        self
    }

    pub fn returning_target(mut self, target: Target) -> Self {
        self.returning.push(target);
        self
    }

    pub fn render(&self) -> Result<RenderedStatement> {
        if self.filters.is_empty() {
            return Err(Error::invariant(
                "UPDATE without WHERE; filter on Expr::always_true() to update every row",
            ));
        }
        if self.assignments.is_empty() {
            return Err(Error::invariant("UPDATE needs at least one assignment"));
        }
        check_owned(&self.table, self.assignments.iter().map(|(c, _)| c), "UPDATE")?;
        check_distinct(self.assignments.iter().map(|(c, _)| c), "UPDATE")?;

        render_statement(StatementKind::Update, |scope, out| {
            scope.enter(&self.table);
            for table in &self.from {
                scope.enter(table);
            }

            out.push("UPDATE ");
            self.table.render(scope, out)?;
            out.push(" SET ");
            write_assignments(&self.assignments, scope, out)?;
            if !self.from.is_empty() {
                out.push(" FROM ");
                render_list(&self.from, ", ", scope, out)?;
            }
            write_filters(&self.filters, scope, out)?;
            write_returning(&self.returning, scope, out)?;

            for table in self.from.iter().rev() {
                scope.leave(table);
            }
            scope.leave(&self.table);
            Ok(())
        })
    }
}

#[derive(Debug, Clone)]
pub struct Delete {
    table: Table,
    using: Vec<Table>,
    filters: Vec<Expr>,
    returning: Vec<Target>,
}

impl Delete {
    #[allow(clippy::should_implement_trait)]
    pub fn from(table: &Table) -> Self {
        Self {
            table: table.clone(),
            using: Vec::new(),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn using(mut self, table: &Table) -> Self {
        self.using.push(table.clone());
        self
    }

    pub fn filter(mut self, expr: Expr) -> Self {
        self.filters.push(expr);
        self
    }

    pub fn returning(mut self, column: &Column) -> Self {
        self.returning.push(Target::from(column));
        self
    }

    pub fn returning_target(mut self, target: Target) -> Self {
        self.returning.push(target);
        self
    }

    pub fn render(&self) -> Result<RenderedStatement> {
        if self.filters.is_empty() {
            return Err(Error::invariant(
                "DELETE without WHERE; filter on Expr::always_true() to delete every row",
            ));
        }

        render_statement(StatementKind::Delete, |scope, out| {
            scope.enter(&self.table);
            for table in &self.using {
                scope.enter(table);
            }

            out.push("DELETE FROM ");
            self.table.render(scope, out)?;
            if !self.using.is_empty() {
                out.push(" USING ");
                render_list(&self.using, ", ", scope, out)?;
            }
            write_filters(&self.filters, scope, out)?;
            write_returning(&self.returning, scope, out)?;

            for table in self.using.iter().rev() {
                scope.leave(table);
            }
            scope.leave(&self.table);
            Ok(())
        })
    }
}

/// Any of the four builders.
#[derive(Debug, Clone)]
pub enum Statement {
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Select(_) => StatementKind::Select,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Update(_) => StatementKind::Update,
            Statement::Delete(_) => StatementKind::Delete,
        }
    }

    pub fn render(&self) -> Result<RenderedStatement> {
        match self {
            Statement::Select(s) => s.render(),
            Statement::Insert(s) => s.render(),
            Statement::Update(s) => s.render(),
            Statement::Delete(s) => s.render(),
        }
    }
}

impl From<Select> for Statement {
    fn from(s: Select) -> Self {
        Statement::Select(s)
    }
}

impl From<Insert> for Statement {
    fn from(s: Insert) -> Self {
        Statement::Insert(s)
    }
}

impl From<Update> for Statement {
    fn from(s: Update) -> Self {
        Statement::Update(s)
    }
}

impl From<Delete> for Statement {
    fn from(s: Delete) -> Self {
        Statement::Delete(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{self, ADDRESS, MOOD};
    use crate::marshal::WireValue;

    fn users() -> Table {
        Table::new(
            "users",
            [
                ("id", TypeRef::builtin(BaseType::Int8, false)),
                ("name", TypeRef::builtin(BaseType::Text, true)),
                ("mood", fixtures::resolve(MOOD, true)),
            ],
        )
    }

    fn orders() -> Table {
        Table::new(
            "orders",
            [
                ("id", TypeRef::builtin(BaseType::Int8, false)),
                ("user_id", TypeRef::builtin(BaseType::Int8, false)),
                ("shipping", fixtures::resolve(ADDRESS, true)),
            ],
        )
    }

    fn people() -> Table {
        Table::new(
            "t",
            [
                ("name", TypeRef::builtin(BaseType::Text, true)),
                ("age", TypeRef::builtin(BaseType::Int4, true)),
            ],
        )
    }

    fn values(rendered: &RenderedStatement) -> Vec<WireValue> {
        rendered.params.iter().map(|p| p.value.clone()).collect()
    }

    #[test]
    fn test_single_table_select_is_bare() {
        let users = users();
        let id = users.col("id").unwrap();
        let name = users.col("name").unwrap();
        let rendered = Select::from(&users)
            .column(&id)
            .column(&name)
            .filter(Expr::equals(&name, "ann"))
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT id AS _0, name AS _1 FROM users WHERE name = ?"
        );
        assert_eq!(values(&rendered), vec![WireValue::from("ann")]);
        assert_eq!(rendered.kind, StatementKind::Select);
        assert_eq!(rendered.outputs[1].alias, "_1");
        assert_eq!(rendered.outputs[1].fields, vec!["name"]);
    }

    #[test]
    fn test_join_qualifies_shared_names() {
        let (users, orders) = (users(), orders());
        let user_id = orders.col("user_id").unwrap();
        let rendered = Select::from(&users)
            .join(&orders)
            .column(&users.col("id").unwrap())
            .column(&users.col("name").unwrap())
            .column(&orders.col("id").unwrap())
            .column(&user_id)
            .filter(Expr::column(&users.col("id").unwrap()).eq(&user_id))
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT users.id AS _0, name AS _1, orders.id AS _2, user_id AS _3 \
             FROM users, orders WHERE users.id = user_id"
        );
        assert!(rendered.params.is_empty());
    }

    #[test]
    fn test_self_join_uses_alias() {
        let users = users();
        let other = users.aliased("u2");
        let rendered = Select::from(&users)
            .join(&other)
            .column(&users.col("name").unwrap())
            .filter(
                Expr::column(&users.col("mood").unwrap()).eq(&other.col("mood").unwrap()),
            )
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT users.name AS _0 FROM users, users AS u2 WHERE users.mood = u2.mood"
        );
    }

    #[test]
    fn test_update_requires_where() {
        let users = users();
        let name = users.col("name").unwrap();
        let update = Update::table(&users).set(&name, "x");
        assert!(matches!(update.render(), Err(Error::StatementInvariant(_))));

        let rendered = update.filter(Expr::equals(&users.col("id").unwrap(), 1i64)).render().unwrap();
        assert_eq!(rendered.sql, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(values(&rendered), vec![WireValue::from("x"), WireValue::from(1i64)]);
    }

    #[test]
    fn test_delete_requires_where() {
        let users = users();
        let delete = Delete::from(&users);
        assert!(matches!(delete.render(), Err(Error::StatementInvariant(_))));

        let rendered = delete.filter(Expr::always_true()).render().unwrap();
        assert_eq!(rendered.sql, "DELETE FROM users WHERE TRUE");
        assert!(rendered.outputs.is_empty());
    }

    #[test]
    fn test_insert_fills_defaults() {
        let t = people();
        let name = t.col("name").unwrap();
        let age = t.col("age").unwrap();
        let rendered = Insert::into_table(&t)
            .row(Row::new().set(&name, "a"))
            .row(Row::new().set(&age, 5).set(&name, "b"))
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO t(name, age) VALUES (?, DEFAULT), (?, ?)"
        );
        assert_eq!(
            values(&rendered),
            vec![WireValue::from("a"), WireValue::from("b"), WireValue::from(5)]
        );
        assert_eq!(rendered.kind, StatementKind::Insert);
    }

    #[test]
    fn test_insert_rejects_foreign_column() {
        let (t, users) = (people(), users());
        let err = Insert::into_table(&t)
            .row(Row::new().set(&users.col("name").unwrap(), "a"))
            .render()
            .unwrap_err();
        assert!(matches!(err, Error::StatementInvariant(msg) if msg.contains("users.name")));
        assert!(Insert::into_table(&t).render().is_err());
    }

    #[test]
    fn test_conflict_excluded_is_scoped() {
        let users = users();
        let id = users.col("id").unwrap();
        let name = users.col("name").unwrap();
        let rendered = Insert::into_table(&users)
            .row(Row::new().set(&id, 1i64).set(&name, "ann"))
            .on_conflict(
                OnConflict::on([&id])
                    .set_excluded(&name)
                    .filter(Expr::column(&name).ne(Expr::column(&name.excluded()))),
            )
            .returning(&id)
            .returning(&name)
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO users(id, name) VALUES (?, ?) \
             ON CONFLICT (id) DO UPDATE SET name = excluded.name \
             WHERE users.name <> excluded.name \
             RETURNING id AS _0, name AS _1"
        );
        assert_eq!(rendered.outputs.len(), 2);
    }

    #[test]
    fn test_conflict_do_nothing() {
        let t = people();
        let name = t.col("name").unwrap();
        let rendered = Insert::into_table(&t)
            .row(Row::new().set(&name, "a"))
            .on_conflict(OnConflict::new())
            .render()
            .unwrap();
        assert_eq!(rendered.sql, "INSERT INTO t(name) VALUES (?) ON CONFLICT DO NOTHING");

        let err = Insert::into_table(&t)
            .row(Row::new().set(&name, "a"))
            .on_conflict(OnConflict::new().set_excluded(&name))
            .render()
            .unwrap_err();
        assert!(matches!(err, Error::StatementInvariant(_)));
    }

    #[test]
    fn test_update_from_and_returning() {
        let (users, orders) = (users(), orders());
        let user_id = orders.col("user_id").unwrap();
        let rendered = Update::table(&orders)
            .set(&user_id, 2i64)
            .from(&users)
            .filter(Expr::column(&user_id).eq(&users.col("id").unwrap()))
            .filter(Expr::equals(&users.col("name").unwrap(), "ann"))
            .returning(&orders.col("id").unwrap())
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "UPDATE orders SET user_id = ? FROM users \
             WHERE user_id = users.id AND name = ? RETURNING orders.id AS _0"
        );
        assert_eq!(rendered.params.len(), 2);
    }

    #[test]
    fn test_delete_using() {
        let (users, orders) = (users(), orders());
        let rendered = Delete::from(&orders)
            .using(&users)
            .filter(Expr::column(&orders.col("user_id").unwrap()).eq(&users.col("id").unwrap()))
            .filter(
                Expr::equals(&users.col("name").unwrap(), "a")
                    .or(Expr::column(&users.col("name").unwrap()).is_null()),
            )
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "DELETE FROM orders USING users WHERE user_id = users.id AND (name = ? OR name IS NULL)"
        );
    }

    #[test]
    fn test_locking_and_limit() {
        let users = users();
        let id = users.col("id").unwrap();
        let rendered = Select::from(&users)
            .column(&id)
            .filter(Expr::equals(&users.col("mood").unwrap(), Value::enum_label("ok")))
            .order_by(&id, Order::Desc)
            .skip_locked()
            .limit(10)
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT id AS _0 FROM users WHERE mood = CAST(? AS mood) \
             ORDER BY id DESC FOR UPDATE SKIP LOCKED LIMIT ?"
        );
        assert_eq!(values(&rendered)[1], WireValue::from(10i64));
        assert_eq!(
            rendered.numbered_sql().unwrap(),
            "SELECT id AS _0 FROM users WHERE mood = CAST($1 AS mood) \
             ORDER BY id DESC FOR UPDATE SKIP LOCKED LIMIT $2"
        );
    }

    #[test]
    fn test_subquery_does_not_claim_aliases() {
        let (users, orders) = (users(), orders());
        let inner = Select::from(&orders)
            .column(&orders.col("id").unwrap())
            .filter(Expr::column(&orders.col("user_id").unwrap()).eq(&users.col("id").unwrap()));
        let rendered = Select::from(&users)
            .column(&users.col("id").unwrap())
            .filter(Expr::exists(inner))
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "SELECT id AS _0 FROM users WHERE EXISTS \
             (SELECT orders.id FROM orders WHERE user_id = users.id)"
        );
        assert_eq!(rendered.outputs.len(), 1);
    }

    #[test]
    fn test_duplicate_targets_share_alias() {
        let users = users();
        let id = users.col("id").unwrap();
        let rendered = Select::from(&users)
            .column(&id)
            .target(Target::new("key", Expr::column(&id), id.ty().clone()))
            .column(&users.col("name").unwrap())
            .render()
            .unwrap();
        assert_eq!(rendered.sql, "SELECT id AS _0, name AS _1 FROM users");
        assert_eq!(rendered.output("_0").unwrap().fields, vec!["id", "key"]);
    }

    #[test]
    fn test_render_is_repeatable() {
        let users = users();
        let name = users.col("name").unwrap();
        let stmt: Statement = Select::from(&users)
            .all_columns()
            .filter(Expr::within(&name, ["a", "b"]))
            .limit(5)
            .into();
        assert_eq!(stmt.kind(), StatementKind::Select);
        assert_eq!(stmt.render().unwrap(), stmt.render().unwrap());
    }

    #[test]
    fn test_composite_parameter_is_cast() {
        let orders = orders();
        let shipping = orders.col("shipping").unwrap();
        let rendered = Insert::into_table(&orders)
            .row(
                Row::new()
                    .set(&orders.col("user_id").unwrap(), 1i64)
                    .set(&shipping, Value::record([("street", Value::from("Main"))])),
            )
            .render()
            .unwrap();
        assert_eq!(
            rendered.sql,
            "INSERT INTO orders(user_id, shipping) VALUES (?, CAST(? AS address))"
        );
        assert_eq!(rendered.params[1].type_oid(), ADDRESS);
    }
}
