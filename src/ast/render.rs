//! SQL text rendering.
//!
//! Every piece of SQL text this crate produces is written through a
//! [`SqlWriter`]. Placeholder text and the parameter it stands for are
//! appended by one call, so the `?` markers in the output and the bound
//! parameter list can never drift apart.
use std::borrow::Cow;

use super::expr::{BinaryOperator, Expr};
use super::scope::Scope;
use super::table::{Column, Table};
use crate::catalog::{Oid, TypeDescriptor, TypeKind, TypeRef};
use crate::error::Result;
use crate::marshal::{Value, WireValue};

/// Words the server refuses as bare column or table names.
const RESERVED: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both", "case",
    "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch",
    "for", "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset", "on",
    "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "table", "then", "to", "trailing", "true", "union",
    "unique", "user", "using", "variadic", "when", "where", "window", "with",
];

/// Quote an identifier only when it would not survive unquoted.
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    let mut chars = name.chars();
    let plain = match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {
            chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        }
        _ => false,
    };
    if plain && !RESERVED.contains(&name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// Type name as written inside `CAST(? AS ...)`.
pub fn cast_type(ty: &TypeDescriptor) -> String {
    match ty.kind() {
        TypeKind::Array(element) => format!("{}[]", cast_type(element)),
        _ => quote_ident(ty.name()).into_owned(),
    }
}

/// A parameter already transformed to its protocol form, with the type it
/// was encoded for.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub value: WireValue,
    pub ty: TypeRef,
}

impl BoundParam {
    pub fn type_oid(&self) -> Oid {
        self.ty.oid()
    }
}

/// Rendered text together with the parameters its placeholders refer to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<BoundParam>,
}

impl From<&str> for Fragment {
    fn from(sql: &str) -> Self {
        Fragment {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SqlWriter {
    sql: String,
    params: Vec<BoundParam>,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self {
            sql: String::with_capacity(256),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub fn push_ident(&mut self, name: &str) {
        self.sql.push_str(&quote_ident(name));
    }

    /// Encode `value` through `ty` and write its placeholder.
    pub fn push_param(&mut self, ty: &TypeRef, value: &Value) -> Result<()> {
        let wire = ty.to_wire(value)?;
        if ty.needs_cast() {
            self.sql.push_str("CAST(? AS ");
            self.sql.push_str(&cast_type(ty));
            self.sql.push(')');
        } else {
            self.sql.push('?');
        }
        self.params.push(BoundParam {
            value: wire,
            ty: ty.clone(),
        });
        Ok(())
    }

    pub fn push_fragment(&mut self, fragment: Fragment) {
        self.sql.push_str(&fragment.sql);
        self.params.extend(fragment.params);
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn finish(self) -> Fragment {
        Fragment {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Implemented by everything that renders to SQL text.
pub trait Render {
    fn render(&self, scope: &mut Scope, out: &mut SqlWriter) -> Result<()>;

    fn to_fragment(&self, scope: &mut Scope) -> Result<Fragment> {
        let mut out = SqlWriter::new();
        self.render(scope, &mut out)?;
        Ok(out.finish())
    }
}

/// Render `items` separated by `sep`.
pub(crate) fn render_list<T: Render>(
    items: &[T],
    sep: &str,
    scope: &mut Scope,
    out: &mut SqlWriter,
) -> Result<()> {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push(sep);
        }
        item.render(scope, out)?;
    }
    Ok(())
}

impl Render for Table {
    fn render(&self, _scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
        out.push_ident(self.name());
        if let Some(alias) = self.alias() {
            out.push(" AS ");
            out.push_ident(alias);
        }
        Ok(())
    }
}

impl Render for Column {
    fn render(&self, scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
        if scope.needs_qualification(self) {
            out.push_ident(self.table_name());
            out.push(".");
        }
        out.push_ident(self.name());
        Ok(())
    }
}

impl Render for Expr {
    fn render(&self, scope: &mut Scope, out: &mut SqlWriter) -> Result<()> {
        match self {
            Expr::Column(column) => column.render(scope, out),
            Expr::Param { value, ty } => out.push_param(ty, value),
            Expr::Default => {
                out.push("DEFAULT");
                Ok(())
            }
            Expr::Boolean(b) => {
                out.push(if *b { "TRUE" } else { "FALSE" });
                Ok(())
            }
            Expr::Function { name, args } => {
                out.push(name);
                out.push("(");
                render_list(args, ", ", scope, out)?;
                out.push(")");
                Ok(())
            }
            Expr::BinaryOp { left, op, right } => {
                let prec = op.precedence();
                render_operand(left, prec, |child| child == *op && op.is_associative(), scope, out)?;
                out.push(" ");
                out.push(op.as_sql());
                out.push(" ");
                render_operand(right, prec, |child| child == *op && op.is_associative(), scope, out)
            }
            Expr::Not(inner) => {
                out.push("NOT ");
                render_operand(inner, self.precedence().unwrap_or(0), |_| false, scope, out)
            }
            Expr::IsNull { expr, negated } => {
                render_operand(expr, self.precedence().unwrap_or(0), |_| false, scope, out)?;
                out.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
                Ok(())
            }
            Expr::Within {
                expr,
                values,
                element,
            } => {
                let array = element.array_of()?;
                render_operand(expr, self.precedence().unwrap_or(0), |_| false, scope, out)?;
                out.push(" = ANY(");
                out.push_param(&array, &Value::Array(values.clone()))?;
                out.push(")");
                Ok(())
            }
            Expr::Subquery(select) => {
                out.push("(");
                select.write(false, scope, out)?;
                out.push(")");
                Ok(())
            }
            Expr::Exists(select) => {
                out.push("EXISTS (");
                select.write(false, scope, out)?;
                out.push(")");
                Ok(())
            }
        }
    }
}

/// Render a child term, parenthesized when it binds looser than its parent
/// or ties with it without being the same associative operator.
pub(crate) fn render_operand(
    expr: &Expr,
    parent: u8,
    chains: impl Fn(BinaryOperator) -> bool,
    scope: &mut Scope,
    out: &mut SqlWriter,
) -> Result<()> {
    let wrap = match (expr.precedence(), expr) {
        (Some(p), Expr::BinaryOp { op, .. }) => p < parent || (p == parent && !chains(*op)),
        (Some(p), _) => p <= parent,
        (None, _) => false,
    };
    if wrap {
        out.push("(");
        expr.render(scope, out)?;
        out.push(")");
    } else {
        expr.render(scope, out)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::fixtures::{self, MOOD};
    use crate::catalog::BaseType;
    use crate::error::Error;

    fn table() -> Table {
        Table::new(
            "t",
            [
                ("a", TypeRef::builtin(BaseType::Int4, false)),
                ("b", TypeRef::builtin(BaseType::Text, true)),
                ("addr", TypeRef::builtin(BaseType::Inet, true)),
                ("mood", fixtures::resolve(MOOD, true)),
            ],
        )
    }

    fn render(expr: &Expr, t: &Table) -> Fragment {
        let mut scope = Scope::new();
        scope.enter(t);
        expr.to_fragment(&mut scope).unwrap()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "users");
        assert_eq!(quote_ident("user_id2"), "user_id2");
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("UserName"), "\"UserName\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident("2fast"), "\"2fast\"");
    }

    #[test]
    fn test_param_placeholder_and_cast() {
        let t = table();
        let frag = render(&Expr::equals(&t.col("a").unwrap(), 5), &t);
        assert_eq!(frag.sql, "a = ?");
        assert_eq!(frag.params[0].value, WireValue::from(5));
        assert_eq!(frag.params[0].type_oid(), 23);

        let frag = render(&Expr::equals(&t.col("addr").unwrap(), "10.0.0.1"), &t);
        assert_eq!(frag.sql, "addr = CAST(? AS inet)");

        let frag = render(&Expr::equals(&t.col("mood").unwrap(), Value::enum_label("ok")), &t);
        assert_eq!(frag.sql, "mood = CAST(? AS mood)");
        assert_eq!(frag.params[0].value, WireValue::text("ok"));
    }

    #[test]
    fn test_within_binds_one_array() {
        let t = table();
        let frag = render(&Expr::within(&t.col("a").unwrap(), [1, 2, 3]), &t);
        assert_eq!(frag.sql, "a = ANY(?)");
        assert_eq!(frag.params.len(), 1);
        assert_eq!(frag.params[0].type_oid(), 1007);

        let frag = render(
            &Expr::within(&t.col("mood").unwrap(), [Value::enum_label("sad")]),
            &t,
        );
        assert_eq!(frag.sql, "mood = ANY(CAST(? AS mood[]))");
    }

    #[test]
    fn test_within_without_array_type() {
        let t = Table::new("t", [("x", TypeRef::unknown())]);
        let mut scope = Scope::new();
        scope.enter(&t);
        let err = Expr::within(&t.col("x").unwrap(), [1])
            .to_fragment(&mut scope)
            .unwrap_err();
        assert!(matches!(err, Error::ParameterShape(_)));
    }

    #[test]
    fn test_parenthesizes_by_precedence() {
        let t = table();
        let a = t.col("a").unwrap();
        let b = t.col("b").unwrap();
        let expr = Expr::equals(&a, 1)
            .or(Expr::equals(&a, 2))
            .and(Expr::column(&b).is_not_null());
        let frag = render(&expr, &t);
        assert_eq!(frag.sql, "(a = ? OR a = ?) AND b IS NOT NULL");
        assert_eq!(frag.params.len(), 2);

        let chained = Expr::equals(&a, 1).and(Expr::equals(&a, 2)).and(Expr::always_true());
        assert_eq!(render(&chained, &t).sql, "a = ? AND a = ? AND TRUE");

        let negated = Expr::equals(&a, 1).or(Expr::column(&b).like(Expr::value(&b, "x%"))).not();
        assert_eq!(render(&negated, &t).sql, "NOT (a = ? OR b LIKE ?)");
    }

    #[test]
    fn test_function_call() {
        let t = table();
        let expr = Expr::function("lower", vec![Expr::column(&t.col("b").unwrap())])
            .eq(Expr::value(&t.col("b").unwrap(), "x"));
        assert_eq!(render(&expr, &t).sql, "lower(b) = ?");
    }

    #[test]
    fn test_rendering_is_deterministic() {
        let t = table();
        let expr = Expr::equals(&t.col("a").unwrap(), 1)
            .and(Expr::within(&t.col("b").unwrap(), ["x", "y"]));
        assert_eq!(render(&expr, &t), render(&expr, &t));
    }
}
