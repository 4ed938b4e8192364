//! Composable, renderable terms.
use super::stmt::Select;
use super::table::Column;
use crate::catalog::TypeRef;
use crate::marshal::Value;

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Comparison
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // Logical
    And,
    Or,
    // Arithmetic
    Plus,
    Minus,
    Multiply,
    Divide,
    // String
    Like,
    ILike,
    Concat,
}

impl BinaryOperator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::And => "AND",
            BinaryOperator::Or => "OR",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Like => "LIKE",
            BinaryOperator::ILike => "ILIKE",
            BinaryOperator::Concat => "||",
        }
    }

    /// Binding strength, higher binds tighter. Mirrors the server's grammar
    /// for the operators we emit.
    pub(crate) fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => 4,
            BinaryOperator::Like | BinaryOperator::ILike => 5,
            BinaryOperator::Concat => 6,
            BinaryOperator::Plus | BinaryOperator::Minus => 7,
            BinaryOperator::Multiply | BinaryOperator::Divide => 8,
        }
    }

    pub(crate) fn is_associative(&self) -> bool {
        matches!(
            self,
            BinaryOperator::And
                | BinaryOperator::Or
                | BinaryOperator::Plus
                | BinaryOperator::Multiply
                | BinaryOperator::Concat
        )
    }
}

/// Precedence of `NOT`, between AND and the comparisons.
pub(crate) const NOT_PRECEDENCE: u8 = 3;

#[derive(Debug, Clone)]
pub enum Expr {
    Column(Column),
    /// A bound parameter, encoded through `ty` at render time.
    Param { value: Value, ty: TypeRef },
    /// The `DEFAULT` marker inside a VALUES tuple.
    Default,
    Boolean(bool),
    Function { name: String, args: Vec<Expr> },
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull { expr: Box<Expr>, negated: bool },
    /// `expr = ANY(?)` with every value bound as one array parameter of
    /// `element`'s array type.
    Within {
        expr: Box<Expr>,
        values: Vec<Value>,
        element: TypeRef,
    },
    Subquery(Box<Select>),
    Exists(Box<Select>),
}

impl Expr {
    pub fn column(column: &Column) -> Self {
        Expr::Column(column.clone())
    }

    pub fn param(value: impl Into<Value>, ty: TypeRef) -> Self {
        Expr::Param {
            value: value.into(),
            ty,
        }
    }

    /// A parameter typed like `column`, for comparisons and assignments.
    pub fn value(column: &Column, value: impl Into<Value>) -> Self {
        Expr::param(value, column.ty().clone())
    }

    /// `column = ?`
    pub fn equals(column: &Column, value: impl Into<Value>) -> Self {
        Expr::column(column).eq(Expr::value(column, value))
    }

    /// `column = ANY(?)`
    pub fn within<I, V>(column: &Column, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::Within {
            expr: Box::new(Expr::column(column)),
            values: values.into_iter().map(Into::into).collect(),
            element: column.ty().clone(),
        }
    }

    /// Renders as `TRUE`. Passing it to `filter` is the only way to update or
    /// delete every row of a table.
    pub fn always_true() -> Self {
        Expr::Boolean(true)
    }

    pub fn function(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn subquery(select: Select) -> Self {
        Expr::Subquery(Box::new(select))
    }

    pub fn exists(select: Select) -> Self {
        Expr::Exists(Box::new(select))
    }

    pub fn binary(self, op: BinaryOperator, right: impl Into<Expr>) -> Self {
        Expr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(right.into()),
        }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::NotEq, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::Lt, right)
    }

    pub fn le(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::LtEq, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::Gt, right)
    }

    pub fn ge(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::GtEq, right)
    }

    pub fn like(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::Like, right)
    }

    pub fn ilike(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::ILike, right)
    }

    pub fn and(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::And, right)
    }

    pub fn or(self, right: impl Into<Expr>) -> Self {
        self.binary(BinaryOperator::Or, right)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    /// Precedence of the outermost operator, if the term is not atomic.
    pub(crate) fn precedence(&self) -> Option<u8> {
        match self {
            Expr::BinaryOp { op, .. } => Some(op.precedence()),
            Expr::Not(_) => Some(NOT_PRECEDENCE),
            Expr::IsNull { .. } | Expr::Within { .. } => Some(4),
            _ => None,
        }
    }
}

impl From<Column> for Expr {
    fn from(column: Column) -> Self {
        Expr::Column(column)
    }
}

impl From<&Column> for Expr {
    fn from(column: &Column) -> Self {
        Expr::column(column)
    }
}
