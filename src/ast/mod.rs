//! Typed statement construction and rendering.
//!
//! ```text
//! Table / Column         (table.rs)
//!       ↓
//! Expr terms             (expr.rs)
//!       ↓
//! Select / Insert /
//! Update / Delete        (stmt.rs)
//!       ↓ render, with a fresh Scope (scope.rs)
//! SQL text + BoundParams (render.rs)
//!       ↓
//! ? → $n                 (placeholders.rs)
//! ```
pub mod expr;
pub mod placeholders;
pub mod render;
pub mod scope;
pub mod stmt;
pub mod table;

pub use expr::{BinaryOperator, Expr};
pub use placeholders::number_placeholders;
pub use render::{quote_ident, BoundParam, Fragment, Render, SqlWriter};
pub use scope::{OutputColumn, Scope};
pub use stmt::{
    ConflictAction, Delete, Insert, Lock, OnConflict, Order, RenderedStatement, Row, Select,
    Statement, StatementKind, Target, Update,
};
pub use table::{Column, Table, EXCLUDED};
