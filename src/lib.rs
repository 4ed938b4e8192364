//! Typed PostgreSQL catalog resolution, value marshalling and statement
//! rendering.
pub mod ast;
pub mod catalog;
pub mod db;
pub mod error;
pub mod marshal;

pub use error::{Error, Result};
