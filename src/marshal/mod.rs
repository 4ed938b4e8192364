//! Value marshalling between host values and protocol values.
//!
//! ```text
//! Value ──TypeRef::to_wire──▶ WireValue ──(db::wire)──▶ bind
//! Value ◀─TypeRef::from_wire─ WireValue ◀─(db::wire)─── row
//! ```
mod pipeline;
pub mod value;

pub use value::{RangeBound, RangeValue, Scalar, Value, WireValue};
