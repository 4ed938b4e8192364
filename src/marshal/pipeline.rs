//! To-wire and from-wire transforms, composed structurally over the
//! descriptor tree.
//!
//! Dispatch happens here and nowhere else: a call site holding a [`TypeRef`]
//! never decides for itself how a catalog type is encoded.
use super::value::{Scalar, Value, WireValue};
use crate::catalog::{Field, TypeKind, TypeRef};
use crate::error::{Error, Result};

impl TypeRef {
    /// Turn a host value into its protocol form.
    pub fn to_wire(&self, value: &Value) -> Result<WireValue> {
        if value.is_null() {
            return Ok(WireValue::Null);
        }

        match self.kind() {
            TypeKind::Unknown => unknown_to_wire(value),
            TypeKind::Base(base) => match value {
                Value::Scalar(scalar) => scalar
                    .coerce(base.native())
                    .map(WireValue::Scalar)
                    .ok_or_else(|| Error::mismatch(base.type_name(), scalar.native().label())),
                other => Err(Error::mismatch(base.type_name(), other.label())),
            },
            TypeKind::Enum(labels) => {
                let label = match value {
                    Value::Enum(label) | Value::Scalar(Scalar::Text(label)) => label,
                    other => return Err(Error::mismatch(self.name(), other.label())),
                };
                if !labels.iter().any(|l| l == label) {
                    return Err(Error::mismatch(
                        format!("{} label", self.name()),
                        format!("{:?}", label),
                    ));
                }
                Ok(WireValue::text(label.as_str()))
            }
            TypeKind::Domain(inner) => match value {
                Value::Domain(wrapped) => inner.to_wire(wrapped),
                bare => inner.to_wire(bare),
            },
            TypeKind::Composite(fields) => {
                let Value::Record(pairs) = value else {
                    return Err(Error::mismatch(self.name(), value.label()));
                };
                if let Some((stray, _)) = pairs
                    .iter()
                    .find(|(name, _)| !fields.iter().any(|f| &f.name == name))
                {
                    return Err(Error::mismatch(
                        format!("field of {}", self.name()),
                        format!("unknown field {:?}", stray),
                    ));
                }
                let wire = fields
                    .iter()
                    .map(|field| match value.field(&field.name) {
                        Some(v) if !v.is_null() => field.ty.to_wire(v),
                        _ if !field.ty.nullable() => Err(Error::mismatch(
                            format!("not null field {} of {}", field.name, self.name()),
                            "null",
                        )),
                        _ => Ok(WireValue::Null),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(WireValue::Record(wire))
            }
            TypeKind::Array(element) => {
                let Value::Array(items) = value else {
                    return Err(Error::mismatch(self.sql_name(), value.label()));
                };
                // A nested array is one more dimension of this array type.
                let elements = items
                    .iter()
                    .map(|item| match item {
                        Value::Array(_) => self.to_wire(item),
                        scalar => element.to_wire(scalar),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(WireValue::Array {
                    element_type: element.name().to_string(),
                    elements,
                })
            }
            TypeKind::Range(subtype) => {
                let Value::Range(range) = value else {
                    return Err(Error::mismatch(self.name(), value.label()));
                };
                let wire = range.try_map(|bound| subtype.to_wire(bound))?;
                Ok(WireValue::Range(Box::new(wire)))
            }
        }
    }

    /// Turn a protocol value back into its host form.
    ///
    /// A NULL at the top level decodes to [`Value::Null`]; whether that is
    /// acceptable is the caller's decision. The same holds for domains:
    /// `Value::domain(Value::Null)` is sent as NULL and comes back as a bare
    /// [`Value::Null`], since the protocol has no wrapped null. NULLs inside composites are
    /// checked against the field's nullability here.
    pub fn from_wire(&self, wire: WireValue) -> Result<Value> {
        if matches!(wire, WireValue::Null) {
            return Ok(Value::Null);
        }

        match self.kind() {
            TypeKind::Unknown => match wire {
                WireValue::Scalar(scalar) => Ok(Value::Scalar(scalar)),
                other => Err(Error::Decode(format!(
                    "{} value for a column of unknown type",
                    other.label()
                ))),
            },
            TypeKind::Base(base) => match wire {
                WireValue::Scalar(scalar) => scalar
                    .coerce(base.native())
                    .map(Value::Scalar)
                    .ok_or_else(|| {
                        Error::Decode(format!(
                            "{} value for a {} column",
                            scalar.native().label(),
                            base.type_name()
                        ))
                    }),
                other => Err(decode_mismatch(self, &other)),
            },
            TypeKind::Enum(labels) => match wire {
                WireValue::Scalar(Scalar::Text(label)) => {
                    if labels.contains(&label) {
                        Ok(Value::Enum(label))
                    } else {
                        Err(Error::Decode(format!(
                            "{:?} is not a label of {}",
                            label,
                            self.name()
                        )))
                    }
                }
                other => Err(decode_mismatch(self, &other)),
            },
            TypeKind::Domain(inner) => Ok(Value::Domain(Box::new(inner.from_wire(wire)?))),
            TypeKind::Composite(fields) => match wire {
                WireValue::Record(values) => decode_record(self, fields, values),
                other => Err(decode_mismatch(self, &other)),
            },
            TypeKind::Array(element) => match wire {
                WireValue::Array { elements, .. } => elements
                    .into_iter()
                    .map(|e| match e {
                        inner @ WireValue::Array { .. } => self.from_wire(inner),
                        scalar => element.from_wire(scalar),
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Value::Array),
                other => Err(decode_mismatch(self, &other)),
            },
            TypeKind::Range(subtype) => match wire {
                WireValue::Range(range) => {
                    let host = range.try_map(|bound| subtype.from_wire(bound.clone()))?;
                    Ok(Value::Range(Box::new(host)))
                }
                other => Err(decode_mismatch(self, &other)),
            },
        }
    }
}

fn unknown_to_wire(value: &Value) -> Result<WireValue> {
    match value {
        Value::Null => Ok(WireValue::Null),
        Value::Scalar(scalar) => Ok(WireValue::Scalar(scalar.clone())),
        Value::Enum(label) => Ok(WireValue::text(label.as_str())),
        Value::Domain(inner) => unknown_to_wire(inner),
        Value::Array(_) => Err(Error::ParameterShape(
            "array value without an element type".into(),
        )),
        other => Err(Error::ParameterShape(format!(
            "{} value without a catalog type",
            other.label()
        ))),
    }
}

fn decode_record(ty: &TypeRef, fields: &[Field], values: Vec<WireValue>) -> Result<Value> {
    if values.len() != fields.len() {
        return Err(Error::Decode(format!(
            "{} has {} fields, received {}",
            ty.name(),
            fields.len(),
            values.len()
        )));
    }
    let mut decoded = Vec::with_capacity(fields.len());
    for (field, wire) in fields.iter().zip(values) {
        let value = field.ty.from_wire(wire)?;
        if value.is_null() && !field.ty.nullable() {
            return Err(Error::Decode(format!(
                "field {} of {} is null but declared not null",
                field.name,
                ty.name()
            )));
        }
        decoded.push((field.name.clone(), value));
    }
    Ok(Value::Record(decoded))
}

fn decode_mismatch(ty: &TypeRef, wire: &WireValue) -> Error {
    Error::Decode(format!("{} value for a {} column", wire.label(), ty.sql_name()))
}
