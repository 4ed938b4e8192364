//! Protocol codec for [`WireValue`].
//!
//! Parameters: scalars whose Rust form matches the server's parameter type
//! are sent in binary through the driver's own encoders. Everything else
//! (text-form scalars such as enum labels, numeric or inet strings, and
//! every array, composite and range) is sent in text format so the
//! server's input function parses it.
//!
//! Results arrive in binary and are decoded by walking the driver's
//! [`Type`] for the column: arrays, composites, ranges and domains
//! recursively, text-like scalars as UTF-8.
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::net::{Ipv4Addr, Ipv6Addr};

use bytes::{Buf, BufMut, BytesMut};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};
use uuid::Uuid;

use crate::marshal::{RangeBound, RangeValue, Scalar, WireValue};

type BoxError = Box<dyn StdError + Sync + Send>;

const RANGE_EMPTY: u8 = 0x01;
const RANGE_LB_INC: u8 = 0x02;
const RANGE_UB_INC: u8 = 0x04;
const RANGE_LB_INF: u8 = 0x08;
const RANGE_UB_INF: u8 = 0x10;

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

const PGSQL_AF_INET: u8 = 2;
const PGSQL_AF_INET6: u8 = 3;

impl WireValue {
    /// Whether this value can be handed to the driver's binary encoder for
    /// a parameter of type `ty`.
    fn binary_for(&self, ty: &Type) -> bool {
        let WireValue::Scalar(scalar) = self else {
            return false;
        };
        match scalar {
            Scalar::Bool(_) => *ty == Type::BOOL,
            Scalar::Int16(_) | Scalar::Int32(_) | Scalar::Int64(_) => {
                matches!(*ty, Type::INT2 | Type::INT4 | Type::INT8)
            }
            Scalar::Float32(_) | Scalar::Float64(_) => {
                matches!(*ty, Type::FLOAT4 | Type::FLOAT8)
            }
            Scalar::Bytes(_) => *ty == Type::BYTEA,
            Scalar::Uuid(_) => *ty == Type::UUID,
            Scalar::Date(_) => *ty == Type::DATE,
            Scalar::Time(_) => *ty == Type::TIME,
            Scalar::Timestamp(_) => *ty == Type::TIMESTAMP,
            Scalar::TimestampTz(_) => *ty == Type::TIMESTAMPTZ,
            Scalar::Json(_) => matches!(*ty, Type::JSON | Type::JSONB),
            Scalar::Text(_) => false,
        }
    }
}

impl ToSql for WireValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if matches!(self, WireValue::Null) {
            return Ok(IsNull::Yes);
        }
        if !self.binary_for(ty) {
            let mut text = String::new();
            write_text(self, &mut text);
            out.put_slice(text.as_bytes());
            return Ok(IsNull::No);
        }
        match self {
            WireValue::Scalar(scalar) => encode_binary(scalar, ty, out),
            _ => Err("container values are sent as text".into()),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    fn encode_format(&self, ty: &Type) -> Format {
        if self.binary_for(ty) {
            Format::Binary
        } else {
            Format::Text
        }
    }

    to_sql_checked!();
}

fn encode_binary(scalar: &Scalar, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match scalar {
        Scalar::Bool(v) => v.to_sql(ty, out),
        Scalar::Int16(v) => encode_int(i64::from(*v), ty, out),
        Scalar::Int32(v) => encode_int(i64::from(*v), ty, out),
        Scalar::Int64(v) => encode_int(*v, ty, out),
        Scalar::Float32(v) => match *ty {
            Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
            _ => v.to_sql(ty, out),
        },
        Scalar::Float64(v) => match *ty {
            #[allow(clippy::cast_possible_truncation)]
            Type::FLOAT4 => (*v as f32).to_sql(ty, out),
            _ => v.to_sql(ty, out),
        },
        Scalar::Bytes(v) => v.to_sql(ty, out),
        Scalar::Uuid(v) => v.to_sql(ty, out),
        Scalar::Date(v) => v.to_sql(ty, out),
        Scalar::Time(v) => v.to_sql(ty, out),
        Scalar::Timestamp(v) => v.to_sql(ty, out),
        Scalar::TimestampTz(v) => v.to_sql(ty, out),
        Scalar::Json(v) => v.to_sql(ty, out),
        Scalar::Text(v) => v.to_sql(ty, out),
    }
}

fn encode_int(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        _ => v.to_sql(ty, out),
    }
}

/// The server's text input form of a non-null value.
pub fn text_form(value: &WireValue) -> Option<String> {
    if matches!(value, WireValue::Null) {
        return None;
    }
    let mut out = String::new();
    write_text(value, &mut out);
    Some(out)
}

fn write_text(value: &WireValue, out: &mut String) {
    match value {
        WireValue::Null => {}
        WireValue::Scalar(scalar) => write_scalar_text(scalar, out),
        WireValue::Array { elements, .. } => {
            out.push('{');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                match element {
                    WireValue::Null => out.push_str("NULL"),
                    inner @ WireValue::Array { .. } => write_text(inner, out),
                    other => write_quoted(other, out),
                }
            }
            out.push('}');
        }
        WireValue::Record(fields) => {
            out.push('(');
            for (i, field) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                if !matches!(field, WireValue::Null) {
                    write_quoted(field, out);
                }
            }
            out.push(')');
        }
        WireValue::Range(range) => match range.as_ref() {
            RangeValue::Empty => out.push_str("empty"),
            RangeValue::Bounds { lower, upper } => {
                match lower {
                    RangeBound::Inclusive(v) => {
                        out.push('[');
                        write_quoted(v, out);
                    }
                    RangeBound::Exclusive(v) => {
                        out.push('(');
                        write_quoted(v, out);
                    }
                    RangeBound::Unbounded => out.push('('),
                }
                out.push(',');
                match upper {
                    RangeBound::Inclusive(v) => {
                        write_quoted(v, out);
                        out.push(']');
                    }
                    RangeBound::Exclusive(v) => {
                        write_quoted(v, out);
                        out.push(')');
                    }
                    RangeBound::Unbounded => out.push(')'),
                }
            }
        },
    }
}

/// Element syntax shared by array, record and range literals.
fn write_quoted(value: &WireValue, out: &mut String) {
    let mut inner = String::new();
    write_text(value, &mut inner);
    out.push('"');
    for c in inner.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
}

fn write_scalar_text(scalar: &Scalar, out: &mut String) {
    match scalar {
        Scalar::Bool(b) => out.push(if *b { 't' } else { 'f' }),
        Scalar::Float32(v) => write_float(f64::from(*v), out),
        Scalar::Float64(v) => write_float(*v, out),
        Scalar::Bytes(bytes) => {
            out.push_str("\\x");
            for b in bytes {
                let _ = write!(out, "{:02x}", b);
            }
        }
        Scalar::TimestampTz(dt) => out.push_str(&dt.to_rfc3339()),
        other => out.push_str(&other.display()),
    }
}

fn write_float(v: f64, out: &mut String) {
    if v.is_nan() {
        out.push_str("NaN");
    } else if v.is_infinite() {
        out.push_str(if v > 0.0 { "Infinity" } else { "-Infinity" });
    } else {
        let _ = write!(out, "{}", v);
    }
}

impl<'a> FromSql<'a> for WireValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        decode(ty, raw)
    }

    fn from_sql_null(_: &Type) -> Result<Self, BoxError> {
        Ok(WireValue::Null)
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn decode(ty: &Type, raw: &[u8]) -> Result<WireValue, BoxError> {
    match ty.kind() {
        Kind::Array(element) => decode_array(element, raw),
        Kind::Composite(fields) => {
            let types: Vec<&Type> = fields.iter().map(|f| f.type_()).collect();
            decode_record(&types, raw)
        }
        Kind::Range(subtype) => decode_range(subtype, raw),
        Kind::Domain(base) => decode(base, raw),
        Kind::Enum(_) => Ok(WireValue::text(std::str::from_utf8(raw)?)),
        Kind::Simple => decode_simple(ty, raw),
        other => Err(format!("cannot decode values of type {} ({:?})", ty.name(), other).into()),
    }
}

fn decode_simple(ty: &Type, raw: &[u8]) -> Result<WireValue, BoxError> {
    let scalar = match *ty {
        Type::BOOL => Scalar::Bool(bool::from_sql(ty, raw)?),
        Type::INT2 => Scalar::Int16(i16::from_sql(ty, raw)?),
        Type::INT4 => Scalar::Int32(i32::from_sql(ty, raw)?),
        Type::INT8 => Scalar::Int64(i64::from_sql(ty, raw)?),
        Type::OID => Scalar::Int64(i64::from(u32::from_sql(ty, raw)?)),
        Type::FLOAT4 => Scalar::Float32(f32::from_sql(ty, raw)?),
        Type::FLOAT8 => Scalar::Float64(f64::from_sql(ty, raw)?),
        Type::BYTEA => Scalar::Bytes(raw.to_vec()),
        Type::UUID => Scalar::Uuid(Uuid::from_sql(ty, raw)?),
        Type::DATE => Scalar::Date(NaiveDate::from_sql(ty, raw)?),
        Type::TIME => Scalar::Time(NaiveTime::from_sql(ty, raw)?),
        Type::TIMESTAMP => Scalar::Timestamp(NaiveDateTime::from_sql(ty, raw)?),
        Type::TIMESTAMPTZ => Scalar::TimestampTz(DateTime::<Utc>::from_sql(ty, raw)?),
        Type::JSON | Type::JSONB => Scalar::Json(serde_json::Value::from_sql(ty, raw)?),
        Type::NUMERIC => Scalar::Text(numeric_text(raw)?),
        Type::INET | Type::CIDR => Scalar::Text(inet_text(raw, *ty == Type::CIDR)?),
        Type::MACADDR => Scalar::Text(macaddr_text(raw)?),
        Type::INTERVAL => Scalar::Text(interval_text(raw)?),
        // text, varchar, bpchar, name, xml and anything else sent as UTF-8
        _ => Scalar::Text(std::str::from_utf8(raw)?.to_string()),
    };
    Ok(WireValue::Scalar(scalar))
}

fn read_i16(buf: &mut &[u8]) -> Result<i16, BoxError> {
    if buf.remaining() < 2 {
        return Err("truncated value".into());
    }
    Ok(buf.get_i16())
}

fn read_u16(buf: &mut &[u8]) -> Result<u16, BoxError> {
    if buf.remaining() < 2 {
        return Err("truncated value".into());
    }
    Ok(buf.get_u16())
}

fn read_i32(buf: &mut &[u8]) -> Result<i32, BoxError> {
    if buf.remaining() < 4 {
        return Err("truncated value".into());
    }
    Ok(buf.get_i32())
}

fn read_u8(buf: &mut &[u8]) -> Result<u8, BoxError> {
    if buf.remaining() < 1 {
        return Err("truncated value".into());
    }
    Ok(buf.get_u8())
}

/// A length-prefixed value; `None` for NULL.
fn read_value<'a>(buf: &mut &'a [u8]) -> Result<Option<&'a [u8]>, BoxError> {
    let len = read_i32(buf)?;
    if len < 0 {
        return Ok(None);
    }
    let len = len as usize;
    if buf.len() < len {
        return Err("truncated value".into());
    }
    let (value, rest) = buf.split_at(len);
    *buf = rest;
    Ok(Some(value))
}

fn decode_nullable(ty: &Type, raw: Option<&[u8]>) -> Result<WireValue, BoxError> {
    match raw {
        Some(raw) => decode(ty, raw),
        None => Ok(WireValue::Null),
    }
}

fn decode_array(element: &Type, mut raw: &[u8]) -> Result<WireValue, BoxError> {
    let buf = &mut raw;
    let ndim = read_i32(buf)?;
    let _has_nulls = read_i32(buf)?;
    let _element_oid = read_i32(buf)?;
    let mut dims = Vec::with_capacity(ndim.max(0) as usize);
    for _ in 0..ndim {
        let len = read_i32(buf)?;
        let _lower = read_i32(buf)?;
        dims.push(len.max(0) as usize);
    }
    let total: usize = if dims.is_empty() { 0 } else { dims.iter().product() };
    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        flat.push(decode_nullable(element, read_value(buf)?)?);
    }
    Ok(nest(element.name(), &dims, flat))
}

/// Regroup a flattened multi-dimensional array, outermost dimension first.
fn nest(element: &str, dims: &[usize], flat: Vec<WireValue>) -> WireValue {
    if dims.len() <= 1 {
        return WireValue::Array {
            element_type: element.to_string(),
            elements: flat,
        };
    }
    let inner: usize = dims[1..].iter().product();
    let mut items = flat.into_iter();
    let elements = (0..dims[0])
        .map(|_| nest(element, &dims[1..], items.by_ref().take(inner).collect()))
        .collect();
    WireValue::Array {
        element_type: element.to_string(),
        elements,
    }
}

fn decode_record(fields: &[&Type], mut raw: &[u8]) -> Result<WireValue, BoxError> {
    let buf = &mut raw;
    let count = read_i32(buf)?;
    if count < 0 || count as usize != fields.len() {
        return Err(format!("record has {} fields, expected {}", count, fields.len()).into());
    }
    let mut values = Vec::with_capacity(fields.len());
    for ty in fields {
        let _oid = read_i32(buf)?;
        values.push(decode_nullable(ty, read_value(buf)?)?);
    }
    Ok(WireValue::Record(values))
}

fn decode_range(subtype: &Type, mut raw: &[u8]) -> Result<WireValue, BoxError> {
    let buf = &mut raw;
    let flags = read_u8(buf)?;
    if flags & RANGE_EMPTY != 0 {
        return Ok(WireValue::Range(Box::new(RangeValue::Empty)));
    }
    let lower = read_bound(subtype, buf, flags, RANGE_LB_INF, RANGE_LB_INC)?;
    let upper = read_bound(subtype, buf, flags, RANGE_UB_INF, RANGE_UB_INC)?;
    Ok(WireValue::Range(Box::new(RangeValue::Bounds { lower, upper })))
}

fn read_bound(
    subtype: &Type,
    buf: &mut &[u8],
    flags: u8,
    infinite: u8,
    inclusive: u8,
) -> Result<RangeBound<WireValue>, BoxError> {
    if flags & infinite != 0 {
        return Ok(RangeBound::Unbounded);
    }
    let value = decode_nullable(subtype, read_value(buf)?)?;
    Ok(if flags & inclusive != 0 {
        RangeBound::Inclusive(value)
    } else {
        RangeBound::Exclusive(value)
    })
}

/// Binary numeric (base-10000 digits) to its decimal text.
fn numeric_text(mut raw: &[u8]) -> Result<String, BoxError> {
    let buf = &mut raw;
    let ndigits = read_i16(buf)?;
    let weight = read_i16(buf)?;
    let sign = read_u16(buf)?;
    let dscale = read_u16(buf)? as usize;
    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        0 | NUMERIC_NEG => {}
        other => return Err(format!("invalid numeric sign {:#x}", other).into()),
    }
    let digits = (0..ndigits.max(0))
        .map(|_| read_i16(buf))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |i: i32| -> i16 {
        usize::try_from(i)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        for i in 0..=i32::from(weight) {
            if i == 0 {
                let _ = write!(out, "{}", digit(i));
            } else {
                let _ = write!(out, "{:04}", digit(i));
            }
        }
    }
    if dscale > 0 {
        let mut frac = String::with_capacity(dscale + 4);
        let mut i = i32::from(weight) + 1;
        while frac.len() < dscale {
            let _ = write!(frac, "{:04}", digit(i));
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }
    Ok(out)
}

fn inet_text(mut raw: &[u8], cidr: bool) -> Result<String, BoxError> {
    let buf = &mut raw;
    let family = read_u8(buf)?;
    let bits = read_u8(buf)?;
    let _is_cidr = read_u8(buf)?;
    let len = read_u8(buf)? as usize;
    if buf.len() != len {
        return Err("inet address length mismatch".into());
    }
    let (addr, max_bits) = match (family, len) {
        (PGSQL_AF_INET, 4) => {
            let octets: [u8; 4] = (*buf).try_into()?;
            (Ipv4Addr::from(octets).to_string(), 32)
        }
        (PGSQL_AF_INET6, 16) => {
            let octets: [u8; 16] = (*buf).try_into()?;
            (Ipv6Addr::from(octets).to_string(), 128)
        }
        _ => return Err(format!("unknown inet family {}", family).into()),
    };
    if cidr || bits != max_bits {
        Ok(format!("{}/{}", addr, bits))
    } else {
        Ok(addr)
    }
}

fn macaddr_text(raw: &[u8]) -> Result<String, BoxError> {
    if raw.len() != 6 {
        return Err("macaddr must be 6 bytes".into());
    }
    Ok(raw
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":"))
}

fn interval_text(mut raw: &[u8]) -> Result<String, BoxError> {
    let buf = &mut raw;
    if buf.remaining() < 16 {
        return Err("truncated interval".into());
    }
    let micros = buf.get_i64();
    let days = buf.get_i32();
    let months = buf.get_i32();

    let sign = if micros < 0 { "-" } else { "" };
    let abs = micros.unsigned_abs();
    let secs = abs / 1_000_000;
    let frac = abs % 1_000_000;
    let mut out = format!(
        "{} mons {} days {}{:02}:{:02}:{:02}",
        months,
        days,
        sign,
        secs / 3600,
        (secs / 60) % 60,
        secs % 60
    );
    if frac > 0 {
        let _ = write!(out, ".{:06}", frac);
    }
    Ok(out)
}
