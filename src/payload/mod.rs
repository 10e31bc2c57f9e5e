//! The `payload` module converts resolved values into wire strings.
//!
//! Mappings and multi-element sequences become JSON; scalars are written in
//! their natural textual form. A sequence holding exactly one element is
//! published as that element, so `[42]` and `42` are indistinguishable on
//! the wire. Subscribers rely on this, so it must not change.

use std::io;

use serde::Serialize;
use serde_json::ser::{Formatter, Serializer};

use crate::resolver::Value;
use crate::utils::Result;

pub fn encode(value: &Value) -> Result<String> {
    match value {
        Value::Map(_) => to_json(value),
        Value::Enum(e) => Ok(e.value.to_string()),
        Value::Seq(items) if items.len() == 1 => encode(&items[0]),
        Value::Seq(_) => to_json(value),
        Value::Str(s) => Ok(s.clone()),
        Value::Int(i) => Ok(i.to_string()),
        Value::Float(f) => Ok(float_text(*f)),
    }
}

/// Renders `value` as JSON with `", "` and `": "` separators.
pub fn to_json(value: &Value) -> Result<String> {
    let mut buf = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Shortest round-trip text of `f`. Plain notation keeps a fractional part
/// (`2.0`); outside `[1e-4, 1e16)` the exponent is signed and at least two
/// digits wide (`1e+16`, `1.5e-05`).
fn float_text(f: f64) -> String {
    if f.is_finite() {
        let text = format!("{f:?}");
        match text.split_once('e') {
            Some((mantissa, exponent)) => match exponent.parse::<i32>() {
                Ok(exp) => {
                    let sign = if exp < 0 { '-' } else { '+' };
                    format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
                }
                Err(_) => text,
            },
            None => text,
        }
    } else if f.is_nan() {
        "nan".to_string()
    } else if f.is_sign_positive() {
        "inf".to_string()
    } else {
        "-inf".to_string()
    }
}

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first { Ok(()) } else { writer.write_all(b", ") }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
