//! Named output formats applied after a value is resolved.
//!
//! A task path may end with a `{{name}}` or `{{name(arg)}}` segment, for
//! example `virtual_memory/used/{{MB}}` or `load_average/one/{{round(2)}}`.
//! Formats transform numbers and walk through sequences and mappings;
//! strings cannot be formatted.

use chrono::{Local, TimeZone};

use super::value::Value;
use crate::utils::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Format {
    Int,
    Round(Option<u32>),
    /// Integer division by `1024^n`.
    Scale(u32),
    Uptime,
    Iso8601,
}

impl Format {
    /// Splits a trailing format directive off `path`.
    pub fn extract(path: &str) -> Result<(&str, Option<Format>)> {
        let Some(body) = path.strip_suffix("}}") else {
            return Ok((path, None));
        };
        let Some(open) = body.rfind("{{") else {
            return Ok((path, None));
        };
        let rest = &body[..open];
        if !(rest.is_empty() || rest.ends_with('/')) {
            return Ok((path, None));
        }
        let format = Format::parse(body[open + 2..].trim())?;
        Ok((rest.strip_suffix('/').unwrap_or(rest), Some(format)))
    }

    pub fn parse(directive: &str) -> Result<Format> {
        let (name, arg) = match directive.split_once('(') {
            Some((name, arg)) => {
                let arg = arg
                    .strip_suffix(')')
                    .ok_or_else(|| Error::UnknownFormat(directive.to_string()))?;
                (name.trim(), Some(arg.trim()))
            }
            None => (directive, None),
        };

        match (name, arg) {
            ("int", None) => Ok(Format::Int),
            ("round", None) => Ok(Format::Round(None)),
            ("round", Some(digits)) => digits
                .parse()
                .map(|d| Format::Round(Some(d)))
                .map_err(|_| Error::UnknownFormat(directive.to_string())),
            ("KB", None) => Ok(Format::Scale(1)),
            ("MB", None) => Ok(Format::Scale(2)),
            ("GB", None) => Ok(Format::Scale(3)),
            ("TB", None) => Ok(Format::Scale(4)),
            ("uptime", None) => Ok(Format::Uptime),
            ("iso8601", None) => Ok(Format::Iso8601),
            _ => Err(Error::UnknownFormat(directive.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Format::Int => "int",
            Format::Round(_) => "round",
            Format::Scale(1) => "KB",
            Format::Scale(2) => "MB",
            Format::Scale(3) => "GB",
            Format::Scale(_) => "TB",
            Format::Uptime => "uptime",
            Format::Iso8601 => "iso8601",
        }
    }

    pub fn apply(&self, value: Value) -> Result<Value> {
        match value {
            Value::Seq(items) => items
                .into_iter()
                .map(|v| self.apply(v))
                .collect::<Result<Vec<_>>>()
                .map(Value::Seq),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| self.apply(v).map(|v| (k, v)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
            Value::Str(s) => Err(Error::incompatible(
                self.name(),
                format!("'{s}' is not a number"),
            )),
            scalar => self.apply_number(&scalar),
        }
    }

    fn apply_number(&self, value: &Value) -> Result<Value> {
        let number = value
            .as_f64()
            .ok_or_else(|| Error::incompatible(self.name(), "value is not a number"))?;

        match self {
            Format::Int => Ok(Value::Int(number.trunc() as i64)),
            Format::Round(None) => Ok(Value::Int(number.round() as i64)),
            Format::Round(Some(digits)) => {
                let factor = 10f64.powi(*digits as i32);
                Ok(Value::Float((number * factor).round() / factor))
            }
            Format::Scale(power) => {
                let divisor = 1024i64.pow(*power);
                Ok(Value::Int(number as i64 / divisor))
            }
            Format::Uptime => Ok(Value::Str(uptime(number as i64))),
            Format::Iso8601 => Local
                .timestamp_opt(number as i64, 0)
                .single()
                .map(|t| Value::Str(t.format("%Y-%m-%dT%H:%M:%S%:z").to_string()))
                .ok_or_else(|| {
                    Error::incompatible(self.name(), format!("{number} is not a valid timestamp"))
                }),
        }
    }
}

fn uptime(seconds: i64) -> String {
    let seconds = seconds.max(0);
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3600;
    let minutes = seconds % 3600 / 60;
    let secs = seconds % 60;
    match days {
        0 => format!("{hours}:{minutes:02}:{secs:02}"),
        1 => format!("1 day, {hours}:{minutes:02}:{secs:02}"),
        _ => format!("{days} days, {hours}:{minutes:02}:{secs:02}"),
    }
}
