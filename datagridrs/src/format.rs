//! Post-fetch display formatting of numeric cells.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::descriptor::{FormatKind, FormatRule, SeparatorStyle};
use crate::query_builder::columns::split_qualified;

const MAX_DECIMALS: u32 = 12;

#[derive(Debug, Error, PartialEq)]
pub enum FormatError {
    #[error("value '{0}' is not numeric")]
    NotNumeric(String),
    #[error("value is not a finite number")]
    NotFinite,
}

/// A cell left unformatted.
#[derive(Debug, Clone, PartialEq)]
pub struct CellFailure {
    pub field: String,
    pub message: String,
}

pub struct RowFormatter<'a> {
    rules: &'a BTreeMap<String, FormatRule>,
}

impl<'a> RowFormatter<'a> {
    pub fn new(rules: &'a BTreeMap<String, FormatRule>) -> Self {
        Self { rules }
    }

    /// Format every ruled cell of `row` in place. A failing cell keeps its
    /// original value and is reported; the rest of the row is unaffected.
    pub fn format_row(&self, row: &mut Map<String, Value>) -> Vec<CellFailure> {
        let mut failures = Vec::new();
        for (field, rule) in self.rules {
            let key = if row.contains_key(field) {
                field.as_str()
            } else {
                match split_qualified(field) {
                    Some((_, column)) if row.contains_key(column) => column,
                    _ => continue,
                }
            };
            let Some(cell) = row.get_mut(key) else {
                continue;
            };
            match format_value(cell, rule) {
                Ok(Some(formatted)) => *cell = formatted,
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(field = %field, error = %e, "leaving cell unformatted");
                    failures.push(CellFailure {
                        field: field.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }
        failures
    }

    pub fn format_rows(&self, rows: &mut [Map<String, Value>]) -> Vec<CellFailure> {
        if self.rules.is_empty() {
            return Vec::new();
        }
        rows.iter_mut().flat_map(|row| self.format_row(row)).collect()
    }
}

/// Format one value. `Ok(None)` means the value is skipped (null or empty).
pub fn format_value(value: &Value, rule: &FormatRule) -> Result<Option<Value>, FormatError> {
    let number = match value {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FormatError::NotNumeric(s.clone()))?,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FormatError::NotNumeric(n.to_string()))?,
        other => return Err(FormatError::NotNumeric(other.to_string())),
    };
    if !number.is_finite() {
        return Err(FormatError::NotFinite);
    }
    Ok(Some(Value::String(render_number(number, rule))))
}

fn render_number(number: f64, rule: &FormatRule) -> String {
    let decimals = rule.decimals.min(MAX_DECIMALS) as usize;
    let (group, mark) = match rule.separator {
        SeparatorStyle::Comma => (Some(','), '.'),
        SeparatorStyle::Dot => (Some('.'), ','),
        SeparatorStyle::Space => (Some(' '), ','),
        SeparatorStyle::None => (None, '.'),
    };
    let group = match rule.kind {
        FormatKind::Decimal => None,
        _ => group,
    };

    let fixed = format!("{:.*}", decimals, number.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };
    // -0.00 prints as 0.00
    let negative = number < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');

    let mut body = String::with_capacity(fixed.len() + int_part.len() / 3 + 4);
    match group {
        Some(sep) => {
            for (i, ch) in int_part.chars().enumerate() {
                if i > 0 && (int_part.len() - i) % 3 == 0 {
                    body.push(sep);
                }
                body.push(ch);
            }
        }
        None => body.push_str(int_part),
    }
    if let Some(frac) = frac_part {
        body.push(mark);
        body.push_str(frac);
    }

    let sign = if negative { "-" } else { "" };
    match rule.kind {
        FormatKind::Percent => format!("{sign}{body}%"),
        FormatKind::Currency => {
            let symbol = rule.symbol.as_deref().unwrap_or("");
            format!("{sign}{symbol}{body}")
        }
        FormatKind::Number | FormatKind::Decimal => format!("{sign}{body}"),
    }
}
