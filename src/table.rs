//! The tabular boundary: ordered column names plus rows of heterogeneous
//! JSON scalars, as handed over by whatever loaded the file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ScreenError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Build a table, rejecting an empty schema or rows of the wrong width.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self> {
        if columns.is_empty() {
            return Err(ScreenError::EmptySchema);
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(ScreenError::RaggedRow {
                    row: i,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Self { columns, rows })
    }

    /// Build a table from an array of JSON objects. Columns are the union of
    /// keys in first-seen order; absent keys become null.
    pub fn from_records(records: &[Value]) -> Result<Self> {
        let mut columns: Vec<String> = Vec::new();
        for (i, rec) in records.iter().enumerate() {
            let obj = rec
                .as_object()
                .ok_or_else(|| ScreenError::NotTabular(format!("record {i} is not an object")))?;
            for key in obj.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let rows = records
            .iter()
            .map(|rec| {
                columns
                    .iter()
                    .map(|c| rec.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self::new(columns, rows)
    }

    /// Parse a JSON document holding either an array of records or a single record.
    pub fn from_json_str(s: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(s)? {
            Value::Array(arr) => Self::from_records(&arr),
            obj @ Value::Object(_) => Self::from_records(&[obj]),
            other => Err(ScreenError::NotTabular(format!(
                "expected an array of records, got {}",
                type_name(&other)
            ))),
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn cell(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    /// Cell rendered as text; null and blank cells are `None`.
    pub fn text(&self, row: usize, col: usize) -> Option<String> {
        cell_text(self.cell(row, col))
    }

    /// Cell as a finite number, tolerating thousands separators and a peso prefix.
    pub fn number(&self, row: usize, col: usize) -> Option<f64> {
        parse_number(self.cell(row, col))
    }

    /// One row as a JSON object in column order.
    pub fn record(&self, row: usize) -> Map<String, Value> {
        self.columns
            .iter()
            .cloned()
            .zip(self.rows[row].iter().cloned())
            .collect()
    }

    pub fn to_records(&self) -> Vec<Value> {
        (0..self.len()).map(|i| Value::Object(self.record(i))).collect()
    }

    /// Distinct non-blank trimmed values of a column, sorted.
    pub fn distinct_text(&self, col: usize) -> Vec<String> {
        let mut vals: Vec<String> = (0..self.len())
            .filter_map(|i| self.text(i, col))
            .map(|s| s.trim().to_string())
            .collect();
        vals.sort();
        vals.dedup();
        vals
    }
}

pub fn cell_text(v: &Value) -> Option<String> {
    let s = match v {
        Value::Null => return None,
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    };
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

pub fn parse_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64().filter(|x| x.is_finite()),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

/// "1,234,567.89", "₱ 1,000", "PHP 250000" → number. Non-numeric → `None`.
pub fn parse_number_str(s: &str) -> Option<f64> {
    let mut t = s.trim();
    for prefix in ["₱", "PHP", "Php", "php", "P "] {
        if let Some(rest) = t.strip_prefix(prefix) {
            t = rest.trim_start();
            break;
        }
    }
    let cleaned: String = t.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|x| x.is_finite())
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
