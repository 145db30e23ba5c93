//! Insert Batcher
//!
//! Groups heterogeneous point writes of one device into a single multi-row
//! insert. Rows are keyed by timestamp at millisecond precision (the precision
//! the engine persists); columns are the union of point names in first-seen
//! order, and a row's missing points are written as `NULL`.
//!
//! ```text
//! temp@T1=21.5, temp@T2=22.0, humidity@T1=55
//!   → INSERT INTO e1.d1 (ts, temp, humidity) VALUES ('T1', 21.5, 55) ('T2', 22.0, NULL)
//! ```

use super::{ident, quote_str, table_name, time_literal, truncate_millis};
use crate::registry::TypeRegistry;
use crate::tsdb::{PointDate, PointType, PointValue, TsdbError, TsdbResult, TIMESTAMP_COLUMN};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// A point write with its resolved type
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub key: String,
    pub value: PointValue,
    pub point_type: PointType,
    pub ts: DateTime<Utc>,
}

impl Field {
    pub fn new(point: PointDate, point_type: PointType) -> Self {
        Self {
            key: point.key,
            value: point.value,
            point_type,
            ts: point.ts,
        }
    }

    /// Dialect literal of the value, checked against the resolved type
    pub fn literal(&self) -> TsdbResult<String> {
        let invalid = |reason: String| TsdbError::InvalidValue {
            point: self.key.clone(),
            reason,
        };

        match (self.point_type, &self.value) {
            (PointType::String, PointValue::String(s)) => Ok(quote_str(s)),
            (PointType::Float, PointValue::Float(f)) => {
                if !f.is_finite() {
                    return Err(invalid(format!("{} is not a finite number", f)));
                }
                let mut text = f.to_string();
                if !text.contains('.') {
                    text.push_str(".0");
                }
                Ok(text)
            }
            (PointType::Int, PointValue::Int(i)) => {
                if i32::try_from(*i).is_err() {
                    return Err(invalid(format!("{} overflows a 32-bit INT column", i)));
                }
                Ok(i.to_string())
            }
            (PointType::Byte, PointValue::Byte(b)) => Ok(b.to_string()),
            (PointType::Bool, PointValue::Bool(b)) => Ok(b.to_string()),
            (expected, value) => Err(TsdbError::ValueTypeMismatch {
                point: self.key.clone(),
                expected,
                actual: value.kind(),
            }),
        }
    }
}

/// Resolve the declared type of every write in a batch
///
/// Each distinct point is looked up once and its value coerced to the
/// declared type. A single unresolved or unconvertible point rejects the
/// whole batch.
pub async fn resolve_fields(
    registry: &TypeRegistry,
    edge: &str,
    device: &str,
    data: &[PointDate],
) -> TsdbResult<Vec<Field>> {
    let mut resolved: HashMap<&str, PointType> = HashMap::new();
    let mut fields = Vec::with_capacity(data.len());

    for point in data {
        let point_type = match resolved.get(point.key.as_str()) {
            Some(point_type) => *point_type,
            None => {
                let point_type = registry
                    .lookup_type(edge, device, &point.key)
                    .await?
                    .ok_or_else(|| TsdbError::TypeResolutionMiss {
                        edge: edge.to_string(),
                        device: device.to_string(),
                        point: point.key.clone(),
                    })?;
                resolved.insert(&point.key, point_type);
                point_type
            }
        };
        let value = point.value.clone().coerce_to(&point.key, point_type)?;
        fields.push(Field::new(PointDate::new(point.key.clone(), value, point.ts), point_type));
    }

    Ok(fields)
}

/// One timestamp's row; `None` cells are written as `NULL`
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRow {
    pub ts: DateTime<Utc>,
    pub cells: Vec<Option<String>>,
}

/// Writes grouped by timestamp, ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    pub columns: Vec<String>,
    pub rows: Vec<BatchRow>,
}

impl InsertBatch {
    /// Group fields by timestamp; any serialization error aborts the batch
    pub fn from_fields(fields: &[Field]) -> TsdbResult<Self> {
        let mut columns: Vec<String> = Vec::new();
        let mut column_index: HashMap<&str, usize> = HashMap::new();
        for field in fields {
            if field.key.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
                return Err(TsdbError::ReservedFieldName(field.key.clone()));
            }
            if !column_index.contains_key(field.key.as_str()) {
                ident(&field.key)?;
                column_index.insert(&field.key, columns.len());
                columns.push(field.key.clone());
            }
        }

        let mut rows: BTreeMap<i64, BatchRow> = BTreeMap::new();
        for field in fields {
            let literal = field.literal()?;
            let row = rows
                .entry(truncate_millis(field.ts))
                .or_insert_with(|| BatchRow {
                    ts: field.ts,
                    cells: vec![None; columns.len()],
                });
            let cell = &mut row.cells[column_index[field.key.as_str()]];
            if cell.is_some() {
                return Err(TsdbError::DuplicateObservation {
                    point: field.key.clone(),
                    ts: super::format_time(field.ts),
                });
            }
            *cell = Some(literal);
        }

        Ok(Self {
            columns,
            rows: rows.into_values().collect(),
        })
    }

    /// Render as one multi-row insert statement
    pub fn to_statement(&self, edge: &str, device: &str) -> TsdbResult<String> {
        if self.rows.is_empty() {
            return Err(TsdbError::EmptySelection("insert without values".to_string()));
        }

        let values: Vec<String> = self
            .rows
            .iter()
            .map(|row| {
                let mut cells = Vec::with_capacity(row.cells.len() + 1);
                cells.push(time_literal(row.ts));
                cells.extend(
                    row.cells
                        .iter()
                        .map(|c| c.clone().unwrap_or_else(|| "NULL".to_string())),
                );
                format!("({})", cells.join(", "))
            })
            .collect();

        Ok(format!(
            "INSERT INTO {} ({}, {}) VALUES {}",
            table_name(edge, device)?,
            TIMESTAMP_COLUMN,
            self.columns.join(", "),
            values.join(" ")
        ))
    }
}

/// Build the bulk insert statement for one device
pub fn build_insert(edge: &str, device: &str, fields: &[Field]) -> TsdbResult<String> {
    InsertBatch::from_fields(fields)?.to_statement(edge, device)
}
