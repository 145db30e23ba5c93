//! Result Mapper
//!
//! Converts tabular engine responses back into typed records. The time column
//! is always located by name, never by position, because aggregation queries
//! may omit or reorder the other columns.
//!
//! Cells arrive as untyped JSON scalars. Where the declared type of a column is
//! known, the cell is coerced to it; otherwise the kind is inferred from JSON.

use crate::sql::parse_time;
use crate::transport::TabularData;
use crate::tsdb::error::{TsdbError, TsdbResult};
use crate::tsdb::types::{
    AggregateRow, DeviceData, PointDate, PointType, PointValue, TIMESTAMP_COLUMN,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

/// Declared types of result columns, keyed by header name
pub type ColumnTypes = HashMap<String, PointType>;

fn find_column(table: &TabularData, name: &str) -> TsdbResult<usize> {
    table
        .column(name)
        .ok_or_else(|| TsdbError::MissingColumn(name.to_string()))
}

/// Decode one value cell; `None` for a null cell
fn value_cell(
    column: &str,
    value: &serde_json::Value,
    declared: Option<PointType>,
) -> TsdbResult<Option<PointValue>> {
    match (PointValue::from_json(value), declared) {
        (Some(value), Some(point_type)) => value.coerce_to(column, point_type).map(Some),
        (value, _) => Ok(value),
    }
}

fn time_cell(value: &serde_json::Value) -> TsdbResult<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => parse_time(s),
        other => Err(TsdbError::TimestampParse {
            value: other.to_string(),
        }),
    }
}

/// Iterate rows, rejecting any shorter than the header
fn rows(table: &TabularData) -> impl Iterator<Item = TsdbResult<&[serde_json::Value]>> {
    let expected = table.head.len();
    table.data.iter().enumerate().map(move |(row, cells)| {
        if cells.len() < expected {
            Err(TsdbError::MalformedRow {
                row,
                len: cells.len(),
                expected,
            })
        } else {
            Ok(cells.as_slice())
        }
    })
}

/// `(value, timestamp)` pairs of one point; null cells are not observations
pub fn map_points(
    table: &TabularData,
    point: &str,
    declared: Option<PointType>,
) -> TsdbResult<Vec<PointDate>> {
    let ts_idx = find_column(table, TIMESTAMP_COLUMN)?;
    let value_idx = find_column(table, point)?;

    let mut points = Vec::with_capacity(table.data.len());
    for row in rows(table) {
        let row = row?;
        let ts = time_cell(&row[ts_idx])?;
        if let Some(value) = value_cell(point, &row[value_idx], declared)? {
            points.push(PointDate {
                key: point.to_string(),
                value,
                ts,
            });
        }
    }
    Ok(points)
}

/// Pivot wide rows into one record per distinct timestamp, oldest first
pub fn map_device_rows(
    table: &TabularData,
    edge: &str,
    device: &str,
    types: &ColumnTypes,
) -> TsdbResult<Vec<DeviceData>> {
    let ts_idx = find_column(table, TIMESTAMP_COLUMN)?;
    let mut by_time: BTreeMap<DateTime<Utc>, DeviceData> = BTreeMap::new();

    for row in rows(table) {
        let row = row?;
        let ts = time_cell(&row[ts_idx])?;
        let record = by_time.entry(ts).or_insert_with(|| DeviceData {
            edge_id: edge.to_string(),
            device_id: device.to_string(),
            ts,
            points: BTreeMap::new(),
        });

        for (i, head) in table.head.iter().enumerate() {
            if i == ts_idx {
                continue;
            }
            if let Some(value) = value_cell(head, &row[i], types.get(head).copied())? {
                record.points.insert(head.clone(), value);
            }
        }
    }

    Ok(by_time.into_values().collect())
}

/// Named-field records of bucketed queries, time exposed as `time`
pub fn map_aggregate_rows(
    table: &TabularData,
    types: &ColumnTypes,
) -> TsdbResult<Vec<AggregateRow>> {
    let ts_idx = find_column(table, TIMESTAMP_COLUMN)?;

    let mut records = Vec::with_capacity(table.data.len());
    for row in rows(table) {
        let row = row?;
        let values = table
            .head
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != ts_idx)
            .map(|(i, head)| {
                value_cell(head, &row[i], types.get(head).copied()).map(|v| (head.clone(), v))
            })
            .collect::<TsdbResult<BTreeMap<_, _>>>()?;
        records.push(AggregateRow {
            time: time_cell(&row[ts_idx])?,
            values,
        });
    }
    Ok(records)
}
