//! Schema statements: edge databases and device tables

use super::{ident, table_name};
use crate::tsdb::{PointInfo, PointType, Retention, TsdbError, TsdbResult, TIMESTAMP_COLUMN};
use std::collections::HashSet;

/// Column type of a point
pub fn column_type(point: &PointInfo) -> TsdbResult<String> {
    Ok(match point.point_type {
        PointType::Int => "INT".to_string(),
        PointType::Float => "FLOAT".to_string(),
        PointType::String => {
            let len = point.string_len();
            if len == 0 {
                return Err(TsdbError::InvalidDeclaration(format!(
                    "string point {} needs a positive maxLen",
                    point.name
                )));
            }
            format!("NCHAR({})", len)
        }
        PointType::Bool => "BOOL".to_string(),
        PointType::Byte => "SMALLINT".to_string(),
    })
}

/// `CREATE DATABASE IF NOT EXISTS <edge>[ KEEP <days>]`
pub fn build_create_database(edge: &str, retention: Option<Retention>) -> TsdbResult<String> {
    let edge = ident(edge)?;
    Ok(match retention {
        Some(keep) => format!("CREATE DATABASE IF NOT EXISTS {} KEEP {}", edge, keep.as_days()),
        None => format!("CREATE DATABASE IF NOT EXISTS {}", edge),
    })
}

/// Device table with a leading timestamp column then one column per point
///
/// Points keep their input order. `ts` as a point name is rejected before any
/// statement text is produced.
pub fn build_create_table(edge: &str, device: &str, points: &[PointInfo]) -> TsdbResult<String> {
    if points.is_empty() {
        return Err(TsdbError::EmptySelection(format!(
            "device {} declares no points",
            device
        )));
    }

    let table = table_name(edge, device)?;
    let mut seen = HashSet::with_capacity(points.len());
    let mut columns = Vec::with_capacity(points.len() + 1);
    columns.push(format!("{} TIMESTAMP", TIMESTAMP_COLUMN));

    for point in points {
        if point.name.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
            return Err(TsdbError::ReservedFieldName(point.name.clone()));
        }
        let name = ident(&point.name)?;
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(TsdbError::DuplicatePoint(point.name.clone()));
        }
        columns.push(format!("{} {}", name, column_type(point)?));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        columns.join(", ")
    ))
}

/// `DROP TABLE IF EXISTS <edge>.<device>`
pub fn build_drop_table(edge: &str, device: &str) -> TsdbResult<String> {
    Ok(format!("DROP TABLE IF EXISTS {}", table_name(edge, device)?))
}
