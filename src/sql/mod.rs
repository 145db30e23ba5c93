//! Statement Translation
//!
//! Builds dialect statements from the abstract data model:
//!
//! - **schema**: database and device table creation
//! - **insert**: multi-row insert batching
//! - **query**: the five selection shapes
//!
//! The dialect cannot bind parameters for identifiers, so every interpolated
//! name goes through [`ident`] and every string value through [`quote_str`].
//!
//! ```text
//! CREATE TABLE IF NOT EXISTS e1.d1 (ts TIMESTAMP, temp FLOAT, humidity INT)
//! INSERT INTO e1.d1 (ts, temp, humidity) VALUES ('2024-01-15 10:00:00.000', 21.5, 55)
//! SELECT AVG(temp) AS mean FROM e1.d1 WHERE ts > '...' AND ts <= '...' INTERVAL(10m) FILL(PREV)
//! ```

pub mod insert;
pub mod query;
pub mod schema;

pub use insert::{build_insert, resolve_fields, BatchRow, Field, InsertBatch};
pub use query::{
    aggregation_expr, device_history_query, device_snapshot_query, device_statistics_query,
    fill_keyword, last_value_query, point_aggregation_query, point_history_query,
    statistic_alias, AggregateQuery, SnapshotQuery, StatisticsQuery,
};
pub use schema::{build_create_database, build_create_table, build_drop_table, column_type};

use crate::tsdb::{TsdbError, TsdbResult};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Textual timestamp format of the dialect, millisecond precision, local time
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Length of a timestamp rendered with [`TIME_FORMAT`]
const TIME_FORMAT_LEN: usize = 23;

/// Validate an identifier against `[A-Za-z_][A-Za-z0-9_]*`
pub fn ident(name: &str) -> TsdbResult<&str> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid && name.len() <= 192 {
        Ok(name)
    } else {
        Err(TsdbError::InvalidIdentifier(name.to_string()))
    }
}

/// `edge.device`, both parts validated
pub fn table_name(edge: &str, device: &str) -> TsdbResult<String> {
    Ok(format!("{}.{}", ident(edge)?, ident(device)?))
}

/// Single-quoted string literal with `\` and `'` escaped
pub fn quote_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Render a timestamp in the dialect's local-time format
pub fn format_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

/// Quoted timestamp literal
pub fn time_literal(ts: DateTime<Utc>) -> String {
    format!("'{}'", format_time(ts))
}

/// Parse a timestamp cell; only the exact [`TIME_FORMAT`] is accepted
pub fn parse_time(value: &str) -> TsdbResult<DateTime<Utc>> {
    let invalid = || TsdbError::TimestampParse {
        value: value.to_string(),
    };
    if value.len() != TIME_FORMAT_LEN || value.as_bytes()[19] != b'.' {
        return Err(invalid());
    }
    let naive = NaiveDateTime::parse_from_str(value, TIME_FORMAT).map_err(|_| invalid())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(invalid)
}

/// Truncate a timestamp to the persisted millisecond precision
pub fn truncate_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_ident_allow_list() {
        assert!(ident("edge_01").is_ok());
        assert!(ident("_hidden").is_ok());
        assert!(ident("Temp2").is_ok());

        for bad in ["", "1abc", "a-b", "a.b", "a b", "x;DROP", "e'1", "tēmp"] {
            assert!(
                matches!(ident(bad), Err(TsdbError::InvalidIdentifier(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("e1", "d1").unwrap(), "e1.d1");
        assert!(table_name("e1", "d1;--").is_err());
    }

    #[test]
    fn test_quote_str_escapes() {
        assert_eq!(quote_str("x"), "'x'");
        assert_eq!(quote_str("it's"), r"'it\'s'");
        assert_eq!(quote_str(r"a\b"), r"'a\\b'");
        assert_eq!(quote_str("'); DROP TABLE d1; --"), r"'\'); DROP TABLE d1; --'");
    }

    #[test]
    fn test_time_roundtrip_millis() {
        let ts = Utc::now();
        let text = format_time(ts);
        assert_eq!(text.len(), TIME_FORMAT_LEN);

        let parsed = parse_time(&text).unwrap();
        assert_eq!(parsed.timestamp_millis(), ts.timestamp_millis());
        assert!(ts - parsed < Duration::milliseconds(1));
    }

    #[test]
    fn test_parse_time_rejects_other_formats() {
        for bad in [
            "2024-01-15 10:00:00",
            "2024-01-15T10:00:00.000",
            "2024-01-15 10:00:00.000000",
            "2024-01-15 10:00:00.0Z0",
            "1705312800000",
            "",
        ] {
            assert!(
                matches!(parse_time(bad), Err(TsdbError::TimestampParse { .. })),
                "{bad} should be rejected"
            );
        }
    }
}
