//! Query Translator
//!
//! Builds the selection statements for the five read shapes. Every shape except
//! last-value-before filters on the half-open range `(start, end]`.
//!
//! # Dialect tables
//!
//! | Aggregation | Expression            |
//! |-------------|-----------------------|
//! | median      | `PERCENTILE(p, 50)`   |
//! | mean        | `AVG(p)`              |
//! | others      | `FIRST(p)`, `SUM(p)`… |
//!
//! | Fill     | Keyword  |
//! |----------|----------|
//! | line     | `LINEAR` |
//! | previous | `PREV`   |
//! | none     | `NULL`   |
//! | null     | `NONE`   |

use super::{ident, table_name, time_literal};
use crate::tsdb::{
    Aggregation, Fill, Interval, Page, TimeRange, TsdbError, TsdbResult, TIMESTAMP_COLUMN,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// Dialect keyword of a fill policy
///
/// `None` and `Null` map to `NULL` and `NONE` respectively. This crossing is
/// the mapping deployed systems depend on and is kept as-is; see DESIGN.md.
pub fn fill_keyword(fill: Fill) -> &'static str {
    match fill {
        Fill::Line => "LINEAR",
        Fill::Previous => "PREV",
        Fill::None => "NULL",
        Fill::Null => "NONE",
    }
}

/// Dialect expression of an aggregation over one point
pub fn aggregation_expr(aggregation: Aggregation, point: &str) -> TsdbResult<String> {
    let point = ident(point)?;
    Ok(match aggregation {
        Aggregation::Median => format!("PERCENTILE({}, 50)", point),
        Aggregation::Mean => format!("AVG({})", point),
        Aggregation::First => format!("FIRST({})", point),
        Aggregation::Last => format!("LAST({})", point),
        Aggregation::Max => format!("MAX({})", point),
        Aggregation::Min => format!("MIN({})", point),
        Aggregation::Count => format!("COUNT({})", point),
        Aggregation::Sum => format!("SUM({})", point),
    })
}

/// Column alias of a per-point aggregation in statistics queries
pub fn statistic_alias(point: &str, aggregation: Aggregation) -> String {
    format!("{}_{}", point, aggregation)
}

fn range_clause(range: &TimeRange) -> String {
    format!(
        "{ts} > {} AND {ts} <= {}",
        time_literal(range.start),
        time_literal(range.end),
        ts = TIMESTAMP_COLUMN
    )
}

fn window_clause(interval: Interval, fill: Fill) -> String {
    format!(" INTERVAL({}) FILL({})", interval, fill_keyword(fill))
}

fn page_clause(page: Page) -> String {
    if page.is_bounded() {
        format!(" LIMIT {} OFFSET {}", page.limit, page.offset.max(0))
    } else {
        String::new()
    }
}

/// Grouped aggregation over one point
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub point: String,
    pub range: TimeRange,
    pub interval: Interval,
    pub fill: Fill,
    pub aggregations: Vec<Aggregation>,
    pub page: Page,
}

impl AggregateQuery {
    pub fn new(point: impl Into<String>, range: TimeRange, interval: Interval) -> Self {
        Self {
            point: point.into(),
            range,
            interval,
            fill: Fill::None,
            aggregations: Vec::new(),
            page: Page::unbounded(),
        }
    }

    /// Builder: add an aggregation
    pub fn aggregate(mut self, aggregation: Aggregation) -> Self {
        self.aggregations.push(aggregation);
        self
    }

    /// Builder: set the fill policy
    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }

    /// Builder: paginate buckets
    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// First value per point per bucket, or raw rows when no interval is given
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotQuery {
    pub points: Vec<String>,
    pub range: TimeRange,
    pub interval: Option<Interval>,
    pub fill: Fill,
}

impl SnapshotQuery {
    pub fn new(points: &[&str], range: TimeRange) -> Self {
        Self {
            points: points.iter().map(|p| p.to_string()).collect(),
            range,
            interval: None,
            fill: Fill::None,
        }
    }

    /// Builder: bucket the snapshot
    pub fn interval(mut self, interval: Interval, fill: Fill) -> Self {
        self.interval = Some(interval);
        self.fill = fill;
        self
    }
}

/// Per-point aggregation lists over shared buckets
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsQuery {
    pub points: BTreeMap<String, Vec<Aggregation>>,
    pub range: TimeRange,
    pub interval: Interval,
    pub fill: Fill,
}

impl StatisticsQuery {
    pub fn new(range: TimeRange, interval: Interval) -> Self {
        Self {
            points: BTreeMap::new(),
            range,
            interval,
            fill: Fill::None,
        }
    }

    /// Builder: add aggregations for a point
    pub fn point(mut self, point: impl Into<String>, aggregations: &[Aggregation]) -> Self {
        self.points
            .entry(point.into())
            .or_default()
            .extend_from_slice(aggregations);
        self
    }

    /// Builder: set the fill policy
    pub fn fill(mut self, fill: Fill) -> Self {
        self.fill = fill;
        self
    }
}

/// Most recent value of a point at or before `end`
pub fn last_value_query(
    edge: &str,
    device: &str,
    point: &str,
    end: DateTime<Utc>,
) -> TsdbResult<String> {
    let point = ident(point)?;
    Ok(format!(
        "SELECT {ts}, LAST({p}) AS {p} FROM {} WHERE {ts} <= {}",
        table_name(edge, device)?,
        time_literal(end),
        ts = TIMESTAMP_COLUMN,
        p = point
    ))
}

/// All values of one point in range, oldest first
pub fn point_history_query(
    edge: &str,
    device: &str,
    point: &str,
    range: &TimeRange,
    page: Page,
) -> TsdbResult<String> {
    let point = ident(point)?;
    Ok(format!(
        "SELECT {ts}, {} FROM {} WHERE {} ORDER BY {ts} ASC{}",
        point,
        table_name(edge, device)?,
        range_clause(range),
        page_clause(page),
        ts = TIMESTAMP_COLUMN
    ))
}

/// Every column of a device in range, oldest first
pub fn device_history_query(edge: &str, device: &str, range: &TimeRange) -> TsdbResult<String> {
    Ok(format!(
        "SELECT * FROM {} WHERE {} ORDER BY {} ASC",
        table_name(edge, device)?,
        range_clause(range),
        TIMESTAMP_COLUMN
    ))
}

/// Bucketed aggregations of one point, each aliased by the aggregation name
pub fn point_aggregation_query(
    edge: &str,
    device: &str,
    query: &AggregateQuery,
) -> TsdbResult<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(query.aggregations.len());
    for aggregation in &query.aggregations {
        if seen.insert(*aggregation) {
            columns.push(format!(
                "{} AS {}",
                aggregation_expr(*aggregation, &query.point)?,
                aggregation
            ));
        }
    }
    if columns.is_empty() {
        return Err(TsdbError::EmptySelection(format!(
            "no aggregations requested for {}",
            query.point
        )));
    }

    Ok(format!(
        "SELECT {} FROM {} WHERE {}{}{}",
        columns.join(", "),
        table_name(edge, device)?,
        range_clause(&query.range),
        window_clause(query.interval, query.fill),
        page_clause(query.page)
    ))
}

/// Snapshot of several points, bucketed by first value when an interval is set
pub fn device_snapshot_query(
    edge: &str,
    device: &str,
    query: &SnapshotQuery,
) -> TsdbResult<String> {
    if query.points.is_empty() {
        return Err(TsdbError::EmptySelection("snapshot without points".to_string()));
    }
    let table = table_name(edge, device)?;

    match query.interval {
        Some(interval) => {
            let columns = query
                .points
                .iter()
                .map(|p| Ok(format!("{} AS {}", aggregation_expr(Aggregation::First, p)?, p)))
                .collect::<TsdbResult<Vec<_>>>()?;
            Ok(format!(
                "SELECT {} FROM {} WHERE {}{}",
                columns.join(", "),
                table,
                range_clause(&query.range),
                window_clause(interval, query.fill)
            ))
        }
        None => {
            let columns = query
                .points
                .iter()
                .map(|p| ident(p))
                .collect::<TsdbResult<Vec<_>>>()?;
            Ok(format!(
                "SELECT {ts}, {} FROM {} WHERE {} ORDER BY {ts} ASC",
                columns.join(", "),
                table,
                range_clause(&query.range),
                ts = TIMESTAMP_COLUMN
            ))
        }
    }
}

/// Bucketed statistics of several points, aliased `<point>_<aggregation>`
pub fn device_statistics_query(
    edge: &str,
    device: &str,
    query: &StatisticsQuery,
) -> TsdbResult<String> {
    let mut columns = Vec::new();
    for (point, aggregations) in &query.points {
        let mut seen = HashSet::new();
        for aggregation in aggregations {
            if seen.insert(*aggregation) {
                columns.push(format!(
                    "{} AS {}",
                    aggregation_expr(*aggregation, point)?,
                    statistic_alias(point, *aggregation)
                ));
            }
        }
    }
    if columns.is_empty() {
        return Err(TsdbError::EmptySelection(
            "statistics without aggregations".to_string(),
        ));
    }

    Ok(format!(
        "SELECT {} FROM {} WHERE {}{}",
        columns.join(", "),
        table_name(edge, device)?,
        range_clause(&query.range),
        window_clause(query.interval, query.fill)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::format_time;
    use chrono::TimeZone;

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn where_clause() -> String {
        let r = range();
        format!(
            "ts > '{}' AND ts <= '{}'",
            format_time(r.start),
            format_time(r.end)
        )
    }

    #[test]
    fn test_aggregation_table() {
        assert_eq!(
            aggregation_expr(Aggregation::Median, "temp").unwrap(),
            "PERCENTILE(temp, 50)"
        );
        assert_eq!(aggregation_expr(Aggregation::Mean, "temp").unwrap(), "AVG(temp)");
        for (agg, name) in [
            (Aggregation::First, "FIRST"),
            (Aggregation::Last, "LAST"),
            (Aggregation::Max, "MAX"),
            (Aggregation::Min, "MIN"),
            (Aggregation::Count, "COUNT"),
            (Aggregation::Sum, "SUM"),
        ] {
            assert_eq!(
                aggregation_expr(agg, "temp").unwrap(),
                format!("{}(temp)", name)
            );
            assert_eq!(agg.as_str().to_uppercase(), name);
        }
        assert!(aggregation_expr(Aggregation::Sum, "temp)").is_err());
    }

    #[test]
    fn test_fill_table_is_total_and_distinct() {
        let keywords: HashSet<&str> = Fill::all().iter().map(|f| fill_keyword(*f)).collect();
        assert_eq!(keywords.len(), Fill::all().len());

        assert_eq!(fill_keyword(Fill::Line), "LINEAR");
        assert_eq!(fill_keyword(Fill::Previous), "PREV");
    }

    #[test]
    fn test_fill_null_none_polarity_is_preserved() {
        // Kept crossed on purpose; flagged upstream as a likely defect
        assert_eq!(fill_keyword(Fill::None), "NULL");
        assert_eq!(fill_keyword(Fill::Null), "NONE");
    }

    #[test]
    fn test_last_value_query() {
        let end = range().end;
        assert_eq!(
            last_value_query("e1", "d1", "temp", end).unwrap(),
            format!(
                "SELECT ts, LAST(temp) AS temp FROM e1.d1 WHERE ts <= '{}'",
                format_time(end)
            )
        );
    }

    #[test]
    fn test_point_history_query() {
        let sql = point_history_query("e1", "d1", "temp", &range(), Page::unbounded()).unwrap();
        assert_eq!(
            sql,
            format!("SELECT ts, temp FROM e1.d1 WHERE {} ORDER BY ts ASC", where_clause())
        );

        let sql = point_history_query("e1", "d1", "temp", &range(), Page::new(20, 10)).unwrap();
        assert!(sql.ends_with("ORDER BY ts ASC LIMIT 10 OFFSET 20"));

        let sql = point_history_query("e1", "d1", "temp", &range(), Page::new(20, 0)).unwrap();
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_device_history_query() {
        assert_eq!(
            device_history_query("e1", "d1", &range()).unwrap(),
            format!("SELECT * FROM e1.d1 WHERE {} ORDER BY ts ASC", where_clause())
        );
    }

    #[test]
    fn test_point_aggregation_query() {
        let query = AggregateQuery::new("temp", range(), "10m".parse().unwrap())
            .aggregate(Aggregation::Mean)
            .aggregate(Aggregation::Median)
            .aggregate(Aggregation::Max)
            .aggregate(Aggregation::Mean)
            .fill(Fill::Previous)
            .page(Page::new(0, 100));

        assert_eq!(
            point_aggregation_query("e1", "d1", &query).unwrap(),
            format!(
                "SELECT AVG(temp) AS mean, PERCENTILE(temp, 50) AS median, MAX(temp) AS max \
                 FROM e1.d1 WHERE {} INTERVAL(10m) FILL(PREV) LIMIT 100 OFFSET 0",
                where_clause()
            )
        );

        let empty = AggregateQuery::new("temp", range(), "10m".parse().unwrap());
        assert!(matches!(
            point_aggregation_query("e1", "d1", &empty),
            Err(TsdbError::EmptySelection(_))
        ));
    }

    #[test]
    fn test_snapshot_queries() {
        let raw = SnapshotQuery::new(&["temp", "humidity"], range());
        assert_eq!(
            device_snapshot_query("e1", "d1", &raw).unwrap(),
            format!(
                "SELECT ts, temp, humidity FROM e1.d1 WHERE {} ORDER BY ts ASC",
                where_clause()
            )
        );

        let bucketed = raw.interval("1h".parse().unwrap(), Fill::Line);
        assert_eq!(
            device_snapshot_query("e1", "d1", &bucketed).unwrap(),
            format!(
                "SELECT FIRST(temp) AS temp, FIRST(humidity) AS humidity FROM e1.d1 \
                 WHERE {} INTERVAL(1h) FILL(LINEAR)",
                where_clause()
            )
        );

        let none = SnapshotQuery::new(&[], range());
        assert!(device_snapshot_query("e1", "d1", &none).is_err());
        let bad = SnapshotQuery::new(&["temp", "*"], range());
        assert!(matches!(
            device_snapshot_query("e1", "d1", &bad),
            Err(TsdbError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_statistics_aliases_are_distinct() {
        let query = StatisticsQuery::new(range(), "1d".parse().unwrap())
            .point("temp", &[Aggregation::Max, Aggregation::Min])
            .point("humidity", &[Aggregation::Max])
            .fill(Fill::Null);

        assert_eq!(
            device_statistics_query("e1", "d1", &query).unwrap(),
            format!(
                "SELECT MAX(humidity) AS humidity_max, MAX(temp) AS temp_max, MIN(temp) AS temp_min \
                 FROM e1.d1 WHERE {} INTERVAL(1d) FILL(NONE)",
                where_clause()
            )
        );

        let empty = StatisticsQuery::new(range(), "1d".parse().unwrap()).point("temp", &[]);
        assert!(matches!(
            device_statistics_query("e1", "d1", &empty),
            Err(TsdbError::EmptySelection(_))
        ));
    }
}
