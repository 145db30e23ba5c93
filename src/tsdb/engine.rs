//! Time-series engine facade
//!
//! `TsEngine` wires the translator, batcher, registry, transport and mapper
//! together behind the `TimeSeriesStore` operations:
//! - Write path: PointDate → registry lookup → InsertBatch → transport
//! - Read path: query shape → statement → transport → registry lookup →
//!   mapper → records
//!
//! The transport and registry are owned by the engine instance; there is no
//! process-wide default connection.

use crate::registry::TypeRegistry;
use crate::sql::{self, AggregateQuery, SnapshotQuery, StatisticsQuery};
use crate::transport::{TabularData, Transport};
use crate::tsdb::error::{TsdbError, TsdbResult};
use crate::tsdb::mapper::{self, ColumnTypes};
use crate::tsdb::types::{
    AggregateRow, DeviceData, Page, PointDate, PointInfo, Retention, TimeRange, TIMESTAMP_COLUMN,
};
use crate::tsdb::TimeSeriesStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Default deadline of a single statement
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

/// Adapter over a table-per-device engine
#[derive(Clone)]
pub struct TsEngine {
    transport: Arc<dyn Transport>,
    registry: TypeRegistry,
    deadline: Duration,
}

impl TsEngine {
    pub fn new(transport: Arc<dyn Transport>, registry: TypeRegistry) -> Self {
        Self {
            transport,
            registry,
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Builder: deadline of each statement and each registry round trip
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self.registry = self.registry.with_deadline(deadline);
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Execute one statement verbatim
    pub async fn execute(&self, statement: &str) -> TsdbResult<TabularData> {
        Ok(self
            .transport
            .execute_within(statement, self.deadline)
            .await?)
    }

    /// Declared types of a result's point columns
    ///
    /// Columns the registry does not know, such as aggregate aliases, are left
    /// out and decoded by inference.
    async fn column_types(
        &self,
        edge: &str,
        device: &str,
        table: &TabularData,
    ) -> TsdbResult<ColumnTypes> {
        let mut types = ColumnTypes::new();
        if table.is_empty() {
            return Ok(types);
        }
        for head in &table.head {
            if head.eq_ignore_ascii_case(TIMESTAMP_COLUMN) {
                continue;
            }
            if let Some(point_type) = self.registry.lookup_type(edge, device, head).await? {
                types.insert(head.clone(), point_type);
            }
        }
        Ok(types)
    }

    /// Record the declared type of every point
    ///
    /// Safe to call again after `RegistryIncomplete`; the table is not touched.
    pub async fn register_point_types(
        &self,
        edge: &str,
        device: &str,
        points: &[PointInfo],
    ) -> TsdbResult<()> {
        let mut pending = Vec::new();
        let mut reason = String::new();

        for point in points {
            if let Err(e) = self
                .registry
                .record_type(edge, device, &point.name, point.point_type)
                .await
            {
                pending.push(point.name.clone());
                reason = e.to_string();
            }
        }

        if pending.is_empty() {
            return Ok(());
        }

        tracing::warn!(edge, device, pending = ?pending, error = %reason, "Point types not recorded");
        Err(TsdbError::RegistryIncomplete {
            table: sql::table_name(edge, device)?,
            pending,
            reason,
        })
    }
}

impl std::fmt::Debug for TsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsEngine")
            .field("registry", &self.registry)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TimeSeriesStore for TsEngine {
    async fn create_device_table(
        &self,
        edge: &str,
        device: &str,
        points: &[PointInfo],
        retention: Option<Retention>,
    ) -> TsdbResult<()> {
        // Build both statements first so a bad declaration executes nothing
        let create_db = sql::build_create_database(edge, retention)?;
        let create_table = sql::build_create_table(edge, device, points)?;

        self.execute(&create_db).await?;
        self.execute(&create_table).await?;
        tracing::info!(edge, device, points = points.len(), "Created device table");

        self.register_point_types(edge, device, points).await
    }

    async fn save_points(&self, edge: &str, device: &str, data: &[PointDate]) -> TsdbResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let fields = sql::resolve_fields(&self.registry, edge, device, data).await?;
        let statement = sql::build_insert(edge, device, &fields)?;
        self.execute(&statement).await?;

        tracing::debug!(edge, device, values = data.len(), "Saved points");
        Ok(())
    }

    async fn last_value_before(
        &self,
        edge: &str,
        device: &str,
        point: &str,
        end: DateTime<Utc>,
    ) -> TsdbResult<PointDate> {
        let statement = sql::last_value_query(edge, device, point, end)?;
        let table = self.execute(&statement).await?;
        let declared = self.registry.lookup_type(edge, device, point).await?;

        mapper::map_points(&table, point, declared)?
            .into_iter()
            .next()
            .ok_or_else(|| TsdbError::EmptyResult(format!("last value of {}.{}.{}", edge, device, point)))
    }

    async fn drop_device_table(&self, edge: &str, device: &str) -> TsdbResult<()> {
        let statement = sql::build_drop_table(edge, device)?;
        self.execute(&statement).await?;

        let removed = self.registry.invalidate_device(edge, device).await?;
        tracing::info!(edge, device, removed, "Dropped device table");
        Ok(())
    }

    async fn query_point_history(
        &self,
        edge: &str,
        device: &str,
        point: &str,
        range: &TimeRange,
        page: Page,
    ) -> TsdbResult<Vec<PointDate>> {
        let statement = sql::point_history_query(edge, device, point, range, page)?;
        let table = self.execute(&statement).await?;
        let declared = self.registry.lookup_type(edge, device, point).await?;
        mapper::map_points(&table, point, declared)
    }

    async fn query_device_history(
        &self,
        edge: &str,
        device: &str,
        range: &TimeRange,
    ) -> TsdbResult<Vec<DeviceData>> {
        let statement = sql::device_history_query(edge, device, range)?;
        let table = self.execute(&statement).await?;
        let types = self.column_types(edge, device, &table).await?;
        mapper::map_device_rows(&table, edge, device, &types)
    }

    async fn query_point_aggregates(
        &self,
        edge: &str,
        device: &str,
        query: &AggregateQuery,
    ) -> TsdbResult<Vec<AggregateRow>> {
        let statement = sql::point_aggregation_query(edge, device, query)?;
        let table = self.execute(&statement).await?;
        mapper::map_aggregate_rows(&table, &ColumnTypes::new())
    }

    async fn query_device_snapshot(
        &self,
        edge: &str,
        device: &str,
        query: &SnapshotQuery,
    ) -> TsdbResult<Vec<AggregateRow>> {
        let statement = sql::device_snapshot_query(edge, device, query)?;
        let table = self.execute(&statement).await?;
        let types = self.column_types(edge, device, &table).await?;
        mapper::map_aggregate_rows(&table, &types)
    }

    async fn query_device_statistics(
        &self,
        edge: &str,
        device: &str,
        query: &StatisticsQuery,
    ) -> TsdbResult<Vec<AggregateRow>> {
        let statement = sql::device_statistics_query(edge, device, query)?;
        let table = self.execute(&statement).await?;
        mapper::map_aggregate_rows(&table, &ColumnTypes::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{MemoryStore, RegistryError, SilentStore, UnavailableStore};
    use crate::sql::format_time;
    use crate::transport::TransportError;
    use crate::tsdb::types::{Aggregation, Fill, PointType, PointValue};
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued results and records every statement
    #[derive(Default)]
    struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<TabularData, TransportError>>>,
        statements: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn respond(&self, result: Result<TabularData, TransportError>) {
            self.responses.lock().unwrap().push_back(result);
        }

        fn statements(&self) -> Vec<String> {
            self.statements.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, statement: &str) -> Result<TabularData, TransportError> {
            self.statements.lock().unwrap().push(statement.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(TabularData::default()))
        }
    }

    fn engine() -> (TsEngine, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let engine = TsEngine::new(transport.clone(), TypeRegistry::in_memory());
        (engine, transport)
    }

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap() + ChronoDuration::milliseconds(123)
    }

    fn range() -> TimeRange {
        TimeRange::new(t1() - ChronoDuration::hours(1), t1() + ChronoDuration::hours(1)).unwrap()
    }

    fn declared() -> Vec<PointInfo> {
        vec![
            PointInfo::new("temp", PointType::Float),
            PointInfo::new("humidity", PointType::Int),
            PointInfo::new("k", PointType::String),
        ]
    }

    #[tokio::test]
    async fn test_create_device_table_registers_types() {
        let (engine, transport) = engine();
        engine
            .create_device_table("e1", "d1", &declared(), Some(Retention::days(30).unwrap()))
            .await
            .unwrap();

        let statements = transport.statements();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE DATABASE IF NOT EXISTS e1 KEEP 30");
        assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS e1.d1 (ts TIMESTAMP"));

        let registry = engine.registry();
        assert_eq!(
            registry.lookup_type("e1", "d1", "humidity").await.unwrap(),
            Some(PointType::Int)
        );
    }

    #[tokio::test]
    async fn test_reserved_name_executes_nothing() {
        let (engine, transport) = engine();
        let points = vec![PointInfo::new("ts", PointType::Int)];
        let result = engine.create_device_table("e1", "d1", &points, None).await;

        assert!(matches!(result, Err(TsdbError::ReservedFieldName(_))));
        assert!(transport.statements().is_empty());
    }

    #[tokio::test]
    async fn test_registry_failure_after_table_is_distinct() {
        let transport = Arc::new(ScriptedTransport::default());
        let engine = TsEngine::new(transport.clone(), TypeRegistry::new(Arc::new(UnavailableStore)));

        match engine.create_device_table("e1", "d1", &declared(), None).await {
            Err(TsdbError::RegistryIncomplete { table, pending, .. }) => {
                assert_eq!(table, "e1.d1");
                assert_eq!(pending, vec!["temp", "humidity", "k"]);
            }
            other => panic!("expected registry incomplete, got {:?}", other),
        }
        assert_eq!(transport.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_engine_error_stops_creation() {
        let (engine, transport) = engine();
        transport.respond(Err(TransportError::Engine {
            code: 896,
            desc: "Database not specified or available".to_string(),
        }));

        let err = engine
            .create_device_table("e1", "d1", &declared(), None)
            .await
            .unwrap_err();
        assert_eq!(err.engine_code(), Some(896));
        assert_eq!(transport.statements().len(), 1);
        assert_eq!(engine.registry().lookup_type("e1", "d1", "temp").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_save_points_batches_one_statement() {
        let (engine, transport) = engine();
        engine.create_device_table("e1", "d1", &declared(), None).await.unwrap();

        let t2 = t1() + ChronoDuration::seconds(1);
        let data = vec![
            PointDate::new("temp", 21.5, t1()),
            PointDate::new("temp", 22.0, t2),
            PointDate::new("humidity", 55, t1()),
        ];
        engine.save_points("e1", "d1", &data).await.unwrap();

        let statements = transport.statements();
        assert_eq!(statements.len(), 3);
        assert_eq!(
            statements[2],
            format!(
                "INSERT INTO e1.d1 (ts, temp, humidity) VALUES ('{}', 21.5, 55) ('{}', 22.0, NULL)",
                format_time(t1()),
                format_time(t2)
            )
        );
    }

    #[tokio::test]
    async fn test_save_points_rejects_whole_batch_on_miss() {
        let (engine, transport) = engine();
        engine.create_device_table("e1", "d1", &declared(), None).await.unwrap();

        let data = vec![
            PointDate::new("temp", 21.5, t1()),
            PointDate::new("pressure", 1013.2, t1()),
        ];
        let result = engine.save_points("e1", "d1", &data).await;
        assert!(matches!(result, Err(TsdbError::TypeResolutionMiss { .. })));
        assert_eq!(transport.statements().len(), 2);

        engine.save_points("e1", "d1", &[]).await.unwrap();
        assert_eq!(transport.statements().len(), 2);
    }

    #[tokio::test]
    async fn test_insert_then_select_roundtrip() {
        let (engine, transport) = engine();
        engine.create_device_table("e1", "d1", &declared(), None).await.unwrap();
        engine
            .save_points("e1", "d1", &[PointDate::new("k", "x", t1())])
            .await
            .unwrap();

        // Feed the inserted literal back as the engine would return it
        let insert = transport.statements().pop().unwrap();
        let ts_literal = insert.split('\'').nth(1).unwrap().to_string();
        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "k".to_string()],
            vec![vec![json!(ts_literal), json!("x")]],
        )));

        let points = engine
            .query_point_history("e1", "d1", "k", &range(), Page::unbounded())
            .await
            .unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].value, PointValue::from("x"));
        assert_eq!(points[0].ts, t1());
    }

    #[tokio::test]
    async fn test_last_value_before() {
        let (engine, transport) = engine();
        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "temp".to_string()],
            vec![vec![json!(format_time(t1())), json!(21.5)]],
        )));

        let point = engine
            .last_value_before("e1", "d1", "temp", t1())
            .await
            .unwrap();
        assert_eq!(point.key, "temp");
        assert_eq!(point.value, PointValue::Float(21.5));
        assert_eq!(point.ts, t1());
    }

    #[tokio::test]
    async fn test_last_value_before_empty_is_error() {
        let (engine, transport) = engine();
        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "temp".to_string()],
            vec![],
        )));

        let result = engine.last_value_before("e1", "d1", "temp", t1()).await;
        assert!(matches!(result, Err(TsdbError::EmptyResult(_))));
    }

    #[tokio::test]
    async fn test_drop_invalidates_registry() {
        let (engine, transport) = engine();
        engine.create_device_table("e1", "d1", &declared(), None).await.unwrap();
        engine.drop_device_table("e1", "d1").await.unwrap();

        assert_eq!(
            transport.statements().last().unwrap(),
            "DROP TABLE IF EXISTS e1.d1"
        );
        assert_eq!(engine.registry().lookup_type("e1", "d1", "temp").await.unwrap(), None);

        let result = engine
            .save_points("e1", "d1", &[PointDate::new("temp", 1.0, t1())])
            .await;
        assert!(matches!(result, Err(TsdbError::TypeResolutionMiss { .. })));
    }

    #[tokio::test]
    async fn test_device_history() {
        let (engine, transport) = engine();
        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "temp".to_string(), "humidity".to_string()],
            vec![vec![json!(format_time(t1())), json!(21.5), json!(null)]],
        )));

        let rows = engine.query_device_history("e1", "d1", &range()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].device_id, "d1");
        assert_eq!(rows[0].points.len(), 1);
        assert!(transport.statements()[0].starts_with("SELECT * FROM e1.d1 WHERE"));
    }

    #[tokio::test]
    async fn test_aggregate_snapshot_and_statistics() {
        let (engine, transport) = engine();
        let interval = "10m".parse().unwrap();
        let bucket = vec![json!(format_time(t1())), json!(21.0), json!(22.0)];

        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "mean".to_string(), "median".to_string()],
            vec![bucket.clone()],
        )));
        let query = AggregateQuery::new("temp", range(), interval)
            .aggregate(Aggregation::Mean)
            .aggregate(Aggregation::Median)
            .fill(Fill::Null);
        let rows = engine.query_point_aggregates("e1", "d1", &query).await.unwrap();
        assert_eq!(rows[0].get("median"), Some(&PointValue::Float(22.0)));

        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "temp".to_string(), "humidity".to_string()],
            vec![bucket.clone()],
        )));
        let query = SnapshotQuery::new(&["temp", "humidity"], range()).interval(interval, Fill::Previous);
        let rows = engine.query_device_snapshot("e1", "d1", &query).await.unwrap();
        assert_eq!(rows[0].time, t1());

        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "temp_max".to_string(), "temp_min".to_string()],
            vec![bucket],
        )));
        let query = StatisticsQuery::new(range(), interval)
            .point("temp", &[Aggregation::Max, Aggregation::Min]);
        let rows = engine.query_device_statistics("e1", "d1", &query).await.unwrap();
        assert_eq!(rows[0].get("temp_min"), Some(&PointValue::Float(22.0)));

        let statements = transport.statements();
        assert!(statements[0].contains("FILL(NONE)"));
        assert!(statements[1].contains("FIRST(temp) AS temp"));
        assert!(statements[2].contains("MIN(temp) AS temp_min"));
    }

    #[tokio::test]
    async fn test_types_recorded_under_group() {
        let store = Arc::new(MemoryStore::new());
        let transport = Arc::new(ScriptedTransport::default());
        let engine = TsEngine::new(
            transport,
            TypeRegistry::new(store.clone()).with_group("tsdb"),
        );
        engine.create_device_table("e1", "d1", &declared(), None).await.unwrap();
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_byte_and_float_points_through_json() {
        let (engine, transport) = engine();
        let points = vec![
            PointInfo::new("level", PointType::Byte),
            PointInfo::new("temp", PointType::Float),
        ];
        engine.create_device_table("e1", "d1", &points, None).await.unwrap();

        let data: Vec<PointDate> = serde_json::from_str(&format!(
            r#"[{{"key":"level","value":7,"ts":"{ts}"}},{{"key":"temp","value":22,"ts":"{ts}"}}]"#,
            ts = t1().to_rfc3339()
        ))
        .unwrap();
        engine.save_points("e1", "d1", &data).await.unwrap();
        let insert = transport.statements().pop().unwrap();
        assert!(insert.ends_with(", 7, 22.0)"), "{}", insert);

        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "level".to_string()],
            vec![vec![json!(format_time(t1())), json!(7)]],
        )));
        let point = engine.last_value_before("e1", "d1", "level", t1()).await.unwrap();
        assert_eq!(point.value, PointValue::Byte(7));

        transport.respond(Ok(TabularData::new(
            vec!["ts".to_string(), "level".to_string(), "temp".to_string()],
            vec![vec![json!(format_time(t1())), json!(7), json!(22)]],
        )));
        let rows = engine.query_device_history("e1", "d1", &range()).await.unwrap();
        assert_eq!(rows[0].points["level"], PointValue::Byte(7));
        assert_eq!(rows[0].points["temp"], PointValue::Float(22.0));

        let result = engine
            .save_points("e1", "d1", &[PointDate::new("level", 256, t1())])
            .await;
        assert!(matches!(result, Err(TsdbError::InvalidValue { .. })));
    }

    #[tokio::test]
    async fn test_silent_registry_bounded_by_deadline() {
        let transport = Arc::new(ScriptedTransport::default());
        let engine = TsEngine::new(transport.clone(), TypeRegistry::new(Arc::new(SilentStore)))
            .with_deadline(std::time::Duration::from_millis(10));

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            engine.save_points("e1", "d1", &[PointDate::new("temp", 1.0, t1())]),
        )
        .await
        .expect("save outlived the engine deadline");
        assert!(matches!(
            result,
            Err(TsdbError::Registry(RegistryError::Timeout(_)))
        ));
        assert!(transport.statements().is_empty());
    }
}
