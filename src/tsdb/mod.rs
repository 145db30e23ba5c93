//! Time-Series Adapter
//!
//! This module exposes the device-oriented data model and the operations on it:
//!
//! - **types**: Point declarations, observations, query parameters
//! - **error**: Error types
//! - **mapper**: Tabular responses → typed records
//! - **engine**: `TsEngine`, the `TimeSeriesStore` implementation
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   PointDate → TypeRegistry → InsertBatch → Transport
//!
//! Read Path:
//!   Query shape → Statement → Transport → Mapper → Records
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use tsbridge::registry::TypeRegistry;
//! use tsbridge::transport::{HttpTransport, TransportConfig};
//! use tsbridge::tsdb::{PointDate, PointInfo, PointType, TimeSeriesStore, TsEngine};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::connect(TransportConfig::new("http://localhost:6041")).await?;
//!     let engine = TsEngine::new(Arc::new(transport), TypeRegistry::in_memory());
//!
//!     engine.create_device_table("edge1", "pump1", &[
//!         PointInfo::new("temp", PointType::Float),
//!         PointInfo::new("running", PointType::Bool),
//!     ], None).await?;
//!
//!     engine.save_points("edge1", "pump1", &[
//!         PointDate::new("temp", 21.5, Utc::now()),
//!         PointDate::new("running", true, Utc::now()),
//!     ]).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod mapper;
pub mod types;

pub use engine::{TsEngine, DEFAULT_DEADLINE};
pub use error::{TsdbError, TsdbResult};
pub use types::{
    AggregateRow, Aggregation, DeviceData, Fill, Interval, IntervalUnit, Page, PointDate,
    PointInfo, PointType, PointValue, Retention, TimeRange, DEFAULT_STRING_LEN, TIMESTAMP_COLUMN,
};

use crate::sql::{AggregateQuery, SnapshotQuery, StatisticsQuery};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Device-oriented operations over a time-series engine
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    /// Create the edge database and device table, then record every point type
    async fn create_device_table(
        &self,
        edge: &str,
        device: &str,
        points: &[PointInfo],
        retention: Option<Retention>,
    ) -> TsdbResult<()>;

    /// Write observations as a single batch; all-or-nothing on type resolution
    async fn save_points(&self, edge: &str, device: &str, data: &[PointDate]) -> TsdbResult<()>;

    /// Most recent value of a point at or before `end`
    async fn last_value_before(
        &self,
        edge: &str,
        device: &str,
        point: &str,
        end: DateTime<Utc>,
    ) -> TsdbResult<PointDate>;

    /// Drop the device table and forget its point types
    async fn drop_device_table(&self, edge: &str, device: &str) -> TsdbResult<()>;

    async fn query_point_history(
        &self,
        edge: &str,
        device: &str,
        point: &str,
        range: &TimeRange,
        page: Page,
    ) -> TsdbResult<Vec<PointDate>>;

    async fn query_device_history(
        &self,
        edge: &str,
        device: &str,
        range: &TimeRange,
    ) -> TsdbResult<Vec<DeviceData>>;

    async fn query_point_aggregates(
        &self,
        edge: &str,
        device: &str,
        query: &AggregateQuery,
    ) -> TsdbResult<Vec<AggregateRow>>;

    async fn query_device_snapshot(
        &self,
        edge: &str,
        device: &str,
        query: &SnapshotQuery,
    ) -> TsdbResult<Vec<AggregateRow>>;

    async fn query_device_statistics(
        &self,
        edge: &str,
        device: &str,
        query: &StatisticsQuery,
    ) -> TsdbResult<Vec<AggregateRow>>;
}
