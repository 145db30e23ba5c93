//! # tsbridge
//!
//! Device telemetry adapter for a SQL-dialect time-series engine reached over
//! REST. Applications read and write typed point values per device; tsbridge
//! turns those calls into dialect statements and maps the tabular responses
//! back into typed records.
//!
//! ## Features
//!
//! - **Schema management**: one database per edge, one table per device, one
//!   column per declared point
//! - **Batched writes**: every observation of a call lands in one statement
//! - **Typed reads**: last value, history, bucketed aggregates, snapshots and
//!   per-point statistics
//! - **Type registry**: declared point types survive restarts in a key-value store
//!
//! ## Modules
//!
//! - [`tsdb`]: Data model, `TsEngine` and the `TimeSeriesStore` operations
//! - [`sql`]: Statement translation
//! - [`transport`]: REST client for the engine
//! - [`registry`]: Point type registry
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsbridge::registry::{FileStore, TypeRegistry};
//! use tsbridge::transport::{HttpTransport, TransportConfig};
//! use tsbridge::tsdb::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = HttpTransport::connect(TransportConfig::default()).await?;
//!     let registry = TypeRegistry::new(Arc::new(FileStore::open("./types.json").await?));
//!     let engine = TsEngine::new(Arc::new(transport), registry);
//!
//!     // Query the last 24 hours of one point
//!     let points = engine
//!         .query_point_history("edge1", "pump1", "temp", &TimeRange::last_hours(24), Page::unbounded())
//!         .await?;
//!
//!     println!("Found {} readings", points.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod registry;
pub mod sql;
pub mod transport;
pub mod tsdb;

// Re-export top-level types for convenience
pub use tsdb::{
    AggregateRow, Aggregation, DeviceData, Fill, Interval, Page, PointDate, PointInfo, PointType,
    PointValue, Retention, TimeRange, TimeSeriesStore, TsEngine, TsdbError, TsdbResult,
};

pub use sql::{AggregateQuery, SnapshotQuery, StatisticsQuery};

pub use transport::{AuthMode, HttpTransport, TabularData, Transport, TransportConfig, TransportError};

pub use registry::{FileStore, KeyValueStore, MemoryStore, RegistryError, TypeRegistry};

pub use config::{Config, ConfigError, LoggingConfig, RegistryConfig};
