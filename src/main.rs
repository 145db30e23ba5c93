//! tsbridge CLI
//!
//! Command-line interface over the device adapter:
//! - Create and drop device tables
//! - Save point values
//! - Query last values, history, aggregates, snapshots and statistics
//! - Pass raw statements through to the engine

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tsbridge::config::{generate_default_config, Config, LoggingConfig};
use tsbridge::registry::{FileStore, TypeRegistry};
use tsbridge::sql::{self, AggregateQuery, SnapshotQuery, StatisticsQuery};
use tsbridge::transport::HttpTransport;
use tsbridge::tsdb::{
    Aggregation, Fill, Interval, Page, PointDate, PointInfo, PointValue, Retention, TimeRange,
    TimeSeriesStore, TsEngine, TsdbError,
};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tsbridge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Typed device telemetry over a time-series engine's REST API")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    InitConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create the edge database and a device table
    CreateTable {
        edge: String,
        device: String,
        /// Point declarations: name:type[:maxLen] (types: int, float, string, bool, byte)
        #[arg(required = true)]
        points: Vec<PointInfo>,
        /// Retention of the edge database (e.g., 30d)
        #[arg(short, long)]
        keep: Option<Retention>,
    },

    /// Save point values as one batch
    Save {
        edge: String,
        device: String,
        /// Values in point=value format
        #[arg(required = true)]
        values: Vec<String>,
        /// Observation time (default: now). RFC 3339 or "YYYY-MM-DD HH:MM:SS.mmm"
        #[arg(short, long)]
        time: Option<String>,
    },

    /// Most recent value of a point
    Last {
        edge: String,
        device: String,
        point: String,
        /// Upper bound (default: now)
        #[arg(short, long)]
        before: Option<String>,
    },

    /// Raw history of one point
    History {
        edge: String,
        device: String,
        point: String,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        page: PageArgs,
    },

    /// Raw history of every point of a device
    Device {
        edge: String,
        device: String,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Bucketed aggregates of one point
    Aggregate {
        edge: String,
        device: String,
        point: String,
        /// Aggregations (mean, median, first, last, max, min, count, sum)
        #[arg(short, long = "agg", required = true)]
        aggregations: Vec<Aggregation>,
        /// Bucket width (e.g., 10m, 1h)
        #[arg(short, long, default_value = "10m")]
        interval: Interval,
        /// Fill policy for empty buckets (line, previous, null, none)
        #[arg(short, long, default_value = "null")]
        fill: Fill,
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        page: PageArgs,
    },

    /// First value of several points, optionally per bucket
    Snapshot {
        edge: String,
        device: String,
        #[arg(required = true)]
        points: Vec<String>,
        /// Bucket width (omit for a single row over the range)
        #[arg(short, long)]
        interval: Option<Interval>,
        #[arg(short, long, default_value = "null")]
        fill: Fill,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Bucketed aggregates of several points
    Statistics {
        edge: String,
        device: String,
        /// Selections in point:agg[,agg...] format
        #[arg(required = true)]
        selections: Vec<String>,
        #[arg(short, long, default_value = "10m")]
        interval: Interval,
        #[arg(short, long, default_value = "null")]
        fill: Fill,
        #[command(flatten)]
        range: RangeArgs,
    },

    /// Drop a device table and forget its point types
    Drop { edge: String, device: String },

    /// Execute a raw statement
    Sql { statement: String },
}

#[derive(clap::Args)]
pub struct RangeArgs {
    /// Window ending now (e.g., 30m, 24h, 7d)
    #[arg(short, long, default_value = "24h")]
    pub last: Interval,
    /// Explicit start (overrides --last)
    #[arg(long, requires = "until")]
    pub since: Option<String>,
    /// Explicit end
    #[arg(long, requires = "since")]
    pub until: Option<String>,
}

impl RangeArgs {
    fn time_range(&self) -> CliResult<TimeRange> {
        match (&self.since, &self.until) {
            (Some(since), Some(until)) => Ok(TimeRange::new(parse_timestamp(since)?, parse_timestamp(until)?)?),
            _ => {
                let end = Utc::now();
                Ok(TimeRange::new(end - Duration::milliseconds(self.last.duration_millis()), end)?)
            }
        }
    }
}

#[derive(clap::Args)]
pub struct PageArgs {
    #[arg(long, default_value = "0")]
    pub offset: i64,
    /// Maximum rows (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub limit: i64,
}

impl PageArgs {
    fn page(&self) -> Page {
        Page::new(self.offset, self.limit)
    }
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default()?,
    };
    init_logging(&config.logging)?;

    let engine = connect(&config).await?;
    run(cli.command, &engine).await
}

fn write_default_config(output: Option<&PathBuf>) -> CliResult<()> {
    let config = generate_default_config();
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, &config)?;
            println!("Config written to {:?}", path);
        }
        None => print!("{}", config),
    }
    Ok(())
}

/// Install the tracing subscriber; stdout stays reserved for JSON results
fn init_logging(logging: &LoggingConfig) -> CliResult<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("tsbridge={}", logging.level).into());

    let writer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(std::sync::Mutex::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match logging.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
            .init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_writer(writer))
            .init(),
    }
    Ok(())
}

async fn connect(config: &Config) -> CliResult<TsEngine> {
    let store = FileStore::open(&config.registry.path).await?;
    let mut registry = TypeRegistry::new(Arc::new(store));
    if let Some(group) = &config.registry.group {
        registry = registry.with_group(group.clone());
    }

    let transport = HttpTransport::connect(config.transport.clone()).await?;
    tracing::debug!(url = %config.transport.url, registry = %config.registry.path, "Connected");

    Ok(TsEngine::new(Arc::new(transport), registry).with_deadline(config.transport.request_timeout()))
}

async fn run(command: Commands, engine: &TsEngine) -> CliResult<()> {
    match command {
        Commands::InitConfig { output } => write_default_config(output.as_ref()),

        Commands::CreateTable {
            edge,
            device,
            points,
            keep,
        } => {
            engine.create_device_table(&edge, &device, &points, keep).await?;
            println!("Created {}.{} with {} points", edge, device, points.len());
            Ok(())
        }

        Commands::Save {
            edge,
            device,
            values,
            time,
        } => {
            let ts = match time.as_deref() {
                None | Some("now") => Utc::now(),
                Some(text) => parse_timestamp(text)?,
            };

            let mut data = Vec::with_capacity(values.len());
            for assignment in &values {
                let (point, text) = assignment
                    .split_once('=')
                    .ok_or_else(|| format!("Expected point=value, got '{}'", assignment))?;
                let point_type = engine
                    .registry()
                    .lookup_type(&edge, &device, point)
                    .await?
                    .ok_or_else(|| TsdbError::TypeResolutionMiss {
                        edge: edge.clone(),
                        device: device.clone(),
                        point: point.to_string(),
                    })?;
                data.push(PointDate::new(point, PointValue::parse_as(point, text, point_type)?, ts));
            }

            engine.save_points(&edge, &device, &data).await?;
            println!("Saved {} values to {}.{}", data.len(), edge, device);
            Ok(())
        }

        Commands::Last {
            edge,
            device,
            point,
            before,
        } => {
            let end = match before.as_deref() {
                Some(text) => parse_timestamp(text)?,
                None => Utc::now(),
            };
            print_json(&engine.last_value_before(&edge, &device, &point, end).await?)
        }

        Commands::History {
            edge,
            device,
            point,
            range,
            page,
        } => {
            let points = engine
                .query_point_history(&edge, &device, &point, &range.time_range()?, page.page())
                .await?;
            print_json(&points)
        }

        Commands::Device {
            edge,
            device,
            range,
        } => print_json(&engine.query_device_history(&edge, &device, &range.time_range()?).await?),

        Commands::Aggregate {
            edge,
            device,
            point,
            aggregations,
            interval,
            fill,
            range,
            page,
        } => {
            let mut query = AggregateQuery::new(point, range.time_range()?, interval)
                .fill(fill)
                .page(page.page());
            for aggregation in aggregations {
                query = query.aggregate(aggregation);
            }
            print_json(&engine.query_point_aggregates(&edge, &device, &query).await?)
        }

        Commands::Snapshot {
            edge,
            device,
            points,
            interval,
            fill,
            range,
        } => {
            let names: Vec<&str> = points.iter().map(String::as_str).collect();
            let mut query = SnapshotQuery::new(&names, range.time_range()?);
            if let Some(interval) = interval {
                query = query.interval(interval, fill);
            }
            print_json(&engine.query_device_snapshot(&edge, &device, &query).await?)
        }

        Commands::Statistics {
            edge,
            device,
            selections,
            interval,
            fill,
            range,
        } => {
            let mut query = StatisticsQuery::new(range.time_range()?, interval).fill(fill);
            for selection in &selections {
                let (point, aggregations) = parse_selection(selection)?;
                query = query.point(point, &aggregations);
            }
            print_json(&engine.query_device_statistics(&edge, &device, &query).await?)
        }

        Commands::Drop { edge, device } => {
            engine.drop_device_table(&edge, &device).await?;
            println!("Dropped {}.{}", edge, device);
            Ok(())
        }

        Commands::Sql { statement } => print_json(&engine.execute(&statement).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// RFC 3339, or the engine's own `YYYY-MM-DD HH:MM:SS.mmm` local-time format
fn parse_timestamp(text: &str) -> CliResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    Ok(sql::parse_time(text)?)
}

/// `point:agg[,agg...]`
fn parse_selection(text: &str) -> CliResult<(&str, Vec<Aggregation>)> {
    let (point, list) = text
        .split_once(':')
        .ok_or_else(|| format!("Expected point:agg[,agg...], got '{}'", text))?;
    let aggregations = list
        .split(',')
        .map(|a| a.trim().parse::<Aggregation>())
        .collect::<Result<Vec<_>, _>>()?;
    Ok((point, aggregations))
}
