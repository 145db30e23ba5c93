//! Core data types for the telemetry adapter
//!
//! This module defines the abstract data model callers work with:
//! - `PointType` / `PointValue`: declared scalar kinds and typed observations
//! - `PointInfo`: a point declaration used to create a device table
//! - `PointDate`, `DeviceData`, `AggregateRow`: records written and read back
//! - `Fill`, `Aggregation`, `Interval`, `Retention`, `TimeRange`, `Page`:
//!   query parameters

use crate::tsdb::error::{TsdbError, TsdbResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::OnceLock;

/// Name of the mandatory timestamp column in every device table
pub const TIMESTAMP_COLUMN: &str = "ts";

/// Default width of a string column when the declaration leaves it unset
pub const DEFAULT_STRING_LEN: u32 = 128;

/// Scalar kind of a point
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PointType {
    Int,
    Float,
    String,
    Bool,
    Byte,
}

impl PointType {
    /// Get all point types for iteration
    pub fn all() -> &'static [PointType] {
        &[
            PointType::Int,
            PointType::Float,
            PointType::String,
            PointType::Bool,
            PointType::Byte,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PointType::Int => "int",
            PointType::Float => "float",
            PointType::String => "string",
            PointType::Bool => "bool",
            PointType::Byte => "byte",
        }
    }
}

impl std::fmt::Display for PointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PointType {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(PointType::Int),
            "float" => Ok(PointType::Float),
            "string" => Ok(PointType::String),
            "bool" => Ok(PointType::Bool),
            "byte" => Ok(PointType::Byte),
            other => Err(TsdbError::UnknownPointType(other.to_string())),
        }
    }
}

/// A typed point value
///
/// Untyped sources (JSON bodies, engine cells) decode integers as `Int`;
/// [`PointValue::coerce_to`] converts them to the declared `PointType` where
/// that is lossless and rejects everything else.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PointValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Byte(u8),
}

impl PointValue {
    /// The point type this value can be written to
    pub fn kind(&self) -> PointType {
        match self {
            PointValue::Int(_) => PointType::Int,
            PointValue::Float(_) => PointType::Float,
            PointValue::String(_) => PointType::String,
            PointValue::Bool(_) => PointType::Bool,
            PointValue::Byte(_) => PointType::Byte,
        }
    }

    /// Infer a value from an untyped wire scalar
    ///
    /// Returns `None` for JSON null (an absent cell). Arrays and objects never
    /// appear in engine responses and are also treated as absent.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Bool(b) => Some(PointValue::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(PointValue::Int(i))
                } else {
                    n.as_f64().map(PointValue::Float)
                }
            }
            serde_json::Value::String(s) => Some(PointValue::String(s.clone())),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PointValue::Int(i) => Some(*i as f64),
            PointValue::Float(f) => Some(*f),
            PointValue::Byte(b) => Some(*b as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PointValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the declared point type without losing information
    ///
    /// Integers become `Byte` when they fit in `0..=255` and `Float` always;
    /// bytes widen to `Int` or `Float`. Any other kind change is a mismatch.
    pub fn coerce_to(self, point: &str, point_type: PointType) -> TsdbResult<Self> {
        match (self, point_type) {
            (value, target) if value.kind() == target => Ok(value),
            (PointValue::Int(i), PointType::Byte) => {
                u8::try_from(i).map(PointValue::Byte).map_err(|_| TsdbError::InvalidValue {
                    point: point.to_string(),
                    reason: format!("{} is outside the byte range 0..=255", i),
                })
            }
            (PointValue::Int(i), PointType::Float) => Ok(PointValue::Float(i as f64)),
            (PointValue::Byte(b), PointType::Int) => Ok(PointValue::Int(b as i64)),
            (PointValue::Byte(b), PointType::Float) => Ok(PointValue::Float(b as f64)),
            (value, expected) => Err(TsdbError::ValueTypeMismatch {
                point: point.to_string(),
                expected,
                actual: value.kind(),
            }),
        }
    }

    /// Parse text as a value of the given point type
    pub fn parse_as(point: &str, text: &str, point_type: PointType) -> TsdbResult<Self> {
        let invalid = || TsdbError::InvalidValue {
            point: point.to_string(),
            reason: format!("'{}' is not a valid {}", text, point_type),
        };
        Ok(match point_type {
            PointType::Int => PointValue::Int(text.trim().parse().map_err(|_| invalid())?),
            PointType::Float => PointValue::Float(text.trim().parse().map_err(|_| invalid())?),
            PointType::Bool => PointValue::Bool(text.trim().parse().map_err(|_| invalid())?),
            PointType::Byte => PointValue::Byte(text.trim().parse().map_err(|_| invalid())?),
            PointType::String => PointValue::String(text.to_string()),
        })
    }
}

impl From<i64> for PointValue {
    fn from(v: i64) -> Self {
        PointValue::Int(v)
    }
}

impl From<i32> for PointValue {
    fn from(v: i32) -> Self {
        PointValue::Int(v as i64)
    }
}

impl From<f64> for PointValue {
    fn from(v: f64) -> Self {
        PointValue::Float(v)
    }
}

impl From<bool> for PointValue {
    fn from(v: bool) -> Self {
        PointValue::Bool(v)
    }
}

impl From<u8> for PointValue {
    fn from(v: u8) -> Self {
        PointValue::Byte(v)
    }
}

impl From<&str> for PointValue {
    fn from(v: &str) -> Self {
        PointValue::String(v.to_string())
    }
}

impl From<String> for PointValue {
    fn from(v: String) -> Self {
        PointValue::String(v)
    }
}

/// Declaration of a point on a device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PointInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub point_type: PointType,
    /// Column width for string points (default 128)
    #[serde(default, rename = "maxLen", skip_serializing_if = "Option::is_none")]
    pub max_len: Option<u32>,
}

impl PointInfo {
    pub fn new(name: impl Into<String>, point_type: PointType) -> Self {
        Self {
            name: name.into(),
            point_type,
            max_len: None,
        }
    }

    /// Builder: set the string column width
    pub fn max_len(mut self, len: u32) -> Self {
        self.max_len = Some(len);
        self
    }

    /// Effective string column width
    pub fn string_len(&self) -> u32 {
        self.max_len.unwrap_or(DEFAULT_STRING_LEN)
    }
}

impl FromStr for PointInfo {
    type Err = TsdbError;

    /// Parse `name:type` or `name:string:len`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let name = parts.next().unwrap_or_default();
        let kind = parts
            .next()
            .ok_or_else(|| TsdbError::InvalidDeclaration(format!("missing type in '{}'", s)))?;
        let mut info = PointInfo::new(name, kind.parse()?);
        if let Some(len) = parts.next() {
            let len = len
                .parse()
                .map_err(|_| TsdbError::InvalidDeclaration(format!("bad length in '{}'", s)))?;
            info = info.max_len(len);
        }
        Ok(info)
    }
}

/// One observation of a point
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointDate {
    pub key: String,
    pub value: PointValue,
    pub ts: DateTime<Utc>,
}

impl PointDate {
    pub fn new(key: impl Into<String>, value: impl Into<PointValue>, ts: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ts,
        }
    }
}

/// All points of one device at one timestamp
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceData {
    #[serde(rename = "edgeID")]
    pub edge_id: String,
    #[serde(rename = "deviceID")]
    pub device_id: String,
    pub ts: DateTime<Utc>,
    /// Non-null cells of the row
    pub points: BTreeMap<String, PointValue>,
}

/// One bucket (or row) of a grouped, snapshot or statistics query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregateRow {
    pub time: DateTime<Utc>,
    /// Values keyed by column alias; `None` where the engine returned null
    #[serde(flatten)]
    pub values: BTreeMap<String, Option<PointValue>>,
}

impl AggregateRow {
    /// Get a non-null value by column alias
    pub fn get(&self, column: &str) -> Option<&PointValue> {
        self.values.get(column).and_then(|v| v.as_ref())
    }
}

/// Policy for buckets without raw observations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Fill {
    /// Linear interpolation
    Line,
    /// Carry the previous value
    Previous,
    /// Leave the bucket null
    Null,
    /// Skip the bucket
    None,
}

impl Fill {
    pub fn all() -> &'static [Fill] {
        &[Fill::Line, Fill::Previous, Fill::Null, Fill::None]
    }
}

impl FromStr for Fill {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "line" => Ok(Fill::Line),
            "previous" => Ok(Fill::Previous),
            "null" => Ok(Fill::Null),
            "none" => Ok(Fill::None),
            other => Err(TsdbError::InvalidDeclaration(format!(
                "unknown fill policy '{}'",
                other
            ))),
        }
    }
}

/// Reducer applied per time bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    First,
    Last,
    Median,
    Mean,
    Max,
    Min,
    Count,
    Sum,
}

impl Aggregation {
    pub fn all() -> &'static [Aggregation] {
        &[
            Aggregation::First,
            Aggregation::Last,
            Aggregation::Median,
            Aggregation::Mean,
            Aggregation::Max,
            Aggregation::Min,
            Aggregation::Count,
            Aggregation::Sum,
        ]
    }

    /// Lowercase name, also used as the column alias
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::First => "first",
            Aggregation::Last => "last",
            Aggregation::Median => "median",
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Count => "count",
            Aggregation::Sum => "sum",
        }
    }
}

impl std::fmt::Display for Aggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        Aggregation::all()
            .iter()
            .copied()
            .find(|a| a.as_str() == lower)
            .ok_or_else(|| TsdbError::InvalidDeclaration(format!("unknown aggregation '{}'", s)))
    }
}

/// Unit of a bucket width
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalUnit {
    Millis,
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl IntervalUnit {
    fn suffix(&self) -> char {
        match self {
            IntervalUnit::Millis => 'a',
            IntervalUnit::Seconds => 's',
            IntervalUnit::Minutes => 'm',
            IntervalUnit::Hours => 'h',
            IntervalUnit::Days => 'd',
            IntervalUnit::Weeks => 'w',
        }
    }

    fn millis(&self) -> i64 {
        match self {
            IntervalUnit::Millis => 1,
            IntervalUnit::Seconds => 1000,
            IntervalUnit::Minutes => 60 * 1000,
            IntervalUnit::Hours => 3600 * 1000,
            IntervalUnit::Days => 24 * 3600 * 1000,
            IntervalUnit::Weeks => 7 * 24 * 3600 * 1000,
        }
    }
}

/// Fixed bucket width such as `10m` or `1h`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub value: u32,
    pub unit: IntervalUnit,
}

impl Interval {
    pub fn new(value: u32, unit: IntervalUnit) -> TsdbResult<Self> {
        if value == 0 {
            return Err(TsdbError::InvalidInterval(format!("0{}", unit.suffix())));
        }
        Ok(Self { value, unit })
    }

    pub fn minutes(value: u32) -> TsdbResult<Self> {
        Self::new(value, IntervalUnit::Minutes)
    }

    pub fn hours(value: u32) -> TsdbResult<Self> {
        Self::new(value, IntervalUnit::Hours)
    }

    /// Bucket width in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.value as i64 * self.unit.millis()
    }
}

fn interval_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([asmhdw])$").expect("static interval pattern"))
}

impl FromStr for Interval {
    type Err = TsdbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TsdbError::InvalidInterval(s.to_string());
        let caps = interval_pattern().captures(s.trim()).ok_or_else(invalid)?;
        let value: u32 = caps[1].parse().map_err(|_| invalid())?;
        let unit = match &caps[2] {
            "a" => IntervalUnit::Millis,
            "s" => IntervalUnit::Seconds,
            "m" => IntervalUnit::Minutes,
            "h" => IntervalUnit::Hours,
            "d" => IntervalUnit::Days,
            "w" => IntervalUnit::Weeks,
            _ => return Err(invalid()),
        };
        Interval::new(value, unit)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.value, self.unit.suffix())
    }
}

/// Data retention of an edge database, in whole days
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    days: u32,
}

impl Retention {
    pub fn days(days: u32) -> TsdbResult<Self> {
        if days == 0 {
            return Err(TsdbError::InvalidRetention("0".to_string()));
        }
        Ok(Self { days })
    }

    pub fn as_days(&self) -> u32 {
        self.days
    }
}

impl FromStr for Retention {
    type Err = TsdbError;

    /// Accepts `30d` or `30`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_suffix('d').unwrap_or(trimmed);
        let days = digits
            .parse()
            .map_err(|_| TsdbError::InvalidRetention(s.to_string()))?;
        Retention::days(days).map_err(|_| TsdbError::InvalidRetention(s.to_string()))
    }
}

/// Query time range, half-open on the left: `(start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    /// Start (exclusive)
    pub start: DateTime<Utc>,
    /// End (inclusive)
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a time range, rejecting `start >= end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> TsdbResult<Self> {
        if start >= end {
            return Err(TsdbError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    /// Range of `span` ending now
    ///
    /// Spans shorter than one millisecond are clamped to one millisecond, so
    /// `start < end` always holds.
    pub fn trailing(span: chrono::Duration) -> Self {
        let end = Utc::now();
        let span = span.max(chrono::Duration::milliseconds(1));
        Self {
            start: end - span,
            end,
        }
    }

    /// Range covering the last N hours up to now, at least one hour
    pub fn last_hours(hours: i64) -> Self {
        Self::trailing(chrono::Duration::hours(hours.max(1)))
    }

    /// Range covering the last N days up to now, at least one day
    pub fn last_days(days: i64) -> Self {
        Self::trailing(chrono::Duration::days(days.max(1)))
    }
}

/// Offset/limit pagination; a limit of zero or less means unbounded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Page {
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// No pagination
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn is_bounded(&self) -> bool {
        self.limit > 0
    }
}
