// Metric query results and the canonical tile data shape
use super::tile::{Filter, Grain};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Inclusive query window.
pub type TimeRange = (DateTime<Utc>, DateTime<Utc>);

/// Group-by dimension values of one series or group. Values may be null upstream.
pub type DimensionValues = BTreeMap<String, Option<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub time_start_ts: DateTime<Utc>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub metric_key: String,
    #[serde(default)]
    pub dimensions: DimensionValues,
    #[serde(default)]
    pub points: Vec<SeriesPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub metric_key: String,
    #[serde(default)]
    pub dimensions: DimensionValues,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    pub min_time_start_ts: Option<DateTime<Utc>>,
    pub max_time_start_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestValue {
    pub value: Option<f64>,
    pub time_start_ts: Option<DateTime<Utc>>,
}

/// Parameters shared by the timeseries and aggregate queries.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricQuery {
    pub metric_keys: Vec<String>,
    pub grain: Grain,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub group_by: Vec<String>,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesDefinition {
    pub key: String,
    pub metric_key: String,
    pub label: String,
    pub dimensions: DimensionValues,
}

/// One chart-ready row: a time bucket or an aggregate category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    pub key: String,
    pub label: String,
    pub time_start_ts: Option<DateTime<Utc>>,
    pub values: BTreeMap<String, Option<f64>>,
    pub comparison: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub current: f64,
    pub previous: Option<f64>,
    pub change: f64,
    pub change_pct: f64,
}

impl Summary {
    /// A value with nothing to compare against.
    pub fn single(current: f64) -> Self {
        Self {
            current,
            previous: None,
            change: 0.0,
            change_pct: 0.0,
        }
    }

    pub fn compared(current: f64, previous: f64) -> Self {
        let change = current - previous;
        let change_pct = if previous == 0.0 {
            0.0
        } else {
            change / previous * 100.0
        };
        Self {
            current,
            previous: Some(previous),
            change,
            change_pct,
        }
    }
}

/// Everything a tile needs to render, rebuilt on every resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TileSeriesData {
    pub metrics: Vec<String>,
    pub primary_metric: Option<String>,
    pub series: Vec<SeriesDefinition>,
    pub rows: Vec<ChartRow>,
    pub groups: Vec<AggregateGroup>,
    pub summary: Option<Summary>,
}
