// Tile domain model
use super::viz::VizType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Time bucket size understood by the metrics API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Grain {
    #[serde(rename = "30m")]
    HalfHour,
    #[serde(rename = "hour")]
    Hour,
    #[default]
    #[serde(rename = "day")]
    Day,
    #[serde(rename = "week")]
    Week,
    #[serde(rename = "biweek")]
    Biweek,
    #[serde(rename = "month")]
    Month,
    #[serde(rename = "quarter")]
    Quarter,
}

impl Grain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grain::HalfHour => "30m",
            Grain::Hour => "hour",
            Grain::Day => "day",
            Grain::Week => "week",
            Grain::Biweek => "biweek",
            Grain::Month => "month",
            Grain::Quarter => "quarter",
        }
    }

    /// Whether buckets are shorter than a day, so labels need a clock time.
    pub fn is_intraday(&self) -> bool {
        matches!(self, Grain::HalfHour | Grain::Hour)
    }
}

impl fmt::Display for Grain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Timeseries,
    Aggregate,
    Kpi,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Timeseries => "timeseries",
            DataSource::Aggregate => "aggregate",
            DataSource::Kpi => "kpi",
        }
    }
}

/// Selected categorical values for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub dimension_id: i64,
    #[serde(default)]
    pub value_ids: Vec<i64>,
}

impl Filter {
    /// A filter without selected values does not constrain anything.
    pub fn is_active(&self) -> bool {
        !self.value_ids.is_empty()
    }
}

/// Filters that actually constrain a query.
pub fn active_filters(filters: &[Filter]) -> Vec<Filter> {
    filters.iter().filter(|f| f.is_active()).cloned().collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TileLayout {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl TileLayout {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LabelMode {
    #[default]
    Auto,
    Short,
    Full,
}

impl LabelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelMode::Auto => "auto",
            LabelMode::Short => "short",
            LabelMode::Full => "full",
        }
    }
}

/// Visual settings. Each viz type reads only the options its descriptor exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Visuals {
    pub title: Option<String>,
    pub show_legend: bool,
    pub show_comparison: bool,
    pub label_mode: LabelMode,
    pub kpi_show_change: bool,
    pub kpi_show_sparkline: bool,
}

impl Default for Visuals {
    fn default() -> Self {
        Self {
            title: None,
            show_legend: false,
            show_comparison: false,
            label_mode: LabelMode::Auto,
            kpi_show_change: true,
            kpi_show_sparkline: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    pub id: String,
    pub viz_type: VizType,
    pub data_source: DataSource,
    #[serde(default)]
    pub metric_keys: Vec<String>,
    #[serde(default)]
    pub group_by: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub layout: TileLayout,
    #[serde(default)]
    pub layouts: BTreeMap<String, TileLayout>,
    #[serde(default)]
    pub visuals: Visuals,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub grain: Grain,
}

impl Tile {
    /// A fresh tile of the given type with a new client-generated id.
    pub fn new(viz_type: VizType) -> Self {
        let descriptor = viz_type.descriptor();
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            viz_type,
            data_source: descriptor.default_source,
            metric_keys: Vec::new(),
            group_by: Vec::new(),
            filters: Vec::new(),
            layout: TileLayout::new(0, 0, descriptor.default_w, descriptor.default_h),
            layouts: BTreeMap::new(),
            visuals: Visuals::default(),
            start_time: None,
            end_time: None,
            grain: Grain::Day,
        }
    }

    /// Copy with a new id; geometry is kept so packing places it after the source.
    pub fn duplicate(&self) -> Self {
        let mut copy = self.clone();
        copy.id = uuid::Uuid::new_v4().simple().to_string();
        copy
    }

    pub fn primary_metric(&self) -> Option<&str> {
        self.metric_keys.first().map(String::as_str)
    }

    /// Enforce the per-type invariants on metric count, grouping and source.
    pub fn normalize(&mut self) {
        let descriptor = self.viz_type.descriptor();
        if self.metric_keys.len() > descriptor.max_metrics {
            self.metric_keys.truncate(descriptor.max_metrics);
        }
        if !descriptor.supports_group_by {
            self.group_by.clear();
        }
        if !descriptor.allowed_sources.contains(&self.data_source) {
            self.data_source = descriptor.default_source;
        }
    }
}
