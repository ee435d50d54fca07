// Visualization types and their capability table
use super::tile::{DataSource, Visuals};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VizType {
    Line,
    Area,
    Bar,
    Donut,
    Table,
    Kpi,
}

/// Static capabilities of one viz type.
#[derive(Debug, Clone, Copy)]
pub struct TileDescriptor {
    pub min_w: u32,
    pub min_h: u32,
    pub default_w: u32,
    pub default_h: u32,
    pub default_source: DataSource,
    pub allowed_sources: &'static [DataSource],
    pub max_metrics: usize,
    pub supports_group_by: bool,
    /// KPI tiles may run without a range and fall back to the latest value.
    pub optional_range: bool,
    pub has_legend: bool,
    pub has_comparison: bool,
    pub has_kpi_rows: bool,
}

const CHART_SOURCES: &[DataSource] = &[DataSource::Timeseries];
const CATEGORICAL_SOURCES: &[DataSource] = &[DataSource::Aggregate, DataSource::Timeseries];
const DONUT_SOURCES: &[DataSource] = &[DataSource::Aggregate];
const KPI_SOURCES: &[DataSource] = &[DataSource::Kpi];

const LINE: TileDescriptor = TileDescriptor {
    min_w: 3,
    min_h: 3,
    default_w: 6,
    default_h: 4,
    default_source: DataSource::Timeseries,
    allowed_sources: CHART_SOURCES,
    max_metrics: 4,
    supports_group_by: true,
    optional_range: false,
    has_legend: true,
    has_comparison: true,
    has_kpi_rows: false,
};

const AREA: TileDescriptor = LINE;

const BAR: TileDescriptor = TileDescriptor {
    default_source: DataSource::Aggregate,
    allowed_sources: CATEGORICAL_SOURCES,
    has_comparison: false,
    ..LINE
};

const DONUT: TileDescriptor = TileDescriptor {
    min_w: 3,
    min_h: 3,
    default_w: 4,
    default_h: 4,
    default_source: DataSource::Aggregate,
    allowed_sources: DONUT_SOURCES,
    max_metrics: 1,
    supports_group_by: true,
    optional_range: false,
    has_legend: true,
    has_comparison: false,
    has_kpi_rows: false,
};

const TABLE: TileDescriptor = TileDescriptor {
    min_w: 4,
    min_h: 3,
    default_w: 6,
    default_h: 4,
    default_source: DataSource::Aggregate,
    allowed_sources: CATEGORICAL_SOURCES,
    max_metrics: 6,
    supports_group_by: true,
    optional_range: false,
    has_legend: false,
    has_comparison: false,
    has_kpi_rows: false,
};

const KPI: TileDescriptor = TileDescriptor {
    min_w: 2,
    min_h: 2,
    default_w: 3,
    default_h: 3,
    default_source: DataSource::Kpi,
    allowed_sources: KPI_SOURCES,
    max_metrics: 1,
    supports_group_by: false,
    optional_range: true,
    has_legend: false,
    has_comparison: false,
    has_kpi_rows: true,
};

impl VizType {
    pub const ALL: [VizType; 6] = [
        VizType::Line,
        VizType::Area,
        VizType::Bar,
        VizType::Donut,
        VizType::Table,
        VizType::Kpi,
    ];

    pub fn descriptor(&self) -> &'static TileDescriptor {
        match self {
            VizType::Line => &LINE,
            VizType::Area => &AREA,
            VizType::Bar => &BAR,
            VizType::Donut => &DONUT,
            VizType::Table => &TABLE,
            VizType::Kpi => &KPI,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VizType::Line => "line",
            VizType::Area => "area",
            VizType::Bar => "bar",
            VizType::Donut => "donut",
            VizType::Table => "table",
            VizType::Kpi => "kpi",
        }
    }
}

/// Minimum `(w, h)` for a tile, grown by the optional visual features it has enabled.
pub fn min_size(viz_type: VizType, visuals: &Visuals) -> (u32, u32) {
    let d = viz_type.descriptor();
    let mut min_h = d.min_h;
    if d.has_legend && visuals.show_legend {
        min_h += 1;
    }
    if d.has_comparison && visuals.show_comparison {
        min_h += 1;
    }
    if d.has_kpi_rows {
        if visuals.kpi_show_change {
            min_h += 1;
        }
        if visuals.kpi_show_sparkline {
            min_h += 1;
        }
    }
    (d.min_w, min_h)
}
