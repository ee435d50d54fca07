// Repository trait for metrics API access
use crate::domain::catalog::{DimensionDefinition, MetricDefinition};
use crate::domain::series::{AggregateGroup, Availability, LatestValue, MetricQuery, SeriesResult};
use crate::domain::tile::{Filter, Grain};
use async_trait::async_trait;

#[async_trait]
pub trait MetricsRepository: Send + Sync {
    /// Base URL of the metrics API; part of every tile request key.
    fn base_url(&self) -> &str;

    async fn list_metrics(&self) -> anyhow::Result<Vec<MetricDefinition>>;

    async fn list_dimensions(&self) -> anyhow::Result<Vec<DimensionDefinition>>;

    /// First and last bucket with data for a metric at `grain`
    async fn availability(
        &self,
        metric_key: &str,
        grain: Grain,
        filters: &[Filter],
    ) -> anyhow::Result<Availability>;

    /// One series per (metric, group-by combination), points sorted by time
    async fn timeseries(&self, query: &MetricQuery) -> anyhow::Result<Vec<SeriesResult>>;

    /// One group per (metric, group-by combination) over the whole range
    async fn aggregate(&self, query: &MetricQuery) -> anyhow::Result<Vec<AggregateGroup>>;

    async fn latest(
        &self,
        metric_key: &str,
        grain: Grain,
        filters: &[Filter],
    ) -> anyhow::Result<LatestValue>;
}
