// In-memory fakes for the repository traits
use crate::application::draft_repository::DraftRepository;
use crate::application::metrics_repository::MetricsRepository;
use crate::domain::catalog::{DimensionDefinition, MetricDefinition};
use crate::domain::dashboard::{Dashboard, DashboardSummary, LayoutPatch, MetadataPatch};
use crate::domain::error::StudioError;
use crate::domain::series::{AggregateGroup, Availability, LatestValue, MetricQuery, SeriesResult};
use crate::domain::tile::{Filter, Grain, Tile};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Default)]
pub struct FakeMetrics {
    pub calls: Mutex<Vec<String>>,
    pub queries: Mutex<Vec<MetricQuery>>,
    pub metrics: Vec<MetricDefinition>,
    pub availability: Mutex<Availability>,
    pub series: Mutex<Vec<SeriesResult>>,
    pub groups: Mutex<Vec<AggregateGroup>>,
    pub latest: Mutex<LatestValue>,
    pub delay: Mutex<Duration>,
    pub fail: Mutex<bool>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self {
            metrics: vec![MetricDefinition {
                metric_id: 1,
                metric_key: "revenue".into(),
                metric_name: "Revenue".into(),
                metric_description: None,
                unit: Some("usd".into()),
                aggregation: Some("sum".into()),
            }],
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn record(&self, call: &str) -> anyhow::Result<()> {
        self.calls.lock().push(call.to_string());
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.fail.lock() {
            return Err(StudioError::Http {
                status: 500,
                body: r#"{"detail":"metrics unavailable"}"#.into(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl MetricsRepository for FakeMetrics {
    fn base_url(&self) -> &str {
        "http://metrics.test"
    }

    async fn list_metrics(&self) -> anyhow::Result<Vec<MetricDefinition>> {
        self.record("metrics").await?;
        Ok(self.metrics.clone())
    }

    async fn list_dimensions(&self) -> anyhow::Result<Vec<DimensionDefinition>> {
        self.record("dimensions").await?;
        Ok(Vec::new())
    }

    async fn availability(
        &self,
        metric_key: &str,
        _grain: Grain,
        _filters: &[Filter],
    ) -> anyhow::Result<Availability> {
        self.record(&format!("availability:{}", metric_key)).await?;
        Ok(self.availability.lock().clone())
    }

    async fn timeseries(&self, query: &MetricQuery) -> anyhow::Result<Vec<SeriesResult>> {
        self.queries.lock().push(query.clone());
        self.record("timeseries").await?;
        Ok(self.series.lock().clone())
    }

    async fn aggregate(&self, query: &MetricQuery) -> anyhow::Result<Vec<AggregateGroup>> {
        self.queries.lock().push(query.clone());
        self.record("aggregate").await?;
        Ok(self.groups.lock().clone())
    }

    async fn latest(
        &self,
        metric_key: &str,
        _grain: Grain,
        _filters: &[Filter],
    ) -> anyhow::Result<LatestValue> {
        self.record(&format!("latest:{}", metric_key)).await?;
        Ok(self.latest.lock().clone())
    }
}

/// Draft store that records every call, with per-call delays and failures.
#[derive(Default)]
pub struct FakeDrafts {
    pub events: Mutex<Vec<String>>,
    pub dashboards: Mutex<HashMap<String, Dashboard>>,
    pub layouts: Mutex<Vec<Vec<LayoutPatch>>>,
    pub metadata: Mutex<Vec<MetadataPatch>>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub failures: Mutex<Vec<String>>,
}

impl FakeDrafts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dashboard(dashboard: Dashboard) -> Self {
        let fake = Self::new();
        fake.dashboards.lock().insert(dashboard.id.clone(), dashboard);
        fake
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    pub fn delay(&self, label: &str, delay: Duration) {
        self.delays.lock().insert(label.to_string(), delay);
    }

    pub fn fail(&self, label: &str) {
        self.failures.lock().push(label.to_string());
    }

    async fn run(&self, label: String) -> anyhow::Result<()> {
        self.events.lock().push(format!("start {}", label));
        let delay = self.delays.lock().get(&label).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.events.lock().push(format!("end {}", label));
        if self.failures.lock().contains(&label) {
            return Err(StudioError::Http {
                status: 409,
                body: format!(r#"{{"detail":"{} rejected"}}"#, label),
            }
            .into());
        }
        Ok(())
    }

    fn dashboard(&self, id: &str) -> anyhow::Result<Dashboard> {
        self.dashboards
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StudioError::DashboardNotFound(id.to_string()).into())
    }
}

#[async_trait]
impl DraftRepository for FakeDrafts {
    async fn list_dashboards(&self) -> anyhow::Result<Vec<DashboardSummary>> {
        self.run("list".into()).await?;
        let mut items: Vec<DashboardSummary> =
            self.dashboards.lock().values().map(|d| d.summary()).collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn get_dashboard(&self, dashboard_id: &str) -> anyhow::Result<Dashboard> {
        self.run(format!("get {}", dashboard_id)).await?;
        self.dashboard(dashboard_id)
    }

    async fn create_dashboard(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Dashboard> {
        self.run(format!("create {}", name)).await?;
        let id = format!("d{}", self.dashboards.lock().len() + 1);
        let dashboard = Dashboard::new(
            id.clone(),
            name.to_string(),
            description.map(str::to_string),
            Vec::new(),
        );
        self.dashboards.lock().insert(id, dashboard.clone());
        Ok(dashboard)
    }

    async fn delete_dashboard(&self, dashboard_id: &str) -> anyhow::Result<()> {
        self.run(format!("delete {}", dashboard_id)).await?;
        self.dashboards.lock().remove(dashboard_id);
        Ok(())
    }

    async fn add_tile(&self, _dashboard_id: &str, tile: &Tile) -> anyhow::Result<()> {
        self.run(format!("add {}", tile.id)).await
    }

    async fn update_tile(&self, _dashboard_id: &str, tile: &Tile) -> anyhow::Result<()> {
        self.run(format!("update {}", tile.id)).await
    }

    async fn delete_tile(&self, _dashboard_id: &str, tile_id: &str) -> anyhow::Result<()> {
        self.run(format!("remove {}", tile_id)).await
    }

    async fn update_layout(&self, _dashboard_id: &str, items: &[LayoutPatch]) -> anyhow::Result<()> {
        self.layouts.lock().push(items.to_vec());
        self.run("layout".into()).await
    }

    async fn update_metadata(
        &self,
        _dashboard_id: &str,
        patch: &MetadataPatch,
    ) -> anyhow::Result<()> {
        self.metadata.lock().push(patch.clone());
        self.run("metadata".into()).await
    }

    async fn commit_draft(&self, dashboard_id: &str) -> anyhow::Result<Dashboard> {
        self.run("commit".into()).await?;
        let mut dashboard = self.dashboard(dashboard_id)?;
        if let Some(patch) = self.metadata.lock().last() {
            dashboard.name = patch.name.clone();
            dashboard.description = patch.description.clone();
        }
        dashboard.is_draft = false;
        Ok(dashboard)
    }

    async fn delete_draft(&self, _dashboard_id: &str) -> anyhow::Result<()> {
        self.run("discard".into()).await
    }
}
