// Tile data resolution - Time range, source dispatch, shaping and caching
use crate::application::metrics_repository::MetricsRepository;
use crate::application::shaping::{shape_aggregate, shape_latest, shape_timeseries};
use crate::application::tile_cache::TileCache;
use crate::domain::error::{StudioError, describe_error};
use crate::domain::series::{MetricQuery, TileSeriesData, TimeRange};
use crate::domain::tile::{DataSource, Filter, Tile, active_filters};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Order-independent signature of the filters that constrain a query.
pub fn filter_signature(filters: &[Filter]) -> String {
    let mut parts: Vec<String> = active_filters(filters)
        .into_iter()
        .map(|f| {
            let mut values = f.value_ids.clone();
            values.sort_unstable();
            values.dedup();
            let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!("{}:{}", f.dimension_id, values.join(","))
        })
        .collect();
    parts.sort();
    parts.join(";")
}

fn format_bound(bound: Option<DateTime<Utc>>) -> String {
    bound.map(|t| t.to_rfc3339()).unwrap_or_default()
}

#[derive(Clone)]
pub struct TileDataResolver {
    repository: Arc<dyn MetricsRepository>,
    cache: TileCache,
}

impl TileDataResolver {
    pub fn new(repository: Arc<dyn MetricsRepository>, cache: TileCache) -> Self {
        Self { repository, cache }
    }

    /// Composite key identifying everything that shapes a tile's data.
    pub fn request_key(&self, tile: &Tile) -> String {
        [
            self.repository.base_url().to_string(),
            tile.viz_type.as_str().to_string(),
            tile.data_source.as_str().to_string(),
            tile.grain.as_str().to_string(),
            format!("{}..{}", format_bound(tile.start_time), format_bound(tile.end_time)),
            tile.metric_keys.join(","),
            tile.group_by.join(","),
            filter_signature(&tile.filters),
            tile.visuals.label_mode.as_str().to_string(),
        ]
        .join("|")
    }

    pub fn cached(&self, request_key: &str) -> Option<TileSeriesData> {
        self.cache.read(request_key).map(|record| record.data)
    }

    /// Effective query range, or `None` when the tile may run without one.
    ///
    /// Explicit bounds are used verbatim when both are set. Otherwise the
    /// metric's availability window fills the gaps and clamps the bound
    /// that was given.
    pub async fn resolve_range(&self, tile: &Tile) -> anyhow::Result<Option<TimeRange>> {
        let descriptor = tile.viz_type.descriptor();
        match (tile.start_time, tile.end_time) {
            (Some(start), Some(end)) => return Ok(Some((start, end))),
            (None, None) if descriptor.optional_range => return Ok(None),
            _ => {}
        }

        let metric = tile.primary_metric().ok_or(StudioError::MissingMetric)?;
        let filters = active_filters(&tile.filters);
        let availability = self
            .repository
            .availability(metric, tile.grain, &filters)
            .await?;

        let (min, max) = match (availability.min_time_start_ts, availability.max_time_start_ts) {
            (Some(a), Some(b)) if a <= b => (a, b),
            (Some(a), Some(b)) => (b, a),
            _ if descriptor.optional_range => return Ok(None),
            _ => return Err(StudioError::MissingTimeRange.into()),
        };

        let start = tile.start_time.map(|t| t.clamp(min, max)).unwrap_or(min);
        let end = tile.end_time.map(|t| t.clamp(min, max)).unwrap_or(max);
        tracing::debug!("Resolved range for metric {}: {} .. {}", metric, start, end);
        Ok(Some((start, end)))
    }

    fn query(tile: &Tile, (start_time, end_time): TimeRange) -> MetricQuery {
        MetricQuery {
            metric_keys: tile.metric_keys.clone(),
            grain: tile.grain,
            start_time,
            end_time,
            group_by: tile.group_by.clone(),
            filters: active_filters(&tile.filters),
        }
    }

    pub async fn resolve(&self, tile: &Tile) -> anyhow::Result<TileSeriesData> {
        let primary = tile.primary_metric().ok_or(StudioError::MissingMetric)?;
        let range = self.resolve_range(tile).await?;
        let label_mode = tile.visuals.label_mode;

        match tile.data_source {
            DataSource::Aggregate => {
                let range = range.ok_or(StudioError::MissingTimeRange)?;
                let groups = self.repository.aggregate(&Self::query(tile, range)).await?;
                Ok(shape_aggregate(&groups, &tile.metric_keys, &tile.group_by))
            }
            DataSource::Timeseries => {
                let range = range.ok_or(StudioError::MissingTimeRange)?;
                let series = self.repository.timeseries(&Self::query(tile, range)).await?;
                Ok(shape_timeseries(
                    &series,
                    &tile.metric_keys,
                    &tile.group_by,
                    tile.grain,
                    label_mode,
                    Some(range),
                ))
            }
            DataSource::Kpi => {
                if let Some(range) = range {
                    let series = self.repository.timeseries(&Self::query(tile, range)).await?;
                    if series.iter().any(|s| !s.points.is_empty()) {
                        return Ok(shape_timeseries(
                            &series,
                            &tile.metric_keys,
                            &tile.group_by,
                            tile.grain,
                            label_mode,
                            Some(range),
                        ));
                    }
                    tracing::debug!("No series for KPI {}, falling back to latest value", primary);
                }
                let filters = active_filters(&tile.filters);
                let latest = self.repository.latest(primary, tile.grain, &filters).await?;
                Ok(shape_latest(primary, &latest, tile.grain))
            }
        }
    }

    /// Resolve and store the result under the tile's request key.
    pub async fn fetch(&self, tile: &Tile) -> anyhow::Result<TileSeriesData> {
        let key = self.request_key(tile);
        let data = self.resolve(tile).await?;
        self.cache.write(&key, &data);
        Ok(data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TileDataStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileDataState {
    pub status: TileDataStatus,
    pub data: Option<TileSeriesData>,
    pub error: Option<String>,
    /// A fetch is running, possibly behind cached data.
    pub refreshing: bool,
    pub request_key: Option<String>,
}

impl Default for TileDataState {
    fn default() -> Self {
        Self {
            status: TileDataStatus::Idle,
            data: None,
            error: None,
            refreshing: false,
            request_key: None,
        }
    }
}

struct HandleInner {
    state: TileDataState,
    in_flight: Option<JoinHandle<()>>,
}

/// Data state of one visible tile.
///
/// Results are applied only if the tile's request key is still the one the
/// fetch was issued for; a superseded fetch is also aborted.
pub struct TileDataHandle {
    resolver: TileDataResolver,
    inner: Arc<Mutex<HandleInner>>,
    updates: watch::Sender<TileDataState>,
}

impl TileDataHandle {
    pub fn new(resolver: TileDataResolver) -> Self {
        let (updates, _) = watch::channel(TileDataState::default());
        Self {
            resolver,
            inner: Arc::new(Mutex::new(HandleInner {
                state: TileDataState::default(),
                in_flight: None,
            })),
            updates,
        }
    }

    pub fn state(&self) -> TileDataState {
        self.inner.lock().state.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TileDataState> {
        self.updates.subscribe()
    }

    /// Fetch only if the tile's request key changed since the last call.
    pub fn ensure(&self, tile: &Tile) {
        self.start(tile, false);
    }

    /// Fetch again even if the request key is unchanged.
    pub fn reload(&self, tile: &Tile) {
        self.start(tile, true);
    }

    fn start(&self, tile: &Tile, force: bool) {
        let key = self.resolver.request_key(tile);
        let mut inner = self.inner.lock();
        let key_changed = inner.state.request_key.as_deref() != Some(key.as_str());
        if !force && !key_changed {
            return;
        }

        if let Some(previous) = inner.in_flight.take() {
            previous.abort();
        }

        if key_changed {
            // Stale-while-revalidate: show whatever is cached for the new key.
            inner.state.data = self.resolver.cached(&key);
            inner.state.error = None;
            inner.state.request_key = Some(key.clone());
        }
        inner.state.status = if inner.state.data.is_some() {
            TileDataStatus::Ready
        } else {
            TileDataStatus::Loading
        };
        inner.state.refreshing = true;
        self.updates.send_replace(inner.state.clone());

        let resolver = self.resolver.clone();
        let shared = self.inner.clone();
        let updates = self.updates.clone();
        let tile = tile.clone();
        inner.in_flight = Some(tokio::spawn(async move {
            let result = resolver.fetch(&tile).await;

            let mut inner = shared.lock();
            if inner.state.request_key.as_deref() != Some(key.as_str()) {
                tracing::debug!("Discarding stale result for tile {}", tile.id);
                return;
            }
            match result {
                Ok(data) => {
                    inner.state.status = TileDataStatus::Ready;
                    inner.state.data = Some(data);
                    inner.state.error = None;
                }
                Err(e) => {
                    tracing::debug!("Tile {} failed to resolve: {:#}", tile.id, e);
                    inner.state.status = TileDataStatus::Error;
                    inner.state.error = Some(describe_error(&e, "Failed to load tile data."));
                }
            }
            inner.state.refreshing = false;
            inner.in_flight = None;
            updates.send_replace(inner.state.clone());
        }));
    }
}

impl Drop for TileDataHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.lock().in_flight.take() {
            handle.abort();
        }
    }
}
