// Dashboard state store - Local editing state, layout and draft synchronization
use crate::application::metrics_repository::MetricsRepository;
use crate::application::mutation_queue::{
    DebounceKind, DraftMutation, DraftMutationQueue, DraftState,
};
use crate::application::tile_resolver::{TileDataHandle, TileDataResolver, TileDataState};
use crate::domain::catalog::Catalog;
use crate::domain::dashboard::{Dashboard, DashboardSummary, MetadataPatch, layout_patches};
use crate::domain::error::{StudioError, describe_error};
use crate::domain::layout::{self, Breakpoint, DEFAULT_BREAKPOINT, find_breakpoint};
use crate::domain::tile::{Tile, TileLayout};
use crate::domain::viz::VizType;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "message", rename_all = "lowercase")]
pub enum LoadStatus {
    Loading,
    Ready,
    Error(String),
}

/// Everything the presentation layer renders, except per-tile data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreSnapshot {
    pub status: LoadStatus,
    pub dashboards: Vec<DashboardSummary>,
    pub active: Option<Dashboard>,
    pub breakpoint: String,
    pub selected_tile: Option<String>,
    pub edit_mode: bool,
    pub draft: DraftState,
}

struct StoreState {
    status: LoadStatus,
    dashboards: Vec<DashboardSummary>,
    active: Option<Dashboard>,
    breakpoint: Breakpoint,
    selected_tile: Option<String>,
    edit_mode: bool,
    catalog: Option<Catalog>,
    /// A load, save or discard is running.
    busy: bool,
}

/// Tile geometry reported by the grid after a drag or resize.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct GridItem {
    pub id: String,
    #[serde(flatten)]
    pub layout: TileLayout,
}

/// Owns the editing state and keeps the remote draft in step with it.
///
/// Every edit is applied locally first (and repacked for the active
/// breakpoint), then queued as a draft write. Local state stays ahead of
/// the server until commit or discard.
pub struct DashboardStore {
    metrics: Arc<dyn MetricsRepository>,
    queue: DraftMutationQueue,
    resolver: TileDataResolver,
    state: Mutex<StoreState>,
    tile_data: Mutex<HashMap<String, TileDataHandle>>,
    snapshots: watch::Sender<StoreSnapshot>,
}

impl DashboardStore {
    pub fn new(
        metrics: Arc<dyn MetricsRepository>,
        queue: DraftMutationQueue,
        resolver: TileDataResolver,
    ) -> Self {
        let state = StoreState {
            status: LoadStatus::Loading,
            dashboards: Vec::new(),
            active: None,
            breakpoint: DEFAULT_BREAKPOINT,
            selected_tile: None,
            edit_mode: false,
            catalog: None,
            busy: false,
        };
        let (snapshots, _) = watch::channel(Self::snapshot_of(&state, DraftState::default()));
        Self {
            metrics,
            queue,
            resolver,
            state: Mutex::new(state),
            tile_data: Mutex::new(HashMap::new()),
            snapshots,
        }
    }

    fn snapshot_of(state: &StoreState, draft: DraftState) -> StoreSnapshot {
        StoreSnapshot {
            status: state.status.clone(),
            dashboards: state.dashboards.clone(),
            active: state.active.clone(),
            breakpoint: state.breakpoint.name.to_string(),
            selected_tile: state.selected_tile.clone(),
            edit_mode: state.edit_mode,
            draft,
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.state.lock();
        let draft = state
            .active
            .as_ref()
            .map(|d| self.queue.state(&d.id))
            .unwrap_or_default();
        Self::snapshot_of(&state, draft)
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn queue(&self) -> &DraftMutationQueue {
        &self.queue
    }

    fn notify(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    fn active_id(&self) -> Result<String, StudioError> {
        self.state
            .lock()
            .active
            .as_ref()
            .map(|d| d.id.clone())
            .ok_or(StudioError::NoActiveDashboard)
    }

    /// Whether a full reload would race with something already running.
    pub fn is_busy(&self) -> bool {
        let state = self.state.lock();
        if state.busy {
            return true;
        }
        state
            .active
            .as_ref()
            .is_some_and(|d| self.queue.is_busy(&d.id))
    }

    fn begin(&self) {
        let mut state = self.state.lock();
        state.busy = true;
        state.status = LoadStatus::Loading;
    }

    fn end(&self, status: LoadStatus) {
        {
            let mut state = self.state.lock();
            state.busy = false;
            state.status = status;
        }
        self.notify();
    }

    pub fn catalog(&self) -> Option<Catalog> {
        self.state.lock().catalog.clone()
    }

    async fn ensure_catalog(&self) -> anyhow::Result<Catalog> {
        if let Some(catalog) = self.catalog() {
            return Ok(catalog);
        }
        let (metrics, dimensions) =
            tokio::try_join!(self.metrics.list_metrics(), self.metrics.list_dimensions())?;
        tracing::info!(
            "Loaded catalog: {} metrics, {} dimensions",
            metrics.len(),
            dimensions.len()
        );
        let catalog = Catalog { metrics, dimensions };
        self.state.lock().catalog = Some(catalog.clone());
        Ok(catalog)
    }

    /// Load the catalog and dashboard list, then open the first dashboard.
    pub async fn load(&self) -> anyhow::Result<()> {
        self.begin();
        self.notify();
        let result = async {
            self.ensure_catalog().await?;
            let dashboards = self.queue.store().list_dashboards().await?;
            let first = dashboards.first().map(|d| d.id.clone());
            self.state.lock().dashboards = dashboards;
            if let Some(id) = first {
                let dashboard = self.queue.store().get_dashboard(&id).await?;
                self.install(dashboard);
            }
            anyhow::Ok(())
        }
        .await;
        self.finish(result, "Failed to load dashboards.")
    }

    fn finish<T>(&self, result: anyhow::Result<T>, fallback: &str) -> anyhow::Result<T> {
        match result {
            Ok(value) => {
                self.end(LoadStatus::Ready);
                Ok(value)
            }
            Err(e) => {
                let message = describe_error(&e, fallback);
                tracing::error!("{}", message);
                self.end(LoadStatus::Error(message));
                Err(e)
            }
        }
    }

    pub async fn open_dashboard(&self, dashboard_id: &str) -> anyhow::Result<()> {
        self.begin();
        self.notify();
        let result = self.queue.store().get_dashboard(dashboard_id).await;
        let result = result.map(|dashboard| self.install(dashboard));
        self.finish(result, "Failed to load dashboard.")
    }

    /// Reload the active dashboard and the dashboard list from the server.
    pub async fn refresh(&self) -> anyhow::Result<()> {
        let id = self.active_id()?;
        self.begin();
        self.notify();
        let result = async {
            let dashboards = self.queue.store().list_dashboards().await?;
            let dashboard = self.queue.store().get_dashboard(&id).await?;
            self.state.lock().dashboards = dashboards;
            self.install(dashboard);
            anyhow::Ok(())
        }
        .await;
        let result = self.finish(result, "Failed to refresh dashboard.");
        if result.is_ok() {
            self.reload_tile_data();
        }
        result
    }

    /// Make `dashboard` the active one, replacing all local editing state.
    fn install(&self, mut dashboard: Dashboard) {
        let seeded = {
            let mut state = self.state.lock();
            layout::project(&mut dashboard.tiles, state.breakpoint);

            let mut seeded = None;
            if dashboard.tiles.is_empty() {
                let metric = state
                    .catalog
                    .as_ref()
                    .and_then(|c| c.metrics.first())
                    .map(|m| m.metric_key.clone());
                let mut tile = Tile::new(VizType::Line);
                tile.metric_keys.extend(metric);
                dashboard.tiles.push(tile.clone());
                layout::relayout(&mut dashboard.tiles, state.breakpoint);
                dashboard.is_draft = true;
                seeded = dashboard.tiles.first().cloned();
            }

            if let Some(summary) = state.dashboards.iter_mut().find(|d| d.id == dashboard.id) {
                summary.name = dashboard.name.clone();
                summary.description = dashboard.description.clone();
            }
            state.selected_tile = None;
            tracing::info!(
                "Opened dashboard {} ({} tiles, draft: {})",
                dashboard.id,
                dashboard.tiles.len(),
                dashboard.is_draft
            );
            let id = dashboard.id.clone();
            state.active = Some(dashboard);
            seeded.map(|tile| (id, tile))
        };
        self.tile_data.lock().clear();

        if let Some((id, tile)) = seeded {
            self.queue.enqueue(&id, DraftMutation::AddTile(tile));
        }
    }

    /// Apply `edit` to the active dashboard, repack, and queue the resulting writes.
    fn edit<T>(
        &self,
        edit: impl FnOnce(&mut Dashboard) -> Result<(T, Vec<DraftMutation>), StudioError>,
    ) -> Result<T, StudioError> {
        let (id, value, mutations, patches) = {
            let mut state = self.state.lock();
            let breakpoint = state.breakpoint;
            let dashboard = state.active.as_mut().ok_or(StudioError::NoActiveDashboard)?;
            let (value, mutations) = edit(dashboard)?;
            layout::relayout(&mut dashboard.tiles, breakpoint);
            dashboard.is_draft = true;
            let patches = layout_patches(&dashboard.tiles, breakpoint.name);
            (dashboard.id.clone(), value, mutations, patches)
        };

        for mutation in mutations {
            self.queue.enqueue(&id, mutation);
        }
        self.queue
            .schedule(&id, DebounceKind::Layout, DraftMutation::Layout(patches));
        self.notify();
        Ok(value)
    }

    pub fn add_tile(&self, viz_type: VizType) -> Result<Tile, StudioError> {
        let tile = self.edit(|dashboard| {
            let mut tile = Tile::new(viz_type);
            tile.normalize();
            dashboard.tiles.push(tile.clone());
            Ok((tile.id.clone(), Vec::new()))
        })?;
        self.finish_insert(&tile)
    }

    pub fn duplicate_tile(&self, tile_id: &str) -> Result<Tile, StudioError> {
        let tile = self.edit(|dashboard| {
            let index = dashboard
                .tile_index(tile_id)
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?;
            let copy = dashboard.tiles[index].duplicate();
            dashboard.tiles.insert(index + 1, copy.clone());
            Ok((copy.id.clone(), Vec::new()))
        })?;
        self.finish_insert(&tile)
    }

    /// Queue the create for a just-inserted tile with its packed geometry.
    ///
    /// The create goes ahead of the debounced layout write already scheduled by `edit`.
    fn finish_insert(&self, tile_id: &str) -> Result<Tile, StudioError> {
        let (id, tile) = {
            let state = self.state.lock();
            let dashboard = state.active.as_ref().ok_or(StudioError::NoActiveDashboard)?;
            let tile = dashboard
                .tile(tile_id)
                .cloned()
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?;
            (dashboard.id.clone(), tile)
        };
        self.queue.enqueue(&id, DraftMutation::AddTile(tile.clone()));
        self.state.lock().selected_tile = Some(tile.id.clone());
        self.notify();
        Ok(tile)
    }

    pub fn remove_tile(&self, tile_id: &str) -> Result<(), StudioError> {
        self.edit(|dashboard| {
            let index = dashboard
                .tile_index(tile_id)
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?;
            dashboard.tiles.remove(index);
            Ok(((), vec![DraftMutation::DeleteTile(tile_id.to_string())]))
        })?;
        {
            let mut state = self.state.lock();
            if state.selected_tile.as_deref() == Some(tile_id) {
                state.selected_tile = None;
            }
        }
        self.tile_data.lock().remove(tile_id);
        self.notify();
        Ok(())
    }

    /// Replace a tile's configuration. Identity and geometry stay with the store.
    pub fn update_tile(&self, mut tile: Tile) -> Result<Tile, StudioError> {
        let updated = self.edit(|dashboard| {
            let index = dashboard
                .tile_index(&tile.id)
                .ok_or_else(|| StudioError::TileNotFound(tile.id.clone()))?;
            let current = &dashboard.tiles[index];
            tile.layout = current.layout;
            tile.layouts = current.layouts.clone();
            tile.normalize();
            dashboard.tiles[index] = tile;
            Ok((index, Vec::new()))
        })?;

        // Enqueue with the repacked geometry.
        let (id, tile) = {
            let state = self.state.lock();
            let dashboard = state.active.as_ref().ok_or(StudioError::NoActiveDashboard)?;
            (dashboard.id.clone(), dashboard.tiles[updated].clone())
        };
        self.queue.enqueue(&id, DraftMutation::UpdateTile(tile.clone()));
        if let Some(handle) = self.tile_data.lock().get(&tile.id) {
            handle.ensure(&tile);
        }
        Ok(tile)
    }

    /// Move a tile to a new position in the packing order.
    pub fn move_tile(&self, tile_id: &str, to_index: usize) -> Result<(), StudioError> {
        self.edit(|dashboard| {
            let index = dashboard
                .tile_index(tile_id)
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?;
            let tile = dashboard.tiles.remove(index);
            let to_index = to_index.min(dashboard.tiles.len());
            dashboard.tiles.insert(to_index, tile);
            Ok(((), Vec::new()))
        })
    }

    pub fn resize_tile(&self, tile_id: &str, w: u32, h: u32) -> Result<(), StudioError> {
        self.edit(|dashboard| {
            let index = dashboard
                .tile_index(tile_id)
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?;
            let tile = &mut dashboard.tiles[index];
            tile.layout.w = w;
            tile.layout.h = h;
            Ok(((), Vec::new()))
        })
    }

    /// Accept geometry from the grid for the active breakpoint.
    ///
    /// Tiles are reordered by their reported `(y, x)` and repacked.
    pub fn apply_layout(&self, items: &[GridItem]) -> Result<(), StudioError> {
        self.edit(|dashboard| {
            let reported: HashMap<&str, TileLayout> =
                items.iter().map(|i| (i.id.as_str(), i.layout)).collect();
            for tile in dashboard.tiles.iter_mut() {
                if let Some(layout) = reported.get(tile.id.as_str()) {
                    tile.layout = *layout;
                }
            }
            dashboard
                .tiles
                .sort_by_key(|t| (t.layout.y, t.layout.x));
            Ok(((), Vec::new()))
        })
    }

    /// Switch the active breakpoint and re-project stored geometry.
    pub fn set_breakpoint(&self, name: &str) -> Result<(), StudioError> {
        let breakpoint =
            find_breakpoint(name).ok_or_else(|| StudioError::UnknownBreakpoint(name.to_string()))?;
        {
            let mut state = self.state.lock();
            if state.breakpoint == breakpoint {
                return Ok(());
            }
            state.breakpoint = breakpoint;
            if let Some(dashboard) = state.active.as_mut() {
                layout::project(&mut dashboard.tiles, breakpoint);
            }
        }
        tracing::debug!("Switched to breakpoint {} ({} cols)", breakpoint.name, breakpoint.cols);
        self.notify();
        Ok(())
    }

    /// Selection is local only and never persisted.
    pub fn select_tile(&self, tile_id: Option<&str>) -> Result<(), StudioError> {
        {
            let mut state = self.state.lock();
            if let Some(id) = tile_id {
                let exists = state.active.as_ref().is_some_and(|d| d.tile(id).is_some());
                if !exists {
                    return Err(StudioError::TileNotFound(id.to_string()));
                }
            }
            state.selected_tile = tile_id.map(str::to_string);
        }
        self.notify();
        Ok(())
    }

    pub fn set_edit_mode(&self, enabled: bool) {
        {
            let mut state = self.state.lock();
            state.edit_mode = enabled;
            if !enabled {
                state.selected_tile = None;
            }
        }
        self.notify();
    }

    /// Data for one tile, (re)fetching in the background when its request key changed.
    pub fn tile_data(&self, tile_id: &str) -> Result<TileDataState, StudioError> {
        let tile = {
            let state = self.state.lock();
            let dashboard = state.active.as_ref().ok_or(StudioError::NoActiveDashboard)?;
            dashboard
                .tile(tile_id)
                .cloned()
                .ok_or_else(|| StudioError::TileNotFound(tile_id.to_string()))?
        };
        let mut handles = self.tile_data.lock();
        let handle = handles
            .entry(tile.id.clone())
            .or_insert_with(|| TileDataHandle::new(self.resolver.clone()));
        handle.ensure(&tile);
        Ok(handle.state())
    }

    fn reload_tile_data(&self) {
        let tiles = {
            let state = self.state.lock();
            state
                .active
                .as_ref()
                .map(|d| d.tiles.clone())
                .unwrap_or_default()
        };
        let mut handles = self.tile_data.lock();
        for tile in tiles {
            handles
                .entry(tile.id.clone())
                .or_insert_with(|| TileDataHandle::new(self.resolver.clone()))
                .reload(&tile);
        }
    }

    pub async fn create_dashboard(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Dashboard> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudioError::InvalidPayload("Dashboard name is required.".into()).into());
        }
        self.begin();
        self.notify();
        let result = async {
            self.ensure_catalog().await?;
            let dashboard = self.queue.store().create_dashboard(name, description).await?;
            self.state.lock().dashboards.insert(0, dashboard.summary());
            self.install(dashboard);
            anyhow::Ok(())
        }
        .await;
        self.finish(result, "Failed to create dashboard.")?;
        let state = self.state.lock();
        state
            .active
            .clone()
            .ok_or_else(|| StudioError::NoActiveDashboard.into())
    }

    /// Rename locally now; the metadata write is debounced.
    pub fn rename_dashboard(&self, name: &str, description: Option<&str>) -> Result<(), StudioError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StudioError::InvalidPayload("Dashboard name is required.".into()));
        }
        let id = {
            let mut state = self.state.lock();
            let dashboard = state.active.as_mut().ok_or(StudioError::NoActiveDashboard)?;
            dashboard.name = name.to_string();
            dashboard.description = description.map(str::to_string);
            dashboard.is_draft = true;
            dashboard.id.clone()
        };
        self.queue.schedule(
            &id,
            DebounceKind::Metadata,
            DraftMutation::Metadata(MetadataPatch {
                name: name.to_string(),
                description: description.map(str::to_string),
            }),
        );
        self.notify();
        Ok(())
    }

    pub async fn delete_dashboard(&self, dashboard_id: &str) -> anyhow::Result<()> {
        self.begin();
        self.notify();
        let result = async {
            self.queue.close(dashboard_id).await;
            self.queue.store().delete_dashboard(dashboard_id).await?;
            tracing::info!("Deleted dashboard {}", dashboard_id);

            let next = {
                let mut state = self.state.lock();
                state.dashboards.retain(|d| d.id != dashboard_id);
                let was_active = state.active.as_ref().is_some_and(|d| d.id == dashboard_id);
                if was_active {
                    state.active = None;
                    state.selected_tile = None;
                    state.dashboards.first().map(|d| d.id.clone())
                } else {
                    None
                }
            };
            if let Some(id) = next {
                let dashboard = self.queue.store().get_dashboard(&id).await?;
                self.install(dashboard);
            }
            anyhow::Ok(())
        }
        .await;
        self.finish(result, "Failed to delete dashboard.")
    }

    /// Commit the draft. Local state is untouched unless the server confirms.
    pub async fn save(&self) -> anyhow::Result<()> {
        let id = self.active_id()?;
        self.begin();
        self.notify();
        let result = self.queue.commit(&id).await.map(|committed| {
            let mut state = self.state.lock();
            if let Some(summary) = state.dashboards.iter_mut().find(|d| d.id == id) {
                *summary = committed.summary();
            }
            if let Some(active) = state.active.as_mut().filter(|d| d.id == id) {
                active.is_draft = false;
                active.name = committed.name.clone();
                active.description = committed.description.clone();
                active.updated_at = committed.updated_at;
            }
        });
        self.finish(result, "Failed to save dashboard.")
    }

    /// Throw the draft away and reload what is published.
    pub async fn discard(&self) -> anyhow::Result<()> {
        let id = self.active_id()?;
        self.begin();
        self.notify();
        let result = self.queue.discard(&id).await.map(|dashboard| {
            if let Some(summary) = self
                .state
                .lock()
                .dashboards
                .iter_mut()
                .find(|d| d.id == id)
            {
                *summary = dashboard.summary();
            }
            self.install(dashboard);
        });
        let result = self.finish(result, "Failed to discard changes.");
        if result.is_ok() {
            self.reload_tile_data();
        }
        result
    }
}

/// Periodically reload the active dashboard, skipping ticks while anything is in flight.
pub fn spawn_auto_refresh(store: Arc<DashboardStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if store.is_busy() {
                tracing::debug!("Skipping auto-refresh; dashboard is busy");
                continue;
            }
            if store.snapshot().active.is_none() {
                continue;
            }
            if let Err(e) = store.refresh().await {
                tracing::warn!("Auto-refresh failed: {}", describe_error(&e, "refresh failed"));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::mutation_queue::{DraftStatus, LAYOUT_DEBOUNCE, METADATA_DEBOUNCE};
    use crate::application::test_support::{FakeDrafts, FakeMetrics};
    use crate::application::tile_cache::{MemoryStore, TileCache};
    use crate::application::tile_resolver::TileDataStatus;
    use crate::domain::series::LatestValue;

    fn dashboard_with(tiles: Vec<Tile>) -> Dashboard {
        Dashboard::new("d1".into(), "Sales".into(), None, tiles)
    }

    fn line(id: &str) -> Tile {
        let mut t = Tile::new(VizType::Line);
        t.id = id.to_string();
        t.metric_keys = vec!["revenue".into()];
        t
    }

    fn setup(dashboard: Dashboard) -> (Arc<FakeMetrics>, Arc<FakeDrafts>, Arc<DashboardStore>) {
        let metrics = Arc::new(FakeMetrics::new());
        let drafts = Arc::new(FakeDrafts::with_dashboard(dashboard));
        let queue = DraftMutationQueue::new(drafts.clone());
        let resolver = TileDataResolver::new(
            metrics.clone(),
            TileCache::new(Arc::new(MemoryStore::new())),
        );
        let store = Arc::new(DashboardStore::new(metrics.clone(), queue, resolver));
        (metrics, drafts, store)
    }

    async fn settle(store: &DashboardStore) {
        tokio::time::sleep(LAYOUT_DEBOUNCE + METADATA_DEBOUNCE).await;
        store.queue().drain("d1").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_seeds_first_tile_for_empty_dashboard() {
        let (_, drafts, store) = setup(dashboard_with(Vec::new()));
        store.load().await.unwrap();

        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, LoadStatus::Ready);
        let active = snapshot.active.unwrap();
        assert_eq!(active.tiles.len(), 1);
        assert_eq!(active.tiles[0].metric_keys, vec!["revenue".to_string()]);

        settle(&store).await;
        assert_eq!(drafts.count(&format!("start add {}", active.tiles[0].id)), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_tile_packs_and_enqueues() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();

        let tile = store.add_tile(VizType::Line).unwrap();
        assert_eq!(tile.layout, TileLayout::new(6, 0, 6, 4));
        let snapshot = store.snapshot();
        assert_eq!(snapshot.selected_tile.as_deref(), Some(tile.id.as_str()));
        assert!(snapshot.active.unwrap().is_draft);

        settle(&store).await;
        assert_eq!(drafts.count(&format!("start add {}", tile.id)), 1);
        assert_eq!(drafts.count("start layout"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_repacks_survivors() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a"), line("b"), line("c")]));
        store.load().await.unwrap();
        assert_eq!(store.snapshot().active.unwrap().tiles[2].layout.y, 5);

        store.select_tile(Some("a")).unwrap();
        store.remove_tile("a").unwrap();
        let snapshot = store.snapshot();
        let tiles = snapshot.active.unwrap().tiles;
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[1].layout, TileLayout::new(6, 0, 6, 4));
        assert!(snapshot.selected_tile.is_none());

        settle(&store).await;
        assert_eq!(drafts.count("start remove a"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_tile_enforces_invariants() {
        let (_, _, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();

        let mut edited = line("a");
        edited.viz_type = VizType::Kpi;
        edited.metric_keys = vec!["revenue".into(), "orders".into()];
        edited.group_by = vec!["geo".into()];
        let tile = store.update_tile(edited).unwrap();
        assert_eq!(tile.metric_keys.len(), 1);
        assert!(tile.group_by.is_empty());
        assert_eq!(tile.layout, TileLayout::new(0, 0, 6, 4));

        assert!(matches!(
            store.update_tile(line("missing")),
            Err(StudioError::TileNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_tile_ignores_body_geometry() {
        let (_, _, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        store.set_breakpoint("sm").unwrap();
        store.set_breakpoint("lg").unwrap();
        store.resize_tile("a", 8, 6).unwrap();

        let body: Tile = serde_json::from_str(
            r#"{"id":"a","vizType":"line","dataSource":"timeseries","metricKeys":["orders"],
                "layouts":{"sm":{"x":0,"y":0,"w":2,"h":2}}}"#,
        )
        .unwrap();
        let tile = store.update_tile(body).unwrap();

        assert_eq!(tile.metric_keys, vec!["orders".to_string()]);
        assert_eq!(tile.layout, TileLayout::new(0, 0, 8, 6));
        assert_eq!(tile.layouts["sm"], TileLayout::new(0, 0, 6, 4));
        assert_eq!(tile.layouts["lg"], TileLayout::new(0, 0, 8, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resize_with_huge_height_does_not_overflow() {
        let (_, _, store) = setup(dashboard_with(vec![line("a"), line("b")]));
        store.load().await.unwrap();
        store.resize_tile("a", 12, u32::MAX).unwrap();

        let tiles = store.snapshot().active.unwrap().tiles;
        assert_eq!(tiles[0].layout.h, u32::MAX);
        assert_eq!(tiles[1].layout.y, u32::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_breakpoint_switch_keeps_other_geometry() {
        let (_, _, store) = setup(dashboard_with(vec![line("a"), line("b")]));
        store.load().await.unwrap();

        store.set_breakpoint("sm").unwrap();
        let tiles = store.snapshot().active.unwrap().tiles;
        assert_eq!(tiles[1].layout, TileLayout::new(0, 5, 6, 4));

        store.set_breakpoint("lg").unwrap();
        let tiles = store.snapshot().active.unwrap().tiles;
        assert_eq!(tiles[1].layout, TileLayout::new(6, 0, 6, 4));
        assert!(matches!(store.set_breakpoint("huge"), Err(StudioError::UnknownBreakpoint(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rename_is_debounced() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();

        store.rename_dashboard("Sa", None).unwrap();
        store.rename_dashboard("Sales 2025", Some("Quarterly")).unwrap();
        assert_eq!(store.snapshot().active.unwrap().name, "Sales 2025");

        tokio::time::sleep(LAYOUT_DEBOUNCE + Duration::from_millis(10)).await;
        assert!(drafts.metadata.lock().is_empty());

        settle(&store).await;
        let sent = drafts.metadata.lock().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].name, "Sales 2025");
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_commits_and_clears_draft_flag() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        store.rename_dashboard("Renamed", None).unwrap();

        store.save().await.unwrap();
        let snapshot = store.snapshot();
        let active = snapshot.active.unwrap();
        assert!(!active.is_draft);
        assert_eq!(active.name, "Renamed");
        assert_eq!(snapshot.dashboards[0].name, "Renamed");
        assert_eq!(drafts.events().last().unwrap(), "end commit");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_save_keeps_local_state() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        store.add_tile(VizType::Kpi).unwrap();
        drafts.fail("commit");

        assert!(store.save().await.is_err());
        let snapshot = store.snapshot();
        assert_eq!(snapshot.status, LoadStatus::Error("commit rejected".into()));
        let active = snapshot.active.unwrap();
        assert!(active.is_draft);
        assert_eq!(active.tiles.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_write_keeps_optimistic_edit() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        drafts.fail("layout");

        store.remove_tile("a").unwrap();
        settle(&store).await;

        let snapshot = store.snapshot();
        assert!(snapshot.active.unwrap().tiles.is_empty());
        assert_eq!(drafts.count("end remove a"), 1);
        assert_eq!(snapshot.draft.status, DraftStatus::Error);
        assert_eq!(snapshot.draft.error.as_deref(), Some("layout rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_reloads_server_state() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        store.add_tile(VizType::Table).unwrap();
        store.rename_dashboard("Scratch", None).unwrap();

        store.discard().await.unwrap();
        let active = store.snapshot().active.unwrap();
        assert_eq!(active.tiles.len(), 1);
        assert_eq!(active.name, "Sales");
        assert_eq!(drafts.count("start metadata"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tile_data_is_resolved_per_tile() {
        let (metrics, _, store) = setup(dashboard_with(Vec::new()));
        *metrics.latest.lock() = LatestValue { value: Some(9.0), time_start_ts: None };
        store.load().await.unwrap();
        let kpi = store.add_tile(VizType::Kpi).unwrap();
        let mut configured = kpi.clone();
        configured.metric_keys = vec!["revenue".into()];
        store.update_tile(configured).unwrap();

        let state = store.tile_data(&kpi.id).unwrap();
        assert_eq!(state.status, TileDataStatus::Loading);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = store.tile_data(&kpi.id).unwrap();
        assert_eq!(state.status, TileDataStatus::Ready);
        assert_eq!(state.data.unwrap().summary.unwrap().current, 9.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_while_writes_pending() {
        let (_, _, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        assert!(!store.is_busy());
        store.resize_tile("a", 8, 5).unwrap();
        assert!(store.is_busy());
        settle(&store).await;
        assert!(!store.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_refresh_waits_for_pending_writes() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();
        store.resize_tile("a", 8, 5).unwrap();

        let task = spawn_auto_refresh(store.clone(), Duration::from_millis(100));
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(drafts.count("start get d1"), 1);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(drafts.count("start get d1") > 1);
        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_apply_layout_reorders_by_position() {
        let (_, _, store) = setup(dashboard_with(vec![line("a"), line("b")]));
        store.load().await.unwrap();
        store
            .apply_layout(&[
                GridItem { id: "a".into(), layout: TileLayout::new(0, 9, 6, 4) },
                GridItem { id: "b".into(), layout: TileLayout::new(0, 0, 6, 4) },
            ])
            .unwrap();
        let tiles = store.snapshot().active.unwrap().tiles;
        assert_eq!(tiles[0].id, "b");
        assert_eq!(tiles[1].layout, TileLayout::new(6, 0, 6, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_and_delete_dashboard() {
        let (_, drafts, store) = setup(dashboard_with(vec![line("a")]));
        store.load().await.unwrap();

        let created = store.create_dashboard("Ops", None).await.unwrap();
        assert_eq!(created.tiles.len(), 1);
        assert_eq!(store.snapshot().dashboards.len(), 2);

        store.delete_dashboard(&created.id).await.unwrap();
        let snapshot = store.snapshot();
        assert_eq!(snapshot.dashboards.len(), 1);
        assert_eq!(snapshot.active.unwrap().id, "d1");
        assert_eq!(drafts.count(&format!("start delete {}", created.id)), 1);

        assert!(store.create_dashboard("  ", None).await.is_err());
    }
}
