// Draft mutation queue - Ordered, debounced writes to the remote draft store
use crate::application::draft_repository::DraftRepository;
use crate::domain::dashboard::{Dashboard, LayoutPatch, MetadataPatch};
use crate::domain::error::describe_error;
use crate::domain::tile::Tile;
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

pub const LAYOUT_DEBOUNCE: Duration = Duration::from_millis(350);
pub const METADATA_DEBOUNCE: Duration = Duration::from_millis(400);

#[derive(Debug, Clone, PartialEq)]
pub enum DraftMutation {
    AddTile(Tile),
    UpdateTile(Tile),
    DeleteTile(String),
    Layout(Vec<LayoutPatch>),
    Metadata(MetadataPatch),
}

impl DraftMutation {
    fn describe(&self) -> String {
        match self {
            DraftMutation::AddTile(tile) => format!("add tile {}", tile.id),
            DraftMutation::UpdateTile(tile) => format!("update tile {}", tile.id),
            DraftMutation::DeleteTile(id) => format!("delete tile {}", id),
            DraftMutation::Layout(items) => format!("layout ({} tiles)", items.len()),
            DraftMutation::Metadata(_) => "metadata".to_string(),
        }
    }

    async fn apply(self, store: &dyn DraftRepository, dashboard_id: &str) -> anyhow::Result<()> {
        match self {
            DraftMutation::AddTile(tile) => store.add_tile(dashboard_id, &tile).await,
            DraftMutation::UpdateTile(tile) => store.update_tile(dashboard_id, &tile).await,
            DraftMutation::DeleteTile(id) => store.delete_tile(dashboard_id, &id).await,
            DraftMutation::Layout(items) => store.update_layout(dashboard_id, &items).await,
            DraftMutation::Metadata(patch) => store.update_metadata(dashboard_id, &patch).await,
        }
    }
}

/// Debounced mutation kinds. Each has a single pending slot per dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebounceKind {
    Layout,
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    #[default]
    Idle,
    Saving,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct DraftState {
    pub status: DraftStatus,
    pub error: Option<String>,
    pub in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DraftStatusEvent {
    pub dashboard_id: String,
    pub state: DraftState,
}

type Job = BoxFuture<'static, ()>;

/// Resolves once the queued mutation has settled.
pub struct MutationTicket(oneshot::Receiver<Result<(), String>>);

impl MutationTicket {
    pub async fn settled(self) -> Result<(), String> {
        self.0
            .await
            .unwrap_or_else(|_| Err("Draft queue stopped.".to_string()))
    }
}

struct PendingWrite {
    mutation: DraftMutation,
    generation: u64,
    timer: JoinHandle<()>,
}

#[derive(Default)]
struct QueueInner {
    lanes: HashMap<String, mpsc::UnboundedSender<Job>>,
    drafts: HashMap<String, DraftState>,
    pending: HashMap<(String, DebounceKind), PendingWrite>,
    next_generation: u64,
}

/// Per-dashboard FIFO of draft writes.
///
/// Each dashboard gets one worker task; a mutation starts only after the
/// previous one for the same dashboard has settled, whatever the outcome.
/// Local state is never rolled back on failure.
#[derive(Clone)]
pub struct DraftMutationQueue {
    store: Arc<dyn DraftRepository>,
    inner: Arc<Mutex<QueueInner>>,
    events: broadcast::Sender<DraftStatusEvent>,
    layout_delay: Duration,
    metadata_delay: Duration,
}

impl DraftMutationQueue {
    pub fn new(store: Arc<dyn DraftRepository>) -> Self {
        Self::with_delays(store, LAYOUT_DEBOUNCE, METADATA_DEBOUNCE)
    }

    pub fn with_delays(
        store: Arc<dyn DraftRepository>,
        layout_delay: Duration,
        metadata_delay: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            store,
            inner: Arc::new(Mutex::new(QueueInner::default())),
            events,
            layout_delay,
            metadata_delay,
        }
    }

    pub fn store(&self) -> &Arc<dyn DraftRepository> {
        &self.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DraftStatusEvent> {
        self.events.subscribe()
    }

    pub fn state(&self, dashboard_id: &str) -> DraftState {
        self.inner
            .lock()
            .drafts
            .get(dashboard_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Whether anything for the dashboard is queued, running or waiting on a timer.
    pub fn is_busy(&self, dashboard_id: &str) -> bool {
        let inner = self.inner.lock();
        let in_flight = inner
            .drafts
            .get(dashboard_id)
            .is_some_and(|d| d.in_flight > 0);
        in_flight || inner.pending.keys().any(|(id, _)| id == dashboard_id)
    }

    fn publish(&self, dashboard_id: &str, state: DraftState) {
        // No subscribers is fine.
        let _ = self.events.send(DraftStatusEvent {
            dashboard_id: dashboard_id.to_string(),
            state,
        });
    }

    fn lane(inner: &mut QueueInner, dashboard_id: &str) -> mpsc::UnboundedSender<Job> {
        inner
            .lanes
            .entry(dashboard_id.to_string())
            .or_insert_with(|| {
                let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
                tokio::spawn(async move {
                    while let Some(job) = rx.recv().await {
                        job.await;
                    }
                });
                tx
            })
            .clone()
    }

    /// Queue a write behind everything already queued for the dashboard.
    pub fn enqueue(&self, dashboard_id: &str, mutation: DraftMutation) -> MutationTicket {
        let (done_tx, done_rx) = oneshot::channel();
        let label = mutation.describe();
        let queue = self.clone();
        let id = dashboard_id.to_string();

        let job = async move {
            tracing::debug!("Writing draft {}: {}", id, label);
            let result = mutation.apply(queue.store.as_ref(), &id).await;
            let outcome = result.map_err(|e| {
                let message = describe_error(&e, "Failed to save draft changes.");
                tracing::warn!("Draft write failed for {} ({}): {}", id, label, message);
                message
            });
            queue.settle(&id, outcome.as_ref().err().cloned());
            let _ = done_tx.send(outcome);
        }
        .boxed();

        let state = {
            let mut inner = self.inner.lock();
            let draft = inner.drafts.entry(dashboard_id.to_string()).or_default();
            draft.in_flight += 1;
            draft.status = DraftStatus::Saving;
            draft.error = None;
            let state = draft.clone();
            if Self::lane(&mut inner, dashboard_id).send(job).is_err() {
                tracing::error!("Draft lane for {} is closed", dashboard_id);
            }
            state
        };
        self.publish(dashboard_id, state);
        MutationTicket(done_rx)
    }

    fn settle(&self, dashboard_id: &str, error: Option<String>) {
        let state = {
            let mut inner = self.inner.lock();
            let draft = inner.drafts.entry(dashboard_id.to_string()).or_default();
            draft.in_flight = draft.in_flight.saturating_sub(1);
            if error.is_some() {
                draft.error = error;
            }
            if draft.in_flight == 0 {
                draft.status = if draft.error.is_some() {
                    DraftStatus::Error
                } else {
                    DraftStatus::Idle
                };
            }
            draft.clone()
        };
        self.publish(dashboard_id, state);
    }

    /// Wait until everything queued so far for the dashboard has settled.
    pub async fn drain(&self, dashboard_id: &str) {
        let (tx, rx) = oneshot::channel::<()>();
        let barrier = async move {
            let _ = tx.send(());
        }
        .boxed();
        {
            let mut inner = self.inner.lock();
            if Self::lane(&mut inner, dashboard_id).send(barrier).is_err() {
                return;
            }
        }
        let _ = rx.await;
    }

    /// Replace the pending write of `kind` and restart its timer.
    ///
    /// When the timer fires, exactly one write carrying the latest payload is queued.
    pub fn schedule(&self, dashboard_id: &str, kind: DebounceKind, mutation: DraftMutation) {
        let delay = match kind {
            DebounceKind::Layout => self.layout_delay,
            DebounceKind::Metadata => self.metadata_delay,
        };
        let mut inner = self.inner.lock();
        inner.next_generation += 1;
        let generation = inner.next_generation;
        let slot = (dashboard_id.to_string(), kind);
        if let Some(previous) = inner.pending.remove(&slot) {
            previous.timer.abort();
        }

        let queue = self.clone();
        let timer_slot = slot.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.fire(timer_slot, generation);
        });
        inner.pending.insert(
            slot,
            PendingWrite {
                mutation,
                generation,
                timer,
            },
        );
    }

    fn fire(&self, slot: (String, DebounceKind), generation: u64) {
        let mutation = {
            let mut inner = self.inner.lock();
            let current = inner
                .pending
                .get(&slot)
                .is_some_and(|p| p.generation == generation);
            if current {
                inner.pending.remove(&slot).map(|p| p.mutation)
            } else {
                None
            }
        };
        if let Some(mutation) = mutation {
            self.enqueue(&slot.0, mutation);
        }
    }

    fn take_pending(&self, dashboard_id: &str) -> Vec<PendingWrite> {
        let mut inner = self.inner.lock();
        let slots: Vec<(String, DebounceKind)> = inner
            .pending
            .keys()
            .filter(|(id, _)| id == dashboard_id)
            .cloned()
            .collect();
        let mut taken: Vec<PendingWrite> = slots
            .iter()
            .filter_map(|slot| inner.pending.remove(slot))
            .collect();
        taken.sort_by_key(|p| p.generation);
        for pending in &taken {
            pending.timer.abort();
        }
        taken
    }

    /// Queue pending debounced writes now instead of waiting for their timers.
    pub fn flush_pending(&self, dashboard_id: &str) {
        for pending in self.take_pending(dashboard_id) {
            self.enqueue(dashboard_id, pending.mutation);
        }
    }

    /// Drop pending debounced writes without sending them.
    pub fn cancel_pending(&self, dashboard_id: &str) {
        let dropped = self.take_pending(dashboard_id);
        if !dropped.is_empty() {
            tracing::debug!("Dropped {} pending draft writes for {}", dropped.len(), dashboard_id);
        }
    }

    /// Flush, drain, then publish the draft.
    pub async fn commit(&self, dashboard_id: &str) -> anyhow::Result<Dashboard> {
        self.flush_pending(dashboard_id);
        self.drain(dashboard_id).await;
        let dashboard = self.store.commit_draft(dashboard_id).await?;
        tracing::info!("Committed draft for dashboard {}", dashboard_id);
        Ok(dashboard)
    }

    /// Cancel pending writes, let in-flight ones finish, delete the draft and reload.
    pub async fn discard(&self, dashboard_id: &str) -> anyhow::Result<Dashboard> {
        self.cancel_pending(dashboard_id);
        self.drain(dashboard_id).await;
        self.store.delete_draft(dashboard_id).await?;
        tracing::info!("Discarded draft for dashboard {}", dashboard_id);
        self.store.get_dashboard(dashboard_id).await
    }

    /// Forget a dashboard's lane and state once it has been deleted.
    pub async fn close(&self, dashboard_id: &str) {
        self.cancel_pending(dashboard_id);
        self.drain(dashboard_id).await;
        let mut inner = self.inner.lock();
        inner.lanes.remove(dashboard_id);
        inner.drafts.remove(dashboard_id);
    }
}
