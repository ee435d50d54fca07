// Repository trait for the remote dashboard/draft store
use crate::domain::dashboard::{Dashboard, DashboardSummary, LayoutPatch, MetadataPatch};
use crate::domain::tile::Tile;
use async_trait::async_trait;

#[async_trait]
pub trait DraftRepository: Send + Sync {
    async fn list_dashboards(&self) -> anyhow::Result<Vec<DashboardSummary>>;

    /// The user's draft if one exists, otherwise the published dashboard
    async fn get_dashboard(&self, dashboard_id: &str) -> anyhow::Result<Dashboard>;

    async fn create_dashboard(
        &self,
        name: &str,
        description: Option<&str>,
    ) -> anyhow::Result<Dashboard>;

    async fn delete_dashboard(&self, dashboard_id: &str) -> anyhow::Result<()>;

    async fn add_tile(&self, dashboard_id: &str, tile: &Tile) -> anyhow::Result<()>;

    async fn update_tile(&self, dashboard_id: &str, tile: &Tile) -> anyhow::Result<()>;

    async fn delete_tile(&self, dashboard_id: &str, tile_id: &str) -> anyhow::Result<()>;

    async fn update_layout(&self, dashboard_id: &str, items: &[LayoutPatch]) -> anyhow::Result<()>;

    async fn update_metadata(&self, dashboard_id: &str, patch: &MetadataPatch)
    -> anyhow::Result<()>;

    /// Publish the draft; returns the published dashboard
    async fn commit_draft(&self, dashboard_id: &str) -> anyhow::Result<Dashboard>;

    async fn delete_draft(&self, dashboard_id: &str) -> anyhow::Result<()>;
}
