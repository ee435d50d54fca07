// Dashboard service client: published dashboards and per-user drafts
use crate::application::draft_repository::DraftRepository;
use crate::domain::dashboard::{Dashboard, DashboardSummary, LayoutPatch, MetadataPatch};
use crate::domain::tile::Tile;
use crate::infrastructure::metrics_client::check_status;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const LIST_LIMIT: usize = 50;

#[derive(Debug, Clone)]
pub struct VisualsClient {
    base_url: String,
    auth_token: Option<String>,
    client_id: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct DashboardList {
    items: Vec<DashboardSummary>,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DashboardConfig {
    #[serde(default)]
    tiles: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DashboardOut {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    config: DashboardConfig,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    is_draft: bool,
}

impl DashboardOut {
    /// Tiles that fail to parse are dropped rather than failing the whole dashboard.
    fn into_dashboard(self) -> Dashboard {
        let tiles = self
            .config
            .tiles
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<Tile>(raw) {
                Ok(mut tile) => {
                    tile.normalize();
                    Some(tile)
                }
                Err(e) => {
                    tracing::warn!("Skipping malformed tile in dashboard {}: {}", self.id, e);
                    None
                }
            })
            .collect();

        let mut dashboard = Dashboard::new(self.id, self.name, self.description, tiles);
        dashboard.is_draft = self.is_draft;
        dashboard.updated_at = self.updated_at;
        dashboard
    }
}

#[derive(Debug, Serialize)]
struct DashboardCreate<'a> {
    name: &'a str,
    description: Option<&'a str>,
    config: DashboardConfig,
}

#[derive(Debug, Serialize)]
struct LayoutUpdate<'a> {
    items: &'a [LayoutPatch],
}

impl VisualsClient {
    pub fn new(
        base_url: impl Into<String>,
        auth_token: Option<String>,
        client_id: Option<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
            client_id,
            client: reqwest::Client::new(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}/v1/dashboards{}", self.base_url, path))
            .header("Accept", "application/json");
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(client_id) = &self.client_id {
            builder = builder.header("X-Client-Id", client_id);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, action: &str) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to dashboard service", action))?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder, action: &str) -> Result<T> {
        self.send(builder, action)
            .await?
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse {} response", action))
    }

    fn dashboard_path(dashboard_id: &str, suffix: &str) -> String {
        format!("/{}{}", urlencoding::encode(dashboard_id), suffix)
    }
}

#[async_trait]
impl DraftRepository for VisualsClient {
    async fn list_dashboards(&self) -> Result<Vec<DashboardSummary>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut params = vec![("limit", LIST_LIMIT.to_string())];
            if let Some(cursor) = &cursor {
                params.push(("cursor", cursor.clone()));
            }
            let page: DashboardList = self
                .send_json(self.request(Method::GET, "").query(&params), "list dashboards")
                .await?;
            items.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!("Listed {} dashboards", items.len());
        Ok(items)
    }

    async fn get_dashboard(&self, dashboard_id: &str) -> Result<Dashboard> {
        let path = Self::dashboard_path(dashboard_id, "");
        let out: DashboardOut = self
            .send_json(self.request(Method::GET, &path), "get dashboard")
            .await?;
        Ok(out.into_dashboard())
    }

    async fn create_dashboard(&self, name: &str, description: Option<&str>) -> Result<Dashboard> {
        let body = DashboardCreate {
            name,
            description,
            config: DashboardConfig::default(),
        };
        let out: DashboardOut = self
            .send_json(self.request(Method::POST, "").json(&body), "create dashboard")
            .await?;
        tracing::info!("Created dashboard {} ({})", out.id, out.name);
        Ok(out.into_dashboard())
    }

    async fn delete_dashboard(&self, dashboard_id: &str) -> Result<()> {
        let path = Self::dashboard_path(dashboard_id, "");
        self.send(self.request(Method::DELETE, &path), "delete dashboard")
            .await?;
        Ok(())
    }

    async fn add_tile(&self, dashboard_id: &str, tile: &Tile) -> Result<()> {
        let path = Self::dashboard_path(dashboard_id, "/draft/tiles");
        self.send(self.request(Method::POST, &path).json(tile), "add tile")
            .await?;
        Ok(())
    }

    async fn update_tile(&self, dashboard_id: &str, tile: &Tile) -> Result<()> {
        let path = Self::dashboard_path(
            dashboard_id,
            &format!("/draft/tiles/{}", urlencoding::encode(&tile.id)),
        );
        self.send(self.request(Method::PUT, &path).json(tile), "update tile")
            .await?;
        Ok(())
    }

    async fn delete_tile(&self, dashboard_id: &str, tile_id: &str) -> Result<()> {
        let path = Self::dashboard_path(
            dashboard_id,
            &format!("/draft/tiles/{}", urlencoding::encode(tile_id)),
        );
        self.send(self.request(Method::DELETE, &path), "delete tile")
            .await?;
        Ok(())
    }

    async fn update_layout(&self, dashboard_id: &str, items: &[LayoutPatch]) -> Result<()> {
        let path = Self::dashboard_path(dashboard_id, "/draft/layout");
        self.send(
            self.request(Method::PUT, &path).json(&LayoutUpdate { items }),
            "update layout",
        )
        .await?;
        Ok(())
    }

    async fn update_metadata(&self, dashboard_id: &str, patch: &MetadataPatch) -> Result<()> {
        let path = Self::dashboard_path(dashboard_id, "/draft/metadata");
        self.send(self.request(Method::PATCH, &path).json(patch), "update metadata")
            .await?;
        Ok(())
    }

    async fn commit_draft(&self, dashboard_id: &str) -> Result<Dashboard> {
        let path = Self::dashboard_path(dashboard_id, "/draft/commit");
        let out: DashboardOut = self
            .send_json(self.request(Method::POST, &path), "commit draft")
            .await?;
        Ok(out.into_dashboard())
    }

    async fn delete_draft(&self, dashboard_id: &str) -> Result<()> {
        let path = Self::dashboard_path(dashboard_id, "/draft");
        self.send(self.request(Method::DELETE, &path), "delete draft")
            .await?;
        Ok(())
    }
}
