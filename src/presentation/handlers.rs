// HTTP request handlers
use crate::application::dashboard_store::{GridItem, StoreSnapshot};
use crate::application::mutation_queue::DraftState;
use crate::application::tile_resolver::TileDataState;
use crate::domain::catalog::Catalog;
use crate::domain::dashboard::Dashboard;
use crate::domain::error::StudioError;
use crate::domain::tile::Tile;
use crate::domain::viz::VizType;
use crate::infrastructure::http_response::ApiResult;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct CreateDashboardRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTileRequest {
    pub viz_type: VizType,
}

#[derive(Debug, Deserialize)]
pub struct MoveTileRequest {
    pub index: usize,
}

#[derive(Debug, Deserialize)]
pub struct ResizeTileRequest {
    pub w: u32,
    pub h: u32,
}

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    pub items: Vec<GridItem>,
}

#[derive(Debug, Deserialize)]
pub struct BreakpointRequest {
    pub breakpoint: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRequest {
    #[serde(default)]
    pub tile_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EditModeRequest {
    pub enabled: bool,
}

type Shared = State<Arc<AppState>>;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

pub async fn get_state(State(state): Shared) -> Json<StoreSnapshot> {
    Json(state.store.snapshot())
}

pub async fn get_catalog(State(state): Shared) -> Json<Catalog> {
    Json(state.store.catalog().unwrap_or_default())
}

pub async fn create_dashboard(
    State(state): Shared,
    Json(request): Json<CreateDashboardRequest>,
) -> ApiResult<(StatusCode, Json<Dashboard>)> {
    let dashboard = state
        .store
        .create_dashboard(&request.name, request.description.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(dashboard)))
}

pub async fn open_dashboard(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.open_dashboard(&id).await?;
    Ok(Json(state.store.snapshot()))
}

pub async fn delete_dashboard(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.store.delete_dashboard(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn rename_dashboard(
    State(state): Shared,
    Json(request): Json<CreateDashboardRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state
        .store
        .rename_dashboard(&request.name, request.description.as_deref())?;
    Ok(Json(state.store.snapshot()))
}

pub async fn save_dashboard(State(state): Shared) -> ApiResult<Json<StoreSnapshot>> {
    state.store.save().await?;
    Ok(Json(state.store.snapshot()))
}

pub async fn discard_dashboard(State(state): Shared) -> ApiResult<Json<StoreSnapshot>> {
    state.store.discard().await?;
    Ok(Json(state.store.snapshot()))
}

pub async fn refresh_dashboard(State(state): Shared) -> ApiResult<Json<StoreSnapshot>> {
    state.store.refresh().await?;
    Ok(Json(state.store.snapshot()))
}

pub async fn add_tile(
    State(state): Shared,
    Json(request): Json<AddTileRequest>,
) -> ApiResult<(StatusCode, Json<Tile>)> {
    let tile = state.store.add_tile(request.viz_type)?;
    Ok((StatusCode::CREATED, Json(tile)))
}

/// The path id wins over any id in the body.
pub async fn update_tile(
    State(state): Shared,
    Path(id): Path<String>,
    Json(mut tile): Json<Tile>,
) -> ApiResult<Json<Tile>> {
    tile.id = id;
    Ok(Json(state.store.update_tile(tile)?))
}

pub async fn duplicate_tile(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Tile>)> {
    let tile = state.store.duplicate_tile(&id)?;
    Ok((StatusCode::CREATED, Json(tile)))
}

pub async fn remove_tile(State(state): Shared, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.store.remove_tile(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn move_tile(
    State(state): Shared,
    Path(id): Path<String>,
    Json(request): Json<MoveTileRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.move_tile(&id, request.index)?;
    Ok(Json(state.store.snapshot()))
}

pub async fn resize_tile(
    State(state): Shared,
    Path(id): Path<String>,
    Json(request): Json<ResizeTileRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.resize_tile(&id, request.w, request.h)?;
    Ok(Json(state.store.snapshot()))
}

pub async fn tile_data(
    State(state): Shared,
    Path(id): Path<String>,
) -> ApiResult<Json<TileDataState>> {
    Ok(Json(state.store.tile_data(&id)?))
}

pub async fn apply_layout(
    State(state): Shared,
    Json(request): Json<LayoutRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.apply_layout(&request.items)?;
    Ok(Json(state.store.snapshot()))
}

pub async fn set_breakpoint(
    State(state): Shared,
    Json(request): Json<BreakpointRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.set_breakpoint(&request.breakpoint)?;
    Ok(Json(state.store.snapshot()))
}

pub async fn select_tile(
    State(state): Shared,
    Json(request): Json<SelectionRequest>,
) -> ApiResult<Json<StoreSnapshot>> {
    state.store.select_tile(request.tile_id.as_deref())?;
    Ok(Json(state.store.snapshot()))
}

pub async fn set_edit_mode(
    State(state): Shared,
    Json(request): Json<EditModeRequest>,
) -> Json<StoreSnapshot> {
    state.store.set_edit_mode(request.enabled);
    Json(state.store.snapshot())
}

pub async fn draft_status(State(state): Shared) -> ApiResult<Json<DraftState>> {
    let snapshot = state.store.snapshot();
    let active = snapshot.active.ok_or(StudioError::NoActiveDashboard)?;
    Ok(Json(state.store.queue().state(&active.id)))
}
