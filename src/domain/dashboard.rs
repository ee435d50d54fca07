// Dashboard domain model
use super::tile::{Tile, TileLayout};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_draft: bool,
    pub tiles: Vec<Tile>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Dashboard {
    pub fn new(id: String, name: String, description: Option<String>, tiles: Vec<Tile>) -> Self {
        Self {
            id,
            name,
            description,
            is_draft: false,
            tiles,
            updated_at: None,
        }
    }

    pub fn tile(&self, tile_id: &str) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.id == tile_id)
    }

    pub fn tile_index(&self, tile_id: &str) -> Option<usize> {
        self.tiles.iter().position(|t| t.id == tile_id)
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One tile's geometry for one breakpoint, as written to the draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutPatch {
    pub id: String,
    pub layout: TileLayout,
    pub breakpoint: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    pub name: String,
    pub description: Option<String>,
}

/// Layout patches for every tile at the given breakpoint.
pub fn layout_patches(tiles: &[Tile], breakpoint: &str) -> Vec<LayoutPatch> {
    tiles
        .iter()
        .map(|t| LayoutPatch {
            id: t.id.clone(),
            layout: t.layouts.get(breakpoint).copied().unwrap_or(t.layout),
            breakpoint: breakpoint.to_string(),
        })
        .collect()
}
