// Grid layout engine: minimum sizes, shelf packing and per-breakpoint geometry
use super::tile::{Tile, TileLayout};
use super::viz::min_size;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub name: &'static str,
    pub cols: u32,
}

pub const BREAKPOINTS: [Breakpoint; 5] = [
    Breakpoint { name: "lg", cols: 12 },
    Breakpoint { name: "md", cols: 10 },
    Breakpoint { name: "sm", cols: 6 },
    Breakpoint { name: "xs", cols: 4 },
    Breakpoint { name: "xxs", cols: 2 },
];

pub const DEFAULT_BREAKPOINT: Breakpoint = BREAKPOINTS[0];

pub fn find_breakpoint(name: &str) -> Option<Breakpoint> {
    BREAKPOINTS.iter().copied().find(|bp| bp.name == name)
}

/// Clamp `w` into `[min_w, cols]` and raise `h` to at least `min_h`.
///
/// When the grid is narrower than the tile's minimum width the tile takes
/// the full row instead.
pub fn apply_min_size(tile: &Tile, cols: u32) -> Tile {
    let cols = cols.max(1);
    let (min_w, min_h) = min_size(tile.viz_type, &tile.visuals);
    let min_w = min_w.min(cols);

    let mut clamped = tile.clone();
    clamped.layout.w = tile.layout.w.clamp(min_w, cols);
    clamped.layout.h = tile.layout.h.max(min_h);
    clamped
}

/// Left-to-right, top-to-bottom shelf packing.
///
/// Only the order and the `w`/`h` of the input matter; incoming `x`/`y`
/// are ignored, which makes packing idempotent.
pub fn pack(rects: &[TileLayout], cols: u32) -> Vec<TileLayout> {
    let cols = cols.max(1);
    let mut packed = Vec::with_capacity(rects.len());
    let (mut x, mut y, mut shelf_h) = (0u32, 0u32, 0u32);

    for rect in rects {
        let w = rect.w.clamp(1, cols);
        let h = rect.h.max(1);
        if x > 0 && x + w > cols {
            y = y.saturating_add(shelf_h).saturating_add(1);
            x = 0;
            shelf_h = 0;
        }
        packed.push(TileLayout::new(x, y, w, h));
        x += w;
        shelf_h = shelf_h.max(h);
    }

    packed
}

/// Re-apply minimum sizes and repack every tile for one breakpoint.
///
/// The result becomes both the tile's current geometry and its stored
/// geometry for `breakpoint`; other breakpoints are left untouched.
pub fn relayout(tiles: &mut [Tile], breakpoint: Breakpoint) {
    let sized: Vec<TileLayout> = tiles
        .iter()
        .map(|t| apply_min_size(t, breakpoint.cols).layout)
        .collect();
    let packed = pack(&sized, breakpoint.cols);

    for (tile, layout) in tiles.iter_mut().zip(packed) {
        tile.layout = layout;
        tile.layouts.insert(breakpoint.name.to_string(), layout);
    }
}

/// Swap in each tile's stored geometry for `breakpoint` and repack.
///
/// Tiles with nothing recorded for that breakpoint keep their current geometry.
pub fn project(tiles: &mut [Tile], breakpoint: Breakpoint) {
    for tile in tiles.iter_mut() {
        if let Some(stored) = tile.layouts.get(breakpoint.name) {
            tile.layout = *stored;
        }
    }
    relayout(tiles, breakpoint);
}
