// Application layer - Repository seams, draft sync and tile data
pub mod dashboard_store;
pub mod draft_repository;
pub mod metrics_repository;
pub mod mutation_queue;
pub mod shaping;
pub mod tile_cache;
pub mod tile_resolver;

#[cfg(test)]
pub mod test_support;
