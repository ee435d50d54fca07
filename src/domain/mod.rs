// Domain layer - Pure types and the layout engine
pub mod catalog;
pub mod dashboard;
pub mod error;
pub mod layout;
pub mod series;
pub mod tile;
pub mod viz;
