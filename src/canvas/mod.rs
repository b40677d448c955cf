pub mod axis;
pub mod nearest;
pub mod tile;
pub mod tile_cache;
pub mod tile_set;
