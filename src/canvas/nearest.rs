//! Coordinates of nearest data points to show inside the tooltip.
//!
//! Intentionally tiny: the nearest point is requested again every time the
//! cursor stops anyway.

use crate::canvas::tile_cache::LruCache;
use crate::canvas::tile_set::round_px;
use crate::net::message::{DataValue, PtMsg};
use crate::types::ItemId;

#[derive(Clone, Debug, PartialEq)]
pub struct NearestPoint {
    pub data_x: DataValue,
    pub data_y: DataValue,
    pub screen_x: f64,
    pub screen_y: f64,
}

/// Everything the answer depends on: the nearest point changes with what is
/// visible, so the whole canvas state is part of the key.
type PtKey = (u64, i32, i64, i64, i64, i64, ItemId);

pub struct NearestPoints {
    cache: LruCache<PtKey, NearestPoint>,
}

impl NearestPoints {
    pub fn new(capacity: usize) -> Self {
        Self { cache: LruCache::new(capacity, |_, _| true) }
    }

    pub fn insert(&mut self, msg: &PtMsg) {
        let key = (
            msg.config.config_id,
            msg.config.zoom_level,
            msg.config.x_offset,
            msg.config.y_offset,
            round_px(msg.mouse_x) as i64,
            round_px(msg.mouse_y) as i64,
            msg.item_id,
        );
        self.cache.insert(key, NearestPoint {
            data_x: msg.data_x.clone(),
            data_y: msg.data_y.clone(),
            screen_x: msg.screen_x,
            screen_y: msg.screen_y,
        });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn get(
        &self,
        config_id: u64,
        zoom_level: i32,
        x_offset: f64,
        y_offset: f64,
        mouse_x: f64,
        mouse_y: f64,
        item_id: ItemId,
    ) -> Option<&NearestPoint> {
        let key = (
            config_id,
            zoom_level,
            round_px(x_offset) as i64,
            round_px(y_offset) as i64,
            round_px(mouse_x) as i64,
            round_px(mouse_y) as i64,
            item_id,
        );
        self.cache.get(&key)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
