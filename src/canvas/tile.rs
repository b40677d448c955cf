//! A single tile received from the backend.
//!
//! Base tiles carry a hit-test buffer (one item id per pixel); highlight
//! tiles carry the label and style of the item they highlight instead.

use std::fmt;
use serde::Serialize;
use crate::error::{EngineError, Result};
use crate::net::message::TileMsg;
use crate::types::ItemId;

/// Identity of a tile.
///
/// The selection-map version is deliberately not part of the key: a stale
/// tile stays usable while a fresher one for the same spot is in flight.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TileKey {
    pub config_id: u64,
    pub zoom_level: i32,
    pub row: i32,
    pub col: i32,
    pub item_id: Option<ItemId>,
}

impl TileKey {
    pub fn is_highlight(&self) -> bool {
        self.item_id.is_some()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}:{}", self.config_id, self.zoom_level, self.row, self.col)?;
        if let Some(id) = self.item_id {
            write!(f, ":{id}")?;
        }
        Ok(())
    }
}

/// Per-pixel item ids of a base tile, row-major, `-1` = nothing there.
#[derive(Clone, Debug)]
pub struct HitMap {
    size: u32,
    ids: Vec<i32>,
}

impl HitMap {
    /// Decode a little-endian `i32` buffer of `size * size` entries.
    pub fn from_le_bytes(bytes: &[u8], size: u32) -> Option<Self> {
        let n = (size as usize) * (size as usize);
        if bytes.len() != n * 4 { return None; }
        let ids = bytes
            .chunks_exact(4)
            .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Some(Self { size, ids })
    }

    pub fn from_ids(size: u32, ids: Vec<i32>) -> Self {
        assert_eq!(ids.len(), (size as usize) * (size as usize), "hit map size mismatch");
        Self { size, ids }
    }

    /// Item at pixel offset (`x`, `y`) inside the tile.
    pub fn item_at(&self, x: u32, y: u32) -> Option<ItemId> {
        if x >= self.size || y >= self.size { return None; }
        let v = self.ids[(y * self.size + x) as usize];
        if v < 0 { None } else { Some(v as ItemId) }
    }
}

pub struct Tile {
    key: TileKey,
    /// Selection-map version this tile was rendered with (always even).
    pub sm_version: u32,
    /// Encoded raster (PNG), handed to the painter untouched.
    pub raster: Vec<u8>,
    pub hitmap: Option<HitMap>,
    pub label: Option<String>,
    pub style: Option<String>,
}

impl Tile {
    pub fn new(key: TileKey, sm_version: u32, raster: Vec<u8>, hitmap: Option<HitMap>) -> Self {
        Self { key, sm_version, raster, hitmap, label: None, style: None }
    }

    /// Build a tile from a `tile` message and its binary attachments.
    pub fn from_message(msg: &TileMsg, mut attachments: Vec<Vec<u8>>, tile_size: u32) -> Result<Self> {
        let key = TileKey {
            config_id: msg.config_id,
            zoom_level: msg.zoom_level,
            row: msg.row,
            col: msg.col,
            item_id: msg.item_id,
        };
        if attachments.is_empty() {
            return Err(EngineError::MissingAttachment { key: key.to_string(), index: 0 });
        }

        let hitmap = if key.is_highlight() {
            None
        } else {
            let Some(buf) = attachments.get(1) else {
                return Err(EngineError::MissingAttachment { key: key.to_string(), index: 1 });
            };
            let expected = (tile_size as usize) * (tile_size as usize) * 4;
            let map = HitMap::from_le_bytes(buf, tile_size).ok_or(EngineError::BadHitMap {
                key: key.to_string(),
                got: buf.len(),
                expected,
            })?;
            Some(map)
        };

        let raster = attachments.swap_remove(0);
        Ok(Self {
            key,
            sm_version: msg.sm_version,
            raster,
            hitmap,
            label: msg.label.clone(),
            style: msg.style.clone(),
        })
    }

    pub fn key(&self) -> &TileKey {
        &self.key
    }

    pub fn is_highlight(&self) -> bool {
        self.key.is_highlight()
    }

    /// Colour part of the `color:marker_size:line_width` style string.
    pub fn color(&self) -> Option<&str> {
        self.style.as_deref().and_then(|s| s.split(':').next())
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key.to_string())
            .field("sm_version", &self.sm_version)
            .field("raster_bytes", &self.raster.len())
            .field("has_hitmap", &self.hitmap.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(item_id: Option<ItemId>) -> TileMsg {
        TileMsg {
            config_id: 3,
            zoom_level: -1,
            row: 2,
            col: -4,
            item_id,
            label: item_id.map(|_| "series A".to_string()),
            style: item_id.map(|_| "ff0000:4:2".to_string()),
            sm_version: 6,
            seqs: "1".to_string(),
        }
    }

    #[test]
    fn test_key_display() {
        let base = Tile::from_message(&msg(None), vec![vec![1], vec![0xff; 16]], 2).unwrap();
        assert_eq!(base.key().to_string(), "3:-1:2:-4");
        let hl = Tile::from_message(&msg(Some(9)), vec![vec![1]], 2).unwrap();
        assert_eq!(hl.key().to_string(), "3:-1:2:-4:9");
        assert_eq!(hl.color(), Some("ff0000"));
    }

    #[test]
    fn test_hitmap_decoding() {
        let mut bytes = Vec::new();
        for v in [-1i32, 7, 0, -1] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        let map = HitMap::from_le_bytes(&bytes, 2).unwrap();
        assert_eq!(map.item_at(0, 0), None);
        assert_eq!(map.item_at(1, 0), Some(7));
        assert_eq!(map.item_at(0, 1), Some(0));
        assert_eq!(map.item_at(2, 0), None, "out of range must not panic");
    }

    #[test]
    fn test_base_tile_requires_hitmap() {
        let err = Tile::from_message(&msg(None), vec![vec![1]], 2);
        assert!(matches!(err, Err(EngineError::MissingAttachment { index: 1, .. })));

        let err = Tile::from_message(&msg(None), vec![vec![1], vec![0; 3]], 2);
        assert!(matches!(err, Err(EngineError::BadHitMap { expected: 16, .. })));
    }

    #[test]
    fn test_missing_raster() {
        let err = Tile::from_message(&msg(Some(1)), Vec::new(), 2);
        assert!(matches!(err, Err(EngineError::MissingAttachment { index: 0, .. })));
    }
}
