use serde::{Deserialize, Serialize};

/// Identifier of a plotted data item, as used in hit-test buffers.
pub type ItemId = u32;

/// Result of resolving a screen pixel against the hit-test data.
///
/// `NoItem` is authoritative (the pixel is empty); `Unknown` means the
/// covering base tile has not arrived yet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HighlightLookup {
    Item(ItemId),
    NoItem,
    Unknown,
}

impl HighlightLookup {
    pub fn item(self) -> Option<ItemId> {
        match self {
            HighlightLookup::Item(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_unknown(self) -> bool {
        self == HighlightLookup::Unknown
    }
}

/// What caused the current highlight: hovering the canvas or hovering an
/// entry of the search result list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HighlightTrigger {
    Canvas,
    Search,
}

/// Tile coordinate (row, col) in the tile grid of the current config.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub row: i32,
    pub col: i32,
}

impl TileCoord {
    pub fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

/// One `(t, x, y)` cursor sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseSample {
    pub t: f64,
    pub x: f64,
    pub y: f64,
}

/// A predicted or actual cursor position together with the item under it.
///
/// `pos` is `None` for waypoints that come from the search list, which have
/// no meaningful canvas coordinate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Waypoint {
    pub pos: Option<(f64, f64)>,
    pub item_id: Option<ItemId>,
}

impl Waypoint {
    pub fn at(x: f64, y: f64, item_id: Option<ItemId>) -> Self {
        Self { pos: Some((x, y)), item_id }
    }

    pub fn item_only(item_id: ItemId) -> Self {
        Self { pos: None, item_id: Some(item_id) }
    }
}

/// Axis-aligned rectangle in screen pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// Rectangle spanned by two corners, in any order.
    pub fn from_corners(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            left: x0.min(x1),
            top: y0.min(y1),
            width: (x0 - x1).abs(),
            height: (y0 - y1).abs(),
        }
    }
}

pub fn sqr(x: f64) -> f64 { x * x }
