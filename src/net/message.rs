//! Messages exchanged with the backend.
//!
//! Both directions are closed enums tagged by the `msg` field, so every
//! message kind has exactly one handler and an unknown kind is a parse
//! error rather than a silently ignored object.

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::{ItemId, TileCoord};

// ── Shared ───────────────────────────────────────────────────────────────────

/// Snapshot of the canvas configuration, sent with every request and echoed
/// back in answers that depend on it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub config_id: u64,
    pub w: u32,
    pub h: u32,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    #[serde(default)]
    pub zoom_level: i32,
    #[serde(default)]
    pub x_offset: i64,
    #[serde(default)]
    pub y_offset: i64,
}

/// Axis tick lists: `(coord in pixels, label)` per axis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    #[serde(default)]
    pub x: Vec<(f64, String)>,
    #[serde(default)]
    pub y: Vec<(f64, String)>,
}

/// `"row:col:seq"`, the coordinate encoding used inside `tile_req`.
pub fn coord_seq(coord: TileCoord, seq: u64) -> String {
    format!("{}:{}:{}", coord.row, coord.col, seq)
}

// ── Outgoing ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum Request {
    CanvasConfigReq(ConfigRequest),
    TileReq(TileRequest),
    AxisReq {
        config: CanvasConfig,
        axis_seq: u64,
    },
    PtReq {
        config: CanvasConfig,
        mouse_x: i64,
        mouse_y: i64,
        item_id: ItemId,
    },
    Search {
        #[serde(skip_serializing_if = "Option::is_none")]
        version: Option<u32>,
        pat: String,
        regex: bool,
    },
    UpdateSelection(SelectionUpdate),
    CellFini,
}

impl Request {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::CanvasConfigReq(_) => "canvas_config_req",
            Request::TileReq(_) => "tile_req",
            Request::AxisReq { .. } => "axis_req",
            Request::PtReq { .. } => "pt_req",
            Request::Search { .. } => "search",
            Request::UpdateSelection(_) => "update_selection",
            Request::CellFini => "cell_fini",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigHow {
    Reset,
    Resize,
    Zoom,
}

/// Zoom rectangle corners in data-relative pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ZoomRect {
    pub px0: f64,
    pub py0: f64,
    pub px1: f64,
    pub py1: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConfigRequest {
    pub config_id: u64,
    pub w: u32,
    pub h: u32,
    pub how: ConfigHow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_config: Option<CanvasConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<ZoomRect>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TileRequest {
    pub ack_seqs: Vec<u64>,
    pub config: CanvasConfig,
    pub items: Vec<TileReqItem>,
    /// Set when the in-flight budget ran out before every needed tile could
    /// be requested. Local only; the caller retries once requests drain.
    #[serde(skip)]
    pub throttled: bool,
}

impl TileRequest {
    pub fn tile_count(&self) -> usize {
        self.items.iter().map(|i| i.prio.len() + i.reg.len()).sum()
    }
}

/// Tiles wanted for one item (highlight) or one selection version (base).
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TileReqItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub prio: Vec<String>,
    pub reg: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectHow {
    Select,
    Deselect,
    Exact,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SelectionUpdate {
    pub version: u32,
    pub how: SelectHow,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pat: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<ItemId>>,
}

// ── Incoming ─────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum Message {
    CanvasConfig(CanvasConfigMsg),
    Tile(TileMsg),
    AxisTicks(AxisTicksMsg),
    Pt(PtMsg),
    Labels(LabelsMsg),
}

impl Message {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CanvasConfigMsg {
    #[serde(flatten)]
    pub config: CanvasConfig,
    #[serde(default)]
    pub axes: Option<Axes>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct TileMsg {
    pub config_id: u64,
    pub zoom_level: i32,
    pub row: i32,
    pub col: i32,
    #[serde(default)]
    pub item_id: Option<ItemId>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub style: Option<String>,
    pub sm_version: u32,
    /// Sequence numbers this response retires, `"seq:seq:..."`.
    #[serde(default)]
    pub seqs: String,
}

impl TileMsg {
    pub fn seq_numbers(&self) -> Vec<u64> {
        self.seqs
            .split(':')
            .filter(|s| !s.is_empty())
            .filter_map(|s| match s.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    log::warn!("Ignoring bad sequence number {s:?} in tile message");
                    None
                }
            })
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct AxisTicksMsg {
    pub config_id: u64,
    pub axis_seq: u64,
    pub x_offset: f64,
    pub y_offset: f64,
    pub axes: Axes,
}

/// A data coordinate as formatted by the backend: numeric or already text
/// (e.g. timestamps).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DataValue {
    Num(f64),
    Text(String),
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Num(v) => write!(f, "{v}"),
            DataValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PtMsg {
    pub config: CanvasConfig,
    pub mouse_x: f64,
    pub mouse_y: f64,
    pub item_id: ItemId,
    pub data_x: DataValue,
    pub data_y: DataValue,
    pub screen_x: f64,
    pub screen_y: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct LabelsMsg {
    /// `[item_id, selected, text, style]`, sorted by item id.
    pub labels: Vec<(ItemId, bool, String, String)>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CanvasConfig {
        CanvasConfig {
            config_id: 2, w: 800, h: 600,
            x0: 0.0, y0: 0.0, x1: 1.0, y1: 1.0,
            zoom_level: 0, x_offset: -12, y_offset: 3,
        }
    }

    #[test]
    fn test_tile_req_wire_shape() {
        let req = Request::TileReq(TileRequest {
            ack_seqs: vec![4, 5],
            config: config(),
            items: vec![TileReqItem {
                id: Some(7),
                version: None,
                prio: vec![coord_seq(TileCoord::new(0, -1), 9)],
                reg: vec![],
            }],
            throttled: true,
        });
        let v: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(v["msg"], "tile_req");
        assert_eq!(v["ack_seqs"], serde_json::json!([4, 5]));
        assert_eq!(v["items"][0]["id"], 7);
        assert_eq!(v["items"][0]["prio"][0], "0:-1:9");
        assert!(v["items"][0].get("version").is_none());
        assert!(v.get("throttled").is_none(), "throttled is local only");
        assert_eq!(v["config"]["x_offset"], -12);
    }

    #[test]
    fn test_config_req_skips_absent_fields() {
        let req = Request::CanvasConfigReq(ConfigRequest {
            config_id: 1, w: 800, h: 600, how: ConfigHow::Reset,
            old_config: None, zoom: None,
        });
        let v: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(v["msg"], "canvas_config_req");
        assert_eq!(v["how"], "reset");
        assert!(v.get("old_config").is_none());
        assert!(v.get("zoom").is_none());
        assert_eq!(Request::CellFini.to_json().unwrap(), r#"{"msg":"cell_fini"}"#);
    }

    #[test]
    fn test_parse_tile_and_seqs() {
        let m = Message::parse(
            r#"{"msg":"tile","config_id":1,"zoom_level":0,"row":0,"col":1,
                "sm_version":2,"seqs":"3:4:x:5"}"#,
        ).unwrap();
        let Message::Tile(t) = m else { panic!("expected tile") };
        assert_eq!(t.item_id, None);
        assert_eq!(t.seq_numbers(), vec![3, 4, 5]);
    }

    #[test]
    fn test_parse_canvas_config_flat() {
        let m = Message::parse(
            r#"{"msg":"canvas_config","config_id":3,"w":640,"h":480,
                "x0":-1.5,"y0":0,"x1":1.5,"y1":10,"zoom_level":0,
                "x_offset":0,"y_offset":0,
                "axes":{"x":[[0,"-1.5"],[320,"0"]],"y":[]}}"#,
        ).unwrap();
        let Message::CanvasConfig(c) = m else { panic!("expected canvas_config") };
        assert_eq!(c.config.config_id, 3);
        assert_eq!(c.config.w, 640);
        assert_eq!(c.axes.unwrap().x[1], (320.0, "0".to_string()));
    }

    #[test]
    fn test_parse_pt_and_labels() {
        let cfg = serde_json::to_string(&config()).unwrap();
        let m = Message::parse(&format!(
            r#"{{"msg":"pt","config":{cfg},"mouse_x":10,"mouse_y":20,"item_id":4,
                "data_x":1.25,"data_y":"2021-01-01","screen_x":11,"screen_y":19}}"#
        )).unwrap();
        let Message::Pt(p) = m else { panic!("expected pt") };
        assert_eq!(p.data_x.to_string(), "1.25");
        assert_eq!(p.data_y.to_string(), "2021-01-01");

        let m = Message::parse(
            r#"{"msg":"labels","labels":[[1,true,"a","ff0000:3:1"]],"count":5}"#,
        ).unwrap();
        let Message::Labels(l) = m else { panic!("expected labels") };
        assert_eq!(l.labels[0].0, 1);
        assert_eq!(l.count, 5);
    }

    #[test]
    fn test_unknown_message_is_error() {
        assert!(Message::parse(r#"{"msg":"bogus"}"#).is_err());
    }
}
