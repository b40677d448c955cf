//! End-to-end scenarios: a whole `TileHandler` driven through a recording
//! transport, with the backend's answers scripted by hand.

use tilescope::interaction::mouse::{PointerEvent, PointerKind};
use tilescope::interaction::predict::fit;
use tilescope::net::message::{CanvasConfig, CanvasConfigMsg, ConfigHow, Message, Request, TileMsg};
use tilescope::net::RecordingTransport;
use tilescope::types::{HighlightLookup, MouseSample, TileCoord, Waypoint};
use tilescope::{EngineConfig, TileHandler};

const TS: u32 = 256;

fn canvas_config(config_id: u64, w: u32, h: u32) -> Message {
    Message::CanvasConfig(CanvasConfigMsg {
        config: CanvasConfig {
            config_id, w, h,
            x0: 0.0, y0: 0.0, x1: 100.0, y1: 100.0,
            zoom_level: 0, x_offset: 0, y_offset: 0,
        },
        axes: None,
    })
}

fn base_tile(config_id: u64, row: i32, col: i32, sm_version: u32, seqs: &str) -> (Message, Vec<Vec<u8>>) {
    let msg = Message::Tile(TileMsg {
        config_id, zoom_level: 0, row, col,
        item_id: None, label: None, style: None,
        sm_version,
        seqs: seqs.to_string(),
    });
    let hitmap: Vec<u8> = (0..TS * TS).flat_map(|_| (-1i32).to_le_bytes()).collect();
    (msg, vec![vec![0x89, b'P', b'N', b'G'], hitmap])
}

fn started(w: u32, h: u32) -> TileHandler<RecordingTransport> {
    let mut t = TileHandler::new(EngineConfig::default(), RecordingTransport::new(), 0.0).unwrap();
    t.start(w, h);
    t.on_message(canvas_config(1, w, h), Vec::new(), 1.0).unwrap();
    t
}

#[test]
fn late_tile_of_previous_config_is_discarded() {
    let mut t = started(800, 600);
    t.transport_mut().take();

    // Drag a zoom rectangle.
    t.set_zoom_mode(true);
    assert!(t.mouse().zoom_mode());
    t.on_pointer(PointerEvent::new(PointerKind::Down, 100.0, 100.0, 1), 10.0);
    t.on_pointer(PointerEvent::new(PointerKind::Move, 300.0, 250.0, 1), 20.0);
    assert!(t.view().select_area.is_some(), "selection rectangle while dragging");
    t.on_pointer(PointerEvent::new(PointerKind::Up, 300.0, 250.0, 0), 30.0);

    let sent = t.transport_mut().take();
    let Some(Request::CanvasConfigReq(req)) = sent.first() else {
        panic!("expected a zoom request, got {sent:?}");
    };
    assert_eq!((req.config_id, req.how), (2, ConfigHow::Zoom));
    assert!(t.view().select_area.is_none());

    t.on_message(canvas_config(2, 800, 600), Vec::new(), 40.0).unwrap();
    t.tick(40.0);
    t.take_repaint();
    let before = t.placed_tiles();

    let (msg, att) = base_tile(1, 0, 0, 0, "0");
    t.on_message(msg, att, 50.0).unwrap();
    t.tick(50.0);
    assert_eq!(t.placed_tiles(), before, "visible set unchanged");
    assert_eq!(t.tiles().cached_len(), 0, "old-config tile is not even cached");
}

#[test]
fn older_selection_version_never_replaces_newer() {
    let mut t = started(256, 256);
    let (msg, att) = base_tile(1, 0, 0, 2, "");
    t.on_message(msg, att, 5.0).unwrap();
    let (msg, att) = base_tile(1, 0, 0, 0, "");
    t.on_message(msg, att, 5.0).unwrap();
    t.tick(5.0);

    let key = t.tiles().key(TileCoord::new(0, 0), None);
    assert_eq!(t.tiles().get_tile(&key).map(|tile| tile.sm_version), Some(2));
    assert!(!t.tiles().is_cached(&key), "one identity is stored once");
}

#[test]
fn mouse_history_fit_extrapolates() {
    let samples = [
        MouseSample { t: 0.0, x: 0.0, y: 0.0 },
        MouseSample { t: 10.0, x: 1.0, y: 0.0 },
        MouseSample { t: 20.0, x: 2.0, y: 0.0 },
    ];
    let (x, y) = fit(&samples, 0.0).unwrap().at(30.0);
    assert!((x - 3.0).abs() < 1e-9, "x = {x}");
    assert!(y.abs() < 1e-9, "y = {y}");
}

#[test]
fn highlight_requests_throttle_at_budget() {
    let mut t = started(256, 256);
    // Retire the base tile request first.
    let (msg, att) = base_tile(1, 0, 0, 0, "0");
    t.on_message(msg, att, 5.0).unwrap();
    t.tick(5.0);
    assert_eq!(t.inflight_len(), 0);

    let budget = EngineConfig::default().max_inflight_requests as u32;
    for item in 0..budget {
        let req = t.create_highlight_req(&[Waypoint::at(10.0, 10.0, Some(item))], 10.0)
            .expect("under budget");
        assert!(!req.throttled, "item {item} fits the budget");
        assert_eq!(req.tile_count(), 1);
    }
    let req = t.create_highlight_req(&[Waypoint::at(10.0, 10.0, Some(budget))], 10.0)
        .expect("a throttled request is still reported");
    assert!(req.throttled);
    assert!(req.items.is_empty());
    assert_eq!(t.inflight_len(), budget as usize, "budget never exceeded");
}

#[test]
fn missing_tile_lookup_is_unknown() {
    let mut t = started(512, 256);
    let (msg, att) = base_tile(1, 0, 0, 0, "0");
    t.on_message(msg, att, 5.0).unwrap();
    t.tick(5.0);

    assert_eq!(t.highlight_id_at(10.0, 10.0), HighlightLookup::NoItem);
    assert_eq!(t.highlight_id_at(300.0, 10.0), HighlightLookup::Unknown, "tile (0,1) never arrived");
}

#[test]
fn stale_canvas_config_changes_nothing() {
    let mut t = started(256, 256);
    let (msg, att) = base_tile(1, 0, 0, 0, "0");
    t.on_message(msg, att, 5.0).unwrap();
    t.tick(5.0);
    t.take_repaint();
    t.transport_mut().take();

    t.on_message(canvas_config(1, 256, 256), Vec::new(), 6.0).unwrap();
    t.tick(6.0);
    assert!(!t.take_repaint());
    assert!(t.transport_mut().take().is_empty(), "no new tile request");
    assert_eq!(t.tiles().visible_len(), 1);
}

#[test]
fn burst_of_tiles_is_one_repaint() {
    let mut t = started(512, 512);
    t.take_repaint();
    for (i, (row, col)) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
        let (msg, att) = base_tile(1, row, col, 0, &i.to_string());
        t.on_message(msg, att, 5.0).unwrap();
    }
    assert!(!t.take_repaint(), "nothing shown before tick");
    assert_eq!(t.next_deadline(), Some(f64::NEG_INFINITY));
    t.tick(5.0);
    assert!(t.take_repaint());
    assert!(!t.take_repaint());
    assert_eq!(t.placed_tiles().len(), 4);
    assert_eq!(t.status_text(), None);
}

#[test]
fn panning_requests_uncovered_tiles_and_acks() {
    let mut t = started(256, 256);
    let (msg, att) = base_tile(1, 0, 0, 0, "0");
    t.on_message(msg, att, 5.0).unwrap();
    t.tick(5.0);
    t.transport_mut().take();

    t.on_pointer(PointerEvent::new(PointerKind::Down, 100.0, 100.0, 1), 10.0);
    t.on_pointer(PointerEvent::new(PointerKind::Move, 60.0, 100.0, 1), 20.0);
    assert_eq!(t.tiles().offsets(), (-40.0, 0.0));

    let sent = t.transport_mut().take();
    let Some(Request::TileReq(req)) = sent.iter().find(|r| r.kind() == "tile_req") else {
        panic!("expected a tile request, got {sent:?}");
    };
    assert_eq!(req.ack_seqs, vec![0]);
    assert_eq!(req.items[0].prio, vec!["0:1:1"]);
}
