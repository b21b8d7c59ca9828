//! IPC message dispatch — parse s-expressions and route to handlers.

use lexpr::Value;
use tracing::{debug, warn};

use crate::interaction::gesture::{GestureFrame, GestureKind};
use crate::interaction::landmarks::{HandFrame, Landmark, LANDMARK_COUNT};
use crate::scene::{Vec3, Viewport};
use crate::state::ViewerState;

/// Parse an s-expression message and dispatch to the appropriate handler.
/// Returns an optional response string (s-expression).
pub fn handle_message(state: &mut ViewerState, client_id: u64, raw: &str) -> Option<String> {
    let value = match lexpr::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(client_id, "malformed s-expression: {}", e);
            return Some(error_response(0, &format!("malformed s-expression: {e}")));
        }
    };

    let msg_type = get_keyword(&value, "type");
    let msg_id = get_int(&value, "id").unwrap_or(0);

    // Check authentication (hello must be first message)
    let is_authenticated = state
        .ipc_server
        .clients
        .get(&client_id)
        .map(|c| c.authenticated)
        .unwrap_or(false);

    match msg_type.as_deref() {
        Some("hello") => handle_hello(state, client_id, msg_id, &value),
        _ if !is_authenticated => Some(error_response(msg_id, "hello handshake required")),
        Some("ping") => handle_ping(state, msg_id),
        // Input feed
        Some("gesture-frame") => handle_gesture_frame(state, msg_id, &value),
        Some("hand-frame") => handle_hand_frame(state, msg_id, &value),
        // Modal gate & session control
        Some("pause") => handle_pause(state, msg_id),
        Some("resume") => handle_resume(state, msg_id),
        Some("reset") => handle_reset(state, msg_id),
        // Status queries
        Some("status") => handle_status(state, msg_id),
        Some("camera-status") => handle_camera_status(state, msg_id),
        Some("gesture-status") => handle_gesture_status(state, msg_id),
        Some("dwell-status") => handle_dwell_status(state, msg_id),
        Some("classifier-status") => handle_classifier_status(state, msg_id),
        Some("frame-timing") => handle_frame_timing(state, msg_id),
        // Scene queries
        Some("scene-list") => handle_scene_list(state, msg_id),
        Some("target-info") => handle_target_info(state, msg_id, &value),
        // Configuration
        Some("config") => handle_config(state, msg_id),
        Some("set-dwell") => handle_set_dwell(state, msg_id, &value),
        Some("set-time-scale") => handle_set_time_scale(state, msg_id, &value),
        Some("set-viewport") => handle_set_viewport(state, msg_id, &value),
        // IPC administration
        Some("ipc-client-info") => handle_ipc_client_info(state, client_id, msg_id),
        Some("ipc-rate-limit") => handle_ipc_rate_limit(state, client_id, msg_id, &value),
        Some(other) => Some(error_response(
            msg_id,
            &format!("unknown message type: {other}"),
        )),
        None => Some(error_response(msg_id, "missing :type field")),
    }
}

// ── Handshake ───────────────────────────────────────────────

fn handle_hello(
    state: &mut ViewerState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let version = get_int(value, "version").unwrap_or(0);
    if version != 1 {
        return Some(error_response(
            msg_id,
            &format!("unsupported protocol version: {version}"),
        ));
    }

    // SO_PEERCRED: only the user who started the viewer may connect.
    if let Some(client) = state.ipc_server.clients.get(&client_id) {
        if let Some(peer_uid) = client.peer_uid {
            let our_uid = unsafe { libc::getuid() };
            if peer_uid != our_uid {
                warn!(client_id, peer_uid, our_uid, "rejecting client: UID mismatch");
                return Some(error_response(msg_id, "authentication failed: UID mismatch"));
            }
        }
    }

    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.authenticated = true;
    }

    Some(format!(
        "(:type :response :id {} :status :ok :server \"orrery-viewer\" :version \"{}\" :protocol 1)",
        msg_id,
        env!("CARGO_PKG_VERSION"),
    ))
}

fn handle_ping(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :clock-ms {:.0})",
        msg_id, state.clock_ms,
    ))
}

// ── Input feed ──────────────────────────────────────────────

fn handle_gesture_frame(
    state: &mut ViewerState,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    // A missing or unknown :gesture label degrades to a `none` frame,
    // which takes the reset path rather than erroring.
    let kind = get_keyword(value, "gesture").and_then(|s| GestureKind::from_str(&s));

    let x = get_float(value, "x").map(|v| v as f32);
    let y = get_float(value, "y").map(|v| v as f32);
    let position = match (x, y) {
        (Some(x), Some(y)) => Some((x, y)),
        _ => None,
    };

    let direction = match (get_float(value, "dx"), get_float(value, "dy")) {
        (Some(dx), Some(dy)) => Some(Vec3::new(
            dx as f32,
            dy as f32,
            get_float(value, "dz").unwrap_or(0.0) as f32,
        )),
        _ => None,
    };

    let frame = GestureFrame {
        kind,
        position,
        distance: get_float(value, "distance").map(|v| v as f32),
        direction,
        confidence: get_float(value, "confidence").unwrap_or(0.0) as f32,
    };

    state.handle_gesture_frame(Some(frame));
    Some(ok_response(msg_id))
}

fn handle_hand_frame(state: &mut ViewerState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(landmark_values) = get_value(value, "landmarks") else {
        return Some(error_response(msg_id, "missing :landmarks field"));
    };

    let numbers: Vec<f32> = flatten_list(landmark_values)
        .into_iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if numbers.len() != LANDMARK_COUNT * 3 {
        debug!(
            "hand-frame with {} coordinates (expected {})",
            numbers.len(),
            LANDMARK_COUNT * 3,
        );
        return Some(error_response(msg_id, "malformed landmark list"));
    }

    let landmarks = numbers
        .chunks_exact(3)
        .map(|c| Landmark {
            x: c[0],
            y: c[1],
            z: c[2],
        })
        .collect();
    let confidence = get_float(value, "confidence").unwrap_or(0.0) as f32;

    match HandFrame::new(landmarks, confidence) {
        Some(hand) => {
            state.handle_hand_frame(hand);
            Some(ok_response(msg_id))
        }
        None => Some(error_response(msg_id, "malformed landmark list")),
    }
}

// ── Modal gate & session control ────────────────────────────

fn handle_pause(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    state.pause();
    Some(ok_response(msg_id))
}

fn handle_resume(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    state.resume();
    Some(ok_response(msg_id))
}

fn handle_reset(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    state.reset();
    Some(ok_response(msg_id))
}

// ── Status queries ──────────────────────────────────────────

fn handle_status(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :viewer {})",
        msg_id,
        state.status_sexp(),
    ))
}

fn handle_camera_status(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :camera {})",
        msg_id,
        state.controller.camera.status_sexp(),
    ))
}

fn handle_gesture_status(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :gesture {})",
        msg_id,
        state.controller.status_sexp(),
    ))
}

fn handle_dwell_status(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :dwell {})",
        msg_id,
        state.overlay.dwell.status_sexp(),
    ))
}

fn handle_classifier_status(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :classifier {})",
        msg_id,
        state.classifier.status_sexp(),
    ))
}

fn handle_frame_timing(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :timing {})",
        msg_id,
        state.timing.stats_sexp(),
    ))
}

// ── Scene queries ───────────────────────────────────────────

fn handle_scene_list(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :targets {})",
        msg_id,
        state.scene.list_sexp(),
    ))
}

fn handle_target_info(state: &mut ViewerState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(id) = get_int(value, "target-id") else {
        return Some(error_response(msg_id, "missing :target-id field"));
    };
    match state.scene.target_info_sexp(id as u64) {
        Some(info) => Some(format!(
            "(:type :response :id {} :status :ok :target {})",
            msg_id, info,
        )),
        None => Some(error_response(msg_id, &format!("unknown target: {id}"))),
    }
}

// ── Configuration ───────────────────────────────────────────

fn handle_config(state: &mut ViewerState, msg_id: i64) -> Option<String> {
    Some(format!(
        "(:type :response :id {} :status :ok :camera {} :dwell {})",
        msg_id,
        state.controller.camera.config_sexp(),
        state.overlay.dwell.config_sexp(),
    ))
}

fn handle_set_dwell(state: &mut ViewerState, msg_id: i64, value: &Value) -> Option<String> {
    let mut changed = false;
    if let Some(ms) = get_float(value, "ms") {
        if ms <= 0.0 {
            return Some(error_response(msg_id, "dwell duration must be positive"));
        }
        state.overlay.dwell.config.dwell_ms = ms;
        changed = true;
    }
    if let Some(px) = get_float(value, "threshold-px") {
        if px <= 0.0 {
            return Some(error_response(msg_id, "threshold must be positive"));
        }
        state.overlay.dwell.config.threshold_px = px as f32;
        changed = true;
    }
    if !changed {
        return Some(error_response(msg_id, "nothing to set"));
    }
    Some(ok_response(msg_id))
}

fn handle_set_time_scale(state: &mut ViewerState, msg_id: i64, value: &Value) -> Option<String> {
    let Some(scale) = get_float(value, "scale") else {
        return Some(error_response(msg_id, "missing :scale field"));
    };
    if scale < 0.0 {
        return Some(error_response(msg_id, "time scale must be non-negative"));
    }
    state.scene.time_scale = scale;
    Some(ok_response(msg_id))
}

fn handle_set_viewport(state: &mut ViewerState, msg_id: i64, value: &Value) -> Option<String> {
    let (Some(width), Some(height)) = (get_float(value, "width"), get_float(value, "height"))
    else {
        return Some(error_response(msg_id, "missing :width or :height field"));
    };
    if width <= 0.0 || height <= 0.0 {
        return Some(error_response(msg_id, "viewport dimensions must be positive"));
    }
    state.viewport = Viewport {
        width: width as f32,
        height: height as f32,
        ..state.viewport.clone()
    };
    Some(ok_response(msg_id))
}

// ── IPC administration ──────────────────────────────────────

fn handle_ipc_client_info(
    state: &mut ViewerState,
    client_id: u64,
    msg_id: i64,
) -> Option<String> {
    let Some(client) = state.ipc_server.clients.get(&client_id) else {
        return Some(error_response(msg_id, "unknown client"));
    };
    let uid = client
        .peer_uid
        .map(|u| u.to_string())
        .unwrap_or_else(|| "nil".to_string());
    Some(format!(
        "(:type :response :id {} :status :ok :client-id {} :uid {} :rate-limit {})",
        msg_id, client_id, uid, client.rate_limiter.max_per_second,
    ))
}

fn handle_ipc_rate_limit(
    state: &mut ViewerState,
    client_id: u64,
    msg_id: i64,
    value: &Value,
) -> Option<String> {
    let Some(limit) = get_int(value, "max-per-second") else {
        return Some(error_response(msg_id, "missing :max-per-second field"));
    };
    if limit <= 0 {
        return Some(error_response(msg_id, "rate limit must be positive"));
    }
    if let Some(client) = state.ipc_server.clients.get_mut(&client_id) {
        client.rate_limiter.max_per_second = limit as u32;
        debug!(client_id, limit, "rate limit updated");
    }
    Some(ok_response(msg_id))
}

// ── Helpers ─────────────────────────────────────────────────

fn ok_response(id: i64) -> String {
    format!("(:type :response :id {} :status :ok)", id)
}

fn error_response(id: i64, reason: &str) -> String {
    format!(
        "(:type :response :id {} :status :error :reason \"{}\")",
        id,
        escape_string(reason)
    )
}

/// Escape a string for s-expression output.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Find the raw value following `:key` in an s-expression plist.
/// Handles both `Value::Keyword("key")` (elisp parser) and
/// `Value::Symbol(":key")` (default parser) forms.
fn get_value<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let prefixed = format!(":{}", key);
    let mut current = value;
    while let Value::Cons(pair) = current {
        let is_key = match pair.car() {
            Value::Keyword(k) => k.as_ref() == key,
            Value::Symbol(s) => s.as_ref() == prefixed,
            _ => false,
        };
        if is_key {
            if let Value::Cons(next) = pair.cdr() {
                return Some(next.car());
            }
            return None;
        }
        current = pair.cdr();
    }
    None
}

/// Extract a keyword value from an s-expression plist as a string.
fn get_keyword(value: &Value, key: &str) -> Option<String> {
    get_value(value, key).and_then(|val| match val {
        Value::Keyword(v) => Some(v.to_string()),
        Value::Symbol(v) => {
            let s = v.to_string();
            Some(s.strip_prefix(':').unwrap_or(&s).to_string())
        }
        Value::String(v) => Some(v.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "t" } else { "nil" }.to_string()),
        Value::Null => Some("nil".to_string()),
        _ => None,
    })
}

/// Extract an integer value from an s-expression plist.
fn get_int(value: &Value, key: &str) -> Option<i64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Extract a floating-point value from an s-expression plist.
fn get_float(value: &Value, key: &str) -> Option<f64> {
    get_keyword(value, key).and_then(|s| s.parse().ok())
}

/// Flatten a possibly nested list/cons structure into a Vec of leaf values.
fn flatten_list(value: &Value) -> Vec<&Value> {
    let mut result = Vec::new();
    fn walk<'a>(v: &'a Value, out: &mut Vec<&'a Value>) {
        match v {
            Value::Cons(pair) => {
                walk(pair.car(), out);
                walk(pair.cdr(), out);
            }
            Value::Null => {} // end of list
            other => out.push(other),
        }
    }
    walk(value, &mut result);
    result
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ViewerState {
        ViewerState::new(
            std::path::PathBuf::from("/tmp/orrery-dispatch-test.sock"),
            Viewport::default(),
        )
    }

    /// Connect a loopback client and complete the hello handshake.
    fn connected_client(state: &mut ViewerState) -> u64 {
        let id = state.ipc_server.insert_test_client();
        let resp = handle_message(state, id, "(:type :hello :id 1 :version 1)").unwrap();
        assert!(resp.contains(":status :ok"), "handshake failed: {}", resp);
        id
    }

    #[test]
    fn test_malformed_sexp() {
        let mut state = test_state();
        let id = connected_client(&mut state);
        let resp = handle_message(&mut state, id, "(:type :ping").unwrap();
        assert!(resp.contains(":status :error"));
        assert!(resp.contains("malformed"));
    }

    #[test]
    fn test_requires_hello() {
        let mut state = test_state();
        let id = state.ipc_server.insert_test_client();
        let resp = handle_message(&mut state, id, "(:type :ping :id 1)").unwrap();
        assert!(resp.contains("hello handshake required"));
    }

    #[test]
    fn test_hello_version_check() {
        let mut state = test_state();
        let id = state.ipc_server.insert_test_client();
        let resp = handle_message(&mut state, id, "(:type :hello :id 1 :version 99)").unwrap();
        assert!(resp.contains("unsupported protocol version"));

        let resp = handle_message(&mut state, id, "(:type :hello :id 1 :version 1)").unwrap();
        assert!(resp.contains(":status :ok"));
        assert!(resp.contains(":server \"orrery-viewer\""));
    }

    #[test]
    fn test_ping_after_hello() {
        let mut state = test_state();
        let id = connected_client(&mut state);
        let resp = handle_message(&mut state, id, "(:type :ping :id 2)").unwrap();
        assert!(resp.contains(":clock-ms"));
    }

    #[test]
    fn test_gesture_frame_dispatch() {
        let mut state = test_state();
        let resp = handle_gesture_frame(
            &mut state,
            2,
            &lexpr::from_str(
                "(:type :gesture-frame :id 2 :gesture \"pinch\" :x 0.5 :y 0.5 :distance 0.02 :confidence 0.9)",
            )
            .unwrap(),
        )
        .unwrap();
        assert!(resp.contains(":status :ok"));
        assert!(state
            .pending_events
            .iter()
            .any(|e| e.contains(":gesture \"pinch\"")));
    }

    #[test]
    fn test_unknown_gesture_label_resets() {
        let mut state = test_state();
        handle_gesture_frame(
            &mut state,
            2,
            &lexpr::from_str("(:type :gesture-frame :id 2 :gesture \"wave\" :x 0.5 :y 0.5)")
                .unwrap(),
        );
        assert!(state
            .pending_events
            .iter()
            .any(|e| e.contains(":gesture \"none\"")));
    }

    #[test]
    fn test_hand_frame_roundtrip() {
        let mut state = test_state();
        // 21 identical landmark triples.
        let triples: Vec<String> = (0..LANDMARK_COUNT).map(|_| "(0.5 0.5 0.0)".to_string()).collect();
        let raw = format!(
            "(:type :hand-frame :id 3 :landmarks ({}) :confidence 0.8)",
            triples.join(" "),
        );
        let resp = handle_hand_frame(&mut state, 3, &lexpr::from_str(&raw).unwrap()).unwrap();
        assert!(resp.contains(":status :ok"), "{}", resp);
    }

    #[test]
    fn test_hand_frame_malformed() {
        let mut state = test_state();
        let raw = "(:type :hand-frame :id 3 :landmarks ((0.5 0.5 0.0)) :confidence 0.8)";
        let resp = handle_hand_frame(&mut state, 3, &lexpr::from_str(raw).unwrap()).unwrap();
        assert!(resp.contains("malformed landmark list"));
    }

    #[test]
    fn test_target_info() {
        let mut state = test_state();
        let id = state.scene.targets()[2].id;
        let raw = format!("(:type :target-info :id 4 :target-id {})", id);
        let resp = handle_target_info(&mut state, 4, &lexpr::from_str(&raw).unwrap()).unwrap();
        assert!(resp.contains(":name \"Earth\""), "{}", resp);

        let raw = "(:type :target-info :id 4 :target-id 99999)";
        let resp = handle_target_info(&mut state, 4, &lexpr::from_str(raw).unwrap()).unwrap();
        assert!(resp.contains(":status :error"));
    }

    #[test]
    fn test_set_dwell() {
        let mut state = test_state();
        let raw = "(:type :set-dwell :id 5 :ms 1500 :threshold-px 80)";
        let resp = handle_set_dwell(&mut state, 5, &lexpr::from_str(raw).unwrap()).unwrap();
        assert!(resp.contains(":status :ok"));
        assert!((state.overlay.dwell.config.dwell_ms - 1500.0).abs() < 1e-9);
        assert!((state.overlay.dwell.config.threshold_px - 80.0).abs() < 1e-6);

        let raw = "(:type :set-dwell :id 5 :ms -10)";
        let resp = handle_set_dwell(&mut state, 5, &lexpr::from_str(raw).unwrap()).unwrap();
        assert!(resp.contains(":status :error"));
    }

    #[test]
    fn test_set_viewport() {
        let mut state = test_state();
        let raw = "(:type :set-viewport :id 6 :width 1920 :height 1080)";
        let resp = handle_set_viewport(&mut state, 6, &lexpr::from_str(raw).unwrap()).unwrap();
        assert!(resp.contains(":status :ok"));
        assert_eq!(state.viewport.width, 1920.0);
        assert_eq!(state.viewport.height, 1080.0);
    }

    #[test]
    fn test_pause_resume_via_dispatch() {
        let mut state = test_state();
        handle_pause(&mut state, 7);
        assert!(state.controller.state.paused);
        handle_resume(&mut state, 8);
        assert!(!state.controller.state.paused);
    }

    #[test]
    fn test_get_helpers() {
        let v = lexpr::from_str("(:type :x :count 5 :ratio 0.25 :label \"hi\")").unwrap();
        assert_eq!(get_int(&v, "count"), Some(5));
        assert_eq!(get_float(&v, "ratio"), Some(0.25));
        assert_eq!(get_keyword(&v, "label"), Some("hi".to_string()));
        assert_eq!(get_keyword(&v, "missing"), None);
    }

    #[test]
    fn test_unknown_type() {
        let mut state = test_state();
        let id = connected_client(&mut state);
        let resp = handle_message(&mut state, id, "(:type :frobnicate :id 9)").unwrap();
        assert!(resp.contains("unknown message type"));

        let resp = handle_message(&mut state, id, "(:id 9)").unwrap();
        assert!(resp.contains("missing :type field"));
    }
}
