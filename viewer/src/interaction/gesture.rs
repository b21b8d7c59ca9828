//! Gesture dispatch — turns per-frame gesture classifications into camera
//! manipulation and pointing selection.
//!
//! One frame in, at most one handler out.  Missing or unknown gestures
//! take the reset path; a pause gate discards input entirely and forces a
//! reset on resume so no stale deltas cross the boundary.

use tracing::{debug, info};

use super::camera::CameraRig;
use super::picking::{camera_ray, pick_target, SelectionState};
use crate::scene::{Body, Vec3, Viewport};

// ── Gesture types ───────────────────────────────────────────

/// Recognized gesture kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GestureKind {
    /// Thumb and index fingertips close together — zoom.
    Pinch,
    /// All fingers extended — orbit rotation.
    OpenPalm,
    /// Index finger extended, others curled — selection ray.
    Point,
    /// Index and middle extended — pan.
    TwoFingers,
}

impl GestureKind {
    /// String representation for IPC and the UI indicator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinch => "pinch",
            Self::OpenPalm => "open-palm",
            Self::Point => "point",
            Self::TwoFingers => "two-fingers",
        }
    }

    /// Parse a gesture kind.  "none" and unknown labels return None,
    /// which routes the frame onto the reset path.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pinch" => Some(Self::Pinch),
            "open-palm" | "open_palm" => Some(Self::OpenPalm),
            "point" => Some(Self::Point),
            "two-fingers" | "two_fingers" => Some(Self::TwoFingers),
            _ => None,
        }
    }
}

/// One classified input frame.
#[derive(Debug, Clone)]
pub struct GestureFrame {
    /// None means "no gesture" and resets the interaction state.
    pub kind: Option<GestureKind>,
    /// Normalized [0,1]² hand position.
    pub position: Option<(f32, f32)>,
    /// Pinch span or two-finger spread (normalized units).
    pub distance: Option<f32>,
    /// Pointing direction (z may be zero for 2D sources).
    pub direction: Option<Vec3>,
    /// Classifier confidence in [0,1].
    pub confidence: f32,
}

impl GestureFrame {
    /// A frame carrying no gesture.
    pub fn none() -> Self {
        Self {
            kind: None,
            position: None,
            distance: None,
            direction: None,
            confidence: 0.0,
        }
    }
}

// ── Events ──────────────────────────────────────────────────

/// Events emitted toward the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    /// The UI gesture indicator should show this label.
    IndicatorChanged { gesture: &'static str },
    /// Pointing selection changed — show the info display for this body.
    TargetFocused {
        id: u64,
        name: &'static str,
        distance: &'static str,
        diameter: &'static str,
        period: &'static str,
    },
    /// Cursor began dwelling over a target.
    DwellStarted { id: u64, name: &'static str },
    /// Dwell progress toward activation.
    DwellProgress {
        id: u64,
        elapsed_ms: f64,
        threshold_ms: f64,
    },
    /// Cursor left all targets.
    HoverEnded,
    /// Dwell completed — the target is selected.
    TargetSelected { id: u64, name: &'static str },
}

impl InteractionEvent {
    /// Convert the event to an IPC s-expression.
    pub fn to_sexp(&self) -> String {
        match self {
            Self::IndicatorChanged { gesture } => {
                format!(
                    "(:type :event :event :gesture-indicator :gesture \"{}\")",
                    gesture
                )
            }
            Self::TargetFocused {
                id,
                name,
                distance,
                diameter,
                period,
            } => {
                format!(
                    "(:type :event :event :target-info :id {} :name \"{}\" :distance \"{}\" :diameter \"{}\" :period \"{}\")",
                    id, name, distance, diameter, period,
                )
            }
            Self::DwellStarted { id, name } => {
                format!(
                    "(:type :event :event :dwell-started :id {} :name \"{}\")",
                    id, name
                )
            }
            Self::DwellProgress {
                id,
                elapsed_ms,
                threshold_ms,
            } => {
                format!(
                    "(:type :event :event :dwell-progress :id {} :elapsed-ms {:.0} :threshold-ms {:.0})",
                    id, elapsed_ms, threshold_ms,
                )
            }
            Self::HoverEnded => "(:type :event :event :hover-end)".to_string(),
            Self::TargetSelected { id, name } => {
                format!(
                    "(:type :event :event :target-selected :id {} :name \"{}\")",
                    id, name
                )
            }
        }
    }
}

// ── Interaction state ───────────────────────────────────────

/// Per-session interaction bookkeeping, reset on `none` gestures,
/// explicit resets, and pause/resume boundaries.
#[derive(Debug, Default)]
pub struct InteractionState {
    /// Gesture kind handled on the previous frame.
    pub current_gesture: Option<GestureKind>,
    /// Position stored by the previous frame, for delta computation.
    pub last_position: Option<(f32, f32)>,
    /// While paused, all gesture input is discarded.
    pub paused: bool,
    /// Timestamp of the last frame that carried a gesture.
    pub last_hands_seen_ms: Option<f64>,
}

impl InteractionState {
    fn clear(&mut self) {
        self.current_gesture = None;
        self.last_position = None;
        self.last_hands_seen_ms = None;
    }
}

// ── Controller ──────────────────────────────────────────────

/// Consumes gesture frames and drives the camera rig and pointing
/// selection.
pub struct GestureController {
    pub state: InteractionState,
    pub camera: CameraRig,
    pub selection: SelectionState,
}

impl GestureController {
    pub fn new() -> Self {
        Self {
            state: InteractionState::default(),
            camera: CameraRig::new(),
            selection: SelectionState::new(),
        }
    }

    /// Handle one input frame.
    ///
    /// Returns the events the frame produced.  While paused this is a
    /// strict no-op; a missing frame, a `none` gesture, or a gesture with
    /// its required field absent takes the reset path.
    pub fn handle_frame(
        &mut self,
        frame: Option<&GestureFrame>,
        bodies: &[Body],
        viewport: &Viewport,
        now_ms: f64,
    ) -> Vec<InteractionEvent> {
        if self.state.paused {
            return Vec::new();
        }

        let Some(frame) = frame else {
            return self.reset_path();
        };
        let Some(kind) = frame.kind else {
            return self.reset_path();
        };

        self.state.last_hands_seen_ms = Some(now_ms);

        // A kind change invalidates the previous position: the first
        // frame of a new gesture only seeds it, avoiding a spurious jump.
        let prev_position = if self.state.current_gesture == Some(kind) {
            self.state.last_position
        } else {
            None
        };

        let mut events = Vec::new();
        match kind {
            GestureKind::Pinch => {
                let Some(span) = frame.distance else {
                    debug!("pinch frame without distance, resetting");
                    return self.reset_path();
                };
                self.camera.zoom_pinch(span);
            }
            GestureKind::OpenPalm => {
                let Some(pos) = frame.position else {
                    debug!("open-palm frame without position, resetting");
                    return self.reset_path();
                };
                if let Some(prev) = prev_position {
                    self.camera.rotate_palm((pos.0 - prev.0, pos.1 - prev.1));
                }
            }
            GestureKind::TwoFingers => {
                let Some(pos) = frame.position else {
                    debug!("two-finger frame without position, resetting");
                    return self.reset_path();
                };
                if let Some(prev) = prev_position {
                    self.camera.pan_two_finger((pos.0 - prev.0, pos.1 - prev.1));
                }
            }
            GestureKind::Point => {
                let Some(pos) = frame.position else {
                    debug!("point frame without position, resetting");
                    return self.reset_path();
                };
                let ray = camera_ray(self.camera.eye(), pos.0, pos.1, viewport);
                if let Some(id) = self.selection.observe(pick_target(&ray, bodies)) {
                    if let Some(body) = bodies.iter().find(|b| b.id == id) {
                        info!("pointing selection changed to {}", body.name);
                        events.push(InteractionEvent::TargetFocused {
                            id: body.id,
                            name: body.name,
                            distance: body.info.distance,
                            diameter: body.info.diameter,
                            period: body.info.period,
                        });
                    }
                }
            }
        }

        self.state.current_gesture = Some(kind);
        self.state.last_position = frame.position;
        events.push(InteractionEvent::IndicatorChanged {
            gesture: kind.as_str(),
        });
        events
    }

    /// Reset path: clear interaction bookkeeping, settle camera targets,
    /// and report the indicator as "none".
    fn reset_path(&mut self) -> Vec<InteractionEvent> {
        self.reset_interaction();
        vec![InteractionEvent::IndicatorChanged { gesture: "none" }]
    }

    /// Clear interaction state without emitting events.
    pub fn reset_interaction(&mut self) {
        self.state.clear();
        self.camera.settle();
    }

    /// Gate: discard all gesture input until resumed.
    pub fn pause(&mut self) {
        if !self.state.paused {
            info!("gesture input paused");
            self.state.paused = true;
        }
    }

    /// Reopen the gate.  Interaction state is force-reset so the first
    /// gesture after resume behaves like the first ever received.
    pub fn resume(&mut self) {
        if self.state.paused {
            info!("gesture input resumed");
            self.state.paused = false;
            self.reset_interaction();
        }
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let gesture = self
            .state
            .current_gesture
            .map(|g| g.as_str())
            .unwrap_or("none");
        let selected = self
            .selection
            .selected
            .map(|id| id.to_string())
            .unwrap_or_else(|| "nil".to_string());
        format!(
            "(:paused {} :gesture \"{}\" :selected {} :hands-seen {})",
            if self.state.paused { "t" } else { "nil" },
            gesture,
            selected,
            self.state
                .last_hands_seen_ms
                .map(|t| format!("{:.0}", t))
                .unwrap_or_else(|| "nil".to_string()),
        )
    }
}

// ── Test helpers ────────────────────────────────────────────

#[cfg(test)]
pub(crate) fn pinch_frame(span: f32) -> GestureFrame {
    GestureFrame {
        kind: Some(GestureKind::Pinch),
        position: Some((0.5, 0.5)),
        distance: Some(span),
        direction: None,
        confidence: 0.9,
    }
}

#[cfg(test)]
pub(crate) fn positioned_frame(kind: GestureKind, x: f32, y: f32) -> GestureFrame {
    GestureFrame {
        kind: Some(kind),
        position: Some((x, y)),
        distance: None,
        direction: None,
        confidence: 0.9,
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::SolarSystem;

    fn setup() -> (GestureController, SolarSystem, Viewport) {
        (GestureController::new(), SolarSystem::new(), Viewport::default())
    }

    #[test]
    fn test_indicator_on_every_frame() {
        let (mut ctl, scene, vp) = setup();
        let events = ctl.handle_frame(Some(&pinch_frame(0.02)), scene.targets(), &vp, 0.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, InteractionEvent::IndicatorChanged { gesture: "pinch" })));

        let events = ctl.handle_frame(None, scene.targets(), &vp, 16.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, InteractionEvent::IndicatorChanged { gesture: "none" })));
    }

    #[test]
    fn test_none_gesture_resets_to_defaults() {
        let (mut ctl, scene, vp) = setup();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.4, 0.4)),
            scene.targets(),
            &vp,
            0.0,
        );
        assert!(ctl.state.current_gesture.is_some());
        assert!(ctl.state.last_position.is_some());

        ctl.handle_frame(Some(&GestureFrame::none()), scene.targets(), &vp, 16.0);
        assert_eq!(ctl.state.current_gesture, None);
        assert_eq!(ctl.state.last_position, None);
        assert_eq!(ctl.state.last_hands_seen_ms, None);
    }

    #[test]
    fn test_pinch_without_distance_resets() {
        let (mut ctl, scene, vp) = setup();
        let mut frame = pinch_frame(0.02);
        frame.distance = None;
        let events = ctl.handle_frame(Some(&frame), scene.targets(), &vp, 0.0);
        assert!(events
            .iter()
            .any(|e| matches!(e, InteractionEvent::IndicatorChanged { gesture: "none" })));
        assert_eq!(ctl.state.current_gesture, None);
    }

    #[test]
    fn test_first_rotate_frame_only_seeds() {
        let (mut ctl, scene, vp) = setup();
        let eye = ctl.camera.eye();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.3, 0.3)),
            scene.targets(),
            &vp,
            0.0,
        );
        assert_eq!(ctl.camera.eye(), eye, "first frame must not move the camera");
        assert_eq!(ctl.state.last_position, Some((0.3, 0.3)));

        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.4, 0.3)),
            scene.targets(),
            &vp,
            16.0,
        );
        assert!(ctl.camera.eye().sub(eye).length() > 0.0, "second frame moves");
    }

    #[test]
    fn test_identical_positions_no_movement() {
        let (mut ctl, scene, vp) = setup();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.3, 0.3)),
            scene.targets(),
            &vp,
            0.0,
        );
        let eye = ctl.camera.eye();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.3, 0.3)),
            scene.targets(),
            &vp,
            16.0,
        );
        assert_eq!(ctl.camera.eye(), eye, "zero delta must not move the camera");
    }

    #[test]
    fn test_kind_change_reseeds_position() {
        let (mut ctl, scene, vp) = setup();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.1, 0.1)),
            scene.targets(),
            &vp,
            0.0,
        );
        let pan_before = ctl.camera.target_pan;
        // Far-away position under a new gesture kind: no spurious jump.
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::TwoFingers, 0.9, 0.9)),
            scene.targets(),
            &vp,
            16.0,
        );
        assert_eq!(ctl.camera.target_pan, pan_before);
    }

    #[test]
    fn test_paused_discards_input() {
        let (mut ctl, scene, vp) = setup();
        ctl.pause();
        let events = ctl.handle_frame(Some(&pinch_frame(0.0)), scene.targets(), &vp, 0.0);
        assert!(events.is_empty(), "paused input must produce nothing");
        assert_eq!(ctl.state.current_gesture, None);
        assert_eq!(ctl.camera.target_zoom, ctl.camera.distance);
    }

    #[test]
    fn test_resume_acts_like_first_gesture() {
        let (mut ctl, scene, vp) = setup();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.2, 0.2)),
            scene.targets(),
            &vp,
            0.0,
        );
        ctl.pause();
        ctl.resume();
        assert_eq!(ctl.state.last_position, None, "no leftover position");

        let eye = ctl.camera.eye();
        ctl.handle_frame(
            Some(&positioned_frame(GestureKind::OpenPalm, 0.8, 0.8)),
            scene.targets(),
            &vp,
            100.0,
        );
        assert_eq!(ctl.camera.eye(), eye, "post-resume frame only seeds");
    }

    #[test]
    fn test_point_fires_info_once_per_change() {
        let (mut ctl, mut scene, vp) = setup();
        scene.project_all(ctl.camera.eye(), &vp);
        // Aim at the screen center repeatedly; whatever body resolves,
        // the info event must not repeat.
        let frame = positioned_frame(GestureKind::Point, 0.5, 0.5);
        let first = ctl.handle_frame(Some(&frame), scene.targets(), &vp, 0.0);
        let second = ctl.handle_frame(Some(&frame), scene.targets(), &vp, 16.0);

        let focused = |evs: &[InteractionEvent]| {
            evs.iter()
                .filter(|e| matches!(e, InteractionEvent::TargetFocused { .. }))
                .count()
        };
        if focused(&first) == 1 {
            assert_eq!(focused(&second), 0, "repeat pointing must not re-fire");
        }
    }

    #[test]
    fn test_gesture_kind_roundtrip() {
        for s in ["pinch", "open-palm", "point", "two-fingers"] {
            let kind = GestureKind::from_str(s).expect("should parse");
            assert_eq!(kind.as_str(), s);
        }
        // Source-protocol spellings are accepted too.
        assert_eq!(
            GestureKind::from_str("open_palm"),
            Some(GestureKind::OpenPalm)
        );
        assert_eq!(
            GestureKind::from_str("two_fingers"),
            Some(GestureKind::TwoFingers)
        );
        assert_eq!(GestureKind::from_str("none"), None);
        assert_eq!(GestureKind::from_str("wave"), None);
    }

    #[test]
    fn test_event_sexp() {
        let evt = InteractionEvent::IndicatorChanged { gesture: "pinch" };
        assert!(evt.to_sexp().contains(":gesture \"pinch\""));

        let evt = InteractionEvent::TargetSelected { id: 4, name: "Mars" };
        let sexp = evt.to_sexp();
        assert!(sexp.contains(":event :target-selected"));
        assert!(sexp.contains(":id 4"));
        assert!(sexp.contains(":name \"Mars\""));

        assert_eq!(
            InteractionEvent::HoverEnded.to_sexp(),
            "(:type :event :event :hover-end)"
        );
    }
}
