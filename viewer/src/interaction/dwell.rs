//! Dwell activation engine — cursor-over-target proximity plus a hold
//! timer that confirms a selection.
//!
//! The machine is advanced by the frame tick with an injected `dt_ms`
//! rather than scheduled callbacks, so cancellation is a plain state
//! transition and an old timer can never fire after a new activation.
//! Anchors are rebuilt from the live registry every tick, which is what
//! re-validates a completing target before the selection event is emitted.

use tracing::{debug, info};

use super::gesture::InteractionEvent;

// ── Config ──────────────────────────────────────────────────

/// Dwell detection thresholds.
#[derive(Debug, Clone)]
pub struct DwellConfig {
    /// Maximum cursor-to-anchor distance in pixels.
    pub threshold_px: f32,
    /// Milliseconds of sustained hover required to confirm a selection.
    pub dwell_ms: f64,
}

impl Default for DwellConfig {
    fn default() -> Self {
        Self {
            threshold_px: 50.0,
            dwell_ms: 2000.0,
        }
    }
}

// ── Anchors ─────────────────────────────────────────────────

/// A selectable target's screen-space anchor for this tick.  Only
/// front-facing targets are anchored, so a body that moved behind the
/// camera drops out of resolution automatically.
#[derive(Debug, Clone, Copy)]
pub struct OverlayAnchor {
    pub id: u64,
    pub name: &'static str,
    pub x: f32,
    pub y: f32,
}

// ── State machine ───────────────────────────────────────────

/// Dwell session state.  At most one session exists; switching targets
/// replaces it synchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum DwellState {
    /// No active session.
    Idle,
    /// Cursor is holding over a target, accumulating time.
    Activating { target_id: u64, elapsed_ms: f64 },
}

/// The dwell activation engine.
pub struct DwellEngine {
    pub config: DwellConfig,
    pub state: DwellState,
    /// Target carrying the visual "selected" mark.  Persists after a
    /// completed dwell until the cursor moves on.
    pub active_target: Option<u64>,
}

impl DwellEngine {
    pub fn new() -> Self {
        Self {
            config: DwellConfig::default(),
            state: DwellState::Idle,
            active_target: None,
        }
    }

    /// Resolve the cursor to the nearest anchor within the threshold.
    fn resolve<'a>(
        &self,
        cursor: (f32, f32),
        anchors: &'a [OverlayAnchor],
    ) -> Option<&'a OverlayAnchor> {
        let mut nearest: Option<(f32, &OverlayAnchor)> = None;
        for anchor in anchors {
            let dx = anchor.x - cursor.0;
            let dy = anchor.y - cursor.1;
            let dist = (dx * dx + dy * dy).sqrt();
            if dist < self.config.threshold_px
                && nearest.map_or(true, |(nd, _)| dist < nd)
            {
                nearest = Some((dist, anchor));
            }
        }
        nearest.map(|(_, a)| a)
    }

    /// Advance the machine by one tick.
    pub fn update(
        &mut self,
        cursor: Option<(f32, f32)>,
        anchors: &[OverlayAnchor],
        dt_ms: f64,
    ) -> Vec<InteractionEvent> {
        let resolved = cursor.and_then(|c| self.resolve(c, anchors));

        match (self.state.clone(), resolved) {
            (DwellState::Idle, None) => {
                // Cursor left everything: the lingering selected mark
                // clears without an event.
                self.active_target = None;
                Vec::new()
            }

            (DwellState::Idle, Some(anchor)) => {
                if self.active_target == Some(anchor.id) {
                    // Still hovering the target that was just selected;
                    // no re-activation until the cursor leaves it.
                    return Vec::new();
                }
                self.active_target = None;
                self.state = DwellState::Activating {
                    target_id: anchor.id,
                    elapsed_ms: 0.0,
                };
                debug!("dwell started on {} ({})", anchor.name, anchor.id);
                vec![InteractionEvent::DwellStarted {
                    id: anchor.id,
                    name: anchor.name,
                }]
            }

            (
                DwellState::Activating {
                    target_id,
                    elapsed_ms,
                },
                Some(anchor),
            ) if anchor.id == target_id => {
                let elapsed = elapsed_ms + dt_ms;
                if elapsed >= self.config.dwell_ms {
                    self.state = DwellState::Idle;
                    self.active_target = Some(target_id);
                    info!("dwell selection confirmed: {} ({})", anchor.name, target_id);
                    vec![InteractionEvent::TargetSelected {
                        id: target_id,
                        name: anchor.name,
                    }]
                } else {
                    self.state = DwellState::Activating {
                        target_id,
                        elapsed_ms: elapsed,
                    };
                    vec![InteractionEvent::DwellProgress {
                        id: target_id,
                        elapsed_ms: elapsed,
                        threshold_ms: self.config.dwell_ms,
                    }]
                }
            }

            (DwellState::Activating { target_id, .. }, Some(anchor)) => {
                // Target switch: the old session is replaced before the
                // new timer starts — never two concurrent timers.
                debug!(
                    "dwell switched from {} to {} ({})",
                    target_id, anchor.name, anchor.id
                );
                self.active_target = None;
                self.state = DwellState::Activating {
                    target_id: anchor.id,
                    elapsed_ms: 0.0,
                };
                vec![InteractionEvent::DwellStarted {
                    id: anchor.id,
                    name: anchor.name,
                }]
            }

            (DwellState::Activating { target_id, .. }, None) => {
                debug!("dwell cancelled on {}", target_id);
                self.state = DwellState::Idle;
                vec![InteractionEvent::HoverEnded]
            }
        }
    }

    /// Drop any in-flight session and the selected mark.
    pub fn reset(&mut self) {
        self.state = DwellState::Idle;
        self.active_target = None;
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let state = match &self.state {
            DwellState::Idle => "idle".to_string(),
            DwellState::Activating {
                target_id,
                elapsed_ms,
            } => format!("activating-{}-{:.0}ms", target_id, elapsed_ms),
        };
        let active = self
            .active_target
            .map(|id| id.to_string())
            .unwrap_or_else(|| "nil".to_string());
        format!("(:state {} :active {})", state, active)
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:threshold-px {:.0} :dwell-ms {:.0})",
            self.config.threshold_px, self.config.dwell_ms,
        )
    }
}

// ── Test helpers ────────────────────────────────────────────

#[cfg(test)]
fn anchor(id: u64, name: &'static str, x: f32, y: f32) -> OverlayAnchor {
    OverlayAnchor { id, name, x, y }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_continuous_dwell_selects_exactly_once() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        let cursor = Some((110.0, 100.0));

        let mut selections = 0;
        // 150 ticks at 16ms = 2400ms of continuous hover.
        for _ in 0..150 {
            for evt in eng.update(cursor, &anchors, 16.0) {
                if matches!(evt, InteractionEvent::TargetSelected { id: 1, .. }) {
                    selections += 1;
                }
            }
        }
        assert_eq!(selections, 1, "exactly one selection event must fire");
        assert_eq!(eng.active_target, Some(1));
        assert_eq!(eng.state, DwellState::Idle);
    }

    #[test]
    fn test_switch_before_threshold_restarts_timer() {
        let mut eng = DwellEngine::new();
        let anchors = [
            anchor(1, "Earth", 100.0, 100.0),
            anchor(2, "Mars", 500.0, 100.0),
        ];

        // Hover A for 1900ms.
        eng.update(Some((100.0, 100.0)), &anchors, 0.0);
        let evts = eng.update(Some((100.0, 100.0)), &anchors, 1900.0);
        assert!(
            evts.iter()
                .all(|e| !matches!(e, InteractionEvent::TargetSelected { .. })),
            "A must not be selected at 1900ms",
        );

        // Switch to B: fresh session.
        let evts = eng.update(Some((500.0, 100.0)), &anchors, 16.0);
        assert!(
            matches!(evts[..], [InteractionEvent::DwellStarted { id: 2, .. }]),
            "switch must start a fresh session: {:?}",
            evts,
        );

        // 1900ms on B: still nothing (timer restarted).
        let evts = eng.update(Some((500.0, 100.0)), &anchors, 1900.0);
        assert!(evts
            .iter()
            .all(|e| !matches!(e, InteractionEvent::TargetSelected { .. })));

        // 200ms more completes B, never A.
        let evts = eng.update(Some((500.0, 100.0)), &anchors, 200.0);
        assert!(
            matches!(evts[..], [InteractionEvent::TargetSelected { id: 2, .. }]),
            "B should select: {:?}",
            evts,
        );
    }

    #[test]
    fn test_exit_emits_hover_end() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];

        eng.update(Some((100.0, 100.0)), &anchors, 0.0);
        eng.update(Some((100.0, 100.0)), &anchors, 500.0);

        let evts = eng.update(Some((900.0, 900.0)), &anchors, 16.0);
        assert!(matches!(evts[..], [InteractionEvent::HoverEnded]));
        assert_eq!(eng.state, DwellState::Idle);
    }

    #[test]
    fn test_threshold_gates_resolution() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];

        // 60px away: outside the 50px threshold, nothing starts.
        let evts = eng.update(Some((160.0, 100.0)), &anchors, 16.0);
        assert!(evts.is_empty());
        assert_eq!(eng.state, DwellState::Idle);

        // 40px away: inside.
        let evts = eng.update(Some((140.0, 100.0)), &anchors, 16.0);
        assert!(matches!(evts[..], [InteractionEvent::DwellStarted { id: 1, .. }]));
    }

    #[test]
    fn test_nearest_candidate_wins() {
        let mut eng = DwellEngine::new();
        let anchors = [
            anchor(1, "Earth", 100.0, 100.0),
            anchor(2, "Mars", 130.0, 100.0),
        ];
        // Cursor at 120: both within threshold, Mars is closer.
        let evts = eng.update(Some((120.0, 100.0)), &anchors, 16.0);
        assert!(
            matches!(evts[..], [InteractionEvent::DwellStarted { id: 2, .. }]),
            "nearest anchor must win: {:?}",
            evts,
        );
    }

    #[test]
    fn test_no_reactivation_while_hovering_selected() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        let cursor = Some((100.0, 100.0));

        eng.update(cursor, &anchors, 0.0);
        eng.update(cursor, &anchors, 2500.0); // selects
        assert_eq!(eng.active_target, Some(1));

        // Staying put must not start a second session.
        let evts = eng.update(cursor, &anchors, 500.0);
        assert!(evts.is_empty(), "no re-activation while mark persists");

        // Leave, then return: a fresh dwell is allowed.
        eng.update(Some((900.0, 900.0)), &anchors, 16.0);
        assert_eq!(eng.active_target, None, "mark clears once cursor leaves");
        let evts = eng.update(cursor, &anchors, 16.0);
        assert!(matches!(evts[..], [InteractionEvent::DwellStarted { id: 1, .. }]));
    }

    #[test]
    fn test_progress_events_report_elapsed() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        eng.update(Some((100.0, 100.0)), &anchors, 0.0);

        let evts = eng.update(Some((100.0, 100.0)), &anchors, 500.0);
        match &evts[..] {
            [InteractionEvent::DwellProgress {
                id: 1,
                elapsed_ms,
                threshold_ms,
            }] => {
                assert!((elapsed_ms - 500.0).abs() < 1e-9);
                assert!((threshold_ms - 2000.0).abs() < 1e-9);
            }
            other => panic!("expected progress event, got {:?}", other),
        }
    }

    #[test]
    fn test_no_cursor_is_inert() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        let evts = eng.update(None, &anchors, 16.0);
        assert!(evts.is_empty());
        assert_eq!(eng.state, DwellState::Idle);
    }

    #[test]
    fn test_empty_anchor_list_cancels() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        eng.update(Some((100.0, 100.0)), &anchors, 0.0);

        // Target dropped out of the registry (e.g. moved behind the
        // camera): the session cancels instead of completing.
        let evts = eng.update(Some((100.0, 100.0)), &[], 3000.0);
        assert!(matches!(evts[..], [InteractionEvent::HoverEnded]));
    }

    #[test]
    fn test_reset() {
        let mut eng = DwellEngine::new();
        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        eng.update(Some((100.0, 100.0)), &anchors, 0.0);
        eng.update(Some((100.0, 100.0)), &anchors, 2500.0);
        eng.reset();
        assert_eq!(eng.state, DwellState::Idle);
        assert_eq!(eng.active_target, None);
    }

    #[test]
    fn test_status_sexp() {
        let mut eng = DwellEngine::new();
        assert!(eng.status_sexp().contains(":state idle"));

        let anchors = [anchor(1, "Earth", 100.0, 100.0)];
        eng.update(Some((100.0, 100.0)), &anchors, 0.0);
        eng.update(Some((100.0, 100.0)), &anchors, 300.0);
        let sexp = eng.status_sexp();
        assert!(sexp.contains("activating-1-300ms"), "{}", sexp);
    }
}
