//! 2D overlay — keeps screen anchors synchronized to 3D body positions
//! and feeds the cursor to the dwell engine.
//!
//! The cursor arrives in normalized [0,1]² coordinates (gesture position,
//! or the index fingertip as fallback) and is converted to viewport
//! pixels here, where the dwell proximity threshold is defined.

use super::dwell::{DwellEngine, OverlayAnchor};
use super::gesture::InteractionEvent;
use crate::scene::{Body, Viewport};

/// Overlay cursor and activation state.
pub struct OverlayState {
    /// Latest cursor position, normalized to [0,1]².
    cursor: Option<(f32, f32)>,
    pub dwell: DwellEngine,
}

impl OverlayState {
    pub fn new() -> Self {
        Self {
            cursor: None,
            dwell: DwellEngine::new(),
        }
    }

    /// Replace the cursor position (None when tracking is lost).
    pub fn set_cursor(&mut self, normalized: Option<(f32, f32)>) {
        self.cursor = normalized;
    }

    pub fn cursor(&self) -> Option<(f32, f32)> {
        self.cursor
    }

    /// Build this tick's anchors from the live registry.  Bodies behind
    /// the camera carry no anchor and therefore cannot be dwelled on.
    fn anchors(bodies: &[Body]) -> Vec<OverlayAnchor> {
        bodies
            .iter()
            .filter_map(|body| {
                body.screen.as_ref().and_then(|p| {
                    if p.behind {
                        None
                    } else {
                        Some(OverlayAnchor {
                            id: body.id,
                            name: body.name,
                            x: p.x,
                            y: p.y,
                        })
                    }
                })
            })
            .collect()
    }

    /// Advance the dwell engine by one tick.
    pub fn tick(
        &mut self,
        bodies: &[Body],
        viewport: &Viewport,
        dt_ms: f64,
    ) -> Vec<InteractionEvent> {
        let anchors = Self::anchors(bodies);
        let cursor_px = self
            .cursor
            .map(|(nx, ny)| (nx * viewport.width, ny * viewport.height));
        self.dwell.update(cursor_px, &anchors, dt_ms)
    }

    /// Drop the cursor and any in-flight dwell session.
    pub fn reset(&mut self) {
        self.cursor = None;
        self.dwell.reset();
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let cursor = self
            .cursor
            .map(|(x, y)| format!("({:.3} {:.3})", x, y))
            .unwrap_or_else(|| "nil".to_string());
        format!("(:cursor {} :dwell {})", cursor, self.dwell.status_sexp())
    }
}

// ── Tests ───────────────────────────────────────────────────
