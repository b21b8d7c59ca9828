//! Viewer state — the central struct owning every subsystem.
//!
//! Single-owner pattern: one `ViewerState` holds the scene, the gesture
//! controller, the overlay, and the IPC server, and is passed as `&mut`
//! to every handler.  All mutation happens on one event loop.

use std::time::Instant;

use tracing::info;

use crate::interaction::classifier::GestureClassifier;
use crate::interaction::gesture::{GestureController, GestureFrame, InteractionEvent};
use crate::interaction::landmarks::HandFrame;
use crate::interaction::overlay::OverlayState;
use crate::ipc::IpcServer;
use crate::scene::{SolarSystem, Viewport};
use crate::timing::TickTiming;

/// Central viewer state.
pub struct ViewerState {
    pub scene: SolarSystem,
    pub viewport: Viewport,
    pub controller: GestureController,
    pub overlay: OverlayState,
    pub classifier: GestureClassifier,
    pub timing: TickTiming,

    // IPC
    pub ipc_server: IpcServer,
    /// Event s-expressions queued for broadcast this loop iteration.
    pub pending_events: Vec<String>,

    /// Monotonic session clock in milliseconds, advanced by the tick.
    pub clock_ms: f64,

    // Shutdown flag
    pub running: bool,
}

impl ViewerState {
    pub fn new(ipc_socket_path: std::path::PathBuf, viewport: Viewport) -> Self {
        info!("ViewerState initialized");
        Self {
            scene: SolarSystem::new(),
            viewport,
            controller: GestureController::new(),
            overlay: OverlayState::new(),
            classifier: GestureClassifier::new(),
            timing: TickTiming::default(),
            ipc_server: IpcServer::new(ipc_socket_path),
            pending_events: Vec::new(),
            clock_ms: 0.0,
            running: true,
        }
    }

    /// Handle a pre-classified gesture frame from the input feed.
    pub fn handle_gesture_frame(&mut self, frame: Option<GestureFrame>) {
        if self.controller.state.paused {
            return;
        }

        // Overlay cursor follows the gesture position; a missing or
        // `none` frame drops it so dwell sessions cancel.
        match frame.as_ref().and_then(|f| f.kind.and(f.position)) {
            Some(pos) => self.overlay.set_cursor(Some(pos)),
            None => self.overlay.set_cursor(None),
        }

        let events = self.controller.handle_frame(
            frame.as_ref(),
            self.scene.targets(),
            &self.viewport,
            self.clock_ms,
        );
        self.queue_events(events);
    }

    /// Handle a raw landmark frame: classify it, then run it through the
    /// same dispatch path.  The index fingertip serves as the overlay
    /// cursor when the classified gesture carries no position.
    pub fn handle_hand_frame(&mut self, hand: HandFrame) {
        if self.controller.state.paused {
            return;
        }

        let frame = self.classifier.classify(&hand);
        let cursor = frame.position.or_else(|| Some(hand.index_tip()));
        self.overlay.set_cursor(cursor);

        let events = self.controller.handle_frame(
            Some(&frame),
            self.scene.targets(),
            &self.viewport,
            self.clock_ms,
        );
        self.queue_events(events);
    }

    /// Advance the session by one tick of `dt_ms` wall time.
    pub fn tick(&mut self, dt_ms: f64) {
        let started = Instant::now();

        self.clock_ms += dt_ms;
        self.scene.tick(dt_ms);

        let eye = self.controller.camera.eye();
        self.scene.project_all(eye, &self.viewport);

        let events = self
            .overlay
            .tick(self.scene.targets(), &self.viewport, dt_ms);
        self.queue_events(events);

        let work_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.timing.record(work_ms, dt_ms);
        if let Some(evt) = self.timing.take_performance_event() {
            self.pending_events.push(evt);
        }
    }

    /// Pause the interaction state machine (modal UI opened).  Any
    /// in-flight dwell session cancels immediately.
    pub fn pause(&mut self) {
        self.controller.pause();
        self.overlay.reset();
    }

    /// Resume after a modal close; interaction state is force-reset.
    pub fn resume(&mut self) {
        self.controller.resume();
    }

    /// Full reset: interaction, selection, dwell, classifier.
    pub fn reset(&mut self) {
        info!("session reset");
        self.controller.reset_interaction();
        self.controller.selection.reset();
        self.overlay.reset();
        self.classifier.reset();
    }

    fn queue_events(&mut self, events: Vec<InteractionEvent>) {
        for evt in events {
            self.pending_events.push(evt.to_sexp());
        }
    }

    /// Take the queued broadcast payloads.
    pub fn take_pending_events(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_events)
    }

    /// Generate aggregate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        format!(
            "(:clock-ms {:.0} :scene {} :camera {} :gesture {} :overlay {})",
            self.clock_ms,
            self.scene.status_sexp(),
            self.controller.camera.status_sexp(),
            self.controller.status_sexp(),
            self.overlay.status_sexp(),
        )
    }
}

// ── Tests ───────────────────────────────────────────────────
