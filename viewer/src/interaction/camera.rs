//! Camera rig — converts gesture deltas into smoothed orbit/zoom/pan
//! transforms.
//!
//! Smoothing is one lerp step per handled event, not a continuous
//! integrator: event frequency determines convergence speed.  The look-at
//! target is always the world origin.

use tracing::debug;

use crate::scene::Vec3;

// ── Config ──────────────────────────────────────────────────

/// Tunable camera manipulation parameters.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    /// Pinch span producing zero zoom (normalized hand units).
    pub reference_span: f32,
    /// Zoom factors below this magnitude are ignored.
    pub zoom_dead_zone: f32,
    /// Zoom accumulation rate per unit factor.
    pub zoom_speed: f32,
    /// Per-event smoothing factor for camera distance.
    pub zoom_smoothing: f32,
    /// Closest allowed camera distance.
    pub min_zoom: f32,
    /// Farthest allowed camera distance.
    pub max_zoom: f32,
    /// Yaw/pitch accumulation rate per normalized position delta.
    pub rotation_speed: f32,
    /// Per-event, per-axis smoothing factor for the orbit position.
    pub rotation_smoothing: f32,
    /// Pitch clamp magnitude in radians (prevents flipping over the poles).
    pub pitch_limit: f32,
    /// Pan accumulation rate per normalized position delta.
    pub pan_speed: f32,
    /// Per-event smoothing factor for pan offsets.
    pub pan_smoothing: f32,
    /// Position deltas below this magnitude on both axes are jitter.
    pub pan_dead_zone: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            reference_span: 0.05,
            zoom_dead_zone: 0.01,
            zoom_speed: 2.0,
            zoom_smoothing: 0.1,
            min_zoom: 5.0,
            max_zoom: 100.0,
            rotation_speed: 5.0,
            rotation_smoothing: 0.1,
            pitch_limit: std::f32::consts::FRAC_PI_3,
            pan_speed: 40.0,
            pan_smoothing: 0.1,
            pan_dead_zone: 0.001,
        }
    }
}

// ── Rig ─────────────────────────────────────────────────────

/// Camera state: current values plus the smoothing targets the gesture
/// handlers accumulate into.
pub struct CameraRig {
    pub config: CameraConfig,
    /// Current camera distance from the origin.
    pub distance: f32,
    /// Accumulated zoom target.
    pub target_zoom: f32,
    /// Accumulated yaw target in radians.
    pub target_yaw: f32,
    /// Accumulated pitch target in radians.
    pub target_pitch: f32,
    /// Orbit position (camera position before pan offsets), smoothed
    /// per-axis toward the spherical target.
    orbit_pos: Vec3,
    /// Current pan offsets.
    pub pan: (f32, f32),
    /// Accumulated pan target.
    pub target_pan: (f32, f32),
}

/// Linear interpolation helper.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Cartesian position on a sphere of radius `r` at the given yaw/pitch.
fn spherical(yaw: f32, pitch: f32, r: f32) -> Vec3 {
    Vec3::new(
        r * pitch.cos() * yaw.sin(),
        r * pitch.sin(),
        r * pitch.cos() * yaw.cos(),
    )
}

impl CameraRig {
    pub fn new() -> Self {
        let config = CameraConfig::default();
        let distance = 40.0;
        let yaw = 0.6;
        let pitch = 0.35;
        Self {
            config,
            distance,
            target_zoom: distance,
            target_yaw: yaw,
            target_pitch: pitch,
            orbit_pos: spherical(yaw, pitch, distance),
            pan: (0.0, 0.0),
            target_pan: (0.0, 0.0),
        }
    }

    /// Camera eye position: orbit position plus pan offsets.  The view
    /// always re-aims at the world origin, so the eye alone defines it.
    pub fn eye(&self) -> Vec3 {
        self.orbit_pos.add(Vec3::new(self.pan.0, self.pan.1, 0.0))
    }

    /// Handle a pinch span sample.  Returns true if camera state changed.
    pub fn zoom_pinch(&mut self, span: f32) -> bool {
        let factor = 1.0 - span / self.config.reference_span;
        if factor.abs() < self.config.zoom_dead_zone {
            return false;
        }

        self.target_zoom = (self.target_zoom + factor * self.config.zoom_speed)
            .clamp(self.config.min_zoom, self.config.max_zoom);
        self.distance = lerp(self.distance, self.target_zoom, self.config.zoom_smoothing);

        // Keep the orbit position on the new radius without disturbing
        // the rotation smoothing state.
        let dir = self.orbit_pos.normalized();
        if dir.length() > 0.5 {
            self.orbit_pos = dir.scale(self.distance);
        } else {
            self.orbit_pos = spherical(self.target_yaw, self.target_pitch, self.distance);
        }

        debug!(
            "zoom: span={:.3} factor={:.3} target={:.1} current={:.1}",
            span, factor, self.target_zoom, self.distance,
        );
        true
    }

    /// Handle an open-palm position delta.  Returns true if state changed.
    pub fn rotate_palm(&mut self, delta: (f32, f32)) -> bool {
        if delta.0 == 0.0 && delta.1 == 0.0 {
            return false;
        }

        self.target_yaw += delta.0 * self.config.rotation_speed;
        self.target_pitch = (self.target_pitch + delta.1 * self.config.rotation_speed)
            .clamp(-self.config.pitch_limit, self.config.pitch_limit);

        let desired = spherical(self.target_yaw, self.target_pitch, self.distance);
        let s = self.config.rotation_smoothing;
        self.orbit_pos = Vec3::new(
            lerp(self.orbit_pos.x, desired.x, s),
            lerp(self.orbit_pos.y, desired.y, s),
            lerp(self.orbit_pos.z, desired.z, s),
        );
        true
    }

    /// Handle a two-finger position delta.  Returns true if state changed.
    pub fn pan_two_finger(&mut self, delta: (f32, f32)) -> bool {
        if delta.0.abs() < self.config.pan_dead_zone && delta.1.abs() < self.config.pan_dead_zone {
            return false;
        }

        // Y is inverted for natural "push" semantics.
        self.target_pan.0 += delta.0 * self.config.pan_speed;
        self.target_pan.1 -= delta.1 * self.config.pan_speed;

        let s = self.config.pan_smoothing;
        self.pan.0 = lerp(self.pan.0, self.target_pan.0, s);
        self.pan.1 = lerp(self.pan.1, self.target_pan.1, s);
        true
    }

    /// Snap all smoothing targets to the current values so no residual
    /// motion survives a reset or pause boundary.
    pub fn settle(&mut self) {
        self.target_zoom = self.distance;
        self.target_pan = self.pan;
        let len = self.orbit_pos.length();
        if len > 1e-4 {
            self.target_pitch = (self.orbit_pos.y / len).clamp(-1.0, 1.0).asin();
            self.target_yaw = self.orbit_pos.x.atan2(self.orbit_pos.z);
        }
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let eye = self.eye();
        format!(
            "(:distance {:.1} :target-zoom {:.1} :yaw {:.3} :pitch {:.3} :pan ({:.2} {:.2}) :eye ({:.1} {:.1} {:.1}))",
            self.distance,
            self.target_zoom,
            self.target_yaw,
            self.target_pitch,
            self.pan.0,
            self.pan.1,
            eye.x,
            eye.y,
            eye.z,
        )
    }

    /// Generate s-expression for IPC config.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:reference-span {:.3} :zoom-dead-zone {:.3} :zoom-speed {:.1} :zoom-smoothing {:.2} :min-zoom {:.0} :max-zoom {:.0} :rotation-speed {:.1} :rotation-smoothing {:.2} :pitch-limit {:.3} :pan-speed {:.1} :pan-smoothing {:.2} :pan-dead-zone {:.3})",
            self.config.reference_span,
            self.config.zoom_dead_zone,
            self.config.zoom_speed,
            self.config.zoom_smoothing,
            self.config.min_zoom,
            self.config.max_zoom,
            self.config.rotation_speed,
            self.config.rotation_smoothing,
            self.config.pitch_limit,
            self.config.pan_speed,
            self.config.pan_smoothing,
            self.config.pan_dead_zone,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────
