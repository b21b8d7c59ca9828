//! Raw hand-landmark frames — the 21-point hand model delivered by the
//! external tracking collaborator.
//!
//! Consumed by the gesture classifier and, when a frame carries no
//! explicit gesture position, as the overlay cursor fallback.

use tracing::debug;

// ── Landmark definitions ────────────────────────────────────

/// The 21 hand landmarks of the standard hand model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandLandmark {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexMcp,
    IndexPip,
    IndexDip,
    IndexTip,
    MiddleMcp,
    MiddlePip,
    MiddleDip,
    MiddleTip,
    RingMcp,
    RingPip,
    RingDip,
    RingTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

/// Total number of landmarks per hand.
pub const LANDMARK_COUNT: usize = 21;

impl HandLandmark {
    /// Convert landmark enum to array index (0-20).
    pub fn index(&self) -> usize {
        *self as usize
    }
}

// ── Frames ──────────────────────────────────────────────────

/// One landmark point in normalized image coordinates ([0,1]² with a
/// relative depth z).
#[derive(Debug, Clone, Copy, Default)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One hand's landmark set for a single input frame.
#[derive(Debug, Clone)]
pub struct HandFrame {
    /// 21 points indexed by `HandLandmark`.
    pub landmarks: Vec<Landmark>,
    /// Tracking confidence in [0,1].
    pub confidence: f32,
}

impl HandFrame {
    /// Build a frame, rejecting malformed landmark sets.
    pub fn new(landmarks: Vec<Landmark>, confidence: f32) -> Option<Self> {
        if landmarks.len() != LANDMARK_COUNT {
            debug!(
                "hand frame rejected: expected {} landmarks, got {}",
                LANDMARK_COUNT,
                landmarks.len(),
            );
            return None;
        }
        Some(Self {
            landmarks,
            confidence,
        })
    }

    pub fn point(&self, lm: HandLandmark) -> Landmark {
        self.landmarks[lm.index()]
    }

    /// Euclidean distance between two landmarks (normalized units).
    pub fn distance(&self, a: HandLandmark, b: HandLandmark) -> f32 {
        let pa = self.point(a);
        let pb = self.point(b);
        let dx = pb.x - pa.x;
        let dy = pb.y - pa.y;
        let dz = pb.z - pa.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Index fingertip position — the overlay cursor fallback.
    pub fn index_tip(&self) -> (f32, f32) {
        let p = self.point(HandLandmark::IndexTip);
        (p.x, p.y)
    }
}

// ── Test helpers ────────────────────────────────────────────

/// A frame with every landmark at the same spot.
#[cfg(test)]
pub(crate) fn flat_frame(x: f32, y: f32) -> HandFrame {
    HandFrame::new(
        (0..LANDMARK_COUNT)
            .map(|_| Landmark { x, y, z: 0.0 })
            .collect(),
        0.9,
    )
    .expect("valid frame")
}

// ── Tests ───────────────────────────────────────────────────
