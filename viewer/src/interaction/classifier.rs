//! Gesture classification from raw hand landmarks.
//!
//! Detects pinch, open palm, point, and two-finger poses from fingertip
//! geometry, with a confidence accumulator that damps single-frame
//! flicker.  Point is checked before pinch so a pointing hand with the
//! thumb nearby never registers as a pinch.

use tracing::debug;

use super::gesture::{GestureFrame, GestureKind};
use super::landmarks::{HandFrame, HandLandmark};
use crate::scene::Vec3;

// ── Config ──────────────────────────────────────────────────

/// Classification thresholds.
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Thumb-to-index distance below which the pose is a pinch
    /// (normalized units).
    pub pinch_threshold: f32,
    /// Minimum accumulated confidence before a gesture is reported.
    pub min_confidence: f32,
    /// Confidence gained per frame the same gesture repeats.
    pub confidence_increment: f32,
    /// Confidence lost per frame the gesture changes.
    pub confidence_decrement: f32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            pinch_threshold: 0.05,
            min_confidence: 0.2,
            confidence_increment: 0.15,
            confidence_decrement: 0.15,
        }
    }
}

// ── Finger states ───────────────────────────────────────────

/// Which fingers are extended.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingersUp {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingersUp {
    pub fn extended_count(&self) -> u32 {
        [self.thumb, self.index, self.middle, self.ring, self.pinky]
            .iter()
            .filter(|&&b| b)
            .count() as u32
    }
}

/// Detect extended fingers from landmark geometry: a finger is up when
/// its tip sits above its PIP joint (image y grows downward); the thumb
/// compares along x against its IP joint.
pub fn detect_fingers_up(hand: &HandFrame) -> FingersUp {
    let up = |tip: HandLandmark, pip: HandLandmark| hand.point(tip).y < hand.point(pip).y;
    FingersUp {
        thumb: hand.point(HandLandmark::ThumbTip).x > hand.point(HandLandmark::ThumbIp).x,
        index: up(HandLandmark::IndexTip, HandLandmark::IndexPip),
        middle: up(HandLandmark::MiddleTip, HandLandmark::MiddlePip),
        ring: up(HandLandmark::RingTip, HandLandmark::RingPip),
        pinky: up(HandLandmark::PinkyTip, HandLandmark::PinkyPip),
    }
}

// ── Classifier ──────────────────────────────────────────────

/// Stateful landmark-to-gesture classifier.
pub struct GestureClassifier {
    pub config: ClassifierConfig,
    /// Gesture kind seen on the previous frame.
    last_kind: Option<GestureKind>,
    /// Accumulated confidence in the current gesture.
    confidence: f32,
}

impl GestureClassifier {
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::default(),
            last_kind: None,
            confidence: 0.0,
        }
    }

    /// Classify one hand frame into a gesture frame.
    ///
    /// Low-confidence classifications degrade to a `none` frame rather
    /// than flickering between gestures.
    pub fn classify(&mut self, hand: &HandFrame) -> GestureFrame {
        let fingers = detect_fingers_up(hand);
        let raw = self.classify_pose(hand, &fingers);
        let kind = raw.as_ref().and_then(|f| f.kind);

        // Confidence builds while the same gesture repeats and decays on
        // change.
        if kind.is_some() && kind == self.last_kind {
            self.confidence = (self.confidence + self.config.confidence_increment).min(1.0);
        } else {
            self.confidence = (self.confidence - self.config.confidence_decrement).max(0.0);
            self.last_kind = kind;
        }

        match raw {
            Some(mut frame) if frame.kind.is_some() => {
                if self.confidence >= self.config.min_confidence {
                    frame.confidence = self.confidence;
                    frame
                } else {
                    debug!(
                        "gesture {:?} below confidence floor ({:.2})",
                        frame.kind, self.confidence,
                    );
                    GestureFrame::none()
                }
            }
            _ => GestureFrame::none(),
        }
    }

    /// Single-frame pose classification, priority point -> pinch ->
    /// two-fingers -> open-palm.
    fn classify_pose(&self, hand: &HandFrame, fingers: &FingersUp) -> Option<GestureFrame> {
        let thumb_tip = hand.point(HandLandmark::ThumbTip);
        let index_tip = hand.point(HandLandmark::IndexTip);
        let middle_tip = hand.point(HandLandmark::MiddleTip);
        let index_mcp = hand.point(HandLandmark::IndexMcp);
        let thumb_index = hand.distance(HandLandmark::ThumbTip, HandLandmark::IndexTip);

        // Point: only the index is up, and the thumb is not pinching.
        if fingers.index
            && !fingers.middle
            && !fingers.ring
            && !fingers.pinky
            && thumb_index >= self.config.pinch_threshold
        {
            return Some(GestureFrame {
                kind: Some(GestureKind::Point),
                position: Some((index_tip.x, index_tip.y)),
                distance: None,
                direction: Some(Vec3::new(
                    index_tip.x - index_mcp.x,
                    index_tip.y - index_mcp.y,
                    index_tip.z - index_mcp.z,
                )),
                confidence: 0.0,
            });
        }

        // Pinch: thumb and index tips together.
        if thumb_index < self.config.pinch_threshold {
            return Some(GestureFrame {
                kind: Some(GestureKind::Pinch),
                position: Some((
                    (thumb_tip.x + index_tip.x) / 2.0,
                    (thumb_tip.y + index_tip.y) / 2.0,
                )),
                distance: Some(thumb_index),
                direction: None,
                confidence: 0.0,
            });
        }

        // Two fingers: index and middle up, ring and pinky down.
        if fingers.index && fingers.middle && !fingers.ring && !fingers.pinky {
            return Some(GestureFrame {
                kind: Some(GestureKind::TwoFingers),
                position: Some((
                    (index_tip.x + middle_tip.x) / 2.0,
                    (index_tip.y + middle_tip.y) / 2.0,
                )),
                distance: Some(hand.distance(HandLandmark::IndexTip, HandLandmark::MiddleTip)),
                direction: None,
                confidence: 0.0,
            });
        }

        // Open palm: four or more fingers extended.
        if fingers.extended_count() >= 4 {
            let palm: Vec<_> = (0..5).map(|i| hand.landmarks[i]).collect();
            let cx = palm.iter().map(|p| p.x).sum::<f32>() / palm.len() as f32;
            let cy = palm.iter().map(|p| p.y).sum::<f32>() / palm.len() as f32;
            return Some(GestureFrame {
                kind: Some(GestureKind::OpenPalm),
                position: Some((cx, cy)),
                distance: None,
                direction: None,
                confidence: 0.0,
            });
        }

        None
    }

    /// Reset the confidence accumulator.
    pub fn reset(&mut self) {
        self.last_kind = None;
        self.confidence = 0.0;
    }

    /// Generate s-expression for IPC status.
    pub fn status_sexp(&self) -> String {
        let kind = self
            .last_kind
            .map(|k| k.as_str())
            .unwrap_or("none");
        format!(
            "(:last \"{}\" :confidence {:.2} :pinch-threshold {:.3})",
            kind, self.confidence, self.config.pinch_threshold,
        )
    }
}

// ── Test helpers ────────────────────────────────────────────

#[cfg(test)]
fn set(hand: &mut HandFrame, lm: HandLandmark, x: f32, y: f32) {
    hand.landmarks[lm.index()] = super::landmarks::Landmark { x, y, z: 0.0 };
}

/// All fingers folded: every landmark at (0.5, 0.5).
#[cfg(test)]
fn folded_hand() -> HandFrame {
    super::landmarks::flat_frame(0.5, 0.5)
}

/// Raise a finger by moving its tip above its PIP joint.
#[cfg(test)]
fn raise(hand: &mut HandFrame, tip: HandLandmark, x: f32) {
    set(hand, tip, x, 0.2);
}

// ── Tests ───────────────────────────────────────────────────
