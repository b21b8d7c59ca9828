//! Interaction subsystem — gesture dispatch, camera manipulation,
//! selection, and dwell activation.
//!
//! Provides:
//! - `gesture`: frame dispatch state machine and the event vocabulary
//! - `camera`: smoothed zoom/orbit/pan rig
//! - `picking`: ray picking with hit-volumes and a nearest-ray fallback
//! - `dwell`: cursor dwell activation state machine
//! - `overlay`: 2D overlay anchors and cursor plumbing
//! - `landmarks` / `classifier`: raw-landmark input path

pub mod camera;
pub mod classifier;
pub mod dwell;
pub mod gesture;
pub mod landmarks;
pub mod overlay;
pub mod picking;
