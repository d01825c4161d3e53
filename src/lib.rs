#![doc = include_str!("../README.md")]

// Public modules (stable-ish surface)
pub mod detector;
pub mod image;
pub mod types;

// “Expert” modules – still public, but considered unstable internals.
// (You can tighten or feature-gate these later.)
pub mod filter;

// Internal pipeline stages.
mod geometry;
mod link;
mod overlap;
mod position;
mod width;

// --- High-level re-exports -------------------------------------------------

// Main entry points: detector + results.
pub use crate::detector::{OverlapMode, ParamError, RidgeDetector, RidgeMode, RidgeParams};
pub use crate::types::{Junction, Line, LineClass, LineId, RidgeResult};

// --- Prelude ---------------------------------------------------------------

/// Small prelude for quick experiments.
///
/// ```no_run
/// use ridge_detector::prelude::*;
///
/// # fn main() {
/// let (w, h) = (640usize, 480usize);
/// let gray = vec![0.0f32; w * h];
/// let img = ImageF32::from_vec(w, h, gray);
///
/// let mut det = RidgeDetector::new(RidgeParams {
///     sigma: 1.5,
///     low: 3.0,
///     high: 8.0,
///     ..Default::default()
/// });
///
/// let res = det.detect(&img).unwrap();
/// println!("lines={} latency_ms={:.3}", res.lines.len(), res.latency_ms);
/// # }
/// ```
pub mod prelude {
    pub use crate::image::{ImageF32, ImageU8};
    pub use crate::{RidgeDetector, RidgeParams, RidgeResult};
}
