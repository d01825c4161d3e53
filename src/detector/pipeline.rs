//! Detection pipeline tying the stages together:
//! - Gaussian derivative filtering and ridge point localization
//! - hysteresis linking into lines with raw junction records
//! - optional width estimation and bias correction
//! - junction reconstruction and optional overlap resolution
//! - length pruning

use std::time::Instant;

use log::debug;

use crate::filter::derivatives;
use crate::image::ImageF32;
use crate::link::compute_contours;
use crate::overlap::resolve_slope_overlap;
use crate::position::compute_line_points;
use crate::types::{LineIdGen, RidgeResult};
use crate::width::compute_line_width;

use super::params::{OverlapMode, ParamError, RidgeParams};
use super::reconstruct::{prune_lines, reconstruct};

/// Stateful line detector.
///
/// The detector owns the line id generator, so ids stay unique across
/// consecutive frames processed by the same instance. Call [`reset_ids`]
/// between unrelated runs to make numbering reproducible.
///
/// [`reset_ids`]: RidgeDetector::reset_ids
pub struct RidgeDetector {
    pub params: RidgeParams,
    ids: LineIdGen,
}

impl RidgeDetector {
    pub fn new(params: RidgeParams) -> Self {
        Self {
            params,
            ids: LineIdGen::new(),
        }
    }

    /// Detect lines in a single image, tagged as frame 0.
    pub fn detect(&mut self, image: &ImageF32) -> Result<RidgeResult, ParamError> {
        self.detect_frame(image, 0)
    }

    /// Detect lines in one frame of a sequence.
    pub fn detect_frame(
        &mut self,
        image: &ImageF32,
        frame: i32,
    ) -> Result<RidgeResult, ParamError> {
        let started = Instant::now();
        let p = self.params;
        p.validate(image.w, image.h)?;

        let deriv = derivatives(image, p.sigma);
        let grid = compute_line_points(&deriv, p.low, p.high, p.mode);
        let linked = compute_contours(
            &grid,
            &deriv.r,
            &deriv.c,
            p.sigma,
            p.extend_lines,
            p.mode,
            &mut self.ids,
        );
        let mut lines = linked.lines;
        if p.estimate_width {
            compute_line_width(&mut lines, &deriv, p.sigma, p.correct_position, p.mode);
        }
        let mut junctions = reconstruct(&mut lines, linked.junctions, &mut self.ids);
        if p.overlap == OverlapMode::Slope {
            lines = resolve_slope_overlap(lines, &mut junctions, &mut self.ids);
        }
        if p.min_length != 0.0 || p.max_length != 0.0 {
            prune_lines(&mut lines, &mut junctions, p.min_length, p.max_length);
        }
        for line in lines.iter_mut() {
            line.frame = frame;
        }

        let latency_ms = started.elapsed().as_secs_f64() * 1e3;
        debug!(
            "frame {frame}: {} lines, {} junctions in {latency_ms:.2} ms",
            lines.len(),
            junctions.len()
        );
        Ok(RidgeResult {
            frame,
            lines,
            junctions,
            latency_ms,
        })
    }

    /// Restart line numbering from zero.
    pub fn reset_ids(&mut self) {
        self.ids.reset();
    }
}
