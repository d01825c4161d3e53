//! Result types shared across the pipeline stages.

use serde::Serialize;

/// Stable identity of a detected line.
///
/// Assigned once at creation by [`LineIdGen`] and never reused within a run.
/// Junctions reference lines through this id so the references survive the
/// splitting and merging the later stages perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct LineId(pub u32);

/// Monotonic id generator owned by the detector.
#[derive(Clone, Debug, Default)]
pub struct LineIdGen {
    next: u32,
}

impl LineIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> LineId {
        let id = LineId(self.next);
        self.next += 1;
        id
    }

    /// Restart numbering for a fresh, independent run.
    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// Topology class of a line: which of its endpoints touch a junction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum LineClass {
    /// Neither endpoint is a junction.
    #[default]
    NoJunc,
    /// Only the start point is a junction.
    StartJunc,
    /// Only the end point is a junction.
    EndJunc,
    /// Both endpoints are junctions.
    BothJunc,
    /// The contour is closed (first and last point coincide).
    Closed,
}

/// One extracted line.
///
/// Point data is stored in parallel arrays of equal length. `row`/`col` are
/// sub-pixel image coordinates, `angle` is the direction of the normal at
/// each point measured from the row axis, and `response` is the second
/// directional derivative along the normal. The width, asymmetry and
/// intensity arrays are only present when width estimation (and, for the
/// latter two, position correction) was requested. If the asymmetry, i.e.
/// the weaker gradient, is on the right side of the line the stored value is
/// positive, otherwise negative.
#[derive(Clone, Debug, Serialize)]
pub struct Line {
    pub id: LineId,
    pub frame: i32,
    pub class: LineClass,
    pub row: Vec<f32>,
    pub col: Vec<f32>,
    pub angle: Vec<f32>,
    pub response: Vec<f32>,
    pub width_l: Option<Vec<f32>>,
    pub width_r: Option<Vec<f32>>,
    pub asymmetry: Option<Vec<f32>>,
    pub intensity: Option<Vec<f32>>,
}

impl Line {
    pub fn new(id: LineId) -> Self {
        Self {
            id,
            frame: 0,
            class: LineClass::NoJunc,
            row: Vec::new(),
            col: Vec::new(),
            angle: Vec::new(),
            response: Vec::new(),
            width_l: None,
            width_r: None,
            asymmetry: None,
            intensity: None,
        }
    }

    #[inline]
    pub fn num_points(&self) -> usize {
        self.row.len()
    }

    /// Polyline arc length.
    pub fn estimate_length(&self) -> f64 {
        let mut length = 0.0;
        for i in 1..self.num_points() {
            let dr = (self.row[i] - self.row[i - 1]) as f64;
            let dc = (self.col[i] - self.col[i - 1]) as f64;
            length += (dr * dr + dc * dc).sqrt();
        }
        length
    }

    /// Index of the endpoint (0 or last) closest to `(x, y)` in image
    /// (col, row) coordinates.
    pub fn start_or_end_position(&self, x: f32, y: f32) -> usize {
        let n = self.num_points();
        let d0 = (self.col[0] - x).hypot(self.row[0] - y);
        let d1 = (self.col[n - 1] - x).hypot(self.row[n - 1] - y);
        if d0 < d1 {
            0
        } else {
            n - 1
        }
    }
}

/// A point where two lines meet or cross.
///
/// `line1` is the line that was already processed when the junction was
/// found, `line2` the one running into it, and `pos` the index of the
/// junction point within `line1`. `(x, y)` are image coordinates (column,
/// row). `is_non_terminal` marks junctions that sit in the interior of
/// `line1` rather than on an endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct Junction {
    pub line1: LineId,
    pub line2: LineId,
    pub pos: usize,
    pub x: f32,
    pub y: f32,
    pub is_non_terminal: bool,
}

/// Output of one detection pass over a single frame.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RidgeResult {
    pub frame: i32,
    pub lines: Vec<Line>,
    pub junctions: Vec<Junction>,
    pub latency_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_generator_is_monotonic_and_resettable() {
        let mut gen = LineIdGen::new();
        assert_eq!(gen.next_id(), LineId(0));
        assert_eq!(gen.next_id(), LineId(1));
        gen.reset();
        assert_eq!(gen.next_id(), LineId(0));
    }

    #[test]
    fn length_and_endpoint_helpers() {
        let mut line = Line::new(LineId(7));
        line.row = vec![0.0, 0.0, 0.0];
        line.col = vec![0.0, 3.0, 7.0];
        line.angle = vec![0.0; 3];
        line.response = vec![0.0; 3];
        assert!((line.estimate_length() - 7.0).abs() < 1e-9);
        assert_eq!(line.start_or_end_position(6.5, 0.0), 2);
        assert_eq!(line.start_or_end_position(0.5, 0.0), 0);
    }
}
