//! Linking of ridge points into contours.
//!
//! Overview
//! - Seeds lines at the strongest unprocessed ridge point, found through a
//!   response-sorted index over the thresholded seed region.
//! - Walks forward, then backward (reversing the point buffer and offsetting
//!   the octant), choosing among the three plausible neighbors per octant
//!   the one minimizing `distance + angle difference`, and marking double
//!   responses next to the line as consumed.
//! - Records a junction when the walk runs into an already claimed pixel;
//!   a line revisiting its own first point becomes a closed contour. When a
//!   double response leaves no exact matching point on the other line, the
//!   nearest point substitutes for it.
//! - Optionally extends lines at free endpoints along the image gradient to
//!   find junctions whose crossing pixel was suppressed.
//! - Splits lines at their junction positions and finally orients all stored
//!   normal angles to the right of the travel direction.

mod extend;
pub(crate) mod region;
mod split;

use std::cmp::Ordering;
use std::f64::consts::PI;

use log::{debug, warn};

use crate::detector::RidgeMode;
use crate::filter::mirror;
use crate::image::ImageF32;
use crate::position::RidgePointGrid;
use crate::types::{Line, LineClass, LineIdGen};

pub(crate) const MAX_ANGLE_DIFFERENCE: f64 = PI / 6.0;

/// One (row, col) pixel step.
type Step = [i8; 2];

/// The three appropriate neighbor pixels the walk must examine, indexed by
/// the octant of the current line direction (0 if the angle in degrees lies
/// within [-22.5, 22.5], counting counterclockwise).
const DIRTAB: [[Step; 3]; 8] = [
    [[1, 0], [1, -1], [1, 1]],
    [[1, 1], [1, 0], [0, 1]],
    [[0, 1], [1, 1], [-1, 1]],
    [[-1, 1], [0, 1], [-1, 0]],
    [[-1, 0], [-1, 1], [-1, -1]],
    [[-1, -1], [-1, 0], [0, -1]],
    [[0, -1], [-1, -1], [1, -1]],
    [[1, -1], [0, -1], [1, 0]],
];

/// The two neighbor pixels to mark as processed in case of double responses,
/// indexed like [`DIRTAB`].
const CLEARTAB: [[Step; 2]; 8] = [
    [[0, 1], [0, -1]],
    [[-1, 1], [1, -1]],
    [[-1, 0], [1, 0]],
    [[-1, -1], [1, 1]],
    [[0, -1], [0, 1]],
    [[1, -1], [-1, 1]],
    [[1, 0], [-1, 0]],
    [[1, 1], [-1, -1]],
];

/// Raw junction record produced by the linker. `cont1` is the index of the
/// line that was run into, `pos` the junction point's index within it.
/// `(x, y)` hold (row, col) coordinates here; reconstruction swaps them
/// into image order and re-derives the lines meeting at the point from the
/// geometry, so the record does not track the line that ran in.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawJunction {
    pub cont1: usize,
    pub pos: usize,
    pub x: f32,
    pub y: f32,
}

/// Raw linker output, consumed by junction reconstruction.
pub(crate) struct LinkOutput {
    pub lines: Vec<Line>,
    pub junctions: Vec<RawJunction>,
}

/// Entry in the seed index, sorted descending by response.
struct Crossref {
    x: usize,
    y: usize,
    value: f32,
    done: bool,
}

/// Direction of the line (perpendicular to the stored normal), normalized
/// to [0, PI).
#[inline]
fn line_direction(nx: f64, ny: f64) -> f64 {
    let mut alpha = ny.atan2(nx);
    if alpha < 0.0 {
        alpha += 2.0 * PI;
    }
    if alpha >= PI {
        alpha -= PI;
    }
    alpha
}

#[inline]
fn octant_of(alpha: f64) -> usize {
    ((4.0 / PI * alpha + 0.5).floor() as usize) % 4
}

/// Difference of two direction angles modulo PI.
#[inline]
fn direction_diff(a: f64, b: f64) -> f64 {
    let mut diff = (a - b).abs();
    if diff >= PI / 2.0 {
        diff = PI - diff;
    }
    diff
}

/// Orient a normal angle (already reduced to [0, PI)) so it deviates least
/// from the previous normal.
fn orient_normal(beta: f64, last_beta: f64) -> f64 {
    let mut diff1 = (beta - last_beta).abs();
    if diff1 >= PI {
        diff1 = 2.0 * PI - diff1;
    }
    let mut diff2 = (beta + PI - last_beta).abs();
    if diff2 >= PI {
        diff2 = 2.0 * PI - diff2;
    }
    if diff1 < diff2 {
        beta
    } else {
        beta + PI
    }
}

/// Sub-pixel response at `(px, py)` from a 3×3 facet-model fit of the
/// pixel-accurate responses around `(x, y)`.
fn interpolate_response(
    resp: &[f32],
    x: usize,
    y: usize,
    px: f64,
    py: f64,
    width: usize,
    height: usize,
) -> f64 {
    let at = |r: isize, c: isize| -> f64 {
        resp[mirror(r, height) * width + mirror(c, width)] as f64
    };
    let (xi, yi) = (x as isize, y as isize);
    let i1 = at(xi - 1, yi - 1);
    let i2 = at(xi - 1, yi);
    let i3 = at(xi - 1, yi + 1);
    let i4 = at(xi, yi - 1);
    let i5 = at(xi, yi);
    let i6 = at(xi, yi + 1);
    let i7 = at(xi + 1, yi - 1);
    let i8 = at(xi + 1, yi);
    let i9 = at(xi + 1, yi + 1);
    let t1 = i1 + i2 + i3;
    let t2 = i4 + i5 + i6;
    let t3 = i7 + i8 + i9;
    let t4 = i1 + i4 + i7;
    let t5 = i2 + i5 + i8;
    let t6 = i3 + i6 + i9;
    let d = (-i1 + 2.0 * i2 - i3 + 2.0 * i4 + 5.0 * i5 + 2.0 * i6 - i7 + 2.0 * i8 - i9) / 9.0;
    let dr = (t3 - t1) / 6.0;
    let dc = (t6 - t4) / 6.0;
    let drr = (t1 - 2.0 * t2 + t3) / 6.0;
    let dcc = (t4 - 2.0 * t5 + t6) / 6.0;
    let drc = (i1 - i3 - i7 + i9) / 4.0;
    let xx = px - x as f64;
    let yy = py - y as f64;
    d + xx * dr + yy * dc + xx * xx * drr + xx * yy * drc + yy * yy * dcc
}

pub(super) struct Linker<'a> {
    grid: &'a RidgePointGrid,
    width: usize,
    height: usize,
    /// Pixels claimed by a line; value is line index + 1.
    label: Vec<u32>,
    /// Index into `cross` (+ 1) for pixels that can seed a line.
    indx: Vec<u32>,
    cross: Vec<Crossref>,
    lines: Vec<Line>,
    junctions: Vec<RawJunction>,
}

/// Buffers for the line currently being built.
#[derive(Default)]
struct WalkBuf {
    row: Vec<f32>,
    col: Vec<f32>,
    angle: Vec<f32>,
    resp: Vec<f32>,
}

impl WalkBuf {
    fn clear(&mut self) {
        self.row.clear();
        self.col.clear();
        self.angle.clear();
        self.resp.clear();
    }

    fn push(&mut self, row: f32, col: f32, angle: f32, resp: f32) {
        self.row.push(row);
        self.col.push(col);
        self.angle.push(angle);
        self.resp.push(resp);
    }

    fn reverse(&mut self) {
        self.row.reverse();
        self.col.reverse();
        self.angle.reverse();
        self.resp.reverse();
    }

    fn len(&self) -> usize {
        self.row.len()
    }
}

/// Link the classified ridge points into lines and junction records.
pub(crate) fn compute_contours(
    grid: &RidgePointGrid,
    gradx: &ImageF32,
    grady: &ImageF32,
    sigma: f64,
    extend_lines: bool,
    mode: RidgeMode,
    ids: &mut LineIdGen,
) -> LinkOutput {
    let width = gradx.w;
    let height = gradx.h;
    let mut linker = Linker::new(grid, width, height);
    linker.link_all(ids);
    if extend_lines {
        let s = match mode {
            RidgeMode::Light => 1.0,
            RidgeMode::Dark => -1.0,
        };
        linker.extend_lines(gradx, grady, sigma, s);
    }
    linker.split_at_junctions(ids);
    linker.normalize_normal_orientation();
    debug!(
        "linking produced {} raw lines, {} raw junctions",
        linker.lines.len(),
        linker.junctions.len()
    );
    LinkOutput {
        lines: linker.lines,
        junctions: linker.junctions,
    }
}

impl<'a> Linker<'a> {
    fn new(grid: &'a RidgePointGrid, width: usize, height: usize) -> Self {
        // Seed index: all strong pixels, sorted descending by response,
        // with a reverse map so any pixel's entry is found in O(1).
        let chords = region::threshold(&grid.ismax, 2, width, height);
        let mut cross = Vec::new();
        for ch in &chords {
            for y in ch.cb..=ch.ce {
                cross.push(Crossref {
                    x: ch.r,
                    y,
                    value: grid.ev[ch.r * width + y],
                    done: false,
                });
            }
        }
        cross.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
        let mut indx = vec![0u32; width * height];
        for (i, cr) in cross.iter().enumerate() {
            indx[cr.x * width + cr.y] = i as u32 + 1;
        }
        Self {
            grid,
            width,
            height,
            label: vec![0; width * height],
            indx,
            cross,
            lines: Vec::new(),
            junctions: Vec::new(),
        }
    }

    #[inline]
    fn pos(&self, x: usize, y: usize) -> usize {
        x * self.width + y
    }

    /// Direction angle of the line through pixel `pos`.
    #[inline]
    fn direction_at(&self, pos: usize) -> f64 {
        line_direction(-self.grid.ny[pos] as f64, self.grid.nx[pos] as f64)
    }

    fn claim(&mut self, pos: usize, line_label: u32) {
        self.label[pos] = line_label;
        if self.indx[pos] != 0 {
            self.cross[(self.indx[pos] - 1) as usize].done = true;
        }
    }

    /// Mark double responses around `(x, y)` as processed.
    fn clear_double_responses(&mut self, x: usize, y: usize, octant: usize, alpha: f64, line_label: u32) {
        for step in &CLEARTAB[octant] {
            let nextx = x as isize + step[0] as isize;
            let nexty = y as isize + step[1] as isize;
            if nextx < 0 || nextx >= self.height as isize || nexty < 0 || nexty >= self.width as isize {
                continue;
            }
            let nextpos = self.pos(nextx as usize, nexty as usize);
            if self.grid.ismax[nextpos] > 0 {
                let nextalpha = self.direction_at(nextpos);
                if direction_diff(alpha, nextalpha) < MAX_ANGLE_DIFFERENCE {
                    self.claim(nextpos, line_label);
                }
            }
        }
    }

    fn link_all(&mut self, ids: &mut LineIdGen) {
        let mut buf = WalkBuf::default();
        let mut indx_max = 0usize;
        loop {
            // Contour class unknown at this point; assume both ends free.
            let mut cls = LineClass::NoJunc;
            while indx_max < self.cross.len() && self.cross[indx_max].done {
                indx_max += 1;
            }
            if indx_max == self.cross.len() {
                break;
            }
            let maxx = self.cross[indx_max].x;
            let maxy = self.cross[indx_max].y;
            if self.cross[indx_max].value == 0.0 {
                break;
            }

            let num_cont = self.lines.len();
            let line_label = num_cont as u32 + 1;
            buf.clear();
            let pos = self.pos(maxx, maxy);
            self.claim(pos, line_label);
            let alpha = self.direction_at(pos);
            let octant = octant_of(alpha);
            // The stored normal points to the right of the line as it is
            // traversed from 0 to num-1. Since the points are sorted in
            // reverse order before the second iteration, the first beta
            // actually has to point to the left of the line.
            let mut beta = alpha + PI / 2.0;
            if beta >= 2.0 * PI {
                beta -= 2.0 * PI;
            }
            buf.push(
                self.grid.px[pos],
                self.grid.py[pos],
                beta as f32,
                interpolate_response(
                    &self.grid.ev,
                    maxx,
                    maxy,
                    self.grid.px[pos] as f64,
                    self.grid.py[pos] as f64,
                    self.width,
                    self.height,
                ) as f32,
            );
            self.clear_double_responses(maxx, maxy, octant, alpha, line_label);

            let mut it = 1;
            while it <= 2 {
                let pos = self.pos(maxx, maxy);
                let alpha = self.direction_at(pos);
                // Walk backward with the opposite octant in the second pass.
                let mut last_octant = if it == 1 {
                    octant_of(alpha)
                } else {
                    octant_of(alpha) + 4
                };
                let mut last_beta = alpha + PI / 2.0;
                if last_beta >= 2.0 * PI {
                    last_beta -= 2.0 * PI;
                }
                if it == 2 {
                    buf.reverse();
                }

                let mut x = maxx;
                let mut y = maxy;
                loop {
                    let pos = self.pos(x, y);
                    let px = self.grid.px[pos] as f64;
                    let py = self.grid.py[pos] as f64;
                    let alpha = self.direction_at(pos);
                    let mut octant = octant_of(alpha);
                    // Orient the octant w.r.t. the last direction of travel.
                    match octant {
                        0 => {
                            if (3..=5).contains(&last_octant) {
                                octant = 4;
                            }
                        }
                        1 => {
                            if (4..=6).contains(&last_octant) {
                                octant = 5;
                            }
                        }
                        2 => {
                            if (4..=7).contains(&last_octant) {
                                octant = 6;
                            }
                        }
                        3 => {
                            if last_octant == 0 || last_octant >= 6 {
                                octant = 7;
                            }
                        }
                        _ => {}
                    }
                    last_octant = octant;

                    // Determine the most plausible neighbor.
                    let mut nextismax = false;
                    let mut nexti = 1usize;
                    let mut mindiff = f64::MAX;
                    for (i, step) in DIRTAB[octant].iter().enumerate() {
                        let nextx = x as isize + step[0] as isize;
                        let nexty = y as isize + step[1] as isize;
                        if nextx < 0
                            || nextx >= self.height as isize
                            || nexty < 0
                            || nexty >= self.width as isize
                        {
                            continue;
                        }
                        let nextpos = self.pos(nextx as usize, nexty as usize);
                        if self.grid.ismax[nextpos] == 0 {
                            continue;
                        }
                        let dx = self.grid.px[nextpos] as f64 - px;
                        let dy = self.grid.py[nextpos] as f64 - py;
                        let dist = (dx * dx + dy * dy).sqrt();
                        let nextalpha = self.direction_at(nextpos);
                        let diff = dist + direction_diff(alpha, nextalpha);
                        if diff < mindiff {
                            mindiff = diff;
                            nexti = i;
                        }
                        nextismax = true;
                    }

                    self.clear_double_responses(x, y, octant, alpha, line_label);

                    // End of the line in this direction?
                    if !nextismax {
                        break;
                    }

                    x = (x as isize + DIRTAB[octant][nexti][0] as isize) as usize;
                    y = (y as isize + DIRTAB[octant][nexti][1] as isize) as usize;
                    let pos = self.pos(x, y);
                    let raw_beta = line_direction(
                        self.grid.nx[pos] as f64,
                        self.grid.ny[pos] as f64,
                    );
                    let chosen = orient_normal(raw_beta, last_beta);
                    last_beta = chosen;
                    buf.push(
                        self.grid.px[pos],
                        self.grid.py[pos],
                        chosen as f32,
                        interpolate_response(
                            &self.grid.ev,
                            x,
                            y,
                            self.grid.px[pos] as f64,
                            self.grid.py[pos] as f64,
                            self.width,
                            self.height,
                        ) as f32,
                    );

                    // Running into a claimed pixel means a junction.
                    if self.label[pos] > 0 {
                        let k = (self.label[pos] - 1) as usize;
                        let jx = self.grid.px[pos];
                        let jy = self.grid.py[pos];
                        if k == num_cont {
                            // The line intersects itself.
                            let num_pnt = buf.len();
                            if let Some(j) = (0..num_pnt - 1)
                                .find(|&j| buf.row[j] == jx && buf.col[j] == jy)
                            {
                                if j == 0 {
                                    // Contour is closed.
                                    cls = LineClass::Closed;
                                    buf.reverse();
                                    it = 2;
                                } else if it == 2 {
                                    cls = if cls == LineClass::StartJunc {
                                        LineClass::BothJunc
                                    } else {
                                        LineClass::EndJunc
                                    };
                                    self.junctions.push(RawJunction {
                                        cont1: num_cont,
                                        pos: j,
                                        x: jx,
                                        y: jy,
                                    });
                                } else {
                                    cls = LineClass::StartJunc;
                                    // The buffer is reversed before the
                                    // second pass, so mirror the index.
                                    self.junctions.push(RawJunction {
                                        cont1: num_cont,
                                        pos: num_pnt - 1 - j,
                                        x: jx,
                                        y: jy,
                                    });
                                }
                            }
                            break;
                        }

                        let other = &self.lines[k];
                        let exact = (0..other.num_points())
                            .find(|&j| other.row[j] == jx && other.col[j] == jy);
                        let j = match exact {
                            Some(j) => j,
                            None => {
                                // A double response occurred; substitute the
                                // nearest point on the other line.
                                let mut mindist = f64::MAX;
                                let mut jj = 0usize;
                                for l in 0..other.num_points() {
                                    let dx = (jx - other.row[l]) as f64;
                                    let dy = (jy - other.col[l]) as f64;
                                    let dist = (dx * dx + dy * dy).sqrt();
                                    if dist < mindist {
                                        mindist = dist;
                                        jj = l;
                                    }
                                }
                                warn!(
                                    "no exact junction point on line {k}; \
                                     substituting nearest point at distance {mindist:.3}"
                                );
                                let (prow, pcol) = (other.row[jj], other.col[jj]);
                                let mut b = other.angle[jj] as f64;
                                if b >= PI {
                                    b -= PI;
                                }
                                let presp = other.response[jj];
                                let chosen = orient_normal(b, last_beta);
                                buf.push(prow, pcol, chosen as f32, presp);
                                jj
                            }
                        };
                        // Add the junction only if it is not one of the
                        // other line's endpoints.
                        if j > 0 && j < self.lines[k].num_points() - 1 {
                            cls = if it == 1 {
                                LineClass::StartJunc
                            } else if cls == LineClass::StartJunc {
                                LineClass::BothJunc
                            } else {
                                LineClass::EndJunc
                            };
                            self.junctions.push(RawJunction {
                                cont1: k,
                                pos: j,
                                x: *buf.row.last().unwrap(),
                                y: *buf.col.last().unwrap(),
                            });
                        }
                        break;
                    }
                    self.claim(pos, line_label);
                }
                it += 1;
            }

            if buf.len() > 1 {
                let mut line = Line::new(ids.next_id());
                line.class = cls;
                line.row = std::mem::take(&mut buf.row);
                line.col = std::mem::take(&mut buf.col);
                line.angle = std::mem::take(&mut buf.angle);
                line.response = std::mem::take(&mut buf.resp);
                self.lines.push(line);
            } else {
                // Remove the single point from the label image again.
                for i in -1isize..=1 {
                    for j in -1isize..=1 {
                        let pos = mirror(maxx as isize + i, self.height) * self.width
                            + mirror(maxy as isize + j, self.width);
                        if self.label[pos] == line_label {
                            self.label[pos] = 0;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octant_tables_are_consistent() {
        // Each octant's primary step must point into that angular sector.
        for (oct, steps) in DIRTAB.iter().enumerate().take(4) {
            let alpha = oct as f64 * PI / 4.0;
            let (dx, dy) = (alpha.cos(), alpha.sin());
            let s = steps[0];
            let dot = dx * s[0] as f64 + dy * s[1] as f64;
            assert!(dot > 0.9, "octant {oct}: primary step misaligned");
        }
        // Double-response steps are perpendicular to the walk direction.
        for (oct, steps) in CLEARTAB.iter().enumerate() {
            let walk = DIRTAB[oct][0];
            for s in steps {
                let dot = walk[0] as i32 * s[0] as i32 + walk[1] as i32 * s[1] as i32;
                assert!(dot.abs() <= 1, "octant {oct}: clear step not lateral");
            }
        }
    }

    #[test]
    fn direction_diff_wraps_at_half_pi() {
        assert!((direction_diff(0.1, 3.1) - (PI - 3.0)).abs() < 1e-12);
        assert!((direction_diff(1.0, 1.2) - 0.2).abs() < 1e-12);
    }

    #[test]
    fn orient_normal_prefers_smaller_turn() {
        assert!((orient_normal(0.1, 0.2) - 0.1).abs() < 1e-12);
        assert!((orient_normal(0.1, PI + 0.2) - (PI + 0.1)).abs() < 1e-12);
    }
}
