//! Line width estimation from gradient edges on both sides of each line.
//!
//! For every line point a search line is cast along the normal in both
//! directions, up to `2.5 * sigma` pixels. The first maximum of the
//! gradient magnitude on each side, localized to sub-pixel accuracy with a
//! facet model, marks the edge of the line there. The raw edge distances
//! are biased by the Gaussian smoothing; [`correction`] removes that bias
//! and also recovers the true contrast and asymmetry of the line when
//! position correction is enabled.

mod correction;

use log::debug;

use crate::detector::RidgeMode;
use crate::filter::{mirror, phi2, DerivativeField};
use crate::geometry::bresenham;
use crate::image::ImageF32;
use crate::position::{compute_eigenvals, gradient_magnitude, solve_linear};
use crate::types::{Line, LineClass};

use correction::line_corrections;

/// The facet-model edge position overshoots the true edge slightly.
const LINE_WIDTH_COMPENSATION: f64 = 1.05;
/// Lines narrower than this have no meaningful contrast.
const MIN_LINE_WIDTH: f64 = 0.1;
/// Contrasts above this value are implausible for 8-bit input and signal a
/// failed width measurement.
const MAX_CONTRAST: f64 = 275.0;

/// Coefficients of the quadratic facet model fitted to a 3x3 patch.
struct Facet {
    d: f64,
    dr: f64,
    dc: f64,
    drr: f64,
    drc: f64,
    dcc: f64,
}

/// Fit the facet model to the 3x3 neighborhood of `(r, c)` in `grad`,
/// mirroring at the image border.
fn fit_facet(grad: &ImageF32, r: isize, c: isize) -> Facet {
    let at = |dr: isize, dc: isize| -> f64 {
        let rr = mirror(r + dr, grad.h);
        let cc = mirror(c + dc, grad.w);
        grad.get(rr, cc) as f64
    };
    let i1 = at(-1, -1);
    let i2 = at(-1, 0);
    let i3 = at(-1, 1);
    let i4 = at(0, -1);
    let i5 = at(0, 0);
    let i6 = at(0, 1);
    let i7 = at(1, -1);
    let i8 = at(1, 0);
    let i9 = at(1, 1);
    let t1 = i1 + i2 + i3;
    let t2 = i4 + i5 + i6;
    let t3 = i7 + i8 + i9;
    let t4 = i1 + i4 + i7;
    let t5 = i2 + i5 + i8;
    let t6 = i3 + i6 + i9;
    Facet {
        d: (-i1 + 2.0 * i2 - i3 + 2.0 * i4 + 5.0 * i5 + 2.0 * i6 - i7 + 2.0 * i8 - i9) / 9.0,
        dr: (t3 - t1) / 6.0,
        dc: (t6 - t4) / 6.0,
        drr: (t1 - 2.0 * t2 + t3) / 6.0,
        drc: (i1 - i3 - i7 + i9) / 4.0,
        dcc: (t4 - 2.0 * t5 + t6) / 6.0,
    }
}

/// Estimate the width of every line and store it in place. With
/// `correct_pos` the smoothing bias is removed from the widths, the line
/// positions are displaced onto the true line centers, and the contrast and
/// asymmetry of each point are recovered.
pub(crate) fn compute_line_width(
    lines: &mut [Line],
    deriv: &DerivativeField,
    sigma: f64,
    correct_pos: bool,
    mode: RidgeMode,
) {
    let grad = gradient_magnitude(deriv);
    let length = 2.5 * sigma;

    for cont in lines.iter_mut() {
        let num_points = cont.num_points();
        let mut width_l = vec![0.0f64; num_points];
        let mut width_r = vec![0.0f64; num_points];
        let mut grad_l = vec![0.0f64; num_points];
        let mut grad_r = vec![0.0f64; num_points];

        for j in 0..num_points {
            let px = cont.row[j] as f64;
            let py = cont.col[j] as f64;
            let r = (px + 0.5).floor() as isize;
            let c = (py + 0.5).floor() as isize;
            let nx = (cont.angle[j] as f64).cos();
            let ny = (cont.angle[j] as f64).sin();
            let offs = bresenham(nx, ny, 0.0, 0.0, length);

            // dir == 1 follows the normal (right of the line), dir == -1
            // the opposite side.
            for dir in [1.0f64, -1.0] {
                for o in &offs {
                    let sign = if dir > 0.0 { 1isize } else { -1 };
                    let fx = r + sign * o.x as isize;
                    let fy = c + sign * o.y as isize;
                    let f = fit_facet(&grad, fx, fy);
                    let (eigval, eigvec) =
                        compute_eigenvals(2.0 * f.drr, f.drc, 2.0 * f.dcc);
                    let val = -eigval[0];
                    if val <= 0.0 {
                        continue;
                    }
                    let n1 = eigvec[0][0];
                    let n2 = eigvec[0][1];
                    let a = 2.0 * (f.drr * n1 * n1 + f.drc * n1 * n2 + f.dcc * n2 * n2);
                    let b = f.dr * n1 + f.dc * n2;
                    let Some(t) = solve_linear(a, b) else {
                        continue;
                    };
                    let p1 = t * n1;
                    let p2 = t * n2;
                    if p1.abs() > 0.5 || p2.abs() > 0.5 {
                        continue;
                    }
                    // Project the edge point onto the search line to get
                    // the perpendicular distance from the line point.
                    let ex = fx as f64 + p1;
                    let ey = fy as f64 + p2;
                    let Some(d) = solve_linear(1.0, nx * (px - ex) + ny * (py - ey)) else {
                        continue;
                    };
                    let g = f.d
                        + p1 * f.dr
                        + p2 * f.dc
                        + p1 * p1 * f.drr
                        + p1 * p2 * f.drc
                        + p2 * p2 * f.dcc;
                    if dir > 0.0 {
                        width_r[j] = d.abs();
                        grad_r[j] = g;
                    } else {
                        width_l[j] = d.abs();
                        grad_l[j] = g;
                    }
                    break;
                }
            }
        }

        fix_locations(
            cont,
            &mut width_l,
            &mut width_r,
            &grad_l,
            &grad_r,
            sigma,
            correct_pos,
            mode,
        );
    }
    debug!("estimated widths for {} lines", lines.len());
}

/// Fill the width gaps of a line, correct the widths and positions for the
/// smoothing bias and compute contrast and asymmetry.
#[allow(clippy::too_many_arguments)]
fn fix_locations(
    cont: &mut Line,
    width_l: &mut [f64],
    width_r: &mut [f64],
    grad_l: &[f64],
    grad_r: &[f64],
    sigma: f64,
    correct_pos: bool,
    mode: RidgeMode,
) {
    let num_points = cont.num_points();
    fill_gaps(cont, width_l, None, None);
    fill_gaps(cont, width_r, None, None);

    let mut correct = vec![0.0f64; num_points];
    let mut asymm = vec![0.0f64; num_points];
    let mut contr = vec![0.0f64; num_points];

    if correct_pos {
        // Junction endpoints whose width was filled by interpolation must
        // not be displaced.
        let correct_start = matches!(
            cont.class,
            LineClass::NoJunc | LineClass::EndJunc | LineClass::Closed
        ) && width_r[0] > 0.0
            && width_l[0] > 0.0;
        let correct_end = matches!(
            cont.class,
            LineClass::NoJunc | LineClass::StartJunc | LineClass::Closed
        ) && width_r[num_points - 1] > 0.0
            && width_l[num_points - 1] > 0.0;

        for i in 0..num_points {
            if width_r[i] > 0.0 && width_l[i] > 0.0 {
                let w_est = (width_r[i] + width_l[i]) * LINE_WIDTH_COMPENSATION;
                let (r_est, weak_is_r) = if grad_r[i] <= grad_l[i] {
                    (grad_r[i] / grad_l[i], true)
                } else {
                    (grad_l[i] / grad_r[i], false)
                };
                let corr = line_corrections(sigma, w_est, r_est);
                let w_real = corr.w / LINE_WIDTH_COMPENSATION;
                let c_real = corr.correction / LINE_WIDTH_COMPENSATION;
                width_r[i] = w_real;
                width_l[i] = w_real;
                if weak_is_r {
                    asymm[i] = corr.h;
                    correct[i] = -c_real;
                } else {
                    asymm[i] = -corr.h;
                    correct[i] = c_real;
                }
            }
        }

        fill_gaps(cont, width_l, Some(&mut correct), Some(&mut asymm));
        width_r.copy_from_slice(width_l);

        if !correct_start {
            correct[0] = 0.0;
        }
        if !correct_end {
            correct[num_points - 1] = 0.0;
        }
        for i in 0..num_points {
            let nx = (cont.angle[i] as f64).cos();
            let ny = (cont.angle[i] as f64).sin();
            cont.row[i] += (correct[i] * nx) as f32;
            cont.col[i] += (correct[i] * ny) as f32;
        }

        // Contrast from the bar model at the corrected position. Widths
        // below the minimum and implausibly large contrasts mark failed
        // measurements.
        for i in 0..num_points {
            if width_l[i] < MIN_LINE_WIDTH {
                width_l[i] = 0.0;
                width_r[i] = 0.0;
                contr[i] = 0.0;
            } else {
                let denom = phi2(correct[i] + width_l[i], sigma)
                    + (asymm[i] - 1.0) * phi2(correct[i] - width_l[i], sigma);
                contr[i] = cont.response[i] as f64 / denom.abs();
                if contr[i] > MAX_CONTRAST {
                    contr[i] = 0.0;
                }
            }
        }
        fill_gaps(cont, &mut contr, None, None);
        if mode == RidgeMode::Dark {
            for v in contr.iter_mut() {
                *v = -*v;
            }
        }
    }

    cont.width_l = Some(width_l.iter().map(|&v| v as f32).collect());
    cont.width_r = Some(width_r.iter().map(|&v| v as f32).collect());
    if correct_pos {
        cont.asymmetry = Some(asymm.iter().map(|&v| v as f32).collect());
        cont.intensity = Some(contr.iter().map(|&v| v as f32).collect());
    }
}

/// Interpolate gaps (zero runs) in `master` linearly over the arc length of
/// the line, carrying up to two slave arrays along with the same weights.
/// Gaps touching an end of the line are filled with the nearest measured
/// value instead.
fn fill_gaps(
    cont: &Line,
    master: &mut [f64],
    mut slave1: Option<&mut [f64]>,
    mut slave2: Option<&mut [f64]>,
) {
    let num_points = cont.num_points();
    let mut i = 0;
    while i < num_points {
        if master[i] != 0.0 {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < num_points && master[j] == 0.0 {
            j += 1;
        }

        let (s, e) = if i > 0 && j < num_points - 1 {
            (i, j - 1)
        } else if i > 0 {
            let s = i;
            let e = num_points - 2;
            master[e + 1] = master[s - 1];
            if let Some(sl) = slave1.as_deref_mut() {
                sl[e + 1] = sl[s - 1];
            }
            if let Some(sl) = slave2.as_deref_mut() {
                sl[e + 1] = sl[s - 1];
            }
            (s, e)
        } else if j < num_points - 1 {
            let s = 1;
            let e = j - 1;
            master[s - 1] = master[e + 1];
            if let Some(sl) = slave1.as_deref_mut() {
                sl[s - 1] = sl[e + 1];
            }
            if let Some(sl) = slave2.as_deref_mut() {
                sl[s - 1] = sl[e + 1];
            }
            (s, e)
        } else {
            // Gap spans the whole line except possibly the last point.
            if num_points < 2 {
                i = j;
                continue;
            }
            (1, num_points - 2)
        };

        let m_s = master[s - 1];
        let m_e = master[e + 1];
        let s1_s = slave1.as_deref().map(|sl| sl[s - 1]).unwrap_or(0.0);
        let s1_e = slave1.as_deref().map(|sl| sl[e + 1]).unwrap_or(0.0);
        let s2_s = slave2.as_deref().map(|sl| sl[s - 1]).unwrap_or(0.0);
        let s2_e = slave2.as_deref().map(|sl| sl[e + 1]).unwrap_or(0.0);

        let mut arc_len = 0.0;
        for k in s..=e + 1 {
            let d_r = (cont.row[k] - cont.row[k - 1]) as f64;
            let d_c = (cont.col[k] - cont.col[k - 1]) as f64;
            arc_len += (d_r * d_r + d_c * d_c).sqrt();
        }
        if arc_len > 0.0 {
            let mut len = 0.0;
            for k in s..=e {
                let d_r = (cont.row[k] - cont.row[k - 1]) as f64;
                let d_c = (cont.col[k] - cont.col[k - 1]) as f64;
                len += (d_r * d_r + d_c * d_c).sqrt();
                let w_s = (arc_len - len) / arc_len;
                let w_e = len / arc_len;
                master[k] = w_s * m_s + w_e * m_e;
                if let Some(sl) = slave1.as_deref_mut() {
                    sl[k] = w_s * s1_s + w_e * s1_e;
                }
                if let Some(sl) = slave2.as_deref_mut() {
                    sl[k] = w_s * s2_s + w_e * s2_e;
                }
            }
        }
        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LineId;

    fn straight_line(n: usize) -> Line {
        let mut cont = Line::new(LineId(1));
        for k in 0..n {
            cont.row.push(10.0);
            cont.col.push(k as f32);
            cont.angle.push(0.0);
            cont.response.push(1.0);
        }
        cont
    }

    #[test]
    fn interior_gap_is_interpolated_over_arc_length() {
        // The gap must end before the next-to-last point to take the
        // interpolation branch.
        let cont = straight_line(5);
        let mut master = [2.0, 0.0, 0.0, 4.0, 5.0];
        fill_gaps(&cont, &mut master, None, None);
        assert!((master[1] - 8.0 / 3.0).abs() < 1e-9);
        assert!((master[2] - 10.0 / 3.0).abs() < 1e-9);
        assert_eq!(master[3], 4.0);
        assert_eq!(master[4], 5.0);
    }

    #[test]
    fn end_gaps_copy_the_nearest_value() {
        let cont = straight_line(4);
        let mut master = [0.0, 0.0, 3.0, 3.0];
        fill_gaps(&cont, &mut master, None, None);
        assert_eq!(master, [3.0, 3.0, 3.0, 3.0]);

        let mut master = [5.0, 0.0, 0.0, 0.0];
        fill_gaps(&cont, &mut master, None, None);
        assert_eq!(master, [5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn gap_reaching_the_last_point_copies_backwards_over_it() {
        // A gap whose last zero sits at the next-to-last index is treated
        // as an end gap: the value before the gap is copied forward over
        // the whole run, the final measured value included.
        let cont = straight_line(5);
        let mut master = [2.0, 0.0, 0.0, 0.0, 4.0];
        fill_gaps(&cont, &mut master, None, None);
        assert_eq!(master, [2.0, 2.0, 2.0, 2.0, 2.0]);
    }

    #[test]
    fn slaves_follow_the_master_weights() {
        let cont = straight_line(4);
        let mut master = [1.0, 0.0, 3.0, 4.0];
        let mut slave = [10.0, 0.0, 20.0, 30.0];
        fill_gaps(&cont, &mut master, Some(&mut slave), None);
        assert!((master[1] - 2.0).abs() < 1e-9);
        assert!((slave[1] - 15.0).abs() < 1e-9);
    }

    #[test]
    fn facet_fit_recovers_a_quadratic_surface() {
        // g(r, c) = 3 + 2r - c + r^2 over a 3x3 patch centered at (1, 1).
        let mut img = ImageF32::new(3, 3);
        for r in 0..3isize {
            for c in 0..3isize {
                let rr = (r - 1) as f32;
                let cc = (c - 1) as f32;
                img.set(r as usize, c as usize, 3.0 + 2.0 * rr - cc + rr * rr);
            }
        }
        let f = fit_facet(&img, 1, 1);
        assert!((f.dr - 2.0).abs() < 1e-5);
        assert!((f.dc + 1.0).abs() < 1e-5);
        assert!((f.drr - 1.0).abs() < 1e-5);
        assert!(f.dcc.abs() < 1e-5);
        assert!(f.drc.abs() < 1e-5);
    }
}
