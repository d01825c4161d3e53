//! Sub-pixel ridge point localization.
//!
//! Overview
//! - Per pixel, diagonalizes the Hessian of the smoothed image in closed
//!   form and takes the eigenvector of the larger absolute eigenvalue as the
//!   normal to the line.
//! - Solves the 1-D Taylor expansion along the normal for the offset that
//!   zeroes the first directional derivative; accepts the point if the
//!   offset stays within an enlarged pixel box.
//! - Classifies accepted points by the hysteresis thresholds into strong
//!   (`ismax == 2`) and weak (`ismax == 1`).

use crate::detector::RidgeMode;
use crate::filter::DerivativeField;
use crate::image::ImageF32;

/// The pixel boundaries need to be enlarged slightly since in practice it
/// frequently happens for neighboring pixels a and b that pixel a says a
/// maximum lies within pixel b and vice versa. This presents no problem
/// since the linking algorithm will take care of it.
pub(crate) const PIXEL_BOUNDARY: f64 = 0.6;

/// Solve `a*t + b = 0`; `None` when the equation is degenerate.
#[inline]
pub(crate) fn solve_linear(a: f64, b: f64) -> Option<f64> {
    if a == 0.0 {
        None
    } else {
        Some(-b / a)
    }
}

/// Eigen decomposition of the symmetric 2×2 Hessian, sorted descending by
/// absolute eigenvalue. Returns `(eigval, eigvec)` where `eigvec[i]` is the
/// unit eigenvector belonging to `eigval[i]`.
pub(crate) fn compute_eigenvals(dfdrr: f64, dfdrc: f64, dfdcc: f64) -> ([f64; 2], [[f64; 2]; 2]) {
    let (c, s, e1, e2);
    if dfdrc != 0.0 {
        let theta = 0.5 * (dfdcc - dfdrr) / dfdrc;
        let mut t = 1.0 / (theta.abs() + (theta * theta + 1.0).sqrt());
        if theta < 0.0 {
            t = -t;
        }
        c = 1.0 / (t * t + 1.0).sqrt();
        s = t * c;
        e1 = dfdrr - t * dfdrc;
        e2 = dfdcc + t * dfdrc;
    } else {
        c = 1.0;
        s = 0.0;
        e1 = dfdrr;
        e2 = dfdcc;
    }
    let n1 = c;
    let n2 = -s;

    // Larger absolute value first; on a tie the negative one first.
    if e1.abs() > e2.abs() || (e1.abs() == e2.abs() && e1 < e2) {
        ([e1, e2], [[n1, n2], [-n2, n1]])
    } else {
        ([e2, e1], [[-n2, n1], [n1, n2]])
    }
}

/// Per-pixel output of the locator, consumed by the linker.
///
/// All grids are pixel-addressed (row-major, same size as the image).
/// `ismax` is 2 for strong points, 1 for weak, 0 otherwise; `ev` is the
/// signed-to-positive response; `(nx, ny)` the normal; `(px, py)` the
/// sub-pixel position in (row, col) order.
pub(crate) struct RidgePointGrid {
    pub ismax: Vec<u8>,
    pub ev: Vec<f32>,
    pub nx: Vec<f32>,
    pub ny: Vec<f32>,
    pub px: Vec<f32>,
    pub py: Vec<f32>,
}

/// For each pixel determine whether a local extremum of the second
/// directional derivative lies within the pixel's (enlarged) boundaries,
/// and classify it against the hysteresis thresholds.
pub(crate) fn compute_line_points(
    deriv: &DerivativeField,
    low: f64,
    high: f64,
    mode: RidgeMode,
) -> RidgePointGrid {
    let width = deriv.r.w;
    let height = deriv.r.h;
    let size = width * height;
    let mut grid = RidgePointGrid {
        ismax: vec![0; size],
        ev: vec![0.0; size],
        nx: vec![0.0; size],
        ny: vec![0.0; size],
        px: vec![0.0; size],
        py: vec![0.0; size],
    };

    for r in 0..height {
        for c in 0..width {
            let l = r * width + c;
            let kr = deriv.r.data[l] as f64;
            let kc = deriv.c.data[l] as f64;
            let krr = deriv.rr.data[l] as f64;
            let krc = deriv.rc.data[l] as f64;
            let kcc = deriv.cc.data[l] as f64;

            let (eigval, eigvec) = compute_eigenvals(krr, krc, kcc);
            let val = match mode {
                RidgeMode::Light => -eigval[0],
                RidgeMode::Dark => eigval[0],
            };
            if val <= 0.0 {
                continue;
            }
            grid.ev[l] = val as f32;
            let n1 = eigvec[0][0];
            let n2 = eigvec[0][1];
            let a = krr * n1 * n1 + 2.0 * krc * n1 * n2 + kcc * n2 * n2;
            let b = kr * n1 + kc * n2;
            if let Some(t) = solve_linear(a, b) {
                let p1 = t * n1;
                let p2 = t * n2;
                if p1.abs() <= PIXEL_BOUNDARY && p2.abs() <= PIXEL_BOUNDARY {
                    if val >= low {
                        grid.ismax[l] = if val >= high { 2 } else { 1 };
                    }
                    grid.nx[l] = n1 as f32;
                    grid.ny[l] = n2 as f32;
                    grid.px[l] = (r as f64 + p1) as f32;
                    grid.py[l] = (c as f64 + p2) as f32;
                }
            }
        }
    }
    grid
}

/// Gradient magnitude of the smoothed image, used by width estimation.
pub(crate) fn gradient_magnitude(deriv: &DerivativeField) -> ImageF32 {
    let mut out = ImageF32::new(deriv.r.w, deriv.r.h);
    for (o, (gr, gc)) in out
        .data
        .iter_mut()
        .zip(deriv.r.data.iter().zip(deriv.c.data.iter()))
    {
        *o = (gr * gr + gc * gc).sqrt();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eigenvals_sorted_by_absolute_value() {
        let (val, vec) = compute_eigenvals(-4.0, 0.0, 1.0);
        assert!((val[0] + 4.0).abs() < 1e-12);
        assert!((val[1] - 1.0).abs() < 1e-12);
        assert!((vec[0][0] - 1.0).abs() < 1e-12);
        assert!(vec[0][1].abs() < 1e-12);
    }

    #[test]
    fn eigen_decomposition_satisfies_definition() {
        let (rr, rc, cc) = (-3.0, 1.5, -1.0);
        let (val, vec) = compute_eigenvals(rr, rc, cc);
        for i in 0..2 {
            let (vx, vy) = (vec[i][0], vec[i][1]);
            // H v = lambda v
            let hx = rr * vx + rc * vy;
            let hy = rc * vx + cc * vy;
            assert!((hx - val[i] * vx).abs() < 1e-10);
            assert!((hy - val[i] * vy).abs() < 1e-10);
            assert!(((vx * vx + vy * vy) - 1.0).abs() < 1e-12);
        }
        assert!(val[0].abs() >= val[1].abs());
    }

    #[test]
    fn solve_linear_handles_degenerate_slope() {
        assert_eq!(solve_linear(0.0, 1.0), None);
        assert_eq!(solve_linear(2.0, -4.0), Some(2.0));
    }
}
