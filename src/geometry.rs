//! Discrete geometry helpers shared by linking, extension and width
//! estimation.

use crate::image::ImageF32;

/// One step of a discretized directed half-line, in (row, col) offsets from
/// the origin pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Offset {
    pub x: i32,
    pub y: i32,
}

/// Modified Bresenham algorithm. Returns all pixels that are intersected by
/// a half line less than `length` away from the point `(px, py)` along the
/// direction `(nx, ny)`. The point `(px, py)` must lie within the pixel of
/// the origin, i.e. |px| <= 0.5 and |py| <= 0.5.
pub(crate) fn bresenham(nx: f64, ny: f64, px: f64, py: f64, length: f64) -> Vec<Offset> {
    let mut x = 0i32;
    let mut y = 0i32;
    let mut dx = nx.abs();
    let mut dy = ny.abs();
    let s1 = sign(nx);
    let s2 = sign(ny);
    let mut px = px * s1 as f64;
    let mut py = py * s2 as f64;
    let xchg = if dy > dx {
        std::mem::swap(&mut dx, &mut dy);
        std::mem::swap(&mut px, &mut py);
        true
    } else {
        false
    };

    let maxit = (length * dx).ceil() as i32;
    let mut e = (0.5 - px) * dy / dx - (0.5 - py);
    let mut line = Vec::with_capacity((maxit + 1) as usize * 2);
    for _ in 0..=maxit {
        line.push(Offset { x, y });
        while e >= -1e-8 {
            if xchg {
                x += s1;
            } else {
                y += s2;
            }
            e -= 1.0;
            if e > -1.0 {
                line.push(Offset { x, y });
            }
        }
        if xchg {
            y += s2;
        } else {
            x += s1;
        }
        e += dy / dx;
    }
    line
}

#[inline]
fn sign(v: f64) -> i32 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Closest point to `(px, py)` on the line `(lx, ly) + t * (dx, dy)`.
/// Returns `(cx, cy, t)`.
pub(crate) fn closest_point(
    lx: f64,
    ly: f64,
    dx: f64,
    dy: f64,
    px: f64,
    py: f64,
) -> (f64, f64, f64) {
    let mx = px - lx;
    let my = py - ly;
    let den = dx * dx + dy * dy;
    let nom = mx * dx + my * dy;
    let t = if den != 0.0 { nom / den } else { 0.0 };
    (lx + t * dx, ly + t * dy, t)
}

/// Bilinear interpolation of the gradient images at `(px, py)`, given in
/// (row, col) coordinates. The caller must keep the point at least one
/// pixel away from the lower-right border.
pub(crate) fn interpolate_gradient(
    gradx: &ImageF32,
    grady: &ImageF32,
    px: f64,
    py: f64,
) -> (f64, f64) {
    let gix = px.floor() as usize;
    let giy = py.floor() as usize;
    let gfx = px.fract();
    let gfy = py.fract();

    let gx1 = gradx.get(gix, giy) as f64;
    let gy1 = grady.get(gix, giy) as f64;
    let gx2 = gradx.get(gix + 1, giy) as f64;
    let gy2 = grady.get(gix + 1, giy) as f64;
    let gx3 = gradx.get(gix, giy + 1) as f64;
    let gy3 = grady.get(gix, giy + 1) as f64;
    let gx4 = gradx.get(gix + 1, giy + 1) as f64;
    let gy4 = grady.get(gix + 1, giy + 1) as f64;

    let gx = (1.0 - gfy) * ((1.0 - gfx) * gx1 + gfx * gx2) + gfy * ((1.0 - gfx) * gx3 + gfx * gx4);
    let gy = (1.0 - gfy) * ((1.0 - gfx) * gy1 + gfx * gy2) + gfy * ((1.0 - gfx) * gy3 + gfx * gy4);
    (gx, gy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bresenham_walks_along_an_axis() {
        let line = bresenham(1.0, 0.0, 0.0, 0.0, 3.0);
        assert!(line.len() >= 3);
        for (i, o) in line.iter().take(3).enumerate() {
            assert_eq!((o.x, o.y), (i as i32, 0));
        }
    }

    #[test]
    fn bresenham_diagonal_touches_both_neighbors() {
        let line = bresenham(1.0, 1.0, 0.0, 0.0, 2.0);
        // A 45 degree half line crosses pixel corners, so consecutive
        // entries may only differ by one step in one coordinate.
        for w in line.windows(2) {
            let ddx = (w[1].x - w[0].x).abs();
            let ddy = (w[1].y - w[0].y).abs();
            assert!(ddx + ddy >= 1 && ddx <= 1 && ddy <= 1);
        }
    }

    #[test]
    fn closest_point_projects_perpendicularly() {
        let (cx, cy, t) = closest_point(0.0, 0.0, 1.0, 0.0, 3.0, 4.0);
        assert!((cx - 3.0).abs() < 1e-12);
        assert!(cy.abs() < 1e-12);
        assert!((t - 3.0).abs() < 1e-12);
    }

    #[test]
    fn gradient_interpolation_is_bilinear() {
        let mut gx = ImageF32::new(4, 4);
        let gy = ImageF32::new(4, 4);
        for r in 0..4 {
            for c in 0..4 {
                gx.set(r, c, (r + c) as f32);
            }
        }
        let (vx, vy) = interpolate_gradient(&gx, &gy, 1.5, 1.5);
        assert!((vx - 3.0).abs() < 1e-6);
        assert!(vy.abs() < 1e-12);
    }
}
