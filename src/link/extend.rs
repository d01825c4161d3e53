//! Extension of lines at their free endpoints.
//!
//! Lines often stop one or two pixels short of a true crossing because the
//! responses of the two structures cancel there. Casting a short search
//! line from each free endpoint along the local line direction, and walking
//! while the image keeps rising (bright lines) or falling (dark lines),
//! recovers these junctions.

use std::f64::consts::PI;

use log::debug;

use crate::geometry::{bresenham, closest_point, interpolate_gradient};
use crate::image::ImageF32;
use crate::types::LineClass;

use super::{orient_normal, Linker, RawJunction};

impl<'a> Linker<'a> {
    /// Try to extend every line at both free ends, up to `2.5 * sigma`
    /// pixels. `s` is the sign by which the gradient is multiplied: +1 for
    /// bright lines, -1 for dark lines.
    pub(super) fn extend_lines(&mut self, gradx: &ImageF32, grady: &ImageF32, sigma: f64, s: f64) {
        let length = 2.5 * sigma;
        let num_cont = self.lines.len();
        let mut extensions = 0usize;

        for i in 0..num_cont {
            let num_pnt = self.lines[i].num_points();
            if num_pnt == 1 || self.lines[i].class == LineClass::Closed {
                continue;
            }
            // it == -1: start of the line, it == 1: end.
            for it in [-1i32, 1] {
                let cont = &self.lines[i];
                let num_pnt = cont.num_points();
                // The stored normal may point to either side of the line,
                // so compare it to the direction of the line at the end
                // point to decide which way to rotate it.
                let (dx, dy, alpha, px, py, response) = if it == -1 {
                    if matches!(cont.class, LineClass::StartJunc | LineClass::BothJunc) {
                        continue;
                    }
                    (
                        (cont.row[1] - cont.row[0]) as f64,
                        (cont.col[1] - cont.col[0]) as f64,
                        cont.angle[0] as f64,
                        cont.row[0] as f64,
                        cont.col[0] as f64,
                        cont.response[0],
                    )
                } else {
                    if matches!(cont.class, LineClass::EndJunc | LineClass::BothJunc) {
                        continue;
                    }
                    (
                        (cont.row[num_pnt - 1] - cont.row[num_pnt - 2]) as f64,
                        (cont.col[num_pnt - 1] - cont.col[num_pnt - 2]) as f64,
                        cont.angle[num_pnt - 1] as f64,
                        cont.row[num_pnt - 1] as f64,
                        cont.col[num_pnt - 1] as f64,
                        cont.response[num_pnt - 1],
                    )
                };
                let nx = alpha.cos();
                let ny = alpha.sin();
                let left_of_line = nx * dy - ny * dx < 0.0;
                let (mx, my) = match (it, left_of_line) {
                    (-1, true) | (1, false) => (-ny, nx),
                    _ => (ny, -nx),
                };

                let x = (px + 0.5).floor() as isize;
                let y = (py + 0.5).floor() as isize;
                let offs = bresenham(mx, my, px - x as f64, py - y as f64, length);

                // Walk outward while the intensity still changes in our
                // favor, collecting candidate points, until another line is
                // hit or the slope reverses.
                let mut ext: Vec<(f32, f32)> = Vec::new();
                let mut hit: Option<(usize, usize)> = None;
                for o in &offs {
                    let nextx = x + o.x as isize;
                    let nexty = y + o.y as isize;
                    let (nextpx, nextpy, t) =
                        closest_point(px, py, mx, my, nextx as f64, nexty as f64);
                    // Ignore points less than half a pixel away from the
                    // true end point of the line.
                    if t <= 0.5 {
                        continue;
                    }
                    if nextpx < 0.0
                        || nextpy < 0.0
                        || nextpx >= (self.height - 1) as f64
                        || nextpy >= (self.width - 1) as f64
                        || nextx < 0
                        || nexty < 0
                        || nextx >= self.height as isize
                        || nexty >= self.width as isize
                    {
                        break;
                    }
                    let (gx, gy) = interpolate_gradient(gradx, grady, nextpx, nextpy);
                    let nextpos = self.pos(nextx as usize, nexty as usize);
                    if s * (mx * gx + my * gy) < 0.0 && self.label[nextpos] == 0 {
                        break;
                    }
                    if self.label[nextpos] > 0 {
                        let m = (self.label[nextpos] - 1) as usize;
                        // Locate the junction point on the other line.
                        let other = &self.lines[m];
                        let mut mindist = f64::MAX;
                        let mut j = 0usize;
                        for l in 0..other.num_points() {
                            let ddx = nextpx - other.row[l] as f64;
                            let ddy = nextpy - other.col[l] as f64;
                            let dist = (ddx * ddx + ddy * ddy).sqrt();
                            if dist < mindist {
                                mindist = dist;
                                j = l;
                            }
                        }
                        if mindist > 3.0 {
                            break;
                        }
                        ext.push((other.row[j], other.col[j]));
                        hit = Some((m, j));
                        break;
                    }
                    ext.push((nextpx as f32, nextpy as f32));
                }

                let Some((m, j)) = hit else { continue };
                let num_add = ext.len();
                extensions += 1;

                // Normal angle and response at the splice point come from
                // the other line, oriented consistently with this one.
                let other = &self.lines[m];
                let end_resp = other.response[j];
                let mut b = other.angle[j] as f64;
                if b >= PI {
                    b -= PI;
                }
                let end_angle = orient_normal(b, alpha) as f32;
                let other_num = other.num_points();
                let &(jx, jy) = ext.last().unwrap();

                let cont = &mut self.lines[i];
                if it == -1 {
                    for &(r, c) in &ext {
                        cont.row.insert(0, r);
                        cont.col.insert(0, c);
                        cont.angle.insert(0, alpha as f32);
                        cont.response.insert(0, response);
                    }
                    cont.angle[0] = end_angle;
                    cont.response[0] = end_resp;
                    // Junction positions within this line move up.
                    for junc in self.junctions.iter_mut() {
                        if junc.cont1 == i {
                            junc.pos += num_add;
                        }
                    }
                } else {
                    for &(r, c) in &ext {
                        cont.row.push(r);
                        cont.col.push(c);
                        cont.angle.push(alpha as f32);
                        cont.response.push(response);
                    }
                    let last = cont.num_points() - 1;
                    cont.angle[last] = end_angle;
                    cont.response[last] = end_resp;
                }

                // Record the junction only if it is not one of the other
                // line's endpoints.
                if j > 0 && j < other_num - 1 {
                    let cont = &mut self.lines[i];
                    cont.class = if it == -1 {
                        if cont.class == LineClass::EndJunc {
                            LineClass::BothJunc
                        } else {
                            LineClass::StartJunc
                        }
                    } else if cont.class == LineClass::StartJunc {
                        LineClass::BothJunc
                    } else {
                        LineClass::EndJunc
                    };
                    self.junctions.push(RawJunction {
                        cont1: m,
                        pos: j,
                        x: jx,
                        y: jy,
                    });
                }
            }
        }
        if extensions > 0 {
            debug!("extended {extensions} line ends into junctions");
        }
    }
}
