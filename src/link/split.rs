//! Splitting of linked lines at their junction points.

use std::f32::consts::PI;

use crate::types::{Line, LineClass, LineIdGen};

use super::Linker;

impl<'a> Linker<'a> {
    /// Split every line at the junction points recorded on it. A closed
    /// line with exactly one junction is rearranged cyclically instead of
    /// split. Split segments replace the original line; the slot of the
    /// original is overwritten by the last segment, which leaves a
    /// duplicate entry in the raw output that reconstruction removes.
    pub(super) fn split_at_junctions(&mut self, ids: &mut LineIdGen) {
        self.junctions
            .sort_by(|a, b| (a.cont1, a.pos).cmp(&(b.cont1, b.pos)));

        let num_junc = self.junctions.len();
        let mut i = 0;
        while i < num_junc {
            let j = self.junctions[i].cont1;
            // Count how often line j needs to be split.
            let mut k = 0;
            while i + k < num_junc && self.junctions[i + k].cont1 == j {
                k += 1;
            }

            let num_pnt = self.lines[j].num_points();
            let closed = num_pnt > 0
                && self.lines[j].row[0] == self.lines[j].row[num_pnt - 1]
                && self.lines[j].col[0] == self.lines[j].col[num_pnt - 1];
            if k == 1 && closed {
                // Rearrange the closed line cyclically so it starts at the
                // junction, skipping the duplicated starting point.
                let begin = self.junctions[i].pos;
                let cont = &mut self.lines[j];
                let old_row = std::mem::take(&mut cont.row);
                let old_col = std::mem::take(&mut cont.col);
                let old_angle = std::mem::take(&mut cont.angle);
                let old_resp = std::mem::take(&mut cont.response);
                for l in 0..num_pnt {
                    let mut pos = begin + l;
                    if pos >= num_pnt {
                        pos = begin + l - num_pnt + 1;
                    }
                    cont.row.push(old_row[pos]);
                    cont.col.push(old_col[pos]);
                    cont.angle.push(old_angle[pos]);
                    cont.response.push(old_resp[pos]);
                }
                cont.class = LineClass::BothJunc;
            } else {
                let src_class = self.lines[j].class;
                let first_new = self.lines.len();
                for l in 0..=k {
                    let begin = if l == 0 {
                        0
                    } else {
                        self.junctions[i + l - 1].pos
                    };
                    let end = if l == k {
                        num_pnt - 1
                    } else {
                        self.junctions[i + l].pos
                    };
                    let seg_pnt = end - begin + 1;
                    if seg_pnt == 1 && k > 1 {
                        // Do not add one point segments.
                        continue;
                    }
                    let id = ids.next_id();
                    let src = &self.lines[j];
                    let mut seg = Line::new(id);
                    seg.row = src.row[begin..=end].to_vec();
                    seg.col = src.col[begin..=end].to_vec();
                    seg.angle = src.angle[begin..=end].to_vec();
                    seg.response = src.response[begin..=end].to_vec();
                    seg.class = if l == 0 {
                        if matches!(src_class, LineClass::StartJunc | LineClass::BothJunc) {
                            LineClass::BothJunc
                        } else {
                            LineClass::EndJunc
                        }
                    } else if l == k {
                        if matches!(src_class, LineClass::EndJunc | LineClass::BothJunc) {
                            LineClass::BothJunc
                        } else {
                            LineClass::StartJunc
                        }
                    } else {
                        LineClass::BothJunc
                    };
                    self.lines.push(seg);
                }
                // Overwrite the original line with the last segment. The
                // segment stays at the end of the list as well; the later
                // identity dedup drops it.
                if self.lines.len() > first_new {
                    let last = self.lines.last().unwrap().clone();
                    self.lines[j] = last;
                }
            }
            i += k;
        }
    }

    /// Make all stored normal angles point to the right of the line as it
    /// is traversed from start to end, as width estimation assumes.
    pub(super) fn normalize_normal_orientation(&mut self) {
        for cont in &mut self.lines {
            let num_pnt = cont.num_points();
            if num_pnt <= 1 {
                continue;
            }
            // One interior point is enough to determine the orientation,
            // via the z-component of the cross product of the tangent and
            // the normal.
            let k = (num_pnt - 1) / 2;
            let dx = cont.row[k + 1] - cont.row[k];
            let dy = cont.col[k + 1] - cont.col[k];
            let nx = cont.angle[k].cos();
            let ny = cont.angle[k].sin();
            if nx * dy - ny * dx < 0.0 {
                for a in cont.angle.iter_mut() {
                    *a += PI;
                    if *a >= 2.0 * PI {
                        *a -= 2.0 * PI;
                    }
                }
            }
        }
    }
}
