//! Junction reconstruction from the raw linker output.
//!
//! The raw junction records carry line indices and positions that the
//! splitting stage can leave stale, so this stage rebuilds the junction
//! topology from the geometry alone: every junction point is matched
//! against all lines, the line it crosses in its interior becomes the main
//! line, and main lines are split at interior junction points. Line ids
//! stay stable through the rebuild, which is what the public junctions
//! reference.

use std::collections::HashSet;

use log::{debug, warn};

use crate::link::RawJunction;
use crate::types::{Junction, Line, LineClass, LineId, LineIdGen};

/// Junction record used during reconstruction; refers to lines by index.
#[derive(Clone, Copy, Debug)]
struct JuncRec {
    cont1: usize,
    cont2: usize,
    pos: usize,
    x: f32,
    y: f32,
}

/// Squared-distance scan of a whole line; returns the minimum distance and
/// the index where it is attained. `(x, y)` are (col, row) coordinates.
fn min_distance(line: &Line, x: f32, y: f32) -> (f64, usize) {
    let mut min = f64::MAX;
    let mut index = 0;
    for i in 0..line.num_points() {
        let dx = (line.col[i] - x) as f64;
        let dy = (line.row[i] - y) as f64;
        let d = (dx * dx + dy * dy).sqrt();
        if d < min {
            min = d;
            index = i;
        }
    }
    (min, index)
}

fn reconstruct_class(current: LineClass, at_start: bool, at_end: bool) -> LineClass {
    match current {
        LineClass::NoJunc if at_start => LineClass::StartJunc,
        LineClass::NoJunc if at_end => LineClass::EndJunc,
        LineClass::StartJunc if at_end => LineClass::BothJunc,
        LineClass::EndJunc if at_start => LineClass::BothJunc,
        LineClass::Closed if at_start || at_end => LineClass::BothJunc,
        other => other,
    }
}

/// Drop lines that cannot be valid: single-point lines and the duplicate
/// entries the junction splitting leaves behind.
fn fix_contours(lines: &mut Vec<Line>) {
    let mut seen: HashSet<LineId> = HashSet::new();
    let before = lines.len();
    lines.retain(|l| l.num_points() > 1 && seen.insert(l.id));
    if lines.len() != before {
        debug!("dropped {} degenerate or duplicate lines", before - lines.len());
    }
    for l in lines.iter_mut() {
        l.class = LineClass::NoJunc;
    }
}

/// Rebuild the junction list from the junction point coordinates. Returns
/// the rebuilt records and the set of record indices that must not be used
/// for line splitting.
fn fix_junctions(lines: &[Line], raw: &[RawJunction]) -> (Vec<JuncRec>, HashSet<usize>) {
    let mut recs: Vec<JuncRec> = Vec::new();
    let mut no_split: HashSet<usize> = HashSet::new();
    let mut processed_points: Vec<(f32, f32)> = Vec::new();

    for junc in raw {
        // The raw records store the point as (row, col); the public
        // convention is x along the columns.
        let (x, y) = (junc.y, junc.x);
        if processed_points.iter().any(|&(px, py)| px == x && py == y) {
            continue;
        }
        processed_points.push((x, y));

        let mut main: Option<(usize, usize)> = None;
        let mut secondary: Vec<(usize, usize)> = Vec::new();
        for (idx, l) in lines.iter().enumerate() {
            let (dist, pos) = min_distance(l, x, y);
            if dist < 0.1 {
                if pos == 0 || pos == l.num_points() - 1 {
                    secondary.push((idx, pos));
                } else {
                    if let Some((midx, _)) = main {
                        if lines[midx].id == l.id {
                            continue;
                        }
                        warn!(
                            "two lines cross the junction at ({x}, {y}) in their \
                             interior; using the later one"
                        );
                    }
                    main = Some((idx, pos));
                }
            }
        }

        if let Some((midx, mpos)) = main {
            for &(sidx, _) in &secondary {
                recs.push(JuncRec {
                    cont1: midx,
                    cont2: sidx,
                    pos: mpos,
                    x,
                    y,
                });
            }
        } else {
            // No line passes through the point; cross-link the distinct
            // lines that end here instead.
            warn!("no interior line at junction ({x}, {y}); cross-linking its end points");
            let mut ids_seen: HashSet<LineId> = HashSet::new();
            let mut unique: Vec<(usize, usize)> = Vec::new();
            for &(sidx, spos) in &secondary {
                if ids_seen.insert(lines[sidx].id) {
                    unique.push((sidx, spos));
                }
            }
            for a in 0..unique.len() {
                for b in a + 1..unique.len() {
                    no_split.insert(recs.len());
                    recs.push(JuncRec {
                        cont1: unique[a].0,
                        cont2: unique[b].0,
                        pos: unique[a].1,
                        x,
                        y,
                    });
                }
            }
        }
    }
    (recs, no_split)
}

fn slice_opt(src: &Option<Vec<f32>>, from: usize) -> Option<Vec<f32>> {
    src.as_ref().map(|v| v[from..].to_vec())
}

fn truncate_opt(dst: &mut Option<Vec<f32>>, len: usize) {
    if let Some(v) = dst.as_mut() {
        v.truncate(len);
    }
}

/// Split every main line at its interior junction points, connecting all
/// lines that meet at the same point with each other.
fn split_at_junctions(
    lines: &mut Vec<Line>,
    recs: &mut Vec<JuncRec>,
    mut processed: HashSet<usize>,
    ids: &mut LineIdGen,
) {
    let mut i = 0;
    while i < recs.len() {
        if !processed.insert(i) {
            i += 1;
            continue;
        }
        let (sx, sy) = (recs[i].x, recs[i].y);

        // All junction records sitting on the same point.
        let mut group = vec![i];
        for j in i + 1..recs.len() {
            if !processed.contains(&j)
                && (recs[j].x - sx).abs() < 0.01
                && (recs[j].y - sy).abs() < 0.01
            {
                processed.insert(j);
                group.push(j);
            }
        }

        // Lines running into the point are all pairwise connected.
        let members: Vec<usize> = group.iter().map(|&g| recs[g].cont2).collect();
        for a in 0..members.len() {
            for b in a + 1..members.len() {
                let cont1 = members[a];
                let pos = lines[cont1].start_or_end_position(sx, sy);
                processed.insert(recs.len());
                recs.push(JuncRec {
                    cont1,
                    cont2: members[b],
                    pos,
                    x: sx,
                    y: sy,
                });
            }
        }

        let split = recs[i];
        let num = lines[split.cont1].num_points();
        let l1 = &lines[split.cont1];
        let closed =
            l1.row[0] == l1.row[num - 1] && l1.col[0] == l1.col[num - 1];

        if split.pos != 0 && split.pos != num - 1 && !closed {
            let keep_len = split.pos + 1;

            // Ids of every line meeting at the point, main line included.
            let mut ids_seen: HashSet<LineId> = HashSet::new();
            let mut meet_ids: Vec<LineId> = Vec::new();
            for &g in &group {
                for id in [lines[recs[g].cont1].id, lines[recs[g].cont2].id] {
                    if ids_seen.insert(id) {
                        meet_ids.push(id);
                    }
                }
            }

            let src = &lines[split.cont1];
            let mut tail = Line::new(ids.next_id());
            tail.frame = src.frame;
            tail.class = src.class;
            tail.row = src.row[split.pos..].to_vec();
            tail.col = src.col[split.pos..].to_vec();
            tail.angle = src.angle[split.pos..].to_vec();
            tail.response = src.response[split.pos..].to_vec();
            tail.width_l = slice_opt(&src.width_l, split.pos);
            tail.width_r = slice_opt(&src.width_r, split.pos);
            tail.asymmetry = slice_opt(&src.asymmetry, split.pos);
            tail.intensity = slice_opt(&src.intensity, split.pos);
            lines.push(tail);
            let new_idx = lines.len() - 1;

            // The tail joins every line at the split point.
            for id in meet_ids {
                let Some(other_idx) = lines.iter().position(|l| l.id == id) else {
                    continue;
                };
                let pos = lines[new_idx].start_or_end_position(sx, sy);
                processed.insert(recs.len());
                recs.push(JuncRec {
                    cont1: new_idx,
                    cont2: other_idx,
                    pos,
                    x: sx,
                    y: sy,
                });
            }

            // Records past the split move onto the tail. The main line is
            // still untruncated here so positions refer to the full line.
            for rec in recs.iter_mut() {
                if rec.cont1 == split.cont1 && rec.pos > split.pos {
                    rec.cont1 = new_idx;
                    rec.pos -= split.pos;
                }
                if rec.cont2 == split.cont1 {
                    let (_, mpos) = min_distance(&lines[rec.cont2], rec.x, rec.y);
                    if mpos > split.pos {
                        rec.cont2 = new_idx;
                    }
                }
            }

            let src = &mut lines[split.cont1];
            src.row.truncate(keep_len);
            src.col.truncate(keep_len);
            src.angle.truncate(keep_len);
            src.response.truncate(keep_len);
            truncate_opt(&mut src.width_l, keep_len);
            truncate_opt(&mut src.width_r, keep_len);
            truncate_opt(&mut src.asymmetry, keep_len);
            truncate_opt(&mut src.intensity, keep_len);

            recs[i].pos = lines[split.cont1].start_or_end_position(sx, sy);
        }
        i += 1;
    }
}

/// Rebuild the junction topology and the line classes from the raw linker
/// output. Consumes the raw records and returns the public junction list.
pub(super) fn reconstruct(
    lines: &mut Vec<Line>,
    raw: Vec<RawJunction>,
    ids: &mut LineIdGen,
) -> Vec<Junction> {
    fix_contours(lines);
    let (mut recs, no_split) = fix_junctions(lines, &raw);
    split_at_junctions(lines, &mut recs, no_split, ids);
    recs.sort_by_key(|r| (r.cont1, r.pos));

    for l in lines.iter_mut() {
        let n = l.num_points();
        l.class = if l.row[0] == l.row[n - 1] && l.col[0] == l.col[n - 1] {
            LineClass::Closed
        } else {
            LineClass::NoJunc
        };
    }
    for rec in &recs {
        let n1 = lines[rec.cont1].num_points();
        lines[rec.cont1].class =
            reconstruct_class(lines[rec.cont1].class, rec.pos == 0, rec.pos == n1 - 1);
        let x = lines[rec.cont1].col[rec.pos];
        let y = lines[rec.cont1].row[rec.pos];
        let pos2 = lines[rec.cont2].start_or_end_position(x, y);
        let n2 = lines[rec.cont2].num_points();
        lines[rec.cont2].class =
            reconstruct_class(lines[rec.cont2].class, pos2 == 0, pos2 == n2 - 1);
    }

    recs.iter()
        .map(|r| Junction {
            line1: lines[r.cont1].id,
            line2: lines[r.cont2].id,
            pos: r.pos,
            x: r.x,
            y: r.y,
            is_non_terminal: false,
        })
        .collect()
}

/// Remove lines outside the accepted length range together with the
/// junctions that reference them. A `max_length` of zero means unbounded.
pub(super) fn prune_lines(
    lines: &mut Vec<Line>,
    junctions: &mut Vec<Junction>,
    min_length: f64,
    max_length: f64,
) {
    let mut removed: HashSet<LineId> = HashSet::new();
    lines.retain(|l| {
        let len = l.estimate_length();
        if len < min_length || (max_length > 0.0 && len > max_length) {
            debug!("pruning line {:?} of length {len:.2}", l.id);
            removed.insert(l.id);
            false
        } else {
            true
        }
    });
    junctions.retain(|j| !removed.contains(&j.line1) && !removed.contains(&j.line2));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_line(ids: &mut LineIdGen, points: &[(f32, f32)]) -> Line {
        let mut l = Line::new(ids.next_id());
        for &(r, c) in points {
            l.row.push(r);
            l.col.push(c);
            l.angle.push(0.0);
            l.response.push(1.0);
        }
        l
    }

    #[test]
    fn degenerate_and_duplicate_lines_are_dropped() {
        let mut ids = LineIdGen::new();
        let a = make_line(&mut ids, &[(0.0, 0.0), (0.0, 1.0)]);
        let single = make_line(&mut ids, &[(5.0, 5.0)]);
        let dup = a.clone();
        let mut lines = vec![a, single, dup];
        let junctions = reconstruct(&mut lines, Vec::new(), &mut ids);
        assert_eq!(lines.len(), 1);
        assert!(junctions.is_empty());
    }

    #[test]
    fn t_junction_splits_the_main_line() {
        let mut ids = LineIdGen::new();
        // Main line along row 5, crossed in its interior at col 7 by a
        // vertical line ending there.
        let main_pts: Vec<(f32, f32)> = (0..=10).map(|c| (5.0, c as f32)).collect();
        let side_pts: Vec<(f32, f32)> = (0..=5).map(|r| (r as f32, 7.0)).collect();
        let main = make_line(&mut ids, &main_pts);
        let side = make_line(&mut ids, &side_pts);
        let main_id = main.id;
        let side_id = side.id;
        let mut lines = vec![main, side];
        // Raw record in (row, col) order, as the linker produces it.
        let raw = vec![RawJunction {
            cont1: 0,
            pos: 7,
            x: 5.0,
            y: 7.0,
        }];
        let junctions = reconstruct(&mut lines, raw, &mut ids);

        assert_eq!(lines.len(), 3);
        let head = lines.iter().find(|l| l.id == main_id).unwrap();
        assert_eq!(head.num_points(), 8);
        assert_eq!(head.class, LineClass::EndJunc);
        let tail = lines.iter().find(|l| l.id != main_id && l.id != side_id).unwrap();
        assert_eq!(tail.num_points(), 4);
        assert_eq!(tail.class, LineClass::StartJunc);
        let side = lines.iter().find(|l| l.id == side_id).unwrap();
        assert_eq!(side.class, LineClass::EndJunc);

        // One original junction plus the tail connected to both others.
        assert_eq!(junctions.len(), 3);
        for j in &junctions {
            assert!((j.x - 7.0).abs() < 1e-6);
            assert!((j.y - 5.0).abs() < 1e-6);
            assert!(lines.iter().any(|l| l.id == j.line1));
            assert!(lines.iter().any(|l| l.id == j.line2));
        }
    }

    #[test]
    fn endpoint_meeting_without_interior_line_is_cross_linked() {
        let mut ids = LineIdGen::new();
        let a = make_line(&mut ids, &[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        let b = make_line(&mut ids, &[(4.0, 0.0), (3.0, 1.0), (2.0, 2.0)]);
        let mut lines = vec![a, b];
        let raw = vec![RawJunction {
            cont1: 0,
            pos: 2,
            x: 2.0,
            y: 2.0,
        }];
        let junctions = reconstruct(&mut lines, raw, &mut ids);
        assert_eq!(lines.len(), 2);
        assert_eq!(junctions.len(), 1);
        assert_eq!(junctions[0].line1, lines[0].id);
        assert_eq!(junctions[0].line2, lines[1].id);
        assert_eq!(lines[0].class, LineClass::EndJunc);
        assert_eq!(lines[1].class, LineClass::EndJunc);
    }

    #[test]
    fn pruning_removes_short_lines_and_their_junctions() {
        let mut ids = LineIdGen::new();
        let long_pts: Vec<(f32, f32)> = (0..=20).map(|c| (5.0, c as f32)).collect();
        let long = make_line(&mut ids, &long_pts);
        let short = make_line(&mut ids, &[(5.0, 0.0), (6.0, 0.0)]);
        let short_id = short.id;
        let mut lines = vec![long, short];
        let mut junctions = vec![Junction {
            line1: lines[0].id,
            line2: short_id,
            pos: 0,
            x: 0.0,
            y: 5.0,
            is_non_terminal: false,
        }];
        prune_lines(&mut lines, &mut junctions, 5.0, 0.0);
        assert_eq!(lines.len(), 1);
        assert!(junctions.is_empty());
    }
}
