//! Merging of line fragments across crossings by straightness.
//!
//! At a crossing the linker splits both lines into fragments. A straight
//! passover is more likely than two touching turns, so the fragments whose
//! merge stays straightest are joined back together:
//!
//! - an enclosed fragment (junctions on both of its endpoints) is the
//!   overlap region itself and is merged with its best partner on each side
//! - three or more fragments meeting at one point form an n-way crossing
//!   and are paired off greedily by straightness
//!
//! Merged lines get a fresh id. Junction records referencing a merged
//! fragment are rewritten to the merged line, deduplicated, and marked as
//! non-terminal when the junction point ends up in the interior of both
//! lines.

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::types::{Junction, Line, LineClass, LineId, LineIdGen};

/// Two endpoints closer than this (per axis) count as the same crossing.
const SIGMA: f32 = 2.0;
/// Arc distance from the junction used to sample a fragment's direction.
const SLOPE_DIST: usize = 5;
/// Largest path-to-chord ratio still accepted as straight while sampling.
const STRAIGHT_TOLERANCE: f32 = 1.02;

#[inline]
fn point(line: &Line, i: usize) -> (f32, f32) {
    (line.col[i], line.row[i])
}

#[inline]
fn close(p: (f32, f32), q: (f32, f32), threshold: f32) -> bool {
    (p.0 - q.0).abs() < threshold && (p.1 - q.1).abs() < threshold
}

fn dist(p: (f32, f32), q: (f32, f32)) -> f32 {
    (p.0 - q.0).hypot(p.1 - q.1)
}

/// Path length over the points divided by the end-to-end distance; 1 is
/// perfectly straight.
fn straight_calc(points: &[(f32, f32)]) -> f32 {
    let ideal = dist(points[0], points[points.len() - 1]);
    let mut sum = 0.0;
    for w in points.windows(2) {
        sum += dist(w[0], w[1]);
    }
    sum / ideal
}

/// Does an endpoint of `query` touch the start of `target`?
fn intersects_start(target: &Line, query: &Line) -> bool {
    let t = point(target, 0);
    close(t, point(query, 0), SIGMA) || close(t, point(query, query.num_points() - 1), SIGMA)
}

/// Does an endpoint of `query` touch the end of `target`?
fn intersects_end(target: &Line, query: &Line) -> bool {
    let t = point(target, target.num_points() - 1);
    close(t, point(query, 0), SIGMA) || close(t, point(query, query.num_points() - 1), SIGMA)
}

fn intersects(l1: &Line, l2: &Line) -> bool {
    intersects_start(l1, l2) || intersects_end(l1, l2)
}

/// Sample point of `query` used for slope comparison: walk away from `p1`
/// in steps of [`SLOPE_DIST`] while the sampled path stays straight within
/// [`STRAIGHT_TOLERANCE`], or until the far end of the line.
fn intercept_point(p1: (f32, f32), query: &Line) -> (f32, f32) {
    let n = query.num_points();
    let from_start = close(p1, point(query, 0), SIGMA);
    let mut points = vec![p1];
    let mut d = 0;
    loop {
        d += SLOPE_DIST;
        let pos = if from_start {
            d.min(n - 1)
        } else {
            n.saturating_sub(1 + d)
        };
        let p2 = point(query, pos);
        if pos == 0 || pos == n - 1 {
            return p2;
        }
        points.push(p2);
        if straight_calc(&points) > STRAIGHT_TOLERANCE {
            return points[points.len() - 2];
        }
    }
}

/// Resolve overlaps in `lines`, rewriting `junctions` in place. Returns the
/// resolved line list.
pub(crate) fn resolve_slope_overlap(
    lines: Vec<Line>,
    junctions: &mut Vec<Junction>,
    ids: &mut LineIdGen,
) -> Vec<Line> {
    let n = lines.len();
    let index_of = |id: LineId| lines.iter().position(|l| l.id == id);

    // Which lines have a junction sitting exactly on their start or end.
    let mut start_match = vec![false; n];
    let mut end_match = vec![false; n];
    for j in junctions.iter() {
        for id in [j.line1, j.line2] {
            let Some(i) = index_of(id) else { continue };
            let l = &lines[i];
            if point(l, 0) == (j.x, j.y) {
                start_match[i] = true;
            }
            if point(l, l.num_points() - 1) == (j.x, j.y) {
                end_match[i] = true;
            }
        }
    }

    let mut enclosed: Vec<usize> = (0..n).filter(|&i| start_match[i] && end_match[i]).collect();
    let t_sections: Vec<usize> = (0..n)
        .filter(|&i| (start_match[i] || end_match[i]) && !enclosed.contains(&i))
        .collect();

    // Group the non-enclosed fragments into sets meeting at one point.
    let mut line_sets: Vec<Vec<usize>> = Vec::new();
    for &l1 in &t_sections {
        let found = line_sets
            .iter_mut()
            .find(|set| set.iter().any(|&l2| intersects(&lines[l1], &lines[l2])));
        match found {
            Some(set) => set.push(l1),
            None => line_sets.push(vec![l1]),
        }
    }
    let n_way: Vec<Vec<usize>> = line_sets.into_iter().filter(|s| s.len() >= 3).collect();

    // An enclosed fragment surrounded by enclosed fragments on both sides
    // is in the middle of a chain of overlaps and cannot be resolved.
    loop {
        let mut to_remove = None;
        for (k, &l1) in enclosed.iter().enumerate() {
            let mut found_start = false;
            let mut found_end = false;
            for &l2 in &enclosed {
                if l2 == l1 {
                    continue;
                } else if intersects_start(&lines[l1], &lines[l2]) {
                    found_start = true;
                } else if intersects_end(&lines[l1], &lines[l2]) {
                    found_end = true;
                }
                if found_start && found_end {
                    break;
                }
            }
            if found_start && found_end {
                to_remove = Some(k);
            }
        }
        match to_remove {
            Some(k) => {
                enclosed.remove(k);
            }
            None => break,
        }
    }

    // Lines touching each enclosed fragment, separated by which of its
    // ends they touch.
    let mut start_isect: HashMap<usize, Vec<usize>> = HashMap::new();
    let mut end_isect: HashMap<usize, Vec<usize>> = HashMap::new();
    for &e in &enclosed {
        let mut at_start = Vec::new();
        let mut at_end = Vec::new();
        for (i, l2) in lines.iter().enumerate() {
            if i == e {
                continue;
            } else if intersects_start(&lines[e], l2) {
                at_start.push(i);
            } else if intersects_end(&lines[e], l2) {
                at_end.push(i);
            }
        }
        start_isect.insert(e, at_start);
        end_isect.insert(e, at_end);
    }

    // Greedy pairing across each enclosed fragment.
    let mut merges: Vec<Vec<usize>> = Vec::new();
    for &e in &enclosed {
        let mut start_lines = start_isect[&e].clone();
        let mut end_lines = end_isect[&e].clone();
        let es = point(&lines[e], 0);
        let ee = point(&lines[e], lines[e].num_points() - 1);
        let mut start_points: Vec<(f32, f32)> = start_lines
            .iter()
            .map(|&l| intercept_point(es, &lines[l]))
            .collect();
        let mut end_points: Vec<(f32, f32)> = end_lines
            .iter()
            .map(|&l| intercept_point(ee, &lines[l]))
            .collect();

        while !start_lines.is_empty() && !end_lines.is_empty() {
            let mut best = (0usize, 0usize);
            let mut min_straightness = f32::MAX;
            for i in 0..start_lines.len() {
                for j in 0..end_lines.len() {
                    let s = straight_calc(&[start_points[i], es, ee, end_points[j]]);
                    if s < min_straightness {
                        min_straightness = s;
                        best = (i, j);
                    }
                }
            }
            merges.push(vec![
                start_lines.remove(best.0),
                e,
                end_lines.remove(best.1),
            ]);
            start_points.remove(best.0);
            end_points.remove(best.1);
        }
        // Unmatched lines stay as they are.
        let unmatched = if start_lines.is_empty() {
            end_lines
        } else {
            start_lines
        };
        for l in unmatched {
            merges.push(vec![l]);
        }
    }

    // Join merges that continue each other into one chain.
    let mut i = 0;
    let mut j = 1;
    while j < merges.len() {
        if merges[i][0] == *merges[j].last().unwrap() {
            let mut head = merges.remove(i);
            head.remove(0);
            merges[j - 1].extend(head);
            i = 0;
            j = 1;
        } else if merges[j][0] == *merges[i].last().unwrap() {
            let mut tail = merges.remove(j);
            tail.remove(0);
            merges[i].extend(tail);
            i = 0;
            j = 1;
        } else {
            j += 1;
            if j == merges.len() {
                i += 1;
                j = i + 1;
            }
        }
    }

    // Pair off the fragments of each n-way crossing by straightness.
    for mut set in n_way {
        let test = set[0];
        let idx = if intersects_end(&lines[test], &lines[set[1]]) {
            lines[test].num_points() - 1
        } else {
            0
        };
        let junction_pt = point(&lines[test], idx);

        while set.len() > 1 {
            let mut best = (0usize, 1usize);
            let mut min_straightness = f32::MAX;
            for a in 0..set.len() {
                let icept = intercept_point(junction_pt, &lines[set[a]]);
                for b in a + 1..set.len() {
                    let jcept = intercept_point(junction_pt, &lines[set[b]]);
                    let s = straight_calc(&[icept, junction_pt, jcept]);
                    if s < min_straightness {
                        min_straightness = s;
                        best = (a, b);
                    }
                }
            }
            merges.push(vec![set[best.0], set[best.1]]);
            set.remove(best.0);
            set.remove(best.1 - 1);
        }
        if set.len() == 1 {
            merges.push(set);
        }
    }

    // Perform the merges.
    let mut line_map: HashMap<LineId, LineId> = HashMap::new();
    let mut consumed: HashSet<usize> = HashSet::new();
    let mut merged_lines: Vec<Line> = Vec::new();
    for merge in &merges {
        if merge.len() == 1 {
            continue;
        }
        let mut out = Line::new(ids.next_id());
        out.frame = lines[merge[0]].frame;
        out.class = LineClass::NoJunc;
        let any_width = merge.iter().any(|&m| lines[m].width_l.is_some());
        let any_corr = merge.iter().any(|&m| lines[m].asymmetry.is_some());
        if any_width {
            out.width_l = Some(Vec::new());
            out.width_r = Some(Vec::new());
        }
        if any_corr {
            out.asymmetry = Some(Vec::new());
            out.intensity = Some(Vec::new());
        }
        for (k, &m) in merge.iter().enumerate() {
            let adjacent = if k == 0 { merge[1] } else { merge[k - 1] };
            // Orient the fragment so the walk through the merged line stays
            // continuous: reverse it when its head touches the next
            // fragment, or its tail the previous one.
            let reverse = if k == 0 {
                intersects_start(&lines[m], &lines[adjacent])
            } else {
                intersects_end(&lines[m], &lines[adjacent])
            };
            append_fragment(&mut out, &lines[m], reverse);
            line_map.insert(lines[m].id, out.id);
            consumed.insert(m);
        }
        debug!(
            "merged {} fragments into line {:?} ({} points)",
            merge.len(),
            out.id,
            out.num_points()
        );
        merged_lines.push(out);
    }

    let mut resolved: Vec<Line> = lines
        .into_iter()
        .enumerate()
        .filter(|(k, _)| !consumed.contains(k))
        .map(|(_, l)| l)
        .collect();
    resolved.extend(merged_lines);

    // Rewrite junction references to the merged lines.
    let mut updated: Vec<usize> = Vec::new();
    for (k, junc) in junctions.iter_mut().enumerate() {
        let mut touched = false;
        if let Some(&m) = line_map.get(&junc.line1) {
            junc.line1 = m;
            touched = true;
        }
        if let Some(&m) = line_map.get(&junc.line2) {
            junc.line2 = m;
            touched = true;
        }
        if touched {
            updated.push(k);
        }
    }

    // Drop junctions made redundant by the merges: self references and
    // repeated line pairs at the same point.
    let mut seen_keys: HashSet<(LineId, LineId, u32, u32)> = HashSet::new();
    let mut drop: HashSet<usize> = HashSet::new();
    for &k in &updated {
        let junc = &junctions[k];
        let key = (
            junc.line1.min(junc.line2),
            junc.line1.max(junc.line2),
            junc.x.to_bits(),
            junc.y.to_bits(),
        );
        if junc.line1 == junc.line2 || !seen_keys.insert(key) {
            drop.insert(k);
        }
    }
    let mut survivors = Vec::with_capacity(junctions.len());
    let mut surviving_updated: Vec<usize> = Vec::new();
    for (k, junc) in junctions.drain(..).enumerate() {
        if drop.contains(&k) {
            continue;
        }
        if updated.contains(&k) {
            surviving_updated.push(survivors.len());
        }
        survivors.push(junc);
    }
    *junctions = survivors;

    // Re-derive positions, terminal flags and line classes for the
    // junctions that were touched.
    for &k in &surviving_updated {
        let nt1 = process_line(&mut resolved, &mut junctions[k], true);
        let nt2 = process_line(&mut resolved, &mut junctions[k], false);
        junctions[k].is_non_terminal = nt1 && nt2;
    }

    resolved
}

fn append_fragment(out: &mut Line, src: &Line, reverse: bool) {
    let n = src.num_points();
    let order: Box<dyn Iterator<Item = usize>> = if reverse {
        Box::new((0..n).rev())
    } else {
        Box::new(0..n)
    };
    let push_opt = |dst: &mut Option<Vec<f32>>, src_arr: &Option<Vec<f32>>, i: usize| {
        if let Some(v) = dst.as_mut() {
            v.push(src_arr.as_ref().map_or(0.0, |a| a[i]));
        }
    };
    for i in order {
        out.row.push(src.row[i]);
        out.col.push(src.col[i]);
        out.angle.push(src.angle[i]);
        out.response.push(src.response[i]);
        push_opt(&mut out.width_l, &src.width_l, i);
        push_opt(&mut out.width_r, &src.width_r, i);
        push_opt(&mut out.asymmetry, &src.asymmetry, i);
        push_opt(&mut out.intensity, &src.intensity, i);
    }
}

/// Locate the junction point on one of its lines, update the junction
/// position (for the first line) and the line class when the point sits on
/// a terminal. Returns true when the point is in the line's interior.
fn process_line(lines: &mut [Line], junc: &mut Junction, first: bool) -> bool {
    let id = if first { junc.line1 } else { junc.line2 };
    let Some(line) = lines.iter_mut().find(|l| l.id == id) else {
        return false;
    };
    let n = line.num_points();
    let mut pos: Option<usize> = None;
    for i in 0..n {
        if line.col[i] == junc.x && line.row[i] == junc.y {
            pos = Some(i);
            break;
        }
    }
    if first {
        if let Some(p) = pos {
            junc.pos = p;
        }
    }
    if line.class != LineClass::BothJunc {
        if pos == Some(0) {
            line.class = if line.class == LineClass::EndJunc {
                LineClass::BothJunc
            } else {
                LineClass::StartJunc
            };
        } else if pos == Some(n - 1) {
            line.class = if line.class == LineClass::StartJunc {
                LineClass::BothJunc
            } else {
                LineClass::EndJunc
            };
        }
    }
    !(pos == Some(0) || pos == Some(n - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(ids: &mut LineIdGen, points: &[(f32, f32)]) -> Line {
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
    fn straightness_is_one_for_collinear_points() {
        let s = straight_calc(&[(0.0, 0.0), (5.0, 5.0), (10.0, 10.0)]);
        assert!((s - 1.0).abs() < 1e-6);
        let bent = straight_calc(&[(0.0, 0.0), (5.0, 5.0), (0.0, 10.0)]);
        assert!(bent > 1.3);
    }

    #[test]
    fn x_crossing_fragments_merge_into_straight_pairs() {
        let mut ids = LineIdGen::new();
        // Four fragments of an X meeting at (row 5, col 5).
        let a: Vec<(f32, f32)> = (0..=5).map(|k| (k as f32, k as f32)).collect();
        let b: Vec<(f32, f32)> = (5..=10).map(|k| (k as f32, k as f32)).collect();
        let c: Vec<(f32, f32)> = (0..=5).map(|k| (k as f32, 10.0 - k as f32)).collect();
        let d: Vec<(f32, f32)> = (5..=10).map(|k| (k as f32, 10.0 - k as f32)).collect();
        let lines = vec![
            fragment(&mut ids, &a),
            fragment(&mut ids, &b),
            fragment(&mut ids, &c),
            fragment(&mut ids, &d),
        ];
        let (ida, idb, idc, idd) = (lines[0].id, lines[1].id, lines[2].id, lines[3].id);
        let mut junctions = vec![
            Junction {
                line1: ida,
                line2: idc,
                pos: 5,
                x: 5.0,
                y: 5.0,
                is_non_terminal: false,
            },
            Junction {
                line1: ida,
                line2: idd,
                pos: 5,
                x: 5.0,
                y: 5.0,
                is_non_terminal: false,
            },
            Junction {
                line1: idb,
                line2: idc,
                pos: 0,
                x: 5.0,
                y: 5.0,
                is_non_terminal: false,
            },
        ];

        let resolved = resolve_slope_overlap(lines, &mut junctions, &mut ids);

        assert_eq!(resolved.len(), 2);
        for line in &resolved {
            assert_eq!(line.num_points(), 12);
            // Each merged line runs continuously through the crossing.
            for w in 1..line.num_points() {
                let step = (line.row[w] - line.row[w - 1])
                    .hypot(line.col[w] - line.col[w - 1]);
                assert!(step < 2.0, "discontinuous merge, step {step}");
            }
        }
        assert_eq!(junctions.len(), 1);
        assert!(junctions[0].is_non_terminal);
        assert_ne!(junctions[0].line1, junctions[0].line2);
    }

    #[test]
    fn isolated_lines_are_untouched() {
        let mut ids = LineIdGen::new();
        let a: Vec<(f32, f32)> = (0..=5).map(|k| (k as f32, k as f32)).collect();
        let lines = vec![fragment(&mut ids, &a)];
        let id = lines[0].id;
        let mut junctions = Vec::new();
        let resolved = resolve_slope_overlap(lines, &mut junctions, &mut ids);
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, id);
    }
}
