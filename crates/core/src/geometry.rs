//! Deterministic seed layout.
//!
//! Helices are laid out as ladders, every other primary loop as a cyclic
//! polygon whose sides are the bond length (backbone links), the pair
//! distance (enclosed pairs) or the gap length (strand breaks). Residues the
//! construction does not reach are extrapolated from their placed
//! neighbours.

use nalgebra::Vector2;
use std::f64::consts::PI;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::loops::{decompose, LoopTree};
use crate::types::PairingGraph;

pub type Vec2 = Vector2<f64>;

const TWO_PI: f64 = 2.0 * PI;
const EPS: f64 = 1e-12;

#[derive(Debug, Error)]
enum SeedError {
    #[error("no loop is closed by the pair opening at {0}")]
    MissingLoop(usize),

    #[error("residue {0} breaks the primary nesting")]
    BrokenNesting(usize),

    #[error("residue {0} was not placed before its loop")]
    Unplaced(usize),
}

/// Seed coordinates for every residue of `graph`. Always finite.
pub fn seed(graph: &PairingGraph, config: &LayoutConfig) -> Vec<Vec2> {
    let n = graph.n_bases;
    if n == 0 {
        return vec![];
    }
    let tree = decompose(graph);
    let Some(root) = root_pair(&tree) else {
        return ellipse(n, config.bond_length);
    };

    let mut seeder = Seeder {
        graph,
        tree: &tree,
        config,
        placed: vec![None; n],
    };
    if let Err(e) = seeder.place_from(root) {
        warn!(error = %e, "seeding stopped early, extrapolating from the longest placed run");
        keep_longest_run(&mut seeder.placed);
    }

    let mut placed = seeder.placed;
    for p in placed.iter_mut() {
        if p.is_some_and(|v| !v.iter().all(|c| c.is_finite())) {
            warn!("non-finite seed coordinate, re-extrapolating");
            *p = None;
        }
    }
    extrapolate(&mut placed, config.bond_length)
        .unwrap_or_else(|| ellipse(n, config.bond_length))
}

/// Longest-range pair of the primary nesting; the first one on ties.
fn root_pair(tree: &LoopTree) -> Option<(usize, usize)> {
    tree.external()
        .child_pairs
        .iter()
        .copied()
        .fold(None, |best: Option<(usize, usize)>, (i, j)| match best {
            Some((bi, bj)) if bj - bi >= j - i => best,
            _ => Some((i, j)),
        })
}

struct Seeder<'a> {
    graph: &'a PairingGraph,
    tree: &'a LoopTree,
    config: &'a LayoutConfig,
    placed: Vec<Option<Vec2>>,
}

/// A primary pair already placed whose loop still has to be laid out.
/// `inward` points from the pair into its loop.
struct Task {
    opening: usize,
    inward: Vec2,
}

impl Seeder<'_> {
    fn at(&self, k: usize) -> Result<Vec2, SeedError> {
        self.placed
            .get(k)
            .copied()
            .flatten()
            .ok_or(SeedError::Unplaced(k))
    }

    fn set(&mut self, k: usize, p: Vec2) -> Result<(), SeedError> {
        let slot = self.placed.get_mut(k).ok_or(SeedError::BrokenNesting(k))?;
        if slot.is_none() {
            *slot = Some(p);
        }
        Ok(())
    }

    /// Length of the chord from `from` to `to` along the backbone.
    fn link(&self, from: usize, to: usize) -> f64 {
        if to == from + 1 && self.graph.is_bonded(from) {
            self.config.bond_length
        } else {
            self.config.gap_length
        }
    }

    fn place_from(&mut self, (i0, j0): (usize, usize)) -> Result<(), SeedError> {
        let up = Vec2::new(0.0, 1.0);
        self.set(i0, Vec2::zeros())?;
        self.set(j0, Vec2::new(self.config.pair_distance, 0.0))?;

        let mut stack = vec![Task {
            opening: i0,
            inward: up,
        }];
        if self.tree.external().child_pairs.len() > 1 {
            let (vertices, sides) = self.external_polygon(i0, j0)?;
            stack.extend(self.place_polygon(&vertices, &sides, -up)?);
        }

        // Explicit stack so long stems need no recursion.
        while let Some(task) = stack.pop() {
            stack.extend(self.place_loop(task)?);
        }
        Ok(())
    }

    fn place_loop(&mut self, task: Task) -> Result<Vec<Task>, SeedError> {
        let info = self
            .tree
            .closed_by(task.opening)
            .ok_or(SeedError::MissingLoop(task.opening))?;
        let (i, j) = info.parent_pair.ok_or(SeedError::MissingLoop(task.opening))?;

        if info.is_stack() && self.graph.is_bonded(i) && self.graph.is_bonded(j - 1) {
            let step = task.inward * self.config.bond_length;
            let (a, b) = (self.at(i)?, self.at(j)?);
            self.set(i + 1, a + step)?;
            self.set(j - 1, b + step)?;
            return Ok(vec![Task {
                opening: i + 1,
                inward: task.inward,
            }]);
        }
        if info.child_pairs.is_empty() && info.unpaired_bases.is_empty() {
            return Ok(vec![]);
        }

        let mut vertices = vec![i];
        let mut sides = Vec::new();
        let mut prev = i;
        let mut k = i + 1;
        while k < j {
            sides.push(self.link(prev, k));
            vertices.push(k);
            match self.graph.primary_partner(k) {
                Some(l) if l > k && l < j => {
                    sides.push(self.config.pair_distance);
                    vertices.push(l);
                    prev = l;
                    k = l + 1;
                }
                Some(_) => return Err(SeedError::BrokenNesting(k)),
                None => {
                    prev = k;
                    k += 1;
                }
            }
        }
        sides.push(self.link(prev, j));
        vertices.push(j);
        self.place_polygon(&vertices, &sides, task.inward)
    }

    /// Vertices of the external loop, from the root's closing residue round
    /// the chain ends back to its opening residue.
    fn external_polygon(&self, i0: usize, j0: usize) -> Result<(Vec<usize>, Vec<f64>), SeedError> {
        let n = self.graph.n_bases;
        let mut vertices = vec![j0];
        let mut sides = Vec::new();
        let mut prev = j0;
        let mut skip_to: Option<usize> = None;
        for k in (j0 + 1..n).chain(0..i0) {
            if let Some(l) = skip_to {
                if k == l {
                    skip_to = None;
                }
                continue;
            }
            sides.push(self.link(prev, k));
            vertices.push(k);
            match self.graph.primary_partner(k) {
                Some(l) if l > k => {
                    sides.push(self.config.pair_distance);
                    vertices.push(l);
                    prev = l;
                    skip_to = Some(l);
                }
                Some(_) => return Err(SeedError::BrokenNesting(k)),
                None => prev = k,
            }
        }
        sides.push(self.link(prev, i0));
        vertices.push(i0);
        Ok((vertices, sides))
    }

    /// Place the inner vertices of a cyclic polygon whose first and last
    /// vertices are already placed. `sides[t]` joins `vertices[t]` and
    /// `vertices[t + 1]`; the closing side runs from the last vertex back to
    /// the first. Returns a task for every enclosed pair on the polygon.
    fn place_polygon(
        &mut self,
        vertices: &[usize],
        sides: &[f64],
        inward: Vec2,
    ) -> Result<Vec<Task>, SeedError> {
        let (Some(&first), Some(&last)) = (vertices.first(), vertices.last()) else {
            return Ok(vec![]);
        };
        if vertices.len() < 3 {
            return Ok(vec![]);
        }
        let (a, b) = (self.at(first)?, self.at(last)?);

        let mut all_sides = sides.to_vec();
        all_sides.push((b - a).norm());
        let Some((radius, angles)) = cyclic_polygon(&all_sides) else {
            warn!(?all_sides, "no circumradius for loop polygon, leaving it to extrapolation");
            return Ok(vec![]);
        };
        let closing = angles[sides.len()];
        let center = 0.5 * (a + b) + inward * radius * (0.5 * closing).cos();
        // Orientation in which the path reaches the inward side.
        let turn = if cross(a - b, inward) >= 0.0 { 1.0 } else { -1.0 };

        let mut u = a - center;
        for (t, &k) in vertices.iter().enumerate().skip(1).take(vertices.len() - 2) {
            u = rotate(u, turn * angles[t - 1]);
            self.set(k, center + u)?;
        }
        debug!(
            residues = vertices.len(),
            radius,
            mismatch = (center + rotate(u, turn * angles[sides.len() - 1]) - b).norm(),
            "placed loop polygon"
        );

        let mut tasks = Vec::new();
        for pair in vertices.windows(2) {
            let (k, l) = (pair[0], pair[1]);
            if self.graph.primary_partner(k) != Some(l) || k > l {
                continue;
            }
            let edge = self.at(l)? - self.at(k)?;
            let outward = turn * Vec2::new(edge.y, -edge.x);
            tasks.push(Task {
                opening: k,
                inward: unit(outward, edge),
            });
        }
        Ok(tasks)
    }
}

/// Circumradius and central angles (summing to 2π) of the cyclic polygon
/// with the given side lengths. `None` when the longest side is not shorter
/// than the sum of the others.
pub fn cyclic_polygon(sides: &[f64]) -> Option<(f64, Vec<f64>)> {
    let (longest_at, &longest) = sides
        .iter()
        .enumerate()
        .max_by(|x, y| x.1.total_cmp(y.1))?;
    let total: f64 = sides.iter().sum();
    if !(longest > 0.0) || total - longest <= longest * (1.0 + 1e-9) {
        return None;
    }
    let half = 0.5 * longest;
    let angle = |l: f64, r: f64| 2.0 * (l / (2.0 * r)).min(1.0).asin();
    let slope = |l: f64, r: f64| {
        let s = (l / (2.0 * r)).min(1.0);
        -l / (r * r * (1.0 - s * s).max(EPS).sqrt())
    };

    let inside = |r: f64| {
        let f = sides.iter().map(|&l| angle(l, r)).sum::<f64>() - TWO_PI;
        let df = sides.iter().map(|&l| slope(l, r)).sum::<f64>();
        (f, df)
    };
    if inside(half).0 >= 0.0 {
        let r = newton_radius(inside, half, total)?;
        return Some((r, sides.iter().map(|&l| angle(l, r)).collect()));
    }

    // Centre beyond the longest side: it subtends the reflex angle.
    let outside = |r: f64| {
        let (f_others, df_others) = sides
            .iter()
            .enumerate()
            .filter(|&(k, _)| k != longest_at)
            .fold((0.0, 0.0), |(f, df), (_, &l)| (f + angle(l, r), df + slope(l, r)));
        (f_others - angle(longest, r), df_others - slope(longest, r))
    };
    let mut hi = 2.0 * half;
    while outside(hi).0 <= 0.0 {
        hi *= 2.0;
        if !hi.is_finite() || hi > 1e12 * longest {
            return None;
        }
    }
    let r = newton_radius(outside, half, hi)?;
    let angles = sides
        .iter()
        .enumerate()
        .map(|(k, &l)| {
            if k == longest_at {
                TWO_PI - angle(l, r)
            } else {
                angle(l, r)
            }
        })
        .collect();
    Some((r, angles))
}

/// Safeguarded Newton iteration for a root of `f` in `[lo, hi]`, falling back
/// to bisection whenever a step leaves the bracket.
fn newton_radius(f: impl Fn(f64) -> (f64, f64), mut lo: f64, mut hi: f64) -> Option<f64> {
    let f_lo = f(lo).0;
    let mut r = 0.5 * (lo + hi);
    for _ in 0..200 {
        let (value, derivative) = f(r);
        if !value.is_finite() {
            return None;
        }
        if value.abs() < 1e-13 || hi - lo < 1e-15 * hi.max(1.0) {
            return Some(r);
        }
        if (value > 0.0) == (f_lo > 0.0) {
            lo = r;
        } else {
            hi = r;
        }
        let step = r - value / derivative;
        r = if derivative.abs() > EPS && step > lo && step < hi {
            step
        } else {
            0.5 * (lo + hi)
        };
    }
    Some(r)
}

/// Fill unplaced residues by continuing the line through their two nearest
/// placed neighbours, first towards the 3' end, then towards the 5' end.
/// `None` when nothing was placed.
fn extrapolate(placed: &mut [Option<Vec2>], bond: f64) -> Option<Vec<Vec2>> {
    let n = placed.len();
    let fallback = Vec2::new(1.0, 0.0);
    for k in 1..n {
        if placed[k].is_some() {
            continue;
        }
        if let Some(prev) = placed[k - 1] {
            let heading = match k.checked_sub(2).and_then(|m| placed[m]) {
                Some(before) => unit(prev - before, fallback),
                None => fallback,
            };
            placed[k] = Some(prev + heading * bond);
        }
    }
    for k in (0..n.saturating_sub(1)).rev() {
        if placed[k].is_some() {
            continue;
        }
        if let Some(next) = placed[k + 1] {
            let heading = match placed.get(k + 2).copied().flatten() {
                Some(after) => unit(next - after, -fallback),
                None => -fallback,
            };
            placed[k] = Some(next + heading * bond);
        }
    }
    placed.iter().copied().collect()
}

/// Keep only the longest contiguous run of placed residues.
fn keep_longest_run(placed: &mut [Option<Vec2>]) {
    let mut best = (0, 0);
    let mut start = 0;
    for k in 0..=placed.len() {
        if k == placed.len() || placed[k].is_none() {
            if k - start > best.1 - best.0 {
                best = (start, k);
            }
            start = k + 1;
        }
    }
    for (k, p) in placed.iter_mut().enumerate() {
        if k < best.0 || k >= best.1 {
            *p = None;
        }
    }
}

/// Residues on an open ellipse (minor/major axis ratio 0.6) with chords of
/// exactly `bond`, for chains without pairs.
fn ellipse(n: usize, bond: f64) -> Vec<Vec2> {
    if n <= 1 {
        return vec![Vec2::zeros(); n];
    }
    // Ramanujan's perimeter approximation solved for the major semi-axis.
    let perimeter = (n.max(4) + 2) as f64 * bond;
    let a = perimeter / (PI * (3.0 * 1.6 - (3.6f64 * 2.8).sqrt()));
    let b = 0.6 * a;
    let at = |t: f64| Vec2::new(a * t.cos(), b * t.sin());

    let mut t = 0.0;
    let mut out = Vec::with_capacity(n);
    out.push(at(t));
    for _ in 1..n {
        let start = at(t);
        let (mut lo, mut hi) = (t, t + PI);
        for _ in 0..80 {
            let mid = 0.5 * (lo + hi);
            if (at(mid) - start).norm() < bond {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        t = 0.5 * (lo + hi);
        out.push(at(t));
    }
    out
}

/// Unit vector along `v`. A degenerate `v` falls back to a slightly
/// perturbed perpendicular of `reference`.
pub fn unit(v: Vec2, reference: Vec2) -> Vec2 {
    let norm = v.norm();
    if norm > EPS && norm.is_finite() {
        return v / norm;
    }
    warn!("degenerate direction, using perturbed perpendicular");
    let perp = rotate(Vec2::new(-reference.y, reference.x), 0.05);
    let norm = perp.norm();
    if norm > EPS && norm.is_finite() {
        perp / norm
    } else {
        Vec2::new(1.0, 0.0)
    }
}

pub fn rotate(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

pub fn cross(u: Vec2, v: Vec2) -> f64 {
    u.x * v.y - u.y * v.x
}

/// Rotation that makes the first primary helix point up.
///
/// With a stacked inner pair the direction between the two pair midpoints is
/// used; otherwise the first pair is made horizontal.
pub fn stem_rotation(graph: &PairingGraph, pos: &[Vec2]) -> Option<f64> {
    let i = (0..graph.n_bases).find(|&k| graph.primary_partner(k).is_some_and(|j| k < j))?;
    let j = graph.primary_partner(i)?;

    if i + 1 < j - 1 && graph.primary_partner(i + 1) == Some(j - 1) {
        let outer = 0.5 * (pos[i] + pos[j]);
        let inner = 0.5 * (pos[i + 1] + pos[j - 1]);
        let stem = inner - outer;
        if stem.norm() > EPS {
            return Some(PI / 2.0 - stem.y.atan2(stem.x));
        }
    }

    let bond = pos[j] - pos[i];
    if bond.norm() < EPS {
        return None;
    }
    Some(-bond.y.atan2(bond.x))
}

pub fn rotate_all(pos: &mut [Vec2], angle: f64) {
    for p in pos.iter_mut() {
        *p = rotate(*p, angle);
    }
}

/// Shift so the bounding box is centred on the origin.
pub fn center_coordinates(pos: &mut [Vec2]) {
    if pos.is_empty() {
        return;
    }
    let (mut min, mut max) = (Vec2::repeat(f64::INFINITY), Vec2::repeat(f64::NEG_INFINITY));
    for p in pos.iter() {
        min = min.inf(p);
        max = max.sup(p);
    }
    let shift = -0.5 * (min + max);
    for p in pos.iter_mut() {
        *p += shift;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn seeded(s: &str) -> (PairingGraph, Vec<Vec2>) {
        let graph = parse(s).unwrap();
        let pos = seed(&graph, &LayoutConfig::default());
        (graph, pos)
    }

    #[test]
    fn test_regular_polygon_radius() {
        let (r, angles) = cyclic_polygon(&[1.0; 6]).unwrap();
        assert!((r - 1.0).abs() < 1e-9);
        assert!(angles.iter().all(|a| (a - PI / 3.0).abs() < 1e-9));
    }

    #[test]
    fn test_polygon_with_reflex_side() {
        // One long side: centre lies outside the polygon.
        let sides = [1.9, 1.0, 1.0];
        let (r, angles) = cyclic_polygon(&sides).unwrap();
        let sum: f64 = angles.iter().sum();
        assert!((sum - TWO_PI).abs() < 1e-9);
        assert!(angles[0] > PI);
        for (l, a) in sides.iter().zip(&angles) {
            assert!((2.0 * r * (a / 2.0).sin() - l).abs() < 1e-9);
        }
        assert!(cyclic_polygon(&[2.0, 1.0, 1.0]).is_none());
    }

    #[test]
    fn test_hairpin_seed_is_exact() {
        let (graph, pos) = seeded("((((....))))");
        for (i, j) in graph.pair_list() {
            assert!(((pos[i] - pos[j]).norm() - 1.0).abs() < 1e-9);
        }
        for k in 0..11 {
            assert!(((pos[k + 1] - pos[k]).norm() - 1.0).abs() < 1e-9, "bond {k}");
        }
    }

    #[test]
    fn test_multiloop_seed_is_exact() {
        let (graph, pos) = seeded("..((.((...)).((...))..))...((...)).");
        for (i, j) in graph.pair_list() {
            assert!(((pos[i] - pos[j]).norm() - 1.0).abs() < 1e-9, "pair {i}-{j}");
        }
        for k in 0..graph.n_bases - 1 {
            let expected = if graph.is_bonded(k) { 1.0 } else { 1.5 };
            let d = (pos[k + 1] - pos[k]).norm();
            assert!((d - 1.0).abs() < 1e-9 || (d - expected).abs() < 1e-9, "bond {k}: {d}");
        }
    }

    #[test]
    fn test_unpaired_chain_on_ellipse() {
        let (_, pos) = seeded("..........");
        assert_eq!(pos.len(), 10);
        for w in pos.windows(2) {
            assert!(((w[1] - w[0]).norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_tails_extrapolated() {
        let (_, pos) = seeded("...((...))...");
        assert!(pos.iter().all(|p| p.iter().all(|c| c.is_finite())));
        for w in pos.windows(2) {
            assert!(((w[1] - w[0]).norm() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_keep_longest_run() {
        let p = Some(Vec2::zeros());
        let mut placed = vec![p, None, p, p, p, None, p];
        keep_longest_run(&mut placed);
        assert_eq!(placed, vec![None, None, p, p, p, None, None]);
    }

    #[test]
    fn test_stem_rotation_points_up() {
        let (graph, mut pos) = seeded("((((....))))");
        rotate_all(&mut pos, 1.0);
        let angle = stem_rotation(&graph, &pos).unwrap();
        rotate_all(&mut pos, angle);
        let stem = 0.5 * (pos[1] + pos[10]) - 0.5 * (pos[0] + pos[11]);
        assert!(stem.x.abs() < 1e-9 && stem.y > 0.0);
    }
}
