//! 2d edge/polygon engine used by sketch profile extraction and shell
//! trimming (§4.7).
//!
//! The teacher has no 2d profile code; this is grounded in the same
//! "assemble loose pieces into a closed topology, then validate" shape as
//! `compiler::intent_parser::IntentParser::parse`, which stitches a flat
//! list of primitives/operations into one evaluated tree by repeated
//! lookup. `SEdgeList::assemble_polygon` does the analogous stitch for
//! edges: repeatedly pop an edge whose start matches the growing chain's
//! open end, until every edge has been consumed into a closed contour or
//! the sketch is reported as open (spec.md's `BooleanOutcome::OpenContour`).

use nalgebra::Point2;

use crate::units::Tolerances;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SEdge2d {
    pub a: Point2<f64>,
    pub b: Point2<f64>,
}

impl SEdge2d {
    pub fn new(a: Point2<f64>, b: Point2<f64>) -> Self {
        SEdge2d { a, b }
    }

    pub fn reversed(&self) -> SEdge2d {
        SEdge2d::new(self.b, self.a)
    }

    pub fn length(&self) -> f64 {
        (self.b - self.a).norm()
    }
}

/// A loose bag of 2d edges, not yet known to form one or more closed loops.
#[derive(Debug, Clone, Default)]
pub struct SEdgeList {
    pub edges: Vec<SEdge2d>,
}

impl SEdgeList {
    pub fn new() -> Self {
        SEdgeList::default()
    }

    pub fn push(&mut self, edge: SEdge2d) {
        self.edges.push(edge);
    }

    /// Removes exact and reversed-exact duplicate edges (coincident
    /// construction geometry double-covering the same boundary), within
    /// `tol.length_eps`.
    pub fn cull_duplicates(&mut self, tol: &Tolerances) {
        let mut kept: Vec<SEdge2d> = Vec::with_capacity(self.edges.len());
        'outer: for e in &self.edges {
            for k in &kept {
                let same = (k.a - e.a).norm() < tol.length_eps && (k.b - e.b).norm() < tol.length_eps;
                let reversed = (k.a - e.b).norm() < tol.length_eps && (k.b - e.a).norm() < tol.length_eps;
                if same || reversed {
                    continue 'outer;
                }
            }
            kept.push(*e);
        }
        self.edges = kept;
    }

    /// Two passes of a plane sweep would be the production approach; for
    /// the sketch sizes spec.md targets, an O(n^2) pairwise segment test is
    /// within budget and simpler to keep correct.
    pub fn any_edge_crossings(&self, tol: &Tolerances) -> bool {
        for i in 0..self.edges.len() {
            for j in (i + 1)..self.edges.len() {
                if segments_properly_cross(&self.edges[i], &self.edges[j], tol.length_eps) {
                    return true;
                }
            }
        }
        false
    }

    /// Splits every edge at any point where another edge's endpoint lies
    /// strictly in its interior, so that downstream assembly never has to
    /// reason about T-junctions.
    pub fn copy_breaking(&self, tol: &Tolerances) -> SEdgeList {
        let mut out = SEdgeList::new();
        for e in &self.edges {
            let mut cut_params = vec![0.0, 1.0];
            for other in &self.edges {
                for endpoint in [other.a, other.b] {
                    if let Some(t) = param_of_point_on_segment(e, endpoint, tol.length_eps) {
                        if t > tol.length_eps && t < 1.0 - tol.length_eps {
                            cut_params.push(t);
                        }
                    }
                }
            }
            cut_params.sort_by(|x, y| x.partial_cmp(y).unwrap());
            cut_params.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
            for w in cut_params.windows(2) {
                let p0 = lerp(e.a, e.b, w[0]);
                let p1 = lerp(e.a, e.b, w[1]);
                if (p1 - p0).norm() > tol.length_eps {
                    out.push(SEdge2d::new(p0, p1));
                }
            }
        }
        out
    }

    /// Chains edges into closed contours by repeatedly following whichever
    /// remaining edge starts where the current chain ends. Returns one
    /// contour per maximal closed loop; any edges left over (an open
    /// chain) are reported as an error, matching spec.md's
    /// `BooleanOutcome::OpenContour`.
    pub fn assemble_polygon(&self, tol: &Tolerances) -> Result<Vec<Vec<Point2<f64>>>, String> {
        let mut remaining = self.edges.clone();
        let mut contours = Vec::new();

        while !remaining.is_empty() {
            let start_edge = remaining.remove(0);
            let mut contour = vec![start_edge.a, start_edge.b];
            let mut current = start_edge.b;
            let start = start_edge.a;

            loop {
                if (current - start).norm() < tol.length_eps {
                    break;
                }
                let next_idx = remaining.iter().position(|e| (e.a - current).norm() < tol.length_eps);
                let next_idx_rev = remaining.iter().position(|e| (e.b - current).norm() < tol.length_eps);
                match (next_idx, next_idx_rev) {
                    (Some(i), _) => {
                        let e = remaining.remove(i);
                        current = e.b;
                        contour.push(current);
                    }
                    (None, Some(i)) => {
                        let e = remaining.remove(i);
                        current = e.a;
                        contour.push(current);
                    }
                    (None, None) => {
                        return Err(format!(
                            "open contour: no edge continues from ({:.6}, {:.6})",
                            current.x, current.y
                        ));
                    }
                }
            }
            contour.pop(); // last point duplicates the first, closing the loop
            contours.push(contour);
        }
        Ok(contours)
    }
}

fn lerp(a: Point2<f64>, b: Point2<f64>, t: f64) -> Point2<f64> {
    Point2::from(a.coords * (1.0 - t) + b.coords * t)
}

fn param_of_point_on_segment(e: &SEdge2d, p: Point2<f64>, eps: f64) -> Option<f64> {
    let d = e.b - e.a;
    let len_sq = d.norm_squared();
    if len_sq < eps * eps {
        return None;
    }
    let t = (p - e.a).dot(&d) / len_sq;
    let closest = lerp(e.a, e.b, t.clamp(0.0, 1.0));
    if (closest - p).norm() < eps {
        Some(t)
    } else {
        None
    }
}

fn orient(a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

fn segments_properly_cross(e1: &SEdge2d, e2: &SEdge2d, eps: f64) -> bool {
    let d1 = orient(e2.a, e2.b, e1.a);
    let d2 = orient(e2.a, e2.b, e1.b);
    let d3 = orient(e1.a, e1.b, e2.a);
    let d4 = orient(e1.a, e1.b, e2.b);
    if ((d1 > eps && d2 < -eps) || (d1 < -eps && d2 > eps))
        && ((d3 > eps && d4 < -eps) || (d3 < -eps && d4 > eps))
    {
        return true;
    }
    false
}

/// Signed area via the shoelace formula; positive for CCW contours.
pub fn signed_area(contour: &[Point2<f64>]) -> f64 {
    let mut sum = 0.0;
    for i in 0..contour.len() {
        let a = contour[i];
        let b = contour[(i + 1) % contour.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// A polygon with one outer contour (CCW) and zero or more hole contours
/// (CW), the profile shape spec.md's extrude/lathe groups consume.
#[derive(Debug, Clone)]
pub struct SPolygon {
    pub outer: Vec<Point2<f64>>,
    pub holes: Vec<Vec<Point2<f64>>>,
}

impl SPolygon {
    pub fn new(outer: Vec<Point2<f64>>, holes: Vec<Vec<Point2<f64>>>) -> Self {
        SPolygon { outer, holes }
    }

    /// Normalizes winding so the outer contour is CCW and every hole is CW,
    /// flipping any contour found backwards (spec.md's "contour direction
    /// is not load-bearing input, the solver fixes it up" convention).
    pub fn fix_contour_directions(&mut self) {
        if signed_area(&self.outer) < 0.0 {
            self.outer.reverse();
        }
        for hole in &mut self.holes {
            if signed_area(hole) > 0.0 {
                hole.reverse();
            }
        }
    }

    /// Even-odd point-in-polygon test across the outer contour and every
    /// hole, so a point inside a hole correctly reports "outside".
    pub fn contains_point(&self, p: Point2<f64>) -> bool {
        let mut inside = point_in_contour(&self.outer, p);
        for hole in &self.holes {
            if point_in_contour(hole, p) {
                inside = false;
            }
        }
        inside
    }

    /// Ear-clip triangulation of the outer contour after bridging in every
    /// hole along its nearest-visible vertex on the outer boundary, the
    /// standard "reduce to one simple polygon" technique for polygons with
    /// holes.
    pub fn triangulate_into(&self, tol: &Tolerances) -> Vec<[Point2<f64>; 3]> {
        let mut working = self.outer.clone();
        if signed_area(&working) < 0.0 {
            working.reverse();
        }
        for hole in &self.holes {
            let mut h = hole.clone();
            if signed_area(&h) > 0.0 {
                h.reverse();
            }
            working = bridge_hole(&working, &h);
        }
        ear_clip(&working, tol)
    }
}

fn point_in_contour(contour: &[Point2<f64>], p: Point2<f64>) -> bool {
    let mut inside = false;
    let n = contour.len();
    let mut j = n - 1;
    for i in 0..n {
        let pi = contour[i];
        let pj = contour[j];
        if ((pi.y > p.y) != (pj.y > p.y))
            && (p.x < (pj.x - pi.x) * (p.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Connects a hole into the outer contour via a bridge edge to the hole
/// vertex nearest the hole's rightmost point, traversed twice (there and
/// back) so the result is still a single simple polygon.
fn bridge_hole(outer: &[Point2<f64>], hole: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let hole_start = hole
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.x.partial_cmp(&b.x).unwrap())
        .map(|(i, _)| i)
        .unwrap_or(0);
    let bridge_point = hole[hole_start];
    let outer_anchor = outer
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            (**a - bridge_point).norm_squared().partial_cmp(&(**b - bridge_point).norm_squared()).unwrap()
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut result = Vec::with_capacity(outer.len() + hole.len() + 2);
    result.extend_from_slice(&outer[..=outer_anchor]);
    let rotated_hole = hole.iter().cycle().skip(hole_start).take(hole.len() + 1);
    result.extend(rotated_hole);
    result.extend_from_slice(&outer[outer_anchor + 1..]);
    result
}

/// Classic ear-clipping: repeatedly remove a convex vertex whose triangle
/// with its neighbors contains no other vertex of the remaining polygon.
fn ear_clip(polygon: &[Point2<f64>], tol: &Tolerances) -> Vec<[Point2<f64>; 3]> {
    let mut indices: Vec<usize> = (0..polygon.len()).collect();
    let mut triangles = Vec::new();

    let mut guard = 0;
    while indices.len() > 3 && guard < polygon.len() * polygon.len() + 16 {
        guard += 1;
        let n = indices.len();
        let mut clipped = false;
        for k in 0..n {
            let ia = indices[(k + n - 1) % n];
            let ib = indices[k];
            let ic = indices[(k + 1) % n];
            let (a, b, c) = (polygon[ia], polygon[ib], polygon[ic]);
            if orient(a, b, c) <= tol.length_eps {
                continue; // reflex or degenerate vertex, not a valid ear
            }
            let mut contains_other = false;
            for &iv in &indices {
                if iv == ia || iv == ib || iv == ic {
                    continue;
                }
                if point_in_triangle(polygon[iv], a, b, c) {
                    contains_other = true;
                    break;
                }
            }
            if !contains_other {
                triangles.push([a, b, c]);
                indices.remove(k);
                clipped = true;
                break;
            }
        }
        if !clipped {
            break; // degenerate input; stop rather than loop forever
        }
    }
    if indices.len() == 3 {
        triangles.push([polygon[indices[0]], polygon[indices[1]], polygon[indices[2]]]);
    }
    triangles
}

fn point_in_triangle(p: Point2<f64>, a: Point2<f64>, b: Point2<f64>, c: Point2<f64>) -> bool {
    let d1 = orient(p, a, b);
    let d2 = orient(p, b, c);
    let d3 = orient(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
