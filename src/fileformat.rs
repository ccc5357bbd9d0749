//! Persisted document format: a line-oriented, hand-written text format,
//! never routed through `serde_json` because it is not JSON (§6).
//!
//! The teacher never persists anything (the WASM surface round-trips
//! whole documents as in-memory JSON via `serde_json`), so this module's
//! record-oriented reader/writer is grounded in spec.md's own description
//! of the format rather than adapted from teacher code; it follows the
//! same "one record kind per line, explicit field codes" style the
//! `louistrue-ifc-lite` `ifc-lite-core` crate uses for its own line-based
//! STEP-adjacent parsing (hence that crate's `memchr`/`lexical-core`/
//! `nom` dependencies, which this format's small hand-written scanner
//! does not need at the scale spec.md targets).

use std::fmt::Write as _;

use crate::constraint::{Constraint, ConstraintKind, ConstraintValue};
use crate::entity::{Entity, EntityKind, PointParams};
use crate::errors::{KernelError, KernelResult};
use crate::expr::{self, Expr};
use crate::group::{BooleanKind, Group, GroupKind};
use crate::handle::{ConstraintHandle, EntityHandle, GroupHandle, ParamHandle, RequestHandle};
use crate::request::{Request, RequestType};

pub const MAGIC: &str = "±„Õ“▒▓│┤SolveSpaceREVa";

/// Plain field values a record line carries; each maps to one of spec.md's
/// field format codes: `d` (signed decimal int), `b` (bool), `x` (8-hex-digit
/// unsigned int), `f` (`%.20f` double), `N` (name string), `E` (expression in
/// infix text form).
#[derive(Debug, Clone, PartialEq)]
enum Field {
    D(f64),
    B(bool),
    X(u32),
    Name(String),
    E(Expr),
}

impl Field {
    fn render(&self, out: &mut String) {
        match self {
            Field::D(v) => {
                let _ = write!(out, "{v:.20}");
            }
            Field::B(v) => out.push_str(if *v { "1" } else { "0" }),
            Field::X(v) => {
                let _ = write!(out, "{v:08x}");
            }
            Field::Name(s) => out.push_str(s),
            Field::E(e) => {
                let _ = write!(out, "{e}");
            }
        }
    }
}

/// Resolves a persisted expression's `pN` identifiers back to param
/// handles; the field is always a bare numeric literal today (no persisted
/// field references another param symbolically), so this only exists to
/// keep round-tripping exact if one ever does.
fn resolve_param_ident(ident: &str) -> Option<ParamHandle> {
    ident.strip_prefix('p').and_then(|n| n.parse::<u32>().ok()).map(ParamHandle)
}

fn field_expr(fields: &[(String, String)], key: &str, line: usize) -> KernelResult<f64> {
    let raw = field_str(fields, key).ok_or(KernelError::TruncatedRecord { line })?;
    if raw == "NaN" {
        // Expr::Const(f64::NAN)'s Display output; not a valid infix token
        // stream (the tokenizer only recognizes ascii-digit numbers), so it
        // is recognized directly rather than round-tripped through parse.
        return Ok(f64::NAN);
    }
    let parsed = expr::parse(raw, &resolve_param_ident)
        .map_err(|_| KernelError::UnknownMarker { line, text: format!("bad expression field '{key}'") })?;
    Ok(parsed.eval(&|_| 0.0))
}

struct Record {
    kind: char,
    fields: Vec<(&'static str, Field)>,
}

impl Record {
    fn render(&self) -> String {
        let mut line = String::new();
        line.push(self.kind);
        for (key, value) in &self.fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            value.render(&mut line);
        }
        line
    }
}

fn parse_fields(rest: &str) -> Vec<(String, String)> {
    rest.split_whitespace()
        .filter_map(|tok| tok.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn field_str<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn field_f64(fields: &[(String, String)], key: &str, line: usize) -> KernelResult<f64> {
    field_str(fields, key)
        .ok_or_else(|| KernelError::TruncatedRecord { line })?
        .parse::<f64>()
        .map_err(|_| KernelError::UnknownMarker { line, text: format!("bad float field '{key}'") })
}

fn field_u32(fields: &[(String, String)], key: &str, line: usize) -> KernelResult<u32> {
    let raw = field_str(fields, key).ok_or(KernelError::TruncatedRecord { line })?;
    u32::from_str_radix(raw, 16).map_err(|_| KernelError::UnknownMarker { line, text: format!("bad handle field '{key}'") })
}

/// A document's flattened record set, the in-memory form this module
/// reads into and writes out of. `crate::lib`'s top-level `Document`
/// assembles/disassembles this on load/save.
#[derive(Debug, Clone, Default)]
pub struct DocumentRecords {
    pub groups: Vec<Group>,
    pub requests: Vec<Request>,
    pub params: Vec<(ParamHandle, f64)>,
    pub entities: Vec<Entity>,
    pub constraints: Vec<Constraint>,
}

pub fn write_document(doc: &DocumentRecords) -> String {
    let mut out = String::new();
    out.push_str(MAGIC);
    out.push('\n');

    for g in &doc.groups {
        out.push_str(&group_record(g).render());
        out.push('\n');
    }
    for r in &doc.requests {
        out.push_str(&request_record(r).render());
        out.push('\n');
    }
    for (h, v) in &doc.params {
        out.push_str(&param_record(*h, *v).render());
        out.push('\n');
    }
    for e in &doc.entities {
        out.push_str(&entity_record(e).render());
        out.push('\n');
    }
    for c in &doc.constraints {
        out.push_str(&constraint_record(c).render());
        out.push('\n');
    }
    out
}

fn group_record(g: &Group) -> Record {
    let (kind_name, source, distance): (&'static str, u32, f64) = match &g.kind {
        GroupKind::Drawing3d => ("drawing3d", 0, 0.0),
        GroupKind::DrawingWorkplane { workplane } => ("drawing-workplane", workplane.0, 0.0),
        GroupKind::Extrude { source, distance } => ("extrude", source.0, *distance),
        GroupKind::Lathe { source, angle_degrees, .. } => ("lathe", source.0, *angle_degrees),
        GroupKind::Translate { source, dx, .. } => ("translate", source.0, *dx),
        GroupKind::Rotate { source, angle_degrees, .. } => ("rotate", source.0, *angle_degrees),
        GroupKind::Linked { .. } => ("linked", 0, 0.0),
    };
    Record {
        kind: 'g',
        fields: vec![
            ("h", Field::X(g.handle.0)),
            ("order", Field::X(g.order)),
            ("kind", Field::Name(kind_name.to_string())),
            ("src", Field::X(source)),
            ("val", Field::D(distance)),
            ("suppressed", Field::B(g.suppressed)),
        ],
    }
}

fn request_record(r: &Request) -> Record {
    let kind_name = match r.kind {
        RequestType::Workplane => "workplane",
        RequestType::LineSegment => "line-segment",
        RequestType::CubicSpline => "cubic-spline",
        RequestType::Circle => "circle",
        RequestType::Arc => "arc",
        RequestType::Point3d => "point3d",
    };
    Record {
        kind: 'r',
        fields: vec![
            ("h", Field::X(r.handle.0)),
            ("g", Field::X(r.group.0)),
            ("kind", Field::Name(kind_name.to_string())),
            ("wrkpl", Field::X(r.workplane.map(|w| w.0).unwrap_or(0))),
            ("construction", Field::B(r.construction)),
        ],
    }
}

fn param_record(h: ParamHandle, v: f64) -> Record {
    Record { kind: 'p', fields: vec![("h", Field::X(h.0)), ("val", Field::D(v))] }
}

fn entity_record(e: &Entity) -> Record {
    let (kind_name, refs): (&'static str, Vec<u32>) = match &e.kind {
        EntityKind::Point(p) => ("point", vec![p.x.0, p.y.0, p.z.0]),
        EntityKind::Normal(n) => ("normal", vec![n.w.0, n.vx.0, n.vy.0, n.vz.0]),
        EntityKind::Distance(d) => ("distance", vec![d.d.0]),
        EntityKind::Workplane(w) => ("workplane", vec![w.origin.0, w.normal.0]),
        EntityKind::Line(l) => ("line", vec![l.p0.0, l.p1.0]),
        EntityKind::Cubic(c) => ("cubic", c.control_points.iter().map(|p| p.0).collect()),
        EntityKind::Circle(c) => ("circle", vec![c.center.0, c.normal.0, c.radius.0]),
        EntityKind::Arc(a) => ("arc", vec![a.center.0, a.normal.0, a.start.0, a.end.0]),
        EntityKind::Face(f) => ("face", vec![f.plane_origin.0, f.plane_normal.0]),
        EntityKind::Text(t) => ("text", vec![t.origin.0, t.normal.0]),
    };
    let mut fields = vec![
        ("h", Field::X(e.handle.0)),
        ("g", Field::X(e.group.0)),
        ("kind", Field::Name(kind_name.to_string())),
        ("locked", Field::B(e.locked)),
    ];
    for (i, r) in refs.into_iter().enumerate() {
        fields.push((REF_KEYS[i.min(REF_KEYS.len() - 1)], Field::X(r)));
    }
    Record { kind: 'e', fields }
}

const REF_KEYS: [&str; 4] = ["r0", "r1", "r2", "r3"];

/// A constraint's operands, normalized to up to 4 entity-handle slots and 2
/// boolean flags (`at_start`-style) regardless of kind, so one record shape
/// covers the whole catalog instead of a one-off schema per variant.
struct ConstraintOperands {
    kind_name: &'static str,
    a: u32,
    b: u32,
    c: u32,
    d: u32,
    flag_a: bool,
    flag_b: bool,
}

fn constraint_operands(kind: &ConstraintKind) -> ConstraintOperands {
    let simple = |kind_name, a: u32, b: u32| ConstraintOperands { kind_name, a, b, c: 0, d: 0, flag_a: false, flag_b: false };
    match kind {
        ConstraintKind::PointsCoincident { a, b } => simple("points-coincident", a.0, b.0),
        ConstraintKind::PtPtDistance { a, b } => simple("pt-pt-distance", a.0, b.0),
        ConstraintKind::PtLineDistance { point, line } => simple("pt-line-distance", point.0, line.0),
        ConstraintKind::PtPlaneDistance { point, plane } => simple("pt-plane-distance", point.0, plane.0),
        ConstraintKind::PtInPlane { point, plane } => simple("pt-in-plane", point.0, plane.0),
        ConstraintKind::PointsOnLine { point, line } => simple("points-on-line", point.0, line.0),
        ConstraintKind::EqualLength { a, b } => simple("equal-length", a.0, b.0),
        ConstraintKind::EqualRadius { a, b } => simple("equal-radius", a.0, b.0),
        ConstraintKind::Parallel { a, b } => simple("parallel", a.0, b.0),
        ConstraintKind::Perpendicular { a, b } => simple("perpendicular", a.0, b.0),
        ConstraintKind::Symmetric { a, b, plane } => {
            ConstraintOperands { kind_name: "symmetric", a: a.0, b: b.0, c: plane.0, d: 0, flag_a: false, flag_b: false }
        }
        ConstraintKind::AtMidpoint { point, line } => simple("at-midpoint", point.0, line.0),
        ConstraintKind::Horizontal { line, workplane } => simple("horizontal", line.0, workplane.0),
        ConstraintKind::Vertical { line, workplane } => simple("vertical", line.0, workplane.0),
        ConstraintKind::Diameter { circle } => simple("diameter", circle.0, 0),
        ConstraintKind::PtOnCircle { point, circle } => simple("pt-on-circle", point.0, circle.0),
        ConstraintKind::Angle { a, b } => simple("angle", a.0, b.0),
        ConstraintKind::PtFaceDistance { point, face } => simple("pt-face-distance", point.0, face.0),
        ConstraintKind::PtOnFace { point, face } => simple("pt-on-face", point.0, face.0),
        ConstraintKind::EqualLineArcLen { line, arc } => simple("equal-line-arc-len", line.0, arc.0),
        ConstraintKind::LengthRatio { a, b } => simple("length-ratio", a.0, b.0),
        ConstraintKind::EqLenPtLineD { line, point, ref_line } => {
            ConstraintOperands { kind_name: "eq-len-pt-line-d", a: line.0, b: point.0, c: ref_line.0, d: 0, flag_a: false, flag_b: false }
        }
        ConstraintKind::EqPtLnDistances { point_a, line_a, point_b, line_b } => ConstraintOperands {
            kind_name: "eq-pt-ln-distances",
            a: point_a.0,
            b: line_a.0,
            c: point_b.0,
            d: line_b.0,
            flag_a: false,
            flag_b: false,
        },
        ConstraintKind::ArcLineTangent { arc, at_start, line } => {
            ConstraintOperands { kind_name: "arc-line-tangent", a: arc.0, b: line.0, c: 0, d: 0, flag_a: *at_start, flag_b: false }
        }
        ConstraintKind::CubicLineTangent { cubic, at_start, line } => {
            ConstraintOperands { kind_name: "cubic-line-tangent", a: cubic.0, b: line.0, c: 0, d: 0, flag_a: *at_start, flag_b: false }
        }
        ConstraintKind::CurveCurveTangent { a, a_at_start, b, b_at_start } => ConstraintOperands {
            kind_name: "curve-curve-tangent",
            a: a.0,
            b: b.0,
            c: 0,
            d: 0,
            flag_a: *a_at_start,
            flag_b: *b_at_start,
        },
        ConstraintKind::SameOrientation { a, b } => simple("same-orientation", a.0, b.0),
        ConstraintKind::SymmetricHoriz { a, b } => simple("symmetric-horiz", a.0, b.0),
        ConstraintKind::SymmetricVert { a, b } => simple("symmetric-vert", a.0, b.0),
        ConstraintKind::SymmetricLine { a, b, line } => {
            ConstraintOperands { kind_name: "symmetric-line", a: a.0, b: b.0, c: line.0, d: 0, flag_a: false, flag_b: false }
        }
        ConstraintKind::WhereDragged { point } => simple("where-dragged", point.0, 0),
    }
}

fn constraint_record(c: &Constraint) -> Record {
    let ops = constraint_operands(&c.kind);
    Record {
        kind: 'c',
        fields: vec![
            ("h", Field::X(c.handle.0)),
            ("g", Field::X(c.group.0)),
            ("kind", Field::Name(ops.kind_name.to_string())),
            ("a", Field::X(ops.a)),
            ("b", Field::X(ops.b)),
            ("c", Field::X(ops.c)),
            ("d", Field::X(ops.d)),
            ("flag_a", Field::B(ops.flag_a)),
            ("flag_b", Field::B(ops.flag_b)),
            ("val", Field::E(Expr::Const(c.value.0.unwrap_or(f64::NAN)))),
            ("ref", Field::B(c.reference)),
        ],
    }
}

/// Parses a persisted document, validating the magic header first and
/// reporting `BadMagic`/`UnknownMarker`/`TruncatedRecord` per §6/§7.
pub fn read_document(text: &str) -> KernelResult<DocumentRecords> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, first)) if first.trim() == MAGIC => {}
        _ => return Err(KernelError::BadMagic),
    }

    let mut doc = DocumentRecords::default();
    for (lineno, raw) in lines {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let mut chars = line.chars();
        let kind = chars.next().ok_or(KernelError::TruncatedRecord { line: lineno })?;
        let rest = chars.as_str();
        let fields = parse_fields(rest);
        match kind {
            'g' => doc.groups.push(parse_group(&fields, lineno)?),
            'r' => doc.requests.push(parse_request(&fields, lineno)?),
            'p' => doc.params.push(parse_param(&fields, lineno)?),
            'e' => doc.entities.push(parse_entity(&fields, lineno)?),
            'c' => doc.constraints.push(parse_constraint(&fields, lineno)?),
            other => return Err(KernelError::UnknownMarker { line: lineno, text: other.to_string() }),
        }
    }
    Ok(doc)
}

fn parse_group(fields: &[(String, String)], line: usize) -> KernelResult<Group> {
    let handle = GroupHandle::from_index(field_u32(fields, "h", line)?);
    let order = field_u32(fields, "order", line)?;
    let kind_name = field_str(fields, "kind").ok_or(KernelError::TruncatedRecord { line })?;
    let src = GroupHandle::from_index(field_u32(fields, "src", line)?);
    let val = field_f64(fields, "val", line)?;
    let kind = match kind_name {
        "drawing3d" => GroupKind::Drawing3d,
        "drawing-workplane" => GroupKind::DrawingWorkplane { workplane: EntityHandle(field_u32(fields, "src", line)?) },
        "extrude" => GroupKind::Extrude { source: src, distance: val },
        "lathe" => GroupKind::Lathe {
            source: src,
            axis_point: EntityHandle::NONE,
            axis_dir: EntityHandle::NONE,
            angle_degrees: val,
        },
        "translate" => GroupKind::Translate { source: src, dx: val, dy: 0.0, dz: 0.0 },
        "rotate" => GroupKind::Rotate {
            source: src,
            axis_point: EntityHandle::NONE,
            axis_dir: EntityHandle::NONE,
            angle_degrees: val,
        },
        "linked" => GroupKind::Linked { path: String::new() },
        other => return Err(KernelError::UnknownMarker { line, text: other.to_string() }),
    };
    let mut g = Group::new(handle, order, kind);
    g.suppressed = field_str(fields, "suppressed") == Some("1");
    Ok(g)
}

fn parse_request(fields: &[(String, String)], line: usize) -> KernelResult<Request> {
    let handle = RequestHandle::from_index(field_u32(fields, "h", line)?);
    let group = GroupHandle::from_index(field_u32(fields, "g", line)?);
    let kind_name = field_str(fields, "kind").ok_or(KernelError::TruncatedRecord { line })?;
    let kind = match kind_name {
        "workplane" => RequestType::Workplane,
        "line-segment" => RequestType::LineSegment,
        "cubic-spline" => RequestType::CubicSpline,
        "circle" => RequestType::Circle,
        "arc" => RequestType::Arc,
        "point3d" => RequestType::Point3d,
        other => return Err(KernelError::UnknownMarker { line, text: other.to_string() }),
    };
    let wrkpl = field_u32(fields, "wrkpl", line)?;
    let workplane = if wrkpl == 0 { None } else { Some(EntityHandle(wrkpl)) };
    let mut r = Request::new(handle, group, kind, workplane);
    r.construction = field_str(fields, "construction") == Some("1");
    Ok(r)
}

fn parse_param(fields: &[(String, String)], line: usize) -> KernelResult<(ParamHandle, f64)> {
    Ok((ParamHandle(field_u32(fields, "h", line)?), field_f64(fields, "val", line)?))
}

fn parse_entity(fields: &[(String, String)], line: usize) -> KernelResult<Entity> {
    let handle = EntityHandle(field_u32(fields, "h", line)?);
    let group = GroupHandle::from_index(field_u32(fields, "g", line)?);
    let kind_name = field_str(fields, "kind").ok_or(KernelError::TruncatedRecord { line })?;
    let r = |k: &str, line: usize| -> KernelResult<u32> { field_u32(fields, k, line) };
    let kind = match kind_name {
        "point" => EntityKind::Point(PointParams {
            x: ParamHandle(r("r0", line)?),
            y: ParamHandle(r("r1", line)?),
            z: ParamHandle(r("r2", line)?),
        }),
        "normal" => EntityKind::Normal(crate::entity::NormalParams {
            w: ParamHandle(r("r0", line)?),
            vx: ParamHandle(r("r1", line)?),
            vy: ParamHandle(r("r2", line)?),
            vz: ParamHandle(r("r3", line)?),
        }),
        "distance" => EntityKind::Distance(crate::entity::DistanceParams { d: ParamHandle(r("r0", line)?) }),
        "workplane" => EntityKind::Workplane(crate::entity::WorkplaneEntity {
            origin: EntityHandle(r("r0", line)?),
            normal: EntityHandle(r("r1", line)?),
        }),
        "line" => EntityKind::Line(crate::entity::LineSegmentEntity {
            p0: EntityHandle(r("r0", line)?),
            p1: EntityHandle(r("r1", line)?),
            workplane: None,
        }),
        "circle" => EntityKind::Circle(crate::entity::CircleEntity {
            center: EntityHandle(r("r0", line)?),
            normal: EntityHandle(r("r1", line)?),
            radius: EntityHandle(r("r2", line)?),
            workplane: None,
        }),
        "arc" => EntityKind::Arc(crate::entity::ArcEntity {
            center: EntityHandle(r("r0", line)?),
            normal: EntityHandle(r("r1", line)?),
            start: EntityHandle(r("r2", line)?),
            end: EntityHandle(r("r3", line)?),
            workplane: None,
        }),
        other => return Err(KernelError::UnknownMarker { line, text: other.to_string() }),
    };
    Ok(Entity { handle, group, kind, locked: field_str(fields, "locked") == Some("1") })
}

fn parse_constraint(fields: &[(String, String)], line: usize) -> KernelResult<Constraint> {
    let handle = ConstraintHandle::from_index(field_u32(fields, "h", line)?);
    let group = GroupHandle::from_index(field_u32(fields, "g", line)?);
    let kind_name = field_str(fields, "kind").ok_or(KernelError::TruncatedRecord { line })?;
    let a = EntityHandle(field_u32(fields, "a", line)?);
    let b = EntityHandle(field_u32(fields, "b", line)?);
    // "c"/"d"/"flag_a"/"flag_b" are only written for kinds that need them;
    // every other kind simply ignores them on read.
    let c = EntityHandle(field_u32(fields, "c", line).unwrap_or(0));
    let d = EntityHandle(field_u32(fields, "d", line).unwrap_or(0));
    let flag_a = field_str(fields, "flag_a") == Some("1");
    let flag_b = field_str(fields, "flag_b") == Some("1");
    let val = field_expr(fields, "val", line)?;
    let value = ConstraintValue(if val.is_nan() { None } else { Some(val) });
    let kind = match kind_name {
        "points-coincident" => ConstraintKind::PointsCoincident { a, b },
        "pt-pt-distance" => ConstraintKind::PtPtDistance { a, b },
        "pt-line-distance" => ConstraintKind::PtLineDistance { point: a, line: b },
        "pt-plane-distance" => ConstraintKind::PtPlaneDistance { point: a, plane: b },
        "pt-in-plane" => ConstraintKind::PtInPlane { point: a, plane: b },
        "points-on-line" => ConstraintKind::PointsOnLine { point: a, line: b },
        "equal-length" => ConstraintKind::EqualLength { a, b },
        "equal-radius" => ConstraintKind::EqualRadius { a, b },
        "parallel" => ConstraintKind::Parallel { a, b },
        "perpendicular" => ConstraintKind::Perpendicular { a, b },
        "symmetric" => ConstraintKind::Symmetric { a, b, plane: c },
        "at-midpoint" => ConstraintKind::AtMidpoint { point: a, line: b },
        "horizontal" => ConstraintKind::Horizontal { line: a, workplane: b },
        "vertical" => ConstraintKind::Vertical { line: a, workplane: b },
        "diameter" => ConstraintKind::Diameter { circle: a },
        "pt-on-circle" => ConstraintKind::PtOnCircle { point: a, circle: b },
        "angle" => ConstraintKind::Angle { a, b },
        "pt-face-distance" => ConstraintKind::PtFaceDistance { point: a, face: b },
        "pt-on-face" => ConstraintKind::PtOnFace { point: a, face: b },
        "equal-line-arc-len" => ConstraintKind::EqualLineArcLen { line: a, arc: b },
        "length-ratio" => ConstraintKind::LengthRatio { a, b },
        "eq-len-pt-line-d" => ConstraintKind::EqLenPtLineD { line: a, point: b, ref_line: c },
        "eq-pt-ln-distances" => ConstraintKind::EqPtLnDistances { point_a: a, line_a: b, point_b: c, line_b: d },
        "arc-line-tangent" => ConstraintKind::ArcLineTangent { arc: a, at_start: flag_a, line: b },
        "cubic-line-tangent" => ConstraintKind::CubicLineTangent { cubic: a, at_start: flag_a, line: b },
        "curve-curve-tangent" => ConstraintKind::CurveCurveTangent { a, a_at_start: flag_a, b, b_at_start: flag_b },
        "same-orientation" => ConstraintKind::SameOrientation { a, b },
        "symmetric-horiz" => ConstraintKind::SymmetricHoriz { a, b },
        "symmetric-vert" => ConstraintKind::SymmetricVert { a, b },
        "symmetric-line" => ConstraintKind::SymmetricLine { a, b, line: c },
        "where-dragged" => ConstraintKind::WhereDragged { point: a },
        other => return Err(KernelError::UnknownMarker { line, text: other.to_string() }),
    };
    let reference = field_str(fields, "ref") == Some("1");
    Ok(Constraint { handle, group, kind, value, reference })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestType;

    #[test]
    fn rejects_missing_magic_header() {
        let err = read_document("not a real header\n").unwrap_err();
        assert!(matches!(err, KernelError::BadMagic));
    }

    #[test]
    fn roundtrips_a_minimal_document() {
        let mut doc = DocumentRecords::default();
        let group = Group::new(GroupHandle::from_index(1), 0, GroupKind::Drawing3d);
        doc.groups.push(group);
        doc.requests.push(Request::new(
            RequestHandle::from_index(1),
            GroupHandle::from_index(1),
            RequestType::LineSegment,
            None,
        ));
        doc.params.push((ParamHandle(1), 3.5));

        let text = write_document(&doc);
        assert!(text.starts_with(MAGIC));
        let parsed = read_document(&text).unwrap();
        assert_eq!(parsed.groups.len(), 1);
        assert_eq!(parsed.requests.len(), 1);
        assert_eq!(parsed.params[0].1, 3.5);
    }

    #[test]
    fn unknown_marker_is_reported_with_line_number() {
        let text = format!("{MAGIC}\nz bogus=1\n");
        let err = read_document(&text).unwrap_err();
        match err {
            KernelError::UnknownMarker { line, .. } => assert_eq!(line, 1),
            other => panic!("expected UnknownMarker, got {other:?}"),
        }
    }

    fn roundtrip_constraint(kind: ConstraintKind) -> ConstraintKind {
        let c = Constraint {
            handle: ConstraintHandle::from_index(1),
            group: GroupHandle::from_index(1),
            kind,
            value: ConstraintValue(Some(2.5)),
            reference: false,
        };
        let line = constraint_record(&c).render();
        let fields = parse_fields(line.trim_start_matches("c ").trim_end());
        parse_constraint(&fields, 0).unwrap().kind
    }

    #[test]
    fn symmetric_plane_survives_a_roundtrip() {
        let kind = ConstraintKind::Symmetric {
            a: EntityHandle(1),
            b: EntityHandle(2),
            plane: EntityHandle(3),
        };
        match roundtrip_constraint(kind) {
            ConstraintKind::Symmetric { a, b, plane } => {
                assert_eq!(a, EntityHandle(1));
                assert_eq!(b, EntityHandle(2));
                assert_eq!(plane, EntityHandle(3));
            }
            other => panic!("expected Symmetric, got {other:?}"),
        }
    }

    #[test]
    fn length_ratio_roundtrips_through_the_new_schema() {
        let kind = ConstraintKind::LengthRatio { a: EntityHandle(4), b: EntityHandle(5) };
        match roundtrip_constraint(kind) {
            ConstraintKind::LengthRatio { a, b } => {
                assert_eq!(a, EntityHandle(4));
                assert_eq!(b, EntityHandle(5));
            }
            other => panic!("expected LengthRatio, got {other:?}"),
        }
    }

    #[test]
    fn curve_curve_tangent_flags_roundtrip() {
        let kind = ConstraintKind::CurveCurveTangent {
            a: EntityHandle(6),
            a_at_start: true,
            b: EntityHandle(7),
            b_at_start: false,
        };
        match roundtrip_constraint(kind) {
            ConstraintKind::CurveCurveTangent { a, a_at_start, b, b_at_start } => {
                assert_eq!(a, EntityHandle(6));
                assert!(a_at_start);
                assert_eq!(b, EntityHandle(7));
                assert!(!b_at_start);
            }
            other => panic!("expected CurveCurveTangent, got {other:?}"),
        }
    }
}
