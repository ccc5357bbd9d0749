//! Entities: the tagged union of geometric primitives every request and
//! group generates (§3, §4.3).
//!
//! Generalizes the teacher's separate `Box`/primitive structs
//! (`geometry/primitives.rs`) plus its topology types (`geometry/topology/
//! {edge,face,shell,solid}.rs`) into the one recursive `Entity` enum
//! spec.md's sketch/solid model actually needs: points and normals are
//! themselves entities addressed by parameters, and higher entities
//! (lines, cubics, circles, arcs, workplanes) reference their constituent
//! points/normals by handle rather than embedding coordinates directly, so
//! the solver can drive them by varying the underlying params.

use nalgebra::{Point3, Vector3};

use crate::handle::{EntityHandle, GroupHandle, ParamHandle};
use crate::store::OwnedByGroup;

/// A point entity stores the handles of its coordinate params, not values;
/// values live in the `ParamTable` and are read through `crate::solver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointParams {
    pub x: ParamHandle,
    pub y: ParamHandle,
    pub z: ParamHandle,
}

/// A normal entity's orientation is a unit quaternion, stored as four
/// params `(w, vx, vy, vz)` so the solver can vary orientation smoothly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalParams {
    pub w: ParamHandle,
    pub vx: ParamHandle,
    pub vy: ParamHandle,
    pub vz: ParamHandle,
}

impl NormalParams {
    pub fn quaternion(&self, value_of: &impl Fn(ParamHandle) -> f64) -> nalgebra::UnitQuaternion<f64> {
        let q = nalgebra::Quaternion::new(value_of(self.w), value_of(self.vx), value_of(self.vy), value_of(self.vz));
        nalgebra::UnitQuaternion::from_quaternion(q)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistanceParams {
    pub d: ParamHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkplaneEntity {
    pub origin: EntityHandle,
    pub normal: EntityHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegmentEntity {
    pub p0: EntityHandle,
    pub p1: EntityHandle,
    pub workplane: Option<EntityHandle>,
}

/// A rational cubic Bezier (up to 4 control points); degree-reduced curves
/// reuse trailing control points, matching `crate::curve::SBezier`'s
/// representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CubicEntity {
    pub control_points: Vec<EntityHandle>,
    pub weights: Vec<ParamHandle>,
    pub workplane: Option<EntityHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircleEntity {
    pub center: EntityHandle,
    pub normal: EntityHandle,
    pub radius: EntityHandle,
    pub workplane: Option<EntityHandle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcEntity {
    pub center: EntityHandle,
    pub normal: EntityHandle,
    pub start: EntityHandle,
    pub end: EntityHandle,
    pub workplane: Option<EntityHandle>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceEntity {
    pub plane_origin: EntityHandle,
    pub plane_normal: EntityHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextEntity {
    pub origin: EntityHandle,
    pub normal: EntityHandle,
    pub contents: String,
    pub height: ParamHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityKind {
    Point(PointParams),
    Normal(NormalParams),
    Distance(DistanceParams),
    Workplane(WorkplaneEntity),
    Line(LineSegmentEntity),
    Cubic(CubicEntity),
    Circle(CircleEntity),
    Arc(ArcEntity),
    Face(FaceEntity),
    Text(TextEntity),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub handle: EntityHandle,
    pub group: GroupHandle,
    pub kind: EntityKind,
    /// True once this entity's point/normal parameters have been
    /// determined to be locked by a `where_dragged` constraint or an
    /// upstream reference; drives the solver's known/unknown split (§4.4).
    pub locked: bool,
}

impl OwnedByGroup for Entity {
    fn group(&self) -> GroupHandle {
        self.group
    }
}

impl Entity {
    pub fn is_point(&self) -> bool {
        matches!(self.kind, EntityKind::Point(_))
    }

    pub fn is_normal(&self) -> bool {
        matches!(self.kind, EntityKind::Normal(_))
    }

    pub fn point_position(&self, value_of: &impl Fn(ParamHandle) -> f64) -> Option<Point3<f64>> {
        match &self.kind {
            EntityKind::Point(p) => Some(Point3::new(value_of(p.x), value_of(p.y), value_of(p.z))),
            _ => None,
        }
    }

    pub fn normal_direction(&self, value_of: &impl Fn(ParamHandle) -> f64) -> Option<Vector3<f64>> {
        match &self.kind {
            EntityKind::Normal(n) => Some(n.quaternion(value_of) * Vector3::z()),
            _ => None,
        }
    }

    /// Handles of params this entity directly owns (its point coordinates,
    /// quaternion components, or scalar distance) -- excludes params
    /// belonging to referenced sub-entities, which the caller walks
    /// separately via the handles embedded in the entity kind.
    pub fn own_params(&self) -> Vec<ParamHandle> {
        match &self.kind {
            EntityKind::Point(p) => vec![p.x, p.y, p.z],
            EntityKind::Normal(n) => vec![n.w, n.vx, n.vy, n.vz],
            EntityKind::Distance(d) => vec![d.d],
            EntityKind::Cubic(c) => c.weights.clone(),
            EntityKind::Text(t) => vec![t.height],
            EntityKind::Workplane(_)
            | EntityKind::Line(_)
            | EntityKind::Circle(_)
            | EntityKind::Arc(_)
            | EntityKind::Face(_) => Vec::new(),
        }
    }
}
