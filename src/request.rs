//! Requests: the user-facing "make me a line/circle/cubic" records that
//! expand into entities and params when a group regenerates (§3, §4.3).
//!
//! Generalizes the teacher's `compiler::intent_parser::IntentParser`, which
//! walked a flat `Intent` list and built `CsgNode`s by name lookup in a
//! two-pass (primitives-then-operations) process. A `Request` plays the
//! analogous "not yet geometry, a recipe for geometry" role, but expands
//! directly into `crate::entity::Entity` + param records rather than into
//! the teacher's separate `CsgNode` tree, because spec.md's sketch entities
//! are always driven by the solver afterward and so must own individual
//! scalar params from the start.

use crate::entity::{
    ArcEntity, CircleEntity, CubicEntity, Entity, EntityKind, LineSegmentEntity, NormalParams, PointParams,
    WorkplaneEntity,
};
use crate::handle::{EntityHandle, GroupHandle, ParamHandle, RequestHandle};
use crate::store::OwnedByGroup;

/// What kind of entity/param bundle a request expands into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Workplane,
    LineSegment,
    CubicSpline,
    Circle,
    Arc,
    Point3d,
}

impl RequestType {
    /// How many points this request's generated geometry needs, used by
    /// `Request::generate` to size its local param/entity allocation.
    fn point_count(self) -> usize {
        match self {
            RequestType::Workplane => 1,
            RequestType::LineSegment => 2,
            RequestType::CubicSpline => 4,
            RequestType::Circle => 1,
            RequestType::Arc => 3,
            RequestType::Point3d => 1,
        }
    }

    fn needs_normal(self) -> bool {
        matches!(
            self,
            RequestType::Workplane | RequestType::Circle | RequestType::Arc
        )
    }

    fn needs_radius(self) -> bool {
        matches!(self, RequestType::Circle)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub handle: RequestHandle,
    pub group: GroupHandle,
    pub kind: RequestType,
    /// The workplane this request's geometry is sketched on, `None` for
    /// free 3d entities and for the workplane request itself.
    pub workplane: Option<EntityHandle>,
    pub construction: bool,
}

impl OwnedByGroup for Request {
    fn group(&self) -> GroupHandle {
        self.group
    }
}

/// Output of expanding one request: the params and entities it generated,
/// handed to the regenerator to insert into the live tables (§4.5).
pub struct Generated {
    pub params: Vec<(ParamHandle, f64)>,
    pub entities: Vec<Entity>,
}

/// Monotonically-increasing allocators local to one regeneration pass;
/// the regenerator resets these per request so local ordinals stay dense.
pub struct Allocator {
    next_param_local: u32,
    next_entity_local: u32,
}

impl Allocator {
    pub fn new() -> Self {
        Allocator { next_param_local: 0, next_entity_local: 0 }
    }

    fn param(&mut self, owner: RequestHandle) -> ParamHandle {
        let h = ParamHandle::of_request(owner, self.next_param_local);
        self.next_param_local += 1;
        h
    }

    fn entity(&mut self, owner: RequestHandle) -> EntityHandle {
        let h = EntityHandle::of_request(owner, self.next_entity_local);
        self.next_entity_local += 1;
        h
    }
}

impl Request {
    pub fn new(handle: RequestHandle, group: GroupHandle, kind: RequestType, workplane: Option<EntityHandle>) -> Self {
        Request { handle, group, kind, workplane, construction: false }
    }

    /// Expands this request into fresh params (with initial numeric
    /// values, typically a small default shape near the origin) and
    /// entities, using `alloc` for locally-unique handles.
    pub fn generate(&self, alloc: &mut Allocator, default_points: &[[f64; 3]]) -> Generated {
        let mut params = Vec::new();
        let mut entities = Vec::new();

        let mut make_point = |alloc: &mut Allocator, xyz: [f64; 3]| -> EntityHandle {
            let px = alloc.param(self.handle);
            let py = alloc.param(self.handle);
            let pz = alloc.param(self.handle);
            params.push((px, xyz[0]));
            params.push((py, xyz[1]));
            params.push((pz, xyz[2]));
            let eh = alloc.entity(self.handle);
            entities.push(Entity {
                handle: eh,
                group: self.group,
                kind: EntityKind::Point(PointParams { x: px, y: py, z: pz }),
                locked: false,
            });
            eh
        };

        let needed = self.kind.point_count();
        let mut point_handles = Vec::with_capacity(needed);
        for i in 0..needed {
            // Distinct points, not all coincident at the origin: a distance
            // constraint between two freshly generated points has a zero
            // Jacobian at a coincident starting guess, so the solver can
            // never discover which direction to move them apart.
            let xyz = default_points.get(i).copied().unwrap_or([i as f64, 0.0, 0.0]);
            point_handles.push(make_point(alloc, xyz));
        }

        let normal_handle = if self.kind.needs_normal() {
            let pw = alloc.param(self.handle);
            let pvx = alloc.param(self.handle);
            let pvy = alloc.param(self.handle);
            let pvz = alloc.param(self.handle);
            params.push((pw, 1.0));
            params.push((pvx, 0.0));
            params.push((pvy, 0.0));
            params.push((pvz, 0.0));
            let eh = alloc.entity(self.handle);
            entities.push(Entity {
                handle: eh,
                group: self.group,
                kind: EntityKind::Normal(NormalParams { w: pw, vx: pvx, vy: pvy, vz: pvz }),
                locked: false,
            });
            Some(eh)
        } else {
            None
        };

        let radius_handle = if self.kind.needs_radius() {
            let pd = alloc.param(self.handle);
            params.push((pd, 10.0));
            let eh = alloc.entity(self.handle);
            entities.push(Entity {
                handle: eh,
                group: self.group,
                kind: EntityKind::Distance(crate::entity::DistanceParams { d: pd }),
                locked: false,
            });
            Some(eh)
        } else {
            None
        };

        let top_handle = alloc.entity(self.handle);
        let top_kind = match self.kind {
            RequestType::Workplane => EntityKind::Workplane(WorkplaneEntity {
                origin: point_handles[0],
                normal: normal_handle.expect("workplane always allocates a normal"),
            }),
            RequestType::LineSegment => EntityKind::Line(LineSegmentEntity {
                p0: point_handles[0],
                p1: point_handles[1],
                workplane: self.workplane,
            }),
            RequestType::CubicSpline => EntityKind::Cubic(CubicEntity {
                control_points: point_handles.clone(),
                weights: {
                    let mut ws = Vec::with_capacity(point_handles.len());
                    for _ in &point_handles {
                        let pw = alloc.param(self.handle);
                        params.push((pw, 1.0));
                        ws.push(pw);
                    }
                    ws
                },
                workplane: self.workplane,
            }),
            RequestType::Circle => EntityKind::Circle(CircleEntity {
                center: point_handles[0],
                normal: normal_handle.expect("circle always allocates a normal"),
                radius: radius_handle.expect("circle always allocates a radius"),
                workplane: self.workplane,
            }),
            RequestType::Arc => EntityKind::Arc(ArcEntity {
                center: point_handles[0],
                normal: normal_handle.expect("arc always allocates a normal"),
                start: point_handles[1],
                end: point_handles[2],
                workplane: self.workplane,
            }),
            RequestType::Point3d => EntityKind::Workplane(WorkplaneEntity {
                origin: point_handles[0],
                normal: normal_handle.unwrap_or(point_handles[0]),
            }),
        };
        entities.push(Entity { handle: top_handle, group: self.group, kind: top_kind, locked: false });

        Generated { params, entities }
    }
}
