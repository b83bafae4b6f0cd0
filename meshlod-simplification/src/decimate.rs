//! Greedy quadric decimation
//!
//! [`Decimator`] owns a [`MeshModel`] for the duration of a run. It folds face
//! quadrics into vertices, heaps every candidate pair by contraction cost and
//! then repeatedly applies the cheapest contraction that passes validation,
//! rescoring the neighbourhood after each one.
//!
//! The three [`CollapseStrategy`] values share this loop. They differ only in
//! which pairs become candidates and in the dimension of the quadrics.

use crate::heap::{Heapable, IndexedHeap};
use crate::model::{FaceId, MeshModel, VertexId};
use crate::params::{CollapseStrategy, SlimParams, WeightingPolicy};
use crate::placement::place;
use crate::quadric::{Quadric, Quadric3};
use crate::result::DecimationStats;
use itertools::Itertools;
use meshlod_core::{Color, Error, Point3d, Result, TexCoord, Vector3d, Vector3f, VertexAttributes};
use nalgebra::DVector;
use rstar::RTree;
use std::f64::consts::PI;
use tracing::{debug, error, info, trace};

/// Smallest target face count a run accepts
pub const MIN_TARGET_FACES: usize = 3;

/// Fraction of the bounding box diagonal used as default pair tolerance
const DEFAULT_PAIR_TOLERANCE: f64 = 0.01;

/// Scale of the per-valence penalty relative to `meshing_penalty`
const DEGREE_PENALTY_SCALE: f64 = 0.001;

pub type CandidateId = usize;

// ============================================================
// Scheduler state
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Uninitialized,
    Initialized,
    Running,
    Done,
    Failed,
}

/// Outcome of a single [`Decimator::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A contraction was applied, invalidating `dead_faces` faces
    Contracted { dead_faces: usize },
    /// The cheapest candidate failed validation and was discarded
    Rejected,
    /// The cheapest candidate exceeds the error bound
    ErrorBound,
    /// No candidates remain
    Exhausted,
}

// ============================================================
// Attribute layout
// ============================================================

/// Which vertex attributes are embedded in extended quadrics.
///
/// Vectors are laid out as position, color (rgb), texture coordinate, normal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttributeLayout {
    pub color: bool,
    pub tex_coord: bool,
    pub normal: bool,
}

impl AttributeLayout {
    pub const GEOMETRY: Self = Self {
        color: false,
        tex_coord: false,
        normal: false,
    };

    /// Channels carried by every valid vertex of `model`
    pub fn detect(model: &MeshModel) -> Self {
        let mut layout = Self {
            color: true,
            tex_coord: true,
            normal: true,
        };
        let mut any = false;
        for (_, v) in model.vertices().filter(|(_, v)| v.is_valid()) {
            any = true;
            layout.color &= v.attributes.color.is_some();
            layout.tex_coord &= v.attributes.tex_coord.is_some();
            layout.normal &= v.attributes.normal.is_some();
        }
        if any {
            layout
        } else {
            Self::GEOMETRY
        }
    }

    pub fn dim(&self) -> usize {
        3 + 3 * usize::from(self.color) + 2 * usize::from(self.tex_coord) + 3 * usize::from(self.normal)
    }

    pub fn pack(&self, position: &Point3d, attributes: &VertexAttributes) -> DVector<f64> {
        let mut out = Vec::with_capacity(self.dim());
        out.extend_from_slice(&[position.x, position.y, position.z]);
        if self.color {
            let c = attributes.color.unwrap_or_default();
            out.extend_from_slice(&[f64::from(c.r), f64::from(c.g), f64::from(c.b)]);
        }
        if self.tex_coord {
            let t = attributes.tex_coord.unwrap_or_default();
            out.extend_from_slice(&[f64::from(t.u), f64::from(t.v)]);
        }
        if self.normal {
            let n = attributes.normal.unwrap_or_else(Vector3f::zeros);
            out.extend_from_slice(&[f64::from(n.x), f64::from(n.y), f64::from(n.z)]);
        }
        DVector::from_vec(out)
    }

    /// Split an optimized vector back into a position and attributes.
    ///
    /// Channels outside the layout are taken from `base`. Colors are clamped
    /// and keep `base`'s alpha; normals are re-normalized.
    pub fn unpack(&self, x: &DVector<f64>, base: &VertexAttributes) -> (Point3d, VertexAttributes) {
        let position = Point3d::new(x[0], x[1], x[2]);
        let mut attributes = *base;
        let mut i = 3;
        if self.color {
            let alpha = base.color.map_or(1.0, |c| c.a);
            attributes.color =
                Some(Color::new(x[i] as f32, x[i + 1] as f32, x[i + 2] as f32, alpha).clamped());
            i += 3;
        }
        if self.tex_coord {
            attributes.tex_coord = Some(TexCoord::new(x[i] as f32, x[i + 1] as f32));
            i += 2;
        }
        if self.normal {
            let n = Vector3d::new(x[i], x[i + 1], x[i + 2]);
            let len = n.norm();
            if len > f64::EPSILON && len.is_finite() {
                attributes.normal = Some((n / len).cast::<f32>());
            }
        }
        (position, attributes)
    }
}

// ============================================================
// Candidates
// ============================================================

#[derive(Debug, Clone)]
struct Candidate {
    v1: VertexId,
    v2: VertexId,
    cost: f64,
    position: Point3d,
    attributes: VertexAttributes,
    fell_back: bool,
    slot: Option<usize>,
}

impl Candidate {
    fn new(v1: VertexId, v2: VertexId) -> Self {
        Self {
            v1,
            v2,
            cost: 0.0,
            position: Point3d::origin(),
            attributes: VertexAttributes::default(),
            fell_back: false,
            slot: None,
        }
    }

    fn other(&self, v: VertexId) -> VertexId {
        if self.v1 == v {
            self.v2
        } else {
            self.v1
        }
    }
}

impl Heapable for Candidate {
    fn heap_key(&self) -> f64 {
        self.cost
    }

    fn heap_slot(&self) -> Option<usize> {
        self.slot
    }

    fn set_heap_slot(&mut self, slot: Option<usize>) {
        self.slot = slot;
    }
}

/// Planned result of contracting one pair
struct Evaluation {
    cost: f64,
    position: Point3d,
    attributes: VertexAttributes,
    fell_back: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    InvalidEndpoint,
    NotAdjacent,
    JoinOnly,
    Degree,
    Inversion,
}

/// Per-vertex accumulated quadrics
#[derive(Debug, Clone)]
enum VertexQuadrics {
    Geometric(Vec<Quadric3>),
    Extended(Vec<Quadric>),
}

// ============================================================
// Spatial index for virtual pairs
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq)]
struct IndexedPoint {
    position: [f64; 3],
    index: VertexId,
}

impl rstar::Point for IndexedPoint {
    type Scalar = f64;
    const DIMENSIONS: usize = 3;

    fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
        Self {
            position: [generator(0), generator(1), generator(2)],
            index: usize::MAX,
        }
    }

    fn nth(&self, index: usize) -> Self::Scalar {
        self.position[index]
    }

    fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
        &mut self.position[index]
    }
}

// ============================================================
// Decimator
// ============================================================

#[derive(Debug, Clone)]
pub struct Decimator {
    model: MeshModel,
    strategy: CollapseStrategy,
    params: SlimParams,
    layout: AttributeLayout,
    state: SchedulerState,
    quadrics: VertexQuadrics,
    heap: IndexedHeap<Candidate>,
    /// Candidates touching each vertex
    links: Vec<Vec<CandidateId>>,
    stats: DecimationStats,
}

impl Decimator {
    /// Take ownership of `model`. Property strategy embeds the attributes
    /// every vertex carries; see [`Decimator::with_layout`].
    pub fn new(model: MeshModel, strategy: CollapseStrategy, params: SlimParams) -> Self {
        let layout = match strategy {
            CollapseStrategy::Property => AttributeLayout::detect(&model),
            _ => AttributeLayout::GEOMETRY,
        };
        Self {
            model,
            strategy,
            params,
            layout,
            state: SchedulerState::Uninitialized,
            quadrics: VertexQuadrics::Geometric(Vec::new()),
            heap: IndexedHeap::new(),
            links: Vec::new(),
            stats: DecimationStats::default(),
        }
    }

    /// Override the attribute channels used by the property strategy.
    #[must_use]
    pub fn with_layout(mut self, layout: AttributeLayout) -> Self {
        if self.strategy == CollapseStrategy::Property {
            self.layout = layout;
        }
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn strategy(&self) -> CollapseStrategy {
        self.strategy
    }

    pub fn params(&self) -> &SlimParams {
        &self.params
    }

    pub fn layout(&self) -> AttributeLayout {
        self.layout
    }

    pub fn model(&self) -> &MeshModel {
        &self.model
    }

    pub fn into_model(self) -> MeshModel {
        self.model
    }

    pub fn stats(&self) -> &DecimationStats {
        &self.stats
    }

    /// Number of queued candidates
    pub fn candidate_count(&self) -> usize {
        self.heap.len()
    }

    /// Queued candidate pairs with their costs, in heap order
    pub fn candidates(&self) -> impl Iterator<Item = (VertexId, VertexId, f64)> + '_ {
        self.heap
            .queued()
            .iter()
            .filter_map(|&id| self.heap.get(id))
            .map(|c| (c.v1, c.v2, c.cost))
    }

    /// Build quadrics and the initial candidate heap.
    ///
    /// A model without faces is first given one face per sequential vertex
    /// triple.
    pub fn initialize(&mut self) -> Result<()> {
        if self.state != SchedulerState::Uninitialized {
            return Err(Error::InvalidState(format!(
                "initialize called in state {:?}",
                self.state
            )));
        }

        if self.model.face_count() == 0 && self.model.vertex_count() >= 3 {
            let created = self.model.synthesize_flat_faces()?;
            debug!(faces = created, "Synthesized flat triangle list");
        }

        self.stats = DecimationStats {
            original_faces: self.model.valid_face_count(),
            original_vertices: self.model.valid_vertex_count(),
            final_faces: self.model.valid_face_count(),
            final_vertices: self.model.valid_vertex_count(),
            ..Default::default()
        };

        self.collect_quadrics();
        self.links = vec![Vec::new(); self.model.vertex_count()];
        self.heap = IndexedHeap::with_capacity(self.model.face_count() * 3 / 2);
        self.collect_candidates();

        self.state = SchedulerState::Initialized;
        debug!(
            strategy = %self.strategy,
            vertices = self.stats.original_vertices,
            faces = self.stats.original_faces,
            candidates = self.heap.len(),
            "Initialized decimation"
        );
        Ok(())
    }

    /// Contract pairs until at most `target` faces remain or no legal
    /// contraction is left. Returns the number of valid faces.
    ///
    /// A target below [`MIN_TARGET_FACES`] fails the scheduler before any
    /// mutation. After the loop the counts are checked against the input;
    /// an increase fails the run.
    pub fn decimate(&mut self, target: usize) -> Result<usize> {
        if target < MIN_TARGET_FACES {
            self.state = SchedulerState::Failed;
            return Err(Error::InvalidObjective(target));
        }
        if self.state == SchedulerState::Uninitialized {
            self.initialize()?;
        }
        match self.state {
            SchedulerState::Initialized | SchedulerState::Done => {}
            state => {
                return Err(Error::InvalidState(format!("decimate called in state {state:?}")));
            }
        }

        info!(
            original = self.model.valid_face_count(),
            target = target,
            strategy = %self.strategy,
            "Starting mesh decimation"
        );
        self.state = SchedulerState::Running;

        while self.model.valid_face_count() > target {
            match self.step() {
                Ok(Step::Contracted { .. } | Step::Rejected) => {}
                Ok(Step::ErrorBound | Step::Exhausted) => break,
                Err(e) => {
                    self.state = SchedulerState::Failed;
                    return Err(e);
                }
            }
        }

        self.stats.final_faces = self.model.valid_face_count();
        self.stats.final_vertices = self.model.valid_vertex_count();
        if self.stats.final_faces > self.stats.original_faces
            || self.stats.final_vertices > self.stats.original_vertices
        {
            error!(
                faces = self.stats.final_faces,
                vertices = self.stats.final_vertices,
                "Decimation increased mesh complexity"
            );
            self.state = SchedulerState::Failed;
            return Err(Error::Algorithm(format!(
                "decimation produced {} faces and {} vertices from {} and {}",
                self.stats.final_faces,
                self.stats.final_vertices,
                self.stats.original_faces,
                self.stats.original_vertices
            )));
        }

        self.state = SchedulerState::Done;
        info!(
            final_triangles = self.stats.final_faces,
            collapses = self.stats.collapses_performed,
            rejected = self.stats.collapses_rejected,
            "Decimation complete"
        );
        Ok(self.stats.final_faces)
    }

    /// Pop the cheapest candidate and contract it if it is still legal.
    pub fn step(&mut self) -> Result<Step> {
        if self.state == SchedulerState::Uninitialized {
            self.initialize()?;
        }
        if self.state == SchedulerState::Failed {
            return Err(Error::InvalidState("scheduler has failed".into()));
        }

        let Some(id) = self.heap.pop() else {
            return Ok(Step::Exhausted);
        };
        let Some(cost) = self.heap.get(id).map(|c| c.cost) else {
            return Ok(Step::Exhausted);
        };

        if self.params.max_error.is_some_and(|bound| cost > bound) {
            self.heap.insert(id);
            debug!(cost, "Cheapest candidate exceeds the error bound");
            return Ok(Step::ErrorBound);
        }

        if let Err(reason) = self.check(id) {
            self.stats.collapses_rejected += 1;
            trace!(candidate = id, ?reason, "Rejected contraction");
            return Ok(Step::Rejected);
        }

        let dead_faces = self.apply(id)?;
        Ok(Step::Contracted { dead_faces })
    }

    // ------------------------------------------------------------
    // Quadric collection
    // ------------------------------------------------------------

    fn collect_quadrics(&mut self) {
        let n = self.model.vertex_count();
        let face_weights = self.face_weights();

        self.quadrics = if self.strategy == CollapseStrategy::Property && self.layout.dim() > 3 {
            let dim = self.layout.dim();
            let mut quadrics = vec![Quadric::zeros(dim); n];
            for (f, face) in self.model.valid_faces() {
                let corners = face.vertices();
                let lifted = corners.map(|v| self.layout.pack(self.model.position(v), self.model.attributes(v)));
                let q = Quadric::from_points(&lifted[0], &lifted[1], &lifted[2], face.area());
                for (i, &v) in corners.iter().enumerate() {
                    let mut qi = q.clone();
                    qi *= face_weights[f][i];
                    quadrics[v] += &qi;
                }
            }
            for (v, q) in self.boundary_quadrics() {
                quadrics[v] += &Quadric::from_quadric3(&q, dim);
            }
            VertexQuadrics::Extended(quadrics)
        } else {
            let mut quadrics = vec![Quadric3::zeros(); n];
            for (f, face) in self.model.valid_faces() {
                let corners = face.vertices();
                let p0 = self.model.position(corners[0]).coords;
                let q = if self.params.weighting == WeightingPolicy::RawNormals {
                    let raw = self.model.raw_normal(f);
                    Quadric3::from_plane(&raw, -raw.dot(&p0), face.area())
                } else {
                    let normal = face.normal();
                    Quadric3::from_plane(normal, -normal.dot(&p0), face.area())
                };
                for (i, &v) in corners.iter().enumerate() {
                    let mut qi = q;
                    qi *= face_weights[f][i];
                    quadrics[v] += qi;
                }
            }
            for (v, q) in self.boundary_quadrics() {
                quadrics[v] += q;
            }
            VertexQuadrics::Geometric(quadrics)
        };
    }

    /// Per-corner scale of every face quadric under the weighting policy
    fn face_weights(&self) -> Vec<[f64; 3]> {
        let mut weights = vec![[0.0; 3]; self.model.face_count()];
        for (f, face) in self.model.valid_faces() {
            let area = face.area();
            weights[f] = match self.params.weighting {
                WeightingPolicy::Uniform | WeightingPolicy::RawNormals => [1.0; 3],
                WeightingPolicy::Area | WeightingPolicy::AreaAverage => [area; 3],
                WeightingPolicy::Angle => {
                    let [p0, p1, p2] = self.model.corners(f);
                    [corner_angle(&p0, &p1, &p2), corner_angle(&p1, &p2, &p0), corner_angle(&p2, &p0, &p1)]
                }
                WeightingPolicy::Dihedral { angle_weight } => {
                    let w = area * (1.0 + angle_weight * self.max_dihedral(f) / PI);
                    [w; 3]
                }
            };
        }
        weights
    }

    /// Sharpest angle between face `f` and its edge neighbours
    fn max_dihedral(&self, f: FaceId) -> f64 {
        let Some(face) = self.model.face(f) else {
            return 0.0;
        };
        let n = face.normal();
        let [a, b, c] = face.vertices();
        [(a, b), (b, c), (c, a)]
            .into_iter()
            .flat_map(|(u, v)| self.model.shared_faces(u, v))
            .filter(|&g| g != f)
            .filter_map(|g| self.model.face(g))
            .filter(|g| !g.is_degenerate())
            .map(|g| n.dot(g.normal()).clamp(-1.0, 1.0).acos())
            .fold(0.0, f64::max)
    }

    /// Penalty planes perpendicular to every boundary edge, paired with the
    /// endpoint they belong to.
    fn boundary_quadrics(&self) -> Vec<(VertexId, Quadric3)> {
        let mut out = Vec::new();
        if self.params.boundary_weight == 0.0 {
            return out;
        }
        let scale_by_length = matches!(
            self.params.weighting,
            WeightingPolicy::Area | WeightingPolicy::AreaAverage | WeightingPolicy::Dihedral { .. }
        );
        for (_, face) in self.model.valid_faces() {
            if face.is_degenerate() {
                continue;
            }
            let [a, b, c] = face.vertices();
            for (u, v) in [(a, b), (b, c), (c, a)] {
                if !self.model.is_boundary_edge(u, v) {
                    continue;
                }
                let pu = self.model.position(u).coords;
                let e = self.model.position(v).coords - pu;
                let n = e.cross(face.normal());
                let len = n.norm();
                if len <= f64::EPSILON {
                    continue;
                }
                let n = n / len;
                let mut q = Quadric3::from_plane(&n, -n.dot(&pu), 0.0);
                q *= if scale_by_length {
                    self.params.boundary_weight * e.norm_squared()
                } else {
                    self.params.boundary_weight
                };
                out.push((u, q));
                out.push((v, q));
            }
        }
        out
    }

    // ------------------------------------------------------------
    // Candidates
    // ------------------------------------------------------------

    fn collect_candidates(&mut self) {
        let mut pairs: Vec<(VertexId, VertexId)> = self
            .model
            .valid_faces()
            .flat_map(|(_, face)| face.vertices().into_iter().tuple_combinations::<(_, _)>())
            .map(|(a, b)| if a < b { (a, b) } else { (b, a) })
            .unique()
            .collect();

        if self.strategy == CollapseStrategy::Face {
            let virtual_pairs = self.virtual_pairs(&pairs);
            debug!(count = virtual_pairs.len(), "Added virtual pairs");
            pairs.extend(virtual_pairs);
        }

        for (a, b) in pairs {
            self.create_candidate(a, b);
        }
    }

    /// Unconnected vertex pairs closer than the pair tolerance, sorted
    fn virtual_pairs(&self, edges: &[(VertexId, VertexId)]) -> Vec<(VertexId, VertexId)> {
        let tolerance = match self.params.pair_tolerance {
            Some(t) => t,
            None => self.bounding_diagonal() * DEFAULT_PAIR_TOLERANCE,
        };
        if tolerance <= 0.0 || !tolerance.is_finite() {
            return Vec::new();
        }

        let points: Vec<IndexedPoint> = self
            .model
            .vertices()
            .filter(|(_, v)| v.is_valid())
            .map(|(i, v)| IndexedPoint {
                position: [v.position.x, v.position.y, v.position.z],
                index: i,
            })
            .collect();
        let tree = RTree::bulk_load(points.clone());
        let known: std::collections::HashSet<(VertexId, VertexId)> = edges.iter().copied().collect();

        let mut pairs = Vec::new();
        for p in &points {
            for q in tree.locate_within_distance(*p, tolerance * tolerance) {
                if q.index > p.index && !known.contains(&(p.index, q.index)) {
                    pairs.push((p.index, q.index));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }

    fn bounding_diagonal(&self) -> f64 {
        let mut valid = self.model.vertices().filter(|(_, v)| v.is_valid()).map(|(_, v)| v.position);
        let Some(first) = valid.next() else {
            return 0.0;
        };
        let (min, max) = valid.fold((first, first), |(mut min, mut max), p| {
            for i in 0..3 {
                min[i] = min[i].min(p[i]);
                max[i] = max[i].max(p[i]);
            }
            (min, max)
        });
        (max - min).norm()
    }

    fn create_candidate(&mut self, v1: VertexId, v2: VertexId) -> CandidateId {
        let id = self.heap.push(Candidate::new(v1, v2));
        self.links[v1].push(id);
        self.links[v2].push(id);
        self.score(id);
        id
    }

    /// Recompute the cost and target of a candidate and fix its heap slot.
    fn score(&mut self, id: CandidateId) {
        let Some((v1, v2)) = self.heap.get(id).map(|c| (c.v1, c.v2)) else {
            return;
        };
        let eval = self.evaluate(v1, v2);
        if let Some(c) = self.heap.get_mut(id) {
            c.cost = eval.cost;
            c.position = eval.position;
            c.attributes = eval.attributes;
            c.fell_back = eval.fell_back;
        }
        self.heap.update(id);
    }

    fn evaluate(&self, v1: VertexId, v2: VertexId) -> Evaluation {
        let p1 = *self.model.position(v1);
        let p2 = *self.model.position(v2);
        let a1 = self.model.attributes(v1);
        let a2 = self.model.attributes(v2);
        let policy = self.params.placement;

        let (mut cost, position, attributes, fell_back, area) = match &self.quadrics {
            VertexQuadrics::Geometric(quadrics) => {
                let q = quadrics[v1] + quadrics[v2];
                let placed = place(&q, &p1.coords, &p2.coords, policy);
                let position = Point3d::from(placed.position);
                let t = segment_parameter(&p1, &p2, &position);
                (
                    placed.cost,
                    position,
                    a1.lerp(a2, t as f32),
                    placed.fell_back(policy),
                    q.area(),
                )
            }
            VertexQuadrics::Extended(quadrics) => {
                let q = &quadrics[v1] + &quadrics[v2];
                let x1 = self.layout.pack(&p1, a1);
                let x2 = self.layout.pack(&p2, a2);
                let placed = place(&q, &x1, &x2, policy);
                let t = segment_parameter(&p1, &p2, &Point3d::new(placed.position[0], placed.position[1], placed.position[2]));
                let base = a1.lerp(a2, t as f32);
                let (position, attributes) = self.layout.unpack(&placed.position, &base);
                (placed.cost, position, attributes, placed.fell_back(policy), q.area())
            }
        };

        if self.params.weighting == WeightingPolicy::AreaAverage && area > f64::EPSILON {
            cost /= area;
        }
        cost += self.penalty(v1, v2, &position);

        Evaluation {
            cost,
            position,
            attributes,
            fell_back,
        }
    }

    /// Cost bias deferring contractions that would produce poor meshing
    fn penalty(&self, v1: VertexId, v2: VertexId, target: &Point3d) -> f64 {
        let mut bias = 0.0;

        let degree = self.merged_degree(v1, v2);
        if degree > self.params.vertex_degree_limit {
            bias += (degree - self.params.vertex_degree_limit) as f64
                * self.params.meshing_penalty
                * DEGREE_PENALTY_SCALE;
        }

        let failed = self.validity_failures(v1, v2, target) + self.validity_failures(v2, v1, target);
        bias += failed as f64 * self.params.meshing_penalty;

        if self.params.compactness_ratio > 0.0 {
            let worst = self.min_compactness(v1, v2, target).min(self.min_compactness(v2, v1, target));
            if worst < self.params.compactness_ratio {
                bias += 1.0 - worst;
            }
        }
        bias
    }

    /// Valence of the merged vertex
    fn merged_degree(&self, v1: VertexId, v2: VertexId) -> usize {
        let f1 = self.model.vertex(v1).map_or(0, |v| v.degree());
        let f2 = self.model.vertex(v2).map_or(0, |v| v.degree());
        let shared = self.model.edge_face_count(v1, v2);
        (f1 + f2).saturating_sub(2 * shared)
    }

    /// Faces of `v` that survive the contraction with `other`
    fn moving_faces(&self, v: VertexId, other: VertexId) -> impl Iterator<Item = FaceId> + '_ {
        self.model
            .vertex(v)
            .map(|x| x.faces())
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(move |&f| self.model.face(f).is_some_and(|face| !face.contains(other)))
    }

    /// Number of faces of `v` that would fold over (or come closer to their
    /// opposite edge than the validity threshold allows) when `v` moves to
    /// `target`.
    fn validity_failures(&self, v: VertexId, other: VertexId, target: &Point3d) -> usize {
        let pv = self.model.position(v);
        self.moving_faces(v, other)
            .filter(|&f| {
                let Some((x, y)) = self.model.face(f).and_then(|face| face.opposite(v)) else {
                    return false;
                };
                let px = self.model.position(x);
                let e = self.model.position(y) - px;
                let n = e.cross(&(pv - px)).cross(&e);
                let len = n.norm();
                if len <= f64::EPSILON {
                    return false;
                }
                let n = n / len;
                (target - px).dot(&n) < self.params.local_validity_threshold * (pv - px).dot(&n)
            })
            .count()
    }

    fn min_compactness(&self, v: VertexId, other: VertexId, target: &Point3d) -> f64 {
        self.moving_faces(v, other)
            .filter_map(|f| {
                let (x, y) = self.model.face(f)?.opposite(v)?;
                Some(triangle_compactness(target, self.model.position(x), self.model.position(y)))
            })
            .fold(1.0, f64::min)
    }

    // ------------------------------------------------------------
    // Validation and contraction
    // ------------------------------------------------------------

    fn check(&self, id: CandidateId) -> std::result::Result<(), Rejection> {
        let Some(c) = self.heap.get(id) else {
            return Err(Rejection::InvalidEndpoint);
        };
        let (v1, v2) = (c.v1, c.v2);
        if v1 == v2 || !self.model.vertex_is_valid(v1) || !self.model.vertex_is_valid(v2) {
            return Err(Rejection::InvalidEndpoint);
        }

        let shared = self.model.edge_face_count(v1, v2);
        if shared == 0 && self.strategy != CollapseStrategy::Face {
            return Err(Rejection::NotAdjacent);
        }
        if self.params.will_join_only && shared > 0 {
            return Err(Rejection::JoinOnly);
        }

        let f1 = self.model.vertex(v1).map_or(0, |v| v.degree());
        let f2 = self.model.vertex(v2).map_or(0, |v| v.degree());
        let degree = self.merged_degree(v1, v2);
        if degree > self.params.vertex_degree_limit && degree > f1.max(f2) {
            return Err(Rejection::Degree);
        }

        if self.validity_failures(v1, v2, &c.position) + self.validity_failures(v2, v1, &c.position) > 0 {
            return Err(Rejection::Inversion);
        }
        Ok(())
    }

    /// Contract the candidate `id` (already dequeued) and repair the heap.
    fn apply(&mut self, id: CandidateId) -> Result<usize> {
        let Some(c) = self.heap.get(id).cloned() else {
            return Err(Error::InvalidState(format!("unknown candidate {id}")));
        };
        let (v1, v2) = (c.v1, c.v2);

        let contraction = self.model.contract(v1, v2, c.position, c.attributes)?;

        match &mut self.quadrics {
            VertexQuadrics::Geometric(q) => {
                let removed = q[v2];
                q[v1] += removed;
            }
            VertexQuadrics::Extended(q) => {
                let removed = q[v2].clone();
                q[v1] += &removed;
            }
        }

        self.relink(id, v1, v2);

        let mut affected: Vec<CandidateId> = self.links[v1].clone();
        for &u in &contraction.one_ring {
            affected.extend_from_slice(&self.links[u]);
        }
        affected.sort_unstable();
        affected.dedup();
        for cid in affected {
            self.score(cid);
            if !self.heap.contains(cid) {
                self.heap.insert(cid);
            }
        }

        self.stats.collapses_performed += 1;
        self.stats.max_cost = self.stats.max_cost.max(c.cost);
        if c.fell_back {
            self.stats.placement_fallbacks += 1;
        }
        trace!(
            v1,
            v2,
            cost = c.cost,
            dead = contraction.dead_faces.len(),
            "Contracted pair"
        );
        Ok(contraction.dead_faces.len())
    }

    /// Move the candidates of `v2` onto `v1`, dropping the applied one and
    /// any that would duplicate an existing pair.
    fn relink(&mut self, applied: CandidateId, v1: VertexId, v2: VertexId) {
        self.links[v1].retain(|&cid| cid != applied);
        let moved = std::mem::take(&mut self.links[v2]);

        for cid in moved {
            if cid == applied {
                continue;
            }
            let Some(other) = self.heap.get(cid).map(|c| c.other(v2)) else {
                continue;
            };

            if other == v1 {
                self.heap.remove(cid);
                self.links[v1].retain(|&x| x != cid);
                continue;
            }

            let duplicate = self.links[v1]
                .iter()
                .any(|&x| self.heap.get(x).is_some_and(|c| c.other(v1) == other));
            if duplicate {
                self.heap.remove(cid);
                self.links[other].retain(|&x| x != cid);
                continue;
            }

            if let Some(c) = self.heap.get_mut(cid) {
                if c.v1 == v2 {
                    c.v1 = v1;
                } else {
                    c.v2 = v1;
                }
            }
            self.links[v1].push(cid);
        }
    }
}

// ============================================================
// Geometry helpers
// ============================================================

/// Interior angle at `a` of the triangle `(a, b, c)`
fn corner_angle(a: &Point3d, b: &Point3d, c: &Point3d) -> f64 {
    let u = b - a;
    let v = c - a;
    if u.norm_squared() <= f64::EPSILON || v.norm_squared() <= f64::EPSILON {
        return 0.0;
    }
    u.angle(&v)
}

/// `4√3·area / (l1² + l2² + l3²)`: one for an equilateral triangle, zero
/// for a degenerate one.
pub fn triangle_compactness(a: &Point3d, b: &Point3d, c: &Point3d) -> f64 {
    let ab = b - a;
    let bc = c - b;
    let ca = a - c;
    let sum = ab.norm_squared() + bc.norm_squared() + ca.norm_squared();
    if sum <= f64::EPSILON {
        return 0.0;
    }
    let area = 0.5 * ab.cross(&(c - a)).norm();
    4.0 * 3.0_f64.sqrt() * area / sum
}

/// Parameter of the projection of `p` onto the segment `a`–`b`, in `[0, 1]`
fn segment_parameter(a: &Point3d, b: &Point3d, p: &Point3d) -> f64 {
    let d = b - a;
    let len2 = d.norm_squared();
    if len2 <= f64::EPSILON {
        return 0.0;
    }
    ((p - a).dot(&d) / len2).clamp(0.0, 1.0)
}
