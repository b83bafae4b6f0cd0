//! Quadric error decimation of [`TriangleMesh`] values

use crate::decimate::{AttributeLayout, Decimator, MIN_TARGET_FACES};
use crate::model::MeshModel;
use crate::params::{CollapseStrategy, SlimParams};
use crate::result::DecimationStats;
use crate::MeshSimplifier;
use meshlod_core::{Error, Result, TriangleMesh};

/// Quadric error decimation simplifier
#[derive(Debug, Clone, PartialEq)]
pub struct QuadricErrorSimplifier {
    pub strategy: CollapseStrategy,
    pub params: SlimParams,
    /// Attribute channels for the property strategy; `None` uses every
    /// channel the mesh carries.
    pub layout: Option<AttributeLayout>,
}

impl Default for QuadricErrorSimplifier {
    fn default() -> Self {
        Self {
            strategy: CollapseStrategy::Edge,
            params: SlimParams::default(),
            layout: None,
        }
    }
}

impl QuadricErrorSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(strategy: CollapseStrategy, params: SlimParams) -> Self {
        Self {
            strategy,
            params,
            layout: None,
        }
    }

    #[must_use]
    pub fn with_layout(mut self, layout: AttributeLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Decimate `mesh` to at most `target_faces` faces.
    pub fn simplify_to(&self, mesh: &TriangleMesh, target_faces: usize) -> Result<(TriangleMesh, DecimationStats)> {
        if target_faces < MIN_TARGET_FACES {
            return Err(Error::InvalidObjective(target_faces));
        }
        let model = MeshModel::from_triangle_mesh(mesh)?;
        let mut decimator = Decimator::new(model, self.strategy, self.params.clone());
        if let Some(layout) = self.layout {
            decimator = decimator.with_layout(layout);
        }
        decimator.decimate(target_faces)?;
        let stats = decimator.stats().clone();
        Ok((decimator.into_model().to_triangle_mesh(), stats))
    }
}

impl MeshSimplifier for QuadricErrorSimplifier {
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidData(
                "reduction_ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        if mesh.is_empty() || reduction_ratio == 0.0 || mesh.face_count() <= MIN_TARGET_FACES {
            return Ok(mesh.clone());
        }

        let keep = (mesh.face_count() as f64 * (1.0 - f64::from(reduction_ratio))).round() as usize;
        let target = keep.max(MIN_TARGET_FACES);
        self.simplify_to(mesh, target).map(|(out, _)| out)
    }
}
