use kurbo::Affine;
use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// Determinant magnitude below which a transform counts as non-invertible.
pub const EPS_DET: f64 = 1e-12;

/// A container node in the hierarchy carrying a local 2D affine transform.
///
/// `inverse_transform` and `transform_from_root` are caches, kept consistent
/// by the complex: the inverse is recomputed when the local transform is set,
/// and `transform_from_root` is recomputed top-down whenever any ancestor's
/// local transform changes or the group is re-parented.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    pub(crate) transform: Affine,
    pub(crate) inverse_transform: Affine,
    pub(crate) transform_from_root: Affine,
    pub(crate) children: Vec<NodeId>,
}

impl Group {
    pub(crate) fn new() -> Self {
        Group {
            transform: Affine::IDENTITY,
            inverse_transform: Affine::IDENTITY,
            transform_from_root: Affine::IDENTITY,
            children: Vec::new(),
        }
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn inverse_transform(&self) -> Affine {
        self.inverse_transform
    }

    /// Root-relative transform: parent's `transform_from_root` composed with
    /// the local transform (or just the local transform at the root).
    pub fn transform_from_root(&self) -> Affine {
        self.transform_from_root
    }

    /// Children in insertion order. Order is observable: it drives rendering
    /// order and deterministic diff iteration.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::new()
    }
}
