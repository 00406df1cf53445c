//! Typed operation catalogue
//!
//! Operation paths arriving on the wire are resolved against a fixed set of
//! [`OperationId`]s, and their arguments decoded into a [`KernelCall`] whose
//! execution is an exhaustive match.

mod call;
mod registry;

use rk_kernel::KernelError;
use thiserror::Error;

pub use call::{
    BoxArgs, CubeArgs, CylinderArgs, DifferenceArgs, KernelCall, MeshArgs, MeshesArgs, ShapesArgs,
    SphereArgs,
};
pub use registry::{OperationPath, OperationRegistry};

/// Errors raised while resolving or executing an operation
#[derive(Debug, Clone, Error)]
pub enum OperationError {
    #[error("Malformed operation path '{0}'")]
    MalformedPath(String),

    #[error("Unknown operation group '{group}' in path '{path}'")]
    UnknownGroup { path: String, group: String },

    #[error("Unknown operation '{method}' in path '{path}'")]
    UnknownMethod { path: String, method: String },

    #[error("Invalid arguments for {path}: {message}")]
    InvalidArguments { path: String, message: String },

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("Failed to encode result: {0}")]
    Encode(String),

    #[error("Operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    /// Whether the path itself failed to resolve
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Self::MalformedPath(_) | Self::UnknownGroup { .. } | Self::UnknownMethod { .. }
        )
    }
}

/// Every operation the worker can execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationId {
    CreateCube,
    CreateBox,
    CreateCylinder,
    CreateSphere,
    Union,
    Difference,
    Intersection,
    ShapeToMesh,
    ShapesToMeshes,
}

impl OperationId {
    pub const ALL: [OperationId; 9] = [
        Self::CreateCube,
        Self::CreateBox,
        Self::CreateCylinder,
        Self::CreateSphere,
        Self::Union,
        Self::Difference,
        Self::Intersection,
        Self::ShapeToMesh,
        Self::ShapesToMeshes,
    ];

    /// Dotted path this operation is addressed by
    pub fn path(self) -> &'static str {
        match self {
            Self::CreateCube => "shapes.solid.createCube",
            Self::CreateBox => "shapes.solid.createBox",
            Self::CreateCylinder => "shapes.solid.createCylinder",
            Self::CreateSphere => "shapes.solid.createSphere",
            Self::Union => "booleans.union",
            Self::Difference => "booleans.difference",
            Self::Intersection => "booleans.intersection",
            Self::ShapeToMesh => "shapeToMesh",
            Self::ShapesToMeshes => "shapesToMeshes",
        }
    }
}
