//! Geometry kernel trait definitions
//!
//! These types define the interface the kernel worker dispatches into. Every
//! value that crosses the worker boundary is serde-serializable so results can
//! be memoized as structured values.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Error type for geometry kernel operations
#[derive(Debug, Clone, Error)]
pub enum KernelError {
    /// Arguments were structurally valid but geometrically meaningless
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A solid handle does not refer to anything this kernel created
    #[error("Unknown solid: {0}")]
    UnknownSolid(Uuid),

    /// Boolean operation could not be performed
    #[error("Boolean operation failed: {0}")]
    BooleanFailed(String),

    /// Tessellation could not be performed
    #[error("Tessellation failed: {0}")]
    TessellationFailed(String),

    /// No usable kernel backend
    #[error("Kernel not available: {0}")]
    KernelNotAvailable(String),
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Handle to a solid owned by a kernel
///
/// The geometry itself stays inside the kernel; only the handle travels back
/// to the caller, which keeps memoized results small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Solid {
    /// Unique identifier
    pub id: Uuid,
}

impl Solid {
    /// Create a handle for the given ID
    pub fn new(id: Uuid) -> Self {
        Self { id }
    }

    /// Create a handle with a fresh random ID
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4())
    }
}

/// Boolean operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BooleanType {
    /// Union (add)
    Union,
    /// Subtraction (cut)
    Subtract,
    /// Intersection (common)
    Intersect,
}

/// A tessellated mesh output from the kernel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TessellatedMesh {
    /// Vertex positions
    pub vertices: Vec<[f32; 3]>,
    /// Vertex normals, one per vertex
    pub normals: Vec<[f32; 3]>,
    /// Triangle indices (3 per triangle)
    pub indices: Vec<u32>,
}

impl TessellatedMesh {
    /// Create an empty tessellated mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Get the number of triangles
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Append another mesh, re-basing its indices
    pub fn append(&mut self, other: TessellatedMesh) {
        let base = self.vertices.len() as u32;
        self.vertices.extend(other.vertices);
        self.normals.extend(other.normals);
        self.indices.extend(other.indices.into_iter().map(|i| i + base));
    }
}

/// The geometry kernel trait
///
/// Implementations are owned by exactly one worker context, so construction
/// operations take `&mut self` and need no interior locking.
pub trait GeometryKernel: Send {
    /// Get the name of this kernel
    fn name(&self) -> &str;

    /// Check if the kernel is available
    fn is_available(&self) -> bool;

    /// Create an axis-aligned box primitive
    fn create_box(&mut self, center: Vec3, size: Vec3) -> KernelResult<Solid>;

    /// Create a cylinder primitive
    ///
    /// # Arguments
    /// * `center` - Center of the cylinder (midway along the axis)
    /// * `radius` - Cylinder radius
    /// * `height` - Length along `axis`
    /// * `axis` - Cylinder axis (need not be normalized)
    fn create_cylinder(
        &mut self,
        center: Vec3,
        radius: f32,
        height: f32,
        axis: Vec3,
    ) -> KernelResult<Solid>;

    /// Create a sphere primitive
    fn create_sphere(&mut self, center: Vec3, radius: f32) -> KernelResult<Solid>;

    /// Combine solids with a boolean operation
    ///
    /// The first solid is the base; the rest are applied to it in order.
    fn boolean(&mut self, shapes: &[Solid], op: BooleanType) -> KernelResult<Solid>;

    /// Tessellate a solid into triangles
    ///
    /// # Arguments
    /// * `solid` - The solid to tessellate
    /// * `tolerance` - Maximum chord deviation (lower = more triangles)
    fn tessellate(&self, solid: &Solid, tolerance: f32) -> KernelResult<TessellatedMesh>;

    /// Number of solids currently held by the kernel
    fn solid_count(&self) -> usize;

    /// Drop every solid held by the kernel, returning how many were released
    fn release_all(&mut self) -> usize;
}
