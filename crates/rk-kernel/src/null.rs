//! Kernel placeholder used when no backend is available

use glam::Vec3;

use crate::traits::{BooleanType, GeometryKernel, KernelError, KernelResult, Solid, TessellatedMesh};

/// A null kernel that always returns errors
#[derive(Debug, Default)]
pub struct NullKernel;

fn unavailable<T>() -> KernelResult<T> {
    Err(KernelError::KernelNotAvailable(
        "No geometry kernel available".into(),
    ))
}

impl GeometryKernel for NullKernel {
    fn name(&self) -> &str {
        "null"
    }

    fn is_available(&self) -> bool {
        false
    }

    fn create_box(&mut self, _center: Vec3, _size: Vec3) -> KernelResult<Solid> {
        unavailable()
    }

    fn create_cylinder(
        &mut self,
        _center: Vec3,
        _radius: f32,
        _height: f32,
        _axis: Vec3,
    ) -> KernelResult<Solid> {
        unavailable()
    }

    fn create_sphere(&mut self, _center: Vec3, _radius: f32) -> KernelResult<Solid> {
        unavailable()
    }

    fn boolean(&mut self, _shapes: &[Solid], _op: BooleanType) -> KernelResult<Solid> {
        unavailable()
    }

    fn tessellate(&self, _solid: &Solid, _tolerance: f32) -> KernelResult<TessellatedMesh> {
        unavailable()
    }

    fn solid_count(&self) -> usize {
        0
    }

    fn release_all(&mut self) -> usize {
        0
    }
}
