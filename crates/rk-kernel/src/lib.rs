//! Geometry Kernel Abstraction
//!
//! This crate provides:
//! - The [`GeometryKernel`] trait the kernel worker dispatches into
//! - Serializable handle and mesh types returned to callers
//! - A primitive kernel backend and a null fallback

pub mod mesh;
mod null;
mod primitive;
mod traits;

pub use null::NullKernel;
pub use primitive::PrimitiveKernel;
pub use traits::{BooleanType, GeometryKernel, KernelError, KernelResult, Solid, TessellatedMesh};

/// Get the default geometry kernel
pub fn default_kernel() -> Box<dyn GeometryKernel> {
    Box::new(PrimitiveKernel::new())
}
