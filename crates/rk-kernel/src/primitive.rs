//! Primitive kernel backend
//!
//! A lightweight kernel that records analytic primitives and union compounds
//! and tessellates them on demand. It has no B-Rep engine behind it, so
//! subtraction and intersection are reported as boolean failures.

use std::collections::HashMap;

use glam::Vec3;
use uuid::Uuid;

use crate::mesh;
use crate::traits::{BooleanType, GeometryKernel, KernelError, KernelResult, Solid, TessellatedMesh};

/// Stored shape description
#[derive(Debug, Clone)]
enum Shape {
    Box {
        center: Vec3,
        size: Vec3,
    },
    Cylinder {
        center: Vec3,
        radius: f32,
        height: f32,
        axis: Vec3,
    },
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Union(Vec<Uuid>),
}

/// Kernel storing primitives by handle
#[derive(Debug, Default)]
pub struct PrimitiveKernel {
    shapes: HashMap<Uuid, Shape>,
}

impl PrimitiveKernel {
    /// Create an empty kernel
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&mut self, shape: Shape) -> Solid {
        let solid = Solid::generate();
        tracing::trace!("PrimitiveKernel stored {:?} as {}", shape, solid.id);
        self.shapes.insert(solid.id, shape);
        solid
    }

    fn shape(&self, solid: &Solid) -> KernelResult<&Shape> {
        self.shapes
            .get(&solid.id)
            .ok_or(KernelError::UnknownSolid(solid.id))
    }

    fn tessellate_shape(&self, shape: &Shape, tolerance: f32) -> KernelResult<TessellatedMesh> {
        let mesh = match shape {
            Shape::Box { center, size } => mesh::box_mesh(*center, *size),
            Shape::Cylinder {
                center,
                radius,
                height,
                axis,
            } => {
                let segments = mesh::segments_for(*radius, tolerance);
                mesh::cylinder_mesh(*center, *radius, *height, *axis, segments)
            }
            Shape::Sphere { center, radius } => {
                let lon = mesh::segments_for(*radius, tolerance);
                mesh::sphere_mesh(*center, *radius, (lon / 2).max(2), lon)
            }
            Shape::Union(children) => {
                let mut combined = TessellatedMesh::new();
                for child in children {
                    let shape = self
                        .shapes
                        .get(child)
                        .ok_or(KernelError::UnknownSolid(*child))?;
                    combined.append(self.tessellate_shape(shape, tolerance)?);
                }
                combined
            }
        };
        Ok(mesh)
    }
}

fn require_positive(name: &str, value: f32) -> KernelResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(KernelError::InvalidInput(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

impl GeometryKernel for PrimitiveKernel {
    fn name(&self) -> &str {
        "primitive"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn create_box(&mut self, center: Vec3, size: Vec3) -> KernelResult<Solid> {
        require_positive("width", size.x)?;
        require_positive("length", size.y)?;
        require_positive("height", size.z)?;
        Ok(self.store(Shape::Box { center, size }))
    }

    fn create_cylinder(
        &mut self,
        center: Vec3,
        radius: f32,
        height: f32,
        axis: Vec3,
    ) -> KernelResult<Solid> {
        require_positive("radius", radius)?;
        require_positive("height", height)?;
        if axis.length_squared() <= f32::EPSILON {
            return Err(KernelError::InvalidInput(
                "cylinder axis must be non-zero".into(),
            ));
        }
        Ok(self.store(Shape::Cylinder {
            center,
            radius,
            height,
            axis,
        }))
    }

    fn create_sphere(&mut self, center: Vec3, radius: f32) -> KernelResult<Solid> {
        require_positive("radius", radius)?;
        Ok(self.store(Shape::Sphere { center, radius }))
    }

    fn boolean(&mut self, shapes: &[Solid], op: BooleanType) -> KernelResult<Solid> {
        if shapes.len() < 2 {
            return Err(KernelError::BooleanFailed(format!(
                "{op:?} needs at least two shapes, got {}",
                shapes.len()
            )));
        }
        for solid in shapes {
            self.shape(solid)?;
        }
        match op {
            BooleanType::Union => Ok(self.store(Shape::Union(
                shapes.iter().map(|s| s.id).collect(),
            ))),
            BooleanType::Subtract | BooleanType::Intersect => Err(KernelError::BooleanFailed(
                format!("{op:?} is not supported by the primitive kernel"),
            )),
        }
    }

    fn tessellate(&self, solid: &Solid, tolerance: f32) -> KernelResult<TessellatedMesh> {
        if !(tolerance.is_finite() && tolerance > 0.0) {
            return Err(KernelError::TessellationFailed(format!(
                "tolerance must be positive, got {tolerance}"
            )));
        }
        let shape = self.shape(solid)?;
        self.tessellate_shape(shape, tolerance)
    }

    fn solid_count(&self) -> usize {
        self.shapes.len()
    }

    fn release_all(&mut self) -> usize {
        let released = self.shapes.len();
        self.shapes.clear();
        released
    }
}
