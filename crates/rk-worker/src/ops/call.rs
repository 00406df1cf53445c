//! Typed operation arguments and execution

use glam::Vec3;
use rk_kernel::{BooleanType, GeometryKernel, Solid};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{OperationError, OperationId};

/// Chord tolerance used when a mesh call gives no precision
pub const DEFAULT_MESH_PRECISION: f32 = 0.01;

fn default_direction() -> Vec3 {
    Vec3::Z
}

fn default_precision() -> f32 {
    DEFAULT_MESH_PRECISION
}

/// `shapes.solid.createCube`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CubeArgs {
    pub size: f32,
    #[serde(default)]
    pub center: Vec3,
}

/// `shapes.solid.createBox`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoxArgs {
    pub width: f32,
    pub length: f32,
    pub height: f32,
    #[serde(default)]
    pub center: Vec3,
}

/// `shapes.solid.createCylinder`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CylinderArgs {
    pub radius: f32,
    pub height: f32,
    #[serde(default)]
    pub center: Vec3,
    #[serde(default = "default_direction")]
    pub direction: Vec3,
}

/// `shapes.solid.createSphere`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SphereArgs {
    pub radius: f32,
    #[serde(default)]
    pub center: Vec3,
}

/// `booleans.union` and `booleans.intersection`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapesArgs {
    pub shapes: Vec<Solid>,
}

/// `booleans.difference`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifferenceArgs {
    pub shape: Solid,
    pub shapes: Vec<Solid>,
}

/// `shapeToMesh`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshArgs {
    pub shape: Solid,
    #[serde(default = "default_precision")]
    pub precision: f32,
}

/// `shapesToMeshes`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshesArgs {
    pub shapes: Vec<Solid>,
    #[serde(default = "default_precision")]
    pub precision: f32,
}

/// A fully decoded call, one variant per [`OperationId`]
#[derive(Debug, Clone, PartialEq)]
pub enum KernelCall {
    CreateCube(CubeArgs),
    CreateBox(BoxArgs),
    CreateCylinder(CylinderArgs),
    CreateSphere(SphereArgs),
    Union(ShapesArgs),
    Difference(DifferenceArgs),
    Intersection(ShapesArgs),
    ShapeToMesh(MeshArgs),
    ShapesToMeshes(MeshesArgs),
}

fn decode_args<T: DeserializeOwned>(id: OperationId, inputs: &Value) -> Result<T, OperationError> {
    T::deserialize(inputs).map_err(|e| OperationError::InvalidArguments {
        path: id.path().to_string(),
        message: e.to_string(),
    })
}

fn encode<T: Serialize>(value: T) -> Result<Value, OperationError> {
    serde_json::to_value(value).map_err(|e| OperationError::Encode(e.to_string()))
}

impl KernelCall {
    /// Decode the arguments for `id`
    pub fn decode(id: OperationId, inputs: &Value) -> Result<Self, OperationError> {
        Ok(match id {
            OperationId::CreateCube => Self::CreateCube(decode_args(id, inputs)?),
            OperationId::CreateBox => Self::CreateBox(decode_args(id, inputs)?),
            OperationId::CreateCylinder => Self::CreateCylinder(decode_args(id, inputs)?),
            OperationId::CreateSphere => Self::CreateSphere(decode_args(id, inputs)?),
            OperationId::Union => Self::Union(decode_args(id, inputs)?),
            OperationId::Difference => Self::Difference(decode_args(id, inputs)?),
            OperationId::Intersection => Self::Intersection(decode_args(id, inputs)?),
            OperationId::ShapeToMesh => Self::ShapeToMesh(decode_args(id, inputs)?),
            OperationId::ShapesToMeshes => Self::ShapesToMeshes(decode_args(id, inputs)?),
        })
    }

    /// Run the call against `kernel`, encoding the result as a structured value
    pub fn execute(self, kernel: &mut dyn GeometryKernel) -> Result<Value, OperationError> {
        match self {
            Self::CreateCube(args) => encode(kernel.create_box(args.center, Vec3::splat(args.size))?),
            Self::CreateBox(args) => encode(kernel.create_box(
                args.center,
                Vec3::new(args.width, args.length, args.height),
            )?),
            Self::CreateCylinder(args) => encode(kernel.create_cylinder(
                args.center,
                args.radius,
                args.height,
                args.direction,
            )?),
            Self::CreateSphere(args) => encode(kernel.create_sphere(args.center, args.radius)?),
            Self::Union(args) => encode(kernel.boolean(&args.shapes, BooleanType::Union)?),
            Self::Difference(args) => {
                let mut operands = Vec::with_capacity(args.shapes.len() + 1);
                operands.push(args.shape);
                operands.extend(args.shapes);
                encode(kernel.boolean(&operands, BooleanType::Subtract)?)
            }
            Self::Intersection(args) => {
                encode(kernel.boolean(&args.shapes, BooleanType::Intersect)?)
            }
            Self::ShapeToMesh(args) => encode(kernel.tessellate(&args.shape, args.precision)?),
            Self::ShapesToMeshes(args) => {
                let meshes = args
                    .shapes
                    .iter()
                    .map(|shape| kernel.tessellate(shape, args.precision))
                    .collect::<Result<Vec<_>, _>>()?;
                encode(meshes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rk_kernel::{PrimitiveKernel, TessellatedMesh};
    use serde_json::json;

    #[test]
    fn test_decode_defaults() {
        let call = KernelCall::decode(OperationId::CreateCylinder, &json!({"radius": 1, "height": 2}))
            .unwrap();
        let KernelCall::CreateCylinder(args) = call else {
            panic!("expected a cylinder call");
        };
        assert_eq!(args.center, Vec3::ZERO);
        assert_eq!(args.direction, Vec3::Z);
    }

    #[test]
    fn test_decode_vectors_as_arrays() {
        let call = KernelCall::decode(
            OperationId::CreateSphere,
            &json!({"radius": 2.5, "center": [1, 2, 3]}),
        )
        .unwrap();
        assert_eq!(
            call,
            KernelCall::CreateSphere(SphereArgs {
                radius: 2.5,
                center: Vec3::new(1.0, 2.0, 3.0),
            })
        );
    }

    #[test]
    fn test_decode_rejects_missing_field() {
        let err = KernelCall::decode(OperationId::CreateBox, &json!({"width": 1})).unwrap_err();
        let OperationError::InvalidArguments { path, message } = err else {
            panic!("expected invalid arguments");
        };
        assert_eq!(path, "shapes.solid.createBox");
        assert!(message.contains("length"), "{message}");
    }

    #[test]
    fn test_execute_cube_then_mesh() {
        let mut kernel = PrimitiveKernel::new();
        let solid = KernelCall::decode(OperationId::CreateCube, &json!({"size": 3}))
            .unwrap()
            .execute(&mut kernel)
            .unwrap();
        assert!(solid.get("id").is_some());

        let mesh = KernelCall::decode(OperationId::ShapeToMesh, &json!({ "shape": solid }))
            .unwrap()
            .execute(&mut kernel)
            .unwrap();
        let mesh: TessellatedMesh = serde_json::from_value(mesh).unwrap();
        assert_eq!(mesh.triangle_count(), 12);
    }

    #[test]
    fn test_execute_surfaces_kernel_error() {
        let mut kernel = PrimitiveKernel::new();
        let a = kernel.create_box(Vec3::ZERO, Vec3::ONE).unwrap();
        let b = kernel.create_box(Vec3::X, Vec3::ONE).unwrap();
        let err = KernelCall::decode(
            OperationId::Difference,
            &json!({ "shape": a, "shapes": [b] }),
        )
        .unwrap()
        .execute(&mut kernel)
        .unwrap_err();
        assert!(matches!(err, OperationError::Kernel(_)));
    }
}
