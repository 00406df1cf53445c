//! Primitive mesh generation
//!
//! Generates vertices, normals, and indices for the primitives the
//! [`PrimitiveKernel`](crate::PrimitiveKernel) records:
//! - Box (rectangular prism)
//! - Cylinder (with end caps)
//! - Sphere (UV sphere)

use std::f32::consts::{PI, TAU};

use glam::{Quat, Vec3};

use crate::traits::TessellatedMesh;

/// Fewest segments used for any curved primitive
pub const MIN_SEGMENTS: u32 = 8;

/// Most segments used for any curved primitive
pub const MAX_SEGMENTS: u32 = 256;

/// Number of circumferential segments needed to keep the chord deviation of a
/// circle of `radius` within `tolerance`.
pub fn segments_for(radius: f32, tolerance: f32) -> u32 {
    if tolerance <= 0.0 || radius <= 0.0 || tolerance >= radius {
        return MIN_SEGMENTS;
    }
    // Sagitta of a chord spanning angle 2*theta is r * (1 - cos(theta)).
    let half_angle = (1.0 - tolerance / radius).acos();
    let segments = (PI / half_angle).ceil() as u32;
    segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

/// Generate a box mesh centered on `center`
///
/// 24 vertices (4 per face so each face keeps a flat normal), 12 triangles.
pub fn box_mesh(center: Vec3, size: Vec3) -> TessellatedMesh {
    let h = size * 0.5;
    let mut mesh = TessellatedMesh {
        vertices: Vec::with_capacity(24),
        normals: Vec::with_capacity(24),
        indices: Vec::with_capacity(36),
    };

    // (normal, tangent u, tangent v) with u x v == normal
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];

    for (normal, u, v) in faces {
        let base = mesh.vertices.len() as u32;
        let face_center = normal * h;
        let du = u * h;
        let dv = v * h;
        for corner in [-du - dv, du - dv, du + dv, -du + dv] {
            mesh.vertices.push((center + face_center + corner).to_array());
            mesh.normals.push(normal.to_array());
        }
        mesh.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    mesh
}

/// Generate a capped cylinder mesh around `axis`, centered on `center`
pub fn cylinder_mesh(
    center: Vec3,
    radius: f32,
    height: f32,
    axis: Vec3,
    segments: u32,
) -> TessellatedMesh {
    let segments = segments.max(3);
    let half = height / 2.0;
    let mut mesh = TessellatedMesh::new();

    let ring = |i: u32| {
        let theta = (i as f32 / segments as f32) * TAU;
        (theta.cos(), theta.sin())
    };

    // Side
    for i in 0..=segments {
        let (c, s) = ring(i);
        mesh.vertices.push([radius * c, radius * s, -half]);
        mesh.normals.push([c, s, 0.0]);
        mesh.vertices.push([radius * c, radius * s, half]);
        mesh.normals.push([c, s, 0.0]);
    }
    for i in 0..segments {
        let base = i * 2;
        mesh.indices
            .extend_from_slice(&[base, base + 2, base + 1, base + 1, base + 2, base + 3]);
    }

    // Caps
    for (z, nz) in [(half, 1.0_f32), (-half, -1.0_f32)] {
        let center_idx = mesh.vertices.len() as u32;
        mesh.vertices.push([0.0, 0.0, z]);
        mesh.normals.push([0.0, 0.0, nz]);
        let rim = mesh.vertices.len() as u32;
        for i in 0..=segments {
            let (c, s) = ring(i);
            mesh.vertices.push([radius * c, radius * s, z]);
            mesh.normals.push([0.0, 0.0, nz]);
        }
        for i in 0..segments {
            if nz > 0.0 {
                mesh.indices
                    .extend_from_slice(&[center_idx, rim + i, rim + i + 1]);
            } else {
                mesh.indices
                    .extend_from_slice(&[center_idx, rim + i + 1, rim + i]);
            }
        }
    }

    let rotation = Quat::from_rotation_arc(Vec3::Z, axis.normalize_or(Vec3::Z));
    transform(&mut mesh, rotation, center);
    mesh
}

/// Generate a UV sphere mesh centered on `center`
pub fn sphere_mesh(center: Vec3, radius: f32, lat_segments: u32, lon_segments: u32) -> TessellatedMesh {
    let lat_segments = lat_segments.max(2);
    let lon_segments = lon_segments.max(3);
    let mut mesh = TessellatedMesh::new();

    for lat in 0..=lat_segments {
        let theta = (lat as f32 / lat_segments as f32) * PI;
        let (sin_theta, cos_theta) = theta.sin_cos();
        for lon in 0..=lon_segments {
            let phi = (lon as f32 / lon_segments as f32) * TAU;
            let (sin_phi, cos_phi) = phi.sin_cos();
            let n = Vec3::new(sin_theta * cos_phi, sin_theta * sin_phi, cos_theta);
            mesh.vertices.push((center + n * radius).to_array());
            mesh.normals.push(n.to_array());
        }
    }

    for lat in 0..lat_segments {
        for lon in 0..lon_segments {
            let current = lat * (lon_segments + 1) + lon;
            let next = current + lon_segments + 1;
            mesh.indices.extend_from_slice(&[
                current,
                next,
                current + 1,
                current + 1,
                next,
                next + 1,
            ]);
        }
    }

    mesh
}

fn transform(mesh: &mut TessellatedMesh, rotation: Quat, translation: Vec3) {
    for v in &mut mesh.vertices {
        *v = (rotation * Vec3::from_array(*v) + translation).to_array();
    }
    for n in &mut mesh.normals {
        *n = (rotation * Vec3::from_array(*n)).to_array();
    }
}
