//! Model importer: validates raw geometry, fills in missing normals and
//! tangents, and coalesces meshes that share a material.
//!
//! File-format readers live elsewhere; they produce a [`ModelData`] and hand
//! it here. Positions are model space; generated normals and tangent vectors
//! are unit length, and the tangent `w` component carries the bitangent
//! handedness sign.

use super::{Aabb, Mesh, MeshDescription};
use glam::{Vec2, Vec3, Vec4};
use log::{info, warn};
use std::error;
use std::fmt;

const UV_EPSILON: f32 = 1.0e-6;

/// Raw geometry handed over by a file-format reader.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub positions: Vec<Vec3>,
    pub coordinates: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub blend_indices: Vec<[u8; 4]>,
    pub blend_weights: Vec<[u8; 4]>,
    pub elements: Vec<u32>,
    pub meshes: Vec<MeshDescription>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImportError {
    MissingVertices,
    ElementOutOfBounds(u32),
    UnfinishedTriangles,
    MissingTangentSource,
    DegenerateTangents,
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::MissingVertices => write!(f, "missing vertices"),
            ImportError::ElementOutOfBounds(element) => {
                write!(f, "element {} out of bounds", element)
            }
            ImportError::UnfinishedTriangles => write!(f, "unfinished triangles"),
            ImportError::MissingTangentSource => {
                write!(f, "missing tangents and texture coordinates, bailing")
            }
            ImportError::DegenerateTangents => {
                write!(f, "could not generate tangents, degenerate tangents formed")
            }
        }
    }
}

impl error::Error for ImportError {}

/// Imported model: per-vertex arrays sized to the vertex count, one mesh per
/// material.
#[derive(Clone, Debug, Default)]
pub struct Importer {
    pub positions: Vec<Vec3>,
    pub coordinates: Vec<Vec2>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub blend_indices: Vec<[u8; 4]>,
    pub blend_weights: Vec<[u8; 4]>,
    pub elements: Vec<u32>,
    pub meshes: Vec<Mesh>,
}

impl Importer {
    /// Runs the whole pipeline: validate, generate missing attributes,
    /// resize mismatched arrays, coalesce by material.
    pub fn import(data: ModelData) -> Result<Importer, ImportError> {
        let mut importer = Importer {
            positions: data.positions,
            coordinates: data.coordinates,
            normals: data.normals,
            tangents: data.tangents,
            blend_indices: data.blend_indices,
            blend_weights: data.blend_weights,
            elements: data.elements,
            meshes: Vec::new(),
        };

        if importer.elements.is_empty() || importer.positions.is_empty() {
            return Err(ImportError::MissingVertices);
        }

        let vertices = importer.positions.len();
        let max_element = importer.elements.iter().copied().max().unwrap_or(0);
        if max_element as usize >= vertices {
            return Err(ImportError::ElementOutOfBounds(max_element));
        }
        if importer.elements.len() % 3 != 0 {
            return Err(ImportError::UnfinishedTriangles);
        }

        info!(
            target: "model/importer",
            "{} triangles, {} vertices, {} meshes",
            importer.elements.len() / 3,
            vertices,
            data.meshes.len()
        );

        if importer.normals.is_empty() {
            warn!(target: "model/importer", "missing normals");
            importer.generate_normals();
        }

        if importer.tangents.is_empty() {
            // Tangent vectors come from UV-space derivatives; without
            // coordinates there is nothing to derive from.
            if importer.coordinates.is_empty() {
                return Err(ImportError::MissingTangentSource);
            }
            warn!(target: "model/importer", "missing tangents, generating them");
            importer.generate_tangents()?;
        }

        if importer.normals.len() != vertices {
            warn!(
                target: "model/importer",
                "too {} normals",
                if importer.normals.len() > vertices { "many" } else { "few" }
            );
            importer.normals.resize(vertices, Vec3::ZERO);
        }

        if importer.tangents.len() != vertices {
            warn!(
                target: "model/importer",
                "too {} tangents",
                if importer.tangents.len() > vertices { "many" } else { "few" }
            );
            importer.tangents.resize(vertices, Vec4::ZERO);
        }

        if !importer.coordinates.is_empty() && importer.coordinates.len() != vertices {
            warn!(
                target: "model/importer",
                "too {} coordinates",
                if importer.coordinates.len() > vertices { "many" } else { "few" }
            );
            importer.coordinates.resize(vertices, Vec2::ZERO);
        }

        importer.coalesce(&data.meshes);
        Ok(importer)
    }

    pub fn is_animated(&self) -> bool {
        !self.blend_indices.is_empty() && !self.blend_weights.is_empty()
    }

    /// Area-weighted vertex normals: every triangle accumulates its face
    /// normal onto its three corners, then each sum is normalized.
    fn generate_normals(&mut self) {
        self.normals = vec![Vec3::ZERO; self.positions.len()];

        for triangle in self.elements.chunks_exact(3) {
            let index0 = triangle[0] as usize;
            let index1 = triangle[1] as usize;
            let index2 = triangle[2] as usize;

            let p1p0 = self.positions[index1] - self.positions[index0];
            let p2p0 = self.positions[index2] - self.positions[index0];
            let normal = p1p0.cross(p2p0).normalize_or_zero();

            self.normals[index0] += normal;
            self.normals[index1] += normal;
            self.normals[index2] += normal;
        }

        for normal in &mut self.normals {
            *normal = normal.normalize_or_zero();
        }
    }

    /// Accumulates inverse UV-derivative tangents and bitangents per vertex,
    /// skipping triangles whose UV determinant vanishes; fails only when no
    /// triangle contributed. The tangent is orthonormalized against the
    /// vertex normal and `w` is the bitangent handedness.
    fn generate_tangents(&mut self) -> Result<(), ImportError> {
        let vertices = self.positions.len();
        let mut tangents = vec![Vec3::ZERO; vertices];
        let mut bitangents = vec![Vec3::ZERO; vertices];
        let mut contributed = false;

        for triangle in self.elements.chunks_exact(3) {
            let index0 = triangle[0] as usize;
            let index1 = triangle[1] as usize;
            let index2 = triangle[2] as usize;

            let uv0 = self.coordinates[index1] - self.coordinates[index0];
            let uv1 = self.coordinates[index2] - self.coordinates[index0];

            let q1 = self.positions[index1] - self.positions[index0];
            let q2 = self.positions[index2] - self.positions[index0];

            let det = uv0.x * uv1.y - uv1.x * uv0.y;
            if det.abs() <= UV_EPSILON {
                continue;
            }
            let inv_det = 1.0 / det;

            let tangent = (q1 * uv1.y - q2 * uv0.y) * inv_det;
            let bitangent = (q2 * uv0.x - q1 * uv1.x) * inv_det;

            tangents[index0] += tangent;
            tangents[index1] += tangent;
            tangents[index2] += tangent;

            bitangents[index0] += bitangent;
            bitangents[index1] += bitangent;
            bitangents[index2] += bitangent;

            contributed = true;
        }

        if !contributed {
            return Err(ImportError::DegenerateTangents);
        }

        self.tangents = Vec::with_capacity(vertices);
        for index in 0..vertices {
            let normal = self.normals[index];
            let tangent = tangents[index];
            let bitangent = bitangents[index];

            let orthonormal = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
            let sign = if normal.cross(tangent).dot(bitangent) < 0.0 {
                -1.0
            } else {
                1.0
            };
            self.tangents
                .push(Vec4::new(orthonormal.x, orthonormal.y, orthonormal.z, sign));
        }

        Ok(())
    }

    /// Groups the source meshes by material, concatenating their element
    /// ranges into a fresh element buffer and emitting one mesh per material
    /// with the combined bounds. First-seen material order is kept.
    fn coalesce(&mut self, meshes: &[MeshDescription]) {
        struct Batch {
            offset: usize,
            count: usize,
            bounds: Aabb,
        }

        let mut materials: Vec<(String, Vec<Batch>)> = Vec::new();
        for mesh in meshes {
            let mut bounds = Aabb::new();
            for index in mesh.offset..mesh.offset + mesh.count {
                bounds.expand_point(self.positions[self.elements[index] as usize]);
            }
            let batch = Batch {
                offset: mesh.offset,
                count: mesh.count,
                bounds,
            };
            match materials.iter_mut().find(|(name, _)| *name == mesh.material) {
                Some((_, batches)) => batches.push(batch),
                None => materials.push((mesh.material.clone(), vec![batch])),
            }
        }

        let mut optimized_meshes = Vec::with_capacity(materials.len());
        let mut optimized_elements = Vec::with_capacity(self.elements.len());
        for (material, batches) in &materials {
            let offset = optimized_elements.len();
            let mut bounds = Aabb::new();
            for batch in batches {
                optimized_elements
                    .extend_from_slice(&self.elements[batch.offset..batch.offset + batch.count]);
                bounds.expand(&batch.bounds);
            }
            optimized_meshes.push(Mesh {
                offset,
                count: optimized_elements.len() - offset,
                material: material.clone(),
                bounds,
            });
        }

        if optimized_meshes.len() < meshes.len() {
            info!(
                target: "model/importer",
                "reduced {} meshes to {}",
                meshes.len(),
                optimized_meshes.len()
            );
        }

        self.meshes = optimized_meshes;
        self.elements = optimized_elements;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_data() -> ModelData {
        ModelData {
            positions: vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(1.0, 0.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            coordinates: vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
            ],
            elements: vec![0, 1, 2],
            meshes: vec![MeshDescription {
                offset: 0,
                count: 3,
                material: String::from("default"),
            }],
            ..ModelData::default()
        }
    }

    #[test]
    fn generates_face_normals() {
        let imported = Importer::import(triangle_data()).unwrap();
        for normal in &imported.normals {
            assert!((*normal - Vec3::Z).length() < 1.0e-6);
        }
    }

    #[test]
    fn generated_normals_are_unit_length() {
        let mut data = triangle_data();
        data.positions.push(Vec3::new(0.0, 0.0, 2.0));
        data.coordinates.push(Vec2::new(1.0, 1.0));
        data.elements.extend_from_slice(&[0, 1, 3]);
        data.meshes[0].count = 6;

        let imported = Importer::import(data).unwrap();
        for normal in &imported.normals {
            assert!((normal.length() - 1.0).abs() < 1.0e-5);
        }
    }

    #[test]
    fn generates_unit_tangents_with_handedness() {
        let imported = Importer::import(triangle_data()).unwrap();
        for tangent in &imported.tangents {
            assert!((tangent.truncate().length() - 1.0).abs() < 1.0e-5);
            assert!(tangent.w == 1.0 || tangent.w == -1.0);
        }
    }

    #[test]
    fn rejects_out_of_bounds_elements() {
        let mut data = triangle_data();
        data.elements[2] = 9;
        // The importer reports the offending element.
        assert_eq!(
            Importer::import(data).unwrap_err(),
            ImportError::ElementOutOfBounds(9)
        );
    }

    #[test]
    fn rejects_partial_triangles() {
        let mut data = triangle_data();
        data.elements.push(0);
        assert_eq!(Importer::import(data).unwrap_err(), ImportError::UnfinishedTriangles);
    }

    #[test]
    fn rejects_tangents_without_coordinates() {
        let mut data = triangle_data();
        data.coordinates.clear();
        assert_eq!(Importer::import(data).unwrap_err(), ImportError::MissingTangentSource);
    }

    #[test]
    fn degenerate_uv_triangles_are_skipped_not_fatal() {
        // Two triangles over the same vertices: one with collapsed UVs, one
        // with a valid mapping. Generation succeeds off the valid one.
        let mut data = triangle_data();
        data.positions.push(Vec3::new(1.0, 1.0, 0.0));
        data.coordinates.push(Vec2::new(0.0, 0.0));
        data.coordinates[1] = Vec2::new(0.0, 0.0);
        data.coordinates[2] = Vec2::new(0.0, 0.0);
        data.elements = vec![0, 1, 2, 0, 1, 3];
        data.meshes[0].count = 6;
        // Triangle (0,1,2) has zero UV area; (0,1,3) does not.
        data.coordinates[3] = Vec2::new(1.0, 1.0);
        data.coordinates[1] = Vec2::new(1.0, 0.0);

        assert!(Importer::import(data).is_ok());
    }

    #[test]
    fn all_degenerate_uvs_fail() {
        let mut data = triangle_data();
        for coordinate in &mut data.coordinates {
            *coordinate = Vec2::ZERO;
        }
        assert_eq!(Importer::import(data).unwrap_err(), ImportError::DegenerateTangents);
    }

    #[test]
    fn coalesces_meshes_by_material() {
        let mut data = triangle_data();
        data.positions.push(Vec3::new(2.0, 2.0, 2.0));
        data.coordinates.push(Vec2::new(1.0, 1.0));
        data.elements = vec![0, 1, 2, 1, 2, 3];
        data.meshes = vec![
            MeshDescription {
                offset: 0,
                count: 3,
                material: String::from("stone"),
            },
            MeshDescription {
                offset: 3,
                count: 3,
                material: String::from("stone"),
            },
        ];

        let imported = Importer::import(data).unwrap();
        assert_eq!(imported.meshes.len(), 1);
        let mesh = &imported.meshes[0];
        assert_eq!(mesh.offset, 0);
        assert_eq!(mesh.count, 6);
        assert_eq!(mesh.material, "stone");
        // Bounds enclose both source meshes.
        assert!(mesh.bounds.contains(Vec3::new(0.0, 0.0, 0.0)));
        assert!(mesh.bounds.contains(Vec3::new(2.0, 2.0, 2.0)));

        // Every emitted element still addresses a live vertex.
        for index in mesh.offset..mesh.offset + mesh.count {
            assert!((imported.elements[index] as usize) < imported.positions.len());
        }
    }

    #[test]
    fn mismatched_attribute_counts_are_resized() {
        let mut data = triangle_data();
        data.normals = vec![Vec3::Z; 5];
        let imported = Importer::import(data).unwrap();
        assert_eq!(imported.normals.len(), imported.positions.len());
    }
}
