use thiserror::Error;
use winnow::Parser;
use winnow::binary::{le_i32, le_u32};

use crate::data::parser_utils::{
    WResult, length_prefixed, parse_bool, parse_mat4, parse_rgb, parse_vec2, parse_vec3,
};
use crate::data::write_utils::{write_array, write_bool, write_count, write_scalar};

/// Index problems found by [`MeshNode::validate`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("face {face} of batch {batch} uses vertex {index}, node has {len} vertices")]
    FaceVertexOutOfRange {
        batch: usize,
        face: usize,
        index: u32,
        len: usize,
    },
    #[error("face {face} of batch {batch} uses {attribute} {index}, node has {len}")]
    FaceAttributeOutOfRange {
        batch: usize,
        face: usize,
        attribute: &'static str,
        index: u32,
        len: usize,
    },
    #[error("edge {edge} of outline {outline} uses vertex {index}, node has {len} vertices")]
    EdgeVertexOutOfRange {
        outline: usize,
        edge: usize,
        index: u32,
        len: usize,
    },
}

/// One triangle.
///
/// `normal` and `uv` index into the node's normal and texcoord arrays when
/// those are not already per-vertex. They live only in memory; the file
/// format stores vertex indices alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Face {
    pub vertex: [u32; 3],
    pub normal: Option<[u32; 3]>,
    pub uv: Option<[u32; 3]>,
}

impl Face {
    pub fn new(vertex: [u32; 3]) -> Self {
        Face {
            vertex,
            normal: None,
            uv: None,
        }
    }
}

impl From<[u32; 3]> for Face {
    fn from(vertex: [u32; 3]) -> Self {
        Face::new(vertex)
    }
}

/// A batch of faces sharing one material. A negative batch id selects material 0.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshTriangle {
    pub batch_id: i32,
    pub faces: Vec<Face>,
}

impl MeshTriangle {
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_scalar(out, self.batch_id);
        write_count(out, self.faces.len());
        for face in &self.faces {
            write_array(out, &face.vertex);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshOutline {
    pub batch_id: i32,
    pub edges: Vec<[u32; 2]>,
}

impl MeshOutline {
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_scalar(out, self.batch_id);
        write_count(out, self.edges.len());
        for edge in &self.edges {
            write_array(out, edge);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeshNode {
    pub vertices: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub colors: Vec<[u8; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    /// Local transform, column-major.
    pub transform: Option<[f64; 16]>,
    pub face_groups: Vec<MeshTriangle>,
    pub edge_groups: Vec<MeshOutline>,
}

impl MeshNode {
    pub fn face_count(&self) -> usize {
        self.face_groups.iter().map(|g| g.faces.len()).sum()
    }

    /// `[min_x, min_y, min_z, max_x, max_y, max_z]`, or `None` without vertices.
    pub fn bounding_box(&self) -> Option<[f64; 6]> {
        let first = self.vertices.first()?;
        let mut bbox = [0.0f64; 6];
        for axis in 0..3 {
            bbox[axis] = first[axis] as f64;
            bbox[axis + 3] = first[axis] as f64;
        }
        for v in &self.vertices[1..] {
            for axis in 0..3 {
                bbox[axis] = bbox[axis].min(v[axis] as f64);
                bbox[axis + 3] = bbox[axis + 3].max(v[axis] as f64);
            }
        }
        Some(bbox)
    }

    /// Check that every face and edge index refers to an existing vertex,
    /// and that in-memory normal/uv triples refer to existing attributes.
    pub fn validate(&self) -> Result<(), GeometryError> {
        let len = self.vertices.len();
        for (batch, group) in self.face_groups.iter().enumerate() {
            for (face_idx, face) in group.faces.iter().enumerate() {
                if let Some(&index) = face.vertex.iter().find(|&&i| i as usize >= len) {
                    return Err(GeometryError::FaceVertexOutOfRange {
                        batch,
                        face: face_idx,
                        index,
                        len,
                    });
                }
                let attributes = [
                    ("normal", face.normal, self.normals.len()),
                    ("texcoord", face.uv, self.tex_coords.len()),
                ];
                for (attribute, indices, attr_len) in attributes {
                    let Some(indices) = indices else {
                        continue;
                    };
                    if let Some(&index) = indices.iter().find(|&&i| i as usize >= attr_len) {
                        return Err(GeometryError::FaceAttributeOutOfRange {
                            batch,
                            face: face_idx,
                            attribute,
                            index,
                            len: attr_len,
                        });
                    }
                }
            }
        }
        for (outline, group) in self.edge_groups.iter().enumerate() {
            for (edge, indices) in group.edges.iter().enumerate() {
                if let Some(&index) = indices.iter().find(|&&i| i as usize >= len) {
                    return Err(GeometryError::EdgeVertexOutOfRange {
                        outline,
                        edge,
                        index,
                        len,
                    });
                }
            }
        }
        Ok(())
    }

    /// Unweld the node so every face corner gets its own vertex, normal and
    /// texcoord.
    ///
    /// Afterwards face `k` (counting across batches) uses vertices
    /// `3k, 3k+1, 3k+2`. Corners without a normal index get `+Z`; corners
    /// without a uv index get `(0, 0)`. Edge groups are left untouched.
    pub fn resort_attributes(&mut self) -> Result<(), GeometryError> {
        self.validate()?;

        let corners = self.face_count() * 3;
        let mut vertices = Vec::with_capacity(corners);
        let mut normals = Vec::with_capacity(corners);
        let mut tex_coords = Vec::with_capacity(corners);

        let mut next = 0u32;
        for group in &mut self.face_groups {
            for face in &mut group.faces {
                for corner in 0..3 {
                    vertices.push(self.vertices[face.vertex[corner] as usize]);
                    normals.push(match face.normal {
                        Some(n) => self.normals[n[corner] as usize],
                        None => [0.0, 0.0, 1.0],
                    });
                    tex_coords.push(match face.uv {
                        Some(uv) => self.tex_coords[uv[corner] as usize],
                        None => [0.0, 0.0],
                    });
                }
                face.vertex = [next, next + 1, next + 2];
                face.normal = None;
                face.uv = None;
                next += 3;
            }
        }

        self.vertices = vertices;
        self.normals = normals;
        self.tex_coords = tex_coords;
        Ok(())
    }

    /// Replace the normals with area-independent smooth normals.
    ///
    /// Faces are visited in batch order; each adds its unit normal to its
    /// three vertex normals, which are renormalized after every addition, so
    /// later faces weigh more than earlier ones. Zero-area faces contribute
    /// nothing. Every face's normal triple is aliased to its vertex triple.
    pub fn recompute_normals(&mut self) -> Result<(), GeometryError> {
        self.validate()?;

        let mut normals = vec![[0.0f32; 3]; self.vertices.len()];
        for group in &mut self.face_groups {
            for face in &mut group.faces {
                face.normal = Some(face.vertex);

                let [a, b, c] = face.vertex.map(|i| self.vertices[i as usize]);
                let u = sub(c, b);
                let v = sub(a, b);
                let cross = [
                    u[1] * v[2] - u[2] * v[1],
                    u[2] * v[0] - u[0] * v[2],
                    u[0] * v[1] - u[1] * v[0],
                ];
                let len = length(cross);
                if len == 0.0 {
                    continue;
                }
                for &i in &face.vertex {
                    let n = &mut normals[i as usize];
                    for axis in 0..3 {
                        n[axis] += cross[axis] / len;
                    }
                    let n_len = length(*n);
                    if n_len > 0.0 {
                        *n = n.map(|c| c / n_len);
                    }
                }
            }
        }
        self.normals = normals;
        Ok(())
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_count(out, self.vertices.len());
        for v in &self.vertices {
            write_array(out, v);
        }
        write_count(out, self.normals.len());
        for n in &self.normals {
            write_array(out, n);
        }
        write_count(out, self.colors.len());
        for c in &self.colors {
            write_array(out, c);
        }
        write_count(out, self.tex_coords.len());
        for t in &self.tex_coords {
            write_array(out, t);
        }

        write_bool(out, self.transform.is_some());
        if let Some(m) = &self.transform {
            write_array(out, m);
        }

        write_count(out, self.face_groups.len());
        for group in &self.face_groups {
            group.encode(out);
        }
        write_count(out, self.edge_groups.len());
        for group in &self.edge_groups {
            group.encode(out);
        }
    }
}

fn sub(a: [f32; 3], b: [f32; 3]) -> [f32; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn length(v: [f32; 3]) -> f32 {
    (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt()
}

fn parse_face(input: &mut &[u8]) -> WResult<Face> {
    let a = le_u32.parse_next(input)?;
    let b = le_u32.parse_next(input)?;
    let c = le_u32.parse_next(input)?;
    Ok(Face::new([a, b, c]))
}

fn parse_edge(input: &mut &[u8]) -> WResult<[u32; 2]> {
    let a = le_u32.parse_next(input)?;
    let b = le_u32.parse_next(input)?;
    Ok([a, b])
}

pub fn parse_triangle(input: &mut &[u8]) -> WResult<MeshTriangle> {
    let batch_id = le_i32.parse_next(input)?;
    let faces = length_prefixed(parse_face).parse_next(input)?;
    Ok(MeshTriangle { batch_id, faces })
}

pub fn parse_outline(input: &mut &[u8]) -> WResult<MeshOutline> {
    let batch_id = le_i32.parse_next(input)?;
    let edges = length_prefixed(parse_edge).parse_next(input)?;
    Ok(MeshOutline { batch_id, edges })
}

pub fn parse_node(input: &mut &[u8]) -> WResult<MeshNode> {
    let vertices = length_prefixed(parse_vec3).parse_next(input)?;
    let normals = length_prefixed(parse_vec3).parse_next(input)?;
    let colors = length_prefixed(parse_rgb).parse_next(input)?;
    let tex_coords = length_prefixed(parse_vec2).parse_next(input)?;
    let transform = if parse_bool(input)? {
        Some(parse_mat4(input)?)
    } else {
        None
    };
    let face_groups = length_prefixed(parse_triangle).parse_next(input)?;
    let edge_groups = length_prefixed(parse_outline).parse_next(input)?;

    Ok(MeshNode {
        vertices,
        normals,
        colors,
        tex_coords,
        transform,
        face_groups,
        edge_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::parse_all;

    fn quad() -> MeshNode {
        MeshNode {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [1.0, 1.0, 0.0],
                [0.0, 1.0, 0.0],
            ],
            face_groups: vec![MeshTriangle {
                batch_id: 0,
                faces: vec![[0, 1, 2].into(), [0, 2, 3].into()],
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_node_decodes_what_it_encodes() {
        let mut node = quad();
        node.normals = vec![[0.0, 0.0, 1.0]; 4];
        node.colors = vec![[255, 0, 0]; 4];
        node.tex_coords = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        node.transform = Some(std::array::from_fn(|i| if i % 5 == 0 { 1.0 } else { 0.0 }));
        node.edge_groups = vec![MeshOutline {
            batch_id: -1,
            edges: vec![[0, 1], [1, 2]],
        }];

        let mut out = Vec::new();
        node.encode(&mut out);
        assert_eq!(parse_all(&out, parse_node).unwrap(), node);
    }

    #[test]
    fn test_triangle_layout() {
        let tri = MeshTriangle {
            batch_id: -3,
            faces: vec![[4, 5, 6].into()],
        };
        let mut out = Vec::new();
        tri.encode(&mut out);
        assert_eq!(out.len(), 4 + 4 + 12);
        assert_eq!(&out[..4], &(-3i32).to_le_bytes());
        assert_eq!(&out[4..8], &1u32.to_le_bytes());
        assert_eq!(&out[8..12], &4u32.to_le_bytes());
    }

    #[test]
    fn test_face_attribute_indices_are_not_persisted() {
        let mut node = quad();
        node.face_groups[0].faces[0].normal = Some([0, 0, 0]);
        let mut out = Vec::new();
        node.encode(&mut out);
        let decoded = parse_all(&out, parse_node).unwrap();
        assert_eq!(decoded.face_groups[0].faces[0].normal, None);
        assert_eq!(decoded.face_groups[0].faces[0].vertex, [0, 1, 2]);
    }

    #[test]
    fn test_bounding_box() {
        let mut node = quad();
        node.vertices.push([-2.0, 0.5, 3.0]);
        assert_eq!(
            node.bounding_box(),
            Some([-2.0, 0.0, 0.0, 1.0, 1.0, 3.0])
        );
        assert_eq!(MeshNode::default().bounding_box(), None);
    }

    #[test]
    fn test_validate_reports_bad_index() {
        let mut node = quad();
        assert!(node.validate().is_ok());

        node.face_groups[0].faces[1].vertex[2] = 4;
        assert_eq!(
            node.validate(),
            Err(GeometryError::FaceVertexOutOfRange {
                batch: 0,
                face: 1,
                index: 4,
                len: 4
            })
        );

        let mut node = quad();
        node.edge_groups.push(MeshOutline {
            batch_id: 0,
            edges: vec![[3, 9]],
        });
        assert!(matches!(
            node.validate(),
            Err(GeometryError::EdgeVertexOutOfRange { index: 9, .. })
        ));
    }

    #[test]
    fn test_recompute_normals_flat_quad() {
        let mut node = quad();
        node.recompute_normals().unwrap();
        assert_eq!(node.normals.len(), 4);
        for n in &node.normals {
            assert!((n[2].abs() - 1.0).abs() < 1e-6, "{n:?}");
            assert!(n[0].abs() < 1e-6 && n[1].abs() < 1e-6);
        }
        let face = node.face_groups[0].faces[0];
        assert_eq!(face.normal, Some(face.vertex));
    }

    #[test]
    fn test_recompute_normals_skips_degenerate_face() {
        let mut node = MeshNode {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]],
            face_groups: vec![MeshTriangle {
                batch_id: 0,
                faces: vec![[0, 1, 2].into()],
            }],
            ..Default::default()
        };
        node.recompute_normals().unwrap();
        assert_eq!(node.normals, vec![[0.0; 3]; 3]);
    }

    #[test]
    fn test_recompute_normals_renormalizes_per_face() {
        let mut node = MeshNode {
            vertices: vec![
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
            face_groups: vec![MeshTriangle {
                batch_id: 0,
                // two +Z faces, then one +X face, all touching vertex 0
                faces: vec![[0, 1, 2].into(), [0, 1, 2].into(), [0, 2, 3].into()],
            }],
            ..Default::default()
        };
        node.recompute_normals().unwrap();

        // a plain sum would give (1, 0, 2) / sqrt(5)
        let half = std::f32::consts::FRAC_1_SQRT_2;
        let n = node.normals[0];
        assert!((n[0] - half).abs() < 1e-6, "{n:?}");
        assert!(n[1].abs() < 1e-6, "{n:?}");
        assert!((n[2] - half).abs() < 1e-6, "{n:?}");
        assert_eq!(node.normals[1], [0.0, 0.0, 1.0]);
        assert_eq!(node.normals[3], [1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_resort_attributes_unwelds() {
        let mut node = quad();
        node.tex_coords = vec![[0.5, 0.5]];
        node.face_groups[0].faces[1].uv = Some([0, 0, 0]);
        node.resort_attributes().unwrap();

        assert_eq!(node.vertices.len(), 6);
        assert_eq!(node.normals.len(), 6);
        assert_eq!(node.tex_coords.len(), 6);
        assert_eq!(node.vertices[3], [0.0, 0.0, 0.0]);
        assert_eq!(node.vertices[5], [0.0, 1.0, 0.0]);
        assert_eq!(node.normals[0], [0.0, 0.0, 1.0]);
        assert_eq!(node.tex_coords[0], [0.0, 0.0]);
        assert_eq!(node.tex_coords[4], [0.5, 0.5]);
        assert_eq!(node.face_groups[0].faces[1].vertex, [3, 4, 5]);
        assert!(node.validate().is_ok());
    }
}
