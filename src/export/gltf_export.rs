//! Lay MST meshes out as a glTF document backed by one binary buffer.
//!
//! Every node of a base mesh becomes one glTF mesh. Its bytes are appended
//! to the buffer as consecutive regions (face indices, positions, then
//! texcoords and normals when present), each with its own bufferView.
//! Each face batch becomes a primitive whose index accessor is a window into
//! the shared index view; the vertex attribute accessors are shared by all
//! of the node's primitives.

use std::collections::BTreeMap;

use gltf_json as json;
use json::validation::Checked::Valid;
use json::validation::USize64;
use rootcause::Report;
use thiserror::Error;
use tracing::{debug, warn};

use crate::data::write_utils::write_array;
use crate::export::instancing::place_instances;
use crate::export::materials::{TextureCache, project_materials};
use crate::export::{DEFAULT_ALIGNMENT, DEFAULT_GENERATOR, ExportOptions};
use crate::models::geometry::MeshNode;
use crate::models::mesh::{BaseMesh, Mesh};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("texture conversion failed: {0}")]
    ImageCodec(String),
    #[error("instance transform {index} is not invertible")]
    DegenerateTransform { index: usize },
    #[error("node {node} has invalid geometry: {reason}")]
    InvalidGeometry { node: usize, reason: String },
    #[error("glTF serialization error: {0}")]
    Serialize(String),
    #[error("I/O error: {0}")]
    Io(String),
}

/// A glTF document under construction: the JSON scene graph plus the bytes
/// of its single buffer.
#[derive(Debug, Clone)]
pub struct GltfDocument {
    root: json::Root,
    bin: Vec<u8>,
    /// GLB output is space-padded to a multiple of this.
    alignment: usize,
}

impl Default for GltfDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl GltfDocument {
    /// An empty document with one scene and one (empty) buffer.
    pub fn new() -> Self {
        Self::with_generator(DEFAULT_GENERATOR)
    }

    pub fn with_generator(generator: &str) -> Self {
        let mut root = json::Root::default();
        root.asset = json::Asset {
            version: "2.0".to_string(),
            generator: Some(generator.to_string()),
            ..Default::default()
        };

        let scene = root.push(json::Scene {
            nodes: Vec::new(),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });
        root.scene = Some(scene);

        root.push(json::Buffer {
            byte_length: USize64(0),
            uri: None,
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        });

        Self {
            root,
            bin: Vec::new(),
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    pub fn root(&self) -> &json::Root {
        &self.root
    }

    /// Contents of the document's buffer.
    pub fn binary(&self) -> &[u8] {
        &self.bin
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    pub fn set_alignment(&mut self, alignment: usize) {
        self.alignment = alignment;
    }

    pub fn into_parts(self) -> (json::Root, Vec<u8>) {
        (self.root, self.bin)
    }

    pub(crate) fn root_mut(&mut self) -> &mut json::Root {
        &mut self.root
    }

    /// Append raw bytes to the buffer, returning their offset.
    pub(crate) fn append(&mut self, bytes: &[u8]) -> usize {
        let offset = self.bin.len();
        self.bin.extend_from_slice(bytes);
        self.sync_buffer_length();
        offset
    }

    /// Append bytes and zero-pad the buffer to a multiple of 4.
    pub(crate) fn append_padded(&mut self, bytes: &[u8]) -> usize {
        let offset = self.append(bytes);
        pad_to_4(&mut self.bin);
        self.sync_buffer_length();
        offset
    }

    fn sync_buffer_length(&mut self) {
        if let Some(buffer) = self.root.buffers.first_mut() {
            buffer.byte_length = USize64::from(self.bin.len());
        }
    }

    pub(crate) fn push_view(
        &mut self,
        byte_offset: usize,
        byte_length: usize,
        target: Option<json::buffer::Target>,
    ) -> json::Index<json::buffer::View> {
        self.root.push(json::buffer::View {
            buffer: json::Index::new(0),
            byte_length: USize64::from(byte_length),
            byte_offset: Some(USize64::from(byte_offset)),
            byte_stride: None,
            target: target.map(Valid),
            name: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    pub(crate) fn push_accessor(&mut self, spec: AccessorSpec) -> json::Index<json::Accessor> {
        self.root.push(json::Accessor {
            buffer_view: Some(spec.view),
            byte_offset: Some(USize64::from(spec.byte_offset)),
            count: USize64::from(spec.count),
            component_type: Valid(json::accessor::GenericComponentType(spec.component)),
            type_: Valid(spec.type_),
            min: spec.min,
            max: spec.max,
            name: None,
            normalized: false,
            sparse: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
    }

    /// Add a node and list it in the default scene.
    pub(crate) fn push_scene_node(&mut self, node: json::Node) -> json::Index<json::Node> {
        let index = self.root.push(node);
        if let Some(scene) = self.root.scenes.first_mut() {
            scene.nodes.push(index);
        }
        index
    }

    /// Add `name` to `extensionsUsed` unless it is already listed.
    pub(crate) fn use_extension(&mut self, name: &str) {
        if !self.root.extensions_used.iter().any(|e| e == name) {
            self.root.extensions_used.push(name.to_string());
        }
    }
}

pub(crate) struct AccessorSpec {
    pub view: json::Index<json::buffer::View>,
    pub byte_offset: usize,
    pub count: usize,
    pub component: json::accessor::ComponentType,
    pub type_: json::accessor::Type,
    pub min: Option<json::Value>,
    pub max: Option<json::Value>,
}

impl AccessorSpec {
    pub fn floats(
        view: json::Index<json::buffer::View>,
        byte_offset: usize,
        count: usize,
        type_: json::accessor::Type,
    ) -> Self {
        Self {
            view,
            byte_offset,
            count,
            component: json::accessor::ComponentType::F32,
            type_,
            min: None,
            max: None,
        }
    }

    fn indices(view: json::Index<json::buffer::View>, byte_offset: usize, count: usize) -> Self {
        Self {
            view,
            byte_offset,
            count,
            component: json::accessor::ComponentType::U32,
            type_: json::accessor::Type::Scalar,
            min: None,
            max: None,
        }
    }
}

/// Per-base-mesh state threaded through node building.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BuildContext {
    /// Materials already in the document when this base mesh started.
    pub material_offset: usize,
    /// Materials this base mesh will add.
    pub material_count: usize,
}

impl BuildContext {
    fn material_for(&self, batch_id: i32) -> Option<json::Index<json::Material>> {
        let local = batch_id.max(0) as usize;
        if local >= self.material_count {
            warn!(
                "batch id {batch_id} has no material ({} defined), using the glTF default",
                self.material_count
            );
            return None;
        }
        Some(json::Index::new((self.material_offset + local) as u32))
    }
}

/// Convert several MST meshes into one document.
pub fn mst_to_gltf(
    meshes: &[Mesh],
    options: &ExportOptions,
) -> Result<GltfDocument, Report<ExportError>> {
    let mut doc = GltfDocument::with_generator(options.generator_name());
    doc.set_alignment(options.alignment);
    for mesh in meshes {
        build_gltf(&mut doc, mesh, options)?;
    }
    Ok(doc)
}

/// Append one MST mesh (root geometry and all instance groups) to `doc`.
///
/// On error the document is left partially built and should be discarded.
pub fn build_gltf(
    doc: &mut GltfDocument,
    mesh: &Mesh,
    options: &ExportOptions,
) -> Result<(), Report<ExportError>> {
    let mut textures = TextureCache::default();

    build_base_mesh(doc, &mesh.base, None, options, &mut textures)?;
    for (i, instance) in mesh.instances.iter().enumerate() {
        if instance.transforms.is_empty() {
            warn!("instance group {i} has no transforms, skipping");
            continue;
        }
        build_base_mesh(
            doc,
            &instance.mesh,
            Some(&instance.transforms),
            options,
            &mut textures,
        )?;
    }

    debug!(
        "glTF now has {} meshes, {} nodes, {} materials, {} buffer bytes",
        doc.root.meshes.len(),
        doc.root.nodes.len(),
        doc.root.materials.len(),
        doc.bin.len()
    );
    Ok(())
}

fn build_base_mesh(
    doc: &mut GltfDocument,
    base: &BaseMesh,
    transforms: Option<&[[f64; 16]]>,
    options: &ExportOptions,
    textures: &mut TextureCache,
) -> Result<(), Report<ExportError>> {
    let ctx = BuildContext {
        material_offset: doc.root.materials.len(),
        material_count: base.materials.len(),
    };
    // instanced prototypes are never exported as outlines
    let outline = options.outline && transforms.is_none();

    for (index, node) in base.nodes.iter().enumerate() {
        let Some(mesh) = build_node(doc, &ctx, node, index, outline)? else {
            continue;
        };
        match transforms {
            None => {
                doc.push_scene_node(json::Node {
                    mesh: Some(mesh),
                    ..Default::default()
                });
            }
            Some(transforms) => place_instances(doc, mesh, transforms, options.instancing)?,
        }
    }

    project_materials(doc, &base.materials, textures)
}

fn build_node(
    doc: &mut GltfDocument,
    ctx: &BuildContext,
    node: &MeshNode,
    index: usize,
    outline: bool,
) -> Result<Option<json::Index<json::Mesh>>, Report<ExportError>> {
    if node.vertices.is_empty() {
        warn!("node {index} has no vertices, skipping");
        return Ok(None);
    }
    node.validate().map_err(|e| {
        Report::new(ExportError::InvalidGeometry {
            node: index,
            reason: e.to_string(),
        })
    })?;

    let has_edges = node.edge_groups.iter().any(|g| !g.edges.is_empty());
    if outline && has_edges {
        return Ok(Some(build_outline_mesh(doc, ctx, node)));
    }

    if node.face_count() == 0 {
        warn!("node {index} has no faces, skipping");
        return Ok(None);
    }
    for (name, len) in [("normals", node.normals.len()), ("texcoords", node.tex_coords.len())] {
        if len != 0 && len != node.vertices.len() {
            return Err(Report::new(ExportError::InvalidGeometry {
                node: index,
                reason: format!("{len} {name} for {} vertices", node.vertices.len()),
            }));
        }
    }
    Ok(Some(build_triangle_mesh(doc, ctx, node)))
}

fn build_triangle_mesh(
    doc: &mut GltfDocument,
    ctx: &BuildContext,
    node: &MeshNode,
) -> json::Index<json::Mesh> {
    let mut index_bytes = Vec::with_capacity(node.face_count() * 12);
    for group in &node.face_groups {
        for face in &group.faces {
            write_array(&mut index_bytes, &face.vertex);
        }
    }
    let offset = doc.append(&index_bytes);
    let index_view = doc.push_view(
        offset,
        index_bytes.len(),
        Some(json::buffer::Target::ElementArrayBuffer),
    );
    let position_view = append_attribute(doc, &node.vertices);
    let tex_coord_view = (!node.tex_coords.is_empty()).then(|| append_attribute(doc, &node.tex_coords));
    let normal_view = (!node.normals.is_empty()).then(|| append_attribute(doc, &node.normals));

    let mut batches = Vec::with_capacity(node.face_groups.len());
    let mut faces_before = 0;
    for group in &node.face_groups {
        if group.faces.is_empty() {
            warn!("skipping empty face batch {}", group.batch_id);
            continue;
        }
        let accessor = doc.push_accessor(AccessorSpec::indices(
            index_view,
            faces_before * 12,
            group.faces.len() * 3,
        ));
        faces_before += group.faces.len();
        batches.push((accessor, group.batch_id));
    }

    let mut attributes = BTreeMap::new();
    attributes.insert(
        Valid(json::mesh::Semantic::Positions),
        push_positions(doc, position_view, &node.vertices),
    );
    if let Some(view) = tex_coord_view {
        let accessor = doc.push_accessor(AccessorSpec::floats(
            view,
            0,
            node.tex_coords.len(),
            json::accessor::Type::Vec2,
        ));
        attributes.insert(Valid(json::mesh::Semantic::TexCoords(0)), accessor);
    }
    if let Some(view) = normal_view {
        let accessor = doc.push_accessor(AccessorSpec::floats(
            view,
            0,
            node.normals.len(),
            json::accessor::Type::Vec3,
        ));
        attributes.insert(Valid(json::mesh::Semantic::Normals), accessor);
    }

    push_mesh(doc, ctx, batches, attributes, json::mesh::Mode::Triangles)
}

fn build_outline_mesh(
    doc: &mut GltfDocument,
    ctx: &BuildContext,
    node: &MeshNode,
) -> json::Index<json::Mesh> {
    let mut index_bytes = Vec::new();
    for group in &node.edge_groups {
        for edge in &group.edges {
            write_array(&mut index_bytes, edge);
        }
    }
    let offset = doc.append(&index_bytes);
    let index_view = doc.push_view(
        offset,
        index_bytes.len(),
        Some(json::buffer::Target::ElementArrayBuffer),
    );
    let position_view = append_attribute(doc, &node.vertices);

    let mut batches = Vec::with_capacity(node.edge_groups.len());
    let mut edges_before = 0;
    for group in &node.edge_groups {
        if group.edges.is_empty() {
            warn!("skipping empty outline batch {}", group.batch_id);
            continue;
        }
        let accessor = doc.push_accessor(AccessorSpec::indices(
            index_view,
            edges_before * 8,
            group.edges.len() * 2,
        ));
        edges_before += group.edges.len();
        batches.push((accessor, group.batch_id));
    }

    let mut attributes = BTreeMap::new();
    attributes.insert(
        Valid(json::mesh::Semantic::Positions),
        push_positions(doc, position_view, &node.vertices),
    );

    push_mesh(doc, ctx, batches, attributes, json::mesh::Mode::LineStrip)
}

fn push_mesh(
    doc: &mut GltfDocument,
    ctx: &BuildContext,
    batches: Vec<(json::Index<json::Accessor>, i32)>,
    attributes: BTreeMap<json::validation::Checked<json::mesh::Semantic>, json::Index<json::Accessor>>,
    mode: json::mesh::Mode,
) -> json::Index<json::Mesh> {
    let primitives = batches
        .into_iter()
        .map(|(indices, batch_id)| json::mesh::Primitive {
            attributes: attributes.clone(),
            indices: Some(indices),
            material: ctx.material_for(batch_id),
            mode: Valid(mode),
            targets: None,
            extensions: Default::default(),
            extras: Default::default(),
        })
        .collect();

    doc.root.push(json::Mesh {
        primitives,
        weights: None,
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    })
}

fn append_attribute<const N: usize>(
    doc: &mut GltfDocument,
    values: &[[f32; N]],
) -> json::Index<json::buffer::View> {
    let mut bytes = Vec::with_capacity(values.len() * N * 4);
    for v in values {
        write_array(&mut bytes, v);
    }
    let offset = doc.append(&bytes);
    doc.push_view(offset, bytes.len(), Some(json::buffer::Target::ArrayBuffer))
}

fn push_positions(
    doc: &mut GltfDocument,
    view: json::Index<json::buffer::View>,
    vertices: &[[f32; 3]],
) -> json::Index<json::Accessor> {
    let (min, max) = bounding_coords(vertices);
    doc.push_accessor(AccessorSpec {
        min: Some(json::Value::from(min.to_vec())),
        max: Some(json::Value::from(max.to_vec())),
        ..AccessorSpec::floats(view, 0, vertices.len(), json::accessor::Type::Vec3)
    })
}

fn pad_to_4(data: &mut Vec<u8>) {
    while data.len() % 4 != 0 {
        data.push(0);
    }
}

fn bounding_coords(points: &[[f32; 3]]) -> ([f32; 3], [f32; 3]) {
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in points {
        for i in 0..3 {
            min[i] = f32::min(min[i], p[i]);
            max[i] = f32::max(max[i], p[i]);
        }
    }
    (min, max)
}
