//! The MST mesh container.
//!
//! Layout:
//!
//! ```text
//! "fwtm" | version: u32 | BaseMesh | instance count: u32 | InstanceMesh* | [code: u32 (V4)]
//! ```

use std::fmt;
use std::fs::File;
use std::path::Path;

use memmap2::MmapOptions;
use rootcause::Report;
use tracing::{debug, warn};
use winnow::Parser;
use winnow::binary::{le_f64, le_u32, le_u64};
use winnow::token::take;

use crate::data::parser_utils::{WResult, length_prefixed, parse_all, parse_mat4};
use crate::data::write_utils::{write_array, write_count, write_scalar};
use crate::error::{MstError, MstResult};
use crate::models::geometry::{MeshNode, parse_node};
use crate::models::material::{MeshMaterial, encode_mesh_material, parse_material};

pub const MESH_SIGNATURE: &[u8; 4] = b"fwtm";

/// Conventional file extension for MST files.
pub const MST_EXTENSION: &str = "mst";

/// Format version of an MST stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MstVersion(pub u32);

impl MstVersion {
    pub const V1: MstVersion = MstVersion(1);
    pub const V2: MstVersion = MstVersion(2);
    pub const V3: MstVersion = MstVersion(3);
    pub const V4: MstVersion = MstVersion(4);

    pub fn is_known(self) -> bool {
        (1..=4).contains(&self.0)
    }

    /// V4 adds a `u32` code after every base mesh and at the end of the stream.
    pub fn has_code(self) -> bool {
        self == Self::V4
    }

    /// Instance feature ids are `u64` from V3 on, `u32` before.
    pub fn wide_feature_ids(self) -> bool {
        !matches!(self, Self::V1 | Self::V2)
    }

    /// V1 PBR materials carry one extra byte after the emissive color.
    pub fn pbr_padding(self) -> bool {
        self == Self::V1
    }
}

impl Default for MstVersion {
    fn default() -> Self {
        Self::V4
    }
}

impl fmt::Display for MstVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseMesh {
    pub materials: Vec<MeshMaterial>,
    pub nodes: Vec<MeshNode>,
    /// Opaque; only stored in V4 streams.
    pub code: u32,
}

impl BaseMesh {
    /// `[min_x, min_y, min_z, max_x, max_y, max_z]` over all nodes.
    pub fn bounding_box(&self) -> Option<[f64; 6]> {
        self.nodes
            .iter()
            .filter_map(MeshNode::bounding_box)
            .reduce(|mut acc, b| {
                for axis in 0..3 {
                    acc[axis] = acc[axis].min(b[axis]);
                    acc[axis + 3] = acc[axis + 3].max(b[axis + 3]);
                }
                acc
            })
    }

    pub fn encode(&self, out: &mut Vec<u8>, version: MstVersion) {
        write_count(out, self.materials.len());
        for material in &self.materials {
            encode_mesh_material(material, out, version);
        }
        write_count(out, self.nodes.len());
        for node in &self.nodes {
            node.encode(out);
        }
        if version.has_code() {
            write_scalar(out, self.code);
        }
    }
}

/// A prototype mesh placed once per transform.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstanceMesh {
    /// Column-major placement matrices.
    pub transforms: Vec<[f64; 16]>,
    /// Feature ids, parallel to `transforms`.
    pub features: Vec<u64>,
    pub bbox: [f64; 6],
    pub mesh: BaseMesh,
    pub hash: u64,
}

impl InstanceMesh {
    pub fn encode(&self, out: &mut Vec<u8>, version: MstVersion) {
        write_count(out, self.transforms.len());
        for m in &self.transforms {
            write_array(out, m);
        }

        write_count(out, self.features.len());
        if version.wide_feature_ids() {
            for &id in &self.features {
                write_scalar(out, id);
            }
        } else {
            for &id in &self.features {
                if id > u32::MAX as u64 {
                    warn!("feature id {id} does not fit in a {version} stream, truncating");
                }
                write_scalar(out, id as u32);
            }
        }

        write_array(out, &self.bbox);
        self.mesh.encode(out, version);
        write_scalar(out, self.hash);
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mesh {
    pub version: MstVersion,
    pub base: BaseMesh,
    pub instances: Vec<InstanceMesh>,
}

impl Mesh {
    /// An empty V4 mesh.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.base.nodes.len()
    }

    pub fn material_count(&self) -> usize {
        self.base.materials.len()
    }

    pub fn code(&self) -> u32 {
        self.base.code
    }

    pub fn bounding_box(&self) -> Option<[f64; 6]> {
        self.base.bounding_box()
    }

    /// Decode a complete MST stream.
    pub fn parse(data: &[u8]) -> MstResult<Mesh> {
        let mesh = parse_all(data, parse_mesh)?;
        debug!(
            "decoded MST {} with {} materials, {} nodes, {} instance groups",
            mesh.version,
            mesh.material_count(),
            mesh.node_count(),
            mesh.instances.len()
        );
        Ok(mesh)
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(MESH_SIGNATURE);
        write_scalar(out, self.version.0);
        self.base.encode(out, self.version);
        write_count(out, self.instances.len());
        for instance in &self.instances {
            instance.encode(out, self.version);
        }
        if self.version.has_code() {
            write_scalar(out, self.base.code);
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    /// Read and decode an MST file.
    pub fn read_from(path: impl AsRef<Path>) -> MstResult<Mesh> {
        let file = File::open(path.as_ref()).map_err(|e| Report::new(MstError::from(e)))?;
        let len = file
            .metadata()
            .map_err(|e| Report::new(MstError::from(e)))?
            .len();
        if len == 0 {
            return Mesh::parse(&[]);
        }

        let mmap = unsafe { MmapOptions::new().map(&file) }
            .map_err(|e| Report::new(MstError::from(e)))?;
        Mesh::parse(&mmap[..])
    }

    /// Encode and write to `path`, creating parent directories as needed.
    pub fn write_to(&self, path: impl AsRef<Path>) -> MstResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Report::new(MstError::from(e)))?;
        }
        std::fs::write(path, self.to_bytes()).map_err(|e| Report::new(MstError::from(e)))
    }
}

fn parse_base_mesh(input: &mut &[u8], version: MstVersion) -> WResult<BaseMesh> {
    let material_count = le_u32.parse_next(input)? as usize;
    let mut materials = Vec::with_capacity(material_count.min(1024));
    for _ in 0..material_count {
        materials.push(parse_material(input, version)?);
    }
    let nodes = length_prefixed(parse_node).parse_next(input)?;
    let code = if version.has_code() {
        le_u32.parse_next(input)?
    } else {
        0
    };
    Ok(BaseMesh {
        materials,
        nodes,
        code,
    })
}

fn parse_instance(input: &mut &[u8], version: MstVersion) -> WResult<InstanceMesh> {
    let transforms = length_prefixed(parse_mat4).parse_next(input)?;
    let features = if version.wide_feature_ids() {
        length_prefixed(le_u64).parse_next(input)?
    } else {
        length_prefixed(le_u32.map(u64::from)).parse_next(input)?
    };

    let mut bbox = [0.0f64; 6];
    for slot in bbox.iter_mut() {
        *slot = le_f64.parse_next(input)?;
    }
    let mesh = parse_base_mesh(input, version)?;
    let hash = le_u64.parse_next(input)?;

    Ok(InstanceMesh {
        transforms,
        features,
        bbox,
        mesh,
        hash,
    })
}

pub fn parse_mesh(input: &mut &[u8]) -> WResult<Mesh> {
    let _signature = take(4usize).parse_next(input)?;
    let version = MstVersion(le_u32.parse_next(input)?);
    if !version.is_known() {
        warn!("unknown MST version {}, decoding with the newest layout minus the code field", version.0);
    }

    let mut base = parse_base_mesh(input, version)?;
    let instance_count = le_u32.parse_next(input)? as usize;
    let mut instances = Vec::with_capacity(instance_count.min(1024));
    for _ in 0..instance_count {
        instances.push(parse_instance(input, version)?);
    }

    if version.has_code() {
        let code = le_u32.parse_next(input)?;
        if code != base.code {
            warn!("trailing mesh code {code} differs from base mesh code {}", base.code);
        }
        base.code = code;
    }

    Ok(Mesh {
        version,
        base,
        instances,
    })
}
