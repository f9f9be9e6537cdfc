use bon::Builder;

/// GLB serialization and alignment padding
pub mod glb;
/// Buffer/accessor layout of MST nodes into a glTF document
pub mod gltf_export;
/// Placement of instanced prototypes
pub mod instancing;
/// MST material to glTF material projection
pub mod materials;
/// Texture pixel decoding, PNG encoding and image ingestion
pub mod texture;
/// Matrix decomposition
pub mod transform;

pub use gltf_export::{ExportError, GltfDocument, build_gltf, mst_to_gltf};

pub const DEFAULT_GENERATOR: &str = "mstkit";

/// GLB alignment used when none is configured.
pub const DEFAULT_ALIGNMENT: usize = 8;

/// How instanced prototypes are placed in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InstancingMode {
    /// One glTF node per transform, carrying the decomposed TRS.
    PerNode,
    /// One node per transform referencing `EXT_mesh_gpu_instancing` accessors.
    #[default]
    GpuInstancing,
}

/// Settings for [`build_gltf`] and [`mst_to_gltf`].
#[derive(Builder, Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExportOptions {
    /// Export edge groups as line strips instead of triangulating the node.
    /// Only applies to the root mesh, never to instanced prototypes.
    #[builder(default)]
    pub outline: bool,
    #[builder(default)]
    pub instancing: InstancingMode,
    /// GLB output is space-padded to a multiple of this many bytes.
    /// [`mst_to_gltf`] stores it on the document it returns.
    #[builder(default = DEFAULT_ALIGNMENT)]
    pub alignment: usize,
    /// `asset.generator`; defaults to `"mstkit"`.
    pub generator: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            outline: false,
            instancing: InstancingMode::default(),
            alignment: DEFAULT_ALIGNMENT,
            generator: None,
        }
    }
}

impl ExportOptions {
    pub fn generator_name(&self) -> &str {
        self.generator.as_deref().unwrap_or(DEFAULT_GENERATOR)
    }
}
