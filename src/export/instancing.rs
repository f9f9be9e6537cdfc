//! Placement of instanced prototype meshes.

use gltf_json as json;
use rootcause::Report;
use serde_json::json as json_value;

use crate::export::InstancingMode;
use crate::export::gltf_export::{AccessorSpec, ExportError, GltfDocument};
use crate::export::transform::{Trs, decompose};

pub const GPU_INSTANCING_EXTENSION: &str = "EXT_mesh_gpu_instancing";

/// Bytes per instance record: translation (12), scale (12), rotation (16).
const INSTANCE_STRIDE: usize = 40;

/// Reference `mesh` once per transform.
pub(crate) fn place_instances(
    doc: &mut GltfDocument,
    mesh: json::Index<json::Mesh>,
    transforms: &[[f64; 16]],
    mode: InstancingMode,
) -> Result<(), Report<ExportError>> {
    let placements = transforms
        .iter()
        .enumerate()
        .map(|(index, m)| {
            decompose(m).ok_or_else(|| Report::new(ExportError::DegenerateTransform { index }))
        })
        .collect::<Result<Vec<Trs>, _>>()?;

    match mode {
        InstancingMode::PerNode => {
            for trs in &placements {
                doc.push_scene_node(json::Node {
                    mesh: Some(mesh),
                    translation: Some(trs.translation),
                    rotation: Some(json::scene::UnitQuaternion(trs.rotation)),
                    scale: Some(trs.scale),
                    ..Default::default()
                });
            }
        }
        InstancingMode::GpuInstancing => place_gpu_instances(doc, mesh, &placements),
    }
    Ok(())
}

fn place_gpu_instances(doc: &mut GltfDocument, mesh: json::Index<json::Mesh>, placements: &[Trs]) {
    let mut bytes = Vec::with_capacity(placements.len() * INSTANCE_STRIDE);
    for trs in placements {
        bytes.extend_from_slice(&trs.instance_bytes());
    }
    let offset = doc.append(&bytes);
    let view = doc.push_view(offset, bytes.len(), None);

    for i in 0..placements.len() {
        let base = i * INSTANCE_STRIDE;
        let translation =
            doc.push_accessor(AccessorSpec::floats(view, base, 1, json::accessor::Type::Vec3));
        let scale =
            doc.push_accessor(AccessorSpec::floats(view, base + 12, 1, json::accessor::Type::Vec3));
        let rotation =
            doc.push_accessor(AccessorSpec::floats(view, base + 24, 1, json::accessor::Type::Vec4));

        let mut others = serde_json::Map::new();
        others.insert(
            GPU_INSTANCING_EXTENSION.to_string(),
            json_value!({
                "attributes": {
                    "TRANSLATION": translation.value(),
                    "SCALE": scale.value(),
                    "ROTATION": rotation.value(),
                }
            }),
        );
        doc.push_scene_node(json::Node {
            mesh: Some(mesh),
            extensions: Some(json::extensions::scene::Node {
                others,
                ..Default::default()
            }),
            ..Default::default()
        });
    }
    doc.use_extension(GPU_INSTANCING_EXTENSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translated(x: f64) -> [f64; 16] {
        let mut m: [f64; 16] = std::array::from_fn(|i| if i % 5 == 0 { 1.0 } else { 0.0 });
        m[12] = x;
        m
    }

    fn placed(mode: InstancingMode, transforms: &[[f64; 16]]) -> GltfDocument {
        let mut doc = GltfDocument::new();
        place_instances(&mut doc, json::Index::new(0), transforms, mode).unwrap();
        doc
    }

    #[test]
    fn test_per_node_placement() {
        let doc = placed(InstancingMode::PerNode, &[translated(1.0), translated(-2.0)]);
        let root = doc.root();
        assert_eq!(root.nodes.len(), 2);
        assert_eq!(root.scenes[0].nodes.len(), 2);
        assert_eq!(root.nodes[1].translation, Some([-2.0, 0.0, 0.0]));
        assert_eq!(root.nodes[0].scale, Some([1.0, 1.0, 1.0]));
        assert_eq!(
            root.nodes[0].rotation.as_ref().map(|q| q.0),
            Some([0.0, 0.0, 0.0, 1.0])
        );
        assert!(root.accessors.is_empty());
        assert!(root.extensions_used.is_empty());
        assert!(doc.binary().is_empty());
    }

    #[test]
    fn test_gpu_instancing_layout() {
        let doc = placed(
            InstancingMode::GpuInstancing,
            &[translated(1.0), translated(2.0), translated(3.0)],
        );
        let root = doc.root();
        assert_eq!(root.nodes.len(), 3);
        assert_eq!(root.accessors.len(), 9);
        assert_eq!(root.buffer_views.len(), 1);
        assert_eq!(doc.binary().len(), 3 * INSTANCE_STRIDE);
        assert_eq!(root.extensions_used, vec![GPU_INSTANCING_EXTENSION.to_string()]);

        let offsets: Vec<u64> = root.accessors[3..6]
            .iter()
            .map(|a| a.byte_offset.unwrap().0)
            .collect();
        assert_eq!(offsets, vec![40, 52, 64]);
        assert!(matches!(
            root.accessors[5].type_,
            json::validation::Checked::Valid(json::accessor::Type::Vec4)
        ));

        let ext = &root.nodes[1].extensions.as_ref().unwrap().others[GPU_INSTANCING_EXTENSION];
        assert_eq!(ext["attributes"]["TRANSLATION"], json_value!(3));
        assert_eq!(ext["attributes"]["SCALE"], json_value!(4));
        assert_eq!(ext["attributes"]["ROTATION"], json_value!(5));
        assert_eq!(&doc.binary()[80..84], &3.0f32.to_le_bytes());
    }

    #[test]
    fn test_degenerate_transform_reports_index() {
        let mut doc = GltfDocument::new();
        let err = place_instances(
            &mut doc,
            json::Index::new(0),
            &[translated(0.0), [0.0; 16]],
            InstancingMode::GpuInstancing,
        )
        .unwrap_err();
        assert!(matches!(
            err.current_context(),
            ExportError::DegenerateTransform { index: 1 }
        ));
        assert!(doc.root().nodes.is_empty());
    }
}
