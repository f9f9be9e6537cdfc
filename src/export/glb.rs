//! GLB and split `.gltf` + `.bin` output.

use std::borrow::Cow;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use gltf_json as json;
use rootcause::Report;
use tracing::debug;

use crate::export::gltf_export::{ExportError, GltfDocument};

/// Number of bytes needed to round `len` up to a multiple of `alignment`.
/// An alignment of 0 behaves like 1.
pub fn padding(len: usize, alignment: usize) -> usize {
    let alignment = alignment.max(1);
    (alignment - len % alignment) % alignment
}

impl GltfDocument {
    /// Root to serialize: buffer 0 gets `uri`, or is dropped when the binary
    /// payload is empty.
    fn output_root(&self, uri: Option<&str>) -> json::Root {
        let mut root = self.root().clone();
        if self.binary().is_empty() {
            root.buffers.clear();
        } else if let Some(buffer) = root.buffers.first_mut() {
            buffer.uri = uri.map(str::to_string);
        }
        root
    }

    /// Serialize as GLB, padded to the document's
    /// [`alignment`](Self::alignment).
    pub fn to_glb(&self) -> Result<Vec<u8>, Report<ExportError>> {
        self.to_glb_aligned(self.alignment())
    }

    /// Serialize as GLB, then pad with ASCII spaces to a multiple of `alignment`.
    pub fn to_glb_aligned(&self, alignment: usize) -> Result<Vec<u8>, Report<ExportError>> {
        let json_string = json::serialize::to_string(&self.output_root(None))
            .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;

        let glb = gltf::binary::Glb {
            header: gltf::binary::Header {
                magic: *b"glTF",
                version: 2,
                length: 0, // to_writer computes this
            },
            json: Cow::Owned(json_string.into_bytes()),
            bin: if self.binary().is_empty() {
                None
            } else {
                Some(Cow::Borrowed(self.binary()))
            },
        };

        let mut bytes = glb
            .to_vec()
            .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;
        let pad = padding(bytes.len(), alignment);
        bytes.resize(bytes.len() + pad, b' ');
        debug!("GLB is {} bytes ({pad} bytes of alignment padding)", bytes.len());
        Ok(bytes)
    }

    pub fn write_glb<W: Write>(&self, writer: &mut W) -> Result<(), Report<ExportError>> {
        writer
            .write_all(&self.to_glb()?)
            .map_err(|e| Report::new(ExportError::Io(e.to_string())))
    }

    /// Write a padded GLB file, creating parent directories.
    pub fn save_glb(&self, path: impl AsRef<Path>) -> Result<(), Report<ExportError>> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Report::new(ExportError::Io(e.to_string())))?;
        }
        let file = File::create(path).map_err(|e| Report::new(ExportError::Io(e.to_string())))?;
        let mut writer = BufWriter::new(file);
        self.write_glb(&mut writer)?;
        writer
            .flush()
            .map_err(|e| Report::new(ExportError::Io(e.to_string())))
    }

    /// JSON text with the buffer pointing at `uri`, plus the bytes that
    /// belong in that file.
    pub fn to_gltf(&self, uri: &str) -> Result<(String, Vec<u8>), Report<ExportError>> {
        let text = json::serialize::to_string_pretty(&self.output_root(Some(uri)))
            .map_err(|e| Report::new(ExportError::Serialize(e.to_string())))?;
        Ok((text, self.binary().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{ExportOptions, mst_to_gltf};
    use crate::models::geometry::{Face, MeshNode, MeshTriangle};
    use crate::models::mesh::{BaseMesh, Mesh};

    fn triangle_mesh() -> Mesh {
        Mesh {
            base: BaseMesh {
                nodes: vec![MeshNode {
                    vertices: vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
                    face_groups: vec![MeshTriangle {
                        batch_id: 0,
                        faces: vec![Face::new([0, 1, 2])],
                    }],
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn triangle_doc() -> GltfDocument {
        mst_to_gltf(&[triangle_mesh()], &ExportOptions::default()).unwrap()
    }

    fn glb_with_alignment(doc: &GltfDocument, alignment: usize) -> Vec<u8> {
        doc.to_glb_aligned(alignment).unwrap()
    }

    #[test]
    fn test_padding_values() {
        assert_eq!(padding(0, 8), 0);
        assert_eq!(padding(1, 8), 7);
        assert_eq!(padding(8, 8), 0);
        assert_eq!(padding(13, 4), 3);
        assert_eq!(padding(13, 0), 0);
        assert_eq!(padding(13, 1), 0);
    }

    #[test]
    fn test_padding_law() {
        let doc = triangle_doc();
        let unpadded = glb_with_alignment(&doc, 1);
        for alignment in 1..=16 {
            let glb = glb_with_alignment(&doc, alignment);
            assert_eq!(glb.len() % alignment, 0, "alignment {alignment}");
            assert!(glb.len() < unpadded.len() + alignment);
            assert_eq!(&glb[..unpadded.len()], &unpadded[..]);
            assert!(glb[unpadded.len()..].iter().all(|&b| b == b' '));
        }
        assert_eq!(glb_with_alignment(&doc, 0), unpadded);
    }

    #[test]
    fn test_options_alignment_reaches_glb() {
        let unpadded = glb_with_alignment(&triangle_doc(), 1);
        // an alignment the bare GLB does not already satisfy
        let alignment = (3..).find(|a| unpadded.len() % a != 0).unwrap();

        let options = ExportOptions::builder().alignment(alignment).build();
        let doc = mst_to_gltf(&[triangle_mesh()], &options).unwrap();
        assert_eq!(doc.alignment(), alignment);
        let glb = doc.to_glb().unwrap();
        assert_eq!(glb.len(), unpadded.len() + padding(unpadded.len(), alignment));
        assert!(glb.len() > unpadded.len());

        let doc = mst_to_gltf(&[triangle_mesh()], &ExportOptions::builder().alignment(1).build())
            .unwrap();
        assert_eq!(doc.to_glb().unwrap(), unpadded);
    }

    #[test]
    fn test_glb_header_and_chunks() {
        let doc = triangle_doc();
        let glb = glb_with_alignment(&doc, 1);
        assert_eq!(&glb[0..4], b"glTF");
        assert_eq!(u32::from_le_bytes(glb[4..8].try_into().unwrap()), 2);
        assert_eq!(
            u32::from_le_bytes(glb[8..12].try_into().unwrap()) as usize,
            glb.len()
        );

        let parsed = gltf::Gltf::from_slice(&glb).unwrap();
        assert_eq!(parsed.blob.as_deref().map(|b| &b[..doc.binary().len()]), Some(doc.binary()));
        assert_eq!(parsed.meshes().count(), 1);
    }

    #[test]
    fn test_empty_document_drops_buffer() {
        let doc = GltfDocument::new();
        let glb = doc.to_glb().unwrap();
        assert_eq!(glb.len() % 8, 0);

        let parsed = gltf::Gltf::from_slice(&glb).unwrap();
        assert!(parsed.blob.is_none());
        assert_eq!(parsed.buffers().count(), 0);
        assert_eq!(parsed.scenes().count(), 1);
    }

    #[test]
    fn test_split_gltf_output() {
        let doc = triangle_doc();
        let (text, bin) = doc.to_gltf("model.bin").unwrap();
        assert_eq!(bin, doc.binary());

        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["buffers"][0]["uri"], "model.bin");
        assert_eq!(value["buffers"][0]["byteLength"], bin.len());
        assert_eq!(value["asset"]["generator"], "mstkit");
        // the in-memory document is untouched
        assert!(doc.root().buffers[0].uri.is_none());
    }

    #[test]
    fn test_save_glb_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("triangle.glb");
        let doc = triangle_doc();
        doc.save_glb(&path).unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(written, doc.to_glb().unwrap());
    }
}
