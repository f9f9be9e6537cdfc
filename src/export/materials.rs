//! Project MST materials onto glTF PBR materials.

use std::collections::HashMap;

use gltf_json as json;
use json::validation::Checked::Valid;
use rootcause::Report;
use serde_json::json as json_value;
use tracing::debug;

use crate::export::gltf_export::{ExportError, GltfDocument};
use crate::export::texture::texture_to_png;
use crate::models::material::{BaseMaterial, Material, MeshMaterial};
use crate::models::texture::Texture;
use crate::recognized::Recognized;

pub const SPECULAR_GLOSSINESS_EXTENSION: &str = "KHR_materials_pbrSpecularGlossiness";

/// Textures already uploaded during one `build_gltf` call, keyed by MST texture id.
#[derive(Debug, Default)]
pub struct TextureCache {
    textures: HashMap<i32, json::Index<json::Texture>>,
}

impl TextureCache {
    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }
}

/// `(R/255, G/255, B/255, 1 - transparency)`.
pub fn base_color_factor(base: &BaseMaterial) -> [f32; 4] {
    let [r, g, b] = rgb_factor(base.color);
    [r, g, b, 1.0 - base.transparency]
}

fn rgb_factor(rgb: [u8; 3]) -> [f32; 3] {
    rgb.map(|c| c as f32 / 255.0)
}

/// Append one glTF material per slot, in slot order.
pub(crate) fn project_materials(
    doc: &mut GltfDocument,
    materials: &[MeshMaterial],
    textures: &mut TextureCache,
) -> Result<(), Report<ExportError>> {
    for slot in materials {
        let material = match slot {
            Recognized::Known(material) => project_material(doc, material, textures)?,
            Recognized::Unknown(tag) => {
                debug!("material tag {tag} has no projection, emitting a default material");
                default_material()
            }
        };
        doc.root_mut().push(material);
    }
    Ok(())
}

fn default_material() -> json::Material {
    json::Material {
        alpha_mode: Valid(json::material::AlphaMode::Mask),
        double_sided: true,
        pbr_metallic_roughness: json::material::PbrMetallicRoughness {
            metallic_factor: json::material::StrengthFactor(0.0),
            roughness_factor: json::material::StrengthFactor(1.0),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn project_material(
    doc: &mut GltfDocument,
    material: &Material,
    textures: &mut TextureCache,
) -> Result<json::Material, Report<ExportError>> {
    let mut gm = default_material();
    gm.pbr_metallic_roughness.base_color_factor =
        json::material::PbrBaseColorFactor(base_color_factor(material.base()));

    if let Some(pbr) = material.pbr_ref() {
        gm.pbr_metallic_roughness.metallic_factor = json::material::StrengthFactor(pbr.metallic);
        gm.pbr_metallic_roughness.roughness_factor =
            json::material::StrengthFactor(pbr.roughness);
    }
    if let Some(emissive) = material.emissive_color() {
        gm.emissive_factor = json::material::EmissiveFactor(rgb_factor(emissive));
    }

    let specular_glossiness = if let Some(lambert) = material.lambert_ref() {
        Some(json_value!({
            "diffuseFactor": diffuse_factor(lambert.diffuse),
        }))
    } else {
        material.phong_ref().map(|phong| {
            json_value!({
                "diffuseFactor": diffuse_factor(phong.lambert.diffuse),
                "specularFactor": rgb_factor(phong.specular),
                "glossinessFactor": phong.shininess.clamp(0.0, 1.0),
            })
        })
    };
    if let Some(block) = specular_glossiness {
        let mut others = serde_json::Map::new();
        others.insert(SPECULAR_GLOSSINESS_EXTENSION.to_string(), block);
        gm.extensions = Some(json::extensions::material::Material {
            others,
            ..Default::default()
        });
        doc.use_extension(SPECULAR_GLOSSINESS_EXTENSION);
    }

    if let Some(texture) = material.diffuse_texture() {
        let index = upload_texture(doc, texture, textures)?;
        gm.pbr_metallic_roughness.base_color_texture = Some(json::texture::Info {
            index,
            tex_coord: 0,
            extensions: Default::default(),
            extras: Default::default(),
        });
    }
    if let Some(texture) = material.normal_texture() {
        let index = upload_texture(doc, texture, textures)?;
        gm.normal_texture = Some(json::material::NormalTexture {
            index,
            scale: 1.0,
            tex_coord: 0,
            extensions: Default::default(),
            extras: Default::default(),
        });
    }

    Ok(gm)
}

fn diffuse_factor(rgb: [u8; 3]) -> [f32; 4] {
    let [r, g, b] = rgb_factor(rgb);
    [r, g, b, 1.0]
}

/// Embed a texture as PNG the first time its id is seen; later calls reuse
/// the same glTF texture.
fn upload_texture(
    doc: &mut GltfDocument,
    texture: &Texture,
    cache: &mut TextureCache,
) -> Result<json::Index<json::Texture>, Report<ExportError>> {
    if let Some(&index) = cache.textures.get(&texture.id) {
        return Ok(index);
    }

    let png_bytes = texture_to_png(texture).map_err(|e| {
        Report::new(ExportError::ImageCodec(format!(
            "texture {} ({}): {}",
            texture.id,
            texture.name,
            e.current_context()
        )))
    })?;

    let byte_offset = doc.append_padded(&png_bytes);
    let bv = doc.push_view(byte_offset, png_bytes.len(), None);

    let root = doc.root_mut();
    let image = root.push(json::Image {
        buffer_view: Some(bv),
        mime_type: Some(json::image::MimeType("image/png".to_string())),
        uri: None,
        name: (!texture.name.is_empty()).then(|| texture.name.clone()),
        extensions: Default::default(),
        extras: Default::default(),
    });

    let wrap = if texture.repeated {
        json::texture::WrappingMode::Repeat
    } else {
        json::texture::WrappingMode::ClampToEdge
    };
    let sampler = root.push(json::texture::Sampler {
        mag_filter: None,
        min_filter: None,
        wrap_s: Valid(wrap),
        wrap_t: Valid(wrap),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    let index = root.push(json::Texture {
        source: image,
        sampler: Some(sampler),
        name: None,
        extensions: Default::default(),
        extras: Default::default(),
    });

    cache.textures.insert(texture.id, index);
    Ok(index)
}
