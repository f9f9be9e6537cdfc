//! MST materials.
//!
//! Every material is written as a `u32` tag followed by its fields. Richer
//! variants embed the simpler ones and encode them first, so a Phong material
//! starts with the full Lambert record, which starts with the texture record,
//! which starts with the base color.

use tracing::warn;
use variantly::Variantly;
use winnow::Parser;
use winnow::binary::{le_f32, le_f64, le_u8, le_u16, le_u32};

use crate::data::parser_utils::{WResult, parse_rgb, parse_vec3};
use crate::data::write_utils::{write_array, write_scalar};
use crate::models::mesh::MstVersion;
use crate::models::texture::{Texture, parse_texture};
use crate::recognized::{Recognized, WireEnum};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MaterialTag {
    Color,
    Texture,
    Pbr,
    Lambert,
    Phong,
}

impl WireEnum for MaterialTag {
    type Raw = u32;

    fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => MaterialTag::Color,
            1 => MaterialTag::Texture,
            2 => MaterialTag::Pbr,
            3 => MaterialTag::Lambert,
            4 => MaterialTag::Phong,
            _ => return None,
        })
    }

    fn to_raw(self) -> u32 {
        self as u32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BaseMaterial {
    pub color: [u8; 3],
    /// 0.0 is opaque.
    pub transparency: f32,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TextureMaterial {
    pub base: BaseMaterial,
    pub texture: Option<Texture>,
    pub normal: Option<Texture>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClearCoat {
    pub factor: f32,
    pub roughness: f32,
    pub normal: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Anisotropy {
    pub factor: f32,
    pub direction: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PbrMaterial {
    pub textured: TextureMaterial,
    pub emissive: [u8; 3],
    pub metallic: f32,
    pub roughness: f32,
    pub reflectance: f32,
    pub ambient_occlusion: f32,
    pub clear_coat: ClearCoat,
    pub anisotropy: Anisotropy,
    pub thickness: f32,
    pub sub_surface_power: f32,
    pub sheen_color: [u8; 3],
    pub sub_surface_color: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LambertMaterial {
    pub textured: TextureMaterial,
    pub ambient: [u8; 3],
    pub diffuse: [u8; 3],
    pub emissive: [u8; 3],
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhongMaterial {
    pub lambert: LambertMaterial,
    pub specular: [u8; 3],
    pub shininess: f64,
    pub specularity: f64,
}

#[derive(Debug, Clone, PartialEq, Variantly)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Material {
    Color(BaseMaterial),
    Texture(TextureMaterial),
    Pbr(PbrMaterial),
    Lambert(LambertMaterial),
    Phong(PhongMaterial),
}

/// A material slot as stored in a mesh. An unrecognized tag leaves the slot
/// empty but keeps the tag so it can be written back.
pub type MeshMaterial = Recognized<Material, u32>;

impl Material {
    pub fn tag(&self) -> MaterialTag {
        match self {
            Material::Color(_) => MaterialTag::Color,
            Material::Texture(_) => MaterialTag::Texture,
            Material::Pbr(_) => MaterialTag::Pbr,
            Material::Lambert(_) => MaterialTag::Lambert,
            Material::Phong(_) => MaterialTag::Phong,
        }
    }

    pub fn base(&self) -> &BaseMaterial {
        match self {
            Material::Color(base) => base,
            Material::Texture(t) => &t.base,
            Material::Pbr(pbr) => &pbr.textured.base,
            Material::Lambert(lambert) => &lambert.textured.base,
            Material::Phong(phong) => &phong.lambert.textured.base,
        }
    }

    /// The texture record, for every variant except plain color.
    pub fn textured(&self) -> Option<&TextureMaterial> {
        match self {
            Material::Color(_) => None,
            Material::Texture(t) => Some(t),
            Material::Pbr(pbr) => Some(&pbr.textured),
            Material::Lambert(lambert) => Some(&lambert.textured),
            Material::Phong(phong) => Some(&phong.lambert.textured),
        }
    }

    pub fn diffuse_texture(&self) -> Option<&Texture> {
        self.textured().and_then(|t| t.texture.as_ref())
    }

    pub fn normal_texture(&self) -> Option<&Texture> {
        self.textured().and_then(|t| t.normal.as_ref())
    }

    pub fn emissive_color(&self) -> Option<[u8; 3]> {
        match self {
            Material::Pbr(pbr) => Some(pbr.emissive),
            Material::Lambert(lambert) => Some(lambert.emissive),
            Material::Phong(phong) => Some(phong.lambert.emissive),
            Material::Color(_) | Material::Texture(_) => None,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>, version: MstVersion) {
        write_scalar(out, self.tag().to_raw());
        match self {
            Material::Color(base) => base.encode(out),
            Material::Texture(t) => t.encode(out),
            Material::Pbr(pbr) => pbr.encode(out, version),
            Material::Lambert(lambert) => lambert.encode(out),
            Material::Phong(phong) => phong.encode(out),
        }
    }
}

impl BaseMaterial {
    pub fn encode(&self, out: &mut Vec<u8>) {
        write_array(out, &self.color);
        write_scalar(out, self.transparency);
    }
}

impl TextureMaterial {
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.base.encode(out);
        for slot in [&self.texture, &self.normal] {
            match slot {
                Some(texture) => {
                    write_scalar(out, 1u16);
                    texture.encode(out);
                }
                None => write_scalar(out, 0u16),
            }
        }
    }
}

impl PbrMaterial {
    pub fn encode(&self, out: &mut Vec<u8>, version: MstVersion) {
        self.textured.encode(out);
        write_array(out, &self.emissive);
        if version.pbr_padding() {
            out.push(0xFF);
        }
        write_scalar(out, self.metallic);
        write_scalar(out, self.roughness);
        write_scalar(out, self.reflectance);
        write_scalar(out, self.ambient_occlusion);
        write_scalar(out, self.clear_coat.factor);
        write_scalar(out, self.clear_coat.roughness);
        write_array(out, &self.clear_coat.normal);
        write_scalar(out, self.anisotropy.factor);
        write_array(out, &self.anisotropy.direction);
        write_scalar(out, self.thickness);
        write_scalar(out, self.sub_surface_power);
        write_array(out, &self.sheen_color);
        write_array(out, &self.sub_surface_color);
    }
}

impl LambertMaterial {
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.textured.encode(out);
        write_array(out, &self.ambient);
        write_array(out, &self.diffuse);
        write_array(out, &self.emissive);
    }
}

impl PhongMaterial {
    pub fn encode(&self, out: &mut Vec<u8>) {
        self.lambert.encode(out);
        write_array(out, &self.specular);
        write_scalar(out, self.shininess);
        write_scalar(out, self.specularity);
    }
}

/// Write a material slot. Unknown slots are written as their bare tag.
pub fn encode_mesh_material(material: &MeshMaterial, out: &mut Vec<u8>, version: MstVersion) {
    match material {
        Recognized::Known(material) => material.encode(out, version),
        Recognized::Unknown(tag) => write_scalar(out, *tag),
    }
}

fn parse_base(input: &mut &[u8]) -> WResult<BaseMaterial> {
    let color = parse_rgb(input)?;
    let transparency = le_f32.parse_next(input)?;
    Ok(BaseMaterial {
        color,
        transparency,
    })
}

fn parse_optional_texture(input: &mut &[u8]) -> WResult<Option<Texture>> {
    if le_u16.parse_next(input)? == 1 {
        Ok(Some(parse_texture(input)?))
    } else {
        Ok(None)
    }
}

fn parse_textured(input: &mut &[u8]) -> WResult<TextureMaterial> {
    let base = parse_base(input)?;
    let texture = parse_optional_texture(input)?;
    let normal = parse_optional_texture(input)?;
    Ok(TextureMaterial {
        base,
        texture,
        normal,
    })
}

fn parse_pbr(input: &mut &[u8], version: MstVersion) -> WResult<PbrMaterial> {
    let textured = parse_textured(input)?;
    let emissive = parse_rgb(input)?;
    if version.pbr_padding() {
        let _pad = le_u8.parse_next(input)?;
    }
    let metallic = le_f32.parse_next(input)?;
    let roughness = le_f32.parse_next(input)?;
    let reflectance = le_f32.parse_next(input)?;
    let ambient_occlusion = le_f32.parse_next(input)?;
    let clear_coat = ClearCoat {
        factor: le_f32.parse_next(input)?,
        roughness: le_f32.parse_next(input)?,
        normal: parse_rgb(input)?,
    };
    let anisotropy = Anisotropy {
        factor: le_f32.parse_next(input)?,
        direction: parse_vec3(input)?,
    };
    let thickness = le_f32.parse_next(input)?;
    let sub_surface_power = le_f32.parse_next(input)?;
    let sheen_color = parse_rgb(input)?;
    let sub_surface_color = parse_rgb(input)?;

    Ok(PbrMaterial {
        textured,
        emissive,
        metallic,
        roughness,
        reflectance,
        ambient_occlusion,
        clear_coat,
        anisotropy,
        thickness,
        sub_surface_power,
        sheen_color,
        sub_surface_color,
    })
}

fn parse_lambert(input: &mut &[u8]) -> WResult<LambertMaterial> {
    let textured = parse_textured(input)?;
    let ambient = parse_rgb(input)?;
    let diffuse = parse_rgb(input)?;
    let emissive = parse_rgb(input)?;
    Ok(LambertMaterial {
        textured,
        ambient,
        diffuse,
        emissive,
    })
}

fn parse_phong(input: &mut &[u8]) -> WResult<PhongMaterial> {
    let lambert = parse_lambert(input)?;
    let specular = parse_rgb(input)?;
    let shininess = le_f64.parse_next(input)?;
    let specularity = le_f64.parse_next(input)?;
    Ok(PhongMaterial {
        lambert,
        specular,
        shininess,
        specularity,
    })
}

/// Parse one tagged material slot.
///
/// An unknown tag consumes only the tag itself and yields
/// [`Recognized::Unknown`].
pub fn parse_material(input: &mut &[u8], version: MstVersion) -> WResult<MeshMaterial> {
    let raw = le_u32.parse_next(input)?;
    let Some(tag) = MaterialTag::from_raw(raw) else {
        warn!("unknown material tag {raw}, leaving slot empty");
        return Ok(Recognized::Unknown(raw));
    };

    let material = match tag {
        MaterialTag::Color => Material::Color(parse_base(input)?),
        MaterialTag::Texture => Material::Texture(parse_textured(input)?),
        MaterialTag::Pbr => Material::Pbr(parse_pbr(input, version)?),
        MaterialTag::Lambert => Material::Lambert(parse_lambert(input)?),
        MaterialTag::Phong => Material::Phong(parse_phong(input)?),
    };
    Ok(Recognized::Known(material))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parser_utils::parse_all;

    fn textured() -> TextureMaterial {
        TextureMaterial {
            base: BaseMaterial {
                color: [200, 100, 50],
                transparency: 0.25,
            },
            texture: Some(Texture {
                id: 3,
                name: "diffuse".to_string(),
                size: [1, 1],
                data: vec![9, 9, 9, 9],
                ..Default::default()
            }),
            normal: None,
        }
    }

    fn pbr() -> Material {
        Material::Pbr(PbrMaterial {
            textured: textured(),
            emissive: [10, 20, 30],
            metallic: 0.5,
            roughness: 0.75,
            reflectance: 0.1,
            ambient_occlusion: 1.0,
            clear_coat: ClearCoat {
                factor: 0.2,
                roughness: 0.3,
                normal: [0, 0, 255],
            },
            anisotropy: Anisotropy {
                factor: 0.4,
                direction: [1.0, 0.0, 0.0],
            },
            thickness: 2.0,
            sub_surface_power: 12.0,
            sheen_color: [1, 2, 3],
            sub_surface_color: [4, 5, 6],
        })
    }

    fn phong() -> Material {
        Material::Phong(PhongMaterial {
            lambert: LambertMaterial {
                textured: textured(),
                ambient: [1, 1, 1],
                diffuse: [128, 64, 32],
                emissive: [0, 0, 0],
            },
            specular: [255, 255, 255],
            shininess: 0.8,
            specularity: 0.6,
        })
    }

    fn decode(bytes: &[u8], version: MstVersion) -> MeshMaterial {
        parse_all(bytes, |input: &mut &[u8]| parse_material(input, version)).unwrap()
    }

    #[test]
    fn test_every_variant_decodes_at_v4() {
        let variants = [
            Material::Color(textured().base),
            Material::Texture(textured()),
            pbr(),
            Material::Lambert(LambertMaterial {
                textured: textured(),
                ambient: [1, 2, 3],
                diffuse: [4, 5, 6],
                emissive: [7, 8, 9],
            }),
            phong(),
        ];
        for material in variants {
            let mut out = Vec::new();
            material.encode(&mut out, MstVersion::V4);
            assert_eq!(out[..4], material.tag().to_raw().to_le_bytes());
            assert_eq!(decode(&out, MstVersion::V4), Recognized::Known(material));
        }
    }

    #[test]
    fn test_pbr_padding_only_before_v2() {
        let material = pbr();
        let mut v1 = Vec::new();
        material.encode(&mut v1, MstVersion::V1);
        let mut v2 = Vec::new();
        material.encode(&mut v2, MstVersion::V2);
        assert_eq!(v1.len(), v2.len() + 1);

        // tag, base, diffuse flag + texture, normal flag, emissive
        let mut tex = Vec::new();
        textured().texture.unwrap().encode(&mut tex);
        let pad_at = 4 + 7 + 2 + tex.len() + 2 + 3;
        assert_eq!(v1[pad_at], 0xFF);

        assert_eq!(decode(&v1, MstVersion::V1), Recognized::Known(material.clone()));
        assert_eq!(decode(&v2, MstVersion::V2), Recognized::Known(material));
    }

    #[test]
    fn test_unknown_tag_consumes_only_tag() {
        let mut out = Vec::new();
        write_scalar(&mut out, 9u32);
        phong().encode(&mut out, MstVersion::V4);

        let (first, second) = parse_all(&out, |input: &mut &[u8]| {
            let first = parse_material(input, MstVersion::V4)?;
            let second = parse_material(input, MstVersion::V4)?;
            Ok((first, second))
        })
        .unwrap();
        assert_eq!(first, Recognized::Unknown(9));
        assert_eq!(second, Recognized::Known(phong()));
    }

    #[test]
    fn test_unknown_slot_reencodes_as_tag() {
        let mut out = Vec::new();
        encode_mesh_material(&Recognized::Unknown(17), &mut out, MstVersion::V4);
        assert_eq!(out, 17u32.to_le_bytes());
    }

    #[test]
    fn test_accessors() {
        let material = phong();
        assert_eq!(material.base().color, [200, 100, 50]);
        assert_eq!(material.diffuse_texture().map(|t| t.id), Some(3));
        assert!(material.normal_texture().is_none());
        assert_eq!(material.emissive_color(), Some([0, 0, 0]));
        assert!(Material::Color(BaseMaterial::default()).textured().is_none());

        assert!(material.is_phong());
        assert!(material.pbr_ref().is_none());
        assert_eq!(material.phong_ref().map(|p| p.specular), Some([255, 255, 255]));
    }

    #[test]
    fn test_truncated_material_fails() {
        let mut out = Vec::new();
        pbr().encode(&mut out, MstVersion::V4);
        out.truncate(out.len() - 2);
        let result = parse_all(&out, |input: &mut &[u8]| parse_material(input, MstVersion::V4));
        assert!(result.is_err());
    }
}
