//! Texture blobs embedded in MST materials.

use winnow::Parser;
use winnow::binary::{le_i32, le_u16, le_u64};

use crate::data::parser_utils::{WResult, parse_bool, parse_len_prefixed_bytes, parse_string};
use crate::data::write_utils::{write_bool, write_len_prefixed_bytes, write_scalar, write_str};
use crate::recognized::{Recognized, WireEnum};

/// Channel layout of the pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    R,
    RInteger,
    Rg,
    RgInteger,
    Rgb,
    RgbInteger,
    Rgba,
    RgbaInteger,
    Rgbm,
    DepthComponent,
    DepthStencil,
    Alpha,
}

impl PixelFormat {
    /// Number of channels per pixel, where that is meaningful.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::R | PixelFormat::RInteger | PixelFormat::Alpha => 1,
            PixelFormat::DepthComponent => 1,
            PixelFormat::Rg | PixelFormat::RgInteger | PixelFormat::DepthStencil => 2,
            PixelFormat::Rgb | PixelFormat::RgbInteger => 3,
            PixelFormat::Rgba | PixelFormat::RgbaInteger | PixelFormat::Rgbm => 4,
        }
    }
}

impl WireEnum for PixelFormat {
    type Raw = u16;

    fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => PixelFormat::R,
            1 => PixelFormat::RInteger,
            2 => PixelFormat::Rg,
            3 => PixelFormat::RgInteger,
            4 => PixelFormat::Rgb,
            5 => PixelFormat::RgbInteger,
            6 => PixelFormat::Rgba,
            7 => PixelFormat::RgbaInteger,
            8 => PixelFormat::Rgbm,
            9 => PixelFormat::DepthComponent,
            10 => PixelFormat::DepthStencil,
            11 => PixelFormat::Alpha,
            _ => return None,
        })
    }

    fn to_raw(self) -> u16 {
        self as u16
    }
}

/// Storage type of each channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelType {
    UByte,
    Byte,
    UShort,
    Short,
    UInt,
    Int,
    Half,
    Float,
}

impl WireEnum for PixelType {
    type Raw = u16;

    fn from_raw(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => PixelType::UByte,
            1 => PixelType::Byte,
            2 => PixelType::UShort,
            3 => PixelType::Short,
            4 => PixelType::UInt,
            5 => PixelType::Int,
            6 => PixelType::Half,
            7 => PixelType::Float,
            _ => return None,
        })
    }

    fn to_raw(self) -> u16 {
        self as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compression {
    #[default]
    None,
    Zlib,
}

impl WireEnum for Compression {
    type Raw = u16;

    fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            0 => Some(Compression::None),
            1 => Some(Compression::Zlib),
            _ => None,
        }
    }

    fn to_raw(self) -> u16 {
        self as u16
    }
}

/// An image referenced by a material.
///
/// `id` is only meaningful within one mesh container; the glTF exporter uses
/// it to upload each distinct texture once.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Texture {
    pub id: i32,
    pub name: String,
    /// Width, height.
    pub size: [u64; 2],
    pub format: Recognized<PixelFormat, u16>,
    pub pixel_type: Recognized<PixelType, u16>,
    pub compression: Recognized<Compression, u16>,
    pub repeated: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Vec<u8>,
}

impl Default for Texture {
    fn default() -> Self {
        Texture {
            id: 0,
            name: String::new(),
            size: [0, 0],
            format: Recognized::Known(PixelFormat::Rgba),
            pixel_type: Recognized::Known(PixelType::UByte),
            compression: Recognized::Known(Compression::None),
            repeated: false,
            data: Vec::new(),
        }
    }
}

impl Texture {
    pub fn width(&self) -> u64 {
        self.size[0]
    }

    pub fn height(&self) -> u64 {
        self.size[1]
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.compression, Recognized::Known(Compression::Zlib))
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        write_scalar(out, self.id);
        write_str(out, &self.name);
        write_scalar(out, self.size[0]);
        write_scalar(out, self.size[1]);
        write_scalar(out, self.format.raw());
        write_scalar(out, self.pixel_type.raw());
        write_scalar(out, self.compression.raw());
        write_len_prefixed_bytes(out, &self.data);
        write_bool(out, self.repeated);
    }
}

pub fn parse_texture(input: &mut &[u8]) -> WResult<Texture> {
    let id = le_i32.parse_next(input)?;
    let name = parse_string(input)?;
    let width = le_u64.parse_next(input)?;
    let height = le_u64.parse_next(input)?;
    let format = Recognized::from_raw(le_u16.parse_next(input)?);
    let pixel_type = Recognized::from_raw(le_u16.parse_next(input)?);
    let compression = Recognized::from_raw(le_u16.parse_next(input)?);
    let data = parse_len_prefixed_bytes(input)?;
    let repeated = parse_bool(input)?;

    Ok(Texture {
        id,
        name,
        size: [width, height],
        format,
        pixel_type,
        compression,
        repeated,
        data,
    })
}
