//! Texture pixel decoding and PNG conversion for glTF export, plus building
//! MST textures from image files.

use std::io::{Read, Write};
use std::path::Path;

use flate2::Compression as ZlibLevel;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageError, RgbaImage};
use rootcause::Report;
use thiserror::Error;

use crate::models::texture::{Compression, PixelFormat, PixelType, Texture};
use crate::recognized::Recognized;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to decompress texture data: {0}")]
    Decompress(String),
    #[error("failed to compress texture data: {0}")]
    Compress(String),
    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(u16),
    #[error("unsupported pixel type {0}")]
    UnsupportedPixelType(u16),
    #[error("texture data too short: need {expected} bytes, have {actual}")]
    DataTooShort { expected: usize, actual: usize },
    #[error("failed to decode image: {0}")]
    Decode(String),
    #[error("failed to encode PNG: {0}")]
    PngEncode(String),
    #[error("I/O error: {0}")]
    Io(String),
}

pub fn compress_image(data: &[u8]) -> Result<Vec<u8>, Report<TextureError>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), ZlibLevel::default());
    encoder
        .write_all(data)
        .map_err(|e| Report::new(TextureError::Compress(e.to_string())))?;
    encoder
        .finish()
        .map_err(|e| Report::new(TextureError::Compress(e.to_string())))
}

pub fn decompress_image(data: &[u8]) -> Result<Vec<u8>, Report<TextureError>> {
    let mut out = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|e| Report::new(TextureError::Decompress(e.to_string())))?;
    Ok(out)
}

/// Decode a texture's pixels into RGBA8.
///
/// Only 8-bit unsigned R, RGB and RGBA data is understood; single-channel
/// data is replicated into gray. With `flip_y` the first stored row becomes
/// the bottom row of the image.
pub fn load_texture(texture: &Texture, flip_y: bool) -> Result<RgbaImage, Report<TextureError>> {
    let channels = match texture.format {
        Recognized::Known(format @ (PixelFormat::R | PixelFormat::Rgb | PixelFormat::Rgba)) => {
            format.channels()
        }
        other => return Err(Report::new(TextureError::UnsupportedFormat(other.raw()))),
    };
    if texture.pixel_type != Recognized::Known(PixelType::UByte) {
        return Err(Report::new(TextureError::UnsupportedPixelType(
            texture.pixel_type.raw(),
        )));
    }

    let data = match texture.compression {
        Recognized::Known(Compression::None) => std::borrow::Cow::Borrowed(&texture.data[..]),
        Recognized::Known(Compression::Zlib) => {
            std::borrow::Cow::Owned(decompress_image(&texture.data)?)
        }
        Recognized::Unknown(raw) => {
            return Err(Report::new(TextureError::Decompress(format!(
                "unknown compression kind {raw}"
            ))));
        }
    };

    let (width, height) = match (u32::try_from(texture.width()), u32::try_from(texture.height())) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(Report::new(TextureError::Decode(format!(
                "texture dimensions {}x{} are too large",
                texture.width(),
                texture.height()
            ))));
        }
    };

    let Some((row_len, expected)) = (width as usize)
        .checked_mul(channels)
        .and_then(|row_len| Some((row_len, row_len.checked_mul(height as usize)?)))
    else {
        return Err(Report::new(TextureError::Decode(format!(
            "texture dimensions {width}x{height} overflow the pixel buffer size"
        ))));
    };
    if data.len() < expected {
        return Err(Report::new(TextureError::DataTooShort {
            expected,
            actual: data.len(),
        }));
    }

    let mut rgba = Vec::with_capacity((expected / channels).saturating_mul(4));
    for row in 0..height as usize {
        let src_row = if flip_y { height as usize - 1 - row } else { row };
        let src = &data[src_row * row_len..(src_row + 1) * row_len];
        for px in src.chunks_exact(channels) {
            match px {
                [v] => rgba.extend_from_slice(&[*v, *v, *v, 255]),
                [r, g, b] => rgba.extend_from_slice(&[*r, *g, *b, 255]),
                _ => rgba.extend_from_slice(&px[..4]),
            }
        }
    }

    RgbaImage::from_raw(width, height, rgba)
        .ok_or_else(|| Report::new(TextureError::Decode("pixel buffer size mismatch".to_string())))
}

/// Decode a texture (flipped for glTF's top-left origin) and encode it as PNG.
pub fn texture_to_png(texture: &Texture) -> Result<Vec<u8>, Report<TextureError>> {
    let rgba_image = load_texture(texture, true)?;

    let mut png_buf = Vec::new();
    PngEncoder::new(&mut png_buf)
        .write_image(
            rgba_image.as_raw(),
            rgba_image.width(),
            rgba_image.height(),
            ExtendedColorType::Rgba8,
        )
        .map_err(|e| Report::new(TextureError::PngEncode(e.to_string())))?;

    Ok(png_buf)
}

/// Build a zlib-compressed RGBA texture from an image file (PNG, JPEG, GIF,
/// BMP or TIFF). The texture is named after the file and has id 0.
pub fn create_texture(path: impl AsRef<Path>, repeated: bool) -> Result<Texture, Report<TextureError>> {
    let path = path.as_ref();
    let image = image::open(path).map_err(|e| {
        Report::new(match e {
            ImageError::IoError(io) => TextureError::Io(io.to_string()),
            other => TextureError::Decode(other.to_string()),
        })
    })?;
    let rgba = image.to_rgba8();

    Ok(Texture {
        id: 0,
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        size: [rgba.width() as u64, rgba.height() as u64],
        format: Recognized::Known(PixelFormat::Rgba),
        pixel_type: Recognized::Known(PixelType::UByte),
        compression: Recognized::Known(Compression::Zlib),
        repeated,
        data: compress_image(rgba.as_raw())?,
    })
}
