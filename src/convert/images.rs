use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};

use crate::model::{ImageData, ImageFormat, ObjectKind, SceneObject};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImageLimits {
    /// Encoded size above which an image is re-encoded.
    pub max_bytes: usize,
    /// Longest pixel side kept after downscaling.
    pub max_side: u32,
    pub jpeg_quality: u8,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 1536 * 1024,
            max_side: 4096,
            jpeg_quality: 85,
        }
    }
}

fn pixel_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

fn encode(
    decoded: &DynamicImage,
    keep_alpha: bool,
    quality: u8,
) -> image::ImageResult<(Vec<u8>, ImageFormat)> {
    let mut buf = Vec::new();
    if keep_alpha {
        decoded.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        Ok((buf, ImageFormat::Png))
    } else {
        let rgb = decoded.to_rgb8();
        JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
        Ok((buf, ImageFormat::Jpeg))
    }
}

/// Downscale and recompress one image if it is over either limit.
/// Returns whether the image was replaced.
fn shrink(img: &mut ImageData, limits: &ImageLimits) -> image::ImageResult<bool> {
    let oversized_dims = pixel_dimensions(&img.data)
        .is_some_and(|(w, h)| w.max(h) > limits.max_side);
    if img.data.len() <= limits.max_bytes && !oversized_dims {
        return Ok(false);
    }

    let mut decoded = image::load_from_memory(&img.data)?;
    if decoded.width().max(decoded.height()) > limits.max_side {
        decoded = decoded.resize(limits.max_side, limits.max_side, FilterType::Triangle);
    }
    let keep_alpha =
        img.transparent || (img.format == ImageFormat::Png && decoded.color().has_alpha());
    let (data, format) = encode(&decoded, keep_alpha, limits.jpeg_quality)?;

    if data.len() >= img.data.len() && !oversized_dims {
        return Ok(false);
    }
    log::info!(
        "Image re-encoded: {} → {} bytes ({}x{}, {:?})",
        img.data.len(),
        data.len(),
        decoded.width(),
        decoded.height(),
        format,
    );
    img.data = data;
    img.format = format;
    Ok(true)
}

/// Bound the size of embedded images before conversion. Best effort: an image
/// that cannot be decoded is left as is for the recovery chain to deal with.
pub fn prescreen(objects: &mut [SceneObject], limits: &ImageLimits) -> usize {
    let mut replaced = 0;
    for obj in objects {
        match &mut obj.kind {
            ObjectKind::Image(img) => match shrink(img, limits) {
                Ok(true) => replaced += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Image pre-screen skipped for '{}': {e}", obj.id),
            },
            ObjectKind::Group { children } => replaced += prescreen(children, limits),
            _ => {}
        }
    }
    replaced
}
