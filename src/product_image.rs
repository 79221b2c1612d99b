use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{imageops::FilterType, ImageFormat};
use tracing::info;

use crate::error::PipelineError;
use crate::models::ProductImage;

pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// Accepts either bare base64 or a `data:<mime>;base64,<payload>` URL.
fn split_data_url(data: &str) -> (Option<&str>, &str) {
    let trimmed = data.trim();
    if let Some(rest) = trimmed.strip_prefix("data:") {
        if let Some((meta, payload)) = rest.split_once(',') {
            let mime = meta.split(';').next().filter(|m| !m.is_empty());
            return (mime, payload);
        }
    }
    (None, trimmed)
}

/// Decode, validate and downscale an uploaded product photo so that its
/// longest side is at most `max_dimension`. Images already within bounds
/// are passed through untouched; resized ones are re-encoded as PNG.
pub fn normalize(image: &ProductImage, max_dimension: u32) -> Result<ProductImage, PipelineError> {
    let (url_mime, payload) = split_data_url(&image.data);
    let raw = STANDARD
        .decode(payload)
        .map_err(|e| PipelineError::InvalidImage(format!("invalid base64: {e}")))?;
    // the declared type only matters when the bytes carry no recognizable signature
    let declared = url_mime.or_else(|| Some(image.mime_type.trim()).filter(|m| !m.is_empty()));
    let format = image::guess_format(&raw)
        .ok()
        .or_else(|| declared.and_then(ImageFormat::from_mime_type))
        .ok_or_else(|| PipelineError::InvalidImage(format!("unrecognized image format ({})", declared.unwrap_or("no type given"))))?;
    let decoded = image::load_from_memory_with_format(&raw, format)
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());
    if width <= max_dimension && height <= max_dimension {
        return Ok(ProductImage { mime_type: format.to_mime_type().to_string(), data: payload.to_string() });
    }

    let resized = decoded.resize(max_dimension, max_dimension, FilterType::Triangle);
    info!("📐 Resized product image {}x{} -> {}x{}", width, height, resized.width(), resized.height());

    let mut buf = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| PipelineError::InvalidImage(e.to_string()))?;
    Ok(ProductImage { mime_type: "image/png".into(), data: STANDARD.encode(&buf) })
}
