//! Image encoding: `DynamicImage` → base64 JPEG/PNG wrapped in `ImageData`.
//!
//! VLM APIs accept images as base64 payloads embedded in the JSON request
//! body. Certificates are mostly large type on flat backgrounds, so JPEG at
//! quality 85 reads as well as PNG at a fraction of the size. PNG stays
//! available for callers who want lossless input.

use crate::config::PageImageFormat;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as base64 ready for the classifier.
pub fn encode_page(
    img: &DynamicImage,
    format: PageImageFormat,
) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    match format {
        PageImageFormat::Png => {
            img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        }
        PageImageFormat::Jpeg { quality } => {
            // JPEG has no alpha channel; pdfium renders RGBA.
            let rgb = img.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            encoder.encode_image(&rgb)?;
        }
    }

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, format.mime_type()).with_detail("high"))
}
