//! Frame imagery — dark-frame detection and JPEG data-URI snapshots.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageResult};

/// JPEG quality used for attendance snapshots.
pub const SNAPSHOT_QUALITY: u8 = 80;

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// Check if a grayscale frame is dark.
///
/// Returns true if more than `threshold_pct` of pixels fall below 32.
/// Cameras deliver such frames while auto-exposure is still settling.
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

pub fn is_dark_image(img: &DynamicImage) -> bool {
    is_dark_frame(img.to_luma8().as_raw(), DARK_FRAME_THRESHOLD)
}

/// Encode a frame as a `data:image/jpeg;base64,...` URI.
pub fn jpeg_data_uri(img: &DynamicImage, quality: u8) -> ImageResult<String> {
    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality).encode_image(&rgb)?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(&buf)
    ))
}
