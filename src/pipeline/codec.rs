use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, ImageFormat};

/// Decodes fetched bytes, sniffing the container format from its magic bytes.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    image::load_from_memory(bytes)
}

pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Encodes as baseline JPEG at the encoder's default quality.
///
/// JPEG carries neither alpha nor more than 8 bits per channel, so anything
/// other than RGB8 or L8 is converted to RGB8 first.
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let encoder = JpegEncoder::new(&mut out);
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => {
            image.write_with_encoder(encoder)?;
        }
        other => {
            DynamicImage::ImageRgb8(other.to_rgb8()).write_with_encoder(encoder)?;
        }
    }
    Ok(out)
}
