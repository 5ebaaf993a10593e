//! Boundary to the pixel-level primitives.
//!
//! The executor only ever talks to [`ImageTransforms`]; the production
//! implementation is [`ImageCrateTransforms`], backed by the `image` crate.
//! Every primitive consumes its input and returns a new image.

use std::sync::Arc;

use image::imageops::FilterType;
use image::{DynamicImage, Rgba, RgbaImage};
use thiserror::Error;

/// Largest width or height any primitive will produce unless configured otherwise.
pub const DEFAULT_MAX_DIMENSION: u32 = 16_384;

const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TransformError {
    #[error("rotation angle must be finite, got {0}")]
    InvalidAngle(f64),
    #[error("target size {width}x{height} exceeds the {limit}px limit")]
    DimensionLimit { width: u64, height: u64, limit: u32 },
    #[error("target size {width}x{height} is empty")]
    EmptyTarget { width: u32, height: u32 },
}

pub trait ImageTransforms: Send + Sync + 'static {
    fn flip_horizontal(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
    fn flip_vertical(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
    /// 90 degrees clockwise.
    fn rotate_right(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
    /// 90 degrees counter-clockwise.
    fn rotate_left(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
    fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, TransformError>;
    /// Resize to exactly `width` x `height`, ignoring the source aspect ratio.
    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, TransformError>;
    /// Counter-clockwise rotation by an arbitrary angle in degrees.
    fn rotate(&self, image: DynamicImage, degrees: f64) -> Result<DynamicImage, TransformError>;
}

pub type SharedImageTransforms = Arc<dyn ImageTransforms>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCrateTransforms {
    max_dimension: u32,
}

impl Default for ImageCrateTransforms {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl ImageCrateTransforms {
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn check_target(&self, width: u64, height: u64) -> Result<(), TransformError> {
        let limit = u64::from(self.max_dimension);
        if width > limit || height > limit {
            return Err(TransformError::DimensionLimit {
                width,
                height,
                limit: self.max_dimension,
            });
        }
        Ok(())
    }
}

impl ImageTransforms for ImageCrateTransforms {
    fn flip_horizontal(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.fliph())
    }

    fn flip_vertical(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.flipv())
    }

    fn rotate_right(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.rotate90())
    }

    fn rotate_left(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.rotate270())
    }

    fn grayscale(&self, image: DynamicImage) -> Result<DynamicImage, TransformError> {
        Ok(image.grayscale())
    }

    fn resize(
        &self,
        image: DynamicImage,
        width: u32,
        height: u32,
    ) -> Result<DynamicImage, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::EmptyTarget { width, height });
        }
        self.check_target(u64::from(width), u64::from(height))?;
        if image.width() == width && image.height() == height {
            return Ok(image);
        }
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn rotate(&self, image: DynamicImage, degrees: f64) -> Result<DynamicImage, TransformError> {
        if !degrees.is_finite() {
            return Err(TransformError::InvalidAngle(degrees));
        }
        let angle = degrees.rem_euclid(360.0);
        if angle == 0.0 {
            return Ok(image);
        }
        if angle == 90.0 {
            return Ok(image.rotate270());
        }
        if angle == 180.0 {
            return Ok(image.rotate180());
        }
        if angle == 270.0 {
            return Ok(image.rotate90());
        }

        let (dst_width, dst_height) = rotated_bounds(image.width(), image.height(), angle);
        self.check_target(dst_width, dst_height)?;
        // check_target bounds both sides to u32.
        let rotated = rotate_rgba(
            &image.to_rgba8(),
            angle,
            dst_width as u32,
            dst_height as u32,
        );
        Ok(DynamicImage::ImageRgba8(rotated))
    }
}

fn rotated_bounds(width: u32, height: u32, angle: f64) -> (u64, u64) {
    let (sin, cos) = angle.to_radians().sin_cos();
    let w = f64::from(width);
    let h = f64::from(height);
    let bound = |v: f64| ((v - 1e-6).ceil().max(1.0)) as u64;
    (
        bound(w * cos.abs() + h * sin.abs()),
        bound(w * sin.abs() + h * cos.abs()),
    )
}

fn rotate_rgba(src: &RgbaImage, angle: f64, dst_width: u32, dst_height: u32) -> RgbaImage {
    let (sin, cos) = angle.to_radians().sin_cos();
    let src_cx = f64::from(src.width()) / 2.0;
    let src_cy = f64::from(src.height()) / 2.0;
    let dst_cx = f64::from(dst_width) / 2.0;
    let dst_cy = f64::from(dst_height) / 2.0;

    RgbaImage::from_fn(dst_width, dst_height, |x, y| {
        let dx = f64::from(x) + 0.5 - dst_cx;
        let dy = f64::from(y) + 0.5 - dst_cy;
        // Inverse mapping; y grows downwards so a visual counter-clockwise turn
        // maps destination back to source with these signs.
        let sx = dx * cos - dy * sin;
        let sy = dx * sin + dy * cos;
        sample_bilinear(src, sx + src_cx - 0.5, sy + src_cy - 0.5)
    })
}

fn sample_bilinear(src: &RgbaImage, px: f64, py: f64) -> Rgba<u8> {
    let max_x = f64::from(src.width());
    let max_y = f64::from(src.height());
    if px <= -1.0 || py <= -1.0 || px >= max_x || py >= max_y {
        return BACKGROUND;
    }

    let x0 = px.floor();
    let y0 = py.floor();
    let fx = px - x0;
    let fy = py - y0;
    let fetch = |x: f64, y: f64| -> Rgba<u8> {
        if x < 0.0 || y < 0.0 || x >= max_x || y >= max_y {
            BACKGROUND
        } else {
            *src.get_pixel(x as u32, y as u32)
        }
    };

    let p00 = fetch(x0, y0);
    let p10 = fetch(x0 + 1.0, y0);
    let p01 = fetch(x0, y0 + 1.0);
    let p11 = fetch(x0 + 1.0, y0 + 1.0);

    let mut out = [0_u8; 4];
    for (i, channel) in out.iter_mut().enumerate() {
        let top = f64::from(p00[i]) * (1.0 - fx) + f64::from(p10[i]) * fx;
        let bottom = f64::from(p01[i]) * (1.0 - fx) + f64::from(p11[i]) * fx;
        *channel = clamp_u8(top * (1.0 - fy) + bottom * fy);
    }
    Rgba(out)
}

fn clamp_u8(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    value.clamp(0.0, 255.0).round() as u8
}
