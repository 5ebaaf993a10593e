use image::DynamicImage;
use tracing::debug;

use super::operation::{Operation, THUMBNAIL_WIDTH};
use super::transforms::{ImageTransforms, TransformError};

/// Applies `operations` left to right; each step consumes the previous image.
/// The first failing step aborts the whole pipeline.
pub fn execute(
    image: DynamicImage,
    operations: &[Operation],
    transforms: &dyn ImageTransforms,
) -> Result<DynamicImage, TransformError> {
    operations
        .iter()
        .try_fold(image, |current, operation| apply(current, operation, transforms))
}

fn apply(
    image: DynamicImage,
    operation: &Operation,
    transforms: &dyn ImageTransforms,
) -> Result<DynamicImage, TransformError> {
    match operation {
        Operation::FlipHorizontal => transforms.flip_horizontal(image),
        Operation::FlipVertical => transforms.flip_vertical(image),
        Operation::RotateRight => transforms.rotate_right(image),
        Operation::RotateLeft => transforms.rotate_left(image),
        Operation::Grayscale => transforms.grayscale(image),
        Operation::Thumbnail => resize(image, Some(THUMBNAIL_WIDTH), None, transforms),
        Operation::Resize { width, height } => resize(image, *width, *height, transforms),
        Operation::RotateByAngle { degrees } => transforms.rotate(image, *degrees),
        Operation::Unknown(token) => {
            debug!(token = %token, "skipping unrecognized operation");
            Ok(image)
        }
    }
}

fn resize(
    image: DynamicImage,
    width: Option<u32>,
    height: Option<u32>,
    transforms: &dyn ImageTransforms,
) -> Result<DynamicImage, TransformError> {
    match resize_target(image.width(), image.height(), width, height) {
        Some((target_width, target_height)) => {
            transforms.resize(image, target_width, target_height)
        }
        None => Ok(image),
    }
}

/// Final size for a resize request. A missing side is scaled to keep the
/// source aspect ratio (never below 1px). `None` when neither side is given
/// or the source is empty: the image passes through unchanged.
pub fn resize_target(
    src_width: u32,
    src_height: u32,
    width: Option<u32>,
    height: Option<u32>,
) -> Option<(u32, u32)> {
    if src_width == 0 || src_height == 0 {
        return None;
    }
    let scale = |target: u32, num: u32, den: u32| -> u32 {
        let scaled = (f64::from(target) * f64::from(num) / f64::from(den)).round();
        scaled.clamp(1.0, f64::from(u32::MAX)) as u32
    };
    match (width, height) {
        (Some(w), Some(h)) => Some((w, h)),
        (Some(w), None) => Some((w, scale(w, src_height, src_width))),
        (None, Some(h)) => Some((scale(h, src_width, src_height), h)),
        (None, None) => None,
    }
}
