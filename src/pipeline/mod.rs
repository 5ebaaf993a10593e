pub mod codec;
pub mod executor;
pub mod operation;
pub mod transforms;

pub use executor::execute;
pub use operation::{resolve, resolve_all, Operation, ParamPolicy};
pub use transforms::{ImageCrateTransforms, ImageTransforms, SharedImageTransforms, TransformError};
