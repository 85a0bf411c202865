//! Image processing module
//!
//! - Resize math and JPEG encoding (resize)
//! - Derivative generation and storage (processor)

pub mod processor;
pub mod resize;

pub use processor::ImageVariantGenerator;
pub use resize::ImageResize;
