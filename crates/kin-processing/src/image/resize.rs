use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView, ImageResult};
use kin_core::Dimensions;

/// Resize and encode operations used for image derivatives
pub struct ImageResize;

impl ImageResize {
    /// Select appropriate filter type based on resize ratio
    pub fn select_filter(
        orig_width: u32,
        orig_height: u32,
        new_width: u32,
        new_height: u32,
    ) -> image::imageops::FilterType {
        let width_ratio = orig_width as f32 / new_width.max(1) as f32;
        let height_ratio = orig_height as f32 / new_height.max(1) as f32;
        let max_ratio = width_ratio.max(height_ratio);

        if max_ratio > 2.0 {
            image::imageops::FilterType::Triangle
        } else if max_ratio > 1.5 {
            image::imageops::FilterType::CatmullRom
        } else {
            image::imageops::FilterType::Lanczos3
        }
    }

    /// Dimensions of the medium derivative, or `None` when the source is not
    /// wider than `max_width` (no derivative, never an upscale).
    pub fn fit_width(natural: Dimensions, max_width: u32) -> Option<Dimensions> {
        if natural.width <= max_width || natural.width == 0 {
            return None;
        }

        let aspect_ratio = natural.height as f64 / natural.width as f64;
        let height = (max_width as f64 * aspect_ratio).round() as u32;
        Some(Dimensions::new(max_width, height.max(1)))
    }

    /// Crop the centred square of the short side, then scale it to `size`×`size`.
    ///
    /// Cropping first keeps the work bounded by the source, however thin it is.
    pub fn cover_square(img: &DynamicImage, size: u32) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let short_side = orig_width.min(orig_height);
        let square = img.crop_imm(
            (orig_width - short_side) / 2,
            (orig_height - short_side) / 2,
            short_side,
            short_side,
        );
        let filter = Self::select_filter(short_side, short_side, size, size);
        square.resize_exact(size, size, filter)
    }

    /// Resize to exact target dimensions
    pub fn resize_to(img: &DynamicImage, target: Dimensions) -> DynamicImage {
        let (orig_width, orig_height) = img.dimensions();
        let filter = Self::select_filter(orig_width, orig_height, target.width, target.height);
        img.resize_exact(target.width, target.height, filter)
    }

    /// Encode as baseline JPEG at `quality` (1-100). Alpha is dropped.
    pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> ImageResult<Bytes> {
        let rgb_img = img.to_rgb8();
        let (width, height) = rgb_img.dimensions();

        let mut buffer = Vec::with_capacity(width as usize * height as usize / 4);
        let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
        rgb_img.write_with_encoder(encoder)?;

        Ok(Bytes::from(buffer))
    }
}
