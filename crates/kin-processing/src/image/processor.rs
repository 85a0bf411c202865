//! Image variant generator - original, square thumbnail and medium derivative

use crate::format::extension;
use crate::hashing::digest;
use crate::image::resize::ImageResize;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::{DynamicImage, GenericImageView, ImageReader};
use kin_core::{
    Dimensions, MediaError, MediaKind, MediaResult, ProcessedVariant, VariantConfig, VariantSet,
};
use kin_storage::{derive_paths, Storage, WriteOutcome};
use std::io::Cursor;
use std::sync::Arc;

/// Output of the blocking decode/render step.
struct RenderedImage {
    natural: Dimensions,
    thumb: Option<Bytes>,
    medium: Option<Bytes>,
}

pub struct ImageVariantGenerator {
    storage: Arc<dyn Storage>,
    config: VariantConfig,
}

impl ImageVariantGenerator {
    pub fn new(storage: Arc<dyn Storage>, config: VariantConfig) -> Self {
        Self { storage, config }
    }

    /// Store an uploaded image and its derivatives under its content digest.
    ///
    /// The source is decoded before anything is written, so undecodable input
    /// fails with `DecodeFailure` and leaves storage untouched. Derivatives that
    /// already exist are not re-rendered.
    #[tracing::instrument(skip(self, data, taken_at), fields(size_bytes = data.len()))]
    pub async fn process_image(
        &self,
        data: Bytes,
        filename: &str,
        owner_id: i64,
        taken_at: DateTime<Utc>,
    ) -> MediaResult<VariantSet> {
        let start = std::time::Instant::now();

        let ext = extension(filename).ok_or_else(|| MediaError::UnsupportedFormat {
            filename: filename.to_string(),
        })?;
        let source_digest = digest(&data);
        let paths = derive_paths(owner_id, taken_at, &source_digest, &ext);

        let need_thumb = !self.storage.exists(&paths.thumb).await?;
        let need_medium = !self.storage.exists(&paths.medium).await?;

        let format_label = ext.trim_start_matches('.').to_string();
        let config = self.config.clone();
        let source = data.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            render(&source, &format_label, &config, need_thumb, need_medium)
        })
        .await
        .map_err(|e| MediaError::Internal(format!("Image task failed: {}", e)))??;

        let original_size = match self
            .storage
            .put_if_absent(&paths.original, data.to_vec())
            .await?
        {
            WriteOutcome::Written => data.len() as u64,
            WriteOutcome::AlreadyPresent => self.storage.content_length(&paths.original).await?,
        };

        let original = ProcessedVariant {
            path: paths.original,
            dimensions: rendered.natural,
            size_bytes: original_size,
            digest: source_digest.clone(),
        };

        let thumb = self
            .store_derivative(
                &paths.thumb,
                Dimensions::square(self.config.thumb_size),
                rendered.thumb,
            )
            .await?;

        let medium = match ImageResize::fit_width(rendered.natural, self.config.medium_width) {
            Some(dimensions) => Some(
                self.store_derivative(&paths.medium, dimensions, rendered.medium)
                    .await?,
            ),
            None => None,
        };

        tracing::info!(
            owner_id = owner_id,
            digest = %source_digest,
            natural = %rendered.natural,
            has_medium = medium.is_some(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Image variants stored"
        );

        Ok(VariantSet {
            kind: MediaKind::Image,
            source_digest,
            original,
            medium,
            thumb: Some(thumb),
            poster: None,
        })
    }

    /// Write `rendered` at `path` unless present, then describe what is stored there.
    async fn store_derivative(
        &self,
        path: &str,
        dimensions: Dimensions,
        rendered: Option<Bytes>,
    ) -> MediaResult<ProcessedVariant> {
        if let Some(bytes) = rendered {
            if self.storage.put_if_absent(path, bytes.to_vec()).await? == WriteOutcome::Written {
                return Ok(ProcessedVariant {
                    path: path.to_string(),
                    dimensions,
                    size_bytes: bytes.len() as u64,
                    digest: digest(&bytes),
                });
            }
        }

        let stored = self.storage.read(path).await?;
        Ok(ProcessedVariant {
            path: path.to_string(),
            dimensions,
            size_bytes: stored.len() as u64,
            digest: digest(&stored),
        })
    }
}

fn decode(data: &[u8], format_label: &str) -> MediaResult<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| MediaError::decode(format_label, e))?;
    reader.decode().map_err(|e| MediaError::decode(format_label, e))
}

fn render(
    data: &[u8],
    format_label: &str,
    config: &VariantConfig,
    need_thumb: bool,
    need_medium: bool,
) -> MediaResult<RenderedImage> {
    let img = decode(data, format_label)?;
    let (width, height) = img.dimensions();
    let natural = Dimensions::new(width, height);

    let encode_failed = |e: image::ImageError| MediaError::Internal(format!("JPEG encode failed: {}", e));

    let thumb = if need_thumb {
        let square = ImageResize::cover_square(&img, config.thumb_size);
        Some(ImageResize::encode_jpeg(&square, config.thumb_quality).map_err(encode_failed)?)
    } else {
        None
    };

    let medium = match ImageResize::fit_width(natural, config.medium_width) {
        Some(target) if need_medium => {
            let resized = ImageResize::resize_to(&img, target);
            Some(ImageResize::encode_jpeg(&resized, config.medium_quality).map_err(encode_failed)?)
        }
        _ => None,
    };

    Ok(RenderedImage {
        natural,
        thumb,
        medium,
    })
}
