//! Ingest entry point: classify, then dispatch to the image or video path.

use crate::format::classify;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use kin_core::{Config, FormatClass, MediaError, MediaResult, VariantSet};
use kin_storage::{LocalStorage, Storage};
use std::sync::Arc;

#[cfg(feature = "image")]
use crate::image::ImageVariantGenerator;
#[cfg(feature = "video")]
use crate::video::{Encoder, FfmpegEncoder, VideoTranscoder};

/// Turns uploads into stored variant sets. Cheap to share behind an `Arc`;
/// holds no mutable state.
pub struct MediaPipeline {
    #[cfg(feature = "image")]
    images: ImageVariantGenerator,
    #[cfg(feature = "video")]
    videos: VideoTranscoder,
}

impl MediaPipeline {
    /// Local storage rooted at `config.media_path` and the ffmpeg encoder.
    pub async fn new(config: &Config) -> MediaResult<Self> {
        config
            .validate()
            .map_err(|e| MediaError::InvalidConfig(e.to_string()))?;
        let storage = LocalStorage::new(&config.media_path).await?;

        tracing::info!(
            media_path = %config.media_path.display(),
            scratch_dir = %config.scratch_dir.display(),
            "Media pipeline initialized"
        );

        let storage: Arc<dyn Storage> = Arc::new(storage);

        #[cfg(feature = "video")]
        let pipeline = Self::with_parts(
            storage,
            Arc::new(FfmpegEncoder::new(config.encoder.clone())?),
            config,
        );
        #[cfg(not(feature = "video"))]
        let pipeline = Self::with_parts(storage, config);

        Ok(pipeline)
    }

    pub fn with_parts(
        storage: Arc<dyn Storage>,
        #[cfg(feature = "video")] encoder: Arc<dyn Encoder>,
        config: &Config,
    ) -> Self {
        Self {
            #[cfg(feature = "image")]
            images: ImageVariantGenerator::new(storage.clone(), config.variants.clone()),
            #[cfg(feature = "video")]
            videos: VideoTranscoder::new(storage, encoder, config),
        }
    }

    /// Store `data` and its derivatives, returning what is now on disk.
    ///
    /// Either every variant is stored and a complete set is returned, or the
    /// call fails; an unsupported extension fails before storage is touched.
    #[tracing::instrument(skip(self, data, taken_at), fields(size_bytes = data.len()))]
    pub async fn ingest(
        &self,
        data: Bytes,
        filename: &str,
        owner_id: i64,
        taken_at: DateTime<Utc>,
    ) -> MediaResult<VariantSet> {
        match classify(filename) {
            #[cfg(feature = "image")]
            FormatClass::Image => {
                self.images
                    .process_image(data, filename, owner_id, taken_at)
                    .await
            }
            #[cfg(feature = "video")]
            FormatClass::Video => {
                self.videos
                    .process_video(data, filename, owner_id, taken_at)
                    .await
            }
            _ => {
                tracing::debug!(filename = %filename, "Rejected unsupported file");
                Err(MediaError::UnsupportedFormat {
                    filename: filename.to_string(),
                })
            }
        }
    }
}
