//! Video transcoder - normalized MP4 original plus a square poster frame

use crate::format::extension;
use crate::hashing::{digest, digest_file};
use crate::video::encoder::Encoder;
use crate::video::scratch::ScratchFile;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use kin_core::constants::NORMALIZED_VIDEO_EXT;
use kin_core::{Config, Dimensions, MediaError, MediaKind, MediaResult, ProcessedVariant, VariantSet};
use kin_storage::{derive_paths, poster_path, Storage};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct VideoTranscoder {
    storage: Arc<dyn Storage>,
    encoder: Arc<dyn Encoder>,
    scratch_dir: PathBuf,
    poster_size: u32,
    poster_offset_secs: f64,
}

impl VideoTranscoder {
    pub fn new(storage: Arc<dyn Storage>, encoder: Arc<dyn Encoder>, config: &Config) -> Self {
        Self {
            storage,
            encoder,
            scratch_dir: config.scratch_dir.clone(),
            poster_size: config.variants.thumb_size,
            poster_offset_secs: config.encoder.poster_offset_secs,
        }
    }

    /// Store an uploaded video as a normalized MP4 with a poster frame.
    ///
    /// The upload is buffered to a scratch file that is removed on every exit
    /// path. Outputs that already exist are not re-encoded.
    #[tracing::instrument(skip(self, data, taken_at), fields(size_bytes = data.len()))]
    pub async fn process_video(
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
        let paths = derive_paths(owner_id, taken_at, &source_digest, NORMALIZED_VIDEO_EXT);
        let poster = poster_path(owner_id, taken_at, &source_digest);

        let scratch = ScratchFile::create(&self.scratch_dir, &source_digest, &ext, &data).await?;
        let result = self
            .encode_and_store(scratch.path(), &paths.original, &poster)
            .await;
        scratch.remove().await;
        let (original, poster) = result?;

        tracing::info!(
            owner_id = owner_id,
            digest = %source_digest,
            dimensions = %original.dimensions,
            original_size_bytes = original.size_bytes,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Video variants stored"
        );

        Ok(VariantSet {
            kind: MediaKind::Video,
            source_digest,
            original,
            medium: None,
            thumb: None,
            poster: Some(poster),
        })
    }

    async fn encode_and_store(
        &self,
        source: &Path,
        original_path: &str,
        poster_path: &str,
    ) -> MediaResult<(ProcessedVariant, ProcessedVariant)> {
        let dimensions = match self.encoder.probe_dimensions(source).await {
            Ok(dimensions) => dimensions,
            Err(MediaError::ProbeParseMiss(reason)) => {
                tracing::warn!(
                    error_code = "PROBE_PARSE_MISS",
                    reason = %reason,
                    "Video dimensions unknown, continuing"
                );
                Dimensions::UNKNOWN
            }
            Err(e) => return Err(e),
        };

        if !self.storage.exists(original_path).await? {
            let staged = self.storage.stage(original_path).await?;
            let encoded = self.encoder.transcode(source, &staged).await;
            self.publish(encoded, &staged, original_path).await?;
        } else {
            tracing::debug!(path = %original_path, "Normalized video already stored");
        }

        let original_local = self.storage.local_path(original_path)?;
        let original = ProcessedVariant {
            path: original_path.to_string(),
            dimensions,
            size_bytes: self.storage.content_length(original_path).await?,
            digest: digest_file(&original_local).await?,
        };

        if !self.storage.exists(poster_path).await? {
            let staged = self.storage.stage(poster_path).await?;
            let rendered = self.render_poster(&original_local, &staged).await;
            self.publish(rendered, &staged, poster_path).await?;
        } else {
            tracing::debug!(path = %poster_path, "Poster already stored");
        }

        let poster_bytes = self.storage.read(poster_path).await?;
        let poster = ProcessedVariant {
            path: poster_path.to_string(),
            dimensions: Dimensions::square(self.poster_size),
            size_bytes: poster_bytes.len() as u64,
            digest: digest(&poster_bytes),
        };

        Ok((original, poster))
    }

    /// Extract the poster from the normalized file, retrying at the first frame
    /// when the configured offset is past the end of the clip.
    async fn render_poster(&self, video: &Path, staged: &Path) -> MediaResult<()> {
        self.encoder
            .extract_poster(video, staged, self.poster_offset_secs, self.poster_size)
            .await?;
        if has_content(staged).await {
            return Ok(());
        }

        if self.poster_offset_secs > 0.0 {
            tracing::debug!(
                offset_secs = self.poster_offset_secs,
                "No frame at poster offset, retrying at start of clip"
            );
            self.encoder
                .extract_poster(video, staged, 0.0, self.poster_size)
                .await?;
            if has_content(staged).await {
                return Ok(());
            }
        }

        Err(MediaError::EncoderFailure {
            operation: "poster".to_string(),
            status: None,
            stderr: "encoder produced no poster frame".to_string(),
        })
    }

    /// Commit a staged encoder output, or discard it when the encoder failed.
    async fn publish(&self, encoded: MediaResult<()>, staged: &Path, path: &str) -> MediaResult<()> {
        if let Err(e) = encoded {
            self.storage.discard(staged).await;
            return Err(e);
        }

        if let Err(e) = self.storage.commit(staged, path).await {
            self.storage.discard(staged).await;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn has_content(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|meta| meta.len() > 0)
        .unwrap_or(false)
}
