//! Configuration module
//!
//! Configuration is read from the environment (and a `.env` file when present).
//! Variant sizes and qualities live here rather than being baked into the
//! generators so a deployment can tune its storage/quality tradeoff.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::constants::{MEDIUM_QUALITY, MEDIUM_WIDTH, THUMB_QUALITY, THUMB_SIZE};

// Common constants
const MEDIA_PATH: &str = "./media";
const POSTER_OFFSET_SECS: f64 = 1.0;
const VIDEO_CRF: u8 = 23;
const VIDEO_PRESET: &str = "medium";
const AUDIO_BITRATE: &str = "128k";
const ENCODER_TIMEOUT_SECS: u64 = 3600;
const PROBE_TIMEOUT_SECS: u64 = 30;
const MAX_CONCURRENT_INGESTS: usize = 2;
const INGEST_QUEUE_SIZE: usize = 100;

/// Sizes and qualities of the image derivatives (and the video poster).
#[derive(Clone, Debug, PartialEq)]
pub struct VariantConfig {
    pub thumb_size: u32,
    pub thumb_quality: u8,
    /// Sources wider than this get a medium derivative capped at this width.
    pub medium_width: u32,
    pub medium_quality: u8,
}

impl Default for VariantConfig {
    fn default() -> Self {
        Self {
            thumb_size: THUMB_SIZE,
            thumb_quality: THUMB_QUALITY,
            medium_width: MEDIUM_WIDTH,
            medium_quality: MEDIUM_QUALITY,
        }
    }
}

/// External encoder settings.
#[derive(Clone, Debug, PartialEq)]
pub struct EncoderConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub video_crf: u8,
    pub video_preset: String,
    pub audio_bitrate: String,
    pub poster_offset_secs: f64,
    pub encoder_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl EncoderConfig {
    pub fn encoder_timeout(&self) -> Duration {
        Duration::from_secs(self.encoder_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            video_crf: VIDEO_CRF,
            video_preset: VIDEO_PRESET.to_string(),
            audio_bitrate: AUDIO_BITRATE.to_string(),
            poster_offset_secs: POSTER_OFFSET_SECS,
            encoder_timeout_secs: ENCODER_TIMEOUT_SECS,
            probe_timeout_secs: PROBE_TIMEOUT_SECS,
        }
    }
}

/// Bounds for the ingest worker pool.
#[derive(Clone, Debug, PartialEq)]
pub struct WorkerConfig {
    pub max_concurrent_ingests: usize,
    pub queue_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_ingests: MAX_CONCURRENT_INGESTS,
            queue_size: INGEST_QUEUE_SIZE,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Root directory every storage path is relative to
    pub media_path: PathBuf,
    /// Where videos are buffered to disk for the encoder
    pub scratch_dir: PathBuf,
    pub variants: VariantConfig,
    pub encoder: EncoderConfig,
    pub worker: WorkerConfig,
    pub environment: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            media_path: PathBuf::from(MEDIA_PATH),
            scratch_dir: env::temp_dir(),
            variants: VariantConfig::default(),
            encoder: EncoderConfig::default(),
            worker: WorkerConfig::default(),
            environment: "development".to_string(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or(defaults.environment);

        let variants = VariantConfig {
            thumb_size: env_or("THUMB_SIZE", THUMB_SIZE),
            thumb_quality: env_or("THUMB_QUALITY", THUMB_QUALITY),
            medium_width: env_or("MEDIUM_WIDTH", MEDIUM_WIDTH),
            medium_quality: env_or("MEDIUM_QUALITY", MEDIUM_QUALITY),
        };

        let encoder = EncoderConfig {
            ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            video_crf: env_or("VIDEO_CRF", VIDEO_CRF),
            video_preset: env::var("VIDEO_PRESET").unwrap_or_else(|_| VIDEO_PRESET.to_string()),
            audio_bitrate: env::var("AUDIO_BITRATE").unwrap_or_else(|_| AUDIO_BITRATE.to_string()),
            poster_offset_secs: env_or("POSTER_OFFSET_SECS", POSTER_OFFSET_SECS),
            encoder_timeout_secs: env_or("ENCODER_TIMEOUT_SECS", ENCODER_TIMEOUT_SECS),
            probe_timeout_secs: env_or("PROBE_TIMEOUT_SECS", PROBE_TIMEOUT_SECS),
        };

        let worker = WorkerConfig {
            max_concurrent_ingests: env_or("MAX_CONCURRENT_INGESTS", MAX_CONCURRENT_INGESTS),
            queue_size: env_or("INGEST_QUEUE_SIZE", INGEST_QUEUE_SIZE),
        };

        let config = Config {
            media_path: env::var("MEDIA_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.media_path),
            scratch_dir: env::var("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.scratch_dir),
            variants,
            encoder,
            worker,
            environment,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.media_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("MEDIA_PATH must not be empty"));
        }

        if self.variants.thumb_size == 0 {
            return Err(anyhow::anyhow!("THUMB_SIZE must be greater than 0"));
        }

        if self.variants.medium_width == 0 {
            return Err(anyhow::anyhow!("MEDIUM_WIDTH must be greater than 0"));
        }

        for (name, quality) in [
            ("THUMB_QUALITY", self.variants.thumb_quality),
            ("MEDIUM_QUALITY", self.variants.medium_quality),
        ] {
            if !(1..=100).contains(&quality) {
                return Err(anyhow::anyhow!("{} must be between 1 and 100", name));
            }
        }

        if self.encoder.video_crf > 51 {
            return Err(anyhow::anyhow!("VIDEO_CRF must be between 0 and 51"));
        }

        if !self.encoder.poster_offset_secs.is_finite() || self.encoder.poster_offset_secs < 0.0 {
            return Err(anyhow::anyhow!(
                "POSTER_OFFSET_SECS must be a non-negative number"
            ));
        }

        if self.encoder.encoder_timeout_secs == 0 || self.encoder.probe_timeout_secs == 0 {
            return Err(anyhow::anyhow!(
                "ENCODER_TIMEOUT_SECS and PROBE_TIMEOUT_SECS must be greater than 0"
            ));
        }

        if self.worker.max_concurrent_ingests == 0 {
            return Err(anyhow::anyhow!(
                "MAX_CONCURRENT_INGESTS must be greater than 0"
            ));
        }

        if self.worker.queue_size == 0 {
            return Err(anyhow::anyhow!("INGEST_QUEUE_SIZE must be greater than 0"));
        }

        Ok(())
    }
}
