//! In-process stand-in for ffmpeg used by unit tests.

use crate::video::encoder::Encoder;
use async_trait::async_trait;
use kin_core::{Dimensions, MediaError, MediaResult};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub(crate) struct FakeEncoder {
    pub probe_result: Option<Dimensions>,
    pub fail_transcode: bool,
    /// Produce no poster for offsets above this (simulates a very short clip).
    pub clip_length_secs: Option<f64>,
    pub probes: AtomicUsize,
    pub transcodes: AtomicUsize,
    pub posters: AtomicUsize,
    pub inputs: Mutex<Vec<PathBuf>>,
    pub poster_offsets: Mutex<Vec<f64>>,
    pub poster_inputs: Mutex<Vec<PathBuf>>,
}

impl FakeEncoder {
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            probe_result: Some(Dimensions::new(width, height)),
            ..Self::default()
        }
    }

    pub fn transcodes(&self) -> usize {
        self.transcodes.load(Ordering::SeqCst)
    }

    pub fn posters(&self) -> usize {
        self.posters.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<PathBuf> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn probe_dimensions(&self, input: &Path) -> MediaResult<Dimensions> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_path_buf());
        assert!(input.exists(), "probe input must exist");

        self.probe_result
            .ok_or_else(|| MediaError::ProbeParseMiss("fake encoder has no size".to_string()))
    }

    async fn transcode(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.transcodes.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(input.to_path_buf());

        if self.fail_transcode {
            // A real encoder may leave a partial file behind.
            tokio::fs::write(output, b"partial").await?;
            return Err(MediaError::EncoderFailure {
                operation: "transcode".to_string(),
                status: Some(1),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }

        let source = tokio::fs::read(input).await?;
        let mut encoded = b"fake-mp4:".to_vec();
        encoded.extend_from_slice(&source);
        tokio::fs::write(output, encoded).await?;
        Ok(())
    }

    async fn extract_poster(
        &self,
        input: &Path,
        output: &Path,
        offset_secs: f64,
        size: u32,
    ) -> MediaResult<()> {
        self.posters.fetch_add(1, Ordering::SeqCst);
        self.poster_offsets.lock().unwrap().push(offset_secs);
        self.poster_inputs.lock().unwrap().push(input.to_path_buf());
        assert!(input.exists(), "poster input must exist");

        if let Some(length) = self.clip_length_secs {
            if offset_secs >= length {
                return Ok(());
            }
        }

        tokio::fs::write(output, format!("fake-jpeg:{}x{}", size, size)).await?;
        Ok(())
    }
}
