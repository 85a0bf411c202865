//! Ingest handler trait
//!
//! The queue calls `handle` for every job it runs. [`MediaPipeline`] is the
//! production implementation; tests substitute their own.

use async_trait::async_trait;
use kin_core::{MediaResult, VariantSet};
use kin_processing::MediaPipeline;

use crate::queue::IngestJob;

#[async_trait]
pub trait IngestHandler: Send + Sync + 'static {
    async fn handle(&self, job: IngestJob) -> MediaResult<VariantSet>;
}

#[async_trait]
impl IngestHandler for MediaPipeline {
    async fn handle(&self, job: IngestJob) -> MediaResult<VariantSet> {
        self.ingest(job.data, &job.filename, job.owner_id, job.taken_at)
            .await
    }
}
