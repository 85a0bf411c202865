use bytes::Bytes;
use chrono::{DateTime, Utc};
use kin_core::{LogLevel, MediaError, MediaResult, VariantSet, WorkerConfig};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Semaphore};
use uuid::Uuid;

use crate::handler::IngestHandler;

/// One upload waiting to be ingested.
#[derive(Debug, Clone)]
pub struct IngestJob {
    pub id: Uuid,
    pub data: Bytes,
    pub filename: String,
    pub owner_id: i64,
    pub taken_at: DateTime<Utc>,
}

impl IngestJob {
    pub fn new(
        data: impl Into<Bytes>,
        filename: impl Into<String>,
        owner_id: i64,
        taken_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: data.into(),
            filename: filename.into(),
            owner_id,
            taken_at,
        }
    }
}

struct Envelope {
    job: IngestJob,
    reply: oneshot::Sender<MediaResult<VariantSet>>,
}

/// Resolves to the outcome of a submitted job.
#[derive(Debug)]
pub struct IngestHandle {
    job_id: Uuid,
    rx: oneshot::Receiver<MediaResult<VariantSet>>,
}

impl IngestHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Wait for the job to finish.
    ///
    /// Dropping the handle does not cancel the job; ingest is idempotent, so a
    /// finished job whose caller went away leaves consistent files behind.
    pub async fn wait(self) -> MediaResult<VariantSet> {
        self.rx.await.map_err(|_| MediaError::QueueClosed)?
    }
}

pub struct IngestQueue {
    tx: mpsc::Sender<Envelope>,
}

impl IngestQueue {
    /// Create a queue of `config.queue_size` jobs served by at most
    /// `config.max_concurrent_ingests` concurrent handlers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(handler: Arc<dyn IngestHandler>, config: &WorkerConfig) -> Self {
        let queue_size = config.queue_size.max(1);
        let max_concurrent = config.max_concurrent_ingests.max(1);

        let (tx, rx) = mpsc::channel(queue_size);

        tokio::spawn(async move {
            Self::worker_pool(rx, handler, max_concurrent).await;
        });

        tracing::info!(
            queue_size = queue_size,
            max_concurrent = max_concurrent,
            "Ingest queue initialized with bounded channel"
        );

        Self { tx }
    }

    /// Enqueue without waiting; fails with `QueueFull` when the channel is full.
    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, filename = %job.filename))]
    pub fn try_submit(&self, job: IngestJob) -> MediaResult<IngestHandle> {
        let (envelope, handle) = Self::envelope(job);

        self.tx.try_send(envelope).map_err(|e| match e {
            TrySendError::Full(_) => {
                tracing::warn!("Ingest queue is full, rejecting job");
                MediaError::QueueFull
            }
            TrySendError::Closed(_) => MediaError::QueueClosed,
        })?;

        tracing::debug!("Ingest job enqueued");
        Ok(handle)
    }

    /// Enqueue, waiting for room if the channel is full.
    #[tracing::instrument(skip(self, job), fields(job.id = %job.id, filename = %job.filename))]
    pub async fn submit(&self, job: IngestJob) -> MediaResult<IngestHandle> {
        let (envelope, handle) = Self::envelope(job);

        self.tx
            .send(envelope)
            .await
            .map_err(|_| MediaError::QueueClosed)?;

        tracing::debug!("Ingest job enqueued");
        Ok(handle)
    }

    /// Submit and wait for the result.
    pub async fn ingest(&self, job: IngestJob) -> MediaResult<VariantSet> {
        self.submit(job).await?.wait().await
    }

    fn envelope(job: IngestJob) -> (Envelope, IngestHandle) {
        let (reply, rx) = oneshot::channel();
        let handle = IngestHandle { job_id: job.id, rx };
        (Envelope { job, reply }, handle)
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<Envelope>,
        handler: Arc<dyn IngestHandler>,
        max_concurrent: usize,
    ) {
        let semaphore = Arc::new(Semaphore::new(max_concurrent));

        while let Some(envelope) = rx.recv().await {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let handler = handler.clone();

            tokio::spawn(async move {
                let _permit = permit;
                Self::process_job(envelope, handler).await;
            });
        }

        tracing::info!("Ingest worker pool stopped");
    }

    #[tracing::instrument(skip(envelope, handler), fields(
        job.id = %envelope.job.id,
        owner_id = envelope.job.owner_id,
        filename = %envelope.job.filename,
        job.status = tracing::field::Empty
    ))]
    async fn process_job(envelope: Envelope, handler: Arc<dyn IngestHandler>) {
        let start = std::time::Instant::now();
        let Envelope { job, reply } = envelope;

        let result = handler.handle(job).await;
        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;

        match &result {
            Ok(set) => {
                tracing::Span::current().record("job.status", "success");
                tracing::info!(
                    digest = %set.source_digest,
                    kind = %set.kind,
                    duration_ms = duration_ms,
                    "Ingest completed"
                );
            }
            Err(e) => {
                tracing::Span::current().record("job.status", "failed");
                match e.log_level() {
                    LogLevel::Debug => tracing::debug!(
                        error = %e,
                        error_code = e.error_code(),
                        duration_ms = duration_ms,
                        "Ingest rejected"
                    ),
                    LogLevel::Warn => tracing::warn!(
                        error = %e,
                        error_code = e.error_code(),
                        duration_ms = duration_ms,
                        "Ingest failed"
                    ),
                    LogLevel::Error => tracing::error!(
                        error = %e,
                        error_code = e.error_code(),
                        recoverable = e.is_recoverable(),
                        duration_ms = duration_ms,
                        "Ingest failed"
                    ),
                }
            }
        }

        if reply.send(result).is_err() {
            tracing::debug!("Ingest caller went away before the result was ready");
        }
    }
}

impl Clone for IngestQueue {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kin_core::{Dimensions, MediaKind, ProcessedVariant};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn variant_set(filename: &str) -> VariantSet {
        VariantSet {
            kind: MediaKind::Image,
            source_digest: filename.to_string(),
            original: ProcessedVariant {
                path: filename.to_string(),
                dimensions: Dimensions::new(10, 10),
                size_bytes: 1,
                digest: filename.to_string(),
            },
            medium: None,
            thumb: None,
            poster: None,
        }
    }

    /// Tracks how many jobs run at once; each job waits on `gate`.
    struct GatedHandler {
        gate: Semaphore,
        running: AtomicUsize,
        peak: AtomicUsize,
        handled: AtomicUsize,
    }

    impl GatedHandler {
        fn new(open: bool) -> Self {
            Self {
                gate: Semaphore::new(if open { Semaphore::MAX_PERMITS } else { 0 }),
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                handled: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IngestHandler for GatedHandler {
        async fn handle(&self, job: IngestJob) -> MediaResult<VariantSet> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let _pass = self.gate.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;

            self.running.fetch_sub(1, Ordering::SeqCst);
            self.handled.fetch_add(1, Ordering::SeqCst);

            if job.filename.ends_with(".txt") {
                return Err(MediaError::UnsupportedFormat {
                    filename: job.filename,
                });
            }
            Ok(variant_set(&job.filename))
        }
    }

    fn job(name: &str) -> IngestJob {
        IngestJob::new(Bytes::from_static(b"data"), name, 1, Utc::now())
    }

    fn config(max_concurrent_ingests: usize, queue_size: usize) -> WorkerConfig {
        WorkerConfig {
            max_concurrent_ingests,
            queue_size,
        }
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let handler = Arc::new(GatedHandler::new(true));
        let queue = IngestQueue::new(handler.clone(), &config(2, 16));

        let mut handles = Vec::new();
        for i in 0..8 {
            handles.push(queue.submit(job(&format!("{}.jpg", i))).await.unwrap());
        }
        for (i, handle) in handles.into_iter().enumerate() {
            let set = handle.wait().await.unwrap();
            assert_eq!(set.original.path, format!("{}.jpg", i));
        }

        assert_eq!(handler.handled.load(Ordering::SeqCst), 8);
        assert!(handler.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_try_submit_rejects_when_full() {
        let handler = Arc::new(GatedHandler::new(false));
        let queue = IngestQueue::new(handler.clone(), &config(1, 1));

        // At most one job runs, one waits for a permit and one sits in the channel.
        let mut accepted = Vec::new();
        let mut rejected = 0;
        for i in 0..10 {
            match queue.try_submit(job(&format!("{}.jpg", i))) {
                Ok(handle) => accepted.push(handle),
                Err(MediaError::QueueFull) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }

        assert!(rejected >= 7, "rejected only {}", rejected);
        assert!(accepted.len() <= 3);

        handler.gate.add_permits(100);
        let results = futures::future::join_all(accepted.into_iter().map(IngestHandle::wait)).await;
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_errors_reach_the_caller() {
        let handler = Arc::new(GatedHandler::new(true));
        let queue = IngestQueue::new(handler, &config(1, 4));

        let err = queue.ingest(job("notes.txt")).await.unwrap_err();
        assert!(matches!(err, MediaError::UnsupportedFormat { .. }));

        // The pool keeps serving after a failed job.
        assert!(queue.ingest(job("ok.jpg")).await.is_ok());
    }

    #[tokio::test]
    async fn test_handle_carries_job_id() {
        let handler = Arc::new(GatedHandler::new(true));
        let queue = IngestQueue::new(handler, &config(1, 4));

        let job = job("a.jpg");
        let id = job.id;
        let handle = queue.try_submit(job).unwrap();
        assert_eq!(handle.job_id(), id);
        assert!(handle.wait().await.is_ok());
    }
}
