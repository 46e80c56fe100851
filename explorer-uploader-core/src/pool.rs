//! Bounded pool of uploader workers draining one shared queue.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, info_span, Instrument};

use crate::contract::{ObjectStore, UploadJob};

/// Queue slots per worker.
pub const QUEUE_DEPTH_PER_WORKER: usize = 4;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct UploaderPool {
    sender: mpsc::Sender<UploadJob>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl UploaderPool {
    /// Starts `workers` uploader tasks. A request for zero workers starts one.
    pub fn spawn(store: Arc<dyn ObjectStore>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel(workers * QUEUE_DEPTH_PER_WORKER);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers)
            .map(|index| {
                let name = format!("uploader-{index}");
                let span = info_span!("uploader", worker = %name);
                tokio::spawn(
                    work(store.clone(), receiver.clone(), counters.clone()).instrument(span),
                )
            })
            .collect();

        Self {
            sender,
            workers: handles,
            counters,
        }
    }

    /// Queues a job, waiting while the queue is full.
    pub async fn submit(&self, job: UploadJob) {
        // Workers only exit once the sender is dropped, so the channel stays open here.
        if let Err(e) = self.sender.send(job).await {
            error!(key = %e.0.key, "upload queue closed, job dropped");
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Closes the queue and waits until every queued job has been attempted.
    pub async fn finish(self) -> PoolReport {
        let UploaderPool {
            sender,
            workers,
            counters,
        } = self;
        drop(sender);
        for result in join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "uploader task panicked");
            }
        }
        PoolReport {
            succeeded: counters.succeeded.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
        }
    }
}

async fn work(
    store: Arc<dyn ObjectStore>,
    queue: Arc<Mutex<mpsc::Receiver<UploadJob>>>,
    counters: Arc<Counters>,
) {
    let bucket = store.bucket();
    loop {
        // Hold the lock only while waiting for the next job.
        let next = queue.lock().await.recv().await;
        let Some(job) = next else {
            return;
        };
        match store.put_file(&job.path, &job.key).await {
            Ok(()) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                info!(path = %job.path.display(), key = %job.key, bucket = %bucket, "uploaded");
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    path = %job.path.display(),
                    key = %job.key,
                    bucket = %bucket,
                    error = %e,
                    "upload failed"
                );
            }
        }
    }
}
