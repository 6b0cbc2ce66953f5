//! Single-worker queue for post-response work. Jobs run one at a time in
//! submission order; a failing or panicking job is logged and skipped.

use anyhow::Result;
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

struct Job {
    name: &'static str,
    future: JobFuture,
}

pub struct BackgroundQueue {
    tx: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl BackgroundQueue {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));
        let worker = tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match AssertUnwindSafe(job.future).catch_unwind().await {
                    Ok(Ok(())) => tracing::trace!(job = job.name, "Background job done"),
                    Ok(Err(e)) => tracing::warn!(job = job.name, "Background job failed: {:#}", e),
                    Err(_) => tracing::warn!(job = job.name, "Background job panicked"),
                }
            }
            tracing::debug!("Background queue drained");
        });
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a job. Waits only while the queue is full; returns false after shutdown.
    pub async fn submit<F>(&self, name: &'static str, future: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let Some(tx) = lock(&self.tx).clone() else {
            tracing::warn!(job = name, "Background queue is shut down, dropping job");
            return false;
        };
        let job = Job {
            name,
            future: Box::pin(future),
        };
        if tx.send(job).await.is_err() {
            tracing::warn!(job = name, "Background worker is gone, dropping job");
            return false;
        }
        true
    }

    /// Resolve once every job submitted before this call has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        let queued = self
            .submit("flush", async move {
                let _ = done_tx.send(());
                Ok(())
            })
            .await;
        if queued {
            let _ = done_rx.await;
        }
    }

    /// Stop accepting jobs and wait for the queued ones to finish.
    pub async fn shutdown(&self) {
        drop(lock(&self.tx).take());
        let worker = lock(&self.worker).take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::warn!("Background worker ended abnormally: {}", e);
            }
        }
    }
}
