use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reviewlens_common::ReviewLensError;

use crate::orchestrator::{AnalysisOrchestrator, AnalysisReport, AnalysisRequest};

/// Queued jobs allowed per worker before `submit` waits.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

pub type JobResult = Result<AnalysisReport, ReviewLensError>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum QueueError {
    #[error("Analysis queue is shut down")]
    Closed,
    #[error("Worker dropped the job before replying")]
    WorkerGone,
}

struct Job {
    request: AnalysisRequest,
    reply: oneshot::Sender<JobResult>,
}

/// Fixed pool of workers, each running one product analysis at a time.
/// Cross-product concurrency is bounded by the worker count.
pub struct AnalysisQueue {
    sender: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
}

impl AnalysisQueue {
    pub fn start(orchestrator: Arc<AnalysisOrchestrator>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(workers * QUEUE_DEPTH_PER_WORKER);
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers)
            .map(|worker| {
                let orchestrator = Arc::clone(&orchestrator);
                let receiver = Arc::clone(&receiver);
                tokio::spawn(async move { run_worker(worker, orchestrator, receiver).await })
            })
            .collect();

        info!(workers, "Analysis queue started");
        Self {
            sender,
            workers: handles,
        }
    }

    /// Enqueue a request. Waits while the queue is full; the returned
    /// receiver resolves when a worker finishes the analysis.
    pub async fn submit(
        &self,
        request: AnalysisRequest,
    ) -> Result<oneshot::Receiver<JobResult>, QueueError> {
        let (reply, receiver) = oneshot::channel();
        self.sender
            .send(Job { request, reply })
            .await
            .map_err(|_| QueueError::Closed)?;
        Ok(receiver)
    }

    /// Submit and wait for the result.
    pub async fn run(&self, request: AnalysisRequest) -> Result<JobResult, QueueError> {
        self.submit(request)
            .await?
            .await
            .map_err(|_| QueueError::WorkerGone)
    }

    /// Stop accepting work, let queued jobs finish, and join every worker.
    pub async fn shutdown(self) {
        drop(self.sender);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Analysis worker ended abnormally");
            }
        }
        info!("Analysis queue stopped");
    }
}

async fn run_worker(
    worker: usize,
    orchestrator: Arc<AnalysisOrchestrator>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!(worker, "Queue closed, worker exiting");
            return;
        };

        debug!(worker, asin = %job.request.asin, "Worker picked up job");
        let result = orchestrator.analyze(job.request).await;
        if job.reply.send(result).is_err() {
            debug!(worker, "Submitter stopped waiting for result");
        }
    }
}
