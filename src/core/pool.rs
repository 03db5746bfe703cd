//! # Worker Pool Module / 工作者池模块
//!
//! A fixed number of workers drain one shared queue. The dispatcher pushes
//! every job first and then exactly one stop sentinel per worker, so each
//! worker sees a sentinel only after all real work has been claimed.
//!
//! 固定数量的工作者从一个共享队列中取任务。分发器先推入所有任务，
//! 然后为每个工作者推入恰好一个停止哨兵，因此每个工作者只会在所有真实任务被领取后才看到哨兵。

use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

use crate::core::config::UnexpectedErrorPolicy;
use crate::core::error::error_chain;
use crate::core::execution::JobExecutor;
use crate::core::models::{JobDescriptor, JobOutcome};
use crate::infra::command::CommandRunner;
use crate::reporting::console;

/// An entry in the shared queue.
/// 共享队列中的一项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Job(JobDescriptor),
    /// No more work for the worker that pops this / 弹出此项的工作者不再有工作
    Stop,
}

/// Multi-consumer FIFO with blocking pop.
///
/// `pop` holds the receiver lock while waiting, so exactly one waiting worker
/// receives each item.
///
/// 具有阻塞弹出语义的多消费者 FIFO 队列。
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: mpsc::UnboundedSender<QueueItem>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<QueueItem>>>,
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Arc::new(Mutex::new(receiver)),
        }
    }

    pub fn push(&self, item: QueueItem) -> Result<()> {
        self.sender
            .send(item)
            .map_err(|_| anyhow!("Job queue receiver was dropped"))
    }

    /// Waits for the next item. `None` only if every sender is gone and the
    /// queue is empty.
    pub async fn pop(&self) -> Option<QueueItem> {
        self.receiver.lock().await.recv().await
    }
}

/// Pushes all jobs, then one stop sentinel per worker. Order matters: a
/// sentinel ahead of a job would let a worker quit while work remained.
///
/// # Returns
/// The number of sentinels pushed.
pub fn dispatch(queue: &JobQueue, jobs: Vec<JobDescriptor>, workers: usize) -> Result<usize> {
    for job in jobs {
        queue.push(QueueItem::Job(job))?;
    }
    for _ in 0..workers {
        queue.push(QueueItem::Stop)?;
    }
    Ok(workers)
}

/// Lifecycle of one worker.
/// 单个工作者的生命周期。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Executing,
    Stopped,
}

/// What a worker did before it stopped.
/// 工作者停止前的执行情况。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: usize,
    pub state: WorkerState,
    pub jobs_executed: usize,
    pub sentinels_seen: usize,
    /// Set when the worker stopped on an unexpected error under the `abort` policy.
    pub fatal_error: Option<String>,
}

impl WorkerReport {
    fn new(id: usize) -> Self {
        Self {
            id,
            state: WorkerState::Idle,
            jobs_executed: 0,
            sentinels_seen: 0,
            fatal_error: None,
        }
    }
}

/// One consumer of the shared queue.
pub struct Worker<R> {
    id: usize,
    queue: JobQueue,
    executor: Arc<JobExecutor<R>>,
    outcomes: mpsc::UnboundedSender<JobOutcome>,
    policy: UnexpectedErrorPolicy,
}

impl<R: CommandRunner> Worker<R> {
    pub fn new(
        id: usize,
        queue: JobQueue,
        executor: Arc<JobExecutor<R>>,
        outcomes: mpsc::UnboundedSender<JobOutcome>,
        policy: UnexpectedErrorPolicy,
    ) -> Self {
        Self {
            id,
            queue,
            executor,
            outcomes,
            policy,
        }
    }

    /// Idle -> Executing -> Idle until a sentinel arrives, then Stopped.
    /// Job failures are reported and the loop continues.
    pub async fn run(self) -> WorkerReport {
        let mut report = WorkerReport::new(self.id);
        loop {
            report.state = WorkerState::Idle;
            let job = match self.queue.pop().await {
                Some(QueueItem::Job(job)) => job,
                Some(QueueItem::Stop) => {
                    report.sentinels_seen += 1;
                    break;
                }
                None => break,
            };

            report.state = WorkerState::Executing;
            let (outcome, error) = self.executor.run_job(job).await;
            report.jobs_executed += 1;
            console::report_outcome(&outcome);
            // The pool keeps the receiving end alive for the whole run.
            let _ = self.outcomes.send(outcome);

            if let Some(error) = error {
                if error.is_unexpected() && self.policy == UnexpectedErrorPolicy::Abort {
                    report.fatal_error = Some(error_chain(&error));
                    break;
                }
            }
        }
        report.state = WorkerState::Stopped;
        report
    }
}

/// Outcomes and per-worker reports of a drained queue.
#[derive(Debug)]
pub struct PoolReport {
    pub outcomes: Vec<JobOutcome>,
    pub workers: Vec<WorkerReport>,
    pub sentinels_pushed: usize,
}

/// Enqueues `jobs`, starts `concurrency` workers and waits until every one of
/// them has stopped.
///
/// 将 `jobs` 入队，启动 `concurrency` 个工作者，并等待所有工作者停止。
pub async fn run_pool<R: CommandRunner>(
    executor: Arc<JobExecutor<R>>,
    jobs: Vec<JobDescriptor>,
    concurrency: usize,
    policy: UnexpectedErrorPolicy,
) -> Result<PoolReport> {
    let queue = JobQueue::new();
    let sentinels_pushed = dispatch(&queue, jobs, concurrency)?;

    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let handles: Vec<_> = (0..concurrency)
        .map(|id| {
            let worker = Worker::new(
                id,
                queue.clone(),
                Arc::clone(&executor),
                outcome_tx.clone(),
                policy,
            );
            tokio::spawn(worker.run())
        })
        .collect();

    // Drop the pool's sender so the outcome channel closes when workers finish.
    drop(outcome_tx);

    let mut workers = Vec::with_capacity(concurrency);
    for (id, result) in futures::future::join_all(handles).await.into_iter().enumerate() {
        workers.push(result.with_context(|| format!("Worker {id} panicked"))?);
    }

    let mut outcomes = Vec::new();
    while let Some(outcome) = outcome_rx.recv().await {
        outcomes.push(outcome);
    }

    Ok(PoolReport {
        outcomes,
        workers,
        sentinels_pushed,
    })
}
