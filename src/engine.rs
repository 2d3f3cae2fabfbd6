// Copyright (c) 2018 10x Genomics, Inc. All rights reserved.

//! Bounded-concurrency execution of per-sample tasks.
//!
//! Tasks are queued on a channel and picked up by a fixed number of worker
//! threads. The orchestrating thread polls the task states, merges the result
//! map of every successful task into the run data, and stops everything on
//! the first failure: queued tasks are never started, running tasks are asked
//! to stop through a [`CancelToken`], and the failure is returned with its
//! original cause.

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info, warn};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::errors::{QcError, Result};
use crate::run_data::RunData;

/// Shared flag asking running tasks to stop early.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail when cancellation was requested. Long running tasks call this
    /// between units of work.
    pub fn check(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("task cancelled");
        }
        Ok(())
    }
}

/// What a task produced.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The task's private result map, to be merged into the run data.
    Completed(RunData),
    /// The task had nothing to do; it contributes no data.
    Skipped(String),
}

/// A unit of work run on a worker thread.
pub trait ProcessingTask: Send {
    /// Short description used in logs and errors, e.g. `read1/lane2/S2`.
    fn label(&self) -> String;

    fn run(&mut self, cancel: &CancelToken) -> anyhow::Result<TaskOutcome>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    Submitted,
    Running,
    Succeeded,
    Skipped,
    Failed,
    /// Never started, or interrupted by an abort.
    Cancelled,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, TaskStatus::Submitted | TaskStatus::Running)
    }
}

#[derive(Debug)]
struct Slot {
    status: TaskStatus,
    result: Option<anyhow::Result<TaskOutcome>>,
}

type SharedSlot = Arc<Mutex<Slot>>;

fn lock(slot: &SharedSlot) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Observer of one submitted task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: usize,
    label: String,
    slot: SharedSlot,
}

impl TaskHandle {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn status(&self) -> TaskStatus {
        lock(&self.slot).status
    }
}

struct Job {
    label: String,
    task: Box<dyn ProcessingTask>,
    slot: SharedSlot,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    pub threads: usize,
    pub poll_interval: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for EngineSettings {
    fn from(c: &EngineConfig) -> Self {
        EngineSettings {
            threads: c.thread_count().max(1),
            poll_interval: c.poll_interval(),
            shutdown_timeout: c.shutdown_timeout(),
        }
    }
}

/// Summary of a completed `run_all`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineReport {
    /// Number of task result maps merged into the run data.
    pub merged: usize,
    /// Label and reason of every skipped task.
    pub skipped: Vec<(String, String)>,
}

/// State shared between the orchestrator and the workers.
struct Shared {
    /// Set once the run is aborted. Workers hold the read lock while moving a
    /// task to `Running`, so no task starts after the write lock set it.
    aborted: RwLock<bool>,
    cancel: CancelToken,
}

impl Shared {
    fn is_aborted(&self) -> bool {
        *self.aborted.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the abort flag. Returns `true` for the first caller only.
    fn abort(&self) -> bool {
        let mut aborted = self.aborted.write().unwrap_or_else(PoisonError::into_inner);
        let first = !*aborted;
        *aborted = true;
        self.cancel.cancel();
        first
    }
}

pub struct Engine {
    settings: EngineSettings,
    sender: Option<Sender<Job>>,
    receiver: Receiver<Job>,
    workers: Vec<JoinHandle<()>>,
    handles: Vec<TaskHandle>,
    shared: Arc<Shared>,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Engine {
        let (sender, receiver) = unbounded();
        Engine {
            settings,
            sender: Some(sender),
            receiver,
            workers: Vec::new(),
            handles: Vec::new(),
            shared: Arc::new(Shared {
                aborted: RwLock::new(false),
                cancel: CancelToken::new(),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn handles(&self) -> &[TaskHandle] {
        &self.handles
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.is_aborted()
    }

    /// Queue a task. Fails once the engine was aborted or `run_all` started.
    pub fn submit(&mut self, task: Box<dyn ProcessingTask>) -> Result<TaskHandle> {
        if self.is_aborted() {
            return Err(QcError::config("cannot submit a task: processing was aborted"));
        }
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| QcError::config("cannot submit a task: processing already started"))?;

        let label = task.label();
        let slot = Arc::new(Mutex::new(Slot {
            status: TaskStatus::Submitted,
            result: None,
        }));
        let handle = TaskHandle {
            id: self.handles.len(),
            label: label.clone(),
            slot: slot.clone(),
        };

        sender
            .send(Job { label, task, slot })
            .map_err(|_| QcError::config("cannot submit a task: workers are gone"))?;
        self.handles.push(handle.clone());

        if self.workers.len() < self.settings.threads && self.workers.len() < self.handles.len() {
            self.spawn_worker()?;
        }

        Ok(handle)
    }

    fn spawn_worker(&mut self) -> Result<()> {
        let receiver = self.receiver.clone();
        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name(format!("qc-worker-{}", self.workers.len()))
            .spawn(move || worker_loop(receiver, shared))?;
        self.workers.push(worker);
        Ok(())
    }

    /// Wait for every submitted task, merging successful results into `data`
    /// as they are discovered. A poll merges every result that completed
    /// before it; if the poll also found a failure, the remaining work is
    /// then cancelled and the failure is returned. Merged results stay in
    /// `data`.
    pub fn run_all(&mut self, data: &mut RunData) -> Result<EngineReport> {
        let mut report = EngineReport::default();
        self.sender = None;

        if self.handles.is_empty() {
            return Ok(report);
        }

        let start = Instant::now();
        info!(
            "processing {} tasks on {} threads",
            self.handles.len(),
            self.workers.len()
        );

        loop {
            std::thread::sleep(self.settings.poll_interval);

            let mut pending = 0;
            let mut failure = None;
            for handle in &self.handles {
                let mut slot = lock(&handle.slot);
                match slot.result.take() {
                    Some(Ok(TaskOutcome::Completed(result))) => {
                        debug!("merging {} values from {}", result.len(), handle.label);
                        data.merge(result);
                        report.merged += 1;
                    }
                    Some(Ok(TaskOutcome::Skipped(reason))) => {
                        debug!("{} skipped: {}", handle.label, reason);
                        report.skipped.push((handle.label.clone(), reason));
                    }
                    Some(Err(err)) => {
                        // Results found later in this scan are still merged.
                        if failure.is_none() {
                            failure = Some((handle.label.clone(), err));
                        }
                    }
                    None => {
                        if !slot.status.is_finished() {
                            pending += 1;
                        }
                    }
                }
            }

            if let Some((item, err)) = failure {
                warn!("{} failed: {:#}", item, err);
                self.abort();
                return Err(QcError::Task {
                    item,
                    source: err.into(),
                });
            }

            if pending == 0 {
                break;
            }
        }

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("a worker thread panicked");
            }
        }

        info!(
            "{} tasks processed in {:.1}s ({} skipped)",
            self.handles.len(),
            start.elapsed().as_secs_f64(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Stop accepting work, cancel queued tasks, signal running ones and wait
    /// up to the shutdown timeout for the workers to finish.
    pub fn abort(&mut self) {
        self.shared.abort();
        self.sender = None;

        while let Ok(job) = self.receiver.try_recv() {
            lock(&job.slot).status = TaskStatus::Cancelled;
            debug!("{} cancelled before start", job.label);
        }

        let deadline = Instant::now() + self.settings.shutdown_timeout;
        let step = self.settings.poll_interval.min(Duration::from_millis(50));
        while self.workers.iter().any(|w| !w.is_finished()) && Instant::now() < deadline {
            std::thread::sleep(step);
        }

        let mut detached = 0;
        for worker in self.workers.drain(..) {
            if worker.is_finished() {
                if worker.join().is_err() {
                    debug!("an aborted worker thread panicked");
                }
            } else {
                detached += 1;
            }
        }
        if detached > 0 {
            warn!(
                "{} worker threads still running after {:?}, detaching them",
                detached, self.settings.shutdown_timeout
            );
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shared.abort();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn worker_loop(receiver: Receiver<Job>, shared: Arc<Shared>) {
    while let Ok(mut job) = receiver.recv() {
        {
            let aborted = shared.aborted.read().unwrap_or_else(PoisonError::into_inner);
            let mut slot = lock(&job.slot);
            if *aborted {
                slot.status = TaskStatus::Cancelled;
                continue;
            }
            slot.status = TaskStatus::Running;
        }

        debug!("starting {}", job.label);
        let result = catch_unwind(AssertUnwindSafe(|| job.task.run(&shared.cancel)))
            .unwrap_or_else(|payload| {
                Err(anyhow::anyhow!("task panicked: {}", panic_message(payload.as_ref())))
            });

        match result {
            Ok(outcome) => {
                let mut slot = lock(&job.slot);
                slot.status = match outcome {
                    TaskOutcome::Completed(_) => TaskStatus::Succeeded,
                    TaskOutcome::Skipped(_) => TaskStatus::Skipped,
                };
                slot.result = Some(Ok(outcome));
            }
            Err(err) => {
                // Only the failure that triggers the abort is reported; tasks
                // failing afterwards were interrupted by it.
                let first = shared.abort();
                let mut slot = lock(&job.slot);
                if first {
                    slot.status = TaskStatus::Failed;
                    slot.result = Some(Err(err));
                } else {
                    debug!("{} interrupted: {:#}", job.label, err);
                    slot.status = TaskStatus::Cancelled;
                }
            }
        }
    }
}
