// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! FIFO job queue driving a single job at a time.

use crate::job::{Job, JobObserver, JobOutcome};
use jobrunner_core::{JobId, SharedContext, Step, StepProgress};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

/// What to enqueue: a single step, or a named sequence of steps run as
/// a composite job.
pub enum StepSpec<C> {
    Single(Arc<dyn Step<C>>),
    Composite { name: String, steps: Vec<Arc<dyn Step<C>>> },
}

/// Configuration for one call to [`JobScheduler::enqueue`].
pub struct JobConfig<C> {
    pub steps: StepSpec<C>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    pub auto_cleanup: bool,
    pub fail_on_busy: bool,
}

impl<C> JobConfig<C> {
    pub fn single(step: Arc<dyn Step<C>>) -> Self {
        Self {
            steps: StepSpec::Single(step),
            timeout: None,
            max_retries: None,
            auto_cleanup: true,
            fail_on_busy: false,
        }
    }

    pub fn composite(name: impl Into<String>, steps: Vec<Arc<dyn Step<C>>>) -> Self {
        Self {
            steps: StepSpec::Composite { name: name.into(), steps },
            timeout: None,
            max_retries: None,
            auto_cleanup: true,
            fail_on_busy: false,
        }
    }

    jobrunner_core::setters! {
        set { auto_cleanup: bool, fail_on_busy: bool }
        option { timeout: Duration, max_retries: u32 }
    }
}

/// Hooks fired as jobs move through the queue.
pub trait SchedulerObserver<C>: Send + Sync {
    fn on_pushed(&self, _job: &Arc<Job<C>>) {}
    fn on_progress(&self, _job: &Arc<Job<C>>, _progress: &StepProgress) {}
    fn on_completed(&self, _job: &Arc<Job<C>>, _outcome: &JobOutcome) {}
}

/// Forwards a composite job's internal progress events to the
/// scheduler's own observers. Holds only a `Weak` back-reference to the
/// job it reports on, so the forwarder registered on a job's own
/// observer list never keeps that job alive.
struct ProgressForwarder<C> {
    job: Weak<Job<C>>,
    observers: Arc<Mutex<Vec<Arc<dyn SchedulerObserver<C>>>>>,
}

impl<C: Send + Sync + 'static> JobObserver<C> for ProgressForwarder<C> {
    fn on_progress(&self, _job_id: &JobId, progress: &StepProgress) {
        let Some(job) = self.job.upgrade() else { return };
        for observer in self.observers.lock().iter() {
            observer.on_progress(&job, progress);
        }
    }
}

/// Runs at most one job at a time, draining a FIFO queue.
///
/// `enqueue` only appends to the queue (or returns `None` if
/// `fail_on_busy` is set and a job is already running); `process_queue`
/// is what actually starts the head job. A caller that wants the
/// scheduler to keep draining itself wires `on_pushed`/`on_completed`
/// back to `process_queue`.
pub struct JobScheduler<C> {
    ctx: SharedContext<C>,
    queue: Mutex<VecDeque<(Arc<Job<C>>, bool)>>,
    running: Mutex<bool>,
    observers: Arc<Mutex<Vec<Arc<dyn SchedulerObserver<C>>>>>,
}

impl<C> JobScheduler<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(ctx: SharedContext<C>) -> Self {
        Self {
            ctx,
            queue: Mutex::new(VecDeque::new()),
            running: Mutex::new(false),
            observers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn add_observer(&self, observer: Arc<dyn SchedulerObserver<C>>) {
        self.observers.lock().push(observer);
    }

    pub fn is_busy(&self) -> bool {
        *self.running.lock() || !self.queue.lock().is_empty()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Build the job and append it to the queue. Returns `None` without
    /// enqueuing if `fail_on_busy` was set and the scheduler is busy.
    pub fn enqueue(&self, config: JobConfig<C>) -> Option<Arc<Job<C>>> {
        if config.fail_on_busy && self.is_busy() {
            return None;
        }

        let job = match config.steps {
            StepSpec::Single(step) => {
                Job::new_single_with_overrides(step, self.ctx.clone(), config.timeout, config.max_retries)
            }
            StepSpec::Composite { name, steps } => {
                Job::new_composite(name, steps, self.ctx.clone(), config.timeout, config.max_retries)
            }
        };

        job.add_observer(Arc::new(ProgressForwarder {
            job: Arc::downgrade(&job),
            observers: self.observers.clone(),
        }));

        self.queue.lock().push_back((job.clone(), config.auto_cleanup));
        tracing::debug!(job = %job.id(), name = job.name(), "job pushed");
        for observer in self.observers.lock().iter() {
            observer.on_pushed(&job);
        }
        Some(job)
    }

    /// Start the head of the queue if nothing is currently running.
    /// Non-blocking: the job runs on its own spawned task, and
    /// `on_completed` fires from that task once it finishes.
    pub fn process_queue(self: &Arc<Self>) {
        let (job, auto_cleanup) = {
            let mut running = self.running.lock();
            if *running {
                return;
            }
            let Some(entry) = self.queue.lock().pop_front() else { return };
            *running = true;
            entry
        };

        let scheduler = self.clone();
        tokio::spawn(async move {
            let outcome = job.run(auto_cleanup).await;
            *scheduler.running.lock() = false;
            tracing::debug!(job = %job.id(), success = outcome.success, "job completed");
            for observer in scheduler.observers.lock().iter() {
                observer.on_completed(&job, &outcome);
            }
        });
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
