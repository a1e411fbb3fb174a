// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The composite step driver.
//!
//! A composite job is a `Job<C>` whose step is a `CompositeStep<C>`: it
//! runs a fixed list of child steps as their own `Job<C>`s, reporting
//! progress after each, and reverses through the completed prefix on
//! cancel/cleanup.

use crate::job::{Job, JobObserver};
use jobrunner_core::{JobError, JobId, SharedContext, Step, StepError, StepProgress};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

struct CompositeState<C> {
    /// Index of the child currently executing (forward pass) or most
    /// recently aborted (cancel pass). `-1` means no child has started
    /// yet.
    active_index: isize,
    /// Index cleanup should start at and count down from to 0: the
    /// failing child on a short-circuited forward pass, or the last
    /// child on a clean run. Set once by `handle_run` and never touched
    /// by `handle_cancel`, so cancelling the in-flight child can't shift
    /// where cleanup begins.
    cleanup_from: isize,
    children: Vec<Arc<Job<C>>>,
}

/// Drives a sequence of child jobs in order. Each `handle_run` call
/// builds fresh children and runs them from index 0 — a composite's own
/// retry budget re-executes the whole sequence, since each child `Job`
/// is a one-shot state machine.
pub struct CompositeStep<C> {
    name: String,
    job_id: JobId,
    timeout: Option<Duration>,
    max_retries: u32,
    child_steps: Vec<Arc<dyn Step<C>>>,
    observers: Arc<Mutex<Vec<Arc<dyn JobObserver<C>>>>>,
    state: Mutex<CompositeState<C>>,
}

impl<C> CompositeStep<C>
where
    C: Send + Sync + 'static,
{
    pub(crate) fn new(
        name: String,
        job_id: JobId,
        timeout: Option<Duration>,
        max_retries: u32,
        child_steps: Vec<Arc<dyn Step<C>>>,
        observers: Arc<Mutex<Vec<Arc<dyn JobObserver<C>>>>>,
    ) -> Self {
        Self {
            name,
            job_id,
            timeout,
            max_retries: max_retries.max(1),
            child_steps,
            observers,
            state: Mutex::new(CompositeState { active_index: -1, cleanup_from: -1, children: Vec::new() }),
        }
    }

    fn emit_progress(&self, progress: StepProgress) {
        for observer in self.observers.lock().iter() {
            observer.on_progress(&self.job_id, &progress);
        }
    }

    fn emit_cleanup_progress(&self, progress: StepProgress) {
        for observer in self.observers.lock().iter() {
            observer.on_cleanup_progress(&self.job_id, &progress);
        }
    }
}

#[async_trait::async_trait]
impl<C> Step<C> for CompositeStep<C>
where
    C: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }

    async fn handle_run(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        let total = self.child_steps.len();
        let children: Vec<Arc<Job<C>>> =
            self.child_steps.iter().cloned().map(|step| Job::new_single(step, ctx.clone())).collect();

        {
            let mut state = self.state.lock();
            state.children = children.clone();
            state.active_index = if total == 0 { -1 } else { 0 };
        }

        for (index, child) in children.into_iter().enumerate() {
            self.state.lock().active_index = index as isize;

            // Spawned so an external timeout/abort on this composite's own
            // RUN phase can drop this future without killing the child:
            // the child keeps running in the background and remains
            // reachable through `state.children` for the cancel pass.
            let handle = tokio::spawn(async move { child.run(false).await });
            let outcome = handle.await.map_err(|_| StepError::new("child job task panicked"))?;

            if outcome.success {
                self.emit_progress(StepProgress::ok(index, total));
            } else {
                self.state.lock().cleanup_from = index as isize;
                let error = outcome.error.unwrap_or(JobError::RetriesExhausted);
                self.emit_progress(StepProgress::failed(index, total, error.clone()));
                return Err(StepError::new(error.message()));
            }
        }

        let last = if total > 0 { total as isize - 1 } else { -1 };
        {
            let mut state = self.state.lock();
            state.active_index = last;
            state.cleanup_from = last;
        }
        Ok(())
    }

    async fn handle_cancel(&self, _ctx: SharedContext<C>) -> Result<(), StepError> {
        let child = {
            let state = self.state.lock();
            let index = state.active_index;
            if index >= 0 { state.children.get(index as usize).cloned() } else { None }
        };
        if let Some(child) = child {
            child.abort("composite cancel");
            let _ = child.wait().await;
        }
        Ok(())
    }

    async fn handle_cleanup(&self, _ctx: SharedContext<C>) -> Result<(), StepError> {
        let total = self.child_steps.len();
        let (mut index, children) = {
            let state = self.state.lock();
            (state.cleanup_from, state.children.clone())
        };

        let mut first_error: Option<JobError> = None;
        while index >= 0 {
            let child = children[index as usize].clone();
            match child.cleanup().await {
                Ok(()) => self.emit_cleanup_progress(StepProgress::ok(index as usize, total)),
                Err(error) => {
                    self.emit_cleanup_progress(StepProgress::failed(index as usize, total, error.clone()));
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
            index -= 1;
        }
        self.state.lock().cleanup_from = -1;

        match first_error {
            Some(e) => Err(StepError::new(e.message())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
#[path = "composite_tests.rs"]
mod tests;
