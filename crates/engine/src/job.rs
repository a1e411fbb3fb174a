// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The job state machine.

use crate::composite::CompositeStep;
use crate::phase::Phase;
use jobrunner_core::{ConfiguredStep, JobError, JobId, SharedContext, Step, StepError, StepProgress};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Observer hooks fired by a `CompositeJob`'s internal driver. A plain
/// (non-composite) job never calls these — they exist on every `Job` so
/// the API is uniform, but only the composite driver (`CompositeStep`)
/// ever invokes them.
pub trait JobObserver<C>: Send + Sync {
    fn on_progress(&self, _job_id: &JobId, _progress: &StepProgress) {}
    fn on_cleanup_progress(&self, _job_id: &JobId, _progress: &StepProgress) {}
}

/// A terminal snapshot of a job's outcome.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub job_id: JobId,
    pub success: bool,
    pub error: Option<JobError>,
    pub is_abort: bool,
    pub abort_reason: Option<String>,
    pub success_cancel: Option<bool>,
    pub error_cancel: Option<JobError>,
    pub success_cleanup: Option<bool>,
    pub error_cleanup: Option<JobError>,
}

struct JobState {
    phase: Phase,
    max_retries: u32,
    retries_remaining: u32,
    success: bool,
    error: Option<JobError>,
    abort_reason: Option<String>,
    success_cancel: Option<bool>,
    error_cancel: Option<JobError>,
    success_cleanup: Option<bool>,
    error_cleanup: Option<JobError>,
    auto_cleanup: bool,
    cleanup_ran: bool,
}

impl JobState {
    fn new(max_retries: u32) -> Self {
        let max_retries = max_retries.max(1);
        Self {
            phase: Phase::New,
            max_retries,
            retries_remaining: max_retries,
            success: false,
            error: None,
            abort_reason: None,
            success_cancel: None,
            error_cancel: None,
            success_cleanup: None,
            error_cleanup: None,
            auto_cleanup: false,
            cleanup_ran: false,
        }
    }
}

/// Outcome of racing a single phase's handler against its timeout and any
/// external abort request.
enum PhaseResult {
    Ok,
    Failed(StepError),
    TimedOut,
    Aborted,
}

impl PhaseResult {
    fn from_result(result: Result<(), StepError>) -> Self {
        match result {
            Ok(()) => PhaseResult::Ok,
            Err(e) => PhaseResult::Failed(e),
        }
    }
}

/// One execution of a [`Step`].
///
/// Drives the NEW -> RUN -> (CANCEL -> RUN)* -> CLEANUP -> COMPLETED
/// machine. A composite job is not a distinct Rust type: it is a
/// `Job<C>` whose `Step` is a `CompositeStep<C>` (see `crate::composite`),
/// which recursively drives child `Job<C>`s.
pub struct Job<C> {
    id: JobId,
    step: Arc<dyn Step<C>>,
    ctx: SharedContext<C>,
    state: Mutex<JobState>,
    /// Bumped on every `abort()` call; a phase only treats the job as
    /// aborted if the epoch changes *after* that phase started racing,
    /// so a stale abort from an earlier phase does not also cut short
    /// every later phase's handler.
    abort_epoch: AtomicU64,
    abort_notify: Notify,
    completed: AtomicBool,
    notify: Notify,
    observers: Arc<Mutex<Vec<Arc<dyn JobObserver<C>>>>>,
}

impl<C> Job<C>
where
    C: Send + Sync + 'static,
{
    /// Build a job around a single step, with no observer wiring (used
    /// both directly and as the child-job constructor inside
    /// `CompositeStep`).
    pub fn new_single(step: Arc<dyn Step<C>>, ctx: SharedContext<C>) -> Arc<Self> {
        Self::with_id(JobId::new(), step, ctx, Arc::new(Mutex::new(Vec::new())))
    }

    /// Build a job whose step overrides `timeout`/`max_retries` on an
    /// existing step.
    pub fn new_single_with_overrides(
        step: Arc<dyn Step<C>>,
        ctx: SharedContext<C>,
        timeout: Option<Duration>,
        max_retries: Option<u32>,
    ) -> Arc<Self> {
        let step: Arc<dyn Step<C>> = if timeout.is_some() || max_retries.is_some() {
            Arc::new(ConfiguredStep::new(step, timeout, max_retries))
        } else {
            step
        };
        Self::new_single(step, ctx)
    }

    /// Build a job that runs `child_steps` in order, reporting progress
    /// and reversing through the completed prefix on cancel/cleanup.
    pub fn new_composite(
        name: impl Into<String>,
        child_steps: Vec<Arc<dyn Step<C>>>,
        ctx: SharedContext<C>,
        timeout: Option<Duration>,
        max_retries: Option<u32>,
    ) -> Arc<Self> {
        let id = JobId::new();
        let observers = Arc::new(Mutex::new(Vec::new()));
        let composite = CompositeStep::new(
            name.into(),
            id,
            timeout,
            max_retries.unwrap_or(1),
            child_steps,
            observers.clone(),
        );
        Self::with_id(id, Arc::new(composite), ctx, observers)
    }

    pub(crate) fn with_id(
        id: JobId,
        step: Arc<dyn Step<C>>,
        ctx: SharedContext<C>,
        observers: Arc<Mutex<Vec<Arc<dyn JobObserver<C>>>>>,
    ) -> Arc<Self> {
        let max_retries = step.max_retries();
        Arc::new(Self {
            id,
            step,
            ctx,
            state: Mutex::new(JobState::new(max_retries)),
            abort_epoch: AtomicU64::new(0),
            abort_notify: Notify::new(),
            completed: AtomicBool::new(false),
            notify: Notify::new(),
            observers,
        })
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.step.name()
    }

    pub fn add_observer(&self, observer: Arc<dyn JobObserver<C>>) {
        self.observers.lock().push(observer);
    }

    /// Drive the job from NEW to COMPLETED. A second call while already
    /// running (or after completion) just awaits the existing run.
    pub async fn run(self: &Arc<Self>, auto_cleanup: bool) -> JobOutcome {
        let should_drive = {
            let mut state = self.state.lock();
            if state.phase != Phase::New {
                false
            } else {
                state.phase = Phase::Run;
                state.auto_cleanup = auto_cleanup;
                true
            }
        };
        if !should_drive {
            return self.wait().await;
        }
        self.drive(auto_cleanup).await
    }

    async fn drive(self: &Arc<Self>, auto_cleanup: bool) -> JobOutcome {
        let mut last_run_error: Option<JobError> = None;

        loop {
            let run_result = self.race_phase(|ctx| self.step.handle_run(ctx)).await;
            let succeeded = matches!(run_result, PhaseResult::Ok);
            if succeeded {
                self.state.lock().success = true;
                break;
            }

            last_run_error = Some(match run_result {
                PhaseResult::Failed(e) => JobError::RunFailed(e.0),
                PhaseResult::TimedOut => JobError::RunTimedOut,
                PhaseResult::Aborted => JobError::Aborted,
                PhaseResult::Ok => unreachable!("handled above"),
            });

            self.set_phase(Phase::Cancel);
            let cancel_result = self.race_phase(|ctx| self.step.handle_cancel(ctx)).await;
            // A timeout in CANCEL forces an abort-style exit: the job
            // does not trust an unresponsive cancel handler enough to
            // risk another RUN attempt, even if retries remain.
            let cancel_timed_out = matches!(cancel_result, PhaseResult::TimedOut);
            self.record_cancel(cancel_result);

            let mut state = self.state.lock();
            let externally_aborted = state.abort_reason.is_some();
            if cancel_timed_out {
                state.retries_remaining = 0;
            }
            if !externally_aborted && !cancel_timed_out && state.retries_remaining > 1 {
                state.retries_remaining -= 1;
                state.phase = Phase::Run;
                continue;
            }

            let final_error = if externally_aborted {
                JobError::Aborted
            } else if state.max_retries > 1 {
                JobError::RetriesExhausted
            } else {
                last_run_error.clone().unwrap_or(JobError::RetriesExhausted)
            };
            state.error = Some(final_error);
            state.success = false;
            break;
        }

        if auto_cleanup {
            self.set_phase(Phase::Cleanup);
            let cleanup_result = self.race_phase(|ctx| self.step.handle_cleanup(ctx)).await;
            self.record_cleanup(cleanup_result);
            self.state.lock().cleanup_ran = true;
        }

        self.finish()
    }

    /// Explicit cleanup for a job that completed with `auto_cleanup`
    /// off. Valid only in COMPLETED, and only once.
    pub async fn cleanup(self: &Arc<Self>) -> Result<(), JobError> {
        {
            let mut state = self.state.lock();
            if state.phase != Phase::Completed || state.auto_cleanup || state.cleanup_ran {
                return Err(JobError::InvalidTransition(
                    "cleanup is only valid once, on a completed job that ran without auto_cleanup".into(),
                ));
            }
            state.cleanup_ran = true;
            state.phase = Phase::Cleanup;
        }
        let result = self.race_phase(|ctx| self.step.handle_cleanup(ctx)).await;
        self.record_cleanup(result);
        self.state.lock().phase = Phase::Completed;

        let state = self.state.lock();
        match &state.error_cleanup {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    /// Idempotent external abort. Forces the currently-racing phase to
    /// exit; a prior abort that already cut short an earlier phase does
    /// not also cut short whatever phase is racing now — each `abort()`
    /// call only accelerates the phase live at the moment it is called.
    pub fn abort(&self, reason: impl Into<String>) {
        let mut state = self.state.lock();
        if state.phase == Phase::Completed {
            return;
        }
        if state.abort_reason.is_none() {
            state.abort_reason = Some(reason.into());
        }
        state.retries_remaining = 0;
        drop(state);
        self.abort_epoch.fetch_add(1, Ordering::SeqCst);
        self.abort_notify.notify_waiters();
    }

    /// Resolves once `abort()` has been called at least once since
    /// `baseline` was captured. Checks-then-waits to avoid the lost
    /// wakeup that a bare `Notify::notified()` call would risk if
    /// `abort()` fires between the check and the registration.
    async fn wait_for_abort_after(&self, baseline: u64) {
        loop {
            if self.abort_epoch.load(Ordering::SeqCst) != baseline {
                return;
            }
            let notified = self.abort_notify.notified();
            if self.abort_epoch.load(Ordering::SeqCst) != baseline {
                return;
            }
            notified.await;
        }
    }

    /// Wait for this job to reach COMPLETED. Any number of callers may
    /// await concurrently.
    pub async fn wait(&self) -> JobOutcome {
        loop {
            let notified = self.notify.notified();
            if self.completed.load(Ordering::Acquire) {
                return self.snapshot();
            }
            notified.await;
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.lock().phase == Phase::Completed
    }

    fn set_phase(&self, phase: Phase) {
        self.state.lock().phase = phase;
    }

    fn finish(self: &Arc<Self>) -> JobOutcome {
        self.state.lock().phase = Phase::Completed;
        let outcome = self.snapshot();
        self.completed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        outcome
    }

    fn snapshot(&self) -> JobOutcome {
        let s = self.state.lock();
        JobOutcome {
            job_id: self.id,
            success: s.success,
            error: s.error.clone(),
            is_abort: s.abort_reason.is_some(),
            abort_reason: s.abort_reason.clone(),
            success_cancel: s.success_cancel,
            error_cancel: s.error_cancel.clone(),
            success_cleanup: s.success_cleanup,
            error_cleanup: s.error_cleanup.clone(),
        }
    }

    fn record_cancel(&self, result: PhaseResult) {
        let mut state = self.state.lock();
        match result {
            PhaseResult::Ok => {
                state.success_cancel = Some(true);
                state.error_cancel = None;
            }
            PhaseResult::Failed(e) => {
                tracing::warn!(job = %self.id, error = %e, "cancel handler failed");
                state.success_cancel = Some(false);
                state.error_cancel = Some(JobError::from_cancel(e));
            }
            PhaseResult::TimedOut => {
                tracing::warn!(job = %self.id, "cancel handler timed out");
                state.success_cancel = Some(false);
                state.error_cancel = Some(JobError::CancelFailed("cancel timed out".into()));
            }
            PhaseResult::Aborted => {
                state.success_cancel = Some(false);
                state.error_cancel = Some(JobError::CancelFailed("aborted".into()));
            }
        }
    }

    fn record_cleanup(&self, result: PhaseResult) {
        let mut state = self.state.lock();
        match result {
            PhaseResult::Ok => {
                state.success_cleanup = Some(true);
                state.error_cleanup = None;
            }
            PhaseResult::Failed(e) => {
                tracing::warn!(job = %self.id, error = %e, "cleanup handler failed");
                state.success_cleanup = Some(false);
                state.error_cleanup = Some(JobError::from_cleanup(e));
            }
            PhaseResult::TimedOut => {
                tracing::warn!(job = %self.id, "cleanup handler timed out");
                state.success_cleanup = Some(false);
                state.error_cleanup = Some(JobError::CleanupFailed("cleanup timed out".into()));
            }
            PhaseResult::Aborted => {
                state.success_cleanup = Some(false);
                state.error_cleanup = Some(JobError::CleanupFailed("aborted".into()));
            }
        }
    }

    /// Race a phase handler against its configured timeout and any
    /// external abort requested *during this phase*. Every armed
    /// timer/abort-waiter is dropped on exit, so nothing stale can fire
    /// into a later phase — and conversely, an abort that already cut
    /// short an earlier phase does not re-fire here: the baseline epoch
    /// is captured fresh on entry, so only a genuinely new `abort()`
    /// call can end this phase early.
    async fn race_phase<'a, F, Fut>(&'a self, handler: F) -> PhaseResult
    where
        F: FnOnce(SharedContext<C>) -> Fut,
        Fut: Future<Output = Result<(), StepError>> + 'a,
    {
        let fut = handler(self.ctx.clone());
        tokio::pin!(fut);
        let baseline = self.abort_epoch.load(Ordering::SeqCst);

        match self.step.timeout() {
            Some(d) => {
                tokio::select! {
                    res = &mut fut => PhaseResult::from_result(res),
                    _ = tokio::time::sleep(d) => PhaseResult::TimedOut,
                    _ = self.wait_for_abort_after(baseline) => PhaseResult::Aborted,
                }
            }
            None => {
                tokio::select! {
                    res = &mut fut => PhaseResult::from_result(res),
                    _ = self.wait_for_abort_after(baseline) => PhaseResult::Aborted,
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
