// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The [`Step`] capability trait.
//!
//! A step is not a class hierarchy — any value that implements `name`,
//! `handle_run`, and optionally `handle_cancel`/`handle_cleanup`, plus
//! timeout/retry configuration, qualifies. `handle_cancel` and
//! `handle_cleanup` default to resolving immediately with success.

use crate::context::SharedContext;
use crate::error::StepError;
use async_trait::async_trait;
use std::time::Duration;

/// A unit of work with three lifecycle hooks and a small configuration
/// record.
///
/// Each handler is the completer capability itself: returning `Ok(())`
/// resolves, returning `Err(e)` rejects, and a handler that never
/// returns (or is dropped by the engine's timeout/abort race) models
/// "never completes" as a cancellation-aware future that the engine
/// drops once its timeout or abort races it out.
#[async_trait]
pub trait Step<C>: Send + Sync
where
    C: Send + Sync,
{
    /// Human-readable identifier used in diagnostics.
    fn name(&self) -> &str;

    /// Optional positive duration; absence means no timeout.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    /// Maximum number of RUN attempts for a single job. Defaults to 1.
    fn max_retries(&self) -> u32 {
        1
    }

    /// Perform the unit of work. May legitimately never complete; the
    /// job's timeout mechanism converts that into a CANCEL transition.
    async fn handle_run(&self, ctx: SharedContext<C>) -> Result<(), StepError>;

    /// Best-effort release of whatever `handle_run` acquired that would
    /// delay termination. Failure is recorded but never blocks retries.
    async fn handle_cancel(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        let _ = ctx;
        Ok(())
    }

    /// Compensate all acquisitions that outlive RUN. Runs at most once
    /// per job.
    async fn handle_cleanup(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        let _ = ctx;
        Ok(())
    }
}

/// Decorates an existing step, overriding its reported `timeout` and/or
/// `max_retries` without touching the wrapped implementation.
///
/// Used by job-construction helpers so callers can tune retry budgets
/// and timeouts at enqueue time without requiring every `Step` impl to
/// expose its own overridable fields.
pub struct ConfiguredStep<C> {
    inner: std::sync::Arc<dyn Step<C>>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
}

impl<C> ConfiguredStep<C> {
    pub fn new(
        inner: std::sync::Arc<dyn Step<C>>,
        timeout: Option<Duration>,
        max_retries: Option<u32>,
    ) -> Self {
        Self { inner, timeout, max_retries }
    }
}

#[async_trait]
impl<C> Step<C> for ConfiguredStep<C>
where
    C: Send + Sync,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout.or_else(|| self.inner.timeout())
    }

    fn max_retries(&self) -> u32 {
        self.max_retries.unwrap_or_else(|| self.inner.max_retries())
    }

    async fn handle_run(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        self.inner.handle_run(ctx).await
    }

    async fn handle_cancel(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        self.inner.handle_cancel(ctx).await
    }

    async fn handle_cleanup(&self, ctx: SharedContext<C>) -> Result<(), StepError> {
        self.inner.handle_cleanup(ctx).await
    }
}
