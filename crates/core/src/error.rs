// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for step handlers and the job state machine.
//!
//! Run-phase failures flow into the job's top-level `error`/`success`;
//! cancel and cleanup failures are isolated and never prevent the job
//! from reaching `COMPLETED`.

use thiserror::Error;

/// Error returned by a [`crate::step::Step`] handler (`handle_run`,
/// `handle_cancel`, `handle_cleanup`).
///
/// Handlers report failure by returning `Err(StepError)`; a panic is not
/// part of the contract and is not caught by the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct StepError(pub String);

impl StepError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<&str> for StepError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StepError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Job-level error taxonomy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// `handle_run` rejected or the run phase timed out and exhausted the
    /// step's message (the terminal run failure, preserved verbatim).
    #[error("{0}")]
    RunFailed(String),

    /// Timeout elapsed during RUN with no message to preserve (no previous
    /// run attempt ever produced an error, e.g. the step just never calls
    /// back and the retry budget was exhausted by timeouts alone).
    #[error("run timed out")]
    RunTimedOut,

    /// An external `abort(reason)` drove the job to completion before a
    /// run failure ever occurred.
    #[error("aborted")]
    Aborted,

    /// The retry budget was exhausted without the step ever succeeding.
    #[error("max retries reached")]
    RetriesExhausted,

    /// `handle_cancel` rejected, threw, or timed out. Recorded on
    /// `error_cancel`; never the top-level `error`.
    #[error("{0}")]
    CancelFailed(String),

    /// `handle_cleanup` rejected, threw, or timed out. Recorded on
    /// `error_cleanup`; never the top-level `error`.
    #[error("{0}")]
    CleanupFailed(String),

    /// A request was made in a state that forbids it (e.g. `cleanup()`
    /// called while RUN is in flight, or a second explicit `cleanup()`
    /// after one already ran). Surfaces to the immediate caller; does not
    /// mutate job state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
}

impl JobError {
    /// The human-readable message, equivalent to the source's
    /// `error.message` field.
    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn from_cancel(err: StepError) -> Self {
        JobError::CancelFailed(err.0)
    }

    pub fn from_cleanup(err: StepError) -> Self {
        JobError::CleanupFailed(err.0)
    }
}

impl From<StepError> for JobError {
    fn from(err: StepError) -> Self {
        JobError::RunFailed(err.0)
    }
}
