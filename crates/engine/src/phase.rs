// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-job phase.

/// A job's current sub-state. Monotone except RUN <-> CANCEL, which may
/// alternate up to `max_retries` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    New,
    Run,
    Cancel,
    Cleanup,
    Completed,
}

jobrunner_core::simple_display! {
    Phase {
        New => "new",
        Run => "run",
        Cancel => "cancel",
        Cleanup => "cleanup",
        Completed => "completed",
    }
}
