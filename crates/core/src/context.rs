// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared mutable context threaded through every step's handlers.

use parking_lot::Mutex;
use std::sync::Arc;

/// The caller-owned record passed to every step's handlers. Single-threaded
/// cooperative execution means the
/// lock is never contended across concurrently-running handlers within
/// one scheduler, but `Arc<Mutex<_>>` still lets steps hold it across
/// `.await` points safely.
pub type SharedContext<C> = Arc<Mutex<C>>;

/// Wrap a caller-supplied context value for use with a [`crate::step::Step`].
pub fn shared<C>(ctx: C) -> SharedContext<C> {
    Arc::new(Mutex::new(ctx))
}
