// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end coverage exercising the public API of both crates
//! together: a scheduler driving composite jobs that share a mutable
//! context across steps.

use async_trait::async_trait;
use jobrunner_core::{shared, SharedContext, Step, StepError};
use jobrunner_engine::{JobConfig, JobScheduler};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct BuildContext {
    asset_url: Option<String>,
}

struct PublishAssetStep;

#[async_trait]
impl Step<BuildContext> for PublishAssetStep {
    fn name(&self) -> &str {
        "publish-asset"
    }

    async fn handle_run(&self, ctx: SharedContext<BuildContext>) -> Result<(), StepError> {
        ctx.lock().asset_url = Some("https://example.invalid/asset.bin".to_string());
        Ok(())
    }
}

struct ConsumeAssetStep {
    seen: Arc<Mutex<Option<String>>>,
}

#[async_trait]
impl Step<BuildContext> for ConsumeAssetStep {
    fn name(&self) -> &str {
        "consume-asset"
    }

    async fn handle_run(&self, ctx: SharedContext<BuildContext>) -> Result<(), StepError> {
        let url = ctx.lock().asset_url.clone();
        *self.seen.lock() = url;
        Ok(())
    }
}

#[tokio::test]
async fn a_composite_job_threads_context_between_steps_and_reports_completion() {
    let ctx = shared(BuildContext::default());
    let scheduler = Arc::new(JobScheduler::new(ctx));

    let seen = Arc::new(Mutex::new(None));
    let job = scheduler
        .enqueue(JobConfig::composite(
            "publish-pipeline",
            vec![Arc::new(PublishAssetStep), Arc::new(ConsumeAssetStep { seen: seen.clone() })],
        ))
        .expect("scheduler is idle");

    scheduler.process_queue();
    let outcome = job.wait().await;

    assert!(outcome.success);
    assert_eq!(seen.lock().as_deref(), Some("https://example.invalid/asset.bin"));
}

#[tokio::test]
async fn a_rejected_step_fails_the_job_but_the_scheduler_keeps_running() {
    struct FlakyStep;

    #[async_trait]
    impl Step<BuildContext> for FlakyStep {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn handle_run(&self, _ctx: SharedContext<BuildContext>) -> Result<(), StepError> {
            Err(StepError::new("disk full"))
        }
    }

    let ctx = shared(BuildContext::default());
    let scheduler = Arc::new(JobScheduler::new(ctx));

    let first = scheduler.enqueue(JobConfig::single(Arc::new(FlakyStep))).expect("scheduler is idle");
    let second = scheduler.enqueue(JobConfig::single(Arc::new(PublishAssetStep))).expect("scheduler is idle");

    scheduler.process_queue();
    let first_outcome = first.wait().await;
    assert!(!first_outcome.success);

    // `process_queue` is a no-op while the scheduler's internal
    // bookkeeping for the previous job is still unwinding; a real
    // caller wires this retry to the `on_completed` observer instead.
    while scheduler.queue_len() > 0 {
        scheduler.process_queue();
        tokio::task::yield_now().await;
    }
    let second_outcome = second.wait().await;
    assert!(second_outcome.success);
}
