// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use jobrunner_core::{shared, Step, StepError};
use parking_lot::Mutex as PLMutex;
use std::time::Duration;

struct EchoStep {
    name: &'static str,
    delay: Duration,
}

#[async_trait::async_trait]
impl Step<()> for EchoStep {
    fn name(&self) -> &str {
        self.name
    }

    async fn handle_run(&self, _ctx: SharedContext<()>) -> Result<(), StepError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

struct RecordingObserver {
    completed_order: Arc<PLMutex<Vec<String>>>,
}

impl SchedulerObserver<()> for RecordingObserver {
    fn on_completed(&self, job: &Arc<Job<()>>, _outcome: &JobOutcome) {
        self.completed_order.lock().push(job.name().to_string());
    }
}

#[tokio::test]
async fn jobs_complete_in_enqueue_order() {
    let scheduler = Arc::new(JobScheduler::new(shared(())));
    let completed_order = Arc::new(PLMutex::new(Vec::new()));
    scheduler.add_observer(Arc::new(RecordingObserver { completed_order: completed_order.clone() }));

    for name in ["first", "second", "third"] {
        scheduler
            .enqueue(JobConfig::single(Arc::new(EchoStep { name, delay: Duration::from_millis(1) })))
            .expect("queue is not full");
    }

    // Drive the queue until every job has completed; a production caller
    // wires this loop to the scheduler's own `on_completed` observer.
    while completed_order.lock().len() < 3 {
        scheduler.process_queue();
        tokio::task::yield_now().await;
    }

    assert_eq!(*completed_order.lock(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn fail_on_busy_rejects_enqueue_while_a_job_is_running() {
    let scheduler = Arc::new(JobScheduler::new(shared(())));
    scheduler
        .enqueue(JobConfig::single(Arc::new(EchoStep { name: "slow", delay: Duration::from_millis(20) })))
        .expect("queue is not full");
    scheduler.process_queue();
    tokio::task::yield_now().await;

    let rejected = scheduler.enqueue(
        JobConfig::single(Arc::new(EchoStep { name: "rejected", delay: Duration::ZERO })).fail_on_busy(true),
    );
    assert!(rejected.is_none());
}
