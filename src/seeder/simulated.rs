//! Simulated seeder for tests and demos.

use super::{SeedContext, SeedFuture, SeedOutcome, TileSeeder};
use crate::model::CacheJobInfo;
use std::time::Duration;
use tracing::debug;

/// A [`TileSeeder`] that pretends to work.
///
/// Three behaviors cover what the coordination tests need:
///
/// - [`completing`](SimulatedSeeder::completing): reports started, steps
///   through progress, completes;
/// - [`holding`](SimulatedSeeder::holding): never starts, parks until
///   cancelled — jobs stay `Scheduled`, which makes cluster assertions
///   deterministic;
/// - [`running_until_cancelled`](SimulatedSeeder::running_until_cancelled):
///   reports started then parks — jobs stay `Running` until aborted.
///
/// Any variant resolves to [`SeedOutcome::Aborted`] when its cancellation
/// token fires first.
#[derive(Clone, Debug)]
pub struct SimulatedSeeder {
    steps: u32,
    step_delay: Duration,
    hold: bool,
    start: bool,
    fail_at_step: Option<u32>,
}

impl SimulatedSeeder {
    /// Runs `steps` progress steps of `step_delay` each, then completes.
    pub fn completing(steps: u32, step_delay: Duration) -> Self {
        Self {
            steps,
            step_delay,
            hold: false,
            start: true,
            fail_at_step: None,
        }
    }

    /// Never starts; parks until cancelled.
    pub fn holding() -> Self {
        Self {
            steps: 0,
            step_delay: Duration::ZERO,
            hold: true,
            start: false,
            fail_at_step: None,
        }
    }

    /// Reports started, then parks until cancelled.
    pub fn running_until_cancelled() -> Self {
        Self {
            steps: 0,
            step_delay: Duration::ZERO,
            hold: true,
            start: true,
            fail_at_step: None,
        }
    }

    /// Like [`completing`](Self::completing), but fails after reaching the
    /// given step.
    pub fn failing_at(steps: u32, step_delay: Duration, fail_at_step: u32) -> Self {
        Self {
            steps,
            step_delay,
            hold: false,
            start: true,
            fail_at_step: Some(fail_at_step),
        }
    }
}

impl TileSeeder for SimulatedSeeder {
    fn seed(&self, info: &CacheJobInfo, ctx: SeedContext) -> SeedFuture {
        let cfg = self.clone();
        let job = info.id.clone();
        Box::pin(async move {
            debug!(%job, "simulated seed starting");
            if cfg.start {
                ctx.report_started();
            }
            if cfg.hold {
                ctx.cancelled().await;
                return SeedOutcome::Aborted;
            }
            for step in 0..cfg.steps {
                tokio::select! {
                    _ = ctx.cancelled() => return SeedOutcome::Aborted,
                    _ = tokio::time::sleep(cfg.step_delay) => {}
                }
                if cfg.fail_at_step == Some(step) {
                    return SeedOutcome::Failed(format!("simulated failure at step {}", step));
                }
                ctx.report_progress((step + 1) as f32 / cfg.steps.max(1) as f32);
            }
            SeedOutcome::Complete
        })
    }
}
