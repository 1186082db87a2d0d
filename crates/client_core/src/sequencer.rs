//! Timer-driven progress sequencer.
//!
//! A run advances progress by a fixed step on every tick, reports each tick to a
//! [`SequencerListener`], and signals completion once after a settle delay.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use shared::{
    domain::{FeedbackTier, ProgressState, RunId, SequencerPhase},
    protocol::ProgressUpdate,
};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, info};

use crate::error::SequencerError;

const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(300);
const DEFAULT_STEP: f64 = 0.1;
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);
/// Upper bound for the tick interval and the settle delay; keeps deadline arithmetic
/// on the runtime clock from overflowing.
pub const MAX_PHASE_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequencerConfig {
    pub tick_interval: Duration,
    pub step: f64,
    pub settle_delay: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            step: DEFAULT_STEP,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl SequencerConfig {
    pub fn validate(&self) -> Result<(), SequencerError> {
        if self.tick_interval.is_zero() {
            return Err(SequencerError::InvalidConfig(
                "tick interval must be greater than zero".into(),
            ));
        }
        if self.tick_interval > MAX_PHASE_DURATION {
            return Err(SequencerError::InvalidConfig(format!(
                "tick interval must not exceed {MAX_PHASE_DURATION:?}, got {:?}",
                self.tick_interval
            )));
        }
        if self.settle_delay > MAX_PHASE_DURATION {
            return Err(SequencerError::InvalidConfig(format!(
                "settle delay must not exceed {MAX_PHASE_DURATION:?}, got {:?}",
                self.settle_delay
            )));
        }
        if !self.step.is_finite() || self.step <= 0.0 || self.step > 1.0 {
            return Err(SequencerError::InvalidConfig(format!(
                "step must be within (0, 1], got {}",
                self.step
            )));
        }
        Ok(())
    }
}

/// Receives sequencer events.
///
/// Callbacks run on the sequencer task while its state lock is held, which is what
/// keeps [`ConnectionSequencer::cancel`] race-free. They must return quickly and must
/// not call back into the sequencer.
pub trait SequencerListener: Send + Sync {
    fn on_progress(&self, update: ProgressUpdate);
    fn on_completed(&self, run_id: RunId);
}

#[derive(Debug, Default)]
struct SequencerCore {
    phase: SequencerPhase,
    progress: ProgressState,
    ticks: u32,
}

impl SequencerCore {
    fn advance(&mut self, run_id: RunId, step: f64) -> ProgressUpdate {
        self.ticks += 1;
        self.progress.value = (self.ticks as f64 * step).min(1.0);
        if self.progress.value >= 1.0 && !self.progress.completed {
            self.progress.completed = true;
        }

        ProgressUpdate {
            run_id,
            tick: self.ticks,
            value: self.progress.value,
            tier: FeedbackTier::for_progress(self.progress.value),
        }
    }
}

fn lock(core: &Mutex<SequencerCore>) -> MutexGuard<'_, SequencerCore> {
    core.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct ConnectionSequencer {
    run_id: RunId,
    core: Arc<Mutex<SequencerCore>>,
    listener: Arc<dyn SequencerListener>,
    task: Option<JoinHandle<()>>,
}

impl ConnectionSequencer {
    pub fn new(run_id: RunId, listener: Arc<dyn SequencerListener>) -> Self {
        Self {
            run_id,
            core: Arc::new(Mutex::new(SequencerCore::default())),
            listener,
            task: None,
        }
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn phase(&self) -> SequencerPhase {
        lock(&self.core).phase
    }

    pub fn progress(&self) -> ProgressState {
        lock(&self.core).progress
    }

    pub fn ticks(&self) -> u32 {
        lock(&self.core).ticks
    }

    /// Begins ticking. Only an idle sequencer can be started; a run never restarts.
    pub fn start(&mut self, config: SequencerConfig) -> Result<(), SequencerError> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| SequencerError::NoRuntime)?;

        {
            let mut core = lock(&self.core);
            if core.phase != SequencerPhase::Idle {
                return Err(SequencerError::AlreadyStarted { phase: core.phase });
            }
            core.phase = SequencerPhase::Running;
        }

        info!(
            run_id = %self.run_id,
            tick_interval_ms = config.tick_interval.as_millis() as u64,
            step = config.step,
            "sequencer started"
        );

        self.task = Some(handle.spawn(run(
            self.run_id,
            Arc::clone(&self.core),
            Arc::clone(&self.listener),
            config,
        )));
        Ok(())
    }

    /// Stops the run. Returns `true` only for the call that actually cancelled it;
    /// later calls and calls on a finished run are no-ops.
    pub fn cancel(&mut self) -> bool {
        let cancelled = {
            let mut core = lock(&self.core);
            if core.phase.is_terminal() {
                false
            } else {
                core.phase = SequencerPhase::Cancelled;
                true
            }
        };

        if let Some(task) = self.task.take() {
            task.abort();
        }
        if cancelled {
            info!(run_id = %self.run_id, ticks = self.ticks(), "sequencer cancelled");
        }
        cancelled
    }
}

impl Drop for ConnectionSequencer {
    fn drop(&mut self) {
        // Only abort here: listeners may drop the sequencer from inside a callback,
        // while the state lock is held by the sequencer task.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    run_id: RunId,
    core: Arc<Mutex<SequencerCore>>,
    listener: Arc<dyn SequencerListener>,
    config: SequencerConfig,
) {
    let mut ticker = time::interval_at(Instant::now() + config.tick_interval, config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let mut guard = lock(&core);
        if guard.phase != SequencerPhase::Running {
            return;
        }
        let update = guard.advance(run_id, config.step);
        debug!(
            run_id = %run_id,
            tick = update.tick,
            value = update.value,
            tier = update.tier.as_str(),
            "sequencer tick"
        );
        listener.on_progress(update);
        if guard.progress.completed {
            break;
        }
    }

    time::sleep(config.settle_delay).await;

    let mut guard = lock(&core);
    if guard.phase != SequencerPhase::Running {
        return;
    }
    guard.phase = SequencerPhase::Completed;
    info!(run_id = %run_id, ticks = guard.ticks, "sequencer completed");
    listener.on_completed(run_id);
}

#[cfg(test)]
#[path = "tests/sequencer_tests.rs"]
mod tests;
