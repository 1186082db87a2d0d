//! Screen flow of the connect mock-up: Home -> Connecting -> Connected -> Home.
//!
//! [`ConnectFlow`] owns the sequencer for the Connecting screen and performs every
//! transition through a host supplied [`Navigator`].

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError,
    },
    time::Duration,
};

use shared::{
    domain::{FeedbackTier, RunId, Screen},
    protocol::{FlowEvent, ProgressUpdate},
};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};

use crate::{
    error::FlowError,
    sequencer::{ConnectionSequencer, SequencerConfig, SequencerListener},
};

const DEFAULT_CONNECT_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_DISCONNECT_FADE: Duration = Duration::from_millis(500);
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowConfig {
    pub sequencer: SequencerConfig,
    /// Pause between the connect press and the Connecting screen.
    pub connect_delay: Duration,
    /// Fade-out of the Connected screen before returning Home.
    pub disconnect_fade: Duration,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            sequencer: SequencerConfig::default(),
            connect_delay: DEFAULT_CONNECT_DELAY,
            disconnect_fade: DEFAULT_DISCONNECT_FADE,
        }
    }
}

/// Performs screen transitions on behalf of the flow.
pub trait Navigator: Send + Sync {
    fn navigate(&self, from: Screen, to: Screen);
}

enum SequencerSignal {
    Progress(ProgressUpdate),
    Completed(RunId),
}

/// Forwards sequencer callbacks to the flow driver. Callbacks arrive under the
/// sequencer lock, so nothing here may touch flow state directly.
struct SignalForwarder {
    tx: mpsc::UnboundedSender<SequencerSignal>,
}

impl SequencerListener for SignalForwarder {
    fn on_progress(&self, update: ProgressUpdate) {
        let _ = self.tx.send(SequencerSignal::Progress(update));
    }

    fn on_completed(&self, run_id: RunId) {
        let _ = self.tx.send(SequencerSignal::Completed(run_id));
    }
}

struct FlowState {
    screen: Screen,
    last_run: RunId,
    active_run: Option<RunId>,
    sequencer: Option<ConnectionSequencer>,
}

struct FlowShared {
    config: FlowConfig,
    navigator: Arc<dyn Navigator>,
    events: broadcast::Sender<FlowEvent>,
    signals: mpsc::UnboundedSender<SequencerSignal>,
    state: Mutex<FlowState>,
    /// Delayed transition (connect press or disconnect fade). Kept outside `state` so
    /// teardown can abort it even while the transition holds the state lock.
    pending: StdMutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl FlowShared {
    fn pending(&self) -> StdMutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear_pending(&self) {
        if let Some(pending) = self.pending().take() {
            pending.abort();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn transition(&self, state: &mut FlowState, to: Screen) {
        let from = state.screen;
        if from == to {
            return;
        }
        state.screen = to;
        info!(from = ?from, to = ?to, "screen transition");
        self.navigator.navigate(from, to);
        let _ = self.events.send(FlowEvent::ScreenChanged { from, to });
    }

    async fn enter_connecting(&self) -> Result<(), FlowError> {
        let mut state = self.state.lock().await;
        self.pending().take();
        if self.is_closed() || state.screen != Screen::Home {
            return Ok(());
        }

        let run_id = state.last_run.next();
        state.last_run = run_id;
        self.transition(&mut state, Screen::Connecting);

        let forwarder = Arc::new(SignalForwarder {
            tx: self.signals.clone(),
        });
        let mut sequencer = ConnectionSequencer::new(run_id, forwarder);
        sequencer.start(self.config.sequencer)?;
        state.active_run = Some(run_id);
        state.sequencer = Some(sequencer);
        Ok(())
    }

    async fn return_home(&self) {
        let mut state = self.state.lock().await;
        self.pending().take();
        if self.is_closed() || state.screen != Screen::Connected {
            return;
        }
        self.transition(&mut state, Screen::Home);
        let _ = self.events.send(FlowEvent::Disconnected);
    }

    async fn handle_signal(&self, signal: SequencerSignal) {
        let mut state = self.state.lock().await;
        match signal {
            SequencerSignal::Progress(update) => {
                if state.active_run != Some(update.run_id) {
                    debug!(run_id = %update.run_id, "dropping progress from stale run");
                    return;
                }
                let _ = self.events.send(FlowEvent::Progress(update));
                let _ = self.events.send(FlowEvent::Feedback { tier: update.tier });
            }
            SequencerSignal::Completed(run_id) => {
                if state.active_run != Some(run_id) {
                    debug!(run_id = %run_id, "dropping completion from stale run");
                    return;
                }
                state.active_run = None;
                state.sequencer = None;
                self.transition(&mut state, Screen::Connected);
                let _ = self.events.send(FlowEvent::Connected { run_id });
            }
        }
    }
}

pub struct ConnectFlow {
    shared: Arc<FlowShared>,
    runtime: Handle,
    driver: JoinHandle<()>,
}

impl ConnectFlow {
    pub fn new(config: FlowConfig, navigator: Arc<dyn Navigator>) -> Result<Arc<Self>, FlowError> {
        config.sequencer.validate()?;
        let runtime = Handle::try_current().map_err(|_| FlowError::NoRuntime)?;

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (signals, mut signal_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(FlowShared {
            config,
            navigator,
            events,
            signals,
            state: Mutex::new(FlowState {
                screen: Screen::Home,
                last_run: RunId(0),
                active_run: None,
                sequencer: None,
            }),
            pending: StdMutex::new(None),
            closed: AtomicBool::new(false),
        });

        let driver_shared = Arc::clone(&shared);
        let driver = runtime.spawn(async move {
            while let Some(signal) = signal_rx.recv().await {
                driver_shared.handle_signal(signal).await;
            }
        });

        Ok(Arc::new(Self {
            shared,
            runtime,
            driver,
        }))
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<FlowEvent> {
        self.shared.events.subscribe()
    }

    pub async fn screen(&self) -> Screen {
        self.shared.state.lock().await.screen
    }

    /// Progress value of the running sequencer, if the Connecting screen is up.
    pub async fn progress(&self) -> Option<f64> {
        let state = self.shared.state.lock().await;
        state.sequencer.as_ref().map(|sequencer| sequencer.progress().value)
    }

    /// Connect button press on the Home screen.
    pub async fn connect(&self) -> Result<(), FlowError> {
        let state = self.shared.state.lock().await;
        if state.screen != Screen::Home {
            return Err(FlowError::InvalidTransition {
                action: "connect",
                screen: state.screen,
            });
        }
        let mut pending = self.shared.pending();
        if pending.is_some() {
            return Err(FlowError::TransitionPending);
        }

        info!("connect pressed");
        let shared = Arc::clone(&self.shared);
        let delay = self.shared.config.connect_delay;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = shared.enter_connecting().await {
                tracing::error!(error = %err, "failed to start connection sequencer");
            }
        }));
        Ok(())
    }

    /// Disconnect button press on the Connected screen.
    pub async fn disconnect(&self) -> Result<(), FlowError> {
        let state = self.shared.state.lock().await;
        if state.screen != Screen::Connected {
            return Err(FlowError::InvalidTransition {
                action: "disconnect",
                screen: state.screen,
            });
        }
        let mut pending = self.shared.pending();
        if pending.is_some() {
            return Err(FlowError::TransitionPending);
        }

        info!("disconnect pressed");
        let _ = self.shared.events.send(FlowEvent::Feedback {
            tier: FeedbackTier::Medium,
        });
        let shared = Arc::clone(&self.shared);
        let fade = self.shared.config.disconnect_fade;
        *pending = Some(self.runtime.spawn(async move {
            tokio::time::sleep(fade).await;
            shared.return_home().await;
        }));
        Ok(())
    }

    /// Tears down whatever screen is up and returns Home. Safe to call repeatedly.
    pub async fn dismiss(&self) {
        let mut state = self.shared.state.lock().await;
        self.shared.clear_pending();
        state.active_run = None;
        if let Some(mut sequencer) = state.sequencer.take() {
            if sequencer.cancel() {
                info!(run_id = %sequencer.run_id(), "connecting screen dismissed");
            }
        }
        if state.screen != Screen::Home {
            let was_connected = state.screen == Screen::Connected;
            self.shared.transition(&mut state, Screen::Home);
            if was_connected {
                let _ = self.shared.events.send(FlowEvent::Disconnected);
            }
        }
    }
}

impl Drop for ConnectFlow {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.driver.abort();
        self.shared.clear_pending();
        if let Ok(mut state) = self.shared.state.try_lock() {
            state.active_run = None;
            state.sequencer = None;
        }
    }
}

#[cfg(test)]
#[path = "tests/flow_tests.rs"]
mod tests;
