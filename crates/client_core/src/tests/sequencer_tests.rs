use super::*;

use tokio::time::{sleep, Instant};

#[derive(Debug, Clone, PartialEq)]
enum Recorded {
    Progress(ProgressUpdate),
    Completed(RunId),
}

#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<(Instant, Recorded)>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<(Instant, Recorded)> {
        self.events.lock().expect("events lock").clone()
    }

    fn progress(&self) -> Vec<ProgressUpdate> {
        self.events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                Recorded::Progress(update) => Some(update),
                Recorded::Completed(_) => None,
            })
            .collect()
    }

    fn completions(&self) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| matches!(event, Recorded::Completed(_)))
            .count()
    }
}

impl SequencerListener for RecordingListener {
    fn on_progress(&self, update: ProgressUpdate) {
        self.events
            .lock()
            .expect("events lock")
            .push((Instant::now(), Recorded::Progress(update)));
    }

    fn on_completed(&self, run_id: RunId) {
        self.events
            .lock()
            .expect("events lock")
            .push((Instant::now(), Recorded::Completed(run_id)));
    }
}

fn sequencer_with_listener() -> (ConnectionSequencer, Arc<RecordingListener>) {
    let listener = Arc::new(RecordingListener::default());
    let sequencer = ConnectionSequencer::new(RunId(1), listener.clone());
    (sequencer, listener)
}

#[tokio::test(start_paused = true)]
async fn full_run_reaches_one_and_completes_once_after_settle_delay() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_millis(300 * 10 + 500 + 50)).await;

    let progress = listener.progress();
    assert_eq!(progress.len(), 10);
    for (index, update) in progress.iter().enumerate() {
        let n = index as u32 + 1;
        assert_eq!(update.tick, n);
        assert_eq!(update.value, (n as f64 * 0.1).min(1.0));
        assert_eq!(update.tier, FeedbackTier::for_progress(update.value));
    }
    assert_eq!(progress.last().map(|update| update.value), Some(1.0));
    assert!(progress.windows(2).all(|pair| pair[0].value < pair[1].value));

    assert_eq!(listener.completions(), 1);
    assert_eq!(sequencer.phase(), SequencerPhase::Completed);
    assert!(sequencer.progress().completed);
    assert_eq!(sequencer.progress().value, 1.0);

    let events = listener.events();
    let last_tick_at = events[events.len() - 2].0;
    let (completed_at, completed) = events[events.len() - 1].clone();
    assert_eq!(completed, Recorded::Completed(RunId(1)));
    let settle = completed_at - last_tick_at;
    assert!(settle >= Duration::from_millis(500), "settled after {settle:?}");
    assert!(settle < Duration::from_millis(600), "settled after {settle:?}");
}

#[tokio::test(start_paused = true)]
async fn no_events_arrive_after_a_long_idle_following_completion() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_secs(30)).await;

    assert_eq!(listener.progress().len(), 10);
    assert_eq!(listener.completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn first_tick_fires_after_one_interval() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_millis(250)).await;
    assert!(listener.progress().is_empty());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(listener.progress().len(), 1);
    assert_eq!(sequencer.ticks(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_three_ticks_suppresses_everything_after() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_millis(950)).await;
    assert_eq!(listener.progress().len(), 3);

    assert!(sequencer.cancel());
    sleep(Duration::from_secs(10)).await;

    let progress = listener.progress();
    assert_eq!(progress.len(), 3);
    assert_eq!(progress[2].value, 3.0 * 0.1);
    assert_eq!(listener.completions(), 0);
    assert_eq!(sequencer.phase(), SequencerPhase::Cancelled);
    assert!(!sequencer.progress().completed);
}

#[tokio::test(start_paused = true)]
async fn cancel_during_settle_delay_suppresses_completion() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_millis(3_200)).await;
    assert_eq!(listener.progress().len(), 10);
    assert!(sequencer.progress().completed);
    assert_eq!(sequencer.phase(), SequencerPhase::Running);

    assert!(sequencer.cancel());
    sleep(Duration::from_secs(2)).await;

    assert_eq!(listener.completions(), 0);
    assert_eq!(sequencer.phase(), SequencerPhase::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_is_idempotent() {
    let (mut sequencer, _listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    assert!(sequencer.cancel());
    assert!(!sequencer.cancel());
    assert_eq!(sequencer.phase(), SequencerPhase::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn cancel_after_completion_is_a_no_op() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");
    sleep(Duration::from_secs(5)).await;

    assert!(!sequencer.cancel());
    assert_eq!(sequencer.phase(), SequencerPhase::Completed);
    assert_eq!(listener.completions(), 1);
}

#[tokio::test(start_paused = true)]
async fn starting_twice_is_rejected() {
    let (mut sequencer, _listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    let err = sequencer
        .start(SequencerConfig::default())
        .expect_err("second start must fail");
    assert_eq!(
        err,
        SequencerError::AlreadyStarted {
            phase: SequencerPhase::Running
        }
    );
}

#[tokio::test(start_paused = true)]
async fn cancelled_sequencer_cannot_restart() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.cancel();

    let err = sequencer
        .start(SequencerConfig::default())
        .expect_err("cancelled run must not restart");
    assert_eq!(
        err,
        SequencerError::AlreadyStarted {
            phase: SequencerPhase::Cancelled
        }
    );
    sleep(Duration::from_secs(1)).await;
    assert!(listener.events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn dropping_the_sequencer_stops_the_timer() {
    let (mut sequencer, listener) = sequencer_with_listener();
    sequencer.start(SequencerConfig::default()).expect("start");

    sleep(Duration::from_millis(650)).await;
    assert_eq!(listener.progress().len(), 2);

    drop(sequencer);
    sleep(Duration::from_secs(5)).await;
    assert_eq!(listener.progress().len(), 2);
    assert_eq!(listener.completions(), 0);
}

#[tokio::test(start_paused = true)]
async fn uneven_step_clamps_final_value_to_one() {
    let (mut sequencer, listener) = sequencer_with_listener();
    let config = SequencerConfig {
        step: 0.3,
        ..SequencerConfig::default()
    };
    sequencer.start(config).expect("start");

    sleep(Duration::from_secs(3)).await;

    let values: Vec<f64> = listener.progress().iter().map(|update| update.value).collect();
    assert_eq!(values.len(), 4);
    assert_eq!(values[3], 1.0);
    assert_eq!(listener.completions(), 1);
}

#[test]
fn invalid_configs_are_rejected() {
    let zero_interval = SequencerConfig {
        tick_interval: Duration::ZERO,
        ..SequencerConfig::default()
    };
    assert!(matches!(
        zero_interval.validate(),
        Err(SequencerError::InvalidConfig(_))
    ));

    for step in [0.0, -0.1, 1.5, f64::NAN, f64::INFINITY] {
        let config = SequencerConfig {
            step,
            ..SequencerConfig::default()
        };
        assert!(
            matches!(config.validate(), Err(SequencerError::InvalidConfig(_))),
            "step {step} should be rejected"
        );
    }

    assert!(SequencerConfig::default().validate().is_ok());
}

#[tokio::test(start_paused = true)]
async fn oversized_durations_are_rejected_before_the_timer_starts() {
    let huge_interval = SequencerConfig {
        tick_interval: Duration::MAX,
        ..SequencerConfig::default()
    };
    assert!(matches!(
        huge_interval.validate(),
        Err(SequencerError::InvalidConfig(_))
    ));

    let huge_settle = SequencerConfig {
        settle_delay: Duration::MAX,
        ..SequencerConfig::default()
    };
    assert!(matches!(
        huge_settle.validate(),
        Err(SequencerError::InvalidConfig(_))
    ));

    let at_bound = SequencerConfig {
        tick_interval: MAX_PHASE_DURATION,
        settle_delay: MAX_PHASE_DURATION,
        ..SequencerConfig::default()
    };
    assert!(at_bound.validate().is_ok());

    let (mut sequencer, listener) = sequencer_with_listener();
    let err = sequencer.start(huge_interval).expect_err("oversized interval");
    assert!(matches!(err, SequencerError::InvalidConfig(_)));
    assert_eq!(sequencer.phase(), SequencerPhase::Idle);

    sleep(Duration::from_secs(1)).await;
    assert!(listener.events().is_empty());
}

#[test]
fn start_without_runtime_reports_missing_runtime() {
    let (mut sequencer, _listener) = sequencer_with_listener();
    let err = sequencer
        .start(SequencerConfig::default())
        .expect_err("no runtime");
    assert_eq!(err, SequencerError::NoRuntime);
    assert_eq!(sequencer.phase(), SequencerPhase::Idle);
}
