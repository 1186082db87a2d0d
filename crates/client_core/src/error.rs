use shared::domain::{Screen, SequencerPhase};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SequencerError {
    #[error("sequencer cannot start from phase {phase:?}")]
    AlreadyStarted { phase: SequencerPhase },
    #[error("invalid sequencer config: {0}")]
    InvalidConfig(String),
    #[error("no tokio runtime available to drive the sequencer")]
    NoRuntime,
}

#[derive(Debug, Error, PartialEq)]
pub enum FlowError {
    #[error("cannot {action} while on the {screen:?} screen")]
    InvalidTransition {
        action: &'static str,
        screen: Screen,
    },
    #[error("a screen transition is already pending")]
    TransitionPending,
    #[error(transparent)]
    Sequencer(#[from] SequencerError),
    #[error("no tokio runtime available to drive the connect flow")]
    NoRuntime,
}
