//! Connection simulation core: the progress sequencer and the screen flow that hosts it.

pub mod error;
pub mod flow;
pub mod sequencer;

pub use error::{FlowError, SequencerError};
pub use flow::{ConnectFlow, FlowConfig, Navigator};
pub use sequencer::{ConnectionSequencer, SequencerConfig, SequencerListener};
