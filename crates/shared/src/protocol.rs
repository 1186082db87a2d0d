use serde::{Deserialize, Serialize};

use crate::domain::{FeedbackTier, RunId, Screen};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub run_id: RunId,
    pub tick: u32,
    pub value: f64,
    pub tier: FeedbackTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum FlowEvent {
    ScreenChanged { from: Screen, to: Screen },
    Progress(ProgressUpdate),
    Feedback { tier: FeedbackTier },
    Connected { run_id: RunId },
    Disconnected,
}
