//! Text rendering of the three screens and the progress ring.

use shared::{
    domain::{FeedbackTier, Screen},
    protocol::FlowEvent,
};

use client_core::Navigator;

const BAR_WIDTH: usize = 20;

pub fn progress_bar(value: f64) -> String {
    let filled = ((value.clamp(0.0, 1.0) * BAR_WIDTH as f64).round() as usize).min(BAR_WIDTH);
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (value.clamp(0.0, 1.0) * 100.0).round() as u32
    )
}

pub fn feedback_glyph(tier: FeedbackTier) -> &'static str {
    match tier {
        FeedbackTier::None => "",
        FeedbackTier::Light => "*",
        FeedbackTier::Medium => "**",
        FeedbackTier::Heavy => "***",
    }
}

pub fn banner(screen: Screen) -> String {
    let title = screen.title();
    let rule = "=".repeat(title.len() + 4);
    format!("{rule}\n| {title} |\n{rule}")
}

/// One output line per event, or `None` for events the text view ignores.
pub fn render_event(event: &FlowEvent) -> Option<String> {
    match event {
        FlowEvent::Progress(update) => Some(format!(
            "{} {}",
            progress_bar(update.value),
            feedback_glyph(update.tier)
        )),
        FlowEvent::Connected { run_id } => Some(format!("run {run_id} connected")),
        FlowEvent::Disconnected => Some("disconnected".to_string()),
        FlowEvent::ScreenChanged { .. } | FlowEvent::Feedback { .. } => None,
    }
}

pub struct TerminalNavigator {
    json: bool,
}

impl TerminalNavigator {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl Navigator for TerminalNavigator {
    fn navigate(&self, from: Screen, to: Screen) {
        tracing::debug!(from = ?from, to = ?to, "presenting screen");
        if !self.json {
            println!("{}", banner(to));
        }
    }
}
