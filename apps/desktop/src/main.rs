use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::ConnectFlow;
use shared::{domain::Screen, protocol::FlowEvent};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod render;

use config::load_settings;
use render::{banner, render_event, TerminalNavigator};

#[derive(Parser, Debug)]
#[command(about = "Walks through the mock VPN connect and disconnect screens")]
struct Args {
    /// TOML settings file (defaults to ./vpn_mock.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    tick_interval_ms: Option<u64>,
    #[arg(long)]
    step: Option<f64>,
    /// Time spent on the Connected screen before pressing disconnect
    #[arg(long, default_value_t = 1_500)]
    hold_ms: u64,
    /// Leave the Connecting screen after this many ticks
    #[arg(long)]
    cancel_after_ticks: Option<u32>,
    /// Print flow events as JSON lines instead of the text view
    #[arg(long)]
    json: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(v) = args.tick_interval_ms {
        settings.tick_interval_ms = v;
    }
    if let Some(v) = args.step {
        settings.step = v;
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))
        .context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let navigator = Arc::new(TerminalNavigator::new(args.json));
    let flow = ConnectFlow::new(settings.flow_config(), navigator)
        .context("failed to set up connect flow")?;
    let mut events = flow.subscribe_events();

    if !args.json {
        println!("{}", banner(Screen::Home));
    }
    flow.connect().await?;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "render loop fell behind flow events");
                continue;
            }
            Err(RecvError::Closed) => bail!("connect flow stopped unexpectedly"),
        };
        print_event(&event, args.json)?;

        match event {
            FlowEvent::Progress(update) if Some(update.tick) == args.cancel_after_ticks => {
                info!(tick = update.tick, "leaving the connecting screen early");
                flow.dismiss().await;
                // dismissal is synchronous; drain what it emitted and stop
                drain_remaining(&mut events, args.json)?;
                break;
            }
            FlowEvent::Connected { .. } => {
                tokio::time::sleep(Duration::from_millis(args.hold_ms)).await;
                flow.disconnect().await?;
            }
            FlowEvent::Disconnected => break,
            _ => {}
        }
    }

    Ok(())
}

fn print_event(event: &FlowEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else if let Some(line) = render_event(event) {
        println!("{line}");
    }
    Ok(())
}

fn drain_remaining(events: &mut broadcast::Receiver<FlowEvent>, json: bool) -> Result<()> {
    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }
    Ok(())
}
