use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use client_core::{FlowConfig, SequencerConfig};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "vpn_mock.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub tick_interval_ms: u64,
    pub step: f64,
    pub settle_delay_ms: u64,
    pub connect_delay_ms: u64,
    pub disconnect_fade_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            step: 0.1,
            settle_delay_ms: 500,
            connect_delay_ms: 1_000,
            disconnect_fade_ms: 500,
            log_filter: "info".into(),
        }
    }
}

/// Subset of [`Settings`] accepted from the TOML file; absent keys keep defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    tick_interval_ms: Option<u64>,
    step: Option<f64>,
    settle_delay_ms: Option<u64>,
    connect_delay_ms: Option<u64>,
    disconnect_fade_ms: Option<u64>,
    log_filter: Option<String>,
}

impl Settings {
    pub fn flow_config(&self) -> FlowConfig {
        FlowConfig {
            sequencer: SequencerConfig {
                tick_interval: Duration::from_millis(self.tick_interval_ms),
                step: self.step,
                settle_delay: Duration::from_millis(self.settle_delay_ms),
            },
            connect_delay: Duration::from_millis(self.connect_delay_ms),
            disconnect_fade: Duration::from_millis(self.disconnect_fade_ms),
        }
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(v) = file.tick_interval_ms {
            self.tick_interval_ms = v;
        }
        if let Some(v) = file.step {
            self.step = v;
        }
        if let Some(v) = file.settle_delay_ms {
            self.settle_delay_ms = v;
        }
        if let Some(v) = file.connect_delay_ms {
            self.connect_delay_ms = v;
        }
        if let Some(v) = file.disconnect_fade_ms {
            self.disconnect_fade_ms = v;
        }
        if let Some(v) = file.log_filter {
            self.log_filter = v;
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_env(&lookup, "APP__TICK_INTERVAL_MS") {
            self.tick_interval_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "APP__STEP") {
            self.step = v;
        }
        if let Some(v) = parse_env(&lookup, "APP__SETTLE_DELAY_MS") {
            self.settle_delay_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "APP__CONNECT_DELAY_MS") {
            self.connect_delay_ms = v;
        }
        if let Some(v) = parse_env(&lookup, "APP__DISCONNECT_FADE_MS") {
            self.disconnect_fade_ms = v;
        }
        if let Some(v) = lookup("APP__LOG_FILTER") {
            self.log_filter = v;
        }
    }
}

fn parse_env<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

/// Defaults, then the TOML file, then `APP__*` environment overrides.
///
/// A missing file at the default location is fine; a missing file that was asked
/// for explicitly is an error, as is a file that does not parse.
pub fn load_settings(explicit_path: Option<&Path>) -> anyhow::Result<Settings> {
    load_settings_with(explicit_path, |key| std::env::var(key).ok())
}

fn load_settings_with<F>(explicit_path: Option<&Path>, lookup: F) -> anyhow::Result<Settings>
where
    F: Fn(&str) -> Option<String>,
{
    let mut settings = Settings::default();

    let path = explicit_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg = toml::from_str::<FileSettings>(&raw)
                .with_context(|| format!("failed to parse config file '{}'", path.display()))?;
            settings.apply_file(file_cfg);
        }
        Err(err) if explicit_path.is_some() => {
            return Err(err)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
        Err(_) => {}
    }

    settings.apply_env(lookup);
    Ok(settings)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
