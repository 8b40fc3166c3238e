use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, bail};
use serde_derive::Deserialize;

const IDENTITY_FILE_NAME: &str = "bluetooth_mac.txt";

#[derive(Deserialize, Debug, Default, Clone)]
pub struct AppConfig {
    pub identity_file: Option<PathBuf>,
    pub timing: Option<TimingConfig>,
    pub buzzer: Option<BuzzerConfig>,
    pub bluetooth: Option<BluetoothConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct TimingConfig {
    pub check_interval_seconds: Option<u64>,
    pub reconnect_interval_seconds: Option<u64>,
    pub max_reconnect_attempts: Option<u32>,
    pub discovery_poll_seconds: Option<u64>,
    pub command_timeout_seconds: Option<u64>,
    pub discovery_timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct BuzzerConfig {
    pub pin: Option<u32>,
    pub active_low: Option<bool>,
    pub gpio_root: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct BluetoothConfig {
    pub alias: Option<String>,
    pub agent_capability: Option<String>,
    pub agent_use_sudo: Option<bool>,
    /// Directory holding `bluetoothctl`, `hcitool`, `l2ping`, `bt-agent` and `sudo`. Unset means `PATH`.
    pub tool_dir: Option<PathBuf>,
}

/// Intervals and bounds the control loop runs on, with defaults filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub check_interval: Duration,
    pub reconnect_interval: Duration,
    pub max_reconnect_attempts: u32,
    pub discovery_poll: Duration,
    pub command_timeout: Duration,
    pub discovery_timeout: Option<Duration>,
}

impl Default for Timing {
    fn default() -> Self {
        TimingConfig::default().resolve()
    }
}

impl TimingConfig {
    /// Rejects intervals that would make the loop spin or every command time out.
    pub fn validate(&self) -> anyhow::Result<()> {
        let durations = [
            ("check_interval_seconds", self.check_interval_seconds),
            ("reconnect_interval_seconds", self.reconnect_interval_seconds),
            ("discovery_poll_seconds", self.discovery_poll_seconds),
            ("command_timeout_seconds", self.command_timeout_seconds),
            ("discovery_timeout_seconds", self.discovery_timeout_seconds),
        ];
        for (key, value) in durations {
            if value == Some(0) {
                bail!("timing.{key} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn resolve(&self) -> Timing {
        Timing {
            check_interval: Duration::from_secs(self.check_interval_seconds.unwrap_or(5)),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_seconds.unwrap_or(3)),
            max_reconnect_attempts: self.max_reconnect_attempts.unwrap_or(5),
            discovery_poll: Duration::from_secs(self.discovery_poll_seconds.unwrap_or(2)),
            command_timeout: Duration::from_secs(self.command_timeout_seconds.unwrap_or(10)),
            discovery_timeout: self.discovery_timeout_seconds.map(Duration::from_secs),
        }
    }
}

impl AppConfig {
    /// Reads the TOML file at `path`, or falls back to the built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(AppConfig::default());
        };
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = toml::de::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if let Some(timing) = &config.timing {
            timing
                .validate()
                .with_context(|| format!("invalid config file {}", path.display()))?;
        }
        Ok(config)
    }

    pub fn timing(&self) -> Timing {
        self.timing.clone().unwrap_or_default().resolve()
    }

    pub fn buzzer(&self) -> BuzzerConfig {
        self.buzzer.clone().unwrap_or_default()
    }

    pub fn bluetooth(&self) -> BluetoothConfig {
        self.bluetooth.clone().unwrap_or_default()
    }

    /// Where the tracked address lives. Defaults to a file next to the executable.
    pub fn identity_path(&self) -> PathBuf {
        if let Some(path) = &self.identity_file {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(IDENTITY_FILE_NAME)))
            .unwrap_or_else(|| PathBuf::from(IDENTITY_FILE_NAME))
    }
}
