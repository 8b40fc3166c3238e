use std::future::Future;

use log::{debug, error, info, warn};
use mac_address::MacAddress;

use crate::buzzer::Buzzer;
use crate::config::Timing;
use crate::messages::{AlarmState, EpisodeOutcome, PresenceState, TickOutcome};
use crate::probe;
use crate::radio::RadioStack;
use crate::reconnect;

/// The presence loop. Sole owner of the buzzer.
pub struct Manager<R> {
    radio: R,
    buzzer: Box<dyn Buzzer>,
    identity: MacAddress,
    timing: Timing,
    state: Option<PresenceState>,
    alarm: AlarmState,
}

impl<R: RadioStack> Manager<R> {
    pub fn new(radio: R, buzzer: Box<dyn Buzzer>, identity: MacAddress, timing: Timing) -> Self {
        Manager {
            radio,
            buzzer,
            identity,
            timing,
            state: None,
            alarm: AlarmState::Off,
        }
    }

    /// Ticks every `check_interval` until `shutdown` resolves, then silences the buzzer.
    pub async fn run_loop(mut self, shutdown: impl Future<Output = ()>) {
        info!(
            "Bluetooth alarm started. Monitoring connection to {}",
            self.identity
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = self.cycle() => {}
            }
        }

        info!("Shutting down, buzzer off");
        self.set_alarm(AlarmState::Off);
    }

    async fn cycle(&mut self) {
        self.tick().await;
        tokio::time::sleep(self.timing.check_interval).await;
    }

    /// One pass of the loop body, without the trailing sleep.
    pub async fn tick(&mut self) -> TickOutcome {
        let outcome = if probe::is_connected(&self.radio, &self.identity).await {
            self.set_alarm(AlarmState::Off);
            reconnect::send_keep_alive(&self.radio, &self.identity).await;
            TickOutcome::Present
        } else {
            self.set_alarm(AlarmState::On);
            TickOutcome::Absent(self.retry_episode().await)
        };

        match outcome {
            TickOutcome::Present => {}
            TickOutcome::Absent(EpisodeOutcome::Restored(retries)) => {
                info!("{} is back after {} retries", self.identity, retries)
            }
            TickOutcome::Absent(EpisodeOutcome::Exhausted(retries)) => warn!(
                "Still no {} after {} retries, next check in {}s",
                self.identity,
                retries,
                self.timing.check_interval.as_secs()
            ),
        }

        let state = outcome.state();
        if self.state != Some(state) {
            match state {
                PresenceState::Connected => info!("Phone connected, buzzer off"),
                PresenceState::DisconnectedRetrying => warn!("Phone disconnected! Buzzer ON"),
            }
            self.state = Some(state);
        }
        outcome
    }

    /// One reconnect request, then up to `max_reconnect_attempts` more, `reconnect_interval` apart,
    /// stopping early once the device is back.
    async fn retry_episode(&self) -> EpisodeOutcome {
        reconnect::attempt_reconnect(&self.radio, &self.identity).await;

        let mut retries = 0;
        loop {
            if probe::is_connected(&self.radio, &self.identity).await {
                return EpisodeOutcome::Restored(retries);
            }
            if retries >= self.timing.max_reconnect_attempts {
                return EpisodeOutcome::Exhausted(retries);
            }
            tokio::time::sleep(self.timing.reconnect_interval).await;
            reconnect::attempt_reconnect(&self.radio, &self.identity).await;
            retries += 1;
        }
    }

    fn set_alarm(&mut self, state: AlarmState) {
        if self.alarm != state {
            debug!("Buzzer {} -> {}", self.alarm, state);
        }
        if let Err(err) = self.buzzer.set(state) {
            error!("Could not switch buzzer {state}: {err}");
        }
        self.alarm = state;
    }
}
