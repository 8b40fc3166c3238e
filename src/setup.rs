use std::time::Duration;

use log::{error, info, warn};
use mac_address::MacAddress;

use crate::identity::IdentityStore;
use crate::probe::{self, DiscoveryError};
use crate::radio::RadioStack;

/// Settings for the one-shot startup sequence.
#[derive(Debug, Clone)]
pub struct SetupOptions {
    pub alias: String,
    pub discovery_poll: Duration,
    pub discovery_timeout: Option<Duration>,
}

/// Brings the adapter up, clears old pairings and settles on the device to watch.
///
/// Every radio step is best-effort. The only way out without an identity is a
/// configured discovery timeout running out.
pub async fn prepare<R: RadioStack>(
    radio: &R,
    store: &IdentityStore,
    options: &SetupOptions,
) -> Result<MacAddress, DiscoveryError> {
    if let Err(err) = radio.start_agent().await {
        error!("Error starting bt-agent: {err}");
    }
    if let Err(err) = radio.start_advertising(&options.alias).await {
        warn!("Bluetoothctl error while advertising: {err}");
    }

    // Read before clearing so a stored device can be re-trusted afterwards.
    let stored = store.load();

    clear_pairings(radio).await;

    if let Some(identity) = stored {
        if let Err(err) = radio.trust(&identity).await {
            warn!("Could not trust {identity}: {err}");
        }
        return Ok(identity);
    }

    let identity =
        probe::discover_first_connection(radio, options.discovery_poll, options.discovery_timeout)
            .await?;
    info!("New device connected, storing MAC: {identity}");
    if let Err(err) = store.save(&identity) {
        error!("{err:#}");
    }
    Ok(identity)
}

async fn clear_pairings<R: RadioStack>(radio: &R) {
    info!("Clearing all previous Bluetooth pairings...");
    let paired = match radio.paired_addresses().await {
        Ok(paired) => paired,
        Err(err) => {
            error!("Error clearing Bluetooth: {err}");
            return;
        }
    };
    for address in paired {
        match radio.remove(&address).await {
            Ok(()) => info!("Removed paired device: {address}"),
            Err(err) => warn!("Could not remove paired device {address}: {err}"),
        }
    }
}
