use std::time::Duration;

use log::{error, info, warn};
use mac_address::MacAddress;

use crate::radio::RadioStack;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no device connected within {}s", waited.as_secs())]
    NoDeviceAppeared { waited: Duration },
}

/// Is `identity` linked right now? Anything short of a clear "yes" counts as absent.
pub async fn is_connected<R: RadioStack>(radio: &R, identity: &MacAddress) -> bool {
    match radio.connected_addresses().await {
        Ok(addresses) => addresses.contains(identity),
        Err(err) => {
            error!("Error checking connection: {err}");
            false
        }
    }
}

/// Polls every `poll` until some device connects and returns the first address seen.
///
/// Without a `limit` this waits forever.
pub async fn discover_first_connection<R: RadioStack>(
    radio: &R,
    poll: Duration,
    limit: Option<Duration>,
) -> Result<MacAddress, DiscoveryError> {
    info!("Waiting for first Bluetooth device to connect...");

    let wait = async {
        loop {
            match radio.connected_addresses().await {
                Ok(addresses) => {
                    if let Some(first) = addresses.into_iter().next() {
                        return first;
                    }
                }
                Err(err) => warn!("Error polling for connections: {err}"),
            }
            tokio::time::sleep(poll).await;
        }
    };

    match limit {
        None => Ok(wait.await),
        Some(limit) => tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| DiscoveryError::NoDeviceAppeared { waited: limit }),
    }
}
