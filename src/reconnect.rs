use log::{debug, info, warn};
use mac_address::MacAddress;

use crate::radio::RadioStack;

/// Asks the stack to bring the link back. The outcome is not trusted; the next probe decides.
pub async fn attempt_reconnect<R: RadioStack>(radio: &R, identity: &MacAddress) {
    info!("Attempting to reconnect to {identity}...");
    if let Err(err) = radio.connect(identity).await {
        debug!("Reconnect to {identity} did not succeed: {err}");
    }
}

/// One link-layer ping so the peer does not drop an idle link.
pub async fn send_keep_alive<R: RadioStack>(radio: &R, identity: &MacAddress) {
    match radio.ping(identity).await {
        Ok(()) => debug!("Keep-alive ping sent to {identity}"),
        Err(err) => warn!("Keep-alive error: {err}"),
    }
}
