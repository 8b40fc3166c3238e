use std::io;
use std::process::ExitStatus;
use std::str::FromStr as _;
use std::sync::LazyLock;
use std::time::Duration;

use mac_address::MacAddress;
use regex::Regex;

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[0-9a-f]{2}(?::[0-9a-f]{2}){5}\b").expect("address pattern is valid")
});

#[derive(Debug, thiserror::Error)]
pub enum StackError {
    #[error("could not launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("talking to {program} failed: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not answer within {}s", after.as_secs())]
    Unresponsive { program: String, after: Duration },
    #[error("{program} exited with {status}")]
    Failed { program: String, status: ExitStatus },
}

/// The host's Bluetooth stack, as far as the alarm cares about it.
///
/// Every call is a point-in-time query or a best-effort request; none of them keep state on our side.
pub trait RadioStack {
    /// Addresses with a live link right now.
    async fn connected_addresses(&self) -> Result<Vec<MacAddress>, StackError>;

    /// Addresses in the stack's own pairing table.
    async fn paired_addresses(&self) -> Result<Vec<MacAddress>, StackError>;

    async fn remove(&self, address: &MacAddress) -> Result<(), StackError>;

    async fn trust(&self, address: &MacAddress) -> Result<(), StackError>;

    async fn connect(&self, address: &MacAddress) -> Result<(), StackError>;

    /// A single link-layer round trip.
    async fn ping(&self, address: &MacAddress) -> Result<(), StackError>;

    /// Starts the pairing agent in the background.
    async fn start_agent(&self) -> Result<(), StackError>;

    /// Powers the adapter and makes it discoverable, pairable and advertising under `alias`.
    async fn start_advertising(&self, alias: &str) -> Result<(), StackError>;
}

/// Pulls every hardware address out of free-form tool output, in order of appearance, without duplicates.
pub fn parse_addresses(text: &str) -> Vec<MacAddress> {
    let mut found = Vec::new();
    for m in ADDRESS_PATTERN.find_iter(text) {
        if let Ok(address) = MacAddress::from_str(m.as_str()) {
            if !found.contains(&address) {
                found.push(address);
            }
        }
    }
    found
}


#[cfg(test)]
mod tests {
    use super::mock::mac;
    use super::*;

    #[test]
    fn test_parse_hcitool_output() {
        let output = "Connections:\n\t< ACL 11:22:33:44:55:66 handle 11 state 1 lm MASTER AUTH ENCRYPT\n";
        assert_eq!(parse_addresses(output), vec![mac("11:22:33:44:55:66")]);
    }

    #[test]
    fn test_parse_paired_devices_mixed_case() {
        let output = "Device aa:bb:cc:dd:ee:ff Pixel 7\nDevice 01:23:45:67:89:AB Watch\n";
        assert_eq!(
            parse_addresses(output),
            vec![mac("AA:BB:CC:DD:EE:FF"), mac("01:23:45:67:89:ab")]
        );
    }

    #[test]
    fn test_parse_drops_duplicates_and_noise() {
        let output = "AA:BB:CC:DD:EE:FF\naa:bb:cc:dd:ee:ff\nnot 12:34:56 an address\nGG:BB:CC:DD:EE:FF\n";
        assert_eq!(parse_addresses(output), vec![mac("AA:BB:CC:DD:EE:FF")]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_addresses("Connections:\n").is_empty());
    }
}
