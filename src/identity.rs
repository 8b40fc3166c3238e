use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr as _;

use anyhow::Context as _;
use log::{debug, info, warn};
use mac_address::MacAddress;

/// The one tracked device address, kept in a single-line text file.
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        IdentityStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing, empty or unreadable file all mean "no identity yet".
    pub fn load(&self) -> Option<MacAddress> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("No identity file at {}", self.path.display());
                return None;
            }
            Err(err) => {
                warn!("Could not read {}: {}", self.path.display(), err);
                return None;
            }
        };

        let stored = contents.trim();
        if stored.is_empty() {
            return None;
        }
        match MacAddress::from_str(stored) {
            Ok(address) => {
                info!("Loaded stored MAC: {address}");
                Some(address)
            }
            Err(err) => {
                warn!(
                    "Ignoring {}: {:?} is not a device address ({})",
                    self.path.display(),
                    stored,
                    err
                );
                None
            }
        }
    }

    /// Overwrites the file with `address` in canonical upper-case form.
    pub fn save(&self, address: &MacAddress) -> anyhow::Result<()> {
        fs::write(&self.path, address.to_string())
            .with_context(|| format!("writing identity to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::mock::mac;

    fn store_in(dir: &tempfile::TempDir) -> IdentityStore {
        IdentityStore::new(dir.path().join("bluetooth_mac.txt"))
    }

    #[test]
    fn test_missing_file_is_no_identity() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(store_in(&dir).load(), None);
    }

    #[test]
    fn test_empty_file_is_no_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "  \n").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_garbage_is_no_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "my phone").unwrap();
        assert_eq!(store.load(), None);
    }

    #[test]
    fn test_save_then_load_from_a_fresh_store() {
        let dir = tempfile::tempdir().unwrap();
        store_in(&dir).save(&mac("aa:11:22:33:44:55")).unwrap();

        assert_eq!(store_in(&dir).load(), Some(mac("AA:11:22:33:44:55")));
        assert_eq!(
            fs::read_to_string(dir.path().join("bluetooth_mac.txt")).unwrap(),
            "AA:11:22:33:44:55"
        );
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save(&mac("AA:11:22:33:44:55")).unwrap();
        store.save(&mac("11:22:33:44:55:66")).unwrap();
        assert_eq!(store.load(), Some(mac("11:22:33:44:55:66")));
    }

    #[test]
    fn test_loads_hand_written_lowercase_with_newline() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        fs::write(store.path(), "aa:bb:cc:dd:ee:ff\n").unwrap();
        assert_eq!(store.load(), Some(mac("AA:BB:CC:DD:EE:FF")));
    }

    #[test]
    fn test_save_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = IdentityStore::new(dir.path().join("nope").join("mac.txt"));
        assert!(store.save(&mac("AA:BB:CC:DD:EE:FF")).is_err());
    }
}
