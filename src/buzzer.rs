use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::BuzzerConfig;
use crate::messages::AlarmState;

#[derive(Debug, thiserror::Error)]
#[error("GPIO write to {path} failed: {source}")]
pub struct BuzzerError {
    path: PathBuf,
    #[source]
    source: io::Error,
}

/// The alarm output. Implementations must tolerate repeated calls in the same state.
pub trait Buzzer {
    fn activate(&mut self) -> Result<(), BuzzerError>;

    fn deactivate(&mut self) -> Result<(), BuzzerError>;

    /// Gives the output line back to the system.
    fn release(&mut self) -> Result<(), BuzzerError>;

    fn set(&mut self, state: AlarmState) -> Result<(), BuzzerError> {
        match state {
            AlarmState::On => self.activate(),
            AlarmState::Off => {
                let silenced = self.deactivate();
                self.release()?;
                silenced
            }
        }
    }
}

/// A buzzer on a GPIO line, driven through the Linux sysfs interface.
///
/// `pin` is the SoC line number (Broadcom numbering on a Pi). Sysfs numbers
/// lines globally, so the SoC controller's base is added before exporting.
/// The line is exported on the first activation and unexported again on
/// release, so it is only claimed while the alarm is sounding.
#[derive(Debug)]
pub struct GpioBuzzer {
    root: PathBuf,
    pin: u32,
    active_low: bool,
    /// Sysfs number of the line while it is exported by us.
    claimed: Option<u32>,
}

/// Labels of the controller wired to the Pi header, most specific first.
const SOC_CHIP_LABELS: &[&str] = &["pinctrl-rp1", "pinctrl-bcm2711", "pinctrl-bcm2835"];

impl GpioBuzzer {
    pub fn new(config: &BuzzerConfig) -> Self {
        GpioBuzzer {
            root: config
                .gpio_root
                .clone()
                .unwrap_or_else(|| PathBuf::from("/sys/class/gpio")),
            pin: config.pin.unwrap_or(17),
            active_low: config.active_low.unwrap_or(true),
            claimed: None,
        }
    }

    fn line_dir(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{line}"))
    }

    fn level(&self, state: AlarmState) -> &'static str {
        match (state, self.active_low) {
            (AlarmState::On, false) | (AlarmState::Off, true) => "1",
            (AlarmState::On, true) | (AlarmState::Off, false) => "0",
        }
    }

    fn claim(&mut self) -> Result<u32, BuzzerError> {
        if let Some(line) = self.claimed {
            return Ok(line);
        }
        let line = soc_chip_base(&self.root)? + self.pin;
        if !self.line_dir(line).exists() {
            write(&self.root.join("export"), &line.to_string())?;
        }
        write(&self.line_dir(line).join("direction"), "out")?;
        debug!("Claimed GPIO {} (sysfs line {})", self.pin, line);
        self.claimed = Some(line);
        Ok(line)
    }
}

/// Sysfs base of the SoC's own GPIO controller. Kernels from 6.6 on no longer start it at 0.
///
/// Falls back to the lowest base present, and to 0 when no controller is listed.
fn soc_chip_base(root: &Path) -> Result<u32, BuzzerError> {
    let entries = fs::read_dir(root).map_err(|source| BuzzerError {
        path: root.to_path_buf(),
        source,
    })?;

    let mut chips = Vec::new();
    for entry in entries.flatten() {
        if !entry.file_name().to_string_lossy().starts_with("gpiochip") {
            continue;
        }
        let dir = entry.path();
        let base_path = dir.join("base");
        let base = read_trimmed(&base_path)?
            .parse::<u32>()
            .map_err(|err| BuzzerError {
                path: base_path,
                source: io::Error::new(io::ErrorKind::InvalidData, err),
            })?;
        let label = read_trimmed(&dir.join("label")).unwrap_or_default();
        chips.push((label, base));
    }

    let soc = SOC_CHIP_LABELS
        .iter()
        .find_map(|wanted| chips.iter().find(|(label, _)| label == wanted));
    Ok(soc
        .or_else(|| chips.iter().min_by_key(|(_, base)| *base))
        .map(|(_, base)| *base)
        .unwrap_or(0))
}

fn read_trimmed(path: &Path) -> Result<String, BuzzerError> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| BuzzerError {
            path: path.to_path_buf(),
            source,
        })
}

fn write(path: &Path, value: &str) -> Result<(), BuzzerError> {
    fs::write(path, value).map_err(|source| BuzzerError {
        path: path.to_path_buf(),
        source,
    })
}

impl Buzzer for GpioBuzzer {
    fn activate(&mut self) -> Result<(), BuzzerError> {
        let line = self.claim()?;
        write(
            &self.line_dir(line).join("value"),
            self.level(AlarmState::On),
        )
    }

    fn deactivate(&mut self) -> Result<(), BuzzerError> {
        let Some(line) = self.claimed else {
            return Ok(());
        };
        write(
            &self.line_dir(line).join("value"),
            self.level(AlarmState::Off),
        )
    }

    fn release(&mut self) -> Result<(), BuzzerError> {
        let Some(line) = self.claimed.take() else {
            return Ok(());
        };
        write(&self.root.join("unexport"), &line.to_string())?;
        debug!("Released GPIO {} (sysfs line {})", self.pin, line);
        Ok(())
    }
}

impl Drop for GpioBuzzer {
    fn drop(&mut self) {
        if let Err(err) = self.set(AlarmState::Off) {
            warn!("Could not release buzzer pin: {err}");
        }
    }
}

/// Stands in for the hardware when running with `--dry-fire`.
#[derive(Debug, Default)]
pub struct DryFireBuzzer;

impl Buzzer for DryFireBuzzer {
    fn activate(&mut self) -> Result<(), BuzzerError> {
        info!("[DRY FIRE MODE] Buzzer ON");
        Ok(())
    }

    fn deactivate(&mut self) -> Result<(), BuzzerError> {
        info!("[DRY FIRE MODE] Buzzer OFF");
        Ok(())
    }

    fn release(&mut self) -> Result<(), BuzzerError> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs() -> (tempfile::TempDir, GpioBuzzer) {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("gpio17")).unwrap();
        let buzzer = GpioBuzzer::new(&BuzzerConfig {
            gpio_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        (dir, buzzer)
    }

    fn read(dir: &tempfile::TempDir, file: &str) -> String {
        fs::read_to_string(dir.path().join(file)).unwrap()
    }

    #[test]
    fn test_active_low_alarm_drives_pin_low() {
        let (dir, mut buzzer) = fake_sysfs();
        buzzer.set(AlarmState::On).unwrap();
        assert_eq!(read(&dir, "gpio17/direction"), "out");
        assert_eq!(read(&dir, "gpio17/value"), "0");
    }

    #[test]
    fn test_on_twice_is_same_as_once() {
        let (dir, mut buzzer) = fake_sysfs();
        buzzer.set(AlarmState::On).unwrap();
        buzzer.set(AlarmState::On).unwrap();
        assert_eq!(read(&dir, "gpio17/value"), "0");
        assert_eq!(buzzer.claimed, Some(17));
        assert!(!dir.path().join("export").exists());
    }

    #[test]
    fn test_off_silences_then_releases() {
        let (dir, mut buzzer) = fake_sysfs();
        buzzer.set(AlarmState::On).unwrap();
        buzzer.set(AlarmState::Off).unwrap();
        assert_eq!(read(&dir, "gpio17/value"), "1");
        assert_eq!(read(&dir, "unexport"), "17");
        assert_eq!(buzzer.claimed, None);
    }

    #[test]
    fn test_off_without_claim_touches_nothing() {
        let (dir, mut buzzer) = fake_sysfs();
        buzzer.set(AlarmState::Off).unwrap();
        assert!(!dir.path().join("gpio17/value").exists());
        assert!(!dir.path().join("unexport").exists());
    }

    #[test]
    fn test_exports_missing_pin() {
        let dir = tempfile::tempdir().unwrap();
        let mut buzzer = GpioBuzzer::new(&BuzzerConfig {
            pin: Some(22),
            active_low: Some(false),
            gpio_root: Some(dir.path().to_path_buf()),
        });
        // Real sysfs creates gpio22/ on export; a plain directory does not.
        assert!(buzzer.activate().is_err());
        assert_eq!(read(&dir, "export"), "22");
    }

    #[test]
    fn test_active_high_polarity() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("gpio5")).unwrap();
        let mut buzzer = GpioBuzzer::new(&BuzzerConfig {
            pin: Some(5),
            active_low: Some(false),
            gpio_root: Some(dir.path().to_path_buf()),
        });
        buzzer.activate().unwrap();
        assert_eq!(read(&dir, "gpio5/value"), "1");
    }

    #[test]
    fn test_drop_releases_claimed_pin() {
        let (dir, mut buzzer) = fake_sysfs();
        buzzer.activate().unwrap();
        drop(buzzer);
        assert_eq!(read(&dir, "unexport"), "17");
    }

    fn fake_chip(dir: &tempfile::TempDir, name: &str, base: u32, label: &str) {
        let chip = dir.path().join(name);
        fs::create_dir(&chip).unwrap();
        fs::write(chip.join("base"), format!("{base}\n")).unwrap();
        fs::write(chip.join("label"), format!("{label}\n")).unwrap();
    }

    #[test]
    fn test_pin_is_offset_by_soc_chip_base() {
        let dir = tempfile::tempdir().unwrap();
        fake_chip(&dir, "gpiochip512", 512, "pinctrl-bcm2711");
        fs::create_dir(dir.path().join("gpio529")).unwrap();
        let mut buzzer = GpioBuzzer::new(&BuzzerConfig {
            gpio_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        });

        buzzer.set(AlarmState::On).unwrap();
        assert_eq!(read(&dir, "gpio529/value"), "0");
        assert!(!dir.path().join("gpio17").exists());

        buzzer.set(AlarmState::Off).unwrap();
        assert_eq!(read(&dir, "unexport"), "529");
    }

    #[test]
    fn test_exports_offset_line_number() {
        let dir = tempfile::tempdir().unwrap();
        fake_chip(&dir, "gpiochip512", 512, "pinctrl-bcm2711");
        let mut buzzer = GpioBuzzer::new(&BuzzerConfig {
            gpio_root: Some(dir.path().to_path_buf()),
            ..Default::default()
        });
        // No gpio529/ appears without a real kernel behind the export file.
        assert!(buzzer.activate().is_err());
        assert_eq!(read(&dir, "export"), "529");
    }

    #[test]
    fn test_header_chip_wins_over_lower_base() {
        let dir = tempfile::tempdir().unwrap();
        fake_chip(&dir, "gpiochip512", 512, "raspberrypi-exp-gpio");
        fake_chip(&dir, "gpiochip571", 571, "pinctrl-rp1");
        assert_eq!(soc_chip_base(dir.path()).unwrap(), 571);
    }

    #[test]
    fn test_unknown_chips_use_lowest_base() {
        let dir = tempfile::tempdir().unwrap();
        fake_chip(&dir, "gpiochip600", 600, "some-expander");
        fake_chip(&dir, "gpiochip0", 0, "other-soc");
        assert_eq!(soc_chip_base(dir.path()).unwrap(), 0);
    }

    #[test]
    fn test_dry_fire_never_fails() {
        let mut buzzer = DryFireBuzzer;
        assert!(buzzer.set(AlarmState::On).is_ok());
        assert!(buzzer.set(AlarmState::On).is_ok());
        assert!(buzzer.set(AlarmState::Off).is_ok());
    }
}
