//! Flash session - orchestrates the firmware update end to end.
//!
//! Opens the receiver in firmware mode, reports the running firmware
//! family, reboots it into the bootloader, reopens it under the bootloader
//! PID and hands over to the flash procedure.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bootloader::BootloaderDongle;
use crate::dongle::Dongle;
use crate::events::{DongleEvent, DongleObserver, DonglePhase, LogLevel, log};
use crate::firmware::Firmware;
use crate::transport::TransportError;

fn default_reconnect_delay() -> u64 {
    3
}

/// Configuration for a flash session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Path to the firmware image, raw binary format.
    pub firmware_path: Option<String>,
    /// Path to a detached 256-byte signature blob.
    pub signature_path: Option<String>,
    /// Seconds to wait for USB re-enumeration after the ICP switch.
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for FlashConfig {
    fn default() -> Self {
        FlashConfig {
            firmware_path: None,
            signature_path: None,
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl FlashConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: FlashConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }
}

/// One firmware update run against the first receiver on the bus.
pub struct FlashSession<O: DongleObserver> {
    config: FlashConfig,
    observer: Arc<O>,
}

impl<O: DongleObserver + 'static> FlashSession<O> {
    pub fn new(config: FlashConfig, observer: Arc<O>) -> Self {
        FlashSession { config, observer }
    }

    /// Load the configured firmware (and signature, if any) and flash it.
    pub fn run(&self) -> Result<()> {
        let firmware = self.load_firmware()?;
        self.run_with(firmware)
    }

    fn load_firmware(&self) -> Result<Firmware> {
        let path = self
            .config
            .firmware_path
            .as_deref()
            .context("no firmware file configured")?;
        info!(path, "loading firmware image");
        let mut firmware = Firmware::load(path)?;

        if let Some(signature_path) = self.config.signature_path.as_deref() {
            match std::fs::read(signature_path) {
                Ok(signature) => firmware
                    .add_signature(&signature)
                    .context("attaching firmware signature")?,
                Err(e) => {
                    // A signed bootloader will still refuse the image later;
                    // unsigned ones do not need the blob at all.
                    warn!(path = signature_path, error = %e,
                        "could not read signature file, continuing without it");
                }
            }
        }
        Ok(firmware)
    }

    /// Flash an already-parsed firmware image.
    pub fn run_with(&self, firmware: Firmware) -> Result<()> {
        log(
            self.observer.as_ref(),
            LogLevel::Info,
            format!("about to flash: {firmware}"),
        );

        let bootloader = switch_and_open_bootloader(
            Arc::clone(&self.observer) as Arc<dyn DongleObserver>,
            Duration::from_secs(self.config.reconnect_delay_secs),
        )?;

        bootloader.flash(&firmware)?;
        bootloader.reboot()?;

        self.observer.on_event(&DongleEvent::PhaseChanged {
            phase: DonglePhase::Complete,
        });
        self.observer.on_event(&DongleEvent::Complete);
        Ok(())
    }
}

/// Reboot the receiver into its bootloader and open the re-enumerated
/// device.
///
/// A receiver that is already sitting in bootloader mode (e.g. after an
/// aborted flash) is picked up directly. Failing to open the firmware-mode
/// side is not fatal for the same reason.
pub fn switch_and_open_bootloader(
    observer: Arc<dyn DongleObserver>,
    reconnect_delay: Duration,
) -> Result<BootloaderDongle> {
    observer.on_event(&DongleEvent::PhaseChanged {
        phase: DonglePhase::SearchingReceiver,
    });

    match Dongle::open_with_observer(Arc::clone(&observer)) {
        Ok(dongle) => {
            observer.on_event(&DongleEvent::PhaseChanged {
                phase: DonglePhase::FirmwareMode,
            });

            // Name the running firmware before switching, so an operator
            // can recognise the device class in the logs.
            match dongle.get_firmware_version() {
                Ok((major, minor)) => {
                    let build = dongle.get_firmware_build().unwrap_or(0);
                    log(
                        observer.as_ref(),
                        LogLevel::Info,
                        format!("receiver is running {major}, version .{minor:02x}_B{build:04x}"),
                    );
                }
                Err(e) => warn!(error = %e, "could not read firmware version"),
            }

            observer.on_event(&DongleEvent::PhaseChanged {
                phase: DonglePhase::SwitchingToBootloader,
            });
            if let Err(e) = dongle.switch_to_bootloader() {
                warn!(error = %e, "ICP switch not acknowledged");
            }
            drop(dongle);
            thread::sleep(reconnect_delay);
        }
        Err(TransportError::ReceiverInBootloaderMode) => {
            log(
                observer.as_ref(),
                LogLevel::Info,
                "receiver is already in bootloader mode",
            );
        }
        Err(TransportError::NoDongle) => bail!(TransportError::NoDongle),
        Err(e) => {
            // Try the bootloader PIDs anyway; the device may be half way
            // through a previous switch.
            warn!(error = %e, "could not open receiver in firmware mode");
        }
    }

    let bootloader = BootloaderDongle::open_with_observer(Arc::clone(&observer))
        .context("can not open receiver in bootloader mode")?;
    observer.on_event(&DongleEvent::PhaseChanged {
        phase: DonglePhase::BootloaderMode,
    });
    Ok(bootloader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_roundtrips_through_toml() {
        let config = FlashConfig {
            firmware_path: Some("firmware.bin".into()),
            signature_path: None,
            reconnect_delay_secs: 5,
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: FlashConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.firmware_path.as_deref(), Some("firmware.bin"));
        assert_eq!(parsed.reconnect_delay_secs, 5);
    }

    #[test]
    fn reconnect_delay_defaults_when_absent() {
        let parsed: FlashConfig = toml::from_str("firmware_path = \"fw.bin\"\n").unwrap();
        assert_eq!(parsed.reconnect_delay_secs, 3);
    }
}
