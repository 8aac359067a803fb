//! nusb-based USB transport implementation.
//!
//! Receivers expose HID++ on the interface whose alternate setting carries
//! a 32-byte interrupt IN endpoint. Outbound reports do not use an OUT
//! endpoint at all; they go out as SET_REPORT class control transfers
//! addressed to that interface.

use nusb::MaybeFuture;
use nusb::transfer::{ControlOut, ControlType, In, Interrupt, Recipient};
use std::io::Read;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    BOOTLOADER_MODE_PIDS, BOOTLOADER_PID_MASK, BOOTLOADER_PID_PREFIX, FIRMWARE_MODE_PIDS,
    HID_REPORT_TYPE_OUTPUT, HID_SET_REPORT, IN_ENDPOINT_PACKET_SIZE, LOGITECH_VENDOR_ID,
};

/// How long one endpoint read may block before the reader loop gets a
/// chance to notice cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const CONTROL_WRITE_TIMEOUT: Duration = Duration::from_millis(250);

/// nusb-based transport for one receiver, in firmware or bootloader mode.
pub struct NusbTransport {
    // Held to keep the device open for the lifetime of the transport.
    _device: nusb::Device,
    interface: nusb::Interface,
    interface_number: u8,
    in_endpoint: u8,
    pid: u16,
}

impl NusbTransport {
    /// Open a receiver running its regular firmware.
    ///
    /// Tries the known receiver PIDs in priority order, then falls through
    /// to any Logitech device exposing a 32-byte interrupt IN endpoint. A
    /// fall-through device with an 0xaaxx product id is already sitting in
    /// its bootloader and is reported as such.
    #[instrument(level = "info")]
    pub fn open_firmware_mode() -> Result<Self, TransportError> {
        let devices: Vec<nusb::DeviceInfo> = list_logitech_devices()?;

        for &pid in FIRMWARE_MODE_PIDS {
            if let Some(info) = devices.iter().find(|d| d.product_id() == pid) {
                info!(pid = %format!("{pid:04x}"), "Logitech receiver found");
                return Self::open_device_info(info.clone());
            }
        }

        // Unknown Logitech device: accept it if it looks like a receiver.
        if let Some(info) = devices.into_iter().next() {
            if info.product_id() & BOOTLOADER_PID_MASK == BOOTLOADER_PID_PREFIX {
                return Err(TransportError::ReceiverInBootloaderMode);
            }
            info!(
                pid = %format!("{:04x}", info.product_id()),
                "unknown Logitech dongle found, trying it in firmware mode"
            );
            return Self::open_device_info(info);
        }

        Err(TransportError::NoDongle)
    }

    /// Open a receiver that already re-enumerated under a bootloader PID.
    #[instrument(level = "info")]
    pub fn open_bootloader_mode() -> Result<Self, TransportError> {
        let devices = list_logitech_devices()?;

        for &pid in BOOTLOADER_MODE_PIDS {
            if let Some(info) = devices.iter().find(|d| d.product_id() == pid) {
                info!(pid = %format!("{pid:04x}"), "receiver found in bootloader mode");
                return Self::open_device_info(info.clone());
            }
        }

        Err(TransportError::NoDongle)
    }

    fn open_device_info(info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let pid = info.product_id();
        let device = info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // The receivers carry a single configuration; walk it for the
        // HID++ endpoint.
        let config = device
            .configurations()
            .find(|c| c.configuration_value() == 1)
            .ok_or_else(|| TransportError::BadConfig("configuration 1 missing".into()))?;

        let mut selected: Option<(u8, u8)> = None;
        'outer: for iface in config.interfaces() {
            for alt in iface.alt_settings() {
                for ep in alt.endpoints() {
                    if ep.max_packet_size() == IN_ENDPOINT_PACKET_SIZE
                        && ep.direction() == nusb::transfer::Direction::In
                    {
                        selected = Some((iface.interface_number(), ep.address()));
                        break 'outer;
                    }
                }
            }
        }

        let (interface_number, in_endpoint) = selected.ok_or(TransportError::NoInEndpoint)?;

        // Release the interface from the kernel HID driver; paired devices
        // stop working on the host until the transport closes.
        let interface = device
            .detach_and_claim_interface(interface_number)
            .wait()
            .map_err(|e| TransportError::NoHidInterface(e.to_string()))?;

        info!(
            interface = interface_number,
            in_ep = %format!("0x{in_endpoint:02x}"),
            "HID++ interface claimed"
        );

        Ok(NusbTransport {
            _device: device,
            interface,
            interface_number,
            in_endpoint,
            pid,
        })
    }
}

fn list_logitech_devices() -> Result<Vec<nusb::DeviceInfo>, TransportError> {
    let devices = nusb::list_devices()
        .wait()
        .map_err(|e| TransportError::OpenFailed(e.to_string()))?
        .filter(|d| d.vendor_id() == LOGITECH_VENDOR_ID)
        .collect::<Vec<_>>();
    debug!(count = devices.len(), "Logitech devices on the bus");
    Ok(devices)
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, report), fields(len = report.len()))]
    fn submit(&self, report: &[u8]) -> Result<(), TransportError> {
        let report_id = report.first().copied().unwrap_or(0);
        self.interface
            .control_out(ControlOut {
                control_type: ControlType::Class,
                recipient: Recipient::Interface,
                request: HID_SET_REPORT,
                value: HID_REPORT_TYPE_OUTPUT | u16::from(report_id),
                index: u16::from(self.interface_number),
                data: report,
            }, CONTROL_WRITE_TIMEOUT)
            .wait()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        debug!("report submitted");
        Ok(())
    }

    fn poll(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let ep = self
            .interface
            .endpoint::<Interrupt, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;
        let mut reader = ep
            .reader(IN_ENDPOINT_PACKET_SIZE)
            .with_read_timeout(POLL_INTERVAL);
        let n = reader.read(buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::TimedOut {
                TransportError::PollTimeout
            } else {
                TransportError::ReadFailed(e.to_string())
            }
        })?;
        if n == 0 {
            warn!("zero-length interrupt transfer");
        }
        Ok(n)
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
