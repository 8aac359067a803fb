//! High-level operations on a receiver running its regular firmware.
//!
//! Everything here is built on HID++ register reads/writes addressed to
//! device id 0xff, plus the DJ notifications that interleave with them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::device::{
    DeviceInfo, DeviceType, DongleInfo, FirmwareMajor, ReportTypes, SetInfo, derive_link_key,
};
use crate::dispatch::{Dispatcher, ExchangeError, RESPONSE_DEADLINE};
use crate::events::{DongleEvent, DongleObserver, LogLevel, NullObserver, log};
use crate::protocol::constants::*;
use crate::protocol::report::{DjType, HidppMsg, Report, SubId};
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// Flash pages that may hold the active device-data table. The first two
/// are used by BOT03.01 firmwares, the last two by BOT03.02.
const KEY_DATA_PAGES: [u16; 4] = [0xe400, 0xe800, 0xec00, 0xf000];

/// First byte of the active device-data flash page.
const ACTIVE_PAGE_MARKER: u8 = 0x3f;

/// Device-data records are 0x14 bytes; 3 receiver entries plus up to 5 per
/// device bound the scan.
const KEY_RECORD_SIZE: u16 = 0x14;
const KEY_RECORD_MAX_STEPS: u16 = 3 + 5 * 6;

#[derive(Error, Debug)]
pub enum DongleError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error("invalid device index {0}")]
    InvalidDeviceIndex(u8),

    #[error("missing response while reading {0}")]
    MissingResponse(&'static str),

    #[error("can not read flash byte at {0:#06x}")]
    FlashByteUnreadable(u16),

    #[error("could not find active flash page with device data")]
    NoActiveFlashPage,

    #[error("could not find key data record for device index {0}")]
    NoKeyRecord(u8),

    #[error("pairing timeout or interrupted")]
    PairingTimeout,

    #[error("unsupported device")]
    PairingUnsupportedDevice,

    #[error("too many devices")]
    PairingTooManyDevices,

    #[error("connection sequence timeout")]
    PairingConnectionSequenceTimeout,

    #[error("pairing aborted with unknown reason (status {0:#04x})")]
    PairingAborted(u8),
}

/// One receiver opened in firmware mode.
pub struct Dongle {
    dispatcher: Dispatcher<Report>,
    observer: Arc<dyn DongleObserver>,
}

impl Dongle {
    /// Find and open a receiver on the bus.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_observer(Arc::new(NullObserver))
    }

    pub fn open_with_observer(observer: Arc<dyn DongleObserver>) -> Result<Self, TransportError> {
        let transport = Arc::new(NusbTransport::open_firmware_mode()?);
        observer.on_event(&DongleEvent::ReceiverFound {
            pid: transport.product_id(),
        });
        Ok(Self::with_transport(transport, observer))
    }

    /// Run the receiver protocol over an arbitrary transport.
    pub fn with_transport(
        transport: Arc<dyn UsbTransport>,
        observer: Arc<dyn DongleObserver>,
    ) -> Self {
        let dispatcher = Dispatcher::with_observer(transport, Arc::clone(&observer));
        Dongle {
            dispatcher,
            observer,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher<Report> {
        &self.dispatcher
    }

    fn get_register(&self, parameters: &[u8]) -> Result<Vec<Report>, ExchangeError> {
        self.dispatcher
            .send_and_collect(DEVICE_ID_RECEIVER, SubId::GetRegister, parameters)
    }

    fn set_register(&self, parameters: &[u8]) -> Result<Vec<Report>, ExchangeError> {
        self.dispatcher
            .send_and_collect(DEVICE_ID_RECEIVER, SubId::SetRegister, parameters)
    }

    fn get_long_register(&self, parameters: &[u8]) -> Result<Vec<Report>, ExchangeError> {
        self.dispatcher
            .send_and_collect(DEVICE_ID_RECEIVER, SubId::GetLongRegister, parameters)
    }

    /// Count of devices currently paired to the receiver.
    pub fn get_num_paired_devices(&self) -> Result<u8, DongleError> {
        let responses = self.get_register(&[REG_CONNECTION_STATE])?;
        let response = find_register_response(&responses, SubId::GetRegister, REG_CONNECTION_STATE)
            .ok_or(DongleError::MissingResponse("paired device count"))?;
        Ok(response.params[2])
    }

    /// Wake notifications for connection events on the HID++ channel.
    pub fn enable_wireless_notifications(&self) -> Result<(), DongleError> {
        self.set_register(&[REG_WIRELESS_NOTIFICATIONS, 0x00, 0x01])?;
        Ok(())
    }

    /// Ask the receiver to replay arrival notifications for all paired
    /// devices.
    pub fn trigger_device_arrival(&self) -> Result<(), DongleError> {
        self.set_register(&[REG_CONNECTION_STATE, 0x02])?;
        Ok(())
    }

    /// Per-device activity counters (long read of register 0xb3).
    pub fn get_device_activity_counters(&self) -> Result<[u8; 6], DongleError> {
        let responses = self.get_long_register(&[REG_DEVICE_ACTIVITY])?;
        let response =
            find_register_response(&responses, SubId::GetLongRegister, REG_DEVICE_ACTIVITY)
                .ok_or(DongleError::MissingResponse("device activity counters"))?;
        let mut counters = [0u8; 6];
        counters.copy_from_slice(&response.params[1..7]);
        Ok(counters)
    }

    /// Firmware version of the running receiver firmware.
    pub fn get_firmware_version(&self) -> Result<(FirmwareMajor, u8), DongleError> {
        let response = self.read_firmware_info(0x01, "receiver firmware version")?;
        Ok((FirmwareMajor(response[0]), response[1]))
    }

    /// Firmware build number.
    pub fn get_firmware_build(&self) -> Result<u16, DongleError> {
        let response = self.read_firmware_info(0x02, "receiver firmware build")?;
        Ok(u16::from_be_bytes(response))
    }

    /// Bootloader version as reported by the running firmware.
    pub fn get_bootloader_version(&self) -> Result<(u8, u8), DongleError> {
        let response = self.read_firmware_info(0x04, "receiver bootloader version")?;
        Ok((response[0], response[1]))
    }

    fn read_firmware_info(
        &self,
        selector: u8,
        what: &'static str,
    ) -> Result<[u8; 2], DongleError> {
        let responses = self.get_register(&[REG_FIRMWARE_INFO, selector, 0x00])?;
        let response = responses
            .iter()
            .filter_map(Report::as_hidpp)
            .find(|msg| {
                msg.sub_id == SubId::GetRegister
                    && msg.params[0] == REG_FIRMWARE_INFO
                    && msg.params[1] == selector
            })
            .ok_or(DongleError::MissingResponse(what))?;
        Ok([response.params[2], response.params[3]])
    }

    /// Receiver identity: firmware and bootloader versions, wireless PID,
    /// serial, and the count of paired devices.
    pub fn get_dongle_info(&self) -> Result<DongleInfo, DongleError> {
        let mut info = DongleInfo::default();

        let responses = self.get_long_register(&[REG_PAIRING_INFORMATION, 0x02])?;
        let versions = find_pairing_information(&responses, 0x02)
            .ok_or(DongleError::MissingResponse("receiver version record"))?;
        info.fw_major = versions.params[2];
        info.fw_minor = versions.params[3];
        info.fw_build = u16::from_be_bytes([versions.params[4], versions.params[5]]);
        info.wpid = [versions.params[6], versions.params[7]];
        info.likely_proto = versions.params[8];

        // One 0x03 record exists per device; the first carries the serial.
        let responses = self.get_long_register(&[REG_PAIRING_INFORMATION, 0x03])?;
        let serial = find_pairing_information(&responses, 0x03)
            .ok_or(DongleError::MissingResponse("receiver serial record"))?;
        info.serial.copy_from_slice(&serial.params[2..6]);

        // Tolerated to fail: very old firmwares do not expose it.
        if let Ok((bl_major, bl_minor)) = self.get_bootloader_version() {
            info.bootloader_major = bl_major;
            info.bootloader_minor = bl_minor;
        }

        info.num_paired = self.get_num_paired_devices().unwrap_or(0);
        Ok(info)
    }

    /// Assemble the descriptor of the device paired at `index` (0-based).
    pub fn get_device_info(&self, index: u8) -> Result<DeviceInfo, DongleError> {
        if index > 6 {
            return Err(DongleError::InvalidDeviceIndex(index));
        }

        let mut device = DeviceInfo {
            index,
            ..Default::default()
        };

        let selector = 0x20 + index;
        let responses = self.get_long_register(&[REG_PAIRING_INFORMATION, selector])?;
        let pairing = find_pairing_information(&responses, selector)
            .ok_or(DongleError::MissingResponse("device pairing info"))?;
        device.destination_id = pairing.params[2];
        device.default_report_interval = Duration::from_millis(u64::from(pairing.params[3]));
        device.wpid = [pairing.params[4], pairing.params[5]];
        device.device_type = DeviceType::from(pairing.params[8]);
        device.caps = pairing.params[9];

        let selector = 0x30 + index;
        let responses = self.get_long_register(&[REG_PAIRING_INFORMATION, selector])?;
        let extended = find_pairing_information(&responses, selector)
            .ok_or(DongleError::MissingResponse("device extended pairing info"))?;
        device.serial.copy_from_slice(&extended.params[2..6]);
        device.report_types = ReportTypes::from_le_slice(&extended.params[6..10]);
        device.usability = extended.params[10];

        let selector = 0x40 + index;
        let responses = self.get_long_register(&[REG_PAIRING_INFORMATION, selector])?;
        let name = find_pairing_information(&responses, selector)
            .ok_or(DongleError::MissingResponse("device name"))?;
        let name_len = (name.params[2] as usize).min(14);
        device.name = String::from_utf8_lossy(&name.params[3..3 + name_len]).into_owned();

        // Key material only exists on some receiver generations; its
        // absence is not an enumeration failure.
        if let Ok(raw) = self.dump_raw_key_data(index) {
            device.link_key = if raw.iter().any(|b| *b != 0) {
                Some(derive_link_key(&raw))
            } else {
                None
            };
            device.raw_key = Some(raw);
        }

        Ok(device)
    }

    /// Enumerate every paired device. Empty slots are skipped until the
    /// paired count is satisfied.
    pub fn get_all_devices(&self) -> Result<Vec<DeviceInfo>, DongleError> {
        let mut remaining = self.get_num_paired_devices()?;
        let mut devices = Vec::new();
        let mut index = 0u8;
        while index < 8 && remaining > 0 {
            match self.get_device_info(index) {
                Ok(device) => {
                    devices.push(device);
                    remaining -= 1;
                }
                Err(e) => debug!(index, error = %e, "slot skipped during enumeration"),
            }
            index += 1;
        }
        Ok(devices)
    }

    /// Full snapshot: receiver descriptor plus all paired devices.
    pub fn get_set_info(&self) -> Result<SetInfo, DongleError> {
        let mut set = SetInfo {
            dongle: self.get_dongle_info()?,
            devices: Vec::new(),
        };
        for device in self.get_all_devices()? {
            set.add_device(device);
        }
        set.dongle.num_paired = set.devices.len() as u8;
        Ok(set)
    }

    /// Open the pairing lock for `timeout_seconds` and block until it
    /// closes again or a device arrives.
    pub fn pair(&self, timeout_seconds: u8, device_number: u8) -> Result<(), DongleError> {
        self.enable_pairing(timeout_seconds, device_number)?;
        self.wait_for_pairing_result(timeout_seconds)
    }

    /// Open the pairing lock without waiting for the outcome.
    pub fn enable_pairing(
        &self,
        timeout_seconds: u8,
        device_number: u8,
    ) -> Result<(), DongleError> {
        log(
            self.observer.as_ref(),
            LogLevel::Info,
            format!("enabling pairing for {timeout_seconds} seconds"),
        );
        let open_lock = 0x01;
        self.set_register(&[REG_PAIRING, open_lock, device_number, timeout_seconds])?;
        Ok(())
    }

    /// Drain reports until the receiver closes the pairing lock or a DJ
    /// "device paired" notification arrives.
    pub fn wait_for_pairing_result(&self, timeout_seconds: u8) -> Result<(), DongleError> {
        // The receiver closes the lock by itself; the grace period only
        // covers a receiver that stops responding entirely.
        let deadline = Instant::now() + Duration::from_secs(u64::from(timeout_seconds) + 10);

        loop {
            let report = match self.dispatcher.recv_timeout(RESPONSE_DEADLINE) {
                Ok(report) => report,
                Err(_) => {
                    if Instant::now() >= deadline {
                        return Err(DongleError::PairingTimeout);
                    }
                    continue;
                }
            };

            match &report {
                Report::Hidpp(msg)
                    if msg.sub_id == SubId::ReceiverLockingInformation
                        && msg.params[0] & 0x01 == 0 =>
                {
                    // Lock closed; the second parameter is the outcome.
                    return match msg.params[1] {
                        0x00 => Ok(()),
                        0x01 => Err(DongleError::PairingTimeout),
                        0x02 => Err(DongleError::PairingUnsupportedDevice),
                        0x03 => Err(DongleError::PairingTooManyDevices),
                        0x06 => Err(DongleError::PairingConnectionSequenceTimeout),
                        other => Err(DongleError::PairingAborted(other)),
                    };
                }
                Report::Hidpp(msg) if msg.sub_id == SubId::DeviceConnection => {
                    let wpid = u16::from(msg.params[3]) << 8 | u16::from(msg.params[2]);
                    log(
                        self.observer.as_ref(),
                        LogLevel::Info,
                        format!(
                            "device connection on index {:#04x}, type {}, WPID {wpid:#06x}",
                            msg.device_id,
                            DeviceType::from(msg.params[1])
                        ),
                    );
                }
                Report::Dj(dj) if dj.report_type == DjType::NotificationDevicePaired => {
                    log(
                        self.observer.as_ref(),
                        LogLevel::Info,
                        "new device paired".to_string(),
                    );
                    return Ok(());
                }
                other => {
                    log(
                        self.observer.as_ref(),
                        LogLevel::Debug,
                        format!("report while pairing: {other}"),
                    );
                }
            }
        }
    }

    /// Close the pairing lock.
    pub fn disable_pairing(&self) -> Result<(), DongleError> {
        let close_lock = 0x02;
        self.set_register(&[REG_PAIRING, close_lock, 0x00, 0x00])?;
        Ok(())
    }

    /// Unpair the device in `slot` (0-based). The wire uses 1-based slot
    /// numbers for this one operation.
    pub fn unpair(&self, slot: u8) -> Result<(), DongleError> {
        let unpair = 0x03;
        self.set_register(&[REG_PAIRING, unpair, slot + 1])?;
        Ok(())
    }

    /// Reboot the receiver into its bootloader. No response follows; the
    /// device re-enumerates under a bootloader PID.
    pub fn switch_to_bootloader(&self) -> Result<(), DongleError> {
        let request = HidppMsg::request(
            DEVICE_ID_RECEIVER,
            SubId::SetRegister,
            &[REG_FIRMWARE_UPDATE, b'I', b'C', b'P'],
        );
        self.dispatcher
            .send(Report::Hidpp(request))
            .map_err(ExchangeError::from)?;
        Ok(())
    }

    /// Read one flash byte through the undocumented 0xd4 register.
    ///
    /// Addressable regions depend on the hardware generation: CU0007
    /// exposes 0x0000..0x000f (aliased into the active pairing page),
    /// 0x6c00..0x6fff and the nRF info page at 0xfe00..0xffff; newer
    /// receivers answer any address but zero out unprovisioned regions.
    pub fn dump_flash_byte(&self, addr: u16) -> Result<u8, DongleError> {
        let [addr_lo, addr_hi] = addr.to_le_bytes();
        let responses = match self.get_register(&[REG_MEMDUMP, addr_lo, addr_hi]) {
            Ok(responses) => responses,
            // The register echo often rides along even when the exchange
            // closes with an error; scan whatever was collected.
            Err(e @ (ExchangeError::Timeout { .. } | ExchangeError::Hidpp { .. })) => {
                e.collected().to_vec()
            }
            Err(e) => return Err(e.into()),
        };
        responses
            .iter()
            .filter_map(Report::as_hidpp)
            .find(|msg| msg.params[0] == REG_MEMDUMP)
            .map(|msg| msg.params[3])
            .ok_or(DongleError::FlashByteUnreadable(addr))
    }

    /// Walk the whole 16-bit flash address space through register 0xd4.
    /// Unreadable bytes come back as 0xff.
    pub fn dump_flash(&self) -> Result<Vec<u8>, DongleError> {
        let mut dump = Vec::with_capacity(0x1_0000);
        for addr in 0..=0xffffu16 {
            let byte = self.dump_flash_byte(addr).unwrap_or(0xff);
            dump.push(byte);
            if addr % 0x400 == 0 {
                self.observer.on_event(&DongleEvent::Progress {
                    operation: "dumping receiver memory",
                    current: u64::from(addr),
                    total: 0x1_0000,
                });
            }
        }
        Ok(dump)
    }

    /// Recover the 16 raw key bytes for device `index` from the active
    /// device-data flash page.
    pub fn dump_raw_key_data(&self, index: u8) -> Result<[u8; 16], DongleError> {
        let mut active_page = None;
        for page in KEY_DATA_PAGES {
            if let Ok(byte) = self.dump_flash_byte(page)
                && byte == ACTIVE_PAGE_MARKER
            {
                active_page = Some(page);
                break;
            }
        }
        let active_page = active_page.ok_or(DongleError::NoActiveFlashPage)?;

        // Records start right after the page marker word.
        let first_record = active_page + 4;
        let marker = 0x60 + index;
        let mut key_addr = None;
        for step in 0..KEY_RECORD_MAX_STEPS {
            let addr = first_record + step * KEY_RECORD_SIZE;
            if let Ok(byte) = self.dump_flash_byte(addr)
                && byte == marker
            {
                key_addr = Some(addr + 4);
                break;
            }
        }
        let key_addr = key_addr.ok_or(DongleError::NoKeyRecord(index))?;

        let mut raw = [0u8; 16];
        for (offset, byte) in raw.iter_mut().enumerate() {
            *byte = self.dump_flash_byte(key_addr + offset as u16)?;
        }
        Ok(raw)
    }
}

fn find_register_response<'r>(
    responses: &'r [Report],
    sub_id: SubId,
    register: u8,
) -> Option<&'r HidppMsg> {
    responses
        .iter()
        .filter_map(Report::as_hidpp)
        .find(|msg| msg.sub_id == sub_id && msg.params[0] == register)
}

fn find_pairing_information<'r>(responses: &'r [Report], selector: u8) -> Option<&'r HidppMsg> {
    responses.iter().filter_map(Report::as_hidpp).find(|msg| {
        msg.sub_id == SubId::GetLongRegister
            && msg.params[0] == REG_PAIRING_INFORMATION
            && msg.params[1] == selector
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn dongle_with(mock: MockTransport) -> Dongle {
        Dongle::with_transport(Arc::new(mock), Arc::new(NullObserver))
    }

    #[test]
    fn counts_paired_devices() {
        let mock = MockTransport::new();
        mock.queue_report(&[0x10, 0xff, 0x81, 0x02, 0x00, 0x03, 0x00]);
        let dongle = dongle_with(mock);

        assert_eq!(dongle.get_num_paired_devices().unwrap(), 3);
    }

    #[test]
    fn pairing_reports_unsupported_device() {
        let mock = MockTransport::new();
        // Lock-open acknowledgment, then the lock closes with status 0x02.
        mock.queue_report(&[0x10, 0xff, 0x80, 0xb2, 0x01, 0x00, 0x00]);
        mock.queue_report(&[0x10, 0xff, 0x4a, 0x00, 0x02, 0x00, 0x00]);
        let dongle = dongle_with(mock);

        assert!(matches!(
            dongle.pair(10, 0x01),
            Err(DongleError::PairingUnsupportedDevice)
        ));
    }

    #[test]
    fn pairing_succeeds_on_dj_paired_notification() {
        let mock = MockTransport::new();
        mock.queue_report(&[0x10, 0xff, 0x80, 0xb2, 0x01, 0x00, 0x00]);
        let mut dj = vec![0u8; 15];
        dj[0] = 0x20;
        dj[1] = 0x02;
        dj[2] = 0x41;
        mock.queue_report(&dj);
        let dongle = dongle_with(mock);

        dongle.pair(10, 0x01).unwrap();
    }

    /// Responder emulating the undocumented 0xd4 flash dump register.
    fn memdump_responder(
        byte_at: impl Fn(u16) -> u8 + Send + 'static,
    ) -> impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
        move |out: &[u8]| {
            if out.len() == 7 && out[0] == 0x10 && out[2] == 0x81 && out[3] == REG_MEMDUMP {
                let addr = u16::from_le_bytes([out[4], out[5]]);
                vec![vec![
                    0x10,
                    0xff,
                    0x81,
                    REG_MEMDUMP,
                    out[4],
                    out[5],
                    byte_at(addr),
                ]]
            } else {
                Vec::new()
            }
        }
    }

    #[test]
    fn flash_byte_dump_reads_one_byte() {
        let mock = MockTransport::new();
        mock.set_responder(memdump_responder(|addr| (addr & 0xff) as u8));
        let dongle = dongle_with(mock);

        assert_eq!(dongle.dump_flash_byte(0x6c12).unwrap(), 0x12);
        assert_eq!(dongle.dump_flash_byte(0xfe00).unwrap(), 0x00);
    }

    #[test]
    fn raw_key_recovery_walks_the_active_page() {
        // Every address answers with its low byte, except the scripted
        // active-page marker at 0xec00 and the device-1 record at +0x18.
        let mock = MockTransport::new();
        mock.set_responder(memdump_responder(|addr| match addr {
            0xec00 => ACTIVE_PAGE_MARKER,
            0xec18 => 0x61,
            other => (other & 0xff) as u8,
        }));
        let dongle = dongle_with(mock);

        let raw = dongle.dump_raw_key_data(1).unwrap();
        let expected: [u8; 16] = core::array::from_fn(|i| (0x1c + i) as u8);
        assert_eq!(raw, expected);
    }

    #[test]
    fn raw_key_recovery_fails_without_active_page() {
        let mock = MockTransport::new();
        mock.set_responder(memdump_responder(|_| 0x00));
        let dongle = dongle_with(mock);

        assert!(matches!(
            dongle.dump_raw_key_data(0),
            Err(DongleError::NoActiveFlashPage)
        ));
    }

    #[test]
    fn unpair_is_one_based_on_the_wire() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_report(&[0x10, 0xff, 0x80, 0xb2, 0x03, 0x02, 0x00]);
        let dongle = Dongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        dongle.unpair(1).unwrap();
        drop(dongle);

        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(&writes[0][..6], &[0x10, 0xff, 0x80, 0xb2, 0x03, 0x02]);
    }

    #[test]
    fn switch_to_bootloader_sends_icp() {
        let mock = Arc::new(MockTransport::new());
        let dongle = Dongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        dongle.switch_to_bootloader().unwrap();
        drop(dongle);

        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(
            writes[0],
            vec![0x10, 0xff, 0x80, 0xf0, b'I', b'C', b'P']
        );
    }

    #[test]
    fn dongle_info_is_assembled_from_three_registers() {
        let mock = MockTransport::new();
        mock.set_responder(|out: &[u8]| {
            match (out[2], out[3], out[4]) {
                // 0xb5 selector 0x02: versions and wireless PID.
                (0x83, 0xb5, 0x02) => vec![vec![
                    0x11, 0xff, 0x83, 0xb5, 0x02, 0x24, 0x07, 0x00, 0x30, 0x88, 0x08, 0x04, 0, 0,
                    0, 0, 0, 0, 0, 0,
                ]],
                // 0xb5 selector 0x03: receiver serial.
                (0x83, 0xb5, 0x03) => vec![vec![
                    0x11, 0xff, 0x83, 0xb5, 0x03, 0xe2, 0xc7, 0x94, 0xf2, 0, 0, 0, 0, 0, 0, 0, 0,
                    0, 0, 0,
                ]],
                // 0xf1 selector 0x04: bootloader version.
                (0x81, 0xf1, 0x04) => {
                    vec![vec![0x10, 0xff, 0x81, 0xf1, 0x04, 0x03, 0x01]]
                }
                // Connection state: two paired devices.
                (0x81, 0x02, _) => vec![vec![0x10, 0xff, 0x81, 0x02, 0x00, 0x02, 0x00]],
                _ => Vec::new(),
            }
        });
        let dongle = dongle_with(mock);

        let info = dongle.get_dongle_info().unwrap();
        assert_eq!(info.fw_major, 0x24);
        assert_eq!(info.fw_minor, 0x07);
        assert_eq!(info.fw_build, 0x0030);
        assert_eq!(info.wpid, [0x88, 0x08]);
        assert_eq!(info.serial, [0xe2, 0xc7, 0x94, 0xf2]);
        assert_eq!(info.bootloader_major, 0x03);
        assert_eq!(info.bootloader_minor, 0x01);
        assert_eq!(info.num_paired, 2);
    }
}
