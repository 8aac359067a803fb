//! Operations on a receiver running its bootloader.
//!
//! After the ICP switch the receiver re-enumerates under a bootloader PID
//! and only speaks the fixed 32-byte framing. TI CC2544 bootloaders flash
//! through a RAM staging buffer; the Nordic nRF24LU1+ one additionally
//! offers direct flash reads used for dumping.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::dispatch::{DispatchError, Dispatcher};
use crate::events::{DongleEvent, DongleObserver, DonglePhase, LogLevel, NullObserver, log};
use crate::firmware::{Firmware, FirmwareError, SIGNATURE_LEN};
use crate::protocol::bootloader::*;
use crate::transport::{NusbTransport, TransportError, UsbTransport};

/// Memory info and the CRC check run long on the receiver side.
const LONG_DEADLINE: Duration = Duration::from_secs(20);
/// Erase is slower than a plain command but far below the long deadline.
const ERASE_DEADLINE: Duration = Duration::from_secs(5);
/// Everything else answers quickly.
const REPLY_DEADLINE: Duration = Duration::from_millis(500);

/// RAM staging writes and signature uploads go in 16-byte slices.
const SLICE_LEN: usize = 16;

/// Nordic flash reads use the largest stride that fits one frame.
const NORDIC_READ_STRIDE: u16 = 0x1c;

/// Upper end of the Nordic dump, covering device data beyond the firmware.
const NORDIC_DUMP_END: u16 = 0x7fff;

#[derive(Error, Debug)]
pub enum BootloaderError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("not a TI CC2544 Logitech dongle (bootloader major {0:#04x})")]
    WrongMajor(u8),

    #[error("bootloader {0} only flashes signed images, but none is attached")]
    SignatureRequired(String),

    #[error("invalid RAM buffer address {0:#06x}")]
    InvalidRamAddress(u16),

    #[error("RAM staging buffer overflow")]
    BufferOverflow,

    #[error("flash CRC/signature check failed (reply {0:#04x})")]
    FlashCheckFailed(u8),

    #[error("unknown bootloader reply {0:#04x}")]
    UnknownReply(u8),

    #[error("bootloader response timeout")]
    Timeout,

    #[error("malformed bootloader version string {0:?}")]
    BadVersionString(String),

    #[error("flash dump is missing the firmware name block")]
    MalformedDump,

    #[error(transparent)]
    Firmware(#[from] FirmwareError),
}

impl From<DispatchError> for BootloaderError {
    fn from(e: DispatchError) -> Self {
        match e {
            DispatchError::Timeout => BootloaderError::Timeout,
            DispatchError::Closed => BootloaderError::Transport(TransportError::Closed),
        }
    }
}

/// Memory layout reported by command 0x80.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryInfo {
    pub fw_start: u16,
    pub fw_end: u16,
    /// Third word of the response. Interpreted only as the stride of the
    /// write loop; its exact semantics differ between receiver families.
    pub write_buffer_size: u16,
}

/// Parsed "BOT<maj>.<min>_B<build>" version string. All fields are
/// hex-encoded in the string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderVersion {
    pub raw: String,
    pub major: u8,
    pub minor: u8,
    pub build: u16,
}

impl BootloaderVersion {
    pub fn parse(raw: &str) -> Result<Self, BootloaderError> {
        let bad = || BootloaderError::BadVersionString(raw.to_string());
        let rest = raw.strip_prefix("BOT").ok_or_else(bad)?;
        let (major, rest) = rest.split_once('.').ok_or_else(bad)?;
        let (minor, build) = rest.split_once("_B").ok_or_else(bad)?;
        Ok(BootloaderVersion {
            raw: raw.to_string(),
            major: u8::from_str_radix(major, 16).map_err(|_| bad())?,
            minor: u8::from_str_radix(minor, 16).map_err(|_| bad())?,
            build: u16::from_str_radix(build, 16).map_err(|_| bad())?,
        })
    }

    /// BOT03.02 and later only accept signed images.
    pub fn requires_signature(&self) -> bool {
        (self.major, self.minor) >= (0x03, 0x02)
    }

    /// Whether the downgrade patch may target this bootloader.
    pub fn accepts_resized_image(&self) -> bool {
        (self.major, self.minor) <= (0x03, 0x01)
    }
}

/// A dump read out of a Nordic receiver, with the artifact name derived
/// from the embedded firmware name and bootloader version.
#[derive(Debug, Clone)]
pub struct NordicDump {
    pub data: Vec<u8>,
    pub file_name: String,
}

/// One receiver opened in bootloader mode.
pub struct BootloaderDongle {
    dispatcher: Dispatcher<BootloaderReport>,
    observer: Arc<dyn DongleObserver>,
}

impl BootloaderDongle {
    /// Find and open a receiver that re-enumerated under a bootloader PID.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_observer(Arc::new(NullObserver))
    }

    pub fn open_with_observer(observer: Arc<dyn DongleObserver>) -> Result<Self, TransportError> {
        let transport = Arc::new(NusbTransport::open_bootloader_mode()?);
        observer.on_event(&DongleEvent::ReceiverFound {
            pid: transport.product_id(),
        });
        Ok(Self::with_transport(transport, observer))
    }

    pub fn with_transport(
        transport: Arc<dyn UsbTransport>,
        observer: Arc<dyn DongleObserver>,
    ) -> Self {
        let dispatcher = Dispatcher::with_observer(transport, Arc::clone(&observer));
        BootloaderDongle {
            dispatcher,
            observer,
        }
    }

    fn exchange(
        &self,
        request: BootloaderReport,
        deadline: Duration,
    ) -> Result<BootloaderReport, BootloaderError> {
        self.dispatcher.send(request)?;
        Ok(self.dispatcher.recv_timeout(deadline)?)
    }

    /// Memory layout of the receiver. The first call after the ICP switch
    /// can take a long time while the bootloader settles.
    pub fn get_memory_info(&self) -> Result<MemoryInfo, BootloaderError> {
        let request = BootloaderReport::query(CMD_GET_MEMORY_INFO, 0x0000, 28);
        let reply = self.exchange(request, LONG_DEADLINE)?;
        if reply.cmd != CMD_GET_MEMORY_INFO {
            return Err(BootloaderError::UnknownReply(reply.cmd));
        }
        let data = reply.payload();
        if data.len() < 6 {
            return Err(BootloaderError::UnknownReply(reply.cmd));
        }
        let info = MemoryInfo {
            fw_start: u16::from_be_bytes([data[0], data[1]]),
            fw_end: u16::from_be_bytes([data[2], data[3]]),
            write_buffer_size: u16::from_be_bytes([data[4], data[5]]),
        };
        log(
            self.observer.as_ref(),
            LogLevel::Info,
            format!(
                "firmware region {:#06x}..={:#06x}, write buffer {:#06x}",
                info.fw_start, info.fw_end, info.write_buffer_size
            ),
        );
        Ok(info)
    }

    /// Bootloader version string, e.g. "BOT03.02_B0009".
    pub fn get_version(&self) -> Result<BootloaderVersion, BootloaderError> {
        let request = BootloaderReport::query(CMD_GET_VERSION_STRING, 0x0000, 28);
        let reply = self.exchange(request, LONG_DEADLINE)?;
        if reply.cmd != CMD_GET_VERSION_STRING {
            return Err(BootloaderError::UnknownReply(reply.cmd));
        }
        let raw = String::from_utf8_lossy(reply.payload()).into_owned();
        let raw = raw.trim_end_matches('\0').to_string();
        let version = BootloaderVersion::parse(&raw)?;
        log(
            self.observer.as_ref(),
            LogLevel::Info,
            format!("bootloader version {raw}"),
        );
        Ok(version)
    }

    /// Erase the whole firmware flash region (TI).
    pub fn erase_flash(&self) -> Result<(), BootloaderError> {
        let request = BootloaderReport::new(CMD_FLASH, 0x0000, &[flash_sub::ERASE_ALL]);
        let reply = self.exchange(request, ERASE_DEADLINE)?;
        match reply.cmd {
            CMD_FLASH => Ok(()),
            other => Err(BootloaderError::UnknownReply(other)),
        }
    }

    /// Reset the RAM staging buffer (TI).
    pub fn clear_ram_buffer(&self) -> Result<(), BootloaderError> {
        let request = BootloaderReport::new(CMD_FLASH, 0x0000, &[flash_sub::CLEAR_RAM_BUFFER]);
        let reply = self.exchange(request, REPLY_DEADLINE)?;
        match reply.cmd {
            CMD_FLASH => Ok(()),
            other => Err(BootloaderError::UnknownReply(other)),
        }
    }

    /// Stage 16 image bytes at `addr` within the RAM buffer (TI).
    pub fn write_ram_slice(&self, addr: u16, slice: &[u8]) -> Result<(), BootloaderError> {
        debug_assert_eq!(slice.len(), SLICE_LEN);
        let request = BootloaderReport::new(CMD_WRITE_RAM_BUFFER, addr, slice);
        let reply = self.exchange(request, REPLY_DEADLINE)?;
        match reply.cmd {
            CMD_WRITE_RAM_BUFFER => Ok(()),
            CMD_WRITE_RAM_BUFFER_INVALID_ADDR => Err(BootloaderError::InvalidRamAddress(addr)),
            CMD_WRITE_RAM_BUFFER_OVERFLOW => Err(BootloaderError::BufferOverflow),
            other => Err(BootloaderError::UnknownReply(other)),
        }
    }

    /// Commit the RAM buffer into flash at `addr` (TI).
    pub fn store_ram_buffer(&self, addr: u16) -> Result<(), BootloaderError> {
        let request = BootloaderReport::new(CMD_FLASH, addr, &[flash_sub::WRITE_RAM_BUFFER]);
        let reply = self.exchange(request, REPLY_DEADLINE)?;
        match reply.cmd {
            CMD_FLASH => Ok(()),
            other => Err(BootloaderError::UnknownReply(other)),
        }
    }

    /// Upload 16 signature bytes at `addr` (0x00..=0xff) (TI).
    pub fn write_signature_slice(&self, addr: u16, slice: &[u8]) -> Result<(), BootloaderError> {
        debug_assert_eq!(slice.len(), SLICE_LEN);
        debug_assert!(addr <= 0xff);
        let request = BootloaderReport::new(CMD_WRITE_SIGNATURE, addr, slice);
        let reply = self.exchange(request, REPLY_DEADLINE)?;
        match reply.cmd {
            CMD_WRITE_SIGNATURE => Ok(()),
            other => Err(BootloaderError::UnknownReply(other)),
        }
    }

    /// Run the receiver-side CRC and signature verification (TI). Takes up
    /// to tens of seconds.
    pub fn check_crc_and_signature(&self) -> Result<(), BootloaderError> {
        let request = BootloaderReport::new(CMD_FLASH, 0x0000, &[flash_sub::CHECK_CRC]);
        let reply = self.exchange(request, LONG_DEADLINE)?;
        match reply.cmd {
            CMD_FLASH => Ok(()),
            other => Err(BootloaderError::FlashCheckFailed(other)),
        }
    }

    /// Reboot into the freshly flashed firmware. No response follows.
    pub fn reboot(&self) -> Result<(), BootloaderError> {
        let request = BootloaderReport::query(CMD_REBOOT, 0x0000, 0);
        self.dispatcher.send(request)?;
        Ok(())
    }

    /// Read `len` flash bytes at `addr` (Nordic).
    pub fn read_flash_nordic(&self, addr: u16, len: u8) -> Result<Vec<u8>, BootloaderError> {
        let request = BootloaderReport::query(CMD_NORDIC_READ, addr, len);
        let reply = self.exchange(request, REPLY_DEADLINE)?;
        if reply.cmd != CMD_NORDIC_READ {
            return Err(BootloaderError::UnknownReply(reply.cmd));
        }
        Ok(reply.payload().to_vec())
    }

    /// Flash `firmware` onto a TI receiver.
    ///
    /// Fail-fast: any error after the erase leaves the receiver in
    /// bootloader mode with a blank image, awaiting a retry.
    pub fn flash(&self, firmware: &Firmware) -> Result<(), BootloaderError> {
        let version = self.get_version()?;
        if version.major != 0x03 {
            return Err(BootloaderError::WrongMajor(version.major));
        }

        let signature_required = version.requires_signature();
        if signature_required && !firmware.has_signature() {
            return Err(BootloaderError::SignatureRequired(version.raw.clone()));
        }

        let memory = self.get_memory_info()?;
        let expected = usize::from(memory.fw_end) - usize::from(memory.fw_start) + 1;

        let image: Vec<u8> = if firmware.size() == expected {
            firmware.base_image().to_vec()
        } else if firmware.size() == 0x6000 && expected == 0x6800 {
            if signature_required {
                return Err(FirmwareError::PatchRequiresUnsignedBootloader.into());
            }
            if !version.accepts_resized_image() {
                return Err(FirmwareError::NotResizable.into());
            }
            log(
                self.observer.as_ref(),
                LogLevel::Info,
                "resizing and patching image for the older bootloader",
            );
            firmware.downgrade_to_bl0301()?
        } else {
            return Err(FirmwareError::NotResizable.into());
        };

        self.observer.on_event(&DongleEvent::PhaseChanged {
            phase: DonglePhase::Flashing,
        });
        self.erase_flash()?;
        self.clear_ram_buffer()?;

        let buffer_size = usize::from(memory.write_buffer_size).max(SLICE_LEN);
        let windows = image.chunks(buffer_size).count() as u64;
        let mut addr = usize::from(memory.fw_start);
        for (window_index, window) in image.chunks(buffer_size).enumerate() {
            for (slice_index, slice) in window.chunks(SLICE_LEN).enumerate() {
                // The RAM buffer only takes full 16-byte slices; a short
                // tail is padded with erased-flash bytes.
                let mut padded = [0xffu8; SLICE_LEN];
                padded[..slice.len()].copy_from_slice(slice);
                self.write_ram_slice((slice_index * SLICE_LEN) as u16, &padded)?;
            }
            self.store_ram_buffer(addr as u16)?;
            addr += buffer_size;
            self.observer.on_event(&DongleEvent::Progress {
                operation: "writing firmware",
                current: window_index as u64 + 1,
                total: windows,
            });
        }

        if signature_required
            && let Some(signature) = firmware.signature()
        {
            for offset in (0..SIGNATURE_LEN).step_by(SLICE_LEN) {
                self.write_signature_slice(offset as u16, &signature[offset..offset + SLICE_LEN])?;
            }
        }

        self.observer.on_event(&DongleEvent::PhaseChanged {
            phase: DonglePhase::Verifying,
        });
        self.check_crc_and_signature()?;
        Ok(())
    }

    /// Dump a Nordic receiver's flash, including the device data past the
    /// firmware region, and name the artifact after the embedded firmware
    /// name and bootloader version.
    pub fn dump_nordic(&self) -> Result<NordicDump, BootloaderError> {
        let memory = self.get_memory_info()?;
        let fw_start = memory.fw_start;
        let fw_end = NORDIC_DUMP_END;

        let mut data = Vec::with_capacity(usize::from(fw_end - fw_start) + 1);
        let mut offset = fw_start;
        while offset <= fw_end {
            let stride = NORDIC_READ_STRIDE.min(fw_end - offset + 1);
            let slice = self.read_flash_nordic(offset, stride as u8)?;
            data.extend_from_slice(&slice);
            self.observer.on_event(&DongleEvent::Progress {
                operation: "dumping flash",
                current: u64::from(offset - fw_start),
                total: u64::from(fw_end - fw_start) + 1,
            });
            offset += stride;
        }

        // The firmware name (length-prefixed ASCII) lives at 0x7fd0, the
        // bootloader version bytes at 0x7fb4.
        let index = |addr: u16| usize::from(addr - fw_start);
        let name_len = usize::from(*data.get(index(0x7fd0)).ok_or(BootloaderError::MalformedDump)?);
        let name_start = index(0x7fd1);
        let name_end = name_start + name_len.min(16);
        let name = data
            .get(name_start..name_end)
            .ok_or(BootloaderError::MalformedDump)?;
        let name = String::from_utf8_lossy(name).into_owned();
        let bot = data
            .get(index(0x7fb4)..index(0x7fb8))
            .ok_or(BootloaderError::MalformedDump)?;

        let file_name = format!(
            "dump_{}_BOT{:02x}.{:02x}_B{:02x}{:02x}.bin",
            name, bot[0], bot[1], bot[2], bot[3]
        );
        Ok(NordicDump { data, file_name })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::END_MARKER;
    use crate::protocol::report::WireReport;
    use crate::transport::MockTransport;
    use crc::{CRC_16_IBM_3740, Crc};

    const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

    fn version_reply(version: &str) -> Vec<u8> {
        BootloaderReport::new(CMD_GET_VERSION_STRING, 0, version.as_bytes()).encode()
    }

    fn build_firmware(image_size: usize) -> Firmware {
        let mut raw = vec![0u8; image_size];
        let tail = image_size - 6;
        raw[tail + 2..].copy_from_slice(&END_MARKER);
        let crc = CRC16.checksum(&raw[..tail]);
        raw[tail..tail + 2].copy_from_slice(&crc.to_le_bytes());
        Firmware::parse(raw).unwrap()
    }

    fn bootloader_with(mock: MockTransport) -> BootloaderDongle {
        BootloaderDongle::with_transport(Arc::new(mock), Arc::new(NullObserver))
    }

    #[test]
    fn version_string_parses_as_hex_fields() {
        let version = BootloaderVersion::parse("BOT03.02_B0009").unwrap();
        assert_eq!(version.major, 0x03);
        assert_eq!(version.minor, 0x02);
        assert_eq!(version.build, 0x0009);
        assert!(version.requires_signature());
        assert!(!version.accepts_resized_image());

        let older = BootloaderVersion::parse("BOT03.01_B0008").unwrap();
        assert!(!older.requires_signature());
        assert!(older.accepts_resized_image());

        assert!(BootloaderVersion::parse("RQR24.07").is_err());
    }

    #[test]
    fn signature_guard_fires_before_any_erase() {
        let mock = Arc::new(MockTransport::new());
        mock.queue_report(&version_reply("BOT03.02_B0009"));
        let bootloader = BootloaderDongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        let firmware = build_firmware(0x6000);
        let err = bootloader.flash(&firmware).unwrap_err();
        assert!(matches!(err, BootloaderError::SignatureRequired(_)));
        drop(bootloader);

        // The only outbound frame is the version query: nothing was erased.
        let writes = mock.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0][0], CMD_GET_VERSION_STRING);
        assert!(!writes.iter().any(|w| w[0] == CMD_FLASH));
    }

    #[test]
    fn wrong_major_is_rejected() {
        let mock = MockTransport::new();
        mock.queue_report(&version_reply("BOT01.02_B0014"));
        let bootloader = bootloader_with(mock);

        let firmware = build_firmware(0x6000);
        assert!(matches!(
            bootloader.flash(&firmware),
            Err(BootloaderError::WrongMajor(0x01))
        ));
    }

    /// Responder emulating a cooperative TI bootloader.
    fn ti_responder(version: &'static str, fw_start: u16, fw_end: u16, wbuf: u16) ->
        impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static {
        move |out: &[u8]| {
            let request = BootloaderReport::decode(out).unwrap();
            let reply = match request.cmd {
                CMD_GET_VERSION_STRING => {
                    BootloaderReport::new(CMD_GET_VERSION_STRING, 0, version.as_bytes())
                }
                CMD_GET_MEMORY_INFO => {
                    let mut payload = Vec::new();
                    payload.extend_from_slice(&fw_start.to_be_bytes());
                    payload.extend_from_slice(&fw_end.to_be_bytes());
                    payload.extend_from_slice(&wbuf.to_be_bytes());
                    BootloaderReport::new(CMD_GET_MEMORY_INFO, 0, &payload)
                }
                CMD_WRITE_RAM_BUFFER => BootloaderReport::new(CMD_WRITE_RAM_BUFFER, request.addr, &[]),
                CMD_WRITE_SIGNATURE => BootloaderReport::new(CMD_WRITE_SIGNATURE, request.addr, &[]),
                CMD_FLASH => BootloaderReport::new(CMD_FLASH, request.addr, &[]),
                CMD_REBOOT => return Vec::new(),
                other => BootloaderReport::new(other, request.addr, &[]),
            };
            vec![reply.encode()]
        }
    }

    #[test]
    fn ti_flash_streams_windows_and_verifies() {
        let mock = Arc::new(MockTransport::new());
        mock.set_responder(ti_responder("BOT03.01_B0008", 0x0400, 0x6bff, 0x0080));
        let bootloader = BootloaderDongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        let firmware = build_firmware(0x6800);
        bootloader.flash(&firmware).unwrap();
        bootloader.reboot().unwrap();
        drop(bootloader);

        let writes = mock.writes();
        // version, memory info, erase, clear, then the transfer.
        assert_eq!(writes[0][0], CMD_GET_VERSION_STRING);
        assert_eq!(writes[1][0], CMD_GET_MEMORY_INFO);
        assert_eq!(writes[2][0], CMD_FLASH);
        assert_eq!(writes[2][4], flash_sub::ERASE_ALL);
        assert_eq!(writes[3][0], CMD_FLASH);
        assert_eq!(writes[3][4], flash_sub::CLEAR_RAM_BUFFER);

        let ram_writes = writes.iter().filter(|w| w[0] == CMD_WRITE_RAM_BUFFER).count();
        assert_eq!(ram_writes, 0x6800 / SLICE_LEN);

        let commits: Vec<&Vec<u8>> = writes
            .iter()
            .filter(|w| w[0] == CMD_FLASH && w[4] == flash_sub::WRITE_RAM_BUFFER)
            .collect();
        assert_eq!(commits.len(), 0x6800 / 0x80);
        // First commit targets the firmware start address.
        assert_eq!(u16::from_be_bytes([commits[0][1], commits[0][2]]), 0x0400);
        // Last frames: CRC check, then reboot.
        let check = &writes[writes.len() - 2];
        assert_eq!(check[0], CMD_FLASH);
        assert_eq!(check[4], flash_sub::CHECK_CRC);
        assert_eq!(writes[writes.len() - 1][0], CMD_REBOOT);
    }

    #[test]
    fn ti_flash_downgrades_for_older_bootloader() {
        let mock = Arc::new(MockTransport::new());
        mock.set_responder(ti_responder("BOT03.01_B0008", 0x0400, 0x6bff, 0x0080));
        let bootloader = BootloaderDongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        // A 0x6000 image against a 0x6800 region gets resized on the fly.
        let firmware = build_firmware(0x6000);
        bootloader.flash(&firmware).unwrap();
        drop(bootloader);

        let ram_writes = mock
            .writes()
            .iter()
            .filter(|w| w[0] == CMD_WRITE_RAM_BUFFER)
            .count();
        assert_eq!(ram_writes, 0x6800 / SLICE_LEN);
    }

    #[test]
    fn ti_flash_uploads_signature_when_required() {
        let mock = Arc::new(MockTransport::new());
        mock.set_responder(ti_responder("BOT03.02_B0009", 0x0400, 0x63ff, 0x0080));
        let bootloader = BootloaderDongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        let mut firmware = build_firmware(0x6000);
        firmware.add_signature(&[0x5a; SIGNATURE_LEN]).unwrap();
        bootloader.flash(&firmware).unwrap();
        drop(bootloader);

        let signature_writes: Vec<Vec<u8>> = mock
            .writes()
            .iter()
            .filter(|w| w[0] == CMD_WRITE_SIGNATURE)
            .cloned()
            .collect();
        assert_eq!(signature_writes.len(), SIGNATURE_LEN / SLICE_LEN);
        assert_eq!(
            u16::from_be_bytes([signature_writes[15][1], signature_writes[15][2]]),
            0x00f0
        );
        assert!(signature_writes.iter().all(|w| w[4..20] == [0x5a; 16]));
    }

    #[test]
    fn ram_buffer_error_replies_are_fatal() {
        let mock = MockTransport::new();
        mock.queue_report(
            &BootloaderReport::new(CMD_WRITE_RAM_BUFFER_OVERFLOW, 0, &[]).encode(),
        );
        let bootloader = bootloader_with(mock);

        assert!(matches!(
            bootloader.write_ram_slice(0, &[0u8; 16]),
            Err(BootloaderError::BufferOverflow)
        ));
    }

    #[test]
    fn nordic_dump_assembles_strides_and_names_artifact() {
        let mock = Arc::new(MockTransport::new());
        mock.set_responder(move |out: &[u8]| {
            let request = BootloaderReport::decode(out).unwrap();
            let reply = match request.cmd {
                CMD_GET_MEMORY_INFO => {
                    BootloaderReport::new(CMD_GET_MEMORY_INFO, 0, &[0x00, 0x00, 0x67, 0xff, 0x02, 0x00])
                }
                CMD_NORDIC_READ => {
                    let len = usize::from(request.len);
                    let payload: Vec<u8> = (0..len)
                        .map(|i| match request.addr + i as u16 {
                            0x7fd0 => 8,
                            addr @ 0x7fd1..=0x7fd8 => b"RQR12.01"[usize::from(addr - 0x7fd1)],
                            0x7fb4 => 0x01,
                            0x7fb5 => 0x02,
                            0x7fb6 => 0x00,
                            0x7fb7 => 0x14,
                            addr => (addr & 0xff) as u8,
                        })
                        .collect();
                    BootloaderReport::new(CMD_NORDIC_READ, request.addr, &payload)
                }
                other => BootloaderReport::new(other, request.addr, &[]),
            };
            vec![reply.encode()]
        });
        let bootloader = BootloaderDongle::with_transport(
            Arc::clone(&mock) as Arc<dyn UsbTransport>,
            Arc::new(NullObserver),
        );

        let dump = bootloader.dump_nordic().unwrap();
        assert_eq!(dump.data.len(), 0x8000);
        assert_eq!(dump.data[0x1234], 0x34);
        assert_eq!(dump.file_name, "dump_RQR12.01_BOT01.02_B0014.bin");
    }
}
