//! Bootloader-mode frame codec.
//!
//! After the ICP switch the receiver re-enumerates under a bootloader PID
//! and speaks a fixed 32-byte framing on the same style of HID channel:
//! `[cmd, addr_hi, addr_lo, len, data[0..28]]` with a big-endian address.
//! Responses reuse the request layout.

use std::fmt;

use super::report::{FrameError, WireReport};

pub const BOOTLOADER_FRAME_LEN: usize = 32;
pub const BOOTLOADER_DATA_LEN: usize = 28;

// Command bytes. The 0xc0/0xd0/0xe0 family only exists on TI CC2544
// bootloaders; 0x10/0x20/0x30 only on the Nordic nRF24LU1+ one.
pub const CMD_ERROR: u8 = 0x01;
pub const CMD_NORDIC_READ: u8 = 0x10;
pub const CMD_NORDIC_WRITE: u8 = 0x20;
pub const CMD_NORDIC_ERASE_PAGE: u8 = 0x30;
pub const CMD_REBOOT: u8 = 0x70;
pub const CMD_GET_MEMORY_INFO: u8 = 0x80;
pub const CMD_GET_VERSION_STRING: u8 = 0x90;
pub const CMD_READ_SIGNATURE: u8 = 0xb0;
pub const CMD_WRITE_RAM_BUFFER: u8 = 0xc0;
pub const CMD_WRITE_RAM_BUFFER_INVALID_ADDR: u8 = 0xc1;
pub const CMD_WRITE_RAM_BUFFER_OVERFLOW: u8 = 0xc2;
pub const CMD_FLASH: u8 = 0xd0;
pub const CMD_FLASH_INVALID_ADDR: u8 = 0xd1;
pub const CMD_FLASH_WRONG_CRC: u8 = 0xd2;
pub const CMD_FLASH_PAGE0_INVALID: u8 = 0xd3;
pub const CMD_FLASH_RAM_INVALID_ORDER: u8 = 0xd4;
pub const CMD_WRITE_SIGNATURE: u8 = 0xe0;

/// Sub-commands of [`CMD_FLASH`], carried in `data[0]`.
pub mod flash_sub {
    pub const ERASE_ALL: u8 = 0x00;
    pub const WRITE_RAM_BUFFER: u8 = 0x01;
    pub const CLEAR_RAM_BUFFER: u8 = 0x02;
    pub const CHECK_CRC: u8 = 0x03;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderReport {
    pub cmd: u8,
    pub addr: u16,
    pub len: u8,
    pub data: [u8; BOOTLOADER_DATA_LEN],
}

impl BootloaderReport {
    pub fn new(cmd: u8, addr: u16, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= BOOTLOADER_DATA_LEN);
        let mut data = [0u8; BOOTLOADER_DATA_LEN];
        data[..payload.len()].copy_from_slice(payload);
        BootloaderReport {
            cmd,
            addr,
            len: payload.len() as u8,
            data,
        }
    }

    /// Request carrying no payload but announcing an expected response size.
    pub fn query(cmd: u8, addr: u16, len: u8) -> Self {
        BootloaderReport {
            cmd,
            addr,
            len,
            data: [0u8; BOOTLOADER_DATA_LEN],
        }
    }

    /// Meaningful payload bytes of this frame.
    pub fn payload(&self) -> &[u8] {
        let len = (self.len as usize).min(BOOTLOADER_DATA_LEN);
        &self.data[..len]
    }
}

impl fmt::Display for BootloaderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bootloader report cmd {:02x}, addr {:#06x}, len {}, data {:02x?}",
            self.cmd,
            self.addr,
            self.len,
            self.payload()
        )
    }
}

impl WireReport for BootloaderReport {
    fn decode(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() != BOOTLOADER_FRAME_LEN {
            return Err(FrameError::BadFrame {
                tag: raw.first().copied().unwrap_or(0),
                len: raw.len(),
            });
        }
        let mut data = [0u8; BOOTLOADER_DATA_LEN];
        data.copy_from_slice(&raw[4..]);
        Ok(BootloaderReport {
            cmd: raw[0],
            addr: u16::from_be_bytes([raw[1], raw[2]]),
            len: raw[3],
            data,
        })
    }

    fn encode(&self) -> Vec<u8> {
        let mut raw = vec![0u8; BOOTLOADER_FRAME_LEN];
        raw[0] = self.cmd;
        raw[1..3].copy_from_slice(&self.addr.to_be_bytes());
        raw[3] = self.len;
        raw[4..].copy_from_slice(&self.data);
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        let report = BootloaderReport::new(CMD_WRITE_RAM_BUFFER, 0x0410, &[0xaa; 16]);
        let raw = report.encode();
        assert_eq!(raw.len(), BOOTLOADER_FRAME_LEN);
        assert_eq!(raw[0], CMD_WRITE_RAM_BUFFER);
        assert_eq!(&raw[1..3], &[0x04, 0x10]);
        assert_eq!(raw[3], 16);
        assert_eq!(BootloaderReport::decode(&raw).unwrap(), report);
    }

    #[test]
    fn address_is_big_endian() {
        let raw = BootloaderReport::query(CMD_GET_MEMORY_INFO, 0x1234, 28).encode();
        assert_eq!(raw[1], 0x12);
        assert_eq!(raw[2], 0x34);
    }

    #[test]
    fn decode_rejects_short_frames() {
        assert!(BootloaderReport::decode(&[0x80, 0x00, 0x00, 0x1c]).is_err());
    }

    #[test]
    fn payload_is_clamped_to_len() {
        let mut report = BootloaderReport::new(CMD_FLASH, 0, &[flash_sub::ERASE_ALL]);
        assert_eq!(report.payload(), &[flash_sub::ERASE_ALL]);
        // A corrupt len from the wire must not panic.
        report.len = 0xff;
        assert_eq!(report.payload().len(), BOOTLOADER_DATA_LEN);
    }
}
