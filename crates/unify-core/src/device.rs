//! Receiver and paired-device descriptors.
//!
//! Built once during an enumeration pass and treated as read-only
//! snapshots afterwards. Also holds the fixed mapping between the raw key
//! material stored in receiver flash and the link key used on the air.

use std::fmt;
use std::time::Duration;

use bitflags::bitflags;

/// Maximum number of paired devices per receiver.
pub const MAX_PAIRED_DEVICES: usize = 6;

/// Firmware major version byte, naming the receiver's MCU family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareMajor(pub u8);

impl FirmwareMajor {
    /// Diagnostic only; the bootloader version string is the hard gate for
    /// flashing. Both 0x12 and 0x21 majors have been seen on Nordic parts.
    pub fn is_nordic(self) -> bool {
        self.0 == 0x12 || self.0 == 0x21
    }

    pub fn is_ti(self) -> bool {
        self.0 == 0x24
    }
}

impl fmt::Display for FirmwareMajor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_nordic() {
            write!(f, "RQR{:02x} (Nordic)", self.0)
        } else if self.is_ti() {
            write!(f, "RQR{:02x} (Texas Instruments)", self.0)
        } else {
            write!(f, "RQR{:02x} (unknown MCU family)", self.0)
        }
    }
}

/// Device type nibble from the pairing information record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    Unknown,
    Keyboard,
    Mouse,
    Numpad,
    Presenter,
    Remote,
    Trackball,
    Touchpad,
    Tablet,
    Gamepad,
    Joystick,
    Other(u8),
}

impl From<u8> for DeviceType {
    fn from(v: u8) -> Self {
        match v & 0x0f {
            0x00 => DeviceType::Unknown,
            0x01 => DeviceType::Keyboard,
            0x02 => DeviceType::Mouse,
            0x03 => DeviceType::Numpad,
            0x04 => DeviceType::Presenter,
            0x05 => DeviceType::Remote,
            0x06 => DeviceType::Trackball,
            0x07 => DeviceType::Touchpad,
            0x08 => DeviceType::Tablet,
            0x09 => DeviceType::Gamepad,
            0x0a => DeviceType::Joystick,
            other => DeviceType::Other(other),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::Unknown => write!(f, "unknown"),
            DeviceType::Keyboard => write!(f, "keyboard"),
            DeviceType::Mouse => write!(f, "mouse"),
            DeviceType::Numpad => write!(f, "numpad"),
            DeviceType::Presenter => write!(f, "presenter"),
            DeviceType::Remote => write!(f, "remote"),
            DeviceType::Trackball => write!(f, "trackball"),
            DeviceType::Touchpad => write!(f, "touchpad"),
            DeviceType::Tablet => write!(f, "tablet"),
            DeviceType::Gamepad => write!(f, "gamepad"),
            DeviceType::Joystick => write!(f, "joystick"),
            DeviceType::Other(v) => write!(f, "device type {v:#04x}"),
        }
    }
}

bitflags! {
    /// Report types a paired device may emit, as advertised in its extended
    /// pairing information and in DJ "device paired" notifications.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ReportTypes: u32 {
        const KEYBOARD = 0x0000_0002;
        const MOUSE = 0x0000_0004;
        const CONSUMER_CONTROL = 0x0000_0008;
        const POWER_KEYS = 0x0000_0010;
        const MEDIA_CENTER = 0x0000_0100;
        const KEYBOARD_LEDS = 0x0000_4000;
        // Carried inside RF reports, never as their own USB HID reports.
        const HIDPP_SHORT = 0x0001_0000;
        const HIDPP_LONG = 0x0002_0000;
    }
}

impl ReportTypes {
    pub fn from_le_slice(raw: &[u8]) -> Self {
        let mut word = [0u8; 4];
        word[..raw.len().min(4)].copy_from_slice(&raw[..raw.len().min(4)]);
        ReportTypes::from_bits_retain(u32::from_le_bytes(word))
    }
}

/// Per-receiver identity and versioning.
#[derive(Debug, Clone, Default)]
pub struct DongleInfo {
    pub fw_major: u8,
    pub fw_minor: u8,
    pub fw_build: u16,
    pub wpid: [u8; 2],
    pub likely_proto: u8,
    pub serial: [u8; 4],
    pub bootloader_major: u8,
    pub bootloader_minor: u8,
    pub num_paired: u8,
}

impl fmt::Display for DongleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Receiver: serial {:02x}:{:02x}:{:02x}:{:02x}, WPID {:02x}{:02x}",
            self.serial[0],
            self.serial[1],
            self.serial[2],
            self.serial[3],
            self.wpid[0],
            self.wpid[1]
        )?;
        writeln!(
            f,
            "  firmware RQR{:02x}.{:02x}_B{:04x}, bootloader BOT{:02x}.{:02x}",
            self.fw_major, self.fw_minor, self.fw_build, self.bootloader_major,
            self.bootloader_minor
        )?;
        write!(f, "  {} paired device(s)", self.num_paired)
    }
}

/// Per-paired-device state, assembled from the 0xb5 selector reads.
#[derive(Debug, Clone, Default)]
pub struct DeviceInfo {
    /// 0-based slot index (0..=5).
    pub index: u8,
    pub destination_id: u8,
    pub default_report_interval: Duration,
    pub wpid: [u8; 2],
    pub device_type: DeviceType,
    /// Capability bits as reported; kept raw.
    pub caps: u8,
    pub serial: [u8; 4],
    pub report_types: ReportTypes,
    /// Usability info byte (power switch location and friends); kept raw.
    pub usability: u8,
    pub name: String,
    /// RF address: receiver base address with the device destination id as
    /// final octet. Filled during set assembly.
    pub rf_addr: [u8; 5],
    /// Raw key material from receiver flash, when readable.
    pub raw_key: Option<[u8; 16]>,
    /// Link key derived from the raw material; only valid for encrypted
    /// links (nonzero raw material).
    pub link_key: Option<[u8; 16]>,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Device {} '{}' ({})",
            self.index, self.name, self.device_type
        )?;
        writeln!(
            f,
            "  WPID {:02x}{:02x}, serial {:02x}:{:02x}:{:02x}:{:02x}, report interval {}ms",
            self.wpid[0],
            self.wpid[1],
            self.serial[0],
            self.serial[1],
            self.serial[2],
            self.serial[3],
            self.default_report_interval.as_millis()
        )?;
        writeln!(
            f,
            "  RF address {:02x}:{:02x}:{:02x}:{:02x}:{:02x}, caps {:#04x}, usability {:#04x}",
            self.rf_addr[0], self.rf_addr[1], self.rf_addr[2], self.rf_addr[3], self.rf_addr[4],
            self.caps, self.usability
        )?;
        writeln!(f, "  report types: {:?}", self.report_types)?;
        match (&self.raw_key, &self.link_key) {
            (Some(raw), Some(key)) => {
                writeln!(f, "  raw key material: {}", hex(raw))?;
                write!(f, "  link key:         {}", hex(key))
            }
            (Some(raw), None) => {
                writeln!(f, "  raw key material: {}", hex(raw))?;
                write!(f, "  link key:         none (unencrypted link)")
            }
            _ => write!(f, "  key material not readable on this receiver"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Snapshot of one receiver and everything paired to it.
#[derive(Debug, Clone, Default)]
pub struct SetInfo {
    pub dongle: DongleInfo,
    pub devices: Vec<DeviceInfo>,
}

impl SetInfo {
    /// Add a device snapshot, deriving its RF address from the receiver
    /// base address. Slots beyond the receiver capacity or duplicate
    /// indexes are ignored.
    pub fn add_device(&mut self, mut device: DeviceInfo) {
        if self.devices.len() >= MAX_PAIRED_DEVICES
            || self.devices.iter().any(|d| d.index == device.index)
        {
            return;
        }
        device.rf_addr[..4].copy_from_slice(&self.dongle.serial);
        device.rf_addr[4] = device.destination_id;
        self.devices.push(device);
    }
}

impl fmt::Display for SetInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.dongle)?;
        for device in &self.devices {
            writeln!(f, "{device}")?;
        }
        Ok(())
    }
}

/// Derive the on-air link key from the raw key material stored in receiver
/// flash. The relationship is a fixed byte permutation with xor constants.
///
/// Raw material that is all zero belongs to an unencrypted link and has no
/// meaningful key; callers check that before trusting the result.
pub fn derive_link_key(raw: &[u8; 16]) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[2] = raw[0];
    key[1] = raw[1] ^ 0xff;
    key[5] = raw[2] ^ 0xff;
    key[3] = raw[3];
    key[14] = raw[4];
    key[11] = raw[5];
    key[9] = raw[6];
    key[0] = raw[7];
    key[8] = raw[8];
    key[6] = raw[9] ^ 0x55;
    key[4] = raw[10];
    key[15] = raw[11];
    key[10] = raw[12] ^ 0xff;
    key[12] = raw[13];
    key[7] = raw[14];
    key[13] = raw[15] ^ 0x55;
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_material_exposes_xor_constants() {
        let key = derive_link_key(&[0u8; 16]);
        let expected = [
            0x00, 0xff, 0x00, 0x00, 0x00, 0xff, 0x55, 0x00, 0x00, 0x00, 0xff, 0x00, 0x00, 0x55,
            0x00, 0x00,
        ];
        assert_eq!(key, expected);
    }

    #[test]
    fn permutation_moves_every_byte() {
        let raw: [u8; 16] = core::array::from_fn(|i| (i as u8) << 4 | i as u8);
        let key = derive_link_key(&raw);
        assert_eq!(key[2], raw[0]);
        assert_eq!(key[1], raw[1] ^ 0xff);
        assert_eq!(key[7], raw[14]);
        assert_eq!(key[13], raw[15] ^ 0x55);
        // The mapping is a bijection on byte positions.
        let destinations: [usize; 16] = [2, 1, 5, 3, 14, 11, 9, 0, 8, 6, 4, 15, 10, 12, 7, 13];
        let mut seen = [false; 16];
        for dest in destinations {
            assert!(!seen[dest], "destination byte {dest} reused");
            seen[dest] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn report_types_from_wire_order() {
        let flags = ReportTypes::from_le_slice(&[0x06, 0x00, 0x01, 0x00]);
        assert!(flags.contains(ReportTypes::KEYBOARD));
        assert!(flags.contains(ReportTypes::MOUSE));
        assert!(flags.contains(ReportTypes::HIDPP_SHORT));
        assert!(!flags.contains(ReportTypes::MEDIA_CENTER));
    }

    #[test]
    fn set_info_caps_and_derives_rf_addresses() {
        let mut set = SetInfo {
            dongle: DongleInfo {
                serial: [0xe2, 0xc7, 0x94, 0xf2],
                ..Default::default()
            },
            devices: Vec::new(),
        };
        for i in 0..8u8 {
            set.add_device(DeviceInfo {
                index: i % 7,
                destination_id: i + 1,
                ..Default::default()
            });
        }
        assert_eq!(set.devices.len(), MAX_PAIRED_DEVICES);
        assert_eq!(set.devices[0].rf_addr, [0xe2, 0xc7, 0x94, 0xf2, 0x01]);
    }
}
