//! Device identification and HID++ register constants.
//!
//! PID lists cover the receiver families known to speak this protocol;
//! the bootloader PIDs were each confirmed against a physical receiver
//! (CU0007/CU0008/CU0012/CU0016 hardware).

// ============================================================================
// Device Identification
// ============================================================================

/// Logitech Vendor ID
pub const LOGITECH_VENDOR_ID: u16 = 0x046d;

/// Unifying receiver (CU0007, CU0008, CU0012)
pub const PID_UNIFYING: u16 = 0xc52b;
/// CU0016 receiver for the SPOTLIGHT presentation clicker
pub const PID_CU0016_SPOTLIGHT: u16 = 0xc53e;
/// CU0016 receiver for the R500 presentation clicker
pub const PID_CU0016_R500: u16 = 0xc540;
/// CU0014 receiver for the R400 presentation clicker
pub const PID_CU0014_R400: u16 = 0xc538;

/// Nordic nRF24LU1+ bootloader (CU0007)
pub const PID_BOOT_LOADER_NORDIC: u16 = 0xaaaa;
/// TI CC2544 bootloader (CU0008)
pub const PID_BOOT_LOADER_TI: u16 = 0xaaac;
/// TI CC2544 bootloader, nano receiver (CU0012)
pub const PID_BOOT_LOADER_TI_NANO: u16 = 0xaaad;
/// TI CC2544 bootloader, LIGHTSPEED G603 receiver (CU0008a)
pub const PID_BOOT_LOADER_LIGHTSPEED_G603: u16 = 0xaabe;
/// TI CC2544 bootloader, SPOTLIGHT receiver (CU0016)
pub const PID_BOOT_LOADER_TI_SPOTLIGHT: u16 = 0xaad3;
/// TI CC2544 bootloader, R500 receiver (CU0016)
pub const PID_BOOT_LOADER_TI_R500: u16 = 0xaae1;

/// Product IDs tried, in order, when opening a receiver in firmware mode.
pub const FIRMWARE_MODE_PIDS: &[u16] = &[
    PID_UNIFYING,
    PID_CU0016_SPOTLIGHT,
    PID_CU0016_R500,
    PID_CU0014_R400,
];

/// Product IDs tried, in order, when opening a receiver in bootloader mode.
pub const BOOTLOADER_MODE_PIDS: &[u16] = &[
    PID_BOOT_LOADER_LIGHTSPEED_G603,
    PID_BOOT_LOADER_NORDIC,
    PID_BOOT_LOADER_TI,
    PID_BOOT_LOADER_TI_NANO,
    PID_BOOT_LOADER_TI_R500,
    PID_BOOT_LOADER_TI_SPOTLIGHT,
    PID_CU0016_R500,
];

/// Products masking as 0xaaxx run the bootloader, not the firmware.
pub const BOOTLOADER_PID_MASK: u16 = 0xff00;
pub const BOOTLOADER_PID_PREFIX: u16 = 0xaa00;

// ============================================================================
// USB transfer parameters
// ============================================================================

/// bmRequestType for SET_REPORT: host-to-device, class, interface.
pub const HID_SET_REPORT_REQUEST_TYPE: u8 = 0x21;
/// bRequest SET_REPORT.
pub const HID_SET_REPORT: u8 = 0x09;
/// wValue upper byte: output report; report ID is or-ed into the low byte.
pub const HID_REPORT_TYPE_OUTPUT: u16 = 0x0200;

/// All inbound reports arrive on a 32-byte interrupt IN endpoint.
pub const IN_ENDPOINT_PACKET_SIZE: usize = 32;

// ============================================================================
// HID++ 1.0 receiver registers (device id 0xff)
// ============================================================================

/// Wireless-notification enable/disable.
pub const REG_WIRELESS_NOTIFICATIONS: u8 = 0x00;
/// Connection state; read: paired device count, write: trigger arrival events.
pub const REG_CONNECTION_STATE: u8 = 0x02;
/// Pairing lock: open / close / unpair.
pub const REG_PAIRING: u8 = 0xb2;
/// Device activity counters (long read).
pub const REG_DEVICE_ACTIVITY: u8 = 0xb3;
/// Pairing information, keyed by a selector byte (long read).
pub const REG_PAIRING_INFORMATION: u8 = 0xb5;
/// Undocumented byte-level flash dump.
pub const REG_MEMDUMP: u8 = 0xd4;
/// Firmware update control; an "ICP" write reboots into the bootloader.
pub const REG_FIRMWARE_UPDATE: u8 = 0xf0;
/// Firmware / bootloader version and build.
pub const REG_FIRMWARE_INFO: u8 = 0xf1;

pub fn register_name(reg: u8) -> &'static str {
    match reg {
        REG_WIRELESS_NOTIFICATIONS => "WIRELESS NOTIFICATIONS",
        REG_CONNECTION_STATE => "CONNECTION STATE",
        REG_PAIRING => "PAIRING",
        REG_DEVICE_ACTIVITY => "DEVICE ACTIVITY",
        REG_PAIRING_INFORMATION => "PAIRING INFORMATION",
        REG_MEMDUMP => "MEMDUMP",
        REG_FIRMWARE_UPDATE => "FIRMWARE UPDATE",
        REG_FIRMWARE_INFO => "FIRMWARE INFO",
        _ => "UNKNOWN REGISTER",
    }
}

/// Device id addressing the receiver itself.
pub const DEVICE_ID_RECEIVER: u8 = 0xff;
