//! TI receiver firmware blob parsing and transformation.
//!
//! A firmware blob optionally starts with a 1 KiB bootloader block
//! (detected by the Logitech USB VID stored little-endian at offset
//! 0x3f8). The image proper ends with the marker `FE C0 AD DE`, preceded
//! by a little-endian CRC-16/CCITT-FALSE word covering everything from the
//! image start up to that word. This module is pure: the only I/O is the
//! `load` convenience wrapper around a whole-file read.

use std::fmt;
use std::path::Path;

use crc::{CRC_16_IBM_3740, Crc};
use thiserror::Error;
use tracing::info;

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xffff, no reflection, no xor-out.
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Marker closing every TI receiver image.
pub const END_MARKER: [u8; 4] = [0xfe, 0xc0, 0xad, 0xde];

/// Size of the optional prepended bootloader block.
const BOOTLOADER_BLOCK: usize = 0x400;

/// Length of an RSA signature blob accepted by signed bootloaders.
pub const SIGNATURE_LEN: usize = 256;

/// Image sizes involved in the BL03.02 -> BL03.01 downgrade.
const BL0302_IMAGE_SIZE: usize = 0x6000;
const BL0301_IMAGE_SIZE: usize = 0x6800;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FirmwareError {
    #[error("firmware blob too small ({0} bytes)")]
    TooSmall(usize),

    #[error("no firmware end marker found, not a Logitech firmware for TI receivers")]
    NoEndMarker,

    #[error("firmware has wrong CRC (computed {computed:#06x}, stored {stored:#06x})")]
    BadCrc { computed: u16, stored: u16 },

    #[error("firmware signature must be {SIGNATURE_LEN} bytes, got {0}")]
    BadSignatureLength(usize),

    #[error("only images of size {BL0302_IMAGE_SIZE:#06x} can be resized for an older bootloader")]
    NotResizable,

    #[error("image needs the downgrade patch, which only unsigned bootloaders accept")]
    PatchRequiresUnsignedBootloader,
}

/// The fourteen byte-string substitutions of the downgrade patch, applied
/// in order, each as a replace-all over the whole buffer. They express the
/// +0x800 XDATA shift of the device-data pages: every 0xe4/0xe8 address
/// MSB in the patched loci becomes 0xec/0xf0, and the affected loop
/// counters move along.
const DOWNGRADE_PATCHES: [(&[u8], &[u8]); 14] = [
    (&[0x90, 0xe4, 0x00], &[0x90, 0xec, 0x00]),
    (&[0x7a, 0x04, 0x7b, 0xe4], &[0x7a, 0x04, 0x7b, 0xec]),
    (&[0x90, 0xe8, 0x00], &[0x90, 0xf0, 0x00]),
    (&[0x7a, 0x04, 0x7b, 0xe8], &[0x7a, 0x04, 0x7b, 0xf0]),
    (&[0x08, 0x74, 0xe4], &[0x08, 0x74, 0xec]),
    (&[0x75, 0x0f, 0xe8], &[0x75, 0x0f, 0xf0]),
    (&[0x79, 0x1a], &[0x79, 0x1c]),
    (&[0x7f, 0x1a, 0x79, 0x7f], &[0x7f, 0x1c, 0x79, 0x7f]),
    (&[0x7f, 0x19], &[0x7f, 0x1b]),
    (&[0x79, 0x19], &[0x79, 0x1b]),
    (&[0xf2, 0x08, 0x74, 0xe8], &[0xf2, 0x08, 0x74, 0xf0]),
    (&[0x0f, 0xe4, 0x22], &[0x0f, 0xec, 0x22]),
    (&[0x00, 0x7b, 0x64], &[0x00, 0x7b, 0x6c]),
    (&[0x05, 0x79, 0x19], &[0x05, 0x79, 0x1b]),
];

/// A parsed firmware blob. Immutable after parse except for signature
/// attachment.
#[derive(Debug, Clone, PartialEq)]
pub struct Firmware {
    raw: Vec<u8>,
    /// Image length including CRC word and end marker.
    size: usize,
    /// Offset of the first image byte (0x400 with a prepended bootloader).
    start: usize,
    /// Offset of the last image byte.
    last: usize,
    /// Offset of the CRC low byte.
    tail: usize,
    crc: u16,
    has_bootloader: bool,
    signature: Option<[u8; SIGNATURE_LEN]>,
}

impl Firmware {
    /// Read and parse a raw firmware file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let raw = std::fs::read(path.as_ref())?;
        Ok(Self::parse(raw)?)
    }

    /// Parse a raw firmware blob.
    pub fn parse(raw: Vec<u8>) -> Result<Self, FirmwareError> {
        if raw.len() < BOOTLOADER_BLOCK {
            return Err(FirmwareError::TooSmall(raw.len()));
        }

        // With a prepended bootloader, offset 0x3f8 holds the USB VID
        // little-endian (0x046d), 0x3fa the PID, 0x3fc the BL version.
        let has_bootloader = raw[0x3f8] == 0x6d && raw[0x3f9] == 0x04;
        let start = if has_bootloader { BOOTLOADER_BLOCK } else { 0 };

        let marker_pos = raw[start..]
            .windows(END_MARKER.len())
            .position(|w| w == END_MARKER)
            .ok_or(FirmwareError::NoEndMarker)?;

        let size = marker_pos + END_MARKER.len();
        if size < 6 {
            return Err(FirmwareError::NoEndMarker);
        }
        let last = start + size - 1;
        let tail = start + size - 6;

        let stored = u16::from_le_bytes([raw[tail], raw[tail + 1]]);
        let computed = CRC16.checksum(&raw[start..tail]);
        if computed != stored {
            return Err(FirmwareError::BadCrc { computed, stored });
        }

        let firmware = Firmware {
            raw,
            size,
            start,
            last,
            tail,
            crc: stored,
            has_bootloader,
            signature: None,
        };
        info!(%firmware, "firmware blob parsed");
        Ok(firmware)
    }

    /// Attach a detached signature blob. Any length other than 256 bytes is
    /// rejected and the image stays unchanged.
    pub fn add_signature(&mut self, signature: &[u8]) -> Result<(), FirmwareError> {
        if signature.len() != SIGNATURE_LEN {
            return Err(FirmwareError::BadSignatureLength(signature.len()));
        }
        let mut stored = [0u8; SIGNATURE_LEN];
        stored.copy_from_slice(signature);
        self.signature = Some(stored);
        Ok(())
    }

    /// The flashable image: everything from the start offset up to and
    /// including the end marker.
    pub fn base_image(&self) -> &[u8] {
        &self.raw[self.start..self.start + self.size]
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn start_offset(&self) -> usize {
        self.start
    }

    pub fn last_offset(&self) -> usize {
        self.last
    }

    pub fn crc(&self) -> u16 {
        self.crc
    }

    pub fn has_bootloader(&self) -> bool {
        self.has_bootloader
    }

    pub fn has_signature(&self) -> bool {
        self.signature.is_some()
    }

    pub fn signature(&self) -> Option<&[u8; SIGNATURE_LEN]> {
        self.signature.as_ref()
    }

    /// Rework an image built for the signed BL03.02 bootloader into one the
    /// unsigned BL03.01 accepts.
    ///
    /// The image grows from 0x6000 to 0x6800 bytes (the device-data pages
    /// move up by 0x800), the fourteen instruction patches retarget the
    /// moved pages, and CRC plus end marker are rebuilt at the new tail.
    ///
    /// Best effort: verified on RQR39.04 and RQR24.07, expected to hold for
    /// RQR41.00 and RQR45.00.
    pub fn downgrade_to_bl0301(&self) -> Result<Vec<u8>, FirmwareError> {
        if self.size != BL0302_IMAGE_SIZE {
            return Err(FirmwareError::NotResizable);
        }

        let mut image = Vec::with_capacity(BL0301_IMAGE_SIZE);
        image.extend_from_slice(self.base_image());
        image.resize(BL0301_IMAGE_SIZE, 0xff);
        // The old CRC and end marker become padding.
        image[BL0302_IMAGE_SIZE - 6..BL0302_IMAGE_SIZE].fill(0xff);

        for (from, to) in DOWNGRADE_PATCHES {
            patch_all(&mut image, from, to);
        }

        let len = image.len();
        image[len - 4..].copy_from_slice(&END_MARKER);
        let crc = CRC16.checksum(&image[..len - 6]);
        image[len - 6..len - 4].copy_from_slice(&crc.to_le_bytes());

        Ok(image)
    }
}

impl fmt::Display for Firmware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "firmware image: size {:#06x}, start {:#06x}, end {:#06x}, CRC {:#06x}, bootloader block {}, signature {}",
            self.size,
            self.start,
            self.last,
            self.crc,
            if self.has_bootloader { "present" } else { "absent" },
            if self.signature.is_some() { "attached" } else { "none" },
        )
    }
}

/// Replace every non-overlapping occurrence of `from` with the same-length
/// `to`, scanning left to right. Returns the number of replacements.
fn patch_all(buf: &mut [u8], from: &[u8], to: &[u8]) -> usize {
    debug_assert_eq!(from.len(), to.len());
    let mut count = 0;
    let mut i = 0;
    while i + from.len() <= buf.len() {
        if &buf[i..i + from.len()] == from {
            buf[i..i + to.len()].copy_from_slice(to);
            i += from.len();
            count += 1;
        } else {
            i += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a valid image of `image_size` total bytes (CRC and marker
    /// included), optionally behind a fake bootloader block.
    fn build_image(image_size: usize, with_bootloader: bool) -> Vec<u8> {
        let start = if with_bootloader { BOOTLOADER_BLOCK } else { 0 };
        let mut raw = vec![0u8; start + image_size];
        if with_bootloader {
            raw[0x3f8] = 0x6d;
            raw[0x3f9] = 0x04;
        }
        let tail = start + image_size - 6;
        raw[tail + 2..tail + 6].copy_from_slice(&END_MARKER);
        let crc = CRC16.checksum(&raw[start..tail]);
        raw[tail..tail + 2].copy_from_slice(&crc.to_le_bytes());
        raw
    }

    #[test]
    fn parses_image_without_bootloader_block() {
        let raw = build_image(0x1000, false);
        let firmware = Firmware::parse(raw).unwrap();
        assert!(!firmware.has_bootloader());
        assert_eq!(firmware.start_offset(), 0);
        assert_eq!(firmware.size(), 0x1000);
        assert_eq!(firmware.last_offset(), 0x0fff);
        assert_eq!(&firmware.base_image()[0x1000 - 4..], &END_MARKER);
    }

    #[test]
    fn detects_prepended_bootloader() {
        let raw = build_image(0x6000, true);
        let firmware = Firmware::parse(raw).unwrap();
        assert!(firmware.has_bootloader());
        assert_eq!(firmware.start_offset(), 0x400);
        assert_eq!(firmware.size(), 0x6000);
    }

    #[test]
    fn rejects_truncated_blob() {
        assert_eq!(
            Firmware::parse(vec![0u8; 0x200]),
            Err(FirmwareError::TooSmall(0x200))
        );
    }

    #[test]
    fn rejects_missing_end_marker() {
        let raw = vec![0u8; 0x2000];
        assert_eq!(Firmware::parse(raw), Err(FirmwareError::NoEndMarker));
    }

    #[test]
    fn rejects_wrong_crc() {
        // A 0x6400-byte blob (bootloader block + 0x6000 image) whose CRC
        // word is off by one.
        let mut raw = build_image(0x6000, true);
        assert_eq!(raw.len(), 0x6400);
        let tail = 0x400 + 0x6000 - 6;
        raw[tail] = raw[tail].wrapping_add(1);
        assert!(matches!(
            Firmware::parse(raw),
            Err(FirmwareError::BadCrc { .. })
        ));
    }

    #[test]
    fn signature_must_be_256_bytes() {
        let mut firmware = Firmware::parse(build_image(0x1000, false)).unwrap();
        assert_eq!(
            firmware.add_signature(&[0u8; 128]),
            Err(FirmwareError::BadSignatureLength(128))
        );
        assert!(!firmware.has_signature());

        firmware.add_signature(&[0xaa; SIGNATURE_LEN]).unwrap();
        assert!(firmware.has_signature());
        assert_eq!(firmware.signature().unwrap()[0], 0xaa);
    }

    #[test]
    fn downgrade_requires_exact_source_size() {
        let firmware = Firmware::parse(build_image(0x1000, false)).unwrap();
        assert_eq!(
            firmware.downgrade_to_bl0301(),
            Err(FirmwareError::NotResizable)
        );
    }

    #[test]
    fn downgrade_produces_self_consistent_image() {
        let firmware = Firmware::parse(build_image(BL0302_IMAGE_SIZE, true)).unwrap();
        let patched = firmware.downgrade_to_bl0301().unwrap();

        assert_eq!(patched.len(), BL0301_IMAGE_SIZE);
        assert_eq!(&patched[BL0301_IMAGE_SIZE - 4..], &END_MARKER);

        let crc = CRC16.checksum(&patched[..BL0301_IMAGE_SIZE - 6]);
        assert_eq!(
            u16::from_le_bytes([
                patched[BL0301_IMAGE_SIZE - 6],
                patched[BL0301_IMAGE_SIZE - 5]
            ]),
            crc
        );

        // No substitution source may survive in the image body, and the
        // parsed result must be a valid image again.
        let body = &patched[..BL0301_IMAGE_SIZE - 6];
        for (from, _) in DOWNGRADE_PATCHES {
            assert!(
                !body.windows(from.len()).any(|w| w == from),
                "source pattern {from:02x?} still present"
            );
        }
        let reparsed = Firmware::parse(patched).unwrap();
        assert_eq!(reparsed.size(), BL0301_IMAGE_SIZE);
    }

    #[test]
    fn downgrade_rewrites_patched_instructions() {
        // Place one patchable instruction inside the image body and check
        // the substitution took effect.
        let mut raw = build_image(BL0302_IMAGE_SIZE, false);
        raw[0x100..0x103].copy_from_slice(&[0x90, 0xe4, 0x00]);
        let tail = BL0302_IMAGE_SIZE - 6;
        let crc = CRC16.checksum(&raw[..tail]);
        raw[tail..tail + 2].copy_from_slice(&crc.to_le_bytes());

        let firmware = Firmware::parse(raw).unwrap();
        let patched = firmware.downgrade_to_bl0301().unwrap();
        assert_eq!(&patched[0x100..0x103], &[0x90, 0xec, 0x00]);
    }

    #[test]
    fn patch_all_is_non_overlapping_left_to_right() {
        let mut buf = [0x79, 0x19, 0x19, 0x79, 0x19];
        let n = patch_all(&mut buf, &[0x79, 0x19], &[0x79, 0x1b]);
        assert_eq!(n, 2);
        assert_eq!(buf, [0x79, 0x1b, 0x19, 0x79, 0x1b]);
    }
}
