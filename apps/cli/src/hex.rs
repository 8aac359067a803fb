//! Intel-HEX reader for the alternate firmware input format.
//!
//! Logitech publishes receiver firmwares as Intel-HEX text. The records
//! are assembled into one contiguous binary (gaps filled with erased-flash
//! 0xff bytes) which then goes through the same raw firmware parser as a
//! `-r` input.

use anyhow::{Context, Result, bail, ensure};

const RECORD_DATA: u8 = 0x00;
const RECORD_EOF: u8 = 0x01;
const RECORD_EXT_SEGMENT: u8 = 0x02;
const RECORD_EXT_LINEAR: u8 = 0x04;

/// Assemble the data records of an Intel-HEX text into a binary image.
pub fn assemble(text: &str) -> Result<Vec<u8>> {
    let mut image: Vec<u8> = Vec::new();
    let mut base: u32 = 0;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record = parse_record(line).with_context(|| format!("hex line {}", line_no + 1))?;

        match record.kind {
            RECORD_DATA => {
                let start = (base + u32::from(record.addr)) as usize;
                let end = start + record.data.len();
                if image.len() < end {
                    image.resize(end, 0xff);
                }
                image[start..end].copy_from_slice(&record.data);
            }
            RECORD_EOF => break,
            RECORD_EXT_SEGMENT => {
                ensure!(record.data.len() == 2, "malformed extended segment record");
                base = u32::from(u16::from_be_bytes([record.data[0], record.data[1]])) << 4;
            }
            RECORD_EXT_LINEAR => {
                ensure!(record.data.len() == 2, "malformed extended linear record");
                base = u32::from(u16::from_be_bytes([record.data[0], record.data[1]])) << 16;
            }
            other => bail!("unsupported hex record type {other:#04x}"),
        }
    }

    ensure!(!image.is_empty(), "hex file contains no data records");
    Ok(image)
}

struct Record {
    addr: u16,
    kind: u8,
    data: Vec<u8>,
}

fn parse_record(line: &str) -> Result<Record> {
    let body = line
        .strip_prefix(':')
        .context("record does not start with ':'")?;
    ensure!(body.len() % 2 == 0 && body.len() >= 10, "truncated record");

    let bytes: Vec<u8> = (0..body.len() / 2)
        .map(|i| u8::from_str_radix(&body[i * 2..i * 2 + 2], 16))
        .collect::<Result<_, _>>()
        .context("record is not hex")?;

    let len = usize::from(bytes[0]);
    ensure!(bytes.len() == len + 5, "record length field mismatch");

    let checksum: u8 = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    ensure!(checksum == 0, "record checksum mismatch");

    Ok(Record {
        addr: u16::from_be_bytes([bytes[1], bytes[2]]),
        kind: bytes[3],
        data: bytes[4..4 + len].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_data_records() {
        let text = ":0400000001020304F2\n:04000400AABBCCDDEA\n:00000001FF\n";
        let image = assemble(text).unwrap();
        assert_eq!(image, vec![0x01, 0x02, 0x03, 0x04, 0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn fills_gaps_with_erased_flash() {
        let text = ":0100000042BD\n:01000400AA51\n:00000001FF\n";
        let image = assemble(text).unwrap();
        assert_eq!(image, vec![0x42, 0xff, 0xff, 0xff, 0xaa]);
    }

    #[test]
    fn rejects_bad_checksum() {
        assert!(assemble(":0100000042BE\n").is_err());
    }

    #[test]
    fn honors_extended_linear_address() {
        let text = ":020000040001F9\n:0100000055AA\n:00000001FF\n";
        let image = assemble(text).unwrap();
        assert_eq!(image.len(), 0x10001);
        assert_eq!(image[0x10000], 0x55);
        assert_eq!(image[0], 0xff);
    }

    #[test]
    fn stops_at_eof_record() {
        let text = ":0100000011EE\n:00000001FF\n:01000000FF00\n";
        let image = assemble(text).unwrap();
        assert_eq!(image, vec![0x11]);
    }
}
