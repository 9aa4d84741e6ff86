use anyhow::{bail, Context, Result};

/// Data bytes per record when writing; avr-objcopy uses the same width.
const RECORD_WIDTH: usize = 16;

/// A parsed segment of data at a specific address from an Intel HEX file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexSegment {
    pub address: u32,
    pub data: Vec<u8>,
}

/// Parse an Intel HEX format string into address-data segments.
///
/// Supports record types:
/// - 00: Data
/// - 01: End of File
/// - 02: Extended Segment Address
/// - 04: Extended Linear Address
pub fn parse_hex(input: &str) -> Result<Vec<HexSegment>> {
    let mut segments: Vec<HexSegment> = Vec::new();
    let mut base_address: u32 = 0;

    for (line_num, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(record) = line.strip_prefix(':') else {
            bail!("line {}: missing start code ':'", line_num + 1);
        };

        let bytes = decode_hex_bytes(record)
            .with_context(|| format!("line {}: invalid hex data", line_num + 1))?;

        if bytes.len() < 5 {
            bail!("line {}: record too short", line_num + 1);
        }

        let byte_count = bytes[0] as usize;
        if bytes.len() != 5 + byte_count {
            bail!(
                "line {}: expected {} data bytes, got {}",
                line_num + 1,
                byte_count,
                bytes.len() - 5
            );
        }
        let address = u16::from_be_bytes([bytes[1], bytes[2]]);
        let record_type = bytes[3];
        let data = &bytes[4..4 + byte_count];

        if checksum(&bytes) != 0 {
            bail!("line {}: checksum mismatch", line_num + 1);
        }

        match record_type {
            0x00 => {
                let full_address = base_address + address as u32;

                if let Some(last) = segments.last_mut() {
                    let last_end = last.address + last.data.len() as u32;
                    if full_address == last_end {
                        last.data.extend_from_slice(data);
                        continue;
                    }
                }

                segments.push(HexSegment {
                    address: full_address,
                    data: data.to_vec(),
                });
            }
            0x01 => break,
            0x02 | 0x04 => {
                if byte_count != 2 {
                    bail!("line {}: address record must be 2 bytes", line_num + 1);
                }
                let upper = u16::from_be_bytes([data[0], data[1]]) as u32;
                base_address = if record_type == 0x02 { upper << 4 } else { upper << 16 };
            }
            other => {
                bail!("line {}: unsupported record type 0x{:02X}", line_num + 1, other);
            }
        }
    }

    Ok(segments)
}

/// Flatten parsed HEX segments into a contiguous image.
/// Returns (base_address, data) where gaps are filled with 0xFF.
pub fn flatten_segments(segments: &[HexSegment]) -> Result<(u32, Vec<u8>)> {
    let (Some(min_addr), Some(max_addr)) = (
        segments.iter().map(|s| s.address).min(),
        segments.iter().map(|s| s.address + s.data.len() as u32).max(),
    ) else {
        bail!("no data segments in HEX file");
    };

    let mut image = vec![0xFFu8; (max_addr - min_addr) as usize];
    for seg in segments {
        let offset = (seg.address - min_addr) as usize;
        image[offset..offset + seg.data.len()].copy_from_slice(&seg.data);
    }

    Ok((min_addr, image))
}

/// Place segments into a `size`-byte image starting at address 0.
pub fn to_image(segments: &[HexSegment], size: usize) -> Result<Vec<u8>> {
    let mut image = vec![0xFFu8; size];
    for seg in segments {
        let start = seg.address as usize;
        let end = start + seg.data.len();
        if end > size {
            bail!(
                "segment at 0x{:04X} ends past the {} byte image",
                seg.address,
                size
            );
        }
        image[start..end].copy_from_slice(&seg.data);
    }
    Ok(image)
}

/// Render `data` as Intel HEX data records starting at address 0, followed
/// by an end-of-file record. Images must fit in 64 KiB.
pub fn write_hex(data: &[u8]) -> Result<String> {
    if data.len() > 0x1_0000 {
        bail!("{} bytes do not fit a 16-bit HEX address space", data.len());
    }
    let mut out = String::new();
    for (index, chunk) in data.chunks(RECORD_WIDTH).enumerate() {
        let address = (index * RECORD_WIDTH) as u16;
        let mut record = vec![chunk.len() as u8];
        record.extend_from_slice(&address.to_be_bytes());
        record.push(0x00);
        record.extend_from_slice(chunk);
        record.push(checksum(&record).wrapping_neg());
        push_record(&mut out, &record);
    }
    out.push_str(":00000001FF\n");
    Ok(out)
}

fn push_record(out: &mut String, record: &[u8]) {
    out.push(':');
    for byte in record {
        out.push_str(&format!("{:02X}", byte));
    }
    out.push('\n');
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

fn decode_hex_bytes(hex: &str) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        bail!("odd number of hex characters");
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            hex.get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .with_context(|| format!("invalid hex at position {}", i))
        })
        .collect()
}
