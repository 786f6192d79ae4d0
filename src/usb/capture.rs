//! Capture ingestion.
//!
//! Walks a pcap or pcapng container and turns every supported USB frame into
//! a [`UsbPacket`]. Ingestion never fails on content: unsupported link types,
//! short frames, empty payloads and truncated trailing records are dropped
//! and whatever was decoded up to that point is returned.

use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use log::{debug, info, warn};

use crate::error::{HilError, Result};
use crate::usb::link_layer::decode_frame;
use crate::usb::packet_types::UsbPacket;

const PCAP_GLOBAL_HEADER_LEN: usize = 24;
const PCAP_RECORD_HEADER_LEN: usize = 16;

const PCAP_MAGIC_MICROS: u32 = 0xA1B2_C3D4;
const PCAP_MAGIC_NANOS: u32 = 0xA1B2_3C4D;

const PCAPNG_SECTION_HEADER: u32 = 0x0A0D_0D0A;
const PCAPNG_INTERFACE_DESCRIPTION: u32 = 0x0000_0001;
const PCAPNG_SIMPLE_PACKET: u32 = 0x0000_0003;
const PCAPNG_ENHANCED_PACKET: u32 = 0x0000_0006;
const PCAPNG_BYTE_ORDER_MAGIC: u32 = 0x1A2B_3C4D;

const PCAPNG_OPT_END: u16 = 0;
const PCAPNG_OPT_IF_TSRESOL: u16 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }
}

/// Container formats recognised by their leading magic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

/// Sniff the container format from the first bytes of a capture.
pub fn detect_format(capture: &[u8]) -> Option<CaptureFormat> {
    if capture.len() < 4 {
        return None;
    }
    let magic_le = LittleEndian::read_u32(&capture[0..4]);
    let magic_be = BigEndian::read_u32(&capture[0..4]);
    if magic_le == PCAPNG_SECTION_HEADER {
        return Some(CaptureFormat::PcapNg);
    }
    if [PCAP_MAGIC_MICROS, PCAP_MAGIC_NANOS].contains(&magic_le)
        || [PCAP_MAGIC_MICROS, PCAP_MAGIC_NANOS].contains(&magic_be)
    {
        return Some(CaptureFormat::Pcap);
    }
    None
}

/// Parse a capture buffer into time-ordered packets.
pub fn parse(capture: &[u8]) -> Vec<UsbPacket> {
    let packets = match detect_format(capture) {
        Some(CaptureFormat::Pcap) => parse_pcap(capture),
        Some(CaptureFormat::PcapNg) => parse_pcapng(capture),
        None => {
            warn!("Unrecognised capture container ({} bytes); no packets extracted", capture.len());
            Vec::new()
        }
    };
    info!("Ingested {} USB packets from capture", packets.len());
    packets
}

/// Read and parse a capture file. Only an unreadable file is an error.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<UsbPacket>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| HilError::io(path, e))?;
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(parse(&bytes))
}

fn parse_pcap(capture: &[u8]) -> Vec<UsbPacket> {
    let mut packets = Vec::new();
    if capture.len() < PCAP_GLOBAL_HEADER_LEN {
        warn!("pcap global header truncated");
        return packets;
    }

    let magic_le = LittleEndian::read_u32(&capture[0..4]);
    let endian = if magic_le == PCAP_MAGIC_MICROS || magic_le == PCAP_MAGIC_NANOS {
        Endian::Little
    } else {
        Endian::Big
    };
    let nanos = endian.u32(&capture[0..4]) == PCAP_MAGIC_NANOS;
    let link_type = endian.u32(&capture[20..24]);
    debug!("pcap container: {:?} endian, link type {}, nanosecond timestamps: {}", endian, link_type, nanos);

    let mut offset = PCAP_GLOBAL_HEADER_LEN;
    while offset + PCAP_RECORD_HEADER_LEN <= capture.len() {
        let header = &capture[offset..offset + PCAP_RECORD_HEADER_LEN];
        let ts_sec = endian.u32(&header[0..4]) as i64;
        let ts_frac = endian.u32(&header[4..8]) as i64;
        let incl_len = endian.u32(&header[8..12]) as usize;

        let data_start = offset + PCAP_RECORD_HEADER_LEN;
        let data_end = match data_start.checked_add(incl_len) {
            Some(end) if end <= capture.len() => end,
            _ => {
                debug!("Truncated pcap record at offset {}; stopping", offset);
                break;
            }
        };

        let micros = if nanos { ts_frac / 1_000 } else { ts_frac };
        let timestamp_us = ts_sec * 1_000_000 + micros;
        if let Some(packet) = decode_frame(link_type, timestamp_us, &capture[data_start..data_end]) {
            packets.push(packet);
        }
        offset = data_end;
    }

    packets
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    link_type: u32,
    /// Timestamp units per second.
    ticks_per_second: u64,
}

fn parse_pcapng(capture: &[u8]) -> Vec<UsbPacket> {
    let mut packets = Vec::new();
    let mut interfaces: Vec<Interface> = Vec::new();
    let mut endian = Endian::Little;
    let mut last_timestamp_us = 0i64;
    let mut offset = 0usize;

    while offset + 12 <= capture.len() {
        let block_type = endian.u32(&capture[offset..offset + 4]);

        if block_type == PCAPNG_SECTION_HEADER {
            // Byte order is redeclared by every section.
            endian = match LittleEndian::read_u32(&capture[offset + 8..offset + 12]) {
                PCAPNG_BYTE_ORDER_MAGIC => Endian::Little,
                _ if BigEndian::read_u32(&capture[offset + 8..offset + 12]) == PCAPNG_BYTE_ORDER_MAGIC => Endian::Big,
                _ => {
                    warn!("pcapng section at offset {} has an invalid byte-order magic", offset);
                    break;
                }
            };
            interfaces.clear();
        }

        let block_len = endian.u32(&capture[offset + 4..offset + 8]) as usize;
        if block_len < 12 || block_len % 4 != 0 || offset + block_len > capture.len() {
            debug!("Truncated or malformed pcapng block at offset {}; stopping", offset);
            break;
        }
        let body = &capture[offset + 8..offset + block_len - 4];

        match block_type {
            PCAPNG_SECTION_HEADER => {}
            PCAPNG_INTERFACE_DESCRIPTION if body.len() >= 8 => {
                let interface = Interface {
                    link_type: endian.u16(&body[0..2]) as u32,
                    ticks_per_second: interface_resolution(endian, &body[8..]),
                };
                debug!("pcapng interface {}: {:?}", interfaces.len(), interface);
                interfaces.push(interface);
            }
            PCAPNG_ENHANCED_PACKET if body.len() >= 20 => {
                let interface_id = endian.u32(&body[0..4]) as usize;
                let ts_high = endian.u32(&body[4..8]) as u64;
                let ts_low = endian.u32(&body[8..12]) as u64;
                let captured_len = endian.u32(&body[12..16]) as usize;
                match (interfaces.get(interface_id), body.get(20..20 + captured_len)) {
                    (Some(interface), Some(frame)) => {
                        let ticks = (ts_high << 32) | ts_low;
                        // Coarse resolutions can push far-future ticks past i64 microseconds.
                        let timestamp_us =
                            i64::try_from(ticks as u128 * 1_000_000 / interface.ticks_per_second.max(1) as u128)
                                .unwrap_or(i64::MAX);
                        last_timestamp_us = timestamp_us;
                        if let Some(packet) = decode_frame(interface.link_type, timestamp_us, frame) {
                            packets.push(packet);
                        }
                    }
                    _ => debug!("Enhanced packet block at offset {} is inconsistent; skipped", offset),
                }
            }
            PCAPNG_SIMPLE_PACKET if body.len() >= 4 => {
                // Simple packets carry no timestamp and always belong to interface 0.
                let original_len = endian.u32(&body[0..4]) as usize;
                let frame = &body[4..];
                let frame = &frame[..original_len.min(frame.len())];
                if let Some(interface) = interfaces.first() {
                    if let Some(packet) = decode_frame(interface.link_type, last_timestamp_us, frame) {
                        packets.push(packet);
                    }
                }
            }
            other => debug!("Skipping pcapng block type 0x{:08X}", other),
        }

        offset += block_len;
    }

    packets
}

/// Resolve `if_tsresol` from an interface description's options, defaulting
/// to microseconds.
fn interface_resolution(endian: Endian, mut options: &[u8]) -> u64 {
    const DEFAULT: u64 = 1_000_000;
    while options.len() >= 4 {
        let code = endian.u16(&options[0..2]);
        let len = endian.u16(&options[2..4]) as usize;
        if code == PCAPNG_OPT_END {
            break;
        }
        let padded = (len + 3) & !3;
        if options.len() < 4 + padded {
            break;
        }
        if code == PCAPNG_OPT_IF_TSRESOL && len >= 1 {
            let raw = options[4];
            let exponent = (raw & 0x7F) as u32;
            let resolution = if raw & 0x80 == 0 {
                10u64.checked_pow(exponent)
            } else {
                2u64.checked_pow(exponent)
            };
            return resolution.unwrap_or(DEFAULT);
        }
        options = &options[4 + padded..];
    }
    DEFAULT
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::usb::link_layer::tests::{usbmon_frame, usbpcap_frame};
    use crate::usb::link_layer::LinkType;
    use crate::usb::packet_types::UsbDirection;

    /// Build a little-endian microsecond pcap around the given frames.
    pub(crate) fn pcap(link_type: u32, frames: &[(i64, Vec<u8>)]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&PCAP_MAGIC_MICROS.to_le_bytes());
        out.extend_from_slice(&2u16.to_le_bytes());
        out.extend_from_slice(&4u16.to_le_bytes());
        out.extend_from_slice(&0i32.to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&65535u32.to_le_bytes());
        out.extend_from_slice(&link_type.to_le_bytes());
        for (ts_us, frame) in frames {
            out.extend_from_slice(&((ts_us / 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&((ts_us % 1_000_000) as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            out.extend_from_slice(frame);
        }
        out
    }

    fn pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
        let padded = (body.len() + 3) & !3;
        let total = (12 + padded) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&block_type.to_le_bytes());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(body);
        out.resize(8 + padded, 0);
        out.extend_from_slice(&total.to_le_bytes());
        out
    }

    fn pcapng(link_type: u16, tsresol: Option<u8>, frames: &[(u64, Vec<u8>)]) -> Vec<u8> {
        let mut shb = Vec::new();
        shb.extend_from_slice(&PCAPNG_BYTE_ORDER_MAGIC.to_le_bytes());
        shb.extend_from_slice(&1u16.to_le_bytes());
        shb.extend_from_slice(&0u16.to_le_bytes());
        shb.extend_from_slice(&u64::MAX.to_le_bytes());
        let mut out = pcapng_block(PCAPNG_SECTION_HEADER, &shb);

        let mut idb = Vec::new();
        idb.extend_from_slice(&link_type.to_le_bytes());
        idb.extend_from_slice(&0u16.to_le_bytes());
        idb.extend_from_slice(&65535u32.to_le_bytes());
        if let Some(resol) = tsresol {
            idb.extend_from_slice(&PCAPNG_OPT_IF_TSRESOL.to_le_bytes());
            idb.extend_from_slice(&1u16.to_le_bytes());
            idb.extend_from_slice(&[resol, 0, 0, 0]);
            idb.extend_from_slice(&[0, 0, 0, 0]);
        }
        out.extend(pcapng_block(PCAPNG_INTERFACE_DESCRIPTION, &idb));

        for (ticks, frame) in frames {
            let mut epb = Vec::new();
            epb.extend_from_slice(&0u32.to_le_bytes());
            epb.extend_from_slice(&((ticks >> 32) as u32).to_le_bytes());
            epb.extend_from_slice(&(*ticks as u32).to_le_bytes());
            epb.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            epb.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            epb.extend_from_slice(frame);
            out.extend(pcapng_block(PCAPNG_ENHANCED_PACKET, &epb));
        }
        out
    }

    #[test]
    fn pcap_usbmon_packets_in_order() {
        let capture = pcap(
            LinkType::USB_LINUX_CODE,
            &[
                (1_000, usbmon_frame(0x81, &[0x01, 0, 0, 0])),
                (5_000, usbmon_frame(0x01, &[0x02, 0, 0, 0])),
            ],
        );
        let packets = parse(&capture);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].timestamp_us, 1_000);
        assert_eq!(packets[0].direction, UsbDirection::DeviceToHost);
        assert_eq!(packets[1].timestamp_us, 5_000);
        assert_eq!(packets[1].direction, UsbDirection::HostToDevice);
    }

    #[test]
    fn pcap_skips_empty_and_short_frames() {
        let capture = pcap(
            LinkType::USBPCAP_CODE,
            &[
                (10, usbpcap_frame(27, 0x81, &[])),
                (20, vec![0u8; 5]),
                (30, usbpcap_frame(27, 0x81, &[0xDE, 0xAD])),
            ],
        );
        let packets = parse(&capture);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, vec![0xDE, 0xAD]);
    }

    #[test]
    fn pcap_with_unsupported_link_type_yields_nothing() {
        let capture = pcap(1, &[(10, usbmon_frame(0x81, &[1, 2, 3]))]);
        assert!(parse(&capture).is_empty());
    }

    #[test]
    fn truncated_trailing_record_keeps_earlier_packets() {
        let mut capture = pcap(
            LinkType::USB_LINUX_CODE,
            &[
                (1, usbmon_frame(0x81, &[1])),
                (2, usbmon_frame(0x81, &[2])),
            ],
        );
        capture.truncate(capture.len() - 10);
        let packets = parse(&capture);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].payload, vec![1]);
    }

    #[test]
    fn big_endian_nanosecond_pcap() {
        let frame = usbmon_frame(0x81, &[0xAB]);
        let mut capture = Vec::new();
        capture.extend_from_slice(&PCAP_MAGIC_NANOS.to_be_bytes());
        capture.extend_from_slice(&2u16.to_be_bytes());
        capture.extend_from_slice(&4u16.to_be_bytes());
        capture.extend_from_slice(&[0u8; 8]);
        capture.extend_from_slice(&65535u32.to_be_bytes());
        capture.extend_from_slice(&LinkType::USB_LINUX_CODE.to_be_bytes());
        capture.extend_from_slice(&3u32.to_be_bytes());
        capture.extend_from_slice(&250_000_000u32.to_be_bytes());
        capture.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        capture.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        capture.extend_from_slice(&frame);

        let packets = parse(&capture);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp_us, 3_250_000);
    }

    #[test]
    fn pcapng_enhanced_packets() {
        let capture = pcapng(
            LinkType::USBPCAP_CODE as u16,
            None,
            &[
                (2_000, usbpcap_frame(27, 0x81, &[0x01, 0, 0, 0])),
                (4_500, usbpcap_frame(27, 0x01, &[0x02, 0, 0, 0])),
            ],
        );
        assert_eq!(detect_format(&capture), Some(CaptureFormat::PcapNg));
        let packets = parse(&capture);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].timestamp_us, 2_000);
        assert_eq!(packets[1].timestamp_us, 4_500);
        assert_eq!(packets[1].direction, UsbDirection::HostToDevice);
    }

    #[test]
    fn pcapng_nanosecond_resolution() {
        let capture = pcapng(
            LinkType::USB_LINUX_CODE as u16,
            Some(9),
            &[(7_000_000, usbmon_frame(0x81, &[0x05]))],
        );
        let packets = parse(&capture);
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].timestamp_us, 7_000);
    }

    #[test]
    fn pcapng_timestamp_saturates_instead_of_wrapping() {
        // if_tsresol of 0 means one tick per second.
        let capture = pcapng(
            LinkType::USB_LINUX_CODE as u16,
            Some(0),
            &[(u64::MAX, usbmon_frame(0x81, &[0x05])), (3, usbmon_frame(0x01, &[0x06]))],
        );
        let packets = parse(&capture);
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].timestamp_us, i64::MAX);
        assert_eq!(packets[0].payload, vec![0x05]);
        assert_eq!(packets[1].timestamp_us, 3_000_000);
    }

    #[test]
    fn garbage_input_is_not_an_error() {
        assert!(parse(b"definitely not a capture").is_empty());
        assert!(parse(&[]).is_empty());
    }
}
