//! Link-layer decoding for captured USB frames.
//!
//! Two encapsulations are understood, selected by the link-type code the
//! capture container records for each frame. Anything else is skipped.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use strum_macros::{Display, EnumIter};

use crate::usb::packet_types::{UsbDirection, UsbPacket};

/// Linux usbmon header, fixed size.
pub const USBMON_HEADER_LEN: usize = 64;
const USBMON_ENDPOINT_OFFSET: usize = 10;

/// Smallest USBPcap header (the common part shared by every transfer type).
pub const USBPCAP_MIN_HEADER_LEN: usize = 27;
const USBPCAP_ENDPOINT_OFFSET: usize = 21;

/// Link-layer encapsulations recognised by ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter)]
pub enum LinkType {
    /// `LINKTYPE_USB_LINUX`, written by usbmon.
    #[strum(serialize = "usbmon")]
    UsbLinux,
    /// `LINKTYPE_USBPCAP`, written by USBPcap on Windows.
    #[strum(serialize = "usbpcap")]
    UsbPcap,
}

impl LinkType {
    pub const USB_LINUX_CODE: u32 = 189;
    pub const USBPCAP_CODE: u32 = 249;

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            Self::USB_LINUX_CODE => Some(LinkType::UsbLinux),
            Self::USBPCAP_CODE => Some(LinkType::UsbPcap),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            LinkType::UsbLinux => Self::USB_LINUX_CODE,
            LinkType::UsbPcap => Self::USBPCAP_CODE,
        }
    }
}

/// Decode one captured frame into a [`UsbPacket`].
///
/// Returns `None` for unsupported link types, frames shorter than their
/// header, and transfers that carry no payload.
pub fn decode_frame(link_type: u32, timestamp_us: i64, frame: &[u8]) -> Option<UsbPacket> {
    match LinkType::from_code(link_type) {
        Some(LinkType::UsbLinux) => decode_usbmon(timestamp_us, frame),
        Some(LinkType::UsbPcap) => decode_usbpcap(timestamp_us, frame),
        None => {
            debug!("Skipping frame with unsupported link type {}", link_type);
            None
        }
    }
}

fn decode_usbmon(timestamp_us: i64, frame: &[u8]) -> Option<UsbPacket> {
    if frame.len() < USBMON_HEADER_LEN {
        debug!("usbmon frame too small: {} bytes", frame.len());
        return None;
    }

    let endpoint_address = frame[USBMON_ENDPOINT_OFFSET];
    let payload = &frame[USBMON_HEADER_LEN..];
    if payload.is_empty() {
        debug!("usbmon frame on EP{:02X} has no payload", endpoint_address);
        return None;
    }

    Some(UsbPacket::new(
        timestamp_us,
        UsbDirection::from_endpoint_address(endpoint_address),
        endpoint_address & 0x0F,
        payload.to_vec(),
    ))
}

fn decode_usbpcap(timestamp_us: i64, frame: &[u8]) -> Option<UsbPacket> {
    if frame.len() < USBPCAP_MIN_HEADER_LEN {
        debug!("USBPcap frame too small: {} bytes", frame.len());
        return None;
    }

    // headerLen is the first field of every USBPcap pseudo-header
    let header_len = LittleEndian::read_u16(&frame[0..2]) as usize;
    if header_len < USBPCAP_MIN_HEADER_LEN || frame.len() < header_len {
        debug!(
            "USBPcap frame declares header of {} bytes but holds {} bytes",
            header_len,
            frame.len()
        );
        return None;
    }

    let endpoint_address = frame[USBPCAP_ENDPOINT_OFFSET];
    let payload = &frame[header_len..];
    if payload.is_empty() {
        debug!("USBPcap frame on EP{:02X} has no payload", endpoint_address);
        return None;
    }

    Some(UsbPacket::new(
        timestamp_us,
        UsbDirection::from_endpoint_address(endpoint_address),
        endpoint_address & 0x0F,
        payload.to_vec(),
    ))
}
