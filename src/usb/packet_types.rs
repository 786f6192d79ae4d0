use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of a USB transfer, as seen from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UsbDirection {
    HostToDevice,
    DeviceToHost,
}

impl UsbDirection {
    /// Decode direction from bit 7 of an endpoint address (set = IN).
    pub fn from_endpoint_address(address: u8) -> Self {
        if address & 0x80 != 0 {
            UsbDirection::DeviceToHost
        } else {
            UsbDirection::HostToDevice
        }
    }

    pub fn short(&self) -> &'static str {
        match self {
            UsbDirection::HostToDevice => "H→D",
            UsbDirection::DeviceToHost => "D→H",
        }
    }
}

impl fmt::Display for UsbDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsbDirection::HostToDevice => write!(f, "HOST→DEVICE"),
            UsbDirection::DeviceToHost => write!(f, "DEVICE→HOST"),
        }
    }
}

/// One observed transfer pulled out of a bus capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbPacket {
    pub timestamp_us: i64,
    pub direction: UsbDirection,
    pub payload: Vec<u8>,
    /// Endpoint number with the direction bit masked off.
    pub endpoint: u8,
    pub label: Option<String>,
}

impl UsbPacket {
    pub fn new(timestamp_us: i64, direction: UsbDirection, endpoint: u8, payload: Vec<u8>) -> Self {
        UsbPacket {
            timestamp_us,
            direction,
            payload,
            endpoint,
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Display for UsbPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}us] {} EP{:02X} ({} bytes)",
            self.timestamp_us,
            self.direction.short(),
            self.endpoint,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_follows_endpoint_high_bit() {
        assert_eq!(UsbDirection::from_endpoint_address(0x81), UsbDirection::DeviceToHost);
        assert_eq!(UsbDirection::from_endpoint_address(0x01), UsbDirection::HostToDevice);
        assert_eq!(UsbDirection::from_endpoint_address(0x80), UsbDirection::DeviceToHost);
    }

    #[test]
    fn display_is_compact() {
        let packet = UsbPacket::new(1500, UsbDirection::DeviceToHost, 1, vec![1, 2, 3]);
        assert_eq!(packet.to_string(), "[1500us] D→H EP01 (3 bytes)");
    }
}
