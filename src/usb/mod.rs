pub mod capture;
pub mod link_layer;
pub mod packet_types;

// Re-export commonly used types for easier access
pub use self::capture::{parse, parse_file, CaptureFormat};
pub use self::link_layer::LinkType;
pub use self::packet_types::{UsbDirection, UsbPacket};
