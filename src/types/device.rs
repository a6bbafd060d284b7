//! Device identification and transport selection

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{LinkError, Result};

/// USB identity of a serial device the hands are wired through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub name: &'static str,
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:04x}:{:04x})", self.name, self.vendor_id, self.product_id)
    }
}

/// CP210x USB-to-TTL adapter
pub const TTL_ADAPTER: DeviceDescriptor =
    DeviceDescriptor { vendor_id: 0x10C4, product_id: 0xEA60, name: "TTL" };

/// Raspberry Pi Pico (CDC serial)
pub const PICO: DeviceDescriptor =
    DeviceDescriptor { vendor_id: 0x2E8A, product_id: 0x0005, name: "Pico" };

/// Devices searched, in order, when no serial port is configured.
pub const KNOWN_SERIAL_DEVICES: &[DeviceDescriptor] = &[TTL_ADAPTER, PICO];

impl DeviceDescriptor {
    /// Look up a known descriptor by name, ignoring case.
    pub fn by_name(name: &str) -> Option<DeviceDescriptor> {
        KNOWN_SERIAL_DEVICES.iter().copied().find(|d| d.name.eq_ignore_ascii_case(name))
    }
}

/// Hand hardware families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceFamily {
    /// Serial hand using the summation-checksum frame protocol
    Psyonic,
    /// BLE hand using the CRC-32 frame protocol
    Zeus,
    /// Pico-based hand using raw 4-byte commands over BLE and/or serial
    Smart,
}

impl DeviceFamily {
    pub fn name(self) -> &'static str {
        match self {
            DeviceFamily::Psyonic => "psyonic",
            DeviceFamily::Zeus => "zeus",
            DeviceFamily::Smart => "smart",
        }
    }

    /// Transport used when the configuration does not name one.
    pub fn default_transport(self) -> TransportMode {
        match self {
            DeviceFamily::Psyonic => TransportMode::Serial,
            DeviceFamily::Zeus => TransportMode::Ble,
            DeviceFamily::Smart => TransportMode::Ble,
        }
    }

    /// Whether the family's firmware can be reached over `mode`.
    pub fn supports_transport(self, mode: TransportMode) -> bool {
        match (self, mode) {
            (_, TransportMode::Virtual) => true,
            (DeviceFamily::Psyonic, TransportMode::Serial) => true,
            (DeviceFamily::Zeus, TransportMode::Ble) => true,
            (DeviceFamily::Smart, _) => true,
            _ => false,
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceFamily {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "psyonic" => Ok(DeviceFamily::Psyonic),
            "zeus" => Ok(DeviceFamily::Zeus),
            "smart" => Ok(DeviceFamily::Smart),
            other => Err(LinkError::config("hand family", format!("unsupported hand type '{other}'"))),
        }
    }
}

/// Physical channel(s) used to reach the hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[serde(alias = "uart", alias = "usb", alias = "cable")]
    Serial,
    #[serde(alias = "bluetooth", alias = "bt", alias = "wireless")]
    Ble,
    /// Serial and BLE at once; a write succeeds if either channel accepts it
    #[serde(alias = "both")]
    Dual,
    /// In-process channel that records traffic, for dry runs
    Virtual,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportMode::Serial => "serial",
            TransportMode::Ble => "ble",
            TransportMode::Dual => "dual",
            TransportMode::Virtual => "virtual",
        };
        f.write_str(name)
    }
}

impl FromStr for TransportMode {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" | "uart" | "usb" | "cable" => Ok(TransportMode::Serial),
            "ble" | "bluetooth" | "bt" | "wireless" => Ok(TransportMode::Ble),
            "dual" | "both" => Ok(TransportMode::Dual),
            "virtual" => Ok(TransportMode::Virtual),
            other => Err(LinkError::config(
                "transport mode",
                format!("'{other}' is not one of serial, ble, dual, virtual"),
            )),
        }
    }
}
