//! Serial port discovery by USB vendor/product id.

use std::time::Duration;

use tokio_serial::SerialPortType;
use tracing::{debug, info, warn};

use crate::types::{DeviceDescriptor, KNOWN_SERIAL_DEVICES};
use crate::{LinkError, Result};

/// A serial port as reported by the operating system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    pub port_name: String,
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

impl PortInfo {
    pub fn usb(port_name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            port_name: port_name.into(),
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            manufacturer: None,
            product: None,
        }
    }

    fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        self.vendor_id == Some(descriptor.vendor_id) && self.product_id == Some(descriptor.product_id)
    }
}

impl From<tokio_serial::SerialPortInfo> for PortInfo {
    fn from(info: tokio_serial::SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb) => Self {
                port_name: info.port_name,
                vendor_id: Some(usb.vid),
                product_id: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => Self {
                port_name: info.port_name,
                vendor_id: None,
                product_id: None,
                manufacturer: None,
                product: None,
            },
        }
    }
}

/// Ports currently present on the system.
pub fn list_ports() -> Result<Vec<PortInfo>> {
    let ports = tokio_serial::available_ports()?;
    Ok(ports.into_iter().map(PortInfo::from).collect())
}

/// First port matching a known device, in port order.
///
/// With `preferred` set only that descriptor is considered.
pub fn match_port(
    ports: &[PortInfo],
    preferred: Option<DeviceDescriptor>,
) -> Option<(&PortInfo, DeviceDescriptor)> {
    let candidates: &[DeviceDescriptor] = match &preferred {
        Some(descriptor) => std::slice::from_ref(descriptor),
        None => KNOWN_SERIAL_DEVICES,
    };

    ports.iter().find_map(|port| {
        candidates.iter().find(|descriptor| port.matches(descriptor)).map(|descriptor| (port, *descriptor))
    })
}

/// Scan for a known device, retrying up to `attempts` times.
pub async fn find_serial_port(
    preferred: Option<DeviceDescriptor>,
    attempts: u32,
    retry_delay: Duration,
) -> Result<(String, DeviceDescriptor)> {
    let target = preferred.map_or_else(|| "a known serial device".to_string(), |d| d.to_string());

    for attempt in 1..=attempts.max(1) {
        let ports = match list_ports() {
            Ok(ports) => ports,
            Err(e) => {
                warn!(attempt, "Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        };
        debug!(attempt, ports = ports.len(), "Scanning serial ports for {}", target);

        if let Some((port, descriptor)) = match_port(&ports, preferred) {
            info!(
                port = %port.port_name,
                device = descriptor.name,
                manufacturer = port.manufacturer.as_deref().unwrap_or("unknown"),
                product = port.product.as_deref().unwrap_or("unknown"),
                "Found serial device"
            );
            return Ok((port.port_name.clone(), descriptor));
        }

        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }

    Err(LinkError::Discovery { target, attempts: attempts.max(1) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PICO, TTL_ADAPTER};

    fn ports() -> Vec<PortInfo> {
        vec![
            PortInfo { port_name: "/dev/ttyS0".into(), vendor_id: None, product_id: None, manufacturer: None, product: None },
            PortInfo::usb("/dev/ttyACM0", 0x2E8A, 0x0005),
            PortInfo::usb("/dev/ttyUSB0", 0x10C4, 0xEA60),
        ]
    }

    #[test]
    fn first_known_port_wins() {
        let ports = ports();
        let (port, descriptor) = match_port(&ports, None).unwrap();
        assert_eq!(port.port_name, "/dev/ttyACM0");
        assert_eq!(descriptor, PICO);
    }

    #[test]
    fn preferred_descriptor_restricts_search() {
        let ports = ports();
        let (port, descriptor) = match_port(&ports, Some(TTL_ADAPTER)).unwrap();
        assert_eq!(port.port_name, "/dev/ttyUSB0");
        assert_eq!(descriptor, TTL_ADAPTER);

        let only_pico = vec![PortInfo::usb("/dev/ttyACM0", 0x2E8A, 0x0005)];
        assert!(match_port(&only_pico, Some(TTL_ADAPTER)).is_none());
    }

    #[test]
    fn unknown_usb_devices_are_ignored() {
        let ports = vec![PortInfo::usb("/dev/ttyUSB3", 0x04B4, 0xF155)];
        assert!(match_port(&ports, None).is_none());
        assert!(match_port(&[], None).is_none());
    }
}
