//! Physical channels to the hand.
//!
//! A [`Transport`] owns exactly one device handle and serialises all access to
//! it through `&mut self`. Implementations:
//!
//! - [`SerialTransport`]: polled serial port (tokio-serial), with optional
//!   newline framing and write-then-ack
//! - [`BleTransport`]: notification-driven BLE peripheral (feature `ble`)
//! - [`DualTransport`]: two transports driven together; a write succeeds when
//!   either channel accepts it
//! - [`VirtualTransport`]: in-process recorder for dry runs and tests
//!
//! # Lifecycle
//!
//! `connect` is a no-op on a connected transport, and a failed `connect` leaves
//! the transport disconnected. `disconnect` is idempotent.

#[cfg(feature = "ble")]
pub mod ble;
pub mod discovery;
pub mod dual;
pub mod serial;
pub mod virtual_link;

#[cfg(feature = "ble")]
pub use ble::BleTransport;
pub use discovery::{PortInfo, find_serial_port, list_ports, match_port};
pub use dual::DualTransport;
pub use serial::SerialTransport;
pub use virtual_link::{VirtualProbe, VirtualTransport};

use std::sync::Arc;

use crate::types::TransportMode;
use crate::{LinkError, Result};

/// Callback for data pushed by the device.
///
/// Runs on the transport's delivery task and must return quickly: decode,
/// validate and hand off, nothing more.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// UART-over-BLE service layout of a peripheral, as 128-bit UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BleProfile {
    pub service: u128,
    /// Characteristic the peripheral notifies on
    pub notify: u128,
    /// Characteristic commands are written to
    pub write: u128,
}

/// A connect/read/write/notify channel to one device.
#[async_trait::async_trait]
pub trait Transport: Send + 'static {
    /// Which kind of channel this is.
    fn kind(&self) -> TransportMode;

    /// Port, peripheral name or label used in logs and errors.
    fn name(&self) -> &str;

    fn is_connected(&self) -> bool;

    async fn connect(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Write one command. Completes any acknowledgement exchange before returning.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Poll for one chunk of inbound data.
    ///
    /// Returns `Ok(None)` when nothing arrived within the transport's timeout.
    async fn read(&mut self) -> Result<Option<Vec<u8>>>;

    /// Register the callback for device-initiated data.
    ///
    /// Polled transports have no notifications and return
    /// [`LinkError::UnsupportedOperation`].
    fn set_notification_handler(&mut self, handler: NotificationHandler) -> Result<()> {
        let _ = handler;
        Err(LinkError::unsupported("notifications", self.name()))
    }
}

#[async_trait::async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    fn kind(&self) -> TransportMode {
        (**self).kind()
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        (**self).connect().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        (**self).disconnect().await
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data).await
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        (**self).read().await
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) -> Result<()> {
        (**self).set_notification_handler(handler)
    }
}

pub(crate) fn ensure_connected<T: Transport + ?Sized>(transport: &T) -> Result<()> {
    if transport.is_connected() {
        Ok(())
    } else {
        Err(LinkError::NotConnected { device: transport.name().to_string() })
    }
}
