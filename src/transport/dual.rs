//! Two channels driven as one.

use tracing::{info, warn};

use super::{NotificationHandler, Transport};
use crate::types::TransportMode;
use crate::{LinkError, Result};

/// Drives a wireless and a serial channel to the same device.
///
/// Connecting succeeds when at least one channel connects. A write succeeds
/// when at least one connected channel accepts it; failures on the other
/// channel are logged.
pub struct DualTransport {
    channels: [Box<dyn Transport>; 2],
    label: String,
}

impl DualTransport {
    pub fn new(primary: impl Transport, secondary: impl Transport) -> Self {
        let label = format!("{}+{}", primary.name(), secondary.name());
        Self { channels: [Box::new(primary), Box::new(secondary)], label }
    }
}

#[async_trait::async_trait]
impl Transport for DualTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Dual
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn is_connected(&self) -> bool {
        self.channels.iter().any(|channel| channel.is_connected())
    }

    async fn connect(&mut self) -> Result<()> {
        let mut failures = Vec::new();
        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.connect().await {
                warn!(channel = channel.name(), "Channel failed to connect: {}", e);
                failures.push(format!("{}: {}", channel.name(), e));
            }
        }

        if failures.len() == self.channels.len() {
            return Err(LinkError::connection_failed(&self.label, failures.join("; ")));
        }
        info!(device = %self.label, failed = failures.len(), "Dual transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut first_error = None;
        for channel in self.channels.iter_mut() {
            if let Err(e) = channel.disconnect().await {
                warn!(channel = channel.name(), "Channel failed to disconnect: {}", e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut delivered = false;
        let mut last_error = None;
        for channel in self.channels.iter_mut().filter(|channel| channel.is_connected()) {
            match channel.write(data).await {
                Ok(()) => delivered = true,
                Err(e) => {
                    warn!(channel = channel.name(), "Channel write failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        match (delivered, last_error) {
            (true, _) => Ok(()),
            (false, Some(e)) => Err(e),
            (false, None) => Err(LinkError::NotConnected { device: self.label.clone() }),
        }
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        for channel in self.channels.iter_mut().filter(|channel| channel.is_connected()) {
            if let Some(data) = channel.read().await? {
                return Ok(Some(data));
            }
        }
        Ok(None)
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) -> Result<()> {
        let accepted = self
            .channels
            .iter_mut()
            .filter_map(|channel| channel.set_notification_handler(handler.clone()).ok())
            .count();
        if accepted == 0 {
            return Err(LinkError::unsupported("notifications", &self.label));
        }
        Ok(())
    }
}
