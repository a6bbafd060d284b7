//! In-process transport for dry runs and tests.
//!
//! [`VirtualTransport`] behaves like a connected device that accepts every
//! write. A [`VirtualProbe`] cloned from it sees every write and can inject
//! inbound data, notifications and failures.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{NotificationHandler, Transport, ensure_connected};
use crate::types::TransportMode;
use crate::{LinkError, Result};

#[derive(Default)]
struct VirtualState {
    connected: bool,
    connects: u32,
    writes: Vec<Vec<u8>>,
    inbound: VecDeque<Vec<u8>>,
    handler: Option<NotificationHandler>,
    fail_connects: u32,
    fail_writes: u32,
    drop_on_write: bool,
}

pub struct VirtualTransport {
    label: String,
    notifications: bool,
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualTransport {
    pub fn new(label: impl Into<String>) -> Self {
        Self { label: label.into(), notifications: true, state: Arc::default() }
    }

    /// Behave like a polled channel that has no notifications.
    pub fn without_notifications(mut self) -> Self {
        self.notifications = false;
        self
    }

    pub fn probe(&self) -> VirtualProbe {
        VirtualProbe { state: Arc::clone(&self.state) }
    }
}

#[async_trait::async_trait]
impl Transport for VirtualTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Virtual
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn connect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            return Ok(());
        }
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(LinkError::connection_failed(&self.label, "injected connect failure"));
        }
        state.connected = true;
        state.connects += 1;
        info!(device = %self.label, "Virtual transport connected");
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        if state.connected {
            state.connected = false;
            info!(device = %self.label, "Virtual transport disconnected");
        }
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        ensure_connected(self)?;
        let mut state = self.state.lock();
        if state.drop_on_write {
            state.drop_on_write = false;
            state.connected = false;
            info!(device = %self.label, "Virtual link dropped");
            return Err(LinkError::io(
                format!("writing to {}", self.label),
                std::io::Error::new(std::io::ErrorKind::ConnectionReset, "link dropped"),
            ));
        }
        if state.fail_writes > 0 {
            state.fail_writes -= 1;
            return Err(LinkError::io(
                format!("writing to {}", self.label),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "injected write failure"),
            ));
        }
        debug!(device = %self.label, bytes = ?data, "Virtual write");
        state.writes.push(data.to_vec());
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        ensure_connected(self)?;
        Ok(self.state.lock().inbound.pop_front())
    }

    fn set_notification_handler(&mut self, handler: NotificationHandler) -> Result<()> {
        if !self.notifications {
            return Err(LinkError::unsupported("notifications", &self.label));
        }
        self.state.lock().handler = Some(handler);
        Ok(())
    }
}

/// Observer and fault injector for a [`VirtualTransport`].
#[derive(Clone)]
pub struct VirtualProbe {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualProbe {
    /// Every successful write so far.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state.lock().writes.clone()
    }

    /// Drain the recorded writes.
    pub fn take_writes(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.state.lock().writes)
    }

    /// Queue data for the next `read`.
    pub fn inject_read(&self, data: impl Into<Vec<u8>>) {
        self.state.lock().inbound.push_back(data.into());
    }

    /// Deliver a notification as the device would. Returns `false` when no
    /// handler is registered or the transport is disconnected.
    pub fn notify(&self, data: &[u8]) -> bool {
        let handler = {
            let state = self.state.lock();
            if !state.connected {
                return false;
            }
            state.handler.clone()
        };
        match handler {
            Some(handler) => {
                handler(data);
                true
            }
            None => false,
        }
    }

    pub fn fail_next_connects(&self, count: u32) {
        self.state.lock().fail_connects = count;
    }

    pub fn fail_next_writes(&self, count: u32) {
        self.state.lock().fail_writes = count;
    }

    /// Make the next write fail as a lost link would: the error is returned
    /// and the transport reports itself disconnected until reconnected.
    pub fn drop_link_on_next_write(&self) {
        self.state.lock().drop_on_write = true;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    /// Number of successful connects.
    pub fn connect_count(&self) -> u32 {
        self.state.lock().connects
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn records_writes_and_serves_reads() {
        let mut transport = VirtualTransport::new("virtual");
        let probe = transport.probe();

        assert!(matches!(transport.write(b"x").await, Err(LinkError::NotConnected { .. })));
        transport.connect().await.unwrap();
        transport.connect().await.unwrap();
        assert_eq!(probe.connect_count(), 1);

        transport.write(&[1, 2]).await.unwrap();
        transport.write(&[3]).await.unwrap();
        assert_eq!(probe.take_writes(), vec![vec![1, 2], vec![3]]);
        assert!(probe.writes().is_empty());

        probe.inject_read(*b"ok");
        assert_eq!(transport.read().await.unwrap(), Some(b"ok".to_vec()));
        assert_eq!(transport.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn injected_failures() {
        let mut transport = VirtualTransport::new("virtual");
        let probe = transport.probe();

        probe.fail_next_connects(1);
        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected());
        transport.connect().await.unwrap();

        probe.fail_next_writes(1);
        assert!(matches!(transport.write(&[1]).await, Err(LinkError::Io { .. })));
        transport.write(&[2]).await.unwrap();
        assert_eq!(probe.writes(), vec![vec![2]]);
    }

    #[tokio::test]
    async fn dropped_link_needs_a_reconnect() {
        let mut transport = VirtualTransport::new("virtual");
        let probe = transport.probe();
        transport.connect().await.unwrap();

        probe.drop_link_on_next_write();
        assert!(matches!(transport.write(&[1]).await, Err(LinkError::Io { .. })));
        assert!(!transport.is_connected());
        assert!(matches!(transport.write(&[2]).await, Err(LinkError::NotConnected { .. })));

        transport.connect().await.unwrap();
        transport.write(&[3]).await.unwrap();
        assert_eq!(probe.connect_count(), 2);
        assert_eq!(probe.writes(), vec![vec![3]]);
    }

    #[tokio::test]
    async fn notifications_reach_the_handler_while_connected() {
        let mut transport = VirtualTransport::new("virtual");
        let probe = transport.probe();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        transport
            .set_notification_handler(Arc::new(move |data: &[u8]| {
                counter.fetch_add(data.len(), Ordering::SeqCst);
            }))
            .unwrap();

        assert!(!probe.notify(&[1, 2, 3]));
        transport.connect().await.unwrap();
        assert!(probe.notify(&[1, 2, 3]));
        assert_eq!(seen.load(Ordering::SeqCst), 3);

        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
        assert!(!probe.notify(&[4]));
    }

    #[test]
    fn polled_variant_has_no_notifications() {
        let mut transport = VirtualTransport::new("virtual").without_notifications();
        let err = transport.set_notification_handler(Arc::new(|_: &[u8]| {})).unwrap_err();
        assert!(matches!(err, LinkError::UnsupportedOperation { .. }));
    }
}
