//! Notification-driven BLE transport (btleplug).
//!
//! The peripheral exposes a UART-style service: commands are written to one
//! characteristic and replies arrive as notifications on another. Notifications
//! are delivered to the registered [`NotificationHandler`] from a dedicated task,
//! so a slow consumer never stalls the BLE event stream.

use btleplug::api::{Central, CharPropFlags, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{BleProfile, NotificationHandler, Transport, ensure_connected};
use crate::config::BleSettings;
use crate::types::TransportMode;
use crate::{LinkError, Result};

struct Session {
    peripheral: Peripheral,
    notify: Characteristic,
    write: Characteristic,
    cancel: CancellationToken,
}

pub struct BleTransport {
    device_name: String,
    settings: BleSettings,
    profile: BleProfile,
    handler: Option<NotificationHandler>,
    session: Option<Session>,
}

impl BleTransport {
    pub fn new(device_name: impl Into<String>, settings: BleSettings, profile: BleProfile) -> Self {
        Self { device_name: device_name.into(), settings, profile, handler: None, session: None }
    }

    async fn adapter(&self) -> Result<Adapter> {
        let manager = Manager::new().await.map_err(|e| self.ble_error("opening BLE manager", e))?;
        let adapters = manager.adapters().await.map_err(|e| self.ble_error("listing BLE adapters", e))?;
        adapters
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::connection_failed(&self.device_name, "no BLE adapter available"))
    }

    /// Scan for a peripheral advertising `device_name`, up to the configured attempts.
    async fn scan(&self, adapter: &Adapter) -> Result<Peripheral> {
        let attempts = self.settings.discovery_attempts.max(1);
        for attempt in 1..=attempts {
            info!(device = %self.device_name, attempt, "Scanning for BLE peripheral");
            adapter.start_scan(ScanFilter::default()).await.map_err(|e| self.ble_error("starting scan", e))?;
            tokio::time::sleep(self.settings.scan_duration()).await;

            let peripherals = adapter.peripherals().await.map_err(|e| self.ble_error("listing peripherals", e))?;
            if let Err(e) = adapter.stop_scan().await {
                debug!("Failed to stop scan: {}", e);
            }

            for peripheral in peripherals {
                let name = match peripheral.properties().await {
                    Ok(Some(properties)) => properties.local_name,
                    _ => None,
                };
                if name.as_deref() == Some(self.device_name.as_str()) {
                    debug!(device = %self.device_name, address = %peripheral.address(), "Peripheral found");
                    return Ok(peripheral);
                }
            }
        }
        Err(LinkError::Discovery { target: self.device_name.clone(), attempts })
    }

    async fn open_session(&self, peripheral: Peripheral) -> Result<Session> {
        let timeout = self.settings.connect_timeout();
        match tokio::time::timeout(timeout, peripheral.connect()).await {
            Err(_) => {
                return Err(LinkError::Timeout {
                    operation: format!("connecting to {}", self.device_name),
                    duration: timeout,
                });
            }
            Ok(Err(e)) => return Err(self.ble_error("connecting", e)),
            Ok(Ok(())) => {}
        }

        let session = self.configure(&peripheral).await;
        if session.is_err() {
            // Leave nothing half-open behind
            let _ = peripheral.disconnect().await;
        }
        let (notify, write) = session?;

        let cancel = CancellationToken::new();
        if let Some(handler) = &self.handler
            && let Err(e) = self.spawn_notifications(&peripheral, &notify, handler.clone(), cancel.clone()).await
        {
            let _ = peripheral.disconnect().await;
            return Err(e);
        }

        Ok(Session { peripheral, notify, write, cancel })
    }

    async fn configure(&self, peripheral: &Peripheral) -> Result<(Characteristic, Characteristic)> {
        peripheral.discover_services().await.map_err(|e| self.ble_error("discovering services", e))?;

        let characteristics = peripheral.characteristics();
        let find = |uuid: u128| {
            let uuid = Uuid::from_u128(uuid);
            characteristics.iter().find(|c| c.uuid == uuid).cloned().ok_or_else(|| {
                LinkError::connection_failed(&self.device_name, format!("characteristic {uuid} not found"))
            })
        };
        let notify = find(self.profile.notify)?;
        let write = find(self.profile.write)?;

        if notify.properties.contains(CharPropFlags::NOTIFY) {
            peripheral.subscribe(&notify).await.map_err(|e| self.ble_error("subscribing", e))?;
        } else {
            warn!(device = %self.device_name, "Notify characteristic does not support notifications");
        }
        Ok((notify, write))
    }

    async fn spawn_notifications(
        &self,
        peripheral: &Peripheral,
        notify: &Characteristic,
        handler: NotificationHandler,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut stream = peripheral.notifications().await.map_err(|e| self.ble_error("opening notifications", e))?;
        let uuid = notify.uuid;
        let device = self.device_name.clone();

        tokio::spawn(async move {
            debug!(device = %device, "Notification task started");
            loop {
                let notification = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = stream.next() => match next {
                        Some(notification) => notification,
                        None => break,
                    },
                };
                if notification.uuid == uuid {
                    trace!(device = %device, len = notification.value.len(), "Notification");
                    handler(notification.value.as_slice());
                }
            }
            debug!(device = %device, "Notification task ended");
        });
        Ok(())
    }

    /// Forget a session whose link failed, so the next `connect` rescans.
    async fn drop_session(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        session.cancel.cancel();
        if let Err(e) = session.peripheral.disconnect().await {
            debug!(device = %self.device_name, "Disconnect after link failure: {}", e);
        }
        warn!(device = %self.device_name, "BLE link lost");
    }

    fn ble_error(&self, operation: &str, error: btleplug::Error) -> LinkError {
        LinkError::connection_failed_with_source(
            &self.device_name,
            format!("{operation}: {error}"),
            Box::new(error),
        )
    }
}

#[async_trait::async_trait]
impl Transport for BleTransport {
    fn kind(&self) -> TransportMode {
        TransportMode::Ble
    }

    fn name(&self) -> &str {
        &self.device_name
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let adapter = self.adapter().await?;
        let peripheral = self.scan(&adapter).await?;
        let session = self.open_session(peripheral).await?;
        info!(device = %self.device_name, "BLE peripheral connected");
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(session) = self.session.take() else {
            return Ok(());
        };
        session.cancel.cancel();
        if let Err(e) = session.peripheral.unsubscribe(&session.notify).await {
            debug!(device = %self.device_name, "Unsubscribe failed: {}", e);
        }
        session.peripheral.disconnect().await.map_err(|e| self.ble_error("disconnecting", e))?;
        info!(device = %self.device_name, "BLE peripheral disconnected");
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        ensure_connected(self)?;
        let Some(session) = &self.session else {
            return Err(LinkError::NotConnected { device: self.device_name.clone() });
        };
        let written = session.peripheral.write(&session.write, data, WriteType::WithoutResponse).await;
        if let Err(e) = written {
            self.drop_session().await;
            return Err(self.ble_error("writing", e));
        }
        trace!(device = %self.device_name, len = data.len(), "BLE write");
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Vec<u8>>> {
        ensure_connected(self)?;
        let Some(session) = &self.session else {
            return Ok(None);
        };
        match session.peripheral.read(&session.notify).await {
            Ok(value) => Ok((!value.is_empty()).then_some(value)),
            Err(e) => {
                self.drop_session().await;
                Err(self.ble_error("reading", e))
            }
        }
    }

    /// Must be registered before `connect`; the delivery task starts with the session.
    fn set_notification_handler(&mut self, handler: NotificationHandler) -> Result<()> {
        self.handler = Some(handler);
        Ok(())
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            session.cancel.cancel();
        }
    }
}
