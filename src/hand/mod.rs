//! Hand devices.
//!
//! [`HandInterface`] is the contract every hand family implements: connect,
//! disconnect, actuate a gesture, move one finger, read replies. Family-specific
//! extras (telemetry, raw data, direct gestures, LED commands) are advertised as
//! [`Capability`] values fixed at construction. [`Hand`] wraps any
//! implementation and refuses extras the device does not advertise.
//!
//! Finger positions are logical units `0..=1000` for every family; devices with
//! a narrower range rescale on the wire.

pub mod psyonic;
pub mod smart;
pub mod zeus;

pub use psyonic::PsyonicHand;
pub use smart::SmartHand;
pub use zeus::ZeusHand;

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::config::HandConfig;
use crate::protocol::Response;
use crate::transport::serial::SerialFraming;
use crate::transport::{BleProfile, DualTransport, SerialTransport, Transport, VirtualTransport};
use crate::types::{DeviceFamily, Finger, FingerPositions, GestureLabel, POSITION_MAX, TransportMode};
use crate::{LinkError, Result};

/// Optional operations a hand may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// `start_telemetry` / `stop_telemetry`
    Telemetry,
    /// `send_data`
    RawData,
    /// `send_gesture_direct`
    DirectGesture,
    /// `send_text` (LED toggle/blink)
    Led,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Telemetry => "telemetry",
            Capability::RawData => "raw data",
            Capability::DirectGesture => "direct gesture",
            Capability::Led => "LED commands",
        };
        f.write_str(name)
    }
}

/// Delays the firmware needs around commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandTiming {
    /// Wait after connecting (and after the init command, where there is one)
    pub settle: Duration,
    /// Wait after every command write
    pub write_delay: Duration,
}

impl HandTiming {
    /// No delays, for virtual links and tests.
    pub const IMMEDIATE: Self = Self { settle: Duration::ZERO, write_delay: Duration::ZERO };

    pub fn for_family(family: DeviceFamily) -> Self {
        match family {
            DeviceFamily::Psyonic => {
                Self { settle: Duration::from_secs(1), write_delay: Duration::from_millis(100) }
            }
            DeviceFamily::Zeus => Self { settle: Duration::from_secs(2), write_delay: Duration::ZERO },
            DeviceFamily::Smart => Self::IMMEDIATE,
        }
    }

    /// Family defaults with the configuration's overrides applied.
    ///
    /// A virtual transport has no physical device to wait for, so it starts
    /// from [`HandTiming::IMMEDIATE`].
    pub fn from_config(config: &HandConfig) -> Self {
        let defaults = match config.transport_mode() {
            TransportMode::Virtual => Self::IMMEDIATE,
            _ => Self::for_family(config.family),
        };
        Self {
            settle: config.settle_ms.map_or(defaults.settle, Duration::from_millis),
            write_delay: config.write_delay_ms.map_or(defaults.write_delay, Duration::from_millis),
        }
    }
}

/// A robotic hand.
#[async_trait::async_trait]
pub trait HandInterface: Send + 'static {
    fn family(&self) -> DeviceFamily;

    /// Name of the underlying channel, for logs.
    fn name(&self) -> &str;

    /// Extras this device supports.
    fn capabilities(&self) -> &'static [Capability];

    fn is_connected(&self) -> bool;

    /// Open the channel and run any init handshake. A failure leaves the hand
    /// disconnected.
    async fn connect(&mut self) -> Result<()>;

    /// Idempotent.
    async fn disconnect(&mut self) -> Result<()>;

    /// Actuate the pose for `label`.
    async fn send_gesture(&mut self, label: &GestureLabel) -> Result<()>;

    /// Move one finger (`0` thumb … `4` little) to `position` in `0..=1000`.
    async fn send_finger_position(&mut self, finger: u8, position: u16) -> Result<()>;

    /// Positions most recently sent to the device; neutral before the first send.
    fn last_positions(&self) -> FingerPositions;

    /// Validated replies received since the last call. Malformed data is
    /// logged and dropped.
    async fn read_responses(&mut self) -> Result<Vec<Response>>;

    async fn start_telemetry(&mut self) -> Result<()> {
        Err(LinkError::unsupported("start_telemetry", self.family().name()))
    }

    async fn stop_telemetry(&mut self) -> Result<()> {
        Err(LinkError::unsupported("stop_telemetry", self.family().name()))
    }

    async fn send_data(&mut self, data: &[u8], frame_type: u8) -> Result<()> {
        let _ = (data, frame_type);
        Err(LinkError::unsupported("send_data", self.family().name()))
    }

    async fn send_gesture_direct(&mut self, label: &GestureLabel) -> Result<()> {
        let _ = label;
        Err(LinkError::unsupported("send_gesture_direct", self.family().name()))
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        let _ = text;
        Err(LinkError::unsupported("send_text", self.family().name()))
    }
}

/// Capability-checked hand.
///
/// Capabilities are read once when the hand is built; extras the device does
/// not advertise fail with [`LinkError::UnsupportedOperation`] before anything is
/// written.
pub struct Hand {
    inner: Box<dyn HandInterface>,
    capabilities: &'static [Capability],
}

impl Hand {
    pub fn new(inner: impl HandInterface) -> Self {
        let capabilities = inner.capabilities();
        Self { inner: Box::new(inner), capabilities }
    }

    /// Build the configured family on the configured transport.
    pub fn from_config(config: &HandConfig) -> Result<Self> {
        config.validate()?;
        let timing = HandTiming::from_config(config);
        let mode = config.transport_mode();

        let hand = match config.family {
            DeviceFamily::Psyonic => {
                let transport = build_transport(config, SerialFraming::RAW, None)?;
                Hand::new(PsyonicHand::new(transport, timing))
            }
            DeviceFamily::Zeus => {
                let transport = build_transport(
                    config,
                    SerialFraming::RAW,
                    Some((zeus::UART_PROFILE, zeus::DEFAULT_DEVICE_NAME)),
                )?;
                Hand::new(ZeusHand::new(transport, timing))
            }
            DeviceFamily::Smart => {
                let transport = build_transport(
                    config,
                    SerialFraming::LINE_ACK,
                    Some((smart::UART_PROFILE, smart::DEFAULT_DEVICE_NAME)),
                )?;
                Hand::new(SmartHand::new(transport, timing))
            }
        };
        info!(family = %config.family, transport = %mode, "Hand configured");
        Ok(hand)
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    fn require(&self, capability: Capability, operation: &str) -> Result<()> {
        if self.supports(capability) {
            Ok(())
        } else {
            Err(LinkError::unsupported(
                format!("{operation} ({capability})"),
                format!("{} hand", self.inner.family()),
            ))
        }
    }

    /// Switch the LED on or off.
    pub async fn toggle_led(&mut self) -> Result<()> {
        self.send_text("toggle").await
    }

    pub async fn blink_led(&mut self) -> Result<()> {
        self.send_text("blink").await
    }
}

#[async_trait::async_trait]
impl HandInterface for Hand {
    fn family(&self) -> DeviceFamily {
        self.inner.family()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn capabilities(&self) -> &'static [Capability] {
        self.capabilities
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        self.inner.connect().await
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.inner.disconnect().await
    }

    async fn send_gesture(&mut self, label: &GestureLabel) -> Result<()> {
        self.inner.send_gesture(label).await
    }

    async fn send_finger_position(&mut self, finger: u8, position: u16) -> Result<()> {
        self.inner.send_finger_position(finger, position).await
    }

    fn last_positions(&self) -> FingerPositions {
        self.inner.last_positions()
    }

    async fn read_responses(&mut self) -> Result<Vec<Response>> {
        self.inner.read_responses().await
    }

    async fn start_telemetry(&mut self) -> Result<()> {
        self.require(Capability::Telemetry, "start_telemetry")?;
        self.inner.start_telemetry().await
    }

    async fn stop_telemetry(&mut self) -> Result<()> {
        self.require(Capability::Telemetry, "stop_telemetry")?;
        self.inner.stop_telemetry().await
    }

    async fn send_data(&mut self, data: &[u8], frame_type: u8) -> Result<()> {
        self.require(Capability::RawData, "send_data")?;
        self.inner.send_data(data, frame_type).await
    }

    async fn send_gesture_direct(&mut self, label: &GestureLabel) -> Result<()> {
        self.require(Capability::DirectGesture, "send_gesture_direct")?;
        self.inner.send_gesture_direct(label).await
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.require(Capability::Led, "send_text")?;
        self.inner.send_text(text).await
    }
}

/// Check a finger command's arguments.
pub(crate) fn validate_finger(finger: u8, position: u16) -> Result<Finger> {
    let finger = Finger::from_index(finger)?;
    if position > POSITION_MAX {
        return Err(LinkError::invalid_argument(
            "finger position",
            format!("{position} is not in 0..={POSITION_MAX}"),
        ));
    }
    Ok(finger)
}

fn build_transport(
    config: &HandConfig,
    framing: SerialFraming,
    ble: Option<(BleProfile, &str)>,
) -> Result<Box<dyn Transport>> {
    let serial = || SerialTransport::new(config.serial.clone(), framing);
    let transport: Box<dyn Transport> = match config.transport_mode() {
        TransportMode::Serial => Box::new(serial()),
        TransportMode::Ble => ble_transport(config, ble)?,
        TransportMode::Dual => Box::new(DualTransport::new(ble_transport(config, ble)?, serial())),
        TransportMode::Virtual => Box::new(VirtualTransport::new(format!("virtual-{}", config.family))),
    };
    Ok(transport)
}

#[cfg(feature = "ble")]
fn ble_transport(config: &HandConfig, ble: Option<(BleProfile, &str)>) -> Result<Box<dyn Transport>> {
    let (profile, default_name) = ble.ok_or_else(|| {
        LinkError::config("hand.transport", format!("{} hands have no BLE interface", config.family))
    })?;
    let name = config.ble.device_name.clone().unwrap_or_else(|| default_name.to_string());
    Ok(Box::new(crate::transport::BleTransport::new(name, config.ble.clone(), profile)))
}

#[cfg(not(feature = "ble"))]
fn ble_transport(config: &HandConfig, ble: Option<(BleProfile, &str)>) -> Result<Box<dyn Transport>> {
    let _ = ble;
    Err(LinkError::unsupported(
        "BLE transport",
        format!("this build ({} hand); enable the `ble` feature", config.family),
    ))
}
