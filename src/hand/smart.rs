//! Smart hand (Raspberry Pi Pico firmware) over BLE, serial, or both.
//!
//! The firmware keeps its own gesture table, so a gesture is sent as its label
//! id. [`HandInterface::send_gesture_direct`] bypasses that table and drives
//! each finger to this crate's pose instead.

use tracing::{debug, info, warn};

use super::{Capability, HandInterface, HandTiming, validate_finger};
use crate::protocol::{PacketProtocol, Response, SimpleProtocol};
use crate::transport::{BleProfile, Transport};
use crate::types::{DeviceFamily, Finger, FingerPositions, GestureLabel};
use crate::{LinkError, Result};

pub const UART_PROFILE: BleProfile = BleProfile {
    service: 0x6E40_0001_B5A3_F393_E0A9_E50E_24DC_CA9E,
    notify: 0x6E40_0003_B5A3_F393_E0A9_E50E_24DC_CA9E,
    write: 0x6E40_0002_B5A3_F393_E0A9_E50E_24DC_CA9E,
};

pub const DEFAULT_DEVICE_NAME: &str = "testpico";

/// Text commands understood by the firmware.
pub const LED_COMMANDS: &[&str] = &["toggle", "blink"];

pub struct SmartHand {
    transport: Box<dyn Transport>,
    protocol: SimpleProtocol,
    timing: HandTiming,
    last_sent: FingerPositions,
}

impl SmartHand {
    pub fn new(transport: Box<dyn Transport>, timing: HandTiming) -> Self {
        Self { transport, protocol: SimpleProtocol::new(), timing, last_sent: FingerPositions::NEUTRAL }
    }

    async fn write(&mut self, command: &[u8]) -> Result<()> {
        self.transport.write(command).await?;
        debug!(device = self.transport.name(), ?command, "Sent command");
        if !self.timing.write_delay.is_zero() {
            tokio::time::sleep(self.timing.write_delay).await;
        }
        Ok(())
    }

    async fn send_finger(&mut self, finger: Finger, position: u16) -> Result<()> {
        let command = self.protocol.finger_command(finger, position)?;
        self.write(&command).await?;
        self.last_sent.set(finger, position);
        Ok(())
    }
}

#[async_trait::async_trait]
impl HandInterface for SmartHand {
    fn family(&self) -> DeviceFamily {
        DeviceFamily::Smart
    }

    fn name(&self) -> &str {
        self.transport.name()
    }

    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::RawData, Capability::DirectGesture, Capability::Led]
    }

    fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    async fn connect(&mut self) -> Result<()> {
        if self.transport.is_connected() {
            return Ok(());
        }
        info!(device = self.transport.name(), "Connecting Smart hand");
        self.transport.connect().await?;
        tokio::time::sleep(self.timing.settle).await;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await
    }

    async fn send_gesture(&mut self, label: &GestureLabel) -> Result<()> {
        let command = self.protocol.gesture_command(label.id)?;
        self.write(&command).await?;
        self.last_sent = label.gesture().finger_positions();
        Ok(())
    }

    async fn send_finger_position(&mut self, finger: u8, position: u16) -> Result<()> {
        let finger = validate_finger(finger, position)?;
        self.send_finger(finger, position).await
    }

    fn last_positions(&self) -> FingerPositions {
        self.last_sent
    }

    async fn read_responses(&mut self) -> Result<Vec<Response>> {
        let Some(raw) = self.transport.read().await? else {
            return Ok(Vec::new());
        };
        debug!(device = self.transport.name(), reply = %String::from_utf8_lossy(&raw), "Reply");
        match self.protocol.parse_response(&raw) {
            Ok(response) => Ok(vec![response]),
            Err(e) => {
                warn!(device = self.transport.name(), "Dropping reply: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Raw opcode command; `frame_type` is the opcode.
    async fn send_data(&mut self, data: &[u8], frame_type: u8) -> Result<()> {
        let command = self.protocol.build_command(frame_type, data)?;
        self.write(&command).await
    }

    async fn send_gesture_direct(&mut self, label: &GestureLabel) -> Result<()> {
        let positions = label.finger_positions();
        for finger in Finger::ALL {
            self.send_finger(finger, positions.get(finger)).await?;
        }
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<()> {
        if !LED_COMMANDS.contains(&text) {
            return Err(LinkError::invalid_argument(
                "text command",
                format!("'{text}' is not one of {}", LED_COMMANDS.join(", ")),
            ));
        }
        self.write(text.as_bytes()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::Hand;
    use crate::transport::{DualTransport, VirtualProbe, VirtualTransport};

    fn hand() -> (SmartHand, VirtualProbe) {
        let transport = VirtualTransport::new("smart");
        let probe = transport.probe();
        (SmartHand::new(Box::new(transport), HandTiming::IMMEDIATE), probe)
    }

    #[tokio::test]
    async fn gesture_sends_label_id() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        hand.send_gesture(&GestureLabel::new(14, "OK")).await.unwrap();
        assert_eq!(probe.take_writes(), vec![vec![0x02, 14]]);
        assert_eq!(hand.last_positions().as_array(), [500, 500, 0, 0, 0]);
    }

    #[tokio::test]
    async fn direct_gesture_drives_each_finger() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        hand.send_gesture_direct(&GestureLabel::new(18, "Thumbs_Up")).await.unwrap();

        let writes = probe.take_writes();
        assert_eq!(writes.len(), 5);
        assert_eq!(writes[0], vec![0x01, 0, 0, 0]);
        assert_eq!(writes[4], vec![0x01, 4, 0x03, 0xE8]);
    }

    #[tokio::test]
    async fn led_commands_through_the_checked_wrapper() {
        let transport = VirtualTransport::new("smart");
        let probe = transport.probe();
        let mut hand = Hand::new(SmartHand::new(Box::new(transport), HandTiming::IMMEDIATE));
        hand.connect().await.unwrap();

        hand.toggle_led().await.unwrap();
        hand.blink_led().await.unwrap();
        assert_eq!(probe.take_writes(), vec![b"toggle".to_vec(), b"blink".to_vec()]);

        assert!(matches!(hand.send_text("dance").await, Err(LinkError::InvalidArgument { .. })));
        assert!(matches!(hand.start_telemetry().await, Err(LinkError::UnsupportedOperation { .. })));
    }

    #[tokio::test]
    async fn dual_mode_reaches_both_channels() {
        let ble = VirtualTransport::new("ble");
        let serial = VirtualTransport::new("serial").without_notifications();
        let (ble_probe, serial_probe) = (ble.probe(), serial.probe());
        let mut hand = SmartHand::new(Box::new(DualTransport::new(ble, serial)), HandTiming::IMMEDIATE);
        hand.connect().await.unwrap();

        hand.send_finger_position(3, 1000).await.unwrap();
        assert_eq!(ble_probe.writes(), vec![vec![0x01, 3, 0x03, 0xE8]]);
        assert_eq!(serial_probe.writes(), ble_probe.writes());
    }

    #[tokio::test]
    async fn replies_are_read_as_responses() {
        let (mut hand, probe) = hand();
        hand.connect().await.unwrap();
        probe.inject_read(*b"\x02ok");
        assert_eq!(hand.read_responses().await.unwrap(), vec![Response::new(0x02, *b"ok")]);
        assert!(hand.read_responses().await.unwrap().is_empty());
    }
}
