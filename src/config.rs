//! Link configuration.
//!
//! Loaded once from YAML at startup, validated, and never mutated afterwards.
//! Every section and field is optional; omitted values take the defaults below.
//!
//! ```yaml
//! hand:
//!   family: psyonic
//!   transport: serial
//!   serial:
//!     port: /dev/ttyUSB0
//! pipeline:
//!   smoothing_window: 3
//!   smoothing_method: mode
//!   debounce_ms: 500
//! gestures:
//!   classes: [2, 3, 30, 14, 18]
//!   label_file: media/labels.json
//! classifier:
//!   rate: !max 50
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::SmoothingMethod;
use crate::types::{DeviceDescriptor, DeviceFamily, GestureSet, TransportMode, UpdateRate};
use crate::{LinkError, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub hand: HandConfig,
    pub pipeline: PipelineConfig,
    pub gestures: GestureConfig,
    pub classifier: ClassifierConfig,
}

impl LinkConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: LinkConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| LinkError::config("link configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| LinkError::io(format!("reading {}", path.display()), e))?;
        let config = Self::from_yaml_str(&yaml)?;
        debug!(path = %path.display(), family = %config.hand.family, "Loaded link configuration");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.hand.validate()?;
        self.pipeline.validate()?;
        self.gestures.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HandConfig {
    pub family: DeviceFamily,

    /// Channel to use; the family's default when omitted
    pub transport: Option<TransportMode>,

    pub serial: SerialSettings,
    pub ble: BleSettings,

    /// Override of the family's post-connect settle delay
    pub settle_ms: Option<u64>,

    /// Override of the family's post-write delay
    pub write_delay_ms: Option<u64>,
}

impl Default for HandConfig {
    fn default() -> Self {
        Self {
            family: DeviceFamily::Zeus,
            transport: None,
            serial: SerialSettings::default(),
            ble: BleSettings::default(),
            settle_ms: None,
            write_delay_ms: None,
        }
    }
}

impl HandConfig {
    pub fn transport_mode(&self) -> TransportMode {
        self.transport.unwrap_or_else(|| self.family.default_transport())
    }

    pub fn validate(&self) -> Result<()> {
        let mode = self.transport_mode();
        if !self.family.supports_transport(mode) {
            return Err(LinkError::config(
                "hand",
                format!("{} hands cannot be driven over {mode}", self.family),
            ));
        }
        self.serial.validate()?;
        self.ble.validate()
    }
}

/// Serial port parameters. Parity is always even with one stop bit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialSettings {
    /// Explicit port; discovered from the known device table when omitted
    pub port: Option<String>,

    /// Restrict discovery to one known device (`TTL` or `Pico`)
    pub device: Option<String>,

    pub baud_rate: u32,
    pub timeout_ms: u64,

    /// Delay after opening before the port is used
    pub open_settle_ms: u64,

    pub discovery_attempts: u32,
    pub discovery_retry_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: None,
            device: None,
            baud_rate: 115_200,
            timeout_ms: 1500,
            open_settle_ms: 200,
            discovery_attempts: 1,
            discovery_retry_ms: 500,
        }
    }
}

impl SerialSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn discovery_retry(&self) -> Duration {
        Duration::from_millis(self.discovery_retry_ms)
    }

    /// The descriptor named by `device`, if any.
    pub fn preferred_device(&self) -> Result<Option<DeviceDescriptor>> {
        match &self.device {
            None => Ok(None),
            Some(name) => DeviceDescriptor::by_name(name).map(Some).ok_or_else(|| {
                LinkError::config("serial.device", format!("unknown device '{name}', expected TTL or Pico"))
            }),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.baud_rate == 0 {
            return Err(LinkError::config("serial.baud_rate", "must be positive"));
        }
        if self.timeout_ms == 0 {
            return Err(LinkError::config("serial.timeout_ms", "must be positive"));
        }
        if self.discovery_attempts == 0 {
            return Err(LinkError::config("serial.discovery_attempts", "at least one attempt is required"));
        }
        self.preferred_device().map(|_| ())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BleSettings {
    /// Advertised name to connect to; the family's default when omitted
    pub device_name: Option<String>,

    pub discovery_attempts: u32,

    /// How long each scan listens for advertisements
    pub scan_ms: u64,

    pub connect_timeout_ms: u64,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self { device_name: None, discovery_attempts: 2, scan_ms: 5000, connect_timeout_ms: 10_000 }
    }
}

impl BleSettings {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.discovery_attempts == 0 {
            return Err(LinkError::config("ble.discovery_attempts", "at least one attempt is required"));
        }
        if matches!(&self.device_name, Some(name) if name.trim().is_empty()) {
            return Err(LinkError::config("ble.device_name", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Samples in the smoothing window; 1 disables smoothing
    pub smoothing_window: usize,
    pub smoothing_method: SmoothingMethod,

    /// An unchanged gesture is not re-sent within this interval
    pub debounce_ms: u64,

    /// Sleep between drains of an empty prediction channel
    pub poll_interval_ms: u64,

    pub channel_capacity: usize,

    /// Consecutive send failures after which the pipeline stops
    pub max_consecutive_errors: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            smoothing_window: 1,
            smoothing_method: SmoothingMethod::Mode,
            debounce_ms: 500,
            poll_interval_ms: 1,
            channel_capacity: 256,
            max_consecutive_errors: 10,
        }
    }
}

impl PipelineConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.smoothing_window == 0 {
            return Err(LinkError::config("pipeline.smoothing_window", "must be at least 1"));
        }
        if self.poll_interval_ms == 0 {
            return Err(LinkError::config("pipeline.poll_interval_ms", "must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(LinkError::config("pipeline.channel_capacity", "must be positive"));
        }
        if self.max_consecutive_errors == 0 {
            return Err(LinkError::config("pipeline.max_consecutive_errors", "must be positive"));
        }
        Ok(())
    }
}

/// The classifier's class set: label ids in class-index order, plus names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GestureConfig {
    pub classes: Vec<u16>,

    /// JSON map from label id to gesture name
    pub label_file: Option<PathBuf>,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self { classes: vec![2, 3, 30, 14, 18], label_file: None }
    }
}

impl GestureConfig {
    /// Resolve the class set; without a label file the built-in names are used.
    pub fn load_gesture_set(&self) -> Result<GestureSet> {
        match &self.label_file {
            Some(path) => GestureSet::from_label_file(path, &self.classes),
            None => {
                let builtin = GestureSet::default();
                let labels = self
                    .classes
                    .iter()
                    .map(|id| {
                        builtin.index_of(*id).and_then(|i| builtin.get(i)).cloned().ok_or_else(|| {
                            LinkError::config("gestures", format!("label id {id} needs a label_file"))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                GestureSet::new(labels)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.classes.is_empty() {
            return Err(LinkError::config("gestures.classes", "at least one class is required"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClassifierConfig {
    /// Forwarding rate into the pipeline
    pub rate: UpdateRate,

    /// Rate at which the classifier produces predictions
    pub source_hz: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { rate: UpdateRate::Native, source_hz: 100.0 }
    }
}
