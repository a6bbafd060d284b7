//! Core data model.
//!
//! - [`PredictionSample`] / [`PredictionMessage`]: classifier output as consumed by the pipeline
//! - [`GestureSet`] / [`GestureLabel`] / [`Gesture`]: class index to gesture resolution
//! - [`FingerPositions`] / [`Finger`]: the actuation vector sent to the hand
//! - [`DeviceDescriptor`] / [`DeviceFamily`] / [`TransportMode`]: what to talk to and how
//! - [`UpdateRate`]: producer-side sampling rate of classifier output
//!
//! Prediction samples are immutable once created. Finger vectors are always
//! produced whole from a gesture, never partially updated in place by callers.

mod device;
mod finger;
mod gesture;
mod prediction;
mod update_rate;

pub use device::{DeviceDescriptor, DeviceFamily, KNOWN_SERIAL_DEVICES, PICO, TTL_ADAPTER, TransportMode};
pub use finger::{
    CLOSED_POSITION, Finger, FingerPositions, HALF_OPEN_POSITION, NEUTRAL_POSITION, OPEN_POSITION,
    POSITION_MAX,
};
pub use gesture::{Gesture, GestureLabel, GestureSet};
pub use prediction::{PredictionMessage, PredictionSample};
pub use update_rate::UpdateRate;
