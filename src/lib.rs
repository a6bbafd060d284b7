//! Real-time gesture-to-actuation pipeline for robotic prosthetic hands.
//!
//! A gesture classifier produces a stream of class predictions. gesturelink
//! smooths and debounces them, maps each gesture to a five-finger pose, and
//! sends it to the hand over serial, BLE, or both, using the hand family's
//! packet format.
//!
//! # Features
//!
//! - **Three hand families**: Psyonic (serial, summation checksum, stuffed frames),
//!   Zeus (BLE, CRC-32 frames), Smart (BLE/serial, raw commands)
//! - **Non-blocking pipeline**: the consumer drains predictions without waiting,
//!   so a stalled classifier never stalls hand control
//! - **Noise rejection**: sliding-window majority vote and timeout-gated
//!   duplicate suppression
//! - **Virtual transport**: dry runs and tests without hardware
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use gesturelink::{GestureLink, LinkConfig, PredictionSample};
//!
//! #[tokio::main]
//! async fn main() -> gesturelink::Result<()> {
//!     let config = LinkConfig::load("gesturelink.yaml")?;
//!     let session = GestureLink::start(&config)?;
//!
//!     let predictions = session.predictions();
//!     predictions.send(PredictionSample::new(0.0, 1)).await?;
//!
//!     let report = session.finish().await?;
//!     println!("dispatched {} gestures", report.stats.dispatched);
//!     Ok(())
//! }
//! ```

// Core types and error handling
mod error;
pub mod types;

// Wire formats
pub mod codec;
pub mod protocol;

// Devices
pub mod hand;
pub mod transport;

// Pipeline
pub mod classifier;
pub mod config;
pub mod driver;
pub mod pipeline;
mod session;
pub mod stream;

// Core exports
pub use error::*;
pub use types::*;

// Main API exports
pub use classifier::ClassifierFeed;
pub use config::LinkConfig;
pub use driver::{Driver, PipelineHandle};
pub use hand::{Capability, Hand, HandInterface};
pub use pipeline::{
    GesturePipeline, PipelineOutcome, PipelineReport, PipelineState, PipelineStats, PredictionReceiver,
    PredictionSender, prediction_channel,
};
pub use session::{FINISH_TIMEOUT, GestureSession};

/// Unified entry point for starting a gesture pipeline.
///
/// Both constructors spawn onto the current Tokio runtime and return at once;
/// the pipeline connects the hand in the background. Watch
/// [`PipelineHandle::state_changes`] or await the report to learn whether the
/// connection succeeded.
///
/// # Examples
///
/// ## From configuration
/// ```rust,no_run
/// use gesturelink::{GestureLink, LinkConfig};
///
/// # #[tokio::main]
/// # async fn main() -> gesturelink::Result<()> {
/// let session = GestureLink::start(&LinkConfig::load("gesturelink.yaml")?)?;
/// # Ok(())
/// # }
/// ```
///
/// ## With a hand built in code
/// ```rust,no_run
/// use gesturelink::config::PipelineConfig;
/// use gesturelink::hand::{HandTiming, SmartHand};
/// use gesturelink::transport::VirtualTransport;
/// use gesturelink::{GestureLink, GestureSet};
///
/// # #[tokio::main]
/// # async fn main() -> gesturelink::Result<()> {
/// let hand = SmartHand::new(Box::new(VirtualTransport::new("dry-run")), HandTiming::IMMEDIATE);
/// let session = GestureLink::start_with_hand(hand, GestureSet::default(), &PipelineConfig::default())?;
/// # Ok(())
/// # }
/// ```
pub struct GestureLink;

impl GestureLink {
    /// Build the configured hand and gesture set and start the pipeline.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The configuration is invalid
    /// - The gesture label file cannot be read or lacks a configured class
    /// - The transport mode is unavailable in this build (BLE without the `ble` feature)
    pub fn start(config: &LinkConfig) -> Result<GestureSession> {
        config.validate()?;
        let gestures = config.gestures.load_gesture_set()?;
        let hand = Hand::from_config(&config.hand)?;
        Self::start_with_hand(hand, gestures, &config.pipeline)
    }

    /// Start the pipeline on an already built hand.
    pub fn start_with_hand<H: HandInterface>(
        hand: H,
        gestures: GestureSet,
        config: &config::PipelineConfig,
    ) -> Result<GestureSession> {
        let pipeline = GesturePipeline::new(hand, gestures, config)?;
        let (predictions, receiver) = prediction_channel(config.channel_capacity);
        let handle = Driver::spawn(pipeline, receiver);
        Ok(GestureSession::new(predictions, handle))
    }
}
