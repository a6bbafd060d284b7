//! Finger-position vectors

use serde::{Deserialize, Serialize};

use super::Gesture;
use crate::{LinkError, Result};

/// Upper bound of the logical position range (fully closed).
pub const POSITION_MAX: u16 = 1000;

pub const OPEN_POSITION: u16 = 0;
pub const CLOSED_POSITION: u16 = 1000;
pub const HALF_OPEN_POSITION: u16 = 500;
pub const NEUTRAL_POSITION: u16 = 250;

// Thumb rotation presets; the current hands only use the side position.
const FRONT_ROTATION: u16 = 0;
const HALF_ROTATION: u16 = 0;
const SIDE_ROTATION: u16 = 0;

/// A finger, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Finger {
    Thumb = 0,
    Index = 1,
    Middle = 2,
    Ring = 3,
    Little = 4,
}

impl Finger {
    /// All fingers, thumb first.
    pub const ALL: [Finger; 5] = [Finger::Thumb, Finger::Index, Finger::Middle, Finger::Ring, Finger::Little];

    /// Resolve a wire finger index (0 = thumb … 4 = little).
    pub fn from_index(index: u8) -> Result<Self> {
        Self::ALL.get(index as usize).copied().ok_or_else(|| {
            LinkError::invalid_argument("finger index", format!("{index} is not in 0..=4"))
        })
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Target positions for all five fingers, in logical units `0..=1000`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerPositions {
    pub thumb: u16,
    pub index: u16,
    pub middle: u16,
    pub ring: u16,
    pub little: u16,
    /// Thumb rotation, for hands with a rotating thumb
    pub thumb_rotation: Option<u16>,
}

impl Default for FingerPositions {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl FingerPositions {
    /// Relaxed hand.
    pub const NEUTRAL: Self = Self {
        thumb: NEUTRAL_POSITION,
        index: NEUTRAL_POSITION,
        middle: NEUTRAL_POSITION,
        ring: NEUTRAL_POSITION,
        little: NEUTRAL_POSITION,
        thumb_rotation: Some(SIDE_ROTATION),
    };

    /// Build a vector, clamping every value to `0..=POSITION_MAX`.
    pub fn new(thumb: u16, index: u16, middle: u16, ring: u16, little: u16) -> Self {
        Self {
            thumb: thumb.min(POSITION_MAX),
            index: index.min(POSITION_MAX),
            middle: middle.min(POSITION_MAX),
            ring: ring.min(POSITION_MAX),
            little: little.min(POSITION_MAX),
            thumb_rotation: None,
        }
    }

    pub fn with_thumb_rotation(mut self, rotation: u16) -> Self {
        self.thumb_rotation = Some(rotation.min(POSITION_MAX));
        self
    }

    /// The fixed pose for `gesture`. Unknown gestures map to [`Self::NEUTRAL`].
    pub fn for_gesture(gesture: Gesture) -> Self {
        match gesture {
            Gesture::NoMotion | Gesture::Unknown => Self::NEUTRAL,
            Gesture::HandClose => Self::new(
                HALF_OPEN_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
            )
            .with_thumb_rotation(FRONT_ROTATION),
            Gesture::HandOpen => Self::new(
                OPEN_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
            )
            .with_thumb_rotation(SIDE_ROTATION),
            Gesture::Ok => Self::new(
                HALF_OPEN_POSITION,
                HALF_OPEN_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
            )
            .with_thumb_rotation(FRONT_ROTATION),
            Gesture::IndexExtension => Self::new(
                CLOSED_POSITION,
                OPEN_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
            )
            .with_thumb_rotation(HALF_ROTATION),
            Gesture::Peace => Self::new(
                NEUTRAL_POSITION,
                OPEN_POSITION,
                OPEN_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
            )
            .with_thumb_rotation(HALF_ROTATION),
            Gesture::ThumbsUp => Self::new(
                OPEN_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
                CLOSED_POSITION,
            )
            .with_thumb_rotation(SIDE_ROTATION),
        }
    }

    pub fn get(&self, finger: Finger) -> u16 {
        self.as_array()[finger.index()]
    }

    /// Set one finger, clamping to `0..=POSITION_MAX`.
    pub fn set(&mut self, finger: Finger, position: u16) {
        let position = position.min(POSITION_MAX);
        match finger {
            Finger::Thumb => self.thumb = position,
            Finger::Index => self.index = position,
            Finger::Middle => self.middle = position,
            Finger::Ring => self.ring = position,
            Finger::Little => self.little = position,
        }
    }

    /// Positions in wire order, thumb first.
    pub fn as_array(&self) -> [u16; 5] {
        [self.thumb, self.index, self.middle, self.ring, self.little]
    }

    /// Positions rescaled from `0..=POSITION_MAX` to `0..=max`, truncating.
    pub fn rescaled(&self, max: u16) -> [u16; 5] {
        self.as_array().map(|p| (p as u32 * max as u32 / POSITION_MAX as u32) as u16)
    }
}
