//! Sliding-window smoothing of class indices.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{LinkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmoothingMethod {
    /// Majority vote; ties go to the most recently seen of the tied values.
    /// Suited to categorical gestures.
    #[default]
    Mode,
    /// Rounded arithmetic mean, for ordinal encodings. Halves round to even.
    Mean,
}

/// The most recent `capacity` class indices.
#[derive(Debug, Clone)]
pub struct SmoothingBuffer {
    window: VecDeque<usize>,
    capacity: usize,
    method: SmoothingMethod,
}

impl SmoothingBuffer {
    pub fn new(capacity: usize, method: SmoothingMethod) -> Result<Self> {
        if capacity == 0 {
            return Err(LinkError::config("smoothing window", "must hold at least one sample"));
        }
        Ok(Self { window: VecDeque::with_capacity(capacity), capacity, method })
    }

    /// Append a sample, evicting the oldest when full, and return the smoothed index.
    pub fn push(&mut self, class_index: usize) -> usize {
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(class_index);
        self.smoothed().unwrap_or(class_index)
    }

    /// Smoothed index of the current window, `None` when empty.
    pub fn smoothed(&self) -> Option<usize> {
        let latest = *self.window.back()?;
        if self.capacity == 1 {
            return Some(latest);
        }
        match self.method {
            SmoothingMethod::Mode => self.mode(),
            SmoothingMethod::Mean => Some(self.mean()),
        }
    }

    fn mode(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        // Newest first, so an equal count never displaces a more recent value
        for (position, &value) in self.window.iter().enumerate().rev() {
            let seen_later = self.window.iter().skip(position + 1).any(|&v| v == value);
            if seen_later {
                continue;
            }
            let count = self.window.iter().filter(|&&v| v == value).count();
            if best.is_none_or(|(_, best_count)| count > best_count) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value)
    }

    fn mean(&self) -> usize {
        let sum: usize = self.window.iter().sum();
        (sum as f64 / self.window.len() as f64).round_ties_even() as usize
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn method(&self) -> SmoothingMethod {
        self.method
    }

    pub fn clear(&mut self) {
        self.window.clear();
    }
}
