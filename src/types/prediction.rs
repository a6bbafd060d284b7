//! Classifier output samples

use serde::{Deserialize, Deserializer, Serialize};

use crate::{LinkError, Result};

/// Line that marks the end of a prediction stream.
pub const END_OF_STREAM_SENTINEL: &str = "exit";

/// One classifier decision.
///
/// Field aliases accept the classifier's own output keys
/// (`prediction`, `probability`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionSample {
    /// Seconds on the classifier's clock
    pub timestamp: f64,

    /// Index into the configured gesture set
    #[serde(alias = "prediction", deserialize_with = "class_index_from_number")]
    pub class_index: usize,

    /// Classifier confidence, when reported
    #[serde(default, alias = "probability")]
    pub confidence: Option<f64>,
}

impl PredictionSample {
    pub fn new(timestamp: f64, class_index: usize) -> Self {
        Self { timestamp, class_index, confidence: None }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

// The classifier writes class indices into a float buffer
fn class_index_from_number<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err(serde::de::Error::custom(format!("invalid class index {value}")));
    }
    Ok(value as usize)
}

/// A message on the prediction channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictionMessage {
    Sample(PredictionSample),
    /// The producer has finished; no further samples follow.
    EndOfStream,
}

impl PredictionMessage {
    /// Parse one line of the JSON-lines prediction format.
    ///
    /// Blank lines yield `Ok(None)`; the sentinel `exit` yields
    /// [`PredictionMessage::EndOfStream`].
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        if line == END_OF_STREAM_SENTINEL {
            return Ok(Some(PredictionMessage::EndOfStream));
        }
        serde_json::from_str::<PredictionSample>(line)
            .map(|sample| Some(PredictionMessage::Sample(sample)))
            .map_err(|e| LinkError::invalid_argument("prediction line", format!("{e}: {line}")))
    }
}

impl From<PredictionSample> for PredictionMessage {
    fn from(sample: PredictionSample) -> Self {
        PredictionMessage::Sample(sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classifier_keys() {
        let msg =
            PredictionMessage::parse_line(r#"{"timestamp": 12.5, "prediction": 3.0, "probability": 0.91}"#)
                .unwrap()
                .unwrap();
        assert_eq!(
            msg,
            PredictionMessage::Sample(PredictionSample::new(12.5, 3).with_confidence(0.91))
        );
    }

    #[test]
    fn confidence_is_optional() {
        let msg = PredictionMessage::parse_line(r#"{"timestamp": 0.0, "class_index": 1}"#).unwrap();
        assert_eq!(msg, Some(PredictionMessage::Sample(PredictionSample::new(0.0, 1))));
    }

    #[test]
    fn sentinel_and_blank_lines() {
        assert_eq!(PredictionMessage::parse_line("exit\n").unwrap(), Some(PredictionMessage::EndOfStream));
        assert_eq!(PredictionMessage::parse_line("   ").unwrap(), None);
    }

    #[test]
    fn rejects_bad_class_index() {
        for line in [
            r#"{"timestamp": 0.0, "prediction": -1}"#,
            r#"{"timestamp": 0.0, "prediction": 1.5}"#,
            r#"{"timestamp": 0.0}"#,
            "not json",
        ] {
            let err = PredictionMessage::parse_line(line).unwrap_err();
            assert!(matches!(err, LinkError::InvalidArgument { .. }), "{line}");
        }
    }
}
