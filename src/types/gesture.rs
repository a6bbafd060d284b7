//! Gesture identifiers and the class set used by the classifier.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::FingerPositions;
use crate::{LinkError, Result};

/// Gestures the hands know a pose for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gesture {
    NoMotion,
    HandClose,
    HandOpen,
    Ok,
    IndexExtension,
    Peace,
    ThumbsUp,
    /// A label with no known pose; actuated as neutral.
    Unknown,
}

impl Gesture {
    /// Resolve a gesture from its label name.
    ///
    /// Matching ignores case and treats spaces and dashes as underscores, so
    /// `"Hand_Close"`, `"hand close"` and `"HAND-CLOSE"` are equivalent.
    pub fn from_name(name: &str) -> Self {
        let normalized: String = name
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();

        match normalized.as_str() {
            "no_motion" | "rest" => Gesture::NoMotion,
            "hand_close" | "fist" => Gesture::HandClose,
            "hand_open" | "open" => Gesture::HandOpen,
            "ok" => Gesture::Ok,
            "index_extension" | "point" => Gesture::IndexExtension,
            "peace" => Gesture::Peace,
            "thumbs_up" => Gesture::ThumbsUp,
            _ => Gesture::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Gesture::NoMotion => "No_Motion",
            Gesture::HandClose => "Hand_Close",
            Gesture::HandOpen => "Hand_Open",
            Gesture::Ok => "OK",
            Gesture::IndexExtension => "Index_Extension",
            Gesture::Peace => "Peace",
            Gesture::ThumbsUp => "Thumbs_Up",
            Gesture::Unknown => "Unknown",
        }
    }

    pub fn finger_positions(self) -> FingerPositions {
        FingerPositions::for_gesture(self)
    }
}

impl fmt::Display for Gesture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A gesture as labelled in the training media: numeric label id plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GestureLabel {
    pub id: u16,
    pub name: String,
}

impl GestureLabel {
    pub fn new(id: u16, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }

    pub fn gesture(&self) -> Gesture {
        Gesture::from_name(&self.name)
    }

    /// Pose for this label; unknown names fall back to neutral with a warning.
    pub fn finger_positions(&self) -> FingerPositions {
        let gesture = self.gesture();
        if gesture == Gesture::Unknown {
            warn!(label = self.id, name = %self.name, "Unknown gesture, using neutral pose");
        }
        gesture.finger_positions()
    }
}

impl fmt::Display for GestureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// The classifier's output classes, in class-index order.
///
/// Built once at startup and never mutated; class index `i` resolves to the
/// `i`-th label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GestureSet {
    labels: Vec<GestureLabel>,
}

impl Default for GestureSet {
    /// Hand close, hand open, index extension, OK, thumbs up.
    fn default() -> Self {
        Self {
            labels: vec![
                GestureLabel::new(2, "Hand_Close"),
                GestureLabel::new(3, "Hand_Open"),
                GestureLabel::new(30, "Index_Extension"),
                GestureLabel::new(14, "OK"),
                GestureLabel::new(18, "Thumbs_Up"),
            ],
        }
    }
}

impl GestureSet {
    pub fn new(labels: Vec<GestureLabel>) -> Result<Self> {
        if labels.is_empty() {
            return Err(LinkError::config("gesture set", "at least one class is required"));
        }
        Ok(Self { labels })
    }

    /// Build a class set from label ids in class order and an id → name map.
    pub fn from_label_map(classes: &[u16], names: &HashMap<String, String>) -> Result<Self> {
        let labels = classes
            .iter()
            .map(|id| {
                names
                    .get(&id.to_string())
                    .map(|name| GestureLabel::new(*id, name.clone()))
                    .ok_or_else(|| {
                        LinkError::config("gesture labels", format!("no name for label id {id}"))
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(labels)
    }

    /// Parse a JSON label map such as `{"2": "Hand_Close", "3": "Hand_Open"}`.
    pub fn from_label_json(json: &str, classes: &[u16]) -> Result<Self> {
        let names: HashMap<String, String> = serde_json::from_str(json)
            .map_err(|e| LinkError::config("gesture label JSON", e.to_string()))?;
        Self::from_label_map(classes, &names)
    }

    /// Load the JSON label map stored alongside the gesture media.
    pub fn from_label_file<P: AsRef<Path>>(path: P, classes: &[u16]) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| LinkError::io(format!("reading {}", path.display()), e))?;
        let set = Self::from_label_json(&json, classes)?;
        debug!(path = %path.display(), classes = set.len(), "Loaded gesture labels");
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, class_index: usize) -> Option<&GestureLabel> {
        self.labels.get(class_index)
    }

    /// Coerce an out-of-range class index to class 0.
    pub fn coerce_index(&self, class_index: usize) -> usize {
        if class_index < self.labels.len() {
            class_index
        } else {
            warn!(class_index, classes = self.labels.len(), "Class index out of range, using class 0");
            0
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GestureLabel> {
        self.labels.iter()
    }

    /// Class index of the label with `id`.
    pub fn index_of(&self, id: u16) -> Option<usize> {
        self.labels.iter().position(|label| label.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_loosely() {
        assert_eq!(Gesture::from_name("Hand_Close"), Gesture::HandClose);
        assert_eq!(Gesture::from_name("hand close"), Gesture::HandClose);
        assert_eq!(Gesture::from_name("fist"), Gesture::HandClose);
        assert_eq!(Gesture::from_name("OK"), Gesture::Ok);
        assert_eq!(Gesture::from_name(" Thumbs-Up "), Gesture::ThumbsUp);
        assert_eq!(Gesture::from_name("wave"), Gesture::Unknown);
    }

    #[test]
    fn label_map_builds_in_class_order() {
        let json = r#"{"2": "Hand_Close", "3": "Hand_Open", "14": "OK", "99": "Unused"}"#;
        let set = GestureSet::from_label_json(json, &[14, 2, 3]).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.get(0), Some(&GestureLabel::new(14, "OK")));
        assert_eq!(set.index_of(3), Some(2));
    }

    #[test]
    fn missing_label_is_a_config_error() {
        let json = r#"{"2": "Hand_Close"}"#;
        let err = GestureSet::from_label_json(json, &[2, 3]).unwrap_err();
        assert!(matches!(err, LinkError::Config { .. }));
        assert!(err.to_string().contains("label id 3"));
    }

    #[test]
    fn out_of_range_index_is_coerced() {
        let set = GestureSet::default();
        assert_eq!(set.coerce_index(4), 4);
        assert_eq!(set.coerce_index(5), 0);
        assert_eq!(set.coerce_index(usize::MAX), 0);
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(GestureSet::new(Vec::new()).is_err());
    }
}
