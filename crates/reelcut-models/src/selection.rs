//! Highlight selection produced by the greedy selector.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One clip-take in the highlight timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectionEntry {
    pub source_path: PathBuf,
    /// In-point within the source, in seconds
    pub start: f64,
    /// Seconds taken from the source starting at `start`
    pub take_duration: f64,
}

/// Ordered clip-takes, in descending score order (not chronological).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct Selection {
    pub entries: Vec<SelectionEntry>,
}

impl Selection {
    pub fn new(entries: Vec<SelectionEntry>) -> Self {
        Self { entries }
    }

    /// Sum of all take durations.
    pub fn total_duration(&self) -> f64 {
        self.entries.iter().map(|e| e.take_duration).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_duration() {
        let selection = Selection::new(vec![
            SelectionEntry {
                source_path: "a.mp4".into(),
                start: 0.0,
                take_duration: 4.0,
            },
            SelectionEntry {
                source_path: "b.mp4".into(),
                start: 12.0,
                take_duration: 2.5,
            },
        ]);
        assert!((selection.total_duration() - 6.5).abs() < 1e-9);
        assert_eq!(selection.len(), 2);
        assert!(Selection::default().is_empty());
    }
}
