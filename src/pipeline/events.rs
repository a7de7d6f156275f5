/*!
 * Progress events reported by a card run.
 */

use serde::Serialize;
use std::fmt;

/// Per-item stage of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Sequential translation of every item
    Translation,
    /// Bounded-concurrency audio synthesis and card assembly
    Processing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Translation => write!(f, "Translation"),
            Phase::Processing => write!(f, "Processing"),
        }
    }
}

/// A discrete progress report sent from the pipeline to its consumer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ProgressEvent {
    /// Number of items in the run, known once the source is materialized
    Total { count: usize },

    /// One item finished translation (successfully or with an error marker)
    Translated {
        index: usize,
        total: usize,
        original: String,
        translation: String,
    },

    /// All items of a phase have been reported
    PhaseComplete { phase: Phase },

    /// One card was assembled
    Processed {
        index: usize,
        total: usize,
        original: String,
        translation: String,
        has_audio: bool,
    },

    /// The run completed and every card was added
    Done { total: usize },

    /// The run stopped early on request; partial results are kept
    Aborted,

    /// The run failed with a fatal error
    Error { message: String },
}

impl ProgressEvent {
    /// Index of the item this event reports on, if any
    pub fn item_index(&self) -> Option<usize> {
        match self {
            ProgressEvent::Translated { index, .. } | ProgressEvent::Processed { index, .. } => {
                Some(*index)
            }
            _ => None,
        }
    }

    /// Whether this event reports on a single item
    pub fn is_item_event(&self) -> bool {
        self.item_index().is_some()
    }

    /// Whether no event follows this one in a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Done { .. } | ProgressEvent::Aborted | ProgressEvent::Error { .. }
        )
    }
}
