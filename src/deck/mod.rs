/*!
 * Study deck assembly.
 *
 * - `Deck`: in-memory card sink shared by concurrent processing tasks
 * - `media`: storage and cleanup of synthesized audio
 * - `export`: writing a finished deck to disk for Anki import
 * - `anki_connect`: adding a finished deck to a running Anki
 */

use chrono::Local;
use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::SinkError;

pub mod anki_connect;
pub mod export;
pub mod media;

pub use anki_connect::{AnkiConnectClient, ImportSummary};
pub use export::{DeckExporter, ExportSummary};
pub use media::{FsMediaStore, MediaStore};

/// Handle to a stored audio file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioRef {
    /// File name as referenced from the card
    pub file_name: String,
    /// Where the file currently lives
    pub path: PathBuf,
}

impl AudioRef {
    /// Anki sound tag for this file
    pub fn sound_tag(&self) -> String {
        format!("[sound:{}]", self.file_name)
    }
}

/// A finished study card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Card {
    pub front: String,
    pub back: String,
    pub audio: Option<AudioRef>,
}

/// Accumulates finished cards.
///
/// Processing tasks call `add_card` concurrently, so implementations must
/// serialize their own writes.
pub trait CardSink: Send + Sync {
    fn add_card(&self, front: &str, back: &str, audio: Option<&AudioRef>) -> Result<(), SinkError>;
}

/// In-memory deck of cards
#[derive(Debug)]
pub struct Deck {
    id: u64,
    name: String,
    cards: Mutex<Vec<Card>>,
}

impl Deck {
    /// Create an empty deck with a random id
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: rand::rng().random_range(1_000_000_000..10_000_000_000),
            name: name.into(),
            cards: Mutex::new(Vec::new()),
        }
    }

    /// Default name for a deck built from e-reader highlights
    pub fn default_name() -> String {
        format!("Deck_{}", Local::now().format("%Y-%m-%d"))
    }

    /// Default name for a deck built from an imported text file
    pub fn name_for_import<P: AsRef<Path>>(path: P) -> String {
        let stem = path
            .as_ref()
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .filter(|s| !s.is_empty());

        match stem {
            Some(stem) => format!("{}_{}", stem, Local::now().format("%Y-%m-%d")),
            None => Self::default_name(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cards.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.lock().is_empty()
    }

    /// Copy of the cards added so far
    pub fn cards(&self) -> Vec<Card> {
        self.cards.lock().clone()
    }
}

impl CardSink for Deck {
    fn add_card(&self, front: &str, back: &str, audio: Option<&AudioRef>) -> Result<(), SinkError> {
        if front.trim().is_empty() {
            return Err(SinkError::AppendFailed("card front is empty".to_string()));
        }

        self.cards.lock().push(Card {
            front: front.to_string(),
            back: back.to_string(),
            audio: audio.cloned(),
        });
        Ok(())
    }
}
