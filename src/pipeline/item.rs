/*!
 * Work items flowing through a card run.
 */

use serde::Serialize;

use crate::deck::AudioRef;

/// Where an item is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemStatus {
    Pending,
    Translated,
    TranslationFailed,
    Processed,
    ProcessFailed,
}

/// One unit of source text and everything derived from it
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    /// 1-based position in source order
    pub index: usize,

    /// Text as read from the source
    pub original_text: String,

    /// Translation, or an error marker when translation failed
    pub translated_text: Option<String>,

    /// Synthesized audio attached to the card
    pub audio_ref: Option<AudioRef>,

    /// Lifecycle status
    pub status: ItemStatus,
}

impl Item {
    /// Create a pending item
    pub fn new(index: usize, original_text: impl Into<String>) -> Self {
        Self {
            index,
            original_text: original_text.into(),
            translated_text: None,
            audio_ref: None,
            status: ItemStatus::Pending,
        }
    }

    /// Record a successful translation
    pub fn mark_translated(&mut self, translation: String) {
        self.translated_text = Some(translation);
        self.status = ItemStatus::Translated;
    }

    /// Record a failed translation, keeping a visible marker as the translation
    pub fn mark_translation_failed(&mut self, reason: &str) {
        self.translated_text = Some(format!("[Translation failed: {}]", reason));
        self.status = ItemStatus::TranslationFailed;
    }

    /// Translation text, empty while pending
    pub fn translation(&self) -> &str {
        self.translated_text.as_deref().unwrap_or_default()
    }

    /// Whether the card carries audio
    pub fn has_audio(&self) -> bool {
        self.audio_ref.is_some()
    }
}
