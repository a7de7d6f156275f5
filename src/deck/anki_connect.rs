/*!
 * Import of finished decks into a running Anki via the AnkiConnect add-on.
 *
 * An import makes sure the note type and the deck exist, stores the
 * exported audio in Anki's media folder and adds one note per card.
 * Cards that duplicate a note already in the deck are skipped.
 */

use log::{debug, info, warn};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::Card;
use super::export::html_field;
use crate::errors::ProviderError;

/// AnkiConnect protocol version
pub const API_VERSION: u8 = 6;

/// Fields of the note type, in the order the export file lists its columns
pub const NOTE_FIELDS: [&str; 3] = ["Language", "English", "MyMedia"];

const CARD_FRONT: &str = "{{Language}}<br>{{MyMedia}}";
const CARD_BACK: &str = "{{FrontSide}}<hr id=\"answer\"><div class=\"english-sentence\">{{English}}</div>";
const CARD_CSS: &str = ".card {\n  font-family: arial;\n  font-size: 20px;\n  text-align: center;\n  color: black;\n  background-color: white;\n}\n\n.english-sentence {\n  font-size: 19px;\n  font-style: italic;\n}\n";

/// Client for the AnkiConnect JSON API
#[derive(Debug)]
pub struct AnkiConnectClient {
    client: Client,
    endpoint: Url,
    /// Note type cards are added with, created on first import
    model_name: String,
}

/// Envelope every AnkiConnect action is sent in
#[derive(Debug, Serialize)]
pub struct ActionRequest<'a> {
    action: &'a str,
    version: u8,
    params: Value,
}

/// Envelope every AnkiConnect answer comes back in
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ActionResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<String>,
}

/// One note for `addNotes`
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnkiNote {
    pub deck_name: String,
    pub model_name: String,
    pub fields: NoteFields,
    pub options: NoteOptions,
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct NoteFields {
    #[serde(rename = "Language")]
    pub language: String,
    #[serde(rename = "English")]
    pub english: String,
    #[serde(rename = "MyMedia")]
    pub media: String,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NoteOptions {
    pub allow_duplicate: bool,
    pub duplicate_scope: String,
}

/// What an import added to the collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub notes_added: usize,
    /// Notes Anki refused, usually duplicates
    pub notes_skipped: usize,
    pub media_files: usize,
}

impl AnkiConnectClient {
    /// Create a client for the add-on listening at `endpoint`
    pub fn new(endpoint: &str, model_name: impl Into<String>, timeout_secs: u64) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ProviderError::RequestFailed(format!("Invalid AnkiConnect endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.into(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn build_request<'a>(action: &'a str, params: Value) -> ActionRequest<'a> {
        ActionRequest {
            action,
            version: API_VERSION,
            params,
        }
    }

    /// Note for `card`, with its sound tag when it has audio
    pub fn build_note(&self, deck_name: &str, card: &Card) -> AnkiNote {
        AnkiNote {
            deck_name: deck_name.to_string(),
            model_name: self.model_name.clone(),
            fields: NoteFields {
                language: html_field(&card.front),
                english: html_field(&card.back),
                media: card.audio.as_ref().map(|a| a.sound_tag()).unwrap_or_default(),
            },
            options: NoteOptions {
                allow_duplicate: false,
                duplicate_scope: "deck".to_string(),
            },
            tags: vec!["kobo-anki".to_string()],
        }
    }

    /// Add `cards` to the deck `deck_name`, taking their audio from `media_dir`
    pub async fn import_deck(&self, deck_name: &str, cards: &[Card], media_dir: &Path) -> Result<ImportSummary, ProviderError> {
        self.ensure_model().await?;
        self.invoke::<Value>("createDeck", json!({ "deck": deck_name })).await?;

        let mut summary = ImportSummary::default();
        for audio in cards.iter().filter_map(|card| card.audio.as_ref()) {
            let path = media_dir.join(&audio.file_name);
            if !path.is_file() {
                warn!("Audio {:?} missing from export, card keeps its sound tag", path);
                continue;
            }
            // the add-on reads the file itself, so hand it an absolute path
            let path = std::path::absolute(&path).unwrap_or(path);
            self.invoke::<Value>(
                "storeMediaFile",
                json!({ "filename": audio.file_name, "path": path.to_string_lossy() }),
            )
            .await?;
            summary.media_files += 1;
        }

        let notes: Vec<AnkiNote> = cards.iter().map(|card| self.build_note(deck_name, card)).collect();
        // duplicates make addNotes fail as a whole, so only send what Anki accepts
        let addable: Vec<bool> = self
            .invoke("canAddNotes", json!({ "notes": notes }))
            .await?
            .unwrap_or_default();
        let notes: Vec<AnkiNote> = notes
            .into_iter()
            .zip(addable)
            .filter_map(|(note, ok)| ok.then_some(note))
            .collect();

        if !notes.is_empty() {
            let ids: Vec<Option<u64>> = self
                .invoke("addNotes", json!({ "notes": notes }))
                .await?
                .unwrap_or_default();
            summary.notes_added = ids.iter().filter(|id| id.is_some()).count();
        }
        summary.notes_skipped = cards.len().saturating_sub(summary.notes_added);

        info!(
            "Imported {} note(s) into Anki deck '{}' ({} skipped)",
            summary.notes_added, deck_name, summary.notes_skipped
        );
        Ok(summary)
    }

    /// Create the note type unless the collection already has it
    async fn ensure_model(&self) -> Result<(), ProviderError> {
        let models: Vec<String> = self.invoke("modelNames", json!({})).await?.unwrap_or_default();
        if models.iter().any(|name| name == &self.model_name) {
            return Ok(());
        }

        debug!("Creating note type '{}'", self.model_name);
        self.invoke::<Value>(
            "createModel",
            json!({
                "modelName": self.model_name,
                "inOrderFields": NOTE_FIELDS,
                "css": CARD_CSS,
                "isCloze": false,
                "cardTemplates": [{ "Name": "Card 1", "Front": CARD_FRONT, "Back": CARD_BACK }],
            }),
        )
        .await?;
        Ok(())
    }

    /// Send one action and unwrap its result
    async fn invoke<T: DeserializeOwned>(&self, action: &str, params: Value) -> Result<Option<T>, ProviderError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&Self::build_request(action, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            return Err(ProviderError::from_status(status.as_u16(), error_text));
        }

        let body = response
            .json::<ActionResponse<T>>()
            .await
            .map_err(|e| ProviderError::ParseError(format!("{}: {}", action, e)))?;

        match body.error {
            Some(message) => Err(ProviderError::Rejected(format!("{}: {}", action, message))),
            None => Ok(body.result),
        }
    }
}
