/*!
 * Provider implementations for the external services a card run uses.
 *
 * - DeepL: text translation
 * - OpenAI: speech synthesis
 * - Mock: deterministic stand-ins for tests and benchmarks
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

use crate::errors::{SynthesisError, TranslationError};

/// Translates one text per call
///
/// Failures are recoverable: the pipeline marks the item and moves on.
#[async_trait]
pub trait Translator: Send + Sync + Debug {
    /// Translate `text` into the configured target language
    async fn translate(&self, text: &str) -> Result<String, TranslationError>;
}

/// Turns one text into audio per call
///
/// Failures are recoverable: the card is built without audio.
#[async_trait]
pub trait Synthesizer: Send + Sync + Debug {
    /// Synthesize speech for `text`, returning the encoded audio
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError>;
}

pub mod deepl;
pub mod mock;
pub mod openai_speech;

pub use deepl::DeepLTranslator;
pub use openai_speech::OpenAiSpeech;
