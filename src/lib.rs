/*!
 * # kobo-anki - study cards from e-reader highlights
 *
 * A Rust library that turns Kobo highlights (or a plain word list) into
 * translated Anki cards with optional spoken audio.
 *
 * ## Features
 *
 * - Read highlights from a mounted Kobo or a copied `KoboReader.sqlite`
 * - Translate with DeepL, one item at a time in source order
 * - Synthesize audio with OpenAI under a bounded concurrency limit
 * - Ordered progress reporting and cooperative cancellation
 * - Export as an Anki plain-text import file with media
 * - Add the finished deck to a running Anki through AnkiConnect
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `app_config`: Configuration management
 * - `source`: Text sources (Kobo database, text file, in-memory)
 * - `providers`: Translator and synthesizer clients:
 *   - `providers::deepl`: DeepL API client
 *   - `providers::openai_speech`: OpenAI speech API client
 *   - `providers::mock`: Deterministic providers for tests
 * - `pipeline`: The two-phase card pipeline:
 *   - `pipeline::orchestrator`: Run state machine and phase sequencing
 *   - `pipeline::progress`: Progress channel and reorder buffer
 *   - `pipeline::limiter`: Concurrency limiter
 *   - `pipeline::cancel`: Cancellation controller
 * - `deck`: Cards, media files, deck export and AnkiConnect import
 * - `app_controller`: Main application controller
 * - `errors`: Custom error types for the application
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod deck;
pub mod errors;
pub mod pipeline;
pub mod providers;
pub mod source;

// Re-export main types for easier usage
pub use app_config::Config;
pub use deck::{Card, CardSink, Deck};
pub use errors::{AppError, PipelineError, SinkError, SourceError};
pub use pipeline::{Pipeline, PipelineOptions, ProgressEvent, RunHandle, RunReport};
pub use providers::{Synthesizer, Translator};
pub use source::{SourceFilter, SourceProvider};
