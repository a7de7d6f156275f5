use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::app_config::Config;
use crate::deck::{AnkiConnectClient, Deck, DeckExporter, ExportSummary, FsMediaStore, ImportSummary, MediaStore};
use crate::pipeline::{
    Phase, Pipeline, PipelinePhase, ProgressEvent, ProgressObserver, ReorderBuffer, RunReport,
};
use crate::providers::{DeepLTranslator, OpenAiSpeech, Synthesizer, Translator};
use crate::source::{BookSort, BookSummary, KoboSource, SourceFilter, SourceProvider, TextFileSource};

// @module: Application controller for deck creation

/// Where the text of a deck comes from
#[derive(Debug, Clone)]
pub enum InputSource {
    /// Highlights from a Kobo, mounted or at an explicit database path
    Kobo {
        db_path: Option<PathBuf>,
        filter: SourceFilter,
    },
    /// One card per line of a text file
    TextFile(PathBuf),
}

/// Parameters of one `create` invocation
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub input: InputSource,
    /// Overrides the generated deck name
    pub deck_name: Option<String>,
    /// Whether to synthesize audio (also requires speech to be enabled in the config)
    pub audio: bool,
    /// Overrides the configured deck directory
    pub output_dir: Option<PathBuf>,
}

/// Result of a deck creation run
#[derive(Debug)]
pub struct CreateOutcome {
    pub report: RunReport,
    /// Present when the run completed and the deck was written
    pub export: Option<ExportSummary>,
    /// Cards that made it into the deck
    pub cards: usize,
    /// Present when the deck was also added to a running Anki
    pub imported: Option<ImportSummary>,
}

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Build the DeepL translator from the configuration
    pub fn build_translator(&self) -> Result<Arc<dyn Translator>> {
        let translation = &self.config.translation;
        let translator = DeepLTranslator::new(
            translation.api_key.clone(),
            &translation.get_endpoint(),
            self.config.target_language.clone(),
            self.config.source_language.clone(),
            translation.timeout_secs,
        )
        .context("Failed to create DeepL client")?;
        Ok(Arc::new(translator))
    }

    /// Build the speech client, `None` when speech is disabled
    pub fn build_synthesizer(&self) -> Result<Option<Arc<dyn Synthesizer>>> {
        let speech = &self.config.speech;
        if !speech.enabled {
            return Ok(None);
        }
        let synthesizer = OpenAiSpeech::new(
            speech.api_key.clone(),
            &speech.endpoint,
            speech.model.clone(),
            speech.voice.clone(),
            speech.timeout_secs,
        )
        .context("Failed to create OpenAI speech client")?;
        Ok(Some(Arc::new(synthesizer)))
    }

    /// Create a deck using the providers from the configuration
    pub async fn create_deck(&self, request: CreateRequest) -> Result<CreateOutcome> {
        let translator = self.build_translator()?;
        let synthesizer = if request.audio {
            self.build_synthesizer()?
        } else {
            None
        };
        self.create_deck_with(request, translator, synthesizer).await
    }

    /// Create a deck with the given providers.
    ///
    /// Drives one pipeline run, shows its progress, and exports the deck
    /// once the run completes. Ctrl-C aborts the run.
    pub async fn create_deck_with(
        &self,
        request: CreateRequest,
        translator: Arc<dyn Translator>,
        synthesizer: Option<Arc<dyn Synthesizer>>,
    ) -> Result<CreateOutcome> {
        let start_time = Instant::now();

        let (source, filter, default_name): (Arc<dyn SourceProvider>, SourceFilter, String) = match &request.input {
            InputSource::Kobo { db_path, filter } => {
                let source = match db_path {
                    Some(path) => KoboSource::with_database(path),
                    None => KoboSource::mounted(),
                };
                (Arc::new(source) as Arc<dyn SourceProvider>, filter.clone(), Deck::default_name())
            }
            InputSource::TextFile(path) => {
                if !path.is_file() {
                    return Err(anyhow!("Input file does not exist: {:?}", path));
                }
                (
                    Arc::new(TextFileSource::new(path)) as Arc<dyn SourceProvider>,
                    SourceFilter::default(),
                    Deck::name_for_import(path),
                )
            }
        };

        let deck = Arc::new(Deck::new(request.deck_name.clone().unwrap_or(default_name)));
        let output_dir = match &request.output_dir {
            Some(dir) => dir.clone(),
            None => self.config.output.get_deck_dir()?,
        };
        let media = Arc::new(
            FsMediaStore::new(self.config.output.get_media_dir()?).context("Failed to prepare media directory")?,
        );

        let audio = request.audio && synthesizer.is_some();
        let mut pipeline = Pipeline::new(source, translator, deck.clone(), media.clone())
            .with_options(self.config.pipeline.to_options(audio));
        if let Some(synthesizer) = synthesizer {
            pipeline = pipeline.with_synthesizer(synthesizer);
        }

        info!("Creating deck '{}'", deck.name());
        let report = self.drive(&pipeline, filter).await?;

        let outcome = match report.phase {
            PipelinePhase::Completed => {
                let summary = DeckExporter::export(&deck, &output_dir).context("Failed to export deck")?;
                // the export holds its own copies of the audio
                if let Err(e) = media.remove_artifacts(report.run_id) {
                    warn!("Failed to remove run media: {}", e);
                }
                info!(
                    "Deck '{}' written to {:?} ({} cards, {} audio files)",
                    deck.name(),
                    summary.notes_path,
                    summary.cards,
                    summary.media_files
                );
                let imported = if self.config.anki.enabled {
                    self.import_into_anki(&deck, &summary).await
                } else {
                    None
                };
                CreateOutcome {
                    cards: deck.len(),
                    export: Some(summary),
                    imported,
                    report,
                }
            }
            PipelinePhase::Aborted => {
                warn!("Run aborted after {} of {} card(s), deck not exported", deck.len(), report.total);
                CreateOutcome {
                    cards: deck.len(),
                    export: None,
                    imported: None,
                    report,
                }
            }
            phase => {
                return Err(anyhow!("Deck creation ended in phase {}", phase));
            }
        };

        info!("Finished in {:.1?}", start_time.elapsed());
        Ok(outcome)
    }

    /// Add an exported deck to Anki through AnkiConnect.
    ///
    /// The export file stays usable for a manual import, so a failure here
    /// only warns.
    async fn import_into_anki(&self, deck: &Deck, summary: &ExportSummary) -> Option<ImportSummary> {
        let anki = &self.config.anki;
        let result = match AnkiConnectClient::new(&anki.endpoint, anki.model_name.clone(), anki.timeout_secs) {
            Ok(client) => client.import_deck(deck.name(), &deck.cards(), &summary.media_dir).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(imported) => Some(imported),
            Err(e) => {
                warn!("Could not import deck into Anki at {}: {}", anki.endpoint, e);
                None
            }
        }
    }

    /// Start `pipeline`, poll its progress until the run ends, and return the report
    async fn drive(&self, pipeline: &Pipeline, filter: SourceFilter) -> Result<RunReport> {
        let mut handle = pipeline.start(filter);

        let abort = handle.abort_controller();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after in-flight requests");
                abort.request_abort();
            }
        });

        let mut display = ProgressDisplay::new();
        let mut reorder = ReorderBuffer::new();
        let mut ticker = tokio::time::interval(self.config.pipeline.poll_interval());
        let mut failure = None;

        'poll: loop {
            ticker.tick().await;
            for event in handle.events().try_drain() {
                for ready in reorder.push(event) {
                    display.on_event(&ready);
                    if let ProgressEvent::Error { message } = &ready {
                        failure = Some(message.clone());
                    }
                    if ready.is_terminal() {
                        break 'poll;
                    }
                }
            }
            if handle.events().is_closed() {
                break;
            }
        }

        interrupt.abort();
        display.finish();

        let report = handle.wait().await?;
        if report.phase == PipelinePhase::Failed {
            let message = failure.unwrap_or_else(|| "unknown error".to_string());
            error!("Deck creation failed: {}", message);
            return Err(anyhow!("Deck creation failed: {}", message));
        }
        Ok(report)
    }

    /// List the books on a Kobo
    pub fn list_books(db_path: Option<PathBuf>, sort: BookSort) -> Result<Vec<BookSummary>> {
        let source = match db_path {
            Some(path) => KoboSource::with_database(path),
            None => KoboSource::mounted(),
        };
        Ok(source.list_books(sort)?)
    }
}

/// Terminal progress bar fed with ordered progress events.
///
/// Both phases share one bar, so its length is twice the item count.
pub struct ProgressDisplay {
    bar: ProgressBar,
    total: usize,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        let template_result = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(template_result.progress_chars("█▓▒░"));
        Self { bar, total: 0 }
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressObserver for ProgressDisplay {
    fn on_event(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Total { count } => {
                self.total = *count;
                self.bar.set_length((*count as u64) * 2);
                self.bar.set_message("translating");
            }
            ProgressEvent::Translated { index, total, .. } => {
                self.bar.inc(1);
                self.bar.set_message(format!("translated {}/{}", index, total));
            }
            ProgressEvent::PhaseComplete { phase } => {
                let next = match phase {
                    Phase::Translation => "adding cards",
                    Phase::Processing => "finishing",
                };
                self.bar.set_message(next);
            }
            ProgressEvent::Processed { index, total, has_audio, .. } => {
                self.bar.inc(1);
                let audio = if *has_audio { "" } else { " (no audio)" };
                self.bar.set_message(format!("card {}/{}{}", index, total, audio));
            }
            ProgressEvent::Done { total } => {
                self.bar.set_message(format!("{} card(s) done", total));
            }
            ProgressEvent::Aborted => self.bar.set_message("aborted"),
            ProgressEvent::Error { message } => self.bar.set_message(format!("failed: {}", message)),
        }
    }
}
