/*!
 * Common test utilities for the kobo-anki test suite
 */

use anyhow::Result;
use rusqlite::{Connection, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use kobo_anki::deck::{AudioRef, CardSink, Deck, FsMediaStore};
use kobo_anki::errors::{SinkError, SourceError};
use kobo_anki::pipeline::{Pipeline, PipelineOptions, ProgressEvent};
use kobo_anki::providers::mock::{MockSynthesizer, MockTranslator};
use kobo_anki::source::{SourceFilter, SourceIterator, SourceProvider, StaticSource};

/// Route library logs to the test output
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// Number of entries in a directory
pub fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

/// Source that can never be reached
#[derive(Debug, Default)]
pub struct UnreachableSource;

impl SourceProvider for UnreachableSource {
    fn iterate(&self, _filter: &SourceFilter) -> Result<SourceIterator, SourceError> {
        Err(SourceError::DeviceNotFound("KOBOeReader".to_string()))
    }
}

/// Sink that refuses one specific card and accepts the rest
#[derive(Debug)]
pub struct RejectingSink {
    reject_front: String,
    pub accepted: AtomicUsize,
}

impl RejectingSink {
    pub fn new(reject_front: &str) -> Self {
        Self {
            reject_front: reject_front.to_string(),
            accepted: AtomicUsize::new(0),
        }
    }
}

impl CardSink for RejectingSink {
    fn add_card(&self, front: &str, _back: &str, _audio: Option<&AudioRef>) -> Result<(), SinkError> {
        if front == self.reject_front {
            return Err(SinkError::AppendFailed("collection is read-only".to_string()));
        }
        self.accepted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// A pipeline over fixed texts, writing into an in-memory deck
pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub deck: Arc<Deck>,
    pub media: Arc<FsMediaStore>,
    // keeps the media directory alive
    pub media_dir: TempDir,
}

impl TestPipeline {
    pub fn new(
        texts: &[&str],
        translator: MockTranslator,
        synthesizer: Option<MockSynthesizer>,
        options: PipelineOptions,
    ) -> Self {
        let media_dir = TempDir::new().expect("temp dir");
        let media = Arc::new(FsMediaStore::new(media_dir.path()).expect("media store"));
        let deck = Arc::new(Deck::new("test deck"));

        let mut pipeline = Pipeline::new(
            Arc::new(StaticSource::new(texts.iter().copied())),
            Arc::new(translator),
            deck.clone(),
            media.clone(),
        )
        .with_options(options);
        if let Some(synthesizer) = synthesizer {
            pipeline = pipeline.with_synthesizer(Arc::new(synthesizer));
        }

        Self {
            pipeline,
            deck,
            media,
            media_dir,
        }
    }

    /// Number of files in the media directory
    pub fn media_file_count(&self) -> usize {
        count_files(self.media_dir.path())
    }
}

/// Indices of the item events in `events`, in the order given
pub fn item_indices(events: &[ProgressEvent]) -> Vec<usize> {
    events.iter().filter_map(|e| e.item_index()).collect()
}

/// Indices of the `Processed` events in `events`
pub fn processed_indices(events: &[ProgressEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Processed { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

/// Create a minimal `KoboReader.sqlite` with two books and a handful of highlights
pub fn create_kobo_database(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("KoboReader.sqlite");
    let conn = Connection::open(&path)?;

    conn.execute_batch(
        "CREATE TABLE content (
            ContentID TEXT PRIMARY KEY,
            BookID TEXT,
            BookTitle TEXT,
            Title TEXT,
            Attribution TEXT,
            DateLastRead TEXT,
            ___SyncTime TEXT
        );
        CREATE TABLE Bookmark (
            BookmarkID TEXT PRIMARY KEY,
            ContentID TEXT,
            Text TEXT,
            DateCreated TEXT
        );",
    )?;

    let content = [
        ("mann-zauberberg", None, None, Some("Der Zauberberg"), Some("Thomas Mann"), Some("2024-01-20"), Some("2023-12-01")),
        ("mann-zauberberg#1", Some("mann-zauberberg"), Some("Der Zauberberg"), Some("Kapitel 1"), None, None, None),
        ("kafka-prozess", None, None, Some("Der Process"), Some("Franz Kafka"), Some("2024-02-11"), Some("2024-02-01")),
        ("kafka-prozess#1", Some("kafka-prozess"), Some("Der Process"), Some("Kapitel 1"), None, None, None),
    ];
    for (id, book_id, book_title, title, author, last_read, sync_time) in content {
        conn.execute(
            "INSERT INTO content (ContentID, BookID, BookTitle, Title, Attribution, DateLastRead, ___SyncTime)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, book_id, book_title, title, author, last_read, sync_time],
        )?;
    }

    // inserted out of order on purpose
    let bookmarks = [
        ("b3", "kafka-prozess#1", Some("Test"), "2024-02-10T08:00:00"),
        ("b2", "mann-zauberberg#1", Some("Welt"), "2024-01-03T09:30:00"),
        ("b1", "mann-zauberberg#1", Some(" Hallo "), "2024-01-02T21:15:00"),
        ("b4", "mann-zauberberg#1", Some("   "), "2024-01-04T10:00:00"),
        ("b5", "mann-zauberberg#1", None, "2024-01-05T10:00:00"),
    ];
    for (id, content_id, text, created) in bookmarks {
        conn.execute(
            "INSERT INTO Bookmark (BookmarkID, ContentID, Text, DateCreated) VALUES (?1, ?2, ?3, ?4)",
            params![id, content_id, text, created],
        )?;
    }

    Ok(path)
}
