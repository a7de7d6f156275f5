/*!
 * Text sources feeding a card run.
 *
 * A source is read exactly once per run. Reading materializes the whole
 * result set, which is the point where the item count becomes known; the
 * returned `SourceIterator` then hands the items out in order.
 *
 * - `kobo`: highlights from a Kobo e-reader database
 * - `text_file`: one item per line of a text file
 */

use serde::{Deserialize, Serialize};

use crate::errors::SourceError;

pub mod kobo;
pub mod text_file;

pub use kobo::{BookSort, BookSummary, KoboSource};
pub use text_file::TextFileSource;

/// Restricts which items a source returns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFilter {
    pub author: Option<String>,
    pub title: Option<String>,
    /// Lower bound (e.g. `2024-01-01`); only used together with `end_date`
    pub start_date: Option<String>,
    /// Upper bound; only used together with `start_date`.
    ///
    /// Both bounds are compared as text against the highlight's `DateCreated`
    /// timestamp (`2024-02-01T10:00:00`). A bare date sorts before every time
    /// on that day, so `end_date = 2024-02-01` excludes highlights made on
    /// February 1st. Pass `2024-02-01T23:59:59` to include the whole day.
    pub end_date: Option<String>,
}

impl SourceFilter {
    /// Date range to apply, present only when both ends are set
    pub fn date_range(&self) -> Option<(&str, &str)> {
        match (self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(start), Some(end)) if !start.is_empty() && !end.is_empty() => Some((start, end)),
            _ => None,
        }
    }
}

/// One raw item with its position in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawItem {
    /// 1-based index
    pub index: usize,
    /// Total number of items in this run
    pub total: usize,
    pub text: String,
}

/// Finite, non-restartable sequence of source items
#[derive(Debug)]
pub struct SourceIterator {
    texts: std::vec::IntoIter<String>,
    total: usize,
    next_index: usize,
}

impl SourceIterator {
    /// Wrap fully materialized source texts
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            total: texts.len(),
            texts: texts.into_iter(),
            next_index: 1,
        }
    }

    /// Number of items the source produced
    pub fn total(&self) -> usize {
        self.total
    }
}

impl Iterator for SourceIterator {
    type Item = RawItem;

    fn next(&mut self) -> Option<RawItem> {
        let text = self.texts.next()?;
        let item = RawItem {
            index: self.next_index,
            total: self.total,
            text,
        };
        self.next_index += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.texts.size_hint()
    }
}

impl ExactSizeIterator for SourceIterator {}

/// Provides the raw text of a run.
///
/// `iterate` performs blocking I/O; callers on an async runtime should run it
/// on a blocking thread. Failing to reach the source is fatal for the run.
pub trait SourceProvider: Send + Sync {
    fn iterate(&self, filter: &SourceFilter) -> Result<SourceIterator, SourceError>;
}

/// In-memory source, ignores filters
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    texts: Vec<String>,
}

impl StaticSource {
    pub fn new<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            texts: texts.into_iter().map(Into::into).collect(),
        }
    }
}

impl SourceProvider for StaticSource {
    fn iterate(&self, _filter: &SourceFilter) -> Result<SourceIterator, SourceError> {
        Ok(SourceIterator::new(self.texts.clone()))
    }
}
