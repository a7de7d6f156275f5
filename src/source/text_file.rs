use log::info;
use std::path::{Path, PathBuf};

use super::{SourceFilter, SourceIterator, SourceProvider};
use crate::errors::SourceError;

// @module: Word and phrase lists imported from a text file

/// One item per non-blank line of a UTF-8 text file
#[derive(Debug, Clone)]
pub struct TextFileSource {
    path: PathBuf,
}

impl TextFileSource {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SourceProvider for TextFileSource {
    // Filters describe e-reader metadata and have no meaning for plain lines
    fn iterate(&self, _filter: &SourceFilter) -> Result<SourceIterator, SourceError> {
        let content = std::fs::read_to_string(&self.path)?;
        let lines: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        info!("Read {} line(s) from {:?}", lines.len(), self.path);
        Ok(SourceIterator::new(lines))
    }
}
