/*!
 * Kobo e-reader highlights.
 *
 * Highlights live in `.kobo/KoboReader.sqlite` on the device. The database is
 * opened read-only, either at an explicit path (a copy on disk) or on the
 * mounted `KOBOeReader` volume.
 */

use log::{debug, info};
use rusqlite::{Connection, OpenFlags, params_from_iter};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use super::{SourceFilter, SourceIterator, SourceProvider};
use crate::errors::SourceError;

/// Volume label of a mounted Kobo
pub const KOBO_LABEL: &str = "KOBOeReader";

const ANNOTATIONS_QUERY: &str = "
    SELECT
        Bookmark.Text
    FROM
        Bookmark
    INNER JOIN
        Content AS ChapterContent ON Bookmark.ContentID = ChapterContent.ContentID
    LEFT JOIN
        Content AS AuthorContent ON ChapterContent.BookID = AuthorContent.ContentID AND AuthorContent.BookID IS NULL
    WHERE
        Bookmark.Text IS NOT NULL AND TRIM(Bookmark.Text) <> ''";

/// How `list_books` orders its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookSort {
    #[default]
    Author,
    Book,
    DateAdded,
}

impl BookSort {
    fn column(&self) -> &'static str {
        match self {
            BookSort::Author => "Content.Attribution",
            BookSort::Book => "Content.Title",
            BookSort::DateAdded => "Content.___SyncTime",
        }
    }
}

/// A book with highlights on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSummary {
    pub title: String,
    pub author: String,
    pub date_added: String,
}

/// Highlights from a Kobo database
#[derive(Debug, Clone, Default)]
pub struct KoboSource {
    db_path: Option<PathBuf>,
}

impl KoboSource {
    /// Read from the device mounted right now
    pub fn mounted() -> Self {
        Self { db_path: None }
    }

    /// Read from an explicit `KoboReader.sqlite`
    pub fn with_database<P: AsRef<Path>>(path: P) -> Self {
        Self {
            db_path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Resolve the database path, locating the device if needed
    pub fn database_path(&self) -> Result<PathBuf, SourceError> {
        match &self.db_path {
            Some(path) => Ok(path.clone()),
            None => {
                let mount = find_kobo_mountpoint(KOBO_LABEL)?
                    .ok_or_else(|| SourceError::DeviceNotFound(KOBO_LABEL.to_string()))?;
                Ok(mount.join(".kobo").join("KoboReader.sqlite"))
            }
        }
    }

    fn open(&self) -> Result<Connection, SourceError> {
        let path = self.database_path()?;
        if !path.exists() {
            return Err(SourceError::Io(std::io::Error::new(
                ErrorKind::NotFound,
                format!("Kobo database not found: {:?}", path),
            )));
        }
        debug!("Opening Kobo database at {:?}", path);
        Ok(Connection::open_with_flags(&path, OpenFlags::SQLITE_OPEN_READ_ONLY)?)
    }

    /// Highlight texts matching `filter`, oldest first
    pub fn fetch_annotations(&self, filter: &SourceFilter) -> Result<Vec<String>, SourceError> {
        let conn = self.open()?;

        let mut query = ANNOTATIONS_QUERY.to_string();
        let mut params: Vec<String> = Vec::new();

        if let Some(author) = filter.author.as_deref().filter(|a| !a.is_empty()) {
            query.push_str(" AND AuthorContent.Attribution = ?");
            params.push(author.to_string());
        }

        if let Some(title) = filter.title.as_deref().filter(|t| !t.is_empty()) {
            query.push_str(" AND ChapterContent.BookTitle = ?");
            params.push(title.to_string());
        }

        if let Some((start, end)) = filter.date_range() {
            if start > end {
                return Err(SourceError::InvalidFilter(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }
            query.push_str(" AND Bookmark.DateCreated BETWEEN ? AND ?");
            params.push(start.to_string());
            params.push(end.to_string());
        }

        query.push_str(" ORDER BY Bookmark.DateCreated ASC");

        let mut stmt = conn.prepare(&query)?;
        let texts = stmt
            .query_map(params_from_iter(params.iter()), |row| row.get::<_, String>(0))?
            .map(|text| text.map(|t| t.trim().to_string()))
            .collect::<Result<Vec<_>, _>>()?;

        info!("Found {} highlight(s)", texts.len());
        Ok(texts)
    }

    /// Books with reading activity on the device
    pub fn list_books(&self, sort: BookSort) -> Result<Vec<BookSummary>, SourceError> {
        let conn = self.open()?;

        let query = format!(
            "SELECT DISTINCT
                Content.Title AS Book,
                Content.Attribution AS Author,
                Content.___SyncTime
            FROM
                Content
            WHERE
                Content.DateLastRead IS NOT NULL AND
                Content.Title IS NOT NULL AND
                Content.Attribution IS NOT NULL
            ORDER BY
                {} ASC",
            sort.column()
        );

        let mut stmt = conn.prepare(&query)?;
        let books = stmt
            .query_map([], |row| {
                Ok(BookSummary {
                    title: row.get(0)?,
                    author: row.get(1)?,
                    date_added: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(books)
    }
}

impl SourceProvider for KoboSource {
    fn iterate(&self, filter: &SourceFilter) -> Result<SourceIterator, SourceError> {
        Ok(SourceIterator::new(self.fetch_annotations(filter)?))
    }
}

/// Find the mount point of a volume labelled `label`.
///
/// Uses `lsblk` where available (Linux) and falls back to `df` (macOS).
pub fn find_kobo_mountpoint(label: &str) -> Result<Option<PathBuf>, SourceError> {
    let mounts = match Command::new("lsblk").args(["-f", "--json"]).output() {
        Ok(output) if output.status.success() => {
            mounts_from_lsblk(&String::from_utf8_lossy(&output.stdout), label)?
        }
        Ok(_) | Err(_) => {
            let output = Command::new("df").arg("-Hl").output()?;
            mounts_from_df(&String::from_utf8_lossy(&output.stdout), label)
        }
    };

    match mounts.len() {
        0 => Ok(None),
        1 => Ok(mounts.into_iter().next().map(PathBuf::from)),
        _ => Err(SourceError::MultipleDevices(mounts)),
    }
}

fn mounts_from_lsblk(json: &str, label: &str) -> Result<Vec<String>, SourceError> {
    let value: serde_json::Value = serde_json::from_str(json)
        .map_err(|e| SourceError::Io(std::io::Error::new(ErrorKind::InvalidData, e)))?;

    let mut mounts = Vec::new();
    let devices = value["blockdevices"].as_array().cloned().unwrap_or_default();
    for device in devices.iter().filter(|d| d["label"].as_str() == Some(label)) {
        // older lsblk versions report a single mountpoint
        if let Some(mount) = device["mountpoint"].as_str() {
            mounts.push(mount.to_string());
        }
        if let Some(list) = device["mountpoints"].as_array() {
            mounts.extend(list.iter().filter_map(|m| m.as_str()).map(str::to_string));
        }
    }
    mounts.dedup();
    Ok(mounts)
}

fn mounts_from_df(output: &str, label: &str) -> Vec<String> {
    let needle = format!("/Volumes/{}", label);
    output
        .lines()
        .filter(|line| line.contains(&needle))
        .filter_map(|line| line.split_whitespace().last())
        .map(str::to_string)
        .collect()
}
