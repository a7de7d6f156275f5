/*!
 * Storage for synthesized card audio.
 *
 * Every stored file is tracked against the run that produced it so that an
 * aborted or failed run can remove exactly its own artifacts.
 */

use log::{debug, error, info};
use parking_lot::Mutex;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::AudioRef;
use crate::errors::{SinkError, SynthesisError};
use crate::pipeline::RunId;

/// Characters of the card text used in the file name
const SLUG_CHARS: usize = 16;

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\-]").expect("valid file name pattern"));

/// Stores audio bytes and cleans them up per run
pub trait MediaStore: Send + Sync {
    /// Persist audio for `text` and return a handle to it
    fn store_audio(&self, run_id: RunId, text: &str, audio: &[u8]) -> Result<AudioRef, SynthesisError>;

    /// Delete every artifact stored for `run_id`, returning how many were removed
    fn remove_artifacts(&self, run_id: RunId) -> Result<usize, SinkError>;
}

/// Media store backed by a directory
#[derive(Debug)]
pub struct FsMediaStore {
    dir: PathBuf,
    files: Mutex<HashMap<RunId, BTreeSet<PathBuf>>>,
}

impl FsMediaStore {
    /// Use `dir` for media, creating it if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        debug!("Media directory: {:?}", dir);
        Ok(Self {
            dir,
            files: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Files currently tracked for a run
    pub fn files_for(&self, run_id: RunId) -> Vec<PathBuf> {
        self.files
            .lock()
            .get(&run_id)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// File name for a card's audio: a readable slug plus a short hash
    pub fn file_name_for(run_id: RunId, text: &str) -> String {
        let head: String = text.trim().chars().take(SLUG_CHARS).collect();
        let slug = UNSAFE_CHARS
            .replace_all(&head.replace(char::is_whitespace, "_"), "")
            .to_string();

        let mut hasher = Sha256::new();
        hasher.update(run_id.as_bytes());
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();
        let hash: String = digest.iter().take(4).map(|b| format!("{:02x}", b)).collect();

        if slug.is_empty() {
            format!("{}.mp3", hash)
        } else {
            format!("{}_{}.mp3", slug, hash)
        }
    }
}

impl MediaStore for FsMediaStore {
    fn store_audio(&self, run_id: RunId, text: &str, audio: &[u8]) -> Result<AudioRef, SynthesisError> {
        let file_name = Self::file_name_for(run_id, text);
        let path = self.dir.join(&file_name);

        std::fs::write(&path, audio)
            .map_err(|e| SynthesisError::Storage(format!("{:?}: {}", path, e)))?;

        self.files.lock().entry(run_id).or_default().insert(path.clone());
        Ok(AudioRef { file_name, path })
    }

    fn remove_artifacts(&self, run_id: RunId) -> Result<usize, SinkError> {
        let files = self.files.lock().remove(&run_id).unwrap_or_default();

        let mut removed = 0;
        for path in files {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Deleted file: {:?}", path);
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => error!("Error deleting file {:?}: {}", path, e),
            }
        }

        if removed > 0 {
            info!("Removed {} media file(s) of run {}", removed, run_id);
        }
        Ok(removed)
    }
}
