/*!
 * Writes a finished deck as an Anki plain-text import file.
 *
 * Layout under the output directory:
 * - `<deck>.txt`: tab separated notes with Anki file headers
 * - `<deck>.media/`: audio referenced by the notes, ready to copy into
 *   Anki's `collection.media` folder
 */

use log::{info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::{Card, Deck};
use crate::errors::SinkError;

/// What an export produced
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub notes_path: PathBuf,
    pub media_dir: PathBuf,
    pub cards: usize,
    pub media_files: usize,
}

/// Deck exporter
pub struct DeckExporter;

impl DeckExporter {
    /// Export `deck` into `output_dir`
    pub fn export<P: AsRef<Path>>(deck: &Deck, output_dir: P) -> Result<ExportSummary, SinkError> {
        let output_dir = output_dir.as_ref();
        fs::create_dir_all(output_dir)?;

        let file_stem = sanitize_file_stem(deck.name());
        let notes_path = output_dir.join(format!("{}.txt", file_stem));
        let media_dir = output_dir.join(format!("{}.media", file_stem));

        let cards = deck.cards();
        let mut media_files = 0;

        let file = File::create(&notes_path)?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "#separator:tab")?;
        writeln!(writer, "#html:true")?;
        writeln!(writer, "#deck:{}", deck.name())?;
        writeln!(writer, "#columns:Language\tEnglish\tMyMedia")?;

        for card in &cards {
            writeln!(writer, "{}", Self::note_line(card))?;

            if let Some(audio) = &card.audio {
                if media_files == 0 {
                    fs::create_dir_all(&media_dir)?;
                }
                match fs::copy(&audio.path, media_dir.join(&audio.file_name)) {
                    Ok(_) => media_files += 1,
                    Err(e) => warn!("Could not copy media {:?}: {}", audio.path, e),
                }
            }
        }
        writer.flush().map_err(|e| SinkError::Export(e.to_string()))?;

        info!("Exported {} cards to {:?}", cards.len(), notes_path);

        Ok(ExportSummary {
            notes_path,
            media_dir,
            cards: cards.len(),
            media_files,
        })
    }

    /// One tab separated note line: front, back, sound tag
    pub fn note_line(card: &Card) -> String {
        let sound = card.audio.as_ref().map(|a| a.sound_tag()).unwrap_or_default();
        format!("{}\t{}\t{}", escape_field(&card.front), escape_field(&card.back), sound)
    }
}

/// Render a field for an `#html:true` import.
///
/// A field containing `"` is quoted with inner quotes doubled so the
/// importer does not take a leading quote as the start of a quoted field.
fn escape_field(field: &str) -> String {
    let html = html_field(field);
    if html.contains('"') {
        format!("\"{}\"", html.replace('"', "\"\""))
    } else {
        html
    }
}

/// Card text as Anki field HTML: markup escaped, line breaks as `<br>`
pub(crate) fn html_field(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\t', " ")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') { '_' } else { c })
        .collect();
    if stem.trim().is_empty() { "deck".to_string() } else { stem }
}
