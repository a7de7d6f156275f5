/*!
 * Tests for the deck, media store and exporter
 */

use std::sync::Arc;
use uuid::Uuid;

use kobo_anki::deck::{CardSink, Deck, DeckExporter, FsMediaStore, MediaStore};
use crate::common;

/// Test that cards added from many tasks all land in the deck
#[tokio::test]
async fn test_deck_withConcurrentAppends_shouldKeepEveryCard() {
    let deck = Arc::new(Deck::new("concurrent"));
    let mut handles = Vec::new();
    for i in 0..32 {
        let deck = deck.clone();
        handles.push(tokio::spawn(async move {
            deck.add_card(&format!("front {}", i), "back", None).unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(deck.len(), 32);
}

/// Test that an empty front is rejected
#[test]
fn test_deck_withEmptyFront_shouldRejectCard() {
    let deck = Deck::new("strict");
    assert!(deck.add_card("  ", "back", None).is_err());
    assert!(deck.is_empty());
}

/// Test deck naming
#[test]
fn test_deck_names_shouldCarryDateAndImportStem() {
    assert!(Deck::default_name().starts_with("Deck_20"));
    assert!(Deck::name_for_import("/tmp/vokabeln.txt").starts_with("vokabeln_20"));

    let id = Deck::new("x").id();
    assert!((1_000_000_000..10_000_000_000).contains(&id));
}

/// Test that media is tracked per run and removed only for that run
#[test]
fn test_media_store_withTwoRuns_shouldRemoveOnlyOneRunsFiles() {
    let dir = common::create_temp_dir().unwrap();
    let store = FsMediaStore::new(dir.path()).unwrap();
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();

    let audio = store.store_audio(first, "Hallo Welt", &[1]).unwrap();
    store.store_audio(first, "Test", &[1]).unwrap();
    store.store_audio(second, "Hallo Welt", &[1]).unwrap();

    assert!(audio.file_name.starts_with("Hallo_Welt_"));
    assert!(audio.path.exists());
    assert_eq!(common::count_files(dir.path()), 3);

    assert_eq!(store.remove_artifacts(first).unwrap(), 2);
    assert_eq!(common::count_files(dir.path()), 1);
    assert!(store.files_for(first).is_empty());
    assert_eq!(store.files_for(second).len(), 1);

    // nothing left to remove
    assert_eq!(store.remove_artifacts(first).unwrap(), 0);
}

/// Test exporting a deck with audio
#[test]
fn test_exporter_withAudioCards_shouldWriteImportFileAndMedia() {
    let dir = common::create_temp_dir().unwrap();
    let store = FsMediaStore::new(dir.path().join("media")).unwrap();
    let run = Uuid::new_v4();

    let deck = Deck::new("Zauberberg");
    let audio = store.store_audio(run, "Hallo", &[1]).unwrap();
    deck.add_card("Hallo", "Hello", Some(&audio)).unwrap();
    deck.add_card("Welt", "World", None).unwrap();

    let summary = DeckExporter::export(&deck, dir.path().join("out")).unwrap();
    assert_eq!(summary.cards, 2);
    assert_eq!(summary.media_files, 1);

    let text = std::fs::read_to_string(&summary.notes_path).unwrap();
    assert!(text.contains("#deck:Zauberberg"));
    assert!(text.contains(&format!("Hallo\tHello\t[sound:{}]", audio.file_name)));

    // the export keeps its own copy after the run media is gone
    store.remove_artifacts(run).unwrap();
    assert!(summary.media_dir.join(&audio.file_name).exists());
}
