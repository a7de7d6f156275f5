/*!
 * Tests for the text sources
 */

use kobo_anki::errors::SourceError;
use kobo_anki::source::{BookSort, KoboSource, SourceFilter, SourceProvider, TextFileSource};
use crate::common;

fn texts(source: &dyn SourceProvider, filter: &SourceFilter) -> Vec<String> {
    source
        .iterate(filter)
        .unwrap()
        .map(|item| item.text)
        .collect()
}

/// Test that highlights come back oldest first, trimmed, without blanks
#[test]
fn test_kobo_source_withNoFilter_shouldReturnHighlightsInCreationOrder() {
    let dir = common::create_temp_dir().unwrap();
    let db = common::create_kobo_database(dir.path()).unwrap();
    let source = KoboSource::with_database(&db);

    let iter = source.iterate(&SourceFilter::default()).unwrap();
    assert_eq!(iter.total(), 3);

    let items: Vec<_> = iter.map(|item| (item.index, item.total, item.text)).collect();
    assert_eq!(
        items,
        vec![
            (1, 3, "Hallo".to_string()),
            (2, 3, "Welt".to_string()),
            (3, 3, "Test".to_string()),
        ]
    );
}

/// Test author and title filters
#[test]
fn test_kobo_source_withAuthorOrTitle_shouldRestrictResults() {
    let dir = common::create_temp_dir().unwrap();
    let db = common::create_kobo_database(dir.path()).unwrap();
    let source = KoboSource::with_database(&db);

    let by_author = SourceFilter {
        author: Some("Franz Kafka".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &by_author), vec!["Test"]);

    let by_title = SourceFilter {
        title: Some("Der Zauberberg".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &by_title), vec!["Hallo", "Welt"]);
}

/// Test the date range filter and its validation
#[test]
fn test_kobo_source_withDateRange_shouldApplyBothEnds() {
    let dir = common::create_temp_dir().unwrap();
    let db = common::create_kobo_database(dir.path()).unwrap();
    let source = KoboSource::with_database(&db);

    let january = SourceFilter {
        start_date: Some("2024-01-01".into()),
        end_date: Some("2024-01-31".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &january), vec!["Hallo", "Welt"]);

    // only one end given: no date restriction
    let open_ended = SourceFilter {
        start_date: Some("2024-02-01".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &open_ended).len(), 3);

    let reversed = SourceFilter {
        start_date: Some("2024-03-01".into()),
        end_date: Some("2024-01-01".into()),
        ..Default::default()
    };
    assert!(matches!(
        source.iterate(&reversed),
        Err(SourceError::InvalidFilter(_))
    ));
}

/// Test that a bare end date stops at midnight of that day
#[test]
fn test_kobo_source_withBareEndDate_shouldExcludeThatDaysHighlights() {
    let dir = common::create_temp_dir().unwrap();
    let db = common::create_kobo_database(dir.path()).unwrap();
    let source = KoboSource::with_database(&db);

    // "Welt" was highlighted on 2024-01-03 at 09:30
    let bare = SourceFilter {
        start_date: Some("2024-01-01".into()),
        end_date: Some("2024-01-03".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &bare), vec!["Hallo"]);

    let whole_day = SourceFilter {
        start_date: Some("2024-01-01".into()),
        end_date: Some("2024-01-03T23:59:59".into()),
        ..Default::default()
    };
    assert_eq!(texts(&source, &whole_day), vec!["Hallo", "Welt"]);
}

/// Test book listing and its sort orders
#[test]
fn test_list_books_withEachSort_shouldOrderAccordingly() {
    let dir = common::create_temp_dir().unwrap();
    let db = common::create_kobo_database(dir.path()).unwrap();
    let source = KoboSource::with_database(&db);

    let titles = |sort| -> Vec<String> {
        source
            .list_books(sort)
            .unwrap()
            .into_iter()
            .map(|book| book.title)
            .collect()
    };

    assert_eq!(titles(BookSort::Author), vec!["Der Process", "Der Zauberberg"]);
    assert_eq!(titles(BookSort::Book), vec!["Der Process", "Der Zauberberg"]);
    assert_eq!(titles(BookSort::DateAdded), vec!["Der Zauberberg", "Der Process"]);

    let books = source.list_books(BookSort::Author).unwrap();
    assert_eq!(books[0].author, "Franz Kafka");
    assert_eq!(books[0].date_added, "2024-02-01");
}

/// Test that a missing database surfaces as a source error
#[test]
fn test_kobo_source_withMissingDatabase_shouldFail() {
    let dir = common::create_temp_dir().unwrap();
    let source = KoboSource::with_database(dir.path().join("KoboReader.sqlite"));
    assert!(source.iterate(&SourceFilter::default()).is_err());
}

/// Test the word list import
#[test]
fn test_text_file_source_withWordList_shouldYieldOneItemPerLine() {
    let dir = common::create_temp_dir().unwrap();
    let path = common::create_test_file(dir.path(), "words.txt", "Hallo\nWelt\n\nTest\n").unwrap();

    let source = TextFileSource::new(&path);
    assert_eq!(texts(&source, &SourceFilter::default()), vec!["Hallo", "Welt", "Test"]);
}
