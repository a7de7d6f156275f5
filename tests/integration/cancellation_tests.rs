/*!
 * Tests for aborting a run
 */

use std::time::Duration;

use kobo_anki::pipeline::{PipelineOptions, PipelinePhase, ProgressEvent};
use kobo_anki::providers::mock::{MockSynthesizer, MockTranslator};
use kobo_anki::source::SourceFilter;
use crate::common::{self, TestPipeline};

fn words(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("Wort {}", i)).collect()
}

/// Test abort during processing: no item events afterwards, media removed
#[tokio::test]
async fn test_abort_duringProcessing_shouldStopItemEventsAndRemoveMedia() {
    common::init_logger();
    let words = words(12);
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let synthesizer = MockSynthesizer::slow(30);
    let probe = synthesizer.clone();

    let test = TestPipeline::new(
        &words,
        MockTranslator::reversing(),
        Some(synthesizer),
        PipelineOptions::default().with_concurrency(2),
    );
    let mut handle = test.pipeline.start(SourceFilter::default());

    let mut after_abort = Vec::new();
    let mut aborted = false;
    while let Some(event) = handle.events().recv().await {
        if aborted {
            after_abort.push(event.clone());
        }
        if event.is_terminal() {
            break;
        }
        if !aborted && matches!(event, ProgressEvent::Processed { .. }) {
            handle.request_abort();
            aborted = true;
        }
    }

    assert!(aborted);
    assert!(after_abort.iter().all(|e| !e.is_item_event()), "got {:?}", after_abort);
    assert_eq!(after_abort.last(), Some(&ProgressEvent::Aborted));

    let report = handle.wait().await.unwrap();
    assert_eq!(report.phase, PipelinePhase::Aborted);
    assert!(probe.request_count() < 12);
    assert!(test.deck.len() < 12);
    assert_eq!(test.media_file_count(), 0);
    assert!(test.media.files_for(report.run_id).is_empty());
}

/// Test abort during translation: no further translations, no processing
#[tokio::test]
async fn test_abort_duringTranslation_shouldSkipPhaseComplete() {
    let words = words(8);
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    let translator = MockTranslator::reversing().with_delay(Duration::from_millis(10));
    let translator_probe = translator.clone();
    let synthesizer = MockSynthesizer::working();
    let synth_probe = synthesizer.clone();

    let test = TestPipeline::new(&words, translator, Some(synthesizer), PipelineOptions::default());
    let mut handle = test.pipeline.start(SourceFilter::default());

    let mut events = Vec::new();
    while let Some(event) = handle.events().recv().await {
        if matches!(event, ProgressEvent::Translated { index: 2, .. }) {
            handle.request_abort();
        }
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::PhaseComplete { .. })));
    assert_eq!(events.last(), Some(&ProgressEvent::Aborted));

    let report = handle.wait().await.unwrap();
    assert_eq!(report.phase, PipelinePhase::Aborted);
    // the call in flight at abort time may finish, nothing after it starts
    assert!(translator_probe.request_count() <= 3);
    assert_eq!(synth_probe.request_count(), 0);
    assert!(test.deck.is_empty());
}

/// Test that stuck tasks are abandoned once the grace period is over
#[tokio::test]
async fn test_abort_withStuckSynthesis_shouldFinishAfterGracePeriod() {
    let words = words(4);
    let words: Vec<&str> = words.iter().map(String::as_str).collect();

    let test = TestPipeline::new(
        &words,
        MockTranslator::reversing(),
        Some(MockSynthesizer::slow(10_000)),
        PipelineOptions::default()
            .with_concurrency(2)
            .with_abort_grace(Duration::from_millis(50)),
    );
    let mut handle = test.pipeline.start(SourceFilter::default());

    while let Some(event) = handle.events().recv().await {
        if matches!(event, ProgressEvent::PhaseComplete { .. }) {
            handle.request_abort();
        }
        if event.is_terminal() {
            break;
        }
    }

    let report = tokio::time::timeout(Duration::from_secs(2), handle.wait())
        .await
        .expect("run did not finish after the grace period")
        .unwrap();
    assert_eq!(report.phase, PipelinePhase::Aborted);
    assert!(test.deck.is_empty());
}

/// Test that aborting a finished run changes nothing
#[tokio::test]
async fn test_abort_afterCompletion_shouldBeHarmless() {
    let test = TestPipeline::new(
        &["Hallo"],
        MockTranslator::reversing(),
        None,
        PipelineOptions::default().with_audio(false),
    );
    let mut handle = test.pipeline.start(SourceFilter::default());
    let abort = handle.abort_controller();

    let mut observed: Vec<ProgressEvent> = Vec::new();
    let terminal = handle.events().observe(&mut observed).await;
    assert_eq!(terminal, Some(ProgressEvent::Done { total: 1 }));

    abort.request_abort();
    abort.request_abort();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.phase, PipelinePhase::Completed);
    assert_eq!(test.deck.len(), 1);
}
