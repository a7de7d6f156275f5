/*!
 * Mock provider implementations for testing.
 *
 * This module provides mock providers that simulate different behaviors:
 * - `MockTranslator::reversing()` - Returns the input reversed
 * - `MockTranslator::failing_on(..)` - Fails for one specific text
 * - `MockSynthesizer::working()` - Returns a single byte of audio
 * - `MockSynthesizer::failing()` - Always fails with an error
 *
 * Clones share their counters, so a test can keep a handle while the
 * pipeline owns the provider.
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::errors::{ProviderError, SynthesisError, TranslationError};
use crate::providers::{Synthesizer, Translator};

/// Behavior mode for the mock translator
#[derive(Debug, Clone, PartialEq)]
pub enum TranslateBehavior {
    /// Reverses the characters of the input
    Reverse,
    /// Upper-cases the input
    Uppercase,
    /// Fails for the given text, reverses everything else
    FailOn(String),
    /// Always fails with an error
    Failing,
}

/// Mock translator with a request counter
#[derive(Debug, Clone)]
pub struct MockTranslator {
    behavior: TranslateBehavior,
    delay: Option<Duration>,
    request_count: Arc<AtomicUsize>,
}

impl MockTranslator {
    pub fn new(behavior: TranslateBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn reversing() -> Self {
        Self::new(TranslateBehavior::Reverse)
    }

    pub fn uppercase() -> Self {
        Self::new(TranslateBehavior::Uppercase)
    }

    pub fn failing_on(text: impl Into<String>) -> Self {
        Self::new(TranslateBehavior::FailOn(text.into()))
    }

    pub fn failing() -> Self {
        Self::new(TranslateBehavior::Failing)
    }

    /// Sleep before every answer
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of translate calls so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

fn reverse(text: &str) -> String {
    text.chars().rev().collect()
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            TranslateBehavior::Reverse => Ok(reverse(text)),
            TranslateBehavior::Uppercase => Ok(text.to_uppercase()),
            TranslateBehavior::FailOn(bad) if bad == text => Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("mock failure for '{}'", text),
            }
            .into()),
            TranslateBehavior::FailOn(_) => Ok(reverse(text)),
            TranslateBehavior::Failing => {
                Err(ProviderError::ConnectionError("Simulated connection failure".to_string()).into())
            }
        }
    }
}

/// Behavior mode for the mock synthesizer
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesizeBehavior {
    /// Always returns one byte of audio
    Working,
    /// Fails for the given text, succeeds otherwise
    FailOn(String),
    /// Always fails with an error
    Failing,
}

/// Mock synthesizer tracking calls and concurrency
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    behavior: SynthesizeBehavior,
    delay: Option<Duration>,
    text_delays: Vec<(String, Duration)>,
    request_count: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    pub fn new(behavior: SynthesizeBehavior) -> Self {
        Self {
            behavior,
            delay: None,
            text_delays: Vec::new(),
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn working() -> Self {
        Self::new(SynthesizeBehavior::Working)
    }

    pub fn failing_on(text: impl Into<String>) -> Self {
        Self::new(SynthesizeBehavior::FailOn(text.into()))
    }

    pub fn failing() -> Self {
        Self::new(SynthesizeBehavior::Failing)
    }

    /// Create a synthesizer that takes `delay_ms` per call
    pub fn slow(delay_ms: u64) -> Self {
        Self::working().with_delay(Duration::from_millis(delay_ms))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Take `delay` for calls with exactly `text`, overriding the common delay
    pub fn with_delay_for(mut self, text: impl Into<String>, delay: Duration) -> Self {
        self.text_delays.push((text.into(), delay));
        self
    }

    fn delay_for(&self, text: &str) -> Option<Duration> {
        self.text_delays
            .iter()
            .find(|(t, _)| t == text)
            .map(|(_, delay)| *delay)
            .or(self.delay)
    }

    /// Number of synthesize calls so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were running at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Keeps the in-flight counter honest when a call is dropped mid-sleep
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Bytes, SynthesisError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay_for(text) {
            tokio::time::sleep(delay).await;
        }

        match &self.behavior {
            SynthesizeBehavior::Working => Ok(Bytes::from_static(b"\x01")),
            SynthesizeBehavior::FailOn(bad) if bad == text => Err(ProviderError::ApiError {
                status_code: 500,
                message: format!("mock synthesis failure for '{}'", text),
            }
            .into()),
            SynthesizeBehavior::FailOn(_) => Ok(Bytes::from_static(b"\x01")),
            SynthesizeBehavior::Failing => {
                Err(ProviderError::ConnectionError("Simulated connection failure".to_string()).into())
            }
        }
    }
}
