//! Testing utilities for narrated sessions.
//!
//! This module provides tools for integration testing:
//! - `MockNarrator` for deterministic turns without API calls
//! - `MockSceneImager` and `RecordingSpeech` for the side channels
//! - `TestHarness` for scripted scenarios
//! - Assertion helpers for verifying session state

use crate::character::{Character, Wallet};
use crate::narrator::{NarrationRequest, Narrator, NarratorError};
use crate::scene::{SceneError, SceneImager};
use crate::services::{SpeechOutput, UsageRecorder, UsageTracker};
use crate::session::{NarrativeSession, SessionConfig, SessionError, TurnOutcome};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// Mock Narrator
// ============================================================================

/// A scripted narrator reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Fail the call with this message.
    Fail(String),
    /// Never answer; the session's timeout fires.
    Hang,
}

/// A narrator that returns scripted replies in order and records every
/// request it receives.
#[derive(Default)]
pub struct MockNarrator {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<NarrationRequest>>,
}

impl MockNarrator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let narrator = Self::default();
        for text in responses {
            narrator.queue(MockReply::Text(text.into()));
        }
        narrator
    }

    pub fn queue(&self, reply: MockReply) {
        lock(&self.replies).push_back(reply);
    }

    pub fn queue_text(&self, text: impl Into<String>) {
        self.queue(MockReply::Text(text.into()));
    }

    pub fn queue_failure(&self, message: impl Into<String>) {
        self.queue(MockReply::Fail(message.into()));
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<NarrationRequest> {
        lock(&self.requests).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

#[async_trait]
impl Narrator for MockNarrator {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        lock(&self.requests).push(request);
        let reply = lock(&self.replies).pop_front();
        match reply {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(message)) => Err(NarratorError::Unavailable(message)),
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                Err(NarratorError::Empty)
            }
            None => Ok("The Dungeon Master has no more scripted responses.".to_string()),
        }
    }
}

// ============================================================================
// Side channels
// ============================================================================

/// Scene imager with scripted per-description results and delays.
#[derive(Default)]
pub struct MockSceneImager {
    scripted: Mutex<HashMap<String, (Result<String, String>, Duration)>>,
    requested: Mutex<Vec<String>>,
}

impl MockSceneImager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `description` to `url` after `delay`.
    pub fn script(&self, description: impl Into<String>, url: impl Into<String>, delay: Duration) {
        lock(&self.scripted).insert(description.into(), (Ok(url.into()), delay));
    }

    /// Fail `description` after `delay`.
    pub fn script_failure(&self, description: impl Into<String>, delay: Duration) {
        lock(&self.scripted).insert(
            description.into(),
            (Err("scripted failure".to_string()), delay),
        );
    }

    pub fn requested(&self) -> Vec<String> {
        lock(&self.requested).clone()
    }
}

#[async_trait]
impl SceneImager for MockSceneImager {
    async fn generate(&self, description: &str) -> Result<String, SceneError> {
        lock(&self.requested).push(description.to_string());
        let scripted = lock(&self.scripted).get(description).cloned();
        let (result, delay) =
            scripted.unwrap_or_else(|| (Ok(format!("mock://scene/{description}")), Duration::ZERO));
        tokio::time::sleep(delay).await;
        result.map_err(SceneError::Unavailable)
    }
}

/// Speech output that records what it was asked to do.
#[derive(Default)]
pub struct RecordingSpeech {
    spoken: Mutex<Vec<(String, String)>>,
    stops: Mutex<usize>,
}

impl RecordingSpeech {
    /// `(text, locale)` pairs, in order.
    pub fn spoken(&self) -> Vec<(String, String)> {
        lock(&self.spoken).clone()
    }

    pub fn stop_count(&self) -> usize {
        *lock(&self.stops)
    }
}

impl SpeechOutput for RecordingSpeech {
    fn speak(&self, text: &str, locale: &str) {
        lock(&self.spoken).push((text.to_string(), locale.to_string()));
    }

    fn stop(&self) {
        *lock(&self.stops) += 1;
    }
}

// ============================================================================
// Test Harness
// ============================================================================

/// A session wired to mocks, with handles to every mock.
pub struct TestHarness {
    pub session: NarrativeSession,
    pub narrator: Arc<MockNarrator>,
    pub imager: Arc<MockSceneImager>,
    pub speech: Arc<RecordingSpeech>,
    pub usage: Arc<UsageTracker>,
}

impl TestHarness {
    /// A harness with one party member, Elara Swiftblade (20 HP).
    pub fn new() -> Self {
        Self::with_party(vec![Character::new("Elara Swiftblade", "Elf", "Ranger", 20)])
    }

    pub fn with_party(party: Vec<Character>) -> Self {
        Self::with_config(SessionConfig::default(), party)
    }

    pub fn with_config(config: SessionConfig, party: Vec<Character>) -> Self {
        let narrator = Arc::new(MockNarrator::default());
        let imager = Arc::new(MockSceneImager::new());
        let speech = Arc::new(RecordingSpeech::default());
        let usage = Arc::new(UsageTracker::default());

        let mut session = NarrativeSession::new(config, narrator.clone())
            .with_scene_imager(imager.clone())
            .with_speech(speech.clone())
            .with_usage_recorder(usage.clone() as Arc<dyn UsageRecorder>)
            .with_seed(42);
        for member in party {
            if let Err(e) = session.add_member(member) {
                panic!("test party does not fit: {e}");
            }
        }

        Self {
            session,
            narrator,
            imager,
            speech,
            usage,
        }
    }

    /// Queue a narrator reply.
    pub fn expect_narrative(&mut self, text: impl Into<String>) -> &mut Self {
        self.narrator.queue_text(text);
        self
    }

    /// Queue a narrator failure.
    pub fn expect_failure(&mut self, message: impl Into<String>) -> &mut Self {
        self.narrator.queue_failure(message);
        self
    }

    /// Submit player input.
    pub async fn input(&mut self, text: &str) -> Result<TurnOutcome, SessionError> {
        self.session.submit(text).await
    }

    /// HP of a member as (current, max).
    pub fn hp(&self, index: usize) -> (i32, i32) {
        self.session
            .roster()
            .get(index)
            .map(|c| (c.current_hp(), c.max_hp()))
            .unwrap_or((0, 0))
    }

    pub fn in_combat(&self) -> bool {
        self.session.in_combat()
    }

    /// Text of every log entry.
    pub fn log_texts(&self) -> Vec<&str> {
        self.session.log().iter().map(|e| e.text.as_str()).collect()
    }

    pub fn last_narrative(&self) -> Option<&str> {
        self.session
            .log()
            .iter()
            .rev()
            .find(|e| e.kind == crate::story::EventKind::Narrator)
            .map(|e| e.text.as_str())
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert a member's HP.
#[track_caller]
pub fn assert_hp(harness: &TestHarness, index: usize, current: i32, max: i32) {
    let (actual_current, actual_max) = harness.hp(index);
    assert_eq!(
        (actual_current, actual_max),
        (current, max),
        "Expected member {index} at HP {current}/{max}, got {actual_current}/{actual_max}"
    );
}

#[track_caller]
pub fn assert_in_combat(harness: &TestHarness) {
    assert!(harness.in_combat(), "Expected to be in combat");
}

#[track_caller]
pub fn assert_not_in_combat(harness: &TestHarness) {
    assert!(!harness.in_combat(), "Expected to NOT be in combat");
}

/// Assert some log entry has exactly this text.
#[track_caller]
pub fn assert_log_contains(harness: &TestHarness, text: &str) {
    let texts = harness.log_texts();
    assert!(
        texts.contains(&text),
        "Expected log entry '{text}', log was: {texts:#?}"
    );
}

#[track_caller]
pub fn assert_wallet(harness: &TestHarness, index: usize, expected: Wallet) {
    let actual = harness.session.roster().get(index).map(|c| c.currency);
    assert_eq!(actual, Some(expected), "Unexpected wallet for member {index}");
}

/// Assert a member carries an item with this name in the inventory.
#[track_caller]
pub fn assert_has_item(harness: &TestHarness, index: usize, name: &str) {
    let has = harness
        .session
        .roster()
        .get(index)
        .is_some_and(|c| c.inventory.iter().any(|i| i.name == name));
    assert!(has, "Expected member {index} to carry '{name}'");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_narrator_replays_in_order() {
        let narrator = MockNarrator::new(["first", "second"]);
        let request = || NarrationRequest {
            system: String::new(),
            history: Vec::new(),
            input: "go".into(),
        };

        assert_eq!(narrator.narrate(request()).await.unwrap(), "first");
        assert_eq!(narrator.narrate(request()).await.unwrap(), "second");
        assert!(narrator.narrate(request()).await.unwrap().contains("no more scripted"));
        assert_eq!(narrator.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_narrator_failure() {
        let narrator = MockNarrator::default();
        narrator.queue_failure("offline");
        let result = narrator
            .narrate(NarrationRequest {
                system: String::new(),
                history: Vec::new(),
                input: "go".into(),
            })
            .await;
        assert!(matches!(result, Err(NarratorError::Unavailable(m)) if m == "offline"));
    }

    #[tokio::test]
    async fn test_harness_basic_turn() {
        let mut harness = TestHarness::new();
        harness.expect_narrative("The road is quiet.");
        harness.input("I walk north.").await.unwrap();

        assert_log_contains(&harness, "I walk north.");
        assert_eq!(harness.last_narrative(), Some("The road is quiet."));
        assert_hp(&harness, 0, 20, 20);
        assert_not_in_combat(&harness);
        assert_eq!(harness.usage.usage().used, 1);
    }
}
