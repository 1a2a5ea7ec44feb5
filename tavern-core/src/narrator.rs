//! The upstream narrator.
//!
//! The session only depends on the [`Narrator`] trait: send the system
//! prompt, the conversation so far and the new input, get raw text back.
//! [`ClaudeNarrator`] is the production implementation.

use crate::roster::Roster;
use crate::story::{Campaign, EventKind, StoryLog};
use async_trait::async_trait;
use claude::{Claude, Message, Request, Role};
use std::fmt::Write;
use thiserror::Error;
use tracing::debug;

/// Errors from the narrator.
#[derive(Debug, Error)]
pub enum NarratorError {
    #[error("Claude API error: {0}")]
    Api(#[from] claude::Error),

    #[error("No API key configured")]
    NoApiKey,

    #[error("Narrator returned an empty response")]
    Empty,

    #[error("Narrator unavailable: {0}")]
    Unavailable(String),
}

/// Who said a line of the upstream conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    Player,
    Narrator,
}

/// One line of the upstream conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatTurn {
    pub fn player(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Player,
            text: text.into(),
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Narrator,
            text: text.into(),
        }
    }

    /// Rebuild the conversation from a story log. Only player and narrator
    /// entries were ever part of the conversation.
    pub fn history_from_log(log: &StoryLog) -> Vec<ChatTurn> {
        log.iter()
            .filter_map(|event| match event.kind {
                EventKind::Player => Some(ChatTurn::player(&event.text)),
                EventKind::Narrator if !event.text.is_empty() => {
                    Some(ChatTurn::narrator(&event.text))
                }
                _ => None,
            })
            .collect()
    }
}

/// Everything the narrator needs for one response.
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub system: String,
    pub history: Vec<ChatTurn>,
    pub input: String,
}

/// A source of narrator text.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError>;
}

/// Build the system prompt for the current party.
pub fn system_prompt(campaign: Campaign, roster: &Roster, language: &str) -> String {
    let mut prompt = String::from(include_str!("prompts/narrator.txt"));

    let _ = write!(prompt, "\n## Campaign: {}\n", campaign.title());
    let _ = writeln!(prompt, "Respond in the language with code `{language}`.");

    prompt.push_str("\n## Party\n");
    for (i, c) in roster.iter().enumerate() {
        let marker = if i == roster.main_index() { " (protagonist)" } else { "" };
        let _ = writeln!(
            prompt,
            "- {}{}: {} {}, HP {}/{}, AC {}, STR {} DEX {} CON {} INT {} WIS {} CHA {}",
            c.name,
            marker,
            c.race,
            c.class,
            c.current_hp(),
            c.max_hp(),
            c.armor_class,
            c.stats.strength,
            c.stats.dexterity,
            c.stats.constitution,
            c.stats.intelligence,
            c.stats.wisdom,
            c.stats.charisma,
        );
    }

    prompt
}

// ============================================================================
// Claude
// ============================================================================

/// Generation settings for [`ClaudeNarrator`].
#[derive(Debug, Clone)]
pub struct NarratorConfig {
    pub model: Option<String>,
    pub max_tokens: usize,
    pub temperature: Option<f32>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
        }
    }
}

/// Narrator backed by the Claude Messages API.
pub struct ClaudeNarrator {
    client: Claude,
    config: NarratorConfig,
}

impl ClaudeNarrator {
    pub fn new(client: Claude) -> Self {
        Self {
            client,
            config: NarratorConfig::default(),
        }
    }

    /// Create a narrator from the ANTHROPIC_API_KEY environment variable.
    pub fn from_env() -> Result<Self, NarratorError> {
        let client = Claude::from_env().map_err(|_| NarratorError::NoApiKey)?;
        Ok(Self::new(client))
    }

    pub fn with_config(mut self, config: NarratorConfig) -> Self {
        self.config = config;
        self
    }

    fn build_request(&self, request: NarrationRequest) -> Request {
        let mut req = Request::new(to_messages(request.history, request.input))
            .with_system(request.system)
            .with_max_tokens(self.config.max_tokens);
        if let Some(model) = &self.config.model {
            req = req.with_model(model.clone());
        }
        if let Some(temperature) = self.config.temperature {
            req = req.with_temperature(temperature);
        }
        req
    }
}

#[async_trait]
impl Narrator for ClaudeNarrator {
    async fn narrate(&self, request: NarrationRequest) -> Result<String, NarratorError> {
        let response = self.client.complete(self.build_request(request)).await?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Narrator responded"
        );
        if response.text.trim().is_empty() {
            return Err(NarratorError::Empty);
        }
        Ok(response.text)
    }
}

/// Convert the conversation to API messages.
///
/// The Messages API needs a user message first and strictly alternating
/// roles, while a replayed log may open with narration and may hold several
/// lines in a row from one speaker.
fn to_messages(history: Vec<ChatTurn>, input: String) -> Vec<Message> {
    let mut messages: Vec<Message> = Vec::new();

    for turn in history.into_iter().chain(std::iter::once(ChatTurn::player(input))) {
        let is_player = turn.speaker == Speaker::Player;
        let same_speaker = messages
            .last()
            .is_some_and(|last| (last.role == Role::User) == is_player);

        if same_speaker {
            if let Some(last) = messages.last_mut() {
                last.text.push_str("\n\n");
                last.text.push_str(&turn.text);
            }
            continue;
        }
        if messages.is_empty() && !is_player {
            messages.push(Message::user("Begin the adventure."));
        }
        messages.push(if is_player {
            Message::user(turn.text)
        } else {
            Message::assistant(turn.text)
        });
    }

    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::Character;
    use crate::story::StoryEvent;

    #[test]
    fn test_history_skips_system_and_game_events() {
        let mut log = StoryLog::new();
        log.push(StoryEvent::system("The Dungeon Master is setting the scene..."));
        log.push(StoryEvent::narrator("You wake in a cell."));
        log.push(StoryEvent::player("I look around."));
        log.push(StoryEvent::game_event("Elara took 2 damage."));
        log.push(StoryEvent::narrator("A rat bites you."));

        let history = ChatTurn::history_from_log(&log);
        assert_eq!(
            history,
            vec![
                ChatTurn::narrator("You wake in a cell."),
                ChatTurn::player("I look around."),
                ChatTurn::narrator("A rat bites you."),
            ]
        );
    }

    #[test]
    fn test_messages_alternate_and_open_with_user() {
        let history = vec![
            ChatTurn::narrator("You wake in a cell."),
            ChatTurn::player("I look around."),
            ChatTurn::player("(I use a Potion of Healing and recover 5 HP.)"),
            ChatTurn::narrator("You feel better."),
        ];
        let messages = to_messages(history, "I open the door.".into());

        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert!(messages[2].text.contains("Potion of Healing"));
        assert_eq!(messages[4].text, "I open the door.");
    }

    #[test]
    fn test_system_prompt_lists_party() {
        let mut roster = Roster::default();
        roster.push(Character::new("Elara Swiftblade", "Elf", "Ranger", 20)).unwrap();
        let prompt = system_prompt(Campaign::FrozenSick, &roster, "en");
        assert!(prompt.contains("DAMAGE:FirstName,Amount"));
        assert!(prompt.contains("Frozen Sick"));
        assert!(prompt.contains("Elara Swiftblade (protagonist): Elf Ranger, HP 20/20"));
    }
}
