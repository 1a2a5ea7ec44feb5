//! The append-only story log and the records attached to it.

use crate::character::CharacterOptions;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "dm")]
    Narrator,
    #[serde(rename = "player")]
    Player,
    #[serde(rename = "system")]
    System,
    #[serde(rename = "game-event")]
    GameEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Generating,
    Accepted,
    Declined,
    Error,
}

impl InvitationStatus {
    /// Still waiting on a player decision or on the joiner being built.
    pub fn is_open(self) -> bool {
        matches!(self, InvitationStatus::Pending | InvitationStatus::Generating)
    }
}

/// An offer for a new member to join, attached to one narrator entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub name: String,
    pub race: String,
    #[serde(rename = "characterClass")]
    pub class: String,
    pub gender: String,
    pub status: InvitationStatus,
}

impl Invitation {
    pub fn new(
        name: impl Into<String>,
        race: impl Into<String>,
        class: impl Into<String>,
        gender: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            race: race.into(),
            class: class.into(),
            gender: gender.into(),
            status: InvitationStatus::Pending,
        }
    }

    /// Creation options for the joiner, with the unspecified details rolled.
    pub fn character_options<R: Rng + ?Sized>(&self, rng: &mut R) -> CharacterOptions {
        CharacterOptions::new(&self.name, &self.race, &self.class, &self.gender)
            .randomize_details(rng)
    }
}

/// One entry of the story log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invitation: Option<Invitation>,
}

impl StoryEvent {
    pub fn new(kind: EventKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            invitation: None,
        }
    }

    pub fn narrator(text: impl Into<String>) -> Self {
        Self::new(EventKind::Narrator, text)
    }

    pub fn player(text: impl Into<String>) -> Self {
        Self::new(EventKind::Player, text)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(EventKind::System, text)
    }

    pub fn game_event(text: impl Into<String>) -> Self {
        Self::new(EventKind::GameEvent, text)
    }

    pub fn with_invitation(mut self, invitation: Invitation) -> Self {
        self.invitation = Some(invitation);
        self
    }
}

impl fmt::Display for StoryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            EventKind::Narrator => write!(f, "{}", self.text),
            EventKind::Player => write!(f, "> {}", self.text),
            EventKind::System => write!(f, "-- {} --", self.text),
            EventKind::GameEvent => write!(f, "* {}", self.text),
        }
    }
}

/// Append-only sequence of [`StoryEvent`]s.
///
/// The only in-place edit allowed is an invitation status change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryLog {
    events: Vec<StoryEvent>,
}

impl StoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<StoryEvent>) -> Self {
        Self { events }
    }

    pub fn push(&mut self, event: StoryEvent) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = StoryEvent>) {
        self.events.extend(events);
    }

    pub fn events(&self) -> &[StoryEvent] {
        &self.events
    }

    pub fn get(&self, index: usize) -> Option<&StoryEvent> {
        self.events.get(index)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn last(&self) -> Option<&StoryEvent> {
        self.events.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StoryEvent> {
        self.events.iter()
    }

    /// Index of the entry carrying an unresolved invitation, if any.
    pub fn open_invitation(&self) -> Option<usize> {
        self.events.iter().rposition(|e| {
            e.invitation
                .as_ref()
                .is_some_and(|inv| inv.status.is_open())
        })
    }

    /// Change the status of the invitation attached to entry `index`.
    /// Returns false if that entry carries no invitation.
    pub fn set_invitation_status(&mut self, index: usize, status: InvitationStatus) -> bool {
        match self.events.get_mut(index).and_then(|e| e.invitation.as_mut()) {
            Some(invitation) => {
                invitation.status = status;
                true
            }
            None => false,
        }
    }
}

/// The adventure the narrator runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Campaign {
    #[default]
    LostMineOfPhandelver,
    FrozenSick,
    BeginnerJourney,
    CrossroadsOfDestiny,
}

impl Campaign {
    pub const ALL: [Campaign; 4] = [
        Campaign::LostMineOfPhandelver,
        Campaign::FrozenSick,
        Campaign::BeginnerJourney,
        Campaign::CrossroadsOfDestiny,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Campaign::LostMineOfPhandelver => "lost-mine-of-phandelver",
            Campaign::FrozenSick => "frozen-sick",
            Campaign::BeginnerJourney => "beginner-journey",
            Campaign::CrossroadsOfDestiny => "crossroads-of-destiny",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Campaign::LostMineOfPhandelver => "Lost Mine of Phandelver",
            Campaign::FrozenSick => "Frozen Sick",
            Campaign::BeginnerJourney => "A Beginner's Journey",
            Campaign::CrossroadsOfDestiny => "Crossroads of Destiny",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.id() == id.trim())
    }
}

impl fmt::Display for Campaign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.title())
    }
}
