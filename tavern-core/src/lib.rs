//! Turn engine for an AI-narrated tabletop RPG companion.
//!
//! The narrator writes prose with small machine-readable markers embedded
//! in it (`DAMAGE:Elara,5`, `ITEM:[Rope] (Tag: Gear)`, ...). This crate
//! provides:
//! - The marker grammar and a single-pass extractor
//! - An effect applier that turns markers into roster and combat changes
//! - A session controller running each player turn end to end
//! - Versioned save files
//!
//! # Quick Start
//!
//! ```ignore
//! use tavern_core::{Character, NarrativeSession, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut session = NarrativeSession::from_env(SessionConfig::from_env())?;
//!     session.add_member(Character::new("Elara Swiftblade", "Elf", "Ranger", 20))?;
//!
//!     let opening = session.begin().await?;
//!     println!("{}", opening.narration);
//!
//!     let turn = session.submit("I search the cart for supplies").await?;
//!     println!("{}", turn.narration);
//!
//!     session.save("adventure.json").await?;
//!     Ok(())
//! }
//! ```

pub mod character;
pub mod combat;
pub mod directive;
pub mod effects;
pub mod extract;
pub mod narrator;
pub mod notify;
pub mod persist;
pub mod roster;
pub mod scene;
pub mod services;
pub mod session;
pub mod story;
pub mod testing;

// Primary public API
pub use character::{
    AbilityScores, Character, CharacterError, CharacterOptions, EquipSlot, InventoryItem,
    ItemSource, Status, Wallet,
};
pub use combat::{CombatPosition, CombatState, Combatant, CombatantKind};
pub use directive::{Directive, DirectiveKind};
pub use effects::Effect;
pub use extract::{extract, Extraction};
pub use narrator::{ClaudeNarrator, Narrator, NarratorError};
pub use notify::Notification;
pub use persist::{PersistError, SavedGameState};
pub use roster::{Roster, RosterError};
pub use scene::{HttpSceneImager, SceneImage, SceneImager};
pub use services::{SilentSpeech, SpeechOutput, UsageRecorder, UsageTracker};
pub use session::{
    try_submit, NarrativeSession, SessionConfig, SessionError, SharedSession, TurnOutcome,
    TurnPhase,
};
pub use story::{Campaign, EventKind, Invitation, InvitationStatus, StoryEvent, StoryLog};
pub use testing::{MockNarrator, TestHarness};
