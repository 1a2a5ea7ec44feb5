//! NarrativeSession - the primary public API for a narrated adventure.
//!
//! A session owns the roster, the story log and the combat state, and runs
//! each player turn as one sequential pipeline:
//!
//! 1. passive regeneration on a working copy of the roster
//! 2. the upstream narrator call (with a timeout)
//! 3. directive extraction and application
//! 4. commit of the roster, the log lines and the cleaned narration
//!
//! Nothing is committed except the player's line and a connection-lost
//! line when the narrator call fails.

use crate::character::{
    roll_healing, Character, CharacterError, CharacterOptions, EquipSlot, ItemSource, Regeneration,
    Wallet,
};
use crate::combat::CombatState;
use crate::effects::{apply_all, Effect, EffectContext};
use crate::extract;
use crate::narrator::{
    system_prompt, ChatTurn, ClaudeNarrator, NarrationRequest, Narrator, NarratorConfig,
    NarratorError,
};
use crate::notify::{vitals_transitions, Notification};
use crate::persist::{PersistError, SavedGameState};
use crate::roster::{Roster, RosterError, MAX_PARTY_SIZE};
use crate::scene::{HttpSceneImager, SceneBoard, SceneImage, SceneImager};
use crate::services::{speech_locale, NoUsageTracking, SilentSpeech, SpeechOutput, UsageRecorder};
use crate::story::{Campaign, InvitationStatus, StoryEvent, StoryLog};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// System line logged before the opening narration.
pub const SETTING_THE_SCENE_TEXT: &str = "The Dungeon Master is setting the scene...";

/// System line logged when the narrator call fails.
pub const CONNECTION_LOST_TEXT: &str =
    "Connection to the Dungeon Master was lost. Please try again.";

/// Message sent upstream to open the adventure.
pub const BEGIN_MESSAGE: &str = "Begin the adventure.";

/// Errors from NarrativeSession operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Narrator error: {0}")]
    Narrator(#[from] NarratorError),

    #[error("Narrator did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Save error: {0}")]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Roster(#[from] RosterError),

    #[error(transparent)]
    Character(#[from] CharacterError),

    #[error("A turn is already in progress")]
    TurnInProgress,

    #[error("The game is over")]
    GameOver,

    #[error("Input is empty")]
    EmptyInput,

    #[error("The party is empty")]
    NoParty,

    #[error("The adventure has already begun")]
    AlreadyStarted,

    #[error("No pending invitation at log entry {0}")]
    NoInvitation(usize),
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a narrative session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub campaign: Campaign,

    /// Model for the narrator; the client default when `None`.
    pub model: Option<String>,

    pub max_tokens: usize,
    pub temperature: Option<f32>,

    /// Upper bound on one narrator call. Exceeding it fails the turn.
    pub timeout: Duration,

    pub max_party_size: usize,

    /// Turns a hurt, strong character waits before regenerating 1 HP.
    pub regen_threshold: u32,

    /// Never let an older scene image replace a newer one.
    pub discard_stale_scenes: bool,

    pub speech_enabled: bool,

    /// Narration language code, e.g. `en` or `id`.
    pub language: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Campaign::default())
    }
}

impl SessionConfig {
    pub fn new(campaign: Campaign) -> Self {
        Self {
            campaign,
            model: None,
            max_tokens: 2048,
            temperature: Some(0.8),
            timeout: Duration::from_secs(60),
            max_party_size: MAX_PARTY_SIZE,
            regen_threshold: 3,
            discard_stale_scenes: false,
            speech_enabled: false,
            language: "en".to_string(),
        }
    }

    /// Default configuration overridden by `TAVERN_MODEL`,
    /// `TAVERN_MAX_TOKENS`, `TAVERN_TIMEOUT_SECS` and `TAVERN_CAMPAIGN`.
    /// Unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(model) = std::env::var("TAVERN_MODEL") {
            config = config.with_model(model);
        }
        if let Some(tokens) = env_parse::<usize>("TAVERN_MAX_TOKENS") {
            config = config.with_max_tokens(tokens);
        }
        if let Some(secs) = env_parse::<u64>("TAVERN_TIMEOUT_SECS") {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(campaign) = std::env::var("TAVERN_CAMPAIGN")
            .ok()
            .and_then(|id| Campaign::from_id(&id))
        {
            config = config.with_campaign(campaign);
        }
        config
    }

    pub fn with_campaign(mut self, campaign: Campaign) -> Self {
        self.campaign = campaign;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_party_size(mut self, size: usize) -> Self {
        self.max_party_size = size;
        self
    }

    pub fn with_regen_threshold(mut self, turns: u32) -> Self {
        self.regen_threshold = turns;
        self
    }

    pub fn with_discard_stale_scenes(mut self, discard: bool) -> Self {
        self.discard_stale_scenes = discard;
        self
    }

    pub fn with_speech(mut self, enabled: bool) -> Self {
        self.speech_enabled = enabled;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn narrator_config(&self) -> NarratorConfig {
        NarratorConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}

// ============================================================================
// Turn results
// ============================================================================

/// Where the session is in the turn cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    AwaitingInput,
    Sending,
    Receiving,
    ApplyingDirectives,
    /// Every party member is down; input is rejected from here on.
    GameOver,
}

/// What one completed turn did.
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    /// The narration with every directive removed.
    pub narration: String,

    /// One entry per applied directive, in text order.
    pub effects: Vec<Effect>,

    /// Transient notices for the front end; not in the log.
    pub notifications: Vec<Notification>,

    /// Log entries appended by this turn, in order.
    pub events: Vec<StoryEvent>,
}

impl TurnOutcome {
    pub fn is_game_over(&self) -> bool {
        self.notifications.iter().any(Notification::is_game_over)
    }
}

struct TurnInput {
    text: String,
    log_player: bool,
    regenerate: bool,
}

// ============================================================================
// Session
// ============================================================================

/// A narrated adventure.
///
/// All mutating operations take `&mut self`, so two turns can never run at
/// once against the same session. Front ends that share a session across
/// tasks wrap it in a [`SharedSession`] and use [`try_submit`].
pub struct NarrativeSession {
    config: SessionConfig,
    narrator: Arc<dyn Narrator>,
    imager: Option<Arc<dyn SceneImager>>,
    usage: Arc<dyn UsageRecorder>,
    speech: Arc<dyn SpeechOutput>,
    scenes: SceneBoard,
    roster: Roster,
    log: StoryLog,
    combat: CombatState,
    history: Vec<ChatTurn>,
    active: usize,
    phase: TurnPhase,
    rng: StdRng,
}

impl NarrativeSession {
    /// Create a session with an empty party.
    pub fn new(config: SessionConfig, narrator: Arc<dyn Narrator>) -> Self {
        Self {
            roster: Roster::new(config.max_party_size),
            scenes: SceneBoard::new(config.discard_stale_scenes),
            config,
            narrator,
            imager: None,
            usage: Arc::new(NoUsageTracking),
            speech: Arc::new(SilentSpeech),
            log: StoryLog::new(),
            combat: CombatState::default(),
            history: Vec::new(),
            active: 0,
            phase: TurnPhase::AwaitingInput,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a session narrated by Claude.
    ///
    /// Requires the `ANTHROPIC_API_KEY` environment variable. Scene images
    /// are enabled when `TAVERN_IMAGE_ENDPOINT` is set.
    pub fn from_env(config: SessionConfig) -> Result<Self, SessionError> {
        let narrator = ClaudeNarrator::from_env()?.with_config(config.narrator_config());
        let mut session = Self::new(config, Arc::new(narrator));
        if let Some(imager) = HttpSceneImager::from_env() {
            session = session.with_scene_imager(Arc::new(imager));
        }
        Ok(session)
    }

    pub fn with_scene_imager(mut self, imager: Arc<dyn SceneImager>) -> Self {
        self.imager = Some(imager);
        self
    }

    pub fn with_usage_recorder(mut self, usage: Arc<dyn UsageRecorder>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechOutput>) -> Self {
        self.speech = speech;
        self
    }

    /// Seed the generator used for healing rolls and joiner details.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn campaign(&self) -> Campaign {
        self.config.campaign
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn log(&self) -> &StoryLog {
        &self.log
    }

    pub fn combat(&self) -> &CombatState {
        &self.combat
    }

    pub fn in_combat(&self) -> bool {
        self.combat.in_combat()
    }

    /// The conversation the narrator has seen so far.
    pub fn history(&self) -> &[ChatTurn] {
        &self.history
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == TurnPhase::GameOver
    }

    /// The character whose actions the player is narrating.
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_character(&self) -> Option<&Character> {
        self.roster.get(self.active)
    }

    pub fn scene(&self) -> Option<SceneImage> {
        self.scenes.current()
    }

    pub fn is_generating_scene(&self) -> bool {
        self.scenes.is_generating()
    }

    pub fn set_speech_enabled(&mut self, enabled: bool) {
        self.config.speech_enabled = enabled;
        if !enabled {
            self.speech.stop();
        }
    }

    // ------------------------------------------------------------------------
    // Turns
    // ------------------------------------------------------------------------

    /// Open the adventure: log the scene-setting line and ask the narrator
    /// for the opening on behalf of the protagonist.
    pub async fn begin(&mut self) -> Result<TurnOutcome, SessionError> {
        if !self.log.is_empty() {
            return Err(SessionError::AlreadyStarted);
        }
        if self.roster.is_empty() {
            return Err(SessionError::NoParty);
        }

        self.active = self.roster.main_index();
        self.log.push(StoryEvent::system(SETTING_THE_SCENE_TEXT));
        info!(campaign = %self.config.campaign, "Beginning adventure");

        self.run_turn(TurnInput {
            text: BEGIN_MESSAGE.to_string(),
            log_player: false,
            regenerate: false,
        })
        .await
    }

    /// Run one player turn.
    pub async fn submit(&mut self, input: &str) -> Result<TurnOutcome, SessionError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(SessionError::EmptyInput);
        }
        self.ensure_playable()?;

        self.run_turn(TurnInput {
            text: text.to_string(),
            log_player: true,
            regenerate: true,
        })
        .await
    }

    fn ensure_playable(&self) -> Result<(), SessionError> {
        if self.phase == TurnPhase::GameOver {
            return Err(SessionError::GameOver);
        }
        if self.roster.is_empty() {
            return Err(SessionError::NoParty);
        }
        Ok(())
    }

    async fn run_turn(&mut self, input: TurnInput) -> Result<TurnOutcome, SessionError> {
        self.speech.stop();
        self.phase = TurnPhase::Sending;

        let hp_before = self.roster.hp_snapshot();
        let mut roster = self.roster.clone();
        let mut events = Vec::new();
        if input.log_player {
            events.push(StoryEvent::player(&input.text));
        }
        if input.regenerate {
            events.extend(regenerate(&mut roster, self.config.regen_threshold));
        }

        let request = NarrationRequest {
            system: system_prompt(self.config.campaign, &roster, &self.config.language),
            history: self.history.clone(),
            input: input.text.clone(),
        };
        debug!(phase = ?self.phase, history = request.history.len(), "Calling narrator");
        self.usage.record_call();

        let limit = self.config.timeout;
        let response = tokio::time::timeout(limit, self.narrator.narrate(request)).await;
        let raw = match response {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(self.fail_turn(input, e.into())),
            Err(_) => return Err(self.fail_turn(input, SessionError::Timeout(limit))),
        };

        self.phase = TurnPhase::Receiving;
        let (extraction, narration) = extract::process(&raw);
        debug!(directives = extraction.len(), "Narration received");

        // Combat transitions are judged on the raw text.
        let mut notifications = Vec::new();
        let mut in_combat = self.combat.in_combat();
        if extraction.signals_combat_start() && !in_combat {
            notifications.push(Notification::CombatStarted);
            in_combat = true;
        }
        if extraction.signals_combat_end() && in_combat {
            notifications.push(Notification::CombatEnded);
        }

        self.phase = TurnPhase::ApplyingDirectives;
        let mut ctx = EffectContext {
            roster: &mut roster,
            combat: &mut self.combat,
            acting: self.active,
            invitation_open: self.log.open_invitation().is_some(),
        };
        let effects = apply_all(extraction.directives.iter().map(|d| &d.directive), &mut ctx);

        let mut invitation = None;
        for effect in &effects {
            events.extend(effect.log_entry());
            match effect {
                Effect::SceneRequested { description } => self.request_scene(description),
                Effect::QuestCompleted { quest } => notifications.push(Notification::Victory {
                    quest: quest.clone(),
                }),
                Effect::InvitationOffered(offer) => invitation = Some(offer.clone()),
                _ => {}
            }
        }
        notifications.extend(vitals_transitions(&hp_before, &roster));

        if !narration.is_empty() || invitation.is_some() {
            let mut entry = StoryEvent::narrator(&narration);
            entry.invitation = invitation;
            events.push(entry);
        }

        self.roster = roster;
        self.log.extend(events.iter().cloned());
        self.history.push(ChatTurn::player(input.text));
        self.history.push(ChatTurn::narrator(raw));

        if self.config.speech_enabled && !narration.is_empty() {
            self.speech
                .speak(&narration, speech_locale(&self.config.language));
        }

        let outcome = TurnOutcome {
            narration,
            effects,
            notifications,
            events,
        };
        self.phase = if outcome.is_game_over() {
            info!("The whole party is down");
            TurnPhase::GameOver
        } else {
            TurnPhase::AwaitingInput
        };
        info!(
            effects = outcome.effects.len(),
            notifications = outcome.notifications.len(),
            "Turn complete"
        );
        Ok(outcome)
    }

    /// Commit only the player's line and the connection-lost line.
    fn fail_turn(&mut self, input: TurnInput, error: SessionError) -> SessionError {
        warn!(error = %error, "Narrator call failed");
        if input.log_player {
            self.log.push(StoryEvent::player(input.text));
        }
        self.log.push(StoryEvent::system(CONNECTION_LOST_TEXT));
        self.phase = TurnPhase::AwaitingInput;
        error
    }

    fn request_scene(&self, description: &str) {
        match &self.imager {
            Some(imager) => {
                self.scenes
                    .request(Arc::clone(imager), Arc::clone(&self.usage), description);
            }
            None => debug!("No scene imager configured"),
        }
    }

    // ------------------------------------------------------------------------
    // Invitations
    // ------------------------------------------------------------------------

    fn pending_invitation_name(&self, event_index: usize) -> Result<String, SessionError> {
        self.log
            .get(event_index)
            .and_then(|e| e.invitation.as_ref())
            .filter(|inv| inv.status == InvitationStatus::Pending)
            .map(|inv| inv.name.clone())
            .ok_or(SessionError::NoInvitation(event_index))
    }

    /// Accept the invitation on log entry `event_index`: build the joiner,
    /// add them to the party and tell the narrator.
    pub async fn accept_invitation(
        &mut self,
        event_index: usize,
    ) -> Result<TurnOutcome, SessionError> {
        self.ensure_playable()?;
        self.pending_invitation_name(event_index)?;
        self.speech.stop();
        self.log
            .set_invitation_status(event_index, InvitationStatus::Generating);

        let joined = self
            .log
            .get(event_index)
            .and_then(|e| e.invitation.clone())
            .ok_or(SessionError::NoInvitation(event_index))
            .and_then(|invitation| {
                let options = invitation.character_options(&mut self.rng);
                Ok(Character::from_options(options)?)
            })
            .and_then(|joiner| {
                let name = joiner.name.clone();
                self.roster.push(joiner)?;
                Ok(name)
            });

        let name = match joined {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Could not add invited character");
                self.log
                    .set_invitation_status(event_index, InvitationStatus::Error);
                return Err(e);
            }
        };
        self.log
            .set_invitation_status(event_index, InvitationStatus::Accepted);
        info!(%name, "Invitation accepted");

        self.submit(&format!("(I have accepted. {name} joins the party.)"))
            .await
    }

    /// Decline the invitation on log entry `event_index` and tell the
    /// narrator.
    pub async fn decline_invitation(
        &mut self,
        event_index: usize,
    ) -> Result<TurnOutcome, SessionError> {
        self.ensure_playable()?;
        let name = self.pending_invitation_name(event_index)?;
        self.speech.stop();
        self.log
            .set_invitation_status(event_index, InvitationStatus::Declined);
        info!(%name, "Invitation declined");

        self.submit(&format!("(I have declined the invitation for {name} to join.)"))
            .await
    }

    // ------------------------------------------------------------------------
    // Items
    // ------------------------------------------------------------------------

    /// Use a healing item from a member's inventory.
    ///
    /// Returns `Ok(None)` when the item does not heal or the member is
    /// already at full health; nothing changes in that case. Otherwise the
    /// item is consumed, the healing is logged and the narrator is told.
    pub async fn use_item(
        &mut self,
        character: usize,
        inventory_index: usize,
    ) -> Result<Option<TurnOutcome>, SessionError> {
        self.ensure_playable()?;
        let member = self
            .roster
            .get(character)
            .ok_or(RosterError::NoSuchMember(character))?;
        let item = member
            .inventory
            .get(inventory_index)
            .cloned()
            .ok_or(CharacterError::NoSuchItem {
                index: inventory_index,
                len: member.inventory.len(),
            })?;
        let name = member.name.clone();

        let amount = roll_healing(&item, &mut self.rng);
        if amount <= 0 {
            debug!(item = %item.name, "Item has no use effect");
            return Ok(None);
        }

        let hp_before = self.roster.hp_snapshot();
        let healed = self.roster.update(character, |c| {
            let healed = c.heal(amount);
            if healed > 0 {
                c.inventory.remove(inventory_index);
            }
            Ok(healed)
        })?;
        if healed == 0 {
            return Ok(None);
        }

        let revived = vitals_transitions(&hp_before, &self.roster);
        self.log.push(StoryEvent::game_event(format!(
            "{name} used {} and recovered {healed} HP.",
            item.name
        )));
        info!(%name, item = %item.name, healed, "Item used");

        let mut outcome = self
            .submit(&format!("(I use a {} and recover {healed} HP.)", item.name))
            .await?;
        let mut notifications = revived;
        notifications.append(&mut outcome.notifications);
        outcome.notifications = notifications;
        Ok(Some(outcome))
    }

    pub fn equip(
        &mut self,
        character: usize,
        inventory_index: usize,
        slot: EquipSlot,
    ) -> Result<(), SessionError> {
        self.roster
            .update(character, |c| Ok(c.equip(inventory_index, slot)?))?;
        Ok(())
    }

    pub fn unequip(&mut self, character: usize, slot: EquipSlot) -> Result<(), SessionError> {
        self.roster.update(character, |c| Ok(c.unequip(slot)?))?;
        Ok(())
    }

    /// Give an item to another member and log it.
    pub fn transfer_item(
        &mut self,
        from: usize,
        source: ItemSource,
        to: usize,
    ) -> Result<(), SessionError> {
        let item = self.roster.transfer_item(from, source, to)?;
        let source_name = self.roster.get(from).map(|c| c.name.clone()).unwrap_or_default();
        let dest_name = self.roster.get(to).map(|c| c.name.clone()).unwrap_or_default();
        self.log.push(StoryEvent::game_event(format!(
            "{} was transferred from {source_name} to {dest_name}.",
            item.name
        )));
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Party management
    // ------------------------------------------------------------------------

    pub fn add_member(&mut self, character: Character) -> Result<usize, SessionError> {
        let index = self.roster.push(character)?;
        info!(index, "Party member added");
        Ok(index)
    }

    /// Validate creation options and add the resulting character.
    pub fn create_member(&mut self, options: CharacterOptions) -> Result<usize, SessionError> {
        let character = Character::from_options(options)?;
        self.add_member(character)
    }

    pub fn remove_member(&mut self, index: usize) -> Result<Character, SessionError> {
        let removed = self.roster.remove(index)?;
        if self.active == index {
            self.active = self.roster.main_index();
        } else if self.active > index {
            self.active -= 1;
        }
        if self.active >= self.roster.len() {
            self.active = self.roster.main_index();
        }
        Ok(removed)
    }

    pub fn set_active(&mut self, index: usize) -> Result<(), SessionError> {
        if self.roster.get(index).is_none() {
            return Err(RosterError::NoSuchMember(index).into());
        }
        self.active = index;
        Ok(())
    }

    /// Make `index` the protagonist; it moves to the front of the party.
    pub fn confirm_protagonist(&mut self, index: usize) -> Result<(), SessionError> {
        self.roster.confirm_protagonist(index)?;
        self.active = 0;
        Ok(())
    }

    pub fn set_notes(&mut self, index: usize, notes: impl Into<String>) -> Result<(), SessionError> {
        let notes = notes.into();
        self.roster.update(index, move |c| {
            c.notes = notes;
            Ok(())
        })?;
        Ok(())
    }

    pub fn set_wallet(&mut self, index: usize, wallet: Wallet) -> Result<(), SessionError> {
        self.roster.update(index, |c| {
            c.currency = wallet;
            Ok(())
        })?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    pub fn to_saved(&self) -> SavedGameState {
        SavedGameState::new(&self.roster, &self.log, self.config.campaign)
    }

    /// Replace the session state with a saved game. Nothing changes if the
    /// save is invalid.
    pub fn restore(&mut self, saved: SavedGameState) -> Result<(), SessionError> {
        let roster = saved.roster(self.config.max_party_size)?;

        self.history = ChatTurn::history_from_log(&saved.story_log);
        self.log = saved.story_log;
        self.config.campaign = saved.campaign;
        self.active = roster.main_index();
        self.roster = roster;
        self.combat = CombatState::default();
        self.phase = if self.roster.all_down() {
            TurnPhase::GameOver
        } else {
            TurnPhase::AwaitingInput
        };
        info!(
            members = self.roster.len(),
            events = self.log.len(),
            "Session restored"
        );
        Ok(())
    }

    pub async fn save(&self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        self.to_saved().save_json(path).await?;
        Ok(())
    }

    pub async fn load(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
        let saved = SavedGameState::load_json(path).await?;
        self.restore(saved)
    }
}

/// Count one turn of passive regeneration for every member, returning the
/// log lines for members who healed.
fn regenerate(roster: &mut Roster, threshold: u32) -> Vec<StoryEvent> {
    let mut events = Vec::new();
    for index in 0..roster.len() {
        let result = roster.update(index, |c| Ok(c.advance_regeneration(threshold)));
        if let (Ok(Regeneration::Healed), Some(member)) = (result, roster.get(index)) {
            debug!(name = %member.name, "Regenerated");
            events.push(StoryEvent::game_event(format!(
                "{} regenerated 1 HP.",
                member.name
            )));
        }
    }
    events
}

// ============================================================================
// Shared sessions
// ============================================================================

/// A session shared between tasks.
pub type SharedSession = Arc<Mutex<NarrativeSession>>;

/// Submit a turn, rejecting it if another task holds the session.
pub async fn try_submit(session: &SharedSession, input: &str) -> Result<TurnOutcome, SessionError> {
    let mut guard = session
        .try_lock()
        .map_err(|_| SessionError::TurnInProgress)?;
    guard.submit(input).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::InventoryItem;
    use crate::testing::MockNarrator;

    fn session_with(responses: &[&str]) -> NarrativeSession {
        let narrator = MockNarrator::new(responses.iter().copied());
        let mut session =
            NarrativeSession::new(SessionConfig::default(), Arc::new(narrator)).with_seed(7);
        session
            .add_member(Character::new("Elara Swiftblade", "Elf", "Ranger", 10))
            .unwrap();
        session
    }

    #[test]
    fn test_config_builder() {
        let config = SessionConfig::new(Campaign::FrozenSick)
            .with_model("claude-test")
            .with_timeout(Duration::from_secs(5))
            .with_max_party_size(3)
            .with_language("id");
        assert_eq!(config.campaign, Campaign::FrozenSick);
        assert_eq!(config.narrator_config().model.as_deref(), Some("claude-test"));
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.max_party_size, 3);
        assert_eq!(config.regen_threshold, 3);
        assert!(!config.discard_stale_scenes);
    }

    #[tokio::test]
    async fn test_begin_logs_scene_setting_without_player_entry() {
        let mut session = session_with(&["You stand at the gates of Phandalin."]);
        let outcome = session.begin().await.unwrap();

        let kinds: Vec<_> = session.log().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![crate::story::EventKind::System, crate::story::EventKind::Narrator]
        );
        assert_eq!(outcome.narration, "You stand at the gates of Phandalin.");
        assert!(matches!(session.begin().await, Err(SessionError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_submit_rejects_empty_input() {
        let mut session = session_with(&[]);
        assert!(matches!(session.submit("   ").await, Err(SessionError::EmptyInput)));
        assert!(session.log().is_empty());
    }

    #[tokio::test]
    async fn test_use_item_heals_and_consumes() {
        let mut session = session_with(&["You feel better."]);
        session
            .roster
            .update(0, |c| {
                c.set_hp(2);
                c.inventory.push(InventoryItem::tagged("Healer's Kit", "Consumable"));
                Ok(())
            })
            .unwrap();

        let outcome = session.use_item(0, 0).await.unwrap().unwrap();
        assert_eq!(session.roster().get(0).unwrap().current_hp(), 10);
        assert!(session.roster().get(0).unwrap().inventory.is_empty());
        assert!(session
            .log()
            .iter()
            .any(|e| e.text == "Elara Swiftblade used Healer's Kit and recovered 8 HP."));
        assert!(session
            .log()
            .iter()
            .any(|e| e.text == "(I use a Healer's Kit and recover 8 HP.)"));
        assert_eq!(outcome.narration, "You feel better.");
    }

    #[tokio::test]
    async fn test_use_item_at_full_health_is_noop() {
        let mut session = session_with(&[]);
        session
            .roster
            .update(0, |c| {
                c.inventory.push(InventoryItem::new("Potion of Healing"));
                c.inventory.push(InventoryItem::new("Rope"));
                Ok(())
            })
            .unwrap();

        assert!(session.use_item(0, 0).await.unwrap().is_none());
        assert!(session.use_item(0, 1).await.unwrap().is_none());
        assert_eq!(session.roster().get(0).unwrap().inventory.len(), 2);
        assert!(session.log().is_empty());
    }

    #[test]
    fn test_remove_member_keeps_active_valid() {
        let mut session = session_with(&[]);
        session
            .add_member(Character::new("Borin", "Dwarf", "Cleric", 12))
            .unwrap();
        session
            .add_member(Character::new("Lyra", "Elf", "Bard", 9))
            .unwrap();
        session.set_active(2).unwrap();

        session.remove_member(1).unwrap();
        assert_eq!(session.active_character().unwrap().name, "Lyra");

        session.remove_member(1).unwrap();
        assert_eq!(session.active_index(), 0);
        assert!(session.set_active(4).is_err());
    }

    #[tokio::test]
    async fn test_try_submit_rejects_while_locked() {
        let shared: SharedSession = Arc::new(Mutex::new(session_with(&["ok"])));
        let guard = shared.lock().await;
        assert!(matches!(
            try_submit(&shared, "hello").await,
            Err(SessionError::TurnInProgress)
        ));
        drop(guard);
        assert!(try_submit(&shared, "hello").await.is_ok());
    }
}
