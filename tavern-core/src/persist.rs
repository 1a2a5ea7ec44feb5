//! Save files.
//!
//! A save is one JSON document holding the roster, the story log, the
//! protagonist index and the campaign. Loading is all-or-nothing: the
//! version and required fields are checked before anything is decoded, and
//! every character is normalized before the state is handed back.

use crate::character::Character;
use crate::roster::{Roster, RosterError};
use crate::story::{Campaign, StoryLog};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::fs;
use tracing::info;

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid save format: expected a JSON object")]
    InvalidFormat,

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: String, found: String },

    #[error("Missing required field `{0}`")]
    MissingField(&'static str),

    #[error("Invalid party: {0}")]
    Roster(#[from] RosterError),
}

/// Current save file version.
pub const SAVE_VERSION: &str = "1.0";

/// Everything needed to resume a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedGameState {
    pub version: String,
    pub characters: Vec<Character>,
    pub story_log: StoryLog,
    pub main_character_index: usize,
    #[serde(default)]
    pub campaign: Campaign,
}

impl SavedGameState {
    pub fn new(roster: &Roster, story_log: &StoryLog, campaign: Campaign) -> Self {
        Self {
            version: SAVE_VERSION.to_string(),
            characters: roster.members().to_vec(),
            story_log: story_log.clone(),
            main_character_index: roster.main_index(),
            campaign,
        }
    }

    pub fn to_json(&self) -> Result<String, PersistError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a save document.
    pub fn from_json(content: &str) -> Result<Self, PersistError> {
        let value: Value = serde_json::from_str(content)?;
        let object = value.as_object().ok_or(PersistError::InvalidFormat)?;

        let found = object
            .get("version")
            .ok_or(PersistError::MissingField("version"))?;
        if found.as_str() != Some(SAVE_VERSION) {
            return Err(PersistError::VersionMismatch {
                expected: SAVE_VERSION.to_string(),
                found: found.as_str().map_or_else(|| found.to_string(), str::to_string),
            });
        }
        for field in ["characters", "storyLog", "mainCharacterIndex"] {
            if object.get(field).map_or(true, Value::is_null) {
                return Err(PersistError::MissingField(field));
            }
        }

        let mut saved: Self = serde_json::from_value(value)?;
        for character in &mut saved.characters {
            character.normalize();
        }
        Ok(saved)
    }

    /// The saved party as a roster capped at `max_size`.
    pub fn roster(&self, max_size: usize) -> Result<Roster, PersistError> {
        Ok(Roster::from_members(
            self.characters.clone(),
            self.main_character_index,
            max_size,
        )?)
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let path = path.as_ref();
        fs::write(path, self.to_json()?).await?;
        info!(path = %path.display(), events = self.story_log.len(), "Game saved");
        Ok(())
    }

    /// Load from a JSON file.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await?;
        let saved = Self::from_json(&content)?;
        info!(path = %path.display(), characters = saved.characters.len(), "Game loaded");
        Ok(saved)
    }

    /// Read only the version of a save file.
    pub async fn peek_version(path: impl AsRef<Path>) -> Result<String, PersistError> {
        #[derive(Deserialize)]
        struct Partial {
            version: String,
        }

        let content = fs::read_to_string(path).await?;
        let partial: Partial = serde_json::from_str(&content)?;
        Ok(partial.version)
    }
}

/// Save files with the current version in `dir`, newest name first.
pub async fn list_saves(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, PersistError> {
    let mut saves = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "json")
            && SavedGameState::peek_version(&path)
                .await
                .is_ok_and(|v| v == SAVE_VERSION)
        {
            saves.push(path);
        }
    }

    saves.sort_by(|a, b| b.cmp(a));
    Ok(saves)
}

/// A fresh save file path in `dir`, stamped with the current time.
pub fn save_path(dir: impl AsRef<Path>) -> PathBuf {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    dir.as_ref().join(format!("tavern_save_{stamp}.json"))
}

// ============================================================================
// Single characters
// ============================================================================

/// File name for an exported character: whitespace becomes underscores.
pub fn character_file_name(name: &str) -> String {
    let sanitized: String = name
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '\''))
        .collect();
    if sanitized.is_empty() {
        "character.json".to_string()
    } else {
        format!("{sanitized}.json")
    }
}

pub fn export_character(character: &Character) -> Result<String, PersistError> {
    Ok(serde_json::to_string_pretty(character)?)
}

/// Parse an exported character, upgrading files from earlier versions.
///
/// Race, class and ability scores are required. A missing inventory becomes
/// empty, missing equipment slots become empty, bare-string inventory items
/// become records, and a missing current HP means full health.
pub fn import_character(content: &str) -> Result<Character, PersistError> {
    let mut value: Value = serde_json::from_str(content)?;
    let object = value.as_object_mut().ok_or(PersistError::InvalidFormat)?;

    for field in ["race", "characterClass", "stats", "maxHp"] {
        if object.get(field).map_or(true, Value::is_null) {
            return Err(PersistError::MissingField(field));
        }
    }
    object.entry("name").or_insert_with(|| Value::String(String::new()));
    if object.get("currentHp").map_or(true, Value::is_null) {
        let max = object["maxHp"].clone();
        object.insert("currentHp".to_string(), max);
    }
    for field in ["inventory", "mainWeapon", "armor", "currency"] {
        if object.get(field).is_some_and(Value::is_null) {
            object.remove(field);
        }
    }

    let mut character: Character = serde_json::from_value(value)?;
    character.normalize();
    Ok(character)
}

pub async fn save_character(
    character: &Character,
    path: impl AsRef<Path>,
) -> Result<(), PersistError> {
    fs::write(path, export_character(character)?).await?;
    Ok(())
}

pub async fn load_character(path: impl AsRef<Path>) -> Result<Character, PersistError> {
    let content = fs::read_to_string(path).await?;
    import_character(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::{EquipSlot, InventoryItem, Status};
    use crate::story::StoryEvent;

    fn sample_state() -> SavedGameState {
        let mut roster = Roster::default();
        roster.push(Character::new("Elara Swiftblade", "Elf", "Ranger", 12)).unwrap();
        roster.push(Character::new("Borin", "Dwarf", "Cleric", 14)).unwrap();
        let mut log = StoryLog::new();
        log.push(StoryEvent::narrator("You arrive at Phandalin."));
        SavedGameState::new(&roster, &log, Campaign::FrozenSick)
    }

    #[test]
    fn test_wire_format_is_camel_case() {
        let json: Value = serde_json::from_str(&sample_state().to_json().unwrap()).unwrap();
        assert_eq!(json["version"], "1.0");
        assert_eq!(json["mainCharacterIndex"], 0);
        assert_eq!(json["campaign"], "frozen-sick");
        assert_eq!(json["storyLog"][0]["type"], "dm");
        assert_eq!(json["characters"][0]["characterClass"], "Ranger");
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut json: Value = serde_json::to_value(sample_state()).unwrap();
        json["version"] = "0.9".into();
        let err = SavedGameState::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(
            err,
            PersistError::VersionMismatch { ref found, .. } if found == "0.9"
        ));
    }

    #[test]
    fn test_missing_fields_rejected() {
        for field in ["version", "characters", "storyLog", "mainCharacterIndex"] {
            let mut json: Value = serde_json::to_value(sample_state()).unwrap();
            json.as_object_mut().unwrap().remove(field);
            let err = SavedGameState::from_json(&json.to_string()).unwrap_err();
            assert!(
                matches!(err, PersistError::MissingField(f) if f == field),
                "{field}: {err}"
            );
        }
    }

    #[test]
    fn test_bad_main_index_rejected() {
        let mut state = sample_state();
        state.main_character_index = 7;
        assert!(matches!(state.roster(5), Err(PersistError::Roster(_))));
    }

    #[test]
    fn test_loaded_characters_are_normalized() {
        let mut json: Value = serde_json::to_value(sample_state()).unwrap();
        json["characters"][0]["currentHp"] = 99.into();
        let state = SavedGameState::from_json(&json.to_string()).unwrap();
        assert_eq!(state.characters[0].current_hp(), 12);

        json["characters"][0]["currentHp"] = (-4).into();
        let state = SavedGameState::from_json(&json.to_string()).unwrap();
        assert_eq!(state.characters[0].current_hp(), 0);
        assert_eq!(state.characters[0].status(), Status::Downed);
    }

    #[test]
    fn test_import_legacy_character() {
        let legacy = r#"{
            "name": "Old Tom",
            "race": "Human",
            "characterClass": "Fighter",
            "stats": {"strength": 14, "dexterity": 12, "constitution": 13,
                      "intelligence": 10, "wisdom": 10, "charisma": 8},
            "maxHp": 20,
            "inventory": ["Rope", "Torch"],
            "mainWeapon": null
        }"#;
        let tom = import_character(legacy).unwrap();
        assert_eq!(tom.current_hp(), 20);
        assert_eq!(tom.inventory, vec![InventoryItem::new("Rope"), InventoryItem::new("Torch")]);
        assert!(tom.equipped(EquipSlot::Weapon).is_none());
        assert!(tom.equipped(EquipSlot::Armor).is_none());
        assert_eq!(tom.status(), Status::Alive);
    }

    #[test]
    fn test_import_requires_core_fields() {
        let err = import_character(r#"{"name": "Nobody", "race": "Elf"}"#).unwrap_err();
        assert!(matches!(err, PersistError::MissingField("characterClass")));
    }

    #[test]
    fn test_character_file_name() {
        assert_eq!(character_file_name("Elara Swiftblade"), "Elara_Swiftblade.json");
        assert_eq!(character_file_name("../../etc"), "etc.json");
        assert_eq!(character_file_name("  "), "character.json");
    }

    #[tokio::test]
    async fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_path(dir.path());
        let state = sample_state();

        state.save_json(&path).await.unwrap();
        assert_eq!(SavedGameState::peek_version(&path).await.unwrap(), SAVE_VERSION);
        assert_eq!(SavedGameState::load_json(&path).await.unwrap(), state);
        assert_eq!(list_saves(dir.path()).await.unwrap(), vec![path]);
    }
}
