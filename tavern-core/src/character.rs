//! Party member types.
//!
//! A [`Character`] owns its vitals, wallet, inventory and the two equipment
//! slots. HP and status are private so every change goes through
//! [`Character::set_hp`], which clamps to `[0, max_hp]` and re-derives the
//! alive/downed status.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors from character construction and item handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CharacterError {
    #[error("Invalid character options: {0}")]
    InvalidOptions(String),

    #[error("No inventory item at index {index} (inventory holds {len})")]
    NoSuchItem { index: usize, len: usize },

    #[error("Nothing equipped in the {0} slot")]
    EmptySlot(EquipSlot),
}

// ============================================================================
// Reference Data
// ============================================================================

pub const RACES: &[&str] = &[
    "Human", "Elf", "Dwarf", "Halfling", "Dragonborn", "Gnome", "Half-Elf", "Half-Orc", "Tiefling",
];

pub const CLASSES: &[&str] = &[
    "Barbarian", "Bard", "Cleric", "Druid", "Fighter", "Monk", "Paladin", "Ranger", "Rogue",
    "Sorcerer", "Warlock", "Wizard",
];

pub const BACKGROUNDS: &[&str] = &[
    "Acolyte", "Charlatan", "Criminal", "Entertainer", "Folk Hero", "Guild Artisan", "Hermit",
    "Noble", "Outlander", "Sage", "Sailor", "Soldier", "Urchin",
];

pub const ALIGNMENTS: &[&str] = &[
    "Lawful Good", "Neutral Good", "Chaotic Good", "Lawful Neutral", "True Neutral",
    "Chaotic Neutral", "Lawful Evil", "Neutral Evil", "Chaotic Evil",
];

/// Starting items containing one of these become the equipped weapon.
pub const WEAPON_KEYWORDS: &[&str] = &[
    "sword", "axe", "mace", "dagger", "bow", "staff", "spear", "scythe", "wand", "flail",
];

/// Starting items containing one of these become the equipped armor.
pub const ARMOR_KEYWORDS: &[&str] = &[
    "armor", "shield", "plate", "mail", "leather", "robe", "tunic", "chain",
];

/// Hit die and armor proficiencies for a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassData {
    pub hit_die: i32,
    pub armor: &'static [&'static str],
}

/// Look up class data by name, case-insensitively.
pub fn class_data(class: &str) -> Option<ClassData> {
    let data = match class.trim().to_lowercase().as_str() {
        "barbarian" => ClassData { hit_die: 12, armor: &["light", "medium", "shields"] },
        "bard" => ClassData { hit_die: 8, armor: &["light"] },
        "cleric" => ClassData { hit_die: 8, armor: &["light", "medium", "shields"] },
        "druid" => ClassData { hit_die: 8, armor: &["light", "medium", "shields (non-metal)"] },
        "fighter" => ClassData { hit_die: 10, armor: &["all", "shields"] },
        "monk" => ClassData { hit_die: 8, armor: &[] },
        "paladin" => ClassData { hit_die: 10, armor: &["all", "shields"] },
        "ranger" => ClassData { hit_die: 10, armor: &["light", "medium", "shields"] },
        "rogue" => ClassData { hit_die: 8, armor: &["light"] },
        "sorcerer" => ClassData { hit_die: 6, armor: &[] },
        "warlock" => ClassData { hit_die: 8, armor: &["light"] },
        "wizard" => ClassData { hit_die: 6, armor: &[] },
        _ => return None,
    };
    Some(data)
}

// ============================================================================
// Ability Scores
// ============================================================================

/// Total budget for point-buy generation.
pub const POINT_BUY_TOTAL: u32 = 27;

/// Total points needed to raise a score from 8 to `score`.
fn point_buy_cost(score: u8) -> Option<u32> {
    match score {
        8 => Some(0),
        9 => Some(1),
        10 => Some(2),
        11 => Some(3),
        12 => Some(4),
        13 => Some(5),
        14 => Some(7),
        15 => Some(9),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }

    /// Standard modifier: `floor((score - 10) / 2)`.
    pub fn modifier(score: u8) -> i32 {
        (score as i32 - 10).div_euclid(2)
    }

    fn all(&self) -> [u8; 6] {
        [
            self.strength,
            self.dexterity,
            self.constitution,
            self.intelligence,
            self.wisdom,
            self.charisma,
        ]
    }

    fn slot_mut(&mut self, index: usize) -> &mut u8 {
        match index {
            0 => &mut self.strength,
            1 => &mut self.dexterity,
            2 => &mut self.constitution,
            3 => &mut self.intelligence,
            4 => &mut self.wisdom,
            _ => &mut self.charisma,
        }
    }

    /// Spend the point-buy budget on random abilities, starting from all 8s.
    pub fn random_point_buy<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let mut scores = Self::new(8, 8, 8, 8, 8, 8);
        let mut points = POINT_BUY_TOTAL;
        let mut attempts = 0;

        while points > 0 && attempts < 1000 {
            attempts += 1;
            let slot = scores.slot_mut(rng.gen_range(0..6));
            let (Some(current), Some(next)) = (point_buy_cost(*slot), point_buy_cost(*slot + 1))
            else {
                continue;
            };
            let cost = next - current;
            if points >= cost {
                *slot += 1;
                points -= cost;
            }
        }

        scores
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Wallet
// ============================================================================

const CP_PER_SP: u64 = 10;
const CP_PER_GP: u64 = 100;

/// Three independent coin denominations.
///
/// Denominations never consolidate on their own; only [`Wallet::spend`]
/// re-expresses the remainder through the copper total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    #[serde(default)]
    pub gp: u32,
    #[serde(default)]
    pub sp: u32,
    #[serde(default)]
    pub cp: u32,
}

impl Wallet {
    pub fn new(gp: u32, sp: u32, cp: u32) -> Self {
        Self { gp, sp, cp }
    }

    /// Value of the wallet in the smallest denomination.
    pub fn total_copper(&self) -> u64 {
        self.gp as u64 * CP_PER_GP + self.sp as u64 * CP_PER_SP + self.cp as u64
    }

    /// Expand a copper total into gp/sp/cp with the fewest coins.
    pub fn from_copper(total: u64) -> Self {
        Self {
            gp: u32::try_from(total / CP_PER_GP).unwrap_or(u32::MAX),
            sp: ((total % CP_PER_GP) / CP_PER_SP) as u32,
            cp: (total % CP_PER_SP) as u32,
        }
    }

    /// Add coins denomination by denomination.
    pub fn deposit(&mut self, other: Wallet) {
        self.gp = self.gp.saturating_add(other.gp);
        self.sp = self.sp.saturating_add(other.sp);
        self.cp = self.cp.saturating_add(other.cp);
    }

    /// The wallet left after paying `cost`, or `None` if it cannot cover it.
    pub fn spend(&self, cost: Wallet) -> Option<Wallet> {
        let total = self.total_copper();
        let cost = cost.total_copper();
        (total >= cost).then(|| Wallet::from_copper(total - cost))
    }

    pub fn is_empty(&self) -> bool {
        self.gp == 0 && self.sp == 0 && self.cp == 0
    }
}

impl fmt::Display for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.gp > 0 {
            parts.push(format!("{} GP", self.gp));
        }
        if self.sp > 0 {
            parts.push(format!("{} SP", self.sp));
        }
        if self.cp > 0 {
            parts.push(format!("{} CP", self.cp));
        }
        if parts.is_empty() {
            write!(f, "0 CP")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

// ============================================================================
// Items & Equipment
// ============================================================================

/// An inventory entry. Duplicates are allowed; order is acquisition order.
///
/// Deserializes from either `{"name": .., "tag": ..}` or a bare string, the
/// representation older character files used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ItemRepr")]
pub struct InventoryItem {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemRepr {
    Name(String),
    Record {
        name: String,
        #[serde(default)]
        tag: Option<String>,
    },
}

impl From<ItemRepr> for InventoryItem {
    fn from(repr: ItemRepr) -> Self {
        match repr {
            ItemRepr::Name(name) => Self { name, tag: None },
            ItemRepr::Record { name, tag } => Self { name, tag },
        }
    }
}

impl InventoryItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: None,
        }
    }

    pub fn tagged(name: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tag: Some(tag.into()),
        }
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tag {
            Some(tag) => write!(f, "{} [{}]", self.name, tag),
            None => write!(f, "{}", self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EquipSlot {
    Weapon,
    Armor,
}

impl fmt::Display for EquipSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EquipSlot::Weapon => write!(f, "weapon"),
            EquipSlot::Armor => write!(f, "armor"),
        }
    }
}

/// Where an item is taken from when it leaves a character.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSource {
    Inventory(usize),
    Equipped(EquipSlot),
}

// ============================================================================
// Status
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Alive,
    Downed,
}

impl Status {
    pub fn from_hp(hp: i32) -> Self {
        if hp <= 0 {
            Status::Downed
        } else {
            Status::Alive
        }
    }
}

/// Outcome of one passive-regeneration tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regeneration {
    /// Not strong enough, downed, or already at full HP.
    Ineligible,
    /// Counter advanced to the contained value.
    Counting(u32),
    /// One HP restored and the counter reset.
    Healed,
}

// ============================================================================
// Character Options
// ============================================================================

/// Validated input for building a new party member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterOptions {
    pub name: String,
    pub race: String,
    pub class: String,
    pub gender: String,
    pub background: String,
    pub alignment: String,
    pub stats: AbilityScores,
    /// Item names from character generation, before weapon/armor selection.
    pub starting_items: Vec<String>,
    pub currency: Wallet,
}

impl CharacterOptions {
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
            background: BACKGROUNDS[0].to_string(),
            alignment: "True Neutral".to_string(),
            stats: AbilityScores::default(),
            starting_items: Vec::new(),
            currency: Wallet::default(),
        }
    }

    pub fn with_stats(mut self, stats: AbilityScores) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn with_alignment(mut self, alignment: impl Into<String>) -> Self {
        self.alignment = alignment.into();
        self
    }

    pub fn with_starting_items<I, S>(mut self, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.starting_items = items.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_currency(mut self, currency: Wallet) -> Self {
        self.currency = currency;
        self
    }

    /// Fill the unspecified parts of a character at random.
    pub fn randomize_details<R: Rng + ?Sized>(mut self, rng: &mut R) -> Self {
        if let Some(background) = BACKGROUNDS.choose(rng) {
            self.background = background.to_string();
        }
        if let Some(alignment) = ALIGNMENTS.choose(rng) {
            self.alignment = alignment.to_string();
        }
        self.stats = AbilityScores::random_point_buy(rng);
        self
    }

    /// Check the options before they reach the roster.
    pub fn validate(&self) -> Result<(), CharacterError> {
        if self.race.trim().is_empty() {
            return Err(CharacterError::InvalidOptions("race is required".into()));
        }
        if self.class.trim().is_empty() {
            return Err(CharacterError::InvalidOptions("class is required".into()));
        }
        if let Some(score) = self.stats.all().into_iter().find(|s| !(1..=30).contains(s)) {
            return Err(CharacterError::InvalidOptions(format!(
                "ability score {score} is outside 1-30"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Character
// ============================================================================

/// A party member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Character {
    pub name: String,
    pub race: String,
    #[serde(rename = "characterClass")]
    pub class: String,
    #[serde(default)]
    pub gender: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub alignment: String,
    pub stats: AbilityScores,

    max_hp: i32,
    current_hp: i32,
    #[serde(default = "default_armor_class")]
    pub armor_class: i32,
    #[serde(default)]
    status: Status,

    #[serde(default)]
    pub currency: Wallet,
    #[serde(default)]
    pub inventory: Vec<InventoryItem>,
    #[serde(default)]
    main_weapon: Option<InventoryItem>,
    #[serde(default)]
    armor: Option<InventoryItem>,

    #[serde(default)]
    pub regen_turn_counter: u32,
    #[serde(default)]
    pub notes: String,
}

fn default_armor_class() -> i32 {
    10
}

impl Character {
    /// A bare character at full health with nothing in its pockets.
    pub fn new(
        name: impl Into<String>,
        race: impl Into<String>,
        class: impl Into<String>,
        max_hp: i32,
    ) -> Self {
        let max_hp = max_hp.max(1);
        Self {
            name: name.into(),
            race: race.into(),
            class: class.into(),
            gender: String::new(),
            background: String::new(),
            alignment: String::new(),
            stats: AbilityScores::default(),
            max_hp,
            current_hp: max_hp,
            armor_class: default_armor_class(),
            status: Status::Alive,
            currency: Wallet::default(),
            inventory: Vec::new(),
            main_weapon: None,
            armor: None,
            regen_turn_counter: 0,
            notes: String::new(),
        }
    }

    /// Build a full party member from validated options.
    pub fn from_options(options: CharacterOptions) -> Result<Self, CharacterError> {
        options.validate()?;

        let con = AbilityScores::modifier(options.stats.constitution);
        let dex = AbilityScores::modifier(options.stats.dexterity);
        let max_hp = match class_data(&options.class) {
            Some(data) => data.hit_die * 2 + con,
            None => 8 + con,
        };

        let mut items = options.starting_items;
        let main_weapon = take_first_matching(&mut items, WEAPON_KEYWORDS);
        let armor = take_first_matching(&mut items, ARMOR_KEYWORDS);

        let mut inventory: Vec<InventoryItem> = items
            .into_iter()
            .map(|name| InventoryItem::tagged(name, "New"))
            .collect();
        inventory.extend(standard_issue());

        let mut character = Self::new(options.name, options.race, options.class, max_hp);
        character.gender = options.gender;
        character.background = options.background;
        character.alignment = options.alignment;
        character.stats = options.stats;
        character.armor_class = armor_class_for(&character.class, dex);
        character.currency = options.currency;
        character.inventory = inventory;
        character.main_weapon = main_weapon.map(InventoryItem::new);
        character.armor = armor.map(InventoryItem::new);
        Ok(character)
    }

    /// The first whitespace-delimited token of the name.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }

    pub fn current_hp(&self) -> i32 {
        self.current_hp
    }

    pub fn max_hp(&self) -> i32 {
        self.max_hp
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_down(&self) -> bool {
        self.current_hp <= 0
    }

    pub fn strength_modifier(&self) -> i32 {
        AbilityScores::modifier(self.stats.strength)
    }

    /// Set HP, clamped to `[0, max_hp]`, and re-derive status.
    pub fn set_hp(&mut self, hp: i32) {
        self.current_hp = hp.clamp(0, self.max_hp);
        self.status = Status::from_hp(self.current_hp);
    }

    /// Subtract damage; negative amounts are ignored. Returns the new HP.
    pub fn take_damage(&mut self, amount: i32) -> i32 {
        self.set_hp(self.current_hp.saturating_sub(amount.max(0)));
        self.current_hp
    }

    /// Restore HP up to the maximum. Returns the amount actually healed.
    pub fn heal(&mut self, amount: i32) -> i32 {
        let before = self.current_hp;
        self.set_hp(before.saturating_add(amount.max(0)));
        self.current_hp - before
    }

    /// Re-establish the HP and status invariants after deserialization.
    pub fn normalize(&mut self) {
        self.max_hp = self.max_hp.max(1);
        self.set_hp(self.current_hp);
    }

    /// Count one player turn toward passive regeneration.
    ///
    /// Characters with a strength modifier of at least +1 who are conscious
    /// but hurt heal 1 HP every `threshold` turns.
    pub fn advance_regeneration(&mut self, threshold: u32) -> Regeneration {
        if self.strength_modifier() < 1 || self.is_down() || self.current_hp >= self.max_hp {
            return Regeneration::Ineligible;
        }

        self.regen_turn_counter += 1;
        if self.regen_turn_counter >= threshold {
            self.regen_turn_counter = 0;
            self.heal(1);
            Regeneration::Healed
        } else {
            Regeneration::Counting(self.regen_turn_counter)
        }
    }

    pub fn equipped(&self, slot: EquipSlot) -> Option<&InventoryItem> {
        match slot {
            EquipSlot::Weapon => self.main_weapon.as_ref(),
            EquipSlot::Armor => self.armor.as_ref(),
        }
    }

    fn slot_mut(&mut self, slot: EquipSlot) -> &mut Option<InventoryItem> {
        match slot {
            EquipSlot::Weapon => &mut self.main_weapon,
            EquipSlot::Armor => &mut self.armor,
        }
    }

    /// Move an inventory item into a slot. Whatever the slot held goes back
    /// to the end of the inventory.
    pub fn equip(&mut self, index: usize, slot: EquipSlot) -> Result<(), CharacterError> {
        if index >= self.inventory.len() {
            return Err(CharacterError::NoSuchItem {
                index,
                len: self.inventory.len(),
            });
        }
        let item = self.inventory.remove(index);
        if let Some(previous) = self.slot_mut(slot).replace(item) {
            self.inventory.push(previous);
        }
        Ok(())
    }

    /// Move the item in `slot` back to the inventory.
    pub fn unequip(&mut self, slot: EquipSlot) -> Result<(), CharacterError> {
        let item = self.slot_mut(slot).take().ok_or(CharacterError::EmptySlot(slot))?;
        self.inventory.push(item);
        Ok(())
    }

    /// Remove an item from the inventory or an equipment slot.
    pub fn take_item(&mut self, source: ItemSource) -> Result<InventoryItem, CharacterError> {
        match source {
            ItemSource::Inventory(index) if index < self.inventory.len() => {
                Ok(self.inventory.remove(index))
            }
            ItemSource::Inventory(index) => Err(CharacterError::NoSuchItem {
                index,
                len: self.inventory.len(),
            }),
            ItemSource::Equipped(slot) => {
                self.slot_mut(slot).take().ok_or(CharacterError::EmptySlot(slot))
            }
        }
    }
}

fn take_first_matching(items: &mut Vec<String>, keywords: &[&str]) -> Option<String> {
    let index = items.iter().position(|item| {
        let lower = item.to_lowercase();
        keywords.iter().any(|kw| lower.contains(kw))
    })?;
    Some(items.remove(index))
}

fn armor_class_for(class: &str, dex: i32) -> i32 {
    match class_data(class) {
        Some(data) if data.armor.contains(&"light") && !class.eq_ignore_ascii_case("barbarian") => {
            11 + dex
        }
        _ => 10 + dex,
    }
}

/// Consumables every new party member starts with.
fn standard_issue() -> Vec<InventoryItem> {
    let mut kit = vec![InventoryItem::tagged("Potion of Healing", "Consumable"); 5];
    kit.push(InventoryItem::tagged("Healer's Kit", "Consumable"));
    kit.push(InventoryItem::tagged("Scroll of Revivify", "Consumable"));
    kit
}

/// Roll the healing an item provides when used; 0 for non-healing items.
pub fn roll_healing<R: Rng + ?Sized>(item: &InventoryItem, rng: &mut R) -> i32 {
    let name = item.name.to_lowercase();
    let mut d4 = |count: usize| -> i32 { (0..count).map(|_| rng.gen_range(1..=4)).sum() };

    if name.contains("potion of greater healing") {
        d4(4) + 4
    } else if name.contains("potion of healing") {
        d4(2) + 2
    } else if name.contains("medical kit") || name.contains("healer's kit") {
        10
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fighter() -> Character {
        Character::new("Elara Swiftblade", "Elf", "Fighter", 20)
    }

    #[test]
    fn test_modifier() {
        assert_eq!(AbilityScores::modifier(10), 0);
        assert_eq!(AbilityScores::modifier(12), 1);
        assert_eq!(AbilityScores::modifier(9), -1);
        assert_eq!(AbilityScores::modifier(8), -1);
        assert_eq!(AbilityScores::modifier(15), 2);
    }

    #[test]
    fn test_point_buy_stays_in_range_and_budget() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let scores = AbilityScores::random_point_buy(&mut rng);
            let spent: u32 = scores
                .all()
                .iter()
                .map(|s| point_buy_cost(*s).expect("score within point-buy range"))
                .sum();
            assert!(spent <= POINT_BUY_TOTAL);
        }
    }

    #[test]
    fn test_wallet_copper_conversions() {
        assert_eq!(Wallet::new(1, 0, 0).total_copper(), 100);
        assert_eq!(Wallet::from_copper(100), Wallet::new(1, 0, 0));
        assert_eq!(Wallet::from_copper(250), Wallet::new(2, 5, 0));
        assert_eq!(Wallet::from_copper(Wallet::new(0, 0, 250).total_copper()), Wallet::new(2, 5, 0));
    }

    #[test]
    fn test_wallet_spend() {
        let wallet = Wallet::new(10, 0, 0);
        assert_eq!(wallet.spend(Wallet::new(5, 0, 0)), Some(Wallet::new(5, 0, 0)));
        assert_eq!(wallet.spend(Wallet::new(0, 0, 1)), Some(Wallet::new(9, 9, 9)));
        assert_eq!(wallet.spend(Wallet::new(10, 0, 1)), None);
    }

    #[test]
    fn test_wallet_deposit_keeps_denominations() {
        let mut wallet = Wallet::new(0, 9, 9);
        wallet.deposit(Wallet::new(0, 5, 5));
        assert_eq!(wallet, Wallet::new(0, 14, 14));
    }

    #[test]
    fn test_wallet_display() {
        assert_eq!(Wallet::new(5, 0, 0).to_string(), "5 GP");
        assert_eq!(Wallet::new(1, 2, 3).to_string(), "1 GP, 2 SP, 3 CP");
        assert_eq!(Wallet::default().to_string(), "0 CP");
    }

    #[test]
    fn test_hp_is_clamped_and_status_follows() {
        let mut c = fighter();
        c.take_damage(50);
        assert_eq!(c.current_hp(), 0);
        assert_eq!(c.status(), Status::Downed);

        c.heal(100);
        assert_eq!(c.current_hp(), 20);
        assert_eq!(c.status(), Status::Alive);

        c.take_damage(-5);
        assert_eq!(c.current_hp(), 20);
    }

    #[test]
    fn test_equip_and_unequip_keep_item_in_one_place() {
        let mut c = fighter();
        c.inventory = vec![InventoryItem::new("Longsword"), InventoryItem::new("Dagger")];

        c.equip(0, EquipSlot::Weapon).unwrap();
        assert_eq!(c.equipped(EquipSlot::Weapon).unwrap().name, "Longsword");
        assert_eq!(c.inventory, vec![InventoryItem::new("Dagger")]);

        // Swapping pushes the previous weapon back.
        c.equip(0, EquipSlot::Weapon).unwrap();
        assert_eq!(c.equipped(EquipSlot::Weapon).unwrap().name, "Dagger");
        assert_eq!(c.inventory, vec![InventoryItem::new("Longsword")]);

        c.unequip(EquipSlot::Weapon).unwrap();
        assert!(c.equipped(EquipSlot::Weapon).is_none());
        assert_eq!(c.inventory.len(), 2);

        assert_eq!(c.unequip(EquipSlot::Armor), Err(CharacterError::EmptySlot(EquipSlot::Armor)));
        assert!(matches!(c.equip(9, EquipSlot::Armor), Err(CharacterError::NoSuchItem { .. })));
    }

    #[test]
    fn test_equip_sequences_never_duplicate_items() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut c = fighter();
        c.inventory = (0..4).map(|i| InventoryItem::new(format!("Item {i}"))).collect();

        for _ in 0..200 {
            let slot = if rng.gen_bool(0.5) { EquipSlot::Weapon } else { EquipSlot::Armor };
            if rng.gen_bool(0.6) && !c.inventory.is_empty() {
                let index = rng.gen_range(0..c.inventory.len());
                c.equip(index, slot).unwrap();
            } else {
                let _ = c.unequip(slot);
            }

            let mut names: Vec<_> = c.inventory.iter().map(|i| i.name.clone()).collect();
            names.extend(c.equipped(EquipSlot::Weapon).map(|i| i.name.clone()));
            names.extend(c.equipped(EquipSlot::Armor).map(|i| i.name.clone()));
            names.sort();
            names.dedup();
            assert_eq!(names.len(), 4);
        }
    }

    #[test]
    fn test_regeneration_heals_every_third_turn() {
        let mut c = fighter();
        c.stats.strength = 14;
        c.set_hp(10);

        assert_eq!(c.advance_regeneration(3), Regeneration::Counting(1));
        assert_eq!(c.advance_regeneration(3), Regeneration::Counting(2));
        assert_eq!(c.advance_regeneration(3), Regeneration::Healed);
        assert_eq!(c.current_hp(), 11);
        assert_eq!(c.regen_turn_counter, 0);
    }

    #[test]
    fn test_regeneration_ineligible() {
        let mut weak = fighter();
        weak.set_hp(5);
        assert_eq!(weak.advance_regeneration(3), Regeneration::Ineligible);

        let mut downed = fighter();
        downed.stats.strength = 16;
        downed.set_hp(0);
        assert_eq!(downed.advance_regeneration(3), Regeneration::Ineligible);

        let mut healthy = fighter();
        healthy.stats.strength = 16;
        assert_eq!(healthy.advance_regeneration(3), Regeneration::Ineligible);
    }

    #[test]
    fn test_from_options_derives_vitals_and_gear() {
        let options = CharacterOptions::new("Thorin Oakenshield", "Dwarf", "Fighter", "Male")
            .with_stats(AbilityScores::new(15, 12, 14, 10, 10, 8))
            .with_starting_items(["Rope", "Battleaxe", "Chain Mail", "Torch"])
            .with_currency(Wallet::new(15, 0, 0));

        let c = Character::from_options(options).unwrap();
        assert_eq!(c.max_hp(), 22); // 10 * 2 + 2
        assert_eq!(c.current_hp(), 22);
        assert_eq!(c.armor_class, 11); // 10 + 1 for a Fighter
        assert_eq!(c.equipped(EquipSlot::Weapon).unwrap().name, "Battleaxe");
        assert_eq!(c.equipped(EquipSlot::Armor).unwrap().name, "Chain Mail");
        assert_eq!(c.inventory[0], InventoryItem::tagged("Rope", "New"));
        assert_eq!(c.inventory[1], InventoryItem::tagged("Torch", "New"));
        assert_eq!(c.inventory.len(), 2 + 7);
        assert_eq!(c.currency, Wallet::new(15, 0, 0));
    }

    #[test]
    fn test_from_options_unknown_class_and_light_armor() {
        let stats = AbilityScores::new(10, 14, 12, 10, 10, 10);
        let artificer = Character::from_options(
            CharacterOptions::new("Tink", "Gnome", "Artificer", "Female").with_stats(stats),
        )
        .unwrap();
        assert_eq!(artificer.max_hp(), 9);

        let rogue = Character::from_options(
            CharacterOptions::new("Vex", "Tiefling", "Rogue", "Female").with_stats(stats),
        )
        .unwrap();
        assert_eq!(rogue.armor_class, 13);
    }

    #[test]
    fn test_validate_rejects_missing_fields() {
        let options = CharacterOptions::new("", "", "Wizard", "Male");
        assert!(matches!(options.validate(), Err(CharacterError::InvalidOptions(_))));

        let options = CharacterOptions::new("Zed", "Human", "Wizard", "Male")
            .with_stats(AbilityScores::new(0, 10, 10, 10, 10, 10));
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_legacy_inventory_strings_upgrade() {
        let items: Vec<InventoryItem> =
            serde_json::from_str(r#"["Rope", {"name": "Dagger", "tag": "weapon"}]"#).unwrap();
        assert_eq!(items[0], InventoryItem::new("Rope"));
        assert_eq!(items[1], InventoryItem::tagged("Dagger", "weapon"));
    }

    #[test]
    fn test_roll_healing() {
        let mut rng = StdRng::seed_from_u64(1);
        let potion = roll_healing(&InventoryItem::new("Potion of Healing"), &mut rng);
        assert!((4..=10).contains(&potion));
        let greater = roll_healing(&InventoryItem::new("Potion of Greater Healing"), &mut rng);
        assert!((8..=20).contains(&greater));
        assert_eq!(roll_healing(&InventoryItem::new("Healer's Kit"), &mut rng), 10);
        assert_eq!(roll_healing(&InventoryItem::new("Rope"), &mut rng), 0);
    }
}
