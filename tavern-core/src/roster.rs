//! The party roster.
//!
//! Members are addressed by index only. Every mutation goes through
//! [`Roster::update`], which clones the member, applies the change to the
//! clone and swaps it back in, so a failed change never leaves a member
//! half-modified.

use crate::character::{Character, CharacterError, InventoryItem, ItemSource};
use thiserror::Error;

/// Default party cap.
pub const MAX_PARTY_SIZE: usize = 5;

/// Errors from roster operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("The party is full ({max} members)")]
    Full { max: usize },

    #[error("No party member at index {0}")]
    NoSuchMember(usize),

    #[error("Cannot transfer an item to the same party member")]
    SameMember,

    #[error(transparent)]
    Character(#[from] CharacterError),
}

/// Ordered party members plus the protagonist index.
#[derive(Debug, Clone, PartialEq)]
pub struct Roster {
    members: Vec<Character>,
    main_index: usize,
    max_size: usize,
}

impl Default for Roster {
    fn default() -> Self {
        Self::new(MAX_PARTY_SIZE)
    }
}

impl Roster {
    pub fn new(max_size: usize) -> Self {
        Self {
            members: Vec::new(),
            main_index: 0,
            max_size: max_size.max(1),
        }
    }

    /// Build a roster from existing members, e.g. a loaded save.
    pub fn from_members(
        members: Vec<Character>,
        main_index: usize,
        max_size: usize,
    ) -> Result<Self, RosterError> {
        let max_size = max_size.max(1);
        if members.len() > max_size {
            return Err(RosterError::Full { max: max_size });
        }
        if !members.is_empty() && main_index >= members.len() {
            return Err(RosterError::NoSuchMember(main_index));
        }
        Ok(Self {
            members,
            main_index,
            max_size,
        })
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.max_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn get(&self, index: usize) -> Option<&Character> {
        self.members.get(index)
    }

    pub fn members(&self) -> &[Character] {
        &self.members
    }

    pub fn iter(&self) -> impl Iterator<Item = &Character> {
        self.members.iter()
    }

    pub fn main_index(&self) -> usize {
        self.main_index
    }

    pub fn protagonist(&self) -> Option<&Character> {
        self.members.get(self.main_index)
    }

    /// Append a member. Returns its index.
    pub fn push(&mut self, character: Character) -> Result<usize, RosterError> {
        if self.is_full() {
            return Err(RosterError::Full { max: self.max_size });
        }
        self.members.push(character);
        Ok(self.members.len() - 1)
    }

    /// Remove a member, keeping the protagonist index pointing at the same
    /// character where possible.
    pub fn remove(&mut self, index: usize) -> Result<Character, RosterError> {
        if index >= self.members.len() {
            return Err(RosterError::NoSuchMember(index));
        }
        let removed = self.members.remove(index);
        if index < self.main_index || self.main_index >= self.members.len() {
            self.main_index = self.main_index.saturating_sub(1);
        }
        Ok(removed)
    }

    /// Swap in a whole new version of a member.
    pub fn replace(&mut self, index: usize, character: Character) -> Result<Character, RosterError> {
        let slot = self
            .members
            .get_mut(index)
            .ok_or(RosterError::NoSuchMember(index))?;
        Ok(std::mem::replace(slot, character))
    }

    /// Copy-on-write update of one member.
    ///
    /// The closure works on a clone; the clone replaces the member only if
    /// the closure succeeds.
    pub fn update<T, F>(&mut self, index: usize, f: F) -> Result<T, RosterError>
    where
        F: FnOnce(&mut Character) -> Result<T, RosterError>,
    {
        let mut next = self
            .members
            .get(index)
            .cloned()
            .ok_or(RosterError::NoSuchMember(index))?;
        let out = f(&mut next)?;
        self.members[index] = next;
        Ok(out)
    }

    /// Move the chosen member to the front and make it the protagonist.
    pub fn confirm_protagonist(&mut self, index: usize) -> Result<(), RosterError> {
        if index >= self.members.len() {
            return Err(RosterError::NoSuchMember(index));
        }
        let chosen = self.members.remove(index);
        self.members.insert(0, chosen);
        self.main_index = 0;
        Ok(())
    }

    /// First member whose first name matches, ignoring case.
    pub fn find_by_first_name(&self, name: &str) -> Option<usize> {
        let name = name.trim().to_lowercase();
        self.members
            .iter()
            .position(|c| c.first_name().to_lowercase() == name)
    }

    /// True when the party is non-empty and every member is at 0 HP.
    pub fn all_down(&self) -> bool {
        !self.members.is_empty() && self.members.iter().all(Character::is_down)
    }

    /// Current HP of every member, in roster order.
    pub fn hp_snapshot(&self) -> Vec<i32> {
        self.members.iter().map(Character::current_hp).collect()
    }

    /// Move an item from one member to the end of another's inventory.
    pub fn transfer_item(
        &mut self,
        from: usize,
        source: ItemSource,
        to: usize,
    ) -> Result<InventoryItem, RosterError> {
        if from == to {
            return Err(RosterError::SameMember);
        }
        if to >= self.members.len() {
            return Err(RosterError::NoSuchMember(to));
        }

        let item = self.update(from, |c| Ok(c.take_item(source)?))?;
        let moved = item.clone();
        self.update(to, move |c| {
            c.inventory.push(moved);
            Ok(())
        })?;
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::character::EquipSlot;

    fn member(name: &str) -> Character {
        Character::new(name, "Human", "Fighter", 10)
    }

    fn party(names: &[&str]) -> Roster {
        let mut roster = Roster::default();
        for name in names {
            roster.push(member(name)).unwrap();
        }
        roster
    }

    #[test]
    fn test_push_respects_max_size() {
        let mut roster = Roster::new(2);
        roster.push(member("A")).unwrap();
        roster.push(member("B")).unwrap();
        assert!(roster.is_full());
        assert_eq!(roster.push(member("C")), Err(RosterError::Full { max: 2 }));
    }

    #[test]
    fn test_confirm_protagonist_moves_to_front() {
        let mut roster = party(&["Aria", "Borin", "Cass"]);
        roster.confirm_protagonist(2).unwrap();
        let names: Vec<_> = roster.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Cass", "Aria", "Borin"]);
        assert_eq!(roster.main_index(), 0);
        assert_eq!(roster.protagonist().unwrap().name, "Cass");
    }

    #[test]
    fn test_update_is_all_or_nothing() {
        let mut roster = party(&["Aria"]);
        let result: Result<(), _> = roster.update(0, |c| {
            c.take_damage(5);
            Err(RosterError::SameMember)
        });
        assert!(result.is_err());
        assert_eq!(roster.get(0).unwrap().current_hp(), 10);

        roster
            .update(0, |c| {
                c.take_damage(5);
                Ok(())
            })
            .unwrap();
        assert_eq!(roster.get(0).unwrap().current_hp(), 5);
    }

    #[test]
    fn test_find_by_first_name_first_match_wins() {
        let roster = party(&["Elara Swiftblade", "Borin", "elara Moonwhisper"]);
        assert_eq!(roster.find_by_first_name("ELARA"), Some(0));
        assert_eq!(roster.find_by_first_name("borin"), Some(1));
        assert_eq!(roster.find_by_first_name("Swiftblade"), None);
    }

    #[test]
    fn test_all_down() {
        let mut roster = party(&["A", "B"]);
        assert!(!roster.all_down());
        roster.update(0, |c| Ok(c.set_hp(0))).unwrap();
        assert!(!roster.all_down());
        roster.update(1, |c| Ok(c.set_hp(0))).unwrap();
        assert!(roster.all_down());
        assert!(!Roster::default().all_down());
    }

    #[test]
    fn test_remove_keeps_protagonist() {
        let mut roster = party(&["A", "B", "C"]);
        roster.confirm_protagonist(1).unwrap();
        roster.remove(2).unwrap();
        assert_eq!(roster.protagonist().unwrap().name, "B");
        roster.remove(0).unwrap();
        assert_eq!(roster.main_index(), 0);
        assert_eq!(roster.remove(5), Err(RosterError::NoSuchMember(5)));
    }

    #[test]
    fn test_transfer_item_from_slot() {
        let mut roster = party(&["A", "B"]);
        roster
            .update(0, |c| {
                c.inventory.push(InventoryItem::new("Longsword"));
                c.equip(0, EquipSlot::Weapon)?;
                Ok(())
            })
            .unwrap();

        let item = roster
            .transfer_item(0, ItemSource::Equipped(EquipSlot::Weapon), 1)
            .unwrap();
        assert_eq!(item.name, "Longsword");
        assert!(roster.get(0).unwrap().equipped(EquipSlot::Weapon).is_none());
        assert_eq!(roster.get(1).unwrap().inventory, vec![InventoryItem::new("Longsword")]);
    }

    #[test]
    fn test_transfer_item_failures_leave_roster_untouched() {
        let mut roster = party(&["A", "B"]);
        roster.update(0, |c| Ok(c.inventory.push(InventoryItem::new("Rope")))).unwrap();
        let before = roster.clone();

        assert_eq!(
            roster.transfer_item(0, ItemSource::Inventory(0), 0),
            Err(RosterError::SameMember)
        );
        assert_eq!(
            roster.transfer_item(0, ItemSource::Inventory(0), 7),
            Err(RosterError::NoSuchMember(7))
        );
        assert!(roster.transfer_item(0, ItemSource::Inventory(3), 1).is_err());
        assert_eq!(roster, before);
    }

    #[test]
    fn test_from_members_validates() {
        let members = vec![member("A"), member("B")];
        assert!(Roster::from_members(members.clone(), 1, 5).is_ok());
        assert_eq!(
            Roster::from_members(members.clone(), 2, 5),
            Err(RosterError::NoSuchMember(2))
        );
        assert_eq!(
            Roster::from_members(members, 0, 1),
            Err(RosterError::Full { max: 1 })
        );
    }
}
