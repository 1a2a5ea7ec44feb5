//! Transient notifications.
//!
//! These are not written to the story log; front ends show them once.

use crate::roster::Roster;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    CombatStarted,
    CombatEnded,
    Victory { quest: String },
    Downed { index: usize, name: String },
    Revived { index: usize, name: String },
    GameOver { protagonist: String },
}

impl Notification {
    pub fn is_game_over(&self) -> bool {
        matches!(self, Notification::GameOver { .. })
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notification::CombatStarted => write!(f, "Combat has begun!"),
            Notification::CombatEnded => write!(f, "Combat has ended."),
            Notification::Victory { quest } => write!(f, "Mission complete: {quest}"),
            Notification::Downed { name, .. } => write!(f, "{name} has fallen!"),
            Notification::Revived { name, .. } => write!(f, "{name} is back on their feet!"),
            Notification::GameOver { protagonist } => {
                write!(f, "Game over. The tale of {protagonist} ends here.")
            }
        }
    }
}

/// Compare HP before and after a batch of roster mutations.
///
/// Emits `Downed`/`Revived` for every member whose HP crossed zero and a
/// single `GameOver` when the whole party went down during the batch. A
/// party that was already down does not trigger a second `GameOver`.
pub fn vitals_transitions(before: &[i32], roster: &Roster) -> Vec<Notification> {
    let mut notes = Vec::new();

    for (index, (prev, member)) in before.iter().zip(roster.iter()).enumerate() {
        let now = member.current_hp();
        if *prev > 0 && now <= 0 {
            notes.push(Notification::Downed {
                index,
                name: member.name.clone(),
            });
        } else if *prev <= 0 && now > 0 {
            notes.push(Notification::Revived {
                index,
                name: member.name.clone(),
            });
        }
    }

    let was_down = !before.is_empty() && before.iter().all(|hp| *hp <= 0);
    if roster.all_down() && !was_down {
        let protagonist = roster
            .protagonist()
            .map(|c| c.name.clone())
            .unwrap_or_else(|| "the party".to_string());
        notes.push(Notification::GameOver { protagonist });
    }

    notes
}
