//! Session-scoped combat positioning.
//!
//! Combat is either drawn on a small grid or summarized as a single
//! long-range distance, never both.

use serde::{Deserialize, Serialize};

pub const GRID_COLS: i32 = 10;
pub const GRID_ROWS: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombatantKind {
    Player,
    Enemy,
    Neutral,
}

impl CombatantKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "player" => Some(CombatantKind::Player),
            "enemy" => Some(CombatantKind::Enemy),
            "neutral" => Some(CombatantKind::Neutral),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Combatant {
    pub kind: CombatantKind,
    pub id: String,
    pub x: i32,
    pub y: i32,
}

impl Combatant {
    pub fn on_grid(&self) -> bool {
        (0..GRID_COLS).contains(&self.x) && (0..GRID_ROWS).contains(&self.y)
    }

    fn marker(&self) -> char {
        match self.kind {
            CombatantKind::Player => self
                .id
                .chars()
                .next()
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or('P'),
            CombatantKind::Enemy => 'E',
            CombatantKind::Neutral => 'N',
        }
    }
}

/// Where the current fight stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatPosition {
    Grid(Vec<Combatant>),
    /// Distance to the enemy in meters.
    Distance(u32),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombatState {
    in_combat: bool,
    position: Option<CombatPosition>,
}

impl CombatState {
    pub fn in_combat(&self) -> bool {
        self.in_combat
    }

    pub fn position(&self) -> Option<&CombatPosition> {
        self.position.as_ref()
    }

    /// Replace positioning with a grid. Returns true if this started combat.
    pub fn set_grid(&mut self, combatants: Vec<Combatant>) -> bool {
        self.position = Some(CombatPosition::Grid(combatants));
        self.enter()
    }

    /// Replace positioning with a distance. Returns true if this started combat.
    pub fn set_distance(&mut self, meters: u32) -> bool {
        self.position = Some(CombatPosition::Distance(meters));
        self.enter()
    }

    /// Clear all positioning. Returns true if combat was active.
    pub fn end(&mut self) -> bool {
        self.position = None;
        std::mem::replace(&mut self.in_combat, false)
    }

    fn enter(&mut self) -> bool {
        !std::mem::replace(&mut self.in_combat, true)
    }

    /// Text rendering of the current position for terminal front ends.
    pub fn render(&self) -> Option<String> {
        match self.position.as_ref()? {
            CombatPosition::Distance(meters) => Some(format!("Enemy at {meters} m")),
            CombatPosition::Grid(combatants) => {
                let mut rows = vec![vec!['.'; GRID_COLS as usize]; GRID_ROWS as usize];
                for c in combatants.iter().filter(|c| c.on_grid()) {
                    rows[c.y as usize][c.x as usize] = c.marker();
                }
                let lines: Vec<String> = rows.into_iter().map(|r| r.into_iter().collect()).collect();
                Some(lines.join("\n"))
            }
        }
    }
}
