//! The directive grammar.
//!
//! Narrator text may carry inline markers such as `DAMAGE:Elara,5` or
//! `TRANSACTION:[5,0,0],weapon,Dagger`. Each marker kind is one production
//! in [`GRAMMAR`]: a keyword, an anchored pattern and a parser that turns the
//! captures into a [`Directive`].
//!
//! The narrator is not reliable about brackets or spacing, so patterns accept
//! optional brackets and blanks around separators. Numeric fields read their
//! leading digits (`5hp` is 5); fields without digits and negative numbers
//! become 0.

use crate::character::Wallet;
use crate::combat::{Combatant, CombatantKind};
use crate::story::Invitation;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;

/// The recognized marker kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    RewardCurrency,
    Item,
    Transaction,
    Damage,
    Ambiance,
    Minimap,
    DistanceInfo,
    CombatEnd,
    QuestComplete,
    InviteCharacter,
}

impl DirectiveKind {
    pub const ALL: [DirectiveKind; 10] = [
        DirectiveKind::RewardCurrency,
        DirectiveKind::Item,
        DirectiveKind::Transaction,
        DirectiveKind::Damage,
        DirectiveKind::Ambiance,
        DirectiveKind::Minimap,
        DirectiveKind::DistanceInfo,
        DirectiveKind::CombatEnd,
        DirectiveKind::QuestComplete,
        DirectiveKind::InviteCharacter,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            DirectiveKind::RewardCurrency => "REWARD_CURRENCY",
            DirectiveKind::Item => "ITEM",
            DirectiveKind::Transaction => "TRANSACTION",
            DirectiveKind::Damage => "DAMAGE",
            DirectiveKind::Ambiance => "AMBIANCE",
            DirectiveKind::Minimap => "MINIMAP",
            DirectiveKind::DistanceInfo => "DISTANCE_INFO",
            DirectiveKind::CombatEnd => "COMBAT_END",
            DirectiveKind::QuestComplete => "QUEST_COMPLETE",
            DirectiveKind::InviteCharacter => "INVITE_CHARACTER",
        }
    }

    /// Look up a kind by keyword. `ITEM` and `AMBIANCE` ignore case.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let upper = keyword.to_ascii_uppercase();
        let kind = Self::ALL.into_iter().find(|k| k.keyword() == upper)?;
        let case_insensitive = matches!(kind, DirectiveKind::Item | DirectiveKind::Ambiance);
        (case_insensitive || keyword == kind.keyword()).then_some(kind)
    }
}

impl fmt::Display for DirectiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A parsed marker with its parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    RewardCurrency(Wallet),
    Item {
        name: String,
        tag: String,
    },
    Transaction {
        cost: Wallet,
        tag: Option<String>,
        items: Vec<String>,
    },
    Damage {
        target: String,
        amount: i32,
    },
    Ambiance {
        description: String,
    },
    Minimap {
        combatants: Vec<Combatant>,
    },
    DistanceInfo {
        meters: u32,
    },
    CombatEnd,
    QuestComplete {
        quest: String,
    },
    InviteCharacter(Invitation),
}

impl Directive {
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::RewardCurrency(_) => DirectiveKind::RewardCurrency,
            Directive::Item { .. } => DirectiveKind::Item,
            Directive::Transaction { .. } => DirectiveKind::Transaction,
            Directive::Damage { .. } => DirectiveKind::Damage,
            Directive::Ambiance { .. } => DirectiveKind::Ambiance,
            Directive::Minimap { .. } => DirectiveKind::Minimap,
            Directive::DistanceInfo { .. } => DirectiveKind::DistanceInfo,
            Directive::CombatEnd => DirectiveKind::CombatEnd,
            Directive::QuestComplete { .. } => DirectiveKind::QuestComplete,
            Directive::InviteCharacter(_) => DirectiveKind::InviteCharacter,
        }
    }

    /// Text that takes the marker's place in the displayed narrative.
    pub fn replacement(&self) -> &str {
        match self {
            Directive::Item { name, .. } => name,
            _ => "",
        }
    }

    /// True for markers that put the party into combat.
    pub fn starts_combat(&self) -> bool {
        matches!(self, Directive::Minimap { .. } | Directive::DistanceInfo { .. })
    }
}

// ============================================================================
// Grammar
// ============================================================================

/// One production: a keyword, a pattern anchored at the keyword and a parser.
pub struct Production {
    pub kind: DirectiveKind,
    /// Number of capture groups the parser reads.
    pub arity: usize,
    pattern: Regex,
    parse: fn(&Captures<'_>) -> Option<Directive>,
}

impl Production {
    fn new(
        kind: DirectiveKind,
        arity: usize,
        pattern: &str,
        parse: fn(&Captures<'_>) -> Option<Directive>,
    ) -> Self {
        let pattern = Regex::new(pattern).expect("valid regex");
        debug_assert_eq!(pattern.captures_len() - 1, arity, "{kind}");
        Self {
            kind,
            arity,
            pattern,
            parse,
        }
    }

    /// Match at the very start of `input`. Returns the directive and the
    /// number of bytes it consumed.
    pub fn parse(&self, input: &str) -> Option<(Directive, usize)> {
        let caps = self.pattern.captures(input)?;
        let len = caps.get(0)?.end();
        let directive = (self.parse)(&caps)?;
        Some((directive, len))
    }
}

// Field separator. The narrator sometimes brackets each field on its own
// (`[10],[5],[0]`), so a separator may carry a closing and an opening bracket.
const SEP: &str = r"[ \t]*\]?[ \t]*,[ \t]*\[?[ \t]*";

pub static GRAMMAR: Lazy<Vec<Production>> = Lazy::new(|| {
    let num = r"([+-]?\w*)";
    let field = r"([^,\[\]\r\n]+)";
    let triple = format!(r"\[?[ \t]*{num}{SEP}{num}{SEP}{num}[ \t]*\]?");
    vec![
        Production::new(
            DirectiveKind::RewardCurrency,
            3,
            &format!(r"^REWARD_CURRENCY[ \t]*:[ \t]*{triple}"),
            parse_reward,
        ),
        Production::new(
            DirectiveKind::Transaction,
            6,
            &format!(
                r"^TRANSACTION[ \t]*:[ \t]*{triple}[ \t]*\]?[ \t]*,[ \t]*(?:\[[ \t]*([^,\[\]\r\n]*?)[ \t]*\][ \t]*,|([^,\[\]\r\n]*))(.*)"
            ),
            parse_transaction,
        ),
        Production::new(
            DirectiveKind::Damage,
            2,
            &format!(r"^DAMAGE[ \t]*:[ \t]*\[?[ \t]*([^,\[\]\r\n]+?){SEP}([+-]?\w+)(?:[ \t]*\])?"),
            parse_damage,
        ),
        Production::new(
            DirectiveKind::Item,
            2,
            r"(?i)^ITEM[ \t]*:[ \t]*([^\r\n]+?)[ \t]*\([ \t]*tag[ \t]*:[ \t]*([^)\r\n]+)\)",
            parse_item,
        ),
        Production::new(
            DirectiveKind::Ambiance,
            1,
            r"(?i)^AMBIANCE[ \t]*:[ \t]*\[?([^\]\r\n]+)\]?(?:\r?\n)?",
            parse_ambiance,
        ),
        Production::new(
            DirectiveKind::Minimap,
            1,
            r"^MINIMAP[ \t]*:[ \t]*\[([^\]\r\n]*)\]",
            parse_minimap,
        ),
        Production::new(
            DirectiveKind::DistanceInfo,
            1,
            &format!(r"^DISTANCE_INFO[ \t]*:[ \t]*\[[ \t]*{num}[ \t]*\]"),
            parse_distance,
        ),
        Production::new(DirectiveKind::CombatEnd, 0, r"^COMBAT_END\b", |_| {
            Some(Directive::CombatEnd)
        }),
        Production::new(
            DirectiveKind::QuestComplete,
            1,
            r"^QUEST_COMPLETE[ \t]*:[ \t]*\[([^\]\r\n]*)\]",
            parse_quest,
        ),
        Production::new(
            DirectiveKind::InviteCharacter,
            4,
            &format!(
                r"^INVITE_CHARACTER[ \t]*:[ \t]*\[?[ \t]*{field}{SEP}{field}{SEP}{field}{SEP}{field}\]?"
            ),
            parse_invite,
        ),
    ]
});

/// Finds candidate keywords; the production for the keyword decides whether
/// a real directive starts there.
pub(crate) static KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b(?:(REWARD_CURRENCY|TRANSACTION|DAMAGE|MINIMAP|DISTANCE_INFO|QUEST_COMPLETE|INVITE_CHARACTER|(?i:AMBIANCE|ITEM))[ \t]*:|(COMBAT_END)\b)",
    )
    .expect("valid regex")
});

/// The production for a kind.
pub fn production(kind: DirectiveKind) -> Option<&'static Production> {
    GRAMMAR.iter().find(|p| p.kind == kind)
}

// ============================================================================
// Parsers
// ============================================================================

fn text(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map(|m| m.as_str().trim()).unwrap_or("").to_string()
}

/// Lenient number: the leading digits count, so `5hp` is 5. No digits or a
/// negative sign is 0.
fn count(caps: &Captures<'_>, i: usize) -> u32 {
    let raw = caps.get(i).map(|m| m.as_str().trim()).unwrap_or("");
    if raw.starts_with('-') {
        return 0;
    }
    let unsigned = raw.strip_prefix('+').unwrap_or(raw);
    let end = unsigned
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unsigned.len());
    unsigned[..end]
        .parse::<u64>()
        .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

fn wallet(caps: &Captures<'_>, first: usize) -> Wallet {
    Wallet::new(count(caps, first), count(caps, first + 1), count(caps, first + 2))
}

fn parse_reward(caps: &Captures<'_>) -> Option<Directive> {
    Some(Directive::RewardCurrency(wallet(caps, 1)))
}

fn parse_transaction(caps: &Captures<'_>) -> Option<Directive> {
    let tag = match text(caps, 4) {
        bracketed if !bracketed.is_empty() => bracketed,
        _ => text(caps, 5),
    };
    let items = text(caps, 6)
        .replace(['[', ']'], "")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect();

    Some(Directive::Transaction {
        cost: wallet(caps, 1),
        tag: (!tag.is_empty()).then_some(tag),
        items,
    })
}

fn parse_damage(caps: &Captures<'_>) -> Option<Directive> {
    let amount = i32::try_from(count(caps, 2)).unwrap_or(i32::MAX);
    Some(Directive::Damage {
        target: text(caps, 1),
        amount,
    })
}

fn parse_item(caps: &Captures<'_>) -> Option<Directive> {
    let name = text(caps, 1).replace(['[', ']'], "").trim().to_string();
    if name.is_empty() {
        return None;
    }
    Some(Directive::Item {
        name,
        tag: text(caps, 2),
    })
}

fn parse_ambiance(caps: &Captures<'_>) -> Option<Directive> {
    let description = text(caps, 1);
    (!description.is_empty()).then_some(Directive::Ambiance { description })
}

fn parse_minimap(caps: &Captures<'_>) -> Option<Directive> {
    let combatants = text(caps, 1)
        .split(';')
        .filter_map(parse_combatant)
        .collect();
    Some(Directive::Minimap { combatants })
}

/// `kind/id/x/y`; anything else is dropped.
fn parse_combatant(record: &str) -> Option<Combatant> {
    let parts: Vec<&str> = record.split('/').map(str::trim).collect();
    let [kind, id, x, y] = parts.as_slice() else {
        return None;
    };
    Some(Combatant {
        kind: CombatantKind::parse(kind)?,
        id: id.to_string(),
        x: x.parse().unwrap_or(0),
        y: y.parse().unwrap_or(0),
    })
}

fn parse_distance(caps: &Captures<'_>) -> Option<Directive> {
    Some(Directive::DistanceInfo {
        meters: count(caps, 1),
    })
}

fn parse_quest(caps: &Captures<'_>) -> Option<Directive> {
    Some(Directive::QuestComplete {
        quest: text(caps, 1),
    })
}

fn parse_invite(caps: &Captures<'_>) -> Option<Directive> {
    let fields = [text(caps, 1), text(caps, 2), text(caps, 3), text(caps, 4)];
    if fields.iter().any(String::is_empty) {
        return None;
    }
    let [name, race, class, gender] = fields;
    Some(Directive::InviteCharacter(Invitation::new(name, race, class, gender)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(kind: DirectiveKind, input: &str) -> Option<Directive> {
        production(kind)?.parse(input).map(|(d, _)| d)
    }

    #[test]
    fn test_every_kind_has_one_production() {
        for kind in DirectiveKind::ALL {
            assert_eq!(GRAMMAR.iter().filter(|p| p.kind == kind).count(), 1, "{kind}");
        }
    }

    #[test]
    fn test_arity_matches_capture_groups() {
        for production in GRAMMAR.iter() {
            assert_eq!(
                production.pattern.captures_len() - 1,
                production.arity,
                "{}",
                production.kind
            );
        }
    }

    #[test]
    fn test_keyword_case_rules() {
        assert_eq!(DirectiveKind::from_keyword("item"), Some(DirectiveKind::Item));
        assert_eq!(DirectiveKind::from_keyword("Ambiance"), Some(DirectiveKind::Ambiance));
        assert_eq!(DirectiveKind::from_keyword("damage"), None);
        assert_eq!(DirectiveKind::from_keyword("DAMAGE"), Some(DirectiveKind::Damage));
    }

    #[test]
    fn test_damage_variants() {
        let expected = Some(Directive::Damage {
            target: "Elara".into(),
            amount: 5,
        });
        assert_eq!(parse(DirectiveKind::Damage, "DAMAGE:Elara,5"), expected);
        assert_eq!(parse(DirectiveKind::Damage, "DAMAGE: [ Elara , 5 ]"), expected);
        assert_eq!(
            parse(DirectiveKind::Damage, "DAMAGE:Elara,lots"),
            Some(Directive::Damage {
                target: "Elara".into(),
                amount: 0
            })
        );
        assert_eq!(
            parse(DirectiveKind::Damage, "DAMAGE:Elara,-4"),
            Some(Directive::Damage {
                target: "Elara".into(),
                amount: 0
            })
        );
        assert_eq!(parse(DirectiveKind::Damage, "DAMAGE:Elara"), None);
    }

    #[test]
    fn test_unit_suffixes_keep_the_number() {
        assert_eq!(
            parse(DirectiveKind::Damage, "DAMAGE:Elara,5hp"),
            Some(Directive::Damage {
                target: "Elara".into(),
                amount: 5
            })
        );
        assert_eq!(
            parse(DirectiveKind::RewardCurrency, "REWARD_CURRENCY:[10gp,3sp,0]"),
            Some(Directive::RewardCurrency(Wallet::new(10, 3, 0)))
        );
        assert_eq!(
            parse(DirectiveKind::DistanceInfo, "DISTANCE_INFO:[30m]"),
            Some(Directive::DistanceInfo { meters: 30 })
        );
        let Some(Directive::Transaction { cost, .. }) =
            parse(DirectiveKind::Transaction, "TRANSACTION:[2gp,0,0],food,Bread")
        else {
            panic!("expected a transaction");
        };
        assert_eq!(cost, Wallet::new(2, 0, 0));
    }

    #[test]
    fn test_transaction_item_lists() {
        let Some(Directive::Transaction { cost, tag, items }) = parse(
            DirectiveKind::Transaction,
            "TRANSACTION:[5,0,0],weapon,Dagger",
        ) else {
            panic!("expected a transaction");
        };
        assert_eq!(cost, Wallet::new(5, 0, 0));
        assert_eq!(tag.as_deref(), Some("weapon"));
        assert_eq!(items, vec!["Dagger"]);

        let Some(Directive::Transaction { items, .. }) = parse(
            DirectiveKind::Transaction,
            "TRANSACTION:[0,5,0], supplies, [Rope, Torch , Rations]",
        ) else {
            panic!("expected a transaction");
        };
        assert_eq!(items, vec!["Rope", "Torch", "Rations"]);

        assert_eq!(
            parse(DirectiveKind::Transaction, "TRANSACTION:[5,0,0],[Dagger, Rope]"),
            Some(Directive::Transaction {
                cost: Wallet::new(5, 0, 0),
                tag: None,
                items: vec!["Dagger".into(), "Rope".into()],
            })
        );
        assert_eq!(
            parse(DirectiveKind::Transaction, "TRANSACTION:[5,0,0],[Dagger]"),
            Some(Directive::Transaction {
                cost: Wallet::new(5, 0, 0),
                tag: None,
                items: vec!["Dagger".into()],
            })
        );
        assert_eq!(
            parse(DirectiveKind::Transaction, "TRANSACTION:[5,0,0], [weapon] , [Dagger, Rope]"),
            Some(Directive::Transaction {
                cost: Wallet::new(5, 0, 0),
                tag: Some("weapon".into()),
                items: vec!["Dagger".into(), "Rope".into()],
            })
        );

        let Some(Directive::Transaction { tag, items, .. }) =
            parse(DirectiveKind::Transaction, "TRANSACTION:[1,0,0],")
        else {
            panic!("expected a transaction");
        };
        assert!(tag.is_none());
        assert!(items.is_empty());
    }

    #[test]
    fn test_per_field_brackets() {
        assert_eq!(
            parse(DirectiveKind::RewardCurrency, "REWARD_CURRENCY:[10],[5],[0]"),
            Some(Directive::RewardCurrency(Wallet::new(10, 5, 0)))
        );
        assert_eq!(
            parse(DirectiveKind::Damage, "DAMAGE:[Elara],[5]"),
            Some(Directive::Damage {
                target: "Elara".into(),
                amount: 5
            })
        );
        assert_eq!(
            parse(DirectiveKind::Transaction, "TRANSACTION:[5],[0],[0],[weapon],[Dagger]"),
            Some(Directive::Transaction {
                cost: Wallet::new(5, 0, 0),
                tag: Some("weapon".into()),
                items: vec!["Dagger".into()],
            })
        );
        let Some(Directive::InviteCharacter(inv)) = parse(
            DirectiveKind::InviteCharacter,
            "INVITE_CHARACTER:[Lyra],[Elf],[Bard],[Female]",
        ) else {
            panic!("expected an invitation");
        };
        assert_eq!((inv.race.as_str(), inv.class.as_str()), ("Elf", "Bard"));
    }

    #[test]
    fn test_item_strips_brackets() {
        assert_eq!(
            parse(DirectiveKind::Item, "item:[Rusty Key] (Tag: quest)"),
            Some(Directive::Item {
                name: "Rusty Key".into(),
                tag: "quest".into()
            })
        );
        assert_eq!(parse(DirectiveKind::Item, "ITEM: Rusty Key"), None);
    }

    #[test]
    fn test_minimap_drops_bad_records() {
        let Some(Directive::Minimap { combatants }) = parse(
            DirectiveKind::Minimap,
            "MINIMAP:[player/Elara/1/2;enemy/goblin/x/3;broken;dragon/d/1/1]",
        ) else {
            panic!("expected a minimap");
        };
        assert_eq!(combatants.len(), 2);
        assert_eq!(combatants[0].id, "Elara");
        assert_eq!((combatants[1].x, combatants[1].y), (0, 3));
    }

    #[test]
    fn test_invite_requires_four_fields() {
        let Some(Directive::InviteCharacter(inv)) = parse(
            DirectiveKind::InviteCharacter,
            "INVITE_CHARACTER:[Lyra, Elf, Bard, Female]",
        ) else {
            panic!("expected an invitation");
        };
        assert_eq!(inv.name, "Lyra");
        assert_eq!(inv.gender, "Female");
        assert_eq!(
            parse(DirectiveKind::InviteCharacter, "INVITE_CHARACTER:[Lyra, Elf, Bard]"),
            None
        );
    }

    #[test]
    fn test_ambiance_consumes_line_break() {
        let (directive, len) = production(DirectiveKind::Ambiance)
            .unwrap()
            .parse("AMBIANCE:[A misty forest]\nNext")
            .unwrap();
        assert_eq!(
            directive,
            Directive::Ambiance {
                description: "A misty forest".into()
            }
        );
        assert_eq!(len, "AMBIANCE:[A misty forest]\n".len());
    }
}
