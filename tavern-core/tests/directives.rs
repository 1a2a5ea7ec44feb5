//! The marker protocol as the narrator actually writes it.

use tavern_core::directive::DirectiveKind;
use tavern_core::extract::{extract, process};
use tavern_core::{CombatantKind, Directive, Invitation, Wallet};

#[test]
fn test_directives_come_out_in_text_order() {
    let text = format!(
        "{} DAMAGE:Elara,2 {} REWARD_CURRENCY:[1,0,0]",
        "x".repeat(9),
        "y".repeat(24)
    );
    let extraction = extract(&text);

    assert_eq!(
        extraction.kinds(),
        vec![DirectiveKind::Damage, DirectiveKind::RewardCurrency]
    );
    assert_eq!(extraction.directives[0].span.start, 10);
    assert_eq!(extraction.directives[1].span.start, 50);
}

#[test]
fn test_currency_round_trips_through_copper() {
    let one_gold = Wallet::new(1, 0, 0);
    assert_eq!(Wallet::from_copper(one_gold.total_copper()), one_gold);

    let loose = Wallet::new(0, 0, 250);
    assert_eq!(Wallet::from_copper(loose.total_copper()), Wallet::new(2, 5, 0));
}

#[test]
fn test_unreadable_numbers_count_as_zero() {
    let extraction = extract("REWARD_CURRENCY:[abc, 3, -2]");
    assert_eq!(
        extraction.directives[0].directive,
        Directive::RewardCurrency(Wallet::new(0, 3, 0))
    );

    let extraction = extract("DAMAGE:Elara,lots");
    assert_eq!(
        extraction.directives[0].directive,
        Directive::Damage {
            target: "Elara".into(),
            amount: 0
        }
    );
}

#[test]
fn test_malformed_markers_stay_in_the_narrative() {
    let text = "The ledger reads REWARD_CURRENCY: unpaid. MINIMAP shows nothing.";
    let (extraction, cleaned) = process(text);
    assert!(extraction.is_empty());
    assert_eq!(cleaned, text);

    // Lowercase is only tolerated for ITEM and AMBIANCE.
    let (extraction, cleaned) = process("damage:Elara,5 but ambiance:[Fog rolls in]");
    assert_eq!(extraction.kinds(), vec![DirectiveKind::Ambiance]);
    assert_eq!(cleaned, "damage:Elara,5 but");
}

#[test]
fn test_a_busy_response() {
    let raw = "\
AMBIANCE:[A ruined watchtower under a red moon]
Three bandits step out of the shadows.
MINIMAP:[player/Elara/1/2;enemy/Bandit1/6/2;enemy/Bandit2/7/3;neutral/Mule/0/4]
DAMAGE:[Elara],[4]
You parry the first blow, and spot ITEM:[Signal Horn] (Tag: Quest) on the captain's belt.
INVITE_CHARACTER:[Mira, Human, Cleric, Female]";

    let (extraction, cleaned) = process(raw);

    assert_eq!(
        extraction.kinds(),
        vec![
            DirectiveKind::Ambiance,
            DirectiveKind::Minimap,
            DirectiveKind::Damage,
            DirectiveKind::Item,
            DirectiveKind::InviteCharacter,
        ]
    );
    assert_eq!(
        cleaned,
        "Three bandits step out of the shadows.\n\
         You parry the first blow, and spot Signal Horn on the captain's belt."
    );

    let Directive::Minimap { combatants } = &extraction.directives[1].directive else {
        panic!("expected a grid");
    };
    assert_eq!(combatants.len(), 4);
    assert_eq!(combatants[3].kind, CombatantKind::Neutral);
    assert_eq!((combatants[2].x, combatants[2].y), (7, 3));

    assert_eq!(
        extraction.directives[2].directive,
        Directive::Damage {
            target: "Elara".into(),
            amount: 4
        }
    );
    assert_eq!(
        extraction.directives[4].directive,
        Directive::InviteCharacter(Invitation::new("Mira", "Human", "Cleric", "Female"))
    );
    assert!(extraction.signals_combat_start());
}

#[test]
fn test_every_marker_kind_is_recognized() {
    let samples = [
        ("REWARD_CURRENCY:[1,2,3]", DirectiveKind::RewardCurrency),
        ("ITEM:[Rope] (Tag: Gear)", DirectiveKind::Item),
        ("TRANSACTION:[0,5,0],food,Bread", DirectiveKind::Transaction),
        ("DAMAGE:Elara,5", DirectiveKind::Damage),
        ("AMBIANCE:[A quiet glade]", DirectiveKind::Ambiance),
        ("MINIMAP:[player/Elara/1/1]", DirectiveKind::Minimap),
        ("DISTANCE_INFO:[30]", DirectiveKind::DistanceInfo),
        ("COMBAT_END", DirectiveKind::CombatEnd),
        ("QUEST_COMPLETE:[Find the Mine]", DirectiveKind::QuestComplete),
        ("INVITE_CHARACTER:[Lyra,Elf,Bard,Female]", DirectiveKind::InviteCharacter),
    ];
    for (marker, kind) in samples {
        assert_eq!(extract(marker).kinds(), vec![kind], "{marker}");
        assert_eq!(process(marker).1, if kind == DirectiveKind::Item { "Rope" } else { "" });
    }
}
