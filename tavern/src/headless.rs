//! Headless mode.
//!
//! A simple text-based interface for running a session without a UI. It is
//! designed for manual play, scripted runs and automated agents.

use rand::thread_rng;
use std::path::PathBuf;
use std::sync::Arc;
use tavern_core::persist::{list_saves, save_path};
use tavern_core::services::UsageRecorder;
use tavern_core::{
    Campaign, CharacterOptions, EquipSlot, EventKind, ItemSource, NarrativeSession,
    SessionConfig, SessionError, TurnOutcome, UsageTracker,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

/// Protagonist and session options from the command line.
#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub name: String,
    pub race: String,
    pub class: String,
    pub gender: String,
    pub campaign: Option<Campaign>,
    pub language: Option<String>,
    pub load: Option<PathBuf>,
}

impl Default for HeadlessOptions {
    fn default() -> Self {
        Self {
            name: "Adventurer".to_string(),
            race: "Human".to_string(),
            class: "Fighter".to_string(),
            gender: "Female".to_string(),
            campaign: None,
            language: None,
            load: None,
        }
    }
}

/// Run the game in headless mode.
///
/// This provides a simple line-oriented protocol:
/// - Lines starting with `#` are commands (save, load, quit, status, ...)
/// - Anything else is sent to the narrator as the active character's action
/// - Output lines are prefixed with their source (`[DM]`, `[EVENT]`, ...)
pub async fn run_headless(options: HeadlessOptions) -> Result<(), SessionError> {
    let mut config = SessionConfig::from_env();
    if let Some(campaign) = options.campaign {
        config = config.with_campaign(campaign);
    }
    if let Some(language) = &options.language {
        config = config.with_language(language.clone());
    }

    let usage = Arc::new(UsageTracker::default());
    let pruner = usage.start();
    let mut session = NarrativeSession::from_env(config)?
        .with_usage_recorder(usage.clone() as Arc<dyn UsageRecorder>);

    println!("=== Tavern Headless Mode ===");
    match &options.load {
        Some(path) => {
            session.load(path).await?;
            println!("[LOADED] Game loaded from {}", path.display());
            print_status(&session, &usage);
        }
        None => {
            let protagonist = CharacterOptions::new(
                &options.name,
                &options.race,
                &options.class,
                &options.gender,
            )
            .randomize_details(&mut thread_rng());
            session.create_member(protagonist)?;
            println!("Campaign: {}", session.campaign());
            print_status(&session, &usage);
        }
    }
    println!();
    print_help();
    println!();
    info!(campaign = %session.campaign(), members = session.roster().len(), "Headless session ready");

    if session.log().is_empty() {
        match session.begin().await {
            Ok(outcome) => print_outcome(&session, &outcome),
            Err(e) => println!("[ERROR] {e}"),
        }
    }

    let mut last_scene = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        show_new_scene(&session, &mut last_scene);

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(command) = line.strip_prefix('#') {
            let parts: Vec<&str> = command.split_whitespace().collect();
            match parts.first().copied() {
                Some("quit") | Some("exit") => {
                    println!("Goodbye!");
                    break;
                }
                Some("save") => {
                    let path = parts
                        .get(1)
                        .map(PathBuf::from)
                        .unwrap_or_else(|| save_path("."));
                    match session.save(&path).await {
                        Ok(()) => println!("[SAVED] Game saved to {}", path.display()),
                        Err(e) => println!("[ERROR] Save failed: {e}"),
                    }
                }
                Some("load") => {
                    if let Some(path) = parts.get(1) {
                        match session.load(path).await {
                            Ok(()) => {
                                println!("[LOADED] Game loaded from {path}");
                                print_status(&session, &usage);
                            }
                            Err(e) => println!("[ERROR] Load failed: {e}"),
                        }
                    } else {
                        println!("[ERROR] Usage: #load <path>");
                    }
                }
                Some("saves") => match list_saves(".").await {
                    Ok(saves) if saves.is_empty() => println!("[SAVES] none"),
                    Ok(saves) => {
                        println!("[SAVES]");
                        for save in saves {
                            println!("  {}", save.display());
                        }
                    }
                    Err(e) => println!("[ERROR] {e}"),
                },
                Some("status") => print_status(&session, &usage),
                Some("accept") => match session.log().open_invitation() {
                    Some(index) => {
                        let result = session.accept_invitation(index).await;
                        report(&session, result);
                    }
                    None => println!("[ERROR] No open invitation"),
                },
                Some("decline") => match session.log().open_invitation() {
                    Some(index) => {
                        let result = session.decline_invitation(index).await;
                        report(&session, result);
                    }
                    None => println!("[ERROR] No open invitation"),
                },
                Some("use") => match (index_arg(&parts, 1), index_arg(&parts, 2)) {
                    (Some(member), Some(item)) => match session.use_item(member, item).await {
                        Ok(Some(outcome)) => print_outcome(&session, &outcome),
                        Ok(None) => println!("[EVENT] Nothing happens."),
                        Err(e) => println!("[ERROR] {e}"),
                    },
                    _ => println!("[ERROR] Usage: #use <member> <item>"),
                },
                Some("equip") => {
                    match (index_arg(&parts, 1), index_arg(&parts, 2), slot_arg(&parts, 3)) {
                        (Some(member), Some(item), Some(slot)) => {
                            match session.equip(member, item, slot) {
                                Ok(()) => println!("[EQUIPPED] {slot}"),
                                Err(e) => println!("[ERROR] {e}"),
                            }
                        }
                        _ => println!("[ERROR] Usage: #equip <member> <item> <weapon|armor>"),
                    }
                }
                Some("unequip") => match (index_arg(&parts, 1), slot_arg(&parts, 2)) {
                    (Some(member), Some(slot)) => match session.unequip(member, slot) {
                        Ok(()) => println!("[UNEQUIPPED] {slot}"),
                        Err(e) => println!("[ERROR] {e}"),
                    },
                    _ => println!("[ERROR] Usage: #unequip <member> <weapon|armor>"),
                },
                Some("give") => {
                    match (index_arg(&parts, 1), index_arg(&parts, 2), index_arg(&parts, 3)) {
                        (Some(from), Some(item), Some(to)) => {
                            match session.transfer_item(from, ItemSource::Inventory(item), to) {
                                Ok(()) => {
                                    if let Some(event) = session.log().last() {
                                        println!("[EVENT] {}", event.text);
                                    }
                                }
                                Err(e) => println!("[ERROR] {e}"),
                            }
                        }
                        _ => println!("[ERROR] Usage: #give <from> <item> <to>"),
                    }
                }
                Some("act") => match index_arg(&parts, 1) {
                    Some(member) => match session.set_active(member) {
                        Ok(()) => {
                            if let Some(c) = session.active_character() {
                                println!("[ACTIVE] {}", c.name);
                            }
                        }
                        Err(e) => println!("[ERROR] {e}"),
                    },
                    None => println!("[ERROR] Usage: #act <member>"),
                },
                Some("help") => print_help(),
                _ => println!("[ERROR] Unknown command. Type #help for help."),
            }
            continue;
        }

        println!("[PROCESSING]");
        let result = session.submit(line).await;
        report(&session, result);
    }

    pruner.stop();
    Ok(())
}

fn report(session: &NarrativeSession, result: Result<TurnOutcome, SessionError>) {
    match result {
        Ok(outcome) => print_outcome(session, &outcome),
        Err(SessionError::GameOver) => {
            println!("[GAME OVER] The party has fallen. #load a save or #quit.")
        }
        Err(e) => println!("[ERROR] {e}"),
    }
}

fn print_outcome(session: &NarrativeSession, outcome: &TurnOutcome) {
    for event in &outcome.events {
        match event.kind {
            EventKind::Player => {}
            EventKind::System => println!("[SYSTEM] {}", event.text),
            EventKind::GameEvent => println!("[EVENT] {}", event.text),
            EventKind::Narrator => {
                if !event.text.is_empty() {
                    println!("[DM]");
                    for para in event.text.split("\n\n") {
                        println!("{para}");
                    }
                }
                if let Some(invitation) = &event.invitation {
                    println!(
                        "[INVITE] {} ({} {}) wants to join the party. #accept or #decline",
                        invitation.name, invitation.race, invitation.class
                    );
                }
            }
        }
    }
    println!();

    for note in &outcome.notifications {
        println!("[NOTICE] {note}");
    }
    if let Some(map) = session.combat().render() {
        println!("[COMBAT]");
        println!("{map}");
    }
}

fn show_new_scene(session: &NarrativeSession, last: &mut Option<String>) {
    if let Some(scene) = session.scene() {
        if last.as_deref() != Some(scene.url.as_str()) {
            println!("[SCENE] {}", scene.description);
            *last = Some(scene.url);
        }
    }
}

fn print_status(session: &NarrativeSession, usage: &UsageTracker) {
    println!("[STATUS]");
    println!("  Campaign: {}", session.campaign());
    for (i, c) in session.roster().iter().enumerate() {
        let active = if i == session.active_index() { "*" } else { " " };
        let weapon = c.equipped(EquipSlot::Weapon).map_or("-", |w| w.name.as_str());
        let armor = c.equipped(EquipSlot::Armor).map_or("-", |a| a.name.as_str());
        println!(
            "  {active}[{i}] {} ({} {}) HP {}/{} AC {} | {} | weapon: {weapon}, armor: {armor}",
            c.name,
            c.race,
            c.class,
            c.current_hp(),
            c.max_hp(),
            c.armor_class,
            c.currency,
        );
        for (j, item) in c.inventory.iter().enumerate() {
            match &item.tag {
                Some(tag) => println!("       {j}: {} ({tag})", item.name),
                None => println!("       {j}: {}", item.name),
            }
        }
    }
    println!("  In Combat: {}", session.in_combat());
    let snapshot = usage.usage();
    println!(
        "  API budget: {}/{} requests this minute ({:.0}% left)",
        snapshot.used, snapshot.limit, snapshot.percentage
    );
    if session.is_game_over() {
        println!("  GAME OVER");
    }
}

fn print_help() {
    println!("Commands:");
    println!("  #quit                           - Exit the game");
    println!("  #save [path]                    - Save the game");
    println!("  #load <path>                    - Load a saved game");
    println!("  #saves                          - List saves in this directory");
    println!("  #status                         - Show the party");
    println!("  #act <member>                   - Choose who acts next");
    println!("  #accept / #decline              - Answer the open invitation");
    println!("  #use <member> <item>            - Use a healing item");
    println!("  #equip <member> <item> <slot>   - Equip as weapon or armor");
    println!("  #unequip <member> <slot>        - Return a slot to the inventory");
    println!("  #give <from> <item> <to>        - Hand an item to another member");
    println!("  #help                           - Show this help");
    println!("  (anything else is sent as the active character's action)");
}

fn index_arg(parts: &[&str], position: usize) -> Option<usize> {
    parts.get(position)?.parse().ok()
}

fn slot_arg(parts: &[&str], position: usize) -> Option<EquipSlot> {
    match parts.get(position)?.to_lowercase().as_str() {
        "weapon" | "w" => Some(EquipSlot::Weapon),
        "armor" | "armour" | "a" => Some(EquipSlot::Armor),
        _ => None,
    }
}

/// Parse protagonist and session options from command line arguments.
pub fn parse_options_from_args(args: &[String]) -> HeadlessOptions {
    let mut options = HeadlessOptions::default();

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1);
        match (args[i].as_str(), value) {
            ("--name", Some(name)) => options.name = name.clone(),
            ("--race", Some(race)) => options.race = capitalize(race),
            ("--class", Some(class)) => options.class = capitalize(class),
            ("--gender", Some(gender)) => options.gender = capitalize(gender),
            ("--campaign", Some(id)) => options.campaign = Campaign::from_id(id),
            ("--language", Some(code)) => options.language = Some(code.clone()),
            ("--load", Some(path)) => options.load = Some(PathBuf::from(path)),
            _ => {
                i += 1;
                continue;
            }
        }
        i += 2;
    }

    options
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options_from_args(&args(&[
            "tavern",
            "--name",
            "Elara Swiftblade",
            "--race",
            "elf",
            "--class",
            "RANGER",
            "--campaign",
            "frozen-sick",
        ]));
        assert_eq!(options.name, "Elara Swiftblade");
        assert_eq!(options.race, "Elf");
        assert_eq!(options.class, "Ranger");
        assert_eq!(options.campaign, Some(Campaign::FrozenSick));
        assert!(options.load.is_none());
    }

    #[test]
    fn test_parse_options_defaults_and_dangling_flag() {
        let options = parse_options_from_args(&args(&["tavern", "--name"]));
        assert_eq!(options.name, "Adventurer");
        assert_eq!(options.class, "Fighter");
    }

    #[test]
    fn test_slot_arg() {
        assert_eq!(slot_arg(&["equip", "0", "1", "Weapon"], 3), Some(EquipSlot::Weapon));
        assert_eq!(slot_arg(&["unequip", "0", "armour"], 2), Some(EquipSlot::Armor));
        assert_eq!(slot_arg(&["unequip", "0", "hat"], 2), None);
    }
}
