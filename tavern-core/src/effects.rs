//! Applying directives to the roster and session state.
//!
//! [`apply_directive`] performs at most one roster mutation per directive and
//! describes what happened as an [`Effect`]. Problems local to a directive
//! (an unknown damage target, an unaffordable purchase) are effects too, so
//! they can never abort the rest of the turn; they log a system line and
//! leave the roster alone.

use crate::character::{InventoryItem, Wallet};
use crate::combat::CombatState;
use crate::directive::Directive;
use crate::roster::Roster;
use crate::story::{Invitation, StoryEvent};
use tracing::{debug, warn};

/// System line logged when a scene image is requested.
pub const SCENE_SETTING_TEXT: &str = "The scene is being set...";

/// System line logged when an invitation arrives while the party is full.
pub const PARTY_FULL_TEXT: &str = "Your party is full.";

/// The outcome of one directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    CurrencyRewarded {
        character: usize,
        amount: Wallet,
    },
    ItemAcquired {
        character: usize,
        item: InventoryItem,
    },
    Purchased {
        character: usize,
        items: Vec<String>,
        cost: Wallet,
    },
    PurchaseDeclined {
        character: usize,
        items: Vec<String>,
    },
    Damaged {
        character: usize,
        target: String,
        amount: i32,
        new_hp: i32,
    },
    DamageTargetMissing {
        target: String,
    },
    /// A scene image should be generated; the session dispatches it.
    SceneRequested {
        description: String,
    },
    CombatMapUpdated {
        combatants: usize,
    },
    DistanceUpdated {
        meters: u32,
    },
    CombatEnded,
    QuestCompleted {
        quest: String,
    },
    InvitationOffered(Invitation),
    /// A second invitation while one is still open.
    InvitationDropped {
        name: String,
    },
    PartyFull,
}

impl Effect {
    /// The log line this effect contributes, if any.
    pub fn log_entry(&self) -> Option<StoryEvent> {
        match self {
            Effect::CurrencyRewarded { amount, .. } if !amount.is_empty() => {
                Some(StoryEvent::game_event(format!("Received {amount}.")))
            }
            Effect::ItemAcquired { item, .. } => {
                Some(StoryEvent::game_event(format!("You acquired: {}", item.name)))
            }
            Effect::Purchased { items, cost, .. } => Some(StoryEvent::game_event(format!(
                "Bought {} for {cost}.",
                items.join(", ")
            ))),
            Effect::PurchaseDeclined { items, .. } => Some(StoryEvent::system(format!(
                "You cannot afford {}.",
                items.join(", ")
            ))),
            Effect::Damaged { target, amount, .. } => Some(StoryEvent::game_event(format!(
                "{target} took {amount} damage."
            ))),
            Effect::DamageTargetMissing { target } => Some(StoryEvent::system(format!(
                "No one named {target} is in the party."
            ))),
            Effect::SceneRequested { .. } => Some(StoryEvent::system(SCENE_SETTING_TEXT)),
            Effect::PartyFull => Some(StoryEvent::system(PARTY_FULL_TEXT)),
            _ => None,
        }
    }
}

/// Mutable state a directive may touch.
pub struct EffectContext<'a> {
    pub roster: &'a mut Roster,
    pub combat: &'a mut CombatState,
    /// The character acting this turn; currency and items go to them.
    pub acting: usize,
    /// An invitation is already open, from an earlier turn or earlier in
    /// this one.
    pub invitation_open: bool,
}

/// Apply one directive. Returns `None` for well-formed no-ops.
pub fn apply_directive(directive: &Directive, ctx: &mut EffectContext<'_>) -> Option<Effect> {
    let effect = match directive {
        Directive::RewardCurrency(amount) => {
            let amount = *amount;
            ctx.roster
                .update(ctx.acting, |c| {
                    c.currency.deposit(amount);
                    Ok(())
                })
                .ok()?;
            Effect::CurrencyRewarded {
                character: ctx.acting,
                amount,
            }
        }

        Directive::Item { name, tag } => {
            let item = InventoryItem::tagged(name.clone(), tag.clone());
            let added = item.clone();
            ctx.roster
                .update(ctx.acting, move |c| {
                    c.inventory.push(added);
                    Ok(())
                })
                .ok()?;
            Effect::ItemAcquired {
                character: ctx.acting,
                item,
            }
        }

        Directive::Transaction { cost, tag, items } => {
            if items.is_empty() {
                debug!("Transaction without items ignored");
                return None;
            }
            let wallet = ctx.roster.get(ctx.acting)?.currency;
            match wallet.spend(*cost) {
                Some(remaining) => {
                    let bought: Vec<InventoryItem> = items
                        .iter()
                        .map(|name| InventoryItem {
                            name: name.clone(),
                            tag: tag.clone(),
                        })
                        .collect();
                    ctx.roster
                        .update(ctx.acting, move |c| {
                            c.currency = remaining;
                            c.inventory.extend(bought);
                            Ok(())
                        })
                        .ok()?;
                    Effect::Purchased {
                        character: ctx.acting,
                        items: items.clone(),
                        cost: *cost,
                    }
                }
                None => Effect::PurchaseDeclined {
                    character: ctx.acting,
                    items: items.clone(),
                },
            }
        }

        Directive::Damage { target, amount } => {
            let Some(index) = ctx.roster.find_by_first_name(target) else {
                warn!(target = %target, "Damage target not in the party");
                return Some(Effect::DamageTargetMissing {
                    target: target.clone(),
                });
            };
            let amount = *amount;
            let new_hp = ctx
                .roster
                .update(index, |c| Ok(c.take_damage(amount)))
                .ok()?;
            Effect::Damaged {
                character: index,
                target: target.clone(),
                amount,
                new_hp,
            }
        }

        Directive::Ambiance { description } => Effect::SceneRequested {
            description: description.clone(),
        },

        Directive::Minimap { combatants } => {
            ctx.combat.set_grid(combatants.clone());
            Effect::CombatMapUpdated {
                combatants: combatants.len(),
            }
        }

        Directive::DistanceInfo { meters } => {
            ctx.combat.set_distance(*meters);
            Effect::DistanceUpdated { meters: *meters }
        }

        Directive::CombatEnd => {
            ctx.combat.end();
            Effect::CombatEnded
        }

        Directive::QuestComplete { quest } => Effect::QuestCompleted {
            quest: quest.clone(),
        },

        Directive::InviteCharacter(invitation) => {
            if ctx.roster.is_full() {
                Effect::PartyFull
            } else if ctx.invitation_open {
                warn!(name = %invitation.name, "Invitation dropped, another is still open");
                Effect::InvitationDropped {
                    name: invitation.name.clone(),
                }
            } else {
                ctx.invitation_open = true;
                Effect::InvitationOffered(invitation.clone())
            }
        }
    };

    debug!(?effect, "Applied directive");
    Some(effect)
}

/// Apply directives in order, collecting their effects.
pub fn apply_all<'d>(
    directives: impl IntoIterator<Item = &'d Directive>,
    ctx: &mut EffectContext<'_>,
) -> Vec<Effect> {
    directives
        .into_iter()
        .filter_map(|d| apply_directive(d, ctx))
        .collect()
}
