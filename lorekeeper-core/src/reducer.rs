//! The state reducer: merges a validated [`Delta`] into a [`GameState`].
//!
//! Merge rules:
//! - `player_updates.xp` is **additive**; every other player key overwrites
//!   the whole field (an `inventory` update replaces the map, it does not
//!   adjust item counts).
//! - `game_updates` overwrite the non-player fields.
//! - `memory_additions` are appended to story memory in order; memory is
//!   never truncated or deduplicated.
//! - After merging, HP and mana are clamped into `[0, max]` and xp is
//!   floored at zero.
//! - If the delta carried xp and the total now meets the threshold, the
//!   level-up becomes pending. The reducer never clears a pending level-up.
//!
//! The reducer is pure: no I/O, no hidden state, input untouched.

use tracing::debug;

use crate::delta::{Delta, GameUpdate, PlayerUpdate};
use crate::player::Player;
use crate::state::GameState;

/// Apply `delta` to `state`, returning the next state.
#[must_use]
pub fn reduce(state: &GameState, delta: &Delta) -> GameState {
    let mut next = state.clone();
    apply_player_updates(&mut next.player, delta);

    for update in &delta.game_updates {
        match update {
            GameUpdate::CurrentLocation(location) => next.current_location.clone_from(location),
            GameUpdate::CurrentEncounters(encounters) => next.current_encounters.clone_from(encounters),
            GameUpdate::Extension(key, value) => {
                next.extensions.insert(key.clone(), value.clone());
            }
        }
    }

    next.story_memory.extend(delta.memory_additions.iter().cloned());
    next
}

fn apply_player_updates(player: &mut Player, delta: &Delta) {
    for update in &delta.player_updates.fields {
        match update {
            PlayerUpdate::Hp(v) => player.hp = *v,
            PlayerUpdate::MaxHp(v) => player.max_hp = *v,
            PlayerUpdate::Mana(v) => player.mana = *v,
            PlayerUpdate::MaxMana(v) => player.max_mana = *v,
            PlayerUpdate::Level(v) => player.level = *v,
            PlayerUpdate::XpToNextLevel(v) => player.xp_to_next_level = *v,
            PlayerUpdate::Stats(m) => player.stats.clone_from(m),
            PlayerUpdate::Currency(m) => player.currency.clone_from(m),
            PlayerUpdate::Inventory(m) => player.inventory.clone_from(m),
            PlayerUpdate::Skills(m) => player.skills.clone_from(m),
            PlayerUpdate::Equipped(m) => player.equipped.clone_from(m),
            PlayerUpdate::Extension(key, value) => {
                player.extensions.insert(key.clone(), value.clone());
            }
        }
    }

    if let Some(gain) = delta.player_updates.xp {
        player.xp = player.xp.saturating_add(gain);
    }

    player.clamp_vitals();

    if delta.player_updates.xp.is_some() && player.xp >= player.xp_to_next_level {
        if !player.level_up_pending {
            debug!(
                xp = player.xp,
                threshold = player.xp_to_next_level,
                "Experience threshold crossed, level-up pending"
            );
        }
        player.level_up_pending = true;
    }
}
