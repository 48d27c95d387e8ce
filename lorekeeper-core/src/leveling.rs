//! Leveling state machine.
//!
//! ```text
//!            xp >= threshold (inside reduce)
//!   Normal ───────────────────────────────▶ LevelUpPending
//!     ▲                                           │
//!     └──────── resolve_level_up(stat) ───────────┘
//! ```
//!
//! The forward edge lives in [`crate::reducer`]. This module owns the
//! explicit resolution edge.

use tracing::info;

use crate::config::{LevelUpPolicy, ProgressionConfig};
use crate::error::{LoreError, Result};
use crate::player::LevelingState;
use crate::state::GameState;

/// Outcome of a successful level-up resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelUp {
    /// The state after the transition.
    pub state: GameState,
    /// The level reached.
    pub new_level: u32,
    /// The stat that grew, or `None` when the requested name is not one of
    /// the player's stats.
    pub stat_increased: Option<String>,
}

/// Next threshold after a level-up: `floor(threshold * factor)`, never below 1.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn next_threshold(threshold: i64, factor: f64) -> i64 {
    ((threshold as f64 * factor).floor() as i64).max(1)
}

/// Resolve a pending level-up, growing `stat`.
///
/// Applied atomically: level +1, xp minus the old threshold, threshold
/// grown by the configured factor, the named stat incremented (unknown names
/// are a no-op), max HP and mana raised, HP and mana fully restored, pending
/// flag cleared. Under [`LevelUpPolicy::Chained`] the flag is re-armed when
/// xp still meets the new threshold.
///
/// # Errors
/// Returns [`LoreError::NoLevelUpPending`] in the `Normal` state; the input
/// state is left unchanged.
pub fn resolve_level_up(state: &GameState, stat: &str, config: &ProgressionConfig) -> Result<LevelUp> {
    if state.player.leveling_state() == LevelingState::Normal {
        return Err(LoreError::NoLevelUpPending);
    }

    let mut next = state.clone();
    let p = &mut next.player;

    let threshold = p.xp_to_next_level;
    p.level = p.level.saturating_add(1);
    p.xp = p.xp.saturating_sub(threshold).max(0);
    p.xp_to_next_level = next_threshold(threshold, config.xp_growth_factor);

    let stat_increased = p.stats.get_mut(stat).map(|value| {
        *value = value.saturating_add(config.stat_increment);
        stat.to_string()
    });

    p.max_hp = p.max_hp.saturating_add(config.hp_per_level);
    p.max_mana = p.max_mana.saturating_add(config.mana_per_level);
    p.hp = p.max_hp;
    p.mana = p.max_mana;

    p.level_up_pending =
        config.level_up_policy == LevelUpPolicy::Chained && p.xp >= p.xp_to_next_level;

    info!(
        player = %p.name(),
        level = p.level,
        stat = stat_increased.as_deref().unwrap_or("none"),
        still_pending = p.level_up_pending,
        "Level-up resolved"
    );

    let new_level = p.level;
    Ok(LevelUp {
        state: next,
        new_level,
        stat_increased,
    })
}
