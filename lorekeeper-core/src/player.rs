//! The player entity: canonical attributes and construction defaults.

use serde::{Deserialize, Serialize};

use crate::error::{LoreError, Result};
use crate::types::{Equipment, Extensions, Inventory, Purse, Skill, SkillBook, StatMap};

/// Starting HP when no override is given.
pub const DEFAULT_HP: i64 = 100;
/// Starting mana when no override is given.
pub const DEFAULT_MANA: i64 = 50;
/// Starting value of every default stat.
pub const DEFAULT_STAT_VALUE: i64 = 10;
/// Experience needed for the first level-up.
pub const DEFAULT_XP_TO_NEXT_LEVEL: i64 = 100;
/// Stats every new player starts with.
pub const DEFAULT_STATS: [&str; 4] = ["strength", "agility", "intelligence", "dexterity"];

/// Where a player is in the leveling state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelingState {
    /// No threshold has been crossed since the last resolution.
    Normal,
    /// Experience crossed the threshold; a stat choice is awaited.
    LevelUpPending,
}

/// Canonical player record, owned by exactly one [`crate::GameState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    name: String,
    /// Current hit points, `0 ≤ hp ≤ max_hp` after every reduction.
    pub hp: i64,
    /// Hit point ceiling.
    pub max_hp: i64,
    /// Current mana, `0 ≤ mana ≤ max_mana` after every reduction.
    pub mana: i64,
    /// Mana ceiling.
    pub max_mana: i64,
    /// Character level, starting at 1.
    pub level: u32,
    /// Accumulated experience, never negative.
    pub xp: i64,
    /// Threshold for the next level-up, always positive.
    pub xp_to_next_level: i64,
    /// Named attributes.
    pub stats: StatMap,
    /// Money by denomination.
    pub currency: Purse,
    /// Carried items.
    pub inventory: Inventory,
    /// Known skills.
    pub skills: SkillBook,
    /// Equipped items by slot.
    pub equipped: Equipment,
    /// True while a crossed threshold awaits resolution.
    #[serde(default)]
    pub level_up_pending: bool,
    /// Generator-supplied keys with no counterpart on this record.
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

/// Optional starting values for [`Player::with_overrides`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerOverrides {
    /// Starting (and maximum) HP.
    pub hp: Option<i64>,
    /// Starting (and maximum) mana.
    pub mana: Option<i64>,
    /// Starting purse.
    pub currency: Option<Purse>,
    /// Starting inventory.
    pub inventory: Option<Inventory>,
    /// Starting skills.
    pub skills: Option<SkillBook>,
    /// Starting stats.
    pub stats: Option<StatMap>,
}

impl Player {
    /// Create a player with every default.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), PlayerOverrides::default())
    }

    /// Create a player, validating the supplied overrides.
    ///
    /// # Errors
    /// Returns [`LoreError::InvalidOverride`] for negative HP, mana,
    /// currency amounts or skill values.
    pub fn with_overrides(name: impl Into<String>, overrides: PlayerOverrides) -> Result<Self> {
        check_non_negative("hp", overrides.hp)?;
        check_non_negative("mana", overrides.mana)?;
        if let Some(purse) = &overrides.currency {
            if let Some((denomination, amount)) = purse.iter().find(|(_, v)| **v < 0) {
                return Err(LoreError::InvalidOverride {
                    field: "currency",
                    reason: format!("{denomination} is negative ({amount})"),
                });
            }
        }
        if let Some(skills) = &overrides.skills {
            if let Some((skill, _)) = skills.iter().find(|(_, s)| s.cost < 0 || s.damage < 0) {
                return Err(LoreError::InvalidOverride {
                    field: "skills",
                    reason: format!("{skill} has a negative cost or damage"),
                });
            }
        }
        Ok(Self::build(name.into(), overrides))
    }

    fn build(name: String, overrides: PlayerOverrides) -> Self {
        let hp = overrides.hp.unwrap_or(DEFAULT_HP);
        let mana = overrides.mana.unwrap_or(DEFAULT_MANA);
        Self {
            name,
            hp,
            max_hp: hp,
            mana,
            max_mana: mana,
            level: 1,
            xp: 0,
            xp_to_next_level: DEFAULT_XP_TO_NEXT_LEVEL,
            stats: overrides.stats.unwrap_or_else(default_stats),
            currency: overrides.currency.unwrap_or_else(default_currency),
            inventory: overrides.inventory.unwrap_or_else(default_inventory),
            skills: overrides.skills.unwrap_or_else(default_skills),
            equipped: default_equipment(),
            level_up_pending: false,
            extensions: Extensions::new(),
        }
    }

    /// The player's name. Fixed at creation.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current leveling state, derived from the pending flag.
    #[must_use]
    pub fn leveling_state(&self) -> LevelingState {
        if self.level_up_pending {
            LevelingState::LevelUpPending
        } else {
            LevelingState::Normal
        }
    }

    /// Pull HP, mana and xp back inside their invariants.
    pub(crate) fn clamp_vitals(&mut self) {
        self.max_hp = self.max_hp.max(0);
        self.max_mana = self.max_mana.max(0);
        self.hp = self.hp.clamp(0, self.max_hp);
        self.mana = self.mana.clamp(0, self.max_mana);
        self.xp = self.xp.max(0);
    }
}

fn check_non_negative(field: &'static str, value: Option<i64>) -> Result<()> {
    match value {
        Some(v) if v < 0 => Err(LoreError::InvalidOverride {
            field,
            reason: format!("must not be negative (got {v})"),
        }),
        _ => Ok(()),
    }
}

fn default_stats() -> StatMap {
    DEFAULT_STATS
        .iter()
        .map(|s| ((*s).to_string(), DEFAULT_STAT_VALUE))
        .collect()
}

fn default_currency() -> Purse {
    [("gold", 0), ("silver", 0), ("copper", 20)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn default_inventory() -> Inventory {
    [("Health Potion".to_string(), 2)].into_iter().collect()
}

fn default_skills() -> SkillBook {
    [
        ("Slash".to_string(), Skill { cost: 5, damage: 12 }),
        ("Fireball".to_string(), Skill { cost: 15, damage: 25 }),
    ]
    .into_iter()
    .collect()
}

fn default_equipment() -> Equipment {
    [("weapon", "Rusty Sword"), ("armor", "Leather Tunic")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_fresh_adventurer() {
        let p = Player::new("Aria");
        assert_eq!(p.name(), "Aria");
        assert_eq!((p.hp, p.max_hp, p.mana, p.max_mana), (100, 100, 50, 50));
        assert_eq!((p.level, p.xp, p.xp_to_next_level), (1, 0, 100));
        assert_eq!(p.stats.len(), 4);
        assert!(p.stats.values().all(|v| *v == 10));
        assert_eq!(p.currency["copper"], 20);
        assert_eq!(p.inventory["Health Potion"], 2);
        assert_eq!(p.skills["Fireball"], Skill { cost: 15, damage: 25 });
        assert_eq!(p.equipped["weapon"], "Rusty Sword");
        assert_eq!(p.leveling_state(), LevelingState::Normal);
    }

    #[test]
    fn overrides_set_both_current_and_max() {
        let p = Player::with_overrides(
            "Brom",
            PlayerOverrides {
                hp: Some(120),
                mana: Some(20),
                ..PlayerOverrides::default()
            },
        )
        .expect("valid");
        assert_eq!((p.hp, p.max_hp, p.mana, p.max_mana), (120, 120, 20, 20));
        assert_eq!(p.inventory["Health Potion"], 2, "untouched fields keep defaults");
    }

    #[test]
    fn negative_overrides_are_rejected() {
        let err = Player::with_overrides(
            "Brom",
            PlayerOverrides {
                hp: Some(-5),
                ..PlayerOverrides::default()
            },
        )
        .expect_err("should reject");
        assert!(matches!(err, LoreError::InvalidOverride { field: "hp", .. }));

        let purse = [("gold".to_string(), -1)].into_iter().collect();
        let err = Player::with_overrides(
            "Brom",
            PlayerOverrides {
                currency: Some(purse),
                ..PlayerOverrides::default()
            },
        )
        .expect_err("should reject");
        assert!(matches!(err, LoreError::InvalidOverride { field: "currency", .. }));
    }

    #[test]
    fn clamp_pulls_vitals_into_range() {
        let mut p = Player::new("Cid");
        p.hp = 250;
        p.mana = -4;
        p.xp = -30;
        p.clamp_vitals();
        assert_eq!(p.hp, 100);
        assert_eq!(p.mana, 0);
        assert_eq!(p.xp, 0);
    }

    #[test]
    fn extensions_are_omitted_when_empty() {
        let json = serde_json::to_value(Player::new("Dara")).expect("serialize");
        assert!(json.get("extensions").is_none());
        assert_eq!(json["max_hp"], 100);
    }
}
