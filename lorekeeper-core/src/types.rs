//! Shared identity and value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::LoreError;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Opaque identifier of one saved session in the save store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveId(pub Uuid);

impl SaveId {
    /// Create a new random save ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SaveId {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| LoreError::InvalidSaveId(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Player value types
// ---------------------------------------------------------------------------

/// A combat skill the player can use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skill {
    /// Mana cost per use.
    pub cost: i64,
    /// Base damage dealt.
    pub damage: i64,
}

/// Named attribute → value (strength, agility, ...).
pub type StatMap = BTreeMap<String, i64>;

/// Denomination → amount (gold, silver, copper). Never normalised.
pub type Purse = BTreeMap<String, i64>;

/// Item name → quantity.
pub type Inventory = BTreeMap<String, u32>;

/// Skill name → skill.
pub type SkillBook = BTreeMap<String, Skill>;

/// Equipment slot → item name.
pub type Equipment = BTreeMap<String, String>;

/// Open-ended bag for keys the model does not recognise.
pub type Extensions = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_id_parses_its_own_display() {
        let id = SaveId::new();
        let parsed: SaveId = id.to_string().parse().expect("parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn garbage_save_id_is_rejected() {
        let err = "not-a-uuid".parse::<SaveId>().expect_err("should reject");
        assert!(matches!(err, LoreError::InvalidSaveId(_)));
    }
}
