//! The game-state aggregate: one player plus narrative context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::player::Player;
use crate::types::Extensions;

/// Root aggregate and unit of persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// The one player this session belongs to.
    pub player: Player,
    /// Narrative facts, oldest first. Append-only.
    #[serde(default)]
    pub story_memory: Vec<String>,
    /// Where the player currently is.
    #[serde(default)]
    pub current_location: String,
    /// Opaque encounter records, passed through untouched.
    #[serde(default, alias = "current_enemies")]
    pub current_encounters: Vec<serde_json::Value>,
    /// Set by the save store on write, never by the reducer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_at: Option<DateTime<Utc>>,
    /// Generator-supplied game keys with no counterpart on this record.
    #[serde(default, skip_serializing_if = "Extensions::is_empty")]
    pub extensions: Extensions,
}

impl GameState {
    /// Start a new session state with an opening story fact.
    #[must_use]
    pub fn new(player: Player, opening: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            player,
            story_memory: vec![opening.into()],
            current_location: location.into(),
            current_encounters: Vec::new(),
            last_saved_at: None,
            extensions: Extensions::new(),
        }
    }

    /// Serialize for the generator prompt. The save timestamp is left out
    /// since it carries no narrative meaning.
    ///
    /// # Errors
    /// Returns `LoreError::Serialization` if encoding fails.
    pub fn to_prompt_json(&self) -> crate::Result<String> {
        let mut value =
            serde_json::to_value(self).map_err(|e| crate::LoreError::Serialization(e.to_string()))?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("last_saved_at");
        }
        serde_json::to_string_pretty(&value).map_err(|e| crate::LoreError::Serialization(e.to_string()))
    }

    /// True when every state field except the save timestamp matches.
    #[must_use]
    pub fn same_progress(&self, other: &Self) -> bool {
        self.player == other.player
            && self.story_memory == other.story_memory
            && self.current_location == other.current_location
            && self.current_encounters == other.current_encounters
            && self.extensions == other.extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trip_ignores_only_the_save_timestamp() {
        let mut state = GameState::new(Player::new("Aria"), "You wake up.", "start");
        state.current_encounters.push(json!({"name": "Goblin", "hp": 7}));
        state.player.extensions.insert("title".into(), json!("Slayer"));

        let encoded = serde_json::to_string(&state).expect("serialize");
        let mut decoded: GameState = serde_json::from_str(&encoded).expect("deserialize");
        decoded.last_saved_at = Some(Utc::now());

        assert!(decoded.same_progress(&state));
        assert_ne!(decoded, state);
    }

    #[test]
    fn legacy_enemy_key_is_accepted() {
        let raw = json!({
            "player": serde_json::to_value(Player::new("Aria")).expect("player"),
            "story_memory": ["You wake up."],
            "current_location": "start",
            "current_enemies": [{"name": "Rat"}],
        });
        let state: GameState = serde_json::from_value(raw).expect("deserialize");
        assert_eq!(state.current_encounters.len(), 1);
    }

    #[test]
    fn prompt_json_omits_save_timestamp() {
        let mut state = GameState::new(Player::new("Aria"), "You wake up.", "start");
        state.last_saved_at = Some(Utc::now());
        let text = state.to_prompt_json().expect("encode");
        assert!(!text.contains("last_saved_at"));
        assert!(text.contains("You wake up."));
    }
}
