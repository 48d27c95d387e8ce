//! Scenario templates for starting a session.
//!
//! Three presets are built in. The `custom` scenario is seeded by the
//! narrative generator from a free-text premise; its answer is validated
//! like any other generator output and replaced by a fixed opening when
//! unusable.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::delta::{extract_json_object, DeltaError};
use crate::error::LoreError;
use crate::player::{Player, PlayerOverrides};
use crate::state::GameState;
use crate::types::{Inventory, Purse};

/// Location every new session starts in.
pub const START_LOCATION: &str = "start";

/// Premise used when a custom start omits one.
pub const DEFAULT_CUSTOM_PREMISE: &str = "A lone adventurer starts a journey.";

/// Which opening to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Waking up in a tavern with a dagger and a few coppers.
    Tavern,
    /// The edge of an enchanted forest, axe in hand.
    Forest,
    /// A prison cell.
    Prison,
    /// Generator-authored from a premise.
    Custom,
}

impl FromStr for ScenarioId {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tavern" => Ok(Self::Tavern),
            "forest" => Ok(Self::Forest),
            "prison" => Ok(Self::Prison),
            "custom" => Ok(Self::Custom),
            _ => Err(LoreError::UnknownScenario(s.to_string())),
        }
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tavern => "tavern",
            Self::Forest => "forest",
            Self::Prison => "prison",
            Self::Custom => "custom",
        })
    }
}

/// A freshly built session: initial state plus what to show the player.
#[derive(Debug, Clone, PartialEq)]
pub struct Opening {
    /// Initial game state; story memory holds the opening text.
    pub state: GameState,
    /// Opening narration.
    pub story_text: String,
    /// First choices offered.
    pub choices: Vec<String>,
}

impl Opening {
    fn new(player: Player, story: &str, choices: &[&str]) -> Self {
        Self {
            state: GameState::new(player, story, START_LOCATION),
            story_text: story.to_string(),
            choices: choices.iter().map(|c| (*c).to_string()).collect(),
        }
    }
}

fn items(pairs: &[(&str, u32)]) -> Inventory {
    pairs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect()
}

/// Build a preset opening. Returns `None` for [`ScenarioId::Custom`].
#[must_use]
pub fn preset(id: ScenarioId, player_name: &str) -> Option<Opening> {
    let opening = match id {
        ScenarioId::Tavern => {
            let currency: Purse = [("gold", 0), ("silver", 0), ("copper", 15)]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let player = Player::with_overrides(
                player_name,
                PlayerOverrides {
                    currency: Some(currency),
                    inventory: Some(items(&[("Rusty Dagger", 1)])),
                    ..PlayerOverrides::default()
                },
            )
            .ok()?;
            Opening::new(
                player,
                "You awaken in a dimly lit tavern...",
                &["Look around the tavern", "Talk to the bartender", "Check my pockets"],
            )
        }
        ScenarioId::Forest => {
            let player = Player::with_overrides(
                player_name,
                PlayerOverrides {
                    hp: Some(120),
                    inventory: Some(items(&[("Sturdy Axe", 1), ("Health Potion", 1)])),
                    ..PlayerOverrides::default()
                },
            )
            .ok()?;
            Opening::new(
                player,
                "You stand at the edge of a vast, enchanted forest...",
                &["Follow the path", "Examine the plants", "Listen to the whispers"],
            )
        }
        ScenarioId::Prison => {
            let player = Player::with_overrides(
                player_name,
                PlayerOverrides {
                    hp: Some(80),
                    mana: Some(20),
                    inventory: Some(items(&[("Ragged Tunic", 1)])),
                    ..PlayerOverrides::default()
                },
            )
            .ok()?;
            Opening::new(
                player,
                "The cold, damp stone floor is your bed...",
                &["Try to reach the key", "Yell for the guard", "Examine the cell"],
            )
        }
        ScenarioId::Custom => return None,
    };
    Some(opening)
}

/// The opening used when a custom seed cannot be used.
#[must_use]
pub fn custom_fallback(player_name: &str) -> Opening {
    Opening::new(
        Player::new(player_name),
        "The threads of fate tangle...",
        &["Imagine a forest", "Imagine a city", "Imagine an ocean"],
    )
}

#[derive(Deserialize)]
struct Seed {
    story_text: String,
    choices: Vec<String>,
    player_data: SeedPlayer,
}

#[derive(Deserialize)]
struct SeedPlayer {
    hp: i64,
    mana: i64,
    currency: Purse,
    inventory: Inventory,
}

/// Parse a generator-authored scenario seed.
///
/// # Errors
/// Returns a [`DeltaError`] describing why the seed is unusable.
pub fn parse_seed(player_name: &str, raw: &str) -> Result<Opening, DeltaError> {
    let text = extract_json_object(raw)
        .ok_or_else(|| DeltaError::Malformed("no JSON object found".into()))?;
    let seed: Seed = serde_json::from_str(text).map_err(|e| {
        if e.is_data() {
            DeltaError::SchemaMismatch(e.to_string())
        } else {
            DeltaError::Malformed(e.to_string())
        }
    })?;
    let player = Player::with_overrides(
        player_name,
        PlayerOverrides {
            hp: Some(seed.player_data.hp),
            mana: Some(seed.player_data.mana),
            currency: Some(seed.player_data.currency),
            inventory: Some(seed.player_data.inventory),
            ..PlayerOverrides::default()
        },
    )
    .map_err(|e| DeltaError::SchemaMismatch(e.to_string()))?;

    Ok(Opening {
        state: GameState::new(player, seed.story_text.clone(), START_LOCATION),
        story_text: seed.story_text,
        choices: seed.choices,
    })
}

/// Build a custom opening from a generator call, falling back on any failure.
pub fn custom_from_response<E: fmt::Display>(player_name: &str, response: Result<String, E>) -> Opening {
    let parsed = match response {
        Ok(text) => parse_seed(player_name, &text),
        Err(e) => Err(DeltaError::GeneratorUnavailable(e.to_string())),
    };
    parsed.unwrap_or_else(|e| {
        warn!(error = %e, "Error generating custom scenario, using fallback opening");
        custom_fallback(player_name)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_ids_parse_case_insensitively() {
        assert_eq!("Tavern".parse::<ScenarioId>().expect("parse"), ScenarioId::Tavern);
        assert_eq!(" custom ".parse::<ScenarioId>().expect("parse"), ScenarioId::Custom);
        assert!(matches!(
            "moon".parse::<ScenarioId>(),
            Err(LoreError::UnknownScenario(_))
        ));
    }

    #[test]
    fn presets_carry_their_loadouts() {
        let tavern = preset(ScenarioId::Tavern, "Aria").expect("preset");
        assert_eq!(tavern.state.player.currency["copper"], 15);
        assert_eq!(tavern.state.player.inventory.len(), 1);
        assert_eq!(tavern.state.story_memory, vec![tavern.story_text.clone()]);
        assert_eq!(tavern.state.current_location, START_LOCATION);

        let forest = preset(ScenarioId::Forest, "Aria").expect("preset");
        assert_eq!((forest.state.player.hp, forest.state.player.max_hp), (120, 120));
        assert_eq!(forest.state.player.mana, 50);

        let prison = preset(ScenarioId::Prison, "Aria").expect("preset");
        assert_eq!((prison.state.player.hp, prison.state.player.mana), (80, 20));
        assert_eq!(prison.choices.len(), 3);

        assert!(preset(ScenarioId::Custom, "Aria").is_none());
    }

    #[test]
    fn valid_seed_builds_a_custom_player() {
        let raw = r#"```json
        {"story_text": "A sky-ship creaks.", "choices": ["Climb the mast"],
         "player_data": {"hp": 90, "mana": 70, "currency": {"gold": 3},
                         "inventory": {"Spyglass": 1}}}
        ```"#;
        let opening = parse_seed("Aria", raw).expect("valid seed");
        assert_eq!(opening.story_text, "A sky-ship creaks.");
        assert_eq!(opening.state.player.max_mana, 70);
        assert_eq!(opening.state.player.currency["gold"], 3);
    }

    #[test]
    fn unusable_seeds_fall_back() {
        for raw in [
            "no json",
            r#"{"story_text": "x", "choices": []}"#,
            r#"{"story_text": "x", "choices": [], "player_data":
                {"hp": -4, "mana": 1, "currency": {}, "inventory": {}}}"#,
        ] {
            let opening = custom_from_response::<String>("Aria", Ok(raw.to_string()));
            assert_eq!(opening, custom_fallback("Aria"), "{raw}");
        }
        let opening = custom_from_response::<String>("Aria", Err("offline".into()));
        assert_eq!(opening.story_text, "The threads of fate tangle...");
    }
}
