//! Delta validation — turning untrusted generator output into a typed delta.
//!
//! The narrative generator answers every action with text that *should*
//! contain one JSON object:
//!
//! ```json
//! {
//!   "story_text": "...",
//!   "choices": ["...", "..."],
//!   "player_updates": { "xp": 15, "hp": 80 },
//!   "game_updates": { "current_location": "Crypt" },
//!   "memory_additions": "The torch flickers."
//! }
//! ```
//!
//! Nothing about that text is trusted. [`validate`] never fails: transport
//! errors, non-JSON text and schema mismatches all collapse into
//! [`Delta::fallback`], and individual update values of the wrong type are
//! dropped (and reported) without discarding the rest of the delta.

use std::fmt;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Equipment, Inventory, Purse, Skill, SkillBook, StatMap};

/// Story text shown when the generator could not be understood.
pub const FALLBACK_STORY_TEXT: &str =
    "(The AI failed to respond correctly. Please try a different action.)";

/// Choices offered when the generator could not be understood.
pub const FALLBACK_CHOICES: [&str; 3] = ["Look around", "Check my inventory", "Wait"];

/// Fact recorded in story memory when the generator could not be understood.
pub const FALLBACK_MEMORY: &str = "The player felt a strange magical interference.";

// ---------------------------------------------------------------------------
// Typed delta
// ---------------------------------------------------------------------------

/// One overwrite onto the player record.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerUpdate {
    /// Replace current HP.
    Hp(i64),
    /// Replace max HP.
    MaxHp(i64),
    /// Replace current mana.
    Mana(i64),
    /// Replace max mana.
    MaxMana(i64),
    /// Replace the level.
    Level(u32),
    /// Replace the next-level threshold.
    XpToNextLevel(i64),
    /// Replace the whole stat map.
    Stats(StatMap),
    /// Replace the whole purse.
    Currency(Purse),
    /// Replace the whole inventory.
    Inventory(Inventory),
    /// Replace the whole skill book.
    Skills(SkillBook),
    /// Replace the whole equipment map.
    Equipped(Equipment),
    /// Unrecognised key, routed to the player's extension bag.
    Extension(String, Value),
}

/// Changes proposed for the player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlayerUpdates {
    /// Additive experience change.
    pub xp: Option<i64>,
    /// Direct overwrites, applied in order.
    pub fields: Vec<PlayerUpdate>,
}

impl PlayerUpdates {
    /// True when nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.xp.is_none() && self.fields.is_empty()
    }
}

/// One overwrite onto the non-player part of the game state.
#[derive(Debug, Clone, PartialEq)]
pub enum GameUpdate {
    /// Move the player somewhere else.
    CurrentLocation(String),
    /// Replace the encounter list.
    CurrentEncounters(Vec<Value>),
    /// Unrecognised key, routed to the game state's extension bag.
    Extension(String, Value),
}

/// A structurally valid delta, ready for the reducer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delta {
    /// Narration shown to the player.
    pub story_text: String,
    /// Suggested next actions.
    pub choices: Vec<String>,
    /// Player changes.
    pub player_updates: PlayerUpdates,
    /// Game-state changes.
    pub game_updates: Vec<GameUpdate>,
    /// Facts to append to story memory, in order.
    pub memory_additions: Vec<String>,
}

impl Delta {
    /// The fixed delta substituted whenever generator output is unusable.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            story_text: FALLBACK_STORY_TEXT.to_string(),
            choices: FALLBACK_CHOICES.iter().map(|c| (*c).to_string()).collect(),
            player_updates: PlayerUpdates::default(),
            game_updates: Vec::new(),
            memory_additions: vec![FALLBACK_MEMORY.to_string()],
        }
    }
}

// ---------------------------------------------------------------------------
// Validation report
// ---------------------------------------------------------------------------

/// Why the fallback delta was used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// The generator call itself failed.
    #[error("narrative generator unavailable: {0}")]
    GeneratorUnavailable(String),
    /// The text did not contain parseable JSON.
    #[error("generator output is not valid JSON: {0}")]
    Malformed(String),
    /// The JSON did not have the delta shape.
    #[error("generator output does not match the delta schema: {0}")]
    SchemaMismatch(String),
}

/// Which part of the delta a rejected key belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateScope {
    /// `player_updates`.
    Player,
    /// `game_updates`.
    Game,
}

impl fmt::Display for UpdateScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("player_updates"),
            Self::Game => f.write_str("game_updates"),
        }
    }
}

/// An update key that was dropped during validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedUpdate {
    /// Where the key appeared.
    pub scope: UpdateScope,
    /// The key as sent by the generator.
    pub key: String,
    /// Why it was dropped.
    pub reason: String,
}

/// Result of validating one generator response. Always carries a usable delta.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// The delta to hand to the reducer.
    pub delta: Delta,
    /// Set when [`Delta::fallback`] replaced the generator output.
    pub fallback_reason: Option<DeltaError>,
    /// Keys dropped from an otherwise valid delta.
    pub rejected: Vec<RejectedUpdate>,
}

impl Validated {
    /// Whether the fallback delta is in use.
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback_reason.is_some()
    }

    fn fallback(reason: DeltaError) -> Self {
        Self {
            delta: Delta::fallback(),
            fallback_reason: Some(reason),
            rejected: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Validate the outcome of a generator call, transport errors included.
pub fn validate_response<E: fmt::Display>(response: Result<String, E>) -> Validated {
    match response {
        Ok(text) => validate(&text),
        Err(e) => {
            warn!(error = %e, "Narrative generator unavailable, using fallback delta");
            Validated::fallback(DeltaError::GeneratorUnavailable(e.to_string()))
        }
    }
}

/// Validate raw generator text.
#[must_use]
pub fn validate(raw: &str) -> Validated {
    match parse_delta(raw) {
        Ok((delta, rejected)) => {
            for r in &rejected {
                warn!(scope = %r.scope, key = %r.key, reason = %r.reason, "Dropped delta update");
            }
            debug!(
                choices = delta.choices.len(),
                player_updates = delta.player_updates.fields.len(),
                game_updates = delta.game_updates.len(),
                memory_additions = delta.memory_additions.len(),
                "Validated delta"
            );
            Validated {
                delta,
                fallback_reason: None,
                rejected,
            }
        }
        Err(reason) => {
            warn!(error = %reason, raw = %raw, "Unusable generator output, using fallback delta");
            Validated::fallback(reason)
        }
    }
}

/// Strip code fences and surrounding prose, leaving the JSON object text.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.strip_prefix("json").unwrap_or(rest);
        text = text.trim_end().strip_suffix("```").unwrap_or(text).trim();
    }
    if text.starts_with('{') && text.ends_with('}') {
        return Some(text);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

type Parsed = (Delta, Vec<RejectedUpdate>);

fn parse_delta(raw: &str) -> Result<Parsed, DeltaError> {
    let text = extract_json_object(raw)
        .ok_or_else(|| DeltaError::Malformed("no JSON object found".into()))?;
    let value: Value =
        serde_json::from_str(text).map_err(|e| DeltaError::Malformed(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(DeltaError::SchemaMismatch("top level is not an object".into()));
    };

    let story_text = match field(&obj, "story_text", "storyText") {
        Some(Value::String(s)) => s.clone(),
        Some(_) => return Err(DeltaError::SchemaMismatch("story_text is not a string".into())),
        None => return Err(DeltaError::SchemaMismatch("story_text is missing".into())),
    };

    let choices = match field(&obj, "choices", "choices") {
        Some(v) => string_list(v)
            .ok_or_else(|| DeltaError::SchemaMismatch("choices is not a list of strings".into()))?,
        None => return Err(DeltaError::SchemaMismatch("choices is missing".into())),
    };

    let memory_additions = match field(&obj, "memory_additions", "memoryAdditions") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(s)) => vec![s.clone()],
        Some(v) => string_list(v).ok_or_else(|| {
            DeltaError::SchemaMismatch("memory_additions is neither a string nor a list of strings".into())
        })?,
    }
    .into_iter()
    .filter(|m| !m.trim().is_empty())
    .collect();

    let mut rejected = Vec::new();

    let player_updates = match object_field(&obj, "player_updates", "playerUpdates")? {
        Some(map) => parse_player_updates(map, &mut rejected),
        None => PlayerUpdates::default(),
    };

    let game_updates = match object_field(&obj, "game_updates", "gameUpdates")? {
        Some(map) => parse_game_updates(map, &mut rejected),
        None => Vec::new(),
    };

    Ok((
        Delta {
            story_text,
            choices,
            player_updates,
            game_updates,
            memory_additions,
        },
        rejected,
    ))
}

fn field<'a>(obj: &'a Map<String, Value>, snake: &str, camel: &str) -> Option<&'a Value> {
    obj.get(snake).or_else(|| obj.get(camel))
}

fn object_field<'a>(
    obj: &'a Map<String, Value>,
    snake: &str,
    camel: &str,
) -> Result<Option<&'a Map<String, Value>>, DeltaError> {
    match field(obj, snake, camel) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(DeltaError::SchemaMismatch(format!("{snake} is not an object"))),
    }
}

fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Accept integers, finite floats (truncated) and numeric strings.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            let f = n.as_f64()?;
            (f.is_finite() && f.abs() < i64::MAX as f64).then(|| f.trunc() as i64)
        }),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| integer(&Value::from(s.parse::<f64>().ok()?)))
        }
        _ => None,
    }
}

fn integer_map(value: &Value) -> Result<StatMap, String> {
    let map = value.as_object().ok_or("expected an object")?;
    map.iter()
        .map(|(k, v)| {
            integer(v)
                .map(|n| (k.clone(), n))
                .ok_or_else(|| format!("{k} is not a number"))
        })
        .collect()
}

fn inventory(value: &Value) -> Result<Inventory, String> {
    integer_map(value)?
        .into_iter()
        .map(|(item, qty)| {
            u32::try_from(qty)
                .map(|q| (item.clone(), q))
                .map_err(|_| format!("{item} has an invalid quantity ({qty})"))
        })
        .collect()
}

fn skills(value: &Value) -> Result<SkillBook, String> {
    let map = value.as_object().ok_or("expected an object")?;
    map.iter()
        .map(|(name, v)| {
            let cost = v.get("cost").and_then(integer);
            let damage = v.get("damage").and_then(integer);
            match (cost, damage) {
                (Some(cost), Some(damage)) => Ok((name.clone(), Skill { cost, damage })),
                _ => Err(format!("{name} needs numeric cost and damage")),
            }
        })
        .collect()
}

fn equipment(value: &Value) -> Result<Equipment, String> {
    let map = value.as_object().ok_or("expected an object")?;
    map.iter()
        .map(|(slot, v)| {
            v.as_str()
                .map(|item| (slot.clone(), item.to_string()))
                .ok_or_else(|| format!("{slot} is not a string"))
        })
        .collect()
}

fn parse_player_updates(map: &Map<String, Value>, rejected: &mut Vec<RejectedUpdate>) -> PlayerUpdates {
    let mut updates = PlayerUpdates::default();
    for (key, value) in map {
        let parsed: Result<Option<PlayerUpdate>, String> = match key.as_str() {
            "xp" => match integer(value) {
                Some(xp) => {
                    updates.xp = Some(xp);
                    Ok(None)
                }
                None => Err("not a number".into()),
            },
            "hp" => integer(value).map(PlayerUpdate::Hp).map(Some).ok_or_else(|| "not a number".into()),
            "mana" => integer(value).map(PlayerUpdate::Mana).map(Some).ok_or_else(|| "not a number".into()),
            "max_hp" | "maxHp" => non_negative(value).map(|n| Some(PlayerUpdate::MaxHp(n))),
            "max_mana" | "maxMana" => non_negative(value).map(|n| Some(PlayerUpdate::MaxMana(n))),
            "level" => integer(value)
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n >= 1)
                .map(|n| Some(PlayerUpdate::Level(n)))
                .ok_or_else(|| "must be an integer >= 1".into()),
            "xp_to_next_level" | "xpToNextLevel" => integer(value)
                .filter(|n| *n > 0)
                .map(|n| Some(PlayerUpdate::XpToNextLevel(n)))
                .ok_or_else(|| "must be an integer > 0".into()),
            "stats" => integer_map(value).map(|m| Some(PlayerUpdate::Stats(m))),
            "currency" => integer_map(value).map(|m| Some(PlayerUpdate::Currency(m))),
            "inventory" => inventory(value).map(|m| Some(PlayerUpdate::Inventory(m))),
            "skills" => skills(value).map(|m| Some(PlayerUpdate::Skills(m))),
            "equipped" => equipment(value).map(|m| Some(PlayerUpdate::Equipped(m))),
            "name" => Err("the player name cannot change".into()),
            "level_up_pending" | "levelUpPending" => Err("owned by the leveling state machine".into()),
            _ => Ok(Some(PlayerUpdate::Extension(key.clone(), value.clone()))),
        };
        match parsed {
            Ok(Some(update)) => updates.fields.push(update),
            Ok(None) => {}
            Err(reason) => rejected.push(RejectedUpdate {
                scope: UpdateScope::Player,
                key: key.clone(),
                reason,
            }),
        }
    }
    updates
}

fn non_negative(value: &Value) -> Result<i64, String> {
    integer(value)
        .filter(|n| *n >= 0)
        .ok_or_else(|| "must be a non-negative number".into())
}

fn parse_game_updates(map: &Map<String, Value>, rejected: &mut Vec<RejectedUpdate>) -> Vec<GameUpdate> {
    let mut updates = Vec::new();
    for (key, value) in map {
        let parsed = match key.as_str() {
            "current_location" | "currentLocation" => value
                .as_str()
                .map(|s| GameUpdate::CurrentLocation(s.to_string()))
                .ok_or_else(|| "not a string".to_string()),
            "current_encounters" | "currentEncounters" | "current_enemies" => value
                .as_array()
                .map(|a| GameUpdate::CurrentEncounters(a.clone()))
                .ok_or_else(|| "not a list".to_string()),
            "player" => Err("player changes belong in player_updates".to_string()),
            "story_memory" | "storyMemory" => {
                Err("story memory only grows through memory_additions".to_string())
            }
            "last_saved_at" | "lastSavedAt" => Err("set by the save store".to_string()),
            _ => Ok(GameUpdate::Extension(key.clone(), value.clone())),
        };
        match parsed {
            Ok(update) => updates.push(update),
            Err(reason) => rejected.push(RejectedUpdate {
                scope: UpdateScope::Game,
                key: key.clone(),
                reason,
            }),
        }
    }
    updates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(raw: &str) -> Validated {
        let v = validate(raw);
        assert!(!v.is_fallback(), "unexpected fallback: {:?}", v.fallback_reason);
        v
    }

    #[test]
    fn well_formed_delta_is_typed() {
        let v = ok(r#"{
            "story_text": "A goblin falls.",
            "choices": ["Loot it", "Move on"],
            "player_updates": {"xp": 15, "hp": 80, "inventory": {"Goblin Ear": 1}},
            "game_updates": {"current_location": "Cave mouth"},
            "memory_additions": ["Killed a goblin.", "Found a cave."]
        }"#);
        let d = v.delta;
        assert_eq!(d.story_text, "A goblin falls.");
        assert_eq!(d.choices, vec!["Loot it", "Move on"]);
        assert_eq!(d.player_updates.xp, Some(15));
        assert!(d.player_updates.fields.contains(&PlayerUpdate::Hp(80)));
        assert!(d.game_updates.contains(&GameUpdate::CurrentLocation("Cave mouth".into())));
        assert_eq!(d.memory_additions, vec!["Killed a goblin.", "Found a cave."]);
        assert!(v.rejected.is_empty());
    }

    #[test]
    fn non_json_text_yields_the_exact_fallback() {
        let v = validate("The dungeon master is taking a nap.");
        assert!(matches!(v.fallback_reason, Some(DeltaError::Malformed(_))));
        assert_eq!(v.delta.story_text, FALLBACK_STORY_TEXT);
        assert_eq!(v.delta.choices, vec!["Look around", "Check my inventory", "Wait"]);
        assert!(v.delta.player_updates.is_empty());
        assert!(v.delta.game_updates.is_empty());
        assert_eq!(v.delta.memory_additions, vec![FALLBACK_MEMORY]);
    }

    #[test]
    fn transport_error_yields_fallback() {
        let v = validate_response::<String>(Err("connection refused".into()));
        assert!(matches!(v.fallback_reason, Some(DeltaError::GeneratorUnavailable(_))));
        assert_eq!(v.delta, Delta::fallback());
    }

    #[test]
    fn schema_mismatch_yields_fallback() {
        for raw in [
            r#"{"story_text": null, "choices": []}"#,
            r#"{"choices": []}"#,
            r#"{"story_text": 7, "choices": []}"#,
            r#"{"story_text": "x", "choices": "Run"}"#,
            r#"{"story_text": "x", "choices": [], "player_updates": [1]}"#,
            r#"{"story_text": "x", "choices": [], "memory_additions": 3}"#,
        ] {
            let v = validate(raw);
            assert!(
                matches!(v.fallback_reason, Some(DeltaError::SchemaMismatch(_))),
                "{raw} -> {:?}",
                v.fallback_reason
            );
        }
    }

    #[test]
    fn code_fences_and_prose_are_stripped() {
        let v = ok("```json\n{\"story_text\": \"Hi\", \"choices\": []}\n```");
        assert_eq!(v.delta.story_text, "Hi");

        let v = ok("Sure! Here you go: {\"story_text\": \"Hey\", \"choices\": [\"Wave\"]} Enjoy.");
        assert_eq!(v.delta.choices, vec!["Wave"]);
    }

    #[test]
    fn camel_case_keys_are_accepted() {
        let v = ok(r#"{"storyText": "Hi", "choices": [], "playerUpdates": {"maxHp": 130},
                       "gameUpdates": {"currentLocation": "Inn"}, "memoryAdditions": "Rested."}"#);
        assert_eq!(v.delta.player_updates.fields, vec![PlayerUpdate::MaxHp(130)]);
        assert_eq!(v.delta.memory_additions, vec!["Rested."]);
    }

    #[test]
    fn optional_sections_default_to_empty() {
        let v = ok(r#"{"story_text": "Quiet.", "choices": ["Wait"]}"#);
        assert!(v.delta.player_updates.is_empty());
        assert!(v.delta.game_updates.is_empty());
        assert!(v.delta.memory_additions.is_empty());
    }

    #[test]
    fn numeric_values_are_coerced() {
        let v = ok(r#"{"story_text": "x", "choices": [],
                       "player_updates": {"xp": "15", "hp": 42.9, "mana": "7.5"}}"#);
        assert_eq!(v.delta.player_updates.xp, Some(15));
        assert!(v.delta.player_updates.fields.contains(&PlayerUpdate::Hp(42)));
        assert!(v.delta.player_updates.fields.contains(&PlayerUpdate::Mana(7)));
    }

    #[test]
    fn badly_typed_values_are_dropped_individually() {
        let v = ok(r#"{"story_text": "x", "choices": [],
                       "player_updates": {"xp": "lots", "hp": 50, "level": 0,
                                          "inventory": {"Rope": -1}, "name": "Bob",
                                          "level_up_pending": true},
                       "game_updates": {"current_location": 12, "story_memory": []}}"#);
        let keys: Vec<_> = v.rejected.iter().map(|r| r.key.as_str()).collect();
        for key in ["xp", "level", "inventory", "name", "level_up_pending", "current_location", "story_memory"] {
            assert!(keys.contains(&key), "{key} should be rejected, got {keys:?}");
        }
        assert_eq!(v.delta.player_updates.xp, None);
        assert_eq!(v.delta.player_updates.fields, vec![PlayerUpdate::Hp(50)]);
        assert!(v.delta.game_updates.is_empty());
    }

    #[test]
    fn unknown_keys_become_extensions() {
        let v = ok(r#"{"story_text": "x", "choices": [],
                       "player_updates": {"title": "Slayer"},
                       "game_updates": {"weather": "storm"}}"#);
        assert_eq!(
            v.delta.player_updates.fields,
            vec![PlayerUpdate::Extension("title".into(), Value::from("Slayer"))]
        );
        assert_eq!(
            v.delta.game_updates,
            vec![GameUpdate::Extension("weather".into(), Value::from("storm"))]
        );
    }

    #[test]
    fn blank_memory_additions_are_skipped() {
        let v = ok(r#"{"story_text": "x", "choices": [], "memory_additions": ["", "  ", "Kept."]}"#);
        assert_eq!(v.delta.memory_additions, vec!["Kept."]);
        let v = ok(r#"{"story_text": "x", "choices": [], "memory_additions": ""}"#);
        assert!(v.delta.memory_additions.is_empty());
    }

    #[test]
    fn skills_need_cost_and_damage() {
        let v = ok(r#"{"story_text": "x", "choices": [],
                       "player_updates": {"skills": {"Smite": {"cost": 8, "damage": 20}}}}"#);
        assert!(matches!(&v.delta.player_updates.fields[0], PlayerUpdate::Skills(s) if s["Smite"].damage == 20));

        let v = ok(r#"{"story_text": "x", "choices": [],
                       "player_updates": {"skills": {"Smite": {"cost": 8}}}}"#);
        assert_eq!(v.rejected.len(), 1);
    }
}
