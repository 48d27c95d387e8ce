//! Prompt templates for lorekeeper generator calls.
//!
//! The built-in templates are compiled in. A deployment can override any
//! of them with TOML files in a prompt directory (see
//! [`PromptEngine::from_directory`]).

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

/// Game-master persona and output contract for turn narration.
pub const NARRATOR_SYSTEM: &str = r#"You are the Dungeon Master of a text-based fantasy RPG.
Your entire response MUST be a single, valid JSON object and nothing else.

RULES:
- Award experience points (xp) for overcoming challenges: a small challenge is 10-20 xp, a major one 50-100 xp.
- Player stats are: strength, agility, intelligence, dexterity.
- Never change the player's name and never decide level-ups; the game engine does that.
- Offer two to four short choices for what the player might do next.

JSON keys:
- "story_text": the next part of the story (string)
- "choices": the player's options (array of strings)
- "player_updates": changed player fields, e.g. {"hp": 80, "xp": 15} (xp is the amount gained)
- "game_updates": changed world fields, e.g. {"current_location": "forest clearing"}
- "memory_additions": short facts worth remembering (array of strings)"#;

/// Turn narration: serialized game state plus the player's action.
pub const NARRATOR_USER: &str = r#"Current game state:
{game_state}

Player's action:
"{player_action}"

Generate the next part of the story."#;

/// Persona for custom scenario generation.
pub const SCENARIO_SEED_SYSTEM: &str = r"You design opening scenes for a text-based fantasy RPG.
Your entire response MUST be a single, valid JSON object and nothing else.";

/// Custom scenario generation from a player-supplied premise.
pub const SCENARIO_SEED_USER: &str = r#"Create a starting scenario for an RPG based on: "{premise}".
Respond in valid JSON with keys:
- "story_text": the opening scene (string)
- "choices": the player's first options (array of strings)
- "player_data": {"hp": <int>, "mana": <int>, "currency": {"gold": <int>, "silver": <int>, "copper": <int>}, "inventory": {"<item>": <count>}}"#;

/// Assistant persona for hints.
pub const HINT_SYSTEM: &str =
    "You are a helpful game assistant. The player is stuck. Provide a creative hint in one or two sentences. Do not reveal outright solutions.";

/// Hint request carrying the serialized game state.
pub const HINT_USER: &str = "Game state: {game_state}";

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single pass, so
/// substituted text is never scanned again. Unknown placeholders are left
/// untouched.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut result = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        result.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (*v, close))
        });
        match value {
            Some((value, close)) => {
                result.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                result.push('{');
                rest = after;
            }
        }
    }
    result.push_str(rest);
    result
}

/// Identifies a prompt template by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Turn narration (narrator model, JSON out).
    Narration,
    /// Custom scenario opening (narrator model, JSON out).
    ScenarioSeed,
    /// Hint for a stuck player (assistant model, free text).
    Hint,
}

impl PromptId {
    /// Returns the TOML filename (without path) for this prompt.
    #[must_use]
    pub fn filename(self) -> &'static str {
        match self {
            Self::Narration => "narration.toml",
            Self::ScenarioSeed => "scenario_seed.toml",
            Self::Hint => "hint.toml",
        }
    }

    /// All prompt IDs.
    #[must_use]
    pub fn all() -> &'static [PromptId] {
        &[Self::Narration, Self::ScenarioSeed, Self::Hint]
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Narration => "narration",
            Self::ScenarioSeed => "scenario_seed",
            Self::Hint => "hint",
        };
        write!(f, "{name}")
    }
}

impl FromStr for PromptId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "narration" => Ok(Self::Narration),
            "scenario_seed" => Ok(Self::ScenarioSeed),
            "hint" => Ok(Self::Hint),
            _ => Err(format!("unknown prompt id: '{s}'")),
        }
    }
}

/// `[prompt]` table of a TOML prompt file.
#[derive(Debug, Clone, Deserialize)]
struct TomlPromptFile {
    prompt: TomlPromptData,
}

#[derive(Debug, Clone, Deserialize)]
struct TomlPromptData {
    version: String,
    system: String,
    user: String,
}

/// A loaded, ready-to-render prompt template.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Version string ("builtin" for compiled-in templates).
    pub version: String,
    /// System prompt template (contains `{key}` placeholders).
    pub system: String,
    /// User prompt template (contains `{key}` placeholders).
    pub user: String,
}

/// Holds one template per [`PromptId`] and renders them.
///
/// # Example
///
/// ```
/// use lorekeeper_llm::prompt::{PromptEngine, PromptId};
///
/// let engine = PromptEngine::builtin();
/// let (_system, user) = engine
///     .render(PromptId::Hint, &[("game_state", "{}")])
///     .expect("builtin hint template");
/// assert_eq!(user, "Game state: {}");
/// ```
#[derive(Debug, Clone)]
pub struct PromptEngine {
    templates: HashMap<PromptId, PromptTemplate>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PromptEngine {
    /// Engine holding the compiled-in templates.
    #[must_use]
    pub fn builtin() -> Self {
        let builtin = |system: &str, user: &str| PromptTemplate {
            version: "builtin".into(),
            system: system.into(),
            user: user.into(),
        };
        let mut templates = HashMap::new();
        templates.insert(PromptId::Narration, builtin(NARRATOR_SYSTEM, NARRATOR_USER));
        templates.insert(PromptId::ScenarioSeed, builtin(SCENARIO_SEED_SYSTEM, SCENARIO_SEED_USER));
        templates.insert(PromptId::Hint, builtin(HINT_SYSTEM, HINT_USER));
        Self { templates }
    }

    /// Built-in templates, overridden by any TOML files found in `dir`.
    ///
    /// Each file must be named after a [`PromptId`] (`narration.toml`, ...)
    /// and hold a `[prompt]` table with `version`, `system` and `user`.
    /// Unknown files are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if `dir` does not exist or a matching file cannot
    /// be read or parsed.
    pub fn from_directory(dir: impl AsRef<Path>) -> Result<Self, String> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(format!("prompt directory not found: {}", dir.display()));
        }

        let mut engine = Self::builtin();
        for id in PromptId::all() {
            let path: PathBuf = dir.join(id.filename());
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let parsed: TomlPromptFile = toml::from_str(&content)
                .map_err(|e| format!("failed to parse {}: {e}", path.display()))?;
            let d = parsed.prompt;
            engine.templates.insert(*id, PromptTemplate {
                version: d.version,
                system: d.system,
                user: d.user,
            });
        }
        Ok(engine)
    }

    /// Get a template by ID.
    #[must_use]
    pub fn get(&self, id: PromptId) -> Option<&PromptTemplate> {
        self.templates.get(&id)
    }

    /// Render `(system_prompt, user_prompt)` for `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt ID is not loaded.
    pub fn render(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<(String, String), String> {
        let tpl = self
            .get(id)
            .ok_or_else(|| format!("prompt template '{id}' not loaded"))?;
        Ok((render_template(&tpl.system, vars), render_template(&tpl.user, vars)))
    }
}
