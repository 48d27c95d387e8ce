//! Inbound requests.
//!
//! Every field is optional on the wire so that a missing key can be
//! reported as [`LoreError::MissingRequiredField`] instead of a generic
//! decode failure. `validate` runs before any core operation.

use serde::Deserialize;

use lorekeeper_core::scenario::{ScenarioId, DEFAULT_CUSTOM_PREMISE};
use lorekeeper_core::{LoreError, Result, SaveId};

fn required<'a>(value: Option<&'a String>, field: &'static str) -> Result<&'a str> {
    value
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or(LoreError::MissingRequiredField(field))
}

fn save_id(value: Option<&String>) -> Result<SaveId> {
    required(value, "save_id")?.parse()
}

/// Start a new session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StartRequest {
    /// Player name; the configured default when absent.
    pub name: Option<String>,
    /// `tavern`, `forest`, `prison` or `custom`.
    pub scenario_id: Option<String>,
    /// Premise for the `custom` scenario.
    pub custom_text: Option<String>,
}

/// A start request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidStart {
    /// Player name, if one was given.
    pub name: Option<String>,
    /// Scenario to build.
    pub scenario: ScenarioId,
    /// Premise for a custom scenario.
    pub premise: String,
}

impl StartRequest {
    /// Check required fields and parse the scenario id.
    ///
    /// # Errors
    /// `MissingRequiredField("scenario_id")` or `UnknownScenario`.
    pub fn validate(&self) -> Result<ValidStart> {
        let scenario = required(self.scenario_id.as_ref(), "scenario_id")?.parse()?;
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let premise = self
            .custom_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_CUSTOM_PREMISE)
            .to_string();
        Ok(ValidStart { name, scenario, premise })
    }
}

/// Submit a player action.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionRequest {
    /// Target save.
    pub save_id: Option<String>,
    /// Free-text action.
    pub action: Option<String>,
}

impl ActionRequest {
    /// Check required fields.
    ///
    /// # Errors
    /// `MissingRequiredField` for a blank save id or action,
    /// `InvalidSaveId` for a malformed one.
    pub fn validate(&self) -> Result<(SaveId, String)> {
        let id = save_id(self.save_id.as_ref())?;
        let action = required(self.action.as_ref(), "action")?;
        Ok((id, action.to_string()))
    }
}

/// Resolve a pending level-up.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LevelUpRequest {
    /// Target save.
    pub save_id: Option<String>,
    /// Stat to raise.
    pub stat: Option<String>,
}

impl LevelUpRequest {
    /// Check required fields.
    ///
    /// # Errors
    /// `MissingRequiredField` for a blank save id or stat,
    /// `InvalidSaveId` for a malformed one.
    pub fn validate(&self) -> Result<(SaveId, String)> {
        let id = save_id(self.save_id.as_ref())?;
        let stat = required(self.stat.as_ref(), "stat")?;
        Ok((id, stat.to_string()))
    }
}
