//! Core types for generator requests and responses.

use serde::{Deserialize, Serialize};

/// Which configured model serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// Turn narration and scenario seeds.
    Narrator,
    /// Hints and other out-of-story help.
    Assistant,
}

/// A request to the generator.
#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    /// System instruction (game-master persona, output rules).
    pub system: String,
    /// User prompt (serialized state, player action).
    pub user: String,
    /// Model role.
    pub role: ModelRole,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Temperature (0.0 = deterministic, 1.0 = creative).
    pub temperature: f32,
    /// Ask the backend for a JSON-only answer where it supports that.
    pub json_mode: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl LlmRequest {
    /// Narrator request expecting a JSON object back.
    #[must_use]
    pub fn narration(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Narrator,
            max_tokens: 1024,
            temperature: 0.8,
            json_mode: true,
            timeout_ms: 30_000,
        }
    }

    /// Assistant request with a free-text answer.
    #[must_use]
    pub fn assist(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            role: ModelRole::Assistant,
            max_tokens: 200,
            temperature: 0.7,
            json_mode: false,
            timeout_ms: 15_000,
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A response from the generator.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmResponse {
    /// The generated text.
    pub text: String,
    /// How many tokens were generated.
    pub tokens_generated: u32,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Which model was used.
    pub model: String,
}
