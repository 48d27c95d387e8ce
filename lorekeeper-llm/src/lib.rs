//! # lorekeeper-llm — narrative generator client
//!
//! One interface over the text-generation backends a session can narrate
//! with:
//!   - **Gemini** (`generateContent`, the default)
//!   - **Ollama** (local)
//!   - **OpenAI-compatible API** (OpenAI, Together, LM Studio, etc.)
//!
//! Every call here can fail. The session layer never treats a failure as
//! fatal: a failed narration becomes the fallback delta, a failed hint
//! becomes the fixed hint text, a failed scenario seed becomes the default
//! custom opening.
//!
//! # Model roles
//!
//! ```text
//! Narrator  — turn narration and scenario seeds (JSON output)
//! Assistant — hints for a stuck player (free text)
//! ```

pub mod client;
pub mod error;
pub mod prompt;
pub mod types;

pub use client::{LlmClient, LlmProvider, TextGenerator};
pub use error::LlmError;
pub use types::{LlmRequest, LlmResponse, ModelRole};
