//! # lorekeeper core
//!
//! State and progression engine for turn-based, LLM-narrated role-playing
//! sessions.
//!
//! A session is one [`GameState`] owning one [`Player`]. Each turn:
//!
//! 1. The narrative generator answers a player action with raw text.
//! 2. [`delta::validate`] turns that text into a typed [`Delta`], or the
//!    fixed fallback delta when it cannot.
//! 3. [`reducer::reduce`] merges the delta into the state and flags a
//!    pending level-up when the xp threshold is crossed.
//! 4. Later, [`leveling::resolve_level_up`] spends the pending level on a
//!    chosen stat.
//!
//! Everything here is synchronous and free of shared state; the session
//! layer decides when to persist through a [`persistence::SaveStore`].

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod delta;
pub mod error;
pub mod leveling;
pub mod persistence;
pub mod player;
pub mod reducer;
pub mod scenario;
pub mod state;
pub mod types;

pub use config::LoreConfig;
pub use delta::{Delta, Validated};
pub use error::{LoreError, Result};
pub use leveling::{resolve_level_up, LevelUp};
pub use player::{LevelingState, Player, PlayerOverrides};
pub use reducer::reduce;
pub use state::GameState;
pub use types::*;
