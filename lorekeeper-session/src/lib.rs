//! # lorekeeper-session
//!
//! The application layer over `lorekeeper-core`. Each Action API operation
//! maps onto exactly one core operation:
//!
//! | Operation        | Core operation                                   |
//! |------------------|--------------------------------------------------|
//! | `start_game`     | scenario preset / custom seed → `GameState::new` |
//! | `process_action` | generator → `delta::validate_response` → `reduce` |
//! | `level_up`       | `resolve_level_up`                               |
//! | `save_game`      | `SaveStore::put`                                 |
//! | `load_game`      | `SaveStore::get`                                 |
//! | `list_saves`     | `SaveStore::list_all`                            |
//! | `delete_save`    | `SaveStore::delete`                              |
//! | `get_hint`       | generator (assistant model), read-only           |

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod generator;
pub mod logging;
pub mod requests;
pub mod service;

pub use generator::{build_client, load_prompts};
pub use requests::{ActionRequest, LevelUpRequest, StartRequest};
pub use service::{GameService, LevelUpResponse, StartResponse, TurnResponse, FALLBACK_HINT};
