//! The game service: one method per Action API operation.
//!
//! Sessions are held server-side. The [`GameState`] in a session is always
//! the reducer's or the level-up resolver's output; nothing outside this
//! module can replace it, and `save_game` persists exactly that state.
//!
//! Each save id has its own async mutex, held across the generator call,
//! so at most one mutation per save is ever in flight. Different saves
//! proceed concurrently. The mutex entry is created before the store is
//! read and deletion goes through the same entry, so a delete can never
//! race a session back into existence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMappedMutexGuard, OwnedMutexGuard};
use tracing::{debug, info, warn};

use lorekeeper_core::delta::{validate_response, DeltaError, RejectedUpdate};
use lorekeeper_core::persistence::{SaveStore, SaveSummary};
use lorekeeper_core::scenario;
use lorekeeper_core::{reduce, resolve_level_up, Delta, GameState, LoreConfig, LoreError, Result, SaveId};
use lorekeeper_llm::prompt::{PromptEngine, PromptId};
use lorekeeper_llm::{LlmRequest, TextGenerator};

use crate::requests::{ActionRequest, LevelUpRequest, StartRequest};

/// Hint returned when the generator cannot help.
pub const FALLBACK_HINT: &str =
    "Perhaps looking closer at your surroundings could reveal a hidden detail.";

/// Result of starting a session.
#[derive(Debug, Clone)]
pub struct StartResponse {
    /// Id of the new save.
    pub save_id: SaveId,
    /// Opening narration.
    pub story_text: String,
    /// First choices.
    pub choices: Vec<String>,
    /// The initial state, as saved.
    pub state: GameState,
}

/// Result of one player action.
#[derive(Debug, Clone)]
pub struct TurnResponse {
    /// Narration for this turn.
    pub story_text: String,
    /// Next choices.
    pub choices: Vec<String>,
    /// The state after the turn.
    pub state: GameState,
    /// Whether a level-up now waits to be resolved.
    pub level_up_pending: bool,
    /// Why the fallback delta was used, if it was.
    pub fallback_reason: Option<DeltaError>,
    /// Updates dropped during validation.
    pub rejected: Vec<RejectedUpdate>,
}

/// Result of resolving a level-up.
#[derive(Debug, Clone)]
pub struct LevelUpResponse {
    /// The level reached.
    pub new_level: u32,
    /// The stat that grew, if the name was recognised.
    pub stat_increased: Option<String>,
    /// The state after the transition.
    pub state: GameState,
}

struct Session {
    state: GameState,
    last_delta: Option<Delta>,
    /// Holds progress the store has not seen (autosave off).
    dirty: bool,
    touched: Instant,
}

impl Session {
    fn new(state: GameState) -> Self {
        Self {
            state,
            last_delta: None,
            dirty: false,
            touched: Instant::now(),
        }
    }
}

/// What a session entry holds. Entries start `Unloaded` and are filled
/// from the store by the first request that locks them.
enum Slot {
    Unloaded,
    Live(Session),
    Deleted,
}

type SessionHandle = Arc<AsyncMutex<Slot>>;
type SessionGuard = OwnedMappedMutexGuard<Slot, Session>;

/// Owns active sessions, the generator and the save store.
pub struct GameService<G, S> {
    generator: G,
    store: S,
    prompts: PromptEngine,
    config: LoreConfig,
    sessions: Mutex<HashMap<SaveId, SessionHandle>>,
}

impl<G: TextGenerator, S: SaveStore> GameService<G, S> {
    /// Create a service with the built-in prompts.
    #[must_use]
    pub fn new(generator: G, store: S, config: LoreConfig) -> Self {
        Self {
            generator,
            store,
            prompts: PromptEngine::builtin(),
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the prompt templates.
    #[must_use]
    pub fn with_prompts(mut self, prompts: PromptEngine) -> Self {
        self.prompts = prompts;
        self
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &LoreConfig {
        &self.config
    }

    /// Number of sessions held in memory.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Start a session from a scenario and save it under a fresh id.
    ///
    /// # Errors
    /// Request validation errors, or a store failure saving the opening.
    pub async fn start_game(&self, request: &StartRequest) -> Result<StartResponse> {
        let valid = request.validate()?;
        let name = valid
            .name
            .unwrap_or_else(|| self.config.session.default_player_name.clone());

        let mut opening = match scenario::preset(valid.scenario, &name) {
            Some(opening) => opening,
            None => {
                let seed = self
                    .ask(PromptId::ScenarioSeed, &[("premise", valid.premise.as_str())])
                    .await;
                scenario::custom_from_response(&name, seed)
            }
        };
        opening.state.player.xp_to_next_level = self.config.progression.initial_xp_to_next_level;

        self.evict_idle();
        let id = SaveId::new();
        let stored = self.store.put(&id, &opening.state)?;
        self.sessions
            .lock()
            .insert(id, Arc::new(AsyncMutex::new(Slot::Live(Session::new(stored.clone())))));
        info!(save_id = %id, scenario = %valid.scenario, player = %name, "Session started");

        Ok(StartResponse {
            save_id: id,
            story_text: opening.story_text,
            choices: opening.choices,
            state: stored,
        })
    }

    /// Narrate one action, validate the answer and reduce it into the session.
    ///
    /// Generator failures never surface here; they yield the fallback delta.
    ///
    /// # Errors
    /// Request validation errors, `SaveNotFound`, or a store failure while
    /// autosaving (the session is left unchanged in that case).
    pub async fn process_action(&self, request: &ActionRequest) -> Result<TurnResponse> {
        let (id, action) = request.validate()?;
        let mut session = self.lock_session(id).await?;

        let game_state = session.state.to_prompt_json()?;
        let raw = self
            .ask(
                PromptId::Narration,
                &[("game_state", game_state.as_str()), ("player_action", action.as_str())],
            )
            .await;
        let validated = validate_response(raw);
        let next = self.autosave(id, reduce(&session.state, &validated.delta))?;

        let level_up_pending = next.player.level_up_pending;
        info!(
            save_id = %id,
            fallback = validated.is_fallback(),
            rejected = validated.rejected.len(),
            xp = next.player.xp,
            level_up_pending,
            "Action processed"
        );

        session.state = next;
        session.last_delta = Some(validated.delta.clone());
        session.dirty = !self.config.session.autosave;
        Ok(TurnResponse {
            story_text: validated.delta.story_text,
            choices: validated.delta.choices,
            state: session.state.clone(),
            level_up_pending,
            fallback_reason: validated.fallback_reason,
            rejected: validated.rejected,
        })
    }

    /// Resolve the pending level-up of a session.
    ///
    /// # Errors
    /// Request validation errors, `SaveNotFound`, `NoLevelUpPending`, or a
    /// store failure while autosaving.
    pub async fn level_up(&self, request: &LevelUpRequest) -> Result<LevelUpResponse> {
        let (id, stat) = request.validate()?;
        let mut session = self.lock_session(id).await?;

        let outcome = resolve_level_up(&session.state, &stat, &self.config.progression)?;
        session.state = self.autosave(id, outcome.state)?;
        session.dirty = !self.config.session.autosave;
        Ok(LevelUpResponse {
            new_level: outcome.new_level,
            stat_increased: outcome.stat_increased,
            state: session.state.clone(),
        })
    }

    /// Persist the session's current state, then sweep idle sessions.
    ///
    /// # Errors
    /// `SaveNotFound` or a store failure.
    pub async fn save_game(&self, id: SaveId) -> Result<GameState> {
        let saved = {
            let mut session = self.lock_session(id).await?;
            session.state = self.store.put(&id, &session.state)?;
            session.dirty = false;
            session.state.clone()
        };
        debug!(save_id = %id, "Session saved");
        self.evict_idle();
        Ok(saved)
    }

    /// Re-activate a persisted save, replacing any unsaved in-memory progress.
    ///
    /// # Errors
    /// `SaveNotFound` or a store failure.
    pub async fn load_game(&self, id: SaveId) -> Result<GameState> {
        let handle = self.handle(id);
        let mut slot = handle.lock().await;
        if matches!(*slot, Slot::Deleted) {
            return Err(LoreError::SaveNotFound(id));
        }
        let Some(stored) = self.store.get(&id)? else {
            *slot = Slot::Deleted;
            self.forget(id, &handle);
            return Err(LoreError::SaveNotFound(id));
        };
        *slot = Slot::Live(Session::new(stored.clone()));
        info!(save_id = %id, "Session loaded");
        Ok(stored)
    }

    /// Summaries of every persisted save.
    ///
    /// # Errors
    /// A store failure.
    pub fn list_saves(&self) -> Result<BTreeMap<SaveId, SaveSummary>> {
        self.store.list_all()
    }

    /// Delete a save and drop its session.
    ///
    /// # Errors
    /// `SaveNotFound` when nothing was stored under `id`, or a store failure.
    pub async fn delete_save(&self, id: SaveId) -> Result<()> {
        let handle = self.handle(id);
        let mut slot = handle.lock().await;
        if matches!(*slot, Slot::Deleted) {
            return Err(LoreError::SaveNotFound(id));
        }
        let deleted = self.store.delete(&id)?;
        *slot = Slot::Deleted;
        self.forget(id, &handle);
        drop(slot);
        if !deleted {
            return Err(LoreError::SaveNotFound(id));
        }
        info!(save_id = %id, "Save deleted");
        Ok(())
    }

    /// Ask the assistant model for a hint. Never mutates the session.
    ///
    /// # Errors
    /// `SaveNotFound`; generator failures yield [`FALLBACK_HINT`].
    pub async fn get_hint(&self, id: SaveId) -> Result<String> {
        let game_state = self.lock_session(id).await?.state.to_prompt_json()?;
        let hint = self
            .ask(PromptId::Hint, &[("game_state", game_state.as_str())])
            .await
            .map(|h| h.trim().to_string())
            .unwrap_or_else(|e| {
                warn!(save_id = %id, error = %e, "Hint generation failed, using fallback hint");
                FALLBACK_HINT.to_string()
            });
        Ok(hint)
    }

    /// The delta most recently applied to a session, if any.
    pub async fn last_delta(&self, id: SaveId) -> Option<Delta> {
        let handle = self.sessions.lock().get(&id).cloned()?;
        let slot = handle.lock().await;
        match &*slot {
            Slot::Live(session) => session.last_delta.clone(),
            Slot::Unloaded | Slot::Deleted => None,
        }
    }

    /// Drop sessions that no request holds, that carry no unsaved progress
    /// and that have been idle for `session.idle_timeout_secs`. Returns how
    /// many were dropped; they re-activate from the store on next use.
    pub fn evict_idle(&self) -> usize {
        let max_idle = Duration::from_secs(self.config.session.idle_timeout_secs);
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        // New clones of a handle are only made under the map lock, so a
        // count of one means no request can be using it.
        sessions.retain(|_, handle| {
            if Arc::strong_count(handle) > 1 {
                return true;
            }
            let Ok(slot) = handle.try_lock() else {
                return true;
            };
            match &*slot {
                Slot::Live(session) => session.dirty || session.touched.elapsed() < max_idle,
                Slot::Unloaded | Slot::Deleted => false,
            }
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Idle sessions evicted");
        }
        evicted
    }

    /// The entry for `id`, created empty when absent.
    fn handle(&self, id: SaveId) -> SessionHandle {
        let mut sessions = self.sessions.lock();
        Arc::clone(
            sessions
                .entry(id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(Slot::Unloaded))),
        )
    }

    /// Remove `handle` from the map unless it has already been replaced.
    fn forget(&self, id: SaveId, handle: &SessionHandle) {
        let mut sessions = self.sessions.lock();
        if sessions.get(&id).is_some_and(|current| Arc::ptr_eq(current, handle)) {
            sessions.remove(&id);
        }
    }

    /// Lock the live session for `id`, activating it from the store when
    /// this is its first use.
    async fn lock_session(&self, id: SaveId) -> Result<SessionGuard> {
        let handle = self.handle(id);
        let mut slot = Arc::clone(&handle).lock_owned().await;
        if matches!(*slot, Slot::Unloaded) {
            match self.store.get(&id)? {
                Some(state) => {
                    debug!(save_id = %id, "Session activated from store");
                    *slot = Slot::Live(Session::new(state));
                }
                None => {
                    *slot = Slot::Deleted;
                    self.forget(id, &handle);
                }
            }
        }
        let mut session = OwnedMutexGuard::try_map(slot, |slot| match slot {
            Slot::Live(session) => Some(session),
            Slot::Unloaded | Slot::Deleted => None,
        })
        .map_err(|_| LoreError::SaveNotFound(id))?;
        session.touched = Instant::now();
        Ok(session)
    }

    fn autosave(&self, id: SaveId, state: GameState) -> Result<GameState> {
        if self.config.session.autosave {
            self.store.put(&id, &state)
        } else {
            Ok(state)
        }
    }

    /// Render `prompt` and call the generator. Errors come back as text so
    /// callers can fold them into their fallback path.
    async fn ask(&self, prompt: PromptId, vars: &[(&str, &str)]) -> std::result::Result<String, String> {
        let (system, user) = self.prompts.render(prompt, vars)?;
        let request = match prompt {
            PromptId::Hint => LlmRequest::assist(system, user),
            PromptId::Narration | PromptId::ScenarioSeed => {
                LlmRequest::narration(system, user).with_temperature(self.config.llm.temperature)
            }
        }
        .with_timeout(self.config.llm.request_timeout_ms);

        let start = Instant::now();
        let response = self
            .generator
            .generate_text(&request)
            .await
            .map_err(|e| e.to_string())?;
        debug!(
            prompt = %prompt,
            model = %response.model,
            tokens = response.tokens_generated,
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Generator answered"
        );
        Ok(response.text)
    }
}

impl<G, S> std::fmt::Debug for GameService<G, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameService")
            .field("active_sessions", &self.sessions.lock().len())
            .finish_non_exhaustive()
    }
}
