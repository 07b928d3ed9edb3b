//! Persistence context lifecycle manager.
//!
//! # Responsibility
//! - Own the single live store context and drive its lifecycle:
//!   initialize, expose for borrowing, clear.
//! - Keep lifecycle transitions caller-driven; nothing initializes lazily.
//!
//! # Invariants
//! - At most one context is live per manager at any time.
//! - Every issued context carries a strictly increasing generation tag.
//! - A failed discard leaves the previous context current; the manager never
//!   ends up half-cleared.

use crate::store::{StoreEngine, StoreError, StoreLocation};
use log::{error, info};
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use uuid::Uuid;

/// Lifecycle states a manager moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No context is held; `initialize` must run before data access.
    Uninitialized,
    /// A context is held and borrowable.
    Ready,
}

/// Diagnostics snapshot of a manager's current lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagerStatus {
    pub state: LifecycleState,
    /// Generation of the held context, absent when uninitialized.
    pub generation: Option<u64>,
    /// Identity tag of the held context, absent when uninitialized.
    pub context_id: Option<Uuid>,
    /// Rendered store location the manager is bound to.
    pub location: String,
}

/// Manager-level failure taxonomy.
#[derive(Debug)]
pub enum ManagerError {
    /// The storage engine reported a failure (open or discard).
    Store(StoreError),
    /// A caller presented a generation tag that no longer matches the live
    /// context; the handle it was issued for has been cleared or replaced.
    StaleContext {
        held_generation: u64,
        current_generation: Option<u64>,
    },
}

impl Display for ManagerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::StaleContext {
                held_generation,
                current_generation: Some(current),
            } => write!(
                f,
                "context generation {held_generation} is stale; current generation is {current}"
            ),
            Self::StaleContext {
                held_generation,
                current_generation: None,
            } => write!(
                f,
                "context generation {held_generation} is stale; no context is live"
            ),
        }
    }
}

impl Error for ManagerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::StaleContext { .. } => None,
        }
    }
}

impl From<StoreError> for ManagerError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Live handle over an opened store, owned by exactly one manager.
///
/// Callers borrow it through [`ContextManager::context`] or
/// [`ContextManager::with_context`]; its lifetime always ends inside the
/// manager, never in caller hands.
#[derive(Debug)]
pub struct StoreContext<H> {
    id: Uuid,
    generation: u64,
    handle: H,
}

impl<H> StoreContext<H> {
    fn new(handle: H, generation: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            handle,
        }
    }

    /// Identity tag, stable for this context's lifetime. Used in logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Issue number of this context within its manager. Strictly increases
    /// across re-initializations; record it to detect staleness later via
    /// [`ContextManager::ensure_current`].
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Borrows the engine handle for reads.
    pub fn handle(&self) -> &H {
        &self.handle
    }

    /// Borrows the engine handle for writes.
    pub fn handle_mut(&mut self) -> &mut H {
        &mut self.handle
    }
}

struct State<H> {
    context: Option<StoreContext<H>>,
    issued: u64,
}

/// Exclusive borrow of the currently held context.
///
/// Holds the manager's lock for its whole lifetime: drop the guard before
/// calling `initialize` or `clear` on the same manager.
pub struct ContextGuard<'a, H> {
    state: MutexGuard<'a, State<H>>,
}

impl<H> Deref for ContextGuard<'_, H> {
    type Target = StoreContext<H>;

    fn deref(&self) -> &Self::Target {
        match self.state.context.as_ref() {
            Some(context) => context,
            // Constructed only while a context is held, and the lock keeps
            // it held until the guard drops.
            None => unreachable!("context guard outlived its context"),
        }
    }
}

impl<H> DerefMut for ContextGuard<'_, H> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.state.context.as_mut() {
            Some(context) => context,
            None => unreachable!("context guard outlived its context"),
        }
    }
}

/// Lifecycle-controlled owner of zero or one live store context.
///
/// Constructed explicitly with its engine and location so tests can run
/// isolated instances; the process-wide convenience accessor lives in
/// [`crate::shared`].
pub struct ContextManager<E: StoreEngine> {
    engine: E,
    location: StoreLocation,
    state: Mutex<State<E::Handle>>,
}

impl<E: StoreEngine> ContextManager<E> {
    /// Creates a manager in the `Uninitialized` state.
    ///
    /// No store I/O happens here; the store is only touched by `initialize`.
    pub fn new(engine: E, location: StoreLocation) -> Self {
        Self {
            engine,
            location,
            state: Mutex::new(State {
                context: None,
                issued: 0,
            }),
        }
    }

    /// The store location this manager is bound to.
    pub fn location(&self) -> &StoreLocation {
        &self.location
    }

    /// Opens the store and holds a fresh context.
    ///
    /// Calling this while a context is already held is a no-op: the held
    /// context and any pending changes in it are preserved. A caller who
    /// wants a fresh context clears first.
    ///
    /// # Errors
    /// - [`StoreError::Unavailable`] when the store cannot be opened or
    ///   created; the manager stays `Uninitialized`.
    pub fn initialize(&self) -> Result<(), ManagerError> {
        let started_at = Instant::now();
        let mut state = self.lock_state();

        if let Some(context) = state.context.as_ref() {
            info!(
                "event=context_init module=manager status=noop generation={} context_id={}",
                context.generation, context.id
            );
            return Ok(());
        }

        match self.engine.open_or_create(&self.location) {
            Ok(handle) => {
                state.issued += 1;
                let context = StoreContext::new(handle, state.issued);
                info!(
                    "event=context_init module=manager status=ok generation={} context_id={} duration_ms={}",
                    context.generation,
                    context.id,
                    started_at.elapsed().as_millis()
                );
                state.context = Some(context);
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=context_init module=manager status=error error_code=store_unavailable duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }

    /// Discards the held context's pending changes and releases it.
    ///
    /// Calling this while uninitialized is a no-op, not an error.
    ///
    /// # Errors
    /// - [`StoreError::DiscardFailed`] when the engine cannot release the
    ///   handle; the previous context stays current so the caller can retry.
    pub fn clear(&self) -> Result<(), ManagerError> {
        let started_at = Instant::now();
        let mut state = self.lock_state();

        let Some(context) = state.context.take() else {
            info!("event=context_clear module=manager status=noop");
            return Ok(());
        };

        let StoreContext {
            id,
            generation,
            handle,
        } = context;

        match self.engine.discard_pending(handle) {
            Ok(()) => {
                info!(
                    "event=context_clear module=manager status=ok generation={generation} context_id={id} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err((handle, err)) => {
                state.context = Some(StoreContext {
                    id,
                    generation,
                    handle,
                });
                error!(
                    "event=context_clear module=manager status=error error_code=discard_failed generation={generation} context_id={id} duration_ms={} error={err}",
                    started_at.elapsed().as_millis()
                );
                Err(err.into())
            }
        }
    }

    /// Borrows the currently held context, or `None` when uninitialized.
    ///
    /// Never initializes implicitly; absence is an ordinary result, not an
    /// error.
    pub fn context(&self) -> Option<ContextGuard<'_, E::Handle>> {
        let state = self.lock_state();
        if state.context.is_some() {
            Some(ContextGuard { state })
        } else {
            None
        }
    }

    /// Runs `f` against the held context, or returns `None` when
    /// uninitialized.
    pub fn with_context<T>(&self, f: impl FnOnce(&mut StoreContext<E::Handle>) -> T) -> Option<T> {
        let mut state = self.lock_state();
        state.context.as_mut().map(f)
    }

    /// Whether a context is currently held.
    pub fn is_initialized(&self) -> bool {
        self.lock_state().context.is_some()
    }

    /// Generation of the held context, or `None` when uninitialized.
    pub fn current_generation(&self) -> Option<u64> {
        self.lock_state().context.as_ref().map(StoreContext::generation)
    }

    /// Checks a previously recorded generation tag against the live context.
    ///
    /// # Errors
    /// - [`ManagerError::StaleContext`] when the tag belongs to a context
    ///   that has been cleared or replaced since it was recorded.
    pub fn ensure_current(&self, generation: u64) -> Result<(), ManagerError> {
        let state = self.lock_state();
        match state.context.as_ref() {
            Some(context) if context.generation == generation => Ok(()),
            Some(context) => Err(ManagerError::StaleContext {
                held_generation: generation,
                current_generation: Some(context.generation),
            }),
            None => Err(ManagerError::StaleContext {
                held_generation: generation,
                current_generation: None,
            }),
        }
    }

    /// Snapshot of the manager's lifecycle for diagnostics output.
    pub fn status(&self) -> ManagerStatus {
        let state = self.lock_state();
        ManagerStatus {
            state: if state.context.is_some() {
                LifecycleState::Ready
            } else {
                LifecycleState::Uninitialized
            },
            generation: state.context.as_ref().map(|context| context.generation),
            context_id: state.context.as_ref().map(|context| context.id),
            location: self.location.to_string(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, State<E::Handle>> {
        // A panic elsewhere must not wedge the lifecycle; take the state
        // as-is on poison.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
