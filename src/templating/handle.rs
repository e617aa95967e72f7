//! Lazy builder handles.
//!
//! Each declared builder gets one handle per execution. Configuration calls
//! (`limit`, `offset`) accumulate while the handle is unresolved; the first
//! `value()` call moves it to `Resolving` and the engine stores the terminal
//! state once the data source answers. Later `value()` calls return the
//! stored state without touching the data source again.

use serde_json::Value;
use std::sync::Mutex;

use super::error::ExecutionError;
use crate::datasource::BuilderOptions;

#[derive(Debug, Clone)]
pub enum HandleState {
    Unresolved(BuilderOptions),
    Resolving,
    Resolved(Value),
    Failed(ExecutionError),
}

impl HandleState {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Unresolved(_) => "unresolved",
            Self::Resolving => "resolving",
            Self::Resolved(_) => "resolved",
            Self::Failed(_) => "failed",
        }
    }
}

/// What the caller of [`BuilderHandle::begin`] has to do next.
#[derive(Debug)]
pub(crate) enum Materialize {
    /// The caller owns the resolution and must report back through
    /// [`BuilderHandle::finish`].
    Start(BuilderOptions),
    /// The handle already reached a terminal state.
    Done(Result<Value, ExecutionError>),
    /// Somebody up the stack is resolving this handle.
    InProgress,
}

#[derive(Debug)]
pub struct BuilderHandle {
    name: String,
    state: Mutex<HandleState>,
}

impl BuilderHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(HandleState::Unresolved(BuilderOptions::default())),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the current state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Apply a deferred configuration call.
    ///
    /// # Errors
    ///
    /// Fails with [`ExecutionError::AlreadyMaterialized`] once `value()` has
    /// been called on this handle.
    pub fn configure(
        &self,
        method: &str,
        apply: impl FnOnce(&mut BuilderOptions),
    ) -> Result<(), ExecutionError> {
        let mut state = self.lock();
        match &mut *state {
            HandleState::Unresolved(options) => {
                apply(options);
                tracing::trace!(builder = %self.name, method, ?options, "Configured builder");
                Ok(())
            }
            _ => Err(ExecutionError::AlreadyMaterialized {
                name: self.name.clone(),
                method: method.to_string(),
            }),
        }
    }

    pub(crate) fn begin(&self) -> Materialize {
        let mut state = self.lock();
        match &*state {
            HandleState::Unresolved(options) => {
                let options = *options;
                *state = HandleState::Resolving;
                Materialize::Start(options)
            }
            HandleState::Resolving => Materialize::InProgress,
            HandleState::Resolved(value) => Materialize::Done(Ok(value.clone())),
            HandleState::Failed(error) => Materialize::Done(Err(error.clone())),
        }
    }

    pub(crate) fn finish(&self, result: &Result<Value, ExecutionError>) {
        let mut state = self.lock();
        *state = match result {
            Ok(value) => HandleState::Resolved(value.clone()),
            Err(error) => HandleState::Failed(error.clone()),
        };
    }
}
