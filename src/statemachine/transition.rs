// src/statemachine/transition.rs

use std::fmt;

use super::action::ActionCatalog;

/// How a transition was registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// One source state.
    Single,
    /// A set of source states sharing one rule and one action list.
    Batch,
}

/// A registered `(sources, event) -> target` rule with its candidate actions.
pub struct Transition<S, E, C> {
    pub(crate) sources: Vec<S>,
    pub(crate) target: S,
    pub(crate) event: E,
    pub(crate) actions: ActionCatalog<S, E, C>,
    pub(crate) registration: Registration,
}

impl<S: Copy + PartialEq, E: Copy, C> Transition<S, E, C> {
    pub fn sources(&self) -> &[S] {
        &self.sources
    }

    pub fn target(&self) -> S {
        self.target
    }

    pub fn event(&self) -> E {
        self.event
    }

    pub fn registration(&self) -> Registration {
        self.registration
    }

    pub fn actions(&self) -> &ActionCatalog<S, E, C> {
        &self.actions
    }

    pub fn accepts(&self, source: S) -> bool {
        self.sources.contains(&source)
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C> fmt::Debug for Transition<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transition")
            .field("sources", &self.sources)
            .field("event", &self.event)
            .field("target", &self.target)
            .field("registration", &self.registration)
            .field("actions", &self.actions)
            .finish()
    }
}
