// src/statemachine/mod.rs

//! Generic, table-driven finite state machine.
//!
//! A [`StateMachine`] is a registry of legal `(source states, event) -> target`
//! rules. Each rule carries an ordered [`ActionCatalog`]; when an event is sent
//! the first action whose `support` predicate accepts the transition runs, and
//! the target state is reported back to the caller.
//!
//! - [`action`] defines the [`Action`] trait and the ordered catalog.
//! - [`transition`] holds a single registered rule.
//! - [`machine`] contains the builder and the runtime lookup.
//!
//! Nothing in here knows about scan tasks. The machine never persists state;
//! callers read the current state, call [`StateMachine::send_event`], and write
//! the reported target back inside the same unit of work.

use std::fmt::{Debug, Display};
use std::hash::Hash;

pub mod action;
pub mod machine;
pub mod transition;

pub use action::{Action, ActionCatalog, FnAction};
pub use machine::{StateMachine, StateMachineBuilder};
pub use transition::{Registration, Transition};

/// Bound shared by state and event enums used with the engine.
///
/// `Ord` is required so states can be used as nodes of a `petgraph`
/// [`GraphMap`](petgraph::graphmap::GraphMap) for reachability queries.
pub trait Label: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {}

impl<T> Label for T where T: Copy + Eq + Ord + Hash + Debug + Display + Send + Sync + 'static {}

/// An event name together with the payload consumed by the selected action.
///
/// The engine only looks at `name`; `context` is handed to the action as-is.
#[derive(Debug, Clone)]
pub struct Event<E, C> {
    pub name: E,
    pub context: C,
}

impl<E, C> Event<E, C> {
    pub fn new(name: E, context: C) -> Self {
        Self { name, context }
    }

    /// Consume the event and return its payload.
    pub fn into_context(self) -> C {
        self.context
    }
}

/// Result of a legal transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitResult<S> {
    /// State the instance was in when the event arrived.
    pub source: S,
    /// State the instance must be moved to.
    pub target: S,
    /// Name of the action that ran, if any matched.
    pub action: Option<&'static str>,
}

impl<S: PartialEq> TransitResult<S> {
    /// True when the transition is a self-loop (e.g. `PULLED --PULL--> PULLED`).
    pub fn is_self_loop(&self) -> bool {
        self.source == self.target
    }
}
