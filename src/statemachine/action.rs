// src/statemachine/action.rs

//! Action handlers and the ordered catalog they are selected from.

use std::fmt;
use std::sync::Arc;

/// A side-effect handler bound to transitions through a support predicate.
///
/// `support` is evaluated with the *current* source state of the instance,
/// even for batch transitions registered from several sources; the engine
/// guarantees that state is one of the registered sources.
pub trait Action<S, E, C>: Send + Sync {
    /// Stable name used in logs and in [`TransitResult`](super::TransitResult).
    fn name(&self) -> &'static str;

    /// Whether this action handles `source --event--> target`.
    fn support(&self, source: S, target: S, event: E) -> bool;

    /// Run the side effect. Returning an error aborts the transition.
    fn execute(&self, source: S, target: S, context: &mut C) -> anyhow::Result<()>;
}

type SupportFn<S, E> = dyn Fn(S, S, E) -> bool + Send + Sync;
type ExecuteFn<S, C> = dyn Fn(S, S, &mut C) -> anyhow::Result<()> + Send + Sync;

/// Closure-backed [`Action`], handy for small rules and tests.
pub struct FnAction<S, E, C> {
    name: &'static str,
    support: Box<SupportFn<S, E>>,
    execute: Box<ExecuteFn<S, C>>,
}

impl<S, E, C> FnAction<S, E, C> {
    pub fn new(
        name: &'static str,
        support: impl Fn(S, S, E) -> bool + Send + Sync + 'static,
        execute: impl Fn(S, S, &mut C) -> anyhow::Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            support: Box::new(support),
            execute: Box::new(execute),
        }
    }
}

impl<S, E, C> Action<S, E, C> for FnAction<S, E, C> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn support(&self, source: S, target: S, event: E) -> bool {
        (self.support)(source, target, event)
    }

    fn execute(&self, source: S, target: S, context: &mut C) -> anyhow::Result<()> {
        (self.execute)(source, target, context)
    }
}

/// Priority-ordered list of actions.
///
/// Built once at startup and shared read-only between transitions; cloning
/// only clones the `Arc`s.
pub struct ActionCatalog<S, E, C> {
    actions: Vec<Arc<dyn Action<S, E, C>>>,
}

impl<S, E, C> ActionCatalog<S, E, C> {
    pub fn new() -> Self {
        Self {
            actions: Vec::new(),
        }
    }

    /// Append an action; earlier registrations win.
    pub fn register(&mut self, action: impl Action<S, E, C> + 'static) -> &mut Self {
        self.actions.push(Arc::new(action));
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, action: impl Action<S, E, C> + 'static) -> Self {
        self.actions.push(Arc::new(action));
        self
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.actions.iter().map(|a| a.name()).collect()
    }

    /// First action in registration order that supports the transition.
    pub fn select(&self, source: S, target: S, event: E) -> Option<&Arc<dyn Action<S, E, C>>>
    where
        S: Copy,
        E: Copy,
    {
        self.actions
            .iter()
            .find(|action| action.support(source, target, event))
    }
}

impl<S, E, C> Default for ActionCatalog<S, E, C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E, C> Clone for ActionCatalog<S, E, C> {
    fn clone(&self) -> Self {
        Self {
            actions: self.actions.clone(),
        }
    }
}

impl<S, E, C> fmt::Debug for ActionCatalog<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.actions.iter().map(|a| a.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &'static str, accepts: u8) -> FnAction<u8, u8, ()> {
        FnAction::new(
            name,
            move |source: u8, _: u8, _: u8| source == accepts,
            |_: u8, _: u8, _: &mut ()| Ok(()),
        )
    }

    #[test]
    fn with_keeps_registration_order() {
        let catalog = ActionCatalog::new()
            .with(named("a", 1))
            .with(named("b", 1))
            .with(named("c", 2));

        assert_eq!(catalog.names(), vec!["a", "b", "c"]);
        assert_eq!(catalog.select(1, 0, 0).map(|a| a.name()), Some("a"));
        assert_eq!(catalog.select(2, 0, 0).map(|a| a.name()), Some("c"));
        assert!(catalog.select(3, 0, 0).is_none());
    }
}
