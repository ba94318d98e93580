// src/statemachine/machine.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use petgraph::graphmap::DiGraphMap;
use petgraph::visit::Dfs;
use tracing::{debug, trace};

use super::action::ActionCatalog;
use super::transition::{Registration, Transition};
use super::{Event, Label, TransitResult};
use crate::errors::{Result, ScanflowError};

/// Collects transitions before freezing them into a [`StateMachine`].
pub struct StateMachineBuilder<S, E, C> {
    name: String,
    transitions: Vec<Transition<S, E, C>>,
    index: HashMap<(S, E), usize>,
}

impl<S: Label, E: Label, C> StateMachineBuilder<S, E, C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transitions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register `source --event--> target`.
    pub fn add_transition(
        &mut self,
        source: S,
        target: S,
        event: E,
        actions: ActionCatalog<S, E, C>,
    ) -> Result<&mut Self> {
        self.push(vec![source], target, event, actions, Registration::Single)
    }

    /// Register one rule usable from any of `sources`.
    pub fn add_batch_transition(
        &mut self,
        sources: impl IntoIterator<Item = S>,
        target: S,
        event: E,
        actions: ActionCatalog<S, E, C>,
    ) -> Result<&mut Self> {
        let mut unique = Vec::new();
        for source in sources {
            if !unique.contains(&source) {
                unique.push(source);
            }
        }
        if unique.is_empty() {
            return Err(ScanflowError::ConfigError(format!(
                "state machine '{}': batch transition for event {} has no source states",
                self.name, event
            )));
        }
        self.push(unique, target, event, actions, Registration::Batch)
    }

    fn push(
        &mut self,
        sources: Vec<S>,
        target: S,
        event: E,
        actions: ActionCatalog<S, E, C>,
        registration: Registration,
    ) -> Result<&mut Self> {
        for source in &sources {
            if self.index.contains_key(&(*source, event)) {
                return Err(ScanflowError::DuplicateTransition {
                    machine: self.name.clone(),
                    state: source.to_string(),
                    event: event.to_string(),
                });
            }
        }

        let position = self.transitions.len();
        for source in &sources {
            self.index.insert((*source, event), position);
        }
        self.transitions.push(Transition {
            sources,
            target,
            event,
            actions,
            registration,
        });
        Ok(self)
    }

    pub fn build(self) -> StateMachine<S, E, C> {
        debug!(
            machine = %self.name,
            transitions = self.transitions.len(),
            "state machine built"
        );
        StateMachine {
            name: self.name,
            transitions: self.transitions,
            index: self.index,
        }
    }
}

/// Immutable transition registry.
///
/// Safe to share behind an `Arc`; [`send_event`](Self::send_event) takes
/// `&self` and keeps no per-instance state.
pub struct StateMachine<S, E, C> {
    name: String,
    transitions: Vec<Transition<S, E, C>>,
    index: HashMap<(S, E), usize>,
}

impl<S: Label, E: Label, C> StateMachine<S, E, C> {
    pub fn builder(name: impl Into<String>) -> StateMachineBuilder<S, E, C> {
        StateMachineBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered transitions in registration order.
    pub fn transitions(&self) -> &[Transition<S, E, C>] {
        &self.transitions
    }

    fn lookup(&self, state: S, event: E) -> Option<&Transition<S, E, C>> {
        self.index.get(&(state, event)).map(|&i| &self.transitions[i])
    }

    pub fn can_fire(&self, state: S, event: E) -> bool {
        self.index.contains_key(&(state, event))
    }

    pub fn target_of(&self, state: S, event: E) -> Option<S> {
        self.lookup(state, event).map(|t| t.target)
    }

    /// Events accepted from `state`, in registration order.
    pub fn events_from(&self, state: S) -> Vec<E> {
        self.transitions
            .iter()
            .filter(|t| t.accepts(state))
            .map(|t| t.event)
            .collect()
    }

    /// A state with no outgoing rule.
    pub fn is_terminal(&self, state: S) -> bool {
        !self.transitions.iter().any(|t| t.accepts(state))
    }

    /// Apply `event` to an instance currently in `source`.
    ///
    /// Fails with [`ScanflowError::IllegalTransition`] when no rule matches.
    /// Otherwise the first supporting action (if any) runs synchronously with
    /// the event payload before the target is reported. An action error is
    /// returned as [`ScanflowError::ActionFailed`]; the caller must then drop
    /// whatever it was about to persist.
    pub fn send_event(&self, source: S, event: &mut Event<E, C>) -> Result<TransitResult<S>> {
        let transition =
            self.lookup(source, event.name)
                .ok_or_else(|| ScanflowError::IllegalTransition {
                    machine: self.name.clone(),
                    state: source.to_string(),
                    event: event.name.to_string(),
                })?;

        let target = transition.target;
        let selected = transition.actions.select(source, target, event.name);

        let action = match selected {
            Some(action) => {
                trace!(
                    machine = %self.name,
                    action = action.name(),
                    from = %source,
                    to = %target,
                    event = %event.name,
                    "executing action"
                );
                action
                    .execute(source, target, &mut event.context)
                    .map_err(|e| ScanflowError::ActionFailed {
                        machine: self.name.clone(),
                        action: action.name().to_string(),
                        source: e,
                    })?;
                Some(action.name())
            }
            None => None,
        };

        debug!(
            machine = %self.name,
            from = %source,
            to = %target,
            event = %event.name,
            action = action.unwrap_or("-"),
            "transition applied"
        );

        Ok(TransitResult {
            source,
            target,
            action,
        })
    }

    /// Convenience wrapper around [`send_event`](Self::send_event) for callers
    /// that keep the payload themselves.
    pub fn fire(&self, source: S, event: E, context: C) -> Result<(TransitResult<S>, C)> {
        let mut event = Event::new(event, context);
        let result = self.send_event(source, &mut event)?;
        Ok((result, event.into_context()))
    }

    /// State graph as a `petgraph` map: one edge per `(source, target)` pair.
    pub fn graph(&self) -> DiGraphMap<S, ()> {
        let mut graph = DiGraphMap::new();
        for transition in &self.transitions {
            graph.add_node(transition.target);
            for source in &transition.sources {
                graph.add_edge(*source, transition.target, ());
            }
        }
        graph
    }

    /// States reachable from `initial` (including `initial` itself).
    pub fn reachable_from(&self, initial: S) -> BTreeSet<S> {
        let mut graph = self.graph();
        graph.add_node(initial);

        let mut reachable = BTreeSet::new();
        let mut dfs = Dfs::new(&graph, initial);
        while let Some(state) = dfs.next(&graph) {
            reachable.insert(state);
        }
        reachable
    }
}

impl<S: fmt::Debug, E: fmt::Debug, C> fmt::Debug for StateMachine<S, E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("name", &self.name)
            .field("transitions", &self.transitions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::statemachine::FnAction;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum Light {
        Off,
        On,
        Broken,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    enum Switch {
        Flip,
        Smash,
    }

    impl fmt::Display for Light {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl fmt::Display for Switch {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    type Log = Vec<&'static str>;

    fn recording(
        name: &'static str,
        from: Light,
        counter: Arc<AtomicUsize>,
    ) -> FnAction<Light, Switch, Log> {
        FnAction::new(
            name,
            move |source, _, _| source == from,
            move |_, _, log: &mut Log| {
                counter.fetch_add(1, Ordering::SeqCst);
                log.push(name);
                Ok(())
            },
        )
    }

    fn machine(catalog: ActionCatalog<Light, Switch, Log>) -> StateMachine<Light, Switch, Log> {
        let mut builder = StateMachine::builder("light");
        builder
            .add_transition(Light::Off, Light::On, Switch::Flip, catalog.clone())
            .unwrap()
            .add_transition(Light::On, Light::Off, Switch::Flip, catalog.clone())
            .unwrap()
            .add_batch_transition([Light::Off, Light::On], Light::Broken, Switch::Smash, catalog)
            .unwrap();
        builder.build()
    }

    #[test]
    fn legal_event_reports_target() {
        let m = machine(ActionCatalog::new());
        let (result, _) = m.fire(Light::Off, Switch::Flip, Vec::new()).unwrap();
        assert_eq!(result.target, Light::On);
        assert_eq!(result.action, None);
    }

    #[test]
    fn illegal_event_is_surfaced() {
        let m = machine(ActionCatalog::new());
        let err = m.fire(Light::Broken, Switch::Flip, Vec::new()).unwrap_err();
        assert!(err.is_illegal_transition());
    }

    #[test]
    fn only_first_supporting_action_runs() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let other = Arc::new(AtomicUsize::new(0));
        let catalog = ActionCatalog::new()
            .with(recording("on-only", Light::On, other.clone()))
            .with(recording("first", Light::Off, first.clone()))
            .with(recording("second", Light::Off, second.clone()));

        let m = machine(catalog);
        let (result, log) = m.fire(Light::Off, Switch::Flip, Vec::new()).unwrap();

        assert_eq!(result.action, Some("first"));
        assert_eq!(log, vec!["first"]);
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn batch_support_sees_current_source() {
        let counter = Arc::new(AtomicUsize::new(0));
        let catalog = ActionCatalog::new().with(recording("from-on", Light::On, counter.clone()));
        let m = machine(catalog);

        let (from_off, _) = m.fire(Light::Off, Switch::Smash, Vec::new()).unwrap();
        assert_eq!(from_off.target, Light::Broken);
        assert_eq!(from_off.action, None);

        let (from_on, _) = m.fire(Light::On, Switch::Smash, Vec::new()).unwrap();
        assert_eq!(from_on.action, Some("from-on"));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_action_aborts_transition() {
        let catalog = ActionCatalog::new().with(FnAction::new(
            "boom",
            |_, _, _| true,
            |_, _, _: &mut Log| Err(anyhow::anyhow!("boom")),
        ));
        let m = machine(catalog);
        let err = m.fire(Light::Off, Switch::Flip, Vec::new()).unwrap_err();
        match err {
            ScanflowError::ActionFailed { action, .. } => assert_eq!(action, "boom"),
            other => panic!("expected ActionFailed, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut builder: StateMachineBuilder<Light, Switch, Log> = StateMachine::builder("dup");
        builder
            .add_transition(Light::Off, Light::On, Switch::Flip, ActionCatalog::new())
            .unwrap();
        let err = builder
            .add_batch_transition(
                [Light::On, Light::Off],
                Light::Broken,
                Switch::Flip,
                ActionCatalog::new(),
            )
            .err()
            .expect("duplicate must fail");
        assert!(matches!(err, ScanflowError::DuplicateTransition { .. }));
    }

    #[test]
    fn terminal_and_reachability() {
        let m = machine(ActionCatalog::new());
        assert!(m.is_terminal(Light::Broken));
        assert!(!m.is_terminal(Light::Off));
        let reachable = m.reachable_from(Light::Off);
        assert_eq!(
            reachable.into_iter().collect::<Vec<_>>(),
            vec![Light::Off, Light::On, Light::Broken]
        );
    }
}
