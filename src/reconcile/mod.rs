// src/reconcile/mod.rs

//! Timeout reconciliation.
//!
//! - [`sweeps`]: the synchronous submit, block and execution timeout sweeps.
//! - [`runtime`]: the tokio loops that run each sweep on a fixed delay.

pub mod runtime;
pub mod sweeps;

pub use runtime::{ReconcileRuntime, ShutdownHandle};
pub use sweeps::{Reconciler, SweepKind, SweepReport};
