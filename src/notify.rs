// src/notify.rs

//! Outbound notifications raised by actions.
//!
//! Actions run inside the store's unit of work, so they must not block and
//! must not call back into the store. They hand a [`Notification`] to a
//! [`Notifier`] instead; whoever owns the receiving end (dispatcher,
//! submitter) reacts after the transition is committed.

use std::fmt::Debug;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::model::{SubtaskId, SubtaskRuntime, TaskId};
use crate::subtask::SubScanTaskStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A scan task was sent back to `PENDING` and can be submitted again.
    TaskReset { task_id: TaskId },
    /// A sub-task is back in `CREATED` and should be dispatched again.
    SubtaskRedispatch { runtime: SubtaskRuntime },
    /// A sub-task reached a terminal state.
    SubtaskFinished {
        subtask_id: SubtaskId,
        parent_scan_task_id: TaskId,
        status: SubScanTaskStatus,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::TaskReset { .. } => "task_reset",
            Notification::SubtaskRedispatch { .. } => "subtask_redispatch",
            Notification::SubtaskFinished { .. } => "subtask_finished",
        }
    }
}

pub trait Notifier: Send + Sync + Debug {
    /// Must return promptly; delivery is best effort.
    fn notify(&self, notification: Notification);
}

/// Forwards notifications over an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        let kind = notification.kind();
        if self.tx.send(notification).is_err() {
            warn!(kind, "notification receiver dropped; notification lost");
        }
    }
}

/// Drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, notification: Notification) {
        debug!(kind = notification.kind(), "notification discarded");
    }
}
