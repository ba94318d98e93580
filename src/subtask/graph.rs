// src/subtask/graph.rs

use std::sync::Arc;

use crate::errors::Result;
use crate::model::ScannerRegistry;
use crate::notify::Notifier;
use crate::statemachine::{ActionCatalog, StateMachine};
use crate::subtask::actions::{SubtaskContext, subtask_action_catalog};
use crate::subtask::{SubScanTaskStatus, SubtaskEvent};

pub type SubtaskMachine = StateMachine<SubScanTaskStatus, SubtaskEvent, SubtaskContext>;

/// Register the sub-task transition table, sharing `catalog` between rows.
pub fn build_subtask_machine(
    catalog: ActionCatalog<SubScanTaskStatus, SubtaskEvent, SubtaskContext>,
) -> Result<SubtaskMachine> {
    use SubScanTaskStatus as S;
    use SubtaskEvent as E;

    let mut builder = StateMachine::builder("sub_scan_task");
    builder
        .add_transition(S::NeverScanned, S::Created, E::Create, catalog.clone())?
        .add_transition(S::NeverScanned, S::Blocked, E::Block, catalog.clone())?
        .add_transition(S::Blocked, S::Created, E::Notify, catalog.clone())?
        .add_transition(S::Created, S::Failed, E::Failed, catalog.clone())?
        .add_batch_transition([S::Created, S::Executing], S::Pulled, E::Pull, catalog.clone())?
        .add_transition(S::Pulled, S::Pulled, E::Pull, catalog.clone())?
        .add_transition(S::Pulled, S::Executing, E::Execute, catalog.clone())?
        .add_transition(S::Pulled, S::Created, E::Retry, catalog.clone())?
        // Execution never started within the allowed run time.
        .add_transition(S::Pulled, S::Failed, E::Failed, catalog.clone())?
        .add_transition(S::Pulled, S::Timeout, E::Timeout, catalog.clone())?
        .add_transition(S::Blocked, S::BlockTimeout, E::BlockTimeout, catalog.clone())?
        .add_transition(S::Executing, S::Timeout, E::Timeout, catalog.clone())?
        .add_transition(S::Executing, S::Failed, E::Failed, catalog.clone())?
        .add_transition(S::Executing, S::Success, E::Success, catalog.clone())?
        .add_transition(S::Executing, S::Created, E::Retry, catalog.clone())?
        .add_transition(S::NeverScanned, S::Success, E::Success, catalog.clone())?
        .add_batch_transition(
            [S::Blocked, S::Created, S::Pulled, S::Executing],
            S::Stopped,
            E::Stop,
            catalog,
        )?;
    Ok(builder.build())
}

/// Sub-task machine wired with the standard action catalog.
pub fn subtask_machine(
    notifier: Arc<dyn Notifier>,
    scanners: Arc<ScannerRegistry>,
) -> Result<SubtaskMachine> {
    build_subtask_machine(subtask_action_catalog(notifier, scanners))
}
