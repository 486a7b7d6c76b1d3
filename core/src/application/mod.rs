//! Application layer - The engine proper.
//!
//! Orchestrates domain logic over the ports:
//! - `poller`: at most one collection in flight per poll group
//! - `reconciler`: snapshot diffs into appearance, exit and watched-port events
//! - `view`: filter, sort, selection and cursor per table
//! - `actions`: the confirm-then-execute kill/stop state machine
//! - `dashboard`: the single state record tying them together

mod actions;
mod dashboard;
mod export;
mod poller;
mod reconciler;
mod view;

pub use actions::{
    execute, ActionCoordinator, ActionMode, ActionRejected, ActionReport, ActionState,
    ActionTarget, PendingAction,
};
pub use dashboard::{Dashboard, DashboardOptions};
pub use export::{default_export_dir, write_export, ExportDocument};
pub use poller::{collect, CoreMessage, PollCycle, Poller};
pub use reconciler::Reconciler;
pub use view::{
    RenderedRow, RenderedTable, SortDirection, SortSpec, ViewManager, ViewState, SELECTION_MARK,
};
