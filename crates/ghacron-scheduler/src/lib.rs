//! ghacron-scheduler: the reconcile–schedule–dispatch engine.
//!
//! The [`Scheduler`] owns the in-process timer registry; the
//! [`Reconciler`] converges it against the annotations discovered by the
//! scanner; the dispatch handler fires `workflow_dispatch` with an
//! at-most-one-per-tick guarantee backed by repository Actions
//! variables ([`StateManager`]).

mod dispatch;
mod reconciler;
mod scheduler;
mod state;

pub use reconciler::Reconciler;
pub use scheduler::Scheduler;
pub use state::{format_rfc3339, StateManager};
