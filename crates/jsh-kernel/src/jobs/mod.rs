//! Job bookkeeping — jobs, their process records, and run states.
//!
//! - **state**: tagged run states, exit outcomes, status changes
//! - **table**: the indexed slot table shared with the reconciler

pub(crate) mod state;
pub(crate) mod table;

pub use state::{ExitStatus, RunState, StatusChange};
pub use table::{with_table, Job, JobId, JobReport, JobTable, ProcRecord, StateFilter};
