//! The foreground wait loop.

use tracing::debug;

use crate::error::JobError;
use crate::jobs::state::RunState;
use crate::jobs::table::{self, JobId};
use crate::launch::Outcome;
use crate::signals::SignalGuard;
use crate::tty;

/// Block the shell until the foreground job stops or finishes, then
/// return terminal ownership and the shell's line discipline.
///
/// Not a busy-wait: SIGCHLD is unblocked only inside `suspend`, so a
/// notification arriving between the state check and the wait is
/// delivered at the suspend, never lost.
pub fn monitor_foreground(guard: &SignalGuard) -> Result<Outcome, JobError> {
    let outcome = loop {
        match table::with_table(guard, |t| t.reap(JobId::FOREGROUND)) {
            Some(RunState::Running) => guard.suspend(),
            Some(RunState::Stopped) => {
                let report = table::with_table(guard, |t| {
                    let to = t.free_background_slot();
                    t.relocate(JobId::FOREGROUND, to);
                    t.report_for(to)
                });
                if let Some(report) = &report {
                    debug!(job = %report.id, "foreground job stopped, moved to background");
                }
                break report
                    .map(Outcome::Stopped)
                    .ok_or(JobError::NoSuchJob(JobId::FOREGROUND));
            }
            // reap already reclaimed the slot; the outcome surfaces as
            // a POSIX exit code.
            Some(RunState::Finished(status)) => break Ok(Outcome::Exited(status.code())),
            None => break Err(JobError::NoSuchJob(JobId::FOREGROUND)),
        }
    };
    tty::reclaim_for_shell()?;
    outcome
}
