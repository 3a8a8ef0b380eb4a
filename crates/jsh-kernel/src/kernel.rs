//! The shell-facing control surface: startup and shutdown, plus the
//! job operations the read-eval loop drives (resume, terminate,
//! report). Launching lives in [`crate::launch`].
//!
//! Every operation here holds a [`SignalGuard`] around its job-table
//! accesses, per the concurrency discipline described in
//! [`crate::signals`].

use std::io::{stdin, IsTerminal};

use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use tracing::debug;

use crate::error::JobError;
use crate::jobs::state::RunState;
use crate::jobs::table::{self, JobId, JobReport, StateFilter};
use crate::launch::Outcome;
use crate::monitor;
use crate::signals::{self, SignalGuard};
use crate::tty;

/// Bring up job control: interactive check, own process group, the
/// SIGCHLD reconciler, terminal ownership.
pub fn startup() -> Result<(), JobError> {
    if !stdin().is_terminal() {
        return Err(JobError::NotInteractive);
    }
    if unistd::getsid(None)? != unistd::getpgid(None)? {
        unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))?;
    }
    signals::install()?;
    tty::take_control()
}

/// Terminate and drain every remaining job, then release the terminal.
/// Returns the final report for each job that was still around.
pub fn shutdown() -> Vec<JobReport> {
    let guard = SignalGuard::block();
    let ids: Vec<JobId> = table::with_table(&guard, |t| t.occupied().collect());
    for id in ids {
        let Some(pgid) = table::with_table(&guard, |t| t.get(id).map(|j| j.pgid())) else {
            continue;
        };
        let _ = signal::killpg(pgid, Signal::SIGTERM);
        let _ = signal::killpg(pgid, Signal::SIGCONT);
        loop {
            match table::with_table(&guard, |t| t.state(id)) {
                None | Some(RunState::Finished(_)) => break,
                Some(_) => guard.suspend(),
            }
        }
    }
    let reports = table::with_table(&guard, |t| t.reports(StateFilter::Finished));
    tty::release();
    reports
}

/// Continue a stopped job.
///
/// Foreground: hand the terminal to the job's group, restore the job's
/// saved line discipline, promote it into the foreground slot, wake the
/// group, and monitor it. Background: just wake the group; the
/// reconciler records the continue when the kernel reports it.
pub fn resume(id: JobId, foreground: bool) -> Result<Outcome, JobError> {
    if id.is_foreground() {
        return Err(JobError::NoSuchJob(id));
    }
    let guard = SignalGuard::block();
    let Some((pgid, tmodes)) =
        table::with_table(&guard, |t| t.get(id).map(|j| (j.pgid(), j.tmodes().cloned())))
    else {
        return Err(JobError::NoSuchJob(id));
    };

    debug!(%id, foreground, "continuing job");

    if foreground {
        tty::set_foreground_group(pgid)?;
        if let Some(modes) = &tmodes {
            tty::restore_modes(modes)?;
        }
        table::with_table(&guard, |t| t.relocate(id, JobId::FOREGROUND));
        signal::killpg(pgid, Signal::SIGCONT)?;
        // Wait out the window where the group still reads as stopped,
        // so the monitor does not mistake the old stop for a new one.
        while matches!(
            table::with_table(&guard, |t| t.state(JobId::FOREGROUND)),
            Some(RunState::Stopped)
        ) {
            guard.suspend();
        }
        monitor::monitor_foreground(&guard)
    } else {
        signal::killpg(pgid, Signal::SIGCONT)?;
        table::with_table(&guard, |t| t.report_for(id))
            .map(Outcome::Background)
            .ok_or(JobError::NoSuchJob(id))
    }
}

/// Terminate a whole job. The continue after the terminate wakes a
/// stopped group, which would otherwise never act on the termination.
pub fn terminate(id: JobId) -> Result<(), JobError> {
    let guard = SignalGuard::block();
    let Some(pgid) = table::with_table(&guard, |t| t.get(id).map(|j| j.pgid())) else {
        return Err(JobError::NoSuchJob(id));
    };
    debug!(%id, pgid = pgid.as_raw(), "killing job");
    signal::killpg(pgid, Signal::SIGTERM)?;
    signal::killpg(pgid, Signal::SIGCONT)?;
    Ok(())
}

/// Report background jobs whose state passes `filter`, draining the
/// finished ones among them. A drained outcome disappears from
/// subsequent reports.
pub fn report(filter: StateFilter) -> Vec<JobReport> {
    let guard = SignalGuard::block();
    table::with_table(&guard, |t| t.reports(filter))
}

/// Resolve an explicit job index, or default to the most recent live
/// background job.
pub fn find_job(index: Option<usize>) -> Option<(JobId, String)> {
    let guard = SignalGuard::block();
    table::with_table(&guard, |t| {
        let id = match index {
            Some(i) => JobId(i),
            None => t.last_background()?,
        };
        let job = t.get(id)?;
        Some((id, job.command().to_string()))
    })
}
