//! The job table: an indexed collection of jobs shared between the
//! shell's main flow and the SIGCHLD reconciler.
//!
//! Slot 0 is reserved for the foreground job; slots ≥1 hold background
//! jobs. Free slots are reused before the table grows. The table backing
//! the shell is a single process-global instance; main-flow access goes
//! through [`with_table`], which requires a [`SignalGuard`] witnessing
//! that SIGCHLD is blocked for the duration.

use std::cell::UnsafeCell;
use std::fmt;

use nix::sys::termios::Termios;
use nix::unistd::Pid;

use crate::jobs::state::{ExitStatus, RunState, StatusChange};
use crate::signals::SignalGuard;

/// Index of a job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(pub usize);

impl JobId {
    /// The reserved foreground slot.
    pub const FOREGROUND: JobId = JobId(0);

    pub fn is_foreground(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One OS process belonging to a job.
///
/// Mutated only by the reconciler; freed only with its owning job.
#[derive(Debug, Clone)]
pub struct ProcRecord {
    pid: Pid,
    state: RunState,
}

impl ProcRecord {
    fn new(pid: Pid) -> Self {
        Self {
            pid,
            state: RunState::Running,
        }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn state(&self) -> RunState {
        self.state
    }
}

/// One job: the processes of a command or pipeline, sharing one process
/// group. The aggregate state mirrors the final pipeline stage.
#[derive(Debug, Clone)]
pub struct Job {
    pgid: Pid,
    procs: Vec<ProcRecord>,
    state: RunState,
    tmodes: Option<Termios>,
    command: String,
}

impl Job {
    pub fn pgid(&self) -> Pid {
        self.pgid
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn procs(&self) -> &[ProcRecord] {
        &self.procs
    }

    pub(crate) fn tmodes(&self) -> Option<&Termios> {
        self.tmodes.as_ref()
    }
}

/// Which job states a report pass should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    Running,
    Stopped,
    Finished,
    All,
}

impl StateFilter {
    fn matches(&self, state: RunState) -> bool {
        match self {
            StateFilter::Running => state == RunState::Running,
            StateFilter::Stopped => state == RunState::Stopped,
            StateFilter::Finished => state.is_finished(),
            StateFilter::All => true,
        }
    }
}

/// Reportable snapshot of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    pub state: RunState,
    pub command: String,
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            RunState::Running => write!(f, "[{}] running '{}'", self.id, self.command),
            RunState::Stopped => write!(f, "[{}] suspended '{}'", self.id, self.command),
            RunState::Finished(ExitStatus::Exited(code)) => {
                write!(f, "[{}] exited '{}', status={}", self.id, self.command, code)
            }
            RunState::Finished(ExitStatus::Signaled(sig)) => {
                write!(
                    f,
                    "[{}] killed '{}' by signal {}",
                    self.id, self.command, sig as i32
                )
            }
        }
    }
}

/// The indexed collection of job slots.
pub struct JobTable {
    slots: Vec<Option<Job>>,
}

impl JobTable {
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn ensure_foreground_slot(&mut self) {
        if self.slots.is_empty() {
            self.slots.push(None);
        }
    }

    /// Slot for a new job: the reserved foreground slot, or the first
    /// free background slot, growing the table when none is free.
    /// Never blocks.
    fn alloc_slot(&mut self, background: bool) -> JobId {
        self.ensure_foreground_slot();
        if !background {
            return JobId::FOREGROUND;
        }
        for (i, slot) in self.slots.iter().enumerate().skip(1) {
            if slot.is_none() {
                return JobId(i);
            }
        }
        self.slots.push(None);
        JobId(self.slots.len() - 1)
    }

    /// A free background slot, for relocating a stopped foreground job.
    pub fn free_background_slot(&mut self) -> JobId {
        self.alloc_slot(true)
    }

    /// Create a job with no processes yet.
    pub fn add_job(&mut self, pgid: Pid, background: bool, tmodes: Option<Termios>) -> JobId {
        let id = self.alloc_slot(background);
        debug_assert!(
            self.slots[id.0].is_none(),
            "foreground slot already occupied"
        );
        self.slots[id.0] = Some(Job {
            pgid,
            procs: Vec::new(),
            state: RunState::Running,
            tmodes,
            command: String::new(),
        });
        id
    }

    /// Append a newly spawned process to a job, extending the job's
    /// reconstructed command text.
    pub fn attach(&mut self, id: JobId, pid: Pid, words: &[String]) {
        let job = self.slots[id.0]
            .as_mut()
            .expect("attach to an unoccupied job slot");
        job.procs.push(ProcRecord::new(pid));
        if !job.command.is_empty() {
            job.command.push_str(" | ");
        }
        job.command.push_str(&words.join(" "));
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    /// Aggregate state, without draining.
    pub fn state(&self, id: JobId) -> Option<RunState> {
        self.get(id).map(|job| job.state)
    }

    /// Query the aggregate state; when the job has finished, reclaim
    /// its slot. A terminal outcome is readable exactly once — a later
    /// query of a reused slot sees the new occupant.
    pub fn reap(&mut self, id: JobId) -> Option<RunState> {
        let state = self.state(id)?;
        if state.is_finished() {
            self.slots[id.0] = None;
        }
        Some(state)
    }

    /// Move a job's full state between slots. The destination must be
    /// free.
    pub fn relocate(&mut self, from: JobId, to: JobId) {
        if from == to {
            return;
        }
        debug_assert!(self.get(to).is_none(), "relocating onto an occupied slot");
        self.slots[to.0] = self.slots[from.0].take();
    }

    /// Snapshot one job for reporting.
    pub fn report_for(&self, id: JobId) -> Option<JobReport> {
        self.get(id).map(|job| JobReport {
            id,
            state: job.state,
            command: job.command.clone(),
        })
    }

    /// Sweep the background slots, reporting jobs whose state passes
    /// `filter` and draining the finished ones among them. Jobs that do
    /// not pass the filter are left untouched, so no terminal outcome
    /// is ever dropped unreported.
    pub fn reports(&mut self, filter: StateFilter) -> Vec<JobReport> {
        let mut out = Vec::new();
        for i in 1..self.slots.len() {
            let Some(job) = self.slots[i].as_ref() else {
                continue;
            };
            let state = job.state;
            if !filter.matches(state) {
                continue;
            }
            out.push(JobReport {
                id: JobId(i),
                state,
                command: job.command.clone(),
            });
            if state.is_finished() {
                self.slots[i] = None;
            }
        }
        out
    }

    /// The most recently allocated live background job.
    pub fn last_background(&self) -> Option<JobId> {
        (1..self.slots.len())
            .rev()
            .find(|&i| self.slots[i].is_some())
            .map(JobId)
    }

    /// Indices of every occupied slot, foreground included.
    pub fn occupied(&self) -> impl Iterator<Item = JobId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| JobId(i))
    }

    /// The reconciler's state-transition pass.
    ///
    /// For every occupied slot, asks `poll` whether each non-finished
    /// process changed state, applies the change, then sets the job
    /// aggregate to its final stage's state. Allocates nothing; safe to
    /// run from the SIGCHLD handler.
    pub fn sweep_with<F>(&mut self, mut poll: F)
    where
        F: FnMut(Pid) -> Option<StatusChange>,
    {
        for slot in &mut self.slots {
            let Some(job) = slot.as_mut() else {
                continue;
            };
            for proc in &mut job.procs {
                if proc.state.is_finished() {
                    continue;
                }
                match poll(proc.pid) {
                    Some(StatusChange::Finished(status)) => {
                        proc.state = RunState::Finished(status);
                    }
                    Some(StatusChange::Stopped) => proc.state = RunState::Stopped,
                    Some(StatusChange::Continued) => proc.state = RunState::Running,
                    None => {}
                }
            }
            if let Some(last) = job.procs.last() {
                job.state = last.state;
            }
        }
    }
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The one process-global table backing the shell.
///
/// Exclusivity is provided by signal masking, not by a lock: the main
/// flow only touches the table while SIGCHLD is blocked, and the kernel
/// does not re-enter the SIGCHLD handler while it runs.
struct TableCell(UnsafeCell<JobTable>);

// Safety: single-threaded process; see above.
unsafe impl Sync for TableCell {}

static TABLE: TableCell = TableCell(UnsafeCell::new(JobTable::new()));

/// Run `f` with exclusive access to the shell's job table. The guard
/// witnesses that SIGCHLD delivery is held back for the duration.
pub fn with_table<R>(guard: &SignalGuard, f: impl FnOnce(&mut JobTable) -> R) -> R {
    let _ = guard;
    // Safety: SIGCHLD is blocked on this thread while `f` runs.
    unsafe { f(&mut *TABLE.0.get()) }
}

/// Handler-side access. Only the installed SIGCHLD handler may call
/// this, and only because the main flow masks SIGCHLD around its own
/// accesses.
pub(crate) unsafe fn table_for_handler() -> &'static mut JobTable {
    &mut *TABLE.0.get()
}
