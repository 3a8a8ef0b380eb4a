//! Pipeline launching: forking command segments wired together with
//! pipes, one process group per job.
//!
//! SIGCHLD stays blocked from before the first fork until the whole job
//! is registered, so the reconciler can never observe a job with
//! unattached processes. Pipe ends and redirection descriptors are
//! `OwnedFd`s; dropping them promptly in the parent is what lets EOF
//! propagate when a stage exits.

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::process;

use nix::fcntl::OFlag;
use nix::sys::signal::{self, SigHandler, SigmaskHow, Signal};
use nix::unistd::{self, ForkResult, Pid};
use tracing::debug;

use crate::error::JobError;
use crate::jobs::state::RunState;
use crate::jobs::table::{self, JobId, JobReport};
use crate::monitor;
use crate::signals::SignalGuard;
use crate::tty;

/// One pipeline stage: argument words plus optional redirections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Segment {
    pub words: Vec<String>,
    /// Read standard input from this path instead of the terminal or
    /// the previous pipe.
    pub input: Option<PathBuf>,
    /// Append standard output to this path instead of the terminal or
    /// the next pipe.
    pub output: Option<PathBuf>,
}

impl Segment {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            words: words.into_iter().map(Into::into).collect(),
            input: None,
            output: None,
        }
    }
}

/// The built-in dispatcher contract: `Some(code)` when the words named
/// a built-in that ran in the calling process, `None` to run an
/// external program.
pub type Builtins = fn(&[String]) -> Option<i32>;

/// What became of a launched or resumed job.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Foreground work finished; POSIX exit code (0–255, 128+signal).
    Exited(i32),
    /// The foreground job stopped and now sits in a background slot.
    Stopped(JobReport),
    /// A background job is running.
    Background(JobReport),
}

/// Create a single-command job.
///
/// A built-in runs in the shell's own process only here: a single,
/// non-piped, foreground invocation. Inside a pipeline every stage
/// forks, built-in or not, since a built-in cannot share pipe plumbing
/// with sibling processes from the shell's process.
pub fn launch_command(
    segment: Segment,
    background: bool,
    builtins: Builtins,
) -> Result<Outcome, JobError> {
    if segment.words.is_empty() {
        return Err(JobError::MalformedPipeline);
    }
    if !background {
        if let Some(code) = builtins(&segment.words) {
            return Ok(Outcome::Exited(code));
        }
    }
    launch_pipeline(vec![segment], background, builtins)
}

/// Create a multi-process job from ordered pipeline segments.
///
/// The first spawned process leads the group (pgid = its pid); every
/// later process joins that group. Each process is registered with the
/// job table as soon as it exists — before it can possibly report a
/// status change.
pub fn launch_pipeline(
    segments: Vec<Segment>,
    background: bool,
    builtins: Builtins,
) -> Result<Outcome, JobError> {
    if segments.is_empty() || segments.iter().any(|s| s.words.is_empty()) {
        return Err(JobError::MalformedPipeline);
    }

    let guard = SignalGuard::block();
    let tmodes = tty::snapshot_modes();

    let mut pgid: Option<Pid> = None;
    let mut job: Option<JobId> = None;

    let built = (|| -> Result<JobId, JobError> {
        let last = segments.len() - 1;
        let mut stage_input: Option<OwnedFd> = None;
        for (i, segment) in segments.iter().enumerate() {
            let (next_input, stage_output) = if i == last {
                (None, None)
            } else {
                let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
                (Some(read), Some(write))
            };

            let pid = spawn_stage(
                segment,
                pgid,
                stage_input.take(),
                stage_output,
                !background,
                &guard,
                builtins,
            )?;

            let leader = *pgid.get_or_insert(pid);
            let id = *job.get_or_insert_with(|| {
                table::with_table(&guard, |t| t.add_job(leader, background, tmodes.clone()))
            });
            table::with_table(&guard, |t| t.attach(id, pid, &segment.words));

            stage_input = next_input;
        }
        Ok(job.unwrap_or(JobId::FOREGROUND))
    })();

    let id = match built {
        Ok(id) => id,
        Err(err) => {
            if let Some(id) = job {
                rollback(&guard, id);
            }
            return Err(err);
        }
    };

    if background {
        debug!(%id, "background job launched");
        table::with_table(&guard, |t| t.report_for(id))
            .map(Outcome::Background)
            .ok_or(JobError::NoSuchJob(id))
    } else {
        monitor::monitor_foreground(&guard)
    }
}

/// Fork one stage into the job's process group and wire its stdio.
///
/// `pgid` is `None` for the stage that will lead the group. Both parent
/// and child set the group membership; whichever runs first wins.
fn spawn_stage(
    segment: &Segment,
    pgid: Option<Pid>,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
    foreground: bool,
    guard: &SignalGuard,
    builtins: Builtins,
) -> Result<Pid, JobError> {
    // Redirections override pipe plumbing for the stage naming them.
    let stdin_fd = match &segment.input {
        Some(path) => Some(open_input(path)?),
        None => stdin_fd,
    };
    let stdout_fd = match &segment.output {
        Some(path) => Some(open_output(path)?),
        None => stdout_fd,
    };

    // Safety: single-threaded process; the child only execs or exits.
    match unsafe { unistd::fork() }? {
        ForkResult::Child => child_setup(segment, pgid, stdin_fd, stdout_fd, foreground, guard, builtins),
        ForkResult::Parent { child } => {
            let _ = unistd::setpgid(child, pgid.unwrap_or(child));
            if foreground {
                tty::set_foreground_group(pgid.unwrap_or(child))?;
            }
            debug!(pid = child.as_raw(), "spawned stage");
            Ok(child)
            // stdin_fd/stdout_fd drop here: the parent's copies of the
            // stage's pipe and redirection ends close promptly.
        }
    }
}

/// Everything the child does between fork and exec. Never returns.
fn child_setup(
    segment: &Segment,
    pgid: Option<Pid>,
    stdin_fd: Option<OwnedFd>,
    stdout_fd: Option<OwnedFd>,
    foreground: bool,
    guard: &SignalGuard,
    builtins: Builtins,
) -> ! {
    let _ = unistd::setpgid(Pid::from_raw(0), pgid.unwrap_or(Pid::from_raw(0)));
    if foreground {
        let _ = tty::set_foreground_group(pgid.unwrap_or(unistd::getpid()));
    }

    // The shell ignores job-control stops; the program must not.
    for sig in [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
        // Safety: restoring the default disposition.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }

    if let Some(fd) = &stdin_fd {
        let _ = unistd::dup2(fd.as_raw_fd(), 0);
    }
    if let Some(fd) = &stdout_fd {
        let _ = unistd::dup2(fd.as_raw_fd(), 1);
    }

    // A blocked SIGCHLD must not leak into the program replacing us.
    let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(guard.saved()), None);

    if let Some(code) = builtins(&segment.words) {
        process::exit(code);
    }
    exec(&segment.words)
}

fn exec(words: &[String]) -> ! {
    let argv: Vec<CString> = words
        .iter()
        .map(|w| CString::new(w.as_str()).unwrap_or_default())
        .collect();
    if let Err(err) = unistd::execvp(&argv[0], &argv) {
        eprintln!("jsh: {}: {}", words[0], err.desc());
    }
    process::exit(127);
}

fn open_input(path: &Path) -> Result<OwnedFd, JobError> {
    File::open(path)
        .map(OwnedFd::from)
        .map_err(|source| JobError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

fn open_output(path: &Path) -> Result<OwnedFd, JobError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o700)
        .open(path)
        .map(OwnedFd::from)
        .map_err(|source| JobError::Redirect {
            path: path.to_path_buf(),
            source,
        })
}

/// Tear down a partially constructed job: wake and terminate the whole
/// group, then drain its slot.
fn rollback(guard: &SignalGuard, id: JobId) {
    let Some(pgid) = table::with_table(guard, |t| t.get(id).map(|j| j.pgid())) else {
        return;
    };
    debug!(%id, "rolling back partial pipeline");
    let _ = signal::killpg(pgid, Signal::SIGTERM);
    let _ = signal::killpg(pgid, Signal::SIGCONT);
    loop {
        match table::with_table(guard, |t| t.reap(id)) {
            None | Some(RunState::Finished(_)) => break,
            Some(_) => guard.suspend(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_builtins(_: &[String]) -> Option<i32> {
        None
    }

    #[test]
    fn empty_command_is_malformed() {
        let err = launch_command(Segment::default(), false, no_builtins).unwrap_err();
        assert!(matches!(err, JobError::MalformedPipeline));
    }

    #[test]
    fn pipeline_with_empty_stage_is_malformed() {
        let segments = vec![Segment::new(["yes"]), Segment::default()];
        let err = launch_pipeline(segments, false, no_builtins).unwrap_err();
        assert!(matches!(err, JobError::MalformedPipeline));
    }

    #[test]
    fn foreground_builtin_runs_in_process() {
        fn fake(words: &[String]) -> Option<i32> {
            (words[0] == "status").then_some(7)
        }
        let outcome = launch_command(Segment::new(["status"]), false, fake).unwrap();
        assert!(matches!(outcome, Outcome::Exited(7)));
    }
}
