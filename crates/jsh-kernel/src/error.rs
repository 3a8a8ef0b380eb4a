//! Kernel error taxonomy.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::jobs::JobId;

#[derive(Debug, Error)]
pub enum JobError {
    /// The shell requires a controlling terminal on standard input.
    #[error("shell can run only in interactive mode")]
    NotInteractive,

    /// A dangling pipe marker or an empty pipeline stage.
    #[error("command line is not well formed")]
    MalformedPipeline,

    /// Job index out of range, or the slot was already reclaimed.
    #[error("no such job: {0}")]
    NoSuchJob(JobId),

    /// A redirection target could not be opened. Fatal to the command
    /// being launched, never to the shell.
    #[error("cannot open {path}: {source}")]
    Redirect { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Io(#[from] io::Error),

    /// Kernel-level process-control failure (fork, process groups,
    /// terminal ownership). Aborts the launch attempt: continuing
    /// would leave job-control invariants inconsistent.
    #[error(transparent)]
    Sys(#[from] nix::errno::Errno),
}
