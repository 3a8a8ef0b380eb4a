//! jsh-kernel: the job-control core of jsh.
//!
//! This crate provides:
//!
//! - **Jobs**: the job table, process records, and tagged run states
//! - **Signals**: the SIGCHLD reconciler and blocked-signal scopes
//! - **Tty**: terminal ownership and line-discipline bookkeeping
//! - **Launch**: pipeline construction (fork, pipes, process groups)
//! - **Monitor**: the foreground wait loop
//! - **Kernel**: the surface the read-eval loop drives
//!
//! The shell is a single process; the only asynchronous entry point is
//! the SIGCHLD reconciler, which interrupts the main flow whenever a
//! child changes state. Every main-flow access to the job table runs
//! inside a [`signals::SignalGuard`] scope, and the sole blocking point
//! is the monitor's sigsuspend.

pub mod error;
pub mod jobs;
pub mod kernel;
pub mod launch;
pub mod monitor;
pub mod signals;
pub mod tty;

pub use error::JobError;
pub use jobs::{with_table, ExitStatus, JobId, JobReport, JobTable, RunState, StateFilter};
pub use kernel::{find_job, report, resume, shutdown, startup, terminate};
pub use launch::{launch_command, launch_pipeline, Builtins, Outcome, Segment};
pub use signals::SignalGuard;
