//! Terminal ownership and line-discipline bookkeeping.
//!
//! One process-wide terminal descriptor, duplicated from standard input
//! at startup and marked close-on-exec; the shell's saved settings live
//! here, per-job settings live in the job record. The foreground-group
//! attribute is changed only from the main flow, never from the
//! reconciler.
//!
//! Every operation is a no-op `Ok` when no terminal was installed, so
//! the launch and monitor paths also work for non-interactive
//! embeddings and tests. This module is the one OS-specific boundary
//! for terminal arbitration; nothing else calls tcsetpgrp/tcsetattr.

use std::cell::UnsafeCell;
use std::io::stdin;
use std::os::fd::{AsFd, OwnedFd};

use nix::sys::termios::{self, SetArg, Termios};
use nix::unistd::{self, Pid};

use crate::error::JobError;

struct Terminal {
    fd: OwnedFd,
    shell_modes: Termios,
}

struct TtyCell(UnsafeCell<Option<Terminal>>);

// Safety: single-threaded process, and the SIGCHLD handler never
// touches the terminal.
unsafe impl Sync for TtyCell {}

static TTY: TtyCell = TtyCell(UnsafeCell::new(None));

fn terminal() -> &'static mut Option<Terminal> {
    // Safety: see TtyCell.
    unsafe { &mut *TTY.0.get() }
}

/// Duplicate the controlling terminal (close-on-exec, so it never leaks
/// into an exec'd child), make the shell's process group the terminal's
/// foreground group, and save the shell's line discipline.
pub fn take_control() -> Result<(), JobError> {
    // try_clone_to_owned dups with FD_CLOEXEC set.
    let fd = stdin().as_fd().try_clone_to_owned()?;
    unistd::tcsetpgrp(fd.as_fd(), unistd::getpgrp())?;
    let shell_modes = termios::tcgetattr(fd.as_fd())?;
    *terminal() = Some(Terminal { fd, shell_modes });
    Ok(())
}

/// Hand terminal foreground ownership to `pgid`.
pub fn set_foreground_group(pgid: Pid) -> Result<(), JobError> {
    if let Some(t) = terminal() {
        unistd::tcsetpgrp(t.fd.as_fd(), pgid)?;
    }
    Ok(())
}

/// Line-discipline snapshot for a job being created.
pub fn snapshot_modes() -> Option<Termios> {
    terminal()
        .as_ref()
        .and_then(|t| termios::tcgetattr(t.fd.as_fd()).ok())
}

/// Restore a job's saved line discipline before its processes resume,
/// so editing modes toggled by a full-screen program survive
/// suspension.
pub fn restore_modes(modes: &Termios) -> Result<(), JobError> {
    if let Some(t) = terminal() {
        termios::tcsetattr(t.fd.as_fd(), SetArg::TCSADRAIN, modes)?;
    }
    Ok(())
}

/// Return foreground ownership and the shell's own settings to the
/// shell.
pub fn reclaim_for_shell() -> Result<(), JobError> {
    if let Some(t) = terminal() {
        unistd::tcsetpgrp(t.fd.as_fd(), unistd::getpgrp())?;
        termios::tcsetattr(t.fd.as_fd(), SetArg::TCSADRAIN, &t.shell_modes)?;
    }
    Ok(())
}

/// Close the terminal descriptor at shutdown.
pub fn release() {
    *terminal() = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_ops_are_noops_without_a_terminal() {
        // Nothing installed under the test harness.
        assert!(snapshot_modes().is_none());
        assert!(set_foreground_group(unistd::getpgrp()).is_ok());
        assert!(reclaim_for_shell().is_ok());
    }
}
