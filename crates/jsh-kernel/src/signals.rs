//! SIGCHLD plumbing: the asynchronous status reconciler and the
//! blocked-signal scope that every main-flow table access runs under.
//!
//! The reconciler interrupts the main flow at an arbitrary instruction
//! boundary whenever a child changes state. It allocates nothing, takes
//! no locks, and leaves errno as it found it; exclusivity against the
//! main flow comes from [`SignalGuard`] masking, not synchronization
//! primitives.

use nix::errno::Errno;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

use crate::error::JobError;
use crate::jobs::state::{ExitStatus, StatusChange};
use crate::jobs::table;

/// Scope during which SIGCHLD delivery is held back.
///
/// Constructed around every main-flow read or mutation of the job
/// table; the previous mask is restored on drop. [`SignalGuard::suspend`]
/// atomically waits with the saved mask, which closes the lost-wakeup
/// race between a state check and the wait.
pub struct SignalGuard {
    prev: SigSet,
}

impl SignalGuard {
    pub fn block() -> Self {
        let mut set = SigSet::empty();
        set.add(Signal::SIGCHLD);
        let mut prev = SigSet::empty();
        // sigprocmask cannot fail for a valid `how`.
        let _ = signal::sigprocmask(SigmaskHow::SIG_BLOCK, Some(&set), Some(&mut prev));
        Self { prev }
    }

    /// Suspend the whole process with the pre-block mask in effect,
    /// until a signal handler has run. sigsuspend reports EINTR on
    /// every normal wakeup.
    pub fn suspend(&self) {
        let _ = self.prev.suspend();
    }

    /// The mask in effect before this scope widened it. Children
    /// restore it before exec.
    pub(crate) fn saved(&self) -> &SigSet {
        &self.prev
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        let _ = signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&self.prev), None);
    }
}

/// Install the SIGCHLD reconciler and the shell's own job-control
/// dispositions. Called once at startup, before any child exists.
pub fn install() -> Result<(), JobError> {
    // Keep SIGINT out while the reconciler runs; an interactive SIGINT
    // handler must not unwind underneath it.
    let mut handler_mask = SigSet::empty();
    handler_mask.add(Signal::SIGINT);
    let action = SigAction::new(
        SigHandler::Handler(reconcile),
        SaFlags::SA_RESTART,
        handler_mask,
    );
    // Safety: `reconcile` follows signal-handler discipline (no
    // allocation, errno preserved).
    unsafe {
        signal::sigaction(Signal::SIGCHLD, &action)?;
    }

    // The shell must survive Ctrl-Z and terminal I/O stops; children
    // reset these to default before exec.
    for sig in [Signal::SIGTSTP, Signal::SIGTTIN, Signal::SIGTTOU] {
        unsafe {
            signal::signal(sig, SigHandler::SigIgn)?;
        }
    }
    Ok(())
}

/// Non-blocking status check for one child.
pub(crate) fn poll_child(pid: Pid) -> Option<StatusChange> {
    let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    match waitpid(pid, Some(flags)) {
        Ok(WaitStatus::Exited(_, code)) => Some(StatusChange::Finished(ExitStatus::Exited(code))),
        Ok(WaitStatus::Signaled(_, sig, _)) => {
            Some(StatusChange::Finished(ExitStatus::Signaled(sig)))
        }
        Ok(WaitStatus::Stopped(_, _)) => Some(StatusChange::Stopped),
        Ok(WaitStatus::Continued(_)) => Some(StatusChange::Continued),
        Ok(_) | Err(_) => None,
    }
}

/// The asynchronous entry point: bury or re-mark every child that
/// changed state, then recompute each job's aggregate.
extern "C" fn reconcile(_sig: i32) {
    let saved_errno = Errno::last_raw();
    // Safety: the kernel does not re-enter this handler, and the main
    // flow blocks SIGCHLD around its own table accesses.
    let jobs = unsafe { table::table_for_handler() };
    jobs.sweep_with(poll_child);
    Errno::set_raw(saved_errno);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_masks_sigchld_for_its_scope() {
        {
            let _guard = SignalGuard::block();
            let masked = SigSet::thread_get_mask().unwrap();
            assert!(masked.contains(Signal::SIGCHLD));
        }
        let restored = SigSet::thread_get_mask().unwrap();
        assert!(!restored.contains(Signal::SIGCHLD));
    }

    #[test]
    fn nested_guards_restore_in_order() {
        let outer = SignalGuard::block();
        {
            let _inner = SignalGuard::block();
            assert!(SigSet::thread_get_mask()
                .unwrap()
                .contains(Signal::SIGCHLD));
        }
        // Inner drop restores the outer scope's mask, still blocked.
        assert!(SigSet::thread_get_mask()
            .unwrap()
            .contains(Signal::SIGCHLD));
        drop(outer);
        assert!(!SigSet::thread_get_mask()
            .unwrap()
            .contains(Signal::SIGCHLD));
    }
}
