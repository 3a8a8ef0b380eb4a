//! End-to-end job control against real child processes.
//!
//! These tests share the process-global job table and the SIGCHLD
//! handler, so they serialize on a lock and each drains the jobs it
//! creates.

use std::sync::{Mutex, MutexGuard};
use std::thread::sleep;
use std::time::{Duration, Instant};

use nix::sys::signal::{killpg, Signal};

use jsh_kernel::{
    launch_command, launch_pipeline, report, signals, terminate, with_table, ExitStatus, JobId,
    Outcome, RunState, Segment, SignalGuard, StateFilter,
};

static LOCK: Mutex<()> = Mutex::new(());

fn setup() -> MutexGuard<'static, ()> {
    let lock = LOCK.lock().unwrap_or_else(|e| e.into_inner());
    signals::install().expect("install SIGCHLD handler");
    lock
}

fn no_builtins(_: &[String]) -> Option<i32> {
    None
}

fn background(outcome: Outcome) -> jsh_kernel::JobReport {
    match outcome {
        Outcome::Background(report) => report,
        other => panic!("expected a background job, got {other:?}"),
    }
}

/// Poll until `probe` yields, with a hard deadline. The reconciler runs
/// asynchronously, so state changes surface between polls.
fn wait_for<T>(mut probe: impl FnMut() -> Option<T>) -> T {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe() {
            return value;
        }
        assert!(Instant::now() < deadline, "timed out waiting for job state");
        sleep(Duration::from_millis(20));
    }
}

fn finished_report(id: JobId) -> Option<jsh_kernel::JobReport> {
    report(StateFilter::Finished)
        .into_iter()
        .find(|r| r.id == id)
}

#[test]
fn background_job_is_reported_exactly_once() {
    let _lock = setup();

    let first = background(launch_command(Segment::new(["true"]), true, no_builtins).unwrap());
    assert_eq!(first.state, RunState::Running);
    assert_eq!(first.to_string(), format!("[{}] running 'true'", first.id));

    let last = wait_for(|| finished_report(first.id));
    assert_eq!(last.state, RunState::Finished(ExitStatus::Exited(0)));

    // The outcome was drained; the job is gone from later reports.
    assert!(report(StateFilter::All).iter().all(|r| r.id != first.id));
}

#[test]
fn pipeline_stages_share_one_process_group() {
    let _lock = setup();

    let segments = vec![Segment::new(["echo", "hi"]), Segment::new(["cat"])];
    let launched = background(launch_pipeline(segments, true, no_builtins).unwrap());
    assert_eq!(launched.command, "echo hi | cat");

    {
        let guard = SignalGuard::block();
        with_table(&guard, |t| {
            let job = t.get(launched.id).expect("job still registered");
            assert_eq!(job.procs().len(), 2);
            // The first spawned process leads the group.
            assert_eq!(job.procs()[0].pid(), job.pgid());
        });
    }

    let last = wait_for(|| finished_report(launched.id));
    // The aggregate outcome comes from the final stage.
    assert_eq!(last.state, RunState::Finished(ExitStatus::Exited(0)));
}

#[test]
fn output_redirection_appends() {
    let _lock = setup();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.txt");

    for _ in 0..2 {
        let mut segment = Segment::new(["echo", "hello"]);
        segment.output = Some(path.clone());
        let launched = background(launch_command(segment, true, no_builtins).unwrap());
        wait_for(|| finished_report(launched.id));
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello\nhello\n");
}

#[test]
fn terminating_a_stopped_job_wakes_and_kills_it() {
    let _lock = setup();

    let launched =
        background(launch_command(Segment::new(["sleep", "100"]), true, no_builtins).unwrap());

    let pgid = {
        let guard = SignalGuard::block();
        with_table(&guard, |t| t.get(launched.id).unwrap().pgid())
    };
    killpg(pgid, Signal::SIGSTOP).unwrap();

    let suspended = wait_for(|| {
        report(StateFilter::Stopped)
            .into_iter()
            .find(|r| r.id == launched.id)
    });
    assert_eq!(
        suspended.to_string(),
        format!("[{}] suspended 'sleep 100'", launched.id)
    );

    // SIGTERM alone would sit undelivered on the stopped group; the
    // follow-up SIGCONT lets it act.
    terminate(launched.id).unwrap();

    let last = wait_for(|| finished_report(launched.id));
    assert_eq!(last.state, RunState::Finished(ExitStatus::Signaled(Signal::SIGTERM)));
    assert_eq!(
        last.to_string(),
        format!("[{}] killed 'sleep 100' by signal 15", launched.id)
    );
}

#[test]
fn background_resume_continues_a_stopped_job() {
    let _lock = setup();

    let launched =
        background(launch_command(Segment::new(["sleep", "100"]), true, no_builtins).unwrap());

    let pgid = {
        let guard = SignalGuard::block();
        with_table(&guard, |t| t.get(launched.id).unwrap().pgid())
    };
    killpg(pgid, Signal::SIGSTOP).unwrap();
    wait_for(|| {
        report(StateFilter::Stopped)
            .into_iter()
            .find(|r| r.id == launched.id)
    });

    let resumed = jsh_kernel::resume(launched.id, false).unwrap();
    assert!(matches!(resumed, Outcome::Background(_)));

    // The reconciler picks the continue up from WCONTINUED.
    wait_for(|| {
        report(StateFilter::Running)
            .into_iter()
            .find(|r| r.id == launched.id)
    });

    terminate(launched.id).unwrap();
    wait_for(|| finished_report(launched.id));
}

#[test]
fn invalid_job_references_are_noop_failures() {
    let _lock = setup();
    assert!(matches!(
        terminate(JobId(4096)),
        Err(jsh_kernel::JobError::NoSuchJob(_))
    ));
    assert!(jsh_kernel::resume(JobId(4096), false).is_err());
    assert!(jsh_kernel::find_job(Some(4096)).is_none());
}
