//! End-to-end scenarios from `spec.md` §8 (S1, S2, S3, S5, S6). Each drives the real
//! `supervise()` entry point against a real forked child — no mocking of the kernel.

mod common;

use std::os::unix::process::CommandExt;
use std::time::Duration;

use nopty_supervisor::{CommandFlags, CommandStatus, ExitReason};

use common::{details_for, details_with_flags, AlreadyTracedTracer, AlwaysIntercept};

/// S1 — clean exit: `/bin/true` exits 0.
#[test]
fn clean_exit_reports_exit_code_zero() {
    let details = details_for("/bin/true", &[]);
    let mut cstat = CommandStatus::Invalid;

    let (exit_reason, teardown) = nopty_supervisor::supervise(details, &mut cstat).unwrap();
    teardown();

    assert!(matches!(exit_reason, ExitReason::Code(0)));
    match cstat {
        CommandStatus::WStatus(status) => {
            assert_eq!(status.exit_status(), Some(0));
        }
        other => panic!("expected WStatus(exit 0), got {other:?}"),
    }
}

/// S2 — exec failure: the path does not exist, so `execve` fails with `ENOENT` and the
/// parent must see `Errno(ENOENT)`, never a `WStatus`.
#[test]
fn exec_failure_reports_errno_not_wstatus() {
    let details = details_for("/nonexistent-command-for-test", &[]);
    let mut cstat = CommandStatus::Invalid;

    let result = nopty_supervisor::supervise(details, &mut cstat);

    match cstat {
        CommandStatus::Errno(errno) => assert_eq!(errno, libc::ENOENT),
        other => panic!("expected Errno(ENOENT), got {other:?}"),
    }
    // The event loop breaks on the errpipe read producing a terminal errno in this
    // implementation's plumbing, so either an `Err` or an `Ok` with the errno already
    // recorded in `cstat` is acceptable — what matters is `cstat` never becomes `WStatus`.
    if let Ok((_, teardown)) = result {
        teardown();
    }
}

/// S3 — forwarded SIGINT: a user-generated SIGINT from an unrelated process group
/// reaches the child, terminating it.
#[test]
fn user_generated_sigint_from_other_pgrp_is_forwarded() {
    let details = details_for("/bin/sleep", &["60"]);
    let mut cstat = CommandStatus::Invalid;

    // SAFETY: single-threaded at this point in the test process.
    let child_pid = match unsafe { libc::fork() } {
        0 => {
            let (exit_reason, teardown) = nopty_supervisor::supervise(details, &mut cstat).unwrap();
            teardown();
            let code = match exit_reason {
                ExitReason::Code(c) => c,
                ExitReason::Signal(_) => 42,
            };
            std::process::exit(code);
        }
        pid if pid > 0 => pid,
        _ => panic!("fork failed"),
    };

    // Give the supervisor a moment to fork+exec `sleep`, then deliver SIGINT from a
    // sibling process living in its own process group.
    std::thread::sleep(Duration::from_millis(200));
    std::process::Command::new("kill")
        .args(["-INT", &child_pid.to_string()])
        .process_group(0)
        .status()
        .unwrap();

    let mut status = 0;
    // SAFETY: `child_pid` was just forked by this test and is waited for exactly once.
    unsafe {
        libc::waitpid(child_pid, &mut status, 0);
    }
    assert!(libc::WIFEXITED(status));
    assert_eq!(libc::WEXITSTATUS(status), 42);
}

/// S5 — timeout: `SET_TIMEOUT` with a 1-second alarm forcefully terminates a long-lived
/// child; the final status decodes a terminating signal, not a clean exit.
#[test]
fn timeout_forces_termination() {
    let flags = CommandFlags {
        set_timeout: true,
        ..CommandFlags::default()
    };
    let mut details = details_for("/bin/sleep", &["60"]);
    details.timeout = Some(Duration::from_secs(1));
    details.flags = flags;

    let mut cstat = CommandStatus::Invalid;
    let started = std::time::Instant::now();
    let (_, teardown) = nopty_supervisor::supervise(details, &mut cstat).unwrap();
    teardown();

    // SIGHUP, then SIGTERM, then (if needed) a 2s wait before SIGKILL: bounded well
    // under `sleep 60`'s duration either way.
    assert!(started.elapsed() < Duration::from_secs(10));
    match cstat {
        CommandStatus::WStatus(status) => assert!(status.term_signal().is_some()),
        other => panic!("expected a terminating-signal WStatus, got {other:?}"),
    }
}

/// S6 — intercept fallback: `INTERCEPT|USE_PTRACE` set, but seizing the child reports
/// another tracer is already present. All three flags get cleared and the command runs
/// to completion untraced.
#[test]
fn ptrace_seize_fallback_runs_untraced_to_completion() {
    let flags = CommandFlags {
        intercept: true,
        use_ptrace: true,
        ..CommandFlags::default()
    };
    let mut details = details_with_flags("/bin/true", &[], flags);
    details.intercept_provider = Some(Box::new(AlwaysIntercept));
    details.tracer = Some(Box::new(AlreadyTracedTracer));

    let mut cstat = CommandStatus::Invalid;
    let (exit_reason, teardown) = nopty_supervisor::supervise(details, &mut cstat).unwrap();
    teardown();

    assert!(matches!(exit_reason, ExitReason::Code(0)));
    match cstat {
        CommandStatus::WStatus(status) => assert_eq!(status.exit_status(), Some(0)),
        other => panic!("expected WStatus(exit 0), got {other:?}"),
    }
}

/// Round-trip property (`spec.md` §8): invoking the supervisor twice sequentially with
/// fresh `cstat`/event-base state yields two independent, correct outcomes.
#[test]
fn two_sequential_invocations_are_independent() {
    for expected_code in [0, 7] {
        let details = details_for("/bin/sh", &["-c", &format!("exit {expected_code}")]);
        let mut cstat = CommandStatus::Invalid;
        let (exit_reason, teardown) = nopty_supervisor::supervise(details, &mut cstat).unwrap();
        teardown();

        assert!(matches!(exit_reason, ExitReason::Code(c) if c == expected_code));
        match cstat {
            CommandStatus::WStatus(status) => assert_eq!(status.exit_status(), Some(expected_code)),
            other => panic!("expected WStatus(exit {expected_code}), got {other:?}"),
        }
    }
}
