mod event;
mod interface;
mod intercept;
mod io_util;
pub mod no_pty;

use libc::{SIGHUP, SIGKILL, SIGTERM};

use crate::log::{dev_info, dev_warn};
use crate::system::{
    interface::ProcessId,
    kill, killpg,
    signal::SignalNumber,
    wait::{waitpid, WaitError, WaitOptions, WaitPid, WaitStatus},
};

pub use interface::{CommandDetails, CommandFlags, CommandStatus, ExecCmnd, PolicySession, TtyId, TtyLabeler};
pub use intercept::{InterceptChannel, InterceptProvider, NoIntercept, NoTracer, SeizeOutcome, Tracer};

/// Exit disposition of the supervised command, reported alongside [`CommandStatus`].
#[derive(Debug, Clone, Copy)]
pub enum ExitReason {
    Code(i32),
    Signal(SignalNumber),
}

pub(crate) fn signal_fmt(signal: SignalNumber) -> std::borrow::Cow<'static, str> {
    signal_hook::low_level::signal_name(signal)
        .map(|name| name.into())
        .unwrap_or_else(|| format!("unknown signal #{signal}").into())
}

pub(crate) const fn cond_fmt(s: &str, cond: bool) -> &str {
    if cond {
        s
    } else {
        ""
    }
}

pub(crate) const fn opt_fmt(cond: bool, s: &str) -> &str {
    cond_fmt(s, cond)
}

/// Abort with a diagnostic. Used for the handful of setup failures with no
/// caller-recoverable path: allocation, pipe/socketpair creation, fork, policy
/// session initialization.
pub(crate) fn fatal(context: &str, err: &dyn std::fmt::Display) -> ! {
    dev_error!("{context}: {err}");
    panic!("{context}: {err}");
}

/// Escalating termination sequence for a child that must die: `SIGHUP`, `SIGTERM`, a
/// blocking pause, then `SIGKILL`. `to_pgrp` selects whether the signals target the
/// child's process group (intercept/ptrace setup may have already spawned descendants)
/// or just the child itself (the SIGALRM timeout path, before any descendant exists).
pub(crate) fn terminate_process(pid: ProcessId, to_pgrp: bool) {
    let send = |signal: SignalNumber| {
        let result = if to_pgrp { killpg(pid, signal) } else { kill(pid, signal) };
        if let Err(err) = result {
            dev_warn!("cannot send {} to {pid}: {err}", signal_fmt(signal));
        }
    };

    send(SIGHUP);
    send(SIGTERM);
    std::thread::sleep(std::time::Duration::from_secs(2));
    send(SIGKILL);
}

/// Per-[`event::Process`] hooks invoked by [`handle_sigchld`] for each disposition a
/// reaped child can have. Implemented once per closure type (just [`no_pty::ExecClosure`]
/// in this crate) so the multi-child drain loop itself lives in one place.
pub(crate) trait HandleSigchld: event::Process {
    /// Wait flags passed to every `waitpid` call in the drain loop.
    const OPTIONS: WaitOptions;

    /// The reaped pid was the main child and it exited normally or was terminated by a
    /// signal. Passed the full [`WaitStatus`] so the implementer can apply the
    /// monotonic `cstat` overwrite rule itself.
    fn on_exit_or_term(&mut self, status: WaitStatus, dispatcher: &mut event::EventDispatcher<Self>);
    /// The reaped pid was the main child and it stopped.
    fn on_stop(&mut self, signal: SignalNumber, dispatcher: &mut event::EventDispatcher<Self>);

    /// In `USE_PTRACE` mode, asks the tracer whether a stopped `pid` is a real
    /// group-stop the supervisor should act on, as opposed to an ignorable ptrace-stop
    /// of any traced process (not just the main child). Outside of `USE_PTRACE` mode
    /// every stop is a group-stop by definition, so the default is `true`.
    fn is_group_stop(&mut self, pid: ProcessId, status: WaitStatus) -> bool {
        let _ = (pid, status);
        true
    }
}

/// Drains every reapable child in a loop: SIGCHLD can indicate more than one reapable
/// child when intercept/ptrace modes are spawning tracked descendants, so a single
/// callback invocation keeps calling `waitpid(-1, ...)` until it would block.
pub(crate) fn handle_sigchld<T: HandleSigchld>(
    closure: &mut T,
    dispatcher: &mut event::EventDispatcher<T>,
    who: &str,
    main_pid: ProcessId,
) {
    loop {
        let (pid, status) = match waitpid(WaitPid::any(), T::OPTIONS) {
            Ok(ok) => ok,
            Err(WaitError::NotReady) => return,
            Err(WaitError::Io(err)) if err.raw_os_error() == Some(libc::ECHILD) => return,
            Err(WaitError::Io(err)) => {
                dev_warn!("waitpid failed while reaping {who}: {err}");
                return;
            }
        };

        log_status(who, pid, &status);

        if status.was_stopped() {
            // In USE_PTRACE mode the tracer gets first look at *every* stopped
            // pid, traced descendants included, before we decide whether this is
            // a group-stop worth suspending the supervisor for.
            if closure.is_group_stop(pid, status) {
                if pid == main_pid {
                    if let Some(signal) = status.stop_signal() {
                        closure.on_stop(signal, dispatcher);
                    }
                }
            }
            // Not a group-stop, or a traced descendant stopped; keep draining.
            continue;
        }

        if status.exit_status().is_some() || status.term_signal().is_some() {
            if pid == main_pid {
                closure.on_exit_or_term(status, dispatcher);
            }
            continue;
        }

        // SIGCONT notifications and anything else: log and keep draining.
    }
}

fn log_status(who: &str, pid: ProcessId, status: &WaitStatus) {
    if let Some(code) = status.exit_status() {
        dev_info!("{who} ({pid}) exited with status code {code}");
    } else if let Some(signal) = status.term_signal() {
        dev_info!("{who} ({pid}) was terminated by {}", signal_fmt(signal));
    } else if let Some(signal) = status.stop_signal() {
        dev_info!("{who} ({pid}) was stopped by {}", signal_fmt(signal));
    } else if status.did_continue() {
        dev_info!("{who} ({pid}) continued execution");
    } else {
        dev_warn!("unexpected wait status for {who} ({pid})");
    }
}
