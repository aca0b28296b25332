//! The non-tty supervisor loop: [`supervise`] forks the target command, reports an
//! exec-time failure back through a one-shot pipe, and then drives a single-threaded
//! event loop that forwards selected signals to the child, reaps it through every
//! exit/stop/continue transition, and suspends itself in lockstep when the child stops.

use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, IntoRawFd};
use std::os::unix::net::UnixStream;
use std::process::exit;

use super::event::{EventDispatcher, EventId, Process, StopReason};
use super::intercept::{InterceptChannel, SeizeOutcome, Tracer};
use super::interface::{CommandDetails, CommandStatus};
use super::io_util::{was_interrupted, was_wouldblock};
use super::{fatal, handle_sigchld, opt_fmt, signal_fmt, terminate_process, ExitReason, HandleSigchld};
use crate::log::{dev_error, dev_info, dev_warn};
use crate::system::{
    alarm, fork, getpgid, getpgrp,
    interface::ProcessId,
    kill, killpg,
    signal::{block_all, restore_mask, Signal, SignalAction, SignalHandler, SignalNumber},
    socketpair_inheritable,
    wait::{WaitOptions, WaitStatus},
    FileCloser, ForkResult,
};

/// Runs `details.exec_cmnd` as a supervised child: blocks signals, forks, reports an
/// exec-time failure through the error pipe, then drives the event loop until the
/// child exits.
///
/// On return, `cstat` holds the final disposition (see [`CommandStatus`]) and the
/// returned closure finishes teardown (restoring the tty's MAC label and releasing
/// intercept state) — call it once the caller is done inspecting the result.
pub fn supervise(
    mut details: CommandDetails,
    cstat: &mut CommandStatus,
) -> io::Result<(ExitReason, impl FnOnce())> {
    if let Err(err) = details.policy_session.init() {
        fatal("policy plugin failed session initialization", &err);
    }

    let (mut errpipe_tx, errpipe_rx) = UnixStream::pair().unwrap_or_else(|err| fatal("unable to create pipe", &err));

    let want_intercept = (details.flags.intercept || details.flags.log_subcmds) && !details.flags.use_ptrace;
    let intercept_sv = if want_intercept {
        Some(socketpair_inheritable().unwrap_or_else(|err| fatal("unable to create sockets", &err)))
    } else {
        None
    };

    let old_mask = block_all().unwrap_or_else(|err| fatal("unable to block signals", &err));

    if !cstat.is_invalid() {
        restore_mask(&old_mask)?;
        return Err(io::Error::new(io::ErrorKind::Interrupted, "termination requested before fork"));
    }

    if details.flags.rbac_enabled {
        if let Some(tty) = details.tty {
            if let Err(err) = details.tty_labeler.relabel(tty) {
                let errno = err.raw_os_error().unwrap_or(libc::EIO);
                cstat.set_errno(errno);
                restore_mask(&old_mask)?;
                return Err(err);
            }
        }
    }

    let mut file_closer = FileCloser::new();
    file_closer.except(&errpipe_tx);
    if let Some((_, ref child_fd)) = intercept_sv {
        file_closer.except(child_fd);
    }

    // SAFETY: the process is single threaded up to this point (no threads have been
    // spawned) and every call between here and the child's `exec`/`exit` is
    // async-signal-safe.
    let fork_result = unsafe { fork() }.unwrap_or_else(|err| fatal("unable to fork", &err));
    let ForkResult::Parent(command_pid) = fork_result else {
        file_closer.close_the_universe().ok();
        // `into_raw_fd` relinquishes ownership instead of just reading the number: the
        // socket must stay open across `exec` (it's the one fd intentionally inheritable).
        let intercept_child_fd = intercept_sv.map(|(_, child)| child.into_raw_fd());
        let err = details.exec_cmnd.exec(&old_mask, intercept_child_fd, errpipe_tx.as_raw_fd());

        if let Some(errno) = err.raw_os_error() {
            let buf = errno.to_ne_bytes();
            let mut written = 0;
            while written < buf.len() {
                match errpipe_tx.write(&buf[written..]) {
                    Ok(n) => written += n,
                    Err(err) if was_interrupted(&err) => continue,
                    Err(_) => break,
                }
            }
        }
        drop(errpipe_tx);
        exit(1);
    };

    dev_info!("executed command with pid {command_pid}");

    // Parent: close the child-side fds (invariant 5).
    drop(errpipe_tx);
    let intercept_parent_fd = intercept_sv.map(|(parent, child)| {
        drop(child);
        parent
    });

    if let Some(fd) = details.execfd.take() {
        // SAFETY: `execfd` is owned by `details` and not used again.
        unsafe {
            libc::close(fd);
        }
    }

    if details.flags.set_timeout {
        if let Some(timeout) = details.timeout {
            alarm(timeout.as_secs().min(u32::MAX as u64) as u32);
        }
    }

    let signal_handler = SignalHandler::new().unwrap_or_else(|err| fatal("unable to allocate memory", &err));

    let tracer = details.tracer.take();
    let mut dispatcher = EventDispatcher::new();
    let mut closure = ExecClosure::new(
        command_pid,
        errpipe_rx,
        signal_handler,
        cstat,
        details.flags.use_ptrace,
        tracer,
        &mut dispatcher,
    );

    // §4.1 step 10: intercept setup runs whenever intercept or subcommand logging was
    // requested. `USE_PTRACE` alone, without either of those, never reaches here — the
    // tracer seize only happens as part of bringing up the intercept channel.
    if details.flags.intercept || details.flags.log_subcmds {
        if let Some(provider) = details.intercept_provider.as_deref() {
            let channel = provider.setup(intercept_parent_fd, &details);
            match channel {
                None => {
                    terminate_process(command_pid, true);
                }
                Some(mut channel) => {
                    let mut cleared = false;
                    if details.flags.use_ptrace {
                        if let Some(tracer) = &closure.tracer {
                            match tracer.seize(command_pid) {
                                SeizeOutcome::Seized => {}
                                SeizeOutcome::AlreadyTraced => {
                                    details.flags.intercept = false;
                                    details.flags.log_subcmds = false;
                                    details.flags.use_ptrace = false;
                                    closure.use_ptrace = false;
                                    cleared = true;
                                }
                                SeizeOutcome::Fatal => {
                                    terminate_process(command_pid, true);
                                    cleared = true;
                                }
                            }
                        }
                    }
                    if !cleared {
                        closure.register_intercept(channel.as_ref(), &mut dispatcher);
                        closure.intercept = Some(channel);
                    } else {
                        drop(channel);
                    }
                }
            }
        }
    }

    restore_mask(&old_mask)?;

    let exit_reason = match dispatcher.event_loop(&mut closure) {
        StopReason::Break(err) => {
            dev_error!("event loop exited prematurely: {err}");
            terminate_process(command_pid, true);
            if cstat.is_invalid() {
                cstat.set_errno(err.raw_os_error().unwrap_or(libc::EIO));
            }
            // The real cause is in `cstat`, not a signal the command received; `1` is a
            // plain generic-failure code rather than a fabricated disposition.
            ExitReason::Code(1)
        }
        StopReason::Exit(reason) => reason,
    };

    let tty_labeler_restore = details.flags.rbac_enabled.then_some(());
    let tty = details.tty;

    Ok((
        exit_reason,
        move || {
            if tty_labeler_restore.is_some() {
                if let Some(tty) = tty {
                    details.tty_labeler.restore(tty);
                }
            }
            if let Some(provider) = &details.intercept_provider {
                provider.cleanup();
            }
            drop(dispatcher);
        },
    ))
}

struct ExecClosure<'a> {
    command_pid: Option<ProcessId>,
    parent_pgrp: ProcessId,
    errpipe_rx: UnixStream,
    errpipe_event: EventId,
    signal_handler: SignalHandler,
    intercept: Option<Box<dyn InterceptChannel>>,
    intercept_event: Option<EventId>,
    /// Whether `USE_PTRACE` is (still) in effect; cleared alongside `details.flags` if
    /// seizing the child falls back to running it untraced.
    use_ptrace: bool,
    tracer: Option<Box<dyn Tracer>>,
    /// The caller's status sink, mutated directly from the error-pipe and reaper
    /// callbacks as each outcome becomes known.
    cstat: &'a mut CommandStatus,
}

impl<'a> ExecClosure<'a> {
    #[allow(clippy::too_many_arguments)]
    fn new(
        command_pid: ProcessId,
        errpipe_rx: UnixStream,
        signal_handler: SignalHandler,
        cstat: &'a mut CommandStatus,
        use_ptrace: bool,
        tracer: Option<Box<dyn Tracer>>,
        dispatcher: &mut EventDispatcher<Self>,
    ) -> Self {
        dispatcher.register_read_event(&signal_handler, ExecEvent::Signal);
        let errpipe_event = dispatcher.register_read_event(&errpipe_rx, ExecEvent::ErrPipe);

        Self {
            command_pid: Some(command_pid),
            parent_pgrp: getpgrp(),
            errpipe_rx,
            errpipe_event,
            signal_handler,
            intercept: None,
            intercept_event: None,
            use_ptrace,
            tracer,
            cstat,
        }
    }

    fn register_intercept(&mut self, channel: &dyn InterceptChannel, dispatcher: &mut EventDispatcher<Self>) {
        self.intercept_event = Some(dispatcher.register_read_event(channel, ExecEvent::Intercept));
    }

    /// A signal is self-terminating if `signaler_pid` is the main child, or is in a
    /// process group led by the main child or by the supervisor itself.
    fn is_self_terminating(&self, signaler_pid: ProcessId) -> bool {
        let Some(command_pid) = self.command_pid else {
            return false;
        };
        if signaler_pid.inner() == 0 {
            return false;
        }
        if signaler_pid == command_pid {
            return true;
        }
        match getpgid(signaler_pid) {
            Ok(signaler_pgrp) => signaler_pgrp == command_pid || signaler_pgrp == self.parent_pgrp,
            Err(_) => false,
        }
    }

    /// Suspends the supervisor with the same signal the child just stopped with, then
    /// continues the child once the supervisor itself resumes.
    fn suspend_parent(&self, signal: SignalNumber) {
        let sigtstp_action = (signal == libc::SIGTSTP)
            .then(|| self.signal_handler.set_action(Signal::SIGTSTP, SignalAction::Default));

        if let Err(err) = killpg(self.parent_pgrp, signal) {
            dev_warn!(
                "cannot send {} to own process group: {err}",
                signal_fmt(signal)
            );
        }

        if let Some(action) = sigtstp_action {
            self.signal_handler.set_action(Signal::SIGTSTP, action);
        }

        if let Some(command_pid) = self.command_pid {
            if let Err(err) = kill(command_pid, libc::SIGCONT) {
                dev_warn!("cannot send SIGCONT to command ({command_pid}): {err}");
            }
        }
    }

    fn on_signal(&mut self, dispatcher: &mut EventDispatcher<Self>) {
        let info = match self.signal_handler.recv() {
            Ok(info) => info,
            Err(err) => {
                dev_error!("could not receive signal: {err}");
                return;
            }
        };

        dev_info!(
            "received{} {} from {}",
            opt_fmt(info.is_user_signaled(), " user signaled"),
            info.signal(),
            info.pid()
        );

        // Rule 1: no child left to act on.
        let Some(command_pid) = self.command_pid else {
            dev_info!("command was already reaped, ignoring signal");
            return;
        };

        // Rule 2: SIGCHLD is handled by the reaper, never forwarded.
        if info.signal() == Signal::SIGCHLD {
            handle_sigchld(self, dispatcher, "command", command_pid);
            return;
        }

        let signal = info.signal();

        // Rule 3: self-suspend-class signals forward only when user-generated.
        #[cfg(target_os = "freebsd")]
        let self_suspend_class = matches!(
            signal,
            Signal::SIGINT | Signal::SIGQUIT | Signal::SIGTSTP | Signal::SIGINFO
        );
        #[cfg(not(target_os = "freebsd"))]
        let self_suspend_class = matches!(signal, Signal::SIGINT | Signal::SIGQUIT | Signal::SIGTSTP);
        if self_suspend_class {
            if !info.is_user_signaled() {
                return;
            }
            if self.is_self_terminating(info.pid()) {
                return;
            }
            if let Err(err) = kill(command_pid, signal.number()) {
                dev_warn!(
                    "cannot forward {} to command ({command_pid}): {err}",
                    signal_fmt(signal.number())
                );
            }
            return;
        }

        // Rule 4: SIGALRM means the configured timeout elapsed; terminate, don't forward.
        if signal == Signal::SIGALRM {
            terminate_process(command_pid, false);
            return;
        }

        // Rule 5: default case. Self-harm avoidance only applies to user-generated
        // signals with a nonzero sender pid (e.g. `kill(-1, SIGTERM)` from `reboot`);
        // kernel-generated signals and anything else are forwarded.
        if info.is_user_signaled() && info.pid().inner() != 0 && self.is_self_terminating(info.pid()) {
            return;
        }
        if let Err(err) = kill(command_pid, signal.number()) {
            dev_warn!(
                "cannot forward {} to command ({command_pid}): {err}",
                signal_fmt(signal.number())
            );
        }
    }

    fn on_errpipe(&mut self, dispatcher: &mut EventDispatcher<Self>) {
        let mut buf = [0u8; 4];
        match self.errpipe_rx.read(&mut buf) {
            Err(err) if was_interrupted(&err) || was_wouldblock(&err) => { /* retry later */ }
            Err(err) => {
                if self.cstat.is_invalid() {
                    self.cstat.set_errno(err.raw_os_error().unwrap_or(libc::EIO));
                }
                dispatcher.set_break(err);
            }
            Ok(0) => {
                // EOF: exec succeeded. The child is alive and will be reaped via SIGCHLD.
                dev_info!("EOF on error pipe");
                dispatcher.ignore_event(self.errpipe_event);
            }
            Ok(_n) => {
                // A short, nonzero read is treated as a complete `int`: the unread
                // trailing bytes of `buf` stay zero, which only matters if a write
                // ever gets interrupted after a partial `errno`.
                let errno = i32::from_ne_bytes(buf);
                dev_info!("errno from child: {errno}");
                self.cstat.set_errno(errno);
                dispatcher.ignore_event(self.errpipe_event);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecEvent {
    Signal,
    ErrPipe,
    Intercept,
}

impl<'a> Process for ExecClosure<'a> {
    type Event = ExecEvent;
    type Break = io::Error;
    type Exit = ExitReason;

    fn on_event(&mut self, event: Self::Event, dispatcher: &mut EventDispatcher<Self>) {
        match event {
            ExecEvent::Signal => self.on_signal(dispatcher),
            ExecEvent::ErrPipe => self.on_errpipe(dispatcher),
            ExecEvent::Intercept => {
                if let Some(channel) = &mut self.intercept {
                    if let Err(err) = channel.on_readable() {
                        dev_warn!("intercept channel error: {err}");
                    }
                }
            }
        }
    }
}

impl<'a> HandleSigchld for ExecClosure<'a> {
    const OPTIONS: WaitOptions = WaitOptions::new().all().untraced().no_hang();

    fn on_exit_or_term(&mut self, status: WaitStatus, dispatcher: &mut EventDispatcher<Self>) {
        self.command_pid = None;
        self.cstat.set_wstatus_if_invalid(status);
        let reason = match status.term_signal() {
            Some(signal) => ExitReason::Signal(signal),
            None => ExitReason::Code(status.exit_status().unwrap_or(0)),
        };
        dispatcher.set_exit(reason);
    }

    fn on_stop(&mut self, signal: SignalNumber, _dispatcher: &mut EventDispatcher<Self>) {
        self.suspend_parent(signal);
    }

    fn is_group_stop(&mut self, pid: ProcessId, status: WaitStatus) -> bool {
        if !self.use_ptrace {
            return true;
        }
        match &self.tracer {
            Some(tracer) => tracer.stopped(pid, status, self.intercept.as_deref_mut()),
            None => true,
        }
    }
}
