//! Shared scaffolding for the end-to-end `supervise()` scenarios in `spec.md` §8.
//!
//! These tests drive the real kernel (real `fork`/`execve`/signals), matching the
//! teacher crate's own preference for exercising `waitpid`/`kill` against real child
//! processes rather than mocking them.

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;

use nopty_supervisor::{
    CommandDetails, CommandFlags, ExecCmnd, InterceptChannel, InterceptProvider, NoIntercept,
    NoTracer, PolicySession, SeizeOutcome, Tracer, TtyId, TtyLabeler,
};

pub struct NoopPolicySession;

impl PolicySession for NoopPolicySession {
    fn init(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct NoopTtyLabeler;

impl TtyLabeler for NoopTtyLabeler {
    fn relabel(&mut self, _tty: TtyId) -> io::Result<()> {
        Ok(())
    }

    fn restore(&mut self, _tty: TtyId) {}
}

/// Calls `execve` directly, after restoring the caller's saved signal mask — the same
/// shape a real `exec_cmnd` implementer follows per `spec.md` §4.1 step 7.
pub struct Execve {
    path: CString,
    argv: Vec<CString>,
}

impl Execve {
    pub fn new(path: &str, args: &[&str]) -> Self {
        let argv = std::iter::once(path)
            .chain(args.iter().copied())
            .map(|s| CString::new(s).unwrap())
            .collect();
        Self {
            path: CString::new(path).unwrap(),
            argv,
        }
    }
}

impl ExecCmnd for Execve {
    fn exec(self: Box<Self>, old_mask: &libc::sigset_t, _intercept_fd: Option<RawFd>, _errpipe_fd: RawFd) -> io::Error {
        // SAFETY: restoring a previously-saved mask is always valid.
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, old_mask, std::ptr::null_mut());
        }

        let mut argv: Vec<*const libc::c_char> = self.argv.iter().map(|s| s.as_ptr()).collect();
        argv.push(std::ptr::null());

        // SAFETY: `argv` is a valid NUL-terminated array of valid C strings kept alive
        // by `self`; `execv` only returns on failure.
        unsafe {
            libc::execv(self.path.as_ptr(), argv.as_ptr());
        }
        io::Error::last_os_error()
    }
}

/// Builds a [`CommandDetails`] for `path args...` with no RBAC, no timeout, and the
/// no-op intercept/tracer pair — the common case exercised by most scenarios.
pub fn details_for(path: &str, args: &[&str]) -> CommandDetails {
    details_with_flags(path, args, CommandFlags::default())
}

pub fn details_with_flags(path: &str, args: &[&str], flags: CommandFlags) -> CommandDetails {
    CommandDetails {
        path: PathBuf::from(path),
        argv: std::iter::once(path)
            .chain(args.iter().copied())
            .map(|s| CString::new(s).unwrap())
            .collect(),
        env: Vec::new(),
        timeout: None,
        execfd: None,
        tty: None,
        flags,
        policy_session: Box::new(NoopPolicySession),
        tty_labeler: Box::new(NoopTtyLabeler),
        exec_cmnd: Box::new(Execve::new(path, args)),
        intercept_provider: Some(Box::new(NoIntercept)),
        tracer: Some(Box::new(NoTracer)),
    }
}

/// An intercept channel backed by a pipe that is never written to — enough to be
/// registered as a readable-fd event without ever actually firing.
pub struct DummyChannel {
    read_end: std::os::fd::OwnedFd,
    _write_end: std::os::fd::OwnedFd,
}

impl DummyChannel {
    fn new() -> Self {
        let mut fds = [0; 2];
        // SAFETY: `fds` is a valid two-element out-parameter for `pipe`.
        unsafe {
            libc::pipe(fds.as_mut_ptr());
        }
        use std::os::fd::FromRawFd;
        // SAFETY: both fds were just created by `pipe` and are owned here.
        unsafe {
            Self {
                read_end: std::os::fd::OwnedFd::from_raw_fd(fds[0]),
                _write_end: std::os::fd::OwnedFd::from_raw_fd(fds[1]),
            }
        }
    }
}

impl std::os::fd::AsRawFd for DummyChannel {
    fn as_raw_fd(&self) -> RawFd {
        use std::os::fd::AsRawFd;
        self.read_end.as_raw_fd()
    }
}

impl InterceptChannel for DummyChannel {
    fn on_readable(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// An intercept provider that always succeeds, paired with a tracer that always
/// reports "another tracer present" — used to exercise the S6 fallback path
/// (`INTERCEPT|USE_PTRACE` set, seize fails, flags get cleared, command still runs).
pub struct AlwaysIntercept;

impl InterceptProvider for AlwaysIntercept {
    fn setup(&self, _parent_fd: Option<std::os::fd::OwnedFd>, _details: &CommandDetails) -> Option<Box<dyn InterceptChannel>> {
        Some(Box::new(DummyChannel::new()))
    }
}

pub struct AlreadyTracedTracer;

impl Tracer for AlreadyTracedTracer {
    fn seize(&self, _pid: nopty_supervisor::ProcessId) -> SeizeOutcome {
        SeizeOutcome::AlreadyTraced
    }

    fn stopped(
        &self,
        _pid: nopty_supervisor::ProcessId,
        _status: nopty_supervisor::WaitStatus,
        _channel: Option<&mut dyn InterceptChannel>,
    ) -> bool {
        true
    }
}
