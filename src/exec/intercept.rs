use std::io;
use std::os::fd::{AsRawFd, OwnedFd};

use crate::exec::interface::CommandDetails;
use crate::system::interface::ProcessId;
use crate::system::wait::WaitStatus;

/// Outcome of attempting to seize a child via the platform's process-tracing primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeizeOutcome {
    Seized,
    AlreadyTraced,
    Fatal,
}

/// Sets up the intercept subsystem on the parent end of the socket pair created in
/// `supervise()`'s pre-fork setup.
///
/// `parent_fd` is `None` when `USE_PTRACE` is set — no socket pair is created in that
/// case (§4.1 step 3), and interception happens purely through the tracer instead.
/// `setup` registers its own read events against the event dispatcher and hands back a
/// channel the supervisor polls alongside the error pipe and signal events; the return
/// value is `None` on unrecoverable setup failure (the caller force-terminates the child).
/// Borrows rather than consumes so the same provider is still around for [`Self::cleanup`]
/// at teardown.
pub trait InterceptProvider {
    fn setup(
        &self,
        parent_fd: Option<OwnedFd>,
        details: &CommandDetails,
    ) -> Option<Box<dyn InterceptChannel>>;

    /// Releases global intercept state. Called once during teardown regardless of how
    /// the event loop exited.
    fn cleanup(&self) {}
}

/// A live intercept channel, polled as a readable-fd event by the supervisor.
///
/// `AsRawFd` is a supertrait rather than a hand-rolled method so `dyn InterceptChannel`
/// can be handed straight to [`super::event::EventDispatcher::register_read_event`],
/// which is generic over `F: AsRawFd`.
pub trait InterceptChannel: AsRawFd {
    fn on_readable(&mut self) -> io::Result<()>;
}

/// Process-tracing sub-protocol, used when `USE_PTRACE` is set.
pub trait Tracer {
    fn seize(&self, pid: ProcessId) -> SeizeOutcome;

    /// Returns true iff the stop observed for `pid` is a real group-stop the
    /// supervisor should suspend for, rather than an ignorable ptrace-stop.
    fn stopped(
        &self,
        pid: ProcessId,
        status: WaitStatus,
        channel: Option<&mut dyn InterceptChannel>,
    ) -> bool;
}

/// No-op intercept provider used when none of `intercept`/`log_subcmds`/`use_ptrace` are
/// set — the common case. `setup` is never actually called in that path, but the type is
/// kept so `CommandDetails::intercept_provider` always has a concrete default available
/// to callers that don't need the real subsystem.
pub struct NoIntercept;

impl InterceptProvider for NoIntercept {
    fn setup(
        &self,
        _parent_fd: Option<OwnedFd>,
        _details: &CommandDetails,
    ) -> Option<Box<dyn InterceptChannel>> {
        None
    }
}

/// No-op tracer; `seize` reports `AlreadyTraced` so callers fall back to running the
/// child untraced rather than failing outright.
pub struct NoTracer;

impl Tracer for NoTracer {
    fn seize(&self, _pid: ProcessId) -> SeizeOutcome {
        SeizeOutcome::AlreadyTraced
    }

    fn stopped(
        &self,
        _pid: ProcessId,
        _status: WaitStatus,
        _channel: Option<&mut dyn InterceptChannel>,
    ) -> bool {
        false
    }
}
