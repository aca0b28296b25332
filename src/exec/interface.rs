use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::time::Duration;

use crate::exec::intercept::{InterceptProvider, Tracer};
use crate::log::dev_warn;
use crate::system::wait::WaitStatus;

/// Closed set of feature flags read by [`super::no_pty::supervise`] to pick its setup path.
///
/// Kept as a plain struct of bools rather than a bitflags type: the set is small and
/// closed, and nothing downstream needs bit-level operations on it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFlags {
    pub intercept: bool,
    pub log_subcmds: bool,
    pub use_ptrace: bool,
    pub set_timeout: bool,
    pub rbac_enabled: bool,
}

/// Opaque identifier for the controlling terminal, passed through to [`TtyLabeler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtyId(pub RawFd);

/// Mandatory-access-control labeling of the controlling terminal.
///
/// Implemented by the policy plugin (e.g. an SELinux backend); this crate only calls
/// through the trait when [`CommandFlags::rbac_enabled`] is set.
pub trait TtyLabeler {
    /// Relabel `tty` for the command about to run. Called, and audited by the caller,
    /// before fork.
    fn relabel(&mut self, tty: TtyId) -> io::Result<()>;
    /// Restore the previous label after the command has exited. Failures are logged,
    /// never fatal.
    fn restore(&mut self, tty: TtyId);
}

/// One-shot policy session bracket, run before fork.
pub trait PolicySession {
    fn init(&mut self) -> io::Result<()>;
}

/// Performs the in-child argv/credential/exec setup.
///
/// `exec` only returns when `execve` itself failed — on success the process image is
/// replaced and control never comes back. The returned error is the one written to the
/// error pipe.
pub trait ExecCmnd {
    fn exec(
        self: Box<Self>,
        old_mask: &libc::sigset_t,
        intercept_fd: Option<RawFd>,
        errpipe_fd: RawFd,
    ) -> io::Error;
}

/// Externally-owned input to [`super::no_pty::supervise`].
///
/// Holds the command's own attributes plus the external-contract trait objects the
/// supervisor calls through but never implements the bodies of (policy session, tty
/// labeling, argv/exec setup, intercept/ptrace).
pub struct CommandDetails {
    pub path: PathBuf,
    pub argv: Vec<CString>,
    pub env: Vec<CString>,
    pub timeout: Option<Duration>,
    pub execfd: Option<RawFd>,
    pub tty: Option<TtyId>,
    pub flags: CommandFlags,
    pub policy_session: Box<dyn PolicySession>,
    pub tty_labeler: Box<dyn TtyLabeler>,
    pub exec_cmnd: Box<dyn ExecCmnd>,
    pub intercept_provider: Option<Box<dyn InterceptProvider>>,
    pub tracer: Option<Box<dyn Tracer>>,
}

/// Externally-owned output sink. Starts `Invalid`; once non-`Invalid`, a later
/// `WStatus` must never overwrite it (see [`CommandStatus::set_wstatus_if_invalid`]).
#[derive(Debug, Clone, Copy)]
pub enum CommandStatus {
    Invalid,
    Errno(i32),
    WStatus(WaitStatus),
}

impl Default for CommandStatus {
    fn default() -> Self {
        Self::Invalid
    }
}

impl CommandStatus {
    pub const fn is_invalid(&self) -> bool {
        matches!(self, Self::Invalid)
    }

    pub(crate) fn set_errno(&mut self, errno: i32) {
        *self = Self::Errno(errno);
    }

    /// A `WStatus` is discarded, not applied, if `cstat` was already set by an
    /// earlier exec-failure errno.
    pub(crate) fn set_wstatus_if_invalid(&mut self, status: WaitStatus) {
        if self.is_invalid() {
            *self = Self::WStatus(status);
        } else {
            dev_warn!("discarding wait status {status:?}: command status already set");
        }
    }
}
