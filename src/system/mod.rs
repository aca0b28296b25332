use std::{
    fs, io,
    mem::MaybeUninit,
    os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd},
};

use libc::c_int;

use crate::cutils::cerr;
use interface::ProcessId;
use signal::SignalNumber;

pub mod interface;
pub mod poll;
pub mod signal;
pub mod wait;

#[cfg(not(any(target_os = "freebsd", target_os = "linux")))]
compile_error!("nopty-supervisor only works on Linux and FreeBSD");

/// Outcome of [`fork`].
pub(crate) enum ForkResult {
    /// Parent branch, with the child's pid.
    Parent(ProcessId),
    /// Child branch.
    Child,
}

/// Create a new process.
///
/// # Safety
///
/// Must not be called in multithreaded programs: everything between `fork` and
/// the child's `exec`/`_exit` must be async-signal-safe.
pub(crate) unsafe fn fork() -> io::Result<ForkResult> {
    // SAFETY: calling async-signal-unsafe functions after fork is safe as the
    // caller guarantees the program is single threaded at this point.
    let pid = cerr(unsafe { libc::fork() })?;
    if pid == 0 {
        Ok(ForkResult::Child)
    } else {
        Ok(ForkResult::Parent(ProcessId::new(pid)))
    }
}

/// Send a signal to a process.
pub fn kill(pid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: cannot cause UB even if `pid`/`signal` are not valid.
    cerr(unsafe { libc::kill(pid.inner(), signal) }).map(|_| ())
}

/// Send a signal to a process group.
pub fn killpg(pgid: ProcessId, signal: SignalNumber) -> io::Result<()> {
    // SAFETY: cannot cause UB even if `pgid`/`signal` are not valid.
    cerr(unsafe { libc::killpg(pgid.inner(), signal) }).map(|_| ())
}

/// Get the process group id of the current process.
pub fn getpgrp() -> ProcessId {
    // SAFETY: always safe to call.
    ProcessId::new(unsafe { libc::getpgrp() })
}

/// Get the process group id of `pid`.
pub fn getpgid(pid: ProcessId) -> io::Result<ProcessId> {
    // SAFETY: cannot cause UB even if `pid` is not a valid process id.
    Ok(ProcessId::new(cerr(unsafe { libc::getpgid(pid.inner()) })?))
}

/// Arm (or disarm, with `0`) a real-time wall-clock alarm delivered as `SIGALRM`.
pub fn alarm(seconds: u32) -> u32 {
    // SAFETY: always safe to call.
    unsafe { libc::alarm(seconds) }
}

/// Create a UNIX stream socket pair with neither end marked close-on-exec, so it
/// survives into a child's `exec` image (used for the intercept channel).
pub(crate) fn socketpair_inheritable() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = MaybeUninit::<[RawFd; 2]>::uninit();
    // SAFETY: `fds` is a valid two-element out-parameter for `socketpair`.
    unsafe {
        cerr(libc::socketpair(
            libc::AF_UNIX,
            libc::SOCK_STREAM,
            0,
            fds.as_mut_ptr().cast(),
        ))?;
        let [a, b] = fds.assume_init();
        // SAFETY: both fds were just created by `socketpair` and are owned here.
        Ok((OwnedFd::from_raw_fd(a), OwnedFd::from_raw_fd(b)))
    }
}

/// Closes every file descriptor above stderr except an explicitly excluded set.
///
/// Used in the child right before `exec` so the command doesn't inherit
/// anything beyond the descriptors the supervisor deliberately handed it (the
/// error pipe write end, and the intercept socket when enabled).
pub(crate) struct FileCloser {
    keep: Vec<RawFd>,
}

impl FileCloser {
    pub(crate) fn new() -> Self {
        Self { keep: Vec::new() }
    }

    /// Exempt `fd` from [`FileCloser::close_the_universe`].
    pub(crate) fn except<F: AsRawFd>(&mut self, fd: &F) {
        self.keep.push(fd.as_raw_fd());
    }

    /// Close every fd above stderr that wasn't exempted via [`FileCloser::except`].
    pub(crate) fn close_the_universe(self) -> io::Result<()> {
        let lowfd = libc::STDERR_FILENO + 1;

        for entry in fs::read_dir("/proc/self/fd")? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Ok(fd) = file_name.parse::<c_int>() else {
                continue;
            };
            if fd < lowfd || self.keep.contains(&fd) {
                continue;
            }
            // SAFETY: closing an fd we don't otherwise reference is safe; a
            // failure here (already closed, or EBADF) is not actionable.
            unsafe {
                libc::close(fd);
            }
        }

        Ok(())
    }
}
