use std::{
    ffi::c_void,
    io,
    mem::MaybeUninit,
    os::{
        fd::{AsFd, AsRawFd, BorrowedFd},
        unix::net::UnixStream,
    },
    sync::OnceLock,
};

use crate::{cutils::cerr, log::dev_error};

use super::{info::SignalInfo, SignalNumber};

static STREAM: OnceLock<SignalStream> = OnceLock::new();

/// # Safety
///
/// The `info` parameters has to point to a valid instance of SignalInfo
pub(super) unsafe fn send_siginfo(
    _signal: SignalNumber,
    info: *const SignalInfo,
    _context: *const c_void,
) {
    if let Some(tx) = STREAM.get().map(|stream| stream.tx.as_raw_fd()) {
        // SAFETY: called ensures that info is a valid pointer; any instance of SignalInfo will
        // consists of SignalInfo::SIZE bytes
        unsafe { libc::send(tx, info.cast(), SignalInfo::SIZE, libc::MSG_DONTWAIT) };
    }
}

/// A type able to receive signal information from any [`super::SignalHandler`] set up
/// with the [`super::SignalAction::Stream`] behavior.
///
/// This is a process-wide singleton: the underlying socket pair is created once and
/// reused across invocations of [`super::super::super::exec::no_pty::supervise`], since
/// it carries no per-invocation state (see `spec.md` §8's round-trip property).
pub(crate) struct SignalStream {
    rx: UnixStream,
    tx: UnixStream,
}

impl SignalStream {
    /// Get the process-wide stream, creating it on first use.
    pub(crate) fn get_or_init() -> io::Result<&'static Self> {
        if let Some(stream) = STREAM.get() {
            return Ok(stream);
        }

        let (rx, tx) = UnixStream::pair().map_err(|err| {
            dev_error!("cannot create socket pair for `SignalStream`: {err}");
            err
        })?;

        // Another thread may have won the race to initialize; either way `STREAM.get()`
        // now holds a value (single-threaded in practice — see `spec.md` §5).
        let _ = STREAM.set(Self { rx, tx });
        Ok(STREAM.get().expect("just initialized"))
    }

    /// Receives the information related to the arrival of a signal.
    pub(crate) fn recv(&self) -> io::Result<SignalInfo> {
        let mut info = MaybeUninit::<SignalInfo>::uninit();
        let fd = self.rx.as_raw_fd();
        // SAFETY: type invariant for `SignalStream` ensures that `fd` is a valid file descriptor;
        // furthermore, `info` is a valid pointer to `siginfo_t` (by virtue of `SignalInfo` being a
        // transparent newtype for it), which has room for `SignalInfo::SIZE` bytes.
        let bytes = cerr(unsafe { libc::recv(fd, info.as_mut_ptr().cast(), SignalInfo::SIZE, 0) })?;

        if bytes as usize != SignalInfo::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Not enough bytes when receiving `siginfo_t`",
            ));
        }
        // SAFETY: we can assume `info` is initialized because `recv` wrote enough bytes to fill
        // the value and `siginfo_t` is POD.
        Ok(unsafe { info.assume_init() })
    }
}

impl AsFd for SignalStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.rx.as_fd()
    }
}
