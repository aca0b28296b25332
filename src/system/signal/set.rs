use crate::cutils::cerr;

use super::{SignalAction, SignalNumber};

use std::{io, mem::MaybeUninit};

/// A raw `sigaction` ready to be installed for a given signal.
#[repr(transparent)]
pub(super) struct RawAction {
    raw: libc::sigaction,
}

impl RawAction {
    pub(super) fn new(action: SignalAction) -> io::Result<Self> {
        let sa_mask = SignalSet::full()?;
        let mut sa_flags = libc::SA_RESTART;

        let sa_sigaction = match action {
            SignalAction::Default => libc::SIG_DFL,
            SignalAction::Ignore => libc::SIG_IGN,
            SignalAction::Stream => {
                sa_flags |= libc::SA_SIGINFO;
                super::stream::send_siginfo as libc::sighandler_t
            }
        };

        Ok(Self {
            raw: libc::sigaction {
                sa_sigaction,
                sa_mask: sa_mask.raw,
                sa_flags,
                sa_restorer: None,
            },
        })
    }

    /// Install this action for `signal`, returning whatever was previously registered.
    pub(super) fn register(&self, signal: SignalNumber) -> io::Result<Self> {
        let mut original_action = MaybeUninit::<Self>::zeroed();

        cerr(unsafe { libc::sigaction(signal, &self.raw, original_action.as_mut_ptr().cast()) })?;

        Ok(unsafe { original_action.assume_init() })
    }
}

#[repr(transparent)]
struct SignalSet {
    raw: libc::sigset_t,
}

impl SignalSet {
    fn full() -> io::Result<Self> {
        let mut raw = MaybeUninit::<libc::sigset_t>::uninit();

        cerr(unsafe { libc::sigfillset(raw.as_mut_ptr()) })?;

        Ok(Self {
            raw: unsafe { raw.assume_init() },
        })
    }

    fn sigprocmask(&self, how: libc::c_int) -> io::Result<Self> {
        let mut original_set = MaybeUninit::<Self>::zeroed();

        cerr(unsafe { libc::sigprocmask(how, &self.raw, original_set.as_mut_ptr().cast()) })?;

        Ok(unsafe { original_set.assume_init() })
    }

    fn block(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_BLOCK)
    }

    fn set_mask(&self) -> io::Result<Self> {
        self.sigprocmask(libc::SIG_SETMASK)
    }
}

/// Block every signal, returning the previous mask (`spec.md` §4.1 step 4).
///
/// Called strictly within the fork-and-handler-setup critical section described by
/// invariant 4: the mask is fully blocked only between this call and [`restore_mask`].
pub(crate) fn block_all() -> io::Result<libc::sigset_t> {
    Ok(SignalSet::full()?.block()?.raw)
}

/// Restore a mask previously returned by [`block_all`].
pub(crate) fn restore_mask(old: &libc::sigset_t) -> io::Result<()> {
    SignalSet { raw: *old }.set_mask()?;
    Ok(())
}
