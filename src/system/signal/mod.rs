//! Signal handling built around a self-pipe.
//!
//! OS signal handlers are only allowed to touch async-signal-safe code, so the
//! handler installed for every signal in [`Signal::ALL`] does the absolute
//! minimum: it copies the triggering `siginfo_t` into a socket pair (see
//! [`stream`]) and returns. The supervisor's event loop then treats the read
//! end of that socket pair as just another pollable fd — [`SignalHandler`]
//! implements [`std::os::fd::AsRawFd`] for exactly this purpose — and decodes
//! each [`SignalInfo`] outside of signal-handler context.

mod handler;
mod info;
mod set;
mod stream;

pub(crate) use handler::{SignalAction, SignalHandler};
pub(crate) use info::SignalInfo;
pub(crate) use set::{block_all, restore_mask};

use std::ffi::c_int;

pub(crate) type SignalNumber = c_int;

/// The closed set of signals the non-tty supervisor cares about (`spec.md` §4.3),
/// plus `SIGINFO` on the BSDs that define it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::upper_case_acronyms)]
pub(crate) enum Signal {
    SIGINT,
    SIGQUIT,
    SIGTSTP,
    SIGTERM,
    SIGHUP,
    SIGALRM,
    SIGPIPE,
    SIGUSR1,
    SIGUSR2,
    SIGCHLD,
    SIGCONT,
    #[cfg(target_os = "freebsd")]
    SIGINFO,
}

impl Signal {
    pub(crate) const ALL: &'static [Self] = &[
        Self::SIGINT,
        Self::SIGQUIT,
        Self::SIGTSTP,
        Self::SIGTERM,
        Self::SIGHUP,
        Self::SIGALRM,
        Self::SIGPIPE,
        Self::SIGUSR1,
        Self::SIGUSR2,
        Self::SIGCHLD,
        Self::SIGCONT,
        #[cfg(target_os = "freebsd")]
        Self::SIGINFO,
    ];

    pub(crate) const fn number(self) -> SignalNumber {
        match self {
            Self::SIGINT => libc::SIGINT,
            Self::SIGQUIT => libc::SIGQUIT,
            Self::SIGTSTP => libc::SIGTSTP,
            Self::SIGTERM => libc::SIGTERM,
            Self::SIGHUP => libc::SIGHUP,
            Self::SIGALRM => libc::SIGALRM,
            Self::SIGPIPE => libc::SIGPIPE,
            Self::SIGUSR1 => libc::SIGUSR1,
            Self::SIGUSR2 => libc::SIGUSR2,
            Self::SIGCHLD => libc::SIGCHLD,
            Self::SIGCONT => libc::SIGCONT,
            #[cfg(target_os = "freebsd")]
            Self::SIGINFO => libc::SIGINFO,
        }
    }

    /// Look up the registered [`Signal`] matching a raw signal number, if any.
    ///
    /// Only ever called on numbers that arrived through [`SignalHandler::recv`], so a
    /// `None` here would mean the self-pipe fired for a signal we never registered,
    /// which should not happen.
    pub(crate) fn try_from_number(n: SignalNumber) -> Option<Self> {
        Self::ALL.iter().copied().find(|signal| signal.number() == n)
    }

    fn name(self) -> &'static str {
        signal_hook::low_level::signal_name(self.number()).unwrap_or("unknown signal")
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_signal_round_trips_through_its_number() {
        for &signal in Signal::ALL {
            assert_eq!(Signal::try_from_number(signal.number()), Some(signal));
        }
    }

    #[test]
    fn unregistered_number_has_no_signal() {
        assert_eq!(Signal::try_from_number(libc::SIGSEGV), None);
    }
}
