use std::cell::Cell;
use std::io;
use std::os::fd::{AsFd, AsRawFd, RawFd};

use crate::log::dev_warn;

use super::set::RawAction;
use super::stream::SignalStream;
use super::Signal;

/// The disposition installed for one [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignalAction {
    /// Execute the signal's default action.
    Default,
    /// Ignore the signal entirely.
    Ignore,
    /// Stream the arriving [`super::SignalInfo`] through the process-wide [`SignalStream`].
    Stream,
}

struct Entry {
    signal: Signal,
    /// Disposition in effect before [`SignalHandler::new`] touched this signal, restored
    /// on [`Drop`].
    previous: RawAction,
    current: Cell<SignalAction>,
}

/// Installs a [`SignalAction::Stream`] handler for every signal in [`Signal::ALL`]
/// (`spec.md` §4.3's registered set) and exposes the process-wide self-pipe those
/// handlers feed as a pollable fd.
///
/// Dropping a [`SignalHandler`] restores every signal's original disposition — used when
/// tearing down the supervisor's event loop so a second [`supervise`](crate::exec::no_pty::supervise)
/// call in the same process starts from a clean slate.
pub(crate) struct SignalHandler {
    stream: &'static SignalStream,
    entries: Vec<Entry>,
}

impl SignalHandler {
    pub(crate) fn new() -> io::Result<Self> {
        let stream = SignalStream::get_or_init()?;

        let mut entries = Vec::with_capacity(Signal::ALL.len());
        for &signal in Signal::ALL {
            let action = RawAction::new(SignalAction::Stream)?;
            let previous = action.register(signal.number())?;
            entries.push(Entry {
                signal,
                previous,
                current: Cell::new(SignalAction::Stream),
            });
        }

        Ok(Self { stream, entries })
    }

    /// Block for the next signal delivered through the self-pipe.
    pub(crate) fn recv(&self) -> io::Result<super::SignalInfo> {
        self.stream.recv()
    }

    /// Install `action` for `signal`, returning the action that was active before.
    ///
    /// Used by the suspend coordinator (`spec.md` §4.6) to temporarily restore
    /// `SIGTSTP`'s default disposition so self-delivery actually stops the supervisor,
    /// then flip it back to [`SignalAction::Stream`] once resumed. A `signal` this
    /// handler never registered is a no-op and just echoes `action` back.
    pub(crate) fn set_action(&self, signal: Signal, action: SignalAction) -> SignalAction {
        let Some(entry) = self.entries.iter().find(|entry| entry.signal == signal) else {
            return action;
        };

        match RawAction::new(action).and_then(|raw| raw.register(signal.number())) {
            Ok(_) => entry.current.replace(action),
            Err(err) => {
                dev_warn!("cannot change disposition of {signal}: {err}");
                entry.current.get()
            }
        }
    }
}

impl AsRawFd for SignalHandler {
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_fd().as_raw_fd()
    }
}

impl Drop for SignalHandler {
    fn drop(&mut self) {
        for entry in &self.entries {
            if let Err(err) = entry.previous.register(entry.signal.number()) {
                dev_warn!("cannot restore original action for {}: {err}", entry.signal);
            }
        }
    }
}
