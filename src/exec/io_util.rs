use std::io;

/// Returns whether `err` was caused by a signal interrupting a blocking syscall.
pub(super) fn was_interrupted(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::Interrupted
}

/// Returns whether `err` was caused by a nonblocking fd having no data ready.
pub(super) fn was_wouldblock(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}
