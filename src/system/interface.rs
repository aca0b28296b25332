use std::fmt;
use std::str::FromStr;

/// A POSIX process id, distinguished from a raw `pid_t` so fd/signal-number/pid
/// mixups show up as type errors instead of runtime surprises.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(libc::pid_t);

impl ProcessId {
    pub const fn new(raw: libc::pid_t) -> Self {
        Self(raw)
    }

    pub const fn inner(self) -> libc::pid_t {
        self.0
    }
}

impl FromStr for ProcessId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pid = s.parse::<libc::pid_t>()?;
        Ok(ProcessId(pid))
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
