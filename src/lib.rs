#[macro_use]
mod log;
mod cutils;
pub mod exec;
pub(crate) mod system;

pub use exec::{
    no_pty::supervise, CommandDetails, CommandFlags, CommandStatus, ExecCmnd, ExitReason,
    InterceptChannel, InterceptProvider, NoIntercept, NoTracer, PolicySession, SeizeOutcome,
    Tracer, TtyId, TtyLabeler,
};
pub use system::interface::ProcessId;
pub use system::wait::WaitStatus;
