//! Minimal driver for [`nopty_supervisor::supervise`].
//!
//! This is a thin demonstration harness, not the privilege-escalation CLI the
//! supervisor is embedded in: argv parsing, policy plugin wiring, and MAC
//! labeling are all external-contract concerns per `spec.md` §1, so this
//! binary supplies the simplest possible stand-ins (a policy session that
//! always succeeds, a tty labeler that does nothing, and an `exec_cmnd` that
//! just calls `execvp` after restoring the caller's signal mask).

use std::ffi::CString;
use std::io;
use std::os::fd::RawFd;
use std::path::PathBuf;
use std::process::exit;

use nopty_supervisor::{
    supervise, CommandDetails, CommandFlags, CommandStatus, ExecCmnd, ExitReason, NoIntercept,
    NoTracer, PolicySession, TtyId, TtyLabeler,
};

struct NoopPolicySession;

impl PolicySession for NoopPolicySession {
    fn init(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct NoopTtyLabeler;

impl TtyLabeler for NoopTtyLabeler {
    fn relabel(&mut self, _tty: TtyId) -> io::Result<()> {
        Ok(())
    }

    fn restore(&mut self, _tty: TtyId) {}
}

struct Execve {
    path: CString,
    argv: Vec<CString>,
    env: Vec<CString>,
}

impl ExecCmnd for Execve {
    fn exec(self: Box<Self>, old_mask: &libc::sigset_t, _intercept_fd: Option<RawFd>, _errpipe_fd: RawFd) -> io::Error {
        // SAFETY: restoring a previously-saved mask is always valid.
        unsafe {
            libc::sigprocmask(libc::SIG_SETMASK, old_mask, std::ptr::null_mut());
        }

        let mut argv: Vec<*const libc::c_char> = self.argv.iter().map(|s| s.as_ptr()).collect();
        argv.push(std::ptr::null());
        let mut envp: Vec<*const libc::c_char> = self.env.iter().map(|s| s.as_ptr()).collect();
        envp.push(std::ptr::null());

        // SAFETY: `argv`/`envp` are valid NUL-terminated arrays of valid C strings,
        // kept alive by `self` until this point; `execve` replaces the process image
        // and only returns on failure.
        unsafe {
            libc::execve(self.path.as_ptr(), argv.as_ptr(), envp.as_ptr());
        }
        io::Error::last_os_error()
    }
}

fn main() {
    let mut args = std::env::args();
    let program = args.next().unwrap_or_default();
    let argv: Vec<String> = args.collect();

    let Some(command) = argv.first() else {
        eprintln!("usage: {program} <command> [args...]");
        exit(2);
    };

    let path = PathBuf::from(command);
    let Some(c_path) = cstring(command) else {
        eprintln!("{program}: command path contains a NUL byte");
        exit(1);
    };
    let Some(c_argv) = argv.iter().map(String::as_str).map(cstring).collect::<Option<Vec<_>>>() else {
        eprintln!("{program}: an argument contains a NUL byte");
        exit(1);
    };
    let env: Vec<CString> = std::env::vars()
        .filter_map(|(k, v)| cstring(&format!("{k}={v}")))
        .collect();

    let details = CommandDetails {
        path,
        argv: c_argv.clone(),
        env: env.clone(),
        timeout: None,
        execfd: None,
        tty: None,
        flags: CommandFlags::default(),
        policy_session: Box::new(NoopPolicySession),
        tty_labeler: Box::new(NoopTtyLabeler),
        exec_cmnd: Box::new(Execve {
            path: c_path,
            argv: c_argv,
            env,
        }),
        intercept_provider: Some(Box::new(NoIntercept)),
        tracer: Some(Box::new(NoTracer)),
    };

    let mut cstat = CommandStatus::Invalid;
    match supervise(details, &mut cstat) {
        Ok((exit_reason, teardown)) => {
            teardown();
            match exit_reason {
                ExitReason::Code(code) => exit(code),
                ExitReason::Signal(signal) => exit(128 + signal),
            }
        }
        Err(err) => {
            eprintln!("{program}: {err}");
            exit(1);
        }
    }
}

fn cstring(s: &str) -> Option<CString> {
    CString::new(s).ok()
}
