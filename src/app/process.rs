use crate::error::{CamrelayError, Result};
use crate::lifecycle::{install_termination_flag, LoopReport, LoopRole};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// A loop running in a forked child process
#[derive(Debug)]
pub struct Child {
    role: LoopRole,
    pid: libc::pid_t,
    exit: Option<ExitStatus>,
    stop_requested: Option<Instant>,
    killed: bool,
}

/// Fork a child that runs `body` and exits with 0 when its loop ended cleanly.
///
/// The child inherits the shared mapping. It never returns into the caller's
/// stack: it leaves through `_exit`, skipping the parent's destructors.
pub fn spawn<F>(role: LoopRole, body: F) -> Result<Child>
where
    F: FnOnce() -> LoopReport,
{
    match unsafe { libc::fork() } {
        -1 => Err(CamrelayError::system(format!(
            "Failed to fork {} process: {}",
            role,
            io::Error::last_os_error()
        ))),
        0 => {
            install_termination_flag();
            let report = body();
            let code = if report.ended_by.is_clean() { 0 } else { 1 };
            unsafe { libc::_exit(code) }
        }
        pid => {
            info!("Started {} process (pid {})", role, pid);
            Ok(Child {
                role,
                pid,
                exit: None,
                stop_requested: None,
                killed: false,
            })
        }
    }
}

impl Child {
    pub fn role(&self) -> LoopRole {
        self.role
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    pub fn is_running(&self) -> bool {
        self.exit.is_none()
    }

    /// Collect the exit status without blocking
    pub fn try_reap(&mut self) -> Result<Option<ExitStatus>> {
        if let Some(status) = self.exit {
            return Ok(Some(status));
        }

        let mut raw = 0;
        let pid = unsafe { libc::waitpid(self.pid, &mut raw, libc::WNOHANG) };
        match pid {
            0 => Ok(None),
            -1 => Err(CamrelayError::system(format!(
                "waitpid failed for {} process: {}",
                self.role,
                io::Error::last_os_error()
            ))),
            _ => {
                let status = ExitStatus::from_raw(raw);
                if status.success() {
                    info!("{} process exited", self.role);
                } else {
                    warn!("{} process exited with {}", self.role, status);
                }
                self.exit = Some(status);
                Ok(Some(status))
            }
        }
    }

    /// Ask the child to stop (SIGTERM). Repeated requests are ignored.
    pub fn stop(&mut self) {
        if !self.is_running() || self.stop_requested.is_some() {
            return;
        }
        debug!("Sending SIGTERM to {} process", self.role);
        self.send(Signal::SIGTERM);
        self.stop_requested = Some(Instant::now());
    }

    /// SIGKILL a child that ignored a stop request for longer than `grace`
    pub fn escalate(&mut self, grace: Duration) {
        let overdue = self
            .stop_requested
            .map(|at| at.elapsed() >= grace)
            .unwrap_or(false);

        if self.is_running() && overdue && !self.killed {
            warn!(
                "{} process did not stop within {:?}, killing it",
                self.role, grace
            );
            self.send(Signal::SIGKILL);
            self.killed = true;
        }
    }

    fn send(&self, signal: Signal) {
        match kill(Pid::from_raw(self.pid), signal) {
            // Already gone; waitpid will report it
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => error!("Failed to send {} to {} process: {}", signal, self.role, e),
        }
    }
}

/// The children of one run
#[derive(Debug, Default)]
pub struct ChildGroup {
    children: Vec<Child>,
}

impl ChildGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&mut self, role: LoopRole, body: F) -> Result<()>
    where
        F: FnOnce() -> LoopReport,
    {
        let child = spawn(role, body)?;
        self.children.push(child);
        Ok(())
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn reap(&mut self) -> Result<()> {
        for child in &mut self.children {
            child.try_reap()?;
        }
        Ok(())
    }

    pub fn is_running(&self, role: LoopRole) -> bool {
        self.children
            .iter()
            .any(|child| child.role == role && child.is_running())
    }

    pub fn all_exited(&self) -> bool {
        self.children.iter().all(|child| !child.is_running())
    }

    pub fn stop(&mut self, role: LoopRole) {
        for child in self.children.iter_mut().filter(|child| child.role == role) {
            child.stop();
        }
    }

    pub fn stop_all(&mut self) {
        for child in &mut self.children {
            child.stop();
        }
    }

    pub fn escalate(&mut self, grace: Duration) {
        for child in &mut self.children {
            child.escalate(grace);
        }
    }

    /// 0 when every child exited successfully
    pub fn exit_code(&self) -> i32 {
        let clean = self
            .children
            .iter()
            .all(|child| child.exit.map(|status| status.success()).unwrap_or(false));
        if clean {
            0
        } else {
            1
        }
    }

    /// Blocking stop used when startup fails half way
    pub fn abort(&mut self) {
        self.stop_all();
        for child in &mut self.children {
            if child.is_running() {
                let mut raw = 0;
                unsafe { libc::waitpid(child.pid, &mut raw, 0) };
                child.exit = Some(ExitStatus::from_raw(raw));
            }
        }
    }
}
