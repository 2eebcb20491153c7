use crate::error::ShellError;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use signal_hook::{consts::signal::*, iterator::Signals};
use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

/// What the interrupt/quit handler does right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    /// No foreground child: the shell shrugs off Ctrl-C and Ctrl-\.
    Idle,
    /// Interrupt/quit is forwarded to this process.
    ForegroundActive(Pid),
}

/// The single foreground PID slot. Written by the orchestrator, read by the
/// signal thread. `0` means no foreground process.
#[derive(Debug, Default)]
pub struct ForegroundSlot(AtomicI32);

impl ForegroundSlot {
    #[cfg(test)]
    pub const fn new() -> Self {
        ForegroundSlot(AtomicI32::new(0))
    }

    pub fn state(&self) -> SignalState {
        match self.0.load(Ordering::SeqCst) {
            0 => SignalState::Idle,
            pid => SignalState::ForegroundActive(Pid::from_raw(pid)),
        }
    }

    /// Idle -> ForegroundActive. Called right before waiting.
    pub fn enter(&self, pid: Pid) {
        self.0.store(pid.as_raw(), Ordering::SeqCst);
        debug!("foreground -> {}", pid);
    }

    /// ForegroundActive -> Idle. Called once the wait loop is done.
    pub fn leave(&self) {
        self.0.store(0, Ordering::SeqCst);
        debug!("foreground -> idle");
    }
}

/// PIDs of background stages still to be reaped.
#[derive(Debug, Default)]
pub struct BackgroundJobs {
    pids: Mutex<HashSet<Pid>>,
}

impl BackgroundJobs {
    #[cfg(test)]
    pub fn new() -> Self {
        BackgroundJobs::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<Pid>> {
        self.pids.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts tracking `pids`, then sweeps at once in case one of them
    /// already exited before it was known here.
    pub fn register(&self, pids: &[Pid]) {
        self.lock().extend(pids.iter().copied());
        self.reap();
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Collects every tracked child whose state changed, without blocking.
    /// Returns the ones that terminated.
    pub fn reap(&self) -> Vec<WaitStatus> {
        let flags = WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
        let mut pids = self.lock();
        let mut finished = Vec::new();
        pids.retain(|&pid| match waitpid(pid, Some(flags)) {
            Ok(status @ (WaitStatus::Exited(..) | WaitStatus::Signaled(..))) => {
                debug!("reaped background child {}: {:?}", pid, status);
                finished.push(status);
                false
            }
            Ok(_) => true,
            // Collected elsewhere; nothing left to wait for.
            Err(Errno::ECHILD) => false,
            Err(e) => {
                warn!("waitpid({}) failed: {}", pid, e);
                true
            }
        });
        finished
    }
}

/// Shared state between the main loop and the signal thread.
#[derive(Debug, Clone, Default)]
pub struct SignalCoordinator {
    foreground: Arc<ForegroundSlot>,
    background: Arc<BackgroundJobs>,
}

impl SignalCoordinator {
    pub fn new() -> Self {
        SignalCoordinator::default()
    }

    pub fn foreground(&self) -> &ForegroundSlot {
        &self.foreground
    }

    pub fn background(&self) -> &BackgroundJobs {
        &self.background
    }

    /// Installs signal handlers for the shell:
    /// - SIGINT/SIGQUIT: forwarded to the foreground process, otherwise ignored.
    /// - SIGTSTP: ignored, there is no job control.
    /// - SIGCHLD: reaps finished background children.
    ///
    /// Failing to install them is fatal for the shell.
    pub fn install(&self) -> Result<(), ShellError> {
        let mut signals = Signals::new([SIGINT, SIGQUIT, SIGTSTP, SIGCHLD])
            .map_err(ShellError::SignalSetup)?;
        let foreground = Arc::clone(&self.foreground);
        let background = Arc::clone(&self.background);
        thread::Builder::new()
            .name("signals".into())
            .spawn(move || {
                for sig in signals.forever() {
                    match sig {
                        SIGINT | SIGQUIT => forward(&foreground, sig),
                        SIGCHLD => {
                            background.reap();
                        }
                        _ => {}
                    }
                }
            })
            .map_err(ShellError::SignalSetup)?;
        Ok(())
    }
}

fn forward(slot: &ForegroundSlot, raw: i32) {
    let SignalState::ForegroundActive(pid) = slot.state() else {
        return;
    };
    let Ok(sig) = Signal::try_from(raw) else {
        return;
    };
    match signal::kill(pid, sig) {
        // ESRCH: the child exited between the wait and the forward.
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("cannot forward {} to {}: {}", sig, pid, e),
    }
    let notice = if sig == Signal::SIGINT {
        "Interrupted"
    } else {
        "Quit"
    };
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "\n{}", notice);
    let _ = out.flush();
}

/// Signals a forked child must get back to their default action before exec.
const CHILD_DEFAULTS: [Signal; 5] = [
    Signal::SIGINT,
    Signal::SIGQUIT,
    Signal::SIGTSTP,
    Signal::SIGCHLD,
    // The Rust runtime ignores SIGPIPE, and an ignored disposition survives exec.
    Signal::SIGPIPE,
];

/// Only async-signal-safe calls: meant for the child between fork and exec.
pub fn restore_child_defaults() {
    for sig in CHILD_DEFAULTS {
        // SAFETY: installing SIG_DFL does not run any Rust code in a handler.
        let _ = unsafe { signal::signal(sig, SigHandler::SigDfl) };
    }
}
