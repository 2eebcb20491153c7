use crate::error::ResourceError;
use crate::parser::{OutputMode, Pipeline};
use crate::pipeline::{plan_stages, PipeSet, StagePlan, StdinSource, StdoutTarget};
use crate::signals::{restore_child_defaults, SignalCoordinator};
use crate::utils::retry_eintr;
use log::{debug, info, warn};
use nix::errno::Errno;
use nix::fcntl::{self, OFlag};
use nix::sys::signal::{kill, Signal};
use nix::sys::stat::Mode;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{self, fork, ForkResult, Pid};
use std::ffi::CString;
use std::ptr;
use std::os::fd::RawFd;

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
/// The program could not be found or executed.
pub const EXIT_NOT_FOUND: i32 = 127;
/// Added to the signal number when a stage is killed by a signal.
pub const SIGNAL_BASE: i32 = 128;

enum ChildStdin {
    Inherit,
    Open(CString),
    Fd(RawFd),
}

enum ChildStdout {
    Inherit,
    Open(CString, OutputMode),
    Fd(RawFd),
}

/// Everything a child needs, converted before forking so the child never
/// allocates.
struct PreparedStage {
    argv: Vec<CString>,
    /// NULL-terminated pointers into `argv`, in the layout `execvp(3)` takes.
    argv_ptrs: Vec<*const libc::c_char>,
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl PreparedStage {
    fn new(argv: Vec<CString>, plan: &StagePlan<'_>, pipes: &PipeSet) -> Option<Self> {
        let stdin = match plan.stdin {
            StdinSource::Inherit => ChildStdin::Inherit,
            StdinSource::File(path) => ChildStdin::Open(CString::new(path).ok()?),
            StdinSource::Pipe(i) => ChildStdin::Fd(pipes.get(i)?.read_fd()),
        };
        let stdout = match plan.stdout {
            StdoutTarget::Inherit => ChildStdout::Inherit,
            StdoutTarget::File(path, mode) => ChildStdout::Open(CString::new(path).ok()?, mode),
            StdoutTarget::Pipe(i) => ChildStdout::Fd(pipes.get(i)?.write_fd()),
        };
        let argv_ptrs = argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain([ptr::null()])
            .collect();
        Some(PreparedStage {
            argv,
            argv_ptrs,
            stdin,
            stdout,
        })
    }
}

/// Runs every stage of `pipeline` as its own process, connected by pipes.
///
/// Returns the exit status of the last stage only, whatever happened to
/// the earlier ones. A background pipeline is not waited for and reports
/// success as soon as it is launched.
pub fn run_pipeline(pipeline: &Pipeline, signals: &SignalCoordinator) -> Result<i32, ResourceError> {
    let stages = pipeline.stages();
    let argvs = stages
        .iter()
        .enumerate()
        .map(|(stage, cmd)| {
            cmd.argv
                .to_cstrings()
                .map_err(|_| ResourceError::InvalidArgument { stage })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let pipes = PipeSet::for_stages(stages.len())?;
    let prepared = argvs
        .into_iter()
        .zip(plan_stages(stages).iter())
        .enumerate()
        .map(|(stage, (argv, plan))| {
            PreparedStage::new(argv, plan, &pipes).ok_or(ResourceError::InvalidArgument { stage })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut pids = Vec::with_capacity(prepared.len());
    for (i, stage) in prepared.iter().enumerate() {
        // SAFETY: the child only makes async-signal-safe calls before exec.
        match unsafe { fork() } {
            Ok(ForkResult::Child) => exec_child(stage, &pipes),
            Ok(ForkResult::Parent { child }) => pids.push(child),
            Err(source) => {
                abandon(&pids);
                return Err(ResourceError::Fork { stage: i, source });
            }
        }
    }
    // The children hold their own copies; the parent must not keep any
    // write end open or readers never see EOF.
    drop(pipes);

    let Some(&last) = pids.last() else {
        return Ok(EXIT_SUCCESS);
    };
    debug!("launched {} stage(s): {:?}", pids.len(), pids);

    if pipeline.is_background() {
        signals.background().register(&pids);
        println!("[bg] {}", last);
        return Ok(EXIT_SUCCESS);
    }

    signals.foreground().enter(last);
    let status = wait_all(&pids);
    signals.foreground().leave();
    info!("pipeline finished with status {}", status);
    Ok(status)
}

/// Waits for every PID and returns the decoded status of the last one.
fn wait_all(pids: &[Pid]) -> i32 {
    let mut last_status = EXIT_FAILURE;
    for (i, &pid) in pids.iter().enumerate() {
        let status = retry_eintr(|| waitpid(pid, None));
        if i + 1 == pids.len() {
            last_status = match status {
                Ok(status) => decode_status(status),
                Err(e) => {
                    warn!("waitpid({}) failed: {}", pid, e);
                    EXIT_FAILURE
                }
            };
        }
    }
    last_status
}

/// Maps a wait status onto the shell's exit status convention.
pub fn decode_status(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(_, sig, _) => SIGNAL_BASE + sig as i32,
        _ => EXIT_FAILURE,
    }
}

/// Kills and reaps children already forked for a pipeline that failed to
/// start.
fn abandon(pids: &[Pid]) {
    for &pid in pids {
        match kill(pid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => warn!("cannot kill {}: {}", pid, e),
        }
    }
    for &pid in pids {
        let _ = retry_eintr(|| waitpid(pid, None));
    }
}

/// Writes the parts to stderr with raw `write(2)` calls.
fn child_report(parts: &[&[u8]]) {
    for part in parts {
        let _ = unistd::write(libc::STDERR_FILENO, part);
    }
}

fn child_exit(code: i32) -> ! {
    // SAFETY: `_exit` skips atexit handlers and stdio flushing that belong
    // to the parent's copy of the process.
    unsafe { libc::_exit(code) }
}

fn redirect(fd: RawFd, target: RawFd) -> nix::Result<()> {
    if fd != target {
        retry_eintr(|| unistd::dup2(fd, target))?;
        let _ = unistd::close(fd);
    }
    Ok(())
}

fn open_or_exit(path: &CString, flags: OFlag, mode: Mode) -> RawFd {
    match retry_eintr(|| fcntl::open(path.as_c_str(), flags, mode)) {
        Ok(fd) => fd,
        Err(e) => {
            child_report(&[
                b"minish: ",
                path.as_bytes(),
                b": ",
                e.desc().as_bytes(),
                b"\n",
            ]);
            child_exit(EXIT_FAILURE)
        }
    }
}

fn exec_child(stage: &PreparedStage, pipes: &PipeSet) -> ! {
    restore_child_defaults();

    let stdin = match &stage.stdin {
        ChildStdin::Inherit => None,
        ChildStdin::Open(path) => Some(open_or_exit(path, OFlag::O_RDONLY, Mode::empty())),
        ChildStdin::Fd(fd) => Some(*fd),
    };
    let stdout = match &stage.stdout {
        ChildStdout::Inherit => None,
        ChildStdout::Open(path, mode) => {
            let flags = OFlag::O_WRONLY
                | OFlag::O_CREAT
                | match mode {
                    OutputMode::Truncate => OFlag::O_TRUNC,
                    OutputMode::Append => OFlag::O_APPEND,
                };
            let perms = Mode::S_IRUSR | Mode::S_IWUSR | Mode::S_IRGRP | Mode::S_IROTH;
            Some(open_or_exit(path, flags, perms))
        }
        ChildStdout::Fd(fd) => Some(*fd),
    };

    // Pipe descriptors are closed below with the rest of the set, so only
    // opened files are closed right after dup2.
    let wired = [(stdin, libc::STDIN_FILENO), (stdout, libc::STDOUT_FILENO)];
    for (fd, target) in wired {
        let Some(fd) = fd else { continue };
        let result = if pipes.raw_fds().any(|p| p == fd) {
            retry_eintr(|| unistd::dup2(fd, target)).map(drop)
        } else {
            redirect(fd, target)
        };
        if let Err(e) = result {
            child_report(&[b"minish: dup2: ", e.desc().as_bytes(), b"\n"]);
            child_exit(EXIT_FAILURE);
        }
    }
    pipes.close_in_child();

    let Some(program) = stage.argv.first() else {
        // Redirections only, e.g. `> file`.
        child_exit(EXIT_SUCCESS)
    };
    // SAFETY: `argv_ptrs` points into `stage.argv`, which outlives the call,
    // and ends with NULL. `execvp` only returns on failure.
    unsafe { libc::execvp(program.as_ptr(), stage.argv_ptrs.as_ptr()) };
    let err = Errno::last();
    match err {
        Errno::ENOENT | Errno::ENOTDIR | Errno::EACCES => {
            let reason: &[u8] = if err == Errno::EACCES {
                b": permission denied\n"
            } else {
                b": command not found\n"
            };
            child_report(&[b"minish: ", program.as_bytes(), reason]);
            child_exit(EXIT_NOT_FOUND)
        }
        e => {
            child_report(&[
                b"minish: ",
                program.as_bytes(),
                b": ",
                e.desc().as_bytes(),
                b"\n",
            ]);
            child_exit(EXIT_FAILURE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_pipeline, Limits};
    use std::fs;

    fn run(line: &str) -> i32 {
        let pipeline = parse_pipeline(line, &Limits::default()).unwrap();
        run_pipeline(&pipeline, &SignalCoordinator::new()).unwrap()
    }

    #[test]
    fn test_exit_status_of_single_stage() {
        assert_eq!(run("true"), 0);
        assert_eq!(run("false"), 1);
        assert_eq!(run("sh -c 'exit 7'"), 7);
    }

    #[test]
    fn test_command_not_found() {
        assert_eq!(run("definitely-not-a-real-program-xyz"), EXIT_NOT_FOUND);
    }

    #[test]
    fn test_killed_by_signal() {
        assert_eq!(run("sh -c 'kill -TERM $$'"), SIGNAL_BASE + 15);
    }

    #[test]
    fn test_last_stage_status_wins() {
        assert_eq!(run("true | definitely-not-a-real-program-xyz | cat"), 0);
        assert_eq!(run("true | false"), 1);
        assert_eq!(run("false | true"), 0);
    }

    #[test]
    fn test_pipeline_and_redirections() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.txt");
        let output = dir.path().join("out.txt");
        fs::write(&input, "banana\napple\ncherry\n").unwrap();

        let line = format!(
            "sort < {} | head -n 2 > {}",
            input.display(),
            output.display()
        );
        assert_eq!(run(&line), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "apple\nbanana\n");

        let line = format!("echo more >> {}", output.display());
        assert_eq!(run(&line), 0);
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "apple\nbanana\nmore\n"
        );

        let line = format!("echo fresh > {}", output.display());
        assert_eq!(run(&line), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "fresh\n");
    }

    #[test]
    fn test_redirection_overrides_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.txt");
        let last = dir.path().join("last.txt");
        let line = format!(
            "echo hidden > {} | cat > {}",
            first.display(),
            last.display()
        );
        assert_eq!(run(&line), 0);
        assert_eq!(fs::read_to_string(&first).unwrap(), "hidden\n");
        // `cat` got EOF straight away because nobody wrote to its pipe.
        assert_eq!(fs::read_to_string(&last).unwrap(), "");
    }

    #[test]
    fn test_missing_input_file_fails_stage() {
        assert_eq!(run("cat < /nonexistent/dir/input.txt"), EXIT_FAILURE);
    }

    #[test]
    fn test_redirection_without_program_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("empty.txt");
        assert_eq!(run(&format!("> {}", output.display())), 0);
        assert!(output.exists());
    }

    #[test]
    fn test_foreground_slot_cleared_after_wait() {
        let coordinator = SignalCoordinator::new();
        let pipeline = parse_pipeline("true | true", &Limits::default()).unwrap();
        run_pipeline(&pipeline, &coordinator).unwrap();
        assert_eq!(
            coordinator.foreground().state(),
            crate::signals::SignalState::Idle
        );
    }

    #[test]
    fn test_background_pipeline_returns_immediately() {
        let coordinator = SignalCoordinator::new();
        let pipeline = parse_pipeline("sleep 0.2 &", &Limits::default()).unwrap();
        let started = std::time::Instant::now();
        assert_eq!(run_pipeline(&pipeline, &coordinator).unwrap(), 0);
        assert!(started.elapsed() < std::time::Duration::from_millis(200));
        assert_eq!(
            coordinator.foreground().state(),
            crate::signals::SignalState::Idle
        );

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while !coordinator.background().is_empty() && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(20));
            coordinator.background().reap();
        }
        assert!(coordinator.background().is_empty());
    }

    #[test]
    fn test_invalid_argument_is_rejected_before_fork() {
        let pipeline = parse_pipeline("echo a\0b", &Limits::default()).unwrap();
        let err = run_pipeline(&pipeline, &SignalCoordinator::new()).unwrap_err();
        assert!(matches!(err, ResourceError::InvalidArgument { stage: 0 }));
    }

    #[test]
    fn test_prepared_argv_is_null_terminated() {
        let pipeline = parse_pipeline("printf '%s|%s' a 'b c'", &Limits::default()).unwrap();
        let cmd = &pipeline.stages()[0];
        let plans = plan_stages(pipeline.stages());
        let pipes = PipeSet::for_stages(1).unwrap();
        let stage = PreparedStage::new(cmd.argv.to_cstrings().unwrap(), &plans[0], &pipes).unwrap();
        assert_eq!(stage.argv_ptrs.len(), stage.argv.len() + 1);
        assert!(stage.argv_ptrs.last().unwrap().is_null());
        for (ptr, arg) in stage.argv_ptrs.iter().zip(&stage.argv) {
            assert_eq!(*ptr, arg.as_ptr());
        }
    }

    #[test]
    fn test_exec_passes_every_argument() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("args.txt");
        let line = format!("printf '%s|%s' a 'b c' > {}", output.display());
        assert_eq!(run(&line), 0);
        assert_eq!(fs::read_to_string(&output).unwrap(), "a|b c");
    }

    #[test]
    fn test_decode_status() {
        let pid = Pid::from_raw(1);
        assert_eq!(decode_status(WaitStatus::Exited(pid, 3)), 3);
        assert_eq!(
            decode_status(WaitStatus::Signaled(pid, Signal::SIGINT, false)),
            130
        );
    }
}
