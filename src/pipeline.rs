use crate::error::ResourceError;
use crate::parser::{OutputMode, ParsedCommand};
use nix::fcntl::OFlag;
use nix::unistd;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// One OS pipe. Both ends close when dropped.
#[derive(Debug)]
pub struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    pub fn new() -> nix::Result<Self> {
        // CLOEXEC so copies inherited by unrelated children vanish at exec.
        let (read, write) = unistd::pipe2(OFlag::O_CLOEXEC)?;
        // SAFETY: pipe2 just returned these descriptors and nothing else owns them.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) };
        Ok(Pipe { read, write })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }
}

/// The `n - 1` pipes joining an `n`-stage pipeline. Pipe `i` connects
/// stage `i` (writer) to stage `i + 1` (reader).
#[derive(Debug, Default)]
pub struct PipeSet {
    pipes: Vec<Pipe>,
}

impl PipeSet {
    /// Creates the pipes for `stages` stages. On failure the pipes created
    /// so far are closed before returning.
    pub fn for_stages(stages: usize) -> Result<Self, ResourceError> {
        let count = stages.saturating_sub(1);
        let mut pipes = Vec::with_capacity(count);
        for stage in 0..count {
            let pipe = Pipe::new().map_err(|source| ResourceError::Pipe { stage, source })?;
            pipes.push(pipe);
        }
        Ok(PipeSet { pipes })
    }

    pub fn get(&self, index: usize) -> Option<&Pipe> {
        self.pipes.get(index)
    }

    /// Every descriptor in the set, both ends.
    pub fn raw_fds(&self) -> impl Iterator<Item = RawFd> + '_ {
        self.pipes
            .iter()
            .flat_map(|p| [p.read_fd(), p.write_fd()])
    }

    /// Closes every descriptor without giving up ownership. Only for a
    /// forked child that is about to exec or `_exit` and never drops `self`.
    pub fn close_in_child(&self) {
        for fd in self.raw_fds() {
            let _ = unistd::close(fd);
        }
    }
}

/// Where a stage reads its standard input from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdinSource<'a> {
    Inherit,
    File(&'a str),
    /// Read end of the given pipe.
    Pipe(usize),
}

/// Where a stage writes its standard output to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget<'a> {
    Inherit,
    File(&'a str, OutputMode),
    /// Write end of the given pipe.
    Pipe(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan<'a> {
    pub stdin: StdinSource<'a>,
    pub stdout: StdoutTarget<'a>,
}

/// Decides each stage's standard streams. Explicit redirections win over
/// the pipe a stage would otherwise be connected to.
pub fn plan_stages(stages: &[ParsedCommand]) -> Vec<StagePlan<'_>> {
    let last = stages.len().saturating_sub(1);
    stages
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let stdin = match &stage.input_file {
                Some(file) => StdinSource::File(file),
                None if i > 0 => StdinSource::Pipe(i - 1),
                None => StdinSource::Inherit,
            };
            let stdout = match &stage.output_file {
                Some(file) => StdoutTarget::File(file, stage.output_mode),
                None if i < last => StdoutTarget::Pipe(i),
                None => StdoutTarget::Inherit,
            };
            StagePlan { stdin, stdout }
        })
        .collect()
}
