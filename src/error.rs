use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Malformed command text. Aborts only the `&&` segment it was found in.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("unterminated quote")]
    UnterminatedQuote,
    #[error("expected a file name after `{0}`")]
    MissingRedirectTarget(&'static str),
    #[error("multiple input redirections")]
    MultipleInputRedirections,
    #[error("multiple output redirections")]
    MultipleOutputRedirections,
    #[error("`&` must be last")]
    BackgroundNotLast,
    #[error("too many arguments (max {0})")]
    TooManyArguments(usize),
    #[error("too many commands (max {0})")]
    TooManyCommands(usize),
    #[error("empty command")]
    EmptyCommand,
    #[error("invalid command in `&&` segment")]
    EmptySegment,
}

/// Failure to set up a pipeline. Nothing of the pipeline keeps running.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("cannot create pipe for stage {stage}: {source}")]
    Pipe { stage: usize, source: nix::Error },
    #[error("cannot fork stage {stage}: {source}")]
    Fork { stage: usize, source: nix::Error },
    #[error("stage {stage}: argument contains a NUL byte")]
    InvalidArgument { stage: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("unknown log level `{0}`")]
    LogLevel(String),
}

/// Errors that stop the shell from starting or keep it from running.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("unable to install signal handlers: {0}")]
    SignalSetup(#[source] io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("line editor: {0}")]
    Readline(#[from] rustyline::error::ReadlineError),
    #[error("logger: {0}")]
    Logger(#[from] log::SetLoggerError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
