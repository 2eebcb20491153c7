mod builtins;
mod config;
mod error;
mod exec;
mod input;
mod lexer;
mod logging;
mod parser;
mod pipeline;
mod prompt;
mod shell;
mod signals;
mod utils;

use config::Config;
use error::ShellError;
use input::{EditorSource, LineSource, PlainSource};
use log::debug;
use signals::SignalCoordinator;
use std::env;
use std::path::PathBuf;
use std::process;

struct Options {
    emit_prompt: bool,
    verbose: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> Options {
    let mut opts = Options {
        emit_prompt: true,
        verbose: false,
        config: None,
    };
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" => utils::print_usage(),
            "-v" => opts.verbose = true,
            "-p" => opts.emit_prompt = false,
            "-c" => match args.next() {
                Some(path) => opts.config = Some(PathBuf::from(path)),
                None => utils::print_usage(),
            },
            _ => utils::print_usage(),
        }
    }
    opts
}

fn run(opts: Options) -> Result<i32, ShellError> {
    let config = Config::load(opts.config.as_deref())?;
    logging::init(opts.verbose, &config.log)?;
    debug!("config: {:?}", config);

    // Install signal handlers.
    let signals = SignalCoordinator::new();
    signals.install()?;

    let interactive = opts.emit_prompt && nix::unistd::isatty(libc::STDIN_FILENO).unwrap_or(false);
    let source: Box<dyn LineSource> = if interactive {
        Box::new(EditorSource::new(&config)?)
    } else {
        Box::new(PlainSource::stdin())
    };

    // Run the main shell loop with the options.
    let mut shell = shell::Shell::new(source, signals, &config, opts.emit_prompt);
    Ok(shell.run())
}

fn main() {
    let opts = parse_args();
    match run(opts) {
        Ok(status) => process::exit(status),
        Err(e) => {
            eprintln!("minish: {}", e);
            process::exit(1);
        }
    }
}
