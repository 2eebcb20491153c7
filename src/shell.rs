use crate::builtins::{handle_builtin, Outcome};
use crate::config::Config;
use crate::exec::{run_pipeline, EXIT_FAILURE, EXIT_SUCCESS};
use crate::input::LineSource;
use crate::parser::{parse_pipeline, split_conditional, Limits};
use crate::prompt::render_prompt;
use crate::signals::SignalCoordinator;
use log::debug;

pub const FAREWELL: &str = "Leaving minish.";

/// What the main loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading; carries the line's final status.
    Continue(i32),
    Exit,
}

pub struct Shell {
    source: Box<dyn LineSource>,
    signals: SignalCoordinator,
    limits: Limits,
    emit_prompt: bool,
    color_prompt: bool,
}

impl Shell {
    pub fn new(
        source: Box<dyn LineSource>,
        signals: SignalCoordinator,
        config: &Config,
        emit_prompt: bool,
    ) -> Self {
        Shell {
            source,
            signals,
            limits: config.limits(),
            emit_prompt,
            color_prompt: config.shell.color_prompt,
        }
    }

    /// Runs the main shell loop: prints the prompt (if enabled), reads input,
    /// and evaluates each line until EOF or `exit`. Returns the shell's exit
    /// status.
    pub fn run(&mut self) -> i32 {
        let status = loop {
            let prompt = if self.emit_prompt {
                render_prompt(self.color_prompt)
            } else {
                String::new()
            };
            let line = match self.source.read_line(&prompt) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    println!("{}", FAREWELL);
                    break EXIT_SUCCESS;
                }
                Err(e) => {
                    eprintln!("minish: error reading input: {}", e);
                    break EXIT_FAILURE;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            self.source.add_history(&line);
            if self.eval_line(&line) == Flow::Exit {
                println!("{}", FAREWELL);
                break EXIT_SUCCESS;
            }
        };
        self.source.save();
        status
    }

    /// Evaluates one input line: `&&` segments left to right, stopping at
    /// the first one that does not succeed.
    pub fn eval_line(&mut self, line: &str) -> Flow {
        let segments = match split_conditional(line, &self.limits) {
            Ok(segments) => segments,
            Err(e) => {
                eprintln!("minish: syntax error: {}", e);
                return Flow::Continue(EXIT_FAILURE);
            }
        };

        let mut status = EXIT_SUCCESS;
        for (i, segment) in segments.iter().enumerate() {
            if status != EXIT_SUCCESS {
                debug!("skipping {} segment(s) after status {}", segments.len() - i, status);
                break;
            }
            match self.eval_segment(segment) {
                Flow::Continue(s) => status = s,
                Flow::Exit => return Flow::Exit,
            }
        }
        Flow::Continue(status)
    }

    fn eval_segment(&mut self, segment: &str) -> Flow {
        let pipeline = match parse_pipeline(segment, &self.limits) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                eprintln!("minish: syntax error in '{}': {}", segment, e);
                return Flow::Continue(EXIT_FAILURE);
            }
        };
        debug!("segment {:?} -> {} stage(s)", segment, pipeline.len());

        if let Some(cmd) = pipeline.single_plain_command() {
            match handle_builtin(cmd, &self.source.history()) {
                Outcome::Handled(status) => return Flow::Continue(status),
                Outcome::Exit => return Flow::Exit,
                Outcome::NotBuiltin => {}
            }
        }

        match run_pipeline(&pipeline, &self.signals) {
            Ok(status) => Flow::Continue(status),
            Err(e) => {
                eprintln!("minish: {}", e);
                Flow::Continue(EXIT_FAILURE)
            }
        }
    }
}
