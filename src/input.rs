use crate::config::Config;
use crate::error::ShellError;
use log::{debug, warn};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

/// Source of input lines plus the history of accepted ones.
pub trait LineSource {
    /// Returns `None` at end of input.
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError>;

    /// Records an accepted line.
    fn add_history(&mut self, line: &str);

    /// Every recorded line, oldest first.
    fn history(&self) -> Vec<String>;

    /// Persists history, if the source keeps it anywhere.
    fn save(&mut self) {}
}

/// Interactive line editing backed by rustyline.
pub struct EditorSource {
    editor: DefaultEditor,
    history_file: Option<PathBuf>,
}

impl EditorSource {
    pub fn new(config: &Config) -> Result<Self, ShellError> {
        let rl_config = rustyline::Config::builder()
            .max_history_size(config.shell.history_size)?
            .auto_add_history(false)
            .build();
        let mut editor = DefaultEditor::with_config(rl_config)?;
        let history_file = config.history_path();
        if let Some(path) = &history_file {
            match editor.load_history(path) {
                Ok(()) => debug!("loaded history from {}", path.display()),
                Err(e) => debug!("no history loaded from {}: {}", path.display(), e),
            }
        }
        Ok(EditorSource {
            editor,
            history_file,
        })
    }
}

impl LineSource for EditorSource {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        loop {
            match self.editor.readline(prompt) {
                Ok(line) => return Ok(Some(line)),
                // Ctrl-C at the prompt drops the line being edited.
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => return Ok(None),
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn add_history(&mut self, line: &str) {
        if let Err(e) = self.editor.add_history_entry(line) {
            warn!("cannot record history: {}", e);
        }
    }

    fn history(&self) -> Vec<String> {
        self.editor.history().iter().cloned().collect()
    }

    fn save(&mut self) {
        let Some(path) = &self.history_file else {
            return;
        };
        if let Some(parent) = path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        if let Err(e) = self.editor.save_history(path) {
            warn!("cannot save history to {}: {}", path.display(), e);
        }
    }
}

/// Plain buffered reader, used without a terminal or with `-p`.
/// History lives in memory only.
pub struct PlainSource<R> {
    reader: R,
    lines: Vec<String>,
}

impl PlainSource<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        PlainSource::new(io::stdin().lock())
    }
}

impl<R: BufRead> PlainSource<R> {
    pub fn new(reader: R) -> Self {
        PlainSource {
            reader,
            lines: Vec::new(),
        }
    }
}

impl<R: BufRead> LineSource for PlainSource<R> {
    fn read_line(&mut self, prompt: &str) -> Result<Option<String>, ShellError> {
        if !prompt.is_empty() {
            let mut out = io::stdout().lock();
            out.write_all(prompt.as_bytes())?;
            out.flush()?;
        }
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let len = line.trim_end_matches(&['\n', '\r'][..]).len();
        line.truncate(len);
        Ok(Some(line))
    }

    fn add_history(&mut self, line: &str) {
        self.lines.push(line.to_string());
    }

    fn history(&self) -> Vec<String> {
        self.lines.clone()
    }
}
