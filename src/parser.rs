use crate::error::SyntaxError;
use crate::lexer::{split_segments, tokenize, Token};
use std::ffi::{CString, NulError};
use std::ops::Deref;

pub const MAX_COMMANDS: usize = 10;
pub const MAX_ARGS: usize = 40;

/// Caps applied while parsing. Exceeding one is a syntax error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum stages per pipeline, and `&&` segments per line.
    pub max_commands: usize,
    /// Maximum argv entries per command, program name included.
    pub max_args: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_commands: MAX_COMMANDS,
            max_args: MAX_ARGS,
        }
    }
}

/// Owned argument vector; `argv[0]` is the program name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argv(Vec<String>);

impl Argv {
    pub fn push(&mut self, arg: String) {
        self.0.push(arg);
    }

    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Arguments after the program name.
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }

    /// Converts to the NUL-terminated form `execvp` wants.
    pub fn to_cstrings(&self) -> Result<Vec<CString>, NulError> {
        self.0.iter().map(|a| CString::new(a.as_bytes())).collect()
    }
}

impl Deref for Argv {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.0
    }
}

impl<S: Into<String>> FromIterator<S> for Argv {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Argv(iter.into_iter().map(Into::into).collect())
    }
}

/// How an output redirection opens its target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Truncate,
    Append,
}

/// One pipeline stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub argv: Argv,
    /// Input redirection file, if any.
    pub input_file: Option<String>,
    /// Output redirection file, if any.
    pub output_file: Option<String>,
    pub output_mode: OutputMode,
    /// Set by a trailing `&`.
    pub background: bool,
}

impl ParsedCommand {
    pub fn has_redirection(&self) -> bool {
        self.input_file.is_some() || self.output_file.is_some()
    }
}

/// Parses one command (no `|` and no `&&`) with the default limits.
#[cfg(test)]
pub fn parse_command(raw: &str) -> Result<ParsedCommand, SyntaxError> {
    parse_command_with(raw, &Limits::default())
}

pub fn parse_command_with(raw: &str, limits: &Limits) -> Result<ParsedCommand, SyntaxError> {
    let mut cmd = ParsedCommand::default();
    let mut tokens = tokenize(raw)?.into_iter();

    while let Some(token) = tokens.next() {
        if cmd.background {
            return Err(SyntaxError::BackgroundNotLast);
        }
        match token {
            Token::Word(word) => {
                if cmd.argv.len() >= limits.max_args {
                    return Err(SyntaxError::TooManyArguments(limits.max_args));
                }
                cmd.argv.push(word);
            }
            Token::Input => {
                let file = redirect_target(tokens.next(), "<")?;
                if cmd.input_file.is_some() {
                    return Err(SyntaxError::MultipleInputRedirections);
                }
                cmd.input_file = Some(file);
            }
            Token::Output | Token::Append => {
                let (op, mode) = if token == Token::Append {
                    (">>", OutputMode::Append)
                } else {
                    (">", OutputMode::Truncate)
                };
                let file = redirect_target(tokens.next(), op)?;
                if cmd.output_file.is_some() {
                    return Err(SyntaxError::MultipleOutputRedirections);
                }
                cmd.output_file = Some(file);
                cmd.output_mode = mode;
            }
            Token::Background => cmd.background = true,
        }
    }

    if cmd.argv.is_empty() && !cmd.has_redirection() {
        return Err(SyntaxError::EmptyCommand);
    }
    Ok(cmd)
}

fn redirect_target(token: Option<Token>, op: &'static str) -> Result<String, SyntaxError> {
    match token {
        Some(Token::Word(file)) if !file.is_empty() => Ok(file),
        _ => Err(SyntaxError::MissingRedirectTarget(op)),
    }
}

/// Pipe-connected stages of one `&&` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<ParsedCommand>,
}

impl Pipeline {
    pub fn new(stages: Vec<ParsedCommand>) -> Result<Self, SyntaxError> {
        let Some((_, init)) = stages.split_last() else {
            return Err(SyntaxError::EmptySegment);
        };
        if init.iter().any(|stage| stage.background) {
            return Err(SyntaxError::BackgroundNotLast);
        }
        Ok(Pipeline { stages })
    }

    pub fn stages(&self) -> &[ParsedCommand] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn last(&self) -> &ParsedCommand {
        // `new` rejects empty pipelines.
        &self.stages[self.stages.len() - 1]
    }

    pub fn is_background(&self) -> bool {
        self.last().background
    }

    /// The only shape a built-in may take: one stage, no redirection,
    /// not backgrounded.
    pub fn single_plain_command(&self) -> Option<&ParsedCommand> {
        match self.stages.as_slice() {
            [cmd] if !cmd.has_redirection() && !cmd.background => Some(cmd),
            _ => None,
        }
    }
}

/// Parses one `&&` segment into its pipeline stages.
pub fn parse_pipeline(segment: &str, limits: &Limits) -> Result<Pipeline, SyntaxError> {
    let stages = split_segments(segment, "|", limits.max_commands)?
        .into_iter()
        .map(|piece| parse_command_with(piece, limits))
        .collect::<Result<Vec<_>, _>>()?;
    Pipeline::new(stages)
}

/// Splits a whole input line into its `&&` segments.
pub fn split_conditional<'a>(line: &'a str, limits: &Limits) -> Result<Vec<&'a str>, SyntaxError> {
    split_segments(line, "&&", limits.max_commands)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let cmd = parse_command("echo a b").unwrap();
        assert_eq!(&*cmd.argv, ["echo", "a", "b"]);
        assert_eq!(cmd.input_file, None);
        assert_eq!(cmd.output_file, None);
        assert!(!cmd.background);
    }

    #[test]
    fn test_parse_quoted_argument() {
        let cmd = parse_command("echo 'a b' c").unwrap();
        assert_eq!(&*cmd.argv, ["echo", "a b", "c"]);
    }

    #[test]
    fn test_parse_redirections() {
        let cmd = parse_command("grep x < in.txt > out.txt").unwrap();
        assert_eq!(&*cmd.argv, ["grep", "x"]);
        assert_eq!(cmd.input_file.as_deref(), Some("in.txt"));
        assert_eq!(cmd.output_file.as_deref(), Some("out.txt"));
        assert_eq!(cmd.output_mode, OutputMode::Truncate);

        let cmd = parse_command("echo hi >> log.txt").unwrap();
        assert_eq!(cmd.output_file.as_deref(), Some("log.txt"));
        assert_eq!(cmd.output_mode, OutputMode::Append);

        let cmd = parse_command("cat <'my input'").unwrap();
        assert_eq!(cmd.input_file.as_deref(), Some("my input"));
    }

    #[test]
    fn test_redirection_without_program() {
        let cmd = parse_command("> out.txt").unwrap();
        assert!(cmd.argv.is_empty());
        assert_eq!(cmd.output_file.as_deref(), Some("out.txt"));
    }

    #[test]
    fn test_parse_background() {
        let cmd = parse_command("sleep 5 &").unwrap();
        assert!(cmd.background);
        assert_eq!(&*cmd.argv, ["sleep", "5"]);
    }

    #[test]
    fn test_background_must_be_last() {
        assert_eq!(parse_command("cmd & x"), Err(SyntaxError::BackgroundNotLast));
        assert_eq!(parse_command("cmd & &"), Err(SyntaxError::BackgroundNotLast));
        assert_eq!(parse_command("cmd & > f"), Err(SyntaxError::BackgroundNotLast));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_command("echo 'unterminated"),
            Err(SyntaxError::UnterminatedQuote)
        );
        assert_eq!(parse_command("   "), Err(SyntaxError::EmptyCommand));
        assert_eq!(parse_command("&"), Err(SyntaxError::EmptyCommand));
        assert_eq!(
            parse_command("cat <"),
            Err(SyntaxError::MissingRedirectTarget("<"))
        );
        assert_eq!(
            parse_command("cat > < in"),
            Err(SyntaxError::MissingRedirectTarget(">"))
        );
        assert_eq!(
            parse_command("cat < a < b"),
            Err(SyntaxError::MultipleInputRedirections)
        );
        assert_eq!(
            parse_command("cat > a >> b"),
            Err(SyntaxError::MultipleOutputRedirections)
        );
    }

    #[test]
    fn test_too_many_arguments() {
        let limits = Limits {
            max_commands: 10,
            max_args: 3,
        };
        assert!(parse_command_with("a b c", &limits).is_ok());
        assert_eq!(
            parse_command_with("a b c d", &limits),
            Err(SyntaxError::TooManyArguments(3))
        );
    }

    #[test]
    fn test_parse_pipeline() {
        let limits = Limits::default();
        let pipeline = parse_pipeline("grep 'pattern' < input.txt | sort > output.txt &", &limits)
            .unwrap();
        assert_eq!(pipeline.len(), 2);
        let stages = pipeline.stages();
        assert_eq!(&*stages[0].argv, ["grep", "pattern"]);
        assert_eq!(stages[0].input_file.as_deref(), Some("input.txt"));
        assert_eq!(&*stages[1].argv, ["sort"]);
        assert_eq!(stages[1].output_file.as_deref(), Some("output.txt"));
        assert!(pipeline.is_background());
        assert!(pipeline.single_plain_command().is_none());
    }

    #[test]
    fn test_pipeline_background_only_on_last_stage() {
        let limits = Limits::default();
        assert_eq!(
            parse_pipeline("sleep 1 & | cat", &limits),
            Err(SyntaxError::BackgroundNotLast)
        );
    }

    #[test]
    fn test_pipeline_stage_errors_propagate() {
        let limits = Limits::default();
        assert_eq!(
            parse_pipeline("ls | 'oops", &limits),
            Err(SyntaxError::UnterminatedQuote)
        );
        assert_eq!(parse_pipeline("|", &limits), Err(SyntaxError::EmptySegment));
    }

    #[test]
    fn test_single_plain_command() {
        let limits = Limits::default();
        let pipeline = parse_pipeline("cd /tmp", &limits).unwrap();
        assert_eq!(
            pipeline.single_plain_command().and_then(|c| c.argv.program()),
            Some("cd")
        );
        assert!(parse_pipeline("cd /tmp > x", &limits)
            .unwrap()
            .single_plain_command()
            .is_none());
        assert!(parse_pipeline("history | cat", &limits)
            .unwrap()
            .single_plain_command()
            .is_none());
    }

    #[test]
    fn test_split_conditional() {
        let limits = Limits::default();
        let segments = split_conditional("false && echo 'a && b'", &limits).unwrap();
        assert_eq!(segments, vec!["false", "echo 'a && b'"]);
    }

    #[test]
    fn test_argv_to_cstrings() {
        let argv: Argv = ["ls", "-l"].into_iter().collect();
        let c = argv.to_cstrings().unwrap();
        assert_eq!(c[1].as_bytes(), b"-l");
        let bad: Argv = ["a\0b"].into_iter().collect();
        assert!(bad.to_cstrings().is_err());
        assert_eq!(argv.args(), ["-l".to_string()]);
    }
}
