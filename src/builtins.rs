use crate::parser::ParsedCommand;
use std::env;
use std::io::{self, Write};

/// Commands run inside the shell process itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Exit,
    History,
    Cd,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "exit" | "quit" => Some(Builtin::Exit),
            "history" => Some(Builtin::History),
            "cd" => Some(Builtin::Cd),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Ran with this exit status.
    Handled(i32),
    /// The shell must stop reading input.
    Exit,
    NotBuiltin,
}

/// Checks if the command is a built-in command and, if so, executes it.
/// Supported built-ins are "exit"/"quit", "history" and "cd".
///
/// The caller only offers single, unredirected, foreground commands.
pub fn handle_builtin(cmd: &ParsedCommand, history: &[String]) -> Outcome {
    let Some(builtin) = cmd.argv.program().and_then(Builtin::lookup) else {
        return Outcome::NotBuiltin;
    };
    match builtin {
        Builtin::Exit => Outcome::Exit,
        Builtin::History => Outcome::Handled(print_history(history, &mut io::stdout().lock())),
        Builtin::Cd => Outcome::Handled(change_dir(cmd.argv.args(), &mut io::stderr().lock())),
    }
}

fn print_history(lines: &[String], out: &mut impl Write) -> i32 {
    for (i, line) in lines.iter().enumerate() {
        if writeln!(out, "{}: {}", i + 1, line).is_err() {
            return 1;
        }
    }
    let _ = out.flush();
    0
}

/// Errors are reported but still count as handled: a failed `cd` does not
/// break a `&&` chain.
fn change_dir(args: &[String], err: &mut impl Write) -> i32 {
    let Some(dir) = args.first() else {
        let _ = writeln!(err, "Usage: cd <directory>");
        return 0;
    };
    match env::set_current_dir(dir) {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(err, "cd: {}: {}", dir, e);
            0
        }
    }
}
