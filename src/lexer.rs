use crate::error::SyntaxError;

/// Characters a backslash can make literal.
const ESCAPABLE: [char; 4] = ['\'', '"', ' ', '\t'];

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\r')
}

/// Splits `line` on every occurrence of `delim` found outside quotes.
///
/// Each piece is trimmed; empty pieces (consecutive delimiters, leading or
/// trailing delimiters) are dropped. More than `max` non-empty pieces is an
/// error rather than a silent truncation.
pub fn split_segments<'a>(
    line: &'a str,
    delim: &str,
    max: usize,
) -> Result<Vec<&'a str>, SyntaxError> {
    let mut pieces = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = line.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                // `\'` and friends never open or close a quote.
                if let Some(&(_, next)) = chars.peek() {
                    if ESCAPABLE.contains(&next) {
                        chars.next();
                    }
                }
            }
            (None, '\'' | '"') => quote = Some(c),
            (Some(q), _) if q == c => quote = None,
            (None, _) if line[i..].starts_with(delim) => {
                pieces.push(&line[start..i]);
                start = i + delim.len();
                // Skip the rest of a multi-byte delimiter such as `&&`.
                while let Some(&(j, _)) = chars.peek() {
                    if j >= start {
                        break;
                    }
                    chars.next();
                }
            }
            _ => {}
        }
    }
    pieces.push(&line[start..]);

    let pieces: Vec<&str> = pieces
        .into_iter()
        .map(|p| p.trim_matches(is_blank))
        .filter(|p| !p.is_empty())
        .collect();
    if pieces.len() > max {
        return Err(SyntaxError::TooManyCommands(max));
    }
    Ok(pieces)
}

/// A lexical unit of a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(String),
    /// `<`
    Input,
    /// `>`
    Output,
    /// `>>`
    Append,
    /// `&`
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quote {
    Single,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Normal,
    SingleQuoted,
    DoubleQuoted,
    /// After a backslash; remembers the quoting to resume afterwards.
    Escaped(Option<Quote>),
}

impl State {
    fn resume(quote: Option<Quote>) -> State {
        match quote {
            None => State::Normal,
            Some(Quote::Single) => State::SingleQuoted,
            Some(Quote::Double) => State::DoubleQuoted,
        }
    }

    fn quote(self) -> Option<Quote> {
        match self {
            State::SingleQuoted => Some(Quote::Single),
            State::DoubleQuoted => Some(Quote::Double),
            State::Normal | State::Escaped(_) => None,
        }
    }
}

/// Character-at-a-time scanner turning one command string into tokens.
pub struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    state: State,
    tokens: Vec<Token>,
    word: String,
    /// A word has been started, even if it is still empty (`''`).
    in_word: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(input: &'a str) -> Self {
        Scanner {
            chars: input.chars().peekable(),
            state: State::Normal,
            tokens: Vec::new(),
            word: String::new(),
            in_word: false,
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, SyntaxError> {
        while let Some(c) = self.chars.next() {
            self.step(c);
        }
        if let State::Escaped(quote) = self.state {
            self.push_char('\\');
            self.state = State::resume(quote);
        }
        if self.state != State::Normal {
            return Err(SyntaxError::UnterminatedQuote);
        }
        self.finish_word();
        Ok(self.tokens)
    }

    fn step(&mut self, c: char) {
        match self.state {
            State::Normal => match c {
                c if is_blank(c) => self.finish_word(),
                '\'' => self.open_quote(State::SingleQuoted),
                '"' => self.open_quote(State::DoubleQuoted),
                '\\' => self.state = State::Escaped(None),
                '<' => self.operator(Token::Input),
                '>' => {
                    if self.chars.peek() == Some(&'>') {
                        self.chars.next();
                        self.operator(Token::Append);
                    } else {
                        self.operator(Token::Output);
                    }
                }
                '&' => self.operator(Token::Background),
                c => self.push_char(c),
            },
            State::SingleQuoted | State::DoubleQuoted => {
                let closing = if self.state == State::SingleQuoted {
                    '\''
                } else {
                    '"'
                };
                match c {
                    c if c == closing => self.state = State::Normal,
                    '\\' => self.state = State::Escaped(self.state.quote()),
                    c => self.push_char(c),
                }
            }
            State::Escaped(quote) => {
                self.state = State::resume(quote);
                if ESCAPABLE.contains(&c) {
                    self.push_char(c);
                } else {
                    // Not an escape: keep the backslash and rescan `c`.
                    self.push_char('\\');
                    self.step(c);
                }
            }
        }
    }

    fn open_quote(&mut self, state: State) {
        self.in_word = true;
        self.state = state;
    }

    fn push_char(&mut self, c: char) {
        self.in_word = true;
        self.word.push(c);
    }

    fn operator(&mut self, token: Token) {
        self.finish_word();
        self.tokens.push(token);
    }

    fn finish_word(&mut self) {
        if self.in_word {
            self.tokens.push(Token::Word(std::mem::take(&mut self.word)));
            self.in_word = false;
        }
    }
}

/// Tokenizes a single command string (no `|` or `&&`).
pub fn tokenize(input: &str) -> Result<Vec<Token>, SyntaxError> {
    Scanner::new(input).tokenize()
}
