#![deny(warnings)]

use crate::errors::GrammarError;

/// Tokens of the grammar language itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Tok {
    /// lowercase name, optionally carrying `?` `!` `_` prefixes
    RuleName(String),
    /// UPPERCASE name, optionally `_`-prefixed
    TermName(String),
    Literal { text: String, case_insensitive: bool },
    Pattern { pattern: String, flags: String },
    Number(i64),
    Directive(String),
    Colon,
    Dot,
    DotDot,
    Arrow,
    Pipe,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Star,
    Plus,
    Question,
    Tilde,
    Newline,
}

#[derive(Clone, Debug)]
pub struct MetaToken {
    pub tok: Tok,
    pub line: usize,
    pub column: usize,
}

pub struct MetaTokenizer<'a> {
    input: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

impl<'a> MetaTokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        MetaTokenizer {
            input: input.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    pub fn tokenize(input: &'a str) -> Result<Vec<MetaToken>, GrammarError> {
        let mut tokenizer = MetaTokenizer::new(input);
        let mut out = Vec::new();
        while let Some(token) = tokenizer.next_token()? {
            out.push(token);
        }
        Ok(out)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.input.next();
        match c {
            Some('\n') => {
                self.line += 1;
                self.column = 1;
            }
            Some(_) => self.column += 1,
            None => (),
        }
        c
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        GrammarError::Syntax {
            message: message.into(),
            line: self.line,
            column: self.column,
        }
    }

    fn at(&self, line: usize, column: usize, tok: Tok) -> MetaToken {
        MetaToken { tok, line, column }
    }

    fn next_token(&mut self) -> Result<Option<MetaToken>, GrammarError> {
        loop {
            let (line, column) = (self.line, self.column);
            let c = match self.input.peek() {
                Some(c) => *c,
                None => return Ok(None),
            };
            let simple = |s: &mut Self, tok| {
                s.bump();
                Ok(Some(s.at(line, column, tok)))
            };
            match c {
                ' ' | '\t' | '\r' => {
                    self.bump();
                }
                '\n' => return simple(self, Tok::Newline),
                ':' => return simple(self, Tok::Colon),
                '|' => return simple(self, Tok::Pipe),
                '(' => return simple(self, Tok::LParen),
                ')' => return simple(self, Tok::RParen),
                '[' => return simple(self, Tok::LBracket),
                ']' => return simple(self, Tok::RBracket),
                '{' => return simple(self, Tok::LBrace),
                '}' => return simple(self, Tok::RBrace),
                ',' => return simple(self, Tok::Comma),
                '*' => return simple(self, Tok::Star),
                '+' => return simple(self, Tok::Plus),
                '~' => return simple(self, Tok::Tilde),
                '.' => {
                    self.bump();
                    if self.input.peek() == Some(&'.') {
                        self.bump();
                        return Ok(Some(self.at(line, column, Tok::DotDot)));
                    }
                    return Ok(Some(self.at(line, column, Tok::Dot)));
                }
                '-' => {
                    self.bump();
                    match self.input.peek() {
                        Some('>') => {
                            self.bump();
                            return Ok(Some(self.at(line, column, Tok::Arrow)));
                        }
                        Some(d) if d.is_ascii_digit() => {
                            let n = self.scan_number()?;
                            return Ok(Some(self.at(line, column, Tok::Number(-n))));
                        }
                        _ => return Err(self.error("expected '>' or digit after '-'")),
                    }
                }
                '/' => {
                    self.bump();
                    if self.input.peek() == Some(&'/') {
                        // line comment
                        while let Some(c) = self.bump() {
                            if c == '\n' {
                                break;
                            }
                        }
                        return Ok(Some(self.at(line, column, Tok::Newline)));
                    }
                    let token = self.scan_regex(line, column)?;
                    return Ok(Some(token));
                }
                '"' => {
                    let token = self.scan_string(line, column)?;
                    return Ok(Some(token));
                }
                '%' => {
                    self.bump();
                    let name = self.scan_name_chars();
                    if name.is_empty() {
                        return Err(self.error("expected directive name after '%'"));
                    }
                    return Ok(Some(self.at(line, column, Tok::Directive(name))));
                }
                '?' | '!' => {
                    // `?name` / `!name` prefix a rule definition; a bare `?`
                    // is the optional operator
                    self.bump();
                    match self.input.peek() {
                        Some(n) if n.is_ascii_lowercase() || *n == '_' || *n == '?' || *n == '!' => {
                            let mut name = c.to_string();
                            while let Some(p) = self.input.peek() {
                                if *p == '?' || *p == '!' {
                                    name.push(self.bump().expect("peeked"));
                                } else {
                                    break;
                                }
                            }
                            name.push_str(&self.scan_name_chars());
                            return Ok(Some(self.at(line, column, Tok::RuleName(name))));
                        }
                        _ if c == '?' => return Ok(Some(self.at(line, column, Tok::Question))),
                        _ => return Err(self.error("dangling '!'")),
                    }
                }
                c if c.is_ascii_digit() => {
                    let n = self.scan_number()?;
                    return Ok(Some(self.at(line, column, Tok::Number(n))));
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let name = self.scan_name_chars();
                    let first_alpha = name.chars().find(|c| c.is_ascii_alphabetic());
                    let tok = match first_alpha {
                        Some(c) if c.is_ascii_uppercase() => Tok::TermName(name),
                        Some(_) => Tok::RuleName(name),
                        None => return Err(self.error(format!("bad name: {}", name))),
                    };
                    return Ok(Some(self.at(line, column, tok)));
                }
                other => return Err(self.error(format!("unexpected character {:?}", other))),
            }
        }
    }

    fn scan_name_chars(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.input.peek() {
            if c.is_ascii_alphanumeric() || *c == '_' {
                name.push(self.bump().expect("peeked"));
            } else {
                break;
            }
        }
        name
    }

    fn scan_number(&mut self) -> Result<i64, GrammarError> {
        let mut digits = String::new();
        while let Some(c) = self.input.peek() {
            if c.is_ascii_digit() {
                digits.push(self.bump().expect("peeked"));
            } else {
                break;
            }
        }
        digits
            .parse()
            .map_err(|_| self.error(format!("bad number: {}", digits)))
    }

    // "text" with backslash escapes, optional trailing `i` flag
    fn scan_string(&mut self, line: usize, column: usize) -> Result<MetaToken, GrammarError> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('r') => text.push('\r'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    Some('\'') => text.push('\''),
                    Some('/') => text.push('/'),
                    Some(other) => {
                        return Err(self.error(format!("unknown escape: \\{}", other)))
                    }
                    None => return Err(self.error("unterminated string")),
                },
                Some('\n') | None => return Err(self.error("unterminated string")),
                Some(c) => text.push(c),
            }
        }
        let case_insensitive = if self.input.peek() == Some(&'i') {
            self.bump();
            true
        } else {
            false
        };
        Ok(self.at(
            line,
            column,
            Tok::Literal {
                text,
                case_insensitive,
            },
        ))
    }

    // /pattern/flags  -- the leading '/' is already consumed
    fn scan_regex(&mut self, line: usize, column: usize) -> Result<MetaToken, GrammarError> {
        let mut pattern = String::new();
        loop {
            match self.bump() {
                Some('/') => break,
                Some('\\') => match self.bump() {
                    // `\/` means a literal slash; other escapes pass through
                    Some('/') => pattern.push('/'),
                    Some(other) => {
                        pattern.push('\\');
                        pattern.push(other);
                    }
                    None => return Err(self.error("unterminated regex")),
                },
                Some('\n') | None => return Err(self.error("unterminated regex")),
                Some(c) => pattern.push(c),
            }
        }
        let mut flags = String::new();
        while let Some(c) = self.input.peek() {
            if "imsux".contains(*c) {
                flags.push(self.bump().expect("peeked"));
            } else {
                break;
            }
        }
        Ok(self.at(line, column, Tok::Pattern { pattern, flags }))
    }
}

///////////////////////////////////////////////////////////////////////////////
