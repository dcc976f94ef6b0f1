#![deny(warnings)]

use std::collections::BTreeSet;
use thiserror::Error;

/// Errors raised while turning grammar text into a parser.
/// These are fatal: a grammar either builds completely or not at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    /// The grammar source itself is not well-formed.
    #[error("grammar syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("undefined symbol: {0}")]
    UndefinedSymbol(String),

    #[error("duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("import cycle through module: {0}")]
    ImportCycle(String),

    #[error("unknown import: {0}")]
    UnknownImport(String),

    /// Terminal whose pattern can match the empty string, or a terminal
    /// defined in terms of itself.
    #[error("bad terminal {name}: {reason}")]
    BadTerminal { name: String, reason: String },

    #[error("invalid regex in terminal {name}: {message}")]
    BadRegex { name: String, message: String },

    /// LALR table construction found a conflict no priority resolves.
    #[error("{kind} conflict in state {state} on {lookahead}: {detail}")]
    LalrConflict {
        kind: ConflictKind,
        state: usize,
        lookahead: String,
        detail: String,
    },

    /// Option combinations that make no sense (eg: contextual lexer with
    /// earley).
    #[error("invalid parser configuration: {0}")]
    BadOptions(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    ShiftReduce,
    ReduceReduce,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ConflictKind::ShiftReduce => write!(f, "shift/reduce"),
            ConflictKind::ReduceReduce => write!(f, "reduce/reduce"),
        }
    }
}

/// Errors raised while parsing input text. Parsing halts at the first one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The lexer found no terminal matching at this position.
    #[error("no terminal matches {found:?} at line {line} column {column}")]
    UnexpectedCharacters {
        found: char,
        pos: usize,
        line: usize,
        column: usize,
        allowed: BTreeSet<String>,
    },

    /// The parser received a token the current state does not accept.
    #[error("unexpected token {token:?} ({kind}) at line {line} column {column}; expected one of {expected:?}")]
    UnexpectedToken {
        kind: String,
        token: String,
        pos: usize,
        line: usize,
        column: usize,
        expected: BTreeSet<String>,
    },

    /// Input ended mid-derivation.
    #[error("unexpected end of input; expected one of {expected:?}")]
    UnexpectedEof { expected: BTreeSet<String> },

    /// Earley chart exhausted all derivations without covering the input.
    #[error("no derivation covers the input past position {pos}")]
    UnexpectedInput { pos: usize },
}

impl ParseError {
    /// Byte offset the failure anchors to, when one is known.
    pub fn pos(&self) -> Option<usize> {
        match self {
            ParseError::UnexpectedCharacters { pos, .. } => Some(*pos),
            ParseError::UnexpectedToken { pos, .. } => Some(*pos),
            ParseError::UnexpectedInput { pos } => Some(*pos),
            ParseError::UnexpectedEof { .. } => None,
        }
    }

    pub fn expected(&self) -> Option<&BTreeSet<String>> {
        match self {
            ParseError::UnexpectedToken { expected, .. } => Some(expected),
            ParseError::UnexpectedEof { expected } => Some(expected),
            ParseError::UnexpectedCharacters { allowed, .. } => Some(allowed),
            ParseError::UnexpectedInput { .. } => None,
        }
    }
}

/// A transformer/visitor callback failed. Carries the rule that was being
/// rewritten so the caller can locate the handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("error transforming rule {rule}: {message}")]
pub struct VisitError {
    pub rule: String,
    pub message: String,
}

impl VisitError {
    pub fn new(rule: impl Into<String>, message: impl Into<String>) -> Self {
        VisitError {
            rule: rule.into(),
            message: message.into(),
        }
    }
}
