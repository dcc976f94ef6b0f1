#![deny(warnings)]

//! pekoe: build parsers from EBNF grammars.
//!
//! A grammar text goes in, a `Parser` comes out; `parse` turns input text
//! into a `Tree`. Two engines run over the same lowered grammar: Earley
//! (any context-free grammar, ambiguity kept or resolved) and LALR(1)
//! (fast, with an optional parser-state-aware lexer).
//!
//! ```no_run
//! use pekoe::{Parser, ParserOptions};
//!
//! let parser = Parser::new(
//!     "start: WORD \",\" WORD \"!\"\n\
//!      WORD: /\\w+/\n\
//!      %ignore \" \"\n",
//!     ParserOptions::new(),
//! ).unwrap();
//! let tree = parser.parse("Hello, World!").unwrap();
//! assert_eq!(tree.data, "start");
//! ```

mod earley;
mod errors;
mod grammar;
mod lalr;
mod lexer;
mod meta;
mod transform;
mod tree;

pub use errors::{ConflictKind, GrammarError, ParseError, VisitError};
pub use grammar::{Grammar, Pattern, Rule, RuleOptions, Symbol, TerminalDef};
pub use meta::{DefaultResolver, ImportResolver, COMMON_GRAMMAR};
pub use transform::{Transformer, Visitor};
pub use tree::{Child, Meta, Token, Tree};

use lexer::{Lexer, LexerConf};
use std::collections::HashMap;
use tree::TreeBuilder;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParserKind {
    Earley,
    Lalr,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LexerKind {
    /// contextual for LALR, basic for Earley
    Auto,
    Basic,
    /// LALR only: candidate terminals restricted by parser state
    Contextual,
    /// Earley only: terminals matched per chart position
    Dynamic,
    /// like Dynamic but every match length is tried, not just longest
    DynamicComplete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ambiguity {
    Resolve,
    Explicit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriorityMode {
    Normal,
    Invert,
    None,
}

/// Construction-time switches. A parser is configured once here and
/// never changes afterwards.
#[derive(Clone, Debug)]
pub struct ParserOptions {
    pub start: Vec<String>,
    pub parser: ParserKind,
    pub lexer: LexerKind,
    pub ambiguity: Ambiguity,
    pub debug: bool,
    pub keep_all_tokens: bool,
    pub propagate_positions: bool,
    pub maybe_placeholders: bool,
    /// Unicode-aware regex classes (`\w`, `\p{..}`)
    pub unicode: bool,
    pub priority: PriorityMode,
}

impl ParserOptions {
    pub fn new() -> Self {
        ParserOptions {
            start: vec!["start".to_string()],
            parser: ParserKind::Earley,
            lexer: LexerKind::Auto,
            ambiguity: Ambiguity::Resolve,
            debug: false,
            keep_all_tokens: false,
            propagate_positions: false,
            maybe_placeholders: false,
            unicode: true,
            priority: PriorityMode::Normal,
        }
    }

    pub fn start(mut self, start: &str) -> Self {
        self.start = vec![start.to_string()];
        self
    }

    pub fn starts(mut self, starts: &[&str]) -> Self {
        self.start = starts.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn parser(mut self, kind: ParserKind) -> Self {
        self.parser = kind;
        self
    }

    pub fn lexer(mut self, kind: LexerKind) -> Self {
        self.lexer = kind;
        self
    }

    pub fn ambiguity(mut self, mode: Ambiguity) -> Self {
        self.ambiguity = mode;
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn keep_all_tokens(mut self, keep: bool) -> Self {
        self.keep_all_tokens = keep;
        self
    }

    pub fn propagate_positions(mut self, propagate: bool) -> Self {
        self.propagate_positions = propagate;
        self
    }

    pub fn maybe_placeholders(mut self, placeholders: bool) -> Self {
        self.maybe_placeholders = placeholders;
        self
    }

    pub fn unicode(mut self, unicode: bool) -> Self {
        self.unicode = unicode;
        self
    }

    pub fn priority(mut self, mode: PriorityMode) -> Self {
        self.priority = mode;
        self
    }
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions::new()
    }
}

/// A ready-to-use parser. Immutable once constructed; every `parse` call
/// allocates its own stack or chart and releases it on return.
pub struct Parser {
    grammar: Grammar,
    options: ParserOptions,
    lexer_conf: LexerConf,
    builder: TreeBuilder,
    /// LALR tables per start symbol
    tables: HashMap<String, lalr::LalrTables>,
    scorer: Option<Box<dyn Fn(&Tree) -> isize>>,
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser").finish_non_exhaustive()
    }
}

impl Parser {
    pub fn new(grammar_source: &str, options: ParserOptions) -> Result<Parser, GrammarError> {
        Parser::with_resolver(grammar_source, options, &DefaultResolver)
    }

    /// Build with a custom `%import` resolver in place of the builtin
    /// `common`-only one.
    pub fn with_resolver(
        grammar_source: &str,
        mut options: ParserOptions,
        resolver: &dyn ImportResolver,
    ) -> Result<Parser, GrammarError> {
        options.lexer = resolve_lexer(&options)?;
        let grammar = meta::build_grammar(grammar_source, options.start.clone(), resolver)?;
        if options.debug {
            eprintln!("{:?}", grammar);
        }
        let lexer_conf = LexerConf::new(&grammar, options.unicode)?;
        let builder = TreeBuilder::new(
            &grammar,
            options.keep_all_tokens,
            options.propagate_positions,
            options.maybe_placeholders,
        );
        let mut tables = HashMap::new();
        if options.parser == ParserKind::Lalr {
            for start in &options.start {
                tables.insert(start.clone(), lalr::build_tables(&grammar, start)?);
            }
        }
        Ok(Parser {
            grammar,
            options,
            lexer_conf,
            builder,
            tables,
            scorer: None,
        })
    }

    /// User-supplied scoring for ambiguity resolution: the highest-scored
    /// alternative wins at each ambiguous node.
    pub fn set_ambiguity_scorer(&mut self, scorer: impl Fn(&Tree) -> isize + 'static) {
        self.scorer = Some(Box::new(scorer));
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn parse(&self, text: &str) -> Result<Tree, ParseError> {
        self.parse_with(text, None, None)
    }

    /// Parse from a specific start symbol; `on_error` is consulted once
    /// on an LALR syntax error and may resume parsing by returning true
    /// (input is skipped up to a terminal the state accepts).
    pub fn parse_with(
        &self,
        text: &str,
        start: Option<&str>,
        on_error: Option<&mut dyn FnMut(&ParseError) -> bool>,
    ) -> Result<Tree, ParseError> {
        let start = start.unwrap_or_else(|| self.grammar.starts[0].as_str());
        assert!(
            self.grammar.starts.iter().any(|s| s == start),
            "start symbol {:?} was not declared at construction",
            start
        );
        let child = match self.options.parser {
            ParserKind::Lalr => {
                let tables = &self.tables[start];
                let contextual = self.options.lexer == LexerKind::Contextual;
                let runner =
                    lalr::LalrRunner::new(&self.grammar, tables, &self.builder, self.options.debug);
                let mut lexer = Lexer::new(&self.lexer_conf, text);
                runner.parse(&mut lexer, contextual, on_error)?
            }
            ParserKind::Earley => {
                let engine = earley::EarleyParser::new(&self.grammar, self.options.debug);
                let trees = match self.options.lexer {
                    LexerKind::Dynamic => {
                        engine.parse_dynamic(start, &self.lexer_conf, text, false)?
                    }
                    LexerKind::DynamicComplete => {
                        engine.parse_dynamic(start, &self.lexer_conf, text, true)?
                    }
                    _ => {
                        let tokens = Lexer::new(&self.lexer_conf, text).tokenize()?;
                        engine.parse_tokens(start, &tokens)?
                    }
                };
                let walker = earley::ForestWalker::new(
                    &self.builder,
                    self.options.ambiguity,
                    self.options.priority,
                    self.scorer.as_ref().map(|s| s.as_ref() as &dyn Fn(&Tree) -> isize),
                );
                walker.extract(&trees)
            }
        };
        Ok(into_tree(child, start))
    }
}

/// Engines produce a Child; the API hands out trees. A root inlined down
/// to a bare token gets wrapped under the start symbol's name.
fn into_tree(child: Child, start: &str) -> Tree {
    match child {
        Child::Tree(tree) => tree,
        other => Tree::new(start, vec![other]),
    }
}

fn resolve_lexer(options: &ParserOptions) -> Result<LexerKind, GrammarError> {
    let resolved = match (options.lexer, options.parser) {
        (LexerKind::Auto, ParserKind::Lalr) => LexerKind::Contextual,
        (LexerKind::Auto, ParserKind::Earley) => LexerKind::Basic,
        (LexerKind::Contextual, ParserKind::Earley) => {
            return Err(GrammarError::BadOptions(
                "contextual lexer requires the lalr parser".to_string(),
            ))
        }
        (LexerKind::Dynamic | LexerKind::DynamicComplete, ParserKind::Lalr) => {
            return Err(GrammarError::BadOptions(
                "dynamic lexing requires the earley parser".to_string(),
            ))
        }
        (kind, _) => kind,
    };
    if options.ambiguity == Ambiguity::Explicit && options.parser == ParserKind::Lalr {
        return Err(GrammarError::BadOptions(
            "explicit ambiguity requires the earley parser".to_string(),
        ));
    }
    Ok(resolved)
}
