#![deny(warnings)]

//! Grammar front-end: the grammar language parser, import loading and
//! desugaring down to the flat rule set the engines consume.

pub mod ast;
mod loader;
mod lower;
mod parser;
mod tokenizer;

pub use loader::{load, DefaultResolver, ImportResolver, COMMON_GRAMMAR};
pub use lower::lower;

use crate::errors::GrammarError;
use crate::grammar::Grammar;

/// Full front-end pipeline: text -> statements -> resolved -> lowered.
pub fn build_grammar(
    source: &str,
    starts: Vec<String>,
    resolver: &dyn ImportResolver,
) -> Result<Grammar, GrammarError> {
    let loaded = load(source, resolver)?;
    lower(loaded, starts)
}
