#![deny(warnings)]

use super::analysis::{Action, LalrTables, END};
use crate::errors::ParseError;
use crate::grammar::Grammar;
use crate::lexer::Lexer;
use crate::tree::{Child, TreeBuilder};
use std::collections::BTreeSet;

/// Table-driven LALR(1) runtime: one stack of states, one of half-built
/// children, tokens pulled on demand so the contextual lexer always sees
/// the current state.
pub struct LalrRunner<'g> {
    grammar: &'g Grammar,
    tables: &'g LalrTables,
    builder: &'g TreeBuilder,
    debug: bool,
}

impl<'g> LalrRunner<'g> {
    pub fn new(
        grammar: &'g Grammar,
        tables: &'g LalrTables,
        builder: &'g TreeBuilder,
        debug: bool,
    ) -> Self {
        LalrRunner {
            grammar,
            tables,
            builder,
            debug,
        }
    }

    pub fn parse(
        &self,
        lexer: &mut Lexer,
        contextual: bool,
        mut on_error: Option<&mut dyn FnMut(&ParseError) -> bool>,
    ) -> Result<Child, ParseError> {
        let mut states: Vec<usize> = vec![0];
        let mut values: Vec<Child> = Vec::new();
        let mut recovered = false;

        'tokens: loop {
            let state = *states.last().expect("stack never empties");
            let allowed: Option<BTreeSet<String>> =
                contextual.then(|| self.tables.expected(state));
            let mut lookahead = lexer.next_token(allowed.as_ref())?;

            loop {
                let state = *states.last().expect("stack never empties");
                let kind = lookahead.as_ref().map(|t| t.kind.as_str()).unwrap_or(END);
                match self.tables.action(state, kind) {
                    Some(Action::Shift(next)) => {
                        if self.debug {
                            eprintln!("shift {:?} -> state {}", kind, next);
                        }
                        states.push(next);
                        values.push(Child::Token(
                            lookahead.take().expect("END never shifts"),
                        ));
                        continue 'tokens;
                    }
                    Some(Action::Reduce(rule_id)) => {
                        let rule = &self.grammar.rules[rule_id];
                        if self.debug {
                            eprintln!("reduce {}", rule);
                        }
                        let n = rule.rhs.len();
                        let children = values.split_off(values.len() - n);
                        states.truncate(states.len() - n);
                        let child = self.builder.build(rule, children);
                        let top = *states.last().expect("stack never empties");
                        let next = self
                            .tables
                            .goto(top, &rule.lhs)
                            .expect("BUG: reduce without goto");
                        states.push(next);
                        values.push(child);
                    }
                    Some(Action::Accept) => {
                        return Ok(values.pop().expect("BUG: accept with empty stack"))
                    }
                    None => {
                        let expected = self.tables.expected(state);
                        let err = match &lookahead {
                            Some(token) => ParseError::UnexpectedToken {
                                kind: token.kind.clone(),
                                token: token.value.clone(),
                                pos: token.start_pos,
                                line: token.line,
                                column: token.column,
                                expected,
                            },
                            None => ParseError::UnexpectedEof { expected },
                        };
                        // the caller gets one shot at resuming; after that
                        // every failure is final
                        let retry = match on_error.as_mut() {
                            Some(handler) if !recovered => {
                                recovered = true;
                                handler(&err)
                            }
                            _ => false,
                        };
                        if !retry {
                            return Err(err);
                        }
                        lookahead = self.synchronize(lexer, state)?;
                        if lookahead.is_none() {
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    /// Skip input until a terminal the current state has an action for.
    fn synchronize(
        &self,
        lexer: &mut Lexer,
        state: usize,
    ) -> Result<Option<crate::tree::Token>, ParseError> {
        loop {
            match lexer.next_token(None)? {
                None => return Ok(None),
                Some(token) => {
                    if self.tables.action(state, &token.kind).is_some() {
                        return Ok(Some(token));
                    }
                    if self.debug {
                        eprintln!("skipping {:?} during recovery", token);
                    }
                }
            }
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
