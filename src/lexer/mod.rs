#![deny(warnings)]

//! Terminal compilation and the tokenizer runtimes. Every terminal
//! becomes one anchored regex; the scan loop picks the longest match with
//! ties broken by (priority, literal-over-pattern, definition order).

use crate::errors::{GrammarError, ParseError};
use crate::grammar::{Grammar, Pattern};
use crate::tree::Token;
use regex::{Regex, RegexBuilder};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug)]
pub struct CompiledTerminal {
    pub name: String,
    regex: Regex,
    pub priority: i32,
    /// literal keywords outrank identifier-like patterns of equal priority
    literal: bool,
}

/// Immutable per-parser lexing tables, shared by every `parse` call.
#[derive(Debug)]
pub struct LexerConf {
    /// sorted by (priority desc, literal first, definition order)
    terminals: Vec<CompiledTerminal>,
    #[allow(dead_code)]
    index: HashMap<String, usize>,
    ignored: Vec<String>,
}

impl LexerConf {
    pub fn new(grammar: &Grammar, unicode: bool) -> Result<Self, GrammarError> {
        let mut terminals = Vec::new();
        let mut order = HashMap::new();
        for (definition_order, def) in grammar.terminals.iter().enumerate() {
            let source = match &def.pattern {
                Pattern::External => continue,
                pattern => pattern.to_regex(),
            };
            let regex = RegexBuilder::new(&format!("^(?:{})", source))
                .unicode(unicode)
                .build()
                .map_err(|e| GrammarError::BadRegex {
                    name: def.name.clone(),
                    message: e.to_string(),
                })?;
            if regex.is_match("") {
                return Err(GrammarError::BadTerminal {
                    name: def.name.clone(),
                    reason: "pattern can match the empty string".to_string(),
                });
            }
            order.insert(def.name.clone(), definition_order);
            terminals.push(CompiledTerminal {
                name: def.name.clone(),
                regex,
                priority: def.priority,
                literal: def.pattern.is_literal(),
            });
        }
        terminals.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.literal.cmp(&a.literal))
                .then(order[&a.name].cmp(&order[&b.name]))
        });
        let index = terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        let conf = LexerConf {
            terminals,
            index,
            ignored: grammar.ignored.clone(),
        };
        conf.report_collisions(grammar);
        Ok(conf)
    }

    // Conservative overlap probe: two regex terminals that nothing ranks
    // apart get flagged when either pattern accepts the other's literal
    // skeleton. Literal-vs-anything is already settled by ordering.
    fn report_collisions(&self, grammar: &Grammar) {
        for (i, a) in self.terminals.iter().enumerate() {
            for b in self.terminals.iter().skip(i + 1) {
                if a.literal || b.literal || a.priority != b.priority {
                    continue;
                }
                let pat_a = grammar.terminal(&a.name).map(|d| d.pattern.to_regex());
                let pat_b = grammar.terminal(&b.name).map(|d| d.pattern.to_regex());
                let (pat_a, pat_b) = match (pat_a, pat_b) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };
                let probe_b = literal_skeleton(&pat_b);
                let probe_a = literal_skeleton(&pat_a);
                let overlap = (!probe_b.is_empty() && full_match(&a.regex, &probe_b))
                    || (!probe_a.is_empty() && full_match(&b.regex, &probe_a));
                if overlap {
                    log::warn!(
                        "terminals {} and {} may match the same input; \
                         set a priority to disambiguate",
                        a.name,
                        b.name
                    );
                }
            }
        }
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|n| n == name)
    }

    pub fn terminal_names(&self) -> impl Iterator<Item = &str> {
        self.terminals.iter().map(|t| t.name.as_str())
    }

    /// Longest match at `pos` among `allowed` (None = all terminals).
    /// Ties fall to the earlier terminal in priority order.
    pub fn match_at(
        &self,
        text: &str,
        pos: usize,
        allowed: Option<&BTreeSet<String>>,
    ) -> Option<(usize, usize)> {
        let rest = &text[pos..];
        let mut best: Option<(usize, usize)> = None;
        for (idx, term) in self.terminals.iter().enumerate() {
            if let Some(allowed) = allowed {
                if !allowed.contains(&term.name) && !self.is_ignored(&term.name) {
                    continue;
                }
            }
            if let Some(m) = term.regex.find(rest) {
                let len = m.end();
                if best.map(|(_, blen)| len > blen).unwrap_or(true) {
                    best = Some((idx, len));
                }
            }
        }
        best
    }

    /// Every terminal matching at `pos`, for the Earley dynamic lexer.
    /// With `complete` each viable match length is reported, not just the
    /// longest per terminal.
    pub fn matches_at(&self, text: &str, pos: usize, complete: bool) -> Vec<(usize, usize)> {
        let rest = &text[pos..];
        let mut out = Vec::new();
        for (idx, term) in self.terminals.iter().enumerate() {
            if complete {
                for (offset, c) in rest.char_indices() {
                    let end = offset + c.len_utf8();
                    if full_match(&term.regex, &rest[..end]) {
                        out.push((idx, end));
                    }
                }
            } else if let Some(m) = term.regex.find(rest) {
                out.push((idx, m.end()));
            }
        }
        out
    }

    pub fn name_of(&self, idx: usize) -> &str {
        &self.terminals[idx].name
    }

    #[allow(dead_code)]
    pub fn has_terminal(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

fn full_match(regex: &Regex, text: &str) -> bool {
    regex.find(text).map(|m| m.end() == text.len()).unwrap_or(false)
}

/// Pattern text with regex metacharacters removed: what the pattern looks
/// like when read as plain text.
fn literal_skeleton(pattern: &str) -> String {
    pattern
        .chars()
        .filter(|c| !"\\.*+?()[]{}|^$".contains(*c))
        .collect()
}

///////////////////////////////////////////////////////////////////////////////

/// Longest-match tokenizer with line/column tracking. One per parse.
pub struct Lexer<'t> {
    conf: &'t LexerConf,
    text: &'t str,
    pos: usize,
    line: usize,
    column: usize,
}

impl<'t> Lexer<'t> {
    pub fn new(conf: &'t LexerConf, text: &'t str) -> Self {
        Lexer {
            conf,
            text,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    #[allow(dead_code)]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Next non-ignored token, restricted to `allowed` when given. When
    /// the restricted scan fails but the full set matches, the full-set
    /// token is returned so the parser can name what it actually saw.
    pub fn next_token(
        &mut self,
        allowed: Option<&BTreeSet<String>>,
    ) -> Result<Option<Token>, ParseError> {
        loop {
            if self.pos >= self.text.len() {
                return Ok(None);
            }
            let matched = self
                .conf
                .match_at(self.text, self.pos, allowed)
                .or_else(|| {
                    allowed.and_then(|_| self.conf.match_at(self.text, self.pos, None))
                });
            let (idx, len) = match matched {
                Some(found) => found,
                None => {
                    let found = self.text[self.pos..]
                        .chars()
                        .next()
                        .expect("pos < len");
                    return Err(ParseError::UnexpectedCharacters {
                        found,
                        pos: self.pos,
                        line: self.line,
                        column: self.column,
                        allowed: allowed
                            .cloned()
                            .unwrap_or_else(|| {
                                self.conf.terminal_names().map(String::from).collect()
                            }),
                    });
                }
            };
            let name = self.conf.name_of(idx);
            let token = self.advance(name.to_string(), len);
            if !self.conf.is_ignored(&token.kind) {
                return Ok(Some(token));
            }
        }
    }

    /// Consume `len` bytes as a token of type `kind`, updating positions.
    fn advance(&mut self, kind: String, len: usize) -> Token {
        let value = &self.text[self.pos..self.pos + len];
        let (start_pos, line, column) = (self.pos, self.line, self.column);
        for c in value.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        self.pos += len;
        Token {
            kind,
            value: value.to_string(),
            start_pos,
            end_pos: self.pos,
            line,
            column,
            end_line: self.line,
            end_column: self.column,
        }
    }

    /// Drain the whole input. Used by the token-stream engines.
    pub fn tokenize(mut self) -> Result<Vec<Token>, ParseError> {
        let mut out = Vec::new();
        while let Some(token) = self.next_token(None)? {
            out.push(token);
        }
        Ok(out)
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, RuleOptions, Symbol, TerminalDef};

    fn conf(terms: Vec<TerminalDef>, ignored: Vec<&str>) -> LexerConf {
        let mut gb = GrammarBuilder::default();
        let mut rhs = Vec::new();
        for t in terms {
            rhs.push(Symbol::Terminal(t.name.clone()));
            gb.add_terminal(t);
        }
        gb.add_rule("start", rhs, None, RuleOptions::default());
        for name in ignored {
            gb.ignore(name);
        }
        let g = gb.into_grammar(vec!["start".to_string()]).unwrap();
        LexerConf::new(&g, true).unwrap()
    }

    fn term(name: &str, re: &str) -> TerminalDef {
        TerminalDef::new(name, Pattern::Regex(re.to_string()))
    }

    fn lit(name: &str, text: &str) -> TerminalDef {
        TerminalDef::new(name, Pattern::Str(text.to_string()))
    }

    #[test]
    fn longest_match_wins() {
        let conf = conf(vec![term("INT", "[0-9]+"), term("FLOAT", "[0-9]+\\.[0-9]+")], vec![]);
        let toks = Lexer::new(&conf, "3.14").tokenize().unwrap();
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].kind, "FLOAT");
        assert_eq!(toks[0].value, "3.14");
    }

    #[test]
    fn literal_beats_pattern_on_tie() {
        let conf = conf(vec![term("NAME", "[a-z]+"), lit("IF", "if")], vec![]);
        let toks = Lexer::new(&conf, "if").tokenize().unwrap();
        assert_eq!(toks[0].kind, "IF");
        // longer identifier still wins by longest-match
        let toks = Lexer::new(&conf, "iffy").tokenize().unwrap();
        assert_eq!(toks[0].kind, "NAME");
    }

    #[test]
    fn priority_beats_declaration_order() {
        let conf = conf(
            vec![term("A", "x"), term("B", "x").with_priority(5)],
            vec![],
        );
        let toks = Lexer::new(&conf, "x").tokenize().unwrap();
        assert_eq!(toks[0].kind, "B");
    }

    #[test]
    fn ignored_terminals_skipped() {
        let conf = conf(vec![term("WORD", "\\w+"), term("WS", "\\s+")], vec!["WS"]);
        let toks = Lexer::new(&conf, "a b  c").tokenize().unwrap();
        let values: Vec<_> = toks.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn positions_track_newlines() {
        let conf = conf(vec![term("WORD", "\\w+"), term("NL", "\\n")], vec!["NL"]);
        let toks = Lexer::new(&conf, "ab\ncd").tokenize().unwrap();
        assert_eq!((toks[0].line, toks[0].column), (1, 1));
        assert_eq!((toks[0].end_line, toks[0].end_column), (1, 3));
        assert_eq!((toks[1].line, toks[1].column), (2, 1));
        assert_eq!(toks[1].start_pos, 3);
    }

    #[test]
    fn unexpected_characters() {
        let conf = conf(vec![term("WORD", "[a-z]+")], vec![]);
        let err = Lexer::new(&conf, "ab#").tokenize().unwrap_err();
        match err {
            ParseError::UnexpectedCharacters { found, pos, column, .. } => {
                assert_eq!(found, '#');
                assert_eq!(pos, 2);
                assert_eq!(column, 3);
            }
            other => panic!("expected UnexpectedCharacters, got {:?}", other),
        }
    }

    #[test]
    fn empty_pattern_rejected() {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(term("BAD", "x*"));
        gb.add_rule(
            "start",
            vec![Symbol::Terminal("BAD".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["start".to_string()]).unwrap();
        let err = LexerConf::new(&g, true).unwrap_err();
        assert!(matches!(err, GrammarError::BadTerminal { .. }));
    }

    #[test]
    fn contextual_restriction_changes_winner() {
        let conf = conf(vec![term("A", "x"), term("B", "x")], vec![]);
        let allowed: BTreeSet<String> = ["B".to_string()].into_iter().collect();
        let mut lexer = Lexer::new(&conf, "x");
        let tok = lexer.next_token(Some(&allowed)).unwrap().unwrap();
        assert_eq!(tok.kind, "B");
    }

    #[test]
    fn contextual_fallback_to_full_set() {
        let conf = conf(vec![term("A", "x"), term("B", "y")], vec![]);
        let allowed: BTreeSet<String> = ["B".to_string()].into_iter().collect();
        let mut lexer = Lexer::new(&conf, "x");
        // restricted scan fails, the full set names the offender
        let tok = lexer.next_token(Some(&allowed)).unwrap().unwrap();
        assert_eq!(tok.kind, "A");
    }

    #[test]
    fn dynamic_matches_all_lengths() {
        let conf = conf(vec![term("A", "a+")], vec![]);
        let longest = conf.matches_at("aaa", 0, false);
        assert_eq!(longest, vec![(0, 3)]);
        let all = conf.matches_at("aaa", 0, true);
        assert_eq!(all.len(), 3);
    }
}
