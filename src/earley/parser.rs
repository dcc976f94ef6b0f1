#![deny(warnings)]

use super::spans::{Span, StateSet};
use crate::errors::ParseError;
use crate::grammar::{Grammar, Symbol};
use crate::lexer::LexerConf;
use crate::tree::Token;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Completed start spans covering the whole input; the forest walker
/// turns these into trees.
#[derive(Debug)]
pub struct ParseTrees(pub Vec<Rc<Span>>);

pub struct EarleyParser<'g> {
    grammar: &'g Grammar,
    debug: bool,
}

impl<'g> EarleyParser<'g> {
    pub fn new(grammar: &'g Grammar, debug: bool) -> Self {
        EarleyParser { grammar, debug }
    }

    fn seed(&self, start: &str) -> StateSet {
        self.grammar
            .rules_for(start)
            .map(|r| Span::new(r, 0))
            .collect()
    }

    /// Run predictions and completions in `states[at]` to a fixpoint.
    /// Nullable completions need the repeated passes.
    fn closure(&self, states: &mut [StateSet], at: usize) {
        let mut prev_size = usize::MAX;
        while states[at].len() != prev_size {
            prev_size = states[at].len();
            let mut new_spans = Vec::new();
            for span in states[at].iter() {
                match span.next_symbol() {
                    // Prediction
                    Some(Symbol::Rule(name)) => {
                        new_spans.extend(self.grammar.rules_for(name).map(|r| Span::new(r, at)))
                    }
                    // Completion
                    None => new_spans.extend(states[span.start].completed_by(span, at)),
                    // Scans handled by the caller
                    Some(Symbol::Terminal(_)) => (),
                }
            }
            states[at].extend(new_spans);
        }
    }

    fn dump(&self, states: &[StateSet]) {
        if !self.debug {
            return;
        }
        for (idx, set) in states.iter().enumerate() {
            eprintln!("=== {} ===", idx);
            for span in set.iter() {
                eprintln!("{:?}", span);
            }
        }
        eprintln!("=========");
    }

    /// Parse a pre-lexed token stream (the basic lexer path).
    pub fn parse_tokens(&self, start: &str, tokens: &[Token]) -> Result<ParseTrees, ParseError> {
        let mut states = Vec::with_capacity(tokens.len() + 1);
        states.push(self.seed(start));

        for (i, token) in tokens.iter().enumerate() {
            self.closure(&mut states, i);
            let scans = states[i].advanced_by_scan(token, i + 1);
            if scans.is_empty() {
                let expected = expected_terminals(&states[i]);
                self.dump(&states);
                return Err(ParseError::UnexpectedToken {
                    kind: token.kind.clone(),
                    token: token.value.clone(),
                    pos: token.start_pos,
                    line: token.line,
                    column: token.column,
                    expected,
                });
            }
            states.push(scans.into_iter().collect());
        }
        let last = states.len() - 1;
        self.closure(&mut states, last);
        self.dump(&states);

        let roots = states[last].completed_roots(start, 0);
        if roots.is_empty() {
            return Err(ParseError::UnexpectedEof {
                expected: expected_terminals(&states[last]),
            });
        }
        Ok(ParseTrees(roots))
    }

    /// Parse straight off the text, asking the lexer at every chart
    /// position which terminals could start there. Chart columns are byte
    /// offsets; ignored terminals bridge columns without consuming items.
    pub fn parse_dynamic(
        &self,
        start: &str,
        conf: &LexerConf,
        text: &str,
        complete: bool,
    ) -> Result<ParseTrees, ParseError> {
        let n = text.len();
        let mut states: Vec<StateSet> = (0..=n).map(|_| StateSet::new()).collect();
        states[0] = self.seed(start);
        let lines = LineIndex::new(text);
        let mut last_alive = 0;

        for pos in 0..=n {
            if states[pos].is_empty() {
                continue;
            }
            self.closure(&mut states, pos);
            last_alive = pos;
            if pos == n {
                break;
            }
            let matches = conf.matches_at(text, pos, complete);
            let mut scanned = Vec::new();
            let mut bridges = Vec::new();
            for (idx, len) in matches {
                let name = conf.name_of(idx);
                if conf.is_ignored(name) {
                    bridges.push(len);
                } else {
                    let token = lines.token(text, name, pos, len);
                    scanned.push((len, states[pos].advanced_by_scan(&token, pos + len)));
                }
            }
            for (len, advanced) in scanned {
                states[pos + len].extend(advanced);
            }
            // Ignored input: everything alive here is alive after it too
            for len in bridges {
                let carried: Vec<_> = states[pos].iter().cloned().collect();
                for span in carried {
                    states[pos + len].push_shared(&span);
                }
            }
        }
        self.dump(&states);

        let roots = states[n].completed_roots(start, 0);
        if !roots.is_empty() {
            return Ok(ParseTrees(roots));
        }
        // Diagnose at the furthest position the chart reached
        let expected = expected_terminals(&states[last_alive]);
        if last_alive >= n {
            return Err(ParseError::UnexpectedEof { expected });
        }
        let (line, column) = lines.locate(last_alive);
        match text[last_alive..].chars().next() {
            Some(found) if conf.matches_at(text, last_alive, false).is_empty() => {
                Err(ParseError::UnexpectedCharacters {
                    found,
                    pos: last_alive,
                    line,
                    column,
                    allowed: expected,
                })
            }
            _ => Err(ParseError::UnexpectedInput { pos: last_alive }),
        }
    }
}

pub fn expected_terminals(set: &StateSet) -> BTreeSet<String> {
    set.iter()
        .filter_map(|span| match span.next_symbol() {
            Some(Symbol::Terminal(name)) => Some(name.clone()),
            _ => None,
        })
        .collect()
}

/// Byte offset -> (line, column) lookups for dynamic-mode tokens.
struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut starts = vec![0];
        for (i, c) in text.char_indices() {
            if c == '\n' {
                starts.push(i + 1);
            }
        }
        LineIndex { starts }
    }

    fn locate(&self, pos: usize) -> (usize, usize) {
        let line = match self.starts.binary_search(&pos) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        (line + 1, pos - self.starts[line] + 1)
    }

    fn token(&self, text: &str, kind: &str, pos: usize, len: usize) -> Token {
        let value = &text[pos..pos + len];
        let (line, column) = self.locate(pos);
        let (end_line, end_column) = self.locate(pos + len);
        Token {
            kind: kind.to_string(),
            value: value.to_string(),
            start_pos: pos,
            end_pos: pos + len,
            line,
            column,
            end_line,
            end_column,
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{GrammarBuilder, Pattern, RuleOptions, TerminalDef};

    fn tok(kind: &str, value: &str, pos: usize) -> Token {
        let mut t = Token::new(kind, value);
        t.start_pos = pos;
        t.end_pos = pos + value.len();
        t.column = pos + 1;
        t.end_column = t.column + value.len();
        t
    }

    // sum: sum PLUS num | num ; num: NUM
    fn arith() -> Grammar {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(TerminalDef::new("NUM", Pattern::Regex("[0-9]".into())));
        gb.add_terminal(TerminalDef::new("PLUS", Pattern::Str("+".into())));
        gb.add_rule(
            "sum",
            vec![
                Symbol::Rule("sum".into()),
                Symbol::Terminal("PLUS".into()),
                Symbol::Rule("num".into()),
            ],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "sum",
            vec![Symbol::Rule("num".into())],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "num",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        gb.into_grammar(vec!["sum".to_string()]).unwrap()
    }

    #[test]
    fn left_recursion_parses() {
        let g = arith();
        let parser = EarleyParser::new(&g, false);
        let tokens = vec![
            tok("NUM", "1", 0),
            tok("PLUS", "+", 1),
            tok("NUM", "2", 2),
            tok("PLUS", "+", 3),
            tok("NUM", "3", 4),
        ];
        let trees = parser.parse_tokens("sum", &tokens).unwrap();
        assert_eq!(trees.0.len(), 1);
    }

    #[test]
    fn right_recursion_parses() {
        // p: NUM CARET p | NUM
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(TerminalDef::new("NUM", Pattern::Regex("[0-9]".into())));
        gb.add_terminal(TerminalDef::new("CARET", Pattern::Str("^".into())));
        gb.add_rule(
            "p",
            vec![
                Symbol::Terminal("NUM".into()),
                Symbol::Terminal("CARET".into()),
                Symbol::Rule("p".into()),
            ],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "p",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["p".to_string()]).unwrap();
        let tokens = vec![tok("NUM", "1", 0), tok("CARET", "^", 1), tok("NUM", "2", 2)];
        EarleyParser::new(&g, false)
            .parse_tokens("p", &tokens)
            .unwrap();
    }

    #[test]
    fn empty_rules_parse_empty_input() {
        // a: <empty> | b ; b: a
        let mut gb = GrammarBuilder::default();
        gb.add_rule("a", vec![], None, RuleOptions::default());
        gb.add_rule(
            "a",
            vec![Symbol::Rule("b".into())],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "b",
            vec![Symbol::Rule("a".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["a".to_string()]).unwrap();
        EarleyParser::new(&g, false).parse_tokens("a", &[]).unwrap();
    }

    #[test]
    fn unexpected_token_reports_expected() {
        let g = arith();
        let tokens = vec![tok("NUM", "1", 0), tok("NUM", "2", 1)];
        let err = EarleyParser::new(&g, false)
            .parse_tokens("sum", &tokens)
            .unwrap_err();
        match err {
            ParseError::UnexpectedToken { expected, pos, .. } => {
                assert!(expected.contains("PLUS"));
                assert_eq!(pos, 1);
            }
            other => panic!("expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn eof_mid_derivation() {
        let g = arith();
        let tokens = vec![tok("NUM", "1", 0), tok("PLUS", "+", 1)];
        let err = EarleyParser::new(&g, false)
            .parse_tokens("sum", &tokens)
            .unwrap_err();
        match err {
            ParseError::UnexpectedEof { expected } => assert!(expected.contains("NUM")),
            other => panic!("expected UnexpectedEof, got {:?}", other),
        }
    }

    #[test]
    fn ambiguous_grammar_yields_roots() {
        // s: s s | B
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(TerminalDef::new("B", Pattern::Str("b".into())));
        gb.add_rule(
            "s",
            vec![Symbol::Rule("s".into()), Symbol::Rule("s".into())],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "s",
            vec![Symbol::Terminal("B".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["s".to_string()]).unwrap();
        let tokens = vec![tok("B", "b", 0), tok("B", "b", 1), tok("B", "b", 2)];
        let trees = EarleyParser::new(&g, false)
            .parse_tokens("s", &tokens)
            .unwrap();
        assert!(!trees.0.is_empty());
    }

    #[test]
    fn dynamic_scan_with_ignored_gaps() {
        let g = arith();
        // lexer knows the same terminals plus ignored whitespace
        let conf = {
            let mut gb = GrammarBuilder::default();
            gb.add_terminal(TerminalDef::new("NUM", Pattern::Regex("[0-9]".into())));
            gb.add_terminal(TerminalDef::new("PLUS", Pattern::Str("+".into())));
            gb.add_terminal(TerminalDef::new("WS", Pattern::Regex("\\s+".into())));
            gb.add_rule(
                "x",
                vec![Symbol::Terminal("NUM".into())],
                None,
                RuleOptions::default(),
            );
            gb.ignore("WS");
            let lg = gb.into_grammar(vec!["x".to_string()]).unwrap();
            LexerConf::new(&lg, true).unwrap()
        };
        let trees = EarleyParser::new(&g, false)
            .parse_dynamic("sum", &conf, "1 + 2", false)
            .unwrap();
        assert!(!trees.0.is_empty());
    }

    #[test]
    fn dynamic_lexical_ambiguity() {
        // start: a a | b ; a: "x" ; b: "xx" -- no sequential lexer can
        // decide between A and B at position 0
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(TerminalDef::new("A", Pattern::Str("x".into())));
        gb.add_terminal(TerminalDef::new("B", Pattern::Str("xx".into())));
        gb.add_rule(
            "start",
            vec![Symbol::Terminal("A".into()), Symbol::Terminal("A".into())],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "start",
            vec![Symbol::Terminal("B".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["start".to_string()]).unwrap();
        let conf = LexerConf::new(&g, true).unwrap();
        let trees = EarleyParser::new(&g, false)
            .parse_dynamic("start", &conf, "xx", false)
            .unwrap();
        // both derivations complete
        assert_eq!(trees.0.len(), 2);
    }
}
