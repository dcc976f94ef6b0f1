#![deny(warnings)]

use crate::errors::GrammarError;
use std::collections::HashMap;
use std::rc::Rc;
use std::{fmt, hash};

/// What a terminal matches. Literal strings stay distinguishable from
/// regexes because lexer ordering ranks literals above patterns.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pattern {
    Str(String),
    Regex(String),
    // %declare'd: supplied by external tooling, never matched by our lexers
    External,
}

impl Pattern {
    /// Render as an (unanchored) regex fragment.
    pub fn to_regex(&self) -> String {
        match self {
            Pattern::Str(s) => regex_escape(s),
            Pattern::Regex(r) => r.clone(),
            Pattern::External => String::new(),
        }
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Pattern::Str(_))
    }
}

/// Escape regex metacharacters so a literal matches itself.
pub fn regex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if "\\.+*?()|[]{}^$#&-~".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Clone, Debug)]
pub struct TerminalDef {
    pub name: String,
    pub pattern: Pattern,
    pub priority: i32,
    /// Matched tokens are dropped from tree children (anonymous literals
    /// and `_`-prefixed terminals) unless keep_all_tokens.
    pub filter_out: bool,
}

impl TerminalDef {
    pub fn new(name: impl Into<String>, pattern: Pattern) -> Self {
        let name = name.into();
        let filter_out = name.starts_with('_');
        TerminalDef {
            name,
            pattern,
            priority: 0,
            filter_out,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Symbols are resolved by name, never by pointer, so cyclic rule graphs
/// stay acyclic as data.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Rule(String),
    Terminal(String),
}

impl Symbol {
    pub fn name(&self) -> &str {
        match self {
            Symbol::Rule(name) => name,
            Symbol::Terminal(name) => name,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuleOptions {
    /// `!`-prefixed rules keep their anonymous/filtered tokens.
    pub keep_all_tokens: bool,
    /// `?`-prefixed: replaced by its only child when it has exactly one.
    pub expand1: bool,
    /// `_`-prefixed or generated: children spliced into the parent node.
    pub filter_out: bool,
    /// Empty match stands in as a placeholder slot (from `[..]` lowering).
    pub placeholder: bool,
    pub priority: i32,
}

pub struct Rule {
    pub id: usize,
    pub lhs: String,
    pub rhs: Vec<Symbol>,
    /// `-> name` on the expansion: the produced tree node uses this name.
    pub alias: Option<String>,
    pub options: RuleOptions,
}

impl Rule {
    /// Tree node name this rule produces.
    pub fn node_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.lhs)
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} -> {}",
            self.lhs,
            self.rhs
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(" ")
        )
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

// Rules are deduped by shape, not by id or options
impl PartialEq for Rule {
    fn eq(&self, other: &Rule) -> bool {
        self.lhs == other.lhs && self.rhs == other.rhs && self.alias == other.alias
    }
}

impl Eq for Rule {}

impl hash::Hash for Rule {
    fn hash<H: hash::Hasher>(&self, state: &mut H) {
        self.lhs.hash(state);
        self.rhs.hash(state);
    }
}

/// A fully lowered grammar: flat rules over named terminals. Built once,
/// immutable for the lifetime of the parser.
pub struct Grammar {
    pub terminals: Vec<TerminalDef>,
    pub rules: Vec<Rc<Rule>>,
    pub starts: Vec<String>,
    pub ignored: Vec<String>,
    by_lhs: HashMap<String, Vec<usize>>,
    term_index: HashMap<String, usize>,
}

impl Grammar {
    pub fn rules_for(&self, lhs: &str) -> impl Iterator<Item = &Rc<Rule>> {
        self.by_lhs
            .get(lhs)
            .into_iter()
            .flatten()
            .map(move |&i| &self.rules[i])
    }

    pub fn terminal(&self, name: &str) -> Option<&TerminalDef> {
        self.term_index.get(name).map(|&i| &self.terminals[i])
    }
}

impl fmt::Debug for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Starts: {}", self.starts.join(" "))?;
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        for term in &self.terminals {
            writeln!(f, "{}: {:?}", term.name, term.pattern)?;
        }
        Ok(())
    }
}

/// Builds a Grammar while validating symbol existence and duplicate rules.
#[derive(Default)]
pub struct GrammarBuilder {
    terminals: Vec<TerminalDef>,
    term_index: HashMap<String, usize>,
    rule_heads: HashMap<String, Vec<usize>>,
    rules: Vec<Rc<Rule>>,
    ignored: Vec<String>,
    error: Option<GrammarError>,
    anon_count: usize,
}

impl GrammarBuilder {
    pub fn add_terminal(&mut self, def: TerminalDef) {
        if self.term_index.contains_key(&def.name) {
            self.error = Some(GrammarError::DuplicateDefinition(def.name));
            return;
        }
        self.term_index.insert(def.name.clone(), self.terminals.len());
        self.terminals.push(def);
    }

    pub fn has_terminal(&self, name: &str) -> bool {
        self.term_index.contains_key(name)
    }

    /// Find a literal-pattern terminal matching this exact text.
    pub fn terminal_for_literal(&self, text: &str) -> Option<&TerminalDef> {
        self.terminals
            .iter()
            .find(|t| t.pattern == Pattern::Str(text.to_string()))
    }

    pub fn add_rule(
        &mut self,
        lhs: impl Into<String>,
        rhs: Vec<Symbol>,
        alias: Option<String>,
        options: RuleOptions,
    ) {
        let lhs = lhs.into();
        // NOTE: duplicate alternatives are kept; `a: "x" | "x"` must
        // surface as a reduce/reduce conflict, not vanish
        let rule = Rc::new(Rule {
            id: self.rules.len(),
            lhs: lhs.clone(),
            rhs,
            alias,
            options,
        });
        self.rule_heads.entry(lhs).or_default().push(rule.id);
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rc<Rule>] {
        &self.rules
    }

    pub fn ignored(&self) -> &[String] {
        &self.ignored
    }

    /// Drop terminals outside `keep`. Used after lowering: terminals that
    /// only fed other terminals' patterns have already been inlined.
    pub fn prune_terminals(&mut self, keep: &std::collections::HashSet<String>) {
        self.terminals.retain(|t| keep.contains(&t.name));
        self.term_index = self
            .terminals
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
    }

    pub fn ignore(&mut self, terminal: impl Into<String>) {
        let terminal = terminal.into();
        if !self.ignored.contains(&terminal) {
            self.ignored.push(terminal);
        }
    }

    /// Generate a name for a symbol built mechanically during lowering.
    /// The `_` prefix keeps generated nodes spliced out of trees.
    pub fn unique_symbol_name(&mut self, hint: &str) -> String {
        self.anon_count += 1;
        format!("_{}_{}", hint, self.anon_count - 1)
    }

    pub fn anon_terminal_name(&mut self) -> String {
        self.anon_count += 1;
        format!("__ANON_{}", self.anon_count - 1)
    }

    pub fn into_grammar(mut self, starts: Vec<String>) -> Result<Grammar, GrammarError> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        // Every symbol referenced by an expansion must exist
        for rule in &self.rules {
            for sym in &rule.rhs {
                let known = match sym {
                    Symbol::Rule(name) => self.rule_heads.contains_key(name),
                    Symbol::Terminal(name) => self.term_index.contains_key(name),
                };
                if !known {
                    return Err(GrammarError::UndefinedSymbol(sym.name().to_string()));
                }
            }
        }
        // Every start symbol must be a rule
        for start in &starts {
            if !self.rule_heads.contains_key(start) {
                return Err(GrammarError::UndefinedSymbol(start.clone()));
            }
        }
        // Ignored names must be terminals
        for name in &self.ignored {
            if !self.term_index.contains_key(name) {
                return Err(GrammarError::UndefinedSymbol(name.clone()));
            }
        }
        Ok(Grammar {
            terminals: self.terminals,
            by_lhs: self.rule_heads,
            rules: self.rules,
            starts,
            ignored: self.ignored,
            term_index: self.term_index,
        })
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn term(name: &str) -> TerminalDef {
        TerminalDef::new(name, Pattern::Str(name.to_lowercase()))
    }

    #[test]
    fn build_grammar() {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(term("NUM"));
        gb.add_terminal(term("PLUS"));
        gb.add_rule(
            "sum",
            vec![
                Symbol::Rule("sum".into()),
                Symbol::Terminal("PLUS".into()),
                Symbol::Terminal("NUM".into()),
            ],
            None,
            RuleOptions::default(),
        );
        gb.add_rule(
            "sum",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        let g = gb.into_grammar(vec!["sum".to_string()]).unwrap();
        assert_eq!(g.rules_for("sum").count(), 2);
        assert!(g.terminal("NUM").is_some());
    }

    #[test]
    fn missing_symbol() {
        let mut gb = GrammarBuilder::default();
        gb.add_rule(
            "sum",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        let err = gb.into_grammar(vec!["sum".to_string()]).unwrap_err();
        assert_eq!(err, GrammarError::UndefinedSymbol("NUM".to_string()));
    }

    #[test]
    fn missing_start() {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(term("NUM"));
        gb.add_rule(
            "sum",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        let err = gb.into_grammar(vec!["xum".to_string()]).unwrap_err();
        assert_eq!(err, GrammarError::UndefinedSymbol("xum".to_string()));
    }

    #[test]
    fn duplicate_terminal() {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(term("NUM"));
        gb.add_terminal(term("NUM"));
        gb.add_rule(
            "sum",
            vec![Symbol::Terminal("NUM".into())],
            None,
            RuleOptions::default(),
        );
        let err = gb.into_grammar(vec!["sum".to_string()]).unwrap_err();
        assert_eq!(err, GrammarError::DuplicateDefinition("NUM".to_string()));
    }

    #[test]
    fn duplicate_rules_kept() {
        let mut gb = GrammarBuilder::default();
        gb.add_terminal(term("NUM"));
        for _ in 0..2 {
            gb.add_rule(
                "sum",
                vec![Symbol::Terminal("NUM".into())],
                None,
                RuleOptions::default(),
            );
        }
        let g = gb.into_grammar(vec!["sum".to_string()]).unwrap();
        assert_eq!(g.rules_for("sum").count(), 2);
    }

    #[test]
    fn literal_escape() {
        assert_eq!(regex_escape("a+b"), "a\\+b");
        assert_eq!(regex_escape("(x)"), "\\(x\\)");
    }

    #[test]
    fn anon_names_are_filtered_by_convention() {
        let mut gb = GrammarBuilder::default();
        assert!(gb.unique_symbol_name("star").starts_with("_star_"));
        assert!(gb.anon_terminal_name().starts_with("__ANON_"));
        let def = TerminalDef::new("_HIDDEN", Pattern::Str("x".into()));
        assert!(def.filter_out);
        let def = TerminalDef::new("SHOWN", Pattern::Str("x".into()));
        assert!(!def.filter_out);
    }
}
