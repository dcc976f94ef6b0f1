#![deny(warnings)]

use super::ast::*;
use super::loader::LoadedGrammar;
use crate::errors::GrammarError;
use crate::grammar::{regex_escape, Grammar, GrammarBuilder, Pattern, RuleOptions, Symbol, TerminalDef};
use std::collections::{HashMap, HashSet};

/// Desugars loaded definitions into the flat rule set: repetition and
/// grouping become generated `_`-rules, literals become terminals, and
/// template instantiations become ordinary rules. After this pass every
/// expansion is a plain symbol sequence.
pub fn lower(loaded: LoadedGrammar, starts: Vec<String>) -> Result<Grammar, GrammarError> {
    Lowerer::new(&loaded)?.run(&loaded, starts)
}

struct Lowerer {
    gb: GrammarBuilder,
    /// compiled regex text for every named terminal
    term_defs: HashMap<String, TermDef>,
    /// literal text -> terminal name, for collapsing repeats
    literal_names: HashMap<(String, bool), String>,
    /// template instantiation key -> generated rule name
    instances: HashMap<String, String>,
    /// anonymous literals outrank every user terminal
    anon_priority: i32,
}

impl Lowerer {
    fn new(loaded: &LoadedGrammar) -> Result<Self, GrammarError> {
        let term_defs: HashMap<String, TermDef> = loaded
            .terms
            .iter()
            .map(|t| (t.name.clone(), t.clone()))
            .collect();
        let anon_priority = loaded.terms.iter().map(|t| t.priority).max().unwrap_or(0) + 1;
        Ok(Lowerer {
            gb: GrammarBuilder::default(),
            term_defs,
            literal_names: HashMap::new(),
            instances: HashMap::new(),
            anon_priority,
        })
    }

    fn run(mut self, loaded: &LoadedGrammar, starts: Vec<String>) -> Result<Grammar, GrammarError> {
        // Terminals first: rules promote literals against this set
        for term in &loaded.terms {
            let pattern = self.term_pattern(term)?;
            let def = TerminalDef::new(term.name.clone(), pattern).with_priority(term.priority);
            self.gb.add_terminal(def);
        }
        for name in &loaded.declares {
            self.gb
                .add_terminal(TerminalDef::new(name.clone(), Pattern::External));
        }

        for rule in &loaded.rules {
            self.lower_rule_def(rule, loaded)?;
        }

        for atom in &loaded.ignores {
            let name = match atom {
                Atom::TermRef(name) => name.clone(),
                Atom::Literal {
                    text,
                    case_insensitive,
                } => self.literal_terminal(text, *case_insensitive),
                Atom::Pattern { pattern, flags } => {
                    let mut def = TerminalDef::new(
                        self.gb.anon_terminal_name(),
                        Pattern::Regex(wrap_flags(pattern, flags)),
                    );
                    def.filter_out = false;
                    let name = def.name.clone();
                    self.gb.add_terminal(def);
                    name
                }
                other => {
                    return Err(GrammarError::BadTerminal {
                        name: format!("{:?}", other),
                        reason: "%ignore takes a terminal, literal or pattern".to_string(),
                    })
                }
            };
            self.gb.ignore(name);
        }

        self.prune_unused_terminals(loaded);
        self.gb.into_grammar(starts)
    }

    /// Terminals never used by a rule, never ignored and never %declare'd
    /// only existed to be inlined into other terminals; keep them out of
    /// the lexer.
    fn prune_unused_terminals(&mut self, loaded: &LoadedGrammar) {
        let mut keep: HashSet<String> = loaded.declares.iter().cloned().collect();
        for rule in self.gb.rules() {
            for sym in &rule.rhs {
                if let Symbol::Terminal(name) = sym {
                    keep.insert(name.clone());
                }
            }
        }
        for name in self.gb.ignored() {
            keep.insert(name.clone());
        }
        self.gb.prune_terminals(&keep);
    }

    ///////////////////////////////////////////////////////////////////////
    // Terminal compilation: a terminal's expansions collapse into one
    // regex, inlining references to other terminals.

    fn term_pattern(&self, term: &TermDef) -> Result<Pattern, GrammarError> {
        // A bare literal stays a literal so the lexer can rank it above
        // regex terminals of equal priority
        if let [Alternative { items, alias: None }] = term.expansions.as_slice() {
            if let [ExprItem {
                atom:
                    Atom::Literal {
                        text,
                        case_insensitive: false,
                    },
                op: None,
            }] = items.as_slice()
            {
                return Ok(Pattern::Str(text.clone()));
            }
        }
        let mut stack = vec![term.name.clone()];
        let regex = self.expansions_regex(&term.name, &term.expansions, &mut stack)?;
        Ok(Pattern::Regex(regex))
    }

    fn expansions_regex(
        &self,
        owner: &str,
        expansions: &Expansions,
        stack: &mut Vec<String>,
    ) -> Result<String, GrammarError> {
        let mut alts = Vec::new();
        for alt in expansions {
            if alt.alias.is_some() {
                return Err(GrammarError::BadTerminal {
                    name: owner.to_string(),
                    reason: "aliases are not allowed inside terminals".to_string(),
                });
            }
            let mut parts = Vec::new();
            for item in &alt.items {
                let atom = self.atom_regex(owner, &item.atom, stack)?;
                parts.push(match &item.op {
                    None => atom,
                    Some(Op::Opt) => format!("(?:{})?", atom),
                    Some(Op::Star) => format!("(?:{})*", atom),
                    Some(Op::Plus) => format!("(?:{})+", atom),
                    Some(Op::Repeat(n, None)) => format!("(?:{}){{{}}}", atom, n),
                    Some(Op::Repeat(n, Some(m))) => format!("(?:{}){{{},{}}}", atom, n, m),
                });
            }
            alts.push(parts.concat());
        }
        if alts.len() == 1 {
            Ok(alts.pop().expect("one alternative"))
        } else {
            Ok(format!("(?:{})", alts.join("|")))
        }
    }

    fn atom_regex(
        &self,
        owner: &str,
        atom: &Atom,
        stack: &mut Vec<String>,
    ) -> Result<String, GrammarError> {
        match atom {
            Atom::Literal {
                text,
                case_insensitive: false,
            } => Ok(regex_escape(text)),
            Atom::Literal {
                text,
                case_insensitive: true,
            } => Ok(format!("(?i:{})", regex_escape(text))),
            Atom::Pattern { pattern, flags } => Ok(wrap_flags(pattern, flags)),
            Atom::Group(inner) => {
                let body = self.expansions_regex(owner, inner, stack)?;
                Ok(format!("(?:{})", body))
            }
            Atom::Maybe(inner) => {
                let body = self.expansions_regex(owner, inner, stack)?;
                Ok(format!("(?:{})?", body))
            }
            Atom::TermRef(name) => {
                if stack.contains(name) {
                    return Err(GrammarError::BadTerminal {
                        name: name.clone(),
                        reason: "terminal is defined in terms of itself".to_string(),
                    });
                }
                let def = self.term_defs.get(name).ok_or_else(|| {
                    GrammarError::UndefinedSymbol(name.clone())
                })?;
                stack.push(name.clone());
                let body = self.expansions_regex(name, &def.expansions, stack)?;
                stack.pop();
                Ok(format!("(?:{})", body))
            }
            Atom::RuleRef(name) => Err(GrammarError::BadTerminal {
                name: owner.to_string(),
                reason: format!("terminal references rule {}", name),
            }),
            Atom::Template { .. } => Err(GrammarError::BadTerminal {
                name: owner.to_string(),
                reason: "templates are not allowed inside terminals".to_string(),
            }),
        }
    }

    ///////////////////////////////////////////////////////////////////////
    // Rule lowering

    fn lower_rule_def(&mut self, def: &RuleDef, loaded: &LoadedGrammar) -> Result<(), GrammarError> {
        let options = RuleOptions {
            keep_all_tokens: def.keep_all_tokens,
            expand1: def.expand1,
            filter_out: def.name.starts_with('_'),
            placeholder: false,
            priority: def.priority,
        };
        for alt in &def.expansions {
            let rhs = self.lower_items(&alt.items, loaded)?;
            self.gb
                .add_rule(def.name.clone(), rhs, alt.alias.clone(), options.clone());
        }
        Ok(())
    }

    fn lower_items(
        &mut self,
        items: &[ExprItem],
        loaded: &LoadedGrammar,
    ) -> Result<Vec<Symbol>, GrammarError> {
        let mut rhs = Vec::new();
        for item in items {
            self.lower_item(item, loaded, &mut rhs)?;
        }
        Ok(rhs)
    }

    fn lower_item(
        &mut self,
        item: &ExprItem,
        loaded: &LoadedGrammar,
        rhs: &mut Vec<Symbol>,
    ) -> Result<(), GrammarError> {
        match &item.op {
            None => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                rhs.push(sym);
            }
            Some(Op::Opt) => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                rhs.push(self.option_rule(sym, false));
            }
            Some(Op::Star) => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                rhs.push(self.repeat_rule(sym, false));
            }
            Some(Op::Plus) => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                rhs.push(self.repeat_rule(sym, true));
            }
            Some(Op::Repeat(n, None)) => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                for _ in 0..*n {
                    rhs.push(sym.clone());
                }
            }
            Some(Op::Repeat(n, Some(m))) => {
                let sym = self.lower_atom(&item.atom, loaded)?;
                let name = self.gb.unique_symbol_name("rep");
                let options = RuleOptions {
                    filter_out: true,
                    ..Default::default()
                };
                for count in *n..=*m {
                    let body = vec![sym.clone(); count as usize];
                    self.gb.add_rule(name.clone(), body, None, options.clone());
                }
                rhs.push(Symbol::Rule(name));
            }
        }
        Ok(())
    }

    fn lower_atom(&mut self, atom: &Atom, loaded: &LoadedGrammar) -> Result<Symbol, GrammarError> {
        match atom {
            Atom::TermRef(name) => Ok(Symbol::Terminal(name.clone())),
            Atom::RuleRef(name) => {
                if loaded.templates.contains_key(name) {
                    return Err(GrammarError::BadOptions(format!(
                        "template {} used without arguments",
                        name
                    )));
                }
                Ok(Symbol::Rule(name.clone()))
            }
            Atom::Literal {
                text,
                case_insensitive,
            } => Ok(Symbol::Terminal(
                self.literal_terminal(text, *case_insensitive),
            )),
            Atom::Pattern { pattern, flags } => {
                // inline regexes carry variable content, so unlike string
                // literals their tokens stay in the tree
                let mut def = TerminalDef::new(
                    self.gb.anon_terminal_name(),
                    Pattern::Regex(wrap_flags(pattern, flags)),
                );
                def.filter_out = false;
                let name = def.name.clone();
                self.gb.add_terminal(def);
                Ok(Symbol::Terminal(name))
            }
            Atom::Group(expansions) => {
                // a single-alternative group is just a sequence; splice it
                // in place without a generated rule
                if let [only] = expansions.as_slice() {
                    if only.alias.is_none() && only.items.len() == 1 {
                        let only_item = only.items[0].clone();
                        let mut sub = Vec::new();
                        self.lower_item(&only_item, loaded, &mut sub)?;
                        if sub.len() == 1 {
                            return Ok(sub.pop().expect("one symbol"));
                        }
                    }
                }
                let name = self.gb.unique_symbol_name("group");
                self.anon_rule(&name, expansions, loaded, false)?;
                Ok(Symbol::Rule(name))
            }
            Atom::Maybe(expansions) => {
                let name = self.gb.unique_symbol_name("maybe");
                self.anon_rule(&name, expansions, loaded, true)?;
                // the empty production makes the whole thing optional
                self.gb.add_rule(
                    name.clone(),
                    Vec::new(),
                    None,
                    RuleOptions {
                        filter_out: true,
                        placeholder: true,
                        ..Default::default()
                    },
                );
                Ok(Symbol::Rule(name))
            }
            Atom::Template { name, args } => self.instantiate_template(name, args, loaded),
        }
    }

    /// Generated rule holding each alternative of a group-like atom.
    fn anon_rule(
        &mut self,
        name: &str,
        expansions: &Expansions,
        loaded: &LoadedGrammar,
        placeholder: bool,
    ) -> Result<(), GrammarError> {
        for alt in expansions {
            let rhs = self.lower_items(&alt.items, loaded)?;
            self.gb.add_rule(
                name.to_string(),
                rhs,
                alt.alias.clone(),
                RuleOptions {
                    filter_out: true,
                    placeholder,
                    ..Default::default()
                },
            );
        }
        Ok(())
    }

    /// `sym?` as a generated rule: matches sym or nothing.
    fn option_rule(&mut self, sym: Symbol, placeholder: bool) -> Symbol {
        let name = self.gb.unique_symbol_name("opt");
        let options = RuleOptions {
            filter_out: true,
            placeholder,
            ..Default::default()
        };
        self.gb.add_rule(name.clone(), vec![sym], None, options.clone());
        self.gb.add_rule(name.clone(), Vec::new(), None, options);
        Symbol::Rule(name)
    }

    /// `sym*` / `sym+` as a left-recursive generated rule, LALR-friendly.
    fn repeat_rule(&mut self, sym: Symbol, at_least_one: bool) -> Symbol {
        let name = self.gb.unique_symbol_name(if at_least_one { "plus" } else { "star" });
        let options = RuleOptions {
            filter_out: true,
            ..Default::default()
        };
        let base = if at_least_one {
            vec![sym.clone()]
        } else {
            Vec::new()
        };
        self.gb.add_rule(name.clone(), base, None, options.clone());
        self.gb.add_rule(
            name.clone(),
            vec![Symbol::Rule(name.clone()), sym],
            None,
            options,
        );
        Symbol::Rule(name)
    }

    fn instantiate_template(
        &mut self,
        name: &str,
        args: &[Atom],
        loaded: &LoadedGrammar,
    ) -> Result<Symbol, GrammarError> {
        let template = loaded
            .templates
            .get(name)
            .ok_or_else(|| GrammarError::UndefinedSymbol(name.to_string()))?
            .clone();
        if template.params.len() != args.len() {
            return Err(GrammarError::BadOptions(format!(
                "template {} takes {} arguments, got {}",
                name,
                template.params.len(),
                args.len()
            )));
        }
        let key = format!("{}{{{:?}}}", name, args);
        if let Some(existing) = self.instances.get(&key) {
            return Ok(Symbol::Rule(existing.clone()));
        }
        let filtered = name.starts_with('_');
        let instance = format!(
            "{}tmpl_{}_{}",
            if filtered { "_" } else { "" },
            name.trim_start_matches('_'),
            self.instances.len()
        );
        self.instances.insert(key, instance.clone());

        let substitution: HashMap<&str, &Atom> = template
            .params
            .iter()
            .map(String::as_str)
            .zip(args.iter())
            .collect();
        let options = RuleOptions {
            keep_all_tokens: template.keep_all_tokens,
            expand1: template.expand1,
            filter_out: filtered,
            placeholder: false,
            priority: template.priority,
        };
        for alt in &template.expansions {
            let mut alt = alt.clone();
            for item in alt.items.iter_mut() {
                substitute_atom(&mut item.atom, &substitution);
            }
            let rhs = self.lower_items(&alt.items, loaded)?;
            // instances keep the template's name on their tree nodes
            let alias = alt
                .alias
                .clone()
                .or_else(|| (!filtered).then(|| name.to_string()));
            self.gb.add_rule(instance.clone(), rhs, alias, options.clone());
        }
        Ok(Symbol::Rule(instance))
    }

    ///////////////////////////////////////////////////////////////////////
    // Literal promotion

    fn literal_terminal(&mut self, text: &str, case_insensitive: bool) -> String {
        if let Some(name) = self
            .literal_names
            .get(&(text.to_string(), case_insensitive))
        {
            return name.clone();
        }
        // A user terminal already matching this exact literal wins
        if !case_insensitive {
            if let Some(def) = self.gb.terminal_for_literal(text) {
                let name = def.name.clone();
                self.literal_names
                    .insert((text.to_string(), case_insensitive), name.clone());
                return name;
            }
        }
        let name = self.name_for_literal(text);
        let pattern = if case_insensitive {
            Pattern::Regex(format!("(?i:{})", regex_escape(text)))
        } else {
            Pattern::Str(text.to_string())
        };
        let mut def = TerminalDef::new(name.clone(), pattern).with_priority(self.anon_priority);
        // inline literals never show up in trees unless asked for
        def.filter_out = true;
        self.gb.add_terminal(def);
        self.literal_names
            .insert((text.to_string(), case_insensitive), name.clone());
        name
    }

    fn name_for_literal(&mut self, text: &str) -> String {
        let candidate = if !text.is_empty() && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            let upper = text.to_uppercase();
            if upper.chars().next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false) {
                Some(upper)
            } else {
                None
            }
        } else if text.chars().count() == 1 {
            punct_name(text.chars().next().expect("one char")).map(str::to_string)
        } else {
            None
        };
        match candidate {
            Some(name) if !self.gb.has_terminal(&name) => name,
            _ => self.gb.anon_terminal_name(),
        }
    }
}

fn substitute_atom(atom: &mut Atom, substitution: &HashMap<&str, &Atom>) {
    match atom {
        Atom::RuleRef(n) | Atom::TermRef(n) => {
            if let Some(replacement) = substitution.get(n.as_str()) {
                *atom = (*replacement).clone();
            }
        }
        Atom::Group(e) | Atom::Maybe(e) => {
            for alt in e.iter_mut() {
                for item in alt.items.iter_mut() {
                    substitute_atom(&mut item.atom, substitution);
                }
            }
        }
        Atom::Template { args, .. } => {
            for arg in args.iter_mut() {
                substitute_atom(arg, substitution);
            }
        }
        Atom::Literal { .. } | Atom::Pattern { .. } => (),
    }
}

fn wrap_flags(pattern: &str, flags: &str) -> String {
    // `u` is the host default; the remaining flags map straight through
    let flags: String = flags.chars().filter(|c| "imsx".contains(*c)).collect();
    if flags.is_empty() {
        format!("(?:{})", pattern)
    } else {
        format!("(?{}:{})", flags, pattern)
    }
}

fn punct_name(c: char) -> Option<&'static str> {
    Some(match c {
        '.' => "DOT",
        ',' => "COMMA",
        ':' => "COLON",
        ';' => "SEMICOLON",
        '+' => "PLUS",
        '-' => "MINUS",
        '*' => "STAR",
        '/' => "SLASH",
        '\\' => "BACKSLASH",
        '|' => "VBAR",
        '?' => "QMARK",
        '!' => "BANG",
        '@' => "AT",
        '#' => "HASH",
        '$' => "DOLLAR",
        '%' => "PERCENT",
        '^' => "CIRCUMFLEX",
        '&' => "AMPERSAND",
        '_' => "UNDERSCORE",
        '<' => "LESSTHAN",
        '>' => "MORETHAN",
        '=' => "EQUAL",
        '"' => "DBLQUOTE",
        '\'' => "QUOTE",
        '`' => "BACKQUOTE",
        '~' => "TILDE",
        '(' => "LPAR",
        ')' => "RPAR",
        '{' => "LBRACE",
        '}' => "RBRACE",
        '[' => "LSQB",
        ']' => "RSQB",
        '\n' => "NEWLINE",
        '\t' => "TAB",
        ' ' => "SPACE",
        _ => return None,
    })
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::loader::{load, DefaultResolver};

    fn lowered(source: &str) -> Grammar {
        let loaded = load(source, &DefaultResolver).unwrap();
        lower(loaded, vec!["start".to_string()]).unwrap()
    }

    #[test]
    fn hello_lowering() {
        let g = lowered("start: WORD \",\" WORD \"!\"\nWORD: /\\w+/\n%ignore \" \"\n");
        // WORD + promoted comma/bang/space literals
        assert!(g.terminal("WORD").is_some());
        assert!(g.terminal("COMMA").is_some());
        assert!(g.terminal("BANG").is_some());
        assert_eq!(g.ignored.len(), 1);
        let start: Vec<_> = g.rules_for("start").collect();
        assert_eq!(start.len(), 1);
        assert_eq!(start[0].rhs.len(), 4);
        // promoted literals outrank user terminals
        assert!(g.terminal("COMMA").unwrap().priority > g.terminal("WORD").unwrap().priority);
        assert!(g.terminal("COMMA").unwrap().filter_out);
    }

    #[test]
    fn star_becomes_left_recursion() {
        let g = lowered("start: item*\nitem: \"x\"\n");
        let aux = g
            .rules
            .iter()
            .find(|r| r.lhs.starts_with("_star"))
            .expect("generated star rule");
        assert!(aux.options.filter_out);
        let alts: Vec<_> = g.rules_for(&aux.lhs).collect();
        assert_eq!(alts.len(), 2);
        // one empty, one left-recursive
        assert!(alts.iter().any(|r| r.rhs.is_empty()));
        assert!(alts
            .iter()
            .any(|r| r.rhs.first() == Some(&Symbol::Rule(aux.lhs.clone()))));
    }

    #[test]
    fn plus_keeps_base_case() {
        let g = lowered("start: item+\nitem: \"x\"\n");
        let aux = g
            .rules
            .iter()
            .find(|r| r.lhs.starts_with("_plus"))
            .expect("generated plus rule");
        let alts: Vec<_> = g.rules_for(&aux.lhs).collect();
        assert_eq!(alts.len(), 2);
        assert!(alts.iter().all(|r| !r.rhs.is_empty()));
    }

    #[test]
    fn maybe_gets_placeholder_flag() {
        let g = lowered("start: [item]\nitem: \"x\"\n");
        let aux = g
            .rules
            .iter()
            .find(|r| r.lhs.starts_with("_maybe"))
            .expect("generated maybe rule");
        let empty = g
            .rules_for(&aux.lhs)
            .find(|r| r.rhs.is_empty())
            .expect("empty production");
        assert!(empty.options.placeholder);
    }

    #[test]
    fn exact_repeat_inlines() {
        let g = lowered("start: \"x\" ~ 3\n");
        let start: Vec<_> = g.rules_for("start").collect();
        assert_eq!(start[0].rhs.len(), 3);
    }

    #[test]
    fn ranged_repeat_enumerates() {
        let g = lowered("start: \"x\" ~ 1..3\n");
        let aux = g
            .rules
            .iter()
            .find(|r| r.lhs.starts_with("_rep"))
            .expect("generated repeat rule");
        let lens: Vec<_> = g.rules_for(&aux.lhs).map(|r| r.rhs.len()).collect();
        assert_eq!(lens, vec![1, 2, 3]);
    }

    #[test]
    fn alias_carried() {
        let g = lowered("start: \"a\" -> first | \"b\"\n");
        let aliases: Vec<_> = g.rules_for("start").map(|r| r.alias.clone()).collect();
        assert!(aliases.contains(&Some("first".to_string())));
        assert!(aliases.contains(&None));
    }

    #[test]
    fn terminal_composition() {
        let g = lowered("start: AB\nAB: A B+\nA: \"a\"\nB: /b/\n");
        match &g.terminal("AB").unwrap().pattern {
            Pattern::Regex(r) => {
                assert!(r.starts_with("(?:a)"));
                assert!(r.ends_with('+'));
            }
            other => panic!("expected regex, got {:?}", other),
        }
        // A and B only feed AB; the lexer never sees them
        assert!(g.terminal("A").is_none());
        assert!(g.terminal("B").is_none());
    }

    #[test]
    fn recursive_terminal_rejected() {
        let loaded = load("start: A\nA: \"x\" A?\n", &DefaultResolver).unwrap();
        let err = lower(loaded, vec!["start".to_string()]).unwrap_err();
        assert!(matches!(err, GrammarError::BadTerminal { .. }));
    }

    #[test]
    fn import_common_number() {
        let g = lowered("start: NUMBER\n%import common.NUMBER\n");
        assert!(g.terminal("NUMBER").is_some());
        // dependencies were inlined and pruned
        assert!(g.terminal("__common__FLOAT").is_none());
    }

    #[test]
    fn template_instantiation() {
        let g = lowered("pair{k, v}: k \":\" v\nstart: pair{A, B}\nA: \"a\"\nB: \"b\"\n");
        let start: Vec<_> = g.rules_for("start").collect();
        let inst = match &start[0].rhs[0] {
            Symbol::Rule(name) => name.clone(),
            other => panic!("expected rule ref, got {:?}", other),
        };
        assert!(inst.starts_with("tmpl_pair"));
        let inst_rules: Vec<_> = g.rules_for(&inst).collect();
        assert_eq!(inst_rules[0].alias.as_deref(), Some("pair"));
        assert_eq!(inst_rules[0].rhs.len(), 3);
    }

    #[test]
    fn identical_literals_collapse() {
        let g = lowered("start: a b\na: \"x\"\nb: \"x\"\n");
        let x_terms: Vec<_> = g
            .terminals
            .iter()
            .filter(|t| t.pattern == Pattern::Str("x".to_string()))
            .collect();
        assert_eq!(x_terms.len(), 1);
    }

    #[test]
    fn user_terminal_wins_for_matching_literal() {
        let g = lowered("DASH: \"-\"\nstart: \"-\" WORD\nWORD: /\\w+/\n");
        let start: Vec<_> = g.rules_for("start").collect();
        assert_eq!(start[0].rhs[0], Symbol::Terminal("DASH".to_string()));
    }
}
