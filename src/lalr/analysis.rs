#![deny(warnings)]

use crate::errors::{ConflictKind, GrammarError};
use crate::grammar::{Grammar, Symbol};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// End-of-input lookahead.
pub const END: &str = "$END";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Shift(usize),
    /// rule id in the lowered grammar
    Reduce(usize),
    Accept,
}

/// Immutable LALR(1) tables for one start symbol.
#[derive(Debug)]
pub struct LalrTables {
    #[allow(dead_code)]
    pub start: String,
    actions: Vec<BTreeMap<String, Action>>,
    gotos: Vec<HashMap<String, usize>>,
}

impl LalrTables {
    pub fn action(&self, state: usize, terminal: &str) -> Option<Action> {
        self.actions[state].get(terminal).copied()
    }

    pub fn goto(&self, state: usize, nonterm: &str) -> Option<usize> {
        self.gotos[state].get(nonterm).copied()
    }

    /// Terminals with any action in this state ($END included); what the
    /// contextual lexer may produce and what error messages list.
    pub fn expected(&self, state: usize) -> BTreeSet<String> {
        self.actions[state].keys().cloned().collect()
    }

    #[allow(dead_code)]
    pub fn state_count(&self) -> usize {
        self.actions.len()
    }
}

/// Dotted-rule position inside the LR(0) automaton. Rule indices point
/// into `Analysis::rules`; the last entry is the synthetic root.
type Item = (usize, usize);

struct Analysis<'g> {
    grammar: &'g Grammar,
    /// (lhs, rhs) per rule; index == grammar rule id, root appended
    rules: Vec<(String, Vec<Symbol>)>,
    root: usize,
    by_lhs: HashMap<String, Vec<usize>>,
    nullable: BTreeSet<String>,
    /// closed item set per state
    states: Vec<BTreeSet<Item>>,
    trans: Vec<HashMap<Symbol, usize>>,
}

pub fn build_tables(grammar: &Grammar, start: &str) -> Result<LalrTables, GrammarError> {
    let mut analysis = Analysis::new(grammar, start);
    analysis.build_automaton();
    analysis.fill_tables(start)
}

impl<'g> Analysis<'g> {
    fn new(grammar: &'g Grammar, start: &str) -> Self {
        let mut rules: Vec<(String, Vec<Symbol>)> = grammar
            .rules
            .iter()
            .map(|r| (r.lhs.clone(), r.rhs.clone()))
            .collect();
        let root = rules.len();
        rules.push(("$root".to_string(), vec![Symbol::Rule(start.to_string())]));
        let mut by_lhs: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, (lhs, _)) in rules.iter().enumerate() {
            by_lhs.entry(lhs.clone()).or_default().push(i);
        }
        let nullable = compute_nullable(&rules);
        Analysis {
            grammar,
            rules,
            root,
            by_lhs,
            nullable,
            states: Vec::new(),
            trans: Vec::new(),
        }
    }

    fn closure(&self, kernel: &BTreeSet<Item>) -> BTreeSet<Item> {
        let mut items = kernel.clone();
        let mut frontier: Vec<Item> = items.iter().copied().collect();
        while let Some((rule, dot)) = frontier.pop() {
            if let Some(Symbol::Rule(name)) = self.rules[rule].1.get(dot) {
                for &sub in self.by_lhs.get(name).into_iter().flatten() {
                    if items.insert((sub, 0)) {
                        frontier.push((sub, 0));
                    }
                }
            }
        }
        items
    }

    fn build_automaton(&mut self) {
        let kernel0: BTreeSet<Item> = [(self.root, 0)].into_iter().collect();
        let mut kernel_index: HashMap<BTreeSet<Item>, usize> = HashMap::new();
        kernel_index.insert(kernel0.clone(), 0);
        self.states.push(self.closure(&kernel0));
        self.trans.push(HashMap::new());

        let mut pending = vec![0usize];
        while let Some(state) = pending.pop() {
            // group advanceable items by the symbol after the dot
            let mut kernels: BTreeMap<Symbol, BTreeSet<Item>> = BTreeMap::new();
            for &(rule, dot) in &self.states[state] {
                if let Some(sym) = self.rules[rule].1.get(dot) {
                    kernels
                        .entry(sym.clone())
                        .or_default()
                        .insert((rule, dot + 1));
                }
            }
            for (sym, kernel) in kernels {
                let target = match kernel_index.get(&kernel) {
                    Some(&idx) => idx,
                    None => {
                        let idx = self.states.len();
                        kernel_index.insert(kernel.clone(), idx);
                        self.states.push(self.closure(&kernel));
                        self.trans.push(HashMap::new());
                        pending.push(idx);
                        idx
                    }
                };
                self.trans[state].insert(sym, target);
            }
        }
    }

    fn goto(&self, state: usize, sym: &Symbol) -> Option<usize> {
        self.trans[state].get(sym).copied()
    }

    /// DeRemer–Pennello: Read via the `reads` relation, Follow via
    /// `includes`, lookaheads via `lookback`, each union computed with
    /// one digraph traversal.
    fn fill_tables(&self, start: &str) -> Result<LalrTables, GrammarError> {
        // nonterminal transitions, indexed
        let mut nt_trans: Vec<(usize, String)> = Vec::new();
        let mut nt_index: HashMap<(usize, String), usize> = HashMap::new();
        for (state, trans) in self.trans.iter().enumerate() {
            for sym in trans.keys() {
                if let Symbol::Rule(name) = sym {
                    nt_index.insert((state, name.clone()), nt_trans.len());
                    nt_trans.push((state, name.clone()));
                }
            }
        }

        // DR(p,A): terminals shiftable straight out of GOTO(p,A)
        let dr: Vec<BTreeSet<String>> = nt_trans
            .iter()
            .map(|(p, a)| {
                let r = self.goto(*p, &Symbol::Rule(a.clone())).expect("transition");
                let mut set: BTreeSet<String> = self.trans[r]
                    .keys()
                    .filter_map(|sym| match sym {
                        Symbol::Terminal(t) => Some(t.clone()),
                        _ => None,
                    })
                    .collect();
                if *p == 0 && a == start {
                    set.insert(END.to_string());
                }
                set
            })
            .collect();

        // reads: (p,A) -> (r,C) with C nullable out of r = GOTO(p,A)
        let reads: Vec<Vec<usize>> = nt_trans
            .iter()
            .map(|(p, a)| {
                let r = self.goto(*p, &Symbol::Rule(a.clone())).expect("transition");
                self.trans[r]
                    .keys()
                    .filter_map(|sym| match sym {
                        Symbol::Rule(c) if self.nullable.contains(c) => {
                            nt_index.get(&(r, c.clone())).copied()
                        }
                        _ => None,
                    })
                    .collect()
            })
            .collect();
        let read = digraph(&reads, &dr);

        // includes and lookback, both from walking each rule's rhs out of
        // every state carrying its lhs transition
        let mut includes: Vec<Vec<usize>> = vec![Vec::new(); nt_trans.len()];
        let mut lookback: HashMap<(usize, usize), Vec<usize>> = HashMap::new();
        for (nt, (p, b)) in nt_trans.iter().enumerate() {
            for &rule in self.by_lhs.get(b).into_iter().flatten() {
                let rhs = &self.rules[rule].1;
                let mut q = *p;
                for (i, sym) in rhs.iter().enumerate() {
                    if let Symbol::Rule(a) = sym {
                        let tail_nullable = rhs[i + 1..]
                            .iter()
                            .all(|s| matches!(s, Symbol::Rule(n) if self.nullable.contains(n)));
                        if tail_nullable {
                            if let Some(&inner) = nt_index.get(&(q, a.clone())) {
                                includes[inner].push(nt);
                            }
                        }
                    }
                    q = self.goto(q, sym).expect("path follows closure items");
                }
                lookback.entry((q, rule)).or_default().push(nt);
            }
        }
        let mut follow = read;
        digraph_merge(&includes, &mut follow);

        // action/goto tables
        let mut actions: Vec<BTreeMap<String, Action>> =
            vec![BTreeMap::new(); self.states.len()];
        let mut gotos: Vec<HashMap<String, usize>> = vec![HashMap::new(); self.states.len()];
        for (state, trans) in self.trans.iter().enumerate() {
            for (sym, &target) in trans {
                match sym {
                    Symbol::Terminal(t) => {
                        actions[state].insert(t.clone(), Action::Shift(target));
                    }
                    Symbol::Rule(n) => {
                        gotos[state].insert(n.clone(), target);
                    }
                }
            }
        }
        for (state, items) in self.states.iter().enumerate() {
            for &(rule, dot) in items {
                if dot < self.rules[rule].1.len() {
                    continue;
                }
                if rule == self.root {
                    self.insert_action(
                        &mut actions[state],
                        state,
                        END.to_string(),
                        Action::Accept,
                    )?;
                    continue;
                }
                let mut la: BTreeSet<String> = BTreeSet::new();
                for &nt in lookback.get(&(state, rule)).into_iter().flatten() {
                    la.extend(follow[nt].iter().cloned());
                }
                for t in la {
                    self.insert_action(&mut actions[state], state, t, Action::Reduce(rule))?;
                }
            }
        }
        Ok(LalrTables {
            start: start.to_string(),
            actions,
            gotos,
        })
    }

    fn insert_action(
        &self,
        row: &mut BTreeMap<String, Action>,
        state: usize,
        lookahead: String,
        action: Action,
    ) -> Result<(), GrammarError> {
        let existing = match row.get(&lookahead) {
            None => {
                row.insert(lookahead, action);
                return Ok(());
            }
            Some(&e) => e,
        };
        match (existing, action) {
            (a, b) if a == b => Ok(()),
            (Action::Shift(_), Action::Reduce(rule)) | (Action::Reduce(rule), Action::Shift(_)) => {
                // only an explicit rule priority settles shift/reduce
                let priority = self.grammar.rules[rule].options.priority;
                if priority > 0 {
                    row.insert(lookahead, Action::Reduce(rule));
                    Ok(())
                } else if priority < 0 {
                    let shift = if matches!(existing, Action::Shift(_)) {
                        existing
                    } else {
                        action
                    };
                    row.insert(lookahead, shift);
                    Ok(())
                } else {
                    Err(GrammarError::LalrConflict {
                        kind: ConflictKind::ShiftReduce,
                        state,
                        lookahead,
                        detail: format!("rule: {}", self.grammar.rules[rule]),
                    })
                }
            }
            (Action::Reduce(a), Action::Reduce(b)) => Err(GrammarError::LalrConflict {
                kind: ConflictKind::ReduceReduce,
                state,
                lookahead,
                detail: format!(
                    "rules: {} / {}",
                    self.grammar.rules[a], self.grammar.rules[b]
                ),
            }),
            // accept vs reduce on $END (eg: a unit-cyclic start rule)
            (a, b) => Err(GrammarError::LalrConflict {
                kind: ConflictKind::ReduceReduce,
                state,
                lookahead,
                detail: format!("{:?} vs {:?}", a, b),
            }),
        }
    }
}

fn compute_nullable(rules: &[(String, Vec<Symbol>)]) -> BTreeSet<String> {
    let mut nullable = BTreeSet::new();
    let mut changed = true;
    while changed {
        changed = false;
        for (lhs, rhs) in rules {
            if nullable.contains(lhs) {
                continue;
            }
            let all_nullable = rhs
                .iter()
                .all(|s| matches!(s, Symbol::Rule(n) if nullable.contains(n)));
            if all_nullable {
                nullable.insert(lhs.clone());
                changed = true;
            }
        }
    }
    nullable
}

/// The DeRemer–Pennello digraph traversal: union `sets` over the
/// transitive closure of `edges`, SCC members sharing one result.
fn digraph(edges: &[Vec<usize>], sets: &[BTreeSet<String>]) -> Vec<BTreeSet<String>> {
    let mut out = sets.to_vec();
    digraph_merge(edges, &mut out);
    out
}

fn digraph_merge(edges: &[Vec<usize>], sets: &mut [BTreeSet<String>]) {
    let n = sets.len();
    let mut marks = vec![0usize; n];
    let mut stack = Vec::new();
    for x in 0..n {
        if marks[x] == 0 {
            traverse(x, edges, sets, &mut marks, &mut stack);
        }
    }
}

fn traverse(
    x: usize,
    edges: &[Vec<usize>],
    sets: &mut [BTreeSet<String>],
    marks: &mut [usize],
    stack: &mut Vec<usize>,
) {
    stack.push(x);
    let depth = stack.len();
    marks[x] = depth;
    for i in 0..edges[x].len() {
        let y = edges[x][i];
        if marks[y] == 0 {
            traverse(y, edges, sets, marks, stack);
        }
        marks[x] = marks[x].min(marks[y]);
        let merged: Vec<String> = sets[y].iter().cloned().collect();
        sets[x].extend(merged);
    }
    if marks[x] == depth {
        loop {
            let top = stack.pop().expect("x is on the stack");
            marks[top] = usize::MAX;
            if top == x {
                break;
            }
            sets[top] = sets[x].clone();
        }
    }
}

///////////////////////////////////////////////////////////////////////////////
