#![deny(warnings)]

use super::parser::ParseTrees;
use super::spans::{BackPointer, Span};
use crate::tree::{Child, Tree, TreeBuilder};
use crate::{Ambiguity, PriorityMode};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Walks span backpointers bottom-up, reducing every completed rule
/// through the shared TreeBuilder. Alternative derivations of one
/// (symbol, start, end) meet here: kept under an `_ambig` node or scored
/// down to a single winner.
///
/// Scores accumulate: an alternative's score is its rule's priority plus
/// the scores of everything beneath it, so a priority deep in one
/// derivation still decides an ambiguity near the root.
pub struct ForestWalker<'a> {
    builder: &'a TreeBuilder,
    ambiguity: Ambiguity,
    priority: PriorityMode,
    scorer: Option<&'a dyn Fn(&Tree) -> isize>,
    memo: RefCell<HashMap<Vec<usize>, Slot>>,
}

#[derive(Clone)]
enum Slot {
    // guards against descending into a derivation that contains itself
    InProgress,
    Done(Child, i64),
}

impl<'a> ForestWalker<'a> {
    pub fn new(
        builder: &'a TreeBuilder,
        ambiguity: Ambiguity,
        priority: PriorityMode,
        scorer: Option<&'a dyn Fn(&Tree) -> isize>,
    ) -> Self {
        ForestWalker {
            builder,
            ambiguity,
            priority,
            scorer,
            memo: RefCell::new(HashMap::new()),
        }
    }

    /// Materialise the tree (or `_ambig` of trees) for a finished parse.
    pub fn extract(&self, trees: &ParseTrees) -> Child {
        self.node(&trees.0)
            .expect("BUG: complete parse has no acyclic derivation")
            .0
    }

    /// One tree child for a group of completed spans sharing
    /// (symbol, start, end), with its accumulated score. Returns None
    /// while the group is part of its own derivation chain.
    fn node(&self, group: &[Rc<Span>]) -> Option<(Child, i64)> {
        let mut key: Vec<usize> = group.iter().map(|s| Rc::as_ptr(s) as usize).collect();
        key.sort_unstable();
        key.dedup();
        match self.memo.borrow().get(&key) {
            Some(Slot::InProgress) => return None,
            Some(Slot::Done(child, score)) => return Some((child.clone(), *score)),
            None => (),
        }
        self.memo.borrow_mut().insert(key.clone(), Slot::InProgress);

        let mut alternatives: Vec<(Child, i64)> = Vec::new();
        for span in group {
            let own = self.effective_priority(span.rule.options.priority);
            for (children, below) in self.derivations(span) {
                let child = self.builder.build(&span.rule, children);
                let score = own + below;
                match alternatives.iter_mut().find(|(c, _)| *c == child) {
                    Some((_, existing)) => *existing = (*existing).max(score),
                    None => alternatives.push((child, score)),
                }
            }
        }
        if alternatives.is_empty() {
            // every derivation looped back; the caller drops this branch
            self.memo.borrow_mut().remove(&key);
            return None;
        }
        let result = if alternatives.len() == 1 {
            alternatives.pop().expect("one alternative")
        } else {
            match self.ambiguity {
                Ambiguity::Explicit => {
                    let best = alternatives.iter().map(|(_, s)| *s).max().expect("non-empty");
                    let tree = Tree::new(
                        "_ambig",
                        alternatives.into_iter().map(|(c, _)| c).collect(),
                    );
                    (Child::Tree(tree), best)
                }
                Ambiguity::Resolve => self.pick_best(alternatives),
            }
        };
        self.memo
            .borrow_mut()
            .insert(key, Slot::Done(result.0.clone(), result.1));
        Some(result)
    }

    /// All child sequences deriving `span` (with their summed scores),
    /// following backpointers left. Completion triggers for the same
    /// symbol and range group into one shared child.
    fn derivations(&self, span: &Rc<Span>) -> Vec<(Vec<Child>, i64)> {
        let sources = span.sources();
        if sources.is_empty() {
            return vec![(Vec::new(), 0)];
        }
        // group (source, trigger-symbol, trigger-range); triggers with
        // different rules are alternatives of one child slot
        let mut completions: Vec<(Rc<Span>, Vec<Rc<Span>>)> = Vec::new();
        let mut scans: Vec<(Rc<Span>, crate::tree::Token)> = Vec::new();
        for bp in sources.iter() {
            match bp {
                BackPointer::Complete(source, trigger) => {
                    let slot = completions.iter_mut().find(|(s, triggers)| {
                        Rc::ptr_eq(s, source)
                            && triggers[0].rule.lhs == trigger.rule.lhs
                            && triggers[0].start == trigger.start
                            && triggers[0].end == trigger.end
                    });
                    match slot {
                        Some((_, triggers)) => triggers.push(trigger.clone()),
                        None => completions.push((source.clone(), vec![trigger.clone()])),
                    }
                }
                BackPointer::Scan(source, token) => {
                    scans.push((source.clone(), token.clone()));
                }
            }
        }
        drop(sources);

        let mut out = Vec::new();
        for (source, triggers) in completions {
            if let Some((child, score)) = self.node(&triggers) {
                for (mut children, below) in self.derivations(&source) {
                    children.push(child.clone());
                    out.push((children, below + score));
                }
            }
        }
        for (source, token) in scans {
            for (mut children, below) in self.derivations(&source) {
                children.push(Child::Token(token.clone()));
                out.push((children, below));
            }
        }
        out.dedup_by(|a, b| a.0 == b.0);
        out
    }

    fn effective_priority(&self, priority: i32) -> i64 {
        match self.priority {
            PriorityMode::Normal => priority as i64,
            PriorityMode::Invert => -(priority as i64),
            PriorityMode::None => 0,
        }
    }

    fn pick_best(&self, alternatives: Vec<(Child, i64)>) -> (Child, i64) {
        if let Some(scorer) = self.scorer {
            return alternatives
                .into_iter()
                .max_by_key(|(child, _)| match child {
                    Child::Tree(t) => scorer(t),
                    _ => 0,
                })
                .expect("non-empty alternatives");
        }
        let mut best_idx = 0;
        let mut best_key = (i64::MIN, i64::MIN);
        for (i, (child, score)) in alternatives.iter().enumerate() {
            let key = (*score, -(count_ambig(child) as i64));
            // strictly-greater keeps the leftmost winner on ties
            if key > best_key {
                best_key = key;
                best_idx = i;
            }
        }
        alternatives
            .into_iter()
            .nth(best_idx)
            .expect("index in range")
    }
}

fn count_ambig(child: &Child) -> usize {
    match child {
        Child::Tree(tree) => {
            let own = usize::from(tree.data == "_ambig");
            own + tree.children.iter().map(count_ambig).sum::<usize>()
        }
        _ => 0,
    }
}

///////////////////////////////////////////////////////////////////////////////
