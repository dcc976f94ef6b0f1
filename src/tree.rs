#![deny(warnings)]

use crate::grammar::{Grammar, Rule, Symbol};
use std::fmt;

/// A lexed token. Immutable once emitted. Lines and columns are 1-based;
/// end_column points one past the last character.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: String,
    pub value: String,
    pub start_pos: usize,
    pub end_pos: usize,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

impl Token {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Token {
            kind: kind.into(),
            value: value.into(),
            start_pos: 0,
            end_pos: 0,
            line: 1,
            column: 1,
            end_line: 1,
            end_column: 1,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Token({}, {:?})", self.kind, self.value)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Source span attached to a tree when propagate_positions is on.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Meta {
    pub start_pos: usize,
    pub end_pos: usize,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
}

/// One slot in a tree's children. Placeholder marks an absent optional
/// item when the parser runs with maybe_placeholders.
#[derive(Clone, PartialEq)]
pub enum Child {
    Tree(Tree),
    Token(Token),
    Placeholder,
}

impl Child {
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Child::Tree(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_token(&self) -> Option<&Token> {
        match self {
            Child::Token(t) => Some(t),
            _ => None,
        }
    }

    fn span(&self) -> Option<(Meta, Meta)> {
        match self {
            Child::Token(t) => {
                let m = Meta {
                    start_pos: t.start_pos,
                    end_pos: t.end_pos,
                    line: t.line,
                    column: t.column,
                    end_line: t.end_line,
                    end_column: t.end_column,
                };
                Some((m.clone(), m))
            }
            Child::Tree(t) => t.meta.clone().map(|m| (m.clone(), m)),
            Child::Placeholder => None,
        }
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Child::Tree(t) => t.fmt(f),
            Child::Token(t) => t.fmt(f),
            Child::Placeholder => write!(f, "None"),
        }
    }
}

/// Concrete parse tree node. `data` is the producing rule's name or alias.
#[derive(Clone, PartialEq)]
pub struct Tree {
    pub data: String,
    pub children: Vec<Child>,
    pub meta: Option<Meta>,
}

impl Tree {
    pub fn new(data: impl Into<String>, children: Vec<Child>) -> Self {
        Tree {
            data: data.into(),
            children,
            meta: None,
        }
    }

    /// Iterate direct child subtrees, skipping tokens and placeholders.
    pub fn subtrees(&self) -> impl Iterator<Item = &Tree> {
        self.children.iter().filter_map(|c| c.as_tree())
    }

    /// Iterate direct child tokens.
    pub fn tokens(&self) -> impl Iterator<Item = &Token> {
        self.children.iter().filter_map(|c| c.as_token())
    }

    /// All nodes of the tree, depth-first, parents before children.
    pub fn iter_subtrees(&self) -> Vec<&Tree> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(tree) = stack.pop() {
            out.push(tree);
            for sub in tree.subtrees() {
                stack.push(sub);
            }
        }
        out
    }

    pub fn pretty(&self) -> String {
        let mut out = String::new();
        self.pretty_helper("", &mut out);
        out
    }

    fn pretty_helper(&self, indent: &str, out: &mut String) {
        out.push_str(&format!("{}{}\n", indent, self.data));
        let deeper = format!("{}  ", indent);
        for child in &self.children {
            match child {
                Child::Tree(t) => t.pretty_helper(&deeper, out),
                Child::Token(t) => out.push_str(&format!("{}{:?}\n", deeper, t)),
                Child::Placeholder => out.push_str(&format!("{}None\n", deeper)),
            }
        }
    }
}

impl fmt::Debug for Tree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Tree({}, {:?})", self.data, self.children)
    }
}

///////////////////////////////////////////////////////////////////////////////

/// What to do with the child produced at each position of a rule's rhs.
#[derive(Clone, Copy, Debug, PartialEq)]
enum ChildPlan {
    Keep,
    /// Filtered terminal (anonymous literal, `_`-prefixed): dropped.
    Drop,
    /// Generated or `_`-prefixed rule: its children replace it.
    Splice,
}

struct RulePlan {
    node_name: String,
    children: Vec<ChildPlan>,
    expand1: bool,
    placeholder: bool,
}

/// Applies filter/inline/alias policy at reduce time. Both engines feed
/// every completed rule through this, so trees come out identical no
/// matter which engine produced them.
pub struct TreeBuilder {
    plans: Vec<RulePlan>,
    propagate_positions: bool,
    maybe_placeholders: bool,
}

impl TreeBuilder {
    pub fn new(
        grammar: &Grammar,
        keep_all_tokens: bool,
        propagate_positions: bool,
        maybe_placeholders: bool,
    ) -> Self {
        let plans = grammar
            .rules
            .iter()
            .map(|rule| {
                let keep_all = keep_all_tokens || rule.options.keep_all_tokens;
                let children = rule
                    .rhs
                    .iter()
                    .map(|sym| match sym {
                        Symbol::Terminal(name) => {
                            let filtered = grammar
                                .terminal(name)
                                .map(|t| t.filter_out)
                                .unwrap_or(false);
                            if filtered && !keep_all {
                                ChildPlan::Drop
                            } else {
                                ChildPlan::Keep
                            }
                        }
                        Symbol::Rule(name) => {
                            if name.starts_with('_') {
                                ChildPlan::Splice
                            } else {
                                ChildPlan::Keep
                            }
                        }
                    })
                    .collect();
                RulePlan {
                    node_name: rule.node_name().to_string(),
                    children,
                    expand1: rule.options.expand1 && rule.alias.is_none(),
                    placeholder: rule.options.placeholder,
                }
            })
            .collect();
        TreeBuilder {
            plans,
            propagate_positions,
            maybe_placeholders,
        }
    }

    /// Reduce one rule application. `children` holds exactly one entry per
    /// rhs symbol, in expansion order.
    pub fn build(&self, rule: &Rule, children: Vec<Child>) -> Child {
        let plan = &self.plans[rule.id];
        debug_assert_eq!(children.len(), plan.children.len());
        let mut kept = Vec::with_capacity(children.len());
        for (child, action) in children.into_iter().zip(&plan.children) {
            match action {
                ChildPlan::Drop => (),
                ChildPlan::Keep => kept.push(child),
                ChildPlan::Splice => match child {
                    Child::Tree(t) => kept.extend(t.children),
                    other => kept.push(other),
                },
            }
        }
        if plan.placeholder && self.maybe_placeholders && kept.is_empty() {
            kept.push(Child::Placeholder);
        }
        if plan.expand1 && kept.len() == 1 {
            return kept.pop().expect("one child");
        }
        let mut tree = Tree::new(plan.node_name.clone(), kept);
        if self.propagate_positions {
            tree.meta = span_of_children(&tree.children);
        }
        Child::Tree(tree)
    }
}

fn span_of_children(children: &[Child]) -> Option<Meta> {
    let mut first: Option<Meta> = None;
    let mut last: Option<Meta> = None;
    for child in children {
        if let Some((start, end)) = child.span() {
            if first.is_none() {
                first = Some(start);
            }
            last = Some(end);
        }
    }
    let (first, last) = (first?, last?);
    Some(Meta {
        start_pos: first.start_pos,
        end_pos: last.end_pos,
        line: first.line,
        column: first.column,
        end_line: last.end_line,
        end_column: last.end_column,
    })
}

///////////////////////////////////////////////////////////////////////////////
