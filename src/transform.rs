#![deny(warnings)]

use crate::errors::VisitError;
use crate::tree::{Child, Token, Tree};
use std::collections::HashMap;

type ChildrenFn<'a, T> = Box<dyn Fn(Vec<T>) -> Result<T, String> + 'a>;
type TreeFn<'a, T> = Box<dyn Fn(&Tree, Vec<T>) -> Result<T, String> + 'a>;

enum Handler<'a, T> {
    Children(ChildrenFn<'a, T>),
    WithTree(TreeFn<'a, T>),
}

/// Bottom-up rewrite over a finished tree. Handlers are registered per
/// rule name (the tree's `data`); each receives its already-transformed
/// children and returns the replacement value. The root's value is the
/// result.
pub struct Transformer<'a, T> {
    handlers: HashMap<String, Handler<'a, T>>,
    token_handler: Box<dyn Fn(&Token) -> Result<T, String> + 'a>,
    default_handler: Option<Box<dyn Fn(&str, Vec<T>) -> Result<T, String> + 'a>>,
    placeholder_value: Option<Box<dyn Fn() -> T + 'a>>,
}

impl<'a, T> Transformer<'a, T> {
    pub fn new(token_handler: impl Fn(&Token) -> Result<T, String> + 'a) -> Self {
        Transformer {
            handlers: HashMap::new(),
            token_handler: Box::new(token_handler),
            default_handler: None,
            placeholder_value: None,
        }
    }

    /// Register the rewrite for one rule name.
    pub fn action(&mut self, rule: &str, action: impl Fn(Vec<T>) -> Result<T, String> + 'a) {
        self.handlers
            .insert(rule.to_string(), Handler::Children(Box::new(action)));
    }

    /// Same, but the handler also sees the tree node (for meta access).
    pub fn action_with_tree(
        &mut self,
        rule: &str,
        action: impl Fn(&Tree, Vec<T>) -> Result<T, String> + 'a,
    ) {
        self.handlers
            .insert(rule.to_string(), Handler::WithTree(Box::new(action)));
    }

    /// Fallback for rules with no registered handler.
    pub fn default_action(&mut self, action: impl Fn(&str, Vec<T>) -> Result<T, String> + 'a) {
        self.default_handler = Some(Box::new(action));
    }

    /// Value standing in for absent optional items (maybe_placeholders).
    pub fn placeholder(&mut self, value: impl Fn() -> T + 'a) {
        self.placeholder_value = Some(Box::new(value));
    }

    pub fn transform(&self, tree: &Tree) -> Result<T, VisitError> {
        let mut children = Vec::with_capacity(tree.children.len());
        for child in &tree.children {
            children.push(match child {
                Child::Tree(sub) => self.transform(sub)?,
                Child::Token(token) => (self.token_handler)(token)
                    .map_err(|e| VisitError::new(&tree.data, e))?,
                Child::Placeholder => match &self.placeholder_value {
                    Some(value) => value(),
                    None => {
                        return Err(VisitError::new(
                            &tree.data,
                            "placeholder child but no placeholder value registered",
                        ))
                    }
                },
            });
        }
        let result = match self.handlers.get(&tree.data) {
            Some(Handler::Children(f)) => f(children),
            Some(Handler::WithTree(f)) => f(tree, children),
            None => match &self.default_handler {
                Some(f) => f(&tree.data, children),
                None => Err(format!("no handler for rule: {}", tree.data)),
            },
        };
        result.map_err(|e| VisitError::new(&tree.data, e))
    }
}

///////////////////////////////////////////////////////////////////////////////

/// Walks a tree invoking a handler per rule name; nothing is rebuilt.
pub struct Visitor<'a> {
    handlers: HashMap<String, Box<dyn FnMut(&Tree) + 'a>>,
    default_handler: Option<Box<dyn FnMut(&Tree) + 'a>>,
}

impl<'a> Visitor<'a> {
    pub fn new() -> Self {
        Visitor {
            handlers: HashMap::new(),
            default_handler: None,
        }
    }

    pub fn on(&mut self, rule: &str, handler: impl FnMut(&Tree) + 'a) {
        self.handlers.insert(rule.to_string(), Box::new(handler));
    }

    pub fn on_default(&mut self, handler: impl FnMut(&Tree) + 'a) {
        self.default_handler = Some(Box::new(handler));
    }

    fn call(&mut self, tree: &Tree) {
        match self.handlers.get_mut(&tree.data) {
            Some(handler) => handler(tree),
            None => {
                if let Some(handler) = &mut self.default_handler {
                    handler(tree);
                }
            }
        }
    }

    /// Parents before children.
    pub fn visit_topdown(&mut self, tree: &Tree) {
        self.call(tree);
        for sub in tree.subtrees() {
            self.visit_topdown(sub);
        }
    }

    /// Children before parents.
    pub fn visit_bottomup(&mut self, tree: &Tree) {
        for sub in tree.subtrees() {
            self.visit_bottomup(sub);
        }
        self.call(tree);
    }
}

impl<'a> Default for Visitor<'a> {
    fn default() -> Self {
        Visitor::new()
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn num(value: &str) -> Child {
        Child::Token(Token::new("NUMBER", value))
    }

    // sum(product(2 3) product(4))
    fn sample() -> Tree {
        Tree::new(
            "sum",
            vec![
                Child::Tree(Tree::new("product", vec![num("2"), num("3")])),
                Child::Tree(Tree::new("product", vec![num("4")])),
            ],
        )
    }

    #[test]
    fn bottom_up_rewrite() {
        let mut t: Transformer<f64> = Transformer::new(|tok| {
            tok.value.parse::<f64>().map_err(|e| e.to_string())
        });
        t.action("product", |xs| Ok(xs.into_iter().product()));
        t.action("sum", |xs| Ok(xs.into_iter().sum()));
        assert_eq!(t.transform(&sample()).unwrap(), 10.0);
    }

    #[test]
    fn missing_handler_is_visit_error() {
        let t: Transformer<f64> = Transformer::new(|_| Ok(0.0));
        let err = t.transform(&sample()).unwrap_err();
        assert_eq!(err.rule, "product");
        assert!(err.message.contains("no handler"));
    }

    #[test]
    fn handler_failure_carries_rule() {
        let mut t: Transformer<f64> = Transformer::new(|_| Ok(0.0));
        t.action("product", |_| Err("nope".to_string()));
        t.action("sum", |xs| Ok(xs.into_iter().sum()));
        let err = t.transform(&sample()).unwrap_err();
        assert_eq!(err.rule, "product");
        assert_eq!(err.message, "nope");
    }

    #[test]
    fn default_action_catches_rest() {
        let mut t: Transformer<usize> = Transformer::new(|_| Ok(1));
        t.default_action(|_, xs| Ok(xs.into_iter().sum()));
        assert_eq!(t.transform(&sample()).unwrap(), 3);
    }

    #[test]
    fn placeholder_value() {
        let tree = Tree::new("opt", vec![Child::Placeholder]);
        let mut t: Transformer<i64> = Transformer::new(|_| Ok(0));
        t.placeholder(|| -1);
        t.action("opt", |xs| Ok(xs[0]));
        assert_eq!(t.transform(&tree).unwrap(), -1);
    }

    #[test]
    fn visitor_orders() {
        let mut order = Vec::new();
        {
            let mut v = Visitor::new();
            v.on_default(|t| order.push(format!("down:{}", t.data)));
            v.visit_topdown(&sample());
        }
        assert_eq!(order[0], "down:sum");

        let mut order = Vec::new();
        {
            let mut v = Visitor::new();
            v.on_default(|t| order.push(t.data.clone()));
            v.visit_bottomup(&sample());
        }
        assert_eq!(order.last().unwrap(), "sum");
    }

    #[test]
    fn action_with_tree_sees_node() {
        let mut t: Transformer<String> = Transformer::new(|tok| Ok(tok.value.clone()));
        t.default_action(|_, xs| Ok(xs.join(" ")));
        t.action_with_tree("sum", |tree, xs| {
            Ok(format!("{}({})", tree.data, xs.join(", ")))
        });
        assert_eq!(t.transform(&sample()).unwrap(), "sum(2 3, 4)");
    }
}
