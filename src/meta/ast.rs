#![deny(warnings)]

/// Unexpanded grammar definitions, straight out of the grammar parser.
/// Loading (imports, overrides, templates) and lowering consume these.

#[derive(Clone, Debug, PartialEq)]
pub enum Atom {
    RuleRef(String),
    TermRef(String),
    Literal {
        text: String,
        case_insensitive: bool,
    },
    Pattern {
        pattern: String,
        flags: String,
    },
    /// `( ... )`
    Group(Expansions),
    /// `[ ... ]` -- optional, placeholder-aware
    Maybe(Expansions),
    /// `name{arg, ...}` template instantiation
    Template {
        name: String,
        args: Vec<Atom>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Op {
    Opt,
    Star,
    Plus,
    /// `~ n` or `~ n..m`
    Repeat(u32, Option<u32>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprItem {
    pub atom: Atom,
    pub op: Option<Op>,
}

/// One `|`-alternative: a sequence of items plus an optional `-> alias`.
#[derive(Clone, Debug, PartialEq)]
pub struct Alternative {
    pub items: Vec<ExprItem>,
    pub alias: Option<String>,
}

pub type Expansions = Vec<Alternative>;

#[derive(Clone, Debug, PartialEq)]
pub struct RuleDef {
    pub name: String,
    /// `?`-prefix: inline the node when it has exactly one child
    pub expand1: bool,
    /// `!`-prefix: keep every token this rule matches
    pub keep_all_tokens: bool,
    /// template parameters (`pair{key, value}: ...`)
    pub params: Vec<String>,
    pub priority: i32,
    pub expansions: Expansions,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TermDef {
    pub name: String,
    pub priority: i32,
    pub expansions: Expansions,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    Rule(RuleDef),
    Term(TermDef),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Rule(r) => &r.name,
            Definition::Term(t) => &t.name,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImportSpec {
    /// dotted module path, eg `["common"]`
    pub path: Vec<String>,
    /// true when written with a leading dot (resolver-relative)
    pub relative: bool,
    /// `(NAME, OTHER -> RENAMED)`; the single-name form
    /// `%import common.NUMBER -> N` also lands here
    pub names: Vec<(String, Option<String>)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Definition(Definition),
    Ignore(Atom),
    Import(ImportSpec),
    Declare(Vec<String>),
    Override(Definition),
    Extend(Definition),
}

/// A parsed grammar file: statements in source order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GrammarAst {
    pub statements: Vec<Statement>,
}

impl Alternative {
    #[allow(dead_code)]
    pub fn single(atom: Atom) -> Self {
        Alternative {
            items: vec![ExprItem { atom, op: None }],
            alias: None,
        }
    }
}
