#![deny(warnings)]

use super::ast::*;
use super::tokenizer::{MetaToken, MetaTokenizer, Tok};
use crate::errors::GrammarError;

/// Recursive-descent parser for the grammar language. Produces the raw
/// statement list; imports and sugar are handled downstream.
pub struct MetaParser {
    tokens: Vec<MetaToken>,
    pos: usize,
}

pub fn parse_grammar(source: &str) -> Result<GrammarAst, GrammarError> {
    let tokens = MetaTokenizer::tokenize(source)?;
    MetaParser { tokens, pos: 0 }.grammar()
}

impl MetaParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|t| &t.tok)
    }

    fn bump(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).map(|t| t.tok.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn error(&self, message: impl Into<String>) -> GrammarError {
        let (line, column) = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1));
        GrammarError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn accept(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), GrammarError> {
        if self.accept(&tok) {
            Ok(())
        } else {
            Err(self.error(format!("expected {:?}, found {:?}", tok, self.peek())))
        }
    }

    fn skip_newlines(&mut self) {
        while self.accept(&Tok::Newline) {}
    }

    fn grammar(&mut self) -> Result<GrammarAst, GrammarError> {
        let mut statements = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => break,
                Some(Tok::Directive(_)) => statements.push(self.directive()?),
                Some(Tok::RuleName(_)) | Some(Tok::TermName(_)) => {
                    statements.push(Statement::Definition(self.definition()?))
                }
                Some(other) => {
                    return Err(self.error(format!("expected definition, found {:?}", other)))
                }
            }
        }
        Ok(GrammarAst { statements })
    }

    fn directive(&mut self) -> Result<Statement, GrammarError> {
        let name = match self.bump() {
            Some(Tok::Directive(name)) => name,
            _ => unreachable!("caller checked"),
        };
        match name.as_str() {
            "ignore" => Ok(Statement::Ignore(self.atom()?)),
            "declare" => {
                let mut names = Vec::new();
                while let Some(Tok::TermName(_)) = self.peek() {
                    match self.bump() {
                        Some(Tok::TermName(n)) => names.push(n),
                        _ => unreachable!(),
                    }
                }
                if names.is_empty() {
                    return Err(self.error("%declare needs at least one terminal name"));
                }
                Ok(Statement::Declare(names))
            }
            "import" => self.import(),
            "override" => Ok(Statement::Override(self.definition()?)),
            "extend" => Ok(Statement::Extend(self.definition()?)),
            other => Err(self.error(format!("unknown directive: %{}", other))),
        }
    }

    fn import(&mut self) -> Result<Statement, GrammarError> {
        let relative = self.accept(&Tok::Dot);
        let mut path = vec![self.any_name()?];
        while self.accept(&Tok::Dot) {
            path.push(self.any_name()?);
        }
        if self.accept(&Tok::LParen) {
            // %import module (A, B -> C)
            let mut names = Vec::new();
            loop {
                let name = self.any_name()?;
                let rename = if self.accept(&Tok::Arrow) {
                    Some(self.any_name()?)
                } else {
                    None
                };
                names.push((name, rename));
                if !self.accept(&Tok::Comma) {
                    break;
                }
            }
            self.expect(Tok::RParen)?;
            Ok(Statement::Import(ImportSpec {
                path,
                relative,
                names,
            }))
        } else {
            // %import module.NAME [-> RENAMED]
            if path.len() < 2 {
                return Err(self.error("%import needs a dotted path or a name list"));
            }
            let name = path.pop().expect("len checked");
            let rename = if self.accept(&Tok::Arrow) {
                Some(self.any_name()?)
            } else {
                None
            };
            Ok(Statement::Import(ImportSpec {
                path,
                relative,
                names: vec![(name, rename)],
            }))
        }
    }

    fn any_name(&mut self) -> Result<String, GrammarError> {
        match self.bump() {
            Some(Tok::RuleName(n)) | Some(Tok::TermName(n)) => Ok(n),
            other => Err(self.error(format!("expected name, found {:?}", other))),
        }
    }

    fn definition(&mut self) -> Result<Definition, GrammarError> {
        match self.bump() {
            Some(Tok::RuleName(raw)) => {
                // strip `?` / `!` markers off the front of the name
                let prefix: String = raw.chars().take_while(|c| "?!".contains(*c)).collect();
                let expand1 = prefix.contains('?');
                let keep_all = prefix.contains('!');
                let name: String = raw[prefix.len()..].to_string();
                if name.is_empty() {
                    return Err(self.error("empty rule name"));
                }
                let params = self.rule_params()?;
                let priority = self.priority()?;
                self.expect(Tok::Colon)?;
                let expansions = self.expansions(false)?;
                Ok(Definition::Rule(RuleDef {
                    name,
                    expand1,
                    keep_all_tokens: keep_all,
                    params,
                    priority,
                    expansions,
                }))
            }
            Some(Tok::TermName(name)) => {
                let priority = self.priority()?;
                self.expect(Tok::Colon)?;
                let expansions = self.expansions(false)?;
                Ok(Definition::Term(TermDef {
                    name,
                    priority,
                    expansions,
                }))
            }
            other => Err(self.error(format!("expected definition name, found {:?}", other))),
        }
    }

    fn rule_params(&mut self) -> Result<Vec<String>, GrammarError> {
        if !self.accept(&Tok::LBrace) {
            return Ok(Vec::new());
        }
        let mut params = Vec::new();
        loop {
            match self.bump() {
                Some(Tok::RuleName(n)) | Some(Tok::TermName(n)) => params.push(n),
                other => return Err(self.error(format!("bad template parameter: {:?}", other))),
            }
            if !self.accept(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBrace)?;
        Ok(params)
    }

    fn priority(&mut self) -> Result<i32, GrammarError> {
        if !self.accept(&Tok::Dot) {
            return Ok(0);
        }
        match self.bump() {
            Some(Tok::Number(n)) => Ok(n as i32),
            other => Err(self.error(format!("expected priority number, found {:?}", other))),
        }
    }

    /// Alternatives separated by `|`. At top level a newline ends the
    /// definition unless the next non-blank token is a `|` continuation;
    /// inside groups newlines are insignificant.
    fn expansions(&mut self, in_group: bool) -> Result<Expansions, GrammarError> {
        let mut alternatives = vec![self.alternative(in_group)?];
        loop {
            if in_group {
                self.skip_newlines();
                if !self.accept(&Tok::Pipe) {
                    break;
                }
            } else {
                let backtrack = self.pos;
                self.skip_newlines();
                if !self.accept(&Tok::Pipe) {
                    self.pos = backtrack;
                    break;
                }
            }
            alternatives.push(self.alternative(in_group)?);
        }
        Ok(alternatives)
    }

    fn alternative(&mut self, in_group: bool) -> Result<Alternative, GrammarError> {
        let mut items = Vec::new();
        loop {
            if in_group {
                // newlines inside (...) are just whitespace
                while self.peek() == Some(&Tok::Newline) {
                    self.pos += 1;
                }
            }
            match self.peek() {
                None
                | Some(Tok::Newline)
                | Some(Tok::Pipe)
                | Some(Tok::RParen)
                | Some(Tok::RBracket)
                | Some(Tok::RBrace) => break,
                Some(Tok::Arrow) => {
                    self.pos += 1;
                    let alias = self.any_name()?;
                    return Ok(Alternative {
                        items,
                        alias: Some(alias),
                    });
                }
                _ => {
                    let atom = self.atom()?;
                    let op = self.op()?;
                    items.push(ExprItem { atom, op });
                }
            }
        }
        Ok(Alternative { items, alias: None })
    }

    fn op(&mut self) -> Result<Option<Op>, GrammarError> {
        if self.accept(&Tok::Question) {
            return Ok(Some(Op::Opt));
        }
        if self.accept(&Tok::Star) {
            return Ok(Some(Op::Star));
        }
        if self.accept(&Tok::Plus) {
            return Ok(Some(Op::Plus));
        }
        if self.accept(&Tok::Tilde) {
            let low = match self.bump() {
                Some(Tok::Number(n)) if n >= 0 => n as u32,
                other => {
                    return Err(self.error(format!("expected repeat count, found {:?}", other)))
                }
            };
            let high = if self.accept(&Tok::DotDot) {
                match self.bump() {
                    Some(Tok::Number(n)) if n >= low as i64 => Some(n as u32),
                    other => {
                        return Err(
                            self.error(format!("expected repeat upper bound, found {:?}", other))
                        )
                    }
                }
            } else {
                None
            };
            return Ok(Some(Op::Repeat(low, high)));
        }
        Ok(None)
    }

    fn atom(&mut self) -> Result<Atom, GrammarError> {
        match self.bump() {
            Some(Tok::LParen) => {
                let inner = self.expansions(true)?;
                self.expect(Tok::RParen)?;
                Ok(Atom::Group(inner))
            }
            Some(Tok::LBracket) => {
                let inner = self.expansions(true)?;
                self.expect(Tok::RBracket)?;
                Ok(Atom::Maybe(inner))
            }
            Some(Tok::Literal {
                text,
                case_insensitive,
            }) => Ok(Atom::Literal {
                text,
                case_insensitive,
            }),
            Some(Tok::Pattern { pattern, flags }) => Ok(Atom::Pattern { pattern, flags }),
            Some(Tok::TermName(name)) => Ok(Atom::TermRef(name)),
            Some(Tok::RuleName(name)) => {
                if name.starts_with(|c| c == '?' || c == '!') {
                    return Err(self.error(format!("modifier prefix outside definition: {}", name)));
                }
                if self.accept(&Tok::LBrace) {
                    let mut args = vec![self.atom()?];
                    while self.accept(&Tok::Comma) {
                        args.push(self.atom()?);
                    }
                    self.expect(Tok::RBrace)?;
                    Ok(Atom::Template { name, args })
                } else {
                    Ok(Atom::RuleRef(name))
                }
            }
            other => Err(self.error(format!("expected atom, found {:?}", other))),
        }
    }
}

///////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(ast: &GrammarAst, name: &str) -> RuleDef {
        ast.statements
            .iter()
            .find_map(|s| match s {
                Statement::Definition(Definition::Rule(r)) if r.name == name => Some(r.clone()),
                _ => None,
            })
            .unwrap_or_else(|| panic!("no rule {}", name))
    }

    #[test]
    fn hello_grammar() {
        let ast = parse_grammar(
            "start: WORD \",\" WORD \"!\"\n\
             WORD: /\\w+/\n\
             %ignore \" \"\n",
        )
        .unwrap();
        assert_eq!(ast.statements.len(), 3);
        let start = rule(&ast, "start");
        assert_eq!(start.expansions.len(), 1);
        assert_eq!(start.expansions[0].items.len(), 4);
    }

    #[test]
    fn alternatives_and_alias() {
        let ast = parse_grammar("expr: expr \"+\" term -> add\n    | term\n").unwrap();
        let expr = rule(&ast, "expr");
        assert_eq!(expr.expansions.len(), 2);
        assert_eq!(expr.expansions[0].alias.as_deref(), Some("add"));
        assert_eq!(expr.expansions[1].alias, None);
    }

    #[test]
    fn modifiers_and_priority() {
        let ast = parse_grammar("?sum.2: a\n!keep: b\n").unwrap();
        let sum = rule(&ast, "sum");
        assert!(sum.expand1);
        assert_eq!(sum.priority, 2);
        let keep = rule(&ast, "keep");
        assert!(keep.keep_all_tokens);
        assert!(!keep.expand1);
    }

    #[test]
    fn repetition_ops() {
        let ast = parse_grammar("r: a? b* c+ d ~ 2 e ~ 1..3\n").unwrap();
        let r = rule(&ast, "r");
        let ops: Vec<_> = r.expansions[0].items.iter().map(|i| i.op.clone()).collect();
        assert_eq!(
            ops,
            vec![
                Some(Op::Opt),
                Some(Op::Star),
                Some(Op::Plus),
                Some(Op::Repeat(2, None)),
                Some(Op::Repeat(1, Some(3))),
            ]
        );
    }

    #[test]
    fn groups_span_lines() {
        let ast = parse_grammar("r: (a\n  | b)\n").unwrap();
        let r = rule(&ast, "r");
        match &r.expansions[0].items[0].atom {
            Atom::Group(alts) => assert_eq!(alts.len(), 2),
            other => panic!("expected group, got {:?}", other),
        }
    }

    #[test]
    fn import_forms() {
        let ast = parse_grammar(
            "%import common.NUMBER\n\
             %import common.WS -> WHITE\n\
             %import common (INT, FLOAT -> F)\n",
        )
        .unwrap();
        let imports: Vec<_> = ast
            .statements
            .iter()
            .filter_map(|s| match s {
                Statement::Import(i) => Some(i.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(imports.len(), 3);
        assert_eq!(imports[0].path, vec!["common"]);
        assert_eq!(imports[0].names, vec![("NUMBER".to_string(), None)]);
        assert_eq!(
            imports[1].names,
            vec![("WS".to_string(), Some("WHITE".to_string()))]
        );
        assert_eq!(imports[2].names.len(), 2);
    }

    #[test]
    fn templates() {
        let ast = parse_grammar("pair{k, v}: k \":\" v\nstart: pair{STRING, NUMBER}\n").unwrap();
        let pair = rule(&ast, "pair");
        assert_eq!(pair.params, vec!["k", "v"]);
        let start = rule(&ast, "start");
        match &start.expansions[0].items[0].atom {
            Atom::Template { name, args } => {
                assert_eq!(name, "pair");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected template, got {:?}", other),
        }
    }

    #[test]
    fn override_and_extend() {
        let ast = parse_grammar("%override WORD: /[a-z]+/\n%extend r: x\n").unwrap();
        assert!(matches!(&ast.statements[0], Statement::Override(_)));
        assert!(matches!(&ast.statements[1], Statement::Extend(_)));
    }

    #[test]
    fn syntax_error_has_position() {
        let err = parse_grammar("start: )").unwrap_err();
        match err {
            GrammarError::Syntax { line, .. } => assert_eq!(line, 1),
            other => panic!("expected syntax error, got {:?}", other),
        }
    }
}
