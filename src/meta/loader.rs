#![deny(warnings)]

use super::ast::*;
use super::parser::parse_grammar;
use crate::errors::GrammarError;
use std::collections::{HashMap, HashSet};

/// Built-in `common` import module: the usual numeric/string/whitespace
/// terminals, written against the host regex dialect (no lookarounds).
pub const COMMON_GRAMMAR: &str = r#"
DIGIT: /[0-9]/
HEXDIGIT: /[a-fA-F0-9]/

INT: DIGIT+
SIGNED_INT: /[+-]?/ INT
DECIMAL: INT "." INT? | "." INT

_EXP: ("e"|"E") SIGNED_INT
FLOAT: INT _EXP | DECIMAL _EXP?
SIGNED_FLOAT: /[+-]?/ FLOAT

NUMBER: FLOAT | INT
SIGNED_NUMBER: /[+-]?/ NUMBER

ESCAPED_STRING: /"(\\.|[^"\\])*"/

UCASE_LETTER: /[A-Z]/
LCASE_LETTER: /[a-z]/
LETTER: UCASE_LETTER | LCASE_LETTER
WORD: LETTER+
CNAME: ("_"|LETTER) ("_"|LETTER|DIGIT)*

CR: /\r/
LF: /\n/
NEWLINE: (CR? LF)+
WS_INLINE: (" "|/\t/)+
WS: /\s+/
"#;

/// Where `%import` roots come from. Passed at construction so there is no
/// process-wide grammar registry.
pub trait ImportResolver {
    /// Return the grammar source for a dotted module path, or None when
    /// the module is unknown.
    fn resolve(&self, path: &[String]) -> Option<String>;
}

/// Knows only the embedded `common` module.
pub struct DefaultResolver;

impl ImportResolver for DefaultResolver {
    fn resolve(&self, path: &[String]) -> Option<String> {
        match path {
            [only] if only == "common" => Some(COMMON_GRAMMAR.to_string()),
            _ => None,
        }
    }
}

/// A grammar with imports resolved and overrides applied: definition lists
/// ready for lowering. Templates stay unexpanded until their use sites are
/// seen.
#[derive(Debug, Default)]
pub struct LoadedGrammar {
    pub rules: Vec<RuleDef>,
    pub terms: Vec<TermDef>,
    pub templates: HashMap<String, RuleDef>,
    pub declares: Vec<String>,
    pub ignores: Vec<Atom>,
}

pub fn load(source: &str, resolver: &dyn ImportResolver) -> Result<LoadedGrammar, GrammarError> {
    let mut loading = Vec::new();
    load_module(source, resolver, &mut loading)
}

fn load_module(
    source: &str,
    resolver: &dyn ImportResolver,
    loading: &mut Vec<String>,
) -> Result<LoadedGrammar, GrammarError> {
    let ast = parse_grammar(source)?;
    let mut out = LoadedGrammar::default();
    for statement in ast.statements {
        match statement {
            Statement::Definition(def) => define(&mut out, def, false)?,
            Statement::Override(def) => override_def(&mut out, def)?,
            Statement::Extend(def) => extend_def(&mut out, def)?,
            Statement::Declare(names) => {
                for name in names {
                    if find_term(&out, &name).is_some() || out.declares.contains(&name) {
                        return Err(GrammarError::DuplicateDefinition(name));
                    }
                    out.declares.push(name);
                }
            }
            Statement::Ignore(atom) => out.ignores.push(atom),
            Statement::Import(spec) => import(&mut out, &spec, resolver, loading)?,
        }
    }
    Ok(out)
}

fn find_rule(g: &LoadedGrammar, name: &str) -> Option<usize> {
    g.rules.iter().position(|r| r.name == name)
}

fn find_term(g: &LoadedGrammar, name: &str) -> Option<usize> {
    g.terms.iter().position(|t| t.name == name)
}

fn defined(g: &LoadedGrammar, name: &str) -> bool {
    find_rule(g, name).is_some()
        || find_term(g, name).is_some()
        || g.templates.contains_key(name)
        || g.declares.iter().any(|d| d == name)
}

fn define(g: &mut LoadedGrammar, def: Definition, allow_dups: bool) -> Result<(), GrammarError> {
    if defined(g, def.name()) {
        if allow_dups {
            return Ok(());
        }
        return Err(GrammarError::DuplicateDefinition(def.name().to_string()));
    }
    match def {
        Definition::Rule(r) if !r.params.is_empty() => {
            g.templates.insert(r.name.clone(), r);
        }
        Definition::Rule(r) => g.rules.push(r),
        Definition::Term(t) => g.terms.push(t),
    }
    Ok(())
}

fn override_def(g: &mut LoadedGrammar, def: Definition) -> Result<(), GrammarError> {
    match def {
        Definition::Rule(r) => match find_rule(g, &r.name) {
            Some(i) => {
                g.rules[i] = r;
                Ok(())
            }
            None => Err(GrammarError::UndefinedSymbol(r.name)),
        },
        Definition::Term(t) => match find_term(g, &t.name) {
            Some(i) => {
                g.terms[i] = t;
                Ok(())
            }
            None => Err(GrammarError::UndefinedSymbol(t.name)),
        },
    }
}

fn extend_def(g: &mut LoadedGrammar, def: Definition) -> Result<(), GrammarError> {
    match def {
        Definition::Rule(r) => match find_rule(g, &r.name) {
            Some(i) => {
                g.rules[i].expansions.extend(r.expansions);
                Ok(())
            }
            None => Err(GrammarError::UndefinedSymbol(r.name)),
        },
        Definition::Term(t) => match find_term(g, &t.name) {
            Some(i) => {
                g.terms[i].expansions.extend(t.expansions);
                Ok(())
            }
            None => Err(GrammarError::UndefinedSymbol(t.name)),
        },
    }
}

fn import(
    g: &mut LoadedGrammar,
    spec: &ImportSpec,
    resolver: &dyn ImportResolver,
    loading: &mut Vec<String>,
) -> Result<(), GrammarError> {
    let module_key = spec.path.join(".");
    if loading.contains(&module_key) {
        return Err(GrammarError::ImportCycle(module_key));
    }
    let source = resolver
        .resolve(&spec.path)
        .ok_or_else(|| GrammarError::UnknownImport(module_key.clone()))?;
    loading.push(module_key.clone());
    let module = load_module(&source, resolver, loading)?;
    loading.pop();

    // Requested names keep their (possibly renamed) identity; transitive
    // dependencies come along under module-mangled names so they cannot
    // clash with local definitions.
    let mangle_prefix = format!("__{}__", spec.path.join("__"));
    let mut renames: HashMap<String, String> = HashMap::new();
    let mut queue: Vec<String> = Vec::new();
    for (name, rename) in &spec.names {
        if !module_defines(&module, name) {
            return Err(GrammarError::UnknownImport(format!(
                "{}.{}",
                module_key, name
            )));
        }
        renames.insert(name.clone(), rename.clone().unwrap_or_else(|| name.clone()));
        queue.push(name.clone());
    }
    let mut seen: HashSet<String> = queue.iter().cloned().collect();
    let mut order: Vec<String> = queue.clone();
    while let Some(name) = queue.pop() {
        for dep in module_refs(&module, &name) {
            if !module_defines(&module, &dep) || seen.contains(&dep) {
                continue;
            }
            seen.insert(dep.clone());
            order.push(dep.clone());
            renames
                .entry(dep.clone())
                .or_insert_with(|| format!("{}{}", mangle_prefix, dep));
            queue.push(dep.clone());
        }
    }

    // a dependency two imports share is the same definition twice; only
    // names the user asked for may clash
    let requested: HashSet<&str> = spec.names.iter().map(|(n, _)| n.as_str()).collect();
    for name in &order {
        let new_name = renames[name].clone();
        let dup_ok = !requested.contains(name.as_str());
        if let Some(i) = find_rule(&module, name) {
            let mut rule = module.rules[i].clone();
            rule.name = new_name;
            rename_expansions(&mut rule.expansions, &renames);
            define(g, Definition::Rule(rule), dup_ok)?;
        } else if let Some(i) = find_term(&module, name) {
            let mut term = module.terms[i].clone();
            term.name = new_name;
            rename_expansions(&mut term.expansions, &renames);
            define(g, Definition::Term(term), dup_ok)?;
        } else if let Some(template) = module.templates.get(name) {
            let mut template = template.clone();
            template.name = new_name;
            rename_expansions(&mut template.expansions, &renames);
            define(g, Definition::Rule(template), dup_ok)?;
        } else if module.declares.iter().any(|d| d == name) {
            if !g.declares.contains(&new_name) {
                g.declares.push(new_name);
            }
        }
        log::debug!("imported {}.{} as {}", module_key, name, renames[name]);
    }
    Ok(())
}

fn module_defines(module: &LoadedGrammar, name: &str) -> bool {
    defined(module, name)
}

/// Names referenced by a module-level definition, for dependency closure.
fn module_refs(module: &LoadedGrammar, name: &str) -> Vec<String> {
    let mut refs = Vec::new();
    let expansions = if let Some(i) = find_rule(module, name) {
        &module.rules[i].expansions
    } else if let Some(i) = find_term(module, name) {
        &module.terms[i].expansions
    } else if let Some(t) = module.templates.get(name) {
        &t.expansions
    } else {
        return refs;
    };
    collect_refs(expansions, &mut refs);
    refs
}

fn collect_refs(expansions: &Expansions, refs: &mut Vec<String>) {
    for alt in expansions {
        for item in &alt.items {
            collect_atom_refs(&item.atom, refs);
        }
    }
}

fn collect_atom_refs(atom: &Atom, refs: &mut Vec<String>) {
    match atom {
        Atom::RuleRef(n) | Atom::TermRef(n) => refs.push(n.clone()),
        Atom::Group(e) | Atom::Maybe(e) => collect_refs(e, refs),
        Atom::Template { name, args } => {
            refs.push(name.clone());
            for arg in args {
                collect_atom_refs(arg, refs);
            }
        }
        Atom::Literal { .. } | Atom::Pattern { .. } => (),
    }
}

fn rename_expansions(expansions: &mut Expansions, renames: &HashMap<String, String>) {
    for alt in expansions.iter_mut() {
        for item in alt.items.iter_mut() {
            rename_atom(&mut item.atom, renames);
        }
    }
}

fn rename_atom(atom: &mut Atom, renames: &HashMap<String, String>) {
    match atom {
        Atom::RuleRef(n) | Atom::TermRef(n) => {
            if let Some(new) = renames.get(n) {
                *n = new.clone();
            }
        }
        Atom::Group(e) | Atom::Maybe(e) => rename_expansions(e, renames),
        Atom::Template { name, args } => {
            if let Some(new) = renames.get(name) {
                *name = new.clone();
            }
            for arg in args {
                rename_atom(arg, renames);
            }
        }
        Atom::Literal { .. } | Atom::Pattern { .. } => (),
    }
}

///////////////////////////////////////////////////////////////////////////////
