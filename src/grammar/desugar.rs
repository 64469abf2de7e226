//! Lowers rule combinators into plain productions.
//!
//! Every `seq`/`choice`/`repeat`/`optional` is rewritten into auxiliary
//! hidden non-terminals, and `token(...)` bodies are folded into single
//! regex patterns, so the automaton builder only ever sees flat productions
//! over dense symbol ids.

use std::collections::HashMap;

use crate::errors::GrammarError;
use crate::grammar::rules::{Assoc, GrammarBuilder, Rule};
use crate::grammar::table::{Production, Symbol, SymbolId, SymbolKind, TokenPattern};

/// Everything the automaton builder needs, minus the states.
#[derive(Debug)]
pub(crate) struct FlatGrammar {
    pub language: String,
    pub symbols: Vec<Symbol>,
    pub patterns: Vec<(SymbolId, TokenPattern)>,
    pub productions: Vec<Production>,
    pub start_symbol: SymbolId,
    pub extra_symbols: Vec<SymbolId>,
    pub external_symbols: Vec<SymbolId>,
}

/// The hidden left-hand side of the augmented start production.
pub(crate) const AUGMENTED_START: SymbolId = SymbolId(2);

pub(crate) fn lower(builder: GrammarBuilder) -> Result<FlatGrammar, GrammarError> {
    if builder.rules.is_empty() {
        return Err(GrammarError::EmptyGrammar {
            grammar: builder.name.clone(),
        });
    }

    let mut lowerer = Lowerer::new(&builder)?;
    lowerer.lower_all(&builder)?;
    lowerer.finish(&builder)
}

struct Lowerer {
    symbols: Vec<Symbol>,
    productions: Vec<Production>,
    /// Named rule name -> symbol.
    named: HashMap<String, SymbolId>,
    /// Named terminal symbol -> recognition pattern.
    named_patterns: HashMap<SymbolId, TokenPattern>,
    anon_literals: HashMap<String, SymbolId>,
    anon_patterns: HashMap<String, SymbolId>,
    aux_count: u32,
    external_symbols: Vec<SymbolId>,
}

impl Lowerer {
    /// Pass 1: reserve the fixed symbols and assign ids to every named rule
    /// and external token, so forward references resolve.
    fn new(builder: &GrammarBuilder) -> Result<Self, GrammarError> {
        let mut symbols = vec![
            Symbol {
                name: "end".into(),
                kind: SymbolKind::End,
                visible: false,
                extra: false,
            },
            Symbol {
                name: "ERROR".into(),
                kind: SymbolKind::Terminal,
                visible: true,
                extra: false,
            },
            Symbol {
                name: "__start__".into(),
                kind: SymbolKind::NonTerminal,
                visible: false,
                extra: false,
            },
        ];
        let mut named = HashMap::new();
        let mut named_patterns = HashMap::new();
        let mut external_symbols = Vec::new();

        for name in &builder.externals {
            let id = SymbolId(symbols.len() as u16);
            if named.insert(name.clone(), id).is_some() {
                return Err(GrammarError::DuplicateRule { name: name.clone() });
            }
            symbols.push(Symbol {
                name: name.clone(),
                kind: SymbolKind::Terminal,
                visible: true,
                extra: false,
            });
            named_patterns.insert(id, TokenPattern::External);
            external_symbols.push(id);
        }

        for (name, body) in &builder.rules {
            let id = SymbolId(symbols.len() as u16);
            if named.insert(name.clone(), id).is_some() {
                return Err(GrammarError::DuplicateRule { name: name.clone() });
            }
            let kind = if is_terminal_body(body) {
                SymbolKind::Terminal
            } else {
                SymbolKind::NonTerminal
            };
            symbols.push(Symbol {
                name: name.clone(),
                kind,
                visible: true,
                extra: false,
            });
        }

        Ok(Self {
            symbols,
            // Slot 0 is the augmented start production, filled in `finish`.
            productions: vec![Production {
                lhs: AUGMENTED_START,
                rhs: Vec::new(),
                prec: 0,
                assoc: Assoc::None,
            }],
            named,
            named_patterns,
            anon_literals: HashMap::new(),
            anon_patterns: HashMap::new(),
            aux_count: 0,
            external_symbols,
        })
    }

    /// Pass 2: lower every rule body into productions (non-terminals) or
    /// recognition patterns (terminals).
    fn lower_all(&mut self, builder: &GrammarBuilder) -> Result<(), GrammarError> {
        for (name, body) in &builder.rules {
            let id = self.named[name];
            if self.symbols[id.index()].kind == SymbolKind::Terminal {
                let pattern = self.terminal_pattern(name, body)?;
                self.named_patterns.insert(id, pattern);
            } else {
                self.lower_alternatives(id, name, body)?;
            }
        }
        Ok(())
    }

    fn terminal_pattern(&self, name: &str, body: &Rule) -> Result<TokenPattern, GrammarError> {
        match body {
            Rule::Literal(text) => Ok(TokenPattern::Literal(text.clone())),
            Rule::Pattern(pattern) => {
                validate_pattern(name, pattern)?;
                Ok(TokenPattern::Regex(pattern.clone()))
            }
            Rule::Token(inner) => {
                let folded = fold_token(name, inner)?;
                validate_pattern(name, &folded)?;
                Ok(TokenPattern::Regex(folded))
            }
            // is_terminal_body admits nothing else
            _ => Err(GrammarError::TokenRuleNotLexical { name: name.into() }),
        }
    }

    /// Split a rule body into alternatives and emit one production each.
    /// A `prec(...)` wrapper at the top of an alternative sets that
    /// production's precedence and associativity.
    fn lower_alternatives(
        &mut self,
        lhs: SymbolId,
        lhs_name: &str,
        body: &Rule,
    ) -> Result<(), GrammarError> {
        let alternatives: Vec<&Rule> = match body {
            Rule::Choice(alts) => alts.iter().collect(),
            other => vec![other],
        };
        for alt in alternatives {
            let (prec, assoc, inner) = strip_prec(alt);
            let rhs = self.lower_sequence(lhs_name, inner)?;
            self.productions.push(Production {
                lhs,
                rhs,
                prec,
                assoc,
            });
        }
        Ok(())
    }

    fn lower_sequence(&mut self, ctx: &str, rule: &Rule) -> Result<Vec<SymbolId>, GrammarError> {
        match rule {
            Rule::Seq(parts) => {
                let mut rhs = Vec::new();
                for part in parts {
                    rhs.extend(self.lower_sequence(ctx, part)?);
                }
                Ok(rhs)
            }
            Rule::Blank => Ok(Vec::new()),
            atom => Ok(vec![self.lower_atom(ctx, atom)?]),
        }
    }

    fn lower_atom(&mut self, ctx: &str, rule: &Rule) -> Result<SymbolId, GrammarError> {
        match rule {
            Rule::Literal(text) => Ok(self.intern_literal(text)),
            Rule::Pattern(pattern) => {
                validate_pattern(ctx, pattern)?;
                Ok(self.intern_pattern(pattern))
            }
            Rule::Token(inner) => {
                let folded = fold_token(ctx, inner)?;
                validate_pattern(ctx, &folded)?;
                Ok(self.intern_pattern(&folded))
            }
            Rule::Ref(name) => {
                self.named
                    .get(name)
                    .copied()
                    .ok_or_else(|| GrammarError::UnknownRule {
                        name: ctx.into(),
                        referenced: name.clone(),
                    })
            }
            Rule::Repeat(inner) => {
                let aux = self.new_aux(ctx);
                let step = self.lower_sequence(ctx, inner)?;
                self.push_aux(aux, Vec::new());
                let mut recursive = vec![aux];
                recursive.extend(step);
                self.push_aux(aux, recursive);
                Ok(aux)
            }
            Rule::Repeat1(inner) => {
                let aux = self.new_aux(ctx);
                let step = self.lower_sequence(ctx, inner)?;
                self.push_aux(aux, step.clone());
                let mut recursive = vec![aux];
                recursive.extend(step);
                self.push_aux(aux, recursive);
                Ok(aux)
            }
            Rule::Optional(inner) => {
                let aux = self.new_aux(ctx);
                let step = self.lower_sequence(ctx, inner)?;
                self.push_aux(aux, Vec::new());
                self.push_aux(aux, step);
                Ok(aux)
            }
            Rule::Seq(_) | Rule::Choice(_) | Rule::Prec { .. } | Rule::Blank => {
                let aux = self.new_aux(ctx);
                let body = rule.clone();
                self.lower_alternatives(aux, ctx, &body)?;
                Ok(aux)
            }
        }
    }

    fn intern_literal(&mut self, text: &str) -> SymbolId {
        if let Some(&id) = self.anon_literals.get(text) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u16);
        self.symbols.push(Symbol {
            name: text.to_string(),
            kind: SymbolKind::Terminal,
            visible: true,
            extra: false,
        });
        self.anon_literals.insert(text.to_string(), id);
        self.named_patterns
            .insert(id, TokenPattern::Literal(text.to_string()));
        id
    }

    fn intern_pattern(&mut self, pattern: &str) -> SymbolId {
        if let Some(&id) = self.anon_patterns.get(pattern) {
            return id;
        }
        let id = SymbolId(self.symbols.len() as u16);
        self.symbols.push(Symbol {
            name: pattern.to_string(),
            kind: SymbolKind::Terminal,
            visible: true,
            extra: false,
        });
        self.anon_patterns.insert(pattern.to_string(), id);
        self.named_patterns
            .insert(id, TokenPattern::Regex(pattern.to_string()));
        id
    }

    fn new_aux(&mut self, ctx: &str) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u16);
        self.aux_count += 1;
        self.symbols.push(Symbol {
            name: format!("_{}_{}", ctx, self.aux_count),
            kind: SymbolKind::NonTerminal,
            visible: false,
            extra: false,
        });
        id
    }

    fn push_aux(&mut self, lhs: SymbolId, rhs: Vec<SymbolId>) {
        self.productions.push(Production {
            lhs,
            rhs,
            prec: 0,
            assoc: Assoc::None,
        });
    }

    /// Pass 3: extras, the lexer priority sweep, the augmented start
    /// production and the reachability check.
    fn finish(mut self, builder: &GrammarBuilder) -> Result<FlatGrammar, GrammarError> {
        let start_symbol = self.named[&builder.rules[0].0];
        self.productions[0].rhs = vec![start_symbol];

        let mut extra_symbols = Vec::new();
        for extra in &builder.extras {
            let id = match extra {
                Rule::Literal(text) => self.intern_literal(text),
                Rule::Pattern(pattern) => {
                    validate_pattern("extras", pattern)?;
                    self.intern_pattern(pattern)
                }
                Rule::Ref(name) => {
                    self.named
                        .get(name)
                        .copied()
                        .ok_or_else(|| GrammarError::UnknownRule {
                            name: "extras".into(),
                            referenced: name.clone(),
                        })?
                }
                _ => {
                    return Err(GrammarError::TokenRuleNotLexical {
                        name: "extras".into(),
                    })
                }
            };
            self.symbols[id.index()].extra = true;
            extra_symbols.push(id);
        }

        let patterns = self.priority_sweep(builder);
        self.check_reachability(builder, start_symbol)?;

        Ok(FlatGrammar {
            language: builder.name.clone(),
            symbols: self.symbols,
            patterns,
            productions: self.productions,
            start_symbol,
            extra_symbols,
            external_symbols: self.external_symbols,
        })
    }

    /// Lexer tie-break order: terminals in the order their declaration (or
    /// first use) appears in the grammar text, extras last, externals at the
    /// very end (they are dispatched by symbol, not priority).
    fn priority_sweep(&self, builder: &GrammarBuilder) -> Vec<(SymbolId, TokenPattern)> {
        let mut patterns = Vec::new();
        let mut seen = vec![false; self.symbols.len()];
        let mut push = |id: SymbolId,
                        seen: &mut Vec<bool>,
                        patterns: &mut Vec<(SymbolId, TokenPattern)>| {
            if !seen[id.index()] {
                seen[id.index()] = true;
                if let Some(pattern) = self.named_patterns.get(&id) {
                    if !matches!(pattern, TokenPattern::External) {
                        patterns.push((id, pattern.clone()));
                    }
                }
            }
        };

        for (name, body) in &builder.rules {
            let id = self.named[name];
            if self.symbols[id.index()].kind == SymbolKind::Terminal {
                push(id, &mut seen, &mut patterns);
            } else {
                self.sweep_body(body, &mut seen, &mut patterns, &mut push);
            }
        }
        for extra in &builder.extras {
            match extra {
                Rule::Literal(text) => {
                    if let Some(&id) = self.anon_literals.get(text) {
                        push(id, &mut seen, &mut patterns);
                    }
                }
                Rule::Pattern(pattern) => {
                    if let Some(&id) = self.anon_patterns.get(pattern) {
                        push(id, &mut seen, &mut patterns);
                    }
                }
                Rule::Ref(name) => {
                    if let Some(&id) = self.named.get(name) {
                        push(id, &mut seen, &mut patterns);
                    }
                }
                _ => {}
            }
        }
        for &id in &self.external_symbols {
            if !seen[id.index()] {
                patterns.push((id, TokenPattern::External));
            }
        }
        patterns
    }

    fn sweep_body<F>(
        &self,
        rule: &Rule,
        seen: &mut Vec<bool>,
        patterns: &mut Vec<(SymbolId, TokenPattern)>,
        push: &mut F,
    ) where
        F: FnMut(SymbolId, &mut Vec<bool>, &mut Vec<(SymbolId, TokenPattern)>),
    {
        match rule {
            Rule::Literal(text) => {
                if let Some(&id) = self.anon_literals.get(text) {
                    push(id, seen, patterns);
                }
            }
            Rule::Pattern(pattern) => {
                if let Some(&id) = self.anon_patterns.get(pattern) {
                    push(id, seen, patterns);
                }
            }
            Rule::Token(inner) => {
                // A folded token is interned under its composed pattern.
                if let Ok(folded) = fold_token("", inner) {
                    if let Some(&id) = self.anon_patterns.get(&folded) {
                        push(id, seen, patterns);
                    }
                }
            }
            Rule::Ref(_) | Rule::Blank => {}
            Rule::Seq(parts) | Rule::Choice(parts) => {
                for part in parts {
                    self.sweep_body(part, seen, patterns, push);
                }
            }
            Rule::Repeat(inner)
            | Rule::Repeat1(inner)
            | Rule::Optional(inner)
            | Rule::Prec { rule: inner, .. } => {
                self.sweep_body(inner, seen, patterns, push);
            }
        }
    }

    /// Every visible named rule must be reachable from the start rule.
    fn check_reachability(
        &self,
        builder: &GrammarBuilder,
        start_symbol: SymbolId,
    ) -> Result<(), GrammarError> {
        let mut reachable = vec![false; self.symbols.len()];
        reachable[AUGMENTED_START.index()] = true;
        reachable[start_symbol.index()] = true;
        let mut work = vec![start_symbol];
        while let Some(symbol) = work.pop() {
            for production in &self.productions {
                if production.lhs != symbol {
                    continue;
                }
                for &used in &production.rhs {
                    if !reachable[used.index()] {
                        reachable[used.index()] = true;
                        work.push(used);
                    }
                }
            }
        }
        for (name, _) in &builder.rules {
            let id = self.named[name];
            if !reachable[id.index()] && !self.symbols[id.index()].extra {
                return Err(GrammarError::UnreachableRule {
                    name: name.clone(),
                    start: builder.rules[0].0.clone(),
                });
            }
        }
        Ok(())
    }
}

fn is_terminal_body(body: &Rule) -> bool {
    matches!(body, Rule::Literal(_) | Rule::Pattern(_) | Rule::Token(_))
}

fn strip_prec(rule: &Rule) -> (i32, Assoc, &Rule) {
    match rule {
        Rule::Prec { level, assoc, rule } => (*level, *assoc, rule),
        other => (0, Assoc::None, other),
    }
}

/// Compose a purely lexical sub-rule into one regex.
fn fold_token(name: &str, rule: &Rule) -> Result<String, GrammarError> {
    match rule {
        Rule::Literal(text) => Ok(regex_syntax::escape(text)),
        Rule::Pattern(pattern) => Ok(format!("(?:{})", pattern)),
        Rule::Seq(parts) => {
            let mut out = String::new();
            for part in parts {
                out.push_str(&fold_token(name, part)?);
            }
            Ok(out)
        }
        Rule::Choice(parts) => {
            let folded: Result<Vec<_>, _> =
                parts.iter().map(|p| fold_token(name, p)).collect();
            Ok(format!("(?:{})", folded?.join("|")))
        }
        Rule::Repeat(inner) => Ok(format!("(?:{})*", fold_token(name, inner)?)),
        Rule::Repeat1(inner) => Ok(format!("(?:{})+", fold_token(name, inner)?)),
        Rule::Optional(inner) => Ok(format!("(?:{})?", fold_token(name, inner)?)),
        Rule::Blank => Ok(String::new()),
        _ => Err(GrammarError::TokenRuleNotLexical { name: name.into() }),
    }
}

fn validate_pattern(name: &str, pattern: &str) -> Result<(), GrammarError> {
    regex_syntax::Parser::new()
        .parse(pattern)
        .map(|_| ())
        .map_err(|err| GrammarError::InvalidPattern {
            name: name.into(),
            pattern: pattern.into(),
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::rules::{choice, lit, pat, repeat, seq, sym, token};

    fn arith() -> GrammarBuilder {
        let mut builder = GrammarBuilder::new("arith");
        builder.rule(
            "expr",
            choice([seq([sym("expr"), lit("+"), sym("expr")]), sym("Number")]),
        );
        builder.rule("Number", pat(r"[0-9]+"));
        builder
    }

    #[test]
    fn lowers_named_rules_to_productions() {
        let flat = lower(arith()).unwrap();
        // augmented start, expr -> expr + expr, expr -> Number
        assert_eq!(flat.productions.len(), 3);
        assert_eq!(flat.productions[0].rhs, vec![flat.start_symbol]);
    }

    #[test]
    fn keywords_outrank_later_patterns() {
        let mut builder = GrammarBuilder::new("kw");
        builder.rule("unit", choice([lit("if"), sym("Ident")]));
        builder.rule("Ident", pat(r"[a-z]+"));
        let flat = lower(builder).unwrap();
        let names: Vec<&str> = flat
            .patterns
            .iter()
            .map(|(id, _)| flat.symbols[id.index()].name.as_str())
            .collect();
        let kw = names.iter().position(|n| *n == "if").unwrap();
        let ident = names.iter().position(|n| *n == "Ident").unwrap();
        assert!(kw < ident);
    }

    #[test]
    fn repeat_desugars_to_hidden_left_recursion() {
        let mut builder = GrammarBuilder::new("r");
        builder.rule("list", repeat(sym("Item")));
        builder.rule("Item", pat(r"[a-z]"));
        let flat = lower(builder).unwrap();
        let aux = flat
            .symbols
            .iter()
            .position(|s| !s.visible && s.kind == SymbolKind::NonTerminal && s.name != "__start__")
            .unwrap();
        let aux = SymbolId(aux as u16);
        let aux_prods: Vec<_> = flat
            .productions
            .iter()
            .filter(|p| p.lhs == aux)
            .collect();
        assert_eq!(aux_prods.len(), 2);
        assert!(aux_prods[0].rhs.is_empty());
        assert_eq!(aux_prods[1].rhs[0], aux);
    }

    #[test]
    fn token_combinator_folds_to_one_terminal() {
        let mut builder = GrammarBuilder::new("c");
        builder.rule("unit", sym("Comment"));
        builder.rule("Comment", token(seq([lit("//"), pat(".*")])));
        let flat = lower(builder).unwrap();
        let comment = flat
            .symbols
            .iter()
            .find(|s| s.name == "Comment")
            .unwrap();
        assert_eq!(comment.kind, SymbolKind::Terminal);
    }

    #[test]
    fn unknown_reference_is_a_compile_error() {
        let mut builder = GrammarBuilder::new("bad");
        builder.rule("unit", sym("Nope"));
        assert!(matches!(
            lower(builder),
            Err(GrammarError::UnknownRule { .. })
        ));
    }

    #[test]
    fn invalid_pattern_is_a_compile_error() {
        let mut builder = GrammarBuilder::new("bad");
        builder.rule("unit", pat("[unclosed"));
        assert!(matches!(
            lower(builder),
            Err(GrammarError::InvalidPattern { .. })
        ));
    }
}
