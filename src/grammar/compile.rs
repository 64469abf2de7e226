//! SLR(1) automaton construction with GLR split points.
//!
//! Builds canonical LR(0) item sets over the desugared productions, then
//! derives actions with FOLLOW sets. Shift/reduce and reduce/reduce
//! conflicts are resolved by declared precedence and associativity; whatever
//! remains unresolved is kept as a multi-action cell for the runtime to
//! explore as parallel GLR configurations.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::errors::GrammarError;
use crate::grammar::desugar::{self, FlatGrammar};
use crate::grammar::rules::{Assoc, GrammarBuilder};
use crate::grammar::table::{Action, Production, RuleTable, State, SymbolId, SymbolKind};

pub(crate) fn compile(builder: GrammarBuilder) -> Result<RuleTable, GrammarError> {
    let flat = desugar::lower(builder)?;
    let states = build_states(&flat);
    Ok(RuleTable {
        language: flat.language,
        symbols: flat.symbols,
        patterns: flat.patterns,
        productions: flat.productions,
        states,
        start_symbol: flat.start_symbol,
        extra_symbols: flat.extra_symbols,
        external_symbols: flat.external_symbols,
    })
}

/// An LR(0) item: a production with a dot position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Item {
    production: u32,
    dot: u32,
}

impl Item {
    fn next_symbol(self, productions: &[Production]) -> Option<SymbolId> {
        productions[self.production as usize]
            .rhs
            .get(self.dot as usize)
            .copied()
    }

    fn is_complete(self, productions: &[Production]) -> bool {
        self.dot as usize == productions[self.production as usize].rhs.len()
    }
}

fn build_states(flat: &FlatGrammar) -> Vec<State> {
    let productions = &flat.productions;
    let by_lhs = index_by_lhs(productions);
    let follow = follow_sets(flat);

    let start_set = closure(
        BTreeSet::from([Item {
            production: 0,
            dot: 0,
        }]),
        productions,
        &by_lhs,
    );

    let mut ids: HashMap<BTreeSet<Item>, u32> = HashMap::new();
    let mut sets: Vec<BTreeSet<Item>> = Vec::new();
    let mut transitions: Vec<BTreeMap<SymbolId, u32>> = Vec::new();
    ids.insert(start_set.clone(), 0);
    sets.push(start_set);
    transitions.push(BTreeMap::new());

    // Breadth-first over goto sets; iterating transition symbols in id order
    // keeps state numbering a pure function of the grammar.
    let mut cursor = 0;
    while cursor < sets.len() {
        let moves: BTreeMap<SymbolId, BTreeSet<Item>> = {
            let set = &sets[cursor];
            let mut moves: BTreeMap<SymbolId, BTreeSet<Item>> = BTreeMap::new();
            for &item in set.iter() {
                if let Some(symbol) = item.next_symbol(productions) {
                    moves.entry(symbol).or_default().insert(Item {
                        production: item.production,
                        dot: item.dot + 1,
                    });
                }
            }
            moves
        };
        for (symbol, kernel) in moves {
            let target_set = closure(kernel, productions, &by_lhs);
            let next_id = sets.len() as u32;
            let target = *ids.entry(target_set.clone()).or_insert_with(|| {
                sets.push(target_set);
                transitions.push(BTreeMap::new());
                next_id
            });
            transitions[cursor].insert(symbol, target);
        }
        cursor += 1;
    }

    sets.iter()
        .zip(&transitions)
        .map(|(set, moves)| build_state(flat, set, moves, &follow))
        .collect()
}

fn build_state(
    flat: &FlatGrammar,
    set: &BTreeSet<Item>,
    moves: &BTreeMap<SymbolId, u32>,
    follow: &[HashSet<SymbolId>],
) -> State {
    let productions = &flat.productions;
    let mut state = State::default();

    // Raw candidates per lookahead terminal.
    let mut shifts: BTreeMap<SymbolId, (u32, i32)> = BTreeMap::new();
    let mut reduces: BTreeMap<SymbolId, Vec<u32>> = BTreeMap::new();
    let mut accept = false;

    for (&symbol, &target) in moves {
        match flat.symbols[symbol.index()].kind {
            SymbolKind::NonTerminal => {
                state.gotos.insert(symbol, target);
            }
            SymbolKind::Terminal => {
                // Shift precedence comes from the productions whose dot
                // precedes this terminal.
                let prec = set
                    .iter()
                    .filter(|item| item.next_symbol(productions) == Some(symbol))
                    .map(|item| productions[item.production as usize].prec)
                    .max()
                    .unwrap_or(0);
                shifts.insert(symbol, (target, prec));
            }
            SymbolKind::End => {}
        }
    }

    for &item in set.iter() {
        if !item.is_complete(productions) {
            continue;
        }
        if item.production == 0 {
            accept = true;
            continue;
        }
        let lhs = productions[item.production as usize].lhs;
        for &lookahead in &follow[lhs.index()] {
            reduces.entry(lookahead).or_default().push(item.production);
        }
    }

    let mut lookaheads: BTreeSet<SymbolId> = shifts.keys().copied().collect();
    lookaheads.extend(reduces.keys().copied());
    if accept {
        lookaheads.insert(SymbolId::END);
    }

    for lookahead in lookaheads {
        let cell = resolve_cell(
            productions,
            shifts.get(&lookahead).copied(),
            reduces.get(&lookahead).cloned().unwrap_or_default(),
            accept && lookahead == SymbolId::END,
        );
        if !cell.is_empty() {
            state.actions.insert(lookahead, cell);
        }
    }

    state
}

/// Resolve one (state, lookahead) cell. Survivors are ordered shift first,
/// then reduces by ascending production id; the runtime relies on this order
/// for deterministic forking.
fn resolve_cell(
    productions: &[Production],
    shift: Option<(u32, i32)>,
    mut reduce_candidates: Vec<u32>,
    accept: bool,
) -> Vec<Action> {
    reduce_candidates.sort_unstable();
    reduce_candidates.dedup();

    let mut keep_shift = shift.is_some();
    let mut surviving: Vec<u32> = Vec::new();

    for production in reduce_candidates {
        let rule = &productions[production as usize];
        match shift {
            Some((_, shift_prec)) => {
                if rule.prec > shift_prec {
                    keep_shift = false;
                    surviving.push(production);
                } else if rule.prec < shift_prec {
                    // shift wins, reduce dropped
                } else {
                    match rule.assoc {
                        Assoc::Left => {
                            keep_shift = false;
                            surviving.push(production);
                        }
                        Assoc::Right => {}
                        Assoc::None => surviving.push(production),
                    }
                }
            }
            None => surviving.push(production),
        }
    }

    // Reduce/reduce: higher declared precedence wins outright; equal
    // precedence keeps all survivors as a split point.
    if surviving.len() > 1 {
        let max_prec = surviving
            .iter()
            .map(|&p| productions[p as usize].prec)
            .max()
            .unwrap_or(0);
        surviving.retain(|&p| productions[p as usize].prec == max_prec);
    }

    let mut cell = Vec::new();
    if accept {
        cell.push(Action::Accept);
    }
    if keep_shift {
        if let Some((target, _)) = shift {
            cell.push(Action::Shift(target));
        }
    }
    cell.extend(surviving.into_iter().map(Action::Reduce));
    cell
}

fn index_by_lhs(productions: &[Production]) -> HashMap<SymbolId, Vec<u32>> {
    let mut by_lhs: HashMap<SymbolId, Vec<u32>> = HashMap::new();
    for (index, production) in productions.iter().enumerate() {
        by_lhs
            .entry(production.lhs)
            .or_default()
            .push(index as u32);
    }
    by_lhs
}

fn closure(
    kernel: BTreeSet<Item>,
    productions: &[Production],
    by_lhs: &HashMap<SymbolId, Vec<u32>>,
) -> BTreeSet<Item> {
    let mut set = kernel;
    let mut work: Vec<Item> = set.iter().copied().collect();
    while let Some(item) = work.pop() {
        if let Some(symbol) = item.next_symbol(productions) {
            if let Some(expansions) = by_lhs.get(&symbol) {
                for &production in expansions {
                    let new_item = Item { production, dot: 0 };
                    if set.insert(new_item) {
                        work.push(new_item);
                    }
                }
            }
        }
    }
    set
}

/// FIRST sets plus nullability, to a fixpoint.
fn first_sets(flat: &FlatGrammar) -> (Vec<HashSet<SymbolId>>, Vec<bool>) {
    let count = flat.symbols.len();
    let mut first: Vec<HashSet<SymbolId>> = vec![HashSet::new(); count];
    let mut nullable = vec![false; count];

    for (index, symbol) in flat.symbols.iter().enumerate() {
        if symbol.kind == SymbolKind::Terminal {
            first[index].insert(SymbolId(index as u16));
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for production in &flat.productions {
            let lhs = production.lhs.index();
            let mut all_nullable = true;
            for &symbol in &production.rhs {
                let additions: Vec<SymbolId> = first[symbol.index()].iter().copied().collect();
                for addition in additions {
                    if first[lhs].insert(addition) {
                        changed = true;
                    }
                }
                if !nullable[symbol.index()] {
                    all_nullable = false;
                    break;
                }
            }
            if all_nullable && !nullable[lhs] {
                nullable[lhs] = true;
                changed = true;
            }
        }
    }
    (first, nullable)
}

fn follow_sets(flat: &FlatGrammar) -> Vec<HashSet<SymbolId>> {
    let (first, nullable) = first_sets(flat);
    let count = flat.symbols.len();
    let mut follow: Vec<HashSet<SymbolId>> = vec![HashSet::new(); count];
    follow[desugar::AUGMENTED_START.index()].insert(SymbolId::END);

    let mut changed = true;
    while changed {
        changed = false;
        for production in &flat.productions {
            let lhs = production.lhs.index();
            for (position, &symbol) in production.rhs.iter().enumerate() {
                if flat.symbols[symbol.index()].kind != SymbolKind::NonTerminal {
                    continue;
                }
                let mut tail_nullable = true;
                for &next in &production.rhs[position + 1..] {
                    let additions: Vec<SymbolId> = first[next.index()].iter().copied().collect();
                    for addition in additions {
                        if follow[symbol.index()].insert(addition) {
                            changed = true;
                        }
                    }
                    if !nullable[next.index()] {
                        tail_nullable = false;
                        break;
                    }
                }
                if tail_nullable {
                    let additions: Vec<SymbolId> = follow[lhs].iter().copied().collect();
                    for addition in additions {
                        if follow[symbol.index()].insert(addition) {
                            changed = true;
                        }
                    }
                }
            }
        }
    }
    follow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::rules::{choice, lit, pat, prec_left, seq, sym};
    use crate::grammar::table::Action;

    fn arith_left() -> RuleTable {
        let mut builder = GrammarBuilder::new("arith");
        builder.rule(
            "expr",
            choice([
                prec_left(1, seq([sym("expr"), lit("+"), sym("expr")])),
                sym("Number"),
            ]),
        );
        builder.rule("Number", pat(r"[0-9]+"));
        compile(builder).unwrap()
    }

    #[test]
    fn left_associativity_resolves_the_dangling_shift() {
        let table = arith_left();
        let plus = table.symbol_named("+").unwrap();
        // No cell for '+' may hold both a shift and a reduce once the
        // declared associativity applies.
        for state in &table.states {
            if let Some(cell) = state.actions.get(&plus) {
                let shifts = cell
                    .iter()
                    .filter(|a| matches!(a, Action::Shift(_)))
                    .count();
                let reduces = cell
                    .iter()
                    .filter(|a| matches!(a, Action::Reduce(_)))
                    .count();
                assert!(shifts == 0 || reduces == 0, "unresolved conflict: {cell:?}");
            }
        }
    }

    #[test]
    fn undeclared_conflict_becomes_a_split_point() {
        let mut builder = GrammarBuilder::new("ambig");
        builder.rule(
            "expr",
            choice([
                seq([sym("expr"), lit("+"), sym("expr")]),
                sym("Number"),
            ]),
        );
        builder.rule("Number", pat(r"[0-9]+"));
        let table = compile(builder).unwrap();
        let plus = table.symbol_named("+").unwrap();
        let split = table
            .states
            .iter()
            .filter_map(|s| s.actions.get(&plus))
            .any(|cell| cell.len() > 1);
        assert!(split, "expected a multi-action cell for '+'");
    }

    #[test]
    fn accept_lives_on_end_of_input() {
        let table = arith_left();
        let accepts = table
            .states
            .iter()
            .filter_map(|s| s.actions.get(&SymbolId::END))
            .flatten()
            .filter(|a| matches!(a, Action::Accept))
            .count();
        assert!(accepts >= 1);
    }
}
