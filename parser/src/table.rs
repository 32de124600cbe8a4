//! FILENAME: parser/src/table.rs
//! PURPOSE: Builds the LALR(1) ACTION/GOTO tables from the grammar model.
//! CONTEXT: Classic construction: compute the closure of the augmented
//! item `[Start -> . Expr, EOF]`, grow the canonical LR(1) collection to a
//! fixpoint with GOTO, then merge states that share a core (LALR
//! compression), rejecting any merge that would introduce a conflict not
//! already present in a source state. Conflicts that survive into the
//! ACTION table abort construction with the full conflict list; there is
//! no silent default priority.
//!
//! The finished table is immutable and safely shared across threads; all
//! conflict checking happens here, once, never at parse time.

use crate::grammar::{Conflict, Grammar, GrammarError, NonTerminal, Symbol, Terminal};
use crate::lr::{has_lookahead_conflicts, CompressedLrState, LrItem};
use crate::token::TokenKind;
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A parse action for one (state, terminal) pair. Absence of an entry is
/// the error action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Shift(usize),
    Reduce(usize),
    Accept,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Shift(state) => write!(f, "shift({})", state),
            Action::Reduce(production) => write!(f, "reduce({})", production),
            Action::Accept => write!(f, "accept"),
        }
    }
}

/// The immutable ACTION/GOTO tables. Built once per grammar and reused
/// across all parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTable {
    actions: Vec<BTreeMap<Terminal, Action>>,
    gotos: Vec<BTreeMap<NonTerminal, usize>>,
}

impl ParseTable {
    pub fn action(&self, state: usize, terminal: Terminal) -> Option<Action> {
        self.actions.get(state)?.get(&terminal).copied()
    }

    pub fn goto(&self, state: usize, nt: NonTerminal) -> Option<usize> {
        self.gotos.get(state)?.get(&nt).copied()
    }

    /// The terminals with a defined action in `state`, for diagnostics.
    pub fn expected_terminals(&self, state: usize) -> Vec<Terminal> {
        self.actions
            .get(state)
            .map(|row| row.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn state_count(&self) -> usize {
        self.actions.len()
    }
}

/// Constructs the LALR(1) tables for a grammar.
pub struct TableBuilder<'g> {
    grammar: &'g Grammar,
    first: BTreeMap<NonTerminal, BTreeSet<Terminal>>,
    nullable: BTreeSet<NonTerminal>,
}

impl<'g> TableBuilder<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        let (first, nullable) = compute_first_sets(grammar);
        TableBuilder {
            grammar,
            first,
            nullable,
        }
    }

    /// Runs the full construction. Deterministic: building twice from the
    /// same grammar yields identical tables.
    pub fn build(&self) -> Result<ParseTable, GrammarError> {
        let (states, transitions) = self.canonical_collection();
        debug!("canonical LR(1) collection: {} states", states.len());

        let (states, transitions) = self.merge_lalr(states, transitions)?;
        debug!("after LALR merge: {} states", states.len());

        self.resolve_tables(&states, &transitions)
    }

    /// FIRST of a symbol sequence followed by a fallback lookahead.
    fn first_of_sequence(&self, symbols: &[Symbol], fallback: Terminal) -> BTreeSet<Terminal> {
        let mut result = BTreeSet::new();
        for symbol in symbols {
            match symbol {
                Symbol::Terminal(t) => {
                    result.insert(*t);
                    return result;
                }
                Symbol::NonTerminal(n) => {
                    if let Some(first) = self.first.get(n) {
                        result.extend(first.iter().copied());
                    }
                    if !self.nullable.contains(n) {
                        return result;
                    }
                }
            }
        }
        result.insert(fallback);
        result
    }

    /// LR(1) closure: for every item `[A -> a . B b, la]` add
    /// `[B -> . g, x]` for each production of B and each x in FIRST(b la).
    fn closure(&self, mut items: BTreeSet<LrItem>) -> BTreeSet<LrItem> {
        let mut worklist: Vec<LrItem> = items.iter().copied().collect();
        while let Some(item) = worklist.pop() {
            let Some(Symbol::NonTerminal(nt)) = item.next_symbol(self.grammar) else {
                continue;
            };
            let rest = &self.grammar.production(item.production).rhs[item.dot + 1..];
            let lookaheads = self.first_of_sequence(rest, item.lookahead);
            for production in self.grammar.productions_for(nt) {
                for lookahead in &lookaheads {
                    let new_item = LrItem::new(production.id, 0, *lookahead);
                    if items.insert(new_item) {
                        worklist.push(new_item);
                    }
                }
            }
        }
        items
    }

    /// GOTO(state, symbol): shift the dot over `symbol` in every item and
    /// take the closure.
    fn goto_set(&self, items: &BTreeSet<LrItem>, symbol: Symbol) -> BTreeSet<LrItem> {
        let moved: BTreeSet<LrItem> = items
            .iter()
            .filter(|item| item.next_symbol(self.grammar) == Some(symbol))
            .map(|item| LrItem::new(item.production, item.dot + 1, item.lookahead))
            .collect();
        if moved.is_empty() {
            moved
        } else {
            self.closure(moved)
        }
    }

    /// Grows the canonical LR(1) collection from the augmented start item
    /// until no new states appear.
    #[allow(clippy::type_complexity)]
    fn canonical_collection(&self) -> (Vec<BTreeSet<LrItem>>, Vec<BTreeMap<Symbol, usize>>) {
        let start_item = LrItem::new(0, 0, TokenKind::Eof);
        let start_state = self.closure(BTreeSet::from([start_item]));

        let mut states: Vec<BTreeSet<LrItem>> = vec![start_state.clone()];
        let mut index: HashMap<BTreeSet<LrItem>, usize> = HashMap::from([(start_state, 0)]);
        let mut transitions: Vec<BTreeMap<Symbol, usize>> = vec![BTreeMap::new()];

        let mut cursor = 0;
        while cursor < states.len() {
            // Outgoing symbols, in deterministic order.
            let symbols: BTreeSet<Symbol> = states[cursor]
                .iter()
                .filter_map(|item| item.next_symbol(self.grammar))
                .collect();

            for symbol in symbols {
                let target = self.goto_set(&states[cursor], symbol);
                if target.is_empty() {
                    continue;
                }
                let target_index = match index.get(&target) {
                    Some(existing) => *existing,
                    None => {
                        let new_index = states.len();
                        index.insert(target.clone(), new_index);
                        states.push(target);
                        transitions.push(BTreeMap::new());
                        new_index
                    }
                };
                transitions[cursor].insert(symbol, target_index);
            }
            cursor += 1;
        }

        (states, transitions)
    }

    /// LALR compression: groups states by core signature and merges each
    /// group whose union stays conflict-free. A rejected group keeps its
    /// canonical LR(1) states. Merged groups whose successors end up
    /// unmerged are themselves unmerged, so transitions stay well defined.
    #[allow(clippy::type_complexity)]
    fn merge_lalr(
        &self,
        states: Vec<BTreeSet<LrItem>>,
        transitions: Vec<BTreeMap<Symbol, usize>>,
    ) -> Result<(Vec<BTreeSet<LrItem>>, Vec<BTreeMap<Symbol, usize>>), GrammarError> {
        // Compress every state; grouping key is the signature.
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (state_index, items) in states.iter().enumerate() {
            let mut compressed = CompressedLrState::from_items(state_index, items)?;
            compressed.mark_fully_built();
            groups.entry(compressed.signature).or_default().push(state_index);
        }

        // Initial merge decision per group: reject only if the union would
        // introduce a conflict absent from every source state.
        let mut merged: BTreeMap<String, bool> = BTreeMap::new();
        for (signature, members) in &groups {
            let decision = if members.len() < 2 {
                true
            } else {
                let sources: Vec<&BTreeSet<LrItem>> =
                    members.iter().map(|&i| &states[i]).collect();
                let ok = !has_lookahead_conflicts(self.grammar, &sources);
                if !ok {
                    debug!("LALR merge rejected for core {}", signature);
                }
                ok
            };
            merged.insert(signature.clone(), decision);
        }

        // Signature of each old state, for successor checks.
        let mut signature_of: Vec<String> = vec![String::new(); states.len()];
        for (signature, members) in &groups {
            for &member in members {
                signature_of[member] = signature.clone();
            }
        }

        // If a merged group's members disagree on a successor group, or
        // agree on a group that stays unmerged, the merge cannot be
        // represented; unmerge and re-check until stable.
        loop {
            let mut changed = false;
            for (signature, members) in &groups {
                if !merged[signature] || members.len() < 2 {
                    continue;
                }
                let mut targets: BTreeMap<Symbol, BTreeSet<&str>> = BTreeMap::new();
                for &member in members {
                    for (symbol, target) in &transitions[member] {
                        targets
                            .entry(*symbol)
                            .or_default()
                            .insert(signature_of[*target].as_str());
                    }
                }
                let representable = targets.values().all(|sigs| {
                    let mut iter = sigs.iter();
                    matches!(
                        (iter.next(), iter.next()),
                        (Some(sig), None) if merged.get(*sig).copied().unwrap_or(false)
                    )
                });
                if !representable {
                    merged.insert(signature.clone(), false);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        // Assign new indices in old-state order; merged groups collapse to
        // the index assigned at their first member.
        let mut remap: Vec<usize> = vec![usize::MAX; states.len()];
        let mut group_index: BTreeMap<&str, usize> = BTreeMap::new();
        let mut new_states: Vec<BTreeSet<LrItem>> = Vec::new();
        for (old_index, _) in states.iter().enumerate() {
            let signature = signature_of[old_index].as_str();
            if merged.get(signature).copied().unwrap_or(false) {
                if let Some(&existing) = group_index.get(signature) {
                    remap[old_index] = existing;
                    // Union the lookaheads into the representative state.
                    let union: BTreeSet<LrItem> = new_states[existing]
                        .union(&states[old_index])
                        .copied()
                        .collect();
                    new_states[existing] = union;
                    continue;
                }
                group_index.insert(signature, new_states.len());
            }
            remap[old_index] = new_states.len();
            new_states.push(states[old_index].clone());
        }

        // Rebuild transitions through the remap. Members of a merged group
        // agree on every target by the representability check above.
        let mut new_transitions: Vec<BTreeMap<Symbol, usize>> =
            vec![BTreeMap::new(); new_states.len()];
        for (old_index, row) in transitions.iter().enumerate() {
            let new_index = remap[old_index];
            for (symbol, target) in row {
                new_transitions[new_index].insert(*symbol, remap[*target]);
            }
        }

        Ok((new_states, new_transitions))
    }

    /// Derives ACTION and GOTO entries from the merged states, collecting
    /// every conflict instead of picking a winner.
    fn resolve_tables(
        &self,
        states: &[BTreeSet<LrItem>],
        transitions: &[BTreeMap<Symbol, usize>],
    ) -> Result<ParseTable, GrammarError> {
        let mut actions: Vec<BTreeMap<Terminal, Action>> = vec![BTreeMap::new(); states.len()];
        let mut gotos: Vec<BTreeMap<NonTerminal, usize>> = vec![BTreeMap::new(); states.len()];
        let mut conflicts: Vec<Conflict> = Vec::new();

        let insert = |table: &mut BTreeMap<Terminal, Action>,
                      conflicts: &mut Vec<Conflict>,
                      state: usize,
                      terminal: Terminal,
                      action: Action| {
            match table.get(&terminal) {
                None => {
                    table.insert(terminal, action);
                }
                Some(existing) if *existing == action => {}
                Some(existing) => {
                    conflicts.push(Conflict {
                        state,
                        terminal,
                        existing: existing.to_string(),
                        conflicting: action.to_string(),
                    });
                }
            }
        };

        for (state, items) in states.iter().enumerate() {
            for item in items {
                if item.is_complete(self.grammar) {
                    // The completed augmented production accepts on EOF.
                    let action = if item.production == 0 && item.lookahead == TokenKind::Eof {
                        Action::Accept
                    } else {
                        Action::Reduce(item.production)
                    };
                    insert(
                        &mut actions[state],
                        &mut conflicts,
                        state,
                        item.lookahead,
                        action,
                    );
                } else if let Some(Symbol::Terminal(t)) = item.next_symbol(self.grammar) {
                    if let Some(&target) = transitions[state].get(&Symbol::Terminal(t)) {
                        insert(
                            &mut actions[state],
                            &mut conflicts,
                            state,
                            t,
                            Action::Shift(target),
                        );
                    }
                }
            }
            for (symbol, target) in &transitions[state] {
                if let Symbol::NonTerminal(nt) = symbol {
                    gotos[state].insert(*nt, *target);
                }
            }
        }

        if !conflicts.is_empty() {
            conflicts.sort_by_key(|c| (c.state, c.terminal));
            conflicts.dedup();
            return Err(GrammarError::Conflicts(conflicts));
        }

        Ok(ParseTable { actions, gotos })
    }
}

/// Fixpoint computation of FIRST sets and the nullable nonterminals.
fn compute_first_sets(
    grammar: &Grammar,
) -> (BTreeMap<NonTerminal, BTreeSet<Terminal>>, BTreeSet<NonTerminal>) {
    let mut first: BTreeMap<NonTerminal, BTreeSet<Terminal>> = grammar
        .non_terminals()
        .iter()
        .map(|nt| (*nt, BTreeSet::new()))
        .collect();
    let mut nullable: BTreeSet<NonTerminal> = BTreeSet::new();

    loop {
        let mut changed = false;
        for production in grammar.productions() {
            let mut all_nullable = true;
            let mut additions: BTreeSet<Terminal> = BTreeSet::new();
            for symbol in &production.rhs {
                match symbol {
                    Symbol::Terminal(t) => {
                        additions.insert(*t);
                        all_nullable = false;
                        break;
                    }
                    Symbol::NonTerminal(n) => {
                        if let Some(set) = first.get(n) {
                            additions.extend(set.iter().copied());
                        }
                        if !nullable.contains(n) {
                            all_nullable = false;
                            break;
                        }
                    }
                }
            }
            let entry = first.entry(production.lhs).or_default();
            let before = entry.len();
            entry.extend(additions);
            if entry.len() != before {
                changed = true;
            }
            if all_nullable && nullable.insert(production.lhs) {
                changed = true;
            }
        }
        if !changed {
            return (first, nullable);
        }
    }
}
