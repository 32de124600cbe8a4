//! FILENAME: parser/src/lr.rs
//! PURPOSE: LR(1) items and compressed state cores for LALR merging.
//! CONTEXT: Canonical LR(1) construction produces many states that differ
//! only in lookaheads. Two states with identical cores (the set of
//! (production, dot) pairs with lookaheads stripped) are LALR merge
//! candidates. Merging is legal only if the union of their items does not
//! introduce a conflict that was absent from both source states.

use crate::grammar::{Grammar, GrammarError, Symbol, Terminal};
use std::collections::BTreeSet;

/// One LR(1) item: a production, a dot position within its RHS, and a
/// lookahead terminal. Value semantics; equality and ordering over all
/// three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LrItem {
    pub production: usize,
    pub dot: usize,
    pub lookahead: Terminal,
}

impl LrItem {
    pub fn new(production: usize, dot: usize, lookahead: Terminal) -> Self {
        LrItem {
            production,
            dot,
            lookahead,
        }
    }

    /// The core of the item: production id and dot position, lookahead
    /// stripped.
    pub fn core(&self) -> (usize, usize) {
        (self.production, self.dot)
    }

    /// True if the dot has reached the end of the RHS.
    pub fn is_complete(&self, grammar: &Grammar) -> bool {
        self.dot >= grammar.production(self.production).len()
    }

    /// The symbol immediately after the dot, if any.
    pub fn next_symbol(&self, grammar: &Grammar) -> Option<Symbol> {
        grammar.production(self.production).rhs.get(self.dot).copied()
    }
}

/// A state reduced to its core: the set of (production, dot) pairs, a
/// deterministic signature string derived from them, and a flag marking
/// whether the owning builder has finished populating its transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedLrState {
    pub cores: BTreeSet<(usize, usize)>,
    pub signature: String,
    pub fully_built: bool,
}

impl CompressedLrState {
    /// Compresses a full LR(1) item set. A state with no items is a
    /// construction bug and is rejected.
    pub fn from_items(state: usize, items: &BTreeSet<LrItem>) -> Result<Self, GrammarError> {
        if items.is_empty() {
            return Err(GrammarError::EmptyCoreItems(state));
        }
        let cores: BTreeSet<(usize, usize)> = items.iter().map(LrItem::core).collect();
        let signature = Self::signature_of(&cores);
        Ok(CompressedLrState {
            cores,
            signature,
            fully_built: false,
        })
    }

    /// The signature is a pure function of the sorted core items, so two
    /// states compare as merge candidates by string equality alone.
    fn signature_of(cores: &BTreeSet<(usize, usize)>) -> String {
        cores
            .iter()
            .map(|(p, d)| format!("{}.{}", p, d))
            .collect::<Vec<_>>()
            .join(";")
    }

    pub fn mark_fully_built(&mut self) {
        self.fully_built = true;
    }
}

/// A conflict fingerprint inside one item set: either two reductions or a
/// shift and a reduction competing on the same lookahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ItemConflict {
    ReduceReduce(usize, usize, Terminal),
    ShiftReduce(usize, Terminal),
}

/// Collects the conflict fingerprints present in an item set.
fn conflicts_in(grammar: &Grammar, items: &BTreeSet<LrItem>) -> BTreeSet<ItemConflict> {
    let mut conflicts = BTreeSet::new();

    let complete: Vec<&LrItem> = items.iter().filter(|i| i.is_complete(grammar)).collect();
    let shift_terminals: BTreeSet<Terminal> = items
        .iter()
        .filter_map(|i| match i.next_symbol(grammar) {
            Some(Symbol::Terminal(t)) => Some(t),
            _ => None,
        })
        .collect();

    for (index, a) in complete.iter().enumerate() {
        // Shift/reduce: a completed item whose lookahead is also shiftable.
        if shift_terminals.contains(&a.lookahead) {
            conflicts.insert(ItemConflict::ShiftReduce(a.production, a.lookahead));
        }
        // Reduce/reduce: two different productions completing on the same
        // lookahead.
        for b in complete.iter().skip(index + 1) {
            if a.lookahead == b.lookahead && a.production != b.production {
                let (lo, hi) = if a.production < b.production {
                    (a.production, b.production)
                } else {
                    (b.production, a.production)
                };
                conflicts.insert(ItemConflict::ReduceReduce(lo, hi, a.lookahead));
            }
        }
    }

    conflicts
}

/// True if merging the given source states would introduce a conflict that
/// none of them already contains. This is the pairwise-core lookahead check
/// that makes the LALR compression safe.
pub fn has_lookahead_conflicts(grammar: &Grammar, sources: &[&BTreeSet<LrItem>]) -> bool {
    let merged: BTreeSet<LrItem> = sources.iter().flat_map(|s| s.iter().copied()).collect();
    let merged_conflicts = conflicts_in(grammar, &merged);
    if merged_conflicts.is_empty() {
        return false;
    }
    let existing: BTreeSet<ItemConflict> = sources
        .iter()
        .flat_map(|s| conflicts_in(grammar, s))
        .collect();
    merged_conflicts.difference(&existing).next().is_some()
}

/// True if `a` and `b` share a core and their union stays conflict-free
/// (beyond any conflict already present in either source).
pub fn can_merge_lalr(grammar: &Grammar, a: &BTreeSet<LrItem>, b: &BTreeSet<LrItem>) -> bool {
    let core_a: BTreeSet<(usize, usize)> = a.iter().map(LrItem::core).collect();
    let core_b: BTreeSet<(usize, usize)> = b.iter().map(LrItem::core).collect();
    if core_a != core_b {
        return false;
    }
    !has_lookahead_conflicts(grammar, &[a, b])
}
