//! Alloca reordering (spec §4.7, component C8).
//!
//! Bubbles every `Alloca`/`AllocaArray` to the front of the function,
//! preserving relative order within each group, so the interpreter and any
//! back end can compute a single fixed-size stack frame up front instead of
//! growing it as control flow reaches each declaration. This is the last
//! optimization pass in the pipeline (spec §2): it runs after unreachable-
//! code removal and DCE so it never has to reorder a node that is about to
//! be deleted anyway.
//!
//! Reordering changes which node is "physically next" after many nodes, so
//! the CFG's fall-through `succs` entries are stale once this runs; the
//! pass re-derives them via [`crate::cfg::build`] before returning. Only the
//! interpreter (which walks `succs`/`next`) consumes the result afterward -
//! nothing downstream reads `idom`/`df`/`ddg_stmts`, so those are left
//! stale deliberately rather than re-computed for no consumer.

use crate::node::NodeKind;
use crate::unit::Function;

pub fn run(func: &mut Function) {
    let order = func.node_ids();
    let (allocas, rest): (Vec<_>, Vec<_>) = order
        .into_iter()
        .partition(|&id| matches!(func.get(id).kind, NodeKind::Alloca { .. } | NodeKind::AllocaArray { .. }));

    if allocas.is_empty() {
        return;
    }
    tracing::debug!(function = %func.name, allocas = allocas.len(), "alloca reordering");

    let new_order: Vec<_> = allocas.into_iter().chain(rest).collect();
    relink(func, &new_order);
    crate::cfg::build(func);
}

fn relink(func: &mut Function, order: &[crate::node::NodeId]) {
    func.entry = order.first().copied();
    for pair in order.windows(2) {
        func.get_mut(pair[0]).next = Some(pair[1]);
        func.get_mut(pair[1]).prev = Some(pair[0]);
    }
    if let Some(&first) = order.first() {
        func.get_mut(first).prev = None;
    }
    if let Some(&last) = order.last() {
        func.get_mut(last).next = None;
    }
}
