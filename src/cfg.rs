//! Control-flow graph construction (spec §4.2, component C3).
//!
//! Derives `succs`/`preds` from a function's linked instruction list and
//! assigns reporting-only CFG block numbers. Re-entrant: any pass that
//! changes list order or deletes nodes (alloca reordering, unreachable-code
//! removal) re-runs this to refresh the edge sets it depends on.

use crate::node::NodeKind;
use crate::unit::Function;

/// (Re)computes `succs`/`preds` and block numbers for `func`.
pub fn build(func: &mut Function) {
    let ids = func.node_ids();
    for &id in &ids {
        func.get_mut(id).succs.clear();
        func.get_mut(id).preds.clear();
    }

    for &id in &ids {
        let node = func.get(id);
        let succs = match &node.kind {
            // true branch first, false (fall-through) second - spec §4.2.
            NodeKind::Cond { target, .. } => {
                let mut v = vec![*target];
                v.extend(node.next);
                v
            }
            NodeKind::Jump { target } => vec![*target],
            NodeKind::Ret { .. } => Vec::new(),
            _ => node.next.into_iter().collect(),
        };
        func.get_mut(id).succs = succs;
    }

    for &id in &ids {
        let succs = func.get(id).succs.clone();
        for s in succs {
            func.get_mut(s).preds.push(id);
        }
    }

    assign_block_numbers(func, &ids);
}

/// A new block starts at the function's first node, at any node immediately
/// following a branch, or at any node with two or more predecessors (spec
/// §4.2). Numbers are assigned in list order and are used only for
/// reporting/dumping.
fn assign_block_numbers(func: &mut Function, ids: &[crate::node::NodeId]) {
    let mut current = 0u32;
    let mut started = false;
    for (i, &id) in ids.iter().enumerate() {
        let prev_is_branch = i > 0 && func.get(ids[i - 1]).kind.is_branch();
        let is_join = func.get(id).preds.len() >= 2;
        let starts_new_block = i == 0 || prev_is_branch || is_join;
        if starts_new_block {
            if started {
                current += 1;
            }
            started = true;
        }
        func.get_mut(id).block = Some(current);
    }
}
