//! SSA construction (spec §4.5, component C6).
//!
//! Phase 1 inserts φ-nodes at the iterated dominance frontier of every
//! promotable symbol's store set; phase 2 renames every definition and use
//! to a versioned `(idx, ssa_idx)` pair with a dominator-tree-order stack
//! walk. Requires [`crate::cfg::build`] and [`crate::dominators::build`] to
//! have already run.
//!
//! **Promotion scope (resolved Open Question, see DESIGN.md).** Only scalar
//! locals that are never address-taken (`Sym::addr_of`) are promoted to SSA.
//! Arrays and anything whose address escapes alias memory in ways this
//! language's `Sym`/pointer model does not track precisely enough to version
//! safely; the reference compiler has the same practical limitation. Such
//! symbols keep `ssa_idx = None` on every `Sym` use, which downstream passes
//! already treat as "not SSA-tracked".

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::node::{NodeId, NodeKind, PhiOperand};
use crate::unit::Function;

pub fn build(func: &mut Function) {
    let promotable = promotable_symbols(func);
    if promotable.is_empty() {
        return;
    }
    tracing::debug!(function = %func.name, symbols = promotable.len(), "ssa construction");

    let defs = stores_by_symbol(func, &promotable);
    place_phis(func, &promotable, &defs);
    let mut stacks: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut fresh = 0u32;
    if let Some(entry) = func.entry {
        rename(func, entry, &mut stacks, &mut fresh, &promotable);
    }
}

/// Symbols whose `Alloca` is a non-pointer scalar and whose address is never
/// taken anywhere in the function.
fn promotable_symbols(func: &Function) -> HashSet<u32> {
    let mut candidates = HashSet::new();
    for &local in &func.locals {
        if let NodeKind::Alloca { ty, idx } = &func.get(local).kind {
            if ty.ptr_depth == 0 {
                candidates.insert(*idx);
            }
        }
    }
    let mut addr_taken = HashSet::new();
    for id in func.node_ids() {
        let kind = func.get(id).kind.clone();
        collect_addr_taken(func, &kind, &mut addr_taken);
    }
    &candidates - &addr_taken
}

fn collect_addr_taken(func: &Function, kind: &NodeKind, out: &mut HashSet<u32>) {
    if let NodeKind::Sym(s) = kind {
        if s.addr_of {
            out.insert(s.idx);
        }
    }
    for op in kind.operands() {
        let child = func.get(op).kind.clone();
        collect_addr_taken(func, &child, out);
    }
}

fn stores_by_symbol(func: &Function, promotable: &HashSet<u32>) -> HashMap<u32, Vec<NodeId>> {
    let mut defs: HashMap<u32, Vec<NodeId>> = HashMap::new();
    for id in func.node_ids() {
        if let NodeKind::Store { dest, .. } = &func.get(id).kind {
            if let NodeKind::Sym(s) = &func.get(*dest).kind {
                if !s.deref && promotable.contains(&s.idx) {
                    defs.entry(s.idx).or_default().push(id);
                }
            }
        }
    }
    defs
}

/// Iterated dominance frontier of `defs`, read directly off each node's
/// already-computed `df` set (spec §4.5 phase 1).
fn iterated_df(func: &Function, defs: &[NodeId]) -> BTreeSet<NodeId> {
    let mut result = BTreeSet::new();
    let mut seen: HashSet<NodeId> = defs.iter().copied().collect();
    let mut worklist: Vec<NodeId> = defs.to_vec();
    while let Some(n) = worklist.pop() {
        for &y in &func.get(n).df {
            if result.insert(y) && seen.insert(y) {
                worklist.push(y);
            }
        }
    }
    result
}

fn place_phis(func: &mut Function, promotable: &HashSet<u32>, defs: &HashMap<u32, Vec<NodeId>>) {
    // block -> symbols needing a phi there, in deterministic (sorted) order.
    let mut per_block: HashMap<NodeId, BTreeSet<u32>> = HashMap::new();
    for &sym in promotable {
        let Some(sites) = defs.get(&sym) else { continue };
        for block in iterated_df(func, sites) {
            per_block.entry(block).or_default().insert(sym);
        }
    }

    // Insert in a stable order (by block's instr_idx) so generated phi
    // node ids are deterministic across runs.
    let mut blocks: Vec<NodeId> = per_block.keys().copied().collect();
    blocks.sort_by_key(|id| func.get(*id).instr_idx);

    for block in blocks {
        let syms = per_block.remove(&block).unwrap();
        insert_phi_chain(func, block, &syms);
    }
}

/// Inserts one φ per symbol in `syms` directly before `block`, chaining them
/// together and re-wiring CFG edges so that every predecessor of the
/// original block now flows through the new φ chain first.
fn insert_phi_chain(func: &mut Function, block: NodeId, syms: &BTreeSet<u32>) {
    let original_preds = func.get(block).preds.clone();
    let mut phi_ids = Vec::with_capacity(syms.len());

    for &sym_idx in syms {
        let operands: Vec<PhiOperand> = original_preds
            .iter()
            .map(|&p| PhiOperand {
                pred_block: p,
                ssa_idx: None,
            })
            .collect();
        let phi_id = func.alloc(NodeKind::Phi {
            sym_idx,
            ssa_idx: None,
            operands,
        });
        func.insert_before(block, phi_id);
        phi_ids.push(phi_id);
    }

    // Chain phi -> phi -> ... -> block in CFG terms, and redirect the
    // original predecessors onto the first phi.
    for window in phi_ids.windows(2) {
        func.get_mut(window[0]).succs = vec![window[1]];
        func.get_mut(window[1]).preds = vec![window[0]];
    }
    if let Some(&last) = phi_ids.last() {
        func.get_mut(last).succs = vec![block];
        func.get_mut(block).preds = vec![last];
    }
    if let Some(&first) = phi_ids.first() {
        func.get_mut(first).preds = original_preds.clone();
        for p in original_preds {
            redirect_target(func, p, block, first);
            let succs = &mut func.get_mut(p).succs;
            for s in succs.iter_mut() {
                if *s == block {
                    *s = first;
                }
            }
        }
    }
}

fn redirect_target(func: &mut Function, branch: NodeId, old: NodeId, new: NodeId) {
    match &mut func.get_mut(branch).kind {
        NodeKind::Jump { target } if *target == old => *target = new,
        NodeKind::Cond { target, .. } if *target == old => *target = new,
        _ => {}
    }
}

/// Dominator-tree DFS renaming every symbol simultaneously (spec §4.5 phase
/// 2); a single pass over all symbols at once rather than one DFS per
/// symbol, since the dominator tree traversal order is identical either way
/// and this avoids re-walking the tree once per promoted local.
fn rename(
    func: &mut Function,
    id: NodeId,
    stacks: &mut HashMap<u32, Vec<u32>>,
    fresh: &mut u32,
    promotable: &HashSet<u32>,
) {
    let mut defined_here: Vec<u32> = Vec::new();
    let kind = func.get(id).kind.clone();

    match &kind {
        NodeKind::Alloca { idx, .. } | NodeKind::AllocaArray { idx, .. } => {
            if promotable.contains(idx) {
                push_version(stacks, fresh, *idx, &mut defined_here);
            }
        }
        NodeKind::Phi { sym_idx, .. } => {
            let v = next_version(fresh);
            if let NodeKind::Phi { ssa_idx, .. } = &mut func.get_mut(id).kind {
                *ssa_idx = Some(v);
            }
            stacks.entry(*sym_idx).or_default().push(v);
            defined_here.push(*sym_idx);
        }
        NodeKind::Store { dest, body } => {
            rename_use(func, *body, stacks, promotable);
            let dest_kind = func.get(*dest).kind.clone();
            if let NodeKind::Sym(s) = &dest_kind {
                if !s.deref && promotable.contains(&s.idx) {
                    let v = next_version(fresh);
                    if let NodeKind::Sym(sym) = &mut func.get_mut(*dest).kind {
                        sym.ssa_idx = Some(v);
                    }
                    stacks.entry(s.idx).or_default().push(v);
                    defined_here.push(s.idx);
                } else {
                    rename_use(func, *dest, stacks, promotable);
                }
            }
        }
        NodeKind::Cond { cond, .. } => rename_use(func, *cond, stacks, promotable),
        NodeKind::Ret { value } => {
            if let Some(v) = value {
                rename_use(func, *v, stacks, promotable);
            }
        }
        NodeKind::FnCall { args, .. } => {
            for a in args.clone() {
                rename_use(func, a, stacks, promotable);
            }
        }
        _ => {}
    }

    // Feed live versions into any φ in a CFG successor.
    let succs = func.get(id).succs.clone();
    for s in succs {
        if let NodeKind::Phi { sym_idx, operands, .. } = &mut func.get_mut(s).kind {
            if promotable.contains(sym_idx) {
                if let Some(&top) = stacks.get(sym_idx).and_then(|v| v.last()) {
                    for op in operands.iter_mut() {
                        if op.pred_block == id {
                            op.ssa_idx = Some(top);
                        }
                    }
                }
            }
        }
    }

    let children = func.get(id).idom_back.clone();
    for c in children {
        rename(func, c, stacks, fresh, promotable);
    }

    for idx in defined_here {
        stacks.get_mut(&idx).unwrap().pop();
    }
}

fn next_version(fresh: &mut u32) -> u32 {
    let v = *fresh;
    *fresh += 1;
    v
}

fn push_version(stacks: &mut HashMap<u32, Vec<u32>>, fresh: &mut u32, idx: u32, defined_here: &mut Vec<u32>) {
    let v = next_version(fresh);
    stacks.entry(idx).or_default().push(v);
    defined_here.push(idx);
}

/// Stamps `ssa_idx` on every promotable `Sym` use reachable from `id`
/// (recursing through `Bin`/`FnCall` operand trees).
fn rename_use(func: &mut Function, id: NodeId, stacks: &HashMap<u32, Vec<u32>>, promotable: &HashSet<u32>) {
    let kind = func.get(id).kind.clone();
    if let NodeKind::Sym(s) = &kind {
        if promotable.contains(&s.idx) {
            let top = stacks
                .get(&s.idx)
                .and_then(|v| v.last())
                .copied()
                .expect("ssa: use of a promotable symbol must be dominated by a definition");
            if let NodeKind::Sym(sym) = &mut func.get_mut(id).kind {
                sym.ssa_idx = Some(top);
            }
        }
    }
    for op in kind.operands() {
        rename_use(func, op, stacks, promotable);
    }
}
