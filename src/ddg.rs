//! Data-dependence graph construction (spec §4.6, component C7).
//!
//! A forward data-flow fixed point over `last_store[k] -> set of Store
//! node ids`, rather than the reference's single linear pass: at a node
//! with more than one predecessor, the live-store set for a symbol is the
//! **union** of what each predecessor carries, which precisely resolves the
//! reference's documented merge-point approximation (spec §4.6, Design
//! Notes). `ddg_stmts` is used only by the optimizer (§4.7); an
//! over-approximation (extra entries) is safe, an under-approximation is
//! not, and this computes the exact set.

use std::collections::{BTreeSet, HashMap};

use crate::node::{NodeId, NodeKind};
use crate::unit::Function;

type LiveStores = HashMap<u32, BTreeSet<NodeId>>;

pub fn build(func: &mut Function) {
    let ids = func.node_ids();
    if ids.is_empty() {
        return;
    }
    tracing::debug!(function = %func.name, nodes = ids.len(), "ddg construction");

    let mut state_in: HashMap<NodeId, LiveStores> = ids.iter().map(|&id| (id, LiveStores::new())).collect();
    let mut state_out: HashMap<NodeId, LiveStores> = ids.iter().map(|&id| (id, LiveStores::new())).collect();

    let mut changed = true;
    while changed {
        changed = false;
        for &id in &ids {
            let preds = func.get(id).preds.clone();
            let mut merged = LiveStores::new();
            for p in &preds {
                for (k, set) in &state_out[p] {
                    merged.entry(*k).or_default().extend(set.iter().copied());
                }
            }
            if merged != state_in[&id] {
                state_in.insert(id, merged.clone());
                changed = true;
            }

            let mut out = merged;
            if let NodeKind::Store { dest, .. } = &func.get(id).kind {
                if let NodeKind::Sym(s) = &func.get(*dest).kind {
                    if !s.deref {
                        out.insert(s.idx, BTreeSet::from([id]));
                    }
                }
            }
            if out != state_out[&id] {
                state_out.insert(id, out);
                changed = true;
            }
        }
    }

    for &id in &ids {
        let kind = func.get(id).kind.clone();
        let live = state_in[&id].clone();
        for op in kind.operands() {
            annotate_uses(func, op, &live);
        }
    }
}

fn annotate_uses(func: &mut Function, id: NodeId, live: &LiveStores) {
    let kind = func.get(id).kind.clone();
    if let NodeKind::Sym(s) = &kind {
        if let Some(set) = live.get(&s.idx) {
            func.get_mut(id).ddg_stmts = set.clone();
        }
    }
    for op in kind.operands() {
        annotate_uses(func, op, live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Expr, FnDef, Item, Param, Stmt};
    use crate::build::build_unit;
    use crate::ty::{DataKind, Type};

    fn int_ty() -> Type {
        Type::new_scalar(DataKind::Int, 0)
    }

    #[test]
    fn use_after_merge_sees_both_incoming_stores() {
        let def = FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::VarDecl {
                    name: "a".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(0)),
                },
                Stmt::If {
                    cond: Expr::var("a", int_ty()),
                    then_branch: vec![Stmt::Expr(Expr::assign(Expr::var("a", int_ty()), Expr::int_lit(1)))],
                    else_branch: Some(vec![Stmt::Expr(Expr::assign(
                        Expr::var("a", int_ty()),
                        Expr::int_lit(2),
                    ))]),
                },
                Stmt::Return(Some(Expr::var("a", int_ty()))),
            ],
        };
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        let func = unit.functions.first_mut().unwrap();
        crate::cfg::build(func);
        build(func);

        let ret_value = func
            .iter()
            .find_map(|(_, n)| match &n.kind {
                NodeKind::Ret { value } => *value,
                _ => None,
            })
            .unwrap();
        assert_eq!(func.get(ret_value).ddg_stmts.len(), 2);
    }
}
