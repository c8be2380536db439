//! Data-flow dead-code elimination (spec §4.7, component C8).
//!
//! Starting from every `Ret` and `FnCall`, walks backwards over the DDG
//! (`ddg_stmts`, populated by [`crate::ddg::build`]) marking every `Store`
//! whose value a kept node can observe, transitively through each kept
//! store's own operand tree. Then extends the mark over whole natural
//! loops: if any node in a loop is required, every node in that loop stays,
//! since a loop's side effects (e.g. the induction variable's own update)
//! are only meaningful as a unit. Never deletes `Cond`, `Jump`, `Ret`, or
//! `FnCall`, matching spec §4.7 exactly.

use std::collections::HashSet;

use crate::dominators::dominates;
use crate::node::{NodeId, NodeKind};
use crate::unit::Function;

pub fn run(func: &mut Function) {
    let mut required: HashSet<NodeId> = HashSet::new();
    let mut worklist: Vec<NodeId> = Vec::new();

    for id in func.node_ids() {
        if matches!(func.get(id).kind, NodeKind::Ret { .. } | NodeKind::FnCall { .. }) && required.insert(id) {
            worklist.push(id);
        }
    }

    while let Some(id) = worklist.pop() {
        for dep in ddg_deps(func, id) {
            if required.insert(dep) {
                worklist.push(dep);
            }
        }
    }

    extend_over_loops(func, &mut required);

    let dead: Vec<_> = func
        .node_ids()
        .into_iter()
        .filter(|id| {
            !required.contains(id)
                && !matches!(
                    func.get(*id).kind,
                    NodeKind::Cond { .. } | NodeKind::Jump { .. } | NodeKind::Ret { .. } | NodeKind::FnCall { .. }
                )
        })
        .collect();
    if dead.is_empty() {
        return;
    }
    tracing::debug!(function = %func.name, removed = dead.len(), "data-flow dead-code elimination");
    for id in dead {
        func.unlink(id);
    }
    // unlink only patches prev/next and drops edges touching the removed
    // node; it does not stitch a replacement succ/pred edge across the gap,
    // so surviving straight-line neighbors need their CFG edges refreshed.
    crate::cfg::build(func);
}

/// Every `Store` node reachable from `id`'s operand tree via `ddg_stmts`.
fn ddg_deps(func: &Function, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let kind = func.get(id).kind.clone();
    for op in kind.operands() {
        collect_ddg(func, op, &mut out);
    }
    out
}

fn collect_ddg(func: &Function, id: NodeId, out: &mut Vec<NodeId>) {
    let kind = func.get(id).kind.clone();
    if let NodeKind::Sym(_) = &kind {
        out.extend(func.get(id).ddg_stmts.iter().copied());
    }
    for op in kind.operands() {
        collect_ddg(func, op, out);
    }
}

/// Back-edge-based natural loop discovery: an edge `n -> h` is a back edge
/// when `h` dominates `n`; the loop body is `h` plus every node that can
/// reach `n` without leaving through `h`.
fn natural_loops(func: &Function) -> Vec<HashSet<NodeId>> {
    let mut loops = Vec::new();
    for id in func.node_ids() {
        for &s in &func.get(id).succs.clone() {
            if dominates(func, s, id) {
                loops.push(loop_body(func, id, s));
            }
        }
    }
    loops
}

fn loop_body(func: &Function, tail: NodeId, header: NodeId) -> HashSet<NodeId> {
    let mut body = HashSet::from([header, tail]);
    let mut stack = vec![tail];
    while let Some(n) = stack.pop() {
        for &p in &func.get(n).preds {
            if body.insert(p) {
                stack.push(p);
            }
        }
    }
    body
}

fn extend_over_loops(func: &Function, required: &mut HashSet<NodeId>) {
    for body in natural_loops(func) {
        if body.iter().any(|id| required.contains(id)) {
            required.extend(body);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Expr, FnDef, Item, Param, Stmt};
    use crate::build::build_unit;
    use crate::node::BinOp;
    use crate::ty::{DataKind, Type};

    fn int_ty() -> Type {
        Type::new_scalar(DataKind::Int, 0)
    }

    fn analyzed(def: FnDef) -> Function {
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        let func = unit.functions.first_mut().unwrap();
        crate::cfg::build(func);
        crate::dominators::build(func);
        crate::ddg::build(func);
        unit.functions.into_iter().next().unwrap()
    }

    #[test]
    fn store_to_a_never_read_local_is_removed() {
        let mut func = analyzed(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::VarDecl {
                    name: "unused".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(99)),
                },
                Stmt::Return(Some(Expr::int_lit(1))),
            ],
        });
        run(&mut func);
        let has_unused_store = func.iter().any(|(_, n)| {
            matches!(&n.kind, NodeKind::Store { dest, .. } if matches!(&func.get(*dest).kind, NodeKind::Sym(s) if s.idx == 0))
        });
        assert!(!has_unused_store);
    }

    #[test]
    fn store_feeding_the_return_value_survives() {
        let mut func = analyzed(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::VarDecl {
                    name: "x".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(5)),
                },
                Stmt::Return(Some(Expr::var("x", int_ty()))),
            ],
        });
        run(&mut func);
        assert!(func.iter().any(|(_, n)| matches!(n.kind, NodeKind::Store { .. })));
    }

    #[test]
    fn a_loops_induction_update_is_kept_even_though_nothing_reads_it_after_the_loop() {
        let mut func = analyzed(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::VarDecl {
                    name: "i".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(0)),
                },
                Stmt::While {
                    cond: Expr::binary(BinOp::Lt, Expr::var("i", int_ty()), Expr::int_lit(10), int_ty()),
                    body: vec![Stmt::Expr(Expr::unary(
                        crate::ast::UnaryOp::PreInc,
                        Expr::var("i", int_ty()),
                        int_ty(),
                    ))],
                },
                Stmt::Return(Some(Expr::int_lit(0))),
            ],
        });
        run(&mut func);
        // the increment store to `i` must survive: it's inside the loop whose
        // condition check is required (Cond is never deleted).
        let i_stores = func
            .iter()
            .filter(|(_, n)| {
                matches!(&n.kind, NodeKind::Store { dest, .. } if matches!(&func.get(*dest).kind, NodeKind::Sym(s) if s.idx == 0))
            })
            .count();
        assert!(i_stores >= 1);
    }
}
