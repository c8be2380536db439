//! Dominator tree and dominance frontier (spec §4.4, component C5).
//!
//! Uses the Cooper/Harvey/Kennedy iterative data-flow algorithm over a
//! reverse-postorder numbering rather than Lengauer-Tarjan - spec §4.4
//! accepts either provided the result matches the fixed point of `Dom`, and
//! the iterative form is the one that reads naturally against an
//! arena-indexed CFG instead of pointer-chasing.

use std::collections::HashMap;

use crate::node::NodeId;
use crate::unit::Function;

/// Computes `idom`, `idom_back` and `df` for every reachable node in `func`.
/// Requires [`crate::cfg::build`] to have already populated `succs`/`preds`.
pub fn build(func: &mut Function) {
    let Some(entry) = func.entry else { return };
    let rpo = reverse_postorder(func, entry);
    let rpo_num: HashMap<NodeId, usize> = rpo.iter().enumerate().map(|(i, &id)| (id, i)).collect();

    let idom = compute_idom(func, entry, &rpo, &rpo_num);

    for &id in &rpo {
        func.get_mut(id).idom = idom.get(&id).copied();
        func.get_mut(id).idom_back.clear();
    }
    for &id in &rpo {
        if let Some(d) = idom.get(&id).copied() {
            if d != id {
                func.get_mut(d).idom_back.push(id);
            }
        }
    }

    for &id in &rpo {
        func.get_mut(id).df.clear();
    }
    compute_dominance_frontier(func, &rpo, &idom);
}

fn reverse_postorder(func: &Function, entry: NodeId) -> Vec<NodeId> {
    let mut visited = std::collections::HashSet::new();
    let mut postorder = Vec::new();
    let mut stack = vec![(entry, false)];
    while let Some((id, expanded)) = stack.pop() {
        if expanded {
            postorder.push(id);
            continue;
        }
        if !visited.insert(id) {
            continue;
        }
        stack.push((id, true));
        for &s in &func.get(id).succs {
            if !visited.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    postorder.reverse();
    postorder
}

/// Cooper, Harvey & Kennedy, "A Simple, Fast Dominance Algorithm" (2001).
fn compute_idom(
    func: &Function,
    entry: NodeId,
    rpo: &[NodeId],
    rpo_num: &HashMap<NodeId, usize>,
) -> HashMap<NodeId, NodeId> {
    let mut idom: HashMap<NodeId, NodeId> = HashMap::new();
    idom.insert(entry, entry);

    let mut changed = true;
    while changed {
        changed = false;
        for &b in rpo.iter() {
            if b == entry {
                continue;
            }
            let preds = &func.get(b).preds;
            let mut new_idom: Option<NodeId> = None;
            for &p in preds {
                if !idom.contains_key(&p) {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => p,
                    Some(cur) => intersect(cur, p, &idom, rpo_num),
                });
            }
            if let Some(ni) = new_idom {
                if idom.get(&b) != Some(&ni) {
                    idom.insert(b, ni);
                    changed = true;
                }
            }
        }
    }
    idom
}

fn intersect(mut a: NodeId, mut b: NodeId, idom: &HashMap<NodeId, NodeId>, rpo_num: &HashMap<NodeId, usize>) -> NodeId {
    while a != b {
        while rpo_num[&a] > rpo_num[&b] {
            a = idom[&a];
        }
        while rpo_num[&b] > rpo_num[&a] {
            b = idom[&b];
        }
    }
    a
}

/// Cooper's join-based dominance frontier (spec §4.4): for every join point
/// `b` (≥ 2 predecessors), walk each predecessor up the `idom` chain adding
/// `b` to every node visited strictly before `idom(b)`.
fn compute_dominance_frontier(func: &mut Function, rpo: &[NodeId], idom: &HashMap<NodeId, NodeId>) {
    for &b in rpo {
        let preds = func.get(b).preds.clone();
        if preds.len() < 2 {
            continue;
        }
        let Some(&b_idom) = idom.get(&b) else { continue };
        for p in preds {
            if !idom.contains_key(&p) {
                continue;
            }
            let mut runner = p;
            while runner != b_idom {
                func.get_mut(runner).df.insert(b);
                match idom.get(&runner) {
                    Some(&next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
}

/// `true` iff every CFG path from entry to `n` passes through `d` (spec §4.4
/// derived predicate).
pub fn dominates(func: &Function, d: NodeId, n: NodeId) -> bool {
    let mut cur = n;
    loop {
        if cur == d {
            return true;
        }
        match func.get(cur).idom {
            Some(next) if next != cur => cur = next,
            _ => return cur == d,
        }
    }
}

pub fn dominated_by(func: &Function, n: NodeId, d: NodeId) -> bool {
    dominates(func, d, n)
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

    /// A diamond: `if (c) a=1; else a=2; return a;` - the join point
    /// (`return`) must be dominated by entry and have both branches in its
    /// dominance frontier complement (entry dominates everything; the `if`'s
    /// `Cond` is the immediate dominator of the join).
    fn build_diamond() -> crate::unit::Function {
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
        let unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        unit.functions.into_iter().next().unwrap()
    }

    #[test]
    fn entry_is_its_own_immediate_dominator() {
        let mut func = build_diamond();
        crate::cfg::build(&mut func);
        build(&mut func);
        let entry = func.entry.unwrap();
        assert_eq!(func.get(entry).idom, Some(entry));
    }

    #[test]
    fn join_point_is_dominated_by_entry_but_not_by_either_branch() {
        let mut func = build_diamond();
        crate::cfg::build(&mut func);
        build(&mut func);
        let entry = func.entry.unwrap();
        let join = func
            .node_ids()
            .into_iter()
            .find(|&id| func.get(id).preds.len() >= 2)
            .expect("diamond must have a join point");
        assert!(dominates(&func, entry, join));
        for &p in &func.get(join).preds.clone() {
            assert!(!dominates(&func, p, join), "a branch arm must not dominate the join");
        }
    }

    #[test]
    fn dominance_frontier_of_each_branch_arm_is_the_join_point() {
        let mut func = build_diamond();
        crate::cfg::build(&mut func);
        build(&mut func);
        let join = func
            .node_ids()
            .into_iter()
            .find(|&id| func.get(id).preds.len() >= 2)
            .unwrap();
        for &p in &func.get(join).preds.clone() {
            assert!(func.get(p).df.contains(&join));
        }
    }
}
