//! Unreachable-code removal (spec §4.7, component C8).
//!
//! Marks every node reachable from the function entry via CFG edges and
//! unlinks everything else. [`crate::unit::Function::unlink`] fixes
//! `prev`/`next` and the CFG edge sets one node at a time, which composes
//! correctly regardless of deletion order (each unlink reads its node's
//! *current* neighbors, so deleting a run of consecutive dead nodes in any
//! order still leaves the list correctly spliced).

use std::collections::HashSet;

use crate::unit::Function;

pub fn run(func: &mut Function) {
    let Some(entry) = func.entry else { return };
    let mut visited = HashSet::new();
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        for s in func.get(id).succs.clone() {
            stack.push(s);
        }
    }

    let all = func.node_ids();
    let dead: Vec<_> = all.into_iter().filter(|id| !visited.contains(id)).collect();
    if dead.is_empty() {
        return;
    }
    tracing::debug!(function = %func.name, removed = dead.len(), "unreachable-code removal");
    for id in dead {
        func.unlink(id);
    }
    crate::cfg::build(func);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Expr, FnDef, Item, Param, Stmt};
    use crate::build::build_unit;
    use crate::node::NodeKind;
    use crate::ty::{DataKind, Type};

    fn int_ty() -> Type {
        Type::new_scalar(DataKind::Int, 0)
    }

    #[test]
    fn code_after_an_unconditional_return_is_removed() {
        let def = FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::Return(Some(Expr::int_lit(1))),
                Stmt::VarDecl {
                    name: "dead".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(2)),
                },
            ],
        };
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        let func = unit.functions.first_mut().unwrap();
        crate::cfg::build(func);
        run(func);

        assert!(!func.iter().any(|(_, n)| matches!(n.kind, NodeKind::Alloca { .. })));
        let count = func.iter().count();
        assert_eq!(count, 1);
    }
}
