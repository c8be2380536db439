//! Type annotation pass (spec §4.3, component C4).
//!
//! Two passes over a [`crate::unit::Unit`]: first every function's return
//! type is recorded so calls can be typed without forward-declaration order
//! mattering, then each function is walked (including its detached operand
//! subtrees - see [`crate::node::NodeKind::operands`]) annotating every
//! value-producing node with a concrete [`Type`].

use std::collections::HashMap;

use crate::error::CoreError;
use crate::node::{ImmValue, NodeId, NodeKind};
use crate::ty::{DataKind, Type};
use crate::unit::{Function, Unit};

pub fn run(unit: &mut Unit) -> Result<(), CoreError> {
    let sigs = unit.signatures();
    for func in &mut unit.functions {
        tracing::debug!(function = %func.name, nodes = func.node_count(), "type pass");
        let mut locals: HashMap<u32, Type> = HashMap::new();
        for id in func.node_ids() {
            annotate(func, id, &mut locals, &sigs)?;
        }
    }
    Ok(())
}

fn imm_type(v: ImmValue) -> Type {
    match v {
        ImmValue::Bool(_) => Type::new_scalar(DataKind::Bool, 0),
        ImmValue::Char(_) => Type::new_scalar(DataKind::Char, 0),
        ImmValue::Int(_) => Type::new_scalar(DataKind::Int, 0),
        ImmValue::Float(_) => Type::new_scalar(DataKind::Float, 0),
    }
}

/// Annotates `id` (and, recursively, its operands) with a [`Type`], updating
/// `locals` whenever an `Alloca`/`AllocaArray` declares a new symbol.
fn annotate(
    func: &mut Function,
    id: NodeId,
    locals: &mut HashMap<u32, Type>,
    sigs: &HashMap<String, Type>,
) -> Result<(), CoreError> {
    let kind = func.get(id).kind.clone();
    let ty = match &kind {
        NodeKind::Alloca { ty, idx } | NodeKind::AllocaArray { ty, idx } => {
            locals.insert(*idx, ty.clone());
            ty.clone()
        }
        NodeKind::Sym(s) => locals.get(&s.idx).cloned().ok_or_else(|| CoreError::UnknownLocal {
            function: func.name.clone(),
            idx: s.idx,
        })?,
        NodeKind::Imm(v) => imm_type(*v),
        NodeKind::StrLit(_) => Type::new_scalar(DataKind::String, 0),
        NodeKind::Bin { lhs, rhs, .. } => {
            annotate(func, *lhs, locals, sigs)?;
            annotate(func, *rhs, locals, sigs)?;
            func.get(*lhs).ty.clone().unwrap_or_else(Type::unknown)
        }
        NodeKind::Store { dest, body } => {
            annotate(func, *dest, locals, sigs)?;
            annotate(func, *body, locals, sigs)?;
            Type::void()
        }
        NodeKind::Cond { cond, .. } => {
            annotate(func, *cond, locals, sigs)?;
            Type::void()
        }
        NodeKind::Ret { value } => {
            if let Some(v) = value {
                annotate(func, *v, locals, sigs)?;
            }
            Type::void()
        }
        NodeKind::FnCall { name, args } => {
            for a in args.clone() {
                annotate(func, a, locals, sigs)?;
            }
            sigs.get(name)
                .cloned()
                .ok_or_else(|| CoreError::UndefinedFunction(name.clone()))?
        }
        NodeKind::Member { idx, .. } => locals.get(idx).cloned().unwrap_or_else(Type::unknown),
        NodeKind::Phi { sym_idx, .. } => locals.get(sym_idx).cloned().unwrap_or_else(Type::unknown),
        NodeKind::Jump { .. } | NodeKind::Push | NodeKind::Pop => Type::void(),
    };
    func.get_mut(id).ty = Some(ty);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Expr, FnDef, Item, Param, Stmt};
    use crate::build::build_unit;

    fn int_ty() -> Type {
        Type::new_scalar(DataKind::Int, 0)
    }

    #[test]
    fn every_sym_and_imm_gets_a_concrete_type() {
        let def = FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![
                Stmt::VarDecl {
                    name: "x".into(),
                    ty: int_ty(),
                    init: Some(Expr::int_lit(3)),
                },
                Stmt::Return(Some(Expr::var("x", int_ty()))),
            ],
        };
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        run(&mut unit).unwrap();
        let func = unit.function("main").unwrap();
        for (_, node) in func.iter() {
            if matches!(node.kind, NodeKind::Sym(_) | NodeKind::Imm(_)) {
                let ty = node.ty.as_ref().expect("value-producing node must carry a type");
                assert_eq!(ty.bytes(), 4);
            }
        }
    }

    #[test]
    fn call_site_picks_up_the_callees_return_type() {
        let callee = FnDef {
            name: "five".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![Stmt::Return(Some(Expr::int_lit(5)))],
        };
        let caller = FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![Stmt::Return(Some(Expr::call("five", vec![], int_ty())))],
        };
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(callee), Item::Fn(caller)])).unwrap();
        run(&mut unit).unwrap();
        let func = unit.function("main").unwrap();
        let has_typed_call = func
            .iter()
            .any(|(_, n)| matches!(&n.kind, NodeKind::FnCall { .. }) && n.ty.as_ref().unwrap().kind == DataKind::Int);
        assert!(has_typed_call);
    }
}
