//! Arithmetic simplification (spec §4.7, component C8).
//!
//! A fixed-point, top-down rewrite over every `Bin` reachable from a
//! `Store.body` or `Ret.body` (per spec §4.7: "the rewrite reads inside
//! `Store.body` and `Ret.body`"). Because nodes are addressed by
//! [`NodeId`](crate::node::NodeId) rather than owned by their parent,
//! "replacing" a `Bin` with its simplified form is just overwriting the
//! node's own [`NodeKind`] in place - the parent's reference is untouched
//! and needs no relinking.
//!
//! **Scope decision (DESIGN.md):** only the rule-table rows the reference
//! compiler actually executes are implemented - identity/annihilator rules,
//! the power-of-two strength reduction, double-negation/double-complement,
//! `~x + 1 -> -x`, and constant folding. De Morgan, distributivity and
//! general associativity/commutativity are deliberately **not**
//! implemented: the reference carries them only as commented-out dead code
//! with no working implementation to be faithful to, and "apply only when
//! strictly smaller" has no well-defined cost metric in this crate's node
//! model. Implementing them would be inventing behavior the teacher never
//! had, not learning it.

use crate::node::{BinOp, ImmValue, NodeId, NodeKind};
use crate::ty::{DataKind, Type};
use crate::unit::Function;

pub fn run(func: &mut Function) {
    let mut changed = true;
    while changed {
        changed = false;
        for id in func.node_ids() {
            let kind = func.get(id).kind.clone();
            match kind {
                NodeKind::Store { body, .. } => changed |= simplify(func, body),
                NodeKind::Ret { value: Some(v) } => changed |= simplify(func, v),
                _ => {}
            }
        }
    }
}

fn simplify(func: &mut Function, id: NodeId) -> bool {
    let kind = func.get(id).kind.clone();
    let NodeKind::Bin { op, lhs, rhs } = kind else {
        return false;
    };
    let mut changed = simplify(func, lhs);
    changed |= simplify(func, rhs);

    if let Some(new_kind) = try_rewrite(func, op, lhs, rhs) {
        func.get_mut(id).kind = new_kind;
        changed = true;
    }
    changed
}

fn is_imm(kind: &NodeKind) -> Option<ImmValue> {
    match kind {
        NodeKind::Imm(v) => Some(*v),
        _ => None,
    }
}

fn is_zero(kind: &NodeKind) -> bool {
    matches!(
        is_imm(kind),
        Some(ImmValue::Int(0)) | Some(ImmValue::Bool(false)) | Some(ImmValue::Char(0))
    ) || matches!(is_imm(kind), Some(ImmValue::Float(f)) if f == 0.0)
}

fn is_one(kind: &NodeKind) -> bool {
    matches!(is_imm(kind), Some(ImmValue::Int(1)) | Some(ImmValue::Char(1)))
        || matches!(is_imm(kind), Some(ImmValue::Float(f)) if f == 1.0)
}

fn is_neg_one(kind: &NodeKind) -> bool {
    matches!(is_imm(kind), Some(ImmValue::Int(-1)))
}

fn zero_like(kind: &NodeKind, ty: Option<&Type>) -> ImmValue {
    match ty.map(|t| t.kind) {
        Some(DataKind::Float) => ImmValue::Float(0.0),
        Some(DataKind::Bool) => ImmValue::Bool(false),
        Some(DataKind::Char) => ImmValue::Char(0),
        _ => match kind {
            NodeKind::Imm(ImmValue::Float(_)) => ImmValue::Float(0.0),
            NodeKind::Imm(ImmValue::Bool(_)) => ImmValue::Bool(false),
            NodeKind::Imm(ImmValue::Char(_)) => ImmValue::Char(0),
            _ => ImmValue::Int(0),
        },
    }
}

fn same_sym(lhs: &NodeKind, rhs: &NodeKind) -> bool {
    matches!((lhs, rhs), (NodeKind::Sym(a), NodeKind::Sym(b)) if a.idx == b.idx && a.ssa_idx == b.ssa_idx)
}

fn fold_imm(op: BinOp, a: ImmValue, b: ImmValue) -> Option<ImmValue> {
    use BinOp::*;
    match (a, b) {
        (ImmValue::Int(x), ImmValue::Int(y)) => Some(match op {
            Add => ImmValue::Int(x.wrapping_add(y)),
            Sub => ImmValue::Int(x.wrapping_sub(y)),
            Mul => ImmValue::Int(x.wrapping_mul(y)),
            Div if y != 0 => ImmValue::Int(x.wrapping_div(y)),
            Mod if y != 0 => ImmValue::Int(x.wrapping_rem(y)),
            BitAnd => ImmValue::Int(x & y),
            BitOr => ImmValue::Int(x | y),
            BitXor => ImmValue::Int(x ^ y),
            Shl => ImmValue::Int(x.wrapping_shl(y as u32 & 31)),
            Shr => ImmValue::Int(x.wrapping_shr(y as u32 & 31)),
            Eq => ImmValue::Int((x == y) as i32),
            Ne => ImmValue::Int((x != y) as i32),
            Lt => ImmValue::Int((x < y) as i32),
            Le => ImmValue::Int((x <= y) as i32),
            Gt => ImmValue::Int((x > y) as i32),
            Ge => ImmValue::Int((x >= y) as i32),
            LogAnd => ImmValue::Int(((x != 0) && (y != 0)) as i32),
            LogOr => ImmValue::Int(((x != 0) || (y != 0)) as i32),
            _ => return None,
        }),
        (ImmValue::Float(x), ImmValue::Float(y)) => Some(match op {
            Add => ImmValue::Float(x + y),
            Sub => ImmValue::Float(x - y),
            Mul => ImmValue::Float(x * y),
            Div if y != 0.0 => ImmValue::Float(x / y),
            Eq => ImmValue::Int((x == y) as i32),
            Ne => ImmValue::Int((x != y) as i32),
            Lt => ImmValue::Int((x < y) as i32),
            Le => ImmValue::Int((x <= y) as i32),
            Gt => ImmValue::Int((x > y) as i32),
            Ge => ImmValue::Int((x >= y) as i32),
            _ => return None,
        }),
        (ImmValue::Bool(x), ImmValue::Bool(y)) => Some(match op {
            BitAnd => ImmValue::Bool(x & y),
            BitOr => ImmValue::Bool(x | y),
            BitXor => ImmValue::Bool(x ^ y),
            Eq => ImmValue::Int((x == y) as i32),
            Ne => ImmValue::Int((x != y) as i32),
            _ => return None,
        }),
        _ => None,
    }
}

fn try_rewrite(func: &mut Function, op: BinOp, lhs: NodeId, rhs: NodeId) -> Option<NodeKind> {
    let lk = func.get(lhs).kind.clone();
    let rk = func.get(rhs).kind.clone();
    let ty = func.get(lhs).ty.clone();

    if let (Some(a), Some(b)) = (is_imm(&lk), is_imm(&rk)) {
        if let Some(v) = fold_imm(op, a, b) {
            return Some(NodeKind::Imm(v));
        }
    }

    if op == BinOp::Sub && same_sym(&lk, &rk) {
        return Some(NodeKind::Imm(zero_like(&lk, ty.as_ref())));
    }
    if matches!(op, BinOp::Add | BinOp::Sub | BinOp::BitOr) && is_zero(&rk) {
        return Some(lk);
    }
    if matches!(op, BinOp::Mul | BinOp::BitAnd) && is_zero(&rk) {
        return Some(NodeKind::Imm(zero_like(&rk, ty.as_ref())));
    }
    if op == BinOp::Mul {
        if let NodeKind::Imm(ImmValue::Int(n)) = rk {
            if n > 1 && (n as u32).is_power_of_two() {
                let k = (n as u32).trailing_zeros() as i32;
                let k_id = func.alloc(NodeKind::Imm(ImmValue::Int(k)));
                func.get_mut(k_id).ty = Some(Type::new_scalar(DataKind::Int, 0));
                return Some(NodeKind::Bin {
                    op: BinOp::Shl,
                    lhs,
                    rhs: k_id,
                });
            }
        }
    }
    // `- -x` => Sub(0, Sub(0, x)) -> x
    if op == BinOp::Sub && is_zero(&lk) {
        if let NodeKind::Bin {
            op: BinOp::Sub,
            lhs: inner_zero,
            rhs: x,
        } = &rk
        {
            if is_zero(&func.get(*inner_zero).kind) {
                return Some(func.get(*x).kind.clone());
            }
        }
    }
    // `~ ~x` => Xor(Xor(x, -1), -1) -> x
    if op == BinOp::BitXor && is_neg_one(&rk) {
        if let NodeKind::Bin {
            op: BinOp::BitXor,
            lhs: x,
            rhs: inner_neg_one,
        } = &lk
        {
            if is_neg_one(&func.get(*inner_neg_one).kind) {
                return Some(func.get(*x).kind.clone());
            }
        }
    }
    // `~x + 1` => Add(Xor(x, -1), 1) -> Sub(0, x)
    if op == BinOp::Add && is_one(&rk) {
        if let NodeKind::Bin {
            op: BinOp::BitXor,
            lhs: x,
            rhs: neg_one,
        } = &lk
        {
            if is_neg_one(&func.get(*neg_one).kind) {
                let x = *x;
                let zero_id = func.alloc(NodeKind::Imm(zero_like(&func.get(x).kind.clone(), func.get(x).ty.as_ref())));
                func.get_mut(zero_id).ty = func.get(x).ty.clone();
                return Some(NodeKind::Bin {
                    op: BinOp::Sub,
                    lhs: zero_id,
                    rhs: x,
                });
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, Expr, FnDef, Item, Param, Stmt};
    use crate::build::build_unit;
    use crate::ty::Type;

    fn int_ty() -> Type {
        Type::new_scalar(DataKind::Int, 0)
    }

    fn typed_unit(def: FnDef) -> crate::unit::Unit {
        let mut unit = build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap();
        crate::type_pass::run(&mut unit).unwrap();
        unit
    }

    #[test]
    fn constant_folds_two_literal_operands() {
        let mut unit = typed_unit(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![Stmt::Return(Some(Expr::binary(
                BinOp::Add,
                Expr::int_lit(2),
                Expr::binary(BinOp::Mul, Expr::int_lit(3), Expr::int_lit(4), int_ty()),
                int_ty(),
            )))],
        });
        let func = unit.functions.first_mut().unwrap();
        run(func);
        let ret_val = func
            .iter()
            .find_map(|(_, n)| match &n.kind {
                NodeKind::Ret { value } => *value,
                _ => None,
            })
            .unwrap();
        assert_eq!(func.get(ret_val).kind, NodeKind::Imm(ImmValue::Int(14)));
    }

    #[test]
    fn x_plus_zero_becomes_x() {
        let mut unit = typed_unit(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: vec![Param {
                name: "x".into(),
                ty: int_ty(),
            }],
            body: vec![Stmt::Return(Some(Expr::binary(
                BinOp::Add,
                Expr::var("x", int_ty()),
                Expr::int_lit(0),
                int_ty(),
            )))],
        });
        let func = unit.functions.first_mut().unwrap();
        run(func);
        let ret_val = func
            .iter()
            .find_map(|(_, n)| match &n.kind {
                NodeKind::Ret { value } => *value,
                _ => None,
            })
            .unwrap();
        assert!(matches!(func.get(ret_val).kind, NodeKind::Sym(_)));
    }

    #[test]
    fn mul_by_power_of_two_becomes_shift() {
        let mut unit = typed_unit(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: vec![Param {
                name: "x".into(),
                ty: int_ty(),
            }],
            body: vec![Stmt::Return(Some(Expr::binary(
                BinOp::Mul,
                Expr::var("x", int_ty()),
                Expr::int_lit(8),
                int_ty(),
            )))],
        });
        let func = unit.functions.first_mut().unwrap();
        run(func);
        let ret_val = func
            .iter()
            .find_map(|(_, n)| match &n.kind {
                NodeKind::Ret { value } => *value,
                _ => None,
            })
            .unwrap();
        assert!(matches!(
            func.get(ret_val).kind,
            NodeKind::Bin {
                op: BinOp::Shl,
                ..
            }
        ));
    }

    #[test]
    fn pass_is_idempotent() {
        let mut unit = typed_unit(FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: vec![Param {
                name: "x".into(),
                ty: int_ty(),
            }],
            body: vec![Stmt::Return(Some(Expr::binary(
                BinOp::Add,
                Expr::binary(BinOp::Mul, Expr::var("x", int_ty()), Expr::int_lit(4), int_ty()),
                Expr::int_lit(0),
                int_ty(),
            )))],
        });
        let func = unit.functions.first_mut().unwrap();
        run(func);
        let once = format!("{:?}", func.node_ids().iter().map(|&id| func.get(id).kind.clone()).collect::<Vec<_>>());
        run(func);
        let twice = format!("{:?}", func.node_ids().iter().map(|&id| func.get(id).kind.clone()).collect::<Vec<_>>());
        assert_eq!(once, twice);
    }
}
