//! Textual and Graphviz dumps (spec §5, component C11).
//!
//! Two renderings over the same node-list walk: [`dump_function`] prints one
//! line per instruction in list order (`instr_idx`, mnemonic, operands,
//! block number), and [`dot_function`] emits the CFG as a `digraph` the
//! `dot` tool can render. Neither mutates the `Unit`; both are read-only
//! reporting views used for debugging and the round-trip property test.

use std::fmt::Write as _;

use itertools::Itertools;

use crate::node::{Node, NodeId, NodeKind};
use crate::unit::{Function, Unit};

/// Renders every function in `unit` as one text block each, separated by a
/// blank line.
pub fn dump_unit(unit: &Unit) -> String {
    let mut out = String::new();
    for func in &unit.functions {
        out.push_str(&dump_function(func));
        out.push('\n');
    }
    out
}

/// One line per instruction: `<instr_idx>: <mnemonic> <operands>  ; block=<n>`.
pub fn dump_function(func: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "function {}:", func.name);
    for (id, node) in func.iter() {
        let _ = write!(out, "  {:>4}: {}", node.instr_idx, node.kind.mnemonic());
        dump_operands(&mut out, func, id, node);
        if let Some(b) = node.block {
            let _ = write!(out, "  ; block={b}");
        }
        out.push('\n');
    }
    out
}

fn dump_operands(out: &mut String, func: &Function, id: NodeId, node: &Node) {
    match &node.kind {
        NodeKind::Alloca { ty, idx } | NodeKind::AllocaArray { ty, idx } => {
            let _ = write!(out, " %{idx}: {ty}");
        }
        NodeKind::Imm(v) => {
            let _ = write!(out, " {v}");
        }
        NodeKind::StrLit(s) => {
            let _ = write!(out, " {s:?}");
        }
        NodeKind::Sym(s) => {
            let _ = write!(out, " %{}", s.idx);
            if let Some(v) = s.ssa_idx {
                let _ = write!(out, ".{v}");
            }
            if s.addr_of {
                out.push_str(" (addr-of)");
            }
            if s.deref {
                out.push_str(" (deref)");
            }
        }
        NodeKind::Store { dest, body } => {
            let _ = write!(out, " {} <- {}", operand_ref(func, *dest), operand_ref(func, *body));
        }
        NodeKind::Bin { op, lhs, rhs } => {
            let _ = write!(out, " {} {op} {}", operand_ref(func, *lhs), operand_ref(func, *rhs));
        }
        NodeKind::Jump { target } => {
            let _ = write!(out, " -> {target}");
        }
        NodeKind::Cond { cond, target } => {
            let _ = write!(out, " {} ? {target} : {}", operand_ref(func, *cond), next_or(node));
        }
        NodeKind::Ret { value } => {
            if let Some(v) = value {
                let _ = write!(out, " {}", operand_ref(func, *v));
            }
        }
        NodeKind::Member { idx, field_idx } => {
            let _ = write!(out, " %{idx}.{field_idx}");
        }
        NodeKind::FnCall { name, args } => {
            let joined = args.iter().map(|a| operand_ref(func, *a)).join(", ");
            let _ = write!(out, " {name}({joined})");
        }
        NodeKind::Phi { sym_idx, ssa_idx, operands } => {
            let _ = write!(out, " %{sym_idx}");
            if let Some(v) = ssa_idx {
                let _ = write!(out, ".{v}");
            }
            let joined = operands.iter().map(|o| format!("[{} : {:?}]", o.pred_block, o.ssa_idx)).join(", ");
            let _ = write!(out, " = phi({joined})");
        }
        NodeKind::Push | NodeKind::Pop => {}
    }
    let _ = id;
}

fn operand_ref(func: &Function, id: NodeId) -> String {
    match &func.get(id).kind {
        NodeKind::Imm(v) => v.to_string(),
        NodeKind::StrLit(s) => format!("{s:?}"),
        NodeKind::Sym(s) => match s.ssa_idx {
            Some(v) => format!("%{}.{v}", s.idx),
            None => format!("%{}", s.idx),
        },
        NodeKind::Bin { op, lhs, rhs } => format!("({} {op} {})", operand_ref(func, *lhs), operand_ref(func, *rhs)),
        NodeKind::FnCall { name, args } => {
            format!("{name}({})", args.iter().map(|a| operand_ref(func, *a)).join(", "))
        }
        NodeKind::Member { idx, field_idx } => format!("%{idx}.{field_idx}"),
        other => other.mnemonic().to_string(),
    }
}

fn next_or(node: &Node) -> String {
    match node.next {
        Some(n) => n.to_string(),
        None => "<end>".to_string(),
    }
}

/// Renders `func`'s CFG as a Graphviz `digraph`: one node per instruction
/// (labeled with its mnemonic), one edge per `succs` entry.
pub fn dot_function(func: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}\" {{", func.name);
    for (id, node) in func.iter() {
        let label = dot_escape(&format!("{}: {}", node.instr_idx, node.kind.mnemonic()));
        let _ = writeln!(out, "  n{} [label=\"{label}\"];", id.0);
    }
    for (id, node) in func.iter() {
        for &s in &node.succs {
            let _ = writeln!(out, "  n{} -> n{};", id.0, s.0);
        }
    }
    out.push_str("}\n");
    out
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders `func`'s dominator tree as a Graphviz `digraph`: one edge per
/// non-root `idom` link.
pub fn dot_dominator_tree(func: &Function) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph \"{}_idom\" {{", func.name);
    for (id, node) in func.iter() {
        if let Some(d) = node.idom {
            if d != id {
                let _ = writeln!(out, "  n{} -> n{};", d.0, id.0);
            }
        }
    }
    out.push_str("}\n");
    out
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

    fn sample_unit() -> Unit {
        let def = FnDef {
            name: "main".into(),
            ret_ty: int_ty(),
            params: Vec::<Param>::new(),
            body: vec![Stmt::Return(Some(Expr::int_lit(14)))],
        };
        build_unit(&Ast::new(vec![Item::Fn(def)])).unwrap()
    }

    #[test]
    fn dump_contains_every_instr_idx_and_mnemonic_exactly_once() {
        let unit = sample_unit();
        let func = unit.function("main").unwrap();
        let text = dump_function(func);
        for (_, node) in func.iter() {
            let needle = format!("{}: {}", node.instr_idx, node.kind.mnemonic());
            assert_eq!(
                text.matches(&needle).count(),
                1,
                "expected exactly one occurrence of `{needle}` in:\n{text}"
            );
        }
    }

    #[test]
    fn dot_output_has_one_node_statement_per_instruction() {
        let mut unit = sample_unit();
        let func = unit.function_mut("main").unwrap();
        crate::cfg::build(func);
        let dot = dot_function(func);
        for (id, _) in func.iter() {
            assert!(dot.contains(&format!("n{}", id.0)));
        }
        assert!(dot.starts_with("digraph"));
    }
}
