//! IR builder / lowering from AST (spec §4.1, component C2).
//!
//! A one-pass lowering: traverses the AST in program order, emitting a
//! linearized node list with jump/cond targets resolved by backpatching
//! once their destination is known, exactly as spec §4.1 describes. Symbol
//! storage (`name -> local idx`) is re-initialized at every function entry.

use std::collections::HashMap;

use crate::ast::{self, Ast, Expr, ExprKind, Item, Stmt, UnaryOp};
use crate::error::CoreError;
use crate::node::{BinOp, ImmValue, NodeId, NodeKind, Sym};
use crate::ty::{DataKind, Type};
use crate::unit::{Function, TypeDecl, Unit};

/// Lowers a whole unit: struct declarations pass through verbatim, each
/// function is lowered independently with fresh symbol storage.
pub fn build_unit(ast: &Ast) -> Result<Unit, CoreError> {
    let mut unit = Unit::new();
    let mut seen = std::collections::HashSet::new();

    for item in &ast.items {
        match item {
            Item::Struct(s) => unit.type_decls.push(TypeDecl {
                name: s.name.clone(),
                fields: s.fields.clone(),
            }),
            Item::Fn(f) => {
                if !seen.insert(f.name.clone()) {
                    return Err(CoreError::DuplicateFunction(f.name.clone()));
                }
                let func = build_function(f)?;
                unit.functions.push(func);
            }
        }
    }
    Ok(unit)
}

fn build_function(def: &ast::FnDef) -> Result<Function, CoreError> {
    tracing::debug!(function = %def.name, "lowering function");

    let mut b = FnBuilder {
        func: Function::new(&def.name, def.ret_ty.clone()),
        symbols: HashMap::new(),
        tail: None,
    };

    for p in &def.params {
        let idx = b.declare_local(&p.name, p.ty.clone(), false)?;
        b.func.params.push(idx);
    }

    let pending = b.lower_block(&def.body)?;

    // Land any still-open backpatches (an `if` with no `else` at the end of
    // the function, a loop exit, ...) on a synthesized implicit return, and
    // make sure every function body actually ends in a `Ret`.
    let needs_implicit_ret = match b.tail {
        None => true,
        Some(id) => !matches!(b.func.get(id).kind, NodeKind::Ret { .. }),
    };
    if needs_implicit_ret {
        let ret_id = b.push(NodeKind::Ret { value: None });
        b.patch_pending(pending, ret_id);
    } else if let Some(tail) = b.tail {
        b.patch_pending(pending, tail);
    }

    Ok(b.func)
}

/// Per-function lowering state.
struct FnBuilder {
    func: Function,
    symbols: HashMap<String, u32>,
    tail: Option<NodeId>,
}

impl FnBuilder {
    fn declare_local(&mut self, name: &str, ty: Type, is_array: bool) -> Result<u32, CoreError> {
        let idx = self.func.locals.len() as u32;
        let kind = if is_array {
            NodeKind::AllocaArray { ty, idx }
        } else {
            NodeKind::Alloca { ty, idx }
        };
        let id = self.push(kind);
        self.func.locals.push(id);
        self.symbols.insert(name.to_string(), idx);
        Ok(idx)
    }

    fn lookup(&self, name: &str) -> Result<u32, CoreError> {
        self.symbols
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::Invariant(format!("use of undeclared symbol `{name}`")))
    }

    /// Allocates a node and links it at the current tail.
    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.func.push_back(&mut self.tail, kind)
    }

    /// Allocates a node without linking it (an operand reference).
    fn detached(&mut self, kind: NodeKind) -> NodeId {
        self.func.alloc(kind)
    }

    fn sym(&mut self, idx: u32) -> NodeId {
        self.detached(NodeKind::Sym(Sym::new(idx)))
    }

    fn imm(&mut self, v: ImmValue) -> NodeId {
        self.detached(NodeKind::Imm(v))
    }

    fn patch_target(&mut self, jump_or_cond: NodeId, target: NodeId) {
        match &mut self.func.get_mut(jump_or_cond).kind {
            NodeKind::Jump { target: t } => *t = target,
            NodeKind::Cond { target: t, .. } => *t = target,
            other => unreachable!("patch_target called on {other:?}"),
        }
    }

    fn patch_pending(&mut self, pending: Vec<NodeId>, target: NodeId) {
        for id in pending {
            self.patch_target(id, target);
        }
    }

    /// Lowers a statement list, threading backpatches for jumps whose target
    /// is "whatever comes right after this statement" across statement
    /// boundaries. Returns the jumps still open at the end of the block -
    /// the caller resolves those against whatever follows the block.
    fn lower_block(&mut self, block: &[Stmt]) -> Result<Vec<NodeId>, CoreError> {
        let mut pending: Vec<NodeId> = Vec::new();
        for stmt in block {
            let (first_id, trailing) = self.lower_stmt(stmt)?;
            if let Some(id) = first_id {
                if !pending.is_empty() {
                    let to_patch = std::mem::take(&mut pending);
                    self.patch_pending(to_patch, id);
                }
            }
            pending.extend(trailing);
        }
        Ok(pending)
    }

    /// Lowers one statement. Returns `(first node linked for this statement,
    /// jumps left open awaiting "what comes next")`.
    fn lower_stmt(&mut self, stmt: &Stmt) -> Result<(Option<NodeId>, Vec<NodeId>), CoreError> {
        match stmt {
            Stmt::VarDecl { name, ty, init } => {
                let is_array = ty.is_array();
                let alloca_id = self.declare_local(name, ty.clone(), is_array)?;
                let alloca_node = self.func.locals[alloca_id as usize];
                if let Some(init) = init {
                    let val = self.lower_expr(init)?;
                    let dest = self.sym(alloca_id);
                    self.push(NodeKind::Store { dest, body: val });
                }
                Ok((Some(alloca_node), Vec::new()))
            }
            Stmt::ArrayDecl { name, ty } => {
                let alloca_id = self.declare_local(name, ty.clone(), true)?;
                Ok((Some(self.func.locals[alloca_id as usize]), Vec::new()))
            }
            Stmt::Expr(e) => {
                let before = self.tail;
                let _ = self.lower_expr(e)?;
                // A bare expression statement always produces at least one
                // linked node (an assignment's `Store`, or a hoisted
                // temporary's `Store` for a call/binary expression used for
                // its side effect only).
                let first = self.first_linked_after(before);
                Ok((first, Vec::new()))
            }
            Stmt::Return(value) => {
                let value = value.as_ref().map(|e| self.lower_expr(e)).transpose()?;
                let id = self.push(NodeKind::Ret { value });
                Ok((Some(id), Vec::new()))
            }
            Stmt::Block(inner) => {
                let before = self.tail;
                let trailing = self.lower_block(inner)?;
                Ok((self.first_linked_after(before), trailing))
            }
            Stmt::If {
                cond,
                then_branch,
                else_branch,
            } => self.lower_if(cond, then_branch, else_branch.as_deref()),
            Stmt::While { cond, body } => self.lower_while(cond, body),
            Stmt::DoWhile { body, cond } => self.lower_do_while(body, cond),
            Stmt::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init.as_deref(), cond.as_ref(), step.as_ref(), body),
        }
    }

    /// The first node linked strictly after `before` (used when a helper
    /// needs to know what a sub-lowering started with).
    fn first_linked_after(&self, before: Option<NodeId>) -> Option<NodeId> {
        match before {
            None => self.func.entry,
            Some(id) => self.func.get(id).next,
        }
    }

    /// Wraps a condition value into `Bin(!=, c, Imm(0))`, matching the
    /// builder rule in spec §4.1 so every branch tests a proper boolean.
    fn truthy(&mut self, cond_val: NodeId) -> NodeId {
        let zero = self.imm(ImmValue::Int(0));
        self.detached(NodeKind::Bin {
            op: BinOp::Ne,
            lhs: cond_val,
            rhs: zero,
        })
    }

    fn lower_if(
        &mut self,
        cond: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
    ) -> Result<(Option<NodeId>, Vec<NodeId>), CoreError> {
        let cond_val = self.lower_expr(cond)?;
        let cond_bin = self.truthy(cond_val);

        // Placeholder target: patched below once the then-branch's first
        // node is known. `target` is set to itself as a harmless sentinel.
        let cond_id = self.push(NodeKind::Cond {
            cond: cond_bin,
            target: NodeId(u32::MAX),
        });
        let exit_jump = self.push(NodeKind::Jump {
            target: NodeId(u32::MAX),
        });

        let before_then = self.tail;
        let then_pending = self.lower_block(then_branch)?;
        let then_start = self
            .first_linked_after(before_then)
            .expect("then-branch must not be empty after a Cond was just emitted");
        self.patch_target(cond_id, then_start);

        let mut trailing = then_pending;

        match else_branch {
            None => {
                trailing.push(exit_jump);
                Ok((Some(cond_id), trailing))
            }
            Some(else_stmts) => {
                let skip_jump = self.push(NodeKind::Jump {
                    target: NodeId(u32::MAX),
                });
                let before_else = self.tail;
                let else_pending = self.lower_block(else_stmts)?;
                let else_start = self
                    .first_linked_after(before_else)
                    .expect("else-branch must not be empty after a skip jump was just emitted");
                self.patch_target(exit_jump, else_start);

                trailing.extend(else_pending);
                trailing.push(skip_jump);
                Ok((Some(cond_id), trailing))
            }
        }
    }

    fn lower_while(&mut self, cond: &Expr, body: &[Stmt]) -> Result<(Option<NodeId>, Vec<NodeId>), CoreError> {
        let before_cond = self.tail;
        let cond_val = self.lower_expr(cond)?;
        let cond_bin = self.truthy(cond_val);
        let cond_start = match before_cond {
            None => self.func.entry,
            Some(id) => self.func.get(id).next,
        };

        let cond_id = self.push(NodeKind::Cond {
            cond: cond_bin,
            target: NodeId(u32::MAX),
        });
        let cond_entry = cond_start.unwrap_or(cond_id);
        let exit_jump = self.push(NodeKind::Jump {
            target: NodeId(u32::MAX),
        });

        let before_body = self.tail;
        let body_pending = self.lower_block(body)?;
        let body_start = self.first_linked_after(before_body);
        self.patch_target(cond_id, body_start.unwrap_or(cond_entry));

        // The back-edge is always the very next node after the body, so any
        // jump left open inside the body (e.g. an `if` with no `else` at the
        // body's tail) lands on it - which then falls straight back to the
        // condition check.
        let back_edge = self.push(NodeKind::Jump { target: cond_entry });
        self.patch_pending(body_pending, back_edge);

        Ok((Some(cond_entry), vec![exit_jump]))
    }

    fn lower_do_while(&mut self, body: &[Stmt], cond: &Expr) -> Result<(Option<NodeId>, Vec<NodeId>), CoreError> {
        let before_body = self.tail;
        let body_pending = self.lower_block(body)?;
        let body_start = self
            .first_linked_after(before_body)
            .ok_or_else(|| CoreError::Invariant("do-while body must not be empty".into()))?;

        let before_cond = self.tail;
        let cond_val = self.lower_expr(cond)?;
        let cond_bin = self.truthy(cond_val);
        let cond_start = self
            .first_linked_after(before_cond)
            .expect("truthy() always allocates at least one detached node, but the Cond below is always linked");
        self.push(NodeKind::Cond {
            cond: cond_bin,
            target: body_start,
        });

        // Anything left open inside the body falls through to the condition
        // check, which is the very next linked node after the body.
        self.patch_pending(body_pending, cond_start);

        Ok((Some(body_start), Vec::new()))
    }

    fn lower_for(
        &mut self,
        init: Option<&Stmt>,
        cond: Option<&Expr>,
        step: Option<&Expr>,
        body: &[Stmt],
    ) -> Result<(Option<NodeId>, Vec<NodeId>), CoreError> {
        let mut first_overall: Option<NodeId> = None;
        let mut init_pending: Vec<NodeId> = Vec::new();
        if let Some(init) = init {
            let (first, trailing) = self.lower_stmt(init)?;
            first_overall = first;
            init_pending = trailing;
        }

        let before_cond = self.tail;
        let cond_val = match cond {
            Some(c) => self.lower_expr(c)?,
            None => self.imm(ImmValue::Bool(true)),
        };
        let cond_bin = self.truthy(cond_val);
        let cond_start = self.first_linked_after(before_cond);

        if !init_pending.is_empty() {
            let target = cond_start.expect("condition always emits at least the truthiness check's Cond, below");
            self.patch_pending(init_pending, target);
        }

        let cond_id = self.push(NodeKind::Cond {
            cond: cond_bin,
            target: NodeId(u32::MAX),
        });
        let cond_entry = cond_start.unwrap_or(cond_id);
        if first_overall.is_none() {
            first_overall = Some(cond_entry);
        }
        let exit_jump = self.push(NodeKind::Jump {
            target: NodeId(u32::MAX),
        });

        let before_body = self.tail;
        let body_pending = self.lower_block(body)?;
        let body_start = self.first_linked_after(before_body);
        self.patch_target(cond_id, body_start.unwrap_or(cond_entry));

        let before_step = self.tail;
        if let Some(step) = step {
            let _ = self.lower_expr(step)?;
        }
        let step_start = self.first_linked_after(before_step);
        if !body_pending.is_empty() {
            let target = step_start.unwrap_or(cond_entry);
            self.patch_pending(body_pending, target);
        }

        self.push(NodeKind::Jump { target: cond_entry });

        Ok((first_overall, vec![exit_jump]))
    }

    /// Lowers an expression to a value reference: an `Imm`, `StrLit`, or
    /// `Sym` node id (spec §4.1's "last_value"). `Bin` and `FnCall`
    /// sub-results are always hoisted through a fresh temporary first.
    fn lower_expr(&mut self, e: &Expr) -> Result<NodeId, CoreError> {
        match &e.kind {
            ExprKind::Bool(v) => Ok(self.imm(ImmValue::Bool(*v))),
            ExprKind::Char(v) => Ok(self.imm(ImmValue::Char(*v))),
            ExprKind::Int(v) => Ok(self.imm(ImmValue::Int(*v))),
            ExprKind::Float(v) => Ok(self.imm(ImmValue::Float(*v))),
            ExprKind::Str(s) => Ok(self.detached(NodeKind::StrLit(s.clone()))),
            ExprKind::Var(name) => {
                let idx = self.lookup(name)?;
                Ok(self.sym(idx))
            }
            ExprKind::Unary(op, operand) => self.lower_unary(*op, operand, &e.ty),
            ExprKind::Binary(op, lhs, rhs) => {
                let l = self.lower_expr(lhs)?;
                let r = self.lower_expr(rhs)?;
                self.hoist_bin(*op, l, r, &e.ty)
            }
            ExprKind::Assign(target, value) => self.lower_assign(target, value),
            ExprKind::Call(name, args) => {
                let mut lowered = Vec::with_capacity(args.len());
                for a in args {
                    lowered.push(self.lower_expr(a)?);
                }
                self.hoist_call(name, lowered, &e.ty)
            }
            ExprKind::Member(base, field_idx) => {
                let ExprKind::Var(name) = &base.kind else {
                    return Err(CoreError::Invariant(
                        "member access is only supported on a plain local".into(),
                    ));
                };
                let idx = self.lookup(name)?;
                Ok(self.detached(NodeKind::Member {
                    idx,
                    field_idx: *field_idx,
                }))
            }
        }
    }

    fn hoist_bin(&mut self, op: BinOp, lhs: NodeId, rhs: NodeId, ty: &Type) -> Result<NodeId, CoreError> {
        let bin = self.detached(NodeKind::Bin { op, lhs, rhs });
        let t = self.declare_local(&self.fresh_temp_name(), ty.clone(), false)?;
        let dest = self.sym(t);
        self.push(NodeKind::Store { dest, body: bin });
        Ok(self.sym(t))
    }

    fn hoist_call(&mut self, name: &str, args: Vec<NodeId>, ty: &Type) -> Result<NodeId, CoreError> {
        let call = self.detached(NodeKind::FnCall {
            name: name.to_string(),
            args,
        });
        if matches!(ty.kind, DataKind::Void) {
            // A void call used for its side effect only; still route it
            // through a discarded temporary so it is one of the `Store`
            // body shapes spec §3.2 enumerates, and so it remains linked
            // into the body (a bare `FnCall` node is never linked on its
            // own in this lowering).
            let t = self.declare_local(&self.fresh_temp_name(), Type::void(), false)?;
            let dest = self.sym(t);
            self.push(NodeKind::Store { dest, body: call });
            return Ok(self.sym(t));
        }
        let t = self.declare_local(&self.fresh_temp_name(), ty.clone(), false)?;
        let dest = self.sym(t);
        self.push(NodeKind::Store { dest, body: call });
        Ok(self.sym(t))
    }

    fn fresh_temp_name(&self) -> String {
        format!("%t{}", self.func.locals.len())
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, ty: &Type) -> Result<NodeId, CoreError> {
        match op {
            UnaryOp::Neg => {
                let v = self.lower_expr(operand)?;
                let zero = self.imm_for(ty, 0);
                self.hoist_bin(BinOp::Sub, zero, v, ty)
            }
            UnaryOp::BitNot => {
                let v = self.lower_expr(operand)?;
                let neg_one = self.imm_for(ty, -1);
                self.hoist_bin(BinOp::BitXor, v, neg_one, ty)
            }
            UnaryOp::Not => {
                let v = self.lower_expr(operand)?;
                let zero = self.imm_for(ty, 0);
                self.hoist_bin(BinOp::Eq, v, zero, ty)
            }
            UnaryOp::AddrOf | UnaryOp::Deref => {
                let ExprKind::Var(name) = &operand.kind else {
                    return Err(CoreError::Invariant(
                        "addr-of / deref is only supported on a plain local".into(),
                    ));
                };
                let idx = self.lookup(name)?;
                let mut s = Sym::new(idx);
                s.addr_of = matches!(op, UnaryOp::AddrOf);
                s.deref = matches!(op, UnaryOp::Deref);
                Ok(self.detached(NodeKind::Sym(s)))
            }
            UnaryOp::PreInc | UnaryOp::PreDec | UnaryOp::PostInc | UnaryOp::PostDec => {
                let ExprKind::Var(name) = &operand.kind else {
                    return Err(CoreError::Invariant("++/-- target must be a plain local".into()));
                };
                let idx = self.lookup(name)?;
                let is_inc = matches!(op, UnaryOp::PreInc | UnaryOp::PostInc);
                let is_post = matches!(op, UnaryOp::PostInc | UnaryOp::PostDec);

                let old_val_sym = if is_post {
                    // Snapshot the old value into a temporary before mutating.
                    let t = self.declare_local(&self.fresh_temp_name(), ty.clone(), false)?;
                    let dest = self.sym(t);
                    let src = self.sym(idx);
                    self.push(NodeKind::Store { dest, body: src });
                    Some(t)
                } else {
                    None
                };

                let lhs = self.sym(idx);
                let one = self.imm_for(ty, 1);
                let bin_op = if is_inc { BinOp::Add } else { BinOp::Sub };
                let bin = self.detached(NodeKind::Bin {
                    op: bin_op,
                    lhs,
                    rhs: one,
                });
                let dest = self.sym(idx);
                self.push(NodeKind::Store { dest, body: bin });

                match old_val_sym {
                    Some(t) => Ok(self.sym(t)),
                    None => Ok(self.sym(idx)),
                }
            }
        }
    }

    fn imm_for(&mut self, ty: &Type, v: i64) -> NodeId {
        let value = match ty.kind {
            DataKind::Float => ImmValue::Float(v as f32),
            DataKind::Bool => ImmValue::Bool(v != 0),
            DataKind::Char => ImmValue::Char(v as u8),
            _ => ImmValue::Int(v as i32),
        };
        self.imm(value)
    }

    fn lower_assign(&mut self, target: &Expr, value: &Expr) -> Result<NodeId, CoreError> {
        let val = self.lower_expr(value)?;
        match &target.kind {
            ExprKind::Var(name) => {
                let idx = self.lookup(name)?;
                let dest = self.sym(idx);
                self.push(NodeKind::Store { dest, body: val });
                Ok(self.sym(idx))
            }
            ExprKind::Unary(UnaryOp::Deref, inner) => {
                let ExprKind::Var(name) = &inner.kind else {
                    return Err(CoreError::Invariant("deref-store target must be a plain local".into()));
                };
                let idx = self.lookup(name)?;
                let mut s = Sym::new(idx);
                s.deref = true;
                let dest = self.detached(NodeKind::Sym(s));
                self.push(NodeKind::Store { dest, body: val });
                Ok(self.sym(idx))
            }
            _ => Err(CoreError::Invariant("unsupported assignment target".into())),
        }
    }
}
