//! Tree-walking IR interpreter (spec §4.8, component C9).
//!
//! Gives the compiler executable semantics independent of any back end: a
//! byte-addressed stack, a `stack_map[sym_idx] -> offset` per active call
//! frame, and a "last value" register. Entry point is [`eval`], which looks
//! up `main`, invokes it with no arguments, and returns its `Int` result.

pub mod value;

use std::collections::HashMap;

use crate::error::{CoreError, EvalError};
use crate::node::{BinOp, Node, NodeId, NodeKind};
use crate::ty::{DataKind, Type};
use crate::unit::{Function, Unit};
use value::Value;

/// Interpreter-only configuration (spec §4.8 / SPEC_FULL §4.12, component
/// C14). The reference hard-codes a 32768-byte stack; this is that default,
/// made explicit and overridable rather than a magic constant.
#[derive(Debug, Clone, Copy)]
pub struct InterpreterOptions {
    pub stack_size: usize,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        InterpreterOptions { stack_size: 32_768 }
    }
}

/// Evaluates `unit`'s `main` and returns its `Int` result (spec §4.8 entry
/// point, §6 "Interpreter result").
pub fn eval(unit: &Unit, options: &InterpreterOptions) -> Result<i32, EvalError> {
    let mut interp = Interpreter::new(unit, *options);
    interp.run_main()
}

struct Interpreter<'u> {
    unit: &'u Unit,
    stack: Vec<u8>,
    sp: usize,
    stack_map: HashMap<u32, usize>,
    last: Value,
}

impl<'u> Interpreter<'u> {
    fn new(unit: &'u Unit, options: InterpreterOptions) -> Self {
        Interpreter {
            unit,
            stack: vec![0u8; options.stack_size],
            sp: 0,
            stack_map: HashMap::new(),
            last: Value::Int(0),
        }
    }

    fn run_main(&mut self) -> Result<i32, EvalError> {
        let main = self
            .unit
            .function("main")
            .ok_or_else(|| EvalError::Core(CoreError::MissingMain))?;
        if !matches!(main.ret_ty.kind, DataKind::Int) {
            return Err(EvalError::Core(CoreError::MainMustReturnInt(main.ret_ty.kind.to_string())));
        }
        match self.call_eval("main", &[])? {
            Value::Int(i) => Ok(i),
            other => Err(EvalError::Core(CoreError::MainMustReturnInt(format!("{other:?}")))),
        }
    }

    /// The interpreter's call-frame prologue/epilogue (spec §4.8 `FnCall`):
    /// save `sp`/`stack_map`, bind parameters into the new frame, run the
    /// callee's per-instruction loop, then restore the caller's frame.
    fn call_eval(&mut self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        let func = self
            .unit
            .function(name)
            .ok_or_else(|| EvalError::MissingFunction(name.to_string()))?;
        tracing::debug!(function = name, "call_eval");

        let saved_sp = self.sp;
        let saved_map = std::mem::take(&mut self.stack_map);

        let mut frame_map = HashMap::new();
        for (&param_idx, arg) in func.params.iter().zip(args) {
            let offset = self.push_value(arg)?;
            frame_map.insert(param_idx, offset);
        }
        self.stack_map = frame_map;
        self.last = Value::Int(0);

        let mut ip = func.entry;
        let mut returned = false;
        while let Some(id) = ip {
            if matches!(func.get(id).kind, NodeKind::Ret { .. }) {
                returned = true;
            }
            ip = self.exec_node(func, id)?;
        }

        self.sp = saved_sp;
        self.stack_map = saved_map;

        if !returned {
            return Err(EvalError::FellThroughEnd(func.name.clone()));
        }
        Ok(self.last.clone())
    }

    fn push_value(&mut self, v: &Value) -> Result<usize, EvalError> {
        let bytes = v.to_bytes();
        let offset = self.sp;
        self.write_bytes(offset, &bytes)?;
        self.sp += bytes.len();
        Ok(offset)
    }

    fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), EvalError> {
        let end = offset + bytes.len();
        if end > self.stack.len() {
            return Err(EvalError::StackOverflow {
                needed: end,
                available: self.stack.len(),
            });
        }
        self.stack[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    fn read_value(&self, offset: usize, ty: &Type) -> Result<Value, EvalError> {
        let bytes = ty.bytes() as usize;
        let end = offset + bytes;
        if end > self.stack.len() {
            return Err(EvalError::StackOverflow {
                needed: end,
                available: self.stack.len(),
            });
        }
        let slice = &self.stack[offset..end];
        Ok(match ty.kind {
            DataKind::Bool => Value::Bool(slice[0] != 0),
            DataKind::Char => Value::Char(slice[0]),
            DataKind::Int => Value::Int(i32::from_le_bytes(slice.try_into().unwrap())),
            DataKind::Float => Value::Float(f32::from_le_bytes(slice.try_into().unwrap())),
            other => {
                return Err(EvalError::Core(CoreError::Invariant(format!(
                    "cannot load a bare {other} value off the stack"
                ))))
            }
        })
    }

    /// Executes one instruction and returns the next instruction pointer, or
    /// `None` if control left the function (a `Ret`).
    fn exec_node(&mut self, func: &Function, id: NodeId) -> Result<Option<NodeId>, EvalError> {
        let node = func.get(id);
        match &node.kind {
            NodeKind::Alloca { ty, idx } | NodeKind::AllocaArray { ty, idx } => {
                let bytes = ty.bytes() as usize;
                self.reserve(bytes)?;
                self.stack_map.insert(*idx, self.sp);
                self.sp += bytes;
                Ok(fallthrough(node))
            }
            NodeKind::Imm(v) => {
                self.last = Value::from_imm(*v);
                Ok(fallthrough(node))
            }
            NodeKind::StrLit(s) => {
                self.last = Value::Str(s.clone());
                Ok(fallthrough(node))
            }
            NodeKind::Sym(_) => {
                self.last = self.load_sym(func, id)?;
                Ok(fallthrough(node))
            }
            NodeKind::Store { dest, body } => {
                let body = *body;
                let dest = *dest;
                let value = self.eval_operand(func, body)?;
                self.store_sym(func, dest, &value)?;
                self.last = value;
                Ok(fallthrough(node))
            }
            NodeKind::Jump { target } => Ok(Some(*target)),
            NodeKind::Cond { cond, target } => {
                let cond = *cond;
                let target = *target;
                let value = self.eval_operand(func, cond)?;
                Ok(if value.is_truthy() { Some(target) } else { node.next })
            }
            NodeKind::Ret { value } => {
                self.last = match value {
                    Some(v) => {
                        let v = *v;
                        self.eval_operand(func, v)?
                    }
                    None => Value::Int(0),
                };
                Ok(None)
            }
            NodeKind::FnCall { .. } => {
                self.last = self.eval_operand(func, id)?;
                Ok(fallthrough(node))
            }
            NodeKind::Member { .. } | NodeKind::Phi { .. } | NodeKind::Push | NodeKind::Pop => Ok(fallthrough(node)),
            NodeKind::Bin { .. } => Err(EvalError::Core(CoreError::Invariant(
                "a Bin node must never appear directly in the instruction list".into(),
            ))),
        }
    }

    fn reserve(&self, bytes: usize) -> Result<(), EvalError> {
        if self.sp + bytes > self.stack.len() {
            return Err(EvalError::StackOverflow {
                needed: self.sp + bytes,
                available: self.stack.len(),
            });
        }
        Ok(())
    }

    /// Evaluates a value-producing operand (`Imm`, `StrLit`, `Sym`, `Bin`,
    /// `FnCall`) recursively - the interpreter's analogue of the type
    /// pass's/SSA's operand recursion over [`NodeKind::operands`].
    fn eval_operand(&mut self, func: &Function, id: NodeId) -> Result<Value, EvalError> {
        let kind = func.get(id).kind.clone();
        match &kind {
            NodeKind::Imm(v) => Ok(Value::from_imm(*v)),
            NodeKind::StrLit(s) => Ok(Value::Str(s.clone())),
            NodeKind::Sym(_) => self.load_sym(func, id),
            NodeKind::Bin { op, lhs, rhs } => {
                let l = self.eval_operand(func, *lhs)?;
                let r = self.eval_operand(func, *rhs)?;
                eval_bin(*op, l, r)
            }
            NodeKind::FnCall { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for &a in args {
                    values.push(self.eval_operand(func, a)?);
                }
                self.call_eval(name, &values)
            }
            other => Err(EvalError::Core(CoreError::Invariant(format!(
                "{} is not a value-producing operand",
                other.mnemonic()
            )))),
        }
    }

    fn load_sym(&self, func: &Function, id: NodeId) -> Result<Value, EvalError> {
        let node = func.get(id);
        let NodeKind::Sym(s) = &node.kind else {
            unreachable!("load_sym called on a non-Sym node");
        };
        let ty = node
            .ty
            .clone()
            .ok_or_else(|| EvalError::Core(CoreError::Invariant("sym node missing its type".into())))?;
        let offset = self.offset_of(func, s.idx)?;
        self.read_value(offset, &ty)
    }

    fn store_sym(&mut self, func: &Function, dest: NodeId, value: &Value) -> Result<(), EvalError> {
        let node = func.get(dest);
        let NodeKind::Sym(s) = &node.kind else {
            return Err(EvalError::Core(CoreError::Invariant("store target is not a Sym".into())));
        };
        let idx = s.idx;
        let offset = self.offset_of(func, idx)?;
        self.write_bytes(offset, &value.to_bytes())
    }

    fn offset_of(&self, func: &Function, idx: u32) -> Result<usize, EvalError> {
        self.stack_map.get(&idx).copied().ok_or_else(|| {
            EvalError::Core(CoreError::UnknownLocal {
                function: func.name.clone(),
                idx,
            })
        })
    }
}

fn fallthrough(node: &Node) -> Option<NodeId> {
    node.succs.first().copied().or(node.next)
}

/// Dispatches a `Bin` by the operands' common data-kind (spec §4.8). Mixed
/// kinds are a fatal internal error - this can never arise from a
/// type-checked AST.
fn eval_bin(op: BinOp, lhs: Value, rhs: Value) -> Result<Value, EvalError> {
    use Value::*;
    match (lhs, rhs) {
        (Int(a), Int(b)) => int_bin(op, a, b),
        (Char(a), Char(b)) => char_bin(op, a, b),
        (Float(a), Float(b)) => float_bin(op, a, b),
        (Bool(a), Bool(b)) => bool_bin(op, a, b),
        (lhs, rhs) => Err(EvalError::MismatchedKinds {
            lhs: format!("{lhs:?}"),
            rhs: format!("{rhs:?}"),
        }),
    }
}

fn int_bin(op: BinOp, a: i32, b: i32) -> Result<Value, EvalError> {
    use BinOp::*;
    Ok(match op {
        Add => Value::Int(a.wrapping_add(b)),
        Sub => Value::Int(a.wrapping_sub(b)),
        Mul => Value::Int(a.wrapping_mul(b)),
        Div => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Int(a.wrapping_div(b))
        }
        Mod => {
            if b == 0 {
                return Err(EvalError::DivisionByZero);
            }
            Value::Int(a.wrapping_rem(b))
        }
        BitAnd => Value::Int(a & b),
        BitOr => Value::Int(a | b),
        BitXor => Value::Int(a ^ b),
        Shl => Value::Int(a.wrapping_shl(b as u32)),
        Shr => Value::Int(a.wrapping_shr(b as u32)),
        Eq => Value::Int((a == b) as i32),
        Ne => Value::Int((a != b) as i32),
        Lt => Value::Int((a < b) as i32),
        Le => Value::Int((a <= b) as i32),
        Gt => Value::Int((a > b) as i32),
        Ge => Value::Int((a >= b) as i32),
        LogAnd => Value::Int(((a != 0) && (b != 0)) as i32),
        LogOr => Value::Int(((a != 0) || (b != 0)) as i32),
    })
}

fn char_bin(op: BinOp, a: u8, b: u8) -> Result<Value, EvalError> {
    // "Chars behave as small ints" (spec §4.8).
    match int_bin(op, a as i32, b as i32)? {
        Value::Int(i) if !op.is_comparison() => Ok(Value::Char(i as u8)),
        other => Ok(other),
    }
}

fn float_bin(op: BinOp, a: f32, b: f32) -> Result<Value, EvalError> {
    use BinOp::*;
    Ok(match op {
        Add => Value::Float(a + b),
        Sub => Value::Float(a - b),
        Mul => Value::Float(a * b),
        Div => Value::Float(a / b),
        Eq => Value::Int((a == b) as i32),
        Ne => Value::Int((a != b) as i32),
        Lt => Value::Int((a < b) as i32),
        Le => Value::Int((a <= b) as i32),
        Gt => Value::Int((a > b) as i32),
        Ge => Value::Int((a >= b) as i32),
        _ => {
            return Err(EvalError::Core(CoreError::Invariant(format!(
                "{op} is not defined over float operands"
            ))))
        }
    })
}

fn bool_bin(op: BinOp, a: bool, b: bool) -> Result<Value, EvalError> {
    // "Bools support only & | ^" (spec §4.8).
    use BinOp::*;
    Ok(match op {
        BitAnd => Value::Bool(a & b),
        BitOr => Value::Bool(a | b),
        BitXor => Value::Bool(a ^ b),
        _ => {
            return Err(EvalError::Core(CoreError::Invariant(format!(
                "{op} is not defined over bool operands"
            ))))
        }
    })
}
