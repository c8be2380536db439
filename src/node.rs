//! The IR node data model (spec §3.2).
//!
//! Nodes live in a per-function arena ([`crate::unit::Function::nodes`]) and
//! are addressed by [`NodeId`], never by reference. The doubly-linked
//! `prev`/`next` chain is the function's instruction order; `preds`/`succs`,
//! `idom`/`idom_back`, `df` and `ddg_stmts` are separate, non-owning graphs
//! over the same arena, exactly as described in the Design Notes (§9):
//! arena + index handles instead of raw pointers, so every graph is trivially
//! `Clone` and (with the `serde` feature) serializable.

use std::collections::BTreeSet;
use std::fmt;

use crate::ty::Type;

/// An index into a [`crate::unit::Function`]'s node arena.
///
/// `u32` rather than `usize`: functions in this language are small and this
/// keeps [`Node`] compact, matching the teacher's preference for fixed-width
/// register/offset ids (e.g. `RegisterId`) over pointer-sized indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Binary operator tokens (spec §3.2 `Bin`).
///
/// Unary operators are not a separate node kind (the variant list in spec
/// §3.2 has no `Unary`); `-x` and `~x` are instead lowered to `Bin` against a
/// synthetic identity operand - see [`crate::build`] - which is also what
/// lets the arithmetic pass's `- -x` / `~ ~x` rules (spec §4.7) apply
/// uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
    #[strum(serialize = "&&")]
    LogAnd,
    #[strum(serialize = "||")]
    LogOr,
}

impl BinOp {
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub const fn is_bitwise(self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }
}

/// An immediate literal value (spec §3.2 `Imm`).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ImmValue {
    Bool(bool),
    Char(u8),
    Int(i32),
    Float(f32),
}

impl fmt::Display for ImmValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImmValue::Bool(b) => write!(f, "{b}"),
            ImmValue::Char(c) => write!(f, "'{}'", *c as char),
            ImmValue::Int(i) => write!(f, "{i}"),
            ImmValue::Float(x) => write!(f, "{x}"),
        }
    }
}

/// A use of a local symbol (spec §3.2 `Sym`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Sym {
    /// Index into the owning function's symbol storage.
    pub idx: u32,
    /// Assigned by SSA construction; `None` before that pass runs.
    pub ssa_idx: Option<u32>,
    pub deref: bool,
    pub addr_of: bool,
}

impl Sym {
    pub const fn new(idx: u32) -> Self {
        Sym {
            idx,
            ssa_idx: None,
            deref: false,
            addr_of: false,
        }
    }
}

/// One incoming edge of a [`NodeKind::Phi`]: the predecessor block
/// (represented by its first node) and the SSA version live on that edge.
///
/// Spec §9 calls out the reference's fixed two-operand Phi as something a
/// general implementation should generalize to one operand per predecessor;
/// this is that generalization.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PhiOperand {
    pub pred_block: NodeId,
    pub ssa_idx: Option<u32>,
}

/// The tagged payload of an IR node (spec §3.2).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NodeKind {
    Alloca {
        ty: Type,
        idx: u32,
    },
    AllocaArray {
        ty: Type,
        idx: u32,
    },
    Imm(ImmValue),
    StrLit(String),
    Sym(Sym),
    /// `dest` references a `Sym` node (so a deref-store through a pointer
    /// carries its own `deref` flag, per the `Sym` payload); `body` is one
    /// of `Imm | Sym | Bin | StrLit | FnCall`.
    Store {
        dest: NodeId,
        body: NodeId,
    },
    Bin {
        op: BinOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    /// Unconditional jump.
    Jump {
        target: NodeId,
    },
    /// Two-way branch: `succs = [target, next]` (true, false).
    Cond {
        cond: NodeId,
        target: NodeId,
    },
    Ret {
        value: Option<NodeId>,
    },
    Member {
        idx: u32,
        field_idx: u32,
    },
    FnCall {
        name: String,
        args: Vec<NodeId>,
    },
    Phi {
        /// Local symbol this phi defines a new version of.
        sym_idx: u32,
        ssa_idx: Option<u32>,
        operands: Vec<PhiOperand>,
    },
    /// Reserved for a future register allocator (spec §1, Non-goals; C10).
    /// Never constructed by any pass in this crate.
    Push,
    Pop,
}

impl NodeKind {
    /// Direct operand node ids (spec §4.6: "read-site operands" of `Sym`,
    /// `Cond`/`Ret`/`Store`; spec §4.3: "Store/Bin/Cond/Ret recurse into
    /// their children"). Operands may be detached arena nodes never linked
    /// into the function's instruction list (see [`crate::build`]) - this is
    /// the one place every operand-walking pass (type annotation, SSA
    /// renaming, DDG, arithmetic simplification) shares instead of
    /// reimplementing the recursion.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            NodeKind::Bin { lhs, rhs, .. } => vec![*lhs, *rhs],
            NodeKind::Store { dest, body } => vec![*dest, *body],
            NodeKind::Cond { cond, .. } => vec![*cond],
            NodeKind::Ret { value } => value.iter().copied().collect(),
            NodeKind::FnCall { args, .. } => args.clone(),
            _ => Vec::new(),
        }
    }

    pub const fn is_terminator(&self) -> bool {
        matches!(self, NodeKind::Ret { .. } | NodeKind::Jump { .. } | NodeKind::Cond { .. })
    }

    pub const fn is_branch(&self) -> bool {
        matches!(self, NodeKind::Jump { .. } | NodeKind::Cond { .. })
    }

    pub const fn mnemonic(&self) -> &'static str {
        match self {
            NodeKind::Alloca { .. } => "alloca",
            NodeKind::AllocaArray { .. } => "alloca_array",
            NodeKind::Imm(_) => "imm",
            NodeKind::StrLit(_) => "str",
            NodeKind::Sym(_) => "sym",
            NodeKind::Store { .. } => "store",
            NodeKind::Bin { .. } => "bin",
            NodeKind::Jump { .. } => "jump",
            NodeKind::Cond { .. } => "cond",
            NodeKind::Ret { .. } => "ret",
            NodeKind::Member { .. } => "member",
            NodeKind::FnCall { .. } => "call",
            NodeKind::Phi { .. } => "phi",
            NodeKind::Push => "push",
            NodeKind::Pop => "pop",
        }
    }
}

/// Per-node loop metadata (spec §3.2: "loop-depth, global-loop-index, and
/// optional loop-head/loop-increment flags").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meta {
    pub loop_depth: u32,
    pub global_loop_idx: u32,
    pub loop_head: bool,
    pub loop_inc: bool,
}

/// One IR instruction.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Node {
    pub instr_idx: u32,
    pub kind: NodeKind,

    pub prev: Option<NodeId>,
    pub next: Option<NodeId>,

    pub preds: Vec<NodeId>,
    pub succs: Vec<NodeId>,

    /// Self-referential for the function entry node.
    pub idom: Option<NodeId>,
    pub idom_back: Vec<NodeId>,
    pub df: BTreeSet<NodeId>,
    pub ddg_stmts: BTreeSet<NodeId>,

    /// Reserved slot for a register allocator; unused by this crate (C10).
    pub claimed_reg: Option<u32>,

    pub meta: Meta,

    /// Populated by the type pass (C4) for every value-producing node.
    pub ty: Option<Type>,

    /// CFG block number, assigned by CFG construction; reporting only.
    pub block: Option<u32>,
}

impl Node {
    pub fn new(instr_idx: u32, kind: NodeKind) -> Self {
        Node {
            instr_idx,
            kind,
            prev: None,
            next: None,
            preds: Vec::new(),
            succs: Vec::new(),
            idom: None,
            idom_back: Vec::new(),
            df: BTreeSet::new(),
            ddg_stmts: BTreeSet::new(),
            claimed_reg: None,
            meta: Meta::default(),
            ty: None,
            block: None,
        }
    }

    pub const fn is_phi(&self) -> bool {
        matches!(self.kind, NodeKind::Phi { .. })
    }
}
