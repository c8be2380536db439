//! Core error types.
//!
//! The middle end recognizes exactly two error categories (spec §7): an
//! internal-invariant violation raised by any pass, and an interpreter
//! runtime condition layered on top of it. Both are fatal - there is no
//! recovery path, only reporting.

use thiserror::Error;

use crate::node::NodeId;

/// An internal-invariant violation raised by the builder or any middle-end
/// pass. These can never arise from a well-formed, already type-checked AST;
/// seeing one means this crate has a bug.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A `Jump`/`Cond` target does not resolve to a node in the same
    /// function.
    #[error("jump target {target:?} does not resolve to a node in function `{function}`")]
    UnresolvedTarget { function: String, target: NodeId },

    /// A `Sym`/`Store` referenced a local index with no matching `Alloca`.
    #[error("symbol index {idx} has no declaring alloca in function `{function}`")]
    UnknownLocal { function: String, idx: u32 },

    /// Two functions in the same unit share a name.
    #[error("duplicate function name `{0}`")]
    DuplicateFunction(String),

    /// `main` is missing from the unit.
    #[error("unit has no `main` function")]
    MissingMain,

    /// `main` does not return `Int`.
    #[error("`main` must return int, found `{0}`")]
    MainMustReturnInt(String),

    /// A called function does not exist in the unit.
    #[error("call to undefined function `{0}`")]
    UndefinedFunction(String),

    /// Catch-all for assertion-style checks that mirror the reference
    /// compiler's `weak_unreachable(...)` sites.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Errors surfaced by the tree-walking interpreter.
///
/// Wraps [`CoreError`] for invariant problems discovered lazily at
/// evaluation time, and adds the small set of conditions that only make
/// sense once a program is actually running.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The byte stack is too small for the current call depth / locals.
    #[error("stack overflow: need {needed} bytes, {available} available")]
    StackOverflow { needed: usize, available: usize },

    /// A `Bin` node saw operands of incompatible data-kinds.
    #[error("mismatched operand kinds in binary op: {lhs} vs {rhs}")]
    MismatchedKinds { lhs: String, rhs: String },

    /// A call targeted a function absent from the unit.
    #[error("call to undefined function `{0}`")]
    MissingFunction(String),

    /// `main` returned without hitting a `Ret`, or control fell off the end
    /// of a non-void function.
    #[error("function `{0}` fell off its end without returning")]
    FellThroughEnd(String),

    /// An `Int`/`Char` `Div`/`Mod` saw a zero divisor. Host C semantics trap
    /// (SIGFPE); this interpreter surfaces it as an ordinary `Result` error
    /// instead of aborting the process.
    #[error("division by zero")]
    DivisionByZero,
}
