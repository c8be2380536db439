//! A middle end for a small C-like language: lowers a type-checked AST to an
//! arena-based IR, builds its CFG/dominator tree/SSA form/data-dependence
//! graph, runs a handful of local optimizations, and executes the result
//! with a tree-walking interpreter.
//!
//! [`pipeline::run`] is the crate's single entry point for analysis and
//! optimization; [`interp::eval`] executes the resulting [`unit::Unit`].
//! Everything else (`build`, `cfg`, `type_pass`, `dominators`, `ssa`, `ddg`,
//! `optimize`, `dump`) is exposed individually for callers that want to stop
//! partway through the pipeline - a dump after CFG construction but before
//! optimization, for instance.

pub mod ast;
pub mod build;
pub mod cfg;
pub mod ddg;
pub mod dominators;
pub mod dump;
pub mod error;
pub mod interp;
pub mod node;
pub mod optimize;
pub mod pipeline;
pub mod ssa;
pub mod ty;
pub mod type_pass;
pub mod unit;

pub use error::{CoreError, EvalError};
pub use interp::InterpreterOptions;
pub use pipeline::PipelineOptions;
pub use unit::Unit;
