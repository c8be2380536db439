//! Pass orchestration and the interpreter's tunable options (spec §4.12,
//! component C14).
//!
//! [`run`] is the one place that fixes the pass order the rest of this crate
//! only documents: CFG, types, dominators and SSA always run (nothing
//! downstream is sound without them); the four local optimizations run in
//! data-flow order afterward, gated individually by [`PipelineOptions`].
//! Alloca reordering runs last because it's the only pass that invalidates
//! the dominator/DDG annotations the others rely on (see
//! [`crate::optimize::reorder`]).

use crate::error::CoreError;
use crate::unit::Unit;

/// Which optimization passes [`run`] applies, independent of the always-on
/// analysis passes (CFG/types/dominators/SSA/DDG).
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub run_arith_simplify: bool,
    pub run_reorder_allocas: bool,
    pub run_unreachable_removal: bool,
    pub run_data_flow_dce: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            run_arith_simplify: true,
            run_reorder_allocas: true,
            run_unreachable_removal: true,
            run_data_flow_dce: true,
        }
    }
}

/// Runs the full middle-end pipeline over `unit` in place.
pub fn run(unit: &mut Unit, options: &PipelineOptions) -> Result<(), CoreError> {
    let span = tracing::info_span!("pipeline", functions = unit.functions.len());
    let _enter = span.enter();

    for func in &mut unit.functions {
        crate::cfg::build(func);
    }
    crate::type_pass::run(unit)?;
    for func in &mut unit.functions {
        crate::dominators::build(func);
        crate::ssa::build(func);
        crate::ddg::build(func);

        if options.run_arith_simplify {
            crate::optimize::arith::run(func);
        }
        if options.run_unreachable_removal {
            crate::optimize::unreachable::run(func);
        }
        if options.run_data_flow_dce {
            crate::optimize::dce::run(func);
        }
        if options.run_reorder_allocas {
            crate::optimize::reorder::run(func);
        }
    }
    Ok(())
}
