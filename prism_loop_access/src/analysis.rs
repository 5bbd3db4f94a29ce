//! Per-function memo of loop access summaries.

use crate::config::VectorizerParams;
use crate::info::{AnalysisContext, LoopAccessInfo};
use crate::ir::arena::LoopId;
use crate::stride::SymbolicStrides;
use rustc_hash::FxHashMap;
use std::fmt;

/// Analyzes each loop of a function once and keeps the result.
///
/// A loop is always re-queried with the same symbolic strides it was first
/// analyzed with; asking with a different set is a usage error.
pub struct LoopAccessAnalysis<'a> {
    cx: AnalysisContext<'a>,
    params: VectorizerParams,
    infos: FxHashMap<LoopId, LoopAccessInfo<'a>>,
}

impl<'a> LoopAccessAnalysis<'a> {
    pub fn new(cx: AnalysisContext<'a>, params: &VectorizerParams) -> Self {
        Self {
            cx,
            params: *params,
            infos: FxHashMap::default(),
        }
    }

    /// Summary for `lp`, analyzing it on first use.
    pub fn get_info(&mut self, lp: LoopId, strides: &SymbolicStrides) -> &LoopAccessInfo<'a> {
        let (cx, params) = (self.cx, self.params);
        let info = self
            .infos
            .entry(lp)
            .or_insert_with(|| LoopAccessInfo::new(cx, lp, strides, &params));
        debug_assert_eq!(
            info.num_symbolic_strides(),
            strides.len(),
            "symbolic strides changed for loop"
        );
        info
    }

    /// Number of loops analyzed so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Forget every summary.
    pub fn clear(&mut self) {
        self.infos.clear();
    }

    /// Print every loop of the function, outer loops first, each under its
    /// header name. Loops are analyzed without symbolic strides.
    pub fn print(&mut self, out: &mut dyn fmt::Write) -> fmt::Result {
        let func = self.cx.func;
        let no_symbolic_strides = SymbolicStrides::default();
        let top_level: Vec<LoopId> = func.top_level_loops().collect();

        for top in top_level {
            for lp in func.loops_depth_first(top) {
                writeln!(out, "  {}:", func.block(func.get_loop(lp).header).name)?;
                self.get_info(lp, &no_symbolic_strides).print(out, 4)?;
            }
        }
        Ok(())
    }
}
