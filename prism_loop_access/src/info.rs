//! Loop Access Summary
//!
//! [`LoopAccessInfo`] runs the whole analysis for one innermost loop:
//!
//! 1. Reject loops whose shape the analysis does not understand.
//! 2. Scan every instruction and collect the loads and stores.
//! 3. Skip the checks for read-only, write-only and parallel loops.
//! 4. Partition the accesses and build a runtime check if one is needed.
//! 5. Check the flagged dependences. If one has a symbolic distance, drop
//!    the dependence checks and fall back to a runtime check once.
//!
//! A loop that cannot be vectorized carries exactly one [`LoopAccessReport`]
//! saying why.

use crate::access::MemAccess;
use crate::alias::{AliasOracle, MemoryLocation, PredicationOracle, UnderlyingObjects};
use crate::config::VectorizerParams;
use crate::dep_checker::MemoryDepChecker;
use crate::error::{AccessError, LoopAccessReport, MemoryOpViolation, ShapeViolation};
use crate::ir::arena::{BlockId, InstId, LoopId, ValueId};
use crate::ir::cfg::LoopCfg;
use crate::ir::function::{Function, InstKind};
use crate::partition::AccessAnalysis;
use crate::runtime_check::{RuntimeCheckPlan, RuntimePointerCheck};
use crate::scev::{AffineEngine, Poly};
use crate::stride::{stride_of, SymbolicStrides};
use crate::LOG_TARGET;
use log::debug;
use rustc_hash::FxHashSet;
use std::fmt;

// =============================================================================
// Analysis Context
// =============================================================================

/// The collaborators every part of the analysis consults.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub func: &'a Function,
    pub engine: &'a dyn AffineEngine,
    pub alias: &'a dyn AliasOracle,
    pub objects: &'a dyn UnderlyingObjects,
    pub predication: &'a dyn PredicationOracle,
}

impl<'a> AnalysisContext<'a> {
    /// Use `func` itself as affine engine, object resolver and predication
    /// oracle.
    pub fn new(func: &'a Function, alias: &'a dyn AliasOracle) -> Self {
        Self {
            func,
            engine: func,
            alias,
            objects: func,
            predication: func,
        }
    }
}

// =============================================================================
// Loop Access Info
// =============================================================================

/// Whether, and how, the loop's memory accesses allow vectorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    CanVectorizeWithoutChecks,
    CanVectorizeWithRuntimeChecks,
    CannotVectorize,
}

/// Result of analyzing the memory accesses of one loop.
pub struct LoopAccessInfo<'a> {
    cx: AnalysisContext<'a>,
    lp: LoopId,
    params: VectorizerParams,
    ptr_rt_check: RuntimePointerCheck,
    num_loads: usize,
    num_stores: usize,
    max_safe_dep_dist_bytes: u64,
    can_vec_mem: bool,
    report: Option<LoopAccessReport>,
    num_symbolic_strides: usize,
}

impl<'a> LoopAccessInfo<'a> {
    /// Analyze `lp`. `strides` lists pointers whose runtime stride the
    /// caller will version on `stride == 1`.
    pub fn new(cx: AnalysisContext<'a>, lp: LoopId, strides: &SymbolicStrides, params: &VectorizerParams) -> Self {
        let mut info = Self {
            cx,
            lp,
            params: *params,
            ptr_rt_check: RuntimePointerCheck::new(),
            num_loads: 0,
            num_stores: 0,
            max_safe_dep_dist_bytes: u64::MAX,
            can_vec_mem: false,
            report: None,
            num_symbolic_strides: strides.len(),
        };

        let result = info
            .can_analyze_loop()
            .and_then(|btc| info.analyze_loop(&btc, strides));
        if let Err(report) = result {
            info.emit(report);
        }
        info
    }

    fn emit(&mut self, report: LoopAccessReport) {
        assert!(self.report.is_none(), "multiple reports generated");
        debug!(target: LOG_TARGET, "report: {report}");
        self.can_vec_mem = false;
        self.report = Some(report);
    }

    /// Shape checks. Returns the backedge-taken count.
    fn can_analyze_loop(&self) -> Result<Poly, LoopAccessReport> {
        let func = self.cx.func;
        let lp = func.get_loop(self.lp);
        debug!(target: LOG_TARGET, "found a loop: {}", func.block(lp.header).name);

        if !lp.is_innermost() {
            return Err(AccessError::ShapeUnsupported(ShapeViolation::NotInnermost).into());
        }

        let cfg = LoopCfg::new(func, self.lp);
        if cfg.num_back_edges() != 1 {
            return Err(AccessError::ShapeUnsupported(ShapeViolation::NotSingleBackedge).into());
        }

        let Some(exiting) = cfg.exiting_block() else {
            return Err(AccessError::ShapeUnsupported(ShapeViolation::NoSingleExit).into());
        };

        // Only bottom-tested loops.
        if cfg.latch() != Some(exiting) {
            return Err(AccessError::ShapeUnsupported(ShapeViolation::ExitNotLatch).into());
        }

        let Some(btc) = self.cx.engine.backedge_taken_count(self.lp) else {
            debug!(target: LOG_TARGET, "SCEV could not compute the loop exit count");
            return Err(AccessError::ShapeUnsupported(ShapeViolation::UnknownTripCount).into());
        };

        Ok(btc)
    }

    /// Collect the loads and stores of the loop. Rejects any other memory
    /// effect.
    fn scan_memory_ops(&self, checker: &mut MemoryDepChecker<'a>) -> Result<(Vec<InstId>, Vec<InstId>), LoopAccessReport> {
        let func = self.cx.func;
        let lp = func.get_loop(self.lp);
        let is_annotated_parallel = lp.annotated_parallel;

        let mut loads = Vec::new();
        let mut stores = Vec::new();

        for &bb in &lp.blocks {
            for &id in &func.block(bb).insts {
                let inst = func.inst(id);

                if inst.may_read_from_memory() && !inst.is_store() {
                    match inst.kind {
                        // Math intrinsics only read the rounding mode, which
                        // the loop does not change.
                        InstKind::Call {
                            intrinsic: Some(_),
                            effects,
                        } if !effects.writes => continue,
                        InstKind::Load { ptr, flags, .. } if flags.is_simple() || is_annotated_parallel => {
                            loads.push(id);
                            checker.add_access(id, MemAccess::read(ptr));
                            continue;
                        }
                        InstKind::Load { .. } => {
                            debug!(target: LOG_TARGET, "found a non-simple load");
                            return Err(AccessError::UnsupportedMemoryOp(MemoryOpViolation::NonSimpleLoad).at(id));
                        }
                        _ => {
                            return Err(AccessError::UnsupportedMemoryOp(MemoryOpViolation::OpaqueMemoryOp).at(id));
                        }
                    }
                }

                if inst.may_write_to_memory() {
                    match inst.kind {
                        InstKind::Store { ptr, flags, .. } if flags.is_simple() || is_annotated_parallel => {
                            stores.push(id);
                            checker.add_access(id, MemAccess::write(ptr));
                        }
                        InstKind::Store { .. } => {
                            debug!(target: LOG_TARGET, "found a non-simple store");
                            return Err(AccessError::UnsupportedMemoryOp(MemoryOpViolation::NonSimpleStore).at(id));
                        }
                        _ => {
                            return Err(AccessError::UnsupportedMemoryOp(MemoryOpViolation::OpaqueMemoryOp).at(id));
                        }
                    }
                }
            }
        }

        Ok((loads, stores))
    }

    /// Location accessed by `inst`. The type-based tag is dropped when the
    /// instruction runs conditionally.
    fn location_of(&self, inst: InstId, ptr: ValueId) -> MemoryLocation {
        let inst = self.cx.func.inst(inst);
        let loc = MemoryLocation::new(ptr, inst.tbaa());
        if self.block_needs_predication(inst.block) {
            loc.without_tbaa()
        } else {
            loc
        }
    }

    fn analyze_loop(&mut self, backedge_taken_count: &Poly, strides: &SymbolicStrides) -> Result<(), LoopAccessReport> {
        let func = self.cx.func;
        let is_annotated_parallel = func.get_loop(self.lp).annotated_parallel;

        let mut dep_checker = MemoryDepChecker::new(self.cx, self.lp, &self.params);
        let (loads, stores) = self.scan_memory_ops(&mut dep_checker)?;
        self.num_loads = loads.len();
        self.num_stores = stores.len();

        if stores.is_empty() {
            debug!(target: LOG_TARGET, "found a read-only loop");
            self.can_vec_mem = true;
            return Ok(());
        }

        let mut accesses = AccessAnalysis::new(self.cx);
        let mut seen: FxHashSet<ValueId> = FxHashSet::default();
        let mut num_read_writes = 0usize;
        let mut num_reads = 0usize;

        for &st in &stores {
            let Some(ptr) = func.inst(st).pointer_operand() else {
                continue;
            };
            if self.is_uniform(ptr) {
                return Err(AccessError::UniformWriteRejected.at(st));
            }

            // The first sighting of a pointer puts it on the write list.
            if seen.insert(ptr) {
                num_read_writes += 1;
                accesses.add_store(self.location_of(st, ptr));
            }
        }

        if is_annotated_parallel {
            debug!(target: LOG_TARGET, "a loop annotated parallel, ignore memory dependency checks");
            self.can_vec_mem = true;
            return Ok(());
        }

        for &ld in &loads {
            let Some(ptr) = func.inst(ld).pointer_operand() else {
                continue;
            };

            // A pointer already written is read-write, which makes
            // `a[i] += x` analyzable. An unknown stride (`a[b[i]]`) keeps the
            // pointer read-only so that it is still compared with the writes.
            let is_read_only = seen.insert(ptr) || !stride_of(&self.cx, ptr, self.lp, strides).is_analyzable();
            if is_read_only {
                num_reads += 1;
            }
            accesses.add_load(self.location_of(ld, ptr), is_read_only);
        }

        // A single destination and nothing read.
        if num_read_writes == 1 && num_reads == 0 {
            debug!(target: LOG_TARGET, "found a write-only loop");
            self.can_vec_mem = true;
            return Ok(());
        }

        accesses.build_dependence_sets();
        let mut need_rt_check = accesses.is_rt_check_needed();

        let threshold = self.params.runtime_memory_check_threshold;
        let mut num_comparisons = 0u32;
        let mut can_do_rt = false;
        if need_rt_check {
            (can_do_rt, num_comparisons) =
                accesses.can_check_ptr_at_rt(&mut self.ptr_rt_check, self.lp, backedge_taken_count, strides, false);
        }
        debug!(target: LOG_TARGET, "we need to do {num_comparisons} pointer comparisons");

        // All pointers share one dependence set.
        if num_comparisons == 0 && need_rt_check {
            need_rt_check = false;
        }

        let bounds_known = can_do_rt;
        if !can_do_rt || num_comparisons > threshold {
            self.ptr_rt_check.reset();
            can_do_rt = false;
        }
        if can_do_rt {
            debug!(target: LOG_TARGET, "we can perform a memory runtime check if needed");
        }

        if need_rt_check && !can_do_rt {
            debug!(target: LOG_TARGET, "we can't vectorize because we can't find the array bounds");
            let error = if bounds_known {
                AccessError::TooManyRuntimeChecks {
                    comparisons: num_comparisons,
                    threshold,
                }
            } else {
                AccessError::UnboundedPointer { retry: false }
            };
            return Err(error.into());
        }

        self.ptr_rt_check.need = need_rt_check;

        let mut can_vec_mem = true;
        if accesses.is_dependency_check_needed() {
            debug!(target: LOG_TARGET, "checking memory dependencies");
            let mut to_check = accesses.take_dependencies_to_check();
            can_vec_mem = dep_checker.are_deps_safe(accesses.dep_candidates(), &mut to_check, strides);
            self.max_safe_dep_dist_bytes = dep_checker.max_safe_dep_dist_bytes();

            if !can_vec_mem && dep_checker.should_retry_with_runtime_check() {
                debug!(target: LOG_TARGET, "retrying with memory checks");

                // Assume the dependence checks are not needed.
                accesses.reset_dep_checks();
                self.ptr_rt_check.reset();
                self.ptr_rt_check.need = true;

                let (retry_can_do_rt, retry_comparisons) =
                    accesses.can_check_ptr_at_rt(&mut self.ptr_rt_check, self.lp, backedge_taken_count, strides, true);

                if !retry_can_do_rt || retry_comparisons > threshold {
                    debug!(target: LOG_TARGET, "can't vectorize with memory checks");
                    self.ptr_rt_check.reset();
                    let error = if retry_can_do_rt {
                        AccessError::TooManyRuntimeChecks {
                            comparisons: retry_comparisons,
                            threshold,
                        }
                    } else {
                        AccessError::UnboundedPointer { retry: true }
                    };
                    return Err(error.into());
                }
                can_vec_mem = true;
            }
        }

        if !can_vec_mem {
            return Err(AccessError::UnsafeDependence.into());
        }

        self.can_vec_mem = true;
        debug!(
            target: LOG_TARGET,
            "no unsafe dependent memory operations in loop{}",
            if self.ptr_rt_check.need { ", we need a runtime memory check" } else { "" }
        );
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[inline]
    pub fn loop_id(&self) -> LoopId {
        self.lp
    }

    #[inline]
    pub fn num_loads(&self) -> usize {
        self.num_loads
    }

    #[inline]
    pub fn num_stores(&self) -> usize {
        self.num_stores
    }

    /// Bytes a vector iteration may span without breaking a dependence.
    /// `u64::MAX` when nothing limits it.
    #[inline]
    pub fn max_safe_dep_dist_bytes(&self) -> u64 {
        self.max_safe_dep_dist_bytes
    }

    #[inline]
    pub fn can_vectorize_memory(&self) -> bool {
        self.can_vec_mem
    }

    pub fn verdict(&self) -> Verdict {
        match (self.can_vec_mem, self.ptr_rt_check.need) {
            (false, _) => Verdict::CannotVectorize,
            (true, true) => Verdict::CanVectorizeWithRuntimeChecks,
            (true, false) => Verdict::CanVectorizeWithoutChecks,
        }
    }

    /// Why the loop cannot be vectorized.
    #[inline]
    pub fn report(&self) -> Option<&LoopAccessReport> {
        self.report.as_ref()
    }

    #[inline]
    pub fn runtime_pointer_check(&self) -> &RuntimePointerCheck {
        &self.ptr_rt_check
    }

    /// Guard the vectorized loop must run behind, if it needs one.
    pub fn runtime_check(&self) -> Option<RuntimeCheckPlan> {
        if !self.can_vec_mem {
            return None;
        }
        RuntimeCheckPlan::build(&self.cx, self.lp, &self.ptr_rt_check)
    }

    /// Whether `bb` runs conditionally within the loop.
    pub fn block_needs_predication(&self, bb: BlockId) -> bool {
        self.cx.predication.block_needs_predication(bb, self.lp)
    }

    /// Whether `v` has the same value on every iteration.
    pub fn is_uniform(&self, v: ValueId) -> bool {
        self.cx.engine.is_loop_invariant(v, self.lp)
    }

    /// Number of symbolic strides the loop was analyzed with.
    #[inline]
    pub fn num_symbolic_strides(&self) -> usize {
        self.num_symbolic_strides
    }

    /// Print the summary indented by `depth`.
    pub fn print(&self, out: &mut dyn fmt::Write, depth: usize) -> fmt::Result {
        match self.verdict() {
            Verdict::CanVectorizeWithoutChecks => writeln!(out, "{:depth$}Memory dependences are safe", "")?,
            Verdict::CanVectorizeWithRuntimeChecks => {
                writeln!(out, "{:depth$}Memory dependences are safe with run-time checks", "")?
            }
            Verdict::CannotVectorize => {}
        }

        if let Some(report) = &self.report {
            writeln!(out, "{:depth$}Report: {report}", "")?;
        }

        if self.ptr_rt_check.need {
            self.ptr_rt_check.print(out, depth, self.cx.func)?;
        }
        writeln!(out)
    }
}

impl fmt::Display for LoopAccessInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print(f, 0)
    }
}

impl fmt::Debug for LoopAccessInfo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopAccessInfo")
            .field("lp", &self.lp)
            .field("verdict", &self.verdict())
            .field("num_loads", &self.num_loads)
            .field("num_stores", &self.num_stores)
            .field("max_safe_dep_dist_bytes", &self.max_safe_dep_dist_bytes)
            .field("report", &self.report)
            .finish()
    }
}
