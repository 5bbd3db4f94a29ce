//! Memory Dependence Checker
//!
//! Decides, for accesses the partitioner flagged, whether executing several
//! consecutive iterations as one vector iteration could reorder a dependent
//! read and write.
//!
//! Only accesses with the same constant stride and a constant distance are
//! proven safe. A distance that is symbolic makes the pair retryable: the
//! caller may still vectorize behind a runtime bounds check.
//!
//! The checker also tracks the smallest dependence distance seen, which caps
//! the vector width the vectorizer may pick.

use crate::access::{AccessRegistry, MemAccess};
use crate::config::VectorizerParams;
use crate::info::AnalysisContext;
use crate::ir::arena::{InstId, LoopId};
use crate::partition::{DepCandidates, DependenceCheckSet};
use crate::stride::{replace_symbolic_stride, stride_of, SymbolicStrides};
use crate::LOG_TARGET;
use log::{debug, trace};
use smallvec::SmallVec;

/// Outcome of comparing two accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependenceResult {
    /// Vectorizing cannot reorder the two accesses harmfully.
    Independent,
    /// The accesses may conflict.
    Dependent,
    /// The distance is not a compile-time constant; a runtime check may
    /// still prove the accesses disjoint.
    DependentRetryable,
}

impl DependenceResult {
    #[inline]
    pub fn is_dependent(self) -> bool {
        !matches!(self, DependenceResult::Independent)
    }
}

/// Checks flagged accesses pairwise in program order.
pub struct MemoryDepChecker<'a> {
    cx: AnalysisContext<'a>,
    lp: LoopId,
    params: VectorizerParams,
    registry: AccessRegistry,
    /// Largest distance in bytes a vector iteration may span.
    max_safe_dep_dist_bytes: u64,
    /// Set once a dependence could not be decided at compile time.
    should_retry_with_runtime_check: bool,
}

impl<'a> MemoryDepChecker<'a> {
    pub fn new(cx: AnalysisContext<'a>, lp: LoopId, params: &VectorizerParams) -> Self {
        Self {
            cx,
            lp,
            params: *params,
            registry: AccessRegistry::new(),
            max_safe_dep_dist_bytes: u64::MAX,
            should_retry_with_runtime_check: false,
        }
    }

    /// Register the access performed by `inst` as the next one in program
    /// order.
    pub fn add_access(&mut self, inst: InstId, access: MemAccess) -> u32 {
        self.registry.add(access, inst)
    }

    #[inline]
    pub fn max_safe_dep_dist_bytes(&self) -> u64 {
        self.max_safe_dep_dist_bytes
    }

    #[inline]
    pub fn should_retry_with_runtime_check(&self) -> bool {
        self.should_retry_with_runtime_check
    }

    #[inline]
    pub fn registry(&self) -> &AccessRegistry {
        &self.registry
    }

    /// Whether a store `distance` bytes before a load of the same location
    /// would defeat store-to-load forwarding at every usable vector width.
    ///
    /// May lower the safe dependence distance to the widest width that
    /// keeps forwarding intact.
    pub fn could_prevent_store_load_forward(&mut self, distance: u64, type_byte_size: u64) -> bool {
        // Cycles a store needs before a load of the same address can be
        // served from memory.
        let num_cycles_for_store_load_through_memory = 8 * type_byte_size;
        let max_width_bytes = self.params.max_vector_width as u64 * type_byte_size;

        let mut max_vf_without_forward_issues = self.max_safe_dep_dist_bytes.min(max_width_bytes);
        let mut vf = 2 * type_byte_size;
        while vf <= max_vf_without_forward_issues {
            if distance % vf != 0 && distance / vf < num_cycles_for_store_load_through_memory {
                max_vf_without_forward_issues = vf >> 1;
                break;
            }
            vf *= 2;
        }

        if max_vf_without_forward_issues < 2 * type_byte_size {
            debug!(target: LOG_TARGET, "distance {distance} that could cause a store-load forwarding conflict");
            return true;
        }

        if max_vf_without_forward_issues < self.max_safe_dep_dist_bytes
            && max_vf_without_forward_issues != max_width_bytes
        {
            self.max_safe_dep_dist_bytes = max_vf_without_forward_issues;
        }
        false
    }

    /// Compare access `a` at program-order index `a_idx` with access `b` at
    /// `b_idx`.
    ///
    /// # Panics
    ///
    /// Panics unless `a_idx < b_idx`.
    pub fn is_dependent(
        &mut self,
        a: MemAccess,
        a_idx: u32,
        b: MemAccess,
        b_idx: u32,
        strides: &SymbolicStrides,
    ) -> DependenceResult {
        assert!(a_idx < b_idx, "must pass arguments in program order");
        let func = self.cx.func;

        let (mut a_ptr, mut a_is_write) = (a.ptr, a.is_write);
        let (mut b_ptr, mut b_is_write) = (b.ptr, b.is_write);

        // Two reads are independent.
        if !a_is_write && !b_is_write {
            return DependenceResult::Independent;
        }

        // Pointers in different address spaces cannot be compared.
        if func.addr_space(a_ptr) != func.addr_space(b_ptr) {
            return DependenceResult::Dependent;
        }

        let mut src = replace_symbolic_stride(&self.cx, strides, a_ptr);
        let mut sink = replace_symbolic_stride(&self.cx, strides, b_ptr);
        let mut stride_a = stride_of(&self.cx, a_ptr, self.lp, strides).value();
        let mut stride_b = stride_of(&self.cx, b_ptr, self.lp, strides).value();

        // Walk both pointers forward: with a negative stride the later
        // access is the source of the dependence.
        if stride_a < 0 {
            std::mem::swap(&mut a_ptr, &mut b_ptr);
            std::mem::swap(&mut src, &mut sink);
            std::mem::swap(&mut a_is_write, &mut b_is_write);
            std::mem::swap(&mut stride_a, &mut stride_b);
        }

        let dist = sink.subtract(&src);
        trace!(target: LOG_TARGET, "src: {src} sink: {sink} distance: {dist}");

        // Indirect or wrapping addresses, or two different strides.
        if stride_a == 0 || stride_b == 0 || stride_a != stride_b {
            debug!(target: LOG_TARGET, "pointer access with non-constant stride");
            return DependenceResult::Dependent;
        }

        let Some(distance) = dist.as_constant() else {
            debug!(target: LOG_TARGET, "dependence because of non-constant distance");
            return DependenceResult::DependentRetryable;
        };

        let (Some(a_ty), Some(b_ty)) = (func.pointee(a_ptr), func.pointee(b_ptr)) else {
            return DependenceResult::Dependent;
        };
        let type_byte_size = a_ty.alloc_size();
        let same_type = a_ty == b_ty;

        if distance < 0 {
            let is_true_data_dependence = a_is_write && !b_is_write;
            if is_true_data_dependence
                && (self.could_prevent_store_load_forward(distance.unsigned_abs(), type_byte_size) || !same_type)
            {
                return DependenceResult::Dependent;
            }
            debug!(target: LOG_TARGET, "dependence is negative: no dependence");
            return DependenceResult::Independent;
        }

        // Same location, same size.
        if distance == 0 {
            if same_type {
                return DependenceResult::Independent;
            }
            debug!(target: LOG_TARGET, "zero dependence difference but different types");
            return DependenceResult::Dependent;
        }

        if !same_type {
            debug!(target: LOG_TARGET, "positive dependence with different types");
            return DependenceResult::Independent;
        }

        let distance = distance as u64;
        let forced_factor = self.params.forced_factor();
        let forced_unroll = self.params.forced_interleave();

        // A vector iteration must fit between the two accesses, also at the
        // forced width.
        if distance < 2 * type_byte_size
            || 2 * type_byte_size > self.max_safe_dep_dist_bytes
            || distance < type_byte_size * forced_unroll * forced_factor
        {
            debug!(target: LOG_TARGET, "failure because of positive distance {distance}");
            return DependenceResult::Dependent;
        }

        self.max_safe_dep_dist_bytes = self.max_safe_dep_dist_bytes.min(distance);

        let is_true_data_dependence = !a_is_write && b_is_write;
        if is_true_data_dependence && self.could_prevent_store_load_forward(distance, type_byte_size) {
            return DependenceResult::Dependent;
        }

        debug!(
            target: LOG_TARGET,
            "positive distance {distance} with max safe dependence distance {}",
            self.max_safe_dep_dist_bytes
        );
        DependenceResult::Independent
    }

    /// Check every flagged class. Every access in a class is compared with
    /// every later member, at every pair of program-order indices.
    ///
    /// Stops at the first dependence. A dependence with a symbolic distance
    /// also sets [`should_retry_with_runtime_check`](Self::should_retry_with_runtime_check).
    pub fn are_deps_safe(
        &mut self,
        access_sets: &DepCandidates,
        check_deps: &mut DependenceCheckSet,
        strides: &SymbolicStrides,
    ) -> bool {
        self.max_safe_dep_dist_bytes = u64::MAX;

        while let Some(cur) = check_deps.first() {
            let members = access_sets.members(&cur);
            if members.is_empty() {
                check_deps.remove(&cur);
                continue;
            }

            for (i, &ai) in members.iter().enumerate() {
                check_deps.remove(&ai);
                let a_indices: SmallVec<[u32; 4]> = self.registry.indices(&ai).iter().copied().collect();

                for &oi in &members[i + 1..] {
                    let o_indices: SmallVec<[u32; 4]> = self.registry.indices(&oi).iter().copied().collect();
                    for &i1 in &a_indices {
                        for &i2 in &o_indices {
                            let result = if i1 < i2 {
                                self.is_dependent(ai, i1, oi, i2, strides)
                            } else {
                                self.is_dependent(oi, i2, ai, i1, strides)
                            };
                            match result {
                                DependenceResult::Independent => {}
                                DependenceResult::Dependent => return false,
                                DependenceResult::DependentRetryable => {
                                    self.should_retry_with_runtime_check = true;
                                    return false;
                                }
                            }
                        }
                    }
                }
            }
        }

        true
    }
}
