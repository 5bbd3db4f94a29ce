//! Access Partitioning
//!
//! Groups the accesses of a loop so that only accesses that may touch the
//! same memory are ever compared:
//!
//! 1. The alias oracle splits pointers into alias sets. Nothing is compared
//!    across alias sets.
//! 2. Inside an alias set, accesses sharing an underlying object are merged
//!    into one dependence class.
//! 3. Classes that contain a write followed by another write or a read are
//!    flagged for an exact dependence check, and a runtime check becomes
//!    necessary.
//!
//! Reads that are provably read-only are swept after every write of their
//! alias set, so they are flagged if any write exists in the set, no matter
//! where it occurs in program order.

use crate::access::MemAccess;
use crate::alias::{AliasOracle, AliasSetTracker, MemoryLocation};
use crate::info::AnalysisContext;
use crate::ir::arena::{LoopId, ValueId};
use crate::runtime_check::RuntimePointerCheck;
use crate::scev::Poly;
use crate::stride::{has_computable_bounds, stride_of, Stride, SymbolicStrides};
use crate::union_find::EquivalenceClasses;
use crate::LOG_TARGET;
use log::{debug, trace};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// Accesses connected by a shared underlying object.
pub type DepCandidates = EquivalenceClasses<MemAccess>;

// =============================================================================
// Dependence Check Set
// =============================================================================

/// Accesses whose class needs an exact dependence check, in the order they
/// were flagged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependenceCheckSet {
    order: Vec<MemAccess>,
    members: FxHashSet<MemAccess>,
}

impl DependenceCheckSet {
    pub fn insert(&mut self, access: MemAccess) -> bool {
        if !self.members.insert(access) {
            return false;
        }
        self.order.push(access);
        true
    }

    pub fn remove(&mut self, access: &MemAccess) -> bool {
        if !self.members.remove(access) {
            return false;
        }
        self.order.retain(|a| a != access);
        true
    }

    /// Earliest flagged access still in the set.
    #[inline]
    pub fn first(&self) -> Option<MemAccess> {
        self.order.first().copied()
    }

    #[inline]
    pub fn contains(&self, access: &MemAccess) -> bool {
        self.members.contains(access)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

// =============================================================================
// Access Analysis
// =============================================================================

/// Which accesses a sweep over an alias set looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepPhase {
    /// Writes, and reads that may not be read-only.
    ReadWrite,
    /// Reads deferred by the first sweep.
    ReadOnly,
}

/// Partitions the accesses of one loop and decides which of them need a
/// dependence check or a runtime check.
pub struct AccessAnalysis<'a> {
    cx: AnalysisContext<'a>,
    tracker: AliasSetTracker<'a, dyn AliasOracle + 'a>,
    /// Every access, in registration order.
    accesses: Vec<MemAccess>,
    access_set: FxHashSet<MemAccess>,
    read_only: FxHashSet<ValueId>,
    check_deps: DependenceCheckSet,
    dep_cands: DepCandidates,
    is_rt_check_needed: bool,
}

impl<'a> AccessAnalysis<'a> {
    pub fn new(cx: AnalysisContext<'a>) -> Self {
        Self {
            cx,
            tracker: AliasSetTracker::new(cx.alias),
            accesses: Vec::new(),
            access_set: FxHashSet::default(),
            read_only: FxHashSet::default(),
            check_deps: DependenceCheckSet::default(),
            dep_cands: DepCandidates::new(),
            is_rt_check_needed: false,
        }
    }

    fn add_access(&mut self, access: MemAccess) {
        if self.access_set.insert(access) {
            self.accesses.push(access);
        }
    }

    /// Register a load, and whether its pointer is only read from.
    pub fn add_load(&mut self, loc: MemoryLocation, is_read_only: bool) {
        self.tracker.add(loc);
        self.add_access(MemAccess::read(loc.ptr));
        if is_read_only {
            self.read_only.insert(loc.ptr);
        }
    }

    /// Register a store.
    pub fn add_store(&mut self, loc: MemoryLocation) {
        self.tracker.add(loc);
        self.add_access(MemAccess::write(loc.ptr));
    }

    #[inline]
    pub fn is_rt_check_needed(&self) -> bool {
        self.is_rt_check_needed
    }

    #[inline]
    pub fn is_dependency_check_needed(&self) -> bool {
        !self.check_deps.is_empty()
    }

    pub fn reset_dep_checks(&mut self) {
        self.check_deps.clear();
    }

    #[inline]
    pub fn dependencies_to_check(&self) -> &DependenceCheckSet {
        &self.check_deps
    }

    /// Hand the flagged accesses to the dependence checker.
    pub fn take_dependencies_to_check(&mut self) -> DependenceCheckSet {
        std::mem::take(&mut self.check_deps)
    }

    #[inline]
    pub fn dep_candidates(&self) -> &DepCandidates {
        &self.dep_cands
    }

    /// Sweep every alias set twice and build the dependence classes.
    pub fn build_dependence_sets(&mut self) {
        debug!(target: LOG_TARGET, "processing memory accesses...");
        for access in &self.accesses {
            trace!(
                target: LOG_TARGET,
                "  {} ({})",
                self.cx.func.value_name(access.ptr),
                if access.is_write {
                    "write"
                } else if self.read_only.contains(&access.ptr) {
                    "read-only"
                } else {
                    "read"
                }
            );
        }

        for set in self.tracker.alias_sets() {
            let mut set_has_write = false;
            let mut obj_to_last_access: FxHashMap<ValueId, MemAccess> = FxHashMap::default();
            let mut deferred: Vec<MemAccess> = Vec::new();

            for phase in [SweepPhase::ReadWrite, SweepPhase::ReadOnly] {
                for &ptr in set.pointers() {
                    // A pointer may be both read and written.
                    let source = match phase {
                        SweepPhase::ReadWrite => &self.accesses,
                        SweepPhase::ReadOnly => &deferred,
                    };
                    let matching: SmallVec<[MemAccess; 2]> =
                        source.iter().filter(|a| a.ptr == ptr).copied().collect();

                    for access in matching {
                        let is_read_only_ptr = !access.is_write && self.read_only.contains(&ptr);
                        if phase == SweepPhase::ReadOnly && !is_read_only_ptr {
                            continue;
                        }

                        self.dep_cands.insert(access);

                        if phase == SweepPhase::ReadWrite && is_read_only_ptr {
                            if !deferred.contains(&access) {
                                deferred.push(access);
                            }
                            continue;
                        }

                        // A read of a pointer that is also written is not
                        // flagged: `a[i] = a[i] + x` needs no check.
                        if (access.is_write || is_read_only_ptr) && set_has_write {
                            self.check_deps.insert(access);
                            self.is_rt_check_needed = true;
                        }

                        if access.is_write {
                            set_has_write = true;
                        }

                        for obj in self.cx.objects.underlying_objects(ptr) {
                            if let Some(&prev) = obj_to_last_access.get(&obj) {
                                self.dep_cands.union(access, prev);
                            }
                            obj_to_last_access.insert(obj, access);
                        }
                    }
                }
            }
        }
    }

    /// Collect a runtime check for every pointer of every alias set.
    ///
    /// Returns whether all pointers have computable bounds (and, with
    /// `should_check_stride`, unit stride) and how many comparisons the
    /// check needs. Pointers that can be checked are added to `rt` either
    /// way.
    pub fn can_check_ptr_at_rt(
        &self,
        rt: &mut RuntimePointerCheck,
        lp: LoopId,
        backedge_taken_count: &Poly,
        strides: &SymbolicStrides,
        should_check_stride: bool,
    ) -> (bool, u32) {
        let mut can_do_rt = true;
        let is_dep_check_needed = self.is_dependency_check_needed();
        let mut num_comparisons = 0u32;

        for (set_idx, set) in self.tracker.alias_sets().iter().enumerate() {
            let alias_set_id = set_idx as u32 + 1;
            let mut num_reads = 0u32;
            let mut num_writes = 0u32;

            // Ids of dependence sets within this alias set. Pointers in the
            // same dependence set are never compared.
            let mut running_dep_id = 1u32;
            let mut dep_set_id: FxHashMap<ValueId, u32> = FxHashMap::default();

            for &ptr in set.pointers() {
                let is_write = self.access_set.contains(&MemAccess::write(ptr));
                let access = MemAccess { ptr, is_write };
                if is_write {
                    num_writes += 1;
                } else {
                    num_reads += 1;
                }

                let checkable = has_computable_bounds(&self.cx, strides, ptr)
                    && (!should_check_stride || stride_of(&self.cx, ptr, lp, strides) == Stride::Strided(1));
                if !checkable {
                    can_do_rt = false;
                    continue;
                }

                let dep_id = if is_dep_check_needed {
                    let leader = self.dep_cands.leader(&access).map_or(ptr, |l| l.ptr);
                    *dep_set_id.entry(leader).or_insert_with(|| {
                        let id = running_dep_id;
                        running_dep_id += 1;
                        id
                    })
                } else {
                    let id = running_dep_id;
                    running_dep_id += 1;
                    id
                };

                rt.insert(&self.cx, strides, ptr, backedge_taken_count, is_write, dep_id, alias_set_id);
                debug!(target: LOG_TARGET, "found a runtime check ptr: {}", self.cx.func.value_name(ptr));
            }

            // A single dependence set needs no comparison.
            if !(is_dep_check_needed && can_do_rt && running_dep_id == 2) {
                num_comparisons += num_writes * (num_reads + num_writes).saturating_sub(1);
            }
        }

        // Bounds in different address spaces cannot be compared, and may
        // overlap.
        let entries = rt.entries();
        for (i, a) in entries.iter().enumerate() {
            for b in &entries[i + 1..] {
                if a.dep_set_id == b.dep_set_id || a.alias_set_id != b.alias_set_id {
                    continue;
                }
                if self.cx.func.addr_space(a.ptr) != self.cx.func.addr_space(b.ptr) {
                    debug!(
                        target: LOG_TARGET,
                        "runtime check would require comparison between different address spaces"
                    );
                    return (false, num_comparisons);
                }
            }
        }

        (can_do_rt, num_comparisons)
    }
}
