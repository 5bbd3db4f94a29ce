//! Alias Queries for Loop Access Analysis
//!
//! Three collaborators of the access analysis live here:
//!
//! - **Underlying objects**: the storage roots a pointer may point into
//! - **Alias oracle**: pairwise alias queries, and the partition of a set of
//!   locations into alias sets built from them
//! - **Predication oracle**: whether a block runs conditionally
//!
//! # Alias Sets
//!
//! Two locations land in the same alias set when the oracle says they may
//! alias. The relation is closed transitively, so a set is a connected
//! component of the may-alias graph. Locations in different sets are never
//! compared by the analysis.

use crate::ir::arena::{BlockId, LoopId, ValueId};
use crate::ir::cfg::LoopCfg;
use crate::ir::function::{Function, TbaaTag, ValueKind};
use crate::union_find::EquivalenceClasses;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

/// How far the underlying-object walk looks through address computations.
pub const MAX_LOOKUP_DEPTH: usize = 6;

// =============================================================================
// Alias Result
// =============================================================================

/// Result of an alias query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AliasResult {
    /// Definitely the same memory location.
    MustAlias,
    /// May or may not be the same location.
    MayAlias,
    /// Definitely different memory locations.
    NoAlias,
}

impl AliasResult {
    #[inline]
    pub fn may_alias(self) -> bool {
        matches!(self, AliasResult::MustAlias | AliasResult::MayAlias)
    }
}

// =============================================================================
// Memory Location
// =============================================================================

/// A pointer accessed with unknown size, plus its type-based alias tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryLocation {
    pub ptr: ValueId,
    pub tbaa: Option<TbaaTag>,
}

impl MemoryLocation {
    pub fn new(ptr: ValueId, tbaa: Option<TbaaTag>) -> Self {
        Self { ptr, tbaa }
    }

    /// Forget the type-based tag.
    pub fn without_tbaa(self) -> Self {
        Self { tbaa: None, ..self }
    }
}

// =============================================================================
// Oracles
// =============================================================================

/// Storage roots a pointer may point into.
pub trait UnderlyingObjects {
    fn underlying_objects(&self, ptr: ValueId) -> SmallVec<[ValueId; 4]>;
}

/// Pairwise alias queries.
pub trait AliasOracle {
    fn alias(&self, a: &MemoryLocation, b: &MemoryLocation) -> AliasResult;

    /// Group `locations` into alias sets: connected components of the
    /// may-alias relation. Sets are ordered by their first location, and
    /// pointers within a set keep the input order.
    fn partition(&self, locations: &[MemoryLocation]) -> Vec<AliasSet> {
        let mut classes = EquivalenceClasses::new();
        for i in 0..locations.len() {
            classes.insert(i);
            for j in 0..i {
                if !classes.same_class(&i, &j) && self.alias(&locations[i], &locations[j]).may_alias() {
                    classes.union(i, j);
                }
            }
        }

        let mut set_of_leader: FxHashMap<usize, usize> = FxHashMap::default();
        let mut sets: Vec<AliasSet> = Vec::new();
        for (i, loc) in locations.iter().enumerate() {
            let Some(leader) = classes.leader(&i) else {
                continue;
            };
            let slot = *set_of_leader.entry(leader).or_insert_with(|| {
                sets.push(AliasSet::default());
                sets.len() - 1
            });
            sets[slot].pointers.push(loc.ptr);
        }
        sets
    }
}

/// Whether a block of a loop executes conditionally.
pub trait PredicationOracle {
    fn block_needs_predication(&self, bb: BlockId, lp: LoopId) -> bool;
}

// =============================================================================
// Alias Sets
// =============================================================================

/// Pointers that may alias each other.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasSet {
    pointers: SmallVec<[ValueId; 4]>,
}

impl AliasSet {
    #[inline]
    pub fn pointers(&self) -> &[ValueId] {
        &self.pointers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pointers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pointers.is_empty()
    }

    #[inline]
    pub fn contains(&self, ptr: ValueId) -> bool {
        self.pointers.contains(&ptr)
    }
}

/// Collects locations and partitions them with an [`AliasOracle`].
///
/// A pointer added twice is tracked once. If the two additions disagree on
/// the type-based tag, the tag is dropped.
pub struct AliasSetTracker<'o, O: AliasOracle + ?Sized> {
    oracle: &'o O,
    locations: Vec<MemoryLocation>,
    index: FxHashMap<ValueId, usize>,
}

impl<'o, O: AliasOracle + ?Sized> AliasSetTracker<'o, O> {
    pub fn new(oracle: &'o O) -> Self {
        Self {
            oracle,
            locations: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn add(&mut self, loc: MemoryLocation) {
        match self.index.get(&loc.ptr) {
            Some(&slot) => {
                let known = &mut self.locations[slot];
                if known.tbaa != loc.tbaa {
                    known.tbaa = None;
                }
            }
            None => {
                self.index.insert(loc.ptr, self.locations.len());
                self.locations.push(loc);
            }
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Current alias sets.
    pub fn alias_sets(&self) -> Vec<AliasSet> {
        self.oracle.partition(&self.locations)
    }
}

// =============================================================================
// Basic Alias Analysis
// =============================================================================

/// Alias analysis from underlying objects and type-based tags.
///
/// - Same pointer: MustAlias
/// - Different type-based tags: NoAlias
/// - No pair of underlying objects may overlap: NoAlias
/// - Otherwise: MayAlias
#[derive(Debug, Clone, Copy)]
pub struct BasicAliasAnalysis<'f> {
    func: &'f Function,
}

impl<'f> BasicAliasAnalysis<'f> {
    pub fn new(func: &'f Function) -> Self {
        Self { func }
    }

    /// Storage that cannot be reached from an unrelated pointer in this
    /// function: stack slots and `noalias` arguments.
    fn is_function_local(&self, obj: ValueId) -> bool {
        matches!(
            self.func.value(obj).kind,
            ValueKind::StackSlot | ValueKind::Argument { noalias: true }
        )
    }

    fn objects_may_overlap(&self, x: ValueId, y: ValueId) -> bool {
        if x == y {
            return true;
        }
        let both_identified =
            self.func.value(x).is_identified_object() && self.func.value(y).is_identified_object();
        !(both_identified || self.is_function_local(x) || self.is_function_local(y))
    }
}

impl AliasOracle for BasicAliasAnalysis<'_> {
    fn alias(&self, a: &MemoryLocation, b: &MemoryLocation) -> AliasResult {
        if a.ptr == b.ptr {
            return AliasResult::MustAlias;
        }
        if let (Some(ta), Some(tb)) = (a.tbaa, b.tbaa) {
            if ta != tb {
                return AliasResult::NoAlias;
            }
        }

        let objs_a = self.func.underlying_objects(a.ptr);
        let objs_b = self.func.underlying_objects(b.ptr);
        let overlap = objs_a
            .iter()
            .any(|&x| objs_b.iter().any(|&y| self.objects_may_overlap(x, y)));
        if overlap {
            AliasResult::MayAlias
        } else {
            AliasResult::NoAlias
        }
    }
}

// =============================================================================
// Function Implementations
// =============================================================================

impl Function {
    /// Strip element-pointer computations and integer casts, at most
    /// [`MAX_LOOKUP_DEPTH`] steps.
    fn underlying_object(&self, mut v: ValueId) -> ValueId {
        for _ in 0..MAX_LOOKUP_DEPTH {
            match self.value(v).kind {
                ValueKind::ElementPtr { base, .. } => v = base,
                ValueKind::IntCast(inner) => v = inner,
                _ => break,
            }
        }
        v
    }
}

impl UnderlyingObjects for Function {
    /// Selects are expanded into every option, so a pointer can have several
    /// roots. Roots are returned in discovery order without duplicates.
    fn underlying_objects(&self, ptr: ValueId) -> SmallVec<[ValueId; 4]> {
        let mut objects = SmallVec::new();
        let mut visited = FxHashSet::default();
        let mut worklist = vec![ptr];
        while let Some(v) = worklist.pop() {
            let root = self.underlying_object(v);
            if !visited.insert(root) {
                continue;
            }
            match &self.value(root).kind {
                ValueKind::Select(options) => worklist.extend(options.iter().rev().copied()),
                _ => objects.push(root),
            }
        }
        objects
    }
}

impl PredicationOracle for Function {
    fn block_needs_predication(&self, bb: BlockId, lp: LoopId) -> bool {
        LoopCfg::new(self, lp).block_needs_predication(bb)
    }
}
