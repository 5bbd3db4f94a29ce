//! Runtime Pointer Checks
//!
//! When dependences cannot be ruled out at compile time, the vectorizer can
//! still run the vector loop behind a guard that proves the accessed ranges
//! disjoint. [`RuntimePointerCheck`] records, for every pointer taking part,
//! the byte range it covers over the whole loop and the sets it belongs to.
//! Two pointers are compared at runtime only when:
//!
//! - at least one of them is written
//! - they are in different dependency sets
//! - they are in the same alias set
//!
//! [`RuntimeCheckPlan`] is the guard expressed as data: one bound per pointer
//! and the pairs whose ranges must not intersect.

use crate::info::AnalysisContext;
use crate::ir::arena::{LoopId, ValueId};
use crate::ir::function::Function;
use crate::scev::{Expr, Poly};
use crate::stride::{replace_symbolic_stride, SymbolicStrides};
use crate::LOG_TARGET;
use log::debug;
use std::fmt;

// =============================================================================
// Runtime Pointer Check
// =============================================================================

/// One pointer taking part in the runtime check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCheckEntry {
    pub ptr: ValueId,
    /// Lowest address touched. For a symbolic step the order of `low` and
    /// `high` is only known at runtime.
    pub low: Poly,
    /// Highest address touched.
    pub high: Poly,
    pub is_write: bool,
    /// Pointers sharing a dependency set are never compared with each other.
    pub dep_set_id: u32,
    /// Pointers in different alias sets are never compared with each other.
    pub alias_set_id: u32,
}

/// Pointers with computable bounds, and whether a runtime check is needed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimePointerCheck {
    pub need: bool,
    entries: Vec<RuntimeCheckEntry>,
}

impl RuntimePointerCheck {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `ptr`, whose address must be an affine recurrence once its
    /// symbolic stride is replaced. The range covers iterations `0` through
    /// `backedge_taken_count`; a pointer walking down memory has its first
    /// address as the high end.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        cx: &AnalysisContext<'_>,
        strides: &SymbolicStrides,
        ptr: ValueId,
        backedge_taken_count: &Poly,
        is_write: bool,
        dep_set_id: u32,
        alias_set_id: u32,
    ) {
        let Expr::AddRec(ar) = replace_symbolic_stride(cx, strides, ptr) else {
            panic!("invalid add recurrence for {}", cx.func.value_name(ptr));
        };
        let last = ar.evaluate_at_iteration(backedge_taken_count);
        let (low, high) = match ar.constant_step() {
            Some(step) if step < 0 => (last, ar.start),
            _ => (ar.start, last),
        };
        self.entries.push(RuntimeCheckEntry {
            ptr,
            low,
            high,
            is_write,
            dep_set_id,
            alias_set_id,
        });
    }

    /// Forget every pointer.
    pub fn reset(&mut self) {
        self.need = false;
        self.entries.clear();
    }

    #[inline]
    pub fn entries(&self) -> &[RuntimeCheckEntry] {
        &self.entries
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether entries `i` and `j` must be compared at runtime.
    pub fn needs_checking(&self, i: usize, j: usize) -> bool {
        let (a, b) = (&self.entries[i], &self.entries[j]);

        // Two reads never conflict.
        if !a.is_write && !b.is_write {
            return false;
        }
        if a.dep_set_id == b.dep_set_id {
            return false;
        }
        a.alias_set_id == b.alias_set_id
    }

    /// Every `(i, j)` with `i < j` that needs a comparison.
    pub fn check_pairs(&self) -> Vec<(usize, usize)> {
        let n = self.entries.len();
        let mut pairs = Vec::new();
        for i in 0..n {
            for j in i + 1..n {
                if self.needs_checking(i, j) {
                    pairs.push((i, j));
                }
            }
        }
        pairs
    }

    /// List the pairs needing a check, indented by `depth`.
    pub fn print(&self, out: &mut dyn fmt::Write, depth: usize, func: &Function) -> fmt::Result {
        if self.entries.is_empty() {
            return Ok(());
        }

        writeln!(out, "{:depth$}Run-time memory checks:", "")?;
        for (n, (i, j)) in self.check_pairs().into_iter().enumerate() {
            writeln!(out, "{:depth$}{n}:", "")?;
            writeln!(out, "{:w$}{}", "", func.value_name(self.entries[i].ptr), w = depth + 2)?;
            writeln!(out, "{:w$}{}", "", func.value_name(self.entries[j].ptr), w = depth + 2)?;
        }
        Ok(())
    }
}

// =============================================================================
// Check Plan
// =============================================================================

/// Inclusive byte range a pointer may touch during the loop. `low` and
/// `high` are swapped when the step is symbolic and turns out negative, so
/// the guard compares `min(low, high)` and `max(low, high)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointerBounds {
    pub ptr: ValueId,
    pub low: Expr,
    pub high: Expr,
}

/// Ranges of `bounds[a]` and `bounds[b]` conflict iff
/// `lo(a) <= hi(b) && lo(b) <= hi(a)`, where `lo` and `hi` are the min and
/// max of each bound pair compared as unsigned addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundsConflict {
    pub a: usize,
    pub b: usize,
}

/// A runtime guard. The vector loop may run iff no conflict holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeCheckPlan {
    pub bounds: Vec<PointerBounds>,
    pub conflicts: Vec<BoundsConflict>,
}

impl RuntimeCheckPlan {
    /// Build the guard for `check`. Pointers that are invariant in `lp` are
    /// their own start and end. Returns `None` when no check is needed.
    pub fn build(cx: &AnalysisContext<'_>, lp: LoopId, check: &RuntimePointerCheck) -> Option<Self> {
        if !check.need {
            return None;
        }

        let bounds = check
            .entries()
            .iter()
            .map(|entry| {
                let expr = cx.engine.expr_of(entry.ptr);
                if expr.is_loop_invariant(lp) {
                    debug!(target: LOG_TARGET, "adding RT check for a loop invariant ptr: {}", cx.func.value_name(entry.ptr));
                    PointerBounds {
                        ptr: entry.ptr,
                        low: expr.clone(),
                        high: expr,
                    }
                } else {
                    debug!(target: LOG_TARGET, "adding RT check for range: {}", cx.func.value_name(entry.ptr));
                    PointerBounds {
                        ptr: entry.ptr,
                        low: Expr::Poly(entry.low.clone()),
                        high: Expr::Poly(entry.high.clone()),
                    }
                }
            })
            .collect();

        let conflicts = check
            .check_pairs()
            .into_iter()
            .map(|(a, b)| BoundsConflict { a, b })
            .collect();

        Some(Self { bounds, conflicts })
    }

    /// Whether any pair of ranges intersects once every symbol is bound by
    /// `env`. `None` when some bound cannot be evaluated.
    pub fn any_conflict(&self, env: &dyn Fn(ValueId) -> Option<i64>) -> Option<bool> {
        let eval = |e: &Expr| match e {
            Expr::Poly(p) => p.evaluate(env).map(|v| v as u64),
            _ => None,
        };
        let range = |bounds: &PointerBounds| -> Option<(u64, u64)> {
            let (x, y) = (eval(&bounds.low)?, eval(&bounds.high)?);
            Some((x.min(y), x.max(y)))
        };

        let mut found = false;
        for c in &self.conflicts {
            let (lo_a, hi_a) = range(&self.bounds[c.a])?;
            let (lo_b, hi_b) = range(&self.bounds[c.b])?;
            found |= lo_a <= hi_b && lo_b <= hi_a;
        }
        Some(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alias::BasicAliasAnalysis;
    use crate::ir::builder::FunctionBuilder;
    use crate::ir::types::MemType;
    use crate::scev::AffineEngine;

    fn entry(ptr: u32, is_write: bool, dep_set_id: u32, alias_set_id: u32) -> RuntimeCheckEntry {
        RuntimeCheckEntry {
            ptr: ValueId::new(ptr),
            low: Poly::zero(),
            high: Poly::zero(),
            is_write,
            dep_set_id,
            alias_set_id,
        }
    }

    fn check_of(entries: Vec<RuntimeCheckEntry>) -> RuntimePointerCheck {
        RuntimePointerCheck { need: true, entries }
    }

    #[test]
    fn test_read_only_pairs_never_checked() {
        let rt = check_of(vec![entry(1, false, 1, 1), entry(2, false, 2, 1)]);
        assert!(!rt.needs_checking(0, 1));
        assert!(rt.check_pairs().is_empty());
    }

    #[test]
    fn test_same_dependency_set_not_checked() {
        let rt = check_of(vec![entry(1, true, 1, 1), entry(2, false, 1, 1)]);
        assert!(!rt.needs_checking(0, 1));
    }

    #[test]
    fn test_different_alias_sets_not_checked() {
        let rt = check_of(vec![entry(1, true, 1, 1), entry(2, true, 2, 2)]);
        assert!(!rt.needs_checking(0, 1));
    }

    #[test]
    fn test_check_pairs() {
        let rt = check_of(vec![
            entry(1, true, 1, 1),
            entry(2, false, 2, 1),
            entry(3, false, 3, 1),
            entry(4, true, 1, 2),
        ]);
        assert_eq!(rt.check_pairs(), vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn test_reset() {
        let mut rt = check_of(vec![entry(1, true, 1, 1)]);
        rt.reset();
        assert!(rt.is_empty());
        assert!(!rt.need);
    }

    #[test]
    fn test_insert_computes_range() {
        let mut b = FunctionBuilder::new("f");
        let n = b.integer("n");
        let (lp, _) = b.simple_loop("loop", Some(Poly::var(n)));
        let a = b.argument("a", MemType::I32);
        let p = b.strided(a, lp, 1, 2);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);

        let mut rt = RuntimePointerCheck::new();
        rt.insert(&cx, &SymbolicStrides::default(), p, &Poly::var(n), true, 1, 1);
        let e = &rt.entries()[0];
        assert_eq!(e.low, &Poly::var(a) + &Poly::constant(8));
        assert_eq!(e.high, &(&Poly::var(a) + &Poly::constant(8)) + &Poly::var(n).scale(4));
    }

    #[test]
    fn test_insert_orders_descending_range() {
        // &a[99 - i] over 100 iterations covers a[0] through a[99].
        let mut b = FunctionBuilder::new("f");
        let (lp, _) = b.simple_loop("loop", Some(Poly::constant(99)));
        let a = b.argument("a", MemType::I32);
        let p = b.strided(a, lp, -1, 99);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);

        let mut rt = RuntimePointerCheck::new();
        rt.insert(&cx, &SymbolicStrides::default(), p, &Poly::constant(99), true, 1, 1);
        let e = &rt.entries()[0];
        assert_eq!(e.low, Poly::var(a));
        assert_eq!(e.high, &Poly::var(a) + &Poly::constant(396));
    }

    #[test]
    fn test_print_lists_pairs() {
        let mut b = FunctionBuilder::new("f");
        let (lp, _) = b.simple_loop("loop", Some(Poly::constant(9)));
        let a = b.argument("a", MemType::I32);
        let c = b.argument("c", MemType::I32);
        let pa = b.strided(a, lp, 1, 0);
        let pc = b.strided(c, lp, 1, 0);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);
        let btc = Poly::constant(9);

        let mut rt = RuntimePointerCheck::new();
        let none = SymbolicStrides::default();
        rt.insert(&cx, &none, pa, &btc, true, 1, 1);
        rt.insert(&cx, &none, pc, &btc, false, 2, 1);

        let mut out = String::new();
        rt.print(&mut out, 2, &f).unwrap();
        let expect = format!(
            "  Run-time memory checks:\n  0:\n    {}\n    {}\n",
            f.value_name(pa),
            f.value_name(pc)
        );
        assert_eq!(out, expect);
    }

    #[test]
    fn test_plan_detects_overlap() {
        let mut b = FunctionBuilder::new("f");
        let (lp, _) = b.simple_loop("loop", Some(Poly::constant(9)));
        let a = b.argument("a", MemType::I32);
        let c = b.argument("c", MemType::I32);
        let pa = b.strided(a, lp, 1, 0);
        let pc = b.strided(c, lp, 1, 0);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);
        let btc = Poly::constant(9);

        let mut rt = RuntimePointerCheck::new();
        let none = SymbolicStrides::default();
        rt.insert(&cx, &none, pa, &btc, true, 1, 1);
        rt.insert(&cx, &none, pc, &btc, false, 2, 1);
        assert_eq!(RuntimeCheckPlan::build(&cx, lp, &rt), None);

        rt.need = true;
        let plan = RuntimeCheckPlan::build(&cx, lp, &rt).unwrap();
        assert_eq!(plan.conflicts, vec![BoundsConflict { a: 0, b: 1 }]);

        // Ten i32 elements: each range spans 36 bytes past its start.
        let disjoint = |v: ValueId| Some(if v == a { 1000 } else { 2000 });
        let overlapping = |v: ValueId| Some(if v == a { 1000 } else { 1020 });
        assert_eq!(plan.any_conflict(&disjoint), Some(false));
        assert_eq!(plan.any_conflict(&overlapping), Some(true));
    }

    #[test]
    fn test_plan_invariant_pointer_is_its_own_bound() {
        let mut b = FunctionBuilder::new("f");
        let (outer, _) = b.simple_loop("outer", Some(Poly::constant(9)));
        let (inner, _) = b.simple_loop("inner", Some(Poly::constant(9)));
        let a = b.argument("a", MemType::I32);
        let p = b.strided(a, outer, 1, 0);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);

        let mut rt = RuntimePointerCheck::new();
        rt.insert(&cx, &SymbolicStrides::default(), p, &Poly::constant(9), true, 1, 1);
        rt.need = true;
        let plan = RuntimeCheckPlan::build(&cx, inner, &rt).unwrap();
        assert_eq!(plan.bounds[0].low, f.expr_of(p));
        assert_eq!(plan.bounds[0].low, plan.bounds[0].high);
    }

    #[test]
    fn test_plan_orders_bounds_with_symbolic_step() {
        // &a[s * i] with `s` only known at runtime.
        let mut b = FunctionBuilder::new("f");
        let (lp, _) = b.simple_loop("loop", Some(Poly::constant(9)));
        let a = b.argument("a", MemType::I32);
        let c = b.argument("c", MemType::I32);
        let s = b.integer("s");
        let pa = b.symbolic_strided(a, lp, s, 0);
        let pc = b.strided(c, lp, 1, 0);
        let f = b.finish();
        let aa = BasicAliasAnalysis::new(&f);
        let cx = AnalysisContext::new(&f, &aa);
        let btc = Poly::constant(9);

        let mut rt = RuntimePointerCheck::new();
        let none = SymbolicStrides::default();
        rt.insert(&cx, &none, pa, &btc, true, 1, 1);
        rt.insert(&cx, &none, pc, &btc, false, 2, 1);
        rt.need = true;
        let plan = RuntimeCheckPlan::build(&cx, lp, &rt).unwrap();

        // s = -1: `a` walks from 1000 down to 964, `c` covers 980..1016.
        let down = |v: ValueId| {
            Some(if v == a {
                1000
            } else if v == c {
                980
            } else if v == s {
                -1
            } else {
                0
            })
        };
        assert_eq!(plan.any_conflict(&down), Some(true));

        // s = -1 with `c` at 1100..1136, above everything `a` touches.
        let above = |v: ValueId| {
            Some(if v == a {
                1000
            } else if v == c {
                1100
            } else if v == s {
                -1
            } else {
                0
            })
        };
        assert_eq!(plan.any_conflict(&above), Some(false));
    }
}
