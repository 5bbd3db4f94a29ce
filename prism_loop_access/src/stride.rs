//! Stride classification of loop pointers.
//!
//! A pointer is strided when its address is `{start, +, k * size}<loop>` for a
//! constant `k` and the recurrence provably does not wrap around the address
//! space. Addresses that advance by a runtime value can be probed under the
//! hypothesis that the runtime value is 1 (see [`SymbolicStrides`]).

use crate::info::AnalysisContext;
use crate::ir::arena::{LoopId, ValueId};
use crate::scev::Expr;
use crate::LOG_TARGET;
use log::trace;
use rustc_hash::FxHashMap;

/// Pointers whose stride is a runtime value, mapped to that value.
///
/// The vectorizer versions such loops on `stride == 1`; the analysis then
/// reasons about the specialized loop.
pub type SymbolicStrides = FxHashMap<ValueId, ValueId>;

/// Result of classifying a pointer's stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stride {
    Unanalyzable,
    /// Advances by this many elements per iteration. Never zero.
    Strided(i64),
}

impl Stride {
    /// Elements per iteration, 0 when unanalyzable.
    #[inline]
    pub fn value(self) -> i64 {
        match self {
            Stride::Unanalyzable => 0,
            Stride::Strided(k) => k,
        }
    }

    #[inline]
    pub fn is_analyzable(self) -> bool {
        matches!(self, Stride::Strided(_))
    }

    /// Consecutive in either direction.
    #[inline]
    pub fn is_unit(self) -> bool {
        matches!(self, Stride::Strided(1 | -1))
    }
}

/// Symbolic address of `ptr`, with its symbolic stride (if any) replaced by 1.
/// Integer casts around the stride value are looked through.
pub fn replace_symbolic_stride(cx: &AnalysisContext<'_>, strides: &SymbolicStrides, ptr: ValueId) -> Expr {
    let expr = cx.engine.expr_of(ptr);
    let Some(&stride) = strides.get(&ptr) else {
        return expr;
    };

    let symbol = cx.func.strip_integer_cast(stride);
    let by_one = expr.substitute(symbol, 1);
    trace!(
        target: LOG_TARGET,
        "replacing symbolic stride {} in {} by 1: {}",
        cx.func.value_name(symbol),
        expr,
        by_one
    );
    by_one
}

/// Whether `ptr` can take part in a runtime bounds check: its address must be
/// an affine recurrence.
pub fn has_computable_bounds(cx: &AnalysisContext<'_>, strides: &SymbolicStrides, ptr: ValueId) -> bool {
    matches!(replace_symbolic_stride(cx, strides, ptr), Expr::AddRec(_))
}

/// Classify the stride of `ptr` over the innermost loop `lp`.
pub fn stride_of(cx: &AnalysisContext<'_>, ptr: ValueId, lp: LoopId, strides: &SymbolicStrides) -> Stride {
    let func = cx.func;
    let Some(elem) = func.pointee(ptr) else {
        debug_assert!(false, "unexpected non-pointer {}", func.value_name(ptr));
        return Stride::Unanalyzable;
    };

    if elem.is_aggregate() {
        trace!(target: LOG_TARGET, "bad stride - not a pointer to a scalar type {}", func.value_name(ptr));
        return Stride::Unanalyzable;
    }

    let expr = replace_symbolic_stride(cx, strides, ptr);
    if !expr.is_affine_in(lp) {
        trace!(
            target: LOG_TARGET,
            "bad stride - not an add recurrence over the innermost loop {} {}",
            func.value_name(ptr),
            expr
        );
        return Stride::Unanalyzable;
    }

    // An in-bounds unit-stride recurrence cannot wrap. Without in-bounds, a
    // wrapping unit stride would have to pass address 0, which is undefined
    // in address space 0.
    let in_bounds = func.value(ptr).is_in_bounds_element_ptr();
    let no_wrap = expr.as_add_rec().is_some_and(|ar| ar.no_wrap);
    let in_addr_space_zero = func.addr_space(ptr) == 0;
    if !no_wrap && !in_bounds && !in_addr_space_zero {
        trace!(target: LOG_TARGET, "bad stride - pointer may wrap in the address space {} {}", func.value_name(ptr), expr);
        return Stride::Unanalyzable;
    }

    let Some(step) = expr.step_in(lp) else {
        trace!(target: LOG_TARGET, "bad stride - not a constant strided {} {}", func.value_name(ptr), expr);
        return Stride::Unanalyzable;
    };

    let size = elem.alloc_size() as i64;
    if size == 0 || step % size != 0 {
        return Stride::Unanalyzable;
    }
    let stride = step / size;

    if !no_wrap && (in_bounds || in_addr_space_zero) && stride != 1 && stride != -1 {
        return Stride::Unanalyzable;
    }

    Stride::Strided(stride)
}
