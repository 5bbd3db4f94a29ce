//! Affine Expression Engine
//!
//! Represents addresses as functions of the loop iteration count so that the
//! dependence checker can subtract two accesses and look at the distance.
//!
//! - [`Poly`]: loop-invariant integer polynomial over symbolic values
//! - [`AddRec`]: `{start, +, step}<loop>` recurrence
//! - [`Expr`]: one of the two, or unknown
//!
//! The analysis only talks to the engine through [`AffineEngine`]; the loop
//! IR's [`Function`](crate::ir::function::Function) is the implementation used
//! in practice.

mod expr;
mod poly;

pub use expr::{AddRec, Expr};
pub use poly::Poly;

use crate::ir::arena::{LoopId, ValueId};

/// Symbolic evaluation of values in terms of loop iterations.
pub trait AffineEngine {
    /// Symbolic form of `value`.
    fn expr_of(&self, value: ValueId) -> Expr;

    /// Number of times the backedge of `lp` is taken, if computable.
    fn backedge_taken_count(&self, lp: LoopId) -> Option<Poly>;

    /// Whether `value` is invariant in `lp`.
    fn is_loop_invariant(&self, value: ValueId, lp: LoopId) -> bool {
        self.expr_of(value).is_loop_invariant(lp)
    }
}
