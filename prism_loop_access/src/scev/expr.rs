//! Symbolic address expressions.

use super::poly::Poly;
use crate::ir::arena::{LoopId, ValueId};
use std::fmt;

// =============================================================================
// Add Recurrence
// =============================================================================

/// The affine recurrence `{start, +, step}<loop>`: the value is `start` on the
/// first iteration and grows by `step` on every backedge of `loop`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddRec {
    pub start: Poly,
    pub step: Poly,
    pub loop_id: LoopId,
    /// The recurrence is known not to wrap the address space.
    pub no_wrap: bool,
}

impl AddRec {
    pub fn new(start: Poly, step: Poly, loop_id: LoopId) -> Self {
        Self {
            start,
            step,
            loop_id,
            no_wrap: false,
        }
    }

    /// Value on iteration `count` (0-based): `start + step * count`.
    pub fn evaluate_at_iteration(&self, count: &Poly) -> Poly {
        &self.start + &(&self.step * count)
    }

    /// Constant step, if the step has no symbolic part.
    #[inline]
    pub fn constant_step(&self) -> Option<i64> {
        self.step.as_constant()
    }
}

// =============================================================================
// Expressions
// =============================================================================

/// What the affine engine knows about a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Loop-invariant polynomial over symbolic values.
    Poly(Poly),
    /// Affine function of a loop's induction variable.
    AddRec(AddRec),
    /// Could not be computed (loaded indices, opaque calls, ...).
    Unknown,
}

impl Expr {
    #[inline]
    pub fn constant(c: i64) -> Self {
        Expr::Poly(Poly::constant(c))
    }

    /// Build `{start, +, step}<loop>`, folding a zero step to `start`.
    pub fn add_rec(start: Poly, step: Poly, loop_id: LoopId) -> Self {
        if step.is_zero() {
            Expr::Poly(start)
        } else {
            Expr::AddRec(AddRec::new(start, step, loop_id))
        }
    }

    #[inline]
    pub fn as_add_rec(&self) -> Option<&AddRec> {
        match self {
            Expr::AddRec(ar) => Some(ar),
            _ => None,
        }
    }

    /// Compile-time constant value of the expression.
    #[inline]
    pub fn as_constant(&self) -> Option<i64> {
        match self {
            Expr::Poly(p) => p.as_constant(),
            _ => None,
        }
    }

    /// Whether the expression is an affine recurrence over exactly `lp`.
    pub fn is_affine_in(&self, lp: LoopId) -> bool {
        matches!(self, Expr::AddRec(ar) if ar.loop_id == lp)
    }

    /// Constant per-iteration step over `lp`.
    pub fn step_in(&self, lp: LoopId) -> Option<i64> {
        match self {
            Expr::AddRec(ar) if ar.loop_id == lp => ar.constant_step(),
            _ => None,
        }
    }

    /// Whether the expression takes the same value on every iteration of
    /// `lp`.
    pub fn is_loop_invariant(&self, lp: LoopId) -> bool {
        match self {
            Expr::Poly(_) => true,
            Expr::AddRec(ar) => ar.loop_id != lp,
            Expr::Unknown => false,
        }
    }

    /// Replace the symbol `v` by the constant `c`. No-wrap facts are kept.
    pub fn substitute(&self, v: ValueId, c: i64) -> Expr {
        match self {
            Expr::Poly(p) => Expr::Poly(p.substitute(v, c)),
            Expr::AddRec(ar) => {
                let step = ar.step.substitute(v, c);
                if step.is_zero() {
                    return Expr::Poly(ar.start.substitute(v, c));
                }
                Expr::AddRec(AddRec {
                    start: ar.start.substitute(v, c),
                    step,
                    loop_id: ar.loop_id,
                    no_wrap: ar.no_wrap,
                })
            }
            Expr::Unknown => Expr::Unknown,
        }
    }

    /// `self - other`.
    ///
    /// Recurrences over the same loop subtract component-wise; a recurrence
    /// minus an invariant shifts its start. Anything involving an unknown or
    /// two different loops is unknown.
    pub fn subtract(&self, other: &Expr) -> Expr {
        match (self, other) {
            (Expr::Poly(a), Expr::Poly(b)) => Expr::Poly(a - b),
            (Expr::AddRec(a), Expr::AddRec(b)) if a.loop_id == b.loop_id => {
                Expr::add_rec(&a.start - &b.start, &a.step - &b.step, a.loop_id)
            }
            (Expr::AddRec(a), Expr::Poly(b)) => Expr::add_rec(&a.start - b, a.step.clone(), a.loop_id),
            (Expr::Poly(a), Expr::AddRec(b)) => Expr::add_rec(a - &b.start, -&b.step, b.loop_id),
            _ => Expr::Unknown,
        }
    }
}

impl From<Poly> for Expr {
    fn from(p: Poly) -> Self {
        Expr::Poly(p)
    }
}

impl fmt::Display for AddRec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{},+,{}}}<loop{}>", self.start, self.step, self.loop_id.index())?;
        if self.no_wrap {
            f.write_str("<nw>")?;
        }
        Ok(())
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Poly(p) => write!(f, "{p}"),
            Expr::AddRec(ar) => write!(f, "{ar}"),
            Expr::Unknown => f.write_str("***COULDNOTCOMPUTE***"),
        }
    }
}
