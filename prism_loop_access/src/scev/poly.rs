//! Integer polynomials over loop-invariant symbols.
//!
//! A [`Poly`] is `c + Σ kᵢ·mᵢ` where every monomial `mᵢ` is a sorted product of
//! symbolic values (base pointers, trip counts, runtime strides). The
//! representation is canonical: monomials are kept sorted, coefficients are
//! never zero, so structural equality is semantic equality.

use crate::ir::arena::ValueId;
use smallvec::SmallVec;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// One `coeff · v₀ · v₁ · …` term.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Term {
    vars: SmallVec<[ValueId; 2]>,
    coeff: i64,
}

/// Canonical integer polynomial.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Poly {
    constant: i64,
    terms: SmallVec<[Term; 2]>,
}

impl Poly {
    /// The constant polynomial `c`.
    #[inline]
    pub fn constant(c: i64) -> Self {
        Self {
            constant: c,
            terms: SmallVec::new(),
        }
    }

    #[inline]
    pub fn zero() -> Self {
        Self::constant(0)
    }

    /// The single symbol `v`.
    pub fn var(v: ValueId) -> Self {
        let mut vars = SmallVec::new();
        vars.push(v);
        Self {
            constant: 0,
            terms: smallvec::smallvec![Term { vars, coeff: 1 }],
        }
    }

    /// Value of the polynomial if it has no symbolic part.
    #[inline]
    pub fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.constant == 0 && self.terms.is_empty()
    }

    /// Constant part of the polynomial.
    #[inline]
    pub fn constant_term(&self) -> i64 {
        self.constant
    }

    /// Whether `v` occurs in any monomial.
    pub fn mentions(&self, v: ValueId) -> bool {
        self.terms.iter().any(|t| t.vars.contains(&v))
    }

    /// Multiply every coefficient by `k`.
    pub fn scale(&self, k: i64) -> Poly {
        if k == 0 {
            return Poly::zero();
        }
        Poly {
            constant: self.constant.wrapping_mul(k),
            terms: self
                .terms
                .iter()
                .map(|t| Term {
                    vars: t.vars.clone(),
                    coeff: t.coeff.wrapping_mul(k),
                })
                .collect(),
        }
    }

    /// Replace every occurrence of `v` by the constant `c`.
    pub fn substitute(&self, v: ValueId, c: i64) -> Poly {
        let mut out = Poly::constant(self.constant);
        for term in &self.terms {
            let mut coeff = term.coeff;
            let mut vars = SmallVec::<[ValueId; 2]>::new();
            for &var in &term.vars {
                if var == v {
                    coeff = coeff.wrapping_mul(c);
                } else {
                    vars.push(var);
                }
            }
            out.add_term(vars, coeff);
        }
        out
    }

    /// Value of the polynomial when every symbol is bound by `env`.
    pub fn evaluate(&self, env: &dyn Fn(ValueId) -> Option<i64>) -> Option<i64> {
        let mut sum = self.constant;
        for term in &self.terms {
            let mut prod = term.coeff;
            for &var in &term.vars {
                prod = prod.wrapping_mul(env(var)?);
            }
            sum = sum.wrapping_add(prod);
        }
        Some(sum)
    }

    /// Accumulate `coeff · vars` (with `vars` sorted) into `self`.
    fn add_term(&mut self, vars: SmallVec<[ValueId; 2]>, coeff: i64) {
        if coeff == 0 {
            return;
        }
        if vars.is_empty() {
            self.constant = self.constant.wrapping_add(coeff);
            return;
        }
        match self.terms.binary_search_by(|t| t.vars.cmp(&vars)) {
            Ok(pos) => {
                let merged = self.terms[pos].coeff.wrapping_add(coeff);
                if merged == 0 {
                    self.terms.remove(pos);
                } else {
                    self.terms[pos].coeff = merged;
                }
            }
            Err(pos) => self.terms.insert(pos, Term { vars, coeff }),
        }
    }
}

impl From<i64> for Poly {
    fn from(c: i64) -> Self {
        Poly::constant(c)
    }
}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        out.constant = out.constant.wrapping_add(rhs.constant);
        for term in &rhs.terms {
            out.add_term(term.vars.clone(), term.coeff);
        }
        out
    }
}

impl Add for Poly {
    type Output = Poly;

    fn add(self, rhs: Poly) -> Poly {
        &self + &rhs
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        self.scale(-1)
    }
}

impl Neg for Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        self.scale(-1)
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: &Poly) -> Poly {
        self + &(-rhs)
    }
}

impl Sub for Poly {
    type Output = Poly;

    fn sub(self, rhs: Poly) -> Poly {
        &self - &rhs
    }
}

impl Mul for &Poly {
    type Output = Poly;

    fn mul(self, rhs: &Poly) -> Poly {
        let mut out = Poly::constant(self.constant.wrapping_mul(rhs.constant));
        for t in &self.terms {
            out.add_term(t.vars.clone(), t.coeff.wrapping_mul(rhs.constant));
        }
        for t in &rhs.terms {
            out.add_term(t.vars.clone(), t.coeff.wrapping_mul(self.constant));
        }
        for a in &self.terms {
            for b in &rhs.terms {
                let mut vars: SmallVec<[ValueId; 2]> = a.vars.iter().chain(&b.vars).copied().collect();
                vars.sort_unstable();
                out.add_term(vars, a.coeff.wrapping_mul(b.coeff));
            }
        }
        out
    }
}

impl Mul for Poly {
    type Output = Poly;

    fn mul(self, rhs: Poly) -> Poly {
        &self * &rhs
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "{}", self.constant);
        }
        f.write_str("(")?;
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" + ")?;
            }
            if term.coeff != 1 {
                write!(f, "{} * ", term.coeff)?;
            }
            for (j, var) in term.vars.iter().enumerate() {
                if j > 0 {
                    f.write_str(" * ")?;
                }
                write!(f, "%{}", var.index())?;
            }
        }
        if self.constant != 0 {
            write!(f, " + {}", self.constant)?;
        }
        f.write_str(")")
    }
}
