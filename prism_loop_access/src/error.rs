//! Reasons a loop's memory accesses cannot be vectorized.

use crate::ir::arena::InstId;
use thiserror::Error;

/// Loop shapes the analysis refuses to look at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeViolation {
    NotInnermost,
    NotSingleBackedge,
    NoSingleExit,
    ExitNotLatch,
    UnknownTripCount,
}

/// Memory operations the analysis cannot reason about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryOpViolation {
    NonSimpleLoad,
    NonSimpleStore,
    /// Reads or writes memory but is not a load or store.
    OpaqueMemoryOp,
}

/// Why a loop's memory accesses were rejected.
///
/// The `Display` text is the diagnostic shown to users.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("{}", shape_message(.0))]
    ShapeUnsupported(ShapeViolation),

    #[error("{}", memory_op_message(.0))]
    UnsupportedMemoryOp(MemoryOpViolation),

    #[error("write to a loop invariant address could not be vectorized")]
    UniformWriteRejected,

    /// Some pointer has no computable range. `retry` is set when this was
    /// discovered while retrying with forced runtime checks.
    #[error("{}", bounds_message(.retry))]
    UnboundedPointer { retry: bool },

    #[error("{comparisons} exceeds limit of {threshold} dependent memory operations checked at runtime")]
    TooManyRuntimeChecks { comparisons: u32, threshold: u32 },

    #[error("unsafe dependent memory operations in loop")]
    UnsafeDependence,
}

fn shape_message(v: &ShapeViolation) -> &'static str {
    match v {
        ShapeViolation::NotInnermost => "loop is not the innermost loop",
        ShapeViolation::NotSingleBackedge
        | ShapeViolation::NoSingleExit
        | ShapeViolation::ExitNotLatch => "loop control flow is not understood by analyzer",
        ShapeViolation::UnknownTripCount => "could not determine number of loop iterations",
    }
}

fn memory_op_message(v: &MemoryOpViolation) -> &'static str {
    match v {
        MemoryOpViolation::NonSimpleLoad => "read with atomic ordering or volatile read",
        MemoryOpViolation::NonSimpleStore => "write with atomic ordering or volatile write",
        MemoryOpViolation::OpaqueMemoryOp => "instruction cannot be vectorized",
    }
}

fn bounds_message(retry: &bool) -> &'static str {
    if *retry {
        "cannot check memory dependencies at runtime"
    } else {
        "cannot identify array bounds"
    }
}

impl AccessError {
    /// Attach the offending instruction.
    pub fn at(self, inst: InstId) -> LoopAccessReport {
        LoopAccessReport {
            error: self,
            inst: Some(inst),
        }
    }
}

/// The single diagnostic produced for an analyzed loop.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{error}")]
pub struct LoopAccessReport {
    #[source]
    pub error: AccessError,
    /// Instruction that caused the rejection, if any.
    pub inst: Option<InstId>,
}

impl From<AccessError> for LoopAccessReport {
    fn from(error: AccessError) -> Self {
        Self { error, inst: None }
    }
}
