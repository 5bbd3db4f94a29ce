//! Loop memory access analysis for the Prism vectorizer.
//!
//! Decides whether the loads and stores of an innermost loop may be executed
//! several iterations at a time:
//! - Access partitioning by alias set and underlying object
//! - Exact dependence checks for constant-distance accesses
//! - Runtime pointer checks when dependences cannot be decided statically
//!
//! Decisions are logged through the `log` facade under the
//! `loop-accesses` target. The library never installs a logger.

pub mod access;
pub mod alias;
pub mod analysis;
pub mod config;
pub mod dep_checker;
pub mod error;
pub mod info;
pub mod ir;
pub mod partition;
pub mod runtime_check;
pub mod scev;
pub mod stride;
pub mod union_find;

pub use access::{AccessRegistry, MemAccess};
pub use alias::{AliasOracle, BasicAliasAnalysis, MemoryLocation, PredicationOracle, UnderlyingObjects};
pub use analysis::LoopAccessAnalysis;
pub use config::VectorizerParams;
pub use dep_checker::{DependenceResult, MemoryDepChecker};
pub use error::{AccessError, LoopAccessReport, MemoryOpViolation, ShapeViolation};
pub use info::{AnalysisContext, LoopAccessInfo, Verdict};
pub use runtime_check::{BoundsConflict, PointerBounds, RuntimeCheckEntry, RuntimeCheckPlan, RuntimePointerCheck};
pub use stride::{Stride, SymbolicStrides};

pub(crate) const LOG_TARGET: &str = "loop-accesses";
