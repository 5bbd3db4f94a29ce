//! Loop-level IR consumed by the access analysis.
//!
//! - `arena`: typed ids for values, blocks, instructions and loops
//! - `types`: element and pointer types
//! - `function`: values, instructions, blocks, loops
//! - `cfg`: backedges, exits and dominance within one loop
//! - `builder`: incremental construction

pub mod arena;
pub mod builder;
pub mod cfg;
pub mod function;
pub mod types;

pub use arena::{BlockId, InstId, LoopId, ValueId};
pub use builder::FunctionBuilder;
pub use cfg::LoopCfg;
pub use function::{
    AccessFlags, BasicBlock, Function, Inst, InstKind, Intrinsic, Loop, MemoryEffects, TbaaTag,
    ValueData, ValueKind,
};
pub use types::{MemType, ValueType};
