//! IR optimization pass pipeline.
//!
//! The IR itself lives elsewhere; this crate sees it only through the
//! [`IrEmitter`] capability. What it owns is the pipeline: the ordered
//! default pass schedule, host-inserted register allocation, and the
//! validation passes that ride along in assertions builds.

mod emitter;
mod manager;
mod passes;
mod validation;

pub use emitter::{CtxClass, CtxSlot, IrEmitter, NodeId, NodeKind};
pub use manager::{Pass, PassManager, PipelineConfig};
pub use passes::{
    ConstProp, ContextLoadStoreElimination, DeadCodeElimination, DeadContextStoreElimination,
    IrCompaction, RegisterAllocation, StaticRegisterAllocation, SyscallOptimization,
};
pub use validation::{IrValidation, PhiValidation, ValueDominanceValidation};
