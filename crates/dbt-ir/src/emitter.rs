//! The upward capability the passes see.

/// Dense node identifier within one IR unit.
pub type NodeId = u32;

/// Which part of the guest context a load/store touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CtxClass {
    Gpr,
    Fpr,
    Flag,
    Other,
}

/// A guest-context slot: class plus index within the class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CtxSlot {
    pub class: CtxClass,
    pub index: u16,
}

/// Pass-relevant classification of a node.
///
/// This is the minimum the default pipeline needs; the IR is free to
/// refine it. Conventions: a `ContextStore`'s first operand is the stored
/// value, a `Syscall`'s first operand is the syscall number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A materialized constant.
    Constant(u64),
    ContextLoad(CtxSlot),
    ContextStore(CtxSlot),
    /// Guest system call with a dynamic number.
    Syscall,
    /// Syscall already specialized to a known number.
    DirectSyscall(u64),
    /// SSA phi.
    Phi,
    /// Value-producing node without side effects.
    Pure,
    /// Anything the passes must not touch or reorder across.
    SideEffect,
}

impl NodeKind {
    /// True for nodes that observe guest context and so act as barriers
    /// to context-store motion.
    #[must_use]
    pub fn observes_context(&self) -> bool {
        matches!(
            self,
            NodeKind::Syscall | NodeKind::DirectSyscall(_) | NodeKind::SideEffect
        )
    }
}

/// Block iteration, node mutation and constant introduction — everything
/// a pass may do to the IR.
///
/// Implemented by the IR emitter; passes treat the IR opaquely through it.
pub trait IrEmitter {
    /// Number of blocks in the unit.
    fn block_count(&self) -> u32;
    /// Nodes of `block` in program order.
    fn block_nodes(&self, block: u32) -> Vec<NodeId>;
    /// Predecessor blocks of `block`.
    fn block_predecessors(&self, block: u32) -> Vec<u32>;

    fn kind(&self, node: NodeId) -> NodeKind;
    /// Operand nodes of `node`.
    fn operands(&self, node: NodeId) -> Vec<NodeId>;
    /// Number of uses of `node`'s value.
    fn use_count(&self, node: NodeId) -> u32;
    /// Whether `node` still names a live node.
    fn exists(&self, node: NodeId) -> bool;
    /// Whether `def`'s value is available at `user`.
    fn dominates(&self, def: NodeId, user: NodeId) -> bool;

    /// Evaluate a pure node whose operands are all constants.
    fn fold_constant(&self, node: NodeId) -> Option<u64>;
    /// Materialize a constant in `block`, returning its node.
    fn make_constant(&mut self, block: u32, value: u64) -> NodeId;
    /// Rewrite every use of `of` to use `with`.
    fn replace_uses(&mut self, of: NodeId, with: NodeId);
    /// Fold a constant's value into its use sites as immediates, where the
    /// target instruction can encode it. Returns whether anything changed.
    fn inline_constant_uses(&mut self, of: NodeId) -> bool;
    /// Delete `node`. Callers guarantee it has no remaining uses.
    fn remove(&mut self, node: NodeId);
    /// Rewrite a dynamic syscall into its direct form. Returns whether the
    /// node changed.
    fn specialize_syscall(&mut self, node: NodeId, number: u64) -> bool;
    /// Record a host-register assignment for `node`'s value. Returns
    /// whether the assignment is new.
    fn assign_register(&mut self, node: NodeId, reg: u8) -> bool;
    /// Renumber nodes densely, dropping removal holes. Returns whether any
    /// node moved. Register-node associations do not survive this.
    fn compact(&mut self) -> bool;
}
