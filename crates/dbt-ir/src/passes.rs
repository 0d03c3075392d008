//! The optimization passes of the default pipeline.

use std::collections::HashMap;

use crate::emitter::{CtxClass, CtxSlot, IrEmitter, NodeId, NodeKind};
use crate::manager::Pass;

/// Forward store-to-load forwarding and redundant-store removal over the
/// guest context, within each block.
pub struct ContextLoadStoreElimination;

impl Pass for ContextLoadStoreElimination {
    fn name(&self) -> &'static str {
        "ContextLoadStoreElimination"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;

        for block in 0..emit.block_count() {
            // Per slot: the youngest store and the value it wrote.
            let mut live_stores: HashMap<CtxSlot, (NodeId, Option<NodeId>)> = HashMap::new();

            for node in emit.block_nodes(block) {
                match emit.kind(node) {
                    NodeKind::ContextStore(slot) => {
                        let value = emit.operands(node).first().copied();
                        // The previous store to this slot is dead: every
                        // load since was forwarded below.
                        if let Some((prev, _)) = live_stores.insert(slot, (node, value)) {
                            emit.remove(prev);
                            changed = true;
                        }
                    }
                    NodeKind::ContextLoad(slot) => {
                        match live_stores.get(&slot).map(|&(_, value)| value) {
                            Some(Some(value)) => {
                                emit.replace_uses(node, value);
                                emit.remove(node);
                                changed = true;
                            }
                            // No forwardable value: the load observes the
                            // store, which therefore must survive.
                            Some(None) => {
                                live_stores.remove(&slot);
                            }
                            None => {}
                        }
                    }
                    kind if kind.observes_context() => {
                        // Syscalls and opaque side effects may read any
                        // slot; forget everything.
                        live_stores.clear();
                    }
                    _ => {}
                }
            }
        }

        changed
    }
}

/// Constant folding, optionally inlining constants into use sites.
pub struct ConstProp {
    inline_constants: bool,
}

impl ConstProp {
    #[must_use]
    pub fn new(inline_constants: bool) -> Self {
        Self { inline_constants }
    }
}

impl Pass for ConstProp {
    fn name(&self) -> &'static str {
        "ConstProp"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;

        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                if emit.kind(node) != NodeKind::Pure {
                    continue;
                }
                if let Some(value) = emit.fold_constant(node) {
                    let constant = emit.make_constant(block, value);
                    emit.replace_uses(node, constant);
                    emit.remove(node);
                    changed = true;
                }
            }
        }

        if self.inline_constants {
            for block in 0..emit.block_count() {
                for node in emit.block_nodes(block) {
                    if matches!(emit.kind(node), NodeKind::Constant(_)) {
                        changed |= emit.inline_constant_uses(node);
                    }
                }
            }
        }

        changed
    }
}

/// Backward removal of context stores that are overwritten before any
/// observer, restricted to one context class.
pub struct DeadContextStoreElimination {
    class: CtxClass,
}

impl DeadContextStoreElimination {
    #[must_use]
    pub fn flags() -> Self {
        Self {
            class: CtxClass::Flag,
        }
    }

    #[must_use]
    pub fn gprs() -> Self {
        Self {
            class: CtxClass::Gpr,
        }
    }

    #[must_use]
    pub fn fprs() -> Self {
        Self {
            class: CtxClass::Fpr,
        }
    }
}

impl Pass for DeadContextStoreElimination {
    fn name(&self) -> &'static str {
        match self.class {
            CtxClass::Flag => "DeadFlagStoreElimination",
            CtxClass::Gpr => "DeadGprStoreElimination",
            CtxClass::Fpr => "DeadFprStoreElimination",
            CtxClass::Other => "DeadContextStoreElimination",
        }
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;

        for block in 0..emit.block_count() {
            // Slots stored again later in the block with nothing observing
            // in between.
            let mut overwritten: Vec<CtxSlot> = Vec::new();

            for node in emit.block_nodes(block).into_iter().rev() {
                match emit.kind(node) {
                    NodeKind::ContextStore(slot) if slot.class == self.class => {
                        if overwritten.contains(&slot) {
                            emit.remove(node);
                            changed = true;
                        } else {
                            overwritten.push(slot);
                        }
                    }
                    NodeKind::ContextLoad(slot) if slot.class == self.class => {
                        overwritten.retain(|&candidate| candidate != slot);
                    }
                    kind if kind.observes_context() => {
                        overwritten.clear();
                    }
                    _ => {}
                }
            }
        }

        changed
    }
}

/// Remove unreferenced value-producing nodes. Single sweep; the pipeline
/// schedules it twice.
pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "DeadCodeElimination"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;

        for block in 0..emit.block_count() {
            // Reverse order lets one sweep catch chains of dead values.
            for node in emit.block_nodes(block).into_iter().rev() {
                let removable = matches!(
                    emit.kind(node),
                    NodeKind::Pure | NodeKind::Constant(_) | NodeKind::ContextLoad(_)
                );
                if removable && emit.use_count(node) == 0 {
                    emit.remove(node);
                    changed = true;
                }
            }
        }

        changed
    }
}

/// Rewrite syscalls whose number is a known constant into their direct
/// form.
pub struct SyscallOptimization;

impl Pass for SyscallOptimization {
    fn name(&self) -> &'static str {
        "SyscallOptimization"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;

        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                if emit.kind(node) != NodeKind::Syscall {
                    continue;
                }
                let Some(&number_node) = emit.operands(node).first() else {
                    continue;
                };
                if let NodeKind::Constant(number) = emit.kind(number_node) {
                    changed |= emit.specialize_syscall(node, number);
                }
            }
        }

        changed
    }
}

/// Pin the first N distinct guest GPR slots to host registers, in order
/// of first appearance.
pub struct StaticRegisterAllocation {
    register_count: u8,
}

impl Default for StaticRegisterAllocation {
    fn default() -> Self {
        Self { register_count: 8 }
    }
}

impl StaticRegisterAllocation {
    #[must_use]
    pub fn new(register_count: u8) -> Self {
        Self { register_count }
    }
}

impl Pass for StaticRegisterAllocation {
    fn name(&self) -> &'static str {
        "StaticRegisterAllocation"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;
        let mut assignments: HashMap<u16, u8> = HashMap::new();

        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                let slot = match emit.kind(node) {
                    NodeKind::ContextLoad(slot) | NodeKind::ContextStore(slot)
                        if slot.class == CtxClass::Gpr =>
                    {
                        slot
                    }
                    _ => continue,
                };

                let register = match assignments.get(&slot.index).copied() {
                    Some(register) => register,
                    None => {
                        let next = assignments.len() as u8;
                        if next >= self.register_count {
                            continue;
                        }
                        assignments.insert(slot.index, next);
                        next
                    }
                };
                changed |= emit.assign_register(node, register);
            }
        }

        changed
    }
}

/// Renumber nodes densely. Must precede any dynamic register allocator.
pub struct IrCompaction;

impl Pass for IrCompaction {
    fn name(&self) -> &'static str {
        "IRCompaction"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        emit.compact()
    }
}

/// Host-inserted dynamic register allocation.
///
/// Owns its own compaction pass and re-runs it after allocation, so spills
/// and fills inserted by the allocator end up densely numbered again.
pub struct RegisterAllocation {
    register_count: u8,
    compaction: IrCompaction,
}

impl RegisterAllocation {
    #[must_use]
    pub fn new(register_count: u8) -> Self {
        Self {
            register_count,
            compaction: IrCompaction,
        }
    }
}

impl Pass for RegisterAllocation {
    fn name(&self) -> &'static str {
        "RegisterAllocation"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;
        let mut next_register = 0u8;

        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                let produces_value = matches!(
                    emit.kind(node),
                    NodeKind::Pure | NodeKind::Constant(_) | NodeKind::ContextLoad(_)
                );
                if !produces_value {
                    continue;
                }
                changed |= emit.assign_register(node, next_register);
                next_register = (next_register + 1) % self.register_count;
            }
        }

        // Allocation may have inserted spill/fill nodes.
        changed |= self.compaction.run(emit);
        changed
    }
}
