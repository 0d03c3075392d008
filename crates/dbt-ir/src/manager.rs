//! Pass trait and the ordered pass pipeline.

use log::trace;

use crate::emitter::IrEmitter;
use crate::passes::{
    ConstProp, ContextLoadStoreElimination, DeadCodeElimination, DeadContextStoreElimination,
    IrCompaction, StaticRegisterAllocation, SyscallOptimization,
};
use crate::validation::{IrValidation, PhiValidation, ValueDominanceValidation};

/// An IR transformation.
pub trait Pass {
    /// Stable name for logging.
    fn name(&self) -> &'static str;
    /// Run once over the unit; report whether the IR was mutated.
    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool;
}

/// Options for the default pipeline.
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Fold produced constants into their use sites.
    pub inline_constants: bool,
    /// Pin hot guest GPRs to host registers ahead of code generation.
    /// Only takes effect together with `inline_constants`.
    pub static_ra: bool,
    /// Also eliminate dead FPR context stores.
    pub fpr_stores: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            inline_constants: true,
            static_ra: false,
            fpr_stores: false,
        }
    }
}

/// Ordered pipeline of passes plus the validation tail.
#[derive(Default)]
pub struct PassManager {
    passes: Vec<Box<dyn Pass>>,
    validation_passes: Vec<Box<dyn Pass>>,
}

impl PassManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    pub fn insert_validation_pass(&mut self, pass: Box<dyn Pass>) {
        self.validation_passes.push(pass);
    }

    /// Append the default optimization schedule. The order is load-bearing.
    pub fn add_default_passes(&mut self, config: PipelineConfig) {
        self.insert_pass(Box::new(ContextLoadStoreElimination));
        self.insert_pass(Box::new(ConstProp::new(config.inline_constants)));
        self.insert_pass(Box::new(DeadContextStoreElimination::flags()));
        self.insert_pass(Box::new(DeadContextStoreElimination::gprs()));
        if config.fpr_stores {
            self.insert_pass(Box::new(DeadContextStoreElimination::fprs()));
        }
        self.insert_pass(Box::new(DeadCodeElimination));
        self.insert_pass(Box::new(SyscallOptimization));
        // Second sweep: syscall specialization strands its number chains.
        self.insert_pass(Box::new(DeadCodeElimination));

        if config.inline_constants && config.static_ra {
            self.insert_pass(Box::new(StaticRegisterAllocation::default()));
        }

        // Compaction renumbers nodes, so it must run before any dynamic
        // register allocator records node-register associations.
        self.insert_pass(Box::new(IrCompaction));
    }

    /// Append the validation tail. Compiled to nothing outside assertions
    /// builds.
    pub fn add_default_validation_passes(&mut self) {
        if cfg!(debug_assertions) {
            self.insert_validation_pass(Box::new(PhiValidation));
            self.insert_validation_pass(Box::new(IrValidation));
            self.insert_validation_pass(Box::new(ValueDominanceValidation));
        }
    }

    /// Insert a host-provided register allocation pass. Runs after the
    /// default pipeline, i.e. after compaction.
    pub fn insert_register_allocation_pass(&mut self, pass: Box<dyn Pass>) {
        self.passes.push(pass);
    }

    /// Names of the scheduled passes, in order.
    #[must_use]
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|pass| pass.name()).collect()
    }

    /// Run every pass in order, then validation. Returns whether any pass
    /// mutated the IR.
    pub fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        let mut changed = false;
        for pass in &mut self.passes {
            let pass_changed = pass.run(emit);
            if pass_changed {
                trace!("pass {} changed the IR", pass.name());
            }
            changed |= pass_changed;
        }
        for pass in &mut self.validation_passes {
            changed |= pass.run(emit);
        }
        changed
    }
}
