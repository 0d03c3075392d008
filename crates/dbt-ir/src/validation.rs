//! Structural validation passes.
//!
//! Scheduled only in assertions builds, after the optimization pipeline.
//! They never mutate the IR; an invariant violation aborts the process.

use log::error;

use crate::emitter::{IrEmitter, NodeKind};
use crate::manager::Pass;

/// Phis must sit at block heads with one operand per predecessor.
pub struct PhiValidation;

impl Pass for PhiValidation {
    fn name(&self) -> &'static str {
        "PhiValidation"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        for block in 0..emit.block_count() {
            let predecessors = emit.block_predecessors(block);
            let mut past_phi_section = false;

            for node in emit.block_nodes(block) {
                if emit.kind(node) == NodeKind::Phi {
                    if past_phi_section {
                        error!("phi node {node} appears after non-phi nodes in block {block}");
                        panic!("phi outside the phi section");
                    }
                    let operand_count = emit.operands(node).len();
                    assert_eq!(
                        operand_count,
                        predecessors.len(),
                        "phi node {node} in block {block} has {operand_count} operands for {} predecessors",
                        predecessors.len()
                    );
                } else {
                    past_phi_section = true;
                }
            }
        }
        false
    }
}

/// Every operand must name a live node.
pub struct IrValidation;

impl Pass for IrValidation {
    fn name(&self) -> &'static str {
        "IRValidation"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                for operand in emit.operands(node) {
                    assert!(
                        emit.exists(operand),
                        "node {node} in block {block} uses removed node {operand}"
                    );
                }
            }
        }
        false
    }
}

/// Every operand's definition must be available where it is used.
pub struct ValueDominanceValidation;

impl Pass for ValueDominanceValidation {
    fn name(&self) -> &'static str {
        "ValueDominanceValidation"
    }

    fn run(&mut self, emit: &mut dyn IrEmitter) -> bool {
        for block in 0..emit.block_count() {
            for node in emit.block_nodes(block) {
                // Phi operands flow along edges and are checked by phi
                // validation instead.
                if emit.kind(node) == NodeKind::Phi {
                    continue;
                }
                for operand in emit.operands(node) {
                    assert!(
                        emit.dominates(operand, node),
                        "value {operand} does not dominate its use in node {node}"
                    );
                }
            }
        }
        false
    }
}
