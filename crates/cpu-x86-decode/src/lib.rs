//! x86/x86-64 instruction decoder frontend.
//!
//! Decodes guest machine code into structured instructions one byte at a
//! time: legacy prefixes, REX, escape bytes, ModR/M and SIB addressing,
//! then table-driven opcode dispatch across the base, two-byte, group,
//! x87, VEX/EVEX, 3DNow! and 0F38/0F3A tables.
//!
//! The decoder also performs multi-block region discovery: with multiblock
//! enabled it follows intra-procedural conditional and unconditional
//! branches, queueing their targets and fall-throughs so one decode request
//! yields every reachable block of the region.
//!
//! Opcode tables are built once per [`dbt_core::Mode`] by [`OpTables::new`]
//! and handed to each [`Decoder`] by reference; there is no global table
//! state.

mod decoder;
mod inst;
mod regs;
mod tables;

pub use decoder::{DecodeError, DecodedBlock, Decoder, MAX_INST_SIZE};
pub use inst::{DecodeFlags, DecodedInst, OpSize, Operand, SizeMarker, SizeOverrideStack};
pub use regs::{Gpr, Reg};
pub use tables::{InstFlags, InstInfo, InstType, OpTables, SecGroup, SizeSpec};
