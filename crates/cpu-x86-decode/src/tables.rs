//! Opcode dispatch tables.
//!
//! One [`OpTables`] value holds every table the decoder consults: the base
//! single-byte table, the two-byte (`0F`) table with its REP/REPNE/66
//! overlay sub-tables, the primary and secondary opcode-extension groups,
//! the x87 table, VEX/EVEX, 3DNow! and the 0F38/0F3A escape tables.
//! Tables are built once for a guest [`Mode`] and never mutated; slots the
//! build does not populate stay [`InstInfo::UNKNOWN`] and fail decode.

use bitflags::bitflags;
use dbt_core::Mode;

mod base;
mod extended;
mod groups;
mod secondary;
mod vex;
mod x87;

pub(crate) use groups::index as primary_group_index;
pub(crate) use secondary::sec_index;
pub(crate) use vex::{vex_group_index, vex_index};

bitflags! {
    /// Instruction-descriptor flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct InstFlags: u32 {
        /// Instruction carries a ModR/M byte and produces operands from it.
        const MODRM = 1 << 0;
        /// The ModRM mod/rm side is the destination (reg side is source).
        const SF_MOD_DST = 1 << 1;
        /// Destination is hardcoded to RAX.
        const SF_DST_RAX = 1 << 2;
        /// Destination is hardcoded to RDX.
        const SF_DST_RDX = 1 << 3;
        /// Append RAX as a source operand.
        const SF_SRC_RAX = 1 << 4;
        /// Append RCX as a source operand.
        const SF_SRC_RCX = 1 << 5;
        /// Destination register lives in the low 3 opcode bits, REX.B extends.
        const SF_REX_IN_BYTE = 1 << 6;
        /// Operates on vector registers; sub-flags below refine per stage.
        const XMM_FLAGS = 1 << 7;
        /// Vector op whose source field is nevertheless a GPR.
        const SF_SRC_GPR = 1 << 8;
        /// Vector op whose destination field is nevertheless a GPR.
        const SF_DST_GPR = 1 << 9;
        /// Vector source field maps into the MMX bank.
        const SF_MMX_SRC = 1 << 10;
        /// Vector destination field maps into the MMX bank.
        const SF_MMX_DST = 1 << 11;
        /// Always the high-byte alias form.
        const SF_HIGH_XMM_REG = 1 << 12;
        /// Ends the current decode block.
        const BLOCK_END = 1 << 13;
        /// Writes the instruction pointer.
        const SETS_RIP = 1 << 14;
        /// Immediate doubles under REX.W.
        const DISPLACE_SIZE_MUL_2 = 1 << 15;
        /// Immediate halves under an operand-size override.
        const DISPLACE_SIZE_DIV_2 = 1 << 16;
        /// Immediate is a memory offset; halves under an address-size override.
        const MEM_OFFSET = 1 << 17;
        /// Sign-extend the immediate to the destination size.
        const SRC_SEXT = 1 << 18;
        /// Sign-extend the immediate only when the destination is 64-bit.
        const SRC_SEXT64BIT = 1 << 19;
        /// Two-byte table entry ignores all prefix overlays.
        const NO_OVERLAY = 1 << 20;
        /// Two-byte table entry ignores only the `0x66` overlay.
        const NO_OVERLAY66 = 1 << 21;
    }
}

/// Declared operand-size category of a descriptor stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    /// Mode default: 32, narrowable to 16, widenable to 64.
    Def,
    /// Mode default, but defaults to 64 in 64-bit mode.
    Def64,
    Fixed8,
    Fixed16,
    Fixed64,
    Fixed128,
}

/// Secondary opcode-extension groups (two-byte table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SecGroup {
    G6 = 0,
    G7,
    G8,
    G9,
    G10,
    G12,
    G13,
    G14,
    G15,
    G16,
    G17,
    P,
}

/// What kind of table entry a dispatch landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstType {
    /// Unpopulated slot; decoding it is an error.
    Unknown,
    /// Architecturally invalid encoding.
    Invalid,
    /// Prefix byte that reached dispatch (the prefix loop normally eats it).
    LegacyPrefix,
    /// An ordinary instruction.
    Instruction,
    /// REX prefix entry (64-bit tables only).
    Rex,
    /// Primary opcode-extension group 1..=11; `bank` distinguishes the
    /// opcodes sharing the group (e.g. `0x80`/`0x81`/`0x83`).
    Group { group: u8, bank: u8 },
    /// Secondary opcode-extension group, prefix-parametrized.
    SecondaryGroup(SecGroup),
    /// Secondary-group entry resolved further by `(field << 3) | ModRM.rm`.
    SecondGroupModRm,
    /// x87 escape (`D8..=DF`).
    X87Prefix,
    /// VEX prefix (`C4`/`C5`).
    VexPrefix,
    /// VEX table entry resolved further by ModRM.reg, groups 12..=17.
    VexGroup(u8),
    /// EVEX prefix (`62` in 64-bit mode).
    EvexPrefix,
}

/// One opcode-table entry.
#[derive(Debug, Clone, Copy)]
pub struct InstInfo {
    /// Mnemonic, for diagnostics.
    pub name: &'static str,
    pub ty: InstType,
    pub flags: InstFlags,
    pub dst_size: SizeSpec,
    pub src_size: SizeSpec,
    /// Immediate byte count before displacement adjustment.
    pub more_bytes: u8,
}

impl InstInfo {
    /// The unpopulated-slot sentinel.
    pub const UNKNOWN: InstInfo = InstInfo {
        name: "UNKNOWN",
        ty: InstType::Unknown,
        flags: InstFlags::empty(),
        dst_size: SizeSpec::Def,
        src_size: SizeSpec::Def,
        more_bytes: 0,
    };
}

/// An instruction with default sizes and no immediate.
pub(crate) fn op(name: &'static str, flags: InstFlags) -> InstInfo {
    InstInfo {
        name,
        ty: InstType::Instruction,
        flags,
        dst_size: SizeSpec::Def,
        src_size: SizeSpec::Def,
        more_bytes: 0,
    }
}

/// An instruction with an immediate.
pub(crate) fn op_imm(name: &'static str, flags: InstFlags, more_bytes: u8) -> InstInfo {
    InstInfo {
        more_bytes,
        ..op(name, flags)
    }
}

/// An instruction with explicit size categories.
pub(crate) fn op_sz(
    name: &'static str,
    flags: InstFlags,
    dst_size: SizeSpec,
    src_size: SizeSpec,
    more_bytes: u8,
) -> InstInfo {
    InstInfo {
        name,
        ty: InstType::Instruction,
        flags,
        dst_size,
        src_size,
        more_bytes,
    }
}

/// A non-instruction entry (prefix, group dispatch, escape).
pub(crate) fn entry(name: &'static str, ty: InstType) -> InstInfo {
    InstInfo {
        ty,
        ..op(name, InstFlags::empty())
    }
}

pub(crate) fn invalid(name: &'static str) -> InstInfo {
    entry(name, InstType::Invalid)
}

/// Fill `count` consecutive slots starting at `index`.
pub(crate) fn fill(table: &mut [InstInfo], index: usize, count: usize, info: InstInfo) {
    for slot in &mut table[index..index + count] {
        *slot = info;
    }
}

/// The complete, immutable table set for one guest mode.
pub struct OpTables {
    mode: Mode,
    pub(crate) base: Vec<InstInfo>,
    pub(crate) second_base: Vec<InstInfo>,
    pub(crate) rep_mod: Vec<InstInfo>,
    pub(crate) repne_mod: Vec<InstInfo>,
    pub(crate) op_size_mod: Vec<InstInfo>,
    pub(crate) primary_groups: Vec<InstInfo>,
    pub(crate) second_groups: Vec<InstInfo>,
    pub(crate) second_modrm: Vec<InstInfo>,
    pub(crate) x87: Vec<InstInfo>,
    pub(crate) vex: Vec<InstInfo>,
    pub(crate) vex_groups: Vec<InstInfo>,
    pub(crate) evex: Vec<InstInfo>,
    pub(crate) dddnow: Vec<InstInfo>,
    pub(crate) h0f38: Vec<InstInfo>,
    pub(crate) h0f3a: Vec<InstInfo>,
}

impl OpTables {
    /// Build the table set for `mode`. Build once, share by reference.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            base: base::table(mode),
            second_base: secondary::second_base(),
            rep_mod: secondary::rep_mod(),
            repne_mod: secondary::repne_mod(),
            op_size_mod: secondary::op_size_mod(),
            primary_groups: groups::primary(mode),
            second_groups: secondary::second_groups(),
            second_modrm: secondary::second_modrm(),
            x87: x87::table(),
            vex: vex::vex(),
            vex_groups: vex::vex_groups(),
            evex: vex::evex(),
            dddnow: extended::dddnow(),
            h0f38: extended::h0f38(),
            h0f3a: extended::h0f3a(),
        }
    }

    /// The mode these tables were built for.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }
}
