//! Decoded-instruction model: flags word, operands, size-override stack.

use bitflags::bitflags;

use crate::regs::Reg;
use crate::tables::InstInfo;

bitflags! {
    /// Per-instruction decode state accumulated by the prefix loop.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecodeFlags: u32 {
        /// `0x66` operand-size override seen.
        const OPERAND_SIZE = 1 << 0;
        /// `0x67` address-size override seen.
        const ADDRESS_SIZE = 1 << 1;
        /// `0xF0` LOCK prefix.
        const LOCK = 1 << 2;
        /// `0xF3` REP prefix.
        const REP = 1 << 3;
        /// `0xF2` REPNE prefix.
        const REPNE = 1 << 4;
        /// ES segment override (32-bit mode only).
        const ES_PREFIX = 1 << 5;
        /// CS segment override (32-bit mode only).
        const CS_PREFIX = 1 << 6;
        /// SS segment override (32-bit mode only).
        const SS_PREFIX = 1 << 7;
        /// DS segment override (32-bit mode only).
        const DS_PREFIX = 1 << 8;
        /// FS segment prefix.
        const FS_PREFIX = 1 << 9;
        /// GS segment prefix.
        const GS_PREFIX = 1 << 10;
        /// A REX prefix was decoded.
        const REX_PREFIX = 1 << 11;
        /// REX.W: widen the default operand size to 64 bits.
        const REX_WIDENING = 1 << 12;
        /// REX.B: extend ModRM.rm / SIB.base / opcode-embedded register.
        const REX_XGPR_B = 1 << 13;
        /// REX.X: extend SIB.index.
        const REX_XGPR_X = 1 << 14;
        /// REX.R: extend ModRM.reg.
        const REX_XGPR_R = 1 << 15;
        /// A ModR/M byte belongs to this instruction.
        const MODRM_PRESENT = 1 << 16;
        /// A SIB byte belongs to this instruction.
        const SIB_PRESENT = 1 << 17;
    }
}

/// Which size-override arrived, for the two-entry override stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeMarker {
    /// `0x66` operand-size prefix.
    OperandSize,
    /// REX.W widening.
    Widening,
}

/// Two-entry LIFO of operand-size override markers.
///
/// `0x66` and REX.W both override the default operand size, and whichever
/// was pushed last wins. The stack exists because two-byte table selection
/// can *consume* a `0x66` (it selected a sub-table rather than sizing the
/// operand) and must pop exactly that marker without disturbing a REX.W
/// pushed before or after it. A genuine state-machine artifact of the
/// encoding; two entries are sufficient for any legal prefix string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SizeOverrideStack {
    slots: [Option<SizeMarker>; 2],
}

impl SizeOverrideStack {
    /// Push a marker, shifting the previous top down one slot.
    pub fn push(&mut self, marker: SizeMarker) {
        self.slots[1] = self.slots[0];
        self.slots[0] = Some(marker);
    }

    /// The most recently pushed marker, if any.
    #[must_use]
    pub fn top(&self) -> Option<SizeMarker> {
        self.slots[0]
    }

    /// Pop the top entry only if it matches `marker`.
    pub fn pop_if(&mut self, marker: SizeMarker) -> bool {
        if self.slots[0] == Some(marker) {
            self.slots[0] = self.slots[1];
            self.slots[1] = None;
            true
        } else {
            false
        }
    }
}

/// Resolved operand size for one stage of an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpSize {
    Size8,
    Size16,
    Size32,
    Size64,
    Size128,
}

impl OpSize {
    /// Size in bytes.
    #[must_use]
    pub fn bytes(self) -> u8 {
        match self {
            OpSize::Size8 => 1,
            OpSize::Size16 => 2,
            OpSize::Size32 => 4,
            OpSize::Size64 => 8,
            OpSize::Size128 => 16,
        }
    }
}

/// A decoded operand, one variant per addressing form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operand {
    /// Slot not used by this instruction.
    #[default]
    None,
    /// Register operand.
    Reg {
        reg: Reg,
        /// Legacy high-byte alias (AH/CH/DH/BH) of the named register.
        high_bits: bool,
    },
    /// Register used as an effective address, no displacement.
    RegDirect { reg: Reg },
    /// Register plus signed displacement.
    RegIndirect { reg: Reg, displacement: i32 },
    /// Scale-index-base effective address.
    Sib {
        /// 1, 2, 4 or 8.
        scale: u8,
        index: Option<Reg>,
        base: Option<Reg>,
        offset: i32,
    },
    /// Signed 32-bit offset from the end of this instruction.
    RipRelative { literal: i32 },
    /// Immediate value.
    Literal { value: u64, size: u8 },
}

impl Operand {
    /// The literal value, if this operand is an immediate.
    #[must_use]
    pub fn literal(&self) -> Option<u64> {
        match self {
            Operand::Literal { value, .. } => Some(*value),
            _ => None,
        }
    }
}

/// ModR/M byte, field view.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ModRm(pub u8);

impl ModRm {
    pub(crate) fn mod_bits(self) -> u8 {
        self.0 >> 6
    }
    pub(crate) fn reg(self) -> u8 {
        (self.0 >> 3) & 0b111
    }
    pub(crate) fn rm(self) -> u8 {
        self.0 & 0b111
    }
}

/// SIB byte, field view.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sib(pub u8);

impl Sib {
    pub(crate) fn scale(self) -> u8 {
        self.0 >> 6
    }
    pub(crate) fn index(self) -> u8 {
        (self.0 >> 3) & 0b111
    }
    pub(crate) fn base(self) -> u8 {
        self.0 & 0b111
    }
}

/// One decoded guest instruction.
#[derive(Debug, Clone)]
pub struct DecodedInst {
    /// Guest address of the first byte.
    pub pc: u64,
    /// Total encoded length in bytes, 1..=15.
    pub size: u8,
    /// Final table opcode value (post group/escape rewriting).
    pub op: u16,
    /// Descriptor the dispatch landed on.
    pub info: InstInfo,
    /// Prefix and structure flags.
    pub flags: DecodeFlags,
    /// Operand-size override LIFO.
    pub size_overrides: SizeOverrideStack,
    /// Resolved destination operand size.
    pub dst_size: OpSize,
    /// Resolved source operand size.
    pub src_size: OpSize,
    /// Raw ModR/M byte, valid when `modrm_decoded`.
    pub modrm: u8,
    pub modrm_decoded: bool,
    /// Raw SIB byte, valid when `sib_decoded`.
    pub sib: u8,
    pub sib_decoded: bool,
    /// Last of `0x66`/`0xF2`/`0xF3` seen, for sub-table selection.
    pub last_escape_prefix: u8,
    /// Destination operand.
    pub dest: Operand,
    /// Source operands, in descriptor order.
    pub srcs: [Operand; 3],
}

impl DecodedInst {
    pub(crate) fn new(pc: u64) -> Self {
        Self {
            pc,
            size: 0,
            op: 0,
            info: InstInfo::UNKNOWN,
            flags: DecodeFlags::empty(),
            size_overrides: SizeOverrideStack::default(),
            dst_size: OpSize::Size32,
            src_size: OpSize::Size32,
            modrm: 0,
            modrm_decoded: false,
            sib: 0,
            sib_decoded: false,
            last_escape_prefix: 0,
            dest: Operand::None,
            srcs: [Operand::None; 3],
        }
    }
}
