//! The instruction decode state machine and multi-block discovery.
//!
//! [`Decoder::decode_instructions_at_entry`] is the entry point: it decodes
//! linearly from an entry address until a block-terminating instruction,
//! and (with multiblock enabled) follows intra-procedural branch targets
//! through a work-list until the region is closed.

use std::collections::BTreeSet;

use dbt_core::{DecodeConfig, GuestMem};
use log::debug;
use thiserror::Error;

use crate::inst::{DecodeFlags, DecodedInst, ModRm, OpSize, Operand, Sib, SizeMarker};
use crate::regs::{bank_for, map_modrm_reg, Gpr, Reg, RegBank};
use crate::tables::{
    primary_group_index, sec_index, vex_group_index, vex_index, InstFlags, InstInfo, InstType,
    OpTables, SizeSpec,
};

/// Architectural limit on x86 instruction length.
pub const MAX_INST_SIZE: usize = 15;

/// Why an instruction failed to decode.
///
/// Any of these aborts the current block; blocks decoded earlier in the
/// same request stay valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("instruction at {pc:#x} exceeds the 15-byte limit")]
    InstructionTooLong { pc: u64 },
    #[error("invalid or unknown instruction {name} {op:#06x} at {pc:#x}")]
    UnknownInstruction {
        name: &'static str,
        op: u16,
        pc: u64,
    },
    #[error("literal of {size} bytes at {pc:#x} is out of range")]
    BadLiteralSize { size: u8, pc: u64 },
    #[error("VEX map_select {map_select} at {pc:#x} is not understood")]
    BadVexMapSelect { map_select: u8, pc: u64 },
    #[error("invalid group field for {op:#06x} at {pc:#x}")]
    InvalidGroupField { op: u16, pc: u64 },
    #[error("register field at {pc:#x} names no register")]
    InvalidRegister { pc: u64 },
}

/// A contiguous decoded region starting at a guest entry address.
#[derive(Debug, Clone)]
pub struct DecodedBlock {
    /// Guest address of the first instruction.
    pub entry: u64,
    /// False when decoding aborted partway through this block; the
    /// instructions present are valid but do not reach a block terminator.
    pub complete: bool,
    pub instructions: Vec<DecodedInst>,
}

/// Register-bank attributes of one operand stage.
#[derive(Debug, Clone, Copy)]
struct OperandAttrs {
    xmm: bool,
    mm: bool,
    is_8bit: bool,
}

/// The x86 frontend decoder.
///
/// Holds the per-request work-list state; one instance is reused across
/// requests. Tables are shared by reference and must match the configured
/// mode.
pub struct Decoder<'t> {
    tables: &'t OpTables,
    config: DecodeConfig,

    blocks: Vec<DecodedBlock>,
    blocks_to_decode: BTreeSet<u64>,
    has_blocks: BTreeSet<u64>,
    entry_point: u64,
    symbol_min: u64,
    symbol_max: u64,
    /// Furthest forward conditional target seen; diagnostic only.
    max_cond_branch_forward: u64,
    /// Furthest backward conditional target seen; diagnostic only.
    max_cond_branch_backward: u64,
    total_instructions: usize,

    // State of the instruction currently being decoded.
    inst: DecodedInst,
    inst_bytes: [u8; MAX_INST_SIZE],
    inst_size: u8,
}

impl<'t> Decoder<'t> {
    /// Create a decoder over `tables`, which must match `config.mode`.
    #[must_use]
    pub fn new(tables: &'t OpTables, config: DecodeConfig) -> Self {
        assert_eq!(
            tables.mode(),
            config.mode,
            "decoder mode must match its opcode tables"
        );
        Self {
            tables,
            config,
            blocks: Vec::new(),
            blocks_to_decode: BTreeSet::new(),
            has_blocks: BTreeSet::new(),
            entry_point: 0,
            symbol_min: 0,
            symbol_max: u64::MAX,
            max_cond_branch_forward: 0,
            max_cond_branch_backward: u64::MAX,
            total_instructions: 0,
            inst: DecodedInst::new(0),
            inst_bytes: [0; MAX_INST_SIZE],
            inst_size: 0,
        }
    }

    /// Decode the region reachable from `pc`.
    ///
    /// Clears prior request state, then works the block queue: each popped
    /// address decodes linearly until a block-terminating instruction or a
    /// size cap. A failed instruction aborts only its own block, which is
    /// emitted with `complete == false`; the first error is reported after
    /// the remaining queued blocks have been decoded. [`Decoder::blocks`]
    /// is valid (sorted by entry) in both cases.
    pub fn decode_instructions_at_entry<M: GuestMem>(
        &mut self,
        mem: &M,
        pc: u64,
    ) -> Result<(), DecodeError> {
        self.blocks.clear();
        self.blocks_to_decode.clear();
        self.has_blocks.clear();
        self.total_instructions = 0;
        self.max_cond_branch_forward = 0;
        self.max_cond_branch_backward = u64::MAX;
        self.entry_point = pc;
        // No symbol information: assume branches forward of the entry stay
        // within the region.
        self.symbol_min = self.entry_point;
        self.symbol_max = u64::MAX;

        let mut first_error = None;

        // The entry is a jump target.
        self.blocks_to_decode.insert(pc);

        while let Some(rip) = self.blocks_to_decode.pop_first() {
            self.has_blocks.insert(rip);

            let mut instructions = Vec::new();
            let mut pc_offset = 0u64;
            let mut complete = true;

            loop {
                if let Err(err) = self.decode_instruction(mem, rip + pc_offset) {
                    debug!(
                        "couldn't decode instruction at {:#x}, started at {pc:#x}: {err}",
                        rip + pc_offset
                    );
                    first_error.get_or_insert(err);
                    complete = false;
                    break;
                }

                self.total_instructions += 1;
                let info_flags = self.inst.info.flags;

                // Anything that neither ends the block nor writes RIP lets
                // the block keep growing.
                let can_continue =
                    !info_flags.intersects(InstFlags::BLOCK_END | InstFlags::SETS_RIP);

                if info_flags.contains(InstFlags::SETS_RIP) {
                    // Branch targets may extend the region even though the
                    // branch ends this block.
                    self.branch_target_in_multiblock_range();
                }

                pc_offset += u64::from(self.inst.size);
                instructions.push(self.inst.clone());

                if !can_continue {
                    break;
                }
                if instructions.len() >= self.config.max_inst_per_block
                    || self.total_instructions >= self.config.max_total_insts
                {
                    break;
                }
            }

            self.blocks.push(DecodedBlock {
                entry: rip,
                complete,
                instructions,
            });
        }

        // Sort for better branching in the backend.
        self.blocks.sort_by_key(|block| block.entry);

        match first_error {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }

    /// Blocks produced by the last request, ascending by entry address.
    #[must_use]
    pub fn blocks(&self) -> &[DecodedBlock] {
        &self.blocks
    }

    /// Furthest forward conditional-branch target seen by the last request.
    #[must_use]
    pub fn max_cond_branch_forward(&self) -> u64 {
        self.max_cond_branch_forward
    }

    /// Furthest backward conditional-branch target seen by the last request.
    #[must_use]
    pub fn max_cond_branch_backward(&self) -> u64 {
        self.max_cond_branch_backward
    }

    /// Raw bytes of the most recently decoded instruction.
    #[must_use]
    pub fn last_inst_bytes(&self) -> &[u8] {
        &self.inst_bytes[..usize::from(self.inst_size)]
    }

    // ==== byte acquisition ====

    fn read_byte<M: GuestMem>(&mut self, mem: &M) -> Result<u8, DecodeError> {
        if usize::from(self.inst_size) >= MAX_INST_SIZE {
            return Err(DecodeError::InstructionTooLong { pc: self.inst.pc });
        }
        let byte = mem.read(self.inst.pc + u64::from(self.inst_size));
        self.inst_bytes[usize::from(self.inst_size)] = byte;
        self.inst_size += 1;
        Ok(byte)
    }

    fn peek_byte<M: GuestMem>(&self, mem: &M, offset: u8) -> u8 {
        mem.read(self.inst.pc + u64::from(self.inst_size) + u64::from(offset))
    }

    /// Read a little-endian value of `size` bytes (0 reads nothing).
    fn read_data<M: GuestMem>(&mut self, mem: &M, size: u8) -> Result<u64, DecodeError> {
        if size > 8 {
            return Err(DecodeError::BadLiteralSize {
                size,
                pc: self.inst.pc,
            });
        }
        let mut value = 0u64;
        for i in 0..size {
            value |= u64::from(self.read_byte(mem)?) << (8 * i);
        }
        Ok(value)
    }

    fn read_modrm<M: GuestMem>(&mut self, mem: &M) -> Result<ModRm, DecodeError> {
        if !self.inst.modrm_decoded {
            self.inst.modrm = self.read_byte(mem)?;
            self.inst.modrm_decoded = true;
        }
        self.inst.flags |= DecodeFlags::MODRM_PRESENT;
        Ok(ModRm(self.inst.modrm))
    }

    // ==== one instruction ====

    fn decode_instruction<M: GuestMem>(&mut self, mem: &M, pc: u64) -> Result<(), DecodeError> {
        self.inst = DecodedInst::new(pc);
        self.inst_bytes = [0; MAX_INST_SIZE];
        self.inst_size = 0;
        let is_64bit = self.config.mode.is_64bit();

        loop {
            let op = self.read_byte(mem)?;
            let done = match op {
                0x0F => self.escape_op(mem)?,
                0x66 => {
                    self.inst.flags |= DecodeFlags::OPERAND_SIZE;
                    self.inst.last_escape_prefix = op;
                    self.inst.size_overrides.push(SizeMarker::OperandSize);
                    false
                }
                0x67 => {
                    self.inst.flags |= DecodeFlags::ADDRESS_SIZE;
                    false
                }
                // Segment overrides are meaningless in long mode; GCC still
                // emits them on padding NOPs, so they decode and get dropped.
                0x26 => {
                    if !is_64bit {
                        self.inst.flags |= DecodeFlags::ES_PREFIX;
                    }
                    false
                }
                0x2E => {
                    if !is_64bit {
                        self.inst.flags |= DecodeFlags::CS_PREFIX;
                    }
                    false
                }
                0x36 => {
                    if !is_64bit {
                        self.inst.flags |= DecodeFlags::SS_PREFIX;
                    }
                    false
                }
                0x3E => {
                    if !is_64bit {
                        self.inst.flags |= DecodeFlags::DS_PREFIX;
                    }
                    false
                }
                0x64 => {
                    self.inst.flags |= DecodeFlags::FS_PREFIX;
                    false
                }
                0x65 => {
                    self.inst.flags |= DecodeFlags::GS_PREFIX;
                    false
                }
                0xF0 => {
                    self.inst.flags |= DecodeFlags::LOCK;
                    false
                }
                0xF2 => {
                    self.inst.flags |= DecodeFlags::REPNE;
                    self.inst.last_escape_prefix = op;
                    false
                }
                0xF3 => {
                    self.inst.flags |= DecodeFlags::REP;
                    self.inst.last_escape_prefix = op;
                    false
                }
                _ => {
                    let info = self.tables.base[usize::from(op)];
                    self.normal_op_header(mem, info, u16::from(op))?
                }
            };
            if done {
                return Ok(());
            }
        }
    }

    /// Secondary dispatch after a `0x0F` escape byte.
    fn escape_op<M: GuestMem>(&mut self, mem: &M) -> Result<bool, DecodeError> {
        let escape_op = self.read_byte(mem)?;
        match escape_op {
            0x0F => {
                // 3DNow!: 0F 0F [ModRM] [SIB] [disp] [opcode]. The opcode
                // trails the displacement, so peek it, dispatch, and consume
                // it last.
                let modrm = self.read_modrm(mem)?;
                let mut displacement = 0u8;
                self.displacement_for_modrm(&mut displacement, modrm);
                self.decode_sib(mem, &mut displacement, modrm)?;

                let local_op = self.peek_byte(mem, displacement);
                let info = self.tables.dddnow[usize::from(local_op)];
                let done = self.normal_op_header(mem, info, u16::from(local_op))?;

                self.read_byte(mem)?;
                self.inst.size = self.inst_size;
                Ok(done)
            }
            0x38 => {
                let prefix: u16 = match self.inst.last_escape_prefix {
                    0xF2 => 2,
                    0x66 => 1,
                    _ => 0,
                };
                let local_op = (prefix << 8) | u16::from(self.read_byte(mem)?);
                let info = self.tables.h0f38[usize::from(local_op)];
                self.normal_op_header(mem, info, local_op)
            }
            0x3A => {
                let mut prefix = u16::from(self.inst.last_escape_prefix == 0x66);
                if self.inst.flags.contains(DecodeFlags::REX_WIDENING) {
                    prefix |= 0b10;
                }
                let local_op = (prefix << 8) | u16::from(self.read_byte(mem)?);
                let info = self.tables.h0f3a[usize::from(local_op)];
                self.normal_op_header(mem, info, local_op)
            }
            _ => {
                // Two-byte table. The 0x66/0xF2/0xF3 prefixes extend the
                // encoding space: the last one seen selects a sub-table,
                // unless the entry opts out of overlays.
                let base_info = self.tables.second_base[usize::from(escape_op)];
                let op = u16::from(escape_op);
                let no_overlay = base_info.flags.contains(InstFlags::NO_OVERLAY);
                let no_overlay_66 = base_info.flags.contains(InstFlags::NO_OVERLAY66);

                if no_overlay {
                    self.normal_op_header(mem, base_info, op)
                } else if self.inst.last_escape_prefix == 0xF3 {
                    // Consumed for table selection; no longer a modifier.
                    self.inst.flags.remove(DecodeFlags::REP);
                    let info = self.tables.rep_mod[usize::from(escape_op)];
                    self.normal_op_header(mem, info, op)
                } else if self.inst.last_escape_prefix == 0xF2 {
                    self.inst.flags.remove(DecodeFlags::REPNE);
                    let info = self.tables.repne_mod[usize::from(escape_op)];
                    self.normal_op_header(mem, info, op)
                } else if self.inst.last_escape_prefix == 0x66 && !no_overlay_66 {
                    // Consumed for table selection: pop exactly one
                    // operand-size marker so it stops affecting sizing.
                    self.inst.flags.remove(DecodeFlags::OPERAND_SIZE);
                    self.inst.size_overrides.pop_if(SizeMarker::OperandSize);
                    let info = self.tables.op_size_mod[usize::from(escape_op)];
                    self.normal_op_header(mem, info, op)
                } else {
                    self.normal_op_header(mem, base_info, op)
                }
            }
        }
    }

    /// Resolve group, x87, VEX and EVEX dispatch, then decode operands.
    ///
    /// Returns `Ok(false)` when the byte was a REX prefix and decoding must
    /// continue with the next byte.
    fn normal_op_header<M: GuestMem>(
        &mut self,
        mem: &M,
        info: InstInfo,
        op: u16,
    ) -> Result<bool, DecodeError> {
        match info.ty {
            InstType::Group { group, bank } => {
                let modrm = self.read_modrm(mem)?;
                let local =
                    primary_group_index(group.into(), bank.into(), modrm.reg().into());
                let sub = self.tables.primary_groups[local];
                self.normal_op(mem, sub, local as u16)
            }
            InstType::SecondaryGroup(sec_group) => {
                let prefix: u16 = match self.inst.last_escape_prefix {
                    0xF3 => 1,
                    0x66 => 2,
                    0xF2 => 3,
                    _ => 0,
                };
                let modrm = self.read_modrm(mem)?;
                let local = sec_index(sec_group, prefix, modrm.reg().into());
                let sub = self.tables.second_groups[local];

                if sub.ty == InstType::SecondGroupModRm {
                    // The reg field maps into a packed field index with
                    // holes; a hole is a malformed encoding.
                    const REG_TO_FIELD: [u8; 8] = [255, 0, 1, 2, 255, 255, 255, 3];
                    let field = REG_TO_FIELD[usize::from(modrm.reg())];
                    if field == 255 {
                        return Err(DecodeError::InvalidGroupField {
                            op,
                            pc: self.inst.pc,
                        });
                    }
                    let local = usize::from((field << 3) | modrm.rm());
                    let sub = self.tables.second_modrm[local];
                    self.normal_op(mem, sub, local as u16)
                } else {
                    self.normal_op(mem, sub, local as u16)
                }
            }
            InstType::X87Prefix => {
                assert!(
                    (0xD8..=0xDF).contains(&op),
                    "x87 dispatch outside 0xD8..=0xDF"
                );
                self.read_modrm(mem)?;
                let local = usize::from(((op - 0xD8) << 8) | u16::from(self.inst.modrm));
                let sub = self.tables.x87[local];
                self.normal_op(mem, sub, local as u16)
            }
            InstType::VexPrefix => {
                let mut map_select: u16 = 1;
                let byte1 = self.read_byte(mem)?;
                let pp = if op == 0xC5 {
                    // Two-byte VEX.
                    u16::from(byte1 & 0b11)
                } else {
                    // Three-byte VEX carries the map select.
                    let byte2 = self.read_byte(mem)?;
                    map_select = u16::from(byte1 & 0b1_1111);
                    if !(1..=3).contains(&map_select) {
                        return Err(DecodeError::BadVexMapSelect {
                            map_select: map_select as u8,
                            pc: self.inst.pc,
                        });
                    }
                    u16::from(byte2 & 0b11)
                };

                let vex_op = u16::from(self.read_byte(mem)?);
                let local = vex_index(map_select, pp, vex_op);
                let sub = self.tables.vex[local];

                if let InstType::VexGroup(group) = sub.ty {
                    let modrm = self.read_modrm(mem)?;
                    let local = vex_group_index(group.into(), pp, modrm.reg().into());
                    let sub = self.tables.vex_groups[local];
                    self.normal_op(mem, sub, local as u16)
                } else {
                    self.normal_op(mem, sub, local as u16)
                }
            }
            InstType::EvexPrefix => {
                let _p1 = self.read_byte(mem)?;
                let _p2 = self.read_byte(mem)?;
                let _p3 = self.read_byte(mem)?;
                let evex_op = u16::from(self.read_byte(mem)?);
                let sub = self.tables.evex[usize::from(evex_op)];
                self.normal_op(mem, sub, evex_op)
            }
            InstType::Rex => {
                assert!(
                    self.config.mode.is_64bit(),
                    "REX prefix outside 64-bit mode"
                );
                self.inst.flags |= DecodeFlags::REX_PREFIX;
                if op & 0b1000 != 0 {
                    self.inst.flags |= DecodeFlags::REX_WIDENING;
                    self.inst.size_overrides.push(SizeMarker::Widening);
                }
                if op & 0b0001 != 0 {
                    self.inst.flags |= DecodeFlags::REX_XGPR_B;
                }
                if op & 0b0010 != 0 {
                    self.inst.flags |= DecodeFlags::REX_XGPR_X;
                }
                if op & 0b0100 != 0 {
                    self.inst.flags |= DecodeFlags::REX_XGPR_R;
                }
                Ok(false)
            }
            _ => self.normal_op(mem, info, op),
        }
    }

    /// Decode sizes, operands and immediates for a resolved descriptor.
    fn normal_op<M: GuestMem>(
        &mut self,
        mem: &M,
        info: InstInfo,
        op: u16,
    ) -> Result<bool, DecodeError> {
        self.inst.op = op;
        self.inst.info = info;

        match info.ty {
            InstType::Instruction => {}
            InstType::LegacyPrefix | InstType::Unknown | InstType::Invalid => {
                debug!(
                    "invalid or unknown instruction {} {op:#06x} at {:#x}",
                    info.name, self.inst.pc
                );
                return Err(DecodeError::UnknownInstruction {
                    name: info.name,
                    op,
                    pc: self.inst.pc,
                });
            }
            _ => panic!("group and prefix entries are resolved before operand decode"),
        }

        let flags = info.flags;
        let widening = self.inst.size_overrides.top() == Some(SizeMarker::Widening);
        let narrowing = self.inst.size_overrides.top() == Some(SizeMarker::OperandSize);

        let xmm = flags.contains(InstFlags::XMM_FLAGS);
        let has_xmm_src = xmm
            && !flags.contains(InstFlags::SF_SRC_GPR)
            && !flags.contains(InstFlags::SF_MMX_SRC);
        let has_xmm_dst = xmm
            && !flags.contains(InstFlags::SF_DST_GPR)
            && !flags.contains(InstFlags::SF_MMX_DST);
        let has_mm_src = xmm
            && !flags.contains(InstFlags::SF_SRC_GPR)
            && flags.contains(InstFlags::SF_MMX_SRC);
        let has_mm_dst = xmm
            && !flags.contains(InstFlags::SF_DST_GPR)
            && flags.contains(InstFlags::SF_MMX_DST);
        let is_64bit = self.config.mode.is_64bit();

        self.inst.dst_size = resolve_size(
            info.dst_size,
            narrowing,
            widening,
            has_xmm_dst || has_mm_dst,
            is_64bit,
        );
        self.inst.src_size = resolve_size(
            info.src_size,
            narrowing,
            widening,
            has_xmm_src || has_mm_src,
            is_64bit,
        );
        let dest_bytes = self.inst.dst_size.bytes();

        let has_modrm =
            self.inst.flags.contains(DecodeFlags::MODRM_PRESENT) || flags.contains(InstFlags::MODRM);

        let is_8bit_src = self.inst.src_size == OpSize::Size8;
        let is_8bit_dst = self.inst.dst_size == OpSize::Size8;
        let has_rex = self.inst.flags.contains(DecodeFlags::REX_PREFIX);
        let high_xmm = flags.contains(InstFlags::SF_HIGH_XMM_REG);

        // Hardcoded destinations move the ModRM-independent destination out
        // of the way: the next register-in-byte decode writes Src[0].
        let mut dest_to_src0 = false;
        if flags.intersects(InstFlags::SF_DST_RAX | InstFlags::SF_DST_RDX) {
            let reg = if flags.contains(InstFlags::SF_DST_RAX) {
                Gpr::Rax
            } else {
                Gpr::Rdx
            };
            self.inst.dest = Operand::Reg {
                reg: Reg::Gpr(reg),
                high_bits: false,
            };
            dest_to_src0 = true;
        }

        if flags.contains(InstFlags::SF_REX_IN_BYTE) {
            debug_assert!(!has_modrm, "register-in-byte ops carry no ModRM");
            let low = (op & 0b111) as u8;
            let high_bits = (is_8bit_dst && !has_rex && low >= 0b100) || high_xmm;
            let bank = bank_for(false, false, is_8bit_dst, has_rex);
            let reg = require_reg(
                map_modrm_reg(
                    self.inst.flags.contains(DecodeFlags::REX_XGPR_B),
                    low,
                    bank,
                    None,
                ),
                self.inst.pc,
            )?;
            let operand = Operand::Reg { reg, high_bits };
            if dest_to_src0 {
                self.inst.srcs[0] = operand;
            } else {
                self.inst.dest = operand;
            }
        }

        let mut displacement = 0u8;
        let mut has_sib = false;
        if has_modrm {
            let modrm = self.read_modrm(mem)?;
            self.displacement_for_modrm(&mut displacement, modrm);
            has_sib = self.decode_sib(mem, &mut displacement, modrm)?;
        }

        let mut bytes = info.more_bytes;
        if flags.contains(InstFlags::DISPLACE_SIZE_MUL_2) && widening {
            bytes <<= 1;
        }
        if flags.contains(InstFlags::DISPLACE_SIZE_DIV_2) && narrowing {
            bytes >>= 1;
        }
        if flags.contains(InstFlags::MEM_OFFSET)
            && self.inst.flags.contains(DecodeFlags::ADDRESS_SIZE)
        {
            // A memory offset shrinks with the address size, not the
            // operand size.
            bytes >>= 1;
        }
        bytes += displacement;

        let mut src_idx = 0usize;
        if flags.contains(InstFlags::MODRM) {
            let mod_dst = flags.contains(InstFlags::SF_MOD_DST);
            let dst_attrs = OperandAttrs {
                xmm: has_xmm_dst,
                mm: has_mm_dst,
                is_8bit: is_8bit_dst,
            };
            let src_attrs = OperandAttrs {
                xmm: has_xmm_src,
                mm: has_mm_src,
                is_8bit: is_8bit_src,
            };
            let (reg_attrs, rm_attrs) = if mod_dst {
                (src_attrs, dst_attrs)
            } else {
                (dst_attrs, src_attrs)
            };

            let (reg_op, rm_op, consumed) = self.modrm_operands(
                mem,
                has_sib,
                displacement,
                reg_attrs,
                rm_attrs,
                high_xmm,
                has_rex,
            )?;
            bytes -= consumed;

            if mod_dst {
                self.inst.srcs[0] = reg_op;
                self.inst.dest = rm_op;
            } else {
                self.inst.dest = reg_op;
                self.inst.srcs[0] = rm_op;
            }
            src_idx = 1;
        }

        if flags.contains(InstFlags::SF_SRC_RAX) {
            self.inst.srcs[src_idx] = Operand::Reg {
                reg: Reg::Gpr(Gpr::Rax),
                high_bits: false,
            };
            src_idx += 1;
        } else if flags.contains(InstFlags::SF_SRC_RCX) {
            self.inst.srcs[src_idx] = Operand::Reg {
                reg: Reg::Gpr(Gpr::Rcx),
                high_bits: false,
            };
            src_idx += 1;
        }

        if bytes != 0 {
            if bytes > 8 {
                return Err(DecodeError::BadLiteralSize {
                    size: bytes,
                    pc: self.inst.pc,
                });
            }
            let mut value = self.read_data(mem, bytes)?;
            let mut literal_size = bytes;

            if flags.contains(InstFlags::SRC_SEXT)
                || (self.inst.dst_size == OpSize::Size64
                    && flags.contains(InstFlags::SRC_SEXT64BIT))
            {
                value = match bytes {
                    1 => i64::from(value as u8 as i8) as u64,
                    2 => i64::from(value as u16 as i16) as u64,
                    _ => i64::from(value as u32 as i32) as u64,
                };
                literal_size = dest_bytes;
            }

            self.inst.srcs[src_idx] = Operand::Literal {
                value,
                size: literal_size,
            };
        }

        self.inst.size = self.inst_size;
        Ok(true)
    }

    /// Displacement size implied by the ModR/M byte alone.
    fn displacement_for_modrm(&mut self, displacement: &mut u8, modrm: ModRm) {
        if modrm.mod_bits() == 0b01 {
            *displacement = 1;
        } else if modrm.mod_bits() == 0b10 {
            *displacement = 4;
        } else if modrm.mod_bits() == 0 && modrm.rm() == 0b101 {
            *displacement = 4;
        }
        self.inst.flags |= DecodeFlags::MODRM_PRESENT;
    }

    /// Pull the SIB byte if the addressing form has one and refine the
    /// displacement size. SIB base `0b101` under mod 00 forces a 32-bit
    /// displacement.
    fn decode_sib<M: GuestMem>(
        &mut self,
        mem: &M,
        displacement: &mut u8,
        modrm: ModRm,
    ) -> Result<bool, DecodeError> {
        let has_sib = modrm.mod_bits() != 0b11 && modrm.rm() == 0b100;
        if has_sib {
            if !self.inst.sib_decoded {
                self.inst.sib = self.read_byte(mem)?;
                self.inst.sib_decoded = true;
            }
            self.inst.flags |= DecodeFlags::SIB_PRESENT;

            let sib = Sib(self.inst.sib);
            if modrm.mod_bits() == 0b01 {
                *displacement = 1;
            } else if modrm.mod_bits() == 0b10 {
                *displacement = 4;
            } else if modrm.mod_bits() == 0 && modrm.rm() == 0b101 {
                *displacement = 4;
            } else if modrm.mod_bits() == 0 && modrm.rm() == 0b100 && sib.base() == 0b101 {
                *displacement = 4;
            }
        }
        Ok(has_sib)
    }

    /// Produce the register-field operand and the mod/rm-field operand.
    ///
    /// Returns both plus the number of displacement bytes consumed.
    fn modrm_operands<M: GuestMem>(
        &mut self,
        mem: &M,
        has_sib: bool,
        displacement: u8,
        reg_attrs: OperandAttrs,
        rm_attrs: OperandAttrs,
        high_xmm: bool,
        has_rex: bool,
    ) -> Result<(Operand, Operand, u8), DecodeError> {
        let modrm = ModRm(self.inst.modrm);
        let flags = self.inst.flags;
        let pc = self.inst.pc;

        let reg_high = (reg_attrs.is_8bit && modrm.reg() >= 0b100 && !has_rex) || high_xmm;
        let reg = require_reg(
            map_modrm_reg(
                flags.contains(DecodeFlags::REX_XGPR_R),
                modrm.reg(),
                bank_for(reg_attrs.xmm, reg_attrs.mm, reg_attrs.is_8bit, has_rex),
                None,
            ),
            pc,
        )?;
        let reg_op = Operand::Reg {
            reg,
            high_bits: reg_high,
        };

        let mut consumed = 0u8;
        let rm_op = if modrm.mod_bits() == 0b11 {
            // Register form.
            let high = (rm_attrs.is_8bit && modrm.rm() >= 0b100 && !has_rex) || high_xmm;
            let reg = require_reg(
                map_modrm_reg(
                    flags.contains(DecodeFlags::REX_XGPR_B),
                    modrm.rm(),
                    bank_for(rm_attrs.xmm, rm_attrs.mm, rm_attrs.is_8bit, has_rex),
                    None,
                ),
                pc,
            )?;
            Operand::Reg {
                reg,
                high_bits: high,
            }
        } else if has_sib {
            let sib = Sib(self.inst.sib);
            let scale = 1u8 << sib.scale();
            // Index 0b100 (no REX.X) and base 0b101 under mod 00 encode
            // absent registers.
            let index = map_modrm_reg(
                flags.contains(DecodeFlags::REX_XGPR_X),
                sib.index(),
                RegBank::Gpr,
                Some(0b100),
            );
            let base = map_modrm_reg(
                flags.contains(DecodeFlags::REX_XGPR_B),
                sib.base(),
                RegBank::Gpr,
                if modrm.mod_bits() == 0 { Some(0b101) } else { None },
            );

            if displacement > 4 {
                return Err(DecodeError::BadLiteralSize {
                    size: displacement,
                    pc,
                });
            }
            let mut literal = self.read_data(mem, displacement)?;
            if displacement == 1 {
                literal = i64::from(literal as u8 as i8) as u64;
            }
            consumed = displacement;

            Operand::Sib {
                scale,
                index,
                base,
                offset: literal as i32,
            }
        } else if modrm.mod_bits() == 0 {
            debug_assert!(modrm.rm() != 0b100, "SIB form handled above");
            if modrm.rm() == 0b101 {
                let literal = self.read_data(mem, 4)? as u32;
                consumed = 4;
                Operand::RipRelative {
                    literal: literal as i32,
                }
            } else {
                let reg = require_reg(
                    map_modrm_reg(
                        flags.contains(DecodeFlags::REX_XGPR_B),
                        modrm.rm(),
                        RegBank::Gpr,
                        None,
                    ),
                    pc,
                )?;
                Operand::RegDirect { reg }
            }
        } else {
            let disp_size = if modrm.mod_bits() == 0b01 { 1 } else { 4 };
            let mut literal = self.read_data(mem, disp_size)?;
            if disp_size == 1 {
                literal = i64::from(literal as u8 as i8) as u64;
            }
            consumed = disp_size;

            let reg = require_reg(
                map_modrm_reg(
                    flags.contains(DecodeFlags::REX_XGPR_B),
                    modrm.rm(),
                    RegBank::Gpr,
                    None,
                ),
                pc,
            )?;
            Operand::RegIndirect {
                reg,
                displacement: literal as i32,
            }
        };

        Ok((reg_op, rm_op, consumed))
    }

    // ==== multi-block discovery ====

    /// Classify a RIP-setting instruction and queue reachable targets.
    fn branch_target_in_multiblock_range(&mut self) {
        if !self.config.multiblock {
            return;
        }

        let (conditional, is_branch) = match self.inst.op {
            // Short and near conditional jumps.
            0x70..=0x7F | 0x80..=0x8F => (true, true),
            // Unconditional near/short JMP.
            0xE9 | 0xEB => (false, true),
            // Calls, returns and indirect RIP-setters end the region.
            _ => (false, false),
        };
        if !is_branch {
            return;
        }

        let Some(literal) = self.inst.srcs[0].literal() else {
            debug_assert!(false, "relative branch without a literal source");
            return;
        };
        let fallthrough = self.inst.pc.wrapping_add(u64::from(self.inst.size));
        let target = fallthrough.wrapping_add(literal);

        if target < self.symbol_min || target >= self.symbol_max {
            return;
        }

        if conditional {
            self.max_cond_branch_forward = self.max_cond_branch_forward.max(target);
            self.max_cond_branch_backward = self.max_cond_branch_backward.min(target);

            // A conditional branch makes its fall-through a block entry too.
            self.enqueue_block(fallthrough);
        }
        self.enqueue_block(target);
    }

    fn enqueue_block(&mut self, target: u64) {
        if !self.has_blocks.contains(&target) && !self.blocks_to_decode.contains(&target) {
            self.blocks_to_decode.insert(target);
        }
    }
}

fn require_reg(reg: Option<Reg>, pc: u64) -> Result<Reg, DecodeError> {
    reg.ok_or(DecodeError::InvalidRegister { pc })
}

/// Apply the operand-size resolution rule to one stage.
///
/// Fixed sizes win; then a pending `0x66` narrows defaults to 16; then
/// vector operands or 64-bit mode widen to 64 under REX.W or a 64-bit
/// default; everything else is 32.
fn resolve_size(
    spec: SizeSpec,
    narrowing: bool,
    widening: bool,
    vector: bool,
    is_64bit: bool,
) -> OpSize {
    match spec {
        SizeSpec::Fixed8 => OpSize::Size8,
        SizeSpec::Fixed16 => OpSize::Size16,
        SizeSpec::Fixed128 => OpSize::Size128,
        SizeSpec::Def | SizeSpec::Def64 if narrowing => OpSize::Size16,
        _ => {
            if (vector || is_64bit)
                && (widening || spec == SizeSpec::Fixed64 || spec == SizeSpec::Def64)
            {
                OpSize::Size64
            } else {
                OpSize::Size32
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_resolution_prefers_fixed_sizes() {
        assert_eq!(
            resolve_size(SizeSpec::Fixed8, true, true, false, true),
            OpSize::Size8
        );
        assert_eq!(
            resolve_size(SizeSpec::Fixed128, false, true, true, true),
            OpSize::Size128
        );
    }

    #[test]
    fn size_resolution_narrows_then_widens() {
        // Pending 0x66 narrows a default to 16.
        assert_eq!(
            resolve_size(SizeSpec::Def, true, false, false, true),
            OpSize::Size16
        );
        // REX.W widens to 64 in long mode.
        assert_eq!(
            resolve_size(SizeSpec::Def, false, true, false, true),
            OpSize::Size64
        );
        // Def64 widens without REX.W.
        assert_eq!(
            resolve_size(SizeSpec::Def64, false, false, false, true),
            OpSize::Size64
        );
        // 32-bit mode never widens a plain default.
        assert_eq!(
            resolve_size(SizeSpec::Def, false, false, false, false),
            OpSize::Size32
        );
    }
}
