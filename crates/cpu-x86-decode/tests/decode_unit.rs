//! Unit tests for individual instruction decodes.
//!
//! Each test feeds a small byte program through the decoder and checks the
//! structured result: lengths, operands, sizes, prefix interactions and
//! multi-block discovery.

use cpu_x86_decode::{DecodeError, DecodedInst, Decoder, Gpr, OpSize, OpTables, Operand, Reg};
use dbt_core::{DecodeConfig, FlatMem, Mode};

fn config(mode: Mode) -> DecodeConfig {
    DecodeConfig {
        mode,
        ..DecodeConfig::default()
    }
}

/// Decode a single instruction at address 0 in 64-bit mode.
fn decode64(bytes: &[u8]) -> DecodedInst {
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    decoder
        .decode_instructions_at_entry(&bytes, 0)
        .expect("decode failed");
    decoder.blocks()[0].instructions[0].clone()
}

fn decode32(bytes: &[u8]) -> DecodedInst {
    let tables = OpTables::new(Mode::Bits32);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits32));
    decoder
        .decode_instructions_at_entry(&bytes, 0)
        .expect("decode failed");
    decoder.blocks()[0].instructions[0].clone()
}

fn gpr(reg: Gpr) -> Operand {
    Operand::Reg {
        reg: Reg::Gpr(reg),
        high_bits: false,
    }
}

#[test]
fn rex_w_mov_imm64() {
    // mov rax, 0x0807060504030201
    let mem = {
        let mut mem = FlatMem::new(0x1000, 0x100);
        mem.load(0x1000, &[0x48, 0xB8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]);
        mem
    };
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    decoder
        .decode_instructions_at_entry(&mem, 0x1000)
        .expect("decode failed");

    let inst = &decoder.blocks()[0].instructions[0];
    assert_eq!(inst.size, 10);
    assert_eq!(inst.pc, 0x1000);
    assert_eq!(inst.dest, gpr(Gpr::Rax));
    assert_eq!(inst.dst_size, OpSize::Size64);
    assert_eq!(inst.srcs[0].literal(), Some(0x0807_0605_0403_0201));
}

#[test]
fn opsize_mov_imm16() {
    // 0x66 drops the operand size to 16 and halves the immediate.
    let inst = decode64(&[0x66, 0xB8, 0x34, 0x12]);
    assert_eq!(inst.size, 4);
    assert_eq!(inst.dst_size, OpSize::Size16);
    assert_eq!(inst.srcs[0], Operand::Literal { value: 0x1234, size: 2 });
}

#[test]
fn rex_b_extends_byte_register() {
    // mov r9, imm64
    let inst = decode64(&[0x49, 0xB9, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(inst.dest, gpr(Gpr::R9));
    assert_eq!(inst.dst_size, OpSize::Size64);
}

#[test]
fn rex_w_beats_earlier_opsize_prefix() {
    // 66 48: the REX.W arrives later, so the operand size is 64.
    let inst = decode64(&[0x66, 0x48, 0x89, 0xC0]);
    assert_eq!(inst.dst_size, OpSize::Size64);

    // 48 66: the 0x66 arrives later and wins; REX.W is stale.
    let inst = decode64(&[0x48, 0x66, 0x89, 0xC0]);
    assert_eq!(inst.dst_size, OpSize::Size16);
}

#[test]
fn mov_reg_reg() {
    // mov rbx, rax: the mod/rm side is the destination.
    let inst = decode64(&[0x48, 0x89, 0xC3]);
    assert_eq!(inst.size, 3);
    assert_eq!(inst.info.name, "MOV");
    assert_eq!(inst.dest, gpr(Gpr::Rbx));
    assert_eq!(inst.srcs[0], gpr(Gpr::Rax));
    assert_eq!(inst.dst_size, OpSize::Size64);
}

#[test]
fn mov_indirect_disp8() {
    // mov [rbp-4], eax
    let inst = decode64(&[0x89, 0x45, 0xFC]);
    assert_eq!(inst.size, 3);
    assert_eq!(
        inst.dest,
        Operand::RegIndirect {
            reg: Reg::Gpr(Gpr::Rbp),
            displacement: -4,
        }
    );
    assert_eq!(inst.srcs[0], gpr(Gpr::Rax));
}

#[test]
fn sib_addressing() {
    // mov eax, [rax+rcx*4+0x10]
    let inst = decode64(&[0x8B, 0x44, 0x88, 0x10]);
    assert_eq!(inst.size, 4);
    assert_eq!(inst.dest, gpr(Gpr::Rax));
    assert_eq!(
        inst.srcs[0],
        Operand::Sib {
            scale: 4,
            index: Some(Reg::Gpr(Gpr::Rcx)),
            base: Some(Reg::Gpr(Gpr::Rax)),
            offset: 0x10,
        }
    );
}

#[test]
fn sib_without_base() {
    // mov eax, [rcx*4+0x10]: base 0b101 under mod 00 is absent and forces
    // a 32-bit displacement.
    let inst = decode64(&[0x8B, 0x04, 0x8D, 0x10, 0x00, 0x00, 0x00]);
    assert_eq!(inst.size, 7);
    assert_eq!(
        inst.srcs[0],
        Operand::Sib {
            scale: 4,
            index: Some(Reg::Gpr(Gpr::Rcx)),
            base: None,
            offset: 0x10,
        }
    );
}

#[test]
fn sib_index_none() {
    // mov eax, [rsp]: index 0b100 encodes "no index".
    let inst = decode64(&[0x8B, 0x04, 0x24]);
    assert_eq!(inst.size, 3);
    assert_eq!(
        inst.srcs[0],
        Operand::Sib {
            scale: 1,
            index: None,
            base: Some(Reg::Gpr(Gpr::Rsp)),
            offset: 0,
        }
    );
}

#[test]
fn rip_relative() {
    // mov eax, [rip+0x1234]
    let inst = decode64(&[0x8B, 0x05, 0x34, 0x12, 0x00, 0x00]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.srcs[0], Operand::RipRelative { literal: 0x1234 });
}

#[test]
fn high_byte_alias_without_rex() {
    // mov ah, al
    let inst = decode64(&[0x88, 0xC4]);
    assert_eq!(
        inst.dest,
        Operand::Reg {
            reg: Reg::Gpr(Gpr::Rax),
            high_bits: true,
        }
    );
    assert_eq!(
        inst.srcs[0],
        Operand::Reg {
            reg: Reg::Gpr(Gpr::Rax),
            high_bits: false,
        }
    );
}

#[test]
fn rex_disables_high_byte_alias() {
    // A bare REX turns AH into SPL.
    let inst = decode64(&[0x40, 0x88, 0xC4]);
    assert_eq!(
        inst.dest,
        Operand::Reg {
            reg: Reg::Gpr(Gpr::Rsp),
            high_bits: false,
        }
    );
}

#[test]
fn group1_imm8_sext() {
    // add eax, 5 via the 0x83 bank: immediate lands in the second source
    // slot, sign-extended to the operand size.
    let inst = decode64(&[0x83, 0xC0, 0x05]);
    assert_eq!(inst.size, 3);
    assert_eq!(inst.info.name, "ADD");
    assert_eq!(inst.dest, gpr(Gpr::Rax));
    assert_eq!(inst.srcs[1], Operand::Literal { value: 5, size: 4 });

    // Sign extension: sub rsp, -8
    let inst = decode64(&[0x48, 0x83, 0xEC, 0xF8]);
    assert_eq!(inst.info.name, "SUB");
    assert_eq!(inst.srcs[1].literal(), Some(0xFFFF_FFFF_FFFF_FFF8));
}

#[test]
fn group2_shift_by_cl() {
    // shl eax, cl: CL is appended as a source.
    let inst = decode64(&[0xD3, 0xE0]);
    assert_eq!(inst.info.name, "SHL");
    assert_eq!(inst.dest, gpr(Gpr::Rax));
    assert_eq!(inst.srcs[1], gpr(Gpr::Rcx));
}

#[test]
fn group11_mov_imm() {
    // mov dword [rax], 0x11223344
    let inst = decode64(&[0xC7, 0x00, 0x44, 0x33, 0x22, 0x11]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.info.name, "MOV");
    assert_eq!(inst.dest, Operand::RegDirect { reg: Reg::Gpr(Gpr::Rax) });
    assert_eq!(inst.srcs[1].literal(), Some(0x1122_3344));
}

#[test]
fn vex_two_byte_vzeroupper() {
    // c5 f8 77: map 1, pp 0, opcode 0x77.
    let inst = decode64(&[0xC5, 0xF8, 0x77]);
    assert_eq!(inst.size, 3);
    assert_eq!(inst.op, 0x77);
    assert_eq!(inst.info.name, "VZEROUPPER");
}

#[test]
fn vex_three_byte() {
    // c4 e1 79 6f c1: vmovdqa xmm0, xmm1 (map 1, pp 1).
    let inst = decode64(&[0xC4, 0xE1, 0x79, 0x6F, 0xC1]);
    assert_eq!(inst.size, 5);
    assert_eq!(inst.info.name, "VMOVDQA");
    assert_eq!(inst.dst_size, OpSize::Size128);
}

#[test]
fn vex_bad_map_select_fails() {
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    let bytes: &[u8] = &[0xC4, 0xE4, 0x79, 0x6F, 0xC1];
    let err = decoder.decode_instructions_at_entry(&bytes, 0).unwrap_err();
    assert!(matches!(err, DecodeError::BadVexMapSelect { map_select: 4, .. }));
}

#[test]
fn evex_dispatch() {
    // 62 f1 7c 48 10 c1: three payload bytes, then the opcode.
    let inst = decode64(&[0x62, 0xF1, 0x7C, 0x48, 0x10, 0xC1]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.info.name, "VMOVUPS");
}

#[test]
fn amd_3dnow_trailing_opcode() {
    // pfmul mm0, mm1: opcode byte trails the operands and counts toward
    // the instruction length.
    let inst = decode64(&[0x0F, 0x0F, 0xC1, 0xB4]);
    assert_eq!(inst.size, 4);
    assert_eq!(inst.info.name, "PFMUL");
    assert_eq!(inst.dest, Operand::Reg { reg: Reg::Mm(0), high_bits: false });
    assert_eq!(inst.srcs[0], Operand::Reg { reg: Reg::Mm(1), high_bits: false });
}

#[test]
fn h0f38_crc32() {
    // crc32 ecx, ecx needs the REPNE selector.
    let inst = decode64(&[0xF2, 0x0F, 0x38, 0xF1, 0xC9]);
    assert_eq!(inst.size, 5);
    assert_eq!(inst.info.name, "CRC32");
}

#[test]
fn h0f3a_palignr() {
    // palignr xmm0, xmm1, 8 needs the 0x66 selector.
    let inst = decode64(&[0x66, 0x0F, 0x3A, 0x0F, 0xC1, 0x08]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.info.name, "PALIGNR");
    assert_eq!(inst.srcs[1].literal(), Some(8));
}

#[test]
fn x87_memory_form() {
    // fld dword [rbp+8]
    let inst = decode64(&[0xD9, 0x45, 0x08]);
    assert_eq!(inst.size, 3);
    assert_eq!(inst.info.name, "FLD");
}

#[test]
fn x87_fnstsw_ax() {
    let inst = decode64(&[0xDF, 0xE0]);
    assert_eq!(inst.size, 2);
    assert_eq!(inst.info.name, "FNSTSW");
    assert_eq!(inst.dest, gpr(Gpr::Rax));
}

#[test]
fn second_group_modrm_xgetbv() {
    // 0f 01 d0: group 7, reg 2, mod 11, rm 0.
    let inst = decode64(&[0x0F, 0x01, 0xD0]);
    assert_eq!(inst.size, 3);
    assert_eq!(inst.info.name, "XGETBV");
}

#[test]
fn rep_overlay_selects_movss() {
    let inst = decode64(&[0xF3, 0x0F, 0x10, 0xC1]);
    assert_eq!(inst.info.name, "MOVSS");
    // The prefix was consumed for table selection.
    assert!(!inst.flags.contains(cpu_x86_decode::DecodeFlags::REP));
}

#[test]
fn opsize_overlay_selects_movdqa() {
    let inst = decode64(&[0x66, 0x0F, 0x6F, 0xC1]);
    assert_eq!(inst.info.name, "MOVDQA");
    assert_eq!(inst.dst_size, OpSize::Size128);
    assert!(!inst.flags.contains(cpu_x86_decode::DecodeFlags::OPERAND_SIZE));
}

#[test]
fn multibyte_nop_ignores_opsize_overlay() {
    // 66 0f 1f 44 00 00: canonical padding NOP. The 0x66 must not divert
    // into the operand-size sub-table, but still narrows the operand.
    let inst = decode64(&[0x66, 0x0F, 0x1F, 0x44, 0x00, 0x00]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.info.name, "NOP");
    assert_eq!(inst.dst_size, OpSize::Size16);
}

#[test]
fn mov_moffs_64bit_address() {
    // mov eax, [moffs64]
    let inst = decode64(&[0xA1, 1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(inst.size, 9);
    assert_eq!(inst.dest, gpr(Gpr::Rax));
    assert_eq!(
        inst.srcs[0],
        Operand::Literal {
            value: 0x0807_0605_0403_0201,
            size: 8,
        }
    );

    // The 0x67 prefix halves the offset width.
    let inst = decode64(&[0x67, 0xA1, 1, 2, 3, 4]);
    assert_eq!(inst.size, 6);
    assert_eq!(inst.srcs[0], Operand::Literal { value: 0x0403_0201, size: 4 });
}

#[test]
fn lock_inc_indirect() {
    let inst = decode64(&[0xF0, 0xFF, 0x00]);
    assert_eq!(inst.info.name, "INC");
    assert!(inst.flags.contains(cpu_x86_decode::DecodeFlags::LOCK));
    assert_eq!(inst.dest, Operand::RegDirect { reg: Reg::Gpr(Gpr::Rax) });
}

#[test]
fn inc_dec_in_32bit_mode() {
    // 0x40 is INC eax in 32-bit mode, a REX prefix in 64-bit mode.
    let inst = decode32(&[0x40]);
    assert_eq!(inst.info.name, "INC");
    assert_eq!(inst.size, 1);
    assert_eq!(inst.dest, gpr(Gpr::Rax));

    let inst = decode32(&[0x4B]);
    assert_eq!(inst.info.name, "DEC");
    assert_eq!(inst.dest, gpr(Gpr::Rbx));
}

#[test]
fn segment_prefix_recorded_only_in_32bit_mode() {
    let inst = decode32(&[0x2E, 0x8B, 0x03]);
    assert!(inst.flags.contains(cpu_x86_decode::DecodeFlags::CS_PREFIX));

    let inst = decode64(&[0x2E, 0x8B, 0x03]);
    assert!(!inst.flags.contains(cpu_x86_decode::DecodeFlags::CS_PREFIX));
    assert_eq!(inst.size, 3);
}

#[test]
fn unknown_opcode_aborts_block() {
    // 0x0E (push cs) does not exist in 64-bit mode.
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    let bytes: &[u8] = &[0x90, 0x0E, 0x90];
    let err = decoder.decode_instructions_at_entry(&bytes, 0).unwrap_err();
    assert!(matches!(err, DecodeError::UnknownInstruction { .. }));

    // The NOP before the bad byte survives, but the block is marked
    // truncated.
    assert_eq!(decoder.blocks().len(), 1);
    assert!(!decoder.blocks()[0].complete);
    assert_eq!(decoder.blocks()[0].instructions.len(), 1);
    assert_eq!(decoder.blocks()[0].instructions[0].info.name, "NOP");
}

#[test]
fn failed_secondary_block_is_marked_incomplete() {
    // The entry and fall-through decode cleanly; the branch target does
    // not. Only the target's block carries the incomplete mark.
    let mut mem = FlatMem::new(0x4000, 0x100);
    mem.load(0x4000, &[0x74, 0x05]);
    mem.load(0x4002, &[0xC3]);
    mem.load(0x4007, &[0x0E]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    let err = decoder
        .decode_instructions_at_entry(&mem, 0x4000)
        .unwrap_err();
    assert!(matches!(err, DecodeError::UnknownInstruction { .. }));

    let flags: Vec<(u64, bool)> = decoder
        .blocks()
        .iter()
        .map(|block| (block.entry, block.complete))
        .collect();
    assert_eq!(flags, vec![(0x4000, true), (0x4002, true), (0x4007, false)]);
}

#[test]
fn fifteen_byte_limit() {
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    let bytes: &[u8] = &[0x66; 16];
    let err = decoder.decode_instructions_at_entry(&bytes, 0).unwrap_err();
    assert!(matches!(err, DecodeError::InstructionTooLong { .. }));
}

#[test]
fn block_round_trip_length() {
    // push rbp; mov rbp, rsp; mov eax, [rbp-4]; ret
    let bytes: &[u8] = &[0x55, 0x48, 0x89, 0xE5, 0x8B, 0x45, 0xFC, 0xC3];
    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, config(Mode::Bits64));
    decoder
        .decode_instructions_at_entry(&bytes, 0)
        .expect("decode failed");

    let block = &decoder.blocks()[0];
    assert_eq!(block.instructions.len(), 4);
    let total: u64 = block.instructions.iter().map(|i| u64::from(i.size)).sum();
    assert_eq!(total, bytes.len() as u64, "decoded sizes must cover the input");
}

fn multiblock_config() -> DecodeConfig {
    DecodeConfig {
        mode: Mode::Bits64,
        multiblock: true,
        ..DecodeConfig::default()
    }
}

#[test]
fn conditional_branch_queues_target_and_fallthrough() {
    // 0x2000: jz +5 → target 0x2007, fall-through 0x2002.
    let mut mem = FlatMem::new(0x2000, 0x100);
    mem.load(0x2000, &[0x74, 0x05]);
    mem.load(0x2002, &[0xC3]);
    mem.load(0x2007, &[0xC3]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    decoder
        .decode_instructions_at_entry(&mem, 0x2000)
        .expect("decode failed");

    let entries: Vec<u64> = decoder.blocks().iter().map(|b| b.entry).collect();
    assert_eq!(entries, vec![0x2000, 0x2002, 0x2007]);

    let jz = &decoder.blocks()[0].instructions[0];
    assert_eq!(jz.size, 2);
    assert_eq!(jz.srcs[0].literal(), Some(5));
    assert_eq!(decoder.max_cond_branch_forward(), 0x2007);
}

#[test]
fn multiblock_closure() {
    // 0x1000: jz 0x1004; 0x1002: jmp 0x1006; 0x1004: nop; ret; 0x1006: ret
    let mut mem = FlatMem::new(0x1000, 0x100);
    mem.load(0x1000, &[0x74, 0x02]);
    mem.load(0x1002, &[0xEB, 0x02]);
    mem.load(0x1004, &[0x90, 0xC3]);
    mem.load(0x1006, &[0xC3]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    decoder
        .decode_instructions_at_entry(&mem, 0x1000)
        .expect("decode failed");

    let entries: Vec<u64> = decoder.blocks().iter().map(|b| b.entry).collect();
    assert_eq!(entries, vec![0x1000, 0x1002, 0x1004, 0x1006]);
    assert!(decoder.blocks().iter().all(|b| b.complete));

    // Closure: every in-range branch target is itself a block entry.
    for block in decoder.blocks() {
        for inst in &block.instructions {
            let is_branch = matches!(inst.op, 0x70..=0x7F | 0x80..=0x8F | 0xE9 | 0xEB);
            if !is_branch {
                continue;
            }
            let target = inst
                .pc
                .wrapping_add(u64::from(inst.size))
                .wrapping_add(inst.srcs[0].literal().unwrap_or(0));
            assert!(
                entries.contains(&target),
                "branch target {target:#x} has no block"
            );
        }
    }
}

#[test]
fn backward_branch_outside_region_not_followed() {
    // jz -4: the target precedes the entry, which bounds the region.
    let mut mem = FlatMem::new(0x1000, 0x100);
    mem.load(0x1000, &[0x74, 0xFC]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    decoder
        .decode_instructions_at_entry(&mem, 0x1000)
        .expect("decode failed");

    assert_eq!(decoder.blocks().len(), 1);
}

#[test]
fn calls_and_returns_end_the_region() {
    // call +0; the fall-through is not queued.
    let mut mem = FlatMem::new(0x1000, 0x100);
    mem.load(0x1000, &[0xE8, 0x00, 0x00, 0x00, 0x00]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    decoder
        .decode_instructions_at_entry(&mem, 0x1000)
        .expect("decode failed");

    assert_eq!(decoder.blocks().len(), 1);
    assert_eq!(decoder.blocks()[0].instructions[0].info.name, "CALL");
}

#[test]
fn near_jcc_queues_blocks() {
    // 0f 84: jz near +0x10.
    let mut mem = FlatMem::new(0x3000, 0x100);
    mem.load(0x3000, &[0x0F, 0x84, 0x10, 0x00, 0x00, 0x00]);
    mem.load(0x3006, &[0xC3]);
    mem.load(0x3016, &[0xC3]);

    let tables = OpTables::new(Mode::Bits64);
    let mut decoder = Decoder::new(&tables, multiblock_config());
    decoder
        .decode_instructions_at_entry(&mem, 0x3000)
        .expect("decode failed");

    let entries: Vec<u64> = decoder.blocks().iter().map(|b| b.entry).collect();
    assert_eq!(entries, vec![0x3000, 0x3006, 0x3016]);
}

#[test]
fn xchg_rax_form() {
    // xchg rcx, rax: register in the low opcode bits plus an RAX source.
    let inst = decode64(&[0x48, 0x91]);
    assert_eq!(inst.info.name, "XCHG");
    assert_eq!(inst.dest, gpr(Gpr::Rcx));
    assert_eq!(inst.srcs[0], gpr(Gpr::Rax));
}

#[test]
fn movzx_sizes() {
    // movzx eax, byte [rbx]
    let inst = decode64(&[0x0F, 0xB6, 0x03]);
    assert_eq!(inst.info.name, "MOVZX");
    assert_eq!(inst.dst_size, OpSize::Size32);
    assert_eq!(inst.src_size, OpSize::Size8);
    assert_eq!(inst.srcs[0], Operand::RegDirect { reg: Reg::Gpr(Gpr::Rbx) });
}

#[test]
fn push_defaults_to_64bit() {
    let inst = decode64(&[0x55]);
    assert_eq!(inst.info.name, "PUSH");
    assert_eq!(inst.dest, gpr(Gpr::Rbp));
    assert_eq!(inst.dst_size, OpSize::Size64);
}
