//! Primary opcode-extension groups (1..=11).
//!
//! Indexed by `((group - 1) << 6) | (bank << 3) | ModRM.reg`. The bank
//! distinguishes the opcodes sharing a group: `0x80`/`0x81`/`0x82`/`0x83`
//! are banks 0..=3 of group 1, the six shift opcodes are banks 0..=5 of
//! group 2, and so on.

use dbt_core::Mode;

use super::{fill, invalid, op, op_imm, op_sz, InstFlags, InstInfo, SizeSpec};

/// Index of `(group, bank, reg)`.
pub(crate) fn index(group: u16, bank: u16, reg: u16) -> usize {
    usize::from(((group - 1) << 6) | (bank << 3) | reg)
}

pub(super) fn primary(mode: Mode) -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 11 * 64];
    let mod_dst = F::MODRM | F::SF_MOD_DST;

    // Group 1: immediate ALU. Bank 0 = imm8 forms, bank 1 = full-width
    // immediate, bank 2 = the 32-bit-only 0x82 alias, bank 3 = imm8
    // sign-extended to operand size.
    const ALU_NAMES: [&str; 8] = ["ADD", "OR", "ADC", "SBB", "AND", "SUB", "XOR", "CMP"];
    for (reg, name) in ALU_NAMES.iter().copied().enumerate() {
        let reg = reg as u16;
        t[index(1, 0, reg)] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
        t[index(1, 1, reg)] = op_imm(name, mod_dst | F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT64BIT, 4);
        t[index(1, 2, reg)] = match mode {
            Mode::Bits32 => op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 1),
            Mode::Bits64 => invalid(name),
        };
        t[index(1, 3, reg)] = op_imm(name, mod_dst | F::SRC_SEXT, 1);
    }

    // Group 2: shifts and rotates. Banks: C0/C1 imm8, D0/D1 by one,
    // D2/D3 by CL.
    const SHIFT_NAMES: [&str; 8] = ["ROL", "ROR", "RCL", "RCR", "SHL", "SHR", "SAL", "SAR"];
    for (reg, name) in SHIFT_NAMES.iter().copied().enumerate() {
        let reg = reg as u16;
        t[index(2, 0, reg)] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
        t[index(2, 1, reg)] = op_imm(name, mod_dst, 1);
        t[index(2, 2, reg)] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
        t[index(2, 3, reg)] = op(name, mod_dst);
        t[index(2, 4, reg)] = op_sz(
            name,
            mod_dst | F::SF_SRC_RCX,
            SizeSpec::Fixed8,
            SizeSpec::Fixed8,
            0,
        );
        t[index(2, 5, reg)] = op(name, mod_dst | F::SF_SRC_RCX);
    }

    // Group 3: unary ALU; TEST takes an immediate.
    t[index(3, 0, 0)] = op_sz("TEST", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
    t[index(3, 1, 0)] = op_imm("TEST", mod_dst | F::DISPLACE_SIZE_DIV_2, 4);
    for (reg, name) in ["NOT", "NEG", "MUL", "IMUL", "DIV", "IDIV"]
        .iter()
        .copied()
        .enumerate()
    {
        let reg = reg as u16 + 2;
        t[index(3, 0, reg)] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
        t[index(3, 1, reg)] = op(name, mod_dst);
    }

    // Group 4: INC/DEC r/m8.
    t[index(4, 0, 0)] = op_sz("INC", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[index(4, 0, 1)] = op_sz("DEC", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);

    // Group 5: INC/DEC/CALL/JMP/PUSH r/m.
    t[index(5, 0, 0)] = op("INC", mod_dst);
    t[index(5, 0, 1)] = op("DEC", mod_dst);
    t[index(5, 0, 2)] = op_sz(
        "CALL",
        F::MODRM | F::SETS_RIP | F::BLOCK_END,
        SizeSpec::Def64,
        SizeSpec::Def64,
        0,
    );
    t[index(5, 0, 3)] = invalid("CALLF");
    t[index(5, 0, 4)] = op_sz(
        "JMP",
        F::MODRM | F::SETS_RIP | F::BLOCK_END,
        SizeSpec::Def64,
        SizeSpec::Def64,
        0,
    );
    t[index(5, 0, 5)] = invalid("JMPF");
    t[index(5, 0, 6)] = op_sz("PUSH", F::MODRM, SizeSpec::Def64, SizeSpec::Def64, 0);

    // Group 11: MOV with immediate; only reg 0 is defined.
    t[index(11, 0, 0)] = op_sz("MOV", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
    t[index(11, 1, 0)] = op_imm("MOV", mod_dst | F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT64BIT, 4);
    fill(&mut t, index(11, 0, 1), 7, invalid("MOV"));
    fill(&mut t, index(11, 1, 1), 7, invalid("MOV"));

    t
}
