//! Primary single-byte opcode table.

use dbt_core::Mode;

use super::{entry, fill, op, op_imm, op_sz, InstFlags, InstInfo, InstType, SizeSpec};

/// The eight classic ALU families at `0x00 + 8 * family`.
const ALU_NAMES: [&str; 8] = ["ADD", "OR", "ADC", "SBB", "AND", "SUB", "XOR", "CMP"];

const JCC_NAMES: [&str; 16] = [
    "JO", "JNO", "JB", "JNB", "JZ", "JNZ", "JBE", "JNBE", "JS", "JNS", "JP", "JNP", "JL", "JNL",
    "JLE", "JNLE",
];

pub(super) fn table(mode: Mode) -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];
    let modrm = F::MODRM;
    let mod_dst = F::MODRM | F::SF_MOD_DST;

    // ALU families: op r/m,r ; op r,r/m ; op rAX,imm
    for (family, name) in ALU_NAMES.iter().copied().enumerate() {
        let base = family * 8;
        t[base] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
        t[base + 1] = op(name, mod_dst);
        t[base + 2] = op_sz(name, modrm, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
        t[base + 3] = op(name, modrm);
        t[base + 4] = op_sz(name, F::SF_DST_RAX, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
        t[base + 5] = op_imm(name, F::SF_DST_RAX | F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT64BIT, 4);
    }

    // Escape and prefix bytes. The decode loop consumes these before table
    // dispatch; the entries exist so a stray dispatch is caught loudly.
    t[0x0F] = entry("ESCAPE", InstType::LegacyPrefix);
    for prefix in [0x26, 0x2E, 0x36, 0x3E, 0x64, 0x65, 0x66, 0x67, 0xF0, 0xF2, 0xF3] {
        t[prefix] = entry("PREFIX", InstType::LegacyPrefix);
    }

    match mode {
        Mode::Bits64 => {
            // REX occupies the whole 0x40 row in long mode.
            fill(&mut t, 0x40, 16, entry("REX", InstType::Rex));
            t[0x62] = entry("EVEX", InstType::EvexPrefix);
            t[0x63] = op("MOVSXD", modrm);
        }
        Mode::Bits32 => {
            fill(&mut t, 0x40, 8, op("INC", F::SF_REX_IN_BYTE));
            fill(&mut t, 0x48, 8, op("DEC", F::SF_REX_IN_BYTE));
        }
    }

    fill(
        &mut t,
        0x50,
        8,
        op_sz("PUSH", F::SF_REX_IN_BYTE, SizeSpec::Def64, SizeSpec::Def64, 0),
    );
    fill(
        &mut t,
        0x58,
        8,
        op_sz("POP", F::SF_REX_IN_BYTE, SizeSpec::Def64, SizeSpec::Def64, 0),
    );

    t[0x68] = op_sz(
        "PUSH",
        F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT,
        SizeSpec::Def64,
        SizeSpec::Def,
        4,
    );
    t[0x69] = op_imm("IMUL", modrm | F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT64BIT, 4);
    t[0x6A] = op_sz("PUSH", F::SRC_SEXT, SizeSpec::Def64, SizeSpec::Def, 1);
    t[0x6B] = op_imm("IMUL", modrm | F::SRC_SEXT, 1);

    // Short conditional branches.
    for (cc, name) in JCC_NAMES.iter().copied().enumerate() {
        t[0x70 + cc] = op_imm(name, F::SETS_RIP | F::BLOCK_END | F::SRC_SEXT, 1);
    }

    t[0x80] = entry("GROUP1", InstType::Group { group: 1, bank: 0 });
    t[0x81] = entry("GROUP1", InstType::Group { group: 1, bank: 1 });
    t[0x82] = match mode {
        // 0x82 is an alias row of 0x80 that long mode revoked.
        Mode::Bits32 => entry("GROUP1", InstType::Group { group: 1, bank: 2 }),
        Mode::Bits64 => super::invalid("GROUP1"),
    };
    t[0x83] = entry("GROUP1", InstType::Group { group: 1, bank: 3 });

    t[0x84] = op_sz("TEST", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0x85] = op("TEST", mod_dst);
    t[0x86] = op_sz("XCHG", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0x87] = op("XCHG", mod_dst);
    t[0x88] = op_sz("MOV", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0x89] = op("MOV", mod_dst);
    t[0x8A] = op_sz("MOV", modrm, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0x8B] = op("MOV", modrm);
    t[0x8D] = op("LEA", modrm);
    t[0x8F] = op_sz("POP", mod_dst, SizeSpec::Def64, SizeSpec::Def64, 0);

    t[0x90] = op("NOP", F::empty());
    for xchg in 0x91..=0x97 {
        t[xchg] = op("XCHG", F::SF_REX_IN_BYTE | F::SF_SRC_RAX);
    }
    t[0x98] = op("CWDE", F::SF_DST_RAX | F::SF_SRC_RAX);
    t[0x99] = op("CDQ", F::SF_DST_RDX | F::SF_SRC_RAX);
    t[0x9C] = op_sz("PUSHF", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0x9D] = op_sz("POPF", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);

    // Memory-offset MOVs carry a full address as their immediate: eight
    // bytes in long mode, four otherwise, halved by an 0x67 prefix.
    let moffs = if mode.is_64bit() { 8 } else { 4 };
    t[0xA0] = op_sz(
        "MOV",
        F::SF_DST_RAX | F::MEM_OFFSET,
        SizeSpec::Fixed8,
        SizeSpec::Fixed8,
        moffs,
    );
    t[0xA1] = op_imm("MOV", F::SF_DST_RAX | F::MEM_OFFSET, moffs);
    t[0xA2] = op_sz(
        "MOV",
        F::SF_SRC_RAX | F::MEM_OFFSET,
        SizeSpec::Fixed8,
        SizeSpec::Fixed8,
        moffs,
    );
    t[0xA3] = op_imm("MOV", F::SF_SRC_RAX | F::MEM_OFFSET, moffs);
    t[0xA8] = op_sz("TEST", F::SF_DST_RAX, SizeSpec::Fixed8, SizeSpec::Fixed8, 1);
    t[0xA9] = op_imm("TEST", F::SF_DST_RAX | F::DISPLACE_SIZE_DIV_2 | F::SRC_SEXT64BIT, 4);

    fill(
        &mut t,
        0xB0,
        8,
        op_sz("MOV", F::SF_REX_IN_BYTE, SizeSpec::Fixed8, SizeSpec::Fixed8, 1),
    );
    // MOV r64, imm64 is the one instruction whose immediate widens with
    // REX.W and narrows with 0x66.
    fill(
        &mut t,
        0xB8,
        8,
        op_imm(
            "MOV",
            F::SF_REX_IN_BYTE | F::DISPLACE_SIZE_MUL_2 | F::DISPLACE_SIZE_DIV_2,
            4,
        ),
    );

    t[0xC0] = entry("GROUP2", InstType::Group { group: 2, bank: 0 });
    t[0xC1] = entry("GROUP2", InstType::Group { group: 2, bank: 1 });
    t[0xC2] = op_sz(
        "RET",
        F::SETS_RIP | F::BLOCK_END,
        SizeSpec::Def64,
        SizeSpec::Fixed16,
        2,
    );
    t[0xC3] = op_sz(
        "RET",
        F::SETS_RIP | F::BLOCK_END,
        SizeSpec::Def64,
        SizeSpec::Def64,
        0,
    );
    t[0xC4] = entry("VEX", InstType::VexPrefix);
    t[0xC5] = entry("VEX", InstType::VexPrefix);
    t[0xC6] = entry("GROUP11", InstType::Group { group: 11, bank: 0 });
    t[0xC7] = entry("GROUP11", InstType::Group { group: 11, bank: 1 });
    t[0xC9] = op_sz("LEAVE", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0xCC] = op("INT3", F::BLOCK_END);
    t[0xCD] = op_imm("INT", F::BLOCK_END, 1);
    t[0xCF] = op("IRET", F::SETS_RIP | F::BLOCK_END);

    t[0xD0] = entry("GROUP2", InstType::Group { group: 2, bank: 2 });
    t[0xD1] = entry("GROUP2", InstType::Group { group: 2, bank: 3 });
    t[0xD2] = entry("GROUP2", InstType::Group { group: 2, bank: 4 });
    t[0xD3] = entry("GROUP2", InstType::Group { group: 2, bank: 5 });

    fill(&mut t, 0xD8, 8, entry("X87", InstType::X87Prefix));

    t[0xE8] = op_imm("CALL", F::SETS_RIP | F::BLOCK_END | F::SRC_SEXT, 4);
    t[0xE9] = op_imm("JMP", F::SETS_RIP | F::BLOCK_END | F::SRC_SEXT, 4);
    t[0xEB] = op_imm("JMP", F::SETS_RIP | F::BLOCK_END | F::SRC_SEXT, 1);

    t[0xF1] = op("INT1", F::BLOCK_END);
    t[0xF4] = op("HLT", F::BLOCK_END);
    t[0xF6] = entry("GROUP3", InstType::Group { group: 3, bank: 0 });
    t[0xF7] = entry("GROUP3", InstType::Group { group: 3, bank: 1 });
    t[0xF8] = op("CLC", F::empty());
    t[0xF9] = op("STC", F::empty());
    t[0xFC] = op("CLD", F::empty());
    t[0xFD] = op("STD", F::empty());
    t[0xFE] = entry("GROUP4", InstType::Group { group: 4, bank: 0 });
    t[0xFF] = entry("GROUP5", InstType::Group { group: 5, bank: 0 });

    t
}
