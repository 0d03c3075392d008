//! Two-byte (`0F`) table, its prefix overlay sub-tables, and the
//! secondary opcode-extension groups.

use super::{entry, fill, op, op_imm, op_sz, InstFlags, InstInfo, InstType, SecGroup, SizeSpec};

const JCC_NAMES: [&str; 16] = [
    "JO", "JNO", "JB", "JNB", "JZ", "JNZ", "JBE", "JNBE", "JS", "JNS", "JP", "JNP", "JL", "JNL",
    "JLE", "JNLE",
];

const SETCC_NAMES: [&str; 16] = [
    "SETO", "SETNO", "SETB", "SETNB", "SETZ", "SETNZ", "SETBE", "SETNBE", "SETS", "SETNS", "SETP",
    "SETNP", "SETL", "SETNL", "SETLE", "SETNLE",
];

const CMOV_NAMES: [&str; 16] = [
    "CMOVO", "CMOVNO", "CMOVB", "CMOVNB", "CMOVZ", "CMOVNZ", "CMOVBE", "CMOVNBE", "CMOVS",
    "CMOVNS", "CMOVP", "CMOVNP", "CMOVL", "CMOVNL", "CMOVLE", "CMOVNLE",
];

/// A packed-SSE op: ModR/M, 128-bit both ways.
fn sse(name: &'static str, extra: InstFlags) -> InstInfo {
    op_sz(
        name,
        InstFlags::MODRM | InstFlags::XMM_FLAGS | extra,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        0,
    )
}

/// An MMX op: ModR/M, both fields in the MMX bank.
fn mmx(name: &'static str, extra: InstFlags) -> InstInfo {
    op(
        name,
        InstFlags::MODRM
            | InstFlags::XMM_FLAGS
            | InstFlags::SF_MMX_SRC
            | InstFlags::SF_MMX_DST
            | extra,
    )
}

pub(super) fn second_base() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];
    let modrm = F::MODRM;
    let mod_dst = F::MODRM | F::SF_MOD_DST;

    t[0x00] = entry("GROUP6", InstType::SecondaryGroup(SecGroup::G6));
    t[0x01] = entry("GROUP7", InstType::SecondaryGroup(SecGroup::G7));
    t[0x05] = op("SYSCALL", F::BLOCK_END);
    t[0x06] = op("CLTS", F::empty());
    t[0x0B] = op("UD2", F::BLOCK_END);
    t[0x0D] = entry("GROUPP", InstType::SecondaryGroup(SecGroup::P));

    t[0x10] = sse("MOVUPS", F::empty());
    t[0x11] = sse("MOVUPS", F::SF_MOD_DST);
    t[0x14] = sse("UNPCKLPS", F::empty());
    t[0x15] = sse("UNPCKHPS", F::empty());
    t[0x18] = entry("GROUP16", InstType::SecondaryGroup(SecGroup::G16));
    // Multi-byte NOP: often carries a 0x66 prefix, which must not divert
    // dispatch into the operand-size sub-table.
    t[0x1F] = op("NOP", modrm | F::NO_OVERLAY66);
    t[0x28] = sse("MOVAPS", F::empty());
    t[0x29] = sse("MOVAPS", F::SF_MOD_DST);
    t[0x2E] = sse("UCOMISS", F::empty());
    t[0x2F] = sse("COMISS", F::empty());

    t[0x31] = op("RDTSC", F::empty());

    for (cc, name) in CMOV_NAMES.iter().copied().enumerate() {
        t[0x40 + cc] = op(name, modrm);
    }

    t[0x51] = sse("SQRTPS", F::empty());
    t[0x54] = sse("ANDPS", F::empty());
    t[0x55] = sse("ANDNPS", F::empty());
    t[0x56] = sse("ORPS", F::empty());
    t[0x57] = sse("XORPS", F::empty());
    t[0x58] = sse("ADDPS", F::empty());
    t[0x59] = sse("MULPS", F::empty());
    t[0x5C] = sse("SUBPS", F::empty());
    t[0x5D] = sse("MINPS", F::empty());
    t[0x5E] = sse("DIVPS", F::empty());
    t[0x5F] = sse("MAXPS", F::empty());

    t[0x6E] = op("MOVD", modrm | F::XMM_FLAGS | F::SF_SRC_GPR | F::SF_MMX_DST);
    t[0x6F] = mmx("MOVQ", F::empty());
    t[0x71] = entry("GROUP12", InstType::SecondaryGroup(SecGroup::G12));
    t[0x72] = entry("GROUP13", InstType::SecondaryGroup(SecGroup::G13));
    t[0x73] = entry("GROUP14", InstType::SecondaryGroup(SecGroup::G14));
    t[0x77] = op("EMMS", F::empty());
    t[0x7E] = op(
        "MOVD",
        mod_dst | F::XMM_FLAGS | F::SF_DST_GPR | F::SF_MMX_SRC,
    );
    t[0x7F] = mmx("MOVQ", F::SF_MOD_DST);

    // Near conditional branches.
    for (cc, name) in JCC_NAMES.iter().copied().enumerate() {
        t[0x80 + cc] = op_imm(name, F::SETS_RIP | F::BLOCK_END | F::SRC_SEXT, 4);
    }
    for (cc, name) in SETCC_NAMES.iter().copied().enumerate() {
        t[0x90 + cc] = op_sz(name, mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    }

    t[0xA0] = op_sz("PUSH FS", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0xA1] = op_sz("POP FS", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0xA2] = op("CPUID", F::empty());
    t[0xA3] = op("BT", mod_dst);
    t[0xA8] = op_sz("PUSH GS", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0xA9] = op_sz("POP GS", F::empty(), SizeSpec::Def64, SizeSpec::Def64, 0);
    t[0xAB] = op("BTS", mod_dst);
    t[0xAE] = entry("GROUP15", InstType::SecondaryGroup(SecGroup::G15));
    t[0xAF] = op("IMUL", modrm);

    t[0xB0] = op_sz("CMPXCHG", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0xB1] = op("CMPXCHG", mod_dst);
    t[0xB3] = op("BTR", mod_dst);
    t[0xB6] = op_sz("MOVZX", modrm, SizeSpec::Def, SizeSpec::Fixed8, 0);
    t[0xB7] = op_sz("MOVZX", modrm, SizeSpec::Def, SizeSpec::Fixed16, 0);
    t[0xB9] = entry("GROUP10", InstType::SecondaryGroup(SecGroup::G10));
    t[0xBA] = entry("GROUP8", InstType::SecondaryGroup(SecGroup::G8));
    t[0xBB] = op("BTC", mod_dst);
    t[0xBC] = op("BSF", modrm);
    t[0xBD] = op("BSR", modrm);
    t[0xBE] = op_sz("MOVSX", modrm, SizeSpec::Def, SizeSpec::Fixed8, 0);
    t[0xBF] = op_sz("MOVSX", modrm, SizeSpec::Def, SizeSpec::Fixed16, 0);

    t[0xC0] = op_sz("XADD", mod_dst, SizeSpec::Fixed8, SizeSpec::Fixed8, 0);
    t[0xC1] = op("XADD", mod_dst);
    t[0xC3] = op("MOVNTI", mod_dst);
    t[0xC6] = op_sz(
        "SHUFPS",
        modrm | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );
    t[0xC7] = entry("GROUP9", InstType::SecondaryGroup(SecGroup::G9));
    fill(&mut t, 0xC8, 8, op("BSWAP", F::SF_REX_IN_BYTE));

    t[0xEF] = mmx("PXOR", F::empty());

    t
}

pub(super) fn rep_mod() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];
    let modrm = F::MODRM;

    t[0x10] = sse("MOVSS", F::empty());
    t[0x11] = sse("MOVSS", F::SF_MOD_DST);
    t[0x2A] = op(
        "CVTSI2SS",
        modrm | F::XMM_FLAGS | F::SF_SRC_GPR,
    );
    t[0x2C] = op("CVTTSS2SI", modrm | F::XMM_FLAGS | F::SF_DST_GPR);
    t[0x51] = sse("SQRTSS", F::empty());
    t[0x58] = sse("ADDSS", F::empty());
    t[0x59] = sse("MULSS", F::empty());
    t[0x5C] = sse("SUBSS", F::empty());
    t[0x5E] = sse("DIVSS", F::empty());
    t[0x6F] = sse("MOVDQU", F::empty());
    t[0x70] = op_sz(
        "PSHUFHW",
        modrm | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );
    t[0x7E] = sse("MOVQ", F::empty());
    t[0x7F] = sse("MOVDQU", F::SF_MOD_DST);
    t[0xB8] = op("POPCNT", modrm);
    t[0xBC] = op("TZCNT", modrm);
    t[0xBD] = op("LZCNT", modrm);

    t
}

pub(super) fn repne_mod() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];
    let modrm = F::MODRM;

    t[0x10] = sse("MOVSD", F::empty());
    t[0x11] = sse("MOVSD", F::SF_MOD_DST);
    t[0x2A] = op("CVTSI2SD", modrm | F::XMM_FLAGS | F::SF_SRC_GPR);
    t[0x2C] = op("CVTTSD2SI", modrm | F::XMM_FLAGS | F::SF_DST_GPR);
    t[0x51] = sse("SQRTSD", F::empty());
    t[0x58] = sse("ADDSD", F::empty());
    t[0x59] = sse("MULSD", F::empty());
    t[0x5C] = sse("SUBSD", F::empty());
    t[0x5E] = sse("DIVSD", F::empty());
    t[0x70] = op_sz(
        "PSHUFLW",
        modrm | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );
    t[0xF0] = sse("LDDQU", F::empty());

    t
}

pub(super) fn op_size_mod() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];
    let modrm = F::MODRM;

    t[0x10] = sse("MOVUPD", F::empty());
    t[0x11] = sse("MOVUPD", F::SF_MOD_DST);
    t[0x14] = sse("UNPCKLPD", F::empty());
    t[0x15] = sse("UNPCKHPD", F::empty());
    t[0x28] = sse("MOVAPD", F::empty());
    t[0x29] = sse("MOVAPD", F::SF_MOD_DST);
    t[0x2E] = sse("UCOMISD", F::empty());
    t[0x2F] = sse("COMISD", F::empty());
    t[0x51] = sse("SQRTPD", F::empty());
    t[0x54] = sse("ANDPD", F::empty());
    t[0x55] = sse("ANDNPD", F::empty());
    t[0x56] = sse("ORPD", F::empty());
    t[0x57] = sse("XORPD", F::empty());
    t[0x58] = sse("ADDPD", F::empty());
    t[0x59] = sse("MULPD", F::empty());
    t[0x5C] = sse("SUBPD", F::empty());
    t[0x5E] = sse("DIVPD", F::empty());
    t[0x60] = sse("PUNPCKLBW", F::empty());
    t[0x64] = sse("PCMPGTB", F::empty());
    t[0x65] = sse("PCMPGTW", F::empty());
    t[0x66] = sse("PCMPGTD", F::empty());
    t[0x6C] = sse("PUNPCKLQDQ", F::empty());
    t[0x6E] = op("MOVD", modrm | F::XMM_FLAGS | F::SF_SRC_GPR);
    t[0x6F] = sse("MOVDQA", F::empty());
    t[0x70] = op_sz(
        "PSHUFD",
        modrm | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );
    t[0x7E] = op(
        "MOVD",
        modrm | F::SF_MOD_DST | F::XMM_FLAGS | F::SF_DST_GPR,
    );
    t[0x7F] = sse("MOVDQA", F::SF_MOD_DST);
    t[0xC6] = op_sz(
        "SHUFPD",
        modrm | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );
    t[0xD6] = sse("MOVQ", F::SF_MOD_DST);
    t[0xEF] = sse("PXOR", F::empty());

    t
}

/// Index into the secondary-group table:
/// `(group << 5) | (prefix << 3) | ModRM.reg`.
pub(crate) fn sec_index(group: SecGroup, prefix: u16, reg: u16) -> usize {
    usize::from(((group as u16) << 5) | (prefix << 3) | reg)
}

pub(super) fn second_groups() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 12 * 32];
    let modrm = F::MODRM;
    let mod_dst = F::MODRM | F::SF_MOD_DST;

    // Prefix selector values, matching dispatch.
    const PF_NONE: u16 = 0;
    const PF_F3: u16 = 1;
    const PF_66: u16 = 2;

    // Group 6: descriptor-table loads/stores.
    for (reg, name) in ["SLDT", "STR", "LLDT", "LTR", "VERR", "VERW"]
        .iter()
        .copied()
        .enumerate()
    {
        t[sec_index(SecGroup::G6, PF_NONE, reg as u16)] = op(name, mod_dst);
    }

    // Group 7: system ops; the mod==11 rows resolve through the
    // second-group ModRM table.
    t[sec_index(SecGroup::G7, PF_NONE, 0)] = op("SGDT", mod_dst);
    t[sec_index(SecGroup::G7, PF_NONE, 1)] = entry("GROUP7", InstType::SecondGroupModRm);
    t[sec_index(SecGroup::G7, PF_NONE, 2)] = entry("GROUP7", InstType::SecondGroupModRm);
    t[sec_index(SecGroup::G7, PF_NONE, 3)] = entry("GROUP7", InstType::SecondGroupModRm);
    t[sec_index(SecGroup::G7, PF_NONE, 4)] = op("SMSW", mod_dst);
    t[sec_index(SecGroup::G7, PF_NONE, 6)] = op("LMSW", mod_dst);
    t[sec_index(SecGroup::G7, PF_NONE, 7)] = entry("GROUP7", InstType::SecondGroupModRm);

    // Group 8: bit tests with an immediate.
    for (reg, name) in ["BT", "BTS", "BTR", "BTC"].iter().copied().enumerate() {
        t[sec_index(SecGroup::G8, PF_NONE, 4 + reg as u16)] = op_imm(name, mod_dst, 1);
    }

    // Group 9.
    t[sec_index(SecGroup::G9, PF_NONE, 1)] = op("CMPXCHG16B", mod_dst);

    // Groups 12..=14: vector shifts by immediate.
    let shift = |name| {
        op_sz(
            name,
            F::MODRM | F::SF_MOD_DST | F::XMM_FLAGS | F::SF_MMX_SRC | F::SF_MMX_DST,
            SizeSpec::Def,
            SizeSpec::Def,
            1,
        )
    };
    let shift_x = |name| {
        op_sz(
            name,
            F::MODRM | F::SF_MOD_DST | F::XMM_FLAGS,
            SizeSpec::Fixed128,
            SizeSpec::Fixed128,
            1,
        )
    };
    for (group, names) in [
        (SecGroup::G12, ["PSRLW", "PSRAW", "PSLLW"]),
        (SecGroup::G13, ["PSRLD", "PSRAD", "PSLLD"]),
        (SecGroup::G14, ["PSRLQ", "PSRAQ", "PSLLQ"]),
    ] {
        for (slot, name) in names.iter().copied().enumerate() {
            let reg = (slot as u16) * 2 + 2;
            t[sec_index(group, PF_NONE, reg)] = shift(name);
            t[sec_index(group, PF_66, reg)] = shift_x(name);
        }
    }
    t[sec_index(SecGroup::G14, PF_66, 3)] = shift_x("PSRLDQ");
    t[sec_index(SecGroup::G14, PF_66, 7)] = shift_x("PSLLDQ");

    // Group 15: fences, SSE state, fs/gs base.
    t[sec_index(SecGroup::G15, PF_NONE, 0)] = op("FXSAVE", mod_dst);
    t[sec_index(SecGroup::G15, PF_NONE, 1)] = op("FXRSTOR", modrm);
    t[sec_index(SecGroup::G15, PF_NONE, 2)] = op("LDMXCSR", modrm);
    t[sec_index(SecGroup::G15, PF_NONE, 3)] = op("STMXCSR", mod_dst);
    t[sec_index(SecGroup::G15, PF_NONE, 5)] = op("LFENCE", F::empty());
    t[sec_index(SecGroup::G15, PF_NONE, 6)] = op("MFENCE", F::empty());
    t[sec_index(SecGroup::G15, PF_NONE, 7)] = op("SFENCE", F::empty());
    for (reg, name) in ["RDFSBASE", "RDGSBASE", "WRFSBASE", "WRGSBASE"]
        .iter()
        .copied()
        .enumerate()
    {
        t[sec_index(SecGroup::G15, PF_F3, reg as u16)] = op(name, mod_dst);
    }

    // Group 16: prefetch hints; the remaining rows decode as NOP.
    for (reg, name) in ["PREFETCHNTA", "PREFETCHT0", "PREFETCHT1", "PREFETCHT2"]
        .iter()
        .copied()
        .enumerate()
    {
        t[sec_index(SecGroup::G16, PF_NONE, reg as u16)] = op(name, modrm);
    }
    for reg in 4..8 {
        t[sec_index(SecGroup::G16, PF_NONE, reg)] = op("NOP", modrm);
    }

    // Group P: 3DNow! prefetches.
    t[sec_index(SecGroup::P, PF_NONE, 0)] = op("PREFETCH", modrm);
    t[sec_index(SecGroup::P, PF_NONE, 1)] = op("PREFETCHW", modrm);

    t
}

pub(super) fn second_modrm() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 32];
    let plain = |name| op(name, F::empty());

    // Field 0: ModRM.reg == 1.
    t[0] = plain("MONITOR");
    t[1] = plain("MWAIT");
    t[2] = plain("CLAC");
    t[3] = plain("STAC");
    // Field 1: ModRM.reg == 2. Everything here is privileged except XGETBV.
    t[8] = plain("XGETBV");
    t[9] = plain("XSETBV");
    // Field 2: ModRM.reg == 3.
    for (rm, name) in [
        "VMRUN", "VMMCALL", "VMLOAD", "VMSAVE", "STGI", "CLGI", "SKINIT", "INVLPGA",
    ]
    .iter()
    .copied()
    .enumerate()
    {
        t[16 + rm] = plain(name);
    }
    // Field 3: ModRM.reg == 7.
    t[24] = plain("SWAPGS");
    t[25] = plain("RDTSCP");

    t
}
