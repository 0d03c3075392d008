//! 3DNow!, 0F38 and 0F3A escape tables.

use super::{op, op_imm, op_sz, InstFlags, InstInfo, SizeSpec};

fn amd3d(name: &'static str) -> InstInfo {
    op(
        name,
        InstFlags::MODRM | InstFlags::XMM_FLAGS | InstFlags::SF_MMX_SRC | InstFlags::SF_MMX_DST,
    )
}

pub(super) fn dddnow() -> Vec<InstInfo> {
    let mut t = vec![InstInfo::UNKNOWN; 256];

    t[0x0D] = amd3d("PI2FD");
    t[0x1D] = amd3d("PF2ID");
    t[0x90] = amd3d("PFCMPGE");
    t[0x94] = amd3d("PFMIN");
    t[0x96] = amd3d("PFRCP");
    t[0x9A] = amd3d("PFSUB");
    t[0x9E] = amd3d("PFADD");
    t[0xA0] = amd3d("PFCMPGT");
    t[0xA4] = amd3d("PFMAX");
    t[0xAA] = amd3d("PFSUBR");
    t[0xAE] = amd3d("PFACC");
    t[0xB0] = amd3d("PFCMPEQ");
    t[0xB4] = amd3d("PFMUL");
    t[0xB6] = amd3d("PFRCPIT2");
    t[0xB7] = amd3d("PMULHRW");
    t[0xBF] = amd3d("PAVGUSB");

    t
}

/// 0F38 table index: `(prefix << 8) | opcode`, prefix 0 = none, 1 = 66,
/// 2 = F2.
pub(super) fn h0f38() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 3 * 256];
    let modrm = F::MODRM;

    // No prefix: MMX forms and MOVBE.
    t[0x00] = op(
        "PSHUFB",
        modrm | F::XMM_FLAGS | F::SF_MMX_SRC | F::SF_MMX_DST,
    );
    t[0xF0] = op("MOVBE", modrm);
    t[0xF1] = op("MOVBE", modrm | F::SF_MOD_DST);

    // 0x66 prefix: SSE forms.
    let sse = |name| {
        op_sz(
            name,
            F::MODRM | F::XMM_FLAGS,
            SizeSpec::Fixed128,
            SizeSpec::Fixed128,
            0,
        )
    };
    t[(1 << 8) | 0x00] = sse("PSHUFB");
    t[(1 << 8) | 0x17] = sse("PTEST");
    t[(1 << 8) | 0x29] = sse("PCMPEQQ");
    t[(1 << 8) | 0xDB] = sse("AESIMC");
    t[(1 << 8) | 0xDC] = sse("AESENC");
    t[(1 << 8) | 0xDD] = sse("AESENCLAST");

    // 0xF2 prefix: CRC32.
    t[(2 << 8) | 0xF0] = op_sz("CRC32", modrm, SizeSpec::Def, SizeSpec::Fixed8, 0);
    t[(2 << 8) | 0xF1] = op("CRC32", modrm);

    t
}

/// 0F3A table index: `(prefix << 8) | opcode`, prefix bit 0 = 66,
/// bit 1 = REX.W.
pub(super) fn h0f3a() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 4 * 256];

    let sse_imm = |name| {
        op_sz(
            name,
            F::MODRM | F::XMM_FLAGS,
            SizeSpec::Fixed128,
            SizeSpec::Fixed128,
            1,
        )
    };

    // No prefix: MMX PALIGNR.
    t[0x0F] = op_imm(
        "PALIGNR",
        F::MODRM | F::XMM_FLAGS | F::SF_MMX_SRC | F::SF_MMX_DST,
        1,
    );

    // 0x66 prefix.
    t[(1 << 8) | 0x08] = sse_imm("ROUNDPS");
    t[(1 << 8) | 0x0A] = sse_imm("ROUNDSS");
    t[(1 << 8) | 0x0B] = sse_imm("ROUNDSD");
    t[(1 << 8) | 0x0F] = sse_imm("PALIGNR");
    t[(1 << 8) | 0x44] = sse_imm("PCLMULQDQ");
    t[(1 << 8) | 0x63] = sse_imm("PCMPISTRI");
    t[(1 << 8) | 0xDF] = sse_imm("AESKEYGENASSIST");

    // 0x66 + REX.W.
    t[(3 << 8) | 0x16] = op_imm("PEXTRQ", F::MODRM | F::SF_MOD_DST | F::XMM_FLAGS | F::SF_DST_GPR, 1);
    t[(3 << 8) | 0x22] = op_imm("PINSRQ", F::MODRM | F::XMM_FLAGS | F::SF_SRC_GPR, 1);

    t
}
