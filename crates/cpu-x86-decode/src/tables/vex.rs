//! VEX, VEX-group and EVEX tables.

use super::{entry, op, op_sz, InstFlags, InstInfo, InstType, SizeSpec};

/// VEX table index: `((map_select - 1) << 10) | (pp << 8) | opcode`.
pub(crate) fn vex_index(map_select: u16, pp: u16, opcode: u16) -> usize {
    usize::from(((map_select - 1) << 10) | (pp << 8) | opcode)
}

/// VEX-group table index: `((group - 12) << 5) | (pp << 3) | ModRM.reg`.
pub(crate) fn vex_group_index(group: u16, pp: u16, reg: u16) -> usize {
    usize::from(((group - 12) << 5) | (pp << 3) | reg)
}

fn vec128(name: &'static str, extra: InstFlags) -> InstInfo {
    op_sz(
        name,
        InstFlags::MODRM | InstFlags::XMM_FLAGS | extra,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        0,
    )
}

pub(super) fn vex() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 3 * 1024];

    // Map 1 (two-byte analog), no SIMD prefix.
    t[vex_index(1, 0, 0x10)] = vec128("VMOVUPS", F::empty());
    t[vex_index(1, 0, 0x11)] = vec128("VMOVUPS", F::SF_MOD_DST);
    t[vex_index(1, 0, 0x28)] = vec128("VMOVAPS", F::empty());
    t[vex_index(1, 0, 0x29)] = vec128("VMOVAPS", F::SF_MOD_DST);
    t[vex_index(1, 0, 0x54)] = vec128("VANDPS", F::empty());
    t[vex_index(1, 0, 0x57)] = vec128("VXORPS", F::empty());
    t[vex_index(1, 0, 0x58)] = vec128("VADDPS", F::empty());
    t[vex_index(1, 0, 0x59)] = vec128("VMULPS", F::empty());
    t[vex_index(1, 0, 0x5C)] = vec128("VSUBPS", F::empty());
    t[vex_index(1, 0, 0x5E)] = vec128("VDIVPS", F::empty());
    t[vex_index(1, 0, 0x77)] = op("VZEROUPPER", F::empty());

    // Map 1, 0x66 prefix.
    t[vex_index(1, 1, 0x10)] = vec128("VMOVUPD", F::empty());
    t[vex_index(1, 1, 0x11)] = vec128("VMOVUPD", F::SF_MOD_DST);
    t[vex_index(1, 1, 0x28)] = vec128("VMOVAPD", F::empty());
    t[vex_index(1, 1, 0x29)] = vec128("VMOVAPD", F::SF_MOD_DST);
    t[vex_index(1, 1, 0x6E)] = op("VMOVD", InstFlags::MODRM | F::XMM_FLAGS | F::SF_SRC_GPR);
    t[vex_index(1, 1, 0x6F)] = vec128("VMOVDQA", F::empty());
    t[vex_index(1, 1, 0x71)] = entry("VGROUP12", InstType::VexGroup(12));
    t[vex_index(1, 1, 0x72)] = entry("VGROUP13", InstType::VexGroup(13));
    t[vex_index(1, 1, 0x73)] = entry("VGROUP14", InstType::VexGroup(14));
    t[vex_index(1, 1, 0x7F)] = vec128("VMOVDQA", F::SF_MOD_DST);
    t[vex_index(1, 1, 0xEF)] = vec128("VPXOR", F::empty());

    // Map 1, F3/F2 prefixes.
    t[vex_index(1, 2, 0x10)] = vec128("VMOVSS", F::empty());
    t[vex_index(1, 2, 0x11)] = vec128("VMOVSS", F::SF_MOD_DST);
    t[vex_index(1, 2, 0x6F)] = vec128("VMOVDQU", F::empty());
    t[vex_index(1, 2, 0x7F)] = vec128("VMOVDQU", F::SF_MOD_DST);
    t[vex_index(1, 3, 0x10)] = vec128("VMOVSD", F::empty());
    t[vex_index(1, 3, 0x11)] = vec128("VMOVSD", F::SF_MOD_DST);

    // Map 2 (0F38 analog).
    t[vex_index(2, 1, 0x18)] = vec128("VBROADCASTSS", F::empty());

    // Map 3 (0F3A analog).
    t[vex_index(3, 1, 0x0F)] = op_sz(
        "VPALIGNR",
        InstFlags::MODRM | F::XMM_FLAGS,
        SizeSpec::Fixed128,
        SizeSpec::Fixed128,
        1,
    );

    t
}

pub(super) fn vex_groups() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 6 * 32];

    let shift = |name| {
        op_sz(
            name,
            F::MODRM | F::SF_MOD_DST | F::XMM_FLAGS,
            SizeSpec::Fixed128,
            SizeSpec::Fixed128,
            1,
        )
    };
    for (group, names) in [
        (12, ["VPSRLW", "VPSRAW", "VPSLLW"]),
        (13, ["VPSRLD", "VPSRAD", "VPSLLD"]),
        (14, ["VPSRLQ", "VPSRAQ", "VPSLLQ"]),
    ] {
        for (slot, name) in names.iter().copied().enumerate() {
            t[vex_group_index(group, 1, (slot as u16) * 2 + 2)] = shift(name);
        }
    }
    t[vex_group_index(14, 1, 3)] = shift("VPSRLDQ");
    t[vex_group_index(14, 1, 7)] = shift("VPSLLDQ");

    t
}

pub(super) fn evex() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 256];

    t[0x10] = vec128("VMOVUPS", F::empty());
    t[0x11] = vec128("VMOVUPS", F::SF_MOD_DST);
    t[0x28] = vec128("VMOVAPS", F::empty());
    t[0x29] = vec128("VMOVAPS", F::SF_MOD_DST);
    t[0x58] = vec128("VADDP", F::empty());
    t[0x59] = vec128("VMULP", F::empty());
    t[0x6F] = vec128("VMOVDQA32", F::empty());
    t[0x7F] = vec128("VMOVDQA32", F::SF_MOD_DST);

    t
}
