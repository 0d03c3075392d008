//! x87 escape table.
//!
//! Indexed by `((op - 0xD8) << 8) | modrm`: eight 256-entry banks, one per
//! escape opcode. ModRM bytes below `0xC0` are memory forms and share a
//! descriptor per reg field; `0xC0` and up name ST registers directly.

use super::{fill, op, InstFlags, InstInfo};

/// Fill the memory-form region (`modrm < 0xC0`) of `bank` for one reg field.
fn mem_form(t: &mut [InstInfo], bank: usize, reg: usize, info: InstInfo) {
    for mod_bits in 0..3 {
        let start = (bank << 8) | (mod_bits << 6) | (reg << 3);
        fill(t, start, 8, info);
    }
}

/// Fill one ST-register row (`modrm = base..base+8`) of `bank`.
fn st_form(t: &mut [InstInfo], bank: usize, base: usize, info: InstInfo) {
    fill(t, (bank << 8) | base, 8, info);
}

pub(super) fn table() -> Vec<InstInfo> {
    use InstFlags as F;

    let mut t = vec![InstInfo::UNKNOWN; 8 * 256];
    let mem = F::MODRM;
    let plain = F::empty();

    // D8: single-precision arithmetic.
    const D8_NAMES: [&str; 8] = [
        "FADD", "FMUL", "FCOM", "FCOMP", "FSUB", "FSUBR", "FDIV", "FDIVR",
    ];
    for (reg, name) in D8_NAMES.iter().copied().enumerate() {
        mem_form(&mut t, 0, reg, op(name, mem));
        st_form(&mut t, 0, 0xC0 + reg * 8, op(name, plain));
    }

    // D9: loads, stores, control word, constants, transcendentals.
    mem_form(&mut t, 1, 0, op("FLD", mem));
    mem_form(&mut t, 1, 2, op("FST", mem | F::SF_MOD_DST));
    mem_form(&mut t, 1, 3, op("FSTP", mem | F::SF_MOD_DST));
    mem_form(&mut t, 1, 4, op("FLDENV", mem));
    mem_form(&mut t, 1, 5, op("FLDCW", mem));
    mem_form(&mut t, 1, 6, op("FNSTENV", mem | F::SF_MOD_DST));
    mem_form(&mut t, 1, 7, op("FNSTCW", mem | F::SF_MOD_DST));
    st_form(&mut t, 1, 0xC0, op("FLD", plain));
    st_form(&mut t, 1, 0xC8, op("FXCH", plain));
    t[(1 << 8) | 0xD0] = op("FNOP", plain);
    t[(1 << 8) | 0xE0] = op("FCHS", plain);
    t[(1 << 8) | 0xE1] = op("FABS", plain);
    t[(1 << 8) | 0xE4] = op("FTST", plain);
    t[(1 << 8) | 0xE5] = op("FXAM", plain);
    for (i, name) in [
        "FLD1", "FLDL2T", "FLDL2E", "FLDPI", "FLDLG2", "FLDLN2", "FLDZ",
    ]
    .iter()
    .copied()
    .enumerate()
    {
        t[(1 << 8) | (0xE8 + i)] = op(name, plain);
    }
    for (i, name) in [
        "F2XM1", "FYL2X", "FPTAN", "FPATAN", "FXTRACT", "FPREM1", "FDECSTP", "FINCSTP", "FPREM",
        "FYL2XP1", "FSQRT", "FSINCOS", "FRNDINT", "FSCALE", "FSIN", "FCOS",
    ]
    .iter()
    .copied()
    .enumerate()
    {
        t[(1 << 8) | (0xF0 + i)] = op(name, plain);
    }

    // DA/DB: integer arithmetic and conditional moves; only the control
    // forms are populated here.
    mem_form(&mut t, 2, 0, op("FIADD", mem));
    mem_form(&mut t, 2, 1, op("FIMUL", mem));
    mem_form(&mut t, 3, 0, op("FILD", mem));
    mem_form(&mut t, 3, 2, op("FIST", mem | F::SF_MOD_DST));
    mem_form(&mut t, 3, 3, op("FISTP", mem | F::SF_MOD_DST));
    t[(3 << 8) | 0xE2] = op("FNCLEX", plain);
    t[(3 << 8) | 0xE3] = op("FNINIT", plain);

    // DC: double-precision arithmetic (reversed register forms).
    for (reg, name) in D8_NAMES.iter().copied().enumerate() {
        mem_form(&mut t, 4, reg, op(name, mem));
    }
    st_form(&mut t, 4, 0xC0, op("FADD", plain));
    st_form(&mut t, 4, 0xC8, op("FMUL", plain));
    st_form(&mut t, 4, 0xE0, op("FSUBR", plain));
    st_form(&mut t, 4, 0xE8, op("FSUB", plain));
    st_form(&mut t, 4, 0xF0, op("FDIVR", plain));
    st_form(&mut t, 4, 0xF8, op("FDIV", plain));

    // DD: 64-bit loads/stores.
    mem_form(&mut t, 5, 0, op("FLD", mem));
    mem_form(&mut t, 5, 2, op("FST", mem | F::SF_MOD_DST));
    mem_form(&mut t, 5, 3, op("FSTP", mem | F::SF_MOD_DST));
    mem_form(&mut t, 5, 6, op("FNSAVE", mem | F::SF_MOD_DST));
    mem_form(&mut t, 5, 7, op("FNSTSW", mem | F::SF_MOD_DST));
    st_form(&mut t, 5, 0xC0, op("FFREE", plain));
    st_form(&mut t, 5, 0xD0, op("FST", plain));
    st_form(&mut t, 5, 0xD8, op("FSTP", plain));

    // DE: arithmetic with pop.
    mem_form(&mut t, 6, 0, op("FIADD", mem));
    mem_form(&mut t, 6, 1, op("FIMUL", mem));
    st_form(&mut t, 6, 0xC0, op("FADDP", plain));
    st_form(&mut t, 6, 0xC8, op("FMULP", plain));
    t[(6 << 8) | 0xD9] = op("FCOMPP", plain);
    st_form(&mut t, 6, 0xE0, op("FSUBRP", plain));
    st_form(&mut t, 6, 0xE8, op("FSUBP", plain));
    st_form(&mut t, 6, 0xF0, op("FDIVRP", plain));
    st_form(&mut t, 6, 0xF8, op("FDIVP", plain));

    // DF: integer loads/stores, FNSTSW AX.
    mem_form(&mut t, 7, 0, op("FILD", mem));
    mem_form(&mut t, 7, 2, op("FIST", mem | F::SF_MOD_DST));
    mem_form(&mut t, 7, 3, op("FISTP", mem | F::SF_MOD_DST));
    mem_form(&mut t, 7, 5, op("FILD", mem));
    mem_form(&mut t, 7, 7, op("FISTP", mem | F::SF_MOD_DST));
    t[(7 << 8) | 0xE0] = op("FNSTSW", F::SF_DST_RAX);

    t
}
