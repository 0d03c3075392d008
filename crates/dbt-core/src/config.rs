//! Translator configuration.

/// Guest execution mode.
///
/// Selects which opcode tables are built and how mode-sensitive encodings
/// (`0x40..=0x4F`, segment prefixes, `0x63`) decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 32-bit protected mode.
    Bits32,
    /// 64-bit long mode.
    Bits64,
}

impl Mode {
    /// Returns true in 64-bit long mode.
    #[must_use]
    pub fn is_64bit(self) -> bool {
        self == Mode::Bits64
    }
}

/// Frontend decode configuration.
///
/// Read by the decoder at the start of every decode request; the translator
/// owns one and passes it by value.
#[derive(Debug, Clone, Copy)]
pub struct DecodeConfig {
    /// Guest mode (selects the opcode table set).
    pub mode: Mode,
    /// Follow intra-procedural branches to decode multiple blocks.
    pub multiblock: bool,
    /// Cap on instructions decoded into a single block.
    pub max_inst_per_block: usize,
    /// Cap on instructions decoded across all blocks of one request.
    pub max_total_insts: usize,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Bits64,
            multiblock: false,
            max_inst_per_block: 2048,
            max_total_insts: 0x1_0000,
        }
    }
}
