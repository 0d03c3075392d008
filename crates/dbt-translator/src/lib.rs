//! Translation pipeline.
//!
//! Wires the frontend decoder, the block cache and the pass pipeline
//! around a host-supplied backend:
//!
//! ```text
//! lookup(pc) ── hit ──► host code pointer
//!          └── miss ──► decode ──► build IR ──► passes ──► emit
//!                                                           │
//!                            add_block_mapping(pc, host) ◄──┘
//! ```

use cpu_x86_decode::{DecodeError, DecodedBlock, Decoder, OpTables};
use dbt_block_cache::{BlockCache, CacheConfig};
use dbt_core::{DecodeConfig, GuestMem};
use dbt_ir::{IrEmitter, PassManager};
use log::debug;
use thiserror::Error;

/// The host code generator.
///
/// Lowering and emission are host concerns; the translator only demands
/// that the intermediate form expose the pass capability.
pub trait Backend {
    type Emitter: IrEmitter;

    /// Lower a decoded block into IR.
    fn build_ir(&mut self, block: &DecodedBlock) -> Self::Emitter;

    /// Emit host code for the optimized IR. Returns the host entry point,
    /// which must be nonzero.
    fn emit(&mut self, entry: u64, ir: &Self::Emitter) -> u64;
}

/// Why a translation request failed.
#[derive(Debug, Error)]
pub enum TranslateError {
    /// The region at the requested entry failed to decode; the entry is
    /// refused.
    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),
    /// The cache could not hold the translation even after a flush.
    #[error("block cache exhausted even after a flush")]
    CacheExhausted,
}

/// The translation engine for one guest thread.
pub struct Translator<'t, B: Backend> {
    decoder: Decoder<'t>,
    cache: BlockCache,
    passes: PassManager,
    backend: B,
}

impl<'t, B: Backend> Translator<'t, B> {
    pub fn new(
        tables: &'t OpTables,
        config: DecodeConfig,
        cache_config: CacheConfig,
        passes: PassManager,
        backend: B,
    ) -> Self {
        Self {
            decoder: Decoder::new(tables, config),
            cache: BlockCache::new(cache_config),
            passes,
            backend,
        }
    }

    /// Resolve `pc` to a host code pointer, translating on a cache miss.
    ///
    /// A miss decodes the region at `pc` (all blocks under the multiblock
    /// policy), optimizes and emits each block, and inserts the results.
    /// A secondary block that failed to decode is skipped; only a failed
    /// entry block refuses the request. An insertion hitting cache
    /// exhaustion flushes the cache and retries once; callers are
    /// responsible for quiescing guest threads around `translate` if they
    /// run concurrently.
    pub fn translate<M: GuestMem>(&mut self, mem: &M, pc: u64) -> Result<u64, TranslateError> {
        let hit = self.cache.find_block(pc);
        if hit != 0 {
            return Ok(hit);
        }

        // A failed entry refuses the whole request; a failed secondary
        // block is merely skipped and the rest of the region still lands
        // in the cache.
        if let Err(err) = self.decoder.decode_instructions_at_entry(mem, pc) {
            let entry_decoded = self
                .decoder
                .blocks()
                .iter()
                .any(|block| block.entry == pc && block.complete);
            if !entry_decoded {
                return Err(err.into());
            }
        }

        let mut entry_host = 0u64;
        for block in self.decoder.blocks() {
            if !block.complete {
                debug!("skipping undecodable block {:#x}", block.entry);
                continue;
            }
            let mut ir = self.backend.build_ir(block);
            self.passes.run(&mut ir);
            let host = self.backend.emit(block.entry, &ir);

            let mut inserted = self.cache.add_block_mapping(block.entry, host);
            if inserted == 0 {
                debug!(
                    "cache exhausted inserting block {:#x}; flushing",
                    block.entry
                );
                self.cache.clear();
                inserted = self.cache.add_block_mapping(block.entry, host);
                if inserted == 0 {
                    return Err(TranslateError::CacheExhausted);
                }
            }
            if block.entry == pc {
                entry_host = inserted;
            }
        }

        Ok(entry_host)
    }

    /// Guest memory holding translated code was modified; drop the stale
    /// translation.
    pub fn notify_code_modified(&self, pc: u64) {
        self.cache.erase(pc);
    }

    /// The underlying cache, for fast-path lookups at guest branch edges.
    #[must_use]
    pub fn cache(&self) -> &BlockCache {
        &self.cache
    }

    /// Blocks decoded by the most recent translation.
    #[must_use]
    pub fn last_decoded_blocks(&self) -> &[DecodedBlock] {
        self.decoder.blocks()
    }
}
