//! End-to-end pipeline tests over a mock backend.

use std::cell::Cell;
use std::rc::Rc;

use cpu_x86_decode::{DecodedBlock, OpTables};
use dbt_block_cache::CacheConfig;
use dbt_core::{DecodeConfig, FlatMem, Mode};
use dbt_ir::{IrEmitter, NodeId, NodeKind, PassManager, PipelineConfig};
use dbt_translator::{Backend, TranslateError, Translator};

/// Empty IR: the passes iterate zero blocks.
struct MockIr;

impl IrEmitter for MockIr {
    fn block_count(&self) -> u32 {
        0
    }
    fn block_nodes(&self, _block: u32) -> Vec<NodeId> {
        Vec::new()
    }
    fn block_predecessors(&self, _block: u32) -> Vec<u32> {
        Vec::new()
    }
    fn kind(&self, _node: NodeId) -> NodeKind {
        NodeKind::SideEffect
    }
    fn operands(&self, _node: NodeId) -> Vec<NodeId> {
        Vec::new()
    }
    fn use_count(&self, _node: NodeId) -> u32 {
        0
    }
    fn exists(&self, _node: NodeId) -> bool {
        false
    }
    fn dominates(&self, _def: NodeId, _user: NodeId) -> bool {
        true
    }
    fn fold_constant(&self, _node: NodeId) -> Option<u64> {
        None
    }
    fn make_constant(&mut self, _block: u32, _value: u64) -> NodeId {
        0
    }
    fn replace_uses(&mut self, _of: NodeId, _with: NodeId) {}
    fn inline_constant_uses(&mut self, _of: NodeId) -> bool {
        false
    }
    fn remove(&mut self, _node: NodeId) {}
    fn specialize_syscall(&mut self, _node: NodeId, _number: u64) -> bool {
        false
    }
    fn assign_register(&mut self, _node: NodeId, _reg: u8) -> bool {
        false
    }
    fn compact(&mut self) -> bool {
        false
    }
}

/// Backend that "emits" by deriving a host pointer from the entry address.
struct MockBackend {
    emitted: Rc<Cell<u32>>,
}

const HOST_BASE: u64 = 0x7700_0000_0000;

impl Backend for MockBackend {
    type Emitter = MockIr;

    fn build_ir(&mut self, _block: &DecodedBlock) -> MockIr {
        MockIr
    }

    fn emit(&mut self, entry: u64, _ir: &MockIr) -> u64 {
        self.emitted.set(self.emitted.get() + 1);
        HOST_BASE + entry
    }
}

fn passes() -> PassManager {
    let mut manager = PassManager::new();
    manager.add_default_passes(PipelineConfig::default());
    manager.add_default_validation_passes();
    manager
}

fn translator<'t>(
    tables: &'t OpTables,
    cache_config: CacheConfig,
    multiblock: bool,
) -> (Translator<'t, MockBackend>, Rc<Cell<u32>>) {
    let emitted = Rc::new(Cell::new(0));
    let backend = MockBackend {
        emitted: Rc::clone(&emitted),
    };
    let config = DecodeConfig {
        mode: Mode::Bits64,
        multiblock,
        ..DecodeConfig::default()
    };
    (
        Translator::new(tables, config, cache_config, passes(), backend),
        emitted,
    )
}

fn small_cache(pages: usize) -> CacheConfig {
    CacheConfig {
        virtual_mem_size: 1 << 32,
        backing_bytes: pages * 4096 * 16,
    }
}

#[test]
fn miss_translates_then_hits() {
    let tables = OpTables::new(Mode::Bits64);
    let (mut translator, emitted) = translator(&tables, small_cache(4), false);

    let mut mem = FlatMem::new(0x1000, 0x100);
    mem.load(0x1000, &[0x90, 0xC3]); // nop; ret

    let host = translator.translate(&mem, 0x1000).expect("translate failed");
    assert_eq!(host, HOST_BASE + 0x1000);
    assert_eq!(emitted.get(), 1);

    // Second request is a pure cache hit.
    let again = translator.translate(&mem, 0x1000).expect("lookup failed");
    assert_eq!(again, host);
    assert_eq!(emitted.get(), 1, "hit must not re-emit");
}

#[test]
fn multiblock_regions_cache_every_block() {
    let tables = OpTables::new(Mode::Bits64);
    let (mut translator, emitted) = translator(&tables, small_cache(4), true);

    // 0x2000: jz 0x2007; 0x2002: ret; 0x2007: ret
    let mut mem = FlatMem::new(0x2000, 0x100);
    mem.load(0x2000, &[0x74, 0x05]);
    mem.load(0x2002, &[0xC3]);
    mem.load(0x2007, &[0xC3]);

    let host = translator.translate(&mem, 0x2000).expect("translate failed");
    assert_eq!(host, HOST_BASE + 0x2000);
    assert_eq!(emitted.get(), 3, "all region blocks are translated");

    // Side blocks are reachable without further translation.
    assert_eq!(translator.cache().find_block(0x2002), HOST_BASE + 0x2002);
    assert_eq!(translator.cache().find_block(0x2007), HOST_BASE + 0x2007);
}

#[test]
fn smc_notification_forces_retranslation() {
    let tables = OpTables::new(Mode::Bits64);
    let (mut translator, emitted) = translator(&tables, small_cache(4), false);

    let mut mem = FlatMem::new(0x1000, 0x100);
    mem.load(0x1000, &[0x90, 0xC3]);

    let first = translator.translate(&mem, 0x1000).expect("translate failed");
    translator.notify_code_modified(0x1000);
    assert_eq!(translator.cache().find_block(0x1000), 0);

    let second = translator.translate(&mem, 0x1000).expect("retranslate failed");
    assert_eq!(first, second);
    assert_eq!(emitted.get(), 2);
}

#[test]
fn cache_exhaustion_flushes_and_retries() {
    let tables = OpTables::new(Mode::Bits64);
    // Backing for exactly one page block.
    let (mut translator, emitted) = translator(&tables, small_cache(1), false);

    let mut mem = FlatMem::new(0x1000, 0x2000);
    mem.load(0x1000, &[0xC3]);
    mem.load(0x2000, &[0xC3]);

    let first = translator.translate(&mem, 0x1000).expect("translate failed");
    assert_eq!(first, HOST_BASE + 0x1000);

    // The second page cannot be backed; the translator flushes and
    // retries, costing the first mapping.
    let second = translator.translate(&mem, 0x2000).expect("translate failed");
    assert_eq!(second, HOST_BASE + 0x2000);
    assert_eq!(emitted.get(), 2);
    assert_eq!(translator.cache().find_block(0x1000), 0, "flush dropped it");
    assert_eq!(translator.cache().find_block(0x2000), second);
}

#[test]
fn failed_secondary_block_is_skipped() {
    let tables = OpTables::new(Mode::Bits64);
    let (mut translator, emitted) = translator(&tables, small_cache(4), true);

    // 0x4000: jz 0x4007; the fall-through is a clean ret, but the branch
    // target starts with a byte that does not decode in 64-bit mode.
    let mut mem = FlatMem::new(0x4000, 0x100);
    mem.load(0x4000, &[0x74, 0x05]);
    mem.load(0x4002, &[0xC3]);
    mem.load(0x4007, &[0x0E]);

    let host = translator.translate(&mem, 0x4000).expect("entry block decodes");
    assert_eq!(host, HOST_BASE + 0x4000);
    assert_eq!(emitted.get(), 2, "only the entry and fall-through are emitted");

    assert_eq!(translator.cache().find_block(0x4002), HOST_BASE + 0x4002);
    assert_eq!(
        translator.cache().find_block(0x4007),
        0,
        "the undecodable block must not be cached"
    );
}

#[test]
fn undecodable_entry_is_refused() {
    let tables = OpTables::new(Mode::Bits64);
    let (mut translator, emitted) = translator(&tables, small_cache(4), false);

    let mut mem = FlatMem::new(0x3000, 0x100);
    mem.load(0x3000, &[0x0E]); // invalid in 64-bit mode

    let err = translator.translate(&mem, 0x3000).unwrap_err();
    assert!(matches!(err, TranslateError::Decode(_)));
    assert_eq!(emitted.get(), 0);
    assert_eq!(translator.cache().find_block(0x3000), 0);
}
