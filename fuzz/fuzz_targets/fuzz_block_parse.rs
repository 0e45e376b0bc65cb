#![no_main]
use amunchain_hybrid::core::chain::block::Block;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(block) = Block::parse(data) {
        let again = Block::parse(&block.bytes()).expect("re-encoded block parses");
        assert_eq!(again, block);
        let _ = block.verify_signature();
        let _ = block.coinbase();
    }
});
