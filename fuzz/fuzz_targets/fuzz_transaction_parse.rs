#![no_main]
use amunchain_hybrid::core::tx::transaction::Transaction;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that parses must re-encode to the same bytes.
    if let Ok(tx) = Transaction::parse(data) {
        let again = Transaction::parse(&tx.bytes()).expect("re-encoded transaction parses");
        assert_eq!(again.full_hash(), tx.full_hash());
        let _ = tx.verify_signature();
    }
});
