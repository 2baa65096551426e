use noisefs_core::backend::memory::MemoryBackend;
use noisefs_core::block::Block;
use noisefs_core::{Client, Config};
use proptest::prelude::*;
use std::sync::Arc;

fn client_with_block_size(block_size: usize) -> Client {
    let mut config = Config::default();
    config.block_size = block_size;
    Client::new(Arc::new(MemoryBackend::new()), config)
}

proptest! {
    /// `download(upload(x)) == x` for arbitrary byte strings and block
    /// sizes, independent of alignment between the two.
    #[test]
    fn upload_download_round_trips(
        data in prop::collection::vec(any::<u8>(), 0..2048),
        block_size in 1usize..97,
    ) {
        let client = client_with_block_size(block_size);
        let cid = client.upload(&data[..], "fuzz.bin").unwrap();

        let mut out = Vec::new();
        client.download(&cid, &mut out).unwrap();
        prop_assert_eq!(out, data);
    }

    /// XOR-anonymization is its own inverse for any three equal-length
    /// blocks: `(p ^ a ^ b) ^ a ^ b == p`.
    #[test]
    fn xor3_is_involutive(
        plain in prop::collection::vec(any::<u8>(), 1..256),
        a_seed in any::<u64>(),
        b_seed in any::<u64>(),
    ) {
        let len = plain.len();
        let a: Vec<u8> = (0..len).map(|i| (a_seed.wrapping_add(i as u64) % 256) as u8).collect();
        let b: Vec<u8> = (0..len).map(|i| (b_seed.wrapping_add(i as u64) % 256) as u8).collect();

        let plain = Block::new(plain);
        let a = Block::new(a);
        let b = Block::new(b);

        let anon = plain.xor3(&a, &b).unwrap();
        let recovered = anon.xor3(&a, &b).unwrap();
        prop_assert_eq!(recovered, plain);
    }

    /// Encrypted descriptors round-trip for arbitrary passwords and payload
    /// sizes, and a wrong password never silently succeeds.
    #[test]
    fn encrypted_round_trip_or_auth_failure(
        data in prop::collection::vec(any::<u8>(), 0..512),
        password in "[a-zA-Z0-9]{1,32}",
        wrong_suffix in "[a-zA-Z0-9]{1,8}",
    ) {
        let client = client_with_block_size(32);
        let cid = client.encrypted_upload(&data[..], "f.bin", &password).unwrap();

        let mut out = Vec::new();
        client.encrypted_download(&cid, &password, &mut out).unwrap();
        prop_assert_eq!(out, data);

        let wrong = format!("{password}{wrong_suffix}");
        let result = client.encrypted_download(&cid, &wrong, &mut Vec::new());
        prop_assert!(result.is_err());
    }
}
