//! Test utilities for ledger testing

use crate::config::Config;
use crate::core::{Block, Ledger, Transaction};
use crate::error::Result;
use crate::wallet::Wallet;
use std::path::Path;
use tempfile::TempDir;

/// Low enough to mine in a few hundred hashes
pub const TEST_DIFFICULTY: u32 = 8;

/// Node configuration rooted in `data_dir`
pub fn test_config(data_dir: &Path) -> Config {
    Config::default()
        .with_data_dir(data_dir)
        .with_node_id("test")
        .with_difficulty(TEST_DIFFICULTY)
}

/// Fresh ledger whose genesis coinbase pays the returned wallet.
/// Keep the `TempDir` alive for as long as the ledger is used.
pub fn create_test_ledger() -> (Ledger, TempDir, Wallet) {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let wallet = Wallet::new().expect("wallet");
    let ledger =
        Ledger::init(&wallet.get_address(), &test_config(temp_dir.path())).expect("init ledger");
    (ledger, temp_dir, wallet)
}

/// Walk the main chain checking hashes, linkage and heights
pub fn validate_chain_integrity(ledger: &Ledger) -> Result<bool> {
    let mut expected_hash = ledger.get_tip_hash();
    let mut expected_height = ledger.get_best_height()?;

    for block in ledger.iterator() {
        let block = block?;
        if block.get_hash() != expected_hash.as_slice() || block.get_height() != expected_height {
            return Ok(false);
        }
        if block.validate().is_err() {
            return Ok(false);
        }
        if block.is_genesis() {
            return Ok(expected_height == 0);
        }
        expected_hash = block.get_pre_block_hash().to_vec();
        expected_height -= 1;
    }
    Ok(false)
}

/// Mine `length` coinbase-only blocks on top of `base`, without storing them
pub fn create_fork(base: &Block, length: usize, miner_address: &str) -> Result<Vec<Block>> {
    let mut fork_blocks = Vec::with_capacity(length);
    let mut prev_hash = base.get_hash().to_vec();

    for i in 0..length {
        let coinbase_tx = Transaction::new_coinbase_tx(miner_address, "")?;
        let block = Block::new_block(
            prev_hash,
            &[coinbase_tx],
            base.get_height() + i + 1,
            TEST_DIFFICULTY,
        )?;
        prev_hash = block.get_hash().to_vec();
        fork_blocks.push(block);
    }
    Ok(fork_blocks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_test_ledger() {
        let (ledger, _temp_dir, _wallet) = create_test_ledger();
        assert_eq!(ledger.get_best_height().unwrap(), 0);
        assert!(validate_chain_integrity(&ledger).unwrap());
    }

    #[test]
    fn test_fork_blocks_link_up() {
        let (ledger, _temp_dir, wallet) = create_test_ledger();
        let genesis = ledger.get_block(&ledger.get_tip_hash()).unwrap();
        let fork = create_fork(&genesis, 3, &wallet.get_address()).unwrap();

        assert_eq!(fork.len(), 3);
        assert_eq!(fork[0].get_pre_block_hash(), genesis.get_hash());
        assert_eq!(fork[2].get_height(), 3);
        for block in &fork {
            assert!(ledger.add_block(block).unwrap());
        }
        assert!(validate_chain_integrity(&ledger).unwrap());
    }
}
