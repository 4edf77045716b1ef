//! Transaction id to containing block hash.
//!
//! Maintained next to the UTXO index so lookups of earlier transactions do
//! not have to walk the chain. Entries are hints: a miss falls back to a scan.

use crate::core::Block;
use crate::error::{LedgerError, Result};
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};
use sled::Tree;

/// Hash of the block holding `txid`, if indexed
pub fn lookup(tree: &Tree, txid: &[u8]) -> Result<Option<Vec<u8>>> {
    Ok(tree.get(txid)?.map(|hash| hash.to_vec()))
}

/// (txid, block hash) for every transaction in `block`
pub fn block_entries(block: &Block) -> Vec<(Vec<u8>, Vec<u8>)> {
    block
        .get_transactions()
        .iter()
        .map(|tx| (tx.get_id_bytes(), block.get_hash().to_vec()))
        .collect()
}

/// Record every transaction of `block` inside a running store transaction
pub fn index_block(
    index_db: &TransactionalTree,
    block: &Block,
) -> ConflictableTransactionResult<(), LedgerError> {
    for (txid, block_hash) in block_entries(block) {
        index_db.insert(txid, block_hash)?;
    }
    Ok(())
}

/// Drop the entries that still point at `block`
pub fn unindex_block(tree: &Tree, block: &Block) -> Result<()> {
    for (txid, block_hash) in block_entries(block) {
        // an entry already moved to another block is left alone
        let _ = tree.compare_and_swap(txid, Some(block_hash), None::<&[u8]>)?;
    }
    Ok(())
}
