use crate::core::{Block, CancelToken, Ledger, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::{MemoryPool, UTXOSet};
use data_encoding::HEXLOWER;
use log::{info, warn};
use std::collections::HashSet;
use std::thread::{self, JoinHandle};

/// Proof-of-work running on its own thread
pub struct MiningJob {
    cancel: CancelToken,
    handle: JoinHandle<Result<Block>>,
}

impl MiningJob {
    /// Start mining `transactions` on top of the ledger's current tip
    pub fn spawn(ledger: Ledger, transactions: Vec<Transaction>) -> Result<MiningJob> {
        let cancel = CancelToken::new();
        let worker_cancel = cancel.clone();
        let handle = thread::Builder::new()
            .name("ledger-miner".to_string())
            .spawn(move || ledger.mine_block_with_cancel(&transactions, &worker_cancel))?;
        Ok(MiningJob { cancel, handle })
    }

    /// Ask the worker to stop; it notices within a few thousand hashes
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker. A cancelled job yields `MiningCancelled`.
    pub fn join(self) -> Result<Block> {
        self.handle
            .join()
            .map_err(|_| LedgerError::Mining("Mining thread panicked".to_string()))?
    }
}

/// Mine every valid pooled transaction plus a coinbase paying `miner_address`.
/// Invalid or conflicting transactions are dropped from the pool. Returns
/// `None` when nothing in the pool could be mined.
pub fn mine_memory_pool(
    utxo_set: &UTXOSet,
    pool: &MemoryPool,
    miner_address: &str,
) -> Result<Option<Block>> {
    let ledger = utxo_set.get_ledger();
    let mut claimed: HashSet<(Vec<u8>, usize)> = HashSet::new();
    let mut txs = vec![];

    for tx in pool.get_all() {
        let txid_hex = HEXLOWER.encode(tx.get_id());
        let valid =
            ledger.verify_transaction(&tx)? && ledger.validate_transaction_inputs(&tx).is_ok();
        let conflicts = tx
            .get_vin()
            .iter()
            .any(|vin| claimed.contains(&(vin.get_txid().to_vec(), vin.get_vout())));

        if !valid || conflicts {
            warn!("Dropping transaction {txid_hex} from the memory pool");
            pool.remove(&txid_hex);
            continue;
        }
        for vin in tx.get_vin() {
            claimed.insert((vin.get_txid().to_vec(), vin.get_vout()));
        }
        txs.push(tx);
    }

    if txs.is_empty() {
        info!("No valid transactions to mine");
        return Ok(None);
    }

    let mut block_txs = vec![Transaction::new_coinbase_tx(miner_address, "")?];
    block_txs.extend(txs);

    let block = ledger.mine_block(&block_txs)?;
    utxo_set.update(&block)?;
    info!("New block {} is mined!", block.get_hash_hex());

    for tx in &block_txs {
        pool.remove(&HEXLOWER.encode(tx.get_id()));
    }
    Ok(Some(block))
}
