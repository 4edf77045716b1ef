// The chain store: an append-only map of block hash to block plus the tip
// pointer. Every read-modify-write of the tip runs inside one sled transaction.

use crate::config::Config;
use crate::core::transaction::GENESIS_COINBASE_NOTE;
use crate::core::{Block, CancelToken, FileCommitment, Transaction};
use crate::error::{LedgerError, Result};
use crate::storage::store::{Store, TIP_BLOCK_HASH_KEY};
use crate::storage::{tx_index, UnspentOutput};
use data_encoding::HEXLOWER;
use log::{debug, info, warn};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

/// Handle to one node's chain. Cheap to clone; clones share the store and tip.
#[derive(Clone)]
pub struct Ledger {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    store: Store,
    difficulty: u32,
}

impl Ledger {
    /// Create a new chain whose genesis coinbase pays `genesis_address`
    pub fn init(genesis_address: &str, config: &Config) -> Result<Ledger> {
        config.validate()?;
        let path = config.db_path();
        let store = Store::open(&path, config.sync_writes)?;

        if store.blocks().get(TIP_BLOCK_HASH_KEY)?.is_some() {
            return Err(LedgerError::ChainAlreadyExists(path.display().to_string()));
        }

        info!("Creating genesis block for address: {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_NOTE)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx, config.difficulty)?;
        let block_data = genesis.serialize()?;
        let path_label = path.display().to_string();

        store
            .blocks()
            .transaction(|tx_db| -> ConflictableTransactionResult<(), LedgerError> {
                if tx_db.get(TIP_BLOCK_HASH_KEY)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(
                        LedgerError::ChainAlreadyExists(path_label.clone()),
                    ));
                }
                tx_db.insert(genesis.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, genesis.get_hash())?;
                Ok(())
            })?;
        store.flush_if_sync()?;

        Ok(Ledger {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash().to_vec())),
            store,
            difficulty: config.difficulty,
        })
    }

    /// Open an existing chain
    pub fn open(config: &Config) -> Result<Ledger> {
        config.validate()?;
        let path = config.db_path();
        if !Store::exists(&path) {
            return Err(LedgerError::ChainNotFound(path.display().to_string()));
        }

        let store = Store::open(&path, config.sync_writes)?;
        let tip_hash = store
            .blocks()
            .get(TIP_BLOCK_HASH_KEY)?
            .ok_or_else(|| LedgerError::ChainNotFound(path.display().to_string()))?;

        Ok(Ledger {
            tip_hash: Arc::new(RwLock::new(tip_hash.to_vec())),
            store,
            difficulty: config.difficulty,
        })
    }

    pub fn get_store(&self) -> &Store {
        &self.store
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self
            .tip_hash
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Tip block as seen from inside a store transaction
    fn tip_block_in(tx_db: &TransactionalTree) -> ConflictableTransactionResult<Block, LedgerError> {
        let tip_hash = tx_db.get(TIP_BLOCK_HASH_KEY)?.ok_or_else(|| {
            ConflictableTransactionError::Abort(LedgerError::ChainNotFound(
                "tip pointer missing".to_string(),
            ))
        })?;
        let tip_bytes = tx_db.get(&tip_hash)?.ok_or_else(|| {
            ConflictableTransactionError::Abort(LedgerError::BlockNotFound(
                HEXLOWER.encode(&tip_hash),
            ))
        })?;
        Block::deserialize(tip_bytes.as_ref()).map_err(ConflictableTransactionError::Abort)
    }

    /// Hash and height of the tip, read atomically
    fn read_tip(&self) -> Result<(Vec<u8>, usize)> {
        let tip = self
            .store
            .blocks()
            .transaction(|tx_db| -> ConflictableTransactionResult<(Vec<u8>, usize), LedgerError> {
                let tip_block = Self::tip_block_in(tx_db)?;
                Ok((tip_block.get_hash().to_vec(), tip_block.get_height()))
            })?;
        Ok(tip)
    }

    /// Store `block` and make it the tip in one transaction
    fn append_as_tip(&self, block: &Block) -> Result<()> {
        let block_data = block.serialize()?;
        self.store
            .blocks()
            .transaction(|tx_db| -> ConflictableTransactionResult<(), LedgerError> {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                Ok(())
            })?;
        self.set_tip_hash(block.get_hash());
        self.store.flush_if_sync()?;
        Ok(())
    }

    /// Seal `transactions` into a new block on top of the tip
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        self.mine_block_with_cancel(transactions, &CancelToken::new())
    }

    pub fn mine_block_with_cancel(
        &self,
        transactions: &[Transaction],
        cancel: &CancelToken,
    ) -> Result<Block> {
        for (i, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            let prev_txs = self.collect_prev_transactions(transaction).map_err(|e| {
                LedgerError::InvalidTransaction(format!("Invalid transaction at index {i}: {e}"))
            })?;
            if !transaction.verify(&prev_txs) {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Invalid signature in transaction at index {i}"
                )));
            }
            if !transaction.verify_balance(&prev_txs) {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Unbalanced transaction at index {i}"
                )));
            }
        }

        self.check_for_double_spending(transactions)?;
        for transaction in transactions {
            self.validate_transaction_inputs(transaction)?;
        }

        let (tip_hash, best_height) = self.read_tip()?;
        let next_height = best_height + 1;
        info!(
            "Mining block at height {next_height} with {} transactions (difficulty: {})",
            transactions.len(),
            self.difficulty
        );

        let block = Block::new_block_with_cancel(
            tip_hash,
            transactions,
            next_height,
            self.difficulty,
            cancel,
        )?;
        self.append_as_tip(&block)?;

        info!("Successfully mined block: {}", block.get_hash_hex());
        Ok(block)
    }

    /// Record a file commitment on top of the tip. No proof-of-work.
    pub fn add_file_block(&self, commitment: FileCommitment) -> Result<Block> {
        let (tip_hash, best_height) = self.read_tip()?;
        let block = Block::new_file_block(commitment, tip_hash, best_height + 1)?;
        self.append_as_tip(&block)?;
        info!(
            "Recorded file block {} at height {}",
            block.get_hash_hex(),
            block.get_height()
        );
        Ok(block)
    }

    /// Store a block received from elsewhere. It becomes the tip only when it
    /// is strictly higher than the current tip; returns whether the tip moved.
    pub fn add_block(&self, block: &Block) -> Result<bool> {
        block.validate()?;
        let block_data = block.serialize()?;

        let (tip_moved, old_tip_hash) = self
            .store
            .blocks()
            .transaction(|tx_db| -> ConflictableTransactionResult<(bool, Vec<u8>), LedgerError> {
                if tx_db.get(block.get_hash())?.is_some() {
                    return Ok((false, Vec::new()));
                }

                // the chain got its genesis at init, a second one is never accepted
                if block.is_genesis() {
                    return Err(ConflictableTransactionError::Abort(LedgerError::InvalidBlock(
                        format!(
                            "Block {} at height {} has no parent",
                            block.get_hash_hex(),
                            block.get_height()
                        ),
                    )));
                }

                let parent_bytes = tx_db.get(block.get_pre_block_hash())?.ok_or_else(|| {
                    ConflictableTransactionError::Abort(LedgerError::InvalidBlock(format!(
                        "Parent {} of block {} is unknown",
                        HEXLOWER.encode(block.get_pre_block_hash()),
                        block.get_hash_hex()
                    )))
                })?;
                let parent = Block::deserialize(parent_bytes.as_ref())
                    .map_err(ConflictableTransactionError::Abort)?;
                if block.get_height() != parent.get_height() + 1 {
                    return Err(ConflictableTransactionError::Abort(
                        LedgerError::InvalidBlock(format!(
                            "Block {} has height {} but its parent has height {}",
                            block.get_hash_hex(),
                            block.get_height(),
                            parent.get_height()
                        )),
                    ));
                }

                tx_db.insert(block.get_hash(), block_data.as_slice())?;

                let tip_block = Self::tip_block_in(tx_db)?;
                if block.get_height() > tip_block.get_height() {
                    tx_db.insert(TIP_BLOCK_HASH_KEY, block.get_hash())?;
                    return Ok((true, tip_block.get_hash().to_vec()));
                }
                Ok((false, Vec::new()))
            })?;

        if tip_moved {
            self.set_tip_hash(block.get_hash());
            info!(
                "Tip advanced to block {} at height {}",
                block.get_hash_hex(),
                block.get_height()
            );
            if block.get_pre_block_hash() != old_tip_hash.as_slice() {
                self.unindex_displaced_blocks(&old_tip_hash)?;
            }
        } else {
            debug!("Stored block {} without moving the tip", block.get_hash_hex());
        }
        self.store.flush_if_sync()?;
        Ok(tip_moved)
    }

    // After a branch switch, blocks of the old branch leave the main chain and
    // their transaction index entries go with them
    fn unindex_displaced_blocks(&self, old_tip_hash: &[u8]) -> Result<()> {
        let mut block = self.get_block(old_tip_hash)?;
        let mut displaced = 0;
        while !self.is_on_main_chain(&block)? {
            tx_index::unindex_block(self.store.tx_index(), &block)?;
            displaced += 1;
            block = self.get_block(block.get_pre_block_hash())?;
        }
        warn!("Branch switch displaced {displaced} block(s); the UTXO index needs a reindex");
        Ok(())
    }

    /// Whether `block` is the main-chain block at its height
    pub fn is_on_main_chain(&self, block: &Block) -> Result<bool> {
        for main_block in self.iterator() {
            let main_block = main_block?;
            if main_block.get_height() <= block.get_height() {
                return Ok(main_block.get_hash() == block.get_hash());
            }
        }
        Ok(false)
    }

    /// Walk the chain from the tip back to genesis
    pub fn iterator(&self) -> LedgerIterator {
        LedgerIterator::new(self.get_tip_hash(), self.store.blocks().clone())
    }

    pub fn get_best_height(&self) -> Result<usize> {
        Ok(self.get_block(&self.get_tip_hash())?.get_height())
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Block> {
        let block_bytes = self
            .store
            .blocks()
            .get(block_hash)?
            .ok_or_else(|| LedgerError::BlockNotFound(HEXLOWER.encode(block_hash)))?;
        Block::deserialize(block_bytes.as_ref())
    }

    pub fn block_exists(&self, block_hash: &[u8]) -> Result<bool> {
        Ok(self.store.blocks().contains_key(block_hash)?)
    }

    /// Hashes of the main chain, tip first
    pub fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        self.iterator()
            .map(|block| block.map(|block| block.get_hash().to_vec()))
            .collect()
    }

    /// Find a transaction on the main chain, consulting the transaction index first
    pub fn find_transaction(&self, txid: &[u8]) -> Result<Transaction> {
        if let Some(block_hash) = tx_index::lookup(self.store.tx_index(), txid)? {
            match self.get_block(&block_hash) {
                Ok(block) if self.is_on_main_chain(&block)? => {
                    if let Some(tx) = block.get_transactions().iter().find(|tx| tx.get_id() == txid)
                    {
                        return Ok(tx.clone());
                    }
                }
                Ok(_) => {}
                Err(LedgerError::BlockNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            debug!(
                "Stale index entry for transaction {}, scanning chain",
                HEXLOWER.encode(txid)
            );
        }

        for block in self.iterator() {
            let block = block?;
            if let Some(tx) = block.get_transactions().iter().find(|tx| tx.get_id() == txid) {
                return Ok(tx.clone());
            }
        }
        Err(LedgerError::TransactionNotFound(HEXLOWER.encode(txid)))
    }

    /// Every unspent output on the main chain, keyed by transaction id
    pub fn find_utxo(&self) -> Result<HashMap<Vec<u8>, Vec<UnspentOutput>>> {
        let mut utxo: HashMap<Vec<u8>, Vec<UnspentOutput>> = HashMap::new();
        let mut spent_txos: HashSet<(Vec<u8>, usize)> = HashSet::new();

        for block in self.iterator() {
            let block = block?;
            // Inputs first so outputs consumed later in the same block are excluded
            for tx in block.get_transactions() {
                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos.insert((txin.get_txid().to_vec(), txin.get_vout()));
                }
            }

            for tx in block.get_transactions() {
                let txid = tx.get_id_bytes();
                for (idx, out) in tx.get_vout().iter().enumerate() {
                    if spent_txos.contains(&(txid.clone(), idx)) {
                        continue;
                    }
                    utxo.entry(txid.clone())
                        .or_default()
                        .push(UnspentOutput::new(idx, out.clone()));
                }
            }
        }
        Ok(utxo)
    }

    /// txid to containing block hash for every transaction on the main chain
    pub fn find_transaction_locations(&self) -> Result<HashMap<Vec<u8>, Vec<u8>>> {
        let mut locations = HashMap::new();
        for block in self.iterator() {
            locations.extend(tx_index::block_entries(&block?));
        }
        Ok(locations)
    }

    /// Referenced transactions keyed by hex txid
    fn collect_prev_transactions(
        &self,
        transaction: &Transaction,
    ) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for vin in transaction.get_vin() {
            let txid_hex = HEXLOWER.encode(vin.get_txid());
            if prev_txs.contains_key(&txid_hex) {
                continue;
            }
            let prev_tx = self.find_transaction(vin.get_txid())?;
            prev_txs.insert(txid_hex, prev_tx);
        }
        Ok(prev_txs)
    }

    pub fn sign_transaction(&self, transaction: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        if transaction.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.collect_prev_transactions(transaction)?;
        transaction.sign(pkcs8, &prev_txs)
    }

    /// Signature check against the chain. Unknown references make the
    /// transaction invalid rather than failing the call.
    pub fn verify_transaction(&self, transaction: &Transaction) -> Result<bool> {
        if transaction.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = match self.collect_prev_transactions(transaction) {
            Ok(prev_txs) => prev_txs,
            Err(LedgerError::TransactionNotFound(txid)) => {
                warn!("Transaction references unknown transaction {txid}");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        Ok(transaction.verify(&prev_txs))
    }

    /// Reject blocks that spend the same output twice
    pub fn check_for_double_spending(&self, transactions: &[Transaction]) -> Result<()> {
        let mut spent_outputs: HashSet<(Vec<u8>, usize)> = HashSet::new();

        for (tx_index, transaction) in transactions.iter().enumerate() {
            if transaction.is_coinbase() {
                continue;
            }
            for input in transaction.get_vin() {
                let output_reference = (input.get_txid().to_vec(), input.get_vout());
                if !spent_outputs.insert(output_reference) {
                    return Err(LedgerError::InvalidTransaction(format!(
                        "Double-spending detected in transaction {tx_index}: output {}:{} already spent in this block",
                        HEXLOWER.encode(input.get_txid()),
                        input.get_vout()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether any input on the main chain already consumes `txid:vout`
    pub fn is_output_spent(&self, txid: &[u8], vout: usize) -> Result<bool> {
        for block in self.iterator() {
            let spent = block?
                .get_transactions()
                .iter()
                .filter(|tx| !tx.is_coinbase())
                .flat_map(|tx| tx.get_vin())
                .any(|input| input.get_txid() == txid && input.get_vout() == vout);
            if spent {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn validate_transaction_inputs(&self, transaction: &Transaction) -> Result<()> {
        if transaction.is_coinbase() {
            return Ok(());
        }
        for input in transaction.get_vin() {
            if self.is_output_spent(input.get_txid(), input.get_vout())? {
                return Err(LedgerError::InvalidTransaction(format!(
                    "Input already spent: {}:{}",
                    HEXLOWER.encode(input.get_txid()),
                    input.get_vout()
                )));
            }
        }
        Ok(())
    }
}

/// Lazy tip-to-genesis walk. Ends after genesis or after the first error.
pub struct LedgerIterator {
    blocks: sled::Tree,
    current_hash: Option<Vec<u8>>,
}

impl LedgerIterator {
    fn new(tip_hash: Vec<u8>, blocks: sled::Tree) -> LedgerIterator {
        LedgerIterator {
            blocks,
            current_hash: Some(tip_hash),
        }
    }
}

impl Iterator for LedgerIterator {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        let hash = self.current_hash.take()?;
        let data = match self.blocks.get(&hash) {
            Ok(Some(data)) => data,
            Ok(None) => return Some(Err(LedgerError::BlockNotFound(HEXLOWER.encode(&hash)))),
            Err(e) => return Some(Err(e.into())),
        };
        let block = match Block::deserialize(data.as_ref()) {
            Ok(block) => block,
            Err(e) => return Some(Err(e)),
        };
        if !block.is_genesis() {
            self.current_hash = Some(block.get_pre_block_hash().to_vec());
        }
        Some(Ok(block))
    }
}
