use crate::core::Transaction;
use data_encoding::HEXLOWER;
use log::error;
use std::collections::HashMap;
use std::sync::RwLock;

/// Transactions waiting to be mined ( K -> txid_hex, V => Transaction )
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, txid: &str) -> Option<Transaction> {
        match self.inner.read() {
            Ok(pool) => pool.get(txid).cloned(),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                None
            }
        }
    }

    pub fn add(&self, tx: Transaction) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.insert(HEXLOWER.encode(tx.get_id()), tx);
            }
            Err(_) => {
                error!("Failed to acquire write lock on memory pool");
            }
        }
    }

    pub fn contains(&self, txid: &str) -> bool {
        match self.inner.read() {
            Ok(pool) => pool.contains_key(txid),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                false
            }
        }
    }

    pub fn remove(&self, txid: &str) {
        match self.inner.write() {
            Ok(mut pool) => {
                pool.remove(txid);
            }
            Err(_) => {
                error!("Failed to acquire write lock on memory pool");
            }
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(pool) => pool.len(),
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pending transactions ordered by id, so mining the pool is deterministic
    pub fn get_all(&self) -> Vec<Transaction> {
        match self.inner.read() {
            Ok(pool) => {
                let mut txs: Vec<(&String, &Transaction)> = pool.iter().collect();
                txs.sort_by(|a, b| a.0.cmp(b.0));
                txs.into_iter().map(|(_, tx)| tx.clone()).collect()
            }
            Err(_) => {
                error!("Failed to acquire read lock on memory pool");
                Vec::new()
            }
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut pool) => pool.clear(),
            Err(_) => {
                error!("Failed to acquire write lock on memory pool");
            }
        }
    }
}
