//! Data storage and persistence
//!
//! The sled store and its trees, the UTXO index derived from the chain, the
//! transaction index and the in-memory pool of pending transactions.

pub mod memory_pool;
pub mod store;
pub mod tx_index;
pub mod utxo_set;

pub use memory_pool::MemoryPool;
pub use store::Store;
pub use utxo_set::{UTXOSet, UnspentOutput};
