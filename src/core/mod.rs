//! Core ledger functionality
//!
//! Blocks and their two payload kinds, transactions, Merkle commitments,
//! the proof-of-work puzzle and the chain store that ties them together.

pub mod block;
pub mod file_upload;
pub mod ledger;
pub mod merkle;
pub mod miner;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::{Block, BlockPayload};
pub use file_upload::FileCommitment;
pub use ledger::{Ledger, LedgerIterator};
pub use merkle::{MerkleProof, MerkleTree, ProofElement, EMPTY_MERKLE_ROOT};
pub use miner::{mine_memory_pool, MiningJob};
pub use monetary::{SATOSHIS_PER_COIN, SUBSIDY};
pub use proof_of_work::{CancelToken, ProofOfWork};
pub use transaction::{TXInput, TXOutput, Transaction, GENESIS_COINBASE_NOTE};
