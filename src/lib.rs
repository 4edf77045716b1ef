//! # Ledger Chain
//!
//! A single-node proof-of-work ledger. Value moves through an unspent
//! transaction output (UTXO) model, and besides transaction blocks the chain
//! can carry file-commitment blocks that anchor the SHA-256 of an uploaded
//! file together with its name and sender.
//!
//! ## Layout
//! - `core/`: blocks, transactions, Merkle commitments, proof-of-work, the
//!   chain store handle ([`Ledger`]) and the miner
//! - `storage/`: the sled store, UTXO and transaction indexes, memory pool
//! - `wallet/`: ECDSA P-256 keys and Base58Check addresses
//! - `config/`: node configuration from defaults, TOML and the environment
//! - `utils/`: hashing, signatures and the canonical bincode encoding
//! - `cli/`: command-line arguments for the `ledger-chain` binary
//!
//! A [`Ledger`] is an explicit handle; open as many as there are store
//! directories. Blocks are appended through it and the [`UTXOSet`] is kept in
//! step with [`UTXOSet::update`] or rebuilt with [`UTXOSet::reindex`].

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod storage;
pub mod utils;
pub mod wallet;

#[cfg(test)]
pub mod testnet;

pub use cli::{Command, Opt};
pub use config::Config;
pub use core::{
    mine_memory_pool, Block, BlockPayload, CancelToken, FileCommitment, Ledger, LedgerIterator,
    MerkleProof, MerkleTree, MiningJob, ProofOfWork, TXInput, TXOutput, Transaction,
    SATOSHIS_PER_COIN, SUBSIDY,
};
pub use error::{ErrorKind, LedgerError, Result};
pub use storage::{MemoryPool, Store, UTXOSet, UnspentOutput};
pub use utils::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, new_key_pair, ripemd160_digest, sha256_digest,
};
pub use wallet::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, Wallet, Wallets,
    ADDRESS_CHECK_SUM_LEN,
};
