//! Error handling for the ledger
//!
//! Every fallible operation returns a [`LedgerError`]. Errors are grouped into
//! coarse categories through [`LedgerError::kind`] so callers can decide what is
//! recoverable (a missing block, a bad signature) and what is not (the store
//! itself failing underneath us).

use std::fmt;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Coarse classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing chain, block, transaction or wallet
    NotFound,
    /// Bad input: signatures, funds, addresses, configuration
    Validation,
    /// The durable store could not be opened, read or written
    Persistence,
    /// A block failed proof-of-work or hash validation
    Consensus,
    /// A mining attempt was abandoned on request
    Cancelled,
}

#[derive(Debug, Clone)]
pub enum LedgerError {
    /// No chain exists at the configured location
    ChainNotFound(String),
    /// A chain already exists at the configured location
    ChainAlreadyExists(String),
    /// Block lookup by hash failed
    BlockNotFound(String),
    /// Transaction lookup by id failed
    TransactionNotFound(String),
    /// Wallet lookup failed
    Wallet(String),
    /// Transaction validation errors
    InvalidTransaction(String),
    /// Invalid address format or checksum
    InvalidAddress(String),
    /// Insufficient funds for transaction
    InsufficientFunds { required: u64, available: u64 },
    /// Cryptographic operation errors
    Crypto(String),
    /// Configuration errors
    Config(String),
    /// Database-related errors
    Database(String),
    /// The store is held by another process
    StoreLocked(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// Block validation errors
    InvalidBlock(String),
    /// Proof-of-work does not satisfy the target or reproduce the hash
    InvalidProofOfWork(String),
    /// Mining errors
    Mining(String),
    /// Mining was cancelled before a nonce was found
    MiningCancelled,
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::ChainNotFound(_)
            | LedgerError::BlockNotFound(_)
            | LedgerError::TransactionNotFound(_)
            | LedgerError::Wallet(_) => ErrorKind::NotFound,
            LedgerError::ChainAlreadyExists(_)
            | LedgerError::InvalidTransaction(_)
            | LedgerError::InvalidAddress(_)
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::Crypto(_)
            | LedgerError::Config(_) => ErrorKind::Validation,
            LedgerError::Database(_)
            | LedgerError::StoreLocked(_)
            | LedgerError::Serialization(_)
            | LedgerError::Io(_) => ErrorKind::Persistence,
            LedgerError::InvalidBlock(_)
            | LedgerError::InvalidProofOfWork(_)
            | LedgerError::Mining(_) => ErrorKind::Consensus,
            LedgerError::MiningCancelled => ErrorKind::Cancelled,
        }
    }

    /// Persistence failures leave the store in an unknown state; everything
    /// else only affects the request that produced it.
    pub fn is_recoverable(&self) -> bool {
        self.kind() != ErrorKind::Persistence
    }
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::ChainNotFound(path) => {
                write!(f, "No existing blockchain found at {path}, create one first")
            }
            LedgerError::ChainAlreadyExists(path) => {
                write!(f, "Blockchain already exists at {path}")
            }
            LedgerError::BlockNotFound(hash) => write!(f, "Block not found: {hash}"),
            LedgerError::TransactionNotFound(id) => write!(f, "Transaction not found: {id}"),
            LedgerError::Wallet(msg) => write!(f, "Wallet error: {msg}"),
            LedgerError::InvalidTransaction(msg) => write!(f, "Invalid transaction: {msg}"),
            LedgerError::InvalidAddress(addr) => write!(f, "Invalid address: {addr}"),
            LedgerError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "Insufficient funds: required {required}, available {available}"
                )
            }
            LedgerError::Crypto(msg) => write!(f, "Cryptographic error: {msg}"),
            LedgerError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LedgerError::Database(msg) => write!(f, "Database error: {msg}"),
            LedgerError::StoreLocked(msg) => write!(f, "Store is locked: {msg}"),
            LedgerError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            LedgerError::Io(msg) => write!(f, "I/O error: {msg}"),
            LedgerError::InvalidBlock(msg) => write!(f, "Invalid block: {msg}"),
            LedgerError::InvalidProofOfWork(msg) => write!(f, "Invalid proof of work: {msg}"),
            LedgerError::Mining(msg) => write!(f, "Mining error: {msg}"),
            LedgerError::MiningCancelled => write!(f, "Mining cancelled"),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<sled::Error> for LedgerError {
    fn from(err: sled::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<LedgerError>> for LedgerError {
    fn from(err: sled::transaction::TransactionError<LedgerError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(e) => e,
            sled::transaction::TransactionError::Storage(e) => {
                LedgerError::Database(format!("Store transaction failed: {e}"))
            }
        }
    }
}

impl From<bincode::error::EncodeError> for LedgerError {
    fn from(err: bincode::error::EncodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for LedgerError {
    fn from(err: bincode::error::DecodeError) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
