use crate::config::MAX_DIFFICULTY;
use crate::core::Block;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::{debug, info};
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const MAX_NONCE: i64 = i64::MAX;

/// How many nonces are tried between checks of the cancellation flag
const CANCEL_POLL_INTERVAL: i64 = 1024;

/// Shared flag used to abandon a running proof-of-work search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Hash puzzle over a transaction block's header fields.
///
/// The preimage is `prev_hash ‖ merkle_root ‖ timestamp ‖ difficulty ‖ nonce`
/// with integers big-endian; a nonce wins when the digest, read as a
/// big-endian integer, is strictly below `1 << (256 - difficulty)`.
pub struct ProofOfWork {
    pre_block_hash: Vec<u8>,
    merkle_root: Vec<u8>,
    timestamp: i64,
    difficulty: u32,
    target: BigInt,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: &Block) -> Result<ProofOfWork> {
        let difficulty = block.get_difficulty();
        if difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::InvalidProofOfWork(format!(
                "Difficulty {difficulty} exceeds {MAX_DIFFICULTY}"
            )));
        }
        let mut target = BigInt::from(1);
        target.shl_assign(256 - difficulty);
        Ok(ProofOfWork {
            pre_block_hash: block.get_pre_block_hash().to_vec(),
            merkle_root: block.hash_transactions()?,
            timestamp: block.get_timestamp(),
            difficulty,
            target,
        })
    }

    /// Recompute the digest for the block's stored nonce and check it against the target.
    /// File blocks carry no proof and never validate here.
    pub fn validate(block: &Block) -> bool {
        if block.is_file_block() {
            return false;
        }
        match ProofOfWork::new_proof_of_work(block) {
            Ok(pow) => pow.meets_target(&pow.hash_with_nonce(block.get_nonce())),
            Err(_) => false,
        }
    }

    pub fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data_bytes = Vec::with_capacity(self.pre_block_hash.len() + self.merkle_root.len() + 20);
        data_bytes.extend(&self.pre_block_hash);
        data_bytes.extend(&self.merkle_root);
        data_bytes.extend(self.timestamp.to_be_bytes());
        data_bytes.extend(self.difficulty.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        data_bytes
    }

    pub fn hash_with_nonce(&self, nonce: i64) -> Vec<u8> {
        sha256_digest(self.prepare_data(nonce).as_slice())
    }

    fn meets_target(&self, hash: &[u8]) -> bool {
        BigInt::from_bytes_be(Sign::Plus, hash) < self.target
    }

    /// Search nonces from zero upward until one meets the target
    pub fn run(&self, cancel: &CancelToken) -> Result<(i64, Vec<u8>)> {
        debug!("Mining with difficulty {}", self.difficulty);
        let mut nonce = 0;
        while nonce < MAX_NONCE {
            if nonce % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                info!("Proof-of-work cancelled after {nonce} nonces");
                return Err(LedgerError::MiningCancelled);
            }

            let hash = self.hash_with_nonce(nonce);
            if self.meets_target(&hash) {
                debug!("Found nonce {nonce}: {}", HEXLOWER.encode(hash.as_slice()));
                return Ok((nonce, hash));
            }
            nonce += 1;
        }
        Err(LedgerError::Mining(format!(
            "Nonce space exhausted at difficulty {}",
            self.difficulty
        )))
    }
}
