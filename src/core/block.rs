use crate::core::{CancelToken, FileCommitment, MerkleProof, MerkleTree, ProofOfWork, Transaction};
use crate::error::{LedgerError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use log::info;
use serde::{Deserialize, Serialize};

/// What a block commits to
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub enum BlockPayload {
    /// Value transfers, sealed by proof-of-work
    Transactions(Vec<Transaction>),
    /// A file upload, hashed directly without proof-of-work
    File(FileCommitment),
}

#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Block {
    /// Milliseconds since the Unix epoch
    timestamp: i64,
    /// Empty for genesis
    pre_block_hash: Vec<u8>,
    hash: Vec<u8>,
    nonce: i64,
    height: usize,
    difficulty: u32,
    payload: BlockPayload,
}

impl Block {
    pub fn new_block(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
        difficulty: u32,
    ) -> Result<Block> {
        Self::new_block_with_cancel(
            pre_block_hash,
            transactions,
            height,
            difficulty,
            &CancelToken::new(),
        )
    }

    /// Assemble a transaction block and seal it. Fails with `MiningCancelled`
    /// if `cancel` fires before a nonce is found.
    pub fn new_block_with_cancel(
        pre_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
        difficulty: u32,
        cancel: &CancelToken,
    ) -> Result<Block> {
        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            nonce: 0,
            height,
            difficulty,
            payload: BlockPayload::Transactions(transactions.to_vec()),
        };

        info!("Starting proof-of-work for block at height {height} with difficulty {difficulty}");
        let pow = ProofOfWork::new_proof_of_work(&block)?;
        let (nonce, hash) = pow.run(cancel)?;
        block.nonce = nonce;
        block.hash = hash;
        info!(
            "Proof-of-work completed for block {} (nonce {nonce})",
            HEXLOWER.encode(&block.hash)
        );

        Ok(block)
    }

    /// Wrap a file commitment in a block. No proof-of-work: nonce and difficulty stay zero.
    pub fn new_file_block(
        commitment: FileCommitment,
        pre_block_hash: Vec<u8>,
        height: usize,
    ) -> Result<Block> {
        let mut block = Block {
            timestamp: current_timestamp()?,
            pre_block_hash,
            hash: vec![],
            nonce: 0,
            height,
            difficulty: 0,
            payload: BlockPayload::File(commitment),
        };
        block.hash = block.file_block_hash().unwrap_or_default();
        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction, difficulty: u32) -> Result<Block> {
        Block::new_block(vec![], std::slice::from_ref(transaction), 0, difficulty)
    }

    /// SHA256(prev_hash ‖ timestamp ‖ file_hash ‖ filename); None for transaction blocks
    fn file_block_hash(&self) -> Option<Vec<u8>> {
        let commitment = self.get_file_commitment()?;
        let mut data = self.pre_block_hash.clone();
        data.extend(self.timestamp.to_be_bytes());
        data.extend(commitment.get_file_hash().as_bytes());
        data.extend(commitment.get_filename().as_bytes());
        Some(sha256_digest(&data))
    }

    /// Check the block against its own contents: a transaction block must
    /// reproduce its hash and meet its target, a file block must reproduce its hash.
    pub fn validate(&self) -> Result<()> {
        match &self.payload {
            BlockPayload::Transactions(_) => {
                let pow = ProofOfWork::new_proof_of_work(self)?;
                if pow.hash_with_nonce(self.nonce) != self.hash {
                    return Err(LedgerError::InvalidProofOfWork(format!(
                        "Block {} does not reproduce its hash",
                        HEXLOWER.encode(&self.hash)
                    )));
                }
                if !ProofOfWork::validate(self) {
                    return Err(LedgerError::InvalidProofOfWork(format!(
                        "Block {} is above its difficulty target",
                        HEXLOWER.encode(&self.hash)
                    )));
                }
            }
            BlockPayload::File(_) => {
                if self.file_block_hash().as_deref() != Some(self.hash.as_slice()) {
                    return Err(LedgerError::InvalidBlock(format!(
                        "File block {} does not reproduce its hash",
                        HEXLOWER.encode(&self.hash)
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize::<Block>(bytes)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    /// Transactions of a transaction block; empty for file blocks
    pub fn get_transactions(&self) -> &[Transaction] {
        match &self.payload {
            BlockPayload::Transactions(transactions) => transactions.as_slice(),
            BlockPayload::File(_) => &[],
        }
    }

    pub fn get_file_commitment(&self) -> Option<&FileCommitment> {
        match &self.payload {
            BlockPayload::File(commitment) => Some(commitment),
            BlockPayload::Transactions(_) => None,
        }
    }

    pub fn get_payload(&self) -> &BlockPayload {
        &self.payload
    }

    pub fn is_file_block(&self) -> bool {
        matches!(self.payload, BlockPayload::File(_))
    }

    pub fn is_genesis(&self) -> bool {
        self.pre_block_hash.is_empty()
    }

    pub fn get_pre_block_hash(&self) -> &[u8] {
        self.pre_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    /// Merkle root over the serialized transactions (all zeros when there are none)
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        Ok(MerkleTree::new(self.get_transactions())?.root())
    }

    /// Generate a Merkle proof for a transaction in this block
    pub fn generate_merkle_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        MerkleTree::new(self.get_transactions())?.generate_proof(transaction_index)
    }

    /// Verify a Merkle proof against this block's Merkle root
    pub fn verify_merkle_proof(&self, proof: &MerkleProof) -> Result<bool> {
        if proof.merkle_root != self.hash_transactions()? {
            return Ok(false);
        }
        Ok(MerkleTree::verify_proof(proof))
    }
}
