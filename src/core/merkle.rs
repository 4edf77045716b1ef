use crate::core::Transaction;
use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use serde::{Deserialize, Serialize};

/// Root committed to by a block without transactions
pub const EMPTY_MERKLE_ROOT: [u8; 32] = [0u8; 32];

/// Merkle tree over a block's transactions.
///
/// Leaves are SHA-256 digests of each serialized transaction in submission
/// order. Every level above hashes adjacent pairs; an odd level pairs its last
/// node with itself. All levels are kept so inclusion proofs can be produced
/// without rebuilding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleTree {
    /// levels[0] are the leaves, the last level holds the root
    levels: Vec<Vec<Vec<u8>>>,
}

/// Merkle proof for transaction verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf hash being proven
    pub transaction_hash: Vec<u8>,
    /// Merkle root hash
    pub merkle_root: Vec<u8>,
    /// Proof path (sibling hashes and directions), leaf level first
    pub proof_path: Vec<ProofElement>,
    /// Index of the transaction in the block
    pub transaction_index: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProofElement {
    /// Sibling hash
    pub hash: Vec<u8>,
    /// Direction: true if sibling is on the right, false if on the left
    pub is_right: bool,
}

impl MerkleTree {
    /// Create a new Merkle tree from a list of transactions
    pub fn new(transactions: &[Transaction]) -> Result<Self> {
        let leaves = transactions
            .iter()
            .map(Self::leaf_hash)
            .collect::<Result<Vec<Vec<u8>>>>()?;
        Ok(Self::from_hashes(&leaves))
    }

    /// Build a tree whose leaves are already hashed
    pub fn from_hashes(hashes: &[Vec<u8>]) -> Self {
        let mut levels = vec![hashes.to_vec()];
        while let Some(current) = levels.last() {
            if current.len() <= 1 {
                break;
            }
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => Self::hash_pair(left, right),
                    [single] => Self::hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two items"),
                })
                .collect();
            levels.push(next);
        }
        MerkleTree { levels }
    }

    /// SHA-256 of the transaction's canonical encoding
    pub fn leaf_hash(transaction: &Transaction) -> Result<Vec<u8>> {
        Ok(sha256_digest(&transaction.serialize()?))
    }

    pub fn root(&self) -> Vec<u8> {
        match self.levels.last().and_then(|level| level.first()) {
            Some(root) => root.clone(),
            None => EMPTY_MERKLE_ROOT.to_vec(),
        }
    }

    /// Get the number of leaves in the tree
    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count() == 0
    }

    /// Generate a Merkle proof for a transaction at the given index
    pub fn generate_proof(&self, transaction_index: usize) -> Result<MerkleProof> {
        let leaf_count = self.leaf_count();
        if transaction_index >= leaf_count {
            return Err(LedgerError::InvalidBlock(format!(
                "Transaction index {transaction_index} out of bounds ({leaf_count} leaves)"
            )));
        }

        let mut proof_path = Vec::new();
        let mut index = transaction_index;
        for level in &self.levels[..self.levels.len() - 1] {
            let element = if index % 2 == 0 {
                // A missing right sibling means the node was paired with itself
                let sibling = level.get(index + 1).unwrap_or(&level[index]);
                ProofElement {
                    hash: sibling.clone(),
                    is_right: true,
                }
            } else {
                ProofElement {
                    hash: level[index - 1].clone(),
                    is_right: false,
                }
            };
            proof_path.push(element);
            index /= 2;
        }

        Ok(MerkleProof {
            transaction_hash: self.levels[0][transaction_index].clone(),
            merkle_root: self.root(),
            proof_path,
            transaction_index,
        })
    }

    /// Verify a Merkle proof
    pub fn verify_proof(proof: &MerkleProof) -> bool {
        let mut current_hash = proof.transaction_hash.clone();

        for element in &proof.proof_path {
            current_hash = if element.is_right {
                Self::hash_pair(&current_hash, &element.hash)
            } else {
                Self::hash_pair(&element.hash, &current_hash)
            };
        }

        current_hash == proof.merkle_root
    }

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(left.len() + right.len());
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        sha256_digest(&combined)
    }
}
