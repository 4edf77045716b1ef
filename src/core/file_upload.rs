use crate::error::{LedgerError, Result};
use crate::utils::sha256_digest;
use crate::wallet::validate_address;
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

const FILE_HASH_HEX_LEN: usize = 64;

/// Content commitment recorded by a file block. The file itself lives outside the ledger.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct FileCommitment {
    /// Lowercase hex SHA-256 of the file contents
    file_hash: String,
    filename: String,
    /// Address of the uploader
    sender: String,
}

impl FileCommitment {
    pub fn new(sender: &str, filename: &str, file_hash: &str) -> Result<FileCommitment> {
        if !validate_address(sender) {
            return Err(LedgerError::InvalidAddress(sender.to_string()));
        }
        if filename.is_empty() {
            return Err(LedgerError::InvalidBlock(
                "File commitment needs a filename".to_string(),
            ));
        }
        let file_hash = file_hash.to_ascii_lowercase();
        if file_hash.len() != FILE_HASH_HEX_LEN || HEXLOWER.decode(file_hash.as_bytes()).is_err() {
            return Err(LedgerError::InvalidBlock(format!(
                "File hash must be {FILE_HASH_HEX_LEN} hex characters, got {file_hash:?}"
            )));
        }

        Ok(FileCommitment {
            file_hash,
            filename: filename.to_string(),
            sender: sender.to_string(),
        })
    }

    /// Commit to raw file contents
    pub fn from_contents(sender: &str, filename: &str, contents: &[u8]) -> Result<FileCommitment> {
        let file_hash = HEXLOWER.encode(&sha256_digest(contents));
        Self::new(sender, filename, &file_hash)
    }

    pub fn get_file_hash(&self) -> &str {
        self.file_hash.as_str()
    }

    pub fn get_filename(&self) -> &str {
        self.filename.as_str()
    }

    pub fn get_sender(&self) -> &str {
        self.sender.as_str()
    }

    /// Whether `contents` is the file this commitment was made for
    pub fn matches(&self, contents: &[u8]) -> bool {
        HEXLOWER.encode(&sha256_digest(contents)) == self.file_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;

    #[test]
    fn test_commitment_from_contents() {
        let sender = Wallet::new().unwrap().get_address();
        let commitment = FileCommitment::from_contents(&sender, "notes.txt", b"abc").unwrap();
        assert_eq!(
            commitment.get_file_hash(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(commitment.get_filename(), "notes.txt");
        assert_eq!(commitment.get_sender(), sender);
        assert!(commitment.matches(b"abc"));
        assert!(!commitment.matches(b"abd"));
    }

    #[test]
    fn test_commitment_rejects_bad_fields() {
        let sender = Wallet::new().unwrap().get_address();
        assert!(FileCommitment::new("nobody", "a.txt", &"0".repeat(64)).is_err());
        assert!(FileCommitment::new(&sender, "", &"0".repeat(64)).is_err());
        assert!(FileCommitment::new(&sender, "a.txt", "abc").is_err());
        assert!(FileCommitment::new(&sender, "a.txt", &"z".repeat(64)).is_err());
    }

    #[test]
    fn test_uppercase_hash_is_normalised() {
        let sender = Wallet::new().unwrap().get_address();
        let commitment = FileCommitment::new(&sender, "a.bin", &"AB".repeat(32)).unwrap();
        assert_eq!(commitment.get_file_hash(), "ab".repeat(32));
    }
}
