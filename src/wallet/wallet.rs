use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

/// A P-256 key pair. The private half stays in its PKCS#8 form and is wiped on drop.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode, Zeroize, ZeroizeOnDrop)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = crate::utils::new_key_pair()?;
        Self::from_pkcs8(pkcs8)
    }

    /// Rebuild a wallet from existing private key material
    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<Wallet> {
        let public_key = crate::utils::public_key_from_pkcs8(&pkcs8)?;
        Ok(Wallet { pkcs8, public_key })
    }

    pub fn get_address(&self) -> String {
        convert_address(hash_pub_key(self.public_key.as_slice()).as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pub_key_hash(&self) -> Vec<u8> {
        hash_pub_key(self.public_key.as_slice())
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.get_address())
            .finish_non_exhaustive()
    }
}

/// RIPEMD160(SHA256(pub_key))
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = crate::utils::sha256_digest(pub_key);
    crate::utils::ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = crate::utils::sha256_digest(payload);
    let second_sha = crate::utils::sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

pub fn validate_address(address: &str) -> bool {
    let payload = match crate::utils::base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < ADDRESS_CHECK_SUM_LEN + 1 {
        return false;
    }

    let (versioned, actual_checksum) = payload.split_at(payload.len() - ADDRESS_CHECK_SUM_LEN);
    checksum(versioned).as_slice() == actual_checksum
}

/// Extract the public key hash an address locks to
pub fn address_to_pub_key_hash(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    let payload = crate::utils::base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

pub fn convert_address(pub_hash_key: &[u8]) -> String {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend(pub_hash_key);
    let checksum = checksum(payload.as_slice());
    // version + pub_key_hash + checksum
    payload.extend(checksum.as_slice());
    crate::utils::base58_encode(payload.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_address_is_valid() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));
        assert!(address.starts_with('1'));
        assert_eq!(
            address_to_pub_key_hash(&address).unwrap(),
            wallet.get_pub_key_hash()
        );
    }

    #[test]
    fn test_wallet_rebuilt_from_pkcs8() {
        let wallet = Wallet::new().unwrap();
        let rebuilt = Wallet::from_pkcs8(wallet.get_pkcs8().to_vec()).unwrap();
        assert_eq!(wallet.get_public_key(), rebuilt.get_public_key());
        assert_eq!(wallet.get_address(), rebuilt.get_address());
    }

    #[test]
    fn test_tampered_checksum_rejected() {
        let wallet = Wallet::new().unwrap();
        let mut payload = crate::utils::base58_decode(&wallet.get_address()).unwrap();
        let last = payload.len() - 1;
        payload[last] ^= 0x01;
        let tampered = crate::utils::base58_encode(&payload);
        assert!(!validate_address(&tampered));
        assert!(address_to_pub_key_hash(&tampered).is_err());
    }

    #[test]
    fn test_short_or_garbage_addresses_rejected() {
        assert!(!validate_address(""));
        assert!(!validate_address("1"));
        assert!(!validate_address("not-base58-0OIl"));
    }
}
