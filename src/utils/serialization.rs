// Canonical byte encoding for everything that goes into the store or into a hash preimage
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};

/// Serialize data using bincode 2.0 with standard configuration
pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::encode_to_vec(data, config)
        .map_err(|e| LedgerError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize data using bincode 2.0 with standard configuration
pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let config = bincode::config::standard();
    let (data, _) = bincode::decode_from_slice(bytes, config)
        .map_err(|e| LedgerError::Serialization(format!("Deserialization failed: {e}")))?;
    Ok(data)
}
