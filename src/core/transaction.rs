// Transactions move value by consuming earlier outputs and creating new ones.
// Each input is signed over a trimmed copy of the transaction, so a signature
// covers every output but never another input's signature.

use crate::core::SUBSIDY;
use crate::error::{LedgerError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, serialize,
    sha256_digest,
};
use crate::wallet::{address_to_pub_key_hash, hash_pub_key, Wallet};
use data_encoding::HEXLOWER;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Note carried by the coinbase of the genesis block
pub const GENESIS_COINBASE_NOTE: &str = "First Transaction from Genesis";

/// Reference to output `vout` of transaction `txid`, plus the spender's proof of ownership
#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: usize,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    /// Unsigned input spending `txid:vout` with the spender's raw public key
    pub fn new(txid: &[u8], vout: usize, pub_key: &[u8]) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: pub_key.to_vec(),
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> usize {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        hash_pub_key(self.pub_key.as_slice()).eq(pub_key_hash)
    }
}

/// An amount locked to a public key hash
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(LedgerError::InvalidTransaction(
                "Output value must be positive".to_string(),
            ));
        }

        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        self.pub_key_hash = address_to_pub_key_hash(address)?;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Mint `SUBSIDY` to `to`. An empty note is replaced by a random UUID so
    /// two coinbases to the same address never share an id.
    pub fn new_coinbase_tx(to: &str, note: &str) -> Result<Transaction> {
        let txout = TXOutput::new(SUBSIDY, to)?;
        let note = if note.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            note.to_string()
        };
        let tx_input = TXInput {
            signature: note.into_bytes(),
            ..Default::default()
        };

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![txout],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Assemble a transaction from already-built inputs and outputs and compute its id
    pub fn from_parts(vin: Vec<TXInput>, vout: Vec<TXOutput>) -> Result<Transaction> {
        let mut tx = Transaction {
            id: vec![],
            vin,
            vout,
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Pay `amount` from `wallet` to `to`, returning any surplus to the wallet's own address
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(LedgerError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }

        let from = wallet.get_address();
        let public_key_hash = wallet.get_pub_key_hash();
        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(public_key_hash.as_slice(), amount)?;

        if accumulated < amount {
            return Err(LedgerError::InsufficientFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                LedgerError::InvalidTransaction(format!("Invalid transaction ID: {e}"))
            })?;
            for out in outs {
                inputs.push(TXInput::new(&txid, out, wallet.get_public_key()));
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        let change = accumulated - amount;
        if change > 0 {
            outputs.push(TXOutput::new(change, &from)?);
        }

        let mut tx = Transaction::from_parts(inputs, outputs)?;
        utxo_set
            .get_ledger()
            .sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout(), &[]))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Digest signed for input `idx`: the trimmed copy with only that input
    /// carrying the referenced output's public key hash
    fn signing_digest(
        tx_copy: &mut Transaction,
        idx: usize,
        prev_output: &TXOutput,
    ) -> Result<Vec<u8>> {
        tx_copy.vin[idx].signature = vec![];
        tx_copy.vin[idx].pub_key = prev_output.pub_key_hash.clone();
        let digest = tx_copy.hash()?;
        tx_copy.vin[idx].pub_key = vec![];
        Ok(digest)
    }

    fn referenced_output<'a>(
        input: &TXInput,
        prev_txs: &'a HashMap<String, Transaction>,
    ) -> Option<&'a TXOutput> {
        prev_txs
            .get(&HEXLOWER.encode(input.get_txid()))
            .and_then(|prev_tx| prev_tx.vout.get(input.vout))
    }

    /// Sign every input. `prev_txs` maps hex txid to each referenced transaction.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let txid_hex = HEXLOWER.encode(vin.get_txid());
            let prev_output = Self::referenced_output(vin, prev_txs).ok_or_else(|| {
                LedgerError::TransactionNotFound(format!("{txid_hex}:{}", vin.vout))
            })?;

            let digest = Self::signing_digest(&mut tx_copy, idx, prev_output)?;
            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, &digest)?;
        }
        Ok(())
    }

    /// Check every input signature. Missing references count as failure.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_output = match Self::referenced_output(vin, prev_txs) {
                Some(output) => output,
                None => {
                    warn!(
                        "Referenced output {}:{} not found during verification",
                        HEXLOWER.encode(vin.get_txid()),
                        vin.vout
                    );
                    return false;
                }
            };

            if !vin.uses_key(prev_output.get_pub_key_hash()) {
                warn!(
                    "Input {idx} key does not own output {}:{}",
                    HEXLOWER.encode(vin.get_txid()),
                    vin.vout
                );
                return false;
            }

            let digest = match Self::signing_digest(&mut tx_copy, idx, prev_output) {
                Ok(digest) => digest,
                Err(e) => {
                    warn!("Failed to rebuild signing payload: {e}");
                    return false;
                }
            };

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                &digest,
            ) {
                return false;
            }
        }
        true
    }

    /// Inputs must carry exactly the value paid out. There are no fees, so
    /// any difference would create or destroy value.
    pub fn verify_balance(&self, prev_txs: &HashMap<String, Transaction>) -> bool {
        if self.is_coinbase() {
            return true;
        }

        let mut input_value = 0u64;
        for vin in &self.vin {
            let prev_output = match Self::referenced_output(vin, prev_txs) {
                Some(output) => output,
                None => return false,
            };
            input_value = match input_value.checked_add(prev_output.get_value()) {
                Some(sum) => sum,
                None => return false,
            };
        }

        match self.get_output_value() {
            Ok(output_value) if output_value == input_value => true,
            Ok(output_value) => {
                warn!("Transaction balance violation: inputs={input_value}, outputs={output_value}");
                false
            }
            Err(_) => false,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty()
    }

    /// Human-readable note of a coinbase transaction
    pub fn coinbase_note(&self) -> Option<String> {
        if !self.is_coinbase() {
            return None;
        }
        Some(String::from_utf8_lossy(&self.vin[0].signature).into_owned())
    }

    /// SHA-256 of the transaction with its id cleared
    pub fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(&tx_copy.serialize()?))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn get_output_value(&self) -> Result<u64> {
        self.vout.iter().try_fold(0u64, |total, vout| {
            total.checked_add(vout.get_value()).ok_or_else(|| {
                LedgerError::InvalidTransaction("Output value overflow".to_string())
            })
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}
