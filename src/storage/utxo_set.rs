use crate::core::{Block, Ledger, TXOutput};
use crate::error::{LedgerError, Result};
use crate::storage::tx_index;
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, ConflictableTransactionResult};
use sled::Transactional;
use std::collections::{BTreeMap, HashMap, HashSet};

/// An output that has not been consumed, remembered with its position in the
/// transaction that created it
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct UnspentOutput {
    index: usize,
    output: TXOutput,
}

impl UnspentOutput {
    pub fn new(index: usize, output: TXOutput) -> UnspentOutput {
        UnspentOutput { index, output }
    }

    pub fn get_index(&self) -> usize {
        self.index
    }

    pub fn get_output(&self) -> &TXOutput {
        &self.output
    }
}

/// Persisted index of unspent outputs, keyed by transaction id.
/// Entirely derived from the chain and rebuildable with [`UTXOSet::reindex`].
pub struct UTXOSet {
    ledger: Ledger,
}

impl UTXOSet {
    pub fn new(ledger: Ledger) -> UTXOSet {
        UTXOSet { ledger }
    }

    pub fn get_ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn entries(&self) -> impl Iterator<Item = Result<(Vec<u8>, Vec<UnspentOutput>)>> {
        self.ledger
            .get_store()
            .chainstate()
            .iter()
            .map(|item| -> Result<(Vec<u8>, Vec<UnspentOutput>)> {
                let (k, v) = item?;
                let outs: Vec<UnspentOutput> = deserialize(v.as_ref())?;
                Ok((k.to_vec(), outs))
            })
    }

    /// Gather outputs locked to `pub_key_hash` until they cover `amount`.
    /// Returns the accumulated value and hex txid to output indices.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0u64;

        for entry in self.entries() {
            let (txid, outs) = entry?;
            let txid_hex = HEXLOWER.encode(txid.as_slice());
            for out in outs {
                if accumulated >= amount {
                    return Ok((accumulated, unspent_outputs));
                }
                if out.output.is_locked_with_key(pub_key_hash) {
                    accumulated = accumulated.saturating_add(out.output.get_value());
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(out.index);
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        for entry in self.entries() {
            let (_, outs) = entry?;
            utxos.extend(
                outs.into_iter()
                    .map(|out| out.output)
                    .filter(|out| out.is_locked_with_key(pub_key_hash)),
            );
        }
        Ok(utxos)
    }

    pub fn get_balance(&self, pub_key_hash: &[u8]) -> Result<u64> {
        Ok(self
            .find_utxo(pub_key_hash)?
            .iter()
            .map(TXOutput::get_value)
            .sum())
    }

    /// Number of transactions with at least one unspent output
    pub fn count_transactions(&self) -> Result<u64> {
        let mut counter = 0;
        for item in self.ledger.get_store().chainstate().iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Ordered copy of the whole index
    pub fn snapshot(&self) -> Result<BTreeMap<Vec<u8>, Vec<UnspentOutput>>> {
        self.entries().collect()
    }

    /// Rebuild the index and the transaction index from the main chain,
    /// replacing both in one store transaction
    pub fn reindex(&self) -> Result<()> {
        let store = self.ledger.get_store();

        let utxo_entries = self
            .ledger
            .find_utxo()?
            .into_iter()
            .map(|(txid, outs)| -> Result<(Vec<u8>, Vec<u8>)> {
                Ok((txid, serialize(&outs)?))
            })
            .collect::<Result<Vec<(Vec<u8>, Vec<u8>)>>>()?;
        let locations = self.ledger.find_transaction_locations()?;

        let stale_utxo_keys = store
            .chainstate()
            .iter()
            .keys()
            .collect::<std::result::Result<Vec<_>, sled::Error>>()?;
        let stale_index_keys = store
            .tx_index()
            .iter()
            .keys()
            .collect::<std::result::Result<Vec<_>, sled::Error>>()?;

        (store.chainstate(), store.tx_index()).transaction(
            |(utxo_db, index_db)| -> ConflictableTransactionResult<(), LedgerError> {
                for key in &stale_utxo_keys {
                    utxo_db.remove(key.clone())?;
                }
                for key in &stale_index_keys {
                    index_db.remove(key.clone())?;
                }
                for (txid, outs) in &utxo_entries {
                    utxo_db.insert(txid.as_slice(), outs.as_slice())?;
                }
                for (txid, block_hash) in &locations {
                    index_db.insert(txid.as_slice(), block_hash.as_slice())?;
                }
                Ok(())
            },
        )?;
        store.flush_if_sync()?;

        info!(
            "Reindexed UTXO set: {} transactions with unspent outputs",
            utxo_entries.len()
        );
        Ok(())
    }

    /// Apply one newly appended block: drop the outputs it consumes, add the
    /// ones it creates. Gives the same result as a full reindex.
    pub fn update(&self, block: &Block) -> Result<()> {
        if block.is_file_block() {
            return Ok(());
        }
        let store = self.ledger.get_store();

        let mut spent: HashMap<Vec<u8>, HashSet<usize>> = HashMap::new();
        for tx in block.get_transactions().iter().filter(|tx| !tx.is_coinbase()) {
            for vin in tx.get_vin() {
                spent
                    .entry(vin.get_txid().to_vec())
                    .or_default()
                    .insert(vin.get_vout());
            }
        }

        let mut created = Vec::new();
        for tx in block.get_transactions() {
            let consumed = spent.remove(tx.get_id());
            let outs: Vec<UnspentOutput> = tx
                .get_vout()
                .iter()
                .enumerate()
                .filter(|(idx, _)| !consumed.as_ref().is_some_and(|vouts| vouts.contains(idx)))
                .map(|(idx, out)| UnspentOutput::new(idx, out.clone()))
                .collect();
            if !outs.is_empty() {
                created.push((tx.get_id_bytes(), serialize(&outs)?));
            }
        }

        (store.chainstate(), store.tx_index()).transaction(
            |(utxo_db, index_db)| -> ConflictableTransactionResult<(), LedgerError> {
                for (txid, vouts) in &spent {
                    let outs_bytes = match utxo_db.get(txid)? {
                        Some(bytes) => bytes,
                        None => {
                            warn!(
                                "UTXO entry {} missing while applying block {}",
                                HEXLOWER.encode(txid),
                                block.get_hash_hex()
                            );
                            continue;
                        }
                    };
                    let outs: Vec<UnspentOutput> = deserialize(outs_bytes.as_ref())
                        .map_err(ConflictableTransactionError::Abort)?;
                    let remaining: Vec<UnspentOutput> = outs
                        .into_iter()
                        .filter(|out| !vouts.contains(&out.index))
                        .collect();

                    if remaining.is_empty() {
                        utxo_db.remove(txid.as_slice())?;
                    } else {
                        let bytes = serialize(&remaining)
                            .map_err(ConflictableTransactionError::Abort)?;
                        utxo_db.insert(txid.as_slice(), bytes)?;
                    }
                }

                for (txid, outs) in &created {
                    utxo_db.insert(txid.as_slice(), outs.as_slice())?;
                }
                tx_index::index_block(index_db, block)?;
                Ok(())
            },
        )?;
        self.ledger.get_store().flush_if_sync()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Transaction, SUBSIDY};
    use crate::testnet::test_utils::create_test_ledger;
    use crate::wallet::Wallet;

    #[test]
    fn test_reindex_after_genesis() {
        let (ledger, _dir, wallet) = create_test_ledger();
        let utxo_set = UTXOSet::new(ledger);
        utxo_set.reindex().unwrap();

        assert_eq!(utxo_set.count_transactions().unwrap(), 1);
        assert_eq!(
            utxo_set.get_balance(&wallet.get_pub_key_hash()).unwrap(),
            SUBSIDY
        );
        assert_eq!(
            utxo_set
                .get_balance(&Wallet::new().unwrap().get_pub_key_hash())
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_spendable_outputs_stop_once_covered() {
        let (ledger, _dir, wallet) = create_test_ledger();
        let address = wallet.get_address();
        for _ in 0..3 {
            let coinbase = Transaction::new_coinbase_tx(&address, "").unwrap();
            ledger.mine_block(&[coinbase]).unwrap();
        }
        let utxo_set = UTXOSet::new(ledger);
        utxo_set.reindex().unwrap();

        let (accumulated, outputs) = utxo_set
            .find_spendable_outputs(&wallet.get_pub_key_hash(), SUBSIDY + 1)
            .unwrap();
        assert_eq!(accumulated, 2 * SUBSIDY);
        assert_eq!(outputs.values().map(Vec::len).sum::<usize>(), 2);
    }

    #[test]
    fn test_update_keeps_original_output_index() {
        let (ledger, _dir, wallet) = create_test_ledger();
        let utxo_set = UTXOSet::new(ledger.clone());
        utxo_set.reindex().unwrap();

        let recipient = Wallet::new().unwrap();
        let tx =
            Transaction::new_utxo_transaction(&wallet, &recipient.get_address(), 10, &utxo_set)
                .unwrap();
        let block = ledger.mine_block(std::slice::from_ref(&tx)).unwrap();
        utxo_set.update(&block).unwrap();

        let snapshot = utxo_set.snapshot().unwrap();
        let entry = &snapshot[tx.get_id()];
        assert_eq!(entry.len(), 2);
        assert_eq!(entry[1].get_index(), 1);
        assert_eq!(entry[1].get_output().get_value(), SUBSIDY - 10);

        // spending the change output (index 1) must leave index 0 untouched
        let change_spend = Transaction::new_utxo_transaction(
            &wallet,
            &recipient.get_address(),
            SUBSIDY - 10,
            &utxo_set,
        )
        .unwrap();
        assert_eq!(change_spend.get_vin()[0].get_vout(), 1);
        let block = ledger.mine_block(&[change_spend]).unwrap();
        utxo_set.update(&block).unwrap();

        let updated = utxo_set.snapshot().unwrap();
        assert_eq!(updated[tx.get_id()], vec![entry[0].clone()]);
        assert_eq!(utxo_set.get_balance(&wallet.get_pub_key_hash()).unwrap(), 0);
        assert_eq!(
            utxo_set.get_balance(&recipient.get_pub_key_hash()).unwrap(),
            SUBSIDY
        );
    }

    #[test]
    fn test_update_indexes_transactions() {
        let (ledger, _dir, wallet) = create_test_ledger();
        let utxo_set = UTXOSet::new(ledger.clone());
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), "").unwrap();
        let block = ledger.mine_block(std::slice::from_ref(&coinbase)).unwrap();
        utxo_set.update(&block).unwrap();

        assert_eq!(
            tx_index::lookup(ledger.get_store().tx_index(), coinbase.get_id())
                .unwrap()
                .as_deref(),
            Some(block.get_hash())
        );
    }
}
