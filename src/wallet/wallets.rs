use crate::error::{LedgerError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use log::info;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Address-keyed wallet collection backed by one bincode file per node
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    path: PathBuf,
}

impl Wallets {
    /// Load the wallet file at `path`, starting empty when it does not exist yet
    pub fn load(path: &Path) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            path: path.to_path_buf(),
        };
        if path.exists() {
            let buf = fs::read(path)?;
            wallets.wallets = deserialize(&buf[..])?;
        }
        Ok(wallets)
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        info!("Created wallet {address}");
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.wallets.keys().cloned().collect();
        addresses.sort();
        addresses
    }

    pub fn get_wallet(&self, address: &str) -> Result<&Wallet> {
        self.wallets
            .get(address)
            .ok_or_else(|| LedgerError::Wallet(format!("Wallet not found for address: {address}")))
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        let wallets_bytes = serialize(&self.wallets)?;
        writer.write_all(wallets_bytes.as_slice())?;
        writer.flush()?;
        Ok(())
    }
}
