use crate::error::{LedgerError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

static DEFAULT_DATA_DIR: &str = "./tmp";
static DEFAULT_NODE_ID: &str = "3000";
pub const DEFAULT_DIFFICULTY: u32 = 12;
pub const MAX_DIFFICULTY: u32 = 255;

const DATA_DIR_KEY: &str = "DATA_DIR";
const NODE_ID_KEY: &str = "NODE_ID";
const DIFFICULTY_KEY: &str = "POW_DIFFICULTY";

/// Node settings. Built once at startup and handed to whatever opens the ledger.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for the store, wallet file and uploads
    pub data_dir: PathBuf,
    /// Distinguishes several nodes sharing one data directory
    pub node_id: String,
    /// Number of leading zero bits required of a transaction block hash
    pub difficulty: u32,
    /// Flush the store after every committed write
    pub sync_writes: bool,
    /// Where uploaded files are copied before their commitment is recorded
    pub upload_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            node_id: String::from(DEFAULT_NODE_ID),
            difficulty: DEFAULT_DIFFICULTY,
            sync_writes: false,
            upload_dir: None,
        }
    }
}

impl Config {
    /// Defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Config> {
        let mut config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)
            .map_err(|e| LedgerError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = env::var(DATA_DIR_KEY) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            self.node_id = node_id;
        }
        if let Ok(difficulty) = env::var(DIFFICULTY_KEY) {
            self.difficulty = difficulty.parse().map_err(|e| {
                LedgerError::Config(format!("{DIFFICULTY_KEY} must be an integer: {e}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(LedgerError::Config(format!(
                "Difficulty {} is outside valid range [0, {MAX_DIFFICULTY}]",
                self.difficulty
            )));
        }
        if self.node_id.is_empty() {
            return Err(LedgerError::Config("Node id must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Config {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Config {
        self.node_id = node_id.into();
        self
    }

    pub fn with_difficulty(mut self, difficulty: u32) -> Config {
        self.difficulty = difficulty;
        self
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Config {
        self.sync_writes = sync_writes;
        self
    }

    /// Store directory for this node (e.g. "./tmp/blocks_3000")
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("blocks_{}", self.node_id))
    }

    /// Wallet file for this node (e.g. "./tmp/wallets_3000.dat")
    pub fn wallet_path(&self) -> PathBuf {
        self.data_dir.join(format!("wallets_{}.dat", self.node_id))
    }

    pub fn upload_path(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }
}
