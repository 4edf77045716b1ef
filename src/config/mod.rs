//! Configuration management
//!
//! Node settings: where the store lives, which node id it belongs to and the
//! proof-of-work difficulty. Passed explicitly to the ledger, never global.

pub mod settings;

pub use settings::{Config, DEFAULT_DIFFICULTY, MAX_DIFFICULTY};
