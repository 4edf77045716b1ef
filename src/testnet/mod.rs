//! Test helpers
//!
//! Throwaway ledgers in temporary directories, low difficulty and chain
//! integrity checks shared by the unit tests.

pub mod test_utils;

pub use test_utils::*;
