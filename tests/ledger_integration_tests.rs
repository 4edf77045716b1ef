//! Ledger integration tests
//!
//! Drives the public API end to end against real sled stores in temporary
//! directories: value transfer, fork choice, persistence, the UTXO index and
//! recovery after an unclean shutdown.

use ledger_chain::core::{Block, CancelToken, FileCommitment, Ledger, MiningJob, Transaction};
use ledger_chain::core::{TXInput, TXOutput, SUBSIDY};
use ledger_chain::storage::{tx_index, MemoryPool, UTXOSet};
use ledger_chain::wallet::{Wallet, Wallets};
use ledger_chain::{mine_memory_pool, Config, LedgerError};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const DIFFICULTY: u32 = 8;

fn config(dir: &Path) -> Config {
    Config::default()
        .with_data_dir(dir)
        .with_node_id("it")
        .with_difficulty(DIFFICULTY)
}

fn new_chain() -> (Ledger, UTXOSet, Wallet, TempDir) {
    let dir = tempdir().unwrap();
    let wallet = Wallet::new().unwrap();
    let ledger = Ledger::init(&wallet.get_address(), &config(dir.path())).unwrap();
    let utxo_set = UTXOSet::new(ledger.clone());
    utxo_set.reindex().unwrap();
    (ledger, utxo_set, wallet, dir)
}

/// Transfer `amount` and mine it with a coinbase paying the sender
fn send(ledger: &Ledger, utxo_set: &UTXOSet, from: &Wallet, to: &str, amount: u64) -> Block {
    let tx = Transaction::new_utxo_transaction(from, to, amount, utxo_set).unwrap();
    let coinbase = Transaction::new_coinbase_tx(&from.get_address(), "").unwrap();
    let block = ledger.mine_block(&[coinbase, tx]).unwrap();
    utxo_set.update(&block).unwrap();
    block
}

/// Coinbase-only blocks built on `base` but not stored anywhere
fn side_chain(base: &Block, length: usize, address: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::with_capacity(length);
    let mut parent = base.clone();
    for _ in 0..length {
        let coinbase = Transaction::new_coinbase_tx(address, "").unwrap();
        let block = Block::new_block(
            parent.get_hash().to_vec(),
            &[coinbase],
            parent.get_height() + 1,
            DIFFICULTY,
        )
        .unwrap();
        parent = block.clone();
        blocks.push(block);
    }
    blocks
}

#[test]
fn test_send_updates_balances() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let bob = Wallet::new().unwrap();
    let k = 7;

    send(&ledger, &utxo_set, &alice, &bob.get_address(), k);
    utxo_set.reindex().unwrap();

    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        SUBSIDY - k + SUBSIDY
    );
    assert_eq!(utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(), k);
}

#[test]
fn test_traversal_visits_every_block_down_to_genesis() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let bob = Wallet::new().unwrap();
    let n = 3;
    for i in 0..n {
        send(&ledger, &utxo_set, &alice, &bob.get_address(), i as u64 + 1);
    }

    let blocks: Vec<Block> = ledger.iterator().collect::<Result<_, _>>().unwrap();
    assert_eq!(blocks.len(), n + 1);
    assert_eq!(blocks[0].get_hash(), ledger.get_tip_hash().as_slice());
    assert!(blocks[n].is_genesis());
    for pair in blocks.windows(2) {
        assert_eq!(pair[0].get_pre_block_hash(), pair[1].get_hash());
        assert_eq!(pair[0].get_height(), pair[1].get_height() + 1);
    }
    assert_eq!(ledger.get_block_hashes().unwrap().len(), n + 1);
}

#[test]
fn test_fork_choice_prefers_strictly_higher_blocks() {
    let (ledger, _utxo_set, alice, _dir) = new_chain();
    let genesis = ledger.get_block(&ledger.get_tip_hash()).unwrap();

    let mined = ledger
        .mine_block(&[Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap()])
        .unwrap();
    let fork = side_chain(&genesis, 2, &alice.get_address());

    // same height as the tip: stored, tip stays with the first writer
    assert!(!ledger.add_block(&fork[0]).unwrap());
    assert_eq!(ledger.get_tip_hash(), mined.get_hash());
    assert!(ledger.block_exists(fork[0].get_hash()).unwrap());

    // one higher: the fork takes over
    assert!(ledger.add_block(&fork[1]).unwrap());
    assert_eq!(ledger.get_tip_hash(), fork[1].get_hash());
    assert_eq!(ledger.get_best_height().unwrap(), 2);

    // adding a known block again changes nothing
    assert!(!ledger.add_block(&fork[1]).unwrap());
    assert_eq!(ledger.get_tip_hash(), fork[1].get_hash());

    let main_chain: Vec<Vec<u8>> = ledger.get_block_hashes().unwrap();
    assert!(!main_chain.contains(&mined.get_hash().to_vec()));
}

#[test]
fn test_add_block_rejects_orphans_and_height_gaps() {
    let (ledger, _utxo_set, alice, _dir) = new_chain();
    let genesis = ledger.get_block(&ledger.get_tip_hash()).unwrap();
    let fork = side_chain(&genesis, 2, &alice.get_address());

    // parent never seen
    assert!(matches!(
        ledger.add_block(&fork[1]),
        Err(LedgerError::InvalidBlock(_))
    ));

    // parent known, height skips ahead
    let skipped = Block::new_block(
        genesis.get_hash().to_vec(),
        &[Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap()],
        5,
        DIFFICULTY,
    )
    .unwrap();
    assert!(matches!(
        ledger.add_block(&skipped),
        Err(LedgerError::InvalidBlock(_))
    ));
    assert!(!ledger.block_exists(skipped.get_hash()).unwrap());
    assert_eq!(ledger.get_best_height().unwrap(), 0);
}

#[test]
fn test_add_block_rejects_parentless_blocks() {
    let (ledger, _utxo_set, alice, _dir) = new_chain();
    let mined = ledger
        .mine_block(&[Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap()])
        .unwrap();

    for height in [0, 5] {
        let parentless = Block::new_block(
            vec![],
            &[Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap()],
            height,
            DIFFICULTY,
        )
        .unwrap();
        assert!(matches!(
            ledger.add_block(&parentless),
            Err(LedgerError::InvalidBlock(_))
        ));
        assert!(!ledger.block_exists(parentless.get_hash()).unwrap());
    }

    assert_eq!(ledger.get_tip_hash(), mined.get_hash());
    assert_eq!(ledger.get_best_height().unwrap(), 1);
    assert_eq!(ledger.get_block_hashes().unwrap().len(), 2);
}

#[test]
fn test_outputs_of_a_displaced_branch_cannot_be_spent() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let bob = Wallet::new().unwrap();
    let genesis = ledger.get_block(&ledger.get_tip_hash()).unwrap();

    let reward = Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap();
    let mined = ledger.mine_block(&[reward.clone()]).unwrap();
    utxo_set.update(&mined).unwrap();

    // signed while the reward is still on the main chain
    let mut spend = Transaction::from_parts(
        vec![TXInput::new(reward.get_id(), 0, alice.get_public_key())],
        vec![TXOutput::new(SUBSIDY, &bob.get_address()).unwrap()],
    )
    .unwrap();
    ledger
        .sign_transaction(&mut spend, alice.get_pkcs8())
        .unwrap();
    assert!(ledger.verify_transaction(&spend).unwrap());

    let fork = side_chain(&genesis, 2, &bob.get_address());
    assert!(!ledger.add_block(&fork[0]).unwrap());
    assert!(ledger.add_block(&fork[1]).unwrap());
    assert!(!ledger.is_on_main_chain(&mined).unwrap());

    // the switch dropped the index entry; a leftover one is not trusted either
    let index = ledger.get_store().tx_index();
    assert_eq!(tx_index::lookup(index, reward.get_id()).unwrap(), None);
    index.insert(reward.get_id(), mined.get_hash()).unwrap();
    assert!(matches!(
        ledger.find_transaction(reward.get_id()),
        Err(LedgerError::TransactionNotFound(_))
    ));

    assert!(!ledger.verify_transaction(&spend).unwrap());
    assert!(matches!(
        ledger.mine_block(&[spend]),
        Err(LedgerError::InvalidTransaction(_))
    ));
    assert_eq!(ledger.get_tip_hash(), fork[1].get_hash());

    utxo_set.reindex().unwrap();
    assert_eq!(
        utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(),
        2 * SUBSIDY
    );
    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        SUBSIDY
    );
}

#[test]
fn test_chain_survives_reopen() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let alice = Wallet::new().unwrap();

    let (tip, height) = {
        let ledger = Ledger::init(&alice.get_address(), &cfg).unwrap();
        let coinbase = Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap();
        ledger.mine_block(&[coinbase]).unwrap();
        (ledger.get_tip_hash(), ledger.get_best_height().unwrap())
    };

    let reopened = Ledger::open(&cfg).unwrap();
    assert_eq!(reopened.get_tip_hash(), tip);
    assert_eq!(reopened.get_best_height().unwrap(), height);
    drop(reopened);

    assert!(matches!(
        Ledger::init(&alice.get_address(), &cfg),
        Err(LedgerError::ChainAlreadyExists(_))
    ));
}

#[test]
fn test_open_without_chain() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        Ledger::open(&config(dir.path())),
        Err(LedgerError::ChainNotFound(_))
    ));
}

#[test]
fn test_incremental_utxo_matches_reindex() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let bob = Wallet::new().unwrap();

    send(&ledger, &utxo_set, &alice, &bob.get_address(), 10);
    let commitment =
        FileCommitment::from_contents(&bob.get_address(), "notes.txt", b"hello ledger").unwrap();
    let file_block = ledger.add_file_block(commitment).unwrap();
    utxo_set.update(&file_block).unwrap();
    send(&ledger, &utxo_set, &bob, &alice.get_address(), 4);
    send(&ledger, &utxo_set, &alice, &bob.get_address(), SUBSIDY);

    let incremental = utxo_set.snapshot().unwrap();
    utxo_set.reindex().unwrap();
    assert_eq!(utxo_set.snapshot().unwrap(), incremental);

    assert_eq!(
        utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(),
        6 + 2 * SUBSIDY
    );
    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        2 * SUBSIDY - 6
    );
}

#[test]
fn test_file_block_sits_between_transaction_blocks() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let contents = b"archived report";
    let commitment =
        FileCommitment::from_contents(&alice.get_address(), "report.pdf", contents).unwrap();

    let file_block = ledger.add_file_block(commitment.clone()).unwrap();
    assert!(file_block.is_file_block());
    assert_eq!(file_block.get_height(), 1);
    assert_eq!(file_block.get_nonce(), 0);
    assert_eq!(file_block.get_difficulty(), 0);
    assert!(file_block.validate().is_ok());
    assert!(file_block.get_transactions().is_empty());
    assert!(file_block.get_file_commitment().unwrap().matches(contents));

    let block = send(&ledger, &utxo_set, &alice, &Wallet::new().unwrap().get_address(), 1);
    assert_eq!(block.get_height(), 2);
    assert_eq!(block.get_pre_block_hash(), file_block.get_hash());

    let stored = ledger.get_block(file_block.get_hash()).unwrap();
    assert_eq!(stored.get_file_commitment(), Some(&commitment));
}

#[test]
fn test_stale_lock_switches_to_sync_writes() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());
    let alice = Wallet::new().unwrap();
    drop(Ledger::init(&alice.get_address(), &cfg).unwrap());

    let lock_path = cfg.db_path().join("LOCK");
    assert!(!lock_path.exists());
    fs::write(&lock_path, b"12345\n").unwrap();

    let ledger = Ledger::open(&cfg).unwrap();
    assert!(ledger.get_store().is_sync_writes());
    assert!(lock_path.exists());
    assert_eq!(ledger.get_best_height().unwrap(), 0);
    drop(ledger);
    assert!(!lock_path.exists());

    let clean = Ledger::open(&cfg).unwrap();
    assert!(!clean.get_store().is_sync_writes());
}

#[test]
fn test_cancelled_mining_leaves_tip_alone() {
    let (ledger, _utxo_set, alice, _dir) = new_chain();
    let tip = ledger.get_tip_hash();
    let coinbase = Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap();

    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(
        ledger.mine_block_with_cancel(&[coinbase], &cancel),
        Err(LedgerError::MiningCancelled)
    ));
    assert_eq!(ledger.get_tip_hash(), tip);
}

#[test]
fn test_mining_job_can_be_cancelled() {
    let dir = tempdir().unwrap();
    let alice = Wallet::new().unwrap();
    drop(Ledger::init(&alice.get_address(), &config(dir.path())).unwrap());

    // a target nobody will hit in this test's lifetime
    let hard = config(dir.path()).with_difficulty(200);
    let ledger = Ledger::open(&hard).unwrap();
    let tip = ledger.get_tip_hash();

    let coinbase = Transaction::new_coinbase_tx(&alice.get_address(), "").unwrap();
    let job = MiningJob::spawn(ledger.clone(), vec![coinbase]).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!job.is_finished());
    job.cancel();

    assert!(matches!(job.join(), Err(LedgerError::MiningCancelled)));
    assert_eq!(ledger.get_tip_hash(), tip);
}

#[test]
fn test_forged_inputs_are_rejected_by_mining() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let mallory = Wallet::new().unwrap();
    let genesis = ledger.get_block(&ledger.get_tip_hash()).unwrap();
    let genesis_tx = &genesis.get_transactions()[0];

    // unsigned spend of alice's genesis output
    let unsigned = Transaction::from_parts(
        vec![TXInput::new(genesis_tx.get_id(), 0, alice.get_public_key())],
        vec![TXOutput::new(SUBSIDY, &mallory.get_address()).unwrap()],
    )
    .unwrap();
    assert!(!ledger.verify_transaction(&unsigned).unwrap());
    assert!(matches!(
        ledger.mine_block(&[unsigned]),
        Err(LedgerError::InvalidTransaction(_))
    ));

    // signed by mallory with mallory's own key
    let mut stolen = Transaction::from_parts(
        vec![TXInput::new(genesis_tx.get_id(), 0, mallory.get_public_key())],
        vec![TXOutput::new(SUBSIDY, &mallory.get_address()).unwrap()],
    )
    .unwrap();
    ledger
        .sign_transaction(&mut stolen, mallory.get_pkcs8())
        .unwrap();
    assert!(!ledger.verify_transaction(&stolen).unwrap());
    assert!(ledger.mine_block(&[stolen]).is_err());

    assert_eq!(ledger.get_best_height().unwrap(), 0);
    assert_eq!(
        utxo_set.get_balance(&alice.get_pub_key_hash()).unwrap(),
        SUBSIDY
    );
}

#[test]
fn test_spent_output_cannot_be_spent_again() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let bob = Wallet::new().unwrap();

    let first = Transaction::new_utxo_transaction(&alice, &bob.get_address(), 5, &utxo_set).unwrap();
    let replay =
        Transaction::new_utxo_transaction(&alice, &bob.get_address(), 6, &utxo_set).unwrap();
    ledger.mine_block(&[first]).unwrap();

    assert!(matches!(
        ledger.mine_block(&[replay]),
        Err(LedgerError::InvalidTransaction(_))
    ));
    assert_eq!(ledger.get_best_height().unwrap(), 1);
}

#[test]
fn test_memory_pool_round() {
    let (ledger, utxo_set, alice, _dir) = new_chain();
    let miner = Wallet::new().unwrap();
    let bob = Wallet::new().unwrap();
    let pool = MemoryPool::new();

    pool.add(Transaction::new_utxo_transaction(&alice, &bob.get_address(), 20, &utxo_set).unwrap());
    let block = mine_memory_pool(&utxo_set, &pool, &miner.get_address())
        .unwrap()
        .unwrap();

    assert!(block.get_transactions()[0].is_coinbase());
    assert!(pool.is_empty());
    assert_eq!(ledger.get_tip_hash(), block.get_hash());
    assert_eq!(utxo_set.get_balance(&bob.get_pub_key_hash()).unwrap(), 20);
    assert_eq!(utxo_set.get_balance(&miner.get_pub_key_hash()).unwrap(), SUBSIDY);

    let found = ledger.find_transaction(block.get_transactions()[1].get_id()).unwrap();
    assert_eq!(&found, &block.get_transactions()[1]);
}

#[test]
fn test_wallet_file_per_node() {
    let dir = tempdir().unwrap();
    let cfg = config(dir.path());

    let address = {
        let mut wallets = Wallets::load(&cfg.wallet_path()).unwrap();
        wallets.create_wallet().unwrap()
    };

    let wallets = Wallets::load(&cfg.wallet_path()).unwrap();
    assert_eq!(wallets.get_addresses(), vec![address.clone()]);
    assert_eq!(wallets.get_wallet(&address).unwrap().get_address(), address);

    let other_node = Wallets::load(&cfg.clone().with_node_id("other").wallet_path()).unwrap();
    assert!(other_node.get_addresses().is_empty());
}
