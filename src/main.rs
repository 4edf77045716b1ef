// Entry point for the ledger-chain CLI
use clap::Parser;
use data_encoding::HEXLOWER;
use ledger_chain::core::monetary::conversions;
use ledger_chain::{
    address_to_pub_key_hash, convert_address, hash_pub_key, validate_address, BlockPayload,
    Command, Config, FileCommitment, Ledger, LedgerError, Opt, Transaction, UTXOSet, Wallets,
};
use log::{error, info, LevelFilter};
use std::fs;
use std::process;

fn main() {
    // Info by default, RUST_LOG still wins
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();

    if let Err(e) = run(opt) {
        error!("Error ({:?}): {e}", e.kind());
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), LedgerError> {
    let config = Config::load(opt.config.as_deref())?;
    run_command(opt.command, &config)
}

fn require_address(address: &str) -> Result<(), LedgerError> {
    if !validate_address(address) {
        return Err(LedgerError::InvalidAddress(address.to_string()));
    }
    Ok(())
}

// Each command opens its own handle on the node's store and drops it on return
fn run_command(command: Command, config: &Config) -> Result<(), LedgerError> {
    match command {
        Command::Createblockchain { address } => {
            require_address(&address)?;
            let ledger = Ledger::init(&address, config)?;
            // the UTXO index starts out derived from genesis alone
            let utxo_set = UTXOSet::new(ledger);
            utxo_set.reindex()?;
            println!("Done!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::load(&config.wallet_path())?;
            let address = wallets.create_wallet()?;
            println!("Your new address: {address}")
        }
        Command::GetBalance { address } => {
            require_address(&address)?;
            let pub_key_hash = address_to_pub_key_hash(&address)?;

            let ledger = Ledger::open(config)?;
            let utxo_set = UTXOSet::new(ledger);
            let balance = utxo_set.get_balance(&pub_key_hash)?;
            println!(
                "Balance of {address}: {balance} ({})",
                conversions::format_satoshis(balance)
            );
        }
        Command::ListAddresses => {
            let wallets = Wallets::load(&config.wallet_path())?;
            for address in wallets.get_addresses() {
                println!("{address}")
            }
        }
        Command::Send { from, to, amount } => {
            require_address(&from)?;
            require_address(&to)?;
            if amount == 0 {
                return Err(LedgerError::InvalidTransaction(
                    "Amount must be positive".to_string(),
                ));
            }

            let wallets = Wallets::load(&config.wallet_path())?;
            let wallet = wallets.get_wallet(&from)?;

            let ledger = Ledger::open(config)?;
            let utxo_set = UTXOSet::new(ledger.clone());
            let transaction = Transaction::new_utxo_transaction(wallet, &to, amount, &utxo_set)?;

            // The sender mines the block itself and collects the reward
            let coinbase = Transaction::new_coinbase_tx(&from, "")?;
            let block = ledger.mine_block(&[coinbase, transaction])?;
            utxo_set.update(&block)?;
            println!("Success!")
        }
        Command::Printchain => {
            let ledger = Ledger::open(config)?;
            for block in ledger.iterator() {
                let block = block?;
                println!("Height: {}", block.get_height());
                println!("Pre block hash: {}", HEXLOWER.encode(block.get_pre_block_hash()));
                println!("Cur block hash: {}", block.get_hash_hex());
                println!("Cur block Timestamp: {}", block.get_timestamp());

                match block.get_payload() {
                    BlockPayload::File(commitment) => {
                        println!("- File {}", commitment.get_filename());
                        println!("-- sha256 = {}", commitment.get_file_hash());
                        println!("-- sender = {}", commitment.get_sender());
                    }
                    BlockPayload::Transactions(transactions) => {
                        println!(
                            "Difficulty: {}, nonce: {}",
                            block.get_difficulty(),
                            block.get_nonce()
                        );
                        for tx in transactions {
                            println!("- Transaction txid_hex: {}", HEXLOWER.encode(tx.get_id()));

                            if !tx.is_coinbase() {
                                for input in tx.get_vin() {
                                    let pub_key_hash = hash_pub_key(input.get_pub_key());
                                    println!(
                                        "-- Input txid = {}, vout = {}, from = {}",
                                        HEXLOWER.encode(input.get_txid()),
                                        input.get_vout(),
                                        convert_address(pub_key_hash.as_slice()),
                                    )
                                }
                            }
                            for output in tx.get_vout() {
                                println!(
                                    "-- Output value = {}, to = {}",
                                    output.get_value(),
                                    convert_address(output.get_pub_key_hash()),
                                )
                            }
                        }
                    }
                }
                println!()
            }
        }
        Command::Reindexutxo => {
            let ledger = Ledger::open(config)?;
            let utxo_set = UTXOSet::new(ledger);
            utxo_set.reindex()?;
            let count = utxo_set.count_transactions()?;
            println!("Done! There are {count} transactions in the UTXO set.");
        }
        Command::UploadFile { sender, path } => {
            require_address(&sender)?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .ok_or_else(|| LedgerError::Io(format!("Invalid file path: {}", path.display())))?
                .to_string();
            let contents = fs::read(&path)?;
            let commitment = FileCommitment::from_contents(&sender, &filename, &contents)?;

            let ledger = Ledger::open(config)?;
            let upload_dir = config.upload_path();
            fs::create_dir_all(&upload_dir)?;
            let stored_at = upload_dir.join(&filename);
            fs::write(&stored_at, &contents)?;
            info!("Stored upload at {}", stored_at.display());

            let block = ledger.add_file_block(commitment)?;
            println!(
                "File {filename} committed in block {} (height {})",
                block.get_hash_hex(),
                block.get_height()
            );
        }
    }
    Ok(())
}
