use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "ledger-chain")]
pub struct Opt {
    #[arg(
        long = "config",
        global = true,
        help = "TOML configuration file (defaults and environment apply otherwise)"
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "createblockchain", about = "Create a new blockchain")]
    Createblockchain {
        #[arg(help = "The address to send genesis block reward to")]
        address: String,
    },
    #[command(name = "createwallet", about = "Create a new wallet")]
    Createwallet,
    #[command(
        name = "getbalance",
        about = "Get the wallet balance of the target address"
    )]
    GetBalance {
        #[arg(help = "The wallet address")]
        address: String,
    },
    #[command(name = "listaddresses", about = "Print local wallet addresses")]
    ListAddresses,
    #[command(
        name = "send",
        about = "Send coins between addresses and mine the transaction"
    )]
    Send {
        #[arg(help = "Source wallet address")]
        from: String,
        #[arg(help = "Destination wallet address")]
        to: String,
        #[arg(help = "Amount to send (in satoshis)")]
        amount: u64,
    },
    #[command(name = "printchain", about = "Print all blocks in the blockchain")]
    Printchain,
    #[command(name = "reindexutxo", about = "Rebuild UTXO index set")]
    Reindexutxo,
    #[command(
        name = "uploadfile",
        about = "Store a file and commit its hash in a new block"
    )]
    UploadFile {
        #[arg(help = "Address of the uploading wallet")]
        sender: String,
        #[arg(help = "Path of the file to upload")]
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_send_with_config() {
        let opt = Opt::parse_from([
            "ledger-chain",
            "send",
            "alice",
            "bob",
            "42",
            "--config",
            "node.toml",
        ]);
        assert_eq!(opt.config, Some(PathBuf::from("node.toml")));
        match opt.command {
            Command::Send { from, to, amount } => {
                assert_eq!(from, "alice");
                assert_eq!(to, "bob");
                assert_eq!(amount, 42);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_uploadfile() {
        let opt = Opt::parse_from(["ledger-chain", "uploadfile", "alice", "notes.txt"]);
        assert!(opt.config.is_none());
        assert!(matches!(
            opt.command,
            Command::UploadFile { ref sender, ref path }
                if sender == "alice" && path == &PathBuf::from("notes.txt")
        ));
    }

    #[test]
    fn test_rejects_negative_amount() {
        assert!(Opt::try_parse_from(["ledger-chain", "send", "a", "b", "-5"]).is_err());
    }
}
