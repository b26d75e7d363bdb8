//! Tally Bridge - CLI for pushing bank statements into Tally ERP.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::time::Duration;
use tallybridge::{
    service::{BridgeService, PushMode},
    statement_format::HdfcStatement,
    store::SqliteStore,
    BridgeConfig, Result, TallyClient, TransactionPatch,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tallybridge")]
#[command(about = "Push HDFC bank statements into Tally ERP", long_about = None)]
struct Cli {
    /// Configuration file (TOML). Defaults are used when absent.
    #[arg(short, long, default_value = "tallybridge.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a statement export and print the transactions as JSON
    Parse {
        /// Statement file
        file: String,
    },
    /// Parse a statement export and store it for review
    Upload {
        /// Statement file
        file: String,
        /// Tally company the statement belongs to (defaults to configured company)
        #[arg(long)]
        company: Option<String>,
        /// Originating bank name
        #[arg(long, default_value = "HDFC")]
        bank: String,
    },
    /// Print a stored statement as JSON
    Show {
        /// Statement id
        id: String,
    },
    /// Apply a JSON file of transaction patches to a stored statement
    Patch {
        /// Statement id
        id: String,
        /// JSON file holding an array of patches
        patches: String,
    },
    /// Push a stored statement to Tally as vouchers
    Push {
        /// Statement id
        id: String,
        /// Send one document for the whole statement instead of one per transaction
        #[arg(long)]
        bulk: bool,
    },
    /// List companies known to the Tally instance
    Companies {
        /// Read the local mirror instead of querying Tally
        #[arg(long)]
        cached: bool,
    },
    /// List the mirrored ledgers of a company
    Ledgers {
        /// Company name (defaults to configured company)
        #[arg(long)]
        company: Option<String>,
    },
    /// List the mirrored ledger groups of a company
    Groups {
        /// Company name (defaults to configured company)
        #[arg(long)]
        company: Option<String>,
    },
    /// Refresh the ledger and group mirrors of a company from Tally
    SyncLedgers {
        /// Company name (defaults to configured company)
        #[arg(long)]
        company: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = BridgeConfig::load(&cli.config)?;

    if let Command::Parse { ref file } = cli.command {
        let mut input = File::open(file)?;
        let statement = HdfcStatement::from_read(&mut input)?;
        println!("{}", serde_json::to_string_pretty(&statement.transactions)?);
        return Ok(());
    }

    let store = SqliteStore::open(&config.db_path)?;
    let client = TallyClient::connect(&config.tally_url, Duration::from_secs(config.timeout_secs))?;
    let default_company = config.company.clone();
    let mut service = BridgeService::new(store, client, config);

    match cli.command {
        Command::Parse { .. } => unreachable!("handled above"),
        Command::Upload {
            file,
            company,
            bank,
        } => {
            let mut input = File::open(&file)?;
            let company = company.unwrap_or(default_company);
            let statement = service.upload_statement(&mut input, &company, &bank)?;
            println!(
                "stored statement {} with {} transactions",
                statement.id,
                statement.transactions.len()
            );
        }
        Command::Show { id } => {
            let statement = service.get_statement(&id)?;
            println!("{}", serde_json::to_string_pretty(&statement)?);
        }
        Command::Patch { id, patches } => {
            let file = File::open(&patches)?;
            let patches: Vec<TransactionPatch> = serde_json::from_reader(file)?;
            let report = service.patch_transactions(&id, &patches)?;
            for unknown in &report.unknown_ids {
                eprintln!("no transaction with id {}", unknown);
            }
            println!("{}", serde_json::to_string_pretty(&report.statement)?);
        }
        Command::Push { id, bulk } => {
            let mode = if bulk {
                PushMode::Bulk
            } else {
                PushMode::PerTransaction
            };
            let report = service.push_statement(&id, mode)?;
            for result in &report.results {
                println!("{:?}: {:?}", result.transaction_ids, result.outcome);
            }
            if !report.is_all_success() {
                std::process::exit(2);
            }
        }
        Command::Companies { cached } => {
            let companies = if cached {
                service.list_companies()?
            } else {
                service.companies()?
            };
            for company in companies {
                println!("{}", company.name);
            }
        }
        Command::Ledgers { company } => {
            let company = company.unwrap_or(default_company);
            for ledger in service.list_ledgers(&company)? {
                match ledger.parent {
                    Some(parent) => println!("{} ({})", ledger.name, parent),
                    None => println!("{}", ledger.name),
                }
            }
        }
        Command::Groups { company } => {
            let company = company.unwrap_or(default_company);
            for group in service.list_groups(&company)? {
                match group.parent {
                    Some(parent) => println!("{} ({})", group.name, parent),
                    None => println!("{}", group.name),
                }
            }
        }
        Command::SyncLedgers { company } => {
            let company = company.unwrap_or(default_company);
            let ledgers = service.sync_ledgers(&company)?;
            let groups = service.sync_groups(&company)?;
            println!("mirrored {} ledgers and {} groups for {}", ledgers, groups, company);
        }
    }

    Ok(())
}
