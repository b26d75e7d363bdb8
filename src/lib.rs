//! Tally Bridge Library
//!
//! A library for moving bank statement exports into Tally ERP over its
//! XML-over-HTTP interface.
//!
//! # Workflow
//!
//! - **Upload**: parse an HDFC statement export into normalized transactions
//! - **Review**: patch ledger assignments, amounts, and narrations; running
//!   balances are recomputed after every edit
//! - **Push**: create missing ledger masters, validate voucher types, then
//!   post each transaction as a double-entry voucher
//!
//! Statements and Tally master data are mirrored locally in SQLite so the
//! review step works offline; Tally remains the ledger of record.
//!
//! # Examples
//!
//! ## Parsing a statement export
//!
//! ```no_run
//! use std::fs::File;
//! use tallybridge::statement_format::HdfcStatement;
//!
//! let mut file = File::open("statement.csv")?;
//! let statement = HdfcStatement::from_read(&mut file)?;
//! println!("{} transactions", statement.transactions.len());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Pushing a statement to Tally
//!
//! ```no_run
//! use std::fs::File;
//! use std::time::Duration;
//! use tallybridge::client::TallyClient;
//! use tallybridge::config::BridgeConfig;
//! use tallybridge::service::{BridgeService, PushMode};
//! use tallybridge::store::SqliteStore;
//!
//! let config = BridgeConfig::default();
//! let store = SqliteStore::open(&config.db_path)?;
//! let client = TallyClient::connect(&config.tally_url, Duration::from_secs(config.timeout_secs))?;
//! let mut service = BridgeService::new(store, client, config);
//!
//! let mut file = File::open("statement.csv")?;
//! let statement = service.upload_statement(&mut file, "Acme Traders", "HDFC")?;
//! let report = service.push_statement(&statement.id, PushMode::PerTransaction)?;
//! println!("all pushed: {}", report.is_all_success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod response;
pub mod service;
pub mod statement_format;
pub mod store;
pub mod types;
pub mod voucher;

// Re-export commonly used types
pub use client::{HttpTransport, TallyClient, Transport};
pub use config::BridgeConfig;
pub use error::{Error, Result};
pub use response::PushOutcome;
pub use service::{BridgeService, PushMode, PushReport};
pub use store::{MemoryStore, SqliteStore, StatementStore};
pub use types::{
    Category, Company, Ledger, LedgerGroup, Statement, Transaction, TransactionPatch,
    TransactionType,
};
