//! Bridge configuration.
//!
//! Loaded from a TOML file with sensible defaults for a local Tally
//! installation. The `TALLY_URL` environment variable overrides the
//! configured endpoint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Configuration for the statement-to-Tally bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Tally XML-over-HTTP endpoint.
    pub tally_url: String,

    /// Request timeout in seconds, applied to every Tally call.
    pub timeout_secs: u64,

    /// Default company context for imports and collection queries.
    pub company: String,

    /// Path of the local mirror database.
    pub db_path: String,

    /// Fixed ledger names used by the voucher mapper.
    pub ledgers: LedgerNames,
}

/// The fixed ledgers and parent groups the mapper relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerNames {
    /// Bank/cash ledger carrying one leg of every voucher.
    pub bank: String,
    pub bank_group: String,

    /// Source ledger for credit (receipt) vouchers.
    pub cash: String,
    pub cash_group: String,

    /// Destination when counterparty extraction fails.
    pub fallback: String,
    pub fallback_group: String,

    /// Parent group for extracted counterparty ledgers.
    pub parties_group: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            tally_url: "http://localhost:9000".into(),
            timeout_secs: 10,
            company: "Test".into(),
            db_path: "tallybridge.db".into(),
            ledgers: LedgerNames::default(),
        }
    }
}

impl Default for LedgerNames {
    fn default() -> Self {
        Self {
            bank: "HDFC Bank".into(),
            bank_group: "Bank Accounts".into(),
            cash: "Cash".into(),
            cash_group: "Cash-in-hand".into(),
            fallback: "Miscellaneous Expenses".into(),
            fallback_group: "Indirect Expenses".into(),
            parties_group: "Sundry Creditors".into(),
        }
    }
}

impl BridgeConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist. `TALLY_URL` in the environment wins over the
    /// configured endpoint.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = if path.as_ref().exists() {
            Self::from_toml(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        if let Ok(url) = std::env::var("TALLY_URL") {
            config.tally_url = url;
        }
        Ok(config)
    }
}
