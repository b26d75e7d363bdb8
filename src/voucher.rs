//! Voucher mapper: normalized transactions to Tally double-entry vouchers.
//!
//! Every transaction becomes one voucher with exactly two ledger legs of
//! opposite sign and opposite deemed-positive flag, so the legs always net to
//! zero. Ledger names come from configuration, a patch-step override, or a
//! counterparty heuristically extracted from the narration.

use crate::config::LedgerNames;
use crate::envelope::{
    ImportRequest, LedgerEntry, LedgerMaster, ReportName, TallyMessage, TallyRequest, Voucher,
};
use crate::error::{Error, Result};
use crate::types::{Transaction, TransactionType};
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

/// Voucher kinds produced by the mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoucherKind {
    /// Money leaving the bank account.
    Payment,
    /// Money arriving at the bank account.
    Receipt,
}

impl VoucherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoucherKind::Payment => "Payment",
            VoucherKind::Receipt => "Receipt",
        }
    }

    /// Kind implied by the transaction's debit/credit indicator.
    pub fn for_transaction(tx: &Transaction) -> Self {
        match tx.transaction_type {
            TransactionType::Debit => VoucherKind::Payment,
            TransactionType::Credit => VoucherKind::Receipt,
        }
    }
}

/// Maps transactions into Tally voucher and ledger-master messages.
#[derive(Debug, Clone)]
pub struct VoucherMapper {
    ledgers: LedgerNames,
}

impl VoucherMapper {
    pub fn new(ledgers: LedgerNames) -> Self {
        Self { ledgers }
    }

    /// Map one transaction to a voucher.
    ///
    /// Fails with a validation error when the transaction carries no amount;
    /// such a voucher would be rejected by Tally anyway.
    pub fn map(&self, tx: &Transaction) -> Result<Voucher> {
        let amount = tx.amount();
        if amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "transaction {} has no positive amount",
                tx.id
            )));
        }

        let kind = VoucherKind::for_transaction(tx);
        let voucher_type = tx
            .voucher
            .clone()
            .unwrap_or_else(|| kind.as_str().to_string());

        let (from_ledger, to_ledger) = self.resolve_ledgers(tx);
        let entries = match tx.transaction_type {
            TransactionType::Debit => vec![
                LedgerEntry {
                    ledger: from_ledger,
                    deemed_positive: true,
                    amount: -amount,
                },
                LedgerEntry {
                    ledger: to_ledger,
                    deemed_positive: false,
                    amount,
                },
            ],
            TransactionType::Credit => vec![
                LedgerEntry {
                    ledger: from_ledger,
                    deemed_positive: false,
                    amount,
                },
                LedgerEntry {
                    ledger: to_ledger,
                    deemed_positive: true,
                    amount: -amount,
                },
            ],
        };

        Ok(Voucher {
            guid: voucher_guid(&tx.ref_no),
            number: voucher_number(&tx.ref_no),
            date: tx.date,
            narration: tx.narration.clone(),
            voucher_type,
            entries,
        })
    }

    /// The two ledger names of a transaction. A patch-step override always
    /// wins; otherwise debits run bank -> counterparty (or fallback) and
    /// credits run cash -> bank.
    fn resolve_ledgers(&self, tx: &Transaction) -> (String, String) {
        match tx.transaction_type {
            TransactionType::Debit => {
                let from = tx
                    .from_ledger
                    .clone()
                    .unwrap_or_else(|| self.ledgers.bank.clone());
                let to = tx.to_ledger.clone().unwrap_or_else(|| {
                    extract_counterparty(&tx.narration)
                        .unwrap_or_else(|| self.ledgers.fallback.clone())
                });
                (from, to)
            }
            TransactionType::Credit => {
                let from = tx
                    .from_ledger
                    .clone()
                    .unwrap_or_else(|| self.ledgers.cash.clone());
                let to = tx
                    .to_ledger
                    .clone()
                    .unwrap_or_else(|| self.ledgers.bank.clone());
                (from, to)
            }
        }
    }

    /// The fixed ledgers every push depends on, with their parent groups.
    pub fn required_masters(&self) -> Vec<LedgerMaster> {
        [
            (&self.ledgers.bank, &self.ledgers.bank_group),
            (&self.ledgers.cash, &self.ledgers.cash_group),
            (&self.ledgers.fallback, &self.ledgers.fallback_group),
        ]
        .into_iter()
        .map(|(name, parent)| master(name, parent))
        .collect()
    }

    /// Deduplicated counterparty ledgers extracted from debit narrations.
    /// Transactions whose extraction fails use the fallback ledger and need
    /// no master of their own.
    pub fn counterparty_masters(&self, transactions: &[Transaction]) -> Vec<LedgerMaster> {
        let mut seen = Vec::new();
        for tx in transactions {
            if tx.transaction_type != TransactionType::Debit || tx.to_ledger.is_some() {
                continue;
            }
            if let Some(name) = extract_counterparty(&tx.narration) {
                if !seen.contains(&name) {
                    seen.push(name);
                }
            }
        }
        seen.iter()
            .map(|name| master(name, &self.ledgers.parties_group))
            .collect()
    }

    /// One import document carrying every transaction (bulk mode). Bulk
    /// responses do not localize the failing transaction.
    pub fn bulk_import(&self, company: &str, transactions: &[Transaction]) -> Result<TallyRequest> {
        let messages = transactions
            .iter()
            .map(|tx| self.map(tx).map(TallyMessage::Voucher))
            .collect::<Result<Vec<_>>>()?;
        Ok(TallyRequest::Import(ImportRequest {
            report: ReportName::Vouchers,
            company: Some(company.to_string()),
            messages,
        }))
    }

    /// One import document for a single transaction (small-batch mode).
    pub fn single_import(&self, company: &str, tx: &Transaction) -> Result<TallyRequest> {
        Ok(TallyRequest::Import(ImportRequest {
            report: ReportName::Vouchers,
            company: Some(company.to_string()),
            messages: vec![TallyMessage::Voucher(self.map(tx)?)],
        }))
    }
}

/// A master import document for a set of ledgers.
pub fn masters_import(masters: Vec<LedgerMaster>) -> TallyRequest {
    TallyRequest::Import(ImportRequest {
        report: ReportName::AllMasters,
        company: None,
        messages: masters.into_iter().map(TallyMessage::Ledger).collect(),
    })
}

fn master(name: &str, parent: &str) -> LedgerMaster {
    LedgerMaster {
        name: name.to_string(),
        parent: parent.to_string(),
        deemed_positive: false,
        opening_balance: Decimal::ZERO,
    }
}

/// Heuristic counterparty extraction: a narration carrying the UPI network
/// marker is split on `-` and the second segment, title-cased, is the payee.
pub fn extract_counterparty(narration: &str) -> Option<String> {
    if !narration.contains("UPI") {
        return None;
    }
    let segment = narration.split('-').nth(1)?.trim();
    if segment.is_empty() {
        return None;
    }
    Some(capitalize(segment))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

fn voucher_guid(ref_no: &str) -> String {
    if ref_no.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        format!("VCH-{}-{}", ref_no, Utc::now().format("%Y%m%d%H%M%S"))
    }
}

fn voucher_number(ref_no: &str) -> String {
    if ref_no.is_empty() {
        format!("VCH-{}", Utc::now().format("%Y%m%d%H%M%S"))
    } else {
        ref_no.to_string()
    }
}
