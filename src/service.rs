//! Bridge workflow: upload, review, push.
//!
//! Ties the statement parser, the local mirror, and the Tally client together.
//! Push never reduces to a boolean; each import gets its own classified
//! outcome so a partially rejected batch stays diagnosable.

use crate::client::{TallyClient, Transport};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::response::PushOutcome;
use crate::statement_format::HdfcStatement;
use crate::store::StatementStore;
use crate::types::{Company, Ledger, LedgerGroup, Statement, Transaction, TransactionPatch};
use crate::voucher::{masters_import, VoucherKind, VoucherMapper};
use std::io::Read;
use tracing::{info, warn};
use uuid::Uuid;

/// How vouchers are grouped into import documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushMode {
    /// One document per transaction. Failures are localized per transaction.
    PerTransaction,
    /// One document for the whole statement. One outcome for the batch.
    Bulk,
}

/// Classified outcomes of a push, one entry per import document sent.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    pub statement_id: String,
    pub results: Vec<PushResult>,
}

/// Outcome of one import document and the transactions it covered.
#[derive(Debug, Clone, PartialEq)]
pub struct PushResult {
    pub transaction_ids: Vec<String>,
    pub outcome: PushOutcome,
}

impl PushReport {
    pub fn is_all_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_success())
    }
}

/// Result of applying a patch list to a stored statement.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchReport {
    pub statement: Statement,
    /// Patch ids that matched no stored transaction. Non-fatal.
    pub unknown_ids: Vec<String>,
}

/// The bridge workflow over a store and a Tally transport.
pub struct BridgeService<S, T> {
    store: S,
    client: TallyClient<T>,
    config: BridgeConfig,
    mapper: VoucherMapper,
}

impl<S: StatementStore, T: Transport> BridgeService<S, T> {
    pub fn new(store: S, client: TallyClient<T>, config: BridgeConfig) -> Self {
        let mapper = VoucherMapper::new(config.ledgers.clone());
        Self {
            store,
            client,
            config,
            mapper,
        }
    }

    /// Parse a statement export and persist it under a fresh id.
    ///
    /// A file with no recognizable header is treated as an empty statement,
    /// not an error; the caller gets a statement with zero transactions.
    pub fn upload_statement<R: Read>(
        &mut self,
        reader: &mut R,
        company: &str,
        bank: &str,
    ) -> Result<Statement> {
        let mut statement = Statement::new(
            Uuid::new_v4().to_string(),
            company.to_string(),
            bank.to_string(),
        );
        match HdfcStatement::from_read(reader) {
            Ok(parsed) => {
                statement.transactions = parsed.transactions;
                statement.seed_opening_balance();
            }
            Err(Error::HeaderNotFound) => {
                warn!(statement = %statement.id, "no transaction table found, storing empty statement");
            }
            Err(e) => return Err(e),
        }
        info!(
            statement = %statement.id,
            transactions = statement.transactions.len(),
            "statement uploaded"
        );
        self.store.save_statement(&statement)?;
        Ok(statement)
    }

    /// Load a stored statement.
    pub fn get_statement(&self, id: &str) -> Result<Statement> {
        self.store.load_statement(id)
    }

    /// Apply a list of patches to a stored statement, recompute running
    /// balances, and persist the result. Patches naming unknown transaction
    /// ids are collected in the report rather than failing the batch.
    pub fn patch_transactions(
        &mut self,
        statement_id: &str,
        patches: &[TransactionPatch],
    ) -> Result<PatchReport> {
        let mut statement = self.store.load_statement(statement_id)?;
        let mut unknown_ids = Vec::new();
        for patch in patches {
            match statement.transaction_mut(&patch.id) {
                Some(tx) => patch.apply(tx),
                None => {
                    warn!(statement = %statement_id, transaction = %patch.id, "patch for unknown transaction");
                    unknown_ids.push(patch.id.clone());
                }
            }
        }
        statement.recompute_balances();
        self.store.save_statement(&statement)?;
        Ok(PatchReport {
            statement,
            unknown_ids,
        })
    }

    /// Push a stored statement to Tally.
    ///
    /// Order matters: the fixed ledgers are created first, then counterparty
    /// ledgers, then voucher types are validated, and only then are vouchers
    /// posted. A statement with zero transactions yields an empty report.
    pub fn push_statement(&mut self, statement_id: &str, mode: PushMode) -> Result<PushReport> {
        let mut statement = self.store.load_statement(statement_id)?;
        let mut report = PushReport {
            statement_id: statement_id.to_string(),
            results: Vec::new(),
        };
        if statement.transactions.is_empty() {
            return Ok(report);
        }

        self.ensure_masters(&statement)?;
        self.validate_voucher_types(&statement)?;

        match mode {
            PushMode::PerTransaction => {
                for i in 0..statement.transactions.len() {
                    let outcome = match self.post_one(&statement.company, &statement.transactions[i])
                    {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            // Keep the statuses already assigned; a push that
                            // dies mid-batch must stay diagnosable from the
                            // store.
                            self.store.save_statement(&statement)?;
                            return Err(e);
                        }
                    };
                    apply_status(&mut statement.transactions[i], &outcome);
                    report.results.push(PushResult {
                        transaction_ids: vec![statement.transactions[i].id.clone()],
                        outcome,
                    });
                }
            }
            PushMode::Bulk => {
                let request = self
                    .mapper
                    .bulk_import(&statement.company, &statement.transactions)?;
                let outcome = self.client.import(&request)?;
                for tx in &mut statement.transactions {
                    apply_status(tx, &outcome);
                }
                report.results.push(PushResult {
                    transaction_ids: statement.transactions.iter().map(|t| t.id.clone()).collect(),
                    outcome,
                });
            }
        }

        self.store.save_statement(&statement)?;
        info!(
            statement = %statement_id,
            documents = report.results.len(),
            all_success = report.is_all_success(),
            "push finished"
        );
        Ok(report)
    }

    /// Refresh the company mirror from Tally and return it.
    pub fn companies(&mut self) -> Result<Vec<Company>> {
        let companies = self.client.companies()?;
        self.store.save_companies(&companies)?;
        Ok(companies)
    }

    /// Mirrored companies, without touching Tally.
    pub fn list_companies(&self) -> Result<Vec<Company>> {
        self.store.list_companies()
    }

    /// Refresh the ledger mirror of a company from Tally. Returns the count.
    pub fn sync_ledgers(&mut self, company: &str) -> Result<usize> {
        let ledgers = self.client.ledgers(company)?;
        let count = self.store.save_ledgers(company, &ledgers)?;
        info!(company, ledgers = count, "ledger mirror refreshed");
        Ok(count)
    }

    /// Mirrored ledgers of a company, without touching Tally.
    pub fn list_ledgers(&self, company: &str) -> Result<Vec<Ledger>> {
        self.store.list_ledgers(company)
    }

    /// Refresh the ledger group mirror of a company from Tally. Returns the count.
    pub fn sync_groups(&mut self, company: &str) -> Result<usize> {
        let groups = self.client.groups(company)?;
        let count = self.store.save_groups(company, &groups)?;
        info!(company, groups = count, "group mirror refreshed");
        Ok(count)
    }

    /// Mirrored ledger groups of a company, without touching Tally.
    pub fn list_groups(&self, company: &str) -> Result<Vec<LedgerGroup>> {
        self.store.list_groups(company)
    }

    /// Create the fixed and counterparty ledgers the statement's vouchers
    /// will reference, skipping those Tally already has.
    fn ensure_masters(&mut self, statement: &Statement) -> Result<()> {
        let existing: Vec<String> = self
            .client
            .ledgers(&statement.company)?
            .into_iter()
            .map(|l| l.name)
            .collect();

        let mut wanted = self.mapper.required_masters();
        wanted.extend(self.mapper.counterparty_masters(&statement.transactions));
        let missing: Vec<_> = wanted
            .into_iter()
            .filter(|m| !existing.contains(&m.name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        info!(count = missing.len(), "creating missing ledgers");
        let outcome = self.client.import(&masters_import(missing))?;
        match outcome {
            PushOutcome::Success { .. } => Ok(()),
            PushOutcome::Failure { reason } => Err(Error::ErpRejection(format!(
                "ledger creation failed: {}",
                reason
            ))),
        }
    }

    /// Every voucher type the statement will use must already exist in the
    /// company; vouchers referencing a missing type would be silently dropped.
    fn validate_voucher_types(&self, statement: &Statement) -> Result<()> {
        let available = self.client.voucher_types(&statement.company)?;
        let mut needed: Vec<String> = Vec::new();
        for tx in &statement.transactions {
            let name = tx
                .voucher
                .clone()
                .unwrap_or_else(|| VoucherKind::for_transaction(tx).as_str().to_string());
            if !needed.contains(&name) {
                needed.push(name);
            }
        }
        let missing: Vec<String> = needed
            .into_iter()
            .filter(|n| !available.contains(n))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "voucher types not present in company {}: {}",
                statement.company,
                missing.join(", ")
            )))
        }
    }

    /// Post one transaction. A transaction the mapper refuses (no positive
    /// amount) becomes a classified failure instead of aborting the batch;
    /// transport errors still abort.
    fn post_one(&self, company: &str, tx: &Transaction) -> Result<PushOutcome> {
        let request = match self.mapper.single_import(company, tx) {
            Ok(request) => request,
            Err(Error::Validation(reason)) => return Ok(PushOutcome::Failure { reason }),
            Err(e) => return Err(e),
        };
        self.client.import(&request)
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}

fn apply_status(tx: &mut Transaction, outcome: &PushOutcome) {
    tx.status = Some(match outcome {
        PushOutcome::Success { .. } => "pushed".to_string(),
        PushOutcome::Failure { reason } => format!("failed: {}", reason),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::FakeTransport;
    use crate::store::MemoryStore;
    use pretty_assertions::assert_eq;

    const EMPTY_LEDGERS: &str = "<ENVELOPE></ENVELOPE>";
    const ALL_LEDGERS: &str = r#"<ENVELOPE>
        <LEDGER><NAME>HDFC Bank</NAME><PARENT>Bank Accounts</PARENT></LEDGER>
        <LEDGER><NAME>Cash</NAME><PARENT>Cash-in-hand</PARENT></LEDGER>
        <LEDGER><NAME>Miscellaneous Expenses</NAME><PARENT>Indirect Expenses</PARENT></LEDGER>
        <LEDGER><NAME>Johndoe</NAME><PARENT>Sundry Creditors</PARENT></LEDGER>
    </ENVELOPE>"#;
    const VOUCHER_TYPES: &str = r#"<ENVELOPE>
        <VOUCHERTYPE><NAME>Payment</NAME></VOUCHERTYPE>
        <VOUCHERTYPE><NAME>Receipt</NAME></VOUCHERTYPE>
    </ENVELOPE>"#;
    const CREATED_1: &str = "<RESPONSE><CREATED>1</CREATED></RESPONSE>";

    const STATEMENT_CSV: &str = "\
HDFC BANK Ltd.,,,,,,
Date,Narration,Chq./Ref.No.,Value Dt,Withdrawal Amt.,Deposit Amt.,Closing Balance
01/04/25,UPI-JohnDoe-ref123,REF1,01/04/25,150.00,0.00,850.00
02/04/25,salary credit,REF2,02/04/25,0.00,2000.00,2850.00
";

    fn service(responses: Vec<&str>) -> BridgeService<MemoryStore, FakeTransport> {
        let client = TallyClient::with_transport(FakeTransport::new(responses));
        BridgeService::new(MemoryStore::new(), client, BridgeConfig::default())
    }

    fn uploaded(service: &mut BridgeService<MemoryStore, FakeTransport>) -> Statement {
        let mut bytes = STATEMENT_CSV.as_bytes();
        service.upload_statement(&mut bytes, "Acme", "HDFC").unwrap()
    }

    #[test]
    fn test_upload_and_get_round_trip() {
        let mut service = service(vec![]);
        let statement = uploaded(&mut service);
        assert_eq!(statement.transactions.len(), 2);
        assert_eq!(
            service.get_statement(&statement.id).unwrap(),
            statement
        );
    }

    #[test]
    fn test_upload_without_header_stores_empty_statement() {
        let mut service = service(vec![]);
        let mut bytes = "just,some,cells\nwithout,a,table\n".as_bytes();
        let statement = service.upload_statement(&mut bytes, "Acme", "HDFC").unwrap();
        assert!(statement.transactions.is_empty());
        assert!(service
            .get_statement(&statement.id)
            .unwrap()
            .transactions
            .is_empty());
    }

    #[test]
    fn test_patch_reports_unknown_ids_and_recomputes() {
        let mut service = service(vec![]);
        let statement = uploaded(&mut service);
        let target = statement.transactions[1].id.clone();
        let patches = vec![
            TransactionPatch {
                id: target.clone(),
                amount: Some("1000.00".parse().unwrap()),
                ..Default::default()
            },
            TransactionPatch {
                id: "no-such-id".into(),
                status: Some("reviewed".into()),
                ..Default::default()
            },
        ];
        let report = service.patch_transactions(&statement.id, &patches).unwrap();
        assert_eq!(report.unknown_ids, vec!["no-such-id"]);
        let patched = &report.statement.transactions[1];
        assert_eq!(patched.deposit_amount.to_string(), "1000.00");
        // Opening 1000.00 fixed at upload; the edited deposit flows into its
        // own closing balance.
        assert_eq!(
            report.statement.transactions[0].closing_balance.to_string(),
            "850.00"
        );
        assert_eq!(patched.closing_balance.to_string(), "1850.00");
    }

    #[test]
    fn test_patch_first_transaction_amount_moves_its_balance() {
        let mut service = service(vec![]);
        let statement = uploaded(&mut service);
        let target = statement.transactions[0].id.clone();
        let patches = vec![TransactionPatch {
            id: target,
            amount: Some("500.00".parse().unwrap()),
            ..Default::default()
        }];
        let report = service.patch_transactions(&statement.id, &patches).unwrap();
        // Opening 1000.00 was fixed at upload; raising the first debit from
        // 150 to 500 must lower its own closing balance, not the opening.
        assert_eq!(
            report.statement.transactions[0].closing_balance.to_string(),
            "500.00"
        );
        assert_eq!(
            report.statement.transactions[1].closing_balance.to_string(),
            "2500.00"
        );
    }

    #[test]
    fn test_push_creates_missing_masters_before_vouchers() {
        let mut service = service(vec![
            EMPTY_LEDGERS,  // ledger listing: nothing exists yet
            CREATED_1,      // master creation
            VOUCHER_TYPES,  // voucher type validation
            CREATED_1,      // voucher for transaction 1
            CREATED_1,      // voucher for transaction 2
        ]);
        let statement = uploaded(&mut service);
        let report = service
            .push_statement(&statement.id, PushMode::PerTransaction)
            .unwrap();
        assert!(report.is_all_success());
        assert_eq!(report.results.len(), 2);

        let sent = service.client.transport().sent.borrow();
        assert_eq!(sent.len(), 5);
        // Masters document precedes the voucher documents and carries the
        // fixed ledgers plus the extracted counterparty.
        assert!(sent[1].contains("<REPORTNAME>All Masters</REPORTNAME>"));
        assert!(sent[1].contains("HDFC Bank"));
        assert!(sent[1].contains("Johndoe"));
        assert!(sent[3].contains("<REPORTNAME>Vouchers</REPORTNAME>"));

        let stored = service.get_statement(&statement.id).unwrap();
        assert!(stored
            .transactions
            .iter()
            .all(|t| t.status.as_deref() == Some("pushed")));
    }

    #[test]
    fn test_push_skips_master_creation_when_all_exist() {
        let mut service = service(vec![ALL_LEDGERS, VOUCHER_TYPES, CREATED_1, CREATED_1]);
        let statement = uploaded(&mut service);
        let report = service
            .push_statement(&statement.id, PushMode::PerTransaction)
            .unwrap();
        assert!(report.is_all_success());
        let sent = service.client.transport().sent.borrow();
        assert!(!sent.iter().any(|s| s.contains("All Masters")));
    }

    #[test]
    fn test_push_fails_fast_on_missing_voucher_type() {
        let only_payment = r#"<ENVELOPE>
            <VOUCHERTYPE><NAME>Payment</NAME></VOUCHERTYPE>
        </ENVELOPE>"#;
        let mut service = service(vec![ALL_LEDGERS, only_payment]);
        let statement = uploaded(&mut service);
        match service.push_statement(&statement.id, PushMode::PerTransaction) {
            Err(Error::Validation(msg)) => assert!(msg.contains("Receipt"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_per_transaction_push_localizes_failures() {
        let rejected = "<ENVELOPE><LINEERROR>Out of balance</LINEERROR></ENVELOPE>";
        let mut service = service(vec![ALL_LEDGERS, VOUCHER_TYPES, rejected, CREATED_1]);
        let statement = uploaded(&mut service);
        let report = service
            .push_statement(&statement.id, PushMode::PerTransaction)
            .unwrap();
        assert!(!report.is_all_success());
        assert!(!report.results[0].outcome.is_success());
        assert!(report.results[1].outcome.is_success());

        let stored = service.get_statement(&statement.id).unwrap();
        assert_eq!(
            stored.transactions[0].status.as_deref(),
            Some("failed: Out of balance")
        );
        assert_eq!(stored.transactions[1].status.as_deref(), Some("pushed"));
    }

    #[test]
    fn test_bulk_push_sends_one_document() {
        let mut service = service(vec![ALL_LEDGERS, VOUCHER_TYPES, "<RESPONSE><CREATED>2</CREATED></RESPONSE>"]);
        let statement = uploaded(&mut service);
        let report = service.push_statement(&statement.id, PushMode::Bulk).unwrap();
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].transaction_ids.len(), 2);
        assert!(report.is_all_success());
        let sent = service.client.transport().sent.borrow();
        assert_eq!(sent.len(), 3);
    }

    #[test]
    fn test_transport_error_mid_push_keeps_earlier_statuses() {
        // Three canned responses; the second voucher post finds the queue
        // empty and fails at the transport level.
        let mut service = service(vec![ALL_LEDGERS, VOUCHER_TYPES, CREATED_1]);
        let statement = uploaded(&mut service);
        match service.push_statement(&statement.id, PushMode::PerTransaction) {
            Err(Error::Transport(_)) => {}
            other => panic!("expected transport error, got {:?}", other),
        }
        let stored = service.get_statement(&statement.id).unwrap();
        assert_eq!(stored.transactions[0].status.as_deref(), Some("pushed"));
        assert_eq!(stored.transactions[1].status, None);
    }

    #[test]
    fn test_push_empty_statement_is_empty_report() {
        let mut service = service(vec![]);
        let mut bytes = "no,table,here\n".as_bytes();
        let statement = service.upload_statement(&mut bytes, "Acme", "HDFC").unwrap();
        let report = service
            .push_statement(&statement.id, PushMode::PerTransaction)
            .unwrap();
        assert!(report.results.is_empty());
    }

    #[test]
    fn test_companies_and_ledger_mirror() {
        let groups = r#"<ENVELOPE>
            <GROUP><NAME>Sundry Creditors</NAME><PARENT>Current Liabilities</PARENT></GROUP>
            <GROUP><NAME>Bank Accounts</NAME><PARENT>Current Assets</PARENT></GROUP>
        </ENVELOPE>"#;
        let mut service = service(vec![
            "<ENVELOPE><COMPANY><NAME>Acme</NAME></COMPANY></ENVELOPE>",
            ALL_LEDGERS,
            groups,
        ]);
        let companies = service.companies().unwrap();
        assert_eq!(companies.len(), 1);
        assert_eq!(service.sync_ledgers("Acme").unwrap(), 4);
        assert_eq!(service.sync_groups("Acme").unwrap(), 2);

        // Mirrored listings answer without further Tally calls.
        let sent_before = service.client.transport().sent.borrow().len();
        let ledgers = service.list_ledgers("Acme").unwrap();
        assert!(ledgers.iter().any(|l| l.name == "HDFC Bank"));
        let groups = service.list_groups("Acme").unwrap();
        assert!(groups.iter().any(|g| g.name == "Sundry Creditors"));
        let companies = service.list_companies().unwrap();
        assert_eq!(companies[0].name, "Acme");
        assert_eq!(service.client.transport().sent.borrow().len(), sent_before);
    }
}
