//! Local mirror storage for statements, ledgers, and companies.
//!
//! The mirror is a cache/staging area ahead of ERP sync; Tally remains the
//! ledger of record. Writes are whole-statement replacements with no locking,
//! so concurrent edits to the same statement are last-write-wins. That is a
//! known limitation at this scale, not a guarantee.

use crate::error::{Error, Result};
use crate::types::{Category, Company, Ledger, LedgerGroup, Statement, Transaction, TransactionType};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

/// Persistence seam for the service layer.
pub trait StatementStore {
    /// Insert or replace a statement and all its transactions.
    fn save_statement(&mut self, statement: &Statement) -> Result<()>;

    /// Load a statement by id, transactions in original order.
    fn load_statement(&self, id: &str) -> Result<Statement>;

    /// Replace the mirrored ledgers of a company. Returns the count stored.
    fn save_ledgers(&mut self, company: &str, ledgers: &[Ledger]) -> Result<usize>;

    /// Mirrored ledgers of a company.
    fn list_ledgers(&self, company: &str) -> Result<Vec<Ledger>>;

    /// Replace the mirrored ledger groups of a company. Returns the count stored.
    fn save_groups(&mut self, company: &str, groups: &[LedgerGroup]) -> Result<usize>;

    /// Mirrored ledger groups of a company.
    fn list_groups(&self, company: &str) -> Result<Vec<LedgerGroup>>;

    /// Replace the mirrored company list. Returns the count stored.
    fn save_companies(&mut self, companies: &[Company]) -> Result<usize>;

    /// Mirrored companies.
    fn list_companies(&self) -> Result<Vec<Company>>;
}

/// In-memory store for tests and one-shot CLI runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    statements: HashMap<String, Statement>,
    ledgers: HashMap<String, Vec<Ledger>>,
    groups: HashMap<String, Vec<LedgerGroup>>,
    companies: Vec<Company>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatementStore for MemoryStore {
    fn save_statement(&mut self, statement: &Statement) -> Result<()> {
        self.statements
            .insert(statement.id.clone(), statement.clone());
        Ok(())
    }

    fn load_statement(&self, id: &str) -> Result<Statement> {
        self.statements
            .get(id)
            .cloned()
            .ok_or_else(|| Error::StatementNotFound(id.to_string()))
    }

    fn save_ledgers(&mut self, company: &str, ledgers: &[Ledger]) -> Result<usize> {
        self.ledgers.insert(company.to_string(), ledgers.to_vec());
        Ok(ledgers.len())
    }

    fn list_ledgers(&self, company: &str) -> Result<Vec<Ledger>> {
        Ok(self.ledgers.get(company).cloned().unwrap_or_default())
    }

    fn save_groups(&mut self, company: &str, groups: &[LedgerGroup]) -> Result<usize> {
        self.groups.insert(company.to_string(), groups.to_vec());
        Ok(groups.len())
    }

    fn list_groups(&self, company: &str) -> Result<Vec<LedgerGroup>> {
        Ok(self.groups.get(company).cloned().unwrap_or_default())
    }

    fn save_companies(&mut self, companies: &[Company]) -> Result<usize> {
        self.companies = companies.to_vec();
        Ok(companies.len())
    }

    fn list_companies(&self) -> Result<Vec<Company>> {
        Ok(self.companies.clone())
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed mirror store.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (and create if needed) the mirror database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS statements (
                id              TEXT PRIMARY KEY,
                company         TEXT NOT NULL,
                bank            TEXT NOT NULL,
                opening_balance TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS transactions (
                id                TEXT PRIMARY KEY,
                statement_id      TEXT NOT NULL,
                seq               INTEGER NOT NULL,
                date              TEXT NOT NULL,
                value_date        TEXT NOT NULL,
                narration         TEXT NOT NULL,
                ref_no            TEXT NOT NULL,
                withdrawal_amount TEXT NOT NULL,
                deposit_amount    TEXT NOT NULL,
                closing_balance   TEXT NOT NULL,
                transaction_type  TEXT NOT NULL,
                category          TEXT NOT NULL,
                from_ledger       TEXT,
                to_ledger         TEXT,
                voucher           TEXT,
                status            TEXT
            );
            CREATE TABLE IF NOT EXISTS ledgers (
                company  TEXT NOT NULL,
                name     TEXT NOT NULL,
                parent   TEXT,
                PRIMARY KEY (company, name)
            );
            CREATE TABLE IF NOT EXISTS groups (
                company  TEXT NOT NULL,
                name     TEXT NOT NULL,
                parent   TEXT,
                PRIMARY KEY (company, name)
            );
            CREATE TABLE IF NOT EXISTS companies (
                name TEXT PRIMARY KEY
            );
            "#,
        )?;
        Ok(Self { conn })
    }
}

impl StatementStore for SqliteStore {
    fn save_statement(&mut self, statement: &Statement) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO statements (id, company, bank, opening_balance)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                statement.id,
                statement.company,
                statement.bank,
                statement.opening_balance.to_string(),
            ],
        )?;
        tx.execute(
            "DELETE FROM transactions WHERE statement_id = ?1",
            params![statement.id],
        )?;
        for (seq, t) in statement.transactions.iter().enumerate() {
            tx.execute(
                "INSERT INTO transactions (
                    id, statement_id, seq, date, value_date, narration, ref_no,
                    withdrawal_amount, deposit_amount, closing_balance,
                    transaction_type, category, from_ledger, to_ledger, voucher, status
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                params![
                    t.id,
                    statement.id,
                    seq as i64,
                    t.date.format(DATE_FORMAT).to_string(),
                    t.value_date.format(DATE_FORMAT).to_string(),
                    t.narration,
                    t.ref_no,
                    t.withdrawal_amount.to_string(),
                    t.deposit_amount.to_string(),
                    t.closing_balance.to_string(),
                    t.transaction_type.as_str(),
                    t.category.as_str(),
                    t.from_ledger,
                    t.to_ledger,
                    t.voucher,
                    t.status,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn load_statement(&self, id: &str) -> Result<Statement> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, company, bank, opening_balance FROM statements WHERE id = ?1")?;
        let mut rows = stmt.query(params![id])?;
        let Some(row) = rows.next()? else {
            return Err(Error::StatementNotFound(id.to_string()));
        };
        let mut statement = Statement::new(row.get(0)?, row.get(1)?, row.get(2)?);
        let opening: String = row.get(3)?;
        statement.opening_balance =
            Decimal::from_str(&opening).map_err(|_| Error::InvalidAmount(opening))?;

        let mut stmt = self.conn.prepare(
            "SELECT id, date, value_date, narration, ref_no,
                    withdrawal_amount, deposit_amount, closing_balance,
                    transaction_type, category, from_ledger, to_ledger, voucher, status
             FROM transactions WHERE statement_id = ?1 ORDER BY seq",
        )?;
        let raw: Vec<TransactionRow> = stmt
            .query_map(params![id], |row| {
                Ok(TransactionRow {
                    id: row.get(0)?,
                    date: row.get(1)?,
                    value_date: row.get(2)?,
                    narration: row.get(3)?,
                    ref_no: row.get(4)?,
                    withdrawal_amount: row.get(5)?,
                    deposit_amount: row.get(6)?,
                    closing_balance: row.get(7)?,
                    transaction_type: row.get(8)?,
                    category: row.get(9)?,
                    from_ledger: row.get(10)?,
                    to_ledger: row.get(11)?,
                    voucher: row.get(12)?,
                    status: row.get(13)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;

        for row in raw {
            statement.transactions.push(row.into_transaction()?);
        }
        Ok(statement)
    }

    fn save_ledgers(&mut self, company: &str, ledgers: &[Ledger]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for ledger in ledgers {
            tx.execute(
                "INSERT INTO ledgers (company, name, parent) VALUES (?1, ?2, ?3)
                 ON CONFLICT(company, name) DO UPDATE SET parent=excluded.parent",
                params![company, ledger.name, ledger.parent],
            )?;
        }
        tx.commit()?;
        Ok(ledgers.len())
    }

    fn list_ledgers(&self, company: &str) -> Result<Vec<Ledger>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, parent FROM ledgers WHERE company = ?1 ORDER BY name")?;
        let ledgers = stmt
            .query_map(params![company], |row| {
                Ok(Ledger {
                    name: row.get(0)?,
                    parent: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(ledgers)
    }

    fn save_groups(&mut self, company: &str, groups: &[LedgerGroup]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for group in groups {
            tx.execute(
                "INSERT INTO groups (company, name, parent) VALUES (?1, ?2, ?3)
                 ON CONFLICT(company, name) DO UPDATE SET parent=excluded.parent",
                params![company, group.name, group.parent],
            )?;
        }
        tx.commit()?;
        Ok(groups.len())
    }

    fn list_groups(&self, company: &str) -> Result<Vec<LedgerGroup>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name, parent FROM groups WHERE company = ?1 ORDER BY name")?;
        let groups = stmt
            .query_map(params![company], |row| {
                Ok(LedgerGroup {
                    name: row.get(0)?,
                    parent: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<_, _>>()?;
        Ok(groups)
    }

    fn save_companies(&mut self, companies: &[Company]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for company in companies {
            tx.execute(
                "INSERT OR IGNORE INTO companies (name) VALUES (?1)",
                params![company.name],
            )?;
        }
        tx.commit()?;
        Ok(companies.len())
    }

    fn list_companies(&self) -> Result<Vec<Company>> {
        let mut stmt = self.conn.prepare("SELECT name FROM companies ORDER BY name")?;
        let companies = stmt
            .query_map([], |row| Ok(Company { name: row.get(0)? }))?
            .collect::<std::result::Result<_, _>>()?;
        Ok(companies)
    }
}

/// Raw SQL row; typed conversion happens outside the rusqlite closure so
/// date/decimal errors surface as our own error variants.
struct TransactionRow {
    id: String,
    date: String,
    value_date: String,
    narration: String,
    ref_no: String,
    withdrawal_amount: String,
    deposit_amount: String,
    closing_balance: String,
    transaction_type: String,
    category: String,
    from_ledger: Option<String>,
    to_ledger: Option<String>,
    voucher: Option<String>,
    status: Option<String>,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<Transaction> {
        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .map_err(|_| Error::InvalidDate(s.to_string()))
        };
        let parse_amount = |s: &str| {
            Decimal::from_str(s).map_err(|_| Error::InvalidAmount(s.to_string()))
        };
        Ok(Transaction {
            id: self.id,
            date: parse_date(&self.date)?,
            value_date: parse_date(&self.value_date)?,
            narration: self.narration,
            ref_no: self.ref_no,
            withdrawal_amount: parse_amount(&self.withdrawal_amount)?,
            deposit_amount: parse_amount(&self.deposit_amount)?,
            closing_balance: parse_amount(&self.closing_balance)?,
            transaction_type: self
                .transaction_type
                .parse::<TransactionType>()
                .map_err(Error::Validation)?,
            category: self.category.parse::<Category>().map_err(Error::Validation)?,
            from_ledger: self.from_ledger,
            to_ledger: self.to_ledger,
            voucher: self.voucher,
            status: self.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_statement() -> Statement {
        let mut statement = Statement::new("s1".into(), "Acme".into(), "HDFC".into());
        statement.opening_balance = Decimal::from_str("999.50").unwrap();
        statement.transactions.push(Transaction {
            id: "t1".into(),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            value_date: NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
            narration: "UPI-JohnDoe-ref123".into(),
            ref_no: "REF1".into(),
            withdrawal_amount: Decimal::from_str("150.00").unwrap(),
            deposit_amount: Decimal::ZERO,
            closing_balance: Decimal::from_str("849.50").unwrap(),
            transaction_type: TransactionType::Debit,
            category: Category::UpiPayment,
            from_ledger: None,
            to_ledger: Some("Johndoe".into()),
            voucher: None,
            status: Some("pending".into()),
        });
        statement
    }

    #[test]
    fn test_memory_store_round_trip() {
        let mut store = MemoryStore::new();
        let statement = sample_statement();
        store.save_statement(&statement).unwrap();
        assert_eq!(store.load_statement("s1").unwrap(), statement);
        match store.load_statement("nope") {
            Err(Error::StatementNotFound(id)) => assert_eq!(id, "nope"),
            other => panic!("expected StatementNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_sqlite_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("mirror.db")).unwrap();
        let statement = sample_statement();
        store.save_statement(&statement).unwrap();
        assert_eq!(store.load_statement("s1").unwrap(), statement);
    }

    #[test]
    fn test_sqlite_save_replaces_whole_statement() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("mirror.db")).unwrap();
        let mut statement = sample_statement();
        store.save_statement(&statement).unwrap();

        statement.transactions[0].status = Some("pushed".into());
        store.save_statement(&statement).unwrap();

        let loaded = store.load_statement("s1").unwrap();
        assert_eq!(loaded.transactions.len(), 1);
        assert_eq!(loaded.transactions[0].status.as_deref(), Some("pushed"));
    }

    #[test]
    fn test_sqlite_ledger_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("mirror.db")).unwrap();
        store
            .save_ledgers(
                "Acme",
                &[Ledger {
                    name: "HDFC Bank".into(),
                    parent: None,
                }],
            )
            .unwrap();
        store
            .save_ledgers(
                "Acme",
                &[Ledger {
                    name: "HDFC Bank".into(),
                    parent: Some("Bank Accounts".into()),
                }],
            )
            .unwrap();
        let ledgers = store.list_ledgers("Acme").unwrap();
        assert_eq!(ledgers.len(), 1);
        assert_eq!(ledgers[0].parent.as_deref(), Some("Bank Accounts"));
        assert!(store.list_ledgers("Other").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_group_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("mirror.db")).unwrap();
        store
            .save_groups(
                "Acme",
                &[LedgerGroup {
                    name: "Sundry Creditors".into(),
                    parent: None,
                }],
            )
            .unwrap();
        store
            .save_groups(
                "Acme",
                &[
                    LedgerGroup {
                        name: "Sundry Creditors".into(),
                        parent: Some("Current Liabilities".into()),
                    },
                    LedgerGroup {
                        name: "Bank Accounts".into(),
                        parent: Some("Current Assets".into()),
                    },
                ],
            )
            .unwrap();
        let groups = store.list_groups("Acme").unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "Bank Accounts");
        assert_eq!(
            groups[1].parent.as_deref(),
            Some("Current Liabilities")
        );
        assert!(store.list_groups("Other").unwrap().is_empty());
    }

    #[test]
    fn test_sqlite_companies() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SqliteStore::open(dir.path().join("mirror.db")).unwrap();
        store
            .save_companies(&[
                Company { name: "Acme".into() },
                Company { name: "Test".into() },
            ])
            .unwrap();
        let names: Vec<String> = store
            .list_companies()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Acme", "Test"]);
    }
}
