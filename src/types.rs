//! Common types shared by the statement parser, voucher mapper, and store.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Represents a single bank statement transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque generated identifier (uuid).
    pub id: String,

    /// Booking date of the transaction.
    pub date: NaiveDate,

    /// Value date as reported by the bank.
    pub value_date: NaiveDate,

    /// Free-text description from the statement.
    pub narration: String,

    /// Cheque / reference number. Not guaranteed unique or present.
    pub ref_no: String,

    /// Amount withdrawn. Zero for credit transactions.
    pub withdrawal_amount: Decimal,

    /// Amount deposited. Zero for debit transactions.
    pub deposit_amount: Decimal,

    /// Running balance as reported by the statement; recomputed after edits.
    pub closing_balance: Decimal,

    /// Debit or credit, derived from which amount is non-zero.
    pub transaction_type: TransactionType,

    /// Coarse classification derived from the narration.
    pub category: Category,

    /// Source ledger, assigned before push.
    pub from_ledger: Option<String>,

    /// Destination ledger, assigned before push.
    pub to_ledger: Option<String>,

    /// Voucher type override, assigned before push.
    pub voucher: Option<String>,

    /// Free-form workflow status.
    pub status: Option<String>,
}

impl Transaction {
    /// The single non-zero amount of this transaction.
    pub fn amount(&self) -> Decimal {
        match self.transaction_type {
            TransactionType::Debit => self.withdrawal_amount,
            TransactionType::Credit => self.deposit_amount,
        }
    }
}

/// Debit/credit indicator derived from the amount columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Outgoing money (withdrawal column non-zero).
    Debit,
    /// Incoming money (deposit column non-zero).
    Credit,
}

impl TransactionType {
    /// Derive the indicator from the withdrawal amount.
    pub fn from_amounts(withdrawal: Decimal, _deposit: Decimal) -> Self {
        if withdrawal > Decimal::ZERO {
            TransactionType::Debit
        } else {
            TransactionType::Credit
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Debit => "debit",
            TransactionType::Credit => "credit",
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "debit" | "d" => Ok(TransactionType::Debit),
            "credit" | "c" => Ok(TransactionType::Credit),
            _ => Err(format!("Invalid transaction type: {}", s)),
        }
    }
}

/// Coarse transaction classification by narration substring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    /// Narration carries the UPI network marker.
    UpiPayment,
    /// Everything else.
    Other,
}

impl Category {
    /// Classify a narration string.
    pub fn from_narration(narration: &str) -> Self {
        if narration.contains("UPI") {
            Category::UpiPayment
        } else {
            Category::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::UpiPayment => "UPI Payment",
            Category::Other => "Other",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "UPI Payment" => Ok(Category::UpiPayment),
            "Other" => Ok(Category::Other),
            _ => Err(format!("Invalid category: {}", s)),
        }
    }
}

/// An uploaded statement with its parsed transactions, keyed by a generated id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Generated statement identifier.
    pub id: String,

    /// Tally company this statement belongs to.
    pub company: String,

    /// Originating bank name.
    pub bank: String,

    /// Balance before the first transaction, derived from the first row's
    /// reported closing balance at upload time. Kept on the statement so
    /// balance recomputes survive edits to the first transaction's amounts.
    pub opening_balance: Decimal,

    /// Transactions in original statement order.
    pub transactions: Vec<Transaction>,
}

impl Statement {
    /// Create an empty statement.
    pub fn new(id: String, company: String, bank: String) -> Self {
        Self {
            id,
            company,
            bank,
            opening_balance: Decimal::ZERO,
            transactions: Vec::new(),
        }
    }

    /// Find a transaction by id.
    pub fn transaction_mut(&mut self, id: &str) -> Option<&mut Transaction> {
        self.transactions.iter_mut().find(|t| t.id == id)
    }

    /// Derive the opening position from the first row's reported balance and
    /// amounts. Must run once, on as-parsed data, before any amount is
    /// edited; later recomputes replay from this stored value.
    pub fn seed_opening_balance(&mut self) {
        if let Some(first) = self.transactions.first() {
            self.opening_balance =
                first.closing_balance - (first.deposit_amount - first.withdrawal_amount);
        }
    }

    /// Recompute every closing balance with running-sum semantics: credits
    /// add, debits subtract. Replays from the stored opening position, so an
    /// edit to any transaction's amount, including the first, flows through
    /// its own closing balance and all subsequent rows.
    pub fn recompute_balances(&mut self) {
        let mut balance = self.opening_balance;
        for tx in &mut self.transactions {
            match tx.transaction_type {
                TransactionType::Debit => balance -= tx.withdrawal_amount,
                TransactionType::Credit => balance += tx.deposit_amount,
            }
            tx.closing_balance = balance;
        }
    }
}

/// A ledger mirrored from Tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    /// Ledger name.
    pub name: String,

    /// Parent group name, when Tally reports one.
    pub parent: Option<String>,
}

/// A ledger group mirrored from Tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerGroup {
    /// Group name.
    pub name: String,

    /// Parent group name, when Tally reports one.
    pub parent: Option<String>,
}

/// A company known to Tally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    /// Company name as reported by Tally.
    pub name: String,
}

/// Whitelisted field set for patching a stored transaction. All fields other
/// than `id` are optional; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPatch {
    /// Id of the transaction to patch.
    pub id: String,
    pub from_ledger: Option<String>,
    pub to_ledger: Option<String>,
    pub voucher: Option<String>,
    pub status: Option<String>,
    pub narration: Option<String>,
    /// Replaces the non-zero amount; the zero side stays zero.
    pub amount: Option<Decimal>,
}

impl TransactionPatch {
    /// Apply this patch to a transaction. The amount lands on whichever side
    /// the transaction type dictates; the other side is forced to zero.
    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(ref v) = self.from_ledger {
            tx.from_ledger = Some(v.clone());
        }
        if let Some(ref v) = self.to_ledger {
            tx.to_ledger = Some(v.clone());
        }
        if let Some(ref v) = self.voucher {
            tx.voucher = Some(v.clone());
        }
        if let Some(ref v) = self.status {
            tx.status = Some(v.clone());
        }
        if let Some(ref v) = self.narration {
            tx.narration = v.clone();
            tx.category = Category::from_narration(v);
        }
        if let Some(amount) = self.amount {
            match tx.transaction_type {
                TransactionType::Debit => {
                    tx.withdrawal_amount = amount;
                    tx.deposit_amount = Decimal::ZERO;
                }
                TransactionType::Credit => {
                    tx.deposit_amount = amount;
                    tx.withdrawal_amount = Decimal::ZERO;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn txn(id: &str, withdrawal: &str, deposit: &str, closing: &str) -> Transaction {
        let withdrawal = Decimal::from_str(withdrawal).unwrap();
        let deposit = Decimal::from_str(deposit).unwrap();
        Transaction {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            value_date: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            narration: "UPI-Vendor-123".into(),
            ref_no: "REF1".into(),
            withdrawal_amount: withdrawal,
            deposit_amount: deposit,
            closing_balance: Decimal::from_str(closing).unwrap(),
            transaction_type: TransactionType::from_amounts(withdrawal, deposit),
            category: Category::UpiPayment,
            from_ledger: None,
            to_ledger: None,
            voucher: None,
            status: None,
        }
    }

    #[test]
    fn test_transaction_type_derivation() {
        assert_eq!(
            TransactionType::from_amounts(Decimal::from(100), Decimal::ZERO),
            TransactionType::Debit
        );
        assert_eq!(
            TransactionType::from_amounts(Decimal::ZERO, Decimal::from(100)),
            TransactionType::Credit
        );
    }

    #[test]
    fn test_category_from_narration() {
        assert_eq!(
            Category::from_narration("UPI-JohnDoe-ref123"),
            Category::UpiPayment
        );
        assert_eq!(Category::from_narration("NEFT transfer"), Category::Other);
    }

    #[test]
    fn test_recompute_balances_after_amount_edit() {
        let mut statement = Statement::new("s1".into(), "Test".into(), "HDFC".into());
        // Opening position 1000: -100, +50, -200.
        statement.transactions = vec![
            txn("t1", "100", "0", "900"),
            txn("t2", "0", "50", "950"),
            txn("t3", "200", "0", "750"),
        ];
        statement.seed_opening_balance();
        assert_eq!(statement.opening_balance, Decimal::from(1000));

        // Edit the middle deposit from 50 to 500.
        let patch = TransactionPatch {
            id: "t2".into(),
            amount: Some(Decimal::from(500)),
            ..Default::default()
        };
        patch.apply(statement.transaction_mut("t2").unwrap());
        statement.recompute_balances();

        let balances: Vec<String> = statement
            .transactions
            .iter()
            .map(|t| t.closing_balance.to_string())
            .collect();
        assert_eq!(balances, vec!["900", "1400", "1200"]);
    }

    #[test]
    fn test_recompute_balances_after_first_row_edit() {
        let mut statement = Statement::new("s1".into(), "Test".into(), "HDFC".into());
        statement.transactions = vec![txn("t1", "100", "0", "900"), txn("t2", "0", "50", "950")];
        statement.seed_opening_balance();

        // Raise the first debit from 100 to 500; the opening position must
        // not absorb the edit.
        let patch = TransactionPatch {
            id: "t1".into(),
            amount: Some(Decimal::from(500)),
            ..Default::default()
        };
        patch.apply(statement.transaction_mut("t1").unwrap());
        statement.recompute_balances();

        assert_eq!(statement.opening_balance, Decimal::from(1000));
        assert_eq!(statement.transactions[0].closing_balance.to_string(), "500");
        assert_eq!(statement.transactions[1].closing_balance.to_string(), "550");
    }

    #[test]
    fn test_patch_amount_zeroes_opposite_side() {
        let mut tx = txn("t1", "100", "0", "900");
        let patch = TransactionPatch {
            id: "t1".into(),
            amount: Some(Decimal::from(250)),
            ..Default::default()
        };
        patch.apply(&mut tx);
        assert_eq!(tx.withdrawal_amount, Decimal::from(250));
        assert_eq!(tx.deposit_amount, Decimal::ZERO);
    }

    #[test]
    fn test_patch_narration_reclassifies() {
        let mut tx = txn("t1", "100", "0", "900");
        let patch = TransactionPatch {
            id: "t1".into(),
            narration: Some("NEFT to landlord".into()),
            ..Default::default()
        };
        patch.apply(&mut tx);
        assert_eq!(tx.category, Category::Other);
    }
}
