//! HDFC bank statement parser.
//!
//! The export is a header-less grid: a preamble of account details, a header
//! row locatable only by its marker column names, the transaction rows, and a
//! summary trailer. The column layout is tied to this one bank's export and is
//! deliberately not generalized.

use crate::error::{Error, Result};
use crate::types::{Category, Transaction, TransactionType};
use chrono::NaiveDate;
use csv::ReaderBuilder;
use rust_decimal::Decimal;
use std::io::Read;
use std::str::FromStr;
use tracing::warn;
use uuid::Uuid;

/// Marker cells identifying the header row.
const HEADER_DATE: &str = "Date";
const HEADER_NARRATION: &str = "Narration";

/// Trailer marker in the date column designating end-of-transactions.
const TRAILER_MARKER: &str = "STATEMENT SUMMARY";

/// Fixed day/month/two-digit-year format used by the export.
const DATE_FORMAT: &str = "%d/%m/%y";

/// Column names of the fields we extract.
const COL_REF_NO: &str = "Chq./Ref.No.";
const COL_VALUE_DATE: &str = "Value Dt";
const COL_WITHDRAWAL: &str = "Withdrawal Amt.";
const COL_DEPOSIT: &str = "Deposit Amt.";
const COL_CLOSING: &str = "Closing Balance";

/// A parsed HDFC statement export.
#[derive(Debug, Clone, PartialEq)]
pub struct HdfcStatement {
    /// Transactions in original row order. May be empty.
    pub transactions: Vec<Transaction>,
}

impl HdfcStatement {
    /// Parse a statement from any source implementing `Read`.
    ///
    /// Fails only with [`Error::HeaderNotFound`] (no row contains both the
    /// `Date` and `Narration` markers) or an I/O-level CSV error. Once the
    /// header is located, malformed rows are logged and dropped rather than
    /// aborting the batch.
    pub fn from_read<R: Read>(reader: &mut R) -> Result<Self> {
        let grid = read_grid(reader)?;
        Self::from_grid(&grid)
    }

    /// Parse from an in-memory 2-D grid of cells.
    pub fn from_grid(grid: &[Vec<String>]) -> Result<Self> {
        let header_row = grid
            .iter()
            .position(|row| {
                let has = |marker: &str| row.iter().any(|cell| cell.trim() == marker);
                has(HEADER_DATE) && has(HEADER_NARRATION)
            })
            .ok_or(Error::HeaderNotFound)?;

        let columns = Columns::from_header(&grid[header_row]);
        let mut transactions = Vec::new();

        for (idx, row) in grid.iter().enumerate().skip(header_row + 1) {
            let date_cell = columns.cell(row, columns.date);
            if is_blank(&date_cell) || date_cell.contains(TRAILER_MARKER) {
                break;
            }
            match parse_row(&columns, row) {
                Ok(tx) => transactions.push(tx),
                Err(e) => warn!(row = idx, error = %e, "skipping malformed statement row"),
            }
        }

        Ok(HdfcStatement { transactions })
    }
}

/// Resolved column positions of the header row. Missing optional columns map
/// to `None` and yield blank/zero values, so only the marker columns are
/// load-bearing.
struct Columns {
    date: Option<usize>,
    narration: Option<usize>,
    ref_no: Option<usize>,
    value_date: Option<usize>,
    withdrawal: Option<usize>,
    deposit: Option<usize>,
    closing: Option<usize>,
}

impl Columns {
    fn from_header(header: &[String]) -> Self {
        let find = |name: &str| header.iter().position(|cell| cell.trim() == name);
        Self {
            date: find(HEADER_DATE),
            narration: find(HEADER_NARRATION),
            ref_no: find(COL_REF_NO),
            value_date: find(COL_VALUE_DATE),
            withdrawal: find(COL_WITHDRAWAL),
            deposit: find(COL_DEPOSIT),
            closing: find(COL_CLOSING),
        }
    }

    fn cell(&self, row: &[String], index: Option<usize>) -> String {
        index
            .and_then(|i| row.get(i))
            .map(|cell| cell.trim().to_string())
            .unwrap_or_default()
    }
}

fn read_grid<R: Read>(reader: &mut R) -> Result<Vec<Vec<String>>> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut grid = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        grid.push(record.iter().map(|cell| cell.to_string()).collect());
    }
    Ok(grid)
}

fn parse_row(columns: &Columns, row: &[String]) -> Result<Transaction> {
    let date = parse_date(&columns.cell(row, columns.date))?;
    let value_date = parse_date(&columns.cell(row, columns.value_date))?;
    let narration = columns.cell(row, columns.narration);
    let ref_no = columns.cell(row, columns.ref_no);

    let withdrawal_amount = parse_amount(&columns.cell(row, columns.withdrawal));
    let deposit_amount = parse_amount(&columns.cell(row, columns.deposit));
    let closing_balance = parse_amount(&columns.cell(row, columns.closing));

    // Exactly one side may carry money. The source never legitimately fills
    // both, so a row that does is treated as corrupt rather than guessing.
    if withdrawal_amount > Decimal::ZERO && deposit_amount > Decimal::ZERO {
        return Err(Error::Validation(format!(
            "withdrawal ({}) and deposit ({}) both positive",
            withdrawal_amount, deposit_amount
        )));
    }

    let transaction_type = TransactionType::from_amounts(withdrawal_amount, deposit_amount);
    let category = Category::from_narration(&narration);

    Ok(Transaction {
        id: Uuid::new_v4().to_string(),
        date,
        value_date,
        narration,
        ref_no,
        withdrawal_amount,
        deposit_amount,
        closing_balance,
        transaction_type,
        category,
        from_ledger: None,
        to_ledger: None,
        voucher: None,
        status: None,
    })
}

fn parse_date(cell: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(cell.trim(), DATE_FORMAT)
        .map_err(|_| Error::InvalidDate(cell.to_string()))
}

/// Coerce a numeric cell to a decimal. Thousands separators are stripped;
/// blank, `nan`, or unparseable text becomes zero, never an error.
fn parse_amount(cell: &str) -> Decimal {
    let cleaned = cell.trim().replace(',', "");
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("nan") {
        return Decimal::ZERO;
    }
    Decimal::from_str(&cleaned).unwrap_or(Decimal::ZERO)
}

fn is_blank(cell: &str) -> bool {
    let trimmed = cell.trim();
    trimmed.is_empty() || trimmed.eq_ignore_ascii_case("nan")
}
