//! Replay results and the shapes they are served in.
//!
//! Reports hold amounts rounded to cents. The response envelopes reproduce the
//! JSON the bonus endpoints have always returned, and history rows can also be
//! exported as csv.

use jiff::Timestamp;
use jiff::tz::TimeZone;
use serde::Serialize;
use std::io;

use crate::Amount;
use crate::engine::{LedgerError, Replay};
use crate::model::{Transaction, TransactionKind};

/// Currency label of the balance endpoint.
pub const CURRENCY: &str = "RUB";

/// Current balance of an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub balance: Amount,
}

impl From<Replay> for BalanceReport {
    fn from(replay: Replay) -> Self {
        Self {
            balance: replay.balance.round_cents(),
        }
    }
}

/// Newest-first history page plus the final balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryReport {
    pub transactions: Vec<Transaction>,
    /// Number of transactions before the limit was applied.
    pub total: usize,
    pub balance: Amount,
}

impl HistoryReport {
    /// Sort newest first (ties keep replay order), keep at most `limit` entries.
    pub fn new(replay: Replay, limit: usize) -> Self {
        let mut transactions = replay.transactions;
        transactions.sort_by(|a, b| b.date.cmp(&a.date));
        let total = transactions.len();
        transactions.truncate(limit);

        Self {
            transactions: transactions.iter().map(Transaction::rounded).collect(),
            total,
            balance: replay.balance.round_cents(),
        }
    }
}

/// Local wall-clock rendering used by every response, e.g. `2024-03-01T10:30:00`.
pub fn format_date(date: Timestamp, tz: &TimeZone) -> String {
    date.to_zoned(tz.clone())
        .strftime("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

/// One entry of the history response.
///
/// Accruals always carry `expires_at` and `valid_days`, possibly `null`;
/// other kinds leave both keys out.
#[derive(Debug, Serialize)]
pub struct TransactionRow {
    pub date: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: Amount,
    pub balance: Amount,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_days: Option<Option<u32>>,
}

impl TransactionRow {
    pub fn new(tx: &Transaction, tz: &TimeZone) -> Self {
        let accrual = tx.kind == TransactionKind::Accrual;
        Self {
            date: format_date(tx.date, tz),
            kind: tx.kind,
            amount: tx.amount,
            balance: tx.balance_after,
            description: tx.description(),
            expires_at: accrual.then(|| tx.expires_at.map(|date| format_date(date, tz))),
            valid_days: accrual.then_some(tx.valid_days),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub bonus_balance: Amount,
    pub currency: &'static str,
}

impl BalanceResponse {
    pub fn new(report: &BalanceReport, user_id: Option<String>) -> Self {
        Self {
            success: true,
            user_id,
            bonus_balance: report.balance,
            currency: CURRENCY,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub transactions: Vec<TransactionRow>,
    pub total: usize,
    pub current_balance: Amount,
}

impl HistoryResponse {
    pub fn new(report: &HistoryReport, user_id: Option<String>, tz: &TimeZone) -> Self {
        Self {
            success: true,
            user_id,
            transactions: report
                .transactions
                .iter()
                .map(|tx| TransactionRow::new(tx, tz))
                .collect(),
            total: report.total,
            current_balance: report.balance,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

impl From<&LedgerError> for ErrorResponse {
    fn from(err: &LedgerError) -> Self {
        Self::new(err.user_message())
    }
}

#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    date: String,
    r#type: &'static str,
    amount: String,
    balance: String,
    description: &'a str,
    expires_at: Option<String>,
    valid_days: Option<u32>,
}

/// Write history rows in csv format
pub fn write_history_csv(
    report: &HistoryReport,
    tz: &TimeZone,
    writer: impl io::Write,
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);

    for tx in &report.transactions {
        let row = CsvRow {
            date: format_date(tx.date, tz),
            r#type: tx.kind.as_str(),
            amount: format!("{:.2}", tx.amount),
            balance: format!("{:.2}", tx.balance_after),
            description: tx.description(),
            expires_at: tx.expires_at.map(|date| format_date(date, tz)),
            valid_days: tx.valid_days,
        };
        writer.serialize(&row)?;
    }

    writer.flush()?;
    Ok(())
}
