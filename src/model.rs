//! Core domain types for the bonus ledger.

use jiff::Timestamp;
use serde::Serialize;

use crate::Amount;

/// Kind of a journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    /// Points credited to the account.
    Receipt,
    /// Points debited from the account.
    Expense,
}

impl RecordType {
    /// Map the journal's `RecordType` string. Unknown kinds yield `None`.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "Receipt" => Some(RecordType::Receipt),
            "Expense" => Some(RecordType::Expense),
            _ => None,
        }
    }
}

/// One entry of an account's append-only bonus journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusRecord {
    pub record_type: RecordType,
    /// Effective time of the record.
    pub period: Timestamp,
    /// Magnitude of the receipt or expense, never negative.
    pub amount: Amount,
    /// Forfeit time of the points from a receipt. Always `None` on expenses.
    pub expiry: Option<Timestamp>,
    /// Validity window in days, as stated by the journal.
    pub valid_days: Option<u32>,
}

impl BonusRecord {
    pub fn receipt(period: Timestamp, amount: Amount, expiry: Option<Timestamp>) -> Self {
        Self {
            record_type: RecordType::Receipt,
            period,
            amount,
            expiry,
            valid_days: None,
        }
    }

    pub fn expense(period: Timestamp, amount: Amount) -> Self {
        Self {
            record_type: RecordType::Expense,
            period,
            amount,
            expiry: None,
            valid_days: None,
        }
    }

    pub fn with_valid_days(mut self, days: u32) -> Self {
        self.valid_days = Some(days);
        self
    }
}

/// Kind of an emitted history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Accrual,
    Deduction,
    Expiration,
}

impl TransactionKind {
    /// User-facing description shown next to the entry.
    pub fn description(self) -> &'static str {
        match self {
            TransactionKind::Accrual => "Начисление бонусов",
            TransactionKind::Deduction => "Списание бонусов",
            TransactionKind::Expiration => "Истек срок действия бонусов",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Accrual => "accrual",
            TransactionKind::Deduction => "deduction",
            TransactionKind::Expiration => "expiration",
        }
    }
}

/// A history entry produced by replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub date: Timestamp,
    pub kind: TransactionKind,
    pub amount: Amount,
    /// Running balance right after this entry was applied.
    pub balance_after: Amount,
    /// Only set on accruals.
    pub expires_at: Option<Timestamp>,
    /// Only set on accruals.
    pub valid_days: Option<u32>,
}

impl Transaction {
    pub fn accrual(record: &BonusRecord, balance_after: Amount) -> Self {
        Self {
            date: record.period,
            kind: TransactionKind::Accrual,
            amount: record.amount,
            balance_after,
            expires_at: record.expiry,
            valid_days: record.valid_days,
        }
    }

    pub fn deduction(record: &BonusRecord, balance_after: Amount) -> Self {
        Self {
            date: record.period,
            kind: TransactionKind::Deduction,
            amount: record.amount,
            balance_after,
            expires_at: None,
            valid_days: None,
        }
    }

    pub fn expiration(date: Timestamp, amount: Amount, balance_after: Amount) -> Self {
        Self {
            date,
            kind: TransactionKind::Expiration,
            amount,
            balance_after,
            expires_at: None,
            valid_days: None,
        }
    }

    pub fn description(&self) -> &'static str {
        self.kind.description()
    }

    /// Copy with amounts rounded to cents, as presented to callers.
    pub fn rounded(&self) -> Self {
        Self {
            amount: self.amount.round_cents(),
            balance_after: self.balance_after.round_cents(),
            ..self.clone()
        }
    }
}
