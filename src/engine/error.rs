//! Error types for ledger replay.

use jiff::Timestamp;
use thiserror::Error;

/// Message shown to users when a replay fails.
pub const LEDGER_ERROR_MESSAGE: &str = "Ошибка в расчете бонусов";

/// Fatal replay failure. A replay either completes or returns one of these;
/// there is no partial result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger computation error: expense at {period} needed more than {cap} lot pops")]
    IterationCapExceeded { period: Timestamp, cap: usize },

    #[error("ledger computation error: balance out of range at {period}")]
    AmountOverflow { period: Timestamp },
}

impl LedgerError {
    /// Text for the user-facing error envelope.
    pub fn user_message(&self) -> &'static str {
        LEDGER_ERROR_MESSAGE
    }
}
