pub mod amount;
pub mod config;
pub mod engine;
pub mod journal;
pub mod model;
pub mod report;

pub use amount::Amount;
pub use engine::{DEFAULT_HISTORY_LIMIT, Ledger, LedgerError, compute_balance, compute_history};
pub use model::{BonusRecord, RecordType, Transaction, TransactionKind};
