//! Bonus ledger replay engine.
//!
//! The engine rebuilds an account's balance from its full journal on every
//! call. Receipts push a lot onto a stack, expenses consume lots from the top
//! of that stack, and lots whose expiry has passed are forfeited whenever the
//! replay reaches them. History mode additionally records every accrual,
//! deduction and expiration in the order it happened.

use jiff::Timestamp;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, error, warn};

use crate::Amount;
use crate::model::{BonusRecord, RecordType, Transaction};
use crate::report::{BalanceReport, HistoryReport};

mod state;
pub use state::{LedgerState, Lot, LotStack};

mod error;
pub use error::{LEDGER_ERROR_MESSAGE, LedgerError};

/// Upper bound on lot pops while resolving a single expense.
pub const DEFAULT_ITERATION_CAP: usize = 100_000;

/// Number of history entries returned when the caller gives no limit.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Replays one account's journal.
///
/// Created fresh for every query and consumed by [`Ledger::finish`].
#[derive(Debug)]
pub struct Ledger {
    state: LedgerState,
    /// `None` in balance-only mode
    history: Option<Vec<Transaction>>,
    iteration_cap: usize,
    last_period: Option<Timestamp>,
}

/// Outcome of a finished replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replay {
    pub balance: Amount,
    pub forfeited: Amount,
    /// Emission order, empty in balance-only mode.
    pub transactions: Vec<Transaction>,
}

/// Compute the current balance of a journal.
pub fn compute_balance(
    records: &[BonusRecord],
    now: Timestamp,
) -> Result<BalanceReport, LedgerError> {
    let mut ledger = Ledger::new();
    ledger.apply_all(records)?;
    Ok(BalanceReport::from(ledger.finish(now)?))
}

/// Compute the balance and the newest-first transaction history of a journal.
pub fn compute_history(
    records: &[BonusRecord],
    limit: usize,
    now: Timestamp,
) -> Result<HistoryReport, LedgerError> {
    let mut ledger = Ledger::recording();
    ledger.apply_all(records)?;
    Ok(HistoryReport::new(ledger.finish(now)?, limit))
}

/// Public API
impl Ledger {
    /// Balance-only replay.
    pub fn new() -> Self {
        Self {
            state: LedgerState::default(),
            history: None,
            iteration_cap: DEFAULT_ITERATION_CAP,
            last_period: None,
        }
    }

    /// Replay that also records the transaction history.
    pub fn recording() -> Self {
        Self {
            history: Some(Vec::new()),
            ..Self::new()
        }
    }

    pub fn with_iteration_cap(mut self, cap: usize) -> Self {
        self.iteration_cap = cap;
        self
    }

    pub fn balance(&self) -> Amount {
        self.state.balance
    }

    pub fn forfeited(&self) -> Amount {
        self.state.forfeited
    }

    pub fn lots(&self) -> &LotStack {
        &self.state.lots
    }

    /// Run the ledger over a stream of records, stopping at the first fatal error.
    pub async fn run(
        &mut self,
        mut stream: impl Stream<Item = BonusRecord> + Unpin,
    ) -> Result<(), LedgerError> {
        while let Some(record) = stream.next().await {
            self.apply(&record)?;
        }
        Ok(())
    }

    pub fn apply_all(&mut self, records: &[BonusRecord]) -> Result<(), LedgerError> {
        records.iter().try_for_each(|record| self.apply(record))
    }

    /// Apply a single journal record on top of the current state.
    pub fn apply(&mut self, record: &BonusRecord) -> Result<(), LedgerError> {
        self.check_order(record.period);
        let result = match record.record_type {
            RecordType::Receipt => self.apply_receipt(record),
            RecordType::Expense => self.apply_expense(record),
        };
        match &result {
            Ok(()) => debug!(
                kind = ?record.record_type,
                period = %record.period,
                amount = %record.amount,
                balance = %self.state.balance,
                "record applied"
            ),
            Err(e) => error!(
                kind = ?record.record_type,
                period = %record.period,
                amount = %record.amount,
                reason = %e,
                "record failed"
            ),
        }
        result
    }

    /// Forfeit whatever has expired by `now` and return the outcome.
    ///
    /// Unlike the sweep before a receipt, this drains the whole stack: every
    /// lot expired at `now` is forfeited, wherever it sits.
    pub fn finish(mut self, now: Timestamp) -> Result<Replay, LedgerError> {
        while let Some(lot) = self.state.lots.pop() {
            if let Some(expiry) = lot.expiry.filter(|expiry| *expiry < now) {
                self.forfeit(lot, expiry)?;
            }
        }
        Ok(Replay {
            balance: self.state.balance,
            forfeited: self.state.forfeited,
            transactions: self.history.unwrap_or_default(),
        })
    }
}

/// Private API
impl Ledger {
    fn emit(&mut self, tx: impl FnOnce() -> Transaction) {
        if let Some(history) = self.history.as_mut() {
            history.push(tx());
        }
    }

    fn check_order(&mut self, period: Timestamp) {
        if let Some(last) = self.last_period {
            if period < last {
                warn!(
                    period = %period,
                    previous = %last,
                    "journal record out of chronological order, replaying as given"
                );
            }
        }
        self.last_period = Some(period);
    }

    fn forfeit(&mut self, lot: Lot, date: Timestamp) -> Result<(), LedgerError> {
        self.state
            .forfeit(lot.amount)
            .map_err(|_| LedgerError::AmountOverflow { period: date })?;
        debug!(
            date = %date,
            amount = %lot.amount,
            balance = %self.state.balance,
            "lot forfeited"
        );
        let balance = self.state.balance;
        self.emit(|| Transaction::expiration(date, lot.amount, balance));
        Ok(())
    }

    /// Apply a `RecordType::Receipt`:
    /// - Forfeit lots from the top of the stack while they are expired at the receipt's period
    /// - Credit the amount and push it as a new lot
    fn apply_receipt(&mut self, record: &BonusRecord) -> Result<(), LedgerError> {
        while let Some(lot) = self.state.lots.pop_expired(record.period) {
            let date = lot.expiry.unwrap_or(record.period);
            self.forfeit(lot, date)?;
        }

        self.state
            .credit(record.amount)
            .map_err(|_| LedgerError::AmountOverflow {
                period: record.period,
            })?;
        self.state.lots.push(Lot::new(record.amount, record.expiry));

        let balance = self.state.balance;
        self.emit(|| Transaction::accrual(record, balance));
        Ok(())
    }

    /// Apply a `RecordType::Expense`:
    /// - Debit the full amount up front
    /// - Pop lots from the top until the amount is covered or the stack is empty;
    ///   expired lots met on the way are forfeited and do not cover anything
    /// - A partially used lot goes back on the stack with what is left
    ///
    /// The balance may go negative; nothing is clamped.
    fn apply_expense(&mut self, record: &BonusRecord) -> Result<(), LedgerError> {
        self.state
            .debit(record.amount)
            .map_err(|_| LedgerError::AmountOverflow {
                period: record.period,
            })?;
        let mut remaining = record.amount;
        let mut pops = 0usize;

        while let Some(mut lot) = self.state.lots.pop() {
            pops += 1;

            if lot.is_expired_at(record.period) {
                // dated at the expense, not at the lot's own expiry
                self.forfeit(lot, record.period)?;
            } else if lot.amount > remaining {
                lot.amount -= remaining;
                remaining = Amount::ZERO;
                self.state.lots.push(lot);
            } else {
                remaining -= lot.amount;
            }

            if remaining <= Amount::ZERO {
                break;
            }
            if pops > self.iteration_cap {
                return Err(LedgerError::IterationCapExceeded {
                    period: record.period,
                    cap: self.iteration_cap,
                });
            }
        }

        let balance = self.state.balance;
        self.emit(|| Transaction::deduction(record, balance));
        Ok(())
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}
