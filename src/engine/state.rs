use jiff::Timestamp;

use crate::amount::{Amount, AmountOverflow};

/// The still-outstanding part of one past receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lot {
    pub amount: Amount,
    pub expiry: Option<Timestamp>,
}

impl Lot {
    pub fn new(amount: Amount, expiry: Option<Timestamp>) -> Self {
        Self { amount, expiry }
    }

    /// A lot is expired at `at` once its expiry is strictly earlier.
    pub fn is_expired_at(&self, at: Timestamp) -> bool {
        self.expiry.is_some_and(|expiry| expiry < at)
    }
}

/// Outstanding lots, most recent receipt on top.
///
/// Both consumption and expiry sweeps only ever look at the top, so a lot
/// buried under a newer one is untouched until everything above it is gone.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LotStack {
    lots: Vec<Lot>,
}

impl LotStack {
    pub fn push(&mut self, lot: Lot) {
        self.lots.push(lot);
    }

    pub fn pop(&mut self) -> Option<Lot> {
        self.lots.pop()
    }

    /// Pop the top lot only if it is expired at `at`.
    pub fn pop_expired(&mut self, at: Timestamp) -> Option<Lot> {
        match self.lots.last() {
            Some(top) if top.is_expired_at(at) => self.lots.pop(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }

    /// Lots from bottom (oldest) to top (newest).
    pub fn as_slice(&self) -> &[Lot] {
        &self.lots
    }
}

/// Working state of one replay.
#[derive(Debug, Default)]
pub struct LedgerState {
    pub balance: Amount,
    pub lots: LotStack,
    /// Everything removed by expiry so far.
    pub forfeited: Amount,
}

/// State is left untouched when an operation overflows.
impl LedgerState {
    pub fn credit(&mut self, amount: Amount) -> Result<(), AmountOverflow> {
        self.balance = self.balance.checked_add(amount)?;
        Ok(())
    }

    pub fn debit(&mut self, amount: Amount) -> Result<(), AmountOverflow> {
        self.balance = self.balance.checked_sub(amount)?;
        Ok(())
    }

    pub fn forfeit(&mut self, amount: Amount) -> Result<(), AmountOverflow> {
        let balance = self.balance.checked_sub(amount)?;
        self.forfeited = self.forfeited.checked_add(amount)?;
        self.balance = balance;
        Ok(())
    }
}
