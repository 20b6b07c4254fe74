//! In-memory reserve sink.

use parking_lot::Mutex;

use super::traits::{BoxFuture, ReserveSink, StoreResult};

/// One deposit into the reserve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReserveDeposit {
    pub cycle_number: u64,
    pub amount: f64,
}

/// Reserve that records every deposit.
#[derive(Debug, Default)]
pub struct MemoryReserve {
    deposits: Mutex<Vec<ReserveDeposit>>,
}

impl MemoryReserve {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of all deposits.
    pub fn balance(&self) -> f64 {
        self.deposits.lock().iter().map(|d| d.amount).sum()
    }

    /// Sum of deposits made for one cycle.
    pub fn deposited_for(&self, cycle_number: u64) -> f64 {
        self.deposits
            .lock()
            .iter()
            .filter(|d| d.cycle_number == cycle_number)
            .map(|d| d.amount)
            .sum()
    }

    pub fn deposits(&self) -> Vec<ReserveDeposit> {
        self.deposits.lock().clone()
    }
}

impl ReserveSink for MemoryReserve {
    fn deposit(&self, cycle_number: u64, amount: f64) -> BoxFuture<'_, StoreResult<()>> {
        self.deposits.lock().push(ReserveDeposit {
            cycle_number,
            amount,
        });
        Box::pin(std::future::ready(Ok(())))
    }
}
