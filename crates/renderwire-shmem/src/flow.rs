//! Per-sender outstanding-bytes accounting for shared-memory blobs.
//!
//! Every blob larger than the inline threshold reserves its byte count
//! against its sender's budget before allocation and releases it when the
//! receiver is done with the region. A guard ties the release to scope exit
//! so error paths cannot leak quota.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, ShmemError};

/// Identifies the originating process of a transaction.
pub type SenderId = i32;

/// Default per-sender budget: 512 MiB of outstanding shared-memory bytes.
pub const DEFAULT_FLOW_BUDGET: u64 = 512 * 1024 * 1024;

/// Tracks outstanding shared-memory bytes per sender against a fixed budget.
#[derive(Debug)]
pub struct FlowControlLedger {
    budget: u64,
    outstanding: Mutex<HashMap<SenderId, u64>>,
}

impl Default for FlowControlLedger {
    fn default() -> Self {
        Self::new(DEFAULT_FLOW_BUDGET)
    }
}

impl FlowControlLedger {
    pub fn new(budget: u64) -> Self {
        Self {
            budget,
            outstanding: Mutex::new(HashMap::new()),
        }
    }

    pub fn budget(&self) -> u64 {
        self.budget
    }

    /// Reserve `bytes` against `sender`'s budget.
    ///
    /// Fails without changing the ledger when the reservation would push the
    /// sender past its budget. The returned guard releases the reservation
    /// when dropped.
    pub fn try_acquire(&self, sender: SenderId, bytes: u64) -> Result<QuotaGuard<'_>> {
        let mut table = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        let current = table.get(&sender).copied().unwrap_or(0);
        let total = current.saturating_add(bytes);
        if total > self.budget {
            tracing::warn!(
                sender,
                requested = bytes,
                outstanding = current,
                budget = self.budget,
                "shared-memory quota exceeded, rejecting blob"
            );
            return Err(ShmemError::QuotaExceeded {
                sender,
                requested: bytes,
                outstanding: current,
                budget: self.budget,
            });
        }
        table.insert(sender, total);
        drop(table);
        Ok(QuotaGuard {
            ledger: self,
            sender,
            bytes,
        })
    }

    /// Bytes currently reserved for `sender`.
    pub fn outstanding(&self, sender: SenderId) -> u64 {
        let table = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        table.get(&sender).copied().unwrap_or(0)
    }

    fn release(&self, sender: SenderId, bytes: u64) {
        let mut table = self.outstanding.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(current) = table.get_mut(&sender) {
            *current = current.saturating_sub(bytes);
            if *current == 0 {
                table.remove(&sender);
            }
        }
    }
}

/// A held flow-control reservation. Dropping it returns the bytes to the
/// sender's budget.
#[derive(Debug)]
pub struct QuotaGuard<'a> {
    ledger: &'a FlowControlLedger,
    sender: SenderId,
    bytes: u64,
}

impl QuotaGuard<'_> {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for QuotaGuard<'_> {
    fn drop(&mut self) {
        self.ledger.release(self.sender, self.bytes);
    }
}
