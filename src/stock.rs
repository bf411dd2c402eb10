// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 The cheki-engine authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Stock ledger: the authoritative per-product unit counters.
//!
//! Every counter is mutated through a single compare-and-swap, never through
//! a separate read followed by a write. Two callers racing for the last unit
//! therefore serialize inside the CPU's CAS; exactly one wins.
//!
//! # Example
//!
//! ```
//! use cheki_engine::{ProductKey, StockLedger};
//!
//! let ledger = StockLedger::new();
//! let group = ProductKey::from("group-cheki");
//! ledger.set_absolute(&group, 2);
//! assert_eq!(ledger.try_reserve(&group, 1), Ok(1));
//! assert!(ledger.try_reserve(&group, 2).is_err());
//! ```

use crate::base::ProductKey;
use crate::error::TicketError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU32, Ordering};

/// Per-product counters of unsold units.
///
/// Counters are `AtomicU32`s living in a concurrent map; the map shard lock
/// is held only long enough to reach the atomic, and the decrement itself is
/// a CAS loop. A counter never goes negative: the reservation that would
/// take it below zero fails instead.
#[derive(Debug, Default)]
pub struct StockLedger {
    counters: DashMap<ProductKey, AtomicU32>,
}

impl StockLedger {
    pub fn new() -> Self {
        StockLedger {
            counters: DashMap::new(),
        }
    }

    /// Current unit count for a product.
    pub fn available(&self, product: &ProductKey) -> Result<u32, TicketError> {
        self.counters
            .get(product)
            .map(|counter| counter.load(Ordering::Acquire))
            .ok_or_else(|| TicketError::UnknownProduct(product.clone()))
    }

    /// Read-only availability probe for early rejection.
    ///
    /// Not authoritative under races: a `true` here can still lose to a
    /// concurrent reservation. Only `try_reserve` decides.
    pub fn check_available(&self, product: &ProductKey, quantity: u32) -> Result<bool, TicketError> {
        Ok(self.available(product)? >= quantity)
    }

    /// Atomically takes `quantity` units, returning the new balance.
    ///
    /// The check and the decrement are one CAS; on failure nothing is
    /// mutated and the error carries the count observed at the losing
    /// attempt.
    pub fn try_reserve(&self, product: &ProductKey, quantity: u32) -> Result<u32, TicketError> {
        if quantity == 0 {
            return Err(TicketError::InvalidQuantity);
        }
        let counter = self
            .counters
            .get(product)
            .ok_or_else(|| TicketError::UnknownProduct(product.clone()))?;
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(quantity)
            })
            .map(|previous| previous - quantity)
            .map_err(|available| TicketError::InsufficientStock {
                product: product.clone(),
                requested: quantity,
                available,
            })
    }

    /// Takes every demand or none of them.
    ///
    /// Demands are reserved left to right; the first failure rolls back the
    /// prefix already taken before the error is returned. Callers pass one
    /// entry per product (summed quantities).
    pub fn try_reserve_all(&self, demands: &[(ProductKey, u32)]) -> Result<(), TicketError> {
        for (index, (product, quantity)) in demands.iter().enumerate() {
            if let Err(error) = self.try_reserve(product, *quantity) {
                for (taken_product, taken_quantity) in &demands[..index] {
                    // the counter existed a moment ago; restore cannot fail
                    let _rollback = self.restore(taken_product, *taken_quantity);
                    debug_assert!(_rollback.is_ok());
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Atomically returns `quantity` units, saturating at `u32::MAX`.
    pub fn restore(&self, product: &ProductKey, quantity: u32) -> Result<u32, TicketError> {
        if quantity == 0 {
            return Err(TicketError::InvalidQuantity);
        }
        let counter = self
            .counters
            .get(product)
            .ok_or_else(|| TicketError::UnknownProduct(product.clone()))?;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            let next = current.saturating_add(quantity);
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Overwrites a counter, creating the product if missing.
    ///
    /// Bypasses reserve/restore bookkeeping; the caller is responsible for
    /// attributing this to an operator. Returns the previous count (zero for
    /// a new product).
    pub fn set_absolute(&self, product: &ProductKey, new_value: u32) -> u32 {
        match self.counters.entry(product.clone()) {
            Entry::Occupied(entry) => entry.get().swap(new_value, Ordering::AcqRel),
            Entry::Vacant(entry) => {
                entry.insert(AtomicU32::new(new_value));
                0
            }
        }
    }

    /// Moves a counter by a signed delta, clamping at zero.
    ///
    /// Returns `(previous, resulting)` counts.
    pub fn adjust(&self, product: &ProductKey, delta: i64) -> Result<(u32, u32), TicketError> {
        let counter = self
            .counters
            .get(product)
            .ok_or_else(|| TicketError::UnknownProduct(product.clone()))?;
        let mut current = counter.load(Ordering::Acquire);
        loop {
            let next = i64::from(current)
                .saturating_add(delta)
                .clamp(0, i64::from(u32::MAX)) as u32;
            match counter.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Ok((current, next)),
                Err(actual) => current = actual,
            }
        }
    }

    /// Copies out every counter, sorted by product key.
    pub fn snapshot(&self) -> Vec<(ProductKey, u32)> {
        let mut out: Vec<(ProductKey, u32)> = self
            .counters
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().load(Ordering::Acquire)))
            .collect();
        out.sort_by(|(a, _), (b, _)| a.0.cmp(&b.0));
        out
    }

    /// Number of product lines carried.
    pub fn product_count(&self) -> usize {
        self.counters.len()
    }
}
