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

//! Order store: one lock-guarded slot per order id.
//!
//! Creation is an atomic check-and-insert, so the same `order_id` can never
//! produce two orders. All mutation happens inside [`OrderStore::with_order`],
//! which holds exactly one order's lock for the duration of the closure;
//! the map's shard lock is released before the order lock is taken, and no
//! closure ever takes a second order's lock.

use crate::base::OrderId;
use crate::error::TicketError;
use crate::order::Order;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Concurrent map of orders keyed by their idempotency key.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: DashMap<OrderId, Arc<Mutex<Order>>>,
}

impl OrderStore {
    pub fn new() -> Self {
        OrderStore {
            orders: DashMap::new(),
        }
    }

    /// Inserts a new order, rejecting an already-used id.
    ///
    /// Check and insert are one atomic step against the map entry; two
    /// concurrent creates with the same id see exactly one success.
    pub fn create(&self, order: Order) -> Result<(), TicketError> {
        let order_id = order.order_id();
        match self.orders.entry(order_id) {
            Entry::Occupied(_) => Err(TicketError::DuplicateOrder(order_id)),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Mutex::new(order)));
                Ok(())
            }
        }
    }

    /// Runs `f` with exclusive access to one order.
    ///
    /// Waits at most `timeout` for the order's lock; a breach is reported as
    /// `StorageContention` and the closure never runs. Passing
    /// `Duration::ZERO` turns this into a try-lock, which the pending sweep
    /// uses to skip orders mid-transition instead of queueing behind them.
    pub fn with_order<T>(
        &self,
        order_id: &OrderId,
        timeout: Duration,
        f: impl FnOnce(&mut Order) -> Result<T, TicketError>,
    ) -> Result<T, TicketError> {
        let slot = self
            .orders
            .get(order_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TicketError::OrderNotFound(*order_id))?;
        let mut guard = slot
            .try_lock_for(timeout)
            .ok_or(TicketError::StorageContention(*order_id))?;
        f(&mut guard)
    }

    /// Clones out one order.
    pub fn get(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        let slot = self
            .orders
            .get(order_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(TicketError::OrderNotFound(*order_id))?;
        let guard = slot.lock();
        Ok(guard.clone())
    }

    /// Drops an order's record. Returns whether it existed.
    pub fn remove(&self, order_id: &OrderId) -> bool {
        self.orders.remove(order_id).is_some()
    }

    /// Ids of every stored order, in no particular order.
    pub fn order_ids(&self) -> Vec<OrderId> {
        self.orders.iter().map(|entry| *entry.key()).collect()
    }

    /// Clones out every order, oldest first.
    pub fn snapshot(&self) -> Vec<Order> {
        let mut out: Vec<Order> = self
            .orders
            .iter()
            .map(|entry| entry.value().lock().clone())
            .collect();
        out.sort_by_key(|order| (order.created_at(), order.order_id().0));
        out
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}
