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

//! Operator audit trail.
//!
//! Every administrative override (manual restock, order deletion, ticket
//! use and undo) is attributed to a human operator and appended here.
//! Automated paths — checkout, settlement — are deliberately not audited;
//! they are reconstructable from order state.

use crate::base::{OperatorId, OrderId, ProductKey};
use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// What an operator did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditAction {
    /// Counter overwritten to an absolute value.
    StockSet {
        product: ProductKey,
        previous: u32,
        new_value: u32,
    },
    /// Counter moved by a signed delta, clamped at zero.
    StockAdjusted {
        product: ProductKey,
        delta: i64,
        resulting: u32,
    },
    /// Order removed; `restored` lists the quantities returned to stock,
    /// empty when the order never took stock.
    OrderDeleted {
        order: OrderId,
        restored: Vec<(ProductKey, u32)>,
    },
    /// Ticket marked consumed at the venue.
    TicketUsed { order: OrderId },
    /// Ticket-use reverted within the undo window.
    TicketUseUndone { order: OrderId },
}

/// One appended audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Monotonic per-process sequence number.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub operator: OperatorId,
    pub action: AuditAction,
}

/// Append-only, lock-free log of operator actions.
///
/// Writers never block each other; `drain` pops entries in arrival order,
/// each carrying the sequence number it was assigned at record time.
#[derive(Debug, Default)]
pub struct AuditLog {
    next_seq: AtomicU64,
    entries: SegQueue<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        AuditLog {
            next_seq: AtomicU64::new(0),
            entries: SegQueue::new(),
        }
    }

    /// Appends one record, returning its sequence number.
    pub fn record(&self, at: DateTime<Utc>, operator: OperatorId, action: AuditAction) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.push(AuditEntry {
            seq,
            at,
            operator,
            action,
        });
        seq
    }

    /// Pops and returns every entry recorded so far, oldest first.
    pub fn drain(&self) -> Vec<AuditEntry> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.entries.pop() {
            out.push(entry);
        }
        out
    }

    /// Number of entries not yet drained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
