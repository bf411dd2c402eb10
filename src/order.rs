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

//! Orders and their lifecycle.
//!
//! Implemented state machine:
//!
//! ```text
//! (checkout) ──► PENDING ──settled/captured──► CONFIRMED ──use──► USED
//!                   │                            ▲    │            │
//!                   │ failed / swept / deleted   │    └─ deleted   │ undo (≤ window)
//!                   ▼                            └─────────────────┘
//!                 VOID ◄─────────────────────────── deleted
//! ```
//!
//! CONFIRMED is the only transition that takes stock, and `stock_applied`
//! records that it happened; deletion consults the same flag to decide
//! whether restoration is owed. Transitions run with the order's slot lock
//! held, so the status check and the mutation are one atomic step.

use crate::base::{CustomerId, OrderId, ProductKey};
use crate::error::TicketError;
use crate::gateway::PaymentToken;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Created at checkout; no stock taken.
    Pending,
    /// Settlement succeeded; stock decremented exactly once.
    Confirmed,
    /// Ticket consumed at the venue.
    Used,
    /// Dead end: failed settlement, swept, or administratively deleted.
    Void,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Used => "USED",
            OrderStatus::Void => "VOID",
        };
        write!(f, "{label}")
    }
}

/// One product line within an order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct LineItem {
    pub product: ProductKey,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl LineItem {
    pub fn new(product: impl Into<ProductKey>, quantity: u32, unit_price: Decimal) -> Self {
        LineItem {
            product: product.into(),
            quantity,
            unit_price,
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// One checkout attempt and its settlement history, condensed to a status.
///
/// The `order_id` doubles as the idempotency key for gateway callbacks.
/// Mutating methods assume the caller holds this order's slot lock; they
/// validate the current status first and touch nothing on rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    order_id: OrderId,
    customer_id: CustomerId,
    line_items: Vec<LineItem>,
    total_amount: Decimal,
    status: OrderStatus,
    /// Set when CONFIRMED decremented stock; cleared when deletion restores
    /// it. The only gate deciding whether restoration is owed.
    stock_applied: bool,
    created_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
    payment_token: Option<PaymentToken>,
}

impl Order {
    /// Builds a PENDING order, validating the cart.
    pub(crate) fn new(
        order_id: OrderId,
        customer_id: CustomerId,
        line_items: Vec<LineItem>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, TicketError> {
        if line_items.is_empty() || line_items.iter().any(|item| item.quantity == 0) {
            return Err(TicketError::InvalidQuantity);
        }
        let total_amount = line_items
            .iter()
            .map(LineItem::line_total)
            .sum::<Decimal>();
        Ok(Order {
            order_id,
            customer_id,
            line_items,
            total_amount,
            status: OrderStatus::Pending,
            stock_applied: false,
            created_at,
            used_at: None,
            payment_token: None,
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn customer_id(&self) -> CustomerId {
        self.customer_id
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn stock_applied(&self) -> bool {
        self.stock_applied
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn used_at(&self) -> Option<DateTime<Utc>> {
        self.used_at
    }

    pub fn payment_token(&self) -> Option<&PaymentToken> {
        self.payment_token.as_ref()
    }

    /// Total units requested across all line items.
    pub fn total_quantity(&self) -> u32 {
        self.line_items
            .iter()
            .fold(0u32, |sum, item| sum.saturating_add(item.quantity))
    }

    /// Per-product quantity totals, duplicate lines merged, first-seen order.
    ///
    /// Confirmation reserves exactly these amounts and deletion restores
    /// exactly these amounts; both sides derive from the same line items.
    pub fn demands(&self) -> Vec<(ProductKey, u32)> {
        let mut demands: Vec<(ProductKey, u32)> = Vec::new();
        for item in &self.line_items {
            match demands.iter_mut().find(|(product, _)| *product == item.product) {
                Some((_, quantity)) => *quantity = quantity.saturating_add(item.quantity),
                None => demands.push((item.product.clone(), item.quantity)),
            }
        }
        demands
    }

    fn assert_invariants(&self) {
        debug_assert!(
            !self.stock_applied
                || matches!(self.status, OrderStatus::Confirmed | OrderStatus::Used),
            "Invariant violated: order {} holds stock in status {}",
            self.order_id,
            self.status
        );
        debug_assert!(
            (self.status == OrderStatus::Used) == self.used_at.is_some(),
            "Invariant violated: order {} used_at disagrees with status {}",
            self.order_id,
            self.status
        );
    }

    pub(crate) fn set_payment_token(&mut self, token: PaymentToken) {
        self.payment_token = Some(token);
    }

    /// PENDING → CONFIRMED, recording that stock was taken.
    ///
    /// The caller reserves stock first; on any other status nothing moves
    /// and the caller decides whether that is a replay (already CONFIRMED)
    /// or a genuine violation.
    pub(crate) fn confirm(&mut self) -> Result<(), TicketError> {
        if self.status != OrderStatus::Pending {
            return Err(TicketError::InvalidTransition {
                order: self.order_id,
                from: self.status,
            });
        }
        self.status = OrderStatus::Confirmed;
        self.stock_applied = true;
        self.assert_invariants();
        Ok(())
    }

    /// PENDING → VOID (failed settlement, sweep, or lost stock race).
    pub(crate) fn void(&mut self) -> Result<(), TicketError> {
        if self.status != OrderStatus::Pending {
            return Err(TicketError::InvalidTransition {
                order: self.order_id,
                from: self.status,
            });
        }
        self.status = OrderStatus::Void;
        self.assert_invariants();
        Ok(())
    }

    /// CONFIRMED → USED, stamping `used_at`.
    pub(crate) fn mark_used(&mut self, now: DateTime<Utc>) -> Result<(), TicketError> {
        if self.status != OrderStatus::Confirmed {
            return Err(TicketError::InvalidTransition {
                order: self.order_id,
                from: self.status,
            });
        }
        self.status = OrderStatus::Used;
        self.used_at = Some(now);
        self.assert_invariants();
        Ok(())
    }

    /// USED → CONFIRMED, permitted only inside the undo window.
    pub(crate) fn undo_use(
        &mut self,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<(), TicketError> {
        if self.status != OrderStatus::Used {
            return Err(TicketError::InvalidTransition {
                order: self.order_id,
                from: self.status,
            });
        }
        let used_at = self.used_at.ok_or(TicketError::InvalidTransition {
            order: self.order_id,
            from: self.status,
        })?;
        if now.signed_duration_since(used_at) > window {
            return Err(TicketError::UndoWindowExpired(self.order_id));
        }
        self.status = OrderStatus::Confirmed;
        self.used_at = None;
        self.assert_invariants();
        Ok(())
    }

    /// Any status → VOID for administrative deletion.
    ///
    /// Returns the per-product quantities owed back to stock: the order's
    /// demands if it had applied stock, empty otherwise. Clears
    /// `stock_applied` so a second call owes nothing.
    pub(crate) fn void_for_delete(&mut self) -> Vec<(ProductKey, u32)> {
        let restored = if self.stock_applied {
            self.stock_applied = false;
            self.demands()
        } else {
            Vec::new()
        };
        self.status = OrderStatus::Void;
        self.used_at = None;
        self.assert_invariants();
        restored
    }
}
