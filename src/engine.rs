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

//! Order and inventory engine.
//!
//! The [`Engine`] is the central component that runs checkouts, applies
//! settlement notifications, and executes administrative overrides, all
//! against one stock ledger and one order store.
//!
//! # Operations
//!
//! - **Checkout**: validates the cart, probes availability, creates a
//!   PENDING order, and asks the gateway for a payment token. Never touches
//!   stock.
//! - **Settlement**: applies a gateway notification idempotently; the
//!   PENDING → CONFIRMED transition is the only place stock is decremented.
//! - **Ticket use / undo**: venue-side consumption of a confirmed ticket,
//!   reversible within the configured window.
//! - **Admin overrides**: absolute/relative stock changes and order
//!   deletion with conditional restoration, each recorded in the audit log.
//! - **Sweep**: voids PENDING orders whose settlement never arrived.
//!
//! # Thread Safety
//!
//! Checkouts, settlements, and admin actions may run concurrently from any
//! number of threads. Per-order mutual exclusion comes from the order
//! store's slot locks; per-product consistency comes from the ledger's
//! compare-and-swap counters. A settlement holds exactly one order lock and
//! never another, and counters never block, so lock cycles cannot form.

use crate::audit::{AuditAction, AuditLog};
use crate::base::{CustomerId, OperatorId, OrderId, ProductKey};
use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::TicketError;
use crate::gateway::{PaymentGateway, PaymentToken, SettlementEvent, StubGateway};
use crate::order::{LineItem, Order, OrderStatus};
use crate::stock::StockLedger;
use crate::store::OrderStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One inbound checkout attempt.
///
/// The `order_id` is chosen by the caller before any external call and is
/// reused verbatim on retries of the same attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub line_items: Vec<LineItem>,
}

/// What applying one settlement notification did.
///
/// Replays and late notifications land on the no-op variants; only
/// [`Confirmed`](SettlementOutcome::Confirmed) moved stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementOutcome {
    /// Stock decremented and the order moved PENDING → CONFIRMED.
    Confirmed,
    /// Success replayed onto an already confirmed (or used) order; no-op.
    AlreadyConfirmed,
    /// Failure notification voided the pending order.
    Voided,
    /// Notification landed on an order already VOID; no-op.
    AlreadyVoid,
    /// Failure arrived after an earlier success; first success wins.
    FailureIgnored,
    /// Success arrived but stock ran out in between; the order was voided
    /// and needs manual reconciliation of the captured payment.
    OutOfStock,
    /// Intermediate PENDING report; nothing to apply yet.
    StillPending,
}

/// Inventory and order-lifecycle engine.
///
/// # Invariants
///
/// - A counter never goes below zero; the reservation that would do so
///   fails instead.
/// - An order decrements stock at most once (at PENDING → CONFIRMED) and is
///   restored at most once (at deletion), gated by its `stock_applied` flag.
/// - The status check guarding a transition and the stock mutation bound to
///   it run under the same order lock.
/// - PENDING orders have never touched stock, so sweeping or deleting them
///   restores nothing.
pub struct Engine {
    stock: StockLedger,
    orders: OrderStore,
    gateway: Arc<dyn PaymentGateway>,
    audit: AuditLog,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Engine {
    /// Creates an engine with the stub gateway, the system clock, and
    /// default policies.
    pub fn new() -> Self {
        Engine::with_parts(
            StubGateway::shared(),
            Arc::new(SystemClock),
            EngineConfig::default(),
        )
    }

    /// Creates an engine from explicit collaborators.
    pub fn with_parts(
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Engine {
            stock: StockLedger::new(),
            orders: OrderStore::new(),
            gateway,
            audit: AuditLog::new(),
            clock,
            config,
        }
    }

    /// Runs a checkout: cart validation, availability probe, PENDING order,
    /// payment token.
    ///
    /// Stock is only *read* here; nothing is reserved until settlement. A
    /// replayed request with an already-stored `order_id` does not create a
    /// second order: while the original is PENDING the stored token (or a
    /// freshly requested one, if the gateway had failed) is returned, and
    /// once it has left PENDING the replay is rejected as a duplicate.
    ///
    /// # Errors
    ///
    /// - [`TicketError::InvalidQuantity`] - empty cart or a zero-quantity line.
    /// - [`TicketError::UnknownProduct`] - cart names a product the ledger
    ///   does not carry.
    /// - [`TicketError::InsufficientStock`] - fewer units on hand than
    ///   requested; carries the remaining count.
    /// - [`TicketError::DuplicateOrder`] - order id reused outside the
    ///   retry cases above.
    /// - [`TicketError::GatewayUnavailable`] - no token; the order stays
    ///   PENDING and the same request may be retried.
    pub fn checkout(&self, request: CheckoutRequest) -> Result<PaymentToken, TicketError> {
        let CheckoutRequest {
            order_id,
            customer_id,
            line_items,
        } = request;
        let order = Order::new(order_id, customer_id, line_items, self.clock.now())?;

        // Early rejection only; the authoritative check is the CAS at
        // settlement time.
        for (product, quantity) in order.demands() {
            let available = self.stock.available(&product)?;
            if available < quantity {
                return Err(TicketError::InsufficientStock {
                    product,
                    requested: quantity,
                    available,
                });
            }
        }

        let snapshot = order.clone();
        match self.orders.create(order) {
            Ok(()) => {}
            Err(TicketError::DuplicateOrder(_)) => {
                return self.resume_checkout(order_id, customer_id);
            }
            Err(error) => return Err(error),
        }
        debug!(order_id = %order_id, customer_id = %customer_id, "created pending order");

        let token = self.issue_token(&snapshot)?;
        info!(
            order_id = %order_id,
            customer_id = %customer_id,
            total_quantity = snapshot.total_quantity(),
            "checkout pending, payment token issued"
        );
        Ok(token)
    }

    /// Continues a checkout whose order id already exists.
    fn resume_checkout(
        &self,
        order_id: OrderId,
        customer_id: CustomerId,
    ) -> Result<PaymentToken, TicketError> {
        enum Resume {
            Token(PaymentToken),
            NeedsToken(Box<Order>),
        }

        let resume = self
            .orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                if order.customer_id() != customer_id || order.status() != OrderStatus::Pending {
                    return Err(TicketError::DuplicateOrder(order_id));
                }
                match order.payment_token() {
                    Some(token) => Ok(Resume::Token(token.clone())),
                    None => Ok(Resume::NeedsToken(Box::new(order.clone()))),
                }
            })?;

        match resume {
            Resume::Token(token) => {
                debug!(order_id = %order_id, "checkout replay, reusing issued token");
                Ok(token)
            }
            Resume::NeedsToken(snapshot) => {
                debug!(order_id = %order_id, "checkout retry after gateway failure");
                self.issue_token(&snapshot)
            }
        }
    }

    /// Calls the gateway (outside all locks) and stores the token.
    fn issue_token(&self, snapshot: &Order) -> Result<PaymentToken, TicketError> {
        let order_id = snapshot.order_id();
        let token = self.gateway.create_payment_token(snapshot)?;
        self.orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                order.set_payment_token(token.clone());
                Ok(())
            })?;
        Ok(token)
    }

    /// Applies one settlement notification idempotently.
    ///
    /// The notification's effect depends on the order's current status,
    /// checked under the order's lock in the same scope as any stock
    /// mutation:
    ///
    /// | Reported | Order status | Effect |
    /// |----------|--------------|--------|
    /// | SETTLED / CAPTURED | PENDING | reserve stock, confirm |
    /// | SETTLED / CAPTURED | CONFIRMED, USED | no-op (replay) |
    /// | SETTLED / CAPTURED | VOID | no-op, flagged for follow-up |
    /// | FAILED | PENDING | void |
    /// | FAILED | CONFIRMED, USED | ignored; first success won |
    /// | FAILED | VOID | no-op (replay) |
    /// | PENDING | any | nothing to apply |
    ///
    /// Delivering the same success twice therefore decrements stock exactly
    /// once, and a late failure can never devoid a confirmed order.
    ///
    /// # Errors
    ///
    /// - [`TicketError::OrderNotFound`] - no order for this id; an
    ///   integrity signal, logged distinctly, never silently swallowed.
    /// - [`TicketError::StorageContention`] - order lock not acquired in
    ///   time; safe to retry.
    pub fn settle(&self, event: SettlementEvent) -> Result<SettlementOutcome, TicketError> {
        let SettlementEvent {
            order_id,
            reported_status,
        } = event;

        let result = self
            .orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                if reported_status.is_success() {
                    match order.status() {
                        OrderStatus::Pending => {
                            match self.stock.try_reserve_all(&order.demands()) {
                                Ok(()) => {
                                    order.confirm()?;
                                    Ok(SettlementOutcome::Confirmed)
                                }
                                Err(TicketError::InsufficientStock { .. }) => {
                                    order.void()?;
                                    Ok(SettlementOutcome::OutOfStock)
                                }
                                Err(error) => Err(error),
                            }
                        }
                        OrderStatus::Confirmed | OrderStatus::Used => {
                            Ok(SettlementOutcome::AlreadyConfirmed)
                        }
                        OrderStatus::Void => Ok(SettlementOutcome::AlreadyVoid),
                    }
                } else if reported_status.is_failure() {
                    match order.status() {
                        OrderStatus::Pending => {
                            order.void()?;
                            Ok(SettlementOutcome::Voided)
                        }
                        OrderStatus::Confirmed | OrderStatus::Used => {
                            Ok(SettlementOutcome::FailureIgnored)
                        }
                        OrderStatus::Void => Ok(SettlementOutcome::AlreadyVoid),
                    }
                } else {
                    Ok(SettlementOutcome::StillPending)
                }
            });

        match &result {
            Ok(SettlementOutcome::Confirmed) => {
                info!(order_id = %order_id, "order confirmed, stock reserved");
            }
            Ok(SettlementOutcome::AlreadyConfirmed) => {
                debug!(order_id = %order_id, "settlement replay, already confirmed");
            }
            Ok(SettlementOutcome::Voided) => {
                info!(order_id = %order_id, "order voided on failed settlement");
            }
            Ok(SettlementOutcome::AlreadyVoid) => {
                if reported_status.is_success() {
                    warn!(
                        order_id = %order_id,
                        "success notification for a void order, manual follow-up needed"
                    );
                } else {
                    debug!(order_id = %order_id, "settlement replay, already void");
                }
            }
            Ok(SettlementOutcome::FailureIgnored) => {
                warn!(
                    order_id = %order_id,
                    "failure notification after confirmation ignored"
                );
            }
            Ok(SettlementOutcome::OutOfStock) => {
                warn!(
                    order_id = %order_id,
                    "settlement succeeded but stock was exhausted, order voided for manual reconciliation"
                );
            }
            Ok(SettlementOutcome::StillPending) => {
                debug!(order_id = %order_id, "intermediate settlement report");
            }
            Err(TicketError::OrderNotFound(_)) => {
                warn!(
                    order_id = %order_id,
                    reported_status = ?reported_status,
                    "settlement for unknown order, integrity signal"
                );
            }
            Err(_) => {}
        }
        result
    }

    /// Marks a confirmed ticket as consumed at the venue.
    pub fn use_ticket(&self, operator: OperatorId, order_id: OrderId) -> Result<(), TicketError> {
        let now = self.clock.now();
        self.orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                order.mark_used(now)
            })?;
        self.audit
            .record(now, operator.clone(), AuditAction::TicketUsed { order: order_id });
        info!(order_id = %order_id, operator = %operator, "ticket used");
        Ok(())
    }

    /// Reverts a ticket-use, permitted only inside the undo window.
    ///
    /// # Errors
    ///
    /// - [`TicketError::UndoWindowExpired`] - `used_at` is further back
    ///   than the configured window.
    /// - [`TicketError::InvalidTransition`] - the order is not USED.
    pub fn undo_ticket_use(
        &self,
        operator: OperatorId,
        order_id: OrderId,
    ) -> Result<(), TicketError> {
        let now = self.clock.now();
        let window = self.config.undo_window;
        self.orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                order.undo_use(now, window)
            })?;
        self.audit.record(
            now,
            operator.clone(),
            AuditAction::TicketUseUndone { order: order_id },
        );
        info!(order_id = %order_id, operator = %operator, "ticket use undone");
        Ok(())
    }

    /// Deletes an order, restoring stock only if the order had taken it.
    ///
    /// A CONFIRMED or USED order gives its reserved quantities back to the
    /// ledger; a PENDING or VOID order restores nothing. The restoration
    /// decision is made under the order's lock via its `stock_applied`
    /// flag, so a racing second delete restores nothing.
    pub fn delete_order(
        &self,
        operator: OperatorId,
        order_id: OrderId,
    ) -> Result<(), TicketError> {
        let restored = self
            .orders
            .with_order(&order_id, self.config.lock_timeout, |order| {
                Ok(order.void_for_delete())
            })?;

        for (product, quantity) in &restored {
            // products are never removed from the ledger, so this cannot fail
            let _restore = self.stock.restore(product, *quantity);
            debug_assert!(_restore.is_ok());
        }
        self.orders.remove(&order_id);

        let now = self.clock.now();
        info!(
            order_id = %order_id,
            operator = %operator,
            restored = restored.len(),
            "order deleted"
        );
        self.audit.record(
            now,
            operator,
            AuditAction::OrderDeleted {
                order: order_id,
                restored,
            },
        );
        Ok(())
    }

    /// Overwrites a product's counter (manual restock entry).
    ///
    /// Creates the product if it does not exist yet. Returns the previous
    /// count.
    pub fn set_stock(&self, operator: OperatorId, product: &ProductKey, value: u32) -> u32 {
        let previous = self.stock.set_absolute(product, value);
        info!(
            product = %product,
            previous,
            new_value = value,
            operator = %operator,
            "stock set"
        );
        self.audit.record(
            self.clock.now(),
            operator,
            AuditAction::StockSet {
                product: product.clone(),
                previous,
                new_value: value,
            },
        );
        previous
    }

    /// Moves a product's counter by a signed delta, clamped at zero.
    ///
    /// Returns `(previous, resulting)` counts.
    pub fn adjust_stock(
        &self,
        operator: OperatorId,
        product: &ProductKey,
        delta: i64,
    ) -> Result<(u32, u32), TicketError> {
        let (previous, resulting) = self.stock.adjust(product, delta)?;
        info!(
            product = %product,
            delta,
            resulting,
            operator = %operator,
            "stock adjusted"
        );
        self.audit.record(
            self.clock.now(),
            operator,
            AuditAction::StockAdjusted {
                product: product.clone(),
                delta,
                resulting,
            },
        );
        Ok((previous, resulting))
    }

    /// Voids PENDING orders older than the configured TTL.
    ///
    /// PENDING orders hold no stock, so this is record hygiene only.
    /// Orders whose lock is busy are skipped and caught by a later sweep.
    /// Returns the ids that were voided.
    pub fn sweep_pending(&self) -> Vec<OrderId> {
        let now = self.clock.now();
        let ttl = self.config.pending_ttl;
        let mut swept = Vec::new();

        for order_id in self.orders.order_ids() {
            let voided = self.orders.with_order(&order_id, Duration::ZERO, |order| {
                if order.status() == OrderStatus::Pending
                    && now.signed_duration_since(order.created_at()) > ttl
                {
                    order.void()?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            });
            match voided {
                Ok(true) => swept.push(order_id),
                Ok(false) => {}
                // busy or deleted since listing; the next sweep catches it
                Err(_) => {}
            }
        }

        if !swept.is_empty() {
            info!(count = swept.len(), "swept abandoned pending orders");
        }
        swept
    }

    /// Clones out one order.
    pub fn order(&self, order_id: &OrderId) -> Result<Order, TicketError> {
        self.orders.get(order_id)
    }

    /// Clones out every order, oldest first.
    pub fn orders(&self) -> Vec<Order> {
        self.orders.snapshot()
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }

    /// Current unit count for one product.
    pub fn available(&self, product: &ProductKey) -> Result<u32, TicketError> {
        self.stock.available(product)
    }

    /// Read-only availability probe, as used by storefront display.
    pub fn check_available(
        &self,
        product: &ProductKey,
        quantity: u32,
    ) -> Result<bool, TicketError> {
        self.stock.check_available(product, quantity)
    }

    /// Every counter, sorted by product key.
    pub fn stock_levels(&self) -> Vec<(ProductKey, u32)> {
        self.stock.snapshot()
    }

    /// The operator audit trail.
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
