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

//! Payment gateway boundary.
//!
//! The engine only ever asks the gateway for a payment token at checkout;
//! everything that happens to the payment afterwards comes back as
//! [`SettlementEvent`]s, delivered at-least-once and in no particular order.

use crate::base::OrderId;
use crate::error::TicketError;
use crate::order::Order;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque token the buyer's client uses to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct PaymentToken(pub String);

impl PaymentToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Transaction status as the gateway reports it.
///
/// `Settled` and `Captured` both mean the money is good; `Pending` is an
/// intermediate notification with no lifecycle effect; `Failed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportedStatus {
    Settled,
    Captured,
    Pending,
    Failed,
}

impl ReportedStatus {
    /// True for the statuses that confirm an order.
    pub fn is_success(self) -> bool {
        matches!(self, ReportedStatus::Settled | ReportedStatus::Captured)
    }

    /// True for the status that voids a still-pending order.
    pub fn is_failure(self) -> bool {
        matches!(self, ReportedStatus::Failed)
    }
}

/// One asynchronous notification from the gateway.
///
/// Keyed by `order_id`; replays and reordering are the normal case, not an
/// exception.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettlementEvent {
    pub order_id: OrderId,
    pub reported_status: ReportedStatus,
}

/// External payment processor, reduced to the one call checkout needs.
///
/// Implementations must not assume they run on any particular thread; the
/// engine calls this outside all of its own locks.
pub trait PaymentGateway: Send + Sync {
    /// Requests a client-side payment token for a pending order.
    ///
    /// A failure leaves the order PENDING; the engine surfaces it as
    /// `GatewayUnavailable` and the caller may retry with the same order id.
    fn create_payment_token(&self, order: &Order) -> Result<PaymentToken, TicketError>;
}

/// Gateway stand-in that always issues a token.
///
/// Used by the batch binary, the demo server, and tests; real deployments
/// plug their processor in behind the same trait.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubGateway;

impl StubGateway {
    pub fn new() -> Self {
        StubGateway
    }

    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(StubGateway)
    }
}

impl PaymentGateway for StubGateway {
    fn create_payment_token(&self, order: &Order) -> Result<PaymentToken, TicketError> {
        let token = PaymentToken(format!("tok_{}", Uuid::new_v4()));
        tracing::debug!(
            order_id = %order.order_id(),
            total = %order.total_amount(),
            "issued stub payment token"
        );
        Ok(token)
    }
}
