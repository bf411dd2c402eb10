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

//! Error types for stock and order processing.

use crate::base::{OrderId, ProductKey};
use crate::order::OrderStatus;
use thiserror::Error;

/// Stock ledger and order lifecycle errors.
///
/// `InsufficientStock` is an expected business outcome, not a fault; callers
/// surface it to the buyer together with the remaining count. `OrderNotFound`
/// on a settlement callback is a data-integrity signal and is logged
/// distinctly. `StorageContention` and `GatewayUnavailable` are transient and
/// safe to retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TicketError {
    /// Counter holds fewer units than requested
    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: ProductKey,
        requested: u32,
        available: u32,
    },

    /// Product key was never seeded into the ledger
    #[error("unknown product {0}")]
    UnknownProduct(ProductKey),

    /// Referenced order does not exist
    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    /// Order id already used by an earlier checkout attempt
    #[error("duplicate order {0}")]
    DuplicateOrder(OrderId),

    /// Requested lifecycle transition is not legal from the current status
    #[error("invalid transition from {from} for order {order}")]
    InvalidTransition { order: OrderId, from: OrderStatus },

    /// Undo requested after the window closed
    #[error("undo window expired for order {0}")]
    UndoWindowExpired(OrderId),

    /// Cart is empty or a line item has zero quantity
    #[error("invalid quantity (must be positive)")]
    InvalidQuantity,

    /// Payment gateway could not issue a token
    #[error("payment gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// Lock acquisition timed out
    #[error("storage contention on order {0}")]
    StorageContention(OrderId),
}

#[cfg(test)]
mod tests {
    use super::TicketError;
    use crate::base::{OrderId, ProductKey};
    use crate::order::OrderStatus;
    use uuid::Uuid;

    fn nil_order() -> OrderId {
        OrderId(Uuid::nil())
    }

    #[test]
    fn error_display_messages() {
        assert_eq!(
            TicketError::InsufficientStock {
                product: ProductKey::from("group-cheki"),
                requested: 3,
                available: 1,
            }
            .to_string(),
            "insufficient stock for group-cheki: requested 3, available 1"
        );
        assert_eq!(
            TicketError::UnknownProduct(ProductKey::from("solo-x")).to_string(),
            "unknown product solo-x"
        );
        assert_eq!(
            TicketError::OrderNotFound(nil_order()).to_string(),
            "order 00000000-0000-0000-0000-000000000000 not found"
        );
        assert_eq!(
            TicketError::DuplicateOrder(nil_order()).to_string(),
            "duplicate order 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            TicketError::InvalidTransition {
                order: nil_order(),
                from: OrderStatus::Void,
            }
            .to_string(),
            "invalid transition from VOID for order 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            TicketError::UndoWindowExpired(nil_order()).to_string(),
            "undo window expired for order 00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            TicketError::InvalidQuantity.to_string(),
            "invalid quantity (must be positive)"
        );
        assert_eq!(
            TicketError::GatewayUnavailable("connection refused".into()).to_string(),
            "payment gateway unavailable: connection refused"
        );
        assert_eq!(
            TicketError::StorageContention(nil_order()).to_string(),
            "storage contention on order 00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn errors_are_cloneable() {
        let error = TicketError::InsufficientStock {
            product: ProductKey::from("group-cheki"),
            requested: 2,
            available: 0,
        };
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }
}
