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

//! # Cheki Engine
//!
//! This library keeps a limited ticket inventory consistent while concurrent
//! buyers check out and a payment gateway settles their orders
//! asynchronously, out of order, and more than once.
//!
//! ## Core Components
//!
//! - [`Engine`]: Central facade running checkouts, settlements, and
//!   administrative overrides
//! - [`StockLedger`]: Authoritative per-product unit counters, mutated only
//!   through atomic compare-and-swap operations
//! - [`Order`]: One checkout attempt and its lifecycle
//!   (PENDING → CONFIRMED → USED, with VOID)
//! - [`SettlementEvent`]: A gateway notification, applied idempotently by
//!   `order_id`
//! - [`TicketError`]: Typed failures, from expected (`InsufficientStock`)
//!   to integrity signals (`OrderNotFound`)
//!
//! ## Example
//!
//! ```
//! use cheki_engine::{
//!     CheckoutRequest, CustomerId, Engine, LineItem, OperatorId, OrderId, ReportedStatus,
//!     SettlementEvent, SettlementOutcome,
//! };
//! use rust_decimal_macros::dec;
//!
//! let engine = Engine::new();
//! let group = "group-cheki".into();
//! engine.set_stock(OperatorId::from("staff"), &group, 10);
//!
//! // Checkout creates a PENDING order; stock is untouched.
//! let order_id = OrderId::new();
//! let _token = engine
//!     .checkout(CheckoutRequest {
//!         order_id,
//!         customer_id: CustomerId(1),
//!         line_items: vec![LineItem::new("group-cheki", 2, dec!(1500))],
//!     })
//!     .unwrap();
//! assert_eq!(engine.available(&group).unwrap(), 10);
//!
//! // Settlement confirms the order and decrements stock exactly once,
//! // no matter how often the notification is replayed.
//! let event = SettlementEvent {
//!     order_id,
//!     reported_status: ReportedStatus::Settled,
//! };
//! assert_eq!(engine.settle(event.clone()).unwrap(), SettlementOutcome::Confirmed);
//! assert_eq!(engine.settle(event).unwrap(), SettlementOutcome::AlreadyConfirmed);
//! assert_eq!(engine.available(&group).unwrap(), 8);
//! ```
//!
//! ## Thread Safety
//!
//! All engine operations take `&self` and may run concurrently from any
//! number of threads. Counters are compare-and-swap atomics and each order
//! has its own lock, so two buyers racing for the last unit resolve to
//! exactly one winner.

pub mod audit;
mod base;
mod clock;
mod config;
mod engine;
pub mod error;
pub mod gateway;
mod order;
mod stock;
mod store;

pub use audit::{AuditAction, AuditEntry, AuditLog};
pub use base::{CustomerId, OperatorId, OrderId, ProductKey};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{CheckoutRequest, Engine, SettlementOutcome};
pub use error::TicketError;
pub use gateway::{PaymentGateway, PaymentToken, ReportedStatus, SettlementEvent, StubGateway};
pub use order::{LineItem, Order, OrderStatus};
pub use stock::StockLedger;
pub use store::OrderStore;
