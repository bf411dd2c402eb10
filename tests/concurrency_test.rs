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

//! Exact-count race tests.
//!
//! Where the deadlock tests only require that concurrent traffic completes,
//! these tests pin down *how many* operations may win a race: reservations
//! never exceed the counter, a settlement storm decrements once, and a
//! single unit is confirmed for exactly one of two competing orders.

use cheki_engine::{
    CheckoutRequest, CustomerId, Engine, LineItem, OperatorId, OrderId, OrderStatus, PaymentToken,
    ProductKey, ReportedStatus, SettlementEvent, SettlementOutcome, StockLedger, TicketError,
};
use rust_decimal_macros::dec;
use std::sync::{Arc, Barrier};
use std::thread;

fn product() -> ProductKey {
    ProductKey::from("group-cheki")
}

fn stocked_engine(units: u32) -> Arc<Engine> {
    let engine = Engine::new();
    engine.set_stock(OperatorId::from("ops"), &product(), units);
    Arc::new(engine)
}

fn checkout_units(engine: &Engine, quantity: u32, customer: u64) -> OrderId {
    let order_id = OrderId::new();
    engine
        .checkout(CheckoutRequest {
            order_id,
            customer_id: CustomerId(customer),
            line_items: vec![LineItem::new("group-cheki", quantity, dec!(1500))],
        })
        .unwrap();
    order_id
}

fn settle_as(
    engine: &Engine,
    order_id: OrderId,
    status: ReportedStatus,
) -> Result<SettlementOutcome, TicketError> {
    engine.settle(SettlementEvent {
        order_id,
        reported_status: status,
    })
}

/// More reservation attempts than units: exactly the stocked count wins.
#[test]
fn reservation_race_grants_at_most_available() {
    const STOCK: u32 = 100;
    const THREADS: usize = 300;

    let ledger = Arc::new(StockLedger::new());
    ledger.set_absolute(&product(), STOCK);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ledger.try_reserve(&product(), 1).is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .filter(|granted| *granted)
        .count();

    assert_eq!(successes, STOCK as usize);
    assert_eq!(ledger.available(&product()).unwrap(), 0);
}

/// Fewer attempts than units: every attempt wins.
#[test]
fn reservation_race_with_surplus_grants_all() {
    const STOCK: u32 = 100;
    const THREADS: usize = 50;

    let ledger = Arc::new(StockLedger::new());
    ledger.set_absolute(&product(), STOCK);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let ledger = ledger.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                ledger.try_reserve(&product(), 1).is_ok()
            })
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .filter(|granted| *granted)
        .count();

    assert_eq!(successes, THREADS);
    assert_eq!(
        ledger.available(&product()).unwrap(),
        STOCK - THREADS as u32
    );
}

/// Two checkouts compete for the last unit; exactly one order confirms and
/// the other is voided.
#[test]
fn single_unit_race_confirms_exactly_one() {
    let engine = stocked_engine(1);

    // both checkouts pass the availability probe while the unit is unsold
    let order_a = checkout_units(&engine, 1, 1);
    let order_b = checkout_units(&engine, 1, 2);

    let barrier = Arc::new(Barrier::new(2));
    let handles: Vec<_> = [order_a, order_b]
        .into_iter()
        .map(|order_id| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                settle_as(&engine, order_id, ReportedStatus::Settled).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<SettlementOutcome> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    let confirmed = outcomes
        .iter()
        .filter(|o| **o == SettlementOutcome::Confirmed)
        .count();
    let out_of_stock = outcomes
        .iter()
        .filter(|o| **o == SettlementOutcome::OutOfStock)
        .count();
    assert_eq!(confirmed, 1, "exactly one order gets the last unit");
    assert_eq!(out_of_stock, 1, "the loser is voided, not blocked");

    let statuses: Vec<OrderStatus> = [order_a, order_b]
        .iter()
        .map(|id| engine.order(id).unwrap().status())
        .collect();
    assert!(statuses.contains(&OrderStatus::Confirmed));
    assert!(statuses.contains(&OrderStatus::Void));
    assert_eq!(engine.available(&product()).unwrap(), 0);
}

/// Sixteen copies of the same success notification land at once; stock
/// moves exactly once.
#[test]
fn settlement_storm_decrements_once() {
    const THREADS: usize = 16;

    let engine = stocked_engine(10);
    let order_id = checkout_units(&engine, 2, 1);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                settle_as(&engine, order_id, ReportedStatus::Settled).unwrap()
            })
        })
        .collect();

    let outcomes: Vec<SettlementOutcome> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    let confirmed = outcomes
        .iter()
        .filter(|o| **o == SettlementOutcome::Confirmed)
        .count();
    let replayed = outcomes
        .iter()
        .filter(|o| **o == SettlementOutcome::AlreadyConfirmed)
        .count();

    assert_eq!(confirmed, 1);
    assert_eq!(replayed, THREADS - 1);
    assert_eq!(engine.available(&product()).unwrap(), 8);
}

/// Eight copies of the same checkout land at once; one order is created
/// and the stored token is one of the returned ones.
#[test]
fn checkout_storm_creates_one_order() {
    const THREADS: usize = 8;

    let engine = stocked_engine(10);
    let request = CheckoutRequest {
        order_id: OrderId::new(),
        customer_id: CustomerId(1),
        line_items: vec![LineItem::new("group-cheki", 1, dec!(1500))],
    };
    let order_id = request.order_id;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            let request = request.clone();
            thread::spawn(move || {
                barrier.wait();
                engine.checkout(request).unwrap()
            })
        })
        .collect();

    let tokens: Vec<PaymentToken> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    assert_eq!(engine.order_count(), 1);
    let stored = engine.order(&order_id).unwrap().payment_token().cloned();
    let stored = stored.expect("a token must be stored");
    assert!(tokens.contains(&stored), "stored token was handed to a caller");
    assert_eq!(engine.available(&product()).unwrap(), 10);
}

/// Mixed-size orders racing for a small pool never oversell it.
#[test]
fn mixed_quantity_race_never_oversells() {
    const STOCK: u32 = 40;
    const THREADS: usize = 20;

    let engine = stocked_engine(STOCK);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let engine = engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let quantity = (i % 5) as u32 + 1;
                let order_id = checkout_units(&engine, quantity, i as u64);
                barrier.wait();
                let outcome = settle_as(&engine, order_id, ReportedStatus::Settled).unwrap();
                (quantity, outcome)
            })
        })
        .collect();

    let results: Vec<(u32, SettlementOutcome)> = handles
        .into_iter()
        .map(|h| h.join().expect("Thread panicked"))
        .collect();

    let confirmed_units: u32 = results
        .iter()
        .filter(|(_, outcome)| *outcome == SettlementOutcome::Confirmed)
        .map(|(quantity, _)| *quantity)
        .sum();

    assert!(confirmed_units <= STOCK);
    assert_eq!(
        engine.available(&product()).unwrap(),
        STOCK - confirmed_units
    );
    for (_, outcome) in &results {
        assert!(matches!(
            outcome,
            SettlementOutcome::Confirmed | SettlementOutcome::OutOfStock
        ));
    }
}
