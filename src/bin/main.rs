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

use cheki_engine::{
    CheckoutRequest, CustomerId, Engine, LineItem, OperatorId, OrderId, ProductKey,
    ReportedStatus, SettlementEvent,
};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use uuid::Uuid;

/// Cheki Engine - Replay an event CSV against a fresh engine
///
/// Reads interleaved stock/checkout/settlement/admin events in arrival
/// order and prints final order statuses and stock levels to stdout.
/// Used to verify a day's gateway log against expected inventory.
#[derive(Parser, Debug)]
#[command(name = "cheki-engine")]
#[command(about = "Replays ticket-sale event CSVs and reports final state", long_about = None)]
struct Args {
    /// Path to CSV file with events
    ///
    /// Expected format: event,order,customer,product,quantity,unit_price,status,value,operator
    /// Example: cargo run -- events.csv > report.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    let engine = match replay_events(BufReader::new(file)) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error replaying events: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = write_report(&engine, std::io::stdout()) {
        eprintln!("Error writing report: {}", e);
        process::exit(1);
    }
}

/// Raw CSV record matching the input format.
///
/// Fields: `event, order, customer, product, quantity, unit_price, status, value, operator`.
/// Only `event` is required; each event kind reads the columns it needs.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    event: String,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    order: Option<Uuid>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    customer: Option<u64>,
    #[serde(default)]
    product: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    quantity: Option<u32>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    unit_price: Option<Decimal>,
    #[serde(default)]
    status: Option<String>,
    #[serde(deserialize_with = "csv::invalid_option", default)]
    value: Option<i64>,
    #[serde(default)]
    operator: Option<String>,
}

/// One parsed replay event.
#[derive(Debug)]
enum ReplayEvent {
    Stock {
        product: ProductKey,
        value: u32,
        operator: OperatorId,
    },
    Adjust {
        product: ProductKey,
        delta: i64,
        operator: OperatorId,
    },
    Checkout {
        request: CheckoutRequest,
    },
    Settle {
        event: SettlementEvent,
    },
    Use {
        order_id: OrderId,
        operator: OperatorId,
    },
    Undo {
        order_id: OrderId,
        operator: OperatorId,
    },
    Delete {
        order_id: OrderId,
        operator: OperatorId,
    },
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

fn parse_reported_status(raw: &str) -> Option<ReportedStatus> {
    match raw.to_uppercase().as_str() {
        "SETTLED" => Some(ReportedStatus::Settled),
        "CAPTURED" => Some(ReportedStatus::Captured),
        "PENDING" => Some(ReportedStatus::Pending),
        "FAILED" => Some(ReportedStatus::Failed),
        _ => None,
    }
}

impl CsvRecord {
    /// Converts a CSV record to a replay event.
    ///
    /// Returns `None` for unknown event kinds or missing required columns.
    fn into_event(self) -> Option<ReplayEvent> {
        let operator = OperatorId(non_empty(self.operator).unwrap_or_else(|| "batch".to_owned()));
        let product = non_empty(self.product).map(ProductKey);

        match self.event.to_lowercase().as_str() {
            "stock" => {
                let value = u32::try_from(self.value?).ok()?;
                Some(ReplayEvent::Stock {
                    product: product?,
                    value,
                    operator,
                })
            }
            "adjust" => Some(ReplayEvent::Adjust {
                product: product?,
                delta: self.value?,
                operator,
            }),
            "checkout" => {
                let request = CheckoutRequest {
                    order_id: OrderId(self.order?),
                    customer_id: CustomerId(self.customer?),
                    line_items: vec![LineItem::new(product?, self.quantity?, self.unit_price?)],
                };
                Some(ReplayEvent::Checkout { request })
            }
            "settle" => {
                let reported_status = parse_reported_status(&non_empty(self.status)?)?;
                Some(ReplayEvent::Settle {
                    event: SettlementEvent {
                        order_id: OrderId(self.order?),
                        reported_status,
                    },
                })
            }
            "use" => Some(ReplayEvent::Use {
                order_id: OrderId(self.order?),
                operator,
            }),
            "undo" => Some(ReplayEvent::Undo {
                order_id: OrderId(self.order?),
                operator,
            }),
            "delete" => Some(ReplayEvent::Delete {
                order_id: OrderId(self.order?),
                operator,
            }),
            _ => None,
        }
    }
}

/// Replays events from a CSV reader against a fresh engine.
///
/// Streaming parse, so gateway logs of any size work. Malformed rows and
/// rejected events (insufficient stock, replays, expired undos) are skipped;
/// rejection is a normal replay outcome, and final state is what the report
/// is for.
///
/// # CSV Format
///
/// Expected columns: `event, order, customer, product, quantity, unit_price,
/// status, value, operator`
/// - `event`: stock, adjust, checkout, settle, use, undo, delete
/// - `order`: order id (UUID) for order-scoped events
/// - `customer`: customer id for checkouts
/// - `product`, `quantity`, `unit_price`: the checkout's single line item
/// - `status`: SETTLED, CAPTURED, PENDING, or FAILED for settle events
/// - `value`: absolute count for stock, signed delta for adjust
/// - `operator`: attribution for admin events (defaults to "batch")
///
/// # Example
///
/// ```csv
/// event,order,customer,product,quantity,unit_price,status,value,operator
/// stock,,,group-cheki,,,,50,staff
/// checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,2,1500,,,
/// settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,
/// ```
///
/// # Errors
///
/// Returns a CSV error if the reader fails or the CSV structure is invalid.
pub fn replay_events<R: Read>(reader: R) -> Result<Engine, csv::Error> {
    let engine = Engine::new();

    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for result in rdr.deserialize::<CsvRecord>() {
        match result {
            Ok(record) => {
                let Some(event) = record.into_event() else {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping invalid event record");
                    continue;
                };

                if let Err(e) = apply_event(&engine, event) {
                    #[cfg(debug_assertions)]
                    eprintln!("Skipping rejected event: {}", e);
                }
            }
            Err(e) => {
                #[cfg(debug_assertions)]
                eprintln!("Skipping malformed row: {}", e);
                continue;
            }
        }
    }

    Ok(engine)
}

fn apply_event(engine: &Engine, event: ReplayEvent) -> Result<(), cheki_engine::TicketError> {
    match event {
        ReplayEvent::Stock {
            product,
            value,
            operator,
        } => {
            engine.set_stock(operator, &product, value);
            Ok(())
        }
        ReplayEvent::Adjust {
            product,
            delta,
            operator,
        } => engine.adjust_stock(operator, &product, delta).map(|_| ()),
        ReplayEvent::Checkout { request } => engine.checkout(request).map(|_| ()),
        ReplayEvent::Settle { event } => engine.settle(event).map(|_| ()),
        ReplayEvent::Use { order_id, operator } => engine.use_ticket(operator, order_id),
        ReplayEvent::Undo { order_id, operator } => engine.undo_ticket_use(operator, order_id),
        ReplayEvent::Delete { order_id, operator } => engine.delete_order(operator, order_id),
    }
}

/// Final status of one order in the report.
#[derive(Debug, Serialize)]
struct OrderRow {
    order: Uuid,
    customer: u64,
    status: String,
    quantity: u32,
    total: Decimal,
}

/// Final level of one product counter in the report.
#[derive(Debug, Serialize)]
struct StockRow {
    product: String,
    available: u32,
}

/// Writes final order statuses and stock levels as two CSV sections.
///
/// # Example
///
/// ```csv
/// order,customer,status,quantity,total
/// 00000000-0000-0000-0000-000000000001,7,CONFIRMED,2,3000
///
/// product,available
/// group-cheki,48
/// ```
///
/// # Errors
///
/// Returns a CSV error if writing fails.
pub fn write_report<W: Write>(engine: &Engine, mut writer: W) -> Result<(), csv::Error> {
    let mut orders = Writer::from_writer(&mut writer);
    for order in engine.orders() {
        orders.serialize(OrderRow {
            order: order.order_id().0,
            customer: order.customer_id().0,
            status: order.status().to_string(),
            quantity: order.total_quantity(),
            total: order.total_amount(),
        })?;
    }
    orders.flush()?;
    drop(orders);

    writer.write_all(b"\n")?;

    let mut stock = Writer::from_writer(&mut writer);
    for (product, available) in engine.stock_levels() {
        stock.serialize(StockRow {
            product: product.0,
            available,
        })?;
    }
    stock.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cheki_engine::OrderStatus;
    use std::io::Cursor;

    fn order_id(n: u128) -> OrderId {
        OrderId(Uuid::from_u128(n))
    }

    #[test]
    fn replay_stock_checkout_settle() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,50,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,2,1500,,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        let order = engine.order(&order_id(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            48
        );
    }

    #[test]
    fn replayed_settlement_decrements_once() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,10,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,3,1500,,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,CAPTURED,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            7
        );
    }

    #[test]
    fn failed_settlement_voids_without_stock_effect() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,10,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,3,1500,,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,FAILED,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        let order = engine.order(&order_id(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Void);
        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            10
        );
    }

    #[test]
    fn use_and_delete_restore_stock() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,10,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,4,1500,,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,\n\
                   use,00000000-0000-0000-0000-000000000001,,,,,,,staff\n\
                   delete,00000000-0000-0000-0000-000000000001,,,,,,,staff\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        // deletion of a used order restores its quantities
        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            10
        );
        assert!(engine.order(&order_id(1)).is_err());
    }

    #[test]
    fn adjust_moves_counter_with_clamp() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,10,staff\n\
                   adjust,,,group-cheki,,,,-4,staff\n\
                   adjust,,,group-cheki,,,,-100,staff\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            0
        );
    }

    #[test]
    fn replay_with_whitespace() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                    stock , , , group-cheki , , , , 50 , staff \n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            50
        );
    }

    #[test]
    fn skip_malformed_rows() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,50,staff\n\
                   bogus,not,even,close,,,,,\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,1,1500,,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.order_count(), 1);
        assert_eq!(
            engine.available(&ProductKey::from("group-cheki")).unwrap(),
            50
        );
    }

    #[test]
    fn insufficient_stock_checkout_is_skipped() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,2,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,5,1500,,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        assert_eq!(engine.order_count(), 0);
    }

    #[test]
    fn report_contains_both_sections() {
        let csv = "event,order,customer,product,quantity,unit_price,status,value,operator\n\
                   stock,,,group-cheki,,,,10,staff\n\
                   checkout,00000000-0000-0000-0000-000000000001,7,group-cheki,2,1500,,,\n\
                   settle,00000000-0000-0000-0000-000000000001,,,,,SETTLED,,\n";
        let engine = replay_events(Cursor::new(csv)).unwrap();

        let mut output = Vec::new();
        write_report(&engine, &mut output).unwrap();
        let report = String::from_utf8(output).unwrap();

        assert!(report.contains("order,customer,status,quantity,total"));
        assert!(report.contains("CONFIRMED"));
        assert!(report.contains("product,available"));
        assert!(report.contains("group-cheki,8"));
    }
}
