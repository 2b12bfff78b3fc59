//! Multi-stage pipelines

use crate::common::{spawn, Collector, Invoice, Order, JOIN_TIMEOUT};
use fanout::pubsub::api::{BoxError, ConnectOptions, Publisher, Subscriber, Worker};
use std::sync::Arc;

/// Turns orders into invoices on its own publisher
struct Billing {
    invoices: Publisher,
    billed: usize,
}

impl Worker for Billing {
    fn before_end_publication(&mut self) -> Result<(), BoxError> {
        log::debug!("billing issued {} invoices", self.billed);
        Ok(())
    }
}

impl Billing {
    fn on_order(&mut self, order: Arc<Order>) -> Result<(), BoxError> {
        self.invoices.publish::<Invoice>(Invoice {
            order: order.id,
            total: order.amount + order.amount / 10,
        })?;
        self.billed += 1;
        Ok(())
    }
}

#[test]
fn test_relay_forwards_everything_before_sink_finishes() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    let invoices = Publisher::builder("billing").publishes::<Invoice>().build();

    let billing = Subscriber::builder(
        "billing",
        Billing {
            invoices: invoices.clone(),
            billed: 0,
        },
    )
    .subscribe::<Order, _>(Billing::on_order)
    .downstream(invoices.clone())
    .build();
    let ledger = Subscriber::builder("ledger", Collector::<Invoice>::default())
        .subscribe::<Invoice, _>(|ledger, invoice| {
            ledger.items.push(Invoice::clone(&invoice));
            Ok(())
        })
        .build();

    assert_eq!(invoices.connect(&ledger, &ConnectOptions::exact()).unwrap(), 1);
    assert_eq!(orders.connect(&billing, &ConnectOptions::exact()).unwrap(), 1);
    drop(invoices);

    let ledger = spawn(ledger);
    let billing = spawn(billing);

    orders
        .run(|p| {
            for id in 1..=50 {
                p.publish::<Order>(Order { id, amount: id * 100 })?;
            }
            Ok(())
        })
        .unwrap();

    let billing = billing.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(billing.billed, 50);
    assert!(billing.invoices.is_ended());

    let ledger = ledger.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    let orders_seen: Vec<u32> = ledger.items.iter().map(|i| i.order).collect();
    assert_eq!(orders_seen, (1..=50).collect::<Vec<_>>());
    assert_eq!(ledger.items[0].total, 110);
}

#[test]
fn test_fan_out_reaches_every_subscriber() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    let receivers: Vec<_> = (0..3)
        .map(|n| {
            let subscriber = Subscriber::builder(format!("copy-{n}"), Collector::<u32>::default())
                .subscribe::<Order, _>(|copy, order| {
                    copy.items.push(order.id);
                    Ok(())
                })
                .build();
            orders.connect(&subscriber, &ConnectOptions::exact()).unwrap();
            spawn(subscriber)
        })
        .collect();
    assert_eq!(orders.subscription_count(), 3);

    orders
        .run(|p| {
            for id in 0..20 {
                p.publish::<Order>(Order { id, amount: 1 })?;
            }
            Ok(())
        })
        .unwrap();

    for receiver in receivers {
        let copy = receiver.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
        assert_eq!(copy.items, (0..20).collect::<Vec<_>>());
    }
}

#[test]
fn test_producer_error_still_ends_publication() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    let subscriber = Subscriber::builder("sink", Collector::<u32>::default())
        .subscribe::<Order, _>(|sink, order| {
            sink.items.push(order.id);
            Ok(())
        })
        .build();
    orders.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    let sink = spawn(subscriber);

    let result = orders.run(|p| {
        p.publish::<Order>(Order { id: 7, amount: 1 })?;
        Err("upstream feed closed".into())
    });

    assert!(result.is_err());
    assert!(orders.is_ended());
    let sink = sink.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(sink.items, vec![7]);
}
