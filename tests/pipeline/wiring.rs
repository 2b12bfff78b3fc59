//! Connection rules seen through the public API

use crate::common::{Invoice, Order};
use fanout::pubsub::api::{
    ConnectOptions, PipelineError, Publisher, Subscriber, TypeRelations,
};

#[test]
fn test_unrelated_endpoints_report_no_common_type() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    let subscriber = Subscriber::builder("ledger", ())
        .subscribe::<Invoice, _>(|_, _| Ok(()))
        .build();

    match orders.connect(&subscriber, &ConnectOptions::exact()) {
        Err(PipelineError::NoCommonType {
            publisher,
            subscriber,
        }) => {
            assert_eq!(publisher, "orders");
            assert_eq!(subscriber, "ledger");
        }
        other => panic!("expected NoCommonType, got {other:?}"),
    }
    assert_eq!(subscriber.publication_count(), 0);
}

impl From<Order> for Invoice {
    fn from(order: Order) -> Self {
        Invoice {
            order: order.id,
            total: order.amount,
        }
    }
}

#[test]
fn test_declared_conversion_needs_to_be_enabled() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    let subscriber = Subscriber::builder("ledger", ())
        .subscribe::<Invoice, _>(|_, _| Ok(()))
        .build();
    let relations = TypeRelations::new().converts_from::<Order, Invoice>();

    let exact_only = ConnectOptions::with_relations(relations.clone()).with_convertible(false);
    assert!(orders.connect(&subscriber, &exact_only).is_err());

    let converting = ConnectOptions::with_relations(relations);
    assert_eq!(orders.connect(&subscriber, &converting).unwrap(), 1);
    assert_eq!(subscriber.publication_count(), 1);
}

#[test]
fn test_publishing_undeclared_type_is_rejected() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();

    let error = orders
        .publish::<Invoice>(Invoice { order: 1, total: 1 })
        .unwrap_err();

    assert!(matches!(error, PipelineError::UndeclaredType { .. }));
}

#[test]
fn test_connect_after_end_is_rejected() {
    let orders = Publisher::builder("orders").publishes::<Order>().build();
    assert!(orders.end_publication());
    assert!(!orders.end_publication());

    let subscriber = Subscriber::builder("late", ())
        .subscribe::<Order, _>(|_, _| Ok(()))
        .build();

    assert!(matches!(
        orders.connect(&subscriber, &ConnectOptions::exact()),
        Err(PipelineError::PublisherEnded { .. })
    ));
}
