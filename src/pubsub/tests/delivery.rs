//! Tests for item delivery and ordering

use super::fixtures::{
    shape_relations, spawn, wait_until, Alpha, Beta, Gamma, Journal, Shape, Square, JOIN_TIMEOUT,
};
use crate::pubsub::api::{ConnectOptions, Publisher, Subscriber, SubscriptionBase, TypeRelations};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Publish `count` items from another thread, counting completed publishes
fn publish_in_background(
    publisher: &Publisher,
    count: u32,
) -> (Arc<AtomicUsize>, thread::JoinHandle<()>) {
    let published = Arc::new(AtomicUsize::new(0));
    let producer = {
        let publisher = publisher.clone();
        let published = Arc::clone(&published);
        thread::spawn(move || {
            for n in 0..count {
                publisher.publish::<Alpha>(Alpha(n)).unwrap();
                published.fetch_add(1, Ordering::SeqCst);
            }
        })
    };
    (published, producer)
}

#[test]
fn test_items_of_one_type_arrive_in_publish_order() {
    let publisher = Publisher::builder("counter").publishes::<Alpha>().build();
    let subscriber = Subscriber::builder("ordered", Journal::default())
        .governor(16)
        .subscribe::<Alpha, _>(|journal, alpha| {
            journal.entries.push(alpha.0.to_string());
            Ok(())
        })
        .build();
    publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    let result = spawn(subscriber);

    publisher
        .run(|p| {
            for n in 0..500 {
                p.publish::<Alpha>(Alpha(n))?;
            }
            Ok(())
        })
        .unwrap();

    let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    let expected: Vec<String> = (0..500).map(|n| n.to_string()).collect();
    assert_eq!(journal.entries, expected);
}

#[test]
fn test_mixed_types_are_processed_in_arrival_order() {
    let publisher = Publisher::builder("p")
        .publishes::<Alpha>()
        .publishes::<Beta>()
        .build();
    let subscriber = Subscriber::builder("s", Journal::default())
        .subscribe::<Alpha, _>(|journal, alpha| {
            journal.entries.push(format!("a{}", alpha.0));
            Ok(())
        })
        .subscribe::<Beta, _>(|journal, beta| {
            journal.entries.push(format!("b{}", beta.0));
            Ok(())
        })
        .build();
    let handle = subscriber.handle();
    assert_eq!(
        publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap(),
        2
    );
    let result = spawn(subscriber);

    publisher.publish::<Alpha>(Alpha(1)).unwrap();
    publisher.publish::<Beta>(Beta(1)).unwrap();
    publisher.publish::<Alpha>(Alpha(2)).unwrap();
    assert!(publisher.end_publication());

    let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(journal.entries, vec!["a1", "b1", "a2"]);
    assert!(handle.is_finished());
    assert_eq!(handle.publication_count(), 0);
}

#[test]
fn test_derived_delivery_shares_the_item() {
    let publisher = Publisher::builder("squares").publishes::<Square>().build();
    let seen: Arc<Mutex<Vec<u32>>> = Arc::default();
    let subscriber = {
        let seen = Arc::clone(&seen);
        Subscriber::builder("areas", ())
            .subscribe::<dyn Shape, _>(move |_, shape| {
                seen.lock().unwrap().push(shape.area());
                Ok(())
            })
            .build()
    };
    publisher
        .connect(&subscriber, &ConnectOptions::with_relations(shape_relations()))
        .unwrap();
    let result = spawn(subscriber);

    let square = Arc::new(Square(3));
    publisher.publish::<Square>(Arc::clone(&square)).unwrap();
    publisher.end_publication();

    result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![9]);
    // The subscription released its reference once processed
    assert_eq!(Arc::strong_count(&square), 1);
}

#[test]
fn test_convertible_delivery_converts_each_item() {
    let publisher = Publisher::builder("alphas").publishes::<Alpha>().build();
    let subscriber = Subscriber::builder("gammas", Journal::default())
        .subscribe::<Gamma, _>(|journal, gamma| {
            journal.entries.push(gamma.0.to_string());
            Ok(())
        })
        .build();
    let options = ConnectOptions::exact()
        .with_convertible(true)
        .with_derived(false);
    let options = ConnectOptions {
        relations: TypeRelations::new().converts_from::<Alpha, Gamma>(),
        ..options
    };
    publisher.connect(&subscriber, &options).unwrap();
    let result = spawn(subscriber);

    publisher
        .run(|p| {
            p.publish::<Alpha>(Alpha(1))?;
            p.publish::<Alpha>(Alpha(2))?;
            Ok(())
        })
        .unwrap();

    let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(journal.entries, vec!["10", "20"]);
}

#[test]
fn test_one_item_reaches_every_subscriber() {
    let publisher = Publisher::builder("broadcast").publishes::<Alpha>().build();
    let make = |name: &str| {
        Subscriber::builder(name, Journal::default())
            .subscribe::<Alpha, _>(|journal, alpha| {
                journal.entries.push(alpha.0.to_string());
                Ok(())
            })
            .build()
    };
    let first = make("first");
    let second = make("second");
    publisher.connect(&first, &ConnectOptions::exact()).unwrap();
    publisher.connect(&second, &ConnectOptions::exact()).unwrap();
    let first = spawn(first);
    let second = spawn(second);

    assert_eq!(publisher.publish::<Alpha>(Alpha(7)).unwrap(), 2);
    drop(publisher);

    for result in [first, second] {
        let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
        assert_eq!(journal.entries, vec!["7"]);
    }
}

#[test]
fn test_concurrent_publishers_keep_per_publisher_order() {
    let left = Publisher::builder("left").publishes::<Alpha>().build();
    let right = Publisher::builder("right").publishes::<Beta>().build();
    let subscriber = Subscriber::builder("merge", Journal::default())
        .governor(4)
        .subscribe::<Alpha, _>(|journal, alpha| {
            journal.entries.push(format!("a{}", alpha.0));
            Ok(())
        })
        .subscribe::<Beta, _>(|journal, beta| {
            journal.entries.push(format!("b{}", beta.0));
            Ok(())
        })
        .build();
    left.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    right.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    let result = spawn(subscriber);

    let producers: Vec<_> = [left.clone(), right.clone()]
        .into_iter()
        .enumerate()
        .map(|(index, publisher)| {
            thread::spawn(move || {
                publisher.run(|p| {
                    for n in 0..100 {
                        if index == 0 {
                            p.publish::<Alpha>(Alpha(n))?;
                        } else {
                            p.publish::<Beta>(Beta(n))?;
                        }
                    }
                    Ok(())
                })
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap().unwrap();
    }

    let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(journal.entries.len(), 200);
    for prefix in ["a", "b"] {
        let sequence: Vec<u32> = journal
            .entries
            .iter()
            .filter_map(|entry| entry.strip_prefix(prefix))
            .map(|n| n.parse().unwrap())
            .collect();
        assert_eq!(sequence, (0..100).collect::<Vec<_>>());
    }
}

#[test]
fn test_raising_master_governor_releases_blocked_publisher() {
    let publisher = Publisher::builder("burst").publishes::<Alpha>().build();
    let subscriber = Subscriber::builder("narrow", Journal::default())
        .governor(1)
        .subscribe::<Alpha, _>(|journal, alpha| {
            journal.entries.push(alpha.0.to_string());
            Ok(())
        })
        .build();
    publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    let handle = subscriber.handle();
    assert_eq!(handle.governor(), 1);

    // Nobody consumes yet, so the second item waits for master queue space
    let (published, producer) = publish_in_background(&publisher, 3);
    wait_until(|| handle.pending() == 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(published.load(Ordering::SeqCst), 1);

    handle.set_governor(0);
    producer.join().unwrap();
    assert_eq!(published.load(Ordering::SeqCst), 3);
    assert_eq!(handle.pending(), 3);
    assert_eq!(handle.governor(), 0);

    let result = spawn(subscriber);
    assert!(publisher.end_publication());
    let journal = result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(journal.entries, vec!["0", "1", "2"]);
}

#[test]
fn test_lowering_master_governor_applies_to_later_items() {
    let publisher = Publisher::builder("burst").publishes::<Alpha>().build();
    let subscriber = Subscriber::builder("tightened", Journal::default())
        .governor(0)
        .subscribe::<Alpha, _>(|_, _| Ok(()))
        .build();
    publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    subscriber.set_governor(2);
    assert_eq!(subscriber.governor(), 2);

    let handle = subscriber.handle();
    let (published, producer) = publish_in_background(&publisher, 4);
    wait_until(|| handle.pending() == 2);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(published.load(Ordering::SeqCst), 2);

    // Draining lets the blocked producer finish
    let result = spawn(subscriber);
    producer.join().unwrap();
    assert!(publisher.end_publication());
    result.recv_timeout(JOIN_TIMEOUT).unwrap().unwrap();
    assert_eq!(published.load(Ordering::SeqCst), 4);
}

#[test]
fn test_subscription_governor_can_be_changed_through_handle() {
    let publisher = Publisher::builder("burst").publishes::<Alpha>().build();
    let subscriber = Subscriber::builder("per-type", Journal::default())
        .subscribe::<Alpha, _>(|_, _| Ok(()))
        .build();
    publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap();
    let handle = subscriber.handle();
    let subscription = subscriber.subscription::<Alpha>().unwrap();

    assert!(handle.set_subscription_governor::<Alpha>(1));
    assert!(!handle.set_subscription_governor::<Beta>(1));

    let (published, producer) = publish_in_background(&publisher, 2);
    wait_until(|| subscription.pending() == 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(published.load(Ordering::SeqCst), 1);

    assert!(handle.set_subscription_governor::<Alpha>(0));
    producer.join().unwrap();
    assert_eq!(subscription.pending(), 2);
    assert_eq!(handle.pending(), 2);
}
