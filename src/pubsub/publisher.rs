//! Publishers: named sets of typed publications

use crate::pubsub::error::{BoxError, PipelineError, PipelineResult};
use crate::pubsub::payload::PayloadType;
use crate::pubsub::publication::{Attach, Audience, Publication, PublicationBase};
use crate::pubsub::resolver::{resolve, ConnectOptions};
use crate::pubsub::subscriber::SubscriptionSet;
use crate::pubsub::subscription::SubscriberCore;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct PublicationSlot {
    base: Arc<dyn PublicationBase>,
    typed: Arc<dyn Any + Send + Sync>,
}

struct PublisherInner {
    name: String,
    slots: Vec<PublicationSlot>,
    audience: Arc<Audience>,
    ended: AtomicBool,
}

impl PublisherInner {
    fn end_publication(&self) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }
        for slot in &self.slots {
            slot.base.end_publication();
        }
        log::debug!("publisher '{}' ended publication", self.name);
        true
    }
}

impl Drop for PublisherInner {
    fn drop(&mut self) {
        self.end_publication();
    }
}

/// A named producer of one or more payload types
///
/// Cloning is cheap and every clone refers to the same publications.
/// Publication ends when [`Publisher::end_publication`] is called or when
/// the last clone is dropped, whichever happens first.
///
/// # Example
///
/// ```rust
/// use fanout::pubsub::api::{ConnectOptions, Publisher, Subscriber, Worker};
///
/// #[derive(Default)]
/// struct Sum(u32);
/// impl Worker for Sum {}
///
/// let publisher = Publisher::builder("numbers").publishes::<u32>().build();
/// let subscriber = Subscriber::builder("sum", Sum::default())
///     .subscribe::<u32, _>(|sum, n| {
///         sum.0 += *n;
///         Ok(())
///     })
///     .build();
///
/// publisher.connect(&subscriber, &ConnectOptions::exact()).unwrap();
/// let worker = std::thread::spawn(move || subscriber.run());
///
/// publisher
///     .run(|p| {
///         for n in 1..=4u32 {
///             p.publish::<u32>(n)?;
///         }
///         Ok(())
///     })
///     .unwrap();
///
/// assert_eq!(worker.join().unwrap().unwrap().0, 10);
/// ```
#[derive(Clone)]
pub struct Publisher {
    inner: Arc<PublisherInner>,
}

impl Publisher {
    pub fn builder(name: impl Into<String>) -> PublisherBuilder {
        PublisherBuilder {
            name: name.into(),
            slots: Vec::new(),
            audience: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Payload types in declaration order
    pub fn payload_types(&self) -> Vec<PayloadType> {
        self.inner
            .slots
            .iter()
            .map(|slot| slot.base.payload_type())
            .collect()
    }

    fn find<T: ?Sized + Send + Sync + 'static>(&self) -> Option<&PublicationSlot> {
        let payload_type = PayloadType::of::<T>();
        self.inner
            .slots
            .iter()
            .find(|slot| slot.base.payload_type() == payload_type)
    }

    /// The typed publication for `T`, if declared
    pub fn publication<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<Publication<T>>> {
        let slot = self.find::<T>()?;
        Arc::clone(&slot.typed).downcast::<Publication<T>>().ok()
    }

    /// Publish one item to every subscription connected for `T`
    ///
    /// Returns the number of subscriptions that received the item. Clones
    /// may publish from several threads, but ending publication belongs to
    /// the producer: an item in flight while another thread ends the
    /// publication can be dropped by a subscriber that already stopped.
    pub fn publish<T: ?Sized + Send + Sync + 'static>(
        &self,
        item: impl Into<Arc<T>>,
    ) -> PipelineResult<usize> {
        let publication = self
            .find::<T>()
            .and_then(|slot| slot.typed.downcast_ref::<Publication<T>>())
            .ok_or_else(|| PipelineError::UndeclaredType {
                publisher: self.inner.name.clone(),
                type_name: std::any::type_name::<T>(),
            })?;
        publication.publish(item.into())
    }

    /// Wire this publisher's publications to a subscriber's subscriptions
    ///
    /// Returns how many publications were connected. Publications already
    /// connected to the subscriber count again without duplicating
    /// deliveries.
    pub fn connect<S>(&self, subscriber: &S, options: &ConnectOptions) -> PipelineResult<usize>
    where
        S: SubscriptionSet + ?Sized,
    {
        if self.is_ended() {
            return Err(PipelineError::PublisherEnded {
                publisher: self.inner.name.clone(),
            });
        }

        let subscriptions = subscriber.subscriptions();
        let finished = || PipelineError::SubscriberFinished {
            publisher: self.inner.name.clone(),
            subscriber: subscriber.subscriber_name().to_string(),
        };
        if subscriptions.iter().any(|s| s.is_closed()) {
            return Err(finished());
        }
        let subscription_types: Vec<PayloadType> =
            subscriptions.iter().map(|s| s.payload_type()).collect();

        let claims = resolve(
            &self.payload_types(),
            &subscription_types,
            options,
            |p, s, relation| {
                let outcome = self.inner.slots[p]
                    .base
                    .attach(&subscriptions[s], relation)?;
                Ok(outcome != Attach::Rejected)
            },
        )?;

        if claims.is_empty() {
            // The subscriber may have closed while the resolver ran
            if subscriptions.iter().any(|s| s.is_closed()) {
                return Err(finished());
            }
            return Err(PipelineError::NoCommonType {
                publisher: self.inner.name.clone(),
                subscriber: subscriber.subscriber_name().to_string(),
            });
        }

        log::debug!(
            "connected '{}' to '{}' ({} publications)",
            self.inner.name,
            subscriber.subscriber_name(),
            claims.len()
        );
        Ok(claims.len())
    }

    /// End every publication; `true` only for the call that ended them
    pub fn end_publication(&self) -> bool {
        self.inner.end_publication()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    /// Total connections over all publications
    pub fn subscription_count(&self) -> usize {
        self.inner
            .slots
            .iter()
            .map(|slot| slot.base.subscription_count())
            .sum()
    }

    pub fn has_subscribers(&self) -> bool {
        self.inner.audience.connections() > 0
    }

    /// Signal `core` whenever this publisher gains its first or loses its
    /// last subscriber
    pub(crate) fn watch(&self, core: &Arc<SubscriberCore>) {
        self.inner.audience.watch(core);
    }

    /// Thread body for a producer
    ///
    /// Publication is ended once `producer` returns, fails or panics. A
    /// panic is resumed after ending so the joining thread observes it.
    pub fn run<F>(&self, producer: F) -> PipelineResult<()>
    where
        F: FnOnce(&Publisher) -> Result<(), BoxError>,
    {
        log::debug!("publisher '{}' starting", self.inner.name);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| producer(self)));
        self.end_publication();

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(PipelineError::Producer {
                publisher: self.inner.name.clone(),
                source,
            }),
            Err(payload) => panic::resume_unwind(payload),
        }
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publisher")
            .field("name", &self.inner.name)
            .field("payload_types", &self.payload_types())
            .field("ended", &self.is_ended())
            .finish()
    }
}

pub struct PublisherBuilder {
    name: String,
    slots: Vec<PublicationSlot>,
    audience: Arc<Audience>,
}

impl PublisherBuilder {
    /// Declare a published payload type; repeated declarations are ignored
    pub fn publishes<T: ?Sized + Send + Sync + 'static>(mut self) -> Self {
        let payload_type = PayloadType::of::<T>();
        if self
            .slots
            .iter()
            .any(|slot| slot.base.payload_type() == payload_type)
        {
            log::warn!(
                "publisher '{}' already publishes {}; ignoring duplicate",
                self.name,
                payload_type
            );
            return self;
        }

        let publication = Publication::<T>::with_audience(self.name.clone(), Arc::clone(&self.audience));
        self.slots.push(PublicationSlot {
            base: publication.clone(),
            typed: publication,
        });
        self
    }

    pub fn build(self) -> Publisher {
        Publisher {
            inner: Arc::new(PublisherInner {
                name: self.name,
                slots: self.slots,
                audience: self.audience,
                ended: AtomicBool::new(false),
            }),
        }
    }
}
