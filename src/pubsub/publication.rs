//! Typed publications
//!
//! A [`Publication<T>`] fans each published item out to every connected
//! subscription. Items are shared (`Arc<T>`), never copied; adapted
//! connections convert the shared item on the way into the subscription.

use crate::core::sync::{handle_rwlock_read, handle_rwlock_write, recover_poison};
use crate::pubsub::error::{PipelineError, PipelineResult};
use crate::pubsub::payload::{PayloadType, Relation, RelationKind};
use crate::pubsub::subscription::{SubscriberCore, Subscription, SubscriptionBase};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

static NEXT_PUBLICATION_ID: AtomicU64 = AtomicU64::new(1);

/// Delivery function of one connection, ending in a subscription's inbox
pub type Deliver<P> = Arc<dyn Fn(Arc<P>) -> bool + Send + Sync>;

/// Outcome of attaching a subscription to a publication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    Connected,
    /// The pair was already connected; nothing changed
    AlreadyConnected,
    /// Ended publication, closed subscriber, or the subscription cannot
    /// accept this payload
    Rejected,
}

#[derive(Default)]
struct AudienceState {
    connections: usize,
    relays: Vec<Weak<SubscriberCore>>,
}

/// Connection count shared by every publication of one publisher
///
/// Subscribers that relay into the publisher watch it: they are signalled
/// when the count drops to zero, and again when it becomes non-zero, so a
/// relay blocked on a quiet upstream still notices its sink leaving.
#[derive(Default)]
pub(crate) struct Audience {
    state: Mutex<AudienceState>,
}

impl Audience {
    fn state(&self) -> MutexGuard<'_, AudienceState> {
        recover_poison(self.state.lock())
    }

    fn notify(state: &mut AudienceState) {
        let present = state.connections > 0;
        state.relays.retain(|relay| match relay.upgrade() {
            Some(core) => {
                core.set_downstream_present(present);
                true
            }
            None => false,
        });
    }

    fn joined(&self) {
        let mut state = self.state();
        state.connections += 1;
        if state.connections == 1 {
            Self::notify(&mut state);
        }
    }

    fn left(&self, count: usize) {
        if count == 0 {
            return;
        }
        let mut state = self.state();
        state.connections = state.connections.saturating_sub(count);
        if state.connections == 0 {
            Self::notify(&mut state);
        }
    }

    pub(crate) fn connections(&self) -> usize {
        self.state().connections
    }

    /// Register a relaying subscriber and tell it the current state
    pub(crate) fn watch(&self, core: &Arc<SubscriberCore>) {
        let mut state = self.state();
        core.set_downstream_present(state.connections > 0);
        state.relays.push(Arc::downgrade(core));
    }
}

/// Type-erased view of a publication, used by publishers and subscriptions
pub trait PublicationBase: Send + Sync {
    fn id(&self) -> u64;

    fn payload_type(&self) -> PayloadType;

    fn publisher_name(&self) -> &str;

    fn subscription_count(&self) -> usize;

    fn is_ended(&self) -> bool;

    /// End the publication; returns `true` only for the call that ended it
    fn end_publication(&self) -> bool;

    /// Connect a subscription, through `relation` when the payload types differ
    fn attach(
        &self,
        subscription: &Arc<dyn SubscriptionBase>,
        relation: Option<&Relation>,
    ) -> PipelineResult<Attach>;

    /// Remove a target without notifying it
    fn detach(&self, subscription_key: u64) -> bool;
}

struct Target<T: ?Sized> {
    subscription: Arc<dyn SubscriptionBase>,
    deliver: Deliver<T>,
    adapted: Option<RelationKind>,
}

pub struct Publication<T: ?Sized> {
    id: u64,
    publisher: String,
    payload_type: PayloadType,
    targets: RwLock<Vec<Target<T>>>,
    ended: AtomicBool,
    audience: Arc<Audience>,
    this: Weak<Publication<T>>,
}

fn exact_delivery<T: ?Sized + Send + Sync + 'static>(
    subscription: Arc<dyn Any + Send + Sync>,
) -> Option<Deliver<T>> {
    let subscription = subscription.downcast::<Subscription<T>>().ok()?;
    Some(Arc::new(move |item: Arc<T>| subscription.inbox(item)))
}

impl<T: ?Sized + Send + Sync + 'static> Publication<T> {
    pub(crate) fn new(publisher: impl Into<String>) -> Arc<Self> {
        Self::with_audience(publisher, Arc::default())
    }

    /// A publication whose connections count towards a shared audience
    pub(crate) fn with_audience(publisher: impl Into<String>, audience: Arc<Audience>) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            id: NEXT_PUBLICATION_ID.fetch_add(1, Ordering::Relaxed),
            publisher: publisher.into(),
            payload_type: PayloadType::of::<T>(),
            targets: RwLock::new(Vec::new()),
            ended: AtomicBool::new(false),
            audience,
            this: this.clone(),
        })
    }

    /// Deliver `item` to every connected subscription
    ///
    /// The target list is snapshotted and the lock released before any
    /// delivery, so a subscriber blocked on a full queue never holds up a
    /// concurrent connect or disconnect. Returns the number of subscriptions
    /// that accepted the item.
    ///
    /// Publishing and ending are expected on the same producer thread. An
    /// item already past the snapshot when another thread ends the
    /// publication may reach a subscriber that has stopped, and is dropped.
    pub fn publish(&self, item: Arc<T>) -> PipelineResult<usize> {
        let deliveries: Vec<Deliver<T>> = {
            let targets = handle_rwlock_read(self.targets.read(), PipelineError::synchronisation)?;
            // Under the lock: end_publication sets the flag before it takes
            // the targets, so a snapshot is never taken after an end.
            if self.is_ended() {
                return Err(PipelineError::PublicationEnded {
                    publisher: self.publisher.clone(),
                    type_name: self.payload_type.name(),
                });
            }
            targets.iter().map(|target| Arc::clone(&target.deliver)).collect()
        };

        let reached = deliveries
            .iter()
            .filter(|deliver| deliver(Arc::clone(&item)))
            .count();
        log::trace!(
            "'{}' published {} to {}/{} subscriptions",
            self.publisher,
            self.payload_type,
            reached,
            deliveries.len()
        );
        Ok(reached)
    }

    /// Connect a subscription of exactly this payload type
    ///
    /// Returns `false` if the pair was already connected or the publication
    /// has ended.
    pub fn connect(&self, subscription: &Arc<Subscription<T>>) -> PipelineResult<bool> {
        let erased: Arc<dyn SubscriptionBase> = subscription.clone();
        Ok(self.attach(&erased, None)? == Attach::Connected)
    }

    /// Disconnect a subscription and release its upstream count
    pub fn disconnect(&self, subscription: &dyn SubscriptionBase) -> bool {
        let removed = self.detach(subscription.key());
        if removed {
            subscription.publication_ended(self.id);
        }
        removed
    }

    /// Keys of the connected subscriptions with the relation used, if any
    pub fn connections(&self) -> Vec<(u64, Option<RelationKind>)> {
        recover_poison(self.targets.read())
            .iter()
            .map(|target| (target.subscription.key(), target.adapted))
            .collect()
    }
}

impl<T: ?Sized + Send + Sync + 'static> PublicationBase for Publication<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    fn publisher_name(&self) -> &str {
        &self.publisher
    }

    fn subscription_count(&self) -> usize {
        recover_poison(self.targets.read()).len()
    }

    fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    fn end_publication(&self) -> bool {
        if self.ended.swap(true, Ordering::AcqRel) {
            return false;
        }

        let targets = std::mem::take(&mut *recover_poison(self.targets.write()));
        log::debug!(
            "'{}' ended {} with {} subscriptions",
            self.publisher,
            self.payload_type,
            targets.len()
        );
        self.audience.left(targets.len());
        for target in targets {
            target.subscription.publication_ended(self.id);
        }
        true
    }

    fn attach(
        &self,
        subscription: &Arc<dyn SubscriptionBase>,
        relation: Option<&Relation>,
    ) -> PipelineResult<Attach> {
        let mut targets = handle_rwlock_write(self.targets.write(), PipelineError::synchronisation)?;
        // Checked under the write lock so an attach never slips in after
        // end_publication has taken the targets.
        if self.is_ended() || subscription.is_closed() {
            return Ok(Attach::Rejected);
        }
        if targets
            .iter()
            .any(|target| target.subscription.key() == subscription.key())
        {
            return Ok(Attach::AlreadyConnected);
        }

        let erased = Arc::clone(subscription).into_any();
        let deliver = match relation {
            None => exact_delivery::<T>(erased),
            Some(relation) => relation.bind::<T>(erased),
        };
        let Some(deliver) = deliver else {
            return Ok(Attach::Rejected);
        };

        let this: Weak<dyn PublicationBase> = self.this.clone();
        match subscription.register_upstream(self.id, this) {
            Attach::Connected => {}
            refused => return Ok(refused),
        }

        targets.push(Target {
            subscription: Arc::clone(subscription),
            deliver,
            adapted: relation.map(Relation::kind),
        });
        self.audience.joined();
        log::debug!(
            "'{}' {} -> '{}' {}{}",
            self.publisher,
            self.payload_type,
            subscription.subscriber_name(),
            subscription.payload_type(),
            relation
                .map(|r| format!(" ({})", r.kind()))
                .unwrap_or_default()
        );
        Ok(Attach::Connected)
    }

    fn detach(&self, subscription_key: u64) -> bool {
        let mut targets = recover_poison(self.targets.write());
        let before = targets.len();
        targets.retain(|target| target.subscription.key() != subscription_key);
        let removed = before - targets.len();
        self.audience.left(removed);
        removed > 0
    }
}

impl<T: ?Sized> fmt::Debug for Publication<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Publication")
            .field("id", &self.id)
            .field("publisher", &self.publisher)
            .field("payload_type", &self.payload_type)
            .field("ended", &self.ended.load(Ordering::Relaxed))
            .finish()
    }
}
