//! Typed subscriptions and the state they share with their subscriber

use crate::core::sync::recover_poison;
use crate::pubsub::payload::PayloadType;
use crate::pubsub::publication::{Attach, PublicationBase};
use crate::queue::api::BoundedQueue;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

static NEXT_SUBSCRIPTION_KEY: AtomicU64 = AtomicU64::new(1);

/// Default depth of a subscriber's master queue
pub const DEFAULT_MASTER_GOVERNOR: usize = 100;

#[derive(Debug, Default)]
struct Signals {
    live_upstream: usize,
    stop_requested: bool,
    downstream_lost: bool,
}

/// State shared by a subscriber and every one of its subscriptions
///
/// The master queue carries slot tokens, one per delivered item. It is
/// interrupted whenever the subscriber has no live upstream publication,
/// was asked to stop, or relays into a publisher nobody listens to, so a
/// blocked worker wakes up and re-checks whether it should keep going.
pub(crate) struct SubscriberCore {
    name: String,
    master: BoundedQueue<usize>,
    signals: Mutex<Signals>,
    closed: AtomicBool,
    finished: AtomicBool,
}

impl SubscriberCore {
    pub(crate) fn new(name: impl Into<String>, governor: usize) -> Self {
        let core = Self {
            name: name.into(),
            master: BoundedQueue::with_governor(governor),
            signals: Mutex::new(Signals::default()),
            closed: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        };
        core.master.set_interrupt(true);
        core
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn master(&self) -> &BoundedQueue<usize> {
        &self.master
    }

    fn signals(&self) -> MutexGuard<'_, Signals> {
        recover_poison(self.signals.lock())
    }

    // Called with the signals lock held so interrupt changes are ordered
    // with the counter updates that caused them.
    fn update(&self, signals: &Signals) {
        self.master.set_interrupt(
            signals.stop_requested || signals.live_upstream == 0 || signals.downstream_lost,
        );
    }

    pub(crate) fn acquire_upstream(&self) {
        let mut signals = self.signals();
        signals.live_upstream += 1;
        self.update(&signals);
    }

    pub(crate) fn release_upstream(&self) {
        let mut signals = self.signals();
        signals.live_upstream = signals.live_upstream.saturating_sub(1);
        if signals.live_upstream == 0 {
            log::debug!("subscriber '{}' has no live publications left", self.name);
        }
        self.update(&signals);
    }

    pub(crate) fn request_stop(&self) {
        let mut signals = self.signals();
        signals.stop_requested = true;
        self.update(&signals);
    }

    pub(crate) fn stop_requested(&self) -> bool {
        self.signals().stop_requested
    }

    /// Called by the downstream publisher as its connection count leaves or
    /// reaches zero
    pub(crate) fn set_downstream_present(&self, present: bool) {
        let mut signals = self.signals();
        if signals.downstream_lost == present {
            log::debug!(
                "subscriber '{}' downstream {}",
                self.name,
                if present { "connected" } else { "lost" }
            );
        }
        signals.downstream_lost = !present;
        self.update(&signals);
    }

    pub(crate) fn downstream_lost(&self) -> bool {
        self.signals().downstream_lost
    }

    pub(crate) fn live_upstream(&self) -> usize {
        self.signals().live_upstream
    }

    /// No new upstream connection is accepted once teardown has begun
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }
}

impl fmt::Debug for SubscriberCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let signals = self.signals();
        f.debug_struct("SubscriberCore")
            .field("name", &self.name)
            .field("live_upstream", &signals.live_upstream)
            .field("stop_requested", &signals.stop_requested)
            .field("downstream_lost", &signals.downstream_lost)
            .field("master", &self.master)
            .finish()
    }
}

/// Type-erased view of a subscription
///
/// Publications hold their targets through this trait so that a single
/// publication can feed subscriptions of different payload types.
pub trait SubscriptionBase: Send + Sync {
    /// Process-wide unique identifier
    fn key(&self) -> u64;

    fn payload_type(&self) -> PayloadType;

    fn subscriber_name(&self) -> &str;

    /// Number of publications currently feeding this subscription
    fn publication_count(&self) -> usize;

    /// Items buffered in the private queue
    fn pending(&self) -> usize;

    /// Called by a publication when it ends or drops this subscription
    ///
    /// Releases the live upstream count held for that publication; repeated
    /// calls for the same publication are ignored.
    fn publication_ended(&self, publication_id: u64);

    /// Detach from every publication feeding this subscription
    fn disconnect_all(&self);

    /// Abort the private queue, discarding buffered items
    fn abort(&self);

    /// Depth of the private queue, 0 for unbounded
    fn set_governor(&self, governor: usize);

    /// Whether the owning subscriber has begun or finished teardown
    fn is_closed(&self) -> bool;

    /// Record a new upstream publication
    ///
    /// `AlreadyConnected` if it was already known, `Rejected` once the
    /// subscriber is closed.
    fn register_upstream(&self, publication_id: u64, publication: Weak<dyn PublicationBase>)
        -> Attach;

    /// Recover the concrete `Subscription<T>` via `Arc::downcast`
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

struct Upstream {
    publication_id: u64,
    publication: Weak<dyn PublicationBase>,
}

/// One typed inbox of a subscriber
pub struct Subscription<T: ?Sized> {
    key: u64,
    slot: usize,
    payload_type: PayloadType,
    queue: BoundedQueue<Arc<T>>,
    core: Arc<SubscriberCore>,
    upstream: Mutex<Vec<Upstream>>,
}

impl<T: ?Sized + Send + Sync + 'static> Subscription<T> {
    pub(crate) fn new(slot: usize, core: Arc<SubscriberCore>, governor: usize) -> Self {
        Self {
            key: NEXT_SUBSCRIPTION_KEY.fetch_add(1, Ordering::Relaxed),
            slot,
            payload_type: PayloadType::of::<T>(),
            queue: BoundedQueue::with_governor(governor),
            core,
            upstream: Mutex::new(Vec::new()),
        }
    }

    /// Accept an item from a publication
    ///
    /// The item is queued before its slot token so that a worker woken by
    /// the token always finds the item. Returns `false` when the subscriber
    /// has already torn its queues down.
    pub fn inbox(&self, item: Arc<T>) -> bool {
        if !self.queue.push(item) {
            log::trace!(
                "subscriber '{}' dropped {} after abort",
                self.core.name(),
                self.payload_type
            );
            return false;
        }
        self.core.master().push(self.slot)
    }

    /// Next buffered item, without blocking
    pub(crate) fn take(&self) -> Option<Arc<T>> {
        self.queue.try_pop()
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    fn upstream(&self) -> MutexGuard<'_, Vec<Upstream>> {
        recover_poison(self.upstream.lock())
    }
}

impl<T: ?Sized + Send + Sync + 'static> SubscriptionBase for Subscription<T> {
    fn key(&self) -> u64 {
        self.key
    }

    fn payload_type(&self) -> PayloadType {
        self.payload_type
    }

    fn subscriber_name(&self) -> &str {
        self.core.name()
    }

    fn publication_count(&self) -> usize {
        self.upstream().len()
    }

    fn pending(&self) -> usize {
        self.queue.len()
    }

    fn publication_ended(&self, publication_id: u64) {
        let removed = {
            let mut upstream = self.upstream();
            let before = upstream.len();
            upstream.retain(|u| u.publication_id != publication_id);
            before != upstream.len()
        };
        if removed {
            log::debug!(
                "publication {} ended for '{}' ({})",
                publication_id,
                self.core.name(),
                self.payload_type
            );
            self.core.release_upstream();
        }
    }

    fn disconnect_all(&self) {
        let upstream = std::mem::take(&mut *self.upstream());
        for entry in upstream {
            if let Some(publication) = entry.publication.upgrade() {
                publication.detach(self.key);
                log::trace!(
                    "'{}' ({}) detached from '{}'",
                    self.core.name(),
                    self.payload_type,
                    publication.publisher_name()
                );
            }
            self.core.release_upstream();
        }
    }

    fn abort(&self) {
        self.queue.abort();
    }

    fn set_governor(&self, governor: usize) {
        self.queue.set_governor(governor);
    }

    fn is_closed(&self) -> bool {
        self.core.is_closed() || self.queue.is_aborted()
    }

    fn register_upstream(
        &self,
        publication_id: u64,
        publication: Weak<dyn PublicationBase>,
    ) -> Attach {
        {
            // Checked under the upstream lock: teardown closes the core
            // before disconnect_all takes this list, so an entry either
            // is refused here or is seen and detached there.
            let mut upstream = self.upstream();
            if self.is_closed() {
                return Attach::Rejected;
            }
            if upstream.iter().any(|u| u.publication_id == publication_id) {
                return Attach::AlreadyConnected;
            }
            upstream.push(Upstream {
                publication_id,
                publication,
            });
        }
        self.core.acquire_upstream();
        Attach::Connected
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<T: ?Sized> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("subscriber", &self.core.name)
            .field("payload_type", &self.payload_type)
            .field("slot", &self.slot)
            .field("pending", &self.queue.len())
            .finish()
    }
}
