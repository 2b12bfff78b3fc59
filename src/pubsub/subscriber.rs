//! Subscribers: worker state, typed handlers and the processing loop
//!
//! A subscriber owns one subscription per handled payload type plus a
//! master queue of slot tokens. Every delivered item produces one token, so
//! popping the master queue yields items in overall arrival order while
//! each type keeps its own buffer.
//!
//! `run` is meant to be the body of a dedicated thread. It processes items
//! until the subscriber is told to stop, runs out of live publications, or
//! loses every downstream subscriber, and then tears down in a fixed order
//! (see [`CleanupStage`]). Each of those conditions interrupts the master
//! queue, so a worker waiting on a quiet upstream still wakes up for them.

use crate::core::cleanup::{Cleanup, CleanupStage, CleanupTracker};
use crate::pubsub::error::{BoxError, PipelineError, PipelineResult};
use crate::pubsub::payload::PayloadType;
use crate::pubsub::publisher::Publisher;
use crate::pubsub::settings::PipelineSettings;
use crate::pubsub::subscription::{
    SubscriberCore, Subscription, SubscriptionBase, DEFAULT_MASTER_GOVERNOR,
};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Lifecycle hooks of a subscriber's worker state
///
/// All hooks default to doing nothing. A worker that republishes usually
/// keeps a clone of its downstream [`Publisher`] so handlers and hooks can
/// publish through it.
pub trait Worker: Send + 'static {
    /// Called on the worker thread before any item is processed
    ///
    /// Returning `false` stops the subscriber without processing anything.
    fn initialize(&mut self) -> bool {
        true
    }

    /// Last chance to publish downstream
    fn before_end_publication(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Only called when the subscriber has a downstream publisher
    fn after_end_publication(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    fn before_end_thread(&mut self) -> Result<(), BoxError> {
        Ok(())
    }
}

impl Worker for () {}

/// Anything that exposes a subscriber's subscriptions for wiring
pub trait SubscriptionSet {
    fn subscriber_name(&self) -> &str;

    /// Subscriptions in slot order
    fn subscriptions(&self) -> &[Arc<dyn SubscriptionBase>];
}

trait Dispatch<W>: Send {
    /// Pop one item from the private queue and hand it to the handler
    ///
    /// `Ok(false)` means the queue was unexpectedly empty.
    fn process_queue_item(&mut self, worker: &mut W) -> PipelineResult<bool>;
}

type HandlerFn<T, W> = Box<dyn FnMut(&mut W, Arc<T>) -> Result<(), BoxError> + Send>;

struct Handler<T: ?Sized, W> {
    subscription: Arc<Subscription<T>>,
    handler: HandlerFn<T, W>,
}

impl<T: ?Sized + Send + Sync + 'static, W> Dispatch<W> for Handler<T, W> {
    fn process_queue_item(&mut self, worker: &mut W) -> PipelineResult<bool> {
        let Some(item) = self.subscription.take() else {
            log::warn!(
                "subscriber '{}' was signalled for {} but its queue is empty",
                self.subscription.subscriber_name(),
                self.subscription.payload_type()
            );
            return Ok(false);
        };

        (self.handler)(worker, item).map_err(|source| PipelineError::Processing {
            subscriber: self.subscription.subscriber_name().to_string(),
            type_name: self.subscription.payload_type().name(),
            source,
        })?;
        Ok(true)
    }
}

/// Shared core plus the subscription list
///
/// Dropping it before the subscriber finished means the worker thread never
/// ran its teardown, so the subscriber is cut off from its publications
/// here instead.
struct Wiring {
    core: Arc<SubscriberCore>,
    subscriptions: Arc<[Arc<dyn SubscriptionBase>]>,
}

impl Drop for Wiring {
    fn drop(&mut self) {
        if self.core.is_finished() {
            return;
        }
        log::debug!(
            "subscriber '{}' dropped without running; disconnecting",
            self.core.name()
        );
        self.core.request_stop();
        self.core.close();
        for subscription in self.subscriptions.iter() {
            subscription.disconnect_all();
        }
        self.core.master().abort();
        for subscription in self.subscriptions.iter() {
            subscription.abort();
        }
    }
}

pub struct Subscriber<W: Worker> {
    wiring: Wiring,
    handlers: Vec<Box<dyn Dispatch<W>>>,
    worker: W,
    downstream: Option<Publisher>,
}

impl<W: Worker> Subscriber<W> {
    pub fn builder(name: impl Into<String>, worker: W) -> SubscriberBuilder<W> {
        SubscriberBuilder {
            name: name.into(),
            worker,
            governor: DEFAULT_MASTER_GOVERNOR,
            subscription_governor: 0,
            payload_types: Vec::new(),
            registrations: Vec::new(),
            downstream: None,
        }
    }

    pub fn name(&self) -> &str {
        self.wiring.core.name()
    }

    pub fn worker(&self) -> &W {
        &self.worker
    }

    pub fn downstream(&self) -> Option<&Publisher> {
        self.downstream.as_ref()
    }

    /// The typed subscription for `T`, if this subscriber handles it
    pub fn subscription<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<Subscription<T>>> {
        let payload_type = PayloadType::of::<T>();
        self.wiring
            .subscriptions
            .iter()
            .find(|s| s.payload_type() == payload_type)
            .and_then(|s| Arc::clone(s).into_any().downcast::<Subscription<T>>().ok())
    }

    /// Cloneable control handle usable from other threads
    pub fn handle(&self) -> SubscriberHandle {
        SubscriberHandle {
            core: Arc::clone(&self.wiring.core),
            subscriptions: Arc::clone(&self.wiring.subscriptions),
        }
    }

    /// Number of live publications over all subscriptions
    pub fn publication_count(&self) -> usize {
        self.wiring.core.live_upstream()
    }

    pub fn governor(&self) -> usize {
        self.wiring.core.master().governor()
    }

    pub fn set_governor(&self, governor: usize) {
        self.wiring.core.master().set_governor(governor);
    }

    /// Whether the processing loop should end
    ///
    /// True after an explicit stop, once every publication has ended and
    /// all delivered items were processed, or when the downstream publisher
    /// has nobody left to publish to.
    pub fn stop_processing(&self) -> bool {
        let core = &self.wiring.core;
        if core.stop_requested() {
            return true;
        }
        // Upstream first: with no live publication nothing new can arrive,
        // so an empty queue observed afterwards stays empty.
        if core.live_upstream() == 0 && core.master().is_empty() {
            return true;
        }
        if self.downstream.is_some() && core.downstream_lost() {
            log::debug!(
                "subscriber '{}' lost all downstream subscribers",
                core.name()
            );
            return true;
        }
        false
    }

    /// Wait for the next item and process it
    ///
    /// Returns `Ok(false)` when woken without an item, which happens when
    /// the subscriber is stopped or its last publication ended.
    pub fn next(&mut self) -> PipelineResult<bool> {
        let Some(slot) = self.wiring.core.master().pop() else {
            return Ok(false);
        };
        match self.handlers.get_mut(slot) {
            Some(handler) => handler.process_queue_item(&mut self.worker),
            None => {
                log::warn!(
                    "subscriber '{}' received unknown slot {}",
                    self.wiring.core.name(),
                    slot
                );
                Ok(false)
            }
        }
    }

    fn process(&mut self) -> PipelineResult<()> {
        if !self.worker.initialize() {
            self.wiring.core.request_stop();
            return Err(PipelineError::InitializationRefused {
                subscriber: self.name().to_string(),
            });
        }

        while !self.stop_processing() {
            self.next()?;
        }
        Ok(())
    }

    /// Thread body: initialise, process until done, then tear down
    ///
    /// Teardown always runs to completion. A processing failure takes
    /// precedence over teardown failures, which are then only logged; a
    /// panic in a handler or hook is resumed once teardown finished.
    pub fn run(mut self) -> PipelineResult<W> {
        let name = self.name().to_string();
        log::debug!("subscriber '{}' starting", name);

        let processing = panic::catch_unwind(AssertUnwindSafe(|| self.process()));
        self.wiring.core.close();

        let mut tracker = CleanupTracker::new();
        let mut teardown = Teardown {
            subscriber: &name,
            worker: &mut self.worker,
            wiring: &self.wiring,
            downstream: self.downstream.as_ref(),
        };
        let cleanup = panic::catch_unwind(AssertUnwindSafe(|| tracker.resume(&mut teardown)));
        self.wiring.core.mark_finished();
        log::debug!("subscriber '{}' finished", name);

        let processing = match processing {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };
        let cleanup = match cleanup {
            Ok(result) => result,
            Err(payload) => panic::resume_unwind(payload),
        };

        match (processing, cleanup) {
            (Err(error), Err(cleanup_error)) => {
                log::warn!(
                    "subscriber '{}' teardown also failed: {}",
                    name,
                    cleanup_error
                );
                Err(error)
            }
            (Err(error), Ok(())) | (Ok(()), Err(error)) => Err(error),
            (Ok(()), Ok(())) => Ok(self.worker),
        }
    }
}

impl<W: Worker> SubscriptionSet for Subscriber<W> {
    fn subscriber_name(&self) -> &str {
        self.wiring.core.name()
    }

    fn subscriptions(&self) -> &[Arc<dyn SubscriptionBase>] {
        &self.wiring.subscriptions
    }
}

impl<W: Worker> fmt::Debug for Subscriber<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("core", &self.wiring.core)
            .field("subscriptions", &self.wiring.subscriptions.len())
            .field("downstream", &self.downstream)
            .finish()
    }
}

struct Teardown<'a, W> {
    subscriber: &'a str,
    worker: &'a mut W,
    wiring: &'a Wiring,
    downstream: Option<&'a Publisher>,
}

impl<W: Worker> Teardown<'_, W> {
    fn hook(
        &mut self,
        stage: CleanupStage,
        hook: fn(&mut W) -> Result<(), BoxError>,
    ) -> Result<(), PipelineError> {
        hook(self.worker).map_err(|source| PipelineError::Lifecycle {
            subscriber: self.subscriber.to_string(),
            stage,
            source,
        })
    }
}

impl<W: Worker> Cleanup for Teardown<'_, W> {
    type Error = PipelineError;

    fn run_stage(&mut self, stage: CleanupStage) -> Result<(), PipelineError> {
        log::trace!("subscriber '{}' cleanup: {}", self.subscriber, stage);
        match stage {
            CleanupStage::Initial => Ok(()),
            CleanupStage::BeforeEndPublication => self.hook(stage, W::before_end_publication),
            CleanupStage::EndPublication => {
                if let Some(downstream) = self.downstream {
                    downstream.end_publication();
                }
                Ok(())
            }
            CleanupStage::AfterEndPublication => match self.downstream {
                Some(_) => self.hook(stage, W::after_end_publication),
                None => Ok(()),
            },
            CleanupStage::Disconnect => {
                for subscription in self.wiring.subscriptions.iter() {
                    subscription.disconnect_all();
                }
                Ok(())
            }
            CleanupStage::AbortQueue => {
                self.wiring.core.master().abort();
                for subscription in self.wiring.subscriptions.iter() {
                    subscription.abort();
                }
                Ok(())
            }
            CleanupStage::BeforeEndThread => self.hook(stage, W::before_end_thread),
        }
    }
}

/// Cloneable view of a subscriber for other threads
///
/// Can connect publishers to a subscriber that has already been moved into
/// its worker thread, and stop it from outside.
#[derive(Clone)]
pub struct SubscriberHandle {
    core: Arc<SubscriberCore>,
    subscriptions: Arc<[Arc<dyn SubscriptionBase>]>,
}

impl SubscriberHandle {
    pub fn name(&self) -> &str {
        self.core.name()
    }

    /// Ask the worker to stop after the item it is processing
    pub fn stop(&self) {
        log::debug!("stop requested for subscriber '{}'", self.core.name());
        self.core.request_stop();
    }

    pub fn is_finished(&self) -> bool {
        self.core.is_finished()
    }

    pub fn publication_count(&self) -> usize {
        self.core.live_upstream()
    }

    /// Items waiting in the master queue
    pub fn pending(&self) -> usize {
        self.core.master().len()
    }

    pub fn governor(&self) -> usize {
        self.core.master().governor()
    }

    pub fn set_governor(&self, governor: usize) {
        self.core.master().set_governor(governor);
    }

    /// Resize the private queue of the `T` subscription
    ///
    /// Returns `false` when the subscriber does not handle `T`.
    pub fn set_subscription_governor<T: ?Sized + 'static>(&self, governor: usize) -> bool {
        let payload_type = PayloadType::of::<T>();
        match self
            .subscriptions
            .iter()
            .find(|s| s.payload_type() == payload_type)
        {
            Some(subscription) => {
                subscription.set_governor(governor);
                true
            }
            None => false,
        }
    }
}

impl SubscriptionSet for SubscriberHandle {
    fn subscriber_name(&self) -> &str {
        self.core.name()
    }

    fn subscriptions(&self) -> &[Arc<dyn SubscriptionBase>] {
        &self.subscriptions
    }
}

impl fmt::Debug for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("core", &self.core)
            .finish()
    }
}

type Registration<W> = Box<
    dyn FnOnce(usize, &Arc<SubscriberCore>, usize) -> (Arc<dyn SubscriptionBase>, Box<dyn Dispatch<W>>),
>;

pub struct SubscriberBuilder<W: Worker> {
    name: String,
    worker: W,
    governor: usize,
    subscription_governor: usize,
    payload_types: Vec<PayloadType>,
    registrations: Vec<Registration<W>>,
    downstream: Option<Publisher>,
}

impl<W: Worker> SubscriberBuilder<W> {
    /// Handle items of type `T`; a type can only be subscribed once
    pub fn subscribe<T, F>(mut self, handler: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: FnMut(&mut W, Arc<T>) -> Result<(), BoxError> + Send + 'static,
    {
        let payload_type = PayloadType::of::<T>();
        if self.payload_types.contains(&payload_type) {
            log::warn!(
                "subscriber '{}' already handles {}; ignoring duplicate",
                self.name,
                payload_type
            );
            return self;
        }
        self.payload_types.push(payload_type);

        self.registrations
            .push(Box::new(move |slot, core: &Arc<SubscriberCore>, governor| {
                let subscription = Arc::new(Subscription::<T>::new(slot, Arc::clone(core), governor));
                let handler: Box<dyn Dispatch<W>> = Box::new(Handler {
                    subscription: Arc::clone(&subscription),
                    handler: Box::new(handler),
                });
                (subscription as Arc<dyn SubscriptionBase>, handler)
            }));
        self
    }

    /// Publisher this subscriber feeds; ended during teardown
    pub fn downstream(mut self, publisher: Publisher) -> Self {
        self.downstream = Some(publisher);
        self
    }

    /// Master queue depth, 0 for unbounded
    pub fn governor(mut self, governor: usize) -> Self {
        self.governor = governor;
        self
    }

    /// Depth of each per-type queue, 0 for unbounded
    pub fn subscription_governor(mut self, governor: usize) -> Self {
        self.subscription_governor = governor;
        self
    }

    pub fn settings(self, settings: &PipelineSettings) -> Self {
        self.governor(settings.master_queue_capacity)
            .subscription_governor(settings.subscription_capacity)
    }

    pub fn build(self) -> Subscriber<W> {
        let core = Arc::new(SubscriberCore::new(self.name, self.governor));
        let mut subscriptions = Vec::with_capacity(self.registrations.len());
        let mut handlers = Vec::with_capacity(self.registrations.len());

        for (slot, register) in self.registrations.into_iter().enumerate() {
            let (subscription, handler) = register(slot, &core, self.subscription_governor);
            subscriptions.push(subscription);
            handlers.push(handler);
        }

        if let Some(downstream) = &self.downstream {
            downstream.watch(&core);
        }

        Subscriber {
            wiring: Wiring {
                core,
                subscriptions: subscriptions.into(),
            },
            handlers,
            worker: self.worker,
            downstream: self.downstream,
        }
    }
}
