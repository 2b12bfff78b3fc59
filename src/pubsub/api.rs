//! Public API for the publish/subscribe system
//!
//! External modules should import from here rather than directly from
//! internal modules.

// Errors
pub use crate::pubsub::error::{BoxError, PipelineError, PipelineResult};

// Payload identity and declared relations
pub use crate::pubsub::payload::{PayloadType, Relation, RelationKind, TypeRelations};

// Endpoints
pub use crate::pubsub::publication::{Attach, Deliver, Publication, PublicationBase};
pub use crate::pubsub::subscription::{Subscription, SubscriptionBase, DEFAULT_MASTER_GOVERNOR};

// Wiring
pub use crate::pubsub::resolver::{resolve, Claim, ConnectOptions, MatchKind};

// Publishers and subscribers
pub use crate::pubsub::publisher::{Publisher, PublisherBuilder};
pub use crate::pubsub::settings::PipelineSettings;
pub use crate::pubsub::subscriber::{
    Subscriber, SubscriberBuilder, SubscriberHandle, SubscriptionSet, Worker,
};

// Teardown stages appear in lifecycle errors
pub use crate::core::cleanup::CleanupStage;
