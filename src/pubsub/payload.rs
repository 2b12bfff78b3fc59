//! Payload identity and declared type relations
//!
//! Every payload type is identified by its [`TypeId`]. Relations between
//! payload types are never inferred: a "derived" (is-a) or "convertible"
//! relation only exists once it has been declared in a [`TypeRelations`]
//! table, together with the function that turns one shared item into the
//! other.

use crate::pubsub::publication::Deliver;
use crate::pubsub::subscription::Subscription;
use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use strum_macros::Display;

/// Identity of a payload type
///
/// Equality and hashing use the type id only; the name is for diagnostics.
#[derive(Clone, Copy)]
pub struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for PayloadType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PayloadType {}

impl Hash for PayloadType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PayloadType({})", self.name)
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum RelationKind {
    /// The source type is-a target type (an upcast)
    Derived,
    /// The source type converts into the target type
    Convertible,
}

type Binder =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<Box<dyn Any + Send>> + Send + Sync>;

/// A declared relation from one payload type to another
///
/// Holds a binder that, given a type-erased `Subscription<S>`, produces a
/// delivery function accepting `Arc<P>` items.
#[derive(Clone)]
pub struct Relation {
    from: PayloadType,
    to: PayloadType,
    kind: RelationKind,
    binder: Binder,
}

impl Relation {
    fn new<P, S>(kind: RelationKind, adapt: impl Fn(Arc<P>) -> Arc<S> + Send + Sync + 'static) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        let adapt = Arc::new(adapt);
        let binder: Binder = Arc::new(move |subscription| {
            let subscription = subscription.downcast::<Subscription<S>>().ok()?;
            let adapt = Arc::clone(&adapt);
            let deliver: Deliver<P> = Arc::new(move |item: Arc<P>| subscription.inbox(adapt(item)));
            Some(Box::new(deliver) as Box<dyn Any + Send>)
        });

        Self {
            from: PayloadType::of::<P>(),
            to: PayloadType::of::<S>(),
            kind,
            binder,
        }
    }

    pub fn from(&self) -> PayloadType {
        self.from
    }

    pub fn to(&self) -> PayloadType {
        self.to
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    /// Build the delivery function for `P` items into an erased subscription
    pub(crate) fn bind<P: ?Sized + 'static>(
        &self,
        subscription: Arc<dyn Any + Send + Sync>,
    ) -> Option<Deliver<P>> {
        let bound = (self.binder)(subscription)?;
        bound.downcast::<Deliver<P>>().ok().map(|deliver| *deliver)
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Table of declared relations between payload types
///
/// # Example
///
/// ```rust
/// use fanout::pubsub::api::{PayloadType, TypeRelations};
/// use std::sync::Arc;
///
/// trait Shape: Send + Sync {}
/// struct Circle;
/// impl Shape for Circle {}
///
/// #[derive(Clone)]
/// struct Celsius(f64);
/// struct Kelvin(f64);
/// impl From<Celsius> for Kelvin {
///     fn from(c: Celsius) -> Self {
///         Kelvin(c.0 + 273.15)
///     }
/// }
///
/// let relations = TypeRelations::new()
///     .derives::<Circle, dyn Shape>(|circle| circle)
///     .converts_from::<Celsius, Kelvin>();
///
/// let circle = PayloadType::of::<Circle>();
/// let shape = PayloadType::of::<dyn Shape>();
/// assert!(relations.derived(circle, shape).is_some());
/// // An upcast also counts as a conversion
/// assert!(relations.convertible(circle, shape).is_some());
/// assert!(relations
///     .convertible(PayloadType::of::<Celsius>(), PayloadType::of::<Kelvin>())
///     .is_some());
/// ```
#[derive(Clone, Default, Debug)]
pub struct TypeRelations {
    relations: Vec<Relation>,
}

impl TypeRelations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare that `P` is-a `S`
    ///
    /// `upcast` must keep sharing the same item, typically an unsized
    /// coercion such as `|circle| circle` into `Arc<dyn Shape>`.
    pub fn derives<P, S>(mut self, upcast: impl Fn(Arc<P>) -> Arc<S> + Send + Sync + 'static) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        self.relations
            .push(Relation::new(RelationKind::Derived, upcast));
        self
    }

    /// Declare that `P` converts into `S`
    pub fn converts<P, S>(mut self, convert: impl Fn(Arc<P>) -> Arc<S> + Send + Sync + 'static) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
        S: ?Sized + Send + Sync + 'static,
    {
        self.relations
            .push(Relation::new(RelationKind::Convertible, convert));
        self
    }

    /// Declare a conversion backed by `S: From<P>`
    pub fn converts_from<P, S>(self) -> Self
    where
        P: Clone + Send + Sync + 'static,
        S: From<P> + Send + Sync + 'static,
    {
        self.converts::<P, S>(|item| Arc::new(S::from(P::clone(&item))))
    }

    /// The declared upcast from `from` to `to`, if any
    pub fn derived(&self, from: PayloadType, to: PayloadType) -> Option<&Relation> {
        self.find(from, to, RelationKind::Derived)
    }

    /// The declared conversion from `from` to `to`, if any
    ///
    /// An upcast is an implicit conversion too, so a `derives` declaration
    /// satisfies this lookup when no explicit conversion exists.
    pub fn convertible(&self, from: PayloadType, to: PayloadType) -> Option<&Relation> {
        self.find(from, to, RelationKind::Convertible)
            .or_else(|| self.derived(from, to))
    }

    fn find(&self, from: PayloadType, to: PayloadType, kind: RelationKind) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|relation| relation.kind == kind && relation.from == from && relation.to == to)
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}
