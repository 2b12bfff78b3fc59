//! Connection resolution between a publisher and a subscriber
//!
//! Pairs each publication with at most one subscription, preferring exact
//! payload matches over declared upcasts and upcasts over conversions.

use crate::pubsub::error::PipelineResult;
use crate::pubsub::payload::{PayloadType, Relation, TypeRelations};
use strum_macros::Display;

/// How a publication was matched to a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Derived,
    Convertible,
}

/// Which relations `Publisher::connect` may use
///
/// The default only allows exact matches.
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    pub allow_derived: bool,
    pub allow_convertible: bool,
    pub relations: TypeRelations,
}

impl ConnectOptions {
    pub fn exact() -> Self {
        Self::default()
    }

    /// Allow derived and convertible matches declared in `relations`
    pub fn with_relations(relations: TypeRelations) -> Self {
        Self {
            allow_derived: true,
            allow_convertible: true,
            relations,
        }
    }

    pub fn with_derived(mut self, allow: bool) -> Self {
        self.allow_derived = allow;
        self
    }

    pub fn with_convertible(mut self, allow: bool) -> Self {
        self.allow_convertible = allow;
        self
    }
}

/// A publication index claimed by a subscription index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub publication: usize,
    pub subscription: usize,
    pub kind: MatchKind,
}

/// Match publication types against subscription types
///
/// Runs an exact pass, then a derived pass and a convertible pass when the
/// options allow them. Within a pass publications and subscriptions are
/// visited in declaration order. `attach` performs the wiring for a
/// candidate pair and reports whether it took; a publication is claimed by
/// the first candidate that takes and is not considered again. Several
/// publications may land on the same subscription.
pub fn resolve<F>(
    publications: &[PayloadType],
    subscriptions: &[PayloadType],
    options: &ConnectOptions,
    mut attach: F,
) -> PipelineResult<Vec<Claim>>
where
    F: FnMut(usize, usize, Option<&Relation>) -> PipelineResult<bool>,
{
    let mut passes = vec![MatchKind::Exact];
    if options.allow_derived {
        passes.push(MatchKind::Derived);
    }
    if options.allow_convertible {
        passes.push(MatchKind::Convertible);
    }

    let mut claimed = vec![false; publications.len()];
    let mut claims = Vec::new();

    for kind in passes {
        for (p, &publication) in publications.iter().enumerate() {
            if claimed[p] {
                continue;
            }
            for (s, &subscription) in subscriptions.iter().enumerate() {
                let relation = match kind {
                    MatchKind::Exact if publication == subscription => None,
                    MatchKind::Exact => continue,
                    MatchKind::Derived => match options.relations.derived(publication, subscription) {
                        Some(relation) => Some(relation),
                        None => continue,
                    },
                    MatchKind::Convertible => {
                        match options.relations.convertible(publication, subscription) {
                            Some(relation) => Some(relation),
                            None => continue,
                        }
                    }
                };

                if attach(p, s, relation)? {
                    log::trace!("{} -> {} ({})", publication, subscription, kind);
                    claimed[p] = true;
                    claims.push(Claim {
                        publication: p,
                        subscription: s,
                        kind,
                    });
                    break;
                }
            }
        }
    }

    Ok(claims)
}
