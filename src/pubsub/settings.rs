//! Queue sizing applied to subscribers

use serde::{Deserialize, Serialize};

/// Queue capacities read from the `[pipeline]` table of the config file
///
/// ```toml
/// [pipeline]
/// master_queue_capacity = 100
/// subscription_capacity = 0
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Depth of each subscriber's master queue; 0 is unbounded
    pub master_queue_capacity: usize,
    /// Depth of each per-type subscription queue; 0 is unbounded
    pub subscription_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            master_queue_capacity: crate::pubsub::subscription::DEFAULT_MASTER_GOVERNOR,
            subscription_capacity: 0,
        }
    }
}

impl PipelineSettings {
    pub const TABLE: &'static str = "pipeline";

    /// Settings from the `[pipeline]` table, defaults when the table is absent
    pub fn from_table(config: &toml::Table) -> Result<Self, toml::de::Error> {
        match config.get(Self::TABLE) {
            Some(value) => value.clone().try_into(),
            None => Ok(Self::default()),
        }
    }
}
