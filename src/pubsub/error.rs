//! Pipeline Error Types

use crate::core::cleanup::CleanupStage;
use crate::core::error_handling::{ContextualError, Severity};

/// Boxed error returned by user handlers, hooks and producers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Wiring mistake: nothing the publisher emits can reach the subscriber
    #[error("no common type between publisher '{publisher}' and subscriber '{subscriber}'")]
    NoCommonType {
        publisher: String,
        subscriber: String,
    },

    #[error("publisher '{publisher}' does not publish {type_name}")]
    UndeclaredType {
        publisher: String,
        type_name: &'static str,
    },

    #[error("publication of {type_name} by '{publisher}' has already ended")]
    PublicationEnded {
        publisher: String,
        type_name: &'static str,
    },

    #[error("publisher '{publisher}' has already ended publication")]
    PublisherEnded { publisher: String },

    /// The subscriber has begun or completed teardown
    #[error("cannot connect publisher '{publisher}': subscriber '{subscriber}' has finished")]
    SubscriberFinished {
        publisher: String,
        subscriber: String,
    },

    #[error("subscriber '{subscriber}' failed processing {type_name}: {source}")]
    Processing {
        subscriber: String,
        type_name: &'static str,
        source: BoxError,
    },

    #[error("subscriber '{subscriber}' failed during {stage}: {source}")]
    Lifecycle {
        subscriber: String,
        stage: CleanupStage,
        source: BoxError,
    },

    #[error("subscriber '{subscriber}' refused to initialise")]
    InitializationRefused { subscriber: String },

    #[error("producer of publisher '{publisher}' failed: {source}")]
    Producer { publisher: String, source: BoxError },

    #[error("{message}")]
    Synchronisation { message: String },
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    pub(crate) fn synchronisation(message: String) -> Self {
        PipelineError::Synchronisation { message }
    }
}

impl ContextualError for PipelineError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            PipelineError::NoCommonType { .. }
                | PipelineError::UndeclaredType { .. }
                | PipelineError::PublicationEnded { .. }
                | PipelineError::PublisherEnded { .. }
                | PipelineError::SubscriberFinished { .. }
        )
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| self.to_string())
    }

    fn message_id(&self) -> &'static str {
        match self {
            PipelineError::NoCommonType { .. } => "E0101",
            PipelineError::UndeclaredType { .. } => "E0102",
            PipelineError::PublicationEnded { .. } => "W0103",
            PipelineError::PublisherEnded { .. } => "W0104",
            PipelineError::SubscriberFinished { .. } => "W0105",
            PipelineError::Processing { .. } => "F0201",
            PipelineError::Lifecycle { .. } => "E0202",
            PipelineError::InitializationRefused { .. } => "E0203",
            PipelineError::Producer { .. } => "F0204",
            PipelineError::Synchronisation { .. } => "E0301",
        }
    }

    fn severity(&self) -> Severity {
        match self {
            PipelineError::PublicationEnded { .. }
            | PipelineError::PublisherEnded { .. }
            | PipelineError::SubscriberFinished { .. } => Severity::Warning,
            PipelineError::Processing { .. } | PipelineError::Producer { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_no_common_type_names_both_endpoints() {
        let error = PipelineError::NoCommonType {
            publisher: "sensors".to_string(),
            subscriber: "report".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(
            error.user_message().as_deref(),
            Some("no common type between publisher 'sensors' and subscriber 'report'")
        );
        assert_eq!(error.message_id(), "E0101");
        assert_eq!(error.severity(), Severity::Error);
    }

    #[test]
    fn test_processing_error_keeps_source() {
        let error = PipelineError::Processing {
            subscriber: "report".to_string(),
            type_name: "Reading",
            source: "bad reading".into(),
        };

        assert!(!error.is_user_actionable());
        assert_eq!(error.user_message(), None);
        assert_eq!(error.severity(), Severity::Fatal);
        assert_eq!(error.source().map(|s| s.to_string()).as_deref(), Some("bad reading"));
    }

    #[test]
    fn test_subscriber_finished_is_an_actionable_warning() {
        let error = PipelineError::SubscriberFinished {
            publisher: "sensors".to_string(),
            subscriber: "report".to_string(),
        };

        assert!(error.is_user_actionable());
        assert_eq!(error.message_id(), "W0105");
        assert_eq!(error.severity(), Severity::Warning);
        assert_eq!(
            error.to_string(),
            "cannot connect publisher 'sensors': subscriber 'report' has finished"
        );
    }

    #[test]
    fn test_lifecycle_error_mentions_stage() {
        let error = PipelineError::Lifecycle {
            subscriber: "relay".to_string(),
            stage: CleanupStage::BeforeEndThread,
            source: "flush failed".into(),
        };

        assert_eq!(
            error.to_string(),
            "subscriber 'relay' failed during before_end_thread: flush failed"
        );
    }
}
