//! Error types.
//!
//! The error surface is deliberately small: membership violations fail
//! fast to the caller, request building reports what could not be
//! resolved, and everything else (execution failures, duplicate events,
//! unknown job ids) is absorbed into job status rather than raised.

use thiserror::Error;

/// Errors raised by manager operations.
#[derive(Debug, Error)]
pub enum JobManagerError {
    /// A mutating operation was attempted while this instance is not a
    /// joined cluster member.
    #[error("cache job manager is not running; call join_cluster() first")]
    NotRunning,
}

/// Errors raised while expanding a job request from layer metadata.
#[derive(Debug, Error)]
pub enum RequestBuildError {
    /// No layer name was set on the builder.
    #[error("no layer set; call layer() before build()")]
    MissingLayer,

    /// The named layer does not exist in the catalog.
    #[error("layer '{0}' couldn't be resolved")]
    UnknownLayer(String),

    /// Formats were requested that the layer is not cached in.
    #[error("the following formats are not supported by layer {layer}: {}", formats.join(", "))]
    UnsupportedFormats { layer: String, formats: Vec<String> },

    /// A gridset was requested that the layer is not configured for.
    #[error("layer {layer} is not configured for gridset {gridset}")]
    UnknownGridset { layer: String, gridset: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_running_message_names_the_remedy() {
        let msg = JobManagerError::NotRunning.to_string();
        assert!(msg.contains("join_cluster"));
    }

    #[test]
    fn test_unsupported_formats_lists_offenders() {
        let err = RequestBuildError::UnsupportedFormats {
            layer: "test:layer1".to_string(),
            formats: vec!["image/webp".to_string(), "image/gif".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("test:layer1"));
        assert!(msg.contains("image/webp, image/gif"));
    }
}
