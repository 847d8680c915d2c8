//! Error taxonomy
//!
//! Only configuration errors ever reach the host. Everything else is
//! caught at the owning component's boundary, logged, and recorded as an
//! `EngineAlert` so the page keeps rendering.

use pageflow_dom::{GeometryError, NodeId};
use pageflow_net::{CacheError, NetError};
use serde::Serialize;

/// Alert category, one per failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Discovery,
    Classification,
    Load,
    CapabilityUnsupported,
    CacheUnavailable,
}

/// Unreachable or malformed resource reference
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("empty resource reference")]
    Empty,

    #[error("malformed reference {reference:?}: {reason}")]
    Malformed { reference: String, reason: String },

    #[error("unfetchable {scheme}: reference {reference:?}")]
    Unfetchable { reference: String, scheme: String },

    #[error("invalid document URL {0:?}")]
    InvalidBase(String),
}

/// Geometry unavailable while classifying
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("element {0:?} is detached")]
    Detached(NodeId),

    #[error("element {0:?} does not exist")]
    UnknownNode(NodeId),
}

impl From<GeometryError> for ClassificationError {
    fn from(err: GeometryError) -> Self {
        match err {
            GeometryError::Detached(node) => Self::Detached(node),
            GeometryError::UnknownNode(node) => Self::UnknownNode(node),
        }
    }
}

/// A load that did not complete
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("load of {url} could not start: {source}")]
    NotStarted { url: String, source: NetError },

    #[error("load of {url} failed: {reason}")]
    Network { url: String, reason: String },
}

/// Configuration rejected at construction
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} = {value} is out of range (expected {expected})")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors returned to the host
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Recorded failure
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineAlert {
    pub kind: ErrorKind,
    pub message: String,
    pub at_ms: f64,
}

impl EngineAlert {
    pub fn new(kind: ErrorKind, message: impl Into<String>, at_ms: f64) -> Self {
        Self {
            kind,
            message: message.into(),
            at_ms,
        }
    }
}

impl From<&DiscoveryError> for ErrorKind {
    fn from(_: &DiscoveryError) -> Self {
        ErrorKind::Discovery
    }
}

impl From<&CacheError> for ErrorKind {
    fn from(_: &CacheError) -> Self {
        ErrorKind::CacheUnavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_error_conversion() {
        let node = NodeId::from_raw(7);
        let err: ClassificationError = GeometryError::Detached(node).into();
        assert_eq!(err, ClassificationError::Detached(node));
    }

    #[test]
    fn test_error_messages() {
        let err = DiscoveryError::Unfetchable {
            reference: "javascript:void(0)".into(),
            scheme: "javascript".into(),
        };
        assert_eq!(err.to_string(), r#"unfetchable javascript: reference "javascript:void(0)""#);

        let err = ConfigError::OutOfRange {
            field: "lazy_min_ratio",
            value: "1.5".into(),
            expected: "0 < ratio <= 1",
        };
        assert!(err.to_string().contains("lazy_min_ratio = 1.5"));
    }
}
