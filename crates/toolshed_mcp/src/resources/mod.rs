//! Resource Providers
//!
//! A provider advertises a URI scheme and answers list/read for it. The
//! dispatcher concatenates `list_resources` across providers and routes
//! `resources/read` to the first provider whose `can_handle` accepts the
//! URI.

mod filesystem;

pub use filesystem::FileResourceProvider;

use crate::protocol::{ResourceContents, ResourceDescriptor};

/// Resource provider failures, mapped to protocol errors by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// The URI resolved but nothing is there (-32602).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The URI points outside the provider's allowlist (-32602).
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The URI is malformed for this provider (-32602).
    #[error("Invalid resource URI: {0}")]
    InvalidUri(String),

    /// Unexpected provider failure (-32603).
    #[error("Failed to read resource: {0}")]
    Internal(String),
}

/// Trait for resource providers.
pub trait ResourceProvider: Send + Sync {
    /// Whether this provider serves the given URI.
    fn can_handle(&self, uri: &str) -> bool;

    /// Enumerate every resource this provider serves.
    fn list_resources(&self) -> Vec<ResourceDescriptor>;

    /// Read one resource by URI.
    fn read_resource(&self, uri: &str) -> Result<ResourceContents, ResourceError>;
}
