//! # Error Handling
//!
//! Centralized error types for the routing core.
//! Uses `thiserror` for ergonomic error definitions.
//!
//! Routing failures (`RouteNotFound`, `MethodNotAllowed`, `HandlerNotFound`)
//! are distinct variants so the transport layer can map them to status codes.

use thiserror::Error;

/// Boxed error raised by user filters and handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for routing operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for the routing engine
#[derive(Error, Debug)]
pub enum Error {
    /// No registered route matches the request path for any method
    #[error("No route found for {method} {path}")]
    RouteNotFound {
        /// The request method
        method: String,
        /// The path that wasn't matched
        path: String,
    },

    /// The path matches at least one route, but not for the request's method
    #[error("Method not allowed for path {path} (allowed: {})", .allowed.join(", "))]
    MethodNotAllowed {
        /// The path that was matched
        path: String,
        /// Methods registered for this path
        allowed: Vec<String>,
    },

    /// A controller has no action with the requested name
    #[error("Controller {controller} has no action named {action}")]
    HandlerNotFound {
        /// Controller identity
        controller: String,
        /// Requested action
        action: String,
    },

    /// A route points at a controller that was never registered
    #[error("No controller registered as {controller}")]
    ControllerNotFound {
        /// Controller identity
        controller: String,
    },

    /// A filter name was referenced but never registered
    #[error("No filter registered as {name}")]
    FilterNotFound {
        /// Filter name
        name: String,
    },

    /// Invalid route pattern provided
    #[error("Invalid route pattern: {pattern}: {reason}")]
    InvalidRoutePattern {
        /// The invalid pattern
        pattern: String,
        /// Reason for invalidity
        reason: String,
    },

    /// HTTP method outside the supported set
    #[error("Unsupported HTTP method: {method}")]
    UnsupportedMethod {
        /// The raw method
        method: String,
    },

    /// Cache entry or metadata could not be used during filter resolution
    #[error("Filter resolution failed: {reason}")]
    FilterResolution {
        /// What went wrong
        reason: String,
    },

    /// Failure raised by a filter or handler
    #[error("Handler error: {0}")]
    Handler(#[source] BoxError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a business-logic failure from a filter or handler
    pub fn handler(err: impl Into<BoxError>) -> Self {
        Self::Handler(err.into())
    }

    /// Status code the transport layer should answer with
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. }
            | Self::HandlerNotFound { .. }
            | Self::ControllerNotFound { .. } => 404,
            Self::MethodNotAllowed { .. } => 405,
            Self::UnsupportedMethod { .. } => 501,
            _ => 500,
        }
    }

    /// Methods for the `Allow` header when the method was not allowed
    #[must_use]
    pub fn allowed_methods(&self) -> Option<&[String]> {
        match self {
            Self::MethodNotAllowed { allowed, .. } => Some(allowed),
            _ => None,
        }
    }
}
