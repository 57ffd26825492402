//! # Waypost Core
//!
//! HTTP routing and dispatch engine.
//! Maps a request (method + path) to a registered handler and runs the
//! filter pipeline around it.
//!
//! ## Architecture
//!
//! A [`Router`] owns everything a dispatch needs: the route table, named
//! filters and path-glob bindings, controllers, and the cache-backed
//! [`FilterResolver`] that derives controller filters from declarative
//! metadata. It is built once at startup and then only read, so a single
//! router can serve concurrent requests.
//!
//! ## Modules
//!
//! - `router` - Registration, matching and the dispatch pipeline
//! - `route` - Routes, handlers and request-scoped matches
//! - `pattern` - Route pattern compiler (placeholders and legacy wildcards)
//! - `filter` - Filter trait, filter references and the filter registry
//! - `controller` - Controller action tables and code-registered filters
//! - `metadata` - Declarative filter descriptors and the metadata reader
//! - `resolver` - Cached resolution of controller filters
//! - `cache` - Filter cache stores (filesystem, in-memory)
//! - `json` - JSON helpers for cache entries
//! - `request` / `response` - Request and response value objects
//! - `config` - Router configuration
//! - `telemetry` - Tracing subscriber setup
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod config;
pub mod controller;
pub mod error;
pub mod filter;
pub mod json;
pub mod metadata;
pub mod pattern;
pub mod request;
pub mod resolver;
pub mod response;
pub mod route;
pub mod router;
pub mod telemetry;

pub use cache::{CacheStore, FileCacheStore, MemoryCacheStore};
pub use config::RouterConfig;
pub use controller::{Controller, ControllerRegistry};
pub use error::{Error, Result};
pub use filter::{Filter, FilterRegistry, FilterResult, FilterSpec, FnFilter};
pub use json::{parse_json, to_json};
pub use metadata::{FilterDeclaration, FilterKind, FilterOptions, MetadataReader, StaticMetadata};
pub use pattern::{compile, CompiledPattern, Params, Requirements};
pub use request::{Method, Request};
pub use resolver::FilterResolver;
pub use response::{Reply, Response};
pub use route::{Handler, Route, RouteMatch};
pub use router::Router;
pub use telemetry::init_tracing;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
