//! # Controllers
//!
//! Controller-style handlers: a named table of actions plus filters
//! registered in code, and optionally the source file the controller was
//! declared in (used to invalidate cached filter lists).
//!
//! Actions are looked up by name in an explicit table. An unknown action is
//! a `HandlerNotFound` error, never a runtime method lookup.

use crate::error::{Error, Result};
use crate::metadata::{FilterDeclaration, FilterOptions};
use crate::pattern::Params;
use crate::request::Request;
use crate::response::Reply;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Controller action: receives the request and the bound route parameters
pub type ActionFn = Arc<dyn Fn(&Request, &Params) -> Result<Reply> + Send + Sync>;

/// A controller: identity, actions and code-registered filters
pub struct Controller {
    identity: String,
    source: Option<PathBuf>,
    actions: HashMap<String, ActionFn>,
    filters: Vec<FilterDeclaration>,
}

impl Controller {
    /// Create an empty controller named `identity`
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            source: None,
            actions: HashMap::new(),
            filters: Vec::new(),
        }
    }

    /// Record the file this controller is declared in
    #[must_use]
    pub fn source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Register an action
    #[must_use]
    pub fn action<F>(mut self, name: &str, func: F) -> Self
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.actions.insert(name.to_string(), Arc::new(func));
        self
    }

    /// Register a before-filter in code
    #[must_use]
    pub fn before_filter(mut self, run: &str, options: FilterOptions) -> Self {
        self.filters.push(FilterDeclaration::before(run, options));
        self
    }

    /// Register an after-filter in code
    #[must_use]
    pub fn after_filter(mut self, run: &str, options: FilterOptions) -> Self {
        self.filters.push(FilterDeclaration::after(run, options));
        self
    }

    /// Stable identity, used for metadata lookup and cache keys
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Declaring source, if recorded
    #[must_use]
    pub fn source_path(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Filters registered in code, in registration order
    #[must_use]
    pub fn code_filters(&self) -> &[FilterDeclaration] {
        &self.filters
    }

    /// Whether an action named `name` exists
    #[must_use]
    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Invoke an action.
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerNotFound` for an unknown action, otherwise
    /// whatever the action returns.
    pub fn call(&self, action: &str, req: &Request, params: &Params) -> Result<Reply> {
        let func = self.actions.get(action).ok_or_else(|| Error::HandlerNotFound {
            controller: self.identity.clone(),
            action: action.to_string(),
        })?;
        func(req, params)
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut actions: Vec<_> = self.actions.keys().collect();
        actions.sort();
        f.debug_struct("Controller")
            .field("identity", &self.identity)
            .field("source", &self.source)
            .field("actions", &actions)
            .field("filters", &self.filters)
            .finish()
    }
}

/// Controllers by identity
#[derive(Debug, Default, Clone)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<Controller>>,
}

impl ControllerRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a controller, replacing any with the same identity
    pub fn register(&mut self, controller: Controller) {
        self.controllers
            .insert(controller.identity.clone(), Arc::new(controller));
    }

    /// Look up a controller
    #[must_use]
    pub fn get(&self, identity: &str) -> Option<&Arc<Controller>> {
        self.controllers.get(identity)
    }

    /// Look up a controller, failing with `ControllerNotFound`
    ///
    /// # Errors
    ///
    /// Returns `Error::ControllerNotFound` if `identity` is not registered.
    pub fn require(&self, identity: &str) -> Result<&Arc<Controller>> {
        self.get(identity).ok_or_else(|| Error::ControllerNotFound {
            controller: identity.to_string(),
        })
    }

    /// Number of registered controllers
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Check if no controllers are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}
