//! # Routes
//!
//! One routed endpoint: the verbs it answers, its pattern, its handler and
//! the filters declared on it.
//!
//! Routes are built during setup through `&mut Route` builder calls and are
//! read-only once dispatching starts. The compiled matcher is derived lazily
//! on first use. Bound parameters never live on the route itself; a
//! successful match returns them in a request-scoped [`RouteMatch`].

use crate::cache::stable_hash;
use crate::error::{Error, Result};
use crate::filter::{merge_specs, FilterSpec};
use crate::pattern::{compile, CompiledPattern, Params, Requirements};
use crate::request::{Method, Request};
use crate::response::Reply;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Closure handler: receives the request and the bound parameters
pub type HandlerFn = Arc<dyn Fn(&Request, &Params) -> Result<Reply> + Send + Sync>;

/// What a route dispatches to
#[derive(Clone)]
pub enum Handler {
    /// Plain closure
    Closure(HandlerFn),
    /// Action on a registered controller
    Controller {
        /// Controller identity
        controller: String,
        /// Action name
        action: String,
    },
}

impl Handler {
    /// Wrap a closure
    pub fn closure<F>(func: F) -> Self
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        Self::Closure(Arc::new(func))
    }

    /// Controller action handler
    pub fn controller(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self::Controller {
            controller: controller.into(),
            action: action.into(),
        }
    }

    /// Parse `"Controller@action"`.
    ///
    /// Without an `@` the action is left empty, which fails with
    /// `HandlerNotFound` at dispatch.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let (controller, action) = spec.split_once('@').unwrap_or((spec, ""));
        Self::controller(controller.trim(), action.trim())
    }
}

impl From<&str> for Handler {
    fn from(spec: &str) -> Self {
        Self::parse(spec)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closure(_) => f.write_str("Closure"),
            Self::Controller { controller, action } => write!(f, "{controller}@{action}"),
        }
    }
}

/// A registered route
pub struct Route {
    methods: Vec<Method>,
    pattern: String,
    requirements: Requirements,
    compiled: OnceLock<std::result::Result<CompiledPattern, String>>,
    handler: Handler,
    name: Option<String>,
    before: Vec<FilterSpec>,
    after: Vec<FilterSpec>,
}

impl Route {
    /// Create a route.
    ///
    /// `HEAD` is folded into `GET`; the pattern is given a leading `/`.
    pub fn new(methods: &[Method], pattern: &str, handler: Handler) -> Self {
        let mut route = Self {
            methods: Vec::new(),
            pattern: normalize_pattern(pattern),
            requirements: Requirements::default(),
            compiled: OnceLock::new(),
            handler,
            name: None,
            before: Vec::new(),
            after: Vec::new(),
        };
        route.also(methods);
        route
    }

    /// Give the route a unique name
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    /// Answer additional verbs
    pub fn also(&mut self, methods: &[Method]) -> &mut Self {
        for method in methods.iter().map(|m| m.routing_alias()) {
            if !self.methods.contains(&method) {
                self.methods.push(method);
            }
        }
        self
    }

    /// Add before-filters (`"auth|csrf"`), skipping ones already declared
    pub fn before(&mut self, filters: &str) -> &mut Self {
        merge_specs(&mut self.before, FilterSpec::parse_list(filters));
        self
    }

    /// Add after-filters (`"log|cache:60"`), skipping ones already declared
    pub fn after(&mut self, filters: &str) -> &mut Self {
        merge_specs(&mut self.after, FilterSpec::parse_list(filters));
        self
    }

    /// Constrain a placeholder to a regex
    pub fn where_(&mut self, param: &str, regex: &str) -> &mut Self {
        self.requirements
            .constraints
            .insert(param.to_string(), regex.to_string());
        self.compiled = OnceLock::new();
        self
    }

    /// Make a placeholder defaultable and set its value when absent
    pub fn defaults(&mut self, param: &str, value: Option<&str>) -> &mut Self {
        self.requirements
            .defaults
            .insert(param.to_string(), value.map(String::from));
        self.compiled = OnceLock::new();
        self
    }

    /// Verbs this route answers, `HEAD` excluded
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Whether the route answers `method` (`HEAD` counts as `GET`)
    #[must_use]
    pub fn answers(&self, method: Method) -> bool {
        self.methods.contains(&method.routing_alias())
    }

    /// The pattern as registered
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Constraints and defaults
    #[must_use]
    pub const fn requirements(&self) -> &Requirements {
        &self.requirements
    }

    /// The handler
    #[must_use]
    pub const fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Explicit name, if one was given
    #[must_use]
    pub fn explicit_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Explicit name, or one generated from the verbs and pattern
    #[must_use]
    pub fn route_name(&self) -> Cow<'_, str> {
        match &self.name {
            Some(name) => Cow::Borrowed(name),
            None => Cow::Owned(self.generated_name()),
        }
    }

    fn generated_name(&self) -> String {
        let verbs: Vec<&str> = self.methods.iter().map(Method::as_str).collect();
        stable_hash(&format!("{}|{}", verbs.join(","), self.pattern))
    }

    /// Declared before-filters
    #[must_use]
    pub fn before_filters(&self) -> &[FilterSpec] {
        &self.before
    }

    /// Declared after-filters
    #[must_use]
    pub fn after_filters(&self) -> &[FilterSpec] {
        &self.after
    }

    /// The compiled matcher, compiling on first use
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern does not compile.
    pub fn matcher(&self) -> Result<&CompiledPattern> {
        self.compiled
            .get_or_init(|| compile(&self.pattern, &self.requirements).map_err(|e| e.to_string()))
            .as_ref()
            .map_err(|reason| Error::InvalidRoutePattern {
                pattern: self.pattern.clone(),
                reason: reason.clone(),
            })
    }

    /// Match `path`, returning the request-scoped binding
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the pattern does not compile.
    pub fn matches(&self, path: &str) -> Result<Option<RouteMatch<'_>>> {
        Ok(self
            .matcher()?
            .captures(path)
            .map(|params| RouteMatch { route: self, params }))
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("methods", &self.methods)
            .field("pattern", &self.pattern)
            .field("handler", &self.handler)
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim_matches('/');
    format!("/{trimmed}")
}

/// A route matched against one request, with that request's parameters
#[derive(Debug)]
pub struct RouteMatch<'a> {
    route: &'a Route,
    params: Params,
}

impl<'a> RouteMatch<'a> {
    /// The matched route
    #[must_use]
    pub const fn route(&self) -> &'a Route {
        self.route
    }

    /// Parameters bound for this request
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Shorthand for `params().get(name)`
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }
}
