//! # Router
//!
//! Owns the route table, named filters, controllers and the filter
//! resolver, and drives the dispatch pipeline:
//!
//! ```text
//! global before -> match -> route before -> handler -> normalize
//!               -> route after -> global after -> close
//! ```
//!
//! At each before stage the first filter returning a reply stops the stage;
//! that reply becomes the response and the handler is skipped, but the after
//! and close stages still run. `finish` hooks run separately through
//! [`Router::call_finish`] once the response has been sent.
//!
//! Routes are tried in registration order and the first match wins. `HEAD`
//! requests are matched against `GET` routes. Registration happens before
//! dispatching starts; `dispatch` only takes `&self`, so one router can
//! serve concurrent requests.

use crate::cache::{CacheStore, FileCacheStore};
use crate::config::RouterConfig;
use crate::controller::{Controller, ControllerRegistry};
use crate::error::{Error, Result};
use crate::filter::{Filter, FilterRegistry, FilterResult, FilterSpec, FnFilter};
use crate::metadata::{FilterKind, MetadataReader};
use crate::pattern::Params;
use crate::request::{Method, Request};
use crate::resolver::FilterResolver;
use crate::response::{Reply, Response};
use crate::route::{Handler, Route, RouteMatch};
use http_body_util::Full;
use hyper::body::Bytes;
use std::sync::Arc;
use tracing::{debug, warn};

/// Global before hook
pub type BeforeHook = Arc<dyn Fn(&Request) -> FilterResult + Send + Sync>;

/// Global after hook; may modify the response
pub type AfterHook = Arc<dyn Fn(&Request, &mut Response) -> Result<()> + Send + Sync>;

/// Global close or finish hook; observes the final response
pub type CloseHook = Arc<dyn Fn(&Request, &Response) -> Result<()> + Send + Sync>;

/// Verbs registered by [`Router::any`]
pub const ANY_METHODS: [Method; 5] = [
    Method::Get,
    Method::Post,
    Method::Put,
    Method::Delete,
    Method::Patch,
];

/// HTTP router and dispatcher
pub struct Router {
    routes: Vec<Route>,
    filters: FilterRegistry,
    controllers: ControllerRegistry,
    resolver: FilterResolver,
    before_hooks: Vec<BeforeHook>,
    after_hooks: Vec<AfterHook>,
    close_hooks: Vec<CloseHook>,
    finish_hooks: Vec<CloseHook>,
    filters_enabled: bool,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            filters: FilterRegistry::new(),
            controllers: ControllerRegistry::new(),
            resolver: FilterResolver::default(),
            before_hooks: Vec::new(),
            after_hooks: Vec::new(),
            close_hooks: Vec::new(),
            finish_hooks: Vec::new(),
            filters_enabled: true,
        }
    }
}

impl Router {
    /// Create an empty router with filters enabled and no filter cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the configured cache directory cannot be created.
    pub fn with_config(config: &RouterConfig) -> Result<Self> {
        let mut router = Self::new();
        router.filters_enabled = config.filters_enabled;
        if let Some(dir) = &config.cache_dir {
            let store = FileCacheStore::new(dir)?;
            debug!(dir = %store.dir().display(), "filter cache enabled");
            router.resolver.set_store(Some(Arc::new(store)));
        }
        Ok(router)
    }

    /// Register a route for `methods`; returns it for further configuration
    pub fn route(&mut self, methods: &[Method], pattern: &str, handler: impl Into<Handler>) -> &mut Route {
        let route = Route::new(methods, pattern, handler.into());
        debug!(
            methods = ?route.methods(),
            pattern = route.pattern(),
            handler = ?route.handler(),
            "route registered"
        );
        self.routes.push(route);
        let idx = self.routes.len() - 1;
        &mut self.routes[idx]
    }

    /// Register a closure route for `methods`
    pub fn match_methods<F>(&mut self, methods: &[Method], pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.route(methods, pattern, Handler::closure(handler))
    }

    /// Register a `GET` route (also answers `HEAD`)
    pub fn get<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&[Method::Get], pattern, handler)
    }

    /// Register a `POST` route
    pub fn post<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&[Method::Post], pattern, handler)
    }

    /// Register a `PUT` route
    pub fn put<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&[Method::Put], pattern, handler)
    }

    /// Register a `DELETE` route
    pub fn delete<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&[Method::Delete], pattern, handler)
    }

    /// Register a `PATCH` route
    pub fn patch<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&[Method::Patch], pattern, handler)
    }

    /// Register a route for every verb in [`ANY_METHODS`]
    pub fn any<F>(&mut self, pattern: &str, handler: F) -> &mut Route
    where
        F: Fn(&Request, &Params) -> Result<Reply> + Send + Sync + 'static,
    {
        self.match_methods(&ANY_METHODS, pattern, handler)
    }

    /// Registered routes in registration order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Look up a route by explicit or generated name
    #[must_use]
    pub fn route_by_name(&self, name: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| r.explicit_name() == Some(name))
            .or_else(|| self.routes.iter().find(|r| r.route_name() == name))
    }

    /// Compile every route pattern now rather than on first dispatch
    ///
    /// # Errors
    ///
    /// Returns the first `Error::InvalidRoutePattern` encountered.
    pub fn compile_routes(&self) -> Result<()> {
        for route in &self.routes {
            route.matcher()?;
        }
        Ok(())
    }

    /// Register a controller for `"Controller@action"` routes
    pub fn controller(&mut self, controller: Controller) {
        debug!(controller = controller.identity(), "controller registered");
        self.controllers.register(controller);
    }

    /// Registered controllers
    #[must_use]
    pub const fn controllers(&self) -> &ControllerRegistry {
        &self.controllers
    }

    /// Source of declarative controller filters
    pub fn metadata_reader(&mut self, reader: Arc<dyn MetadataReader>) {
        self.resolver.set_reader(reader);
    }

    /// Cache for resolved controller filters; `None` disables caching
    pub fn cache_store(&mut self, store: Option<Arc<dyn CacheStore>>) {
        self.resolver.set_store(store);
    }

    /// The controller filter resolver
    #[must_use]
    pub const fn resolver(&self) -> &FilterResolver {
        &self.resolver
    }

    /// Register a named filter
    pub fn add_filter<F: Filter + 'static>(&mut self, name: &str, filter: F) {
        self.filters.add(name, filter);
    }

    /// Register a closure as a named filter.
    ///
    /// The closure gets the response only when run in an after position.
    pub fn filter_fn<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&Request, Option<&mut Response>, &[String]) -> FilterResult + Send + Sync + 'static,
    {
        self.filters.add(name, FnFilter::new(func));
    }

    /// Look up a named filter
    #[must_use]
    pub fn get_filter(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name)
    }

    /// Run `names` before every route whose path matches `glob`
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the glob cannot be compiled.
    pub fn match_filter<'a>(&mut self, glob: &str, names: impl IntoIterator<Item = &'a str>) -> Result<()> {
        self.filters.match_pattern(glob, names)
    }

    /// Run filters (the default)
    pub fn enable_filters(&mut self) {
        self.filters_enabled = true;
    }

    /// Skip global, pattern, route and controller filters
    pub fn disable_filters(&mut self) {
        self.filters_enabled = false;
    }

    /// Whether filters run
    #[must_use]
    pub const fn filters_enabled(&self) -> bool {
        self.filters_enabled
    }

    /// Add a hook run before matching; a reply short-circuits the request
    pub fn before<F>(&mut self, hook: F)
    where
        F: Fn(&Request) -> FilterResult + Send + Sync + 'static,
    {
        self.before_hooks.push(Arc::new(hook));
    }

    /// Add a hook run on every response after route filters
    pub fn after<F>(&mut self, hook: F)
    where
        F: Fn(&Request, &mut Response) -> Result<()> + Send + Sync + 'static,
    {
        self.after_hooks.push(Arc::new(hook));
    }

    /// Add a hook run last in `dispatch`, even with filters disabled
    pub fn close<F>(&mut self, hook: F)
    where
        F: Fn(&Request, &Response) -> Result<()> + Send + Sync + 'static,
    {
        self.close_hooks.push(Arc::new(hook));
    }

    /// Add a hook run by [`Router::call_finish`]
    pub fn finish<F>(&mut self, hook: F)
    where
        F: Fn(&Request, &Response) -> Result<()> + Send + Sync + 'static,
    {
        self.finish_hooks.push(Arc::new(hook));
    }

    /// Find the route for `req`.
    ///
    /// # Errors
    ///
    /// Returns `Error::MethodNotAllowed` when the path is routed only for
    /// other verbs, `Error::RouteNotFound` when it is not routed at all, or
    /// `Error::InvalidRoutePattern` if a route pattern does not compile.
    pub fn find_route(&self, req: &Request) -> Result<RouteMatch<'_>> {
        let method = req.method();
        let path = req.path();

        for route in self.routes.iter().filter(|r| r.answers(method)) {
            if let Some(matched) = route.matches(path)? {
                return Ok(matched);
            }
        }

        let mut allowed: Vec<String> = Vec::new();
        for route in &self.routes {
            if !route.matcher()?.is_match(path) {
                continue;
            }
            for verb in route.methods() {
                let verb = verb.as_str().to_string();
                if !allowed.contains(&verb) {
                    allowed.push(verb);
                }
            }
        }

        if allowed.is_empty() {
            debug!(method = %method, path, "no route matched");
            Err(Error::RouteNotFound {
                method: method.to_string(),
                path: path.to_string(),
            })
        } else {
            debug!(method = %method, path, allowed = ?allowed, "method not allowed");
            Err(Error::MethodNotAllowed {
                path: path.to_string(),
                allowed,
            })
        }
    }

    /// Dispatch `req` through the pipeline and return the response.
    ///
    /// # Errors
    ///
    /// Routing failures (`RouteNotFound`, `MethodNotAllowed`,
    /// `ControllerNotFound`, `HandlerNotFound`), unknown filter names, and
    /// any error returned by a filter, hook or handler.
    pub fn dispatch(&self, req: &Request) -> Result<Response> {
        debug!(method = %req.method(), path = req.path(), "dispatching");

        let mut response = match self.call_global_before(req)? {
            Some(reply) => {
                debug!(path = req.path(), "request short-circuited by global before hook");
                reply.into_response()
            }
            None => {
                let matched = self.find_route(req)?;
                self.run_route(req, &matched)?
            }
        };

        if self.filters_enabled {
            for hook in &self.after_hooks {
                hook(req, &mut response)?;
            }
        }
        for hook in &self.close_hooks {
            hook(req, &response)?;
        }

        debug!(path = req.path(), status = response.status, "dispatched");
        Ok(response)
    }

    /// Run `finish` hooks once the response has been sent
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a hook.
    pub fn call_finish(&self, req: &Request, response: &Response) -> Result<()> {
        for hook in &self.finish_hooks {
            hook(req, response)?;
        }
        Ok(())
    }

    /// Dispatch a hyper request and always produce a hyper response.
    ///
    /// Errors become their status code (with `Allow` for 405); `finish`
    /// hooks run before returning, failures there are logged.
    pub fn handle(&self, req: hyper::Request<Bytes>) -> hyper::Response<Full<Bytes>> {
        let req = match Request::try_from(req) {
            Ok(req) => req,
            Err(e) => return error_response(&e).into_hyper(),
        };

        let response = self.dispatch(&req).unwrap_or_else(|e| {
            if e.status_code() >= 500 {
                warn!(method = %req.method(), path = req.path(), error = %e, "dispatch failed");
            }
            error_response(&e)
        });

        if let Err(e) = self.call_finish(&req, &response) {
            warn!(path = req.path(), error = %e, "finish hook failed");
        }
        response.into_hyper()
    }

    fn call_global_before(&self, req: &Request) -> FilterResult {
        if !self.filters_enabled {
            return Ok(None);
        }
        for hook in &self.before_hooks {
            if let Some(reply) = hook(req)? {
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    /// Route before filters, handler, normalization, route after filters
    fn run_route(&self, req: &Request, matched: &RouteMatch<'_>) -> Result<Response> {
        let route = matched.route();

        let short_circuit = if self.filters_enabled {
            let mut specs = self.filters.pattern_filters(req.path());
            specs.extend(route.before_filters().iter().cloned());
            self.run_before_filters(req, &specs)?
        } else {
            None
        };

        let mut response = match short_circuit {
            Some(reply) => {
                debug!(pattern = route.pattern(), "route short-circuited by before filter");
                reply.into_response()
            }
            None => self.invoke_handler(req, matched)?,
        };

        if self.filters_enabled {
            self.run_after_filters(req, &mut response, route.after_filters())?;
        }
        Ok(response)
    }

    fn invoke_handler(&self, req: &Request, matched: &RouteMatch<'_>) -> Result<Response> {
        match matched.route().handler() {
            Handler::Closure(func) => Ok(func(req, matched.params())?.into_response()),
            Handler::Controller { controller, action } => {
                self.call_action(controller, action, req, matched.params())
            }
        }
    }

    /// Controller before filters, action, normalization, controller after filters
    fn call_action(&self, identity: &str, action: &str, req: &Request, params: &Params) -> Result<Response> {
        let controller = self.controllers.require(identity)?;
        if !controller.has_action(action) {
            return Err(Error::HandlerNotFound {
                controller: identity.to_string(),
                action: action.to_string(),
            });
        }

        let verb = req.method();
        let short_circuit = if self.filters_enabled {
            let specs = self.resolved_specs(controller, verb, action, FilterKind::Before);
            self.run_before_filters(req, &specs)?
        } else {
            None
        };

        let mut response = match short_circuit {
            Some(reply) => {
                debug!(controller = identity, action, "action short-circuited by controller filter");
                reply.into_response()
            }
            None => controller.call(action, req, params)?.into_response(),
        };

        if self.filters_enabled {
            let specs = self.resolved_specs(controller, verb, action, FilterKind::After);
            self.run_after_filters(req, &mut response, &specs)?;
        }
        Ok(response)
    }

    fn resolved_specs(&self, controller: &Controller, verb: Method, action: &str, kind: FilterKind) -> Vec<FilterSpec> {
        self.resolver
            .resolve(controller, verb, action, kind)
            .iter()
            .map(|run| FilterSpec::parse(run))
            .collect()
    }

    fn run_before_filters(&self, req: &Request, specs: &[FilterSpec]) -> FilterResult {
        for spec in specs {
            let filter = self.filters.require(&spec.name)?;
            if let Some(reply) = filter.before(req, &spec.args)? {
                debug!(filter = %spec, "before filter returned a response");
                return Ok(Some(reply));
            }
        }
        Ok(None)
    }

    fn run_after_filters(&self, req: &Request, response: &mut Response, specs: &[FilterSpec]) -> Result<()> {
        for spec in specs {
            let filter = self.filters.require(&spec.name)?;
            filter.after(req, response, &spec.args)?;
        }
        Ok(())
    }
}

/// Transport response for a failed dispatch
fn error_response(error: &Error) -> Response {
    let status = error.status_code();
    let mut response = Response::text(error.to_string()).with_status(status);
    if let Some(allowed) = error.allowed_methods() {
        response.set_header("Allow", &allowed.join(", "));
    }
    response
}
