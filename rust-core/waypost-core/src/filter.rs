//! # Filters
//!
//! Named interceptors that run before or after a route's handler.
//!
//! A before-filter can short-circuit the request by returning a reply; an
//! after-filter observes (and may modify) the normalized response.
//!
//! Filters are referenced by name from routes and controllers. A reference
//! may carry arguments after a colon (`"role:admin,editor"`), parsed once
//! into a [`FilterSpec`].

use crate::error::{Error, Result};
use crate::request::Request;
use crate::response::{Reply, Response};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of running a filter: `Some` short-circuits a before stage
pub type FilterResult = Result<Option<Reply>>;

/// A filter reference: name plus string arguments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterSpec {
    /// Registered filter name
    pub name: String,
    /// Arguments parsed from the `name:arg1,arg2` suffix
    pub args: Vec<String>,
}

impl FilterSpec {
    /// Parse a single `name[:arg1,arg2]` reference
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(':') {
            Some((name, args)) => Self {
                name: name.trim().to_string(),
                args: args
                    .split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect(),
            },
            None => Self {
                name: raw.to_string(),
                args: Vec::new(),
            },
        }
    }

    /// Parse a `|`-separated list of references, skipping empty entries
    #[must_use]
    pub fn parse_list(raw: &str) -> Vec<Self> {
        raw.split('|')
            .filter(|part| !part.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.name, self.args.join(","))
        }
    }
}

/// Append `specs` to `list`, skipping ones already present
pub(crate) fn merge_specs(list: &mut Vec<FilterSpec>, specs: impl IntoIterator<Item = FilterSpec>) {
    for spec in specs {
        if !list.contains(&spec) {
            list.push(spec);
        }
    }
}

/// Filter trait for request/response interception
///
/// The same named filter can sit in a before or an after position; the
/// router calls the matching hook.
pub trait Filter: Send + Sync {
    /// Called in a before stage.
    ///
    /// Returning `Ok(Some(reply))` stops the stage and the reply becomes the
    /// response; the handler is skipped.
    fn before(&self, _req: &Request, _args: &[String]) -> FilterResult {
        Ok(None)
    }

    /// Called in an after stage with the normalized response
    fn after(&self, _req: &Request, _res: &mut Response, _args: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Closure-backed filter.
///
/// The closure receives the response only in after stages. A reply
/// returned from an after stage is ignored.
pub struct FnFilter<F> {
    func: F,
}

impl<F> FnFilter<F>
where
    F: Fn(&Request, Option<&mut Response>, &[String]) -> FilterResult + Send + Sync,
{
    /// Wrap a closure
    pub const fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> Filter for FnFilter<F>
where
    F: Fn(&Request, Option<&mut Response>, &[String]) -> FilterResult + Send + Sync,
{
    fn before(&self, req: &Request, args: &[String]) -> FilterResult {
        (self.func)(req, None, args)
    }

    fn after(&self, req: &Request, res: &mut Response, args: &[String]) -> Result<()> {
        (self.func)(req, Some(res), args).map(|_| ())
    }
}

/// A path glob bound to filter names
#[derive(Clone)]
struct PatternBinding {
    glob: String,
    matcher: Regex,
    names: Vec<FilterSpec>,
}

/// Compile a path glob into an anchored regex; `*` matches anything
fn compile_glob(glob: &str) -> Result<Regex> {
    let anchored = format!("/{}", glob.trim_start_matches('/'));
    let source = format!("^{}$", regex::escape(&anchored).replace(r"\*", ".*"));
    Regex::new(&source).map_err(|e| Error::InvalidRoutePattern {
        pattern: glob.to_string(),
        reason: e.to_string(),
    })
}

/// Named filters plus path-glob bindings
///
/// Written during setup, read-only while dispatching.
#[derive(Default, Clone)]
pub struct FilterRegistry {
    filters: HashMap<String, Arc<dyn Filter>>,
    patterns: Vec<PatternBinding>,
}

impl FilterRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named filter
    pub fn add<F: Filter + 'static>(&mut self, name: impl Into<String>, filter: F) {
        self.filters.insert(name.into(), Arc::new(filter));
    }

    /// Look up a filter by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }

    /// Look up a filter by name, failing with `FilterNotFound`
    ///
    /// # Errors
    ///
    /// Returns `Error::FilterNotFound` if nothing is registered under `name`.
    pub fn require(&self, name: &str) -> Result<Arc<dyn Filter>> {
        self.get(name).ok_or_else(|| Error::FilterNotFound {
            name: name.to_string(),
        })
    }

    /// Whether a filter is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Bind filter references to a path glob.
    ///
    /// Binding the same glob again appends to its list, keeping the glob's
    /// original position.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the glob cannot be compiled.
    pub fn match_pattern<'a>(
        &mut self,
        glob: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<()> {
        let specs = names.into_iter().flat_map(FilterSpec::parse_list);

        if let Some(binding) = self.patterns.iter_mut().find(|b| b.glob == glob) {
            binding.names.extend(specs);
            return Ok(());
        }

        self.patterns.push(PatternBinding {
            glob: glob.to_string(),
            matcher: compile_glob(glob)?,
            names: specs.collect(),
        });
        Ok(())
    }

    /// Filters bound to globs matching `path`, in registration order
    #[must_use]
    pub fn pattern_filters(&self, path: &str) -> Vec<FilterSpec> {
        self.patterns
            .iter()
            .filter(|b| b.matcher.is_match(path))
            .flat_map(|b| b.names.iter().cloned())
            .collect()
    }

    /// Number of named filters
    #[must_use]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    /// Check if no named filters are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}
