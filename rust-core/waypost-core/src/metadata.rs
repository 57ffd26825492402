//! # Declarative Filter Metadata
//!
//! Filter declarations attached to controllers, either to the whole
//! controller ("class level") or to a single action ("member level").
//!
//! The resolver reads them through the [`MetadataReader`] trait, so where
//! the declarations come from is up to the host. [`StaticMetadata`] is a
//! plain declaration table filled by builder calls at startup.

use crate::error::Result;
use crate::request::Method;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Which stage a declaration belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    /// Runs before the action
    Before,
    /// Runs after the action
    After,
}

impl FilterKind {
    /// Stable identifier used in cache keys
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

impl fmt::Display for FilterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applicability constraints of a declaration
///
/// `None` means "no constraint". An `on` list containing `get` also covers
/// `head`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    /// Lowercase HTTP verbs the filter applies to
    #[serde(default)]
    pub on: Option<Vec<String>>,
    /// Actions the filter is restricted to
    #[serde(default)]
    pub only: Option<Vec<String>>,
    /// Actions the filter never applies to
    #[serde(default)]
    pub except: Option<Vec<String>>,
}

fn owned<'a>(items: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    items.into_iter().map(String::from).collect()
}

impl FilterOptions {
    /// No constraints
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to the given HTTP verbs (case-insensitive)
    #[must_use]
    pub fn on<'a>(mut self, verbs: impl IntoIterator<Item = &'a str>) -> Self {
        let mut verbs: Vec<String> = verbs.into_iter().map(str::to_ascii_lowercase).collect();
        if verbs.iter().any(|v| v == "get") && !verbs.iter().any(|v| v == "head") {
            verbs.push("head".to_string());
        }
        self.on = Some(verbs);
        self
    }

    /// Restrict to the given actions
    #[must_use]
    pub fn only<'a>(mut self, actions: impl IntoIterator<Item = &'a str>) -> Self {
        self.only = Some(owned(actions));
        self
    }

    /// Exclude the given actions
    #[must_use]
    pub fn except<'a>(mut self, actions: impl IntoIterator<Item = &'a str>) -> Self {
        self.except = Some(owned(actions));
        self
    }

    fn excluded_by_verb(&self, verb: Method) -> bool {
        let Some(on) = &self.on else { return false };
        let verb = verb.as_lower();
        let implied_head = verb == "head" && on.iter().any(|v| v.eq_ignore_ascii_case("get"));
        !implied_head && !on.iter().any(|v| v.eq_ignore_ascii_case(&verb))
    }

    fn excluded_by_only(&self, action: &str) -> bool {
        self.only
            .as_ref()
            .is_some_and(|only| !only.iter().any(|a| a == action))
    }

    fn excluded_by_except(&self, action: &str) -> bool {
        self.except
            .as_ref()
            .is_some_and(|except| except.iter().any(|a| a == action))
    }

    /// Whether a declaration with these options applies to `verb` + `action`
    #[must_use]
    pub fn applies(&self, verb: Method, action: &str) -> bool {
        !(self.excluded_by_verb(verb)
            || self.excluded_by_only(action)
            || self.excluded_by_except(action))
    }
}

/// One declarative filter: which filter to run and when it applies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterDeclaration {
    /// Stage the filter runs in
    pub kind: FilterKind,
    /// Filter reference, `name[:args]`
    pub run: String,
    /// Applicability constraints
    #[serde(flatten)]
    pub options: FilterOptions,
}

impl FilterDeclaration {
    /// A before-filter declaration
    pub fn before(run: impl Into<String>, options: FilterOptions) -> Self {
        Self {
            kind: FilterKind::Before,
            run: run.into(),
            options,
        }
    }

    /// An after-filter declaration
    pub fn after(run: impl Into<String>, options: FilterOptions) -> Self {
        Self {
            kind: FilterKind::After,
            run: run.into(),
            options,
        }
    }

    /// Whether this declaration applies to `verb` + `action`
    #[must_use]
    pub fn applies(&self, verb: Method, action: &str) -> bool {
        self.options.applies(verb, action)
    }
}

/// Source of declarative filter metadata
///
/// Implementations may read from anywhere. On failure the resolver treats
/// the declaration set as empty for that request only and does not cache
/// the result.
pub trait MetadataReader: Send + Sync {
    /// Declarations attached to the controller as a whole
    ///
    /// # Errors
    ///
    /// Implementation-defined; the resolver logs and recovers.
    fn class_declarations(&self, controller: &str) -> Result<Vec<FilterDeclaration>>;

    /// Declarations attached to one action.
    ///
    /// An unknown action yields an empty list, not an error.
    ///
    /// # Errors
    ///
    /// Implementation-defined; the resolver logs and recovers.
    fn member_declarations(&self, controller: &str, action: &str) -> Result<Vec<FilterDeclaration>>;
}

/// In-memory declaration table
#[derive(Debug, Clone, Default)]
pub struct StaticMetadata {
    classes: HashMap<String, Vec<FilterDeclaration>>,
    members: HashMap<(String, String), Vec<FilterDeclaration>>,
}

impl StaticMetadata {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a controller-wide filter
    #[must_use]
    pub fn class(mut self, controller: &str, declaration: FilterDeclaration) -> Self {
        self.classes
            .entry(controller.to_string())
            .or_default()
            .push(declaration);
        self
    }

    /// Declare a filter on one action
    #[must_use]
    pub fn member(mut self, controller: &str, action: &str, declaration: FilterDeclaration) -> Self {
        self.members
            .entry((controller.to_string(), action.to_string()))
            .or_default()
            .push(declaration);
        self
    }
}

impl MetadataReader for StaticMetadata {
    fn class_declarations(&self, controller: &str) -> Result<Vec<FilterDeclaration>> {
        Ok(self.classes.get(controller).cloned().unwrap_or_default())
    }

    fn member_declarations(&self, controller: &str, action: &str) -> Result<Vec<FilterDeclaration>> {
        Ok(self
            .members
            .get(&(controller.to_string(), action.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
