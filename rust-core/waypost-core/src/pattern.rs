//! # Pattern Compiler
//!
//! Turns a route's textual pattern into an anchored, case-sensitive regex.
//!
//! Two syntaxes are understood, one per pattern:
//!
//! - Named placeholders: `/users/{id}`, `/posts/{slug?}`. A placeholder is
//!   *defaultable* when it carries `?` or has a default registered on the
//!   route. A trailing run of defaultable whole-segment placeholders becomes
//!   nested optional groups, so `/foo/{name?}/{age?}` matches `/foo`,
//!   `/foo/a` and `/foo/a/b`.
//! - Legacy wildcards: `(:num)`, `(:any)`, `(:all)` and their optional forms
//!   `/(:num?)`, `/(:any?)`, `/(:all?)`. Optional tokens are replaced first,
//!   one opening group per replacement, and the same number of `)?` is
//!   appended at the end of the expression. Interleaving an optional token
//!   before a required one therefore makes the required one optional too.
//!
//! Literal text is escaped, so `.` in a pattern only matches a dot.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Required legacy wildcard tokens and their regex fragments
const WILDCARDS: [(&str, &str); 3] = [
    ("(:num)", "([0-9]+)"),
    ("(:any)", r"([a-zA-Z0-9.\-_%]+)"),
    ("(:all)", "(.*)"),
];

/// Optional legacy wildcard tokens; each opens a group closed at pattern end
const OPTIONAL_WILDCARDS: [(&str, &str); 3] = [
    ("/(:num?)", "(?:/([0-9]+)"),
    ("/(:any?)", r"(?:/([a-zA-Z0-9.\-_%]+)"),
    ("/(:all?)", "(?:/(.*)"),
];

/// Default fragment for a named placeholder: one path segment
const SEGMENT: &str = "[^/]+";

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{(\w+)(\?)?\}").expect("placeholder regex is valid")
    })
}

/// Per-route inputs to compilation besides the pattern text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requirements {
    /// Placeholder name -> regex the captured value must match
    pub constraints: HashMap<String, String>,
    /// Placeholder name -> value bound when the segment is absent
    pub defaults: HashMap<String, Option<String>>,
}

/// How captured groups are named
#[derive(Debug, Clone, PartialEq, Eq)]
enum Slots {
    /// Named placeholders in declaration order
    Named(Vec<String>),
    /// Legacy wildcards, bound by position
    Positional(usize),
}

/// A compiled route pattern
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    regex: Regex,
    slots: Slots,
    defaults: HashMap<String, Option<String>>,
}

impl CompiledPattern {
    /// The generated regular expression
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.regex.as_str()
    }

    /// Check whether `path` matches; an empty path is treated as `/`
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.regex.is_match(normalize_path(path))
    }

    /// Match `path` and bind the captured parameters
    #[must_use]
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(normalize_path(path))?;

        let entries = match &self.slots {
            Slots::Named(names) => names
                .iter()
                .map(|name| {
                    let value = caps.name(name).map(|m| m.as_str().to_string()).or_else(|| {
                        self.defaults.get(name).cloned().flatten()
                    });
                    (name.clone(), value)
                })
                .collect(),
            Slots::Positional(count) => (1..=*count)
                .map(|idx| {
                    let value = caps.get(idx).map(|m| m.as_str().to_string());
                    ((idx - 1).to_string(), value)
                })
                .collect(),
        };

        Some(Params { entries })
    }
}

fn normalize_path(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Compile `pattern` into a matcher.
///
/// Compilation is a pure function of its inputs.
///
/// # Errors
///
/// Returns `Error::InvalidRoutePattern` if the generated expression is not a
/// valid regex, e.g. because of a bad constraint or a duplicate placeholder.
pub fn compile(pattern: &str, requirements: &Requirements) -> Result<CompiledPattern> {
    let legacy = pattern.contains("(:");
    let source = if legacy {
        compile_wildcards(pattern)
    } else {
        compile_placeholders(pattern, requirements)
    };

    let regex = Regex::new(&source).map_err(|e| Error::InvalidRoutePattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    let slots = if legacy {
        Slots::Positional(regex.captures_len() - 1)
    } else {
        Slots::Named(placeholder_names(pattern))
    };

    Ok(CompiledPattern {
        regex,
        slots,
        defaults: requirements.defaults.clone(),
    })
}

/// Placeholder names in declaration order, `?` stripped
#[must_use]
pub fn placeholder_names(pattern: &str) -> Vec<String> {
    placeholder_regex()
        .captures_iter(pattern)
        .map(|c| c[1].to_string())
        .collect()
}

fn compile_wildcards(pattern: &str) -> String {
    let mut source = regex::escape(pattern);
    let mut opened = 0;

    for (token, fragment) in OPTIONAL_WILDCARDS {
        let escaped = regex::escape(token);
        opened += source.matches(&escaped).count();
        source = source.replace(&escaped, fragment);
    }
    for (token, fragment) in WILDCARDS {
        source = source.replace(&regex::escape(token), fragment);
    }
    source.push_str(&")?".repeat(opened));

    format!("^{source}$")
}

/// A whole-segment placeholder, if the segment is exactly `{name}` / `{name?}`
fn whole_placeholder(segment: &str) -> Option<(&str, bool)> {
    let inner = segment.strip_prefix('{')?.strip_suffix('}')?;
    let (name, optional) = match inner.strip_suffix('?') {
        Some(name) => (name, true),
        None => (inner, false),
    };
    let valid = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    valid.then_some((name, optional))
}

fn segment_source(segment: &str, requirements: &Requirements) -> String {
    let mut out = String::new();
    let mut last = 0;
    for caps in placeholder_regex().captures_iter(segment) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&regex::escape(&segment[last..whole.start()]));
        let name = &caps[1];
        let fragment = requirements
            .constraints
            .get(name)
            .map_or(SEGMENT, String::as_str);
        out.push_str(&format!("(?P<{name}>{fragment})"));
        last = whole.end();
    }
    out.push_str(&regex::escape(&segment[last..]));
    out
}

fn compile_placeholders(pattern: &str, requirements: &Requirements) -> String {
    let trimmed = pattern.strip_prefix('/').unwrap_or(pattern);
    if trimmed.is_empty() {
        return "^/$".to_string();
    }

    let segments: Vec<&str> = trimmed.split('/').collect();
    let defaultable = |segment: &str| {
        whole_placeholder(segment).is_some_and(|(name, optional)| {
            optional || requirements.defaults.contains_key(name)
        })
    };

    let mut tail_start = segments.len();
    while tail_start > 0 && defaultable(segments[tail_start - 1]) {
        tail_start -= 1;
    }

    let mut source = String::from("^");
    for (idx, segment) in segments.iter().enumerate() {
        let body = segment_source(segment, requirements);
        if idx < tail_start {
            source.push('/');
            source.push_str(&body);
        } else if idx == 0 {
            source.push_str("/(?:");
            source.push_str(&body);
        } else {
            source.push_str("(?:/");
            source.push_str(&body);
        }
    }
    source.push_str(&")?".repeat(segments.len() - tail_start));
    source.push('$');
    source
}

/// Parameters bound by a successful match, in declaration order.
///
/// Unmatched optional parameters hold their default, usually `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Option<String>)>,
}

impl Params {
    /// Value bound to `name`; `None` if unknown or unmatched
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Whether the pattern declares `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Value at `index` in declaration order
    #[must_use]
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.entries.get(index).and_then(|(_, v)| v.as_deref())
    }

    /// All values in declaration order
    pub fn args(&self) -> impl Iterator<Item = Option<&str>> {
        self.entries.iter().map(|(_, v)| v.as_deref())
    }

    /// Values for the given names only, in the order requested
    #[must_use]
    pub fn select(&self, names: &[&str]) -> Vec<Option<&str>> {
        names.iter().map(|name| self.get(name)).collect()
    }

    /// `(name, value)` pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_deref()))
    }

    /// Number of declared parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pattern declares no parameters
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
