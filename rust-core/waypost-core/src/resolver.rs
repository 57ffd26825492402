//! # Filter Resolver
//!
//! Works out which filters apply to a controller action.
//!
//! Declarative filters come from the [`MetadataReader`]: class-level
//! declarations first, then the action's own, each kept only if its
//! `on`/`only`/`except` constraints admit the request. Scanning metadata
//! can be expensive, so the declarative list is cached per
//! (controller, verb, action, kind) in a [`CacheStore`].
//!
//! Filters registered in code on the controller are never cached. They are
//! applied fresh on every resolution and appended after the declarative
//! ones, then the whole list is deduplicated keeping first-seen order.
//!
//! A cache entry is stale once the controller's declaring source has been
//! modified after the entry was written. Stale, malformed and unreadable
//! entries are all treated as misses: the list is recomputed and the entry
//! overwritten. If the metadata reader fails, the partial list is used for
//! that request only and nothing is written, so the next resolution scans
//! again. Resolution itself never fails.

use crate::cache::{stable_hash, CacheStore};
use crate::controller::Controller;
use crate::error::{Error, Result};
use crate::json::{parse_json, to_json};
use crate::metadata::{FilterDeclaration, FilterKind, MetadataReader, StaticMetadata};
use crate::request::Method;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache-backed resolver for controller filters
#[derive(Clone)]
pub struct FilterResolver {
    reader: Arc<dyn MetadataReader>,
    store: Option<Arc<dyn CacheStore>>,
}

impl Default for FilterResolver {
    fn default() -> Self {
        Self::new(Arc::new(StaticMetadata::new()))
    }
}

impl FilterResolver {
    /// Create an uncached resolver over `reader`
    #[must_use]
    pub fn new(reader: Arc<dyn MetadataReader>) -> Self {
        Self {
            reader,
            store: None,
        }
    }

    /// Cache declarative results in `store`
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn CacheStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the metadata reader
    pub fn set_reader(&mut self, reader: Arc<dyn MetadataReader>) {
        self.reader = reader;
    }

    /// Replace (or remove) the cache store
    pub fn set_store(&mut self, store: Option<Arc<dyn CacheStore>>) {
        self.store = store;
    }

    /// Whether results are cached
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.store.is_some()
    }

    /// Cache key for one resolution
    #[must_use]
    pub fn cache_key(identity: &str, verb: Method, action: &str, kind: FilterKind) -> String {
        stable_hash(&format!("{identity}|{}|{action}|{}", verb.as_str(), kind.as_str()))
    }

    /// Ordered, deduplicated filter references for `controller`'s `action`
    #[must_use]
    pub fn resolve(
        &self,
        controller: &Controller,
        verb: Method,
        action: &str,
        kind: FilterKind,
    ) -> Vec<String> {
        let mut filters = match &self.store {
            Some(store) => self.cached_declared(store.as_ref(), controller, verb, action, kind),
            None => self.declared(controller.identity(), verb, action, kind).filters,
        };

        let code = applicable(controller.code_filters().iter(), verb, action, kind);
        for run in code {
            if !filters.contains(&run) {
                filters.push(run);
            }
        }
        filters
    }

    fn cached_declared(
        &self,
        store: &dyn CacheStore,
        controller: &Controller,
        verb: Method,
        action: &str,
        kind: FilterKind,
    ) -> Vec<String> {
        let identity = controller.identity();
        let key = Self::cache_key(identity, verb, action, kind);

        match read_entry(store, &key, controller.source_path()) {
            Ok(Some(filters)) => {
                debug!(controller = identity, action, kind = %kind, key = %key, "filter cache hit");
                return filters;
            }
            Ok(None) => {
                debug!(controller = identity, action, kind = %kind, key = %key, "filter cache miss");
            }
            Err(e) => {
                warn!(controller = identity, key = %key, error = %e, "discarding filter cache entry");
            }
        }

        let scan = self.declared(identity, verb, action, kind);
        if scan.degraded {
            debug!(controller = identity, key = %key, "metadata scan incomplete, not caching");
            return scan.filters;
        }
        if let Err(e) = to_json(&scan.filters).and_then(|bytes| store.write_raw(&key, &bytes)) {
            warn!(controller = identity, key = %key, store = store.name(), error = %e, "failed to write filter cache entry");
        }
        scan.filters
    }

    /// Scan metadata: class declarations, then member declarations
    fn declared(&self, identity: &str, verb: Method, action: &str, kind: FilterKind) -> Scan {
        let mut degraded = false;
        let class = self.reader.class_declarations(identity).unwrap_or_else(|e| {
            warn!(controller = identity, error = %e, "class metadata unavailable");
            degraded = true;
            Vec::new()
        });
        let member = self
            .reader
            .member_declarations(identity, action)
            .unwrap_or_else(|e| {
                warn!(controller = identity, action, error = %e, "member metadata unavailable");
                degraded = true;
                Vec::new()
            });

        let mut filters = Vec::new();
        for run in applicable(class.iter().chain(member.iter()), verb, action, kind) {
            if !filters.contains(&run) {
                filters.push(run);
            }
        }
        Scan { filters, degraded }
    }
}

/// Result of one metadata scan
struct Scan {
    filters: Vec<String>,
    /// A reader call failed; the list is usable for this request only
    degraded: bool,
}

fn applicable<'a>(
    declarations: impl Iterator<Item = &'a FilterDeclaration>,
    verb: Method,
    action: &str,
    kind: FilterKind,
) -> Vec<String> {
    declarations
        .filter(|d| d.kind == kind && d.applies(verb, action))
        .map(|d| d.run.clone())
        .collect()
}

/// `Ok(None)` for a miss or a stale entry, `Err` for an unusable one
fn read_entry(store: &dyn CacheStore, key: &str, source: Option<&Path>) -> Result<Option<Vec<String>>> {
    if !store.exists(key) {
        return Ok(None);
    }

    if let Some(source) = source {
        let written = store.last_modified(key)?;
        let modified = store.source_modified(source).map_err(|e| Error::FilterResolution {
            reason: format!("cannot stat {}: {e}", source.display()),
        })?;
        if modified > written {
            debug!(key = %key, source = %source.display(), "filter cache entry is stale");
            return Ok(None);
        }
    }

    let bytes = store.read_raw(key)?;
    parse_json(&bytes).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCacheStore, MemoryCacheStore};
    use crate::metadata::FilterOptions;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};

    /// Counts metadata scans
    struct CountingReader {
        inner: StaticMetadata,
        scans: AtomicUsize,
    }

    impl CountingReader {
        fn new(inner: StaticMetadata) -> Arc<Self> {
            Arc::new(Self {
                inner,
                scans: AtomicUsize::new(0),
            })
        }

        fn scans(&self) -> usize {
            self.scans.load(Ordering::SeqCst)
        }
    }

    impl MetadataReader for CountingReader {
        fn class_declarations(&self, controller: &str) -> Result<Vec<FilterDeclaration>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.inner.class_declarations(controller)
        }

        fn member_declarations(&self, controller: &str, action: &str) -> Result<Vec<FilterDeclaration>> {
            self.inner.member_declarations(controller, action)
        }
    }

    struct BrokenReader;

    impl MetadataReader for BrokenReader {
        fn class_declarations(&self, _controller: &str) -> Result<Vec<FilterDeclaration>> {
            Err(Error::FilterResolution {
                reason: "unreadable".to_string(),
            })
        }

        fn member_declarations(&self, _controller: &str, _action: &str) -> Result<Vec<FilterDeclaration>> {
            Ok(vec![FilterDeclaration::before("csrf", FilterOptions::new())])
        }
    }

    /// Fails class lookups until `failures_left` runs out
    struct FlakyReader {
        inner: StaticMetadata,
        failures_left: AtomicUsize,
    }

    impl MetadataReader for FlakyReader {
        fn class_declarations(&self, controller: &str) -> Result<Vec<FilterDeclaration>> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if failing {
                return Err(Error::FilterResolution {
                    reason: "metadata source temporarily unavailable".to_string(),
                });
            }
            self.inner.class_declarations(controller)
        }

        fn member_declarations(&self, controller: &str, action: &str) -> Result<Vec<FilterDeclaration>> {
            self.inner.member_declarations(controller, action)
        }
    }

    fn metadata() -> StaticMetadata {
        StaticMetadata::new()
            .class("Users", FilterDeclaration::before("auth", FilterOptions::new()))
            .class("Users", FilterDeclaration::before("admin", FilterOptions::new().only(["show"])))
            .class("Users", FilterDeclaration::after("log", FilterOptions::new()))
            .member("Users", "store", FilterDeclaration::before("csrf", FilterOptions::new().on(["post"])))
            .member("Users", "store", FilterDeclaration::before("auth", FilterOptions::new()))
    }

    fn controller() -> Controller {
        Controller::new("Users").source("src/users.rs")
    }

    #[test]
    fn test_class_before_member_and_dedup() {
        let resolver = FilterResolver::new(Arc::new(metadata()));
        let filters = resolver.resolve(&controller(), Method::Post, "store", FilterKind::Before);
        assert_eq!(filters, vec!["auth", "csrf"]);
    }

    #[test]
    fn test_constraints_exclude() {
        let resolver = FilterResolver::new(Arc::new(metadata()));
        let c = controller();

        assert_eq!(resolver.resolve(&c, Method::Get, "index", FilterKind::Before), vec!["auth"]);
        assert_eq!(
            resolver.resolve(&c, Method::Get, "show", FilterKind::Before),
            vec!["auth", "admin"]
        );
        assert_eq!(resolver.resolve(&c, Method::Get, "store", FilterKind::Before), vec!["auth"]);
        assert_eq!(resolver.resolve(&c, Method::Get, "index", FilterKind::After), vec!["log"]);
    }

    #[test]
    fn test_code_filters_follow_declared() {
        let resolver = FilterResolver::new(Arc::new(metadata()));
        let c = controller()
            .before_filter("throttle", FilterOptions::new())
            .before_filter("auth", FilterOptions::new())
            .before_filter("guest", FilterOptions::new().only(["create"]));

        let filters = resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        assert_eq!(filters, vec!["auth", "throttle"]);
    }

    #[test]
    fn test_cache_serves_second_resolution() {
        let reader = CountingReader::new(metadata());
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader.clone()).with_store(store.clone());
        let c = controller();
        store.touch("src/users.rs", SystemTime::now() - Duration::from_secs(60));

        let first = resolver.resolve(&c, Method::Get, "show", FilterKind::Before);
        let second = resolver.resolve(&c, Method::Get, "show", FilterKind::Before);

        assert_eq!(first, second);
        assert_eq!(reader.scans(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_touched_source_invalidates() {
        let reader = CountingReader::new(metadata());
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader.clone()).with_store(store.clone());
        let c = controller();
        store.touch("src/users.rs", SystemTime::now() - Duration::from_secs(60));

        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        store.touch("src/users.rs", SystemTime::now() + Duration::from_secs(60));
        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);

        assert_eq!(reader.scans(), 2);
    }

    #[test]
    fn test_controller_without_source_never_goes_stale() {
        let reader = CountingReader::new(metadata());
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader.clone()).with_store(store);
        let c = Controller::new("Users");

        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        assert_eq!(reader.scans(), 1);
    }

    #[test]
    fn test_code_filters_not_cached() {
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(Arc::new(metadata())).with_store(store);

        let plain = Controller::new("Users");
        assert_eq!(resolver.resolve(&plain, Method::Get, "index", FilterKind::Before), vec!["auth"]);

        let extended = Controller::new("Users").before_filter("throttle", FilterOptions::new());
        assert_eq!(
            resolver.resolve(&extended, Method::Get, "index", FilterKind::Before),
            vec!["auth", "throttle"]
        );
    }

    #[test]
    fn test_malformed_entry_is_recomputed() {
        let reader = CountingReader::new(metadata());
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader.clone()).with_store(store.clone());
        let key = FilterResolver::cache_key("Users", Method::Get, "index", FilterKind::Before);
        store.write_raw(&key, b"{not json").unwrap();

        let c = Controller::new("Users");
        assert_eq!(resolver.resolve(&c, Method::Get, "index", FilterKind::Before), vec!["auth"]);
        assert_eq!(reader.scans(), 1);
        assert_eq!(store.read_raw(&key).unwrap(), br#"["auth"]"#);
    }

    #[test]
    fn test_unknown_source_is_recomputed() {
        let reader = CountingReader::new(metadata());
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader.clone()).with_store(store);
        let c = controller();

        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        resolver.resolve(&c, Method::Get, "index", FilterKind::Before);
        assert_eq!(reader.scans(), 2);
    }

    #[test]
    fn test_reader_failure_treated_as_empty() {
        let resolver = FilterResolver::new(Arc::new(BrokenReader));
        let filters = resolver.resolve(&controller(), Method::Get, "index", FilterKind::Before);
        assert_eq!(filters, vec!["csrf"]);
    }

    #[test]
    fn test_reader_failure_is_not_cached() {
        let reader = Arc::new(FlakyReader {
            inner: metadata(),
            failures_left: AtomicUsize::new(1),
        });
        let store = Arc::new(MemoryCacheStore::new());
        let resolver = FilterResolver::new(reader).with_store(store.clone());
        let c = Controller::new("Users");

        assert!(resolver.resolve(&c, Method::Get, "index", FilterKind::Before).is_empty());
        assert!(store.is_empty());

        assert_eq!(resolver.resolve(&c, Method::Get, "index", FilterKind::Before), vec!["auth"]);
        assert_eq!(store.len(), 1);
        assert_eq!(resolver.resolve(&c, Method::Get, "index", FilterKind::Before), vec!["auth"]);
    }

    #[test]
    fn test_uncached_scans_every_time() {
        let reader = CountingReader::new(metadata());
        let resolver = FilterResolver::new(reader.clone());
        assert!(!resolver.is_cached());

        resolver.resolve(&controller(), Method::Get, "index", FilterKind::Before);
        resolver.resolve(&controller(), Method::Get, "index", FilterKind::Before);
        assert_eq!(reader.scans(), 2);
    }

    #[test]
    fn test_cache_key_is_stable_and_distinct() {
        let a = FilterResolver::cache_key("Users", Method::Get, "index", FilterKind::Before);
        assert_eq!(a, FilterResolver::cache_key("Users", Method::Get, "index", FilterKind::Before));
        assert_ne!(a, FilterResolver::cache_key("Users", Method::Head, "index", FilterKind::Before));
        assert_ne!(a, FilterResolver::cache_key("Users", Method::Get, "index", FilterKind::After));
        assert_ne!(a, FilterResolver::cache_key("Posts", Method::Get, "index", FilterKind::Before));
    }

    #[test]
    fn test_file_store_round_trip_and_staleness() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let source = temp_dir.path().join("users.rs");
        std::fs::write(&source, "// users").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        let store = Arc::new(FileCacheStore::new(temp_dir.path().join("meta")).unwrap());
        let reader = CountingReader::new(metadata());
        let resolver = FilterResolver::new(reader.clone()).with_store(store);
        let c = Controller::new("Users").source(&source);

        let first = resolver.resolve(&c, Method::Get, "show", FilterKind::Before);
        let second = resolver.resolve(&c, Method::Get, "show", FilterKind::Before);
        assert_eq!(first, vec!["auth", "admin"]);
        assert_eq!(first, second);
        assert_eq!(reader.scans(), 1);

        std::fs::File::options()
            .write(true)
            .open(&source)
            .unwrap()
            .set_modified(SystemTime::now() + Duration::from_secs(3600))
            .unwrap();
        let third = resolver.resolve(&c, Method::Get, "show", FilterKind::Before);
        assert_eq!(third, first);
        assert_eq!(reader.scans(), 2);
    }
}
