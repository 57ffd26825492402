//! End-to-end dispatch behavior through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use waypost_core::{
    CacheStore, Controller, Error, FilterDeclaration, FilterKind, FilterOptions, FilterResolver,
    MemoryCacheStore, Method, MetadataReader, Reply, Request, Response, Result, Router,
    StaticMetadata,
};

fn get(path: &str) -> Request {
    Request::new(Method::Get, path)
}

#[test]
fn test_named_parameters_reach_handler() {
    let mut router = Router::new();
    router.get("/foo/{name}/{age}", |_, params| {
        Ok(Reply::from(format!(
            "{}{}",
            params.get("name").unwrap_or_default(),
            params.get("age").unwrap_or_default()
        )))
    });

    let res = router.dispatch(&get("/foo/taylor/25")).unwrap();
    assert_eq!(res.body, "taylor25");
}

#[test]
fn test_optional_parameter_defaults_to_none() {
    let mut router = Router::new();
    router.get("/foo/{name}/{age?}", |_, params| {
        let age = params.get("age").unwrap_or("none");
        Ok(Reply::from(format!("{}:{age}", params.get("name").unwrap_or_default())))
    });

    assert_eq!(router.dispatch(&get("/foo/taylor")).unwrap().body, "taylor:none");
    assert_eq!(router.dispatch(&get("/foo/taylor/25")).unwrap().body, "taylor:25");
}

#[test]
fn test_defaults_and_constraints() {
    let mut router = Router::new();
    router
        .get("/foo/{name}/{age}", |_, params| {
            Ok(Reply::from(format!("{:?}", params.select(&["age", "name"]))))
        })
        .defaults("age", None)
        .where_("name", "[a-z]+");

    assert_eq!(router.dispatch(&get("/foo/taylor")).unwrap().body, r#"[None, Some("taylor")]"#);
    assert!(matches!(
        router.dispatch(&get("/foo/T4ylor")),
        Err(Error::RouteNotFound { .. })
    ));
}

#[test]
fn test_legacy_wildcards_bind_positionally() {
    let mut router = Router::new();
    router.get("/posts/(:num)/(:any?)", |_, params| {
        let args: Vec<_> = params.args().map(|a| a.unwrap_or("-")).collect();
        Ok(Reply::from(args.join(",")))
    });

    assert_eq!(router.dispatch(&get("/posts/12/hello-world")).unwrap().body, "12,hello-world");
    assert_eq!(router.dispatch(&get("/posts/12")).unwrap().body, "12,-");
    assert!(router.dispatch(&get("/posts/abc")).is_err());
}

#[test]
fn test_before_filter_stops_the_cycle() {
    let mut router = Router::new();
    let handled = Arc::new(AtomicUsize::new(0));
    let counter = handled.clone();
    router.filter_fn("foo", |_, _, _| Ok(Some(Reply::from("filtered!"))));
    router
        .get("/foo/bar", move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Reply::from("hello"))
        })
        .before("foo");

    let res = router.dispatch(&get("/foo/bar")).unwrap();
    assert_eq!(res.body, "filtered!");
    assert_eq!(handled.load(Ordering::SeqCst), 0);
}

#[test]
fn test_null_before_filters_let_the_request_through() {
    let mut router = Router::new();
    let calls = Arc::new(AtomicUsize::new(0));
    for name in ["foo", "bar"] {
        let counter = calls.clone();
        router.filter_fn(name, move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        });
    }
    router.get("/foo/bar", |_, _| Ok(Reply::from("hello"))).before("foo").before("bar");

    assert_eq!(router.dispatch(&get("/foo/bar")).unwrap().body, "hello");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_pattern_filters_apply_by_glob() {
    let mut router = Router::new();
    router.filter_fn("something", |_, _, _| Ok(Some(Reply::from("something"))));
    router.filter_fn("filter", |_, _, _| Ok(Some(Reply::from("filtered"))));
    router.match_filter("bar*", ["something"]).unwrap();
    router.match_filter("f*", ["filter"]).unwrap();
    router.get("/foo", |_, _| Ok(Reply::from("foo")));
    router.get("/admin", |_, _| Ok(Reply::from("admin")));

    assert_eq!(router.dispatch(&get("/foo")).unwrap().body, "filtered");
    assert_eq!(router.dispatch(&get("/admin")).unwrap().body, "admin");
}

#[test]
fn test_after_filters_observe_response() {
    let mut router = Router::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    router.filter_fn("capture", move |_, res, _| {
        if let Some(res) = res {
            log.lock().unwrap().push(res.body.clone());
        }
        Ok(None)
    });
    router.get("/foo", |_, _| Ok(Reply::from("hello"))).after("capture");

    router.dispatch(&get("/foo")).unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
}

#[test]
fn test_wrong_verb_is_method_not_allowed() {
    let mut router = Router::new();
    router.get("/foo", |_, _| Ok(Reply::from("")));
    router.post("/foo", |_, _| Ok(Reply::from("")));
    router.put("/bar", |_, _| Ok(Reply::from("")));

    let err = router.dispatch(&Request::new(Method::Delete, "/foo")).unwrap_err();
    match err {
        Error::MethodNotAllowed { allowed, .. } => assert_eq!(allowed, vec!["GET", "POST"]),
        other => panic!("unexpected error: {other}"),
    }

    let err = router.dispatch(&Request::new(Method::Delete, "/baz")).unwrap_err();
    assert!(matches!(err, Error::RouteNotFound { .. }));
}

#[test]
fn test_json_reply_is_normalized() {
    let mut router = Router::new();
    router.get("/api", |_, _| Ok(Reply::from(serde_json::json!({"ok": true}))));
    router.get("/raw", |_, _| Ok(Response::text("plain").with_status(201).into()));

    let json = router.dispatch(&get("/api")).unwrap();
    assert_eq!(json.body, r#"{"ok":true}"#);
    assert_eq!(json.content_type, "application/json");

    let raw = router.dispatch(&get("/raw")).unwrap();
    assert_eq!(raw.status, 201);
    assert_eq!(raw.body, "plain");
}

#[test]
fn test_router_is_shareable_across_threads() {
    let mut router = Router::new();
    router.get("/users/{id}", |_, params| {
        Ok(Reply::from(params.get("id").unwrap_or_default().to_string()))
    });
    let router = Arc::new(router);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let router = router.clone();
            std::thread::spawn(move || {
                let res = router.dispatch(&get(&format!("/users/{i}"))).unwrap();
                assert_eq!(res.body, i.to_string());
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

struct CountingReader {
    inner: StaticMetadata,
    scans: AtomicUsize,
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

fn posts_metadata() -> StaticMetadata {
    StaticMetadata::new()
        .class("Posts", FilterDeclaration::before("auth", FilterOptions::new().except(["index"])))
        .class("Posts", FilterDeclaration::before("owner", FilterOptions::new().only(["show"])))
        .member("Posts", "store", FilterDeclaration::before("csrf", FilterOptions::new().on(["post"])))
}

#[test]
fn test_resolver_constraints() {
    let resolver = FilterResolver::new(Arc::new(posts_metadata()));
    let posts = Controller::new("Posts");

    assert!(resolver.resolve(&posts, Method::Get, "index", FilterKind::Before).is_empty());
    assert_eq!(
        resolver.resolve(&posts, Method::Get, "show", FilterKind::Before),
        vec!["auth", "owner"]
    );
    assert_eq!(
        resolver.resolve(&posts, Method::Post, "store", FilterKind::Before),
        vec!["auth", "csrf"]
    );
}

#[test]
fn test_resolver_cache_round_trip_and_invalidation() {
    let reader = Arc::new(CountingReader {
        inner: posts_metadata(),
        scans: AtomicUsize::new(0),
    });
    let store = Arc::new(MemoryCacheStore::new());
    store.touch("src/posts.rs", SystemTime::now() - Duration::from_secs(60));
    let resolver = FilterResolver::new(reader.clone()).with_store(store.clone());
    let posts = Controller::new("Posts").source("src/posts.rs");

    let first = resolver.resolve(&posts, Method::Get, "show", FilterKind::Before);
    let second = resolver.resolve(&posts, Method::Get, "show", FilterKind::Before);
    assert_eq!(first, second);
    assert_eq!(reader.scans.load(Ordering::SeqCst), 1);

    let key = FilterResolver::cache_key("Posts", Method::Get, "show", FilterKind::Before);
    assert!(store.exists(&key));

    store.touch("src/posts.rs", SystemTime::now() + Duration::from_secs(60));
    let third = resolver.resolve(&posts, Method::Get, "show", FilterKind::Before);
    assert_eq!(third, first);
    assert_eq!(reader.scans.load(Ordering::SeqCst), 2);
}

#[test]
fn test_controller_filters_through_router() {
    let mut router = Router::new();
    let calls = Arc::new(Mutex::new(Vec::new()));
    for name in ["auth", "owner", "throttle"] {
        let log = calls.clone();
        router.filter_fn(name, move |_, res, _| {
            if res.is_none() {
                log.lock().unwrap().push(name);
            }
            Ok(None)
        });
    }
    router.metadata_reader(Arc::new(posts_metadata()));
    router.cache_store(Some(Arc::new(MemoryCacheStore::new())));
    router.controller(
        Controller::new("Posts")
            .action("show", |_, params| {
                Ok(Reply::from(format!("post {}", params.get("id").unwrap_or_default())))
            })
            .before_filter("throttle", FilterOptions::new().on(["get"])),
    );
    router.route(&[Method::Get], "/posts/{id}", "Posts@show");

    let res = router.dispatch(&get("/posts/3")).unwrap();
    assert_eq!(res.body, "post 3");
    assert_eq!(*calls.lock().unwrap(), vec!["auth", "owner", "throttle"]);

    calls.lock().unwrap().clear();
    router.dispatch(&Request::new(Method::Head, "/posts/3")).unwrap();
    assert_eq!(*calls.lock().unwrap(), vec!["auth", "owner", "throttle"]);
}
