//! Tests for the project, packaged-default and static resource namespaces
//!
//! # Test Coverage
//!
//! - `/` prefers the project index over the packaged default
//! - Unrouted paths fall back to the project namespace, never to the defaults
//! - The static prefix maps into the static directory with content types by extension
//! - Traversal attempts stay inside the base directory
//! - Routes take precedence over project files

use brrtserve::cli::build_dispatcher;
use brrtserve::config::ServerConfig;
use brrtserve::dispatcher::Dispatcher;
use brrtserve::server::Body;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

mod common;
use common::fixtures::get;

struct Site {
    _public: TempDir,
    _static: TempDir,
    dispatcher: Dispatcher,
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn build_site(with_index: bool) -> Site {
    let public = tempfile::tempdir().unwrap();
    let static_dir = tempfile::tempdir().unwrap();
    if with_index {
        write(public.path(), "index.html", "<h1>project home</h1>");
    }
    write(public.path(), "about.txt", "about us");
    write(public.path(), "api/hello", "shadowed");
    write(static_dir.path(), "css/app.css", "body{}");
    write(static_dir.path(), "img/logo.png", "png");

    let config = ServerConfig {
        public_dir: Some(public.path().to_path_buf()),
        static_dir: Some(static_dir.path().to_path_buf()),
        ..ServerConfig::default()
    };
    Site {
        dispatcher: build_dispatcher(&config).unwrap(),
        _public: public,
        _static: static_dir,
    }
}

fn body_text(body: &Body) -> String {
    match body {
        Body::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => panic!("expected bytes, got {other:?}"),
    }
}

#[test]
fn test_project_index_wins() {
    let site = build_site(true);
    let res = site.dispatcher.dispatch(get("/"));
    assert_eq!(res.status, 200);
    assert_eq!(res.content_type, "text/html; charset=utf-8");
    assert_eq!(body_text(&res.body), "<h1>project home</h1>");
}

#[test]
fn test_index_escalates_to_packaged_default() {
    let site = build_site(false);
    let res = site.dispatcher.dispatch(get("/"));
    assert_eq!(res.status, 200);
    assert!(body_text(&res.body).contains("<html"));
}

#[test]
fn test_project_fallback_for_unrouted_paths() {
    let site = build_site(true);
    let res = site.dispatcher.dispatch(get("/about.txt"));
    assert_eq!(res.status, 200);
    assert_eq!(res.content_type, "text/plain; charset=utf-8");
    assert_eq!(body_text(&res.body), "about us");

    assert_eq!(site.dispatcher.dispatch(get("/index.html")).status, 200);
    assert_eq!(site.dispatcher.dispatch(get("/missing.txt")).status, 404);

    // only `/` and the favicon ever reach the packaged defaults
    let bare = build_site(false);
    assert_eq!(bare.dispatcher.dispatch(get("/index.html")).status, 404);
}

#[test]
fn test_routes_shadow_project_files() {
    let site = build_site(true);
    let res = site.dispatcher.dispatch(get("/api/hello"));
    assert!(matches!(res.body, Body::Value(_)));
}

#[test]
fn test_static_prefix() {
    let site = build_site(true);
    let res = site.dispatcher.dispatch(get("/static/css/app.css"));
    assert_eq!(res.status, 200);
    assert_eq!(res.content_type, "text/css; charset=utf-8");
    assert_eq!(body_text(&res.body), "body{}");

    let res = site.dispatcher.dispatch(get("/static/img/logo.png"));
    assert_eq!(res.content_type, "image/png");

    assert_eq!(site.dispatcher.dispatch(get("/static/none.css")).status, 404);
}

#[test]
fn test_traversal_is_not_found() {
    let site = build_site(true);
    for path in ["/static/../about.txt", "/static/css/../../secret", "/../etc/passwd"] {
        assert_eq!(site.dispatcher.dispatch(get(path)).status, 404, "{path}");
    }
}

#[test]
fn test_static_routing_disabled_by_empty_prefix() {
    let static_dir = tempfile::tempdir().unwrap();
    write(static_dir.path(), "app.js", "1");
    let config = ServerConfig {
        static_dir: Some(static_dir.path().to_path_buf()),
        static_prefix: String::new(),
        ..ServerConfig::default()
    };
    let dispatcher = build_dispatcher(&config).unwrap();
    assert_eq!(dispatcher.dispatch(get("/static/app.js")).status, 404);
}
