//! Router assembly and server lifecycle.
//!
//! The dispatcher composes three layers around the repo-backed handlers:
//! the error adapter (`AppError`'s `IntoResponse`), the name validator
//! (`validation::validate_name` at handler entry) and the repository
//! binder (open the repository, defer to [`upstream_fallback`] on a
//! filesystem-class miss).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::download;
use crate::error::{json_response, AppError, AppResult};
use crate::package;
use crate::sha_cache::ShaCache;
use crate::state::{AppState, SharedState};
use crate::stats;
use crate::store::Storage;
use crate::upstream::Upstream;

/// Builds the shared state from a validated configuration.
pub fn build_state(config: &Config) -> anyhow::Result<SharedState> {
    let upstream = if config.upstream_url.is_empty() {
        None
    } else {
        Some(Upstream::new(&config.upstream_url)?)
    };

    Ok(Arc::new(AppState {
        storage: Storage::new(&config.storage_dir),
        front_addr: config.front_addr.trim_end_matches('/').to_string(),
        upstream,
        sha_cache: ShaCache::new(config.sha_cache_size)?,
    }))
}

/// Registers the registry's route surface.
///
/// The literal `/-/...` routes are registered alongside the `/{name}/...`
/// captures; static segments take precedence, so `/-/ping` hits the
/// dedicated handler while `/tape/ping` goes through the capture.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(registry_root))
        .route("/-/ping", get(ping))
        .route("/-/stats", get(stats::mem_stats))
        .route("/-/upstreams", get(upstreams))
        .route("/-/ui", get(ui))
        .route("/{name}", get(package::package_root))
        .route("/{name}/-/{version}", get(download::download))
        .route("/{name}/ping", get(ping))
        .route("/{name}/stats", get(stats::package_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Runs the server until the listener fails or the process is stopped.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.validate()?;
    let state = build_state(&config)?;
    let app = router(state);

    if config.tls_enabled() {
        let addr: SocketAddr = config.addr.parse()?;
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
            &config.cert_file,
            &config.key_file,
        )
        .await?;
        info!(addr = %config.addr, storage_dir = %config.storage_dir.display(), "registry listening (TLS)");
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await?;
    } else {
        warn!("TLS not configured: missing cert_file / key_file");
        let listener = TcpListener::bind(&config.addr).await?;
        info!(addr = %config.addr, storage_dir = %config.storage_dir.display(), "registry listening");
        axum::serve(listener, app).await?;
    }
    Ok(())
}

/// Defers a request for a package that is not hosted locally to the
/// upstream registry, or answers 404 when no upstream is configured.
pub(crate) async fn upstream_fallback(state: &AppState, path: &str) -> AppResult<Response> {
    match &state.upstream {
        Some(upstream) => upstream.proxy(path).await,
        None => Err(AppError::PackageNotFound),
    }
}

/// `GET /` — maps every hosted package name to its package root URL.
async fn registry_root(State(state): State<SharedState>) -> AppResult<Response> {
    let names = state.storage.list()?;
    let root: BTreeMap<String, String> = names
        .into_iter()
        .map(|name| {
            let url = format!("{}/{}", state.front_addr, name);
            (name, url)
        })
        .collect();
    json_response(StatusCode::OK, &root)
}

/// `GET /-/ping` and `GET /{name}/ping` — empty object, npm's liveness
/// probe. Never touches storage.
async fn ping() -> AppResult<Response> {
    json_response(StatusCode::OK, &json!({}))
}

/// `GET /-/upstreams` — live status of the configured upstream.
async fn upstreams(State(state): State<SharedState>) -> AppResult<Response> {
    let upstream = state
        .upstream
        .as_ref()
        .ok_or(AppError::UpstreamNotConfigured)?;
    json_response(StatusCode::OK, &upstream.status().await)
}

/// `GET /-/ui` — static landing page.
async fn ui() -> Html<&'static str> {
    Html(include_str!("../static/index.html"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::Archive;
    use crate::test_fixtures::seed_repo;
    use axum_test::TestServer;
    use git2::{Oid, Repository};
    use serde_json::Value;
    use sha1::{Digest, Sha1};
    use std::io::Read;
    use std::path::Path;
    use tempfile::TempDir;

    const FRONT: &str = "http://r.example";

    fn test_state(storage_dir: &Path, upstream: Option<Upstream>) -> SharedState {
        Arc::new(AppState {
            storage: Storage::new(storage_dir),
            front_addr: FRONT.to_string(),
            upstream,
            sha_cache: ShaCache::new(16).unwrap(),
        })
    }

    fn test_server(state: SharedState) -> TestServer {
        TestServer::new(router(state)).unwrap()
    }

    fn seed_tape(storage: &Path) -> Oid {
        seed_repo(
            &storage.join("tape"),
            &[
                (
                    "package.json",
                    br#"{"name":"tape","version":"1.0.0"}"#,
                    0o100644,
                ),
                ("lib/index.js", b"module.exports = {};\n", 0o100644),
            ],
            &["v1.0.0"],
        )
    }

    fn tape_shasum(storage: &Path, id: Oid) -> String {
        let repo = Repository::open(storage.join("tape")).unwrap();
        let mut hasher = Sha1::new();
        Archive::new(&repo, id).unwrap().write_to(&mut hasher).unwrap();
        format!("{:x}", hasher.finalize())
    }

    async fn spawn_upstream(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn missing_package_without_upstream_is_404() {
        let storage = TempDir::new().unwrap();
        let server = test_server(test_state(storage.path(), None));

        let response = server.get("/foo").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({"error": "Not Found", "reason": "package not found"})
        );
    }

    #[tokio::test]
    async fn invalid_name_is_400_without_storage_access() {
        // The storage dir does not even exist; validation must trip first.
        let server = test_server(test_state(Path::new("/nonexistent/storage"), None));

        let response = server.get("/-bad").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({"error": "Bad Request", "reason": "invalid name"})
        );
    }

    #[tokio::test]
    async fn local_package_root_document() {
        let storage = TempDir::new().unwrap();
        let commit = seed_tape(storage.path());
        let server = test_server(test_state(storage.path(), None));

        let response = server.get("/tape").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json; charset=utf-8"
        );

        let body = response.json::<Value>();
        assert_eq!(body["name"], "tape");
        assert_eq!(body["dist-tags"]["latest"], "1.0.0");

        let dist = &body["versions"]["1.0.0"]["dist"];
        assert_eq!(dist["tarball"], format!("{FRONT}/tape/-/{commit}"));
        assert_eq!(dist["shasum"], tape_shasum(storage.path(), commit));
    }

    #[tokio::test]
    async fn download_with_invalid_object_id_is_400() {
        let storage = TempDir::new().unwrap();
        seed_tape(storage.path());
        let server = test_server(test_state(storage.path(), None));

        let response = server.get("/tape/-/not-a-hex").await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.json::<Value>(),
            json!({
                "error": "Bad Request",
                "reason": "version is not a valid git object id"
            })
        );
    }

    #[tokio::test]
    async fn download_of_absent_object_is_404() {
        let storage = TempDir::new().unwrap();
        seed_tape(storage.path());
        let server = test_server(test_state(storage.path(), None));

        let response = server
            .get("/tape/-/aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({"error": "Not Found", "reason": "package not found"})
        );
    }

    #[tokio::test]
    async fn download_is_deterministic_and_matches_shasum() {
        let storage = TempDir::new().unwrap();
        let commit = seed_tape(storage.path());
        let server = test_server(test_state(storage.path(), None));
        let path = format!("/tape/-/{commit}");

        let first = server.get(&path).await;
        assert_eq!(first.status_code(), StatusCode::OK);
        assert_eq!(
            first.headers().get("content-type").unwrap(),
            "application/x-gzip"
        );
        assert!(first.headers().get("content-length").is_none());

        let second = server.get(&path).await;
        assert_eq!(first.as_bytes(), second.as_bytes());

        // The advertised shasum is over the decompressed tar stream.
        let mut decoder = flate2::read::GzDecoder::new(&first.as_bytes()[..]);
        let mut tar_bytes = Vec::new();
        decoder.read_to_end(&mut tar_bytes).unwrap();

        let mut hasher = Sha1::new();
        hasher.update(&tar_bytes);
        let digest = format!("{:x}", hasher.finalize());
        assert_eq!(digest, tape_shasum(storage.path(), commit));

        // And the decompressed body is a readable tar archive.
        let mut archive = tar::Archive::new(&tar_bytes[..]);
        let paths: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|entry| {
                entry
                    .unwrap()
                    .path()
                    .unwrap()
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();
        assert!(paths.contains(&"package/package.json".to_string()));
        assert!(paths.contains(&"package/lib/index.js".to_string()));
    }

    #[tokio::test]
    async fn missing_package_with_upstream_is_proxied() {
        let upstream_app = Router::new().route(
            "/tape",
            get(|| async {
                (
                    [("x-upstream-probe", "hit")],
                    r#"{"name":"tape","proxied":true}"#,
                )
            }),
        );
        let base = spawn_upstream(upstream_app).await;

        let storage = TempDir::new().unwrap();
        let upstream = Upstream::new(&base).unwrap();
        let server = test_server(test_state(storage.path(), Some(upstream)));

        let response = server.get("/tape").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.headers().get("x-upstream-probe").unwrap(), "hit");
        assert_eq!(response.text(), r#"{"name":"tape","proxied":true}"#);
    }

    #[tokio::test]
    async fn locally_hosted_package_is_not_proxied() {
        let upstream_app = Router::new().route(
            "/tape",
            get(|| async { r#"{"name":"tape","proxied":true}"# }),
        );
        let base = spawn_upstream(upstream_app).await;

        let storage = TempDir::new().unwrap();
        seed_tape(storage.path());
        let upstream = Upstream::new(&base).unwrap();
        let server = test_server(test_state(storage.path(), Some(upstream)));

        let body = server.get("/tape").await.json::<Value>();
        assert!(body.get("proxied").is_none());
        assert_eq!(body["dist-tags"]["latest"], "1.0.0");
    }

    #[tokio::test]
    async fn ping_answers_empty_object_for_both_shapes() {
        let storage = TempDir::new().unwrap();
        let server = test_server(test_state(storage.path(), None));

        for path in ["/-/ping", "/tape/ping"] {
            let response = server.get(path).await;
            assert_eq!(response.status_code(), StatusCode::OK, "path {path}");
            assert_eq!(response.json::<Value>(), json!({}));
        }
    }

    #[tokio::test]
    async fn registry_root_lists_hosted_packages() {
        let storage = TempDir::new().unwrap();
        seed_repo(&storage.path().join("alpha"), &[], &[]);
        seed_repo(&storage.path().join("beta"), &[], &[]);
        std::fs::write(storage.path().join("README"), b"not a repo").unwrap();

        let server = test_server(test_state(storage.path(), None));
        let body = server.get("/").await.json::<Value>();
        assert_eq!(
            body,
            json!({
                "alpha": format!("{FRONT}/alpha"),
                "beta": format!("{FRONT}/beta"),
            })
        );
    }

    #[tokio::test]
    async fn upstreams_endpoint_reports_status() {
        let storage = TempDir::new().unwrap();

        // Without an upstream the endpoint is a 404.
        let server = test_server(test_state(storage.path(), None));
        let response = server.get("/-/upstreams").await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);

        // An unreachable upstream reports down.
        let upstream = Upstream::new("http://127.0.0.1:9").unwrap();
        let server = test_server(test_state(storage.path(), Some(upstream)));
        let body = server.get("/-/upstreams").await.json::<Value>();
        assert_eq!(body["status"], "down");
    }

    #[tokio::test]
    async fn mem_stats_and_ui_respond() {
        let storage = TempDir::new().unwrap();
        let server = test_server(test_state(storage.path(), None));

        let stats = server.get("/-/stats").await;
        assert_eq!(stats.status_code(), StatusCode::OK);
        assert!(stats.json::<Value>()["resident_bytes"].as_u64().unwrap() > 0);

        let ui = server.get("/-/ui").await;
        assert_eq!(ui.status_code(), StatusCode::OK);
        assert_eq!(
            ui.headers().get("content-type").unwrap(),
            "text/html; charset=utf-8"
        );
        assert!(ui.text().contains("tagship"));
    }

    #[tokio::test]
    async fn package_stats_route_lists_remotes() {
        let storage = TempDir::new().unwrap();
        seed_repo(&storage.path().join("tape"), &[], &[]);
        let repo = Repository::open(storage.path().join("tape")).unwrap();
        repo.remote("origin", "https://example.com/tape.git").unwrap();

        let server = test_server(test_state(storage.path(), None));
        let body = server.get("/tape/stats").await.json::<Value>();
        assert_eq!(
            body,
            json!({"remotes": [{"name": "origin", "url": "https://example.com/tape.git"}]})
        );
    }
}
