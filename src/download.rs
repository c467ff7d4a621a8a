//! Tarball downloads: gzipped tar streams addressed by object id.

use axum::body::Body;
use axum::extract::{OriginalUri, Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::duplex;
use tokio::sync::oneshot;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::error::{AppError, AppResult};
use crate::server;
use crate::state::SharedState;
use crate::store::StoreError;
use crate::validation;

/// Pipe capacity between the blocking tar writer and the response body.
const STREAM_BUFFER: usize = 64 * 1024;

/// `GET /{name}/-/{version}` — streams the gzipped tar archive of the
/// tree that the object id refers to.
///
/// The archive is produced straight into the response body through a
/// bounded pipe; it is never materialized, and no Content-Length is set.
/// The blocking task signals readiness only after the object has been
/// peeled, so a missing object still produces a clean 404. Once
/// streaming has begun, a failure can only truncate the body; the client
/// disconnecting surfaces as a pipe write error that aborts the
/// traversal.
pub async fn download(
    Path((name, version)): Path<(String, String)>,
    OriginalUri(uri): OriginalUri,
    State(state): State<SharedState>,
) -> AppResult<Response> {
    validation::validate_name(&name)?;
    let id = validation::parse_object_id(&version)?;
    debug!(package = %name, id = %id, "starting tarball download");

    let (writer, reader) = duplex(STREAM_BUFFER);
    let bridge = SyncIoBridge::new(writer);
    let (ready_tx, ready_rx) = oneshot::channel::<Result<(), StoreError>>();

    {
        let state = state.clone();
        let name = name.clone();
        tokio::task::spawn_blocking(move || {
            let repo = match state.storage.open(&name) {
                Ok(repo) => repo,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let archive = match Archive::new(&repo, id) {
                Ok(archive) => archive,
                Err(err) => {
                    let _ = ready_tx.send(Err(err));
                    return;
                }
            };
            let _ = ready_tx.send(Ok(()));

            let mut encoder = GzEncoder::new(bridge, Compression::default());
            if let Err(err) = archive.write_to(&mut encoder) {
                warn!(package = %name, id = %id, error = %err, "tar stream aborted");
                return;
            }
            if let Err(err) = encoder.finish() {
                debug!(package = %name, id = %id, error = %err, "failed to finish gzip stream");
            }
        });
    }

    match ready_rx.await {
        Ok(Ok(())) => {
            let body = Body::from_stream(ReaderStream::new(reader));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "application/x-gzip")
                .body(body)?)
        }
        Ok(Err(StoreError::RepoNotFound)) => server::upstream_fallback(&state, uri.path()).await,
        Ok(Err(StoreError::ObjectNotFound)) => Err(AppError::PackageNotFound),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Err(AppError::Internal(
            "download task exited before signalling readiness".to_string(),
        )),
    }
}
