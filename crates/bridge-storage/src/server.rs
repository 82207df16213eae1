//! Storage tier HTTP server
//!
//! Routes:
//! - `POST /upsert?key=K&type=T` writes one record if its marker is not older
//!   than the stored one
//! - `POST /currentkeyset?key=K1,K2,...` deletes every record outside the set
//! - `GET /list`, `GET /fetch?key=K`, `GET /modelcard?key=K` read records back
//! - `DELETE /remove?key=K` deletes one record
//!
//! Every read-compare-write sequence runs under one mutex, so the
//! last-modified check and the write that follows it are atomic.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bridge_common::config::StorageServerConfig;
use bridge_common::key::parse_key_set;
use bridge_common::{
    Error, ImportKey, CURRENT_KEY_SET_URI, FETCH_URI, LIST_URI, REMOVE_URI, UPSERT_URI,
};

use crate::backend::BridgeStorage;
use crate::notifier::CatalogNotifier;
use crate::wire::{
    DiscoverResponse, KeySetResponse, PostBody, Provenance, StoredRecord, UpsertResponse,
    WriteOutcome,
};

/// Route serving the stored model card
pub const MODEL_CARD_URI: &str = "/modelcard";

type ApiError = (StatusCode, String);

/// Shared server state
pub struct StorageState {
    storage: Arc<dyn BridgeStorage>,
    notifier: Arc<dyn CatalogNotifier>,
    write_lock: Mutex<()>,
}

impl StorageState {
    /// Wrap a backend and a downstream notifier
    pub fn new(storage: Arc<dyn BridgeStorage>, notifier: Arc<dyn CatalogNotifier>) -> Self {
        Self {
            storage,
            notifier,
            write_lock: Mutex::new(()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct KeyQuery {
    key: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

/// Build the storage router
pub fn storage_router(state: Arc<StorageState>) -> Router {
    Router::new()
        .route(UPSERT_URI, post(upsert))
        .route(CURRENT_KEY_SET_URI, post(current_key_set))
        .route(LIST_URI, get(list))
        .route(FETCH_URI, get(fetch))
        .route(MODEL_CARD_URI, get(model_card))
        .route(REMOVE_URI, delete(remove))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the storage router until `shutdown` fires
pub async fn serve(
    config: &StorageServerConfig,
    state: Arc<StorageState>,
    shutdown: CancellationToken,
) -> Result<(), Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| {
            Error::configuration(format!("failed to bind storage port {}: {e}", config.port))
        })?;
    info!(addr = %addr, backend = ?config.backend, "Storage server started");

    axum::serve(listener, storage_router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| Error::internal_with_context("storage server", e.to_string()))
}

fn to_api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation { .. } => StatusCode::BAD_REQUEST,
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string())
}

fn required_key(query: &KeyQuery) -> Result<ImportKey, ApiError> {
    match query.key.as_deref().map(str::trim) {
        None | Some("") => Err((
            StatusCode::BAD_REQUEST,
            "need a 'key' parameter".to_string(),
        )),
        Some(raw) => ImportKey::parse(raw).map_err(to_api_error),
    }
}

async fn upsert(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<KeyQuery>,
    Json(body): Json<PostBody>,
) -> Result<impl IntoResponse, ApiError> {
    let key = required_key(&query)?;
    let marker = body.last_update_marker().map_err(to_api_error)?;
    if !body.model_card_key.is_empty() && body.model_card_key != key.as_str() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("modelCardKey '{}' does not match key '{key}'", body.model_card_key),
        ));
    }
    let provenance = Provenance::from_query(query.kind.as_deref());

    let _guard = state.write_lock.lock().await;
    let existing = state.storage.get(&key).await.map_err(to_api_error)?;

    if let Some(stored) = &existing {
        if marker < stored.last_update {
            warn!(
                key = %key,
                incoming = marker,
                stored = stored.last_update,
                "Ignoring stale upsert"
            );
            let response = UpsertResponse {
                key,
                outcome: WriteOutcome::Ignored,
            };
            return Ok((StatusCode::OK, Json(response)));
        }
    }

    let already_imported = existing.as_ref().is_some_and(|r| r.imported);
    let mut record = StoredRecord {
        body: body.body,
        last_update: marker,
        provenance,
        model_card: (!body.model_card.is_empty()).then_some(body.model_card),
        imported: already_imported,
    };
    state
        .storage
        .put(&key, record.clone())
        .await
        .map_err(to_api_error)?;

    if !already_imported {
        match state.notifier.imported(&key).await {
            Ok(()) => {
                record.imported = true;
                if let Err(e) = state.storage.put(&key, record).await {
                    warn!(key = %key, error = %e, "Failed to mark record as imported");
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Import notification failed, retrying on next write");
            }
        }
    }

    let (status, outcome) = if existing.is_some() {
        (StatusCode::OK, WriteOutcome::Updated)
    } else {
        (StatusCode::CREATED, WriteOutcome::Created)
    };
    debug!(key = %key, provenance = provenance.as_str(), ?outcome, "Record stored");
    Ok((status, Json(UpsertResponse { key, outcome })))
}

async fn current_key_set(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(raw) = query.key.as_deref() else {
        return Err((
            StatusCode::BAD_REQUEST,
            "need a 'key' parameter".to_string(),
        ));
    };
    let keep: BTreeSet<ImportKey> = parse_key_set(raw)
        .map_err(to_api_error)?
        .into_iter()
        .collect();

    let _guard = state.write_lock.lock().await;
    let stored = state.storage.list_keys().await.map_err(to_api_error)?;

    let mut removed = Vec::new();
    for key in stored.into_iter().filter(|k| !keep.contains(k)) {
        if !state.storage.remove(&key).await.map_err(to_api_error)? {
            continue;
        }
        if let Err(e) = state.notifier.removed(&key).await {
            warn!(key = %key, error = %e, "Removal notification failed");
        }
        removed.push(key);
    }

    if !removed.is_empty() {
        info!(
            removed = removed.len(),
            kept = keep.len(),
            "Pruned records outside the current key set"
        );
    }
    Ok(Json(KeySetResponse { removed }))
}

async fn list(State(state): State<Arc<StorageState>>) -> Result<impl IntoResponse, ApiError> {
    let keys = state.storage.list_keys().await.map_err(to_api_error)?;
    Ok(Json(DiscoverResponse {
        keys: keys.into_iter().map(String::from).collect(),
    }))
}

async fn stored_record(state: &StorageState, key: &ImportKey) -> Result<StoredRecord, ApiError> {
    state
        .storage
        .get(key)
        .await
        .map_err(to_api_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no record for key '{key}'")))
}

async fn fetch(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = required_key(&query)?;
    let record = stored_record(&state, &key).await?;
    Ok(([(header::CONTENT_TYPE, record.content_type())], record.body))
}

async fn model_card(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = required_key(&query)?;
    let card = stored_record(&state, &key)
        .await?
        .model_card
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no model card for key '{key}'")))?;
    Ok(([(header::CONTENT_TYPE, "text/markdown")], card))
}

async fn remove(
    State(state): State<Arc<StorageState>>,
    Query(query): Query<KeyQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = required_key(&query)?;

    let _guard = state.write_lock.lock().await;
    if !state.storage.remove(&key).await.map_err(to_api_error)? {
        return Err((StatusCode::NOT_FOUND, format!("no record for key '{key}'")));
    }
    if let Err(e) = state.notifier.removed(&key).await {
        warn!(key = %key, error = %e, "Removal notification failed");
    }
    info!(key = %key, "Record removed");
    Ok(StatusCode::OK)
}
