use std::fmt::Write as _;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tracing::{info, warn};
use turfmap_shared::{TerritoryPatch, TerritoryRecord};

use crate::config::MAX_BOXES_PER_TERRITORY;
use crate::persistence;
use crate::services::webhook::{self, ChangeKind, WebhookPayload};
use crate::state::{AppState, ObservabilitySnapshot};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";
const LIST_CACHE_CONTROL: &str = "no-cache";

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let observability = state.observability.snapshot();
    Json(serde_json::json!({
        "status": "ok",
        "territories": state.territories.len(),
        "seq": state.current_seq(),
        "boot_ms": state.boot_ms,
        "persistence_available": state.db.is_some(),
        "webhook_configured": state.webhook_url.is_some(),
        "observability": {
            "list_requests_total": observability.list_requests_total,
            "writes_total": observability.writes_total,
            "rejected_writes_total": observability.rejected_writes_total,
            "persist_failures_total": observability.persist_failures_total,
            "webhook_deliveries_total": observability.webhook_deliveries_total,
            "webhook_failures_total": observability.webhook_failures_total,
        }
    }))
}

/// `select *`: every row ordered by id, revalidated through the change sequence.
pub async fn list_territories(State(state): State<AppState>, headers: HeaderMap) -> Response {
    state.observability.record_list_request();
    let (etag, records) = {
        let _guard = state.write_lock.lock().await;
        (territories_etag(state.boot_ms, state.current_seq()), state.sorted_records())
    };

    if if_none_match_matches(&headers, &etag) {
        return not_modified_response(LIST_CACHE_CONTROL, Some(etag.as_str()));
    }

    match serde_json::to_vec(&records) {
        Ok(body) => json_bytes_response(Bytes::from(body), LIST_CACHE_CONTROL, Some(etag.as_str())),
        Err(e) => {
            warn!(error = %e, "failed to serialize territory list");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_territory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TerritoryRecord>, StatusCode> {
    state
        .territories
        .get(&id)
        .map(|entry| Json(entry.value().clone()))
        .ok_or(StatusCode::NOT_FOUND)
}

pub async fn create_territory(
    State(state): State<AppState>,
    Json(record): Json<TerritoryRecord>,
) -> Result<(StatusCode, Json<TerritoryRecord>), ApiError> {
    check_record(&state, &record)?;

    let _guard = state.write_lock.lock().await;
    if state.territories.contains_key(&record.id) {
        state.observability.record_rejected_write();
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("territory `{}` already exists", record.id),
        ));
    }
    if let Some(pool) = state.db.as_ref() {
        persistence::insert(pool, &record)
            .await
            .map_err(|e| persist_failed(&state, &record.id, e))?;
    }

    state.territories.insert(record.id.clone(), record.clone());
    let seq = state.publish_upsert(record.clone());
    state.observability.record_write();
    webhook::notify(
        &state,
        WebhookPayload::new(ChangeKind::Created, &record.id, Some(&record.name), seq),
    );
    info!(id = %record.id, seq, boxes = record.boxes.len(), "territory created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// `update(partial).eq('id', id)`: merge, validate the merged row, write through.
pub async fn update_territory(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<TerritoryPatch>,
) -> Result<Json<TerritoryRecord>, ApiError> {
    if patch.is_empty() {
        state.observability.record_rejected_write();
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            "patch has no fields",
        ));
    }

    let _guard = state.write_lock.lock().await;
    let Some(mut merged) = state.territories.get(&id).map(|entry| entry.value().clone()) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("territory `{id}` not found"),
        ));
    };
    patch.apply_to(&mut merged);
    check_record(&state, &merged)?;

    if let Some(pool) = state.db.as_ref() {
        let affected = persistence::update(pool, &merged)
            .await
            .map_err(|e| persist_failed(&state, &id, e))?;
        if affected == 0 {
            warn!(id = %id, "cached territory had no database row; re-inserting");
            persistence::insert(pool, &merged)
                .await
                .map_err(|e| persist_failed(&state, &id, e))?;
        }
    }

    state.territories.insert(id.clone(), merged.clone());
    let seq = state.publish_upsert(merged.clone());
    state.observability.record_write();
    webhook::notify(
        &state,
        WebhookPayload::new(ChangeKind::Updated, &id, Some(&merged.name), seq),
    );
    info!(id = %id, seq, boxes = merged.boxes.len(), "territory updated");
    Ok(Json(merged))
}

pub async fn delete_territory(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let _guard = state.write_lock.lock().await;
    let Some(name) = state.territories.get(&id).map(|entry| entry.name.clone()) else {
        return Err(api_error(
            StatusCode::NOT_FOUND,
            format!("territory `{id}` not found"),
        ));
    };
    if let Some(pool) = state.db.as_ref() {
        persistence::delete(pool, &id)
            .await
            .map_err(|e| persist_failed(&state, &id, e))?;
    }

    state.territories.remove(&id);
    let seq = state.publish_delete(id.clone());
    state.observability.record_write();
    webhook::notify(
        &state,
        WebhookPayload::new(ChangeKind::Deleted, &id, Some(&name), seq),
    );
    info!(id = %id, seq, "territory deleted");
    Ok(StatusCode::NO_CONTENT)
}

fn check_record(state: &AppState, record: &TerritoryRecord) -> Result<(), ApiError> {
    let result = record.validate().map_err(|e| e.to_string()).and_then(|()| {
        if record.boxes.len() > MAX_BOXES_PER_TERRITORY {
            Err(format!(
                "record `{}` has more than {MAX_BOXES_PER_TERRITORY} boxes",
                record.id
            ))
        } else {
            Ok(())
        }
    });
    result.map_err(|message| {
        state.observability.record_rejected_write();
        api_error(StatusCode::UNPROCESSABLE_ENTITY, message)
    })
}

fn persist_failed(state: &AppState, id: &str, error: sqlx_core::Error) -> ApiError {
    state.observability.record_persist_failure();
    warn!(error = %error, id = %id, "failed to persist territory change");
    api_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        "failed to persist territory change",
    )
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let territory_count = state.territories.len();
    let box_count: usize = state
        .territories
        .iter()
        .map(|entry| entry.boxes.len())
        .sum();
    let body = render_prometheus_metrics(
        territory_count,
        box_count,
        state.db.is_some(),
        state.current_seq(),
        state.observability.snapshot(),
    );

    (
        [
            (header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-store"),
        ],
        body,
    )
}

fn render_prometheus_metrics(
    territory_count: usize,
    box_count: usize,
    persistence_available: bool,
    seq: u64,
    observability: ObservabilitySnapshot,
) -> String {
    let mut body = String::new();
    let mut metric = |name: &str, kind: &str, help: &str, value: u64| {
        let _ = writeln!(body, "# HELP turfmap_{name} {help}");
        let _ = writeln!(body, "# TYPE turfmap_{name} {kind}");
        let _ = writeln!(body, "turfmap_{name} {value}");
    };

    metric(
        "territories",
        "gauge",
        "Current number of territories.",
        territory_count as u64,
    );
    metric(
        "boxes",
        "gauge",
        "Current number of painted boxes across all territories.",
        box_count as u64,
    );
    metric(
        "persistence_available",
        "gauge",
        "Whether database persistence is configured (1 or 0).",
        u64::from(persistence_available),
    );
    metric(
        "change_seq",
        "gauge",
        "Sequence number of the latest change.",
        seq,
    );
    metric(
        "list_requests_total",
        "counter",
        "Total territory list requests.",
        observability.list_requests_total,
    );
    metric(
        "writes_total",
        "counter",
        "Total applied territory writes.",
        observability.writes_total,
    );
    metric(
        "rejected_writes_total",
        "counter",
        "Total writes rejected as invalid or conflicting.",
        observability.rejected_writes_total,
    );
    metric(
        "persist_failures_total",
        "counter",
        "Total failures while writing to the database.",
        observability.persist_failures_total,
    );
    metric(
        "webhook_deliveries_total",
        "counter",
        "Total webhook notifications delivered.",
        observability.webhook_deliveries_total,
    );
    metric(
        "webhook_failures_total",
        "counter",
        "Total webhook notifications that failed.",
        observability.webhook_failures_total,
    );
    body
}

fn territories_etag(boot_ms: i64, seq: u64) -> String {
    format!("\"territories-{boot_ms}-{seq}\"")
}

fn json_bytes_response(body: Bytes, cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = Response::new(Body::from(body));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn not_modified_response(cache_control: &'static str, etag: Option<&str>) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(cache_control),
    );
    if let Some(etag) = etag
        && let Ok(etag_header) = HeaderValue::from_str(etag)
    {
        headers.insert(header::ETAG, etag_header);
    }
    response
}

fn normalize_etag(candidate: &str) -> &str {
    candidate.strip_prefix("W/").unwrap_or(candidate).trim()
}

fn if_none_match_matches(headers: &HeaderMap, etag: &str) -> bool {
    let Some(value) = headers.get(header::IF_NONE_MATCH) else {
        return false;
    };
    let Ok(raw) = value.to_str() else {
        return false;
    };

    raw.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || normalize_etag(candidate) == normalize_etag(etag)
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::net::SocketAddr;

    use super::{if_none_match_matches, render_prometheus_metrics};
    use crate::state::{AppState, ObservabilitySnapshot};
    use turfmap_shared::TerritoryRecord;

    pub(crate) async fn spawn_test_server(
        state: AppState,
    ) -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let app = crate::app::build_app(state);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve test app");
        });
        (addr, handle)
    }

    pub(crate) fn grove_json() -> serde_json::Value {
        serde_json::json!({
            "id": "custom-1",
            "name": "Grove Street",
            "gang": "Families",
            "color": "#00FF00",
            "boxes": [
                {"bounds": [[0, 0], [10, 10]]},
                {"bounds": [[0, 10], [10, 20]]}
            ]
        })
    }

    #[test]
    fn metrics_output_contains_prometheus_help_type_and_values() {
        let observability = ObservabilitySnapshot {
            list_requests_total: 12,
            writes_total: 3,
            rejected_writes_total: 7,
            persist_failures_total: 1,
            webhook_deliveries_total: 2,
            webhook_failures_total: 4,
        };

        let metrics = render_prometheus_metrics(42, 900, true, 17, observability);

        assert!(metrics.contains("# HELP turfmap_territories"));
        assert!(metrics.contains("# TYPE turfmap_writes_total counter"));
        assert!(metrics.contains("turfmap_territories 42"));
        assert!(metrics.contains("turfmap_boxes 900"));
        assert!(metrics.contains("turfmap_persistence_available 1"));
        assert!(metrics.contains("turfmap_change_seq 17"));
        assert!(metrics.contains("turfmap_list_requests_total 12"));
        assert!(metrics.contains("turfmap_writes_total 3"));
        assert!(metrics.contains("turfmap_rejected_writes_total 7"));
        assert!(metrics.contains("turfmap_persist_failures_total 1"));
        assert!(metrics.contains("turfmap_webhook_deliveries_total 2"));
        assert!(metrics.contains("turfmap_webhook_failures_total 4"));
    }

    #[test]
    fn if_none_match_supports_weak_and_multiple_etags() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(
            axum::http::header::IF_NONE_MATCH,
            axum::http::HeaderValue::from_static("W/\"other\", \"territories-42\""),
        );
        assert!(if_none_match_matches(&headers, "\"territories-42\""));
        assert!(!if_none_match_matches(&headers, "\"territories-43\""));
    }

    #[tokio::test]
    async fn territory_crud_lifecycle() {
        let state = AppState::with_webhook(None, None);
        let (addr, server_handle) = spawn_test_server(state.clone()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{base_url}/api/territories"))
            .json(&grove_json())
            .send()
            .await
            .expect("create request");
        assert_eq!(created.status(), reqwest::StatusCode::CREATED);

        let duplicate = client
            .post(format!("{base_url}/api/territories"))
            .json(&grove_json())
            .send()
            .await
            .expect("duplicate request");
        assert_eq!(duplicate.status(), reqwest::StatusCode::CONFLICT);

        let fetched = client
            .get(format!("{base_url}/api/territories/custom-1"))
            .send()
            .await
            .expect("get request")
            .error_for_status()
            .expect("get status")
            .json::<TerritoryRecord>()
            .await
            .expect("parse record");
        assert_eq!(fetched.gang, "Families");
        assert_eq!(fetched.boxes.len(), 2);

        let patched = client
            .patch(format!("{base_url}/api/territories/custom-1"))
            .json(&serde_json::json!({"color": "#123456"}))
            .send()
            .await
            .expect("patch request")
            .error_for_status()
            .expect("patch status")
            .json::<TerritoryRecord>()
            .await
            .expect("parse patched record");
        assert_eq!(patched.color, "#123456");
        assert_eq!(patched.name, "Grove Street");
        assert_eq!(patched.boxes.len(), 2);

        let bad_patch = client
            .patch(format!("{base_url}/api/territories/custom-1"))
            .json(&serde_json::json!({"boxes": []}))
            .send()
            .await
            .expect("bad patch request");
        assert_eq!(bad_patch.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        let missing_patch = client
            .patch(format!("{base_url}/api/territories/nope"))
            .json(&serde_json::json!({"name": "x"}))
            .send()
            .await
            .expect("missing patch request");
        assert_eq!(missing_patch.status(), reqwest::StatusCode::NOT_FOUND);

        let deleted = client
            .delete(format!("{base_url}/api/territories/custom-1"))
            .send()
            .await
            .expect("delete request");
        assert_eq!(deleted.status(), reqwest::StatusCode::NO_CONTENT);

        let deleted_again = client
            .delete(format!("{base_url}/api/territories/custom-1"))
            .send()
            .await
            .expect("second delete request");
        assert_eq!(deleted_again.status(), reqwest::StatusCode::NOT_FOUND);

        let gone = client
            .get(format!("{base_url}/api/territories/custom-1"))
            .send()
            .await
            .expect("get after delete");
        assert_eq!(gone.status(), reqwest::StatusCode::NOT_FOUND);

        assert_eq!(state.current_seq(), 3);
        let observability = state.observability.snapshot();
        assert_eq!(observability.writes_total, 3);
        assert_eq!(observability.rejected_writes_total, 2);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn empty_or_malformed_records_are_rejected() {
        let state = AppState::with_webhook(None, None);
        let (addr, server_handle) = spawn_test_server(state.clone()).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let mut empty = grove_json();
        empty["boxes"] = serde_json::json!([]);
        let response = client
            .post(format!("{base_url}/api/territories"))
            .json(&empty)
            .send()
            .await
            .expect("empty create request");
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body = response
            .json::<serde_json::Value>()
            .await
            .expect("error body");
        assert!(
            body["error"]
                .as_str()
                .is_some_and(|message| message.contains("no boxes"))
        );

        let mut skewed = grove_json();
        skewed["boxes"] = serde_json::json!([{"bounds": [[0, 0], [10, 5]]}]);
        let response = client
            .post(format!("{base_url}/api/territories"))
            .json(&skewed)
            .send()
            .await
            .expect("skewed create request");
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

        assert!(state.territories.is_empty());
        assert_eq!(state.current_seq(), 0);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn etag_from_a_previous_boot_is_not_revalidated() {
        let record = |id: &str| {
            let mut body = grove_json();
            body["id"] = serde_json::json!(id);
            serde_json::from_value::<TerritoryRecord>(body).expect("record")
        };
        let client = reqwest::Client::new();

        let mut before = AppState::with_webhook(None, None);
        before.boot_ms = 1_000;
        before.seed(vec![record("a")]);
        let (addr, server_handle) = spawn_test_server(before).await;
        let stale_etag = client
            .get(format!("http://{addr}/api/territories"))
            .send()
            .await
            .expect("list request")
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .expect("etag header should be present");
        server_handle.abort();
        let _ = server_handle.await;

        let mut after = AppState::with_webhook(None, None);
        after.boot_ms = 2_000;
        after.seed(vec![record("a"), record("b")]);
        let (addr, server_handle) = spawn_test_server(after).await;
        let response = client
            .get(format!("http://{addr}/api/territories"))
            .header(reqwest::header::IF_NONE_MATCH, stale_etag)
            .send()
            .await
            .expect("conditional list request");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let records = response
            .json::<Vec<TerritoryRecord>>()
            .await
            .expect("parse list");
        assert_eq!(records.len(), 2);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn list_is_ordered_and_revalidates_with_etag() {
        let state = AppState::with_webhook(None, None);
        let boot_ms = state.boot_ms;
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        for id in ["b", "a"] {
            let mut body = grove_json();
            body["id"] = serde_json::json!(id);
            client
                .post(format!("{base_url}/api/territories"))
                .json(&body)
                .send()
                .await
                .expect("create request")
                .error_for_status()
                .expect("create status");
        }

        let first = client
            .get(format!("{base_url}/api/territories"))
            .send()
            .await
            .expect("list request");
        assert_eq!(first.status(), reqwest::StatusCode::OK);
        let first_etag = first
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .expect("etag header should be present");
        assert_eq!(first_etag, format!("\"territories-{boot_ms}-2\""));
        let records = first
            .json::<Vec<TerritoryRecord>>()
            .await
            .expect("parse list");
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let second = client
            .get(format!("{base_url}/api/territories"))
            .header(reqwest::header::IF_NONE_MATCH, first_etag.clone())
            .send()
            .await
            .expect("conditional list request");
        assert_eq!(second.status(), reqwest::StatusCode::NOT_MODIFIED);
        assert_eq!(
            second
                .headers()
                .get(reqwest::header::CACHE_CONTROL)
                .and_then(|value| value.to_str().ok()),
            Some("no-cache")
        );

        client
            .delete(format!("{base_url}/api/territories/a"))
            .send()
            .await
            .expect("delete request")
            .error_for_status()
            .expect("delete status");
        let third = client
            .get(format!("{base_url}/api/territories"))
            .header(reqwest::header::IF_NONE_MATCH, first_etag)
            .send()
            .await
            .expect("list after change");
        assert_eq!(third.status(), reqwest::StatusCode::OK);

        server_handle.abort();
        let _ = server_handle.await;
    }

    #[tokio::test]
    async fn health_and_metrics_expose_expected_contract() {
        let state = AppState::with_webhook(None, None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        client
            .get(format!("{base_url}/api/territories"))
            .send()
            .await
            .expect("list request")
            .error_for_status()
            .expect("list status");

        let health = client
            .get(format!("{base_url}/api/health"))
            .send()
            .await
            .expect("health request")
            .error_for_status()
            .expect("health status")
            .json::<serde_json::Value>()
            .await
            .expect("parse health");

        assert_eq!(health.get("status").and_then(|v| v.as_str()), Some("ok"));
        assert_eq!(
            health
                .get("persistence_available")
                .and_then(|v| v.as_bool()),
            Some(false)
        );
        assert_eq!(
            health
                .get("observability")
                .and_then(|v| v.get("list_requests_total"))
                .and_then(|v| v.as_u64()),
            Some(1)
        );

        let metrics = client
            .get(format!("{base_url}/api/metrics"))
            .send()
            .await
            .expect("metrics request")
            .error_for_status()
            .expect("metrics status")
            .text()
            .await
            .expect("parse metrics text");

        assert!(metrics.contains("# TYPE turfmap_list_requests_total counter"));
        assert!(metrics.contains("# TYPE turfmap_persistence_available gauge"));
        assert!(metrics.contains("turfmap_list_requests_total 1"));
        assert!(metrics.contains("turfmap_persistence_available 0"));
        assert!(metrics.contains("turfmap_territories 0"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
