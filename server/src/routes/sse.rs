use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::Sse;
use axum::response::sse::{Event, KeepAlive};
use bytes::Bytes;
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::config::SSE_KEEPALIVE_SECS;
use crate::state::AppState;

pub async fn territory_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        // Subscribe before the snapshot so no change falls between the two.
        let rx = state.event_tx.subscribe();
        let mut stream = BroadcastStream::new(rx);

        let mut last_seq = 0;
        if let Some((seq, payload)) = snapshot_payload(&state).await {
            last_seq = seq;
            yield Ok(Event::default().id(seq.to_string()).event("snapshot").data(payload));
        }

        while let Some(result) = stream.next().await {
            match result {
                Ok(event) => {
                    if event.seq <= last_seq {
                        continue;
                    }
                    let Some(payload) = event_payload(event.json.as_ref()) else {
                        warn!(
                            seq = event.seq,
                            event = event.kind,
                            "event payload is not valid utf-8; dropping SSE event"
                        );
                        continue;
                    };
                    last_seq = event.seq;
                    yield Ok(
                        Event::default()
                            .id(event.seq.to_string())
                            .event(event.kind)
                            .data(payload),
                    );
                }
                Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "SSE client lagged behind broadcast buffer; replaying snapshot"
                    );
                    if let Some((seq, payload)) = snapshot_payload(&state).await {
                        last_seq = seq;
                        yield Ok(Event::default().id(seq.to_string()).event("snapshot").data(payload));
                    }
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(SSE_KEEPALIVE_SECS))
            .text("keep-alive"),
    )
}

/// Full table at a consistent sequence number.
async fn snapshot_payload(state: &AppState) -> Option<(u64, String)> {
    let event = {
        let _guard = state.write_lock.lock().await;
        state.snapshot_event()
    };
    match serde_json::to_string(&event) {
        Ok(json) => Some((event.seq(), json)),
        Err(e) => {
            warn!(error = %e, "failed to serialize SSE snapshot");
            None
        }
    }
}

fn event_payload(bytes: &Bytes) -> Option<&str> {
    std::str::from_utf8(bytes.as_ref()).ok()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::routes::api::tests::{grove_json, spawn_test_server};
    use crate::state::AppState;

    async fn read_until(response: &mut reqwest::Response, buffer: &mut String, needle: &str) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !buffer.contains(needle) {
                let chunk = response
                    .chunk()
                    .await
                    .expect("read sse chunk")
                    .expect("sse stream ended early");
                buffer.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("timed out waiting for sse event");
    }

    #[tokio::test]
    async fn stream_starts_with_snapshot_then_forwards_changes() {
        let state = AppState::with_webhook(None, None);
        let (addr, server_handle) = spawn_test_server(state).await;
        let base_url = format!("http://{addr}");
        let client = reqwest::Client::new();

        let mut events = client
            .get(format!("{base_url}/api/events"))
            .send()
            .await
            .expect("sse request")
            .error_for_status()
            .expect("sse status");
        let mut buffer = String::new();
        read_until(&mut events, &mut buffer, "\"type\":\"snapshot\"").await;
        read_until(&mut events, &mut buffer, "\"territories\":[]").await;

        client
            .post(format!("{base_url}/api/territories"))
            .json(&grove_json())
            .send()
            .await
            .expect("create request")
            .error_for_status()
            .expect("create status");
        read_until(&mut events, &mut buffer, "\"type\":\"upsert\"").await;
        read_until(&mut events, &mut buffer, "\"id\":\"custom-1\"").await;

        client
            .delete(format!("{base_url}/api/territories/custom-1"))
            .send()
            .await
            .expect("delete request")
            .error_for_status()
            .expect("delete status");
        read_until(&mut events, &mut buffer, "\"type\":\"delete\"").await;
        assert!(buffer.contains("\"seq\":2"));

        server_handle.abort();
        let _ = server_handle.await;
    }
}
