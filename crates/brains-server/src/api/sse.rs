//! `GET /brains/runs/:id/watch`: a `text/event-stream` view onto a run's
//! live broadcast feed (§4.6). History first, then the live tail — there is
//! a small unavoidable race between the two reads, which reconnecting
//! clients are expected to paper over by replaying from their last seen
//! event, the same tolerance §6.3 asks of every log consumer.

use std::convert::Infallible;
use std::time::Duration;

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use brains_types::Event;
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::BroadcastStream;

fn to_sse_event(event: &Event) -> SseEvent {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    SseEvent::default().event(event.event_type()).data(json)
}

/// Chain a run's already-read history with its live receiver into one
/// infallible event stream. Lagged broadcast receivers (a slow subscriber
/// falling behind) are dropped rather than surfaced as stream errors,
/// per §4.6.
fn event_stream(
    history: Vec<Event>,
    live: tokio::sync::broadcast::Receiver<Event>,
) -> impl Stream<Item = SseEvent> {
    let replay = futures::stream::iter(history);
    let tail = BroadcastStream::new(live).filter_map(|item| async move { item.ok() });
    replay.chain(tail).map(|event| to_sse_event(&event))
}

pub fn watch_stream(
    history: Vec<Event>,
    live: tokio::sync::broadcast::Receiver<Event>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let events = event_stream(history, live).map(Ok);
    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn replayed_history_comes_out_before_the_live_tail() {
        let history = vec![Event::Start {
            run_id: "r1".into(),
            options: json!({}),
            initial_state: json!({}),
            ts: Utc::now(),
        }];
        let (tx, rx) = tokio::sync::broadcast::channel(4);
        let complete = Event::Complete { run_id: "r1".into(), options: json!({}), final_state: json!({}), ts: Utc::now() };
        tx.send(complete).unwrap();

        let collected: Vec<_> = event_stream(history, rx).take(2).collect().await;
        assert_eq!(collected.len(), 2);
    }
}
