//! Batch prompt semantics: a step that fans an `over(state)` item list out
//! across a concurrency-limited pool, folding the per-item results back into
//! a single ordered `[item, output]` list under a named state key. A step
//! action builds a [`BatchConfig`] and returns it via
//! [`crate::graph::StepOutcome::Batch`]; `stream.rs` is what actually drives
//! it, chunk by chunk, since only the stream has the run's `SignalSource`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::error::{CoreError, Result};
use crate::graph::BoxFuture;

/// What to do with an item whose handler kept failing. Returning `Some` caps
/// the failure with a recorded fallback value instead of failing the whole
/// step; returning `None` propagates the failure.
pub type ErrorHandler =
    Arc<dyn Fn(Value, &CoreError) -> Option<Value> + Send + Sync>;

pub type ItemHandler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Configuration for one batched step, mirroring the `over/concurrency/
/// chunkSize/maxRetries/error` authoring surface.
pub struct BatchConfig {
    pub items: Vec<Value>,
    pub handler: ItemHandler,
    pub concurrency: usize,
    pub chunk_size: usize,
    pub max_retries: u32,
    pub on_error: Option<ErrorHandler>,
    pub key: String,
}

impl BatchConfig {
    pub fn new(key: impl Into<String>, items: Vec<Value>, handler: ItemHandler) -> Self {
        Self {
            items,
            handler,
            concurrency: 10,
            chunk_size: usize::MAX,
            max_retries: 0,
            on_error: None,
            key: key.into(),
        }
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn on_error(mut self, handler: ErrorHandler) -> Self {
        self.on_error = Some(handler);
        self
    }
}

async fn run_item(handler: &ItemHandler, item: Value, max_retries: u32) -> Result<Value> {
    let mut attempt = 0;
    loop {
        match handler(item.clone()).await {
            Ok(value) => return Ok(value),
            Err(_err) if attempt < max_retries => {
                attempt += 1;
                continue;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Run one chunk of items concurrently (bounded by `concurrency`), resolving
/// each failure through `on_error` if one is configured. Exposed separately
/// from [`run_batch`] so `stream.rs` can interleave a `SignalSource` check
/// between chunks instead of running the whole batch in one future.
pub async fn run_chunk(
    chunk: &[Value],
    handler: &ItemHandler,
    concurrency: usize,
    max_retries: u32,
    on_error: Option<&ErrorHandler>,
) -> Result<Vec<Value>> {
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut handles: Vec<Pin<Box<dyn Future<Output = (Value, Result<Value>)> + Send>>> =
        Vec::with_capacity(chunk.len());

    for item in chunk {
        let item = item.clone();
        let semaphore = semaphore.clone();
        let handler = handler.clone();
        handles.push(Box::pin(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
            let outcome = run_item(&handler, item.clone(), max_retries).await;
            (item, outcome)
        }));
    }

    let mut results = Vec::with_capacity(chunk.len());
    let chunk_results = futures::future::join_all(handles).await;
    for (item, outcome) in chunk_results {
        match outcome {
            Ok(output) => results.push(serde_json::json!([item, output])),
            Err(err) => match on_error {
                Some(on_error) => match on_error(item.clone(), &err) {
                    Some(fallback) => results.push(serde_json::json!([item, fallback])),
                    None => return Err(err),
                },
                None => return Err(err),
            },
        }
    }
    Ok(results)
}

/// Run every chunk of the batch to completion and return the ordered
/// `[item, output]` pairs recorded under `config.key`. Used directly by tests
/// and by anything that doesn't need per-chunk signal checks; `stream.rs`
/// instead drives [`run_chunk`] itself so it can consult the run's
/// `SignalSource` at each chunk boundary (§4.5).
pub async fn run_batch(config: &BatchConfig) -> Result<Vec<Value>> {
    let mut results = Vec::with_capacity(config.items.len());
    for chunk in config.items.chunks(config.chunk_size) {
        let mut chunk_results = run_chunk(
            chunk,
            &config.handler,
            config.concurrency,
            config.max_retries,
            config.on_error.as_ref(),
        )
        .await?;
        results.append(&mut chunk_results);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn processes_all_items_in_order() {
        let handler: ItemHandler = Arc::new(|item: Value| {
            Box::pin(async move {
                let n = item.as_i64().unwrap();
                Ok(json!(n * 2))
            })
        });
        let config = BatchConfig::new("doubled", vec![json!(1), json!(2), json!(3)], handler)
            .concurrency(2);

        let results = run_batch(&config).await.unwrap();
        assert_eq!(results, vec![json!([1, 2]), json!([2, 4]), json!([3, 6])]);
    }

    #[tokio::test]
    async fn respects_concurrency_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let in_flight_clone = in_flight.clone();
        let max_seen_clone = max_seen.clone();

        let handler: ItemHandler = Arc::new(move |item: Value| {
            let in_flight = in_flight_clone.clone();
            let max_seen = max_seen_clone.clone();
            Box::pin(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(item)
            })
        });

        let items = (0..20).map(|i| json!(i)).collect();
        let config = BatchConfig::new("echoed", items, handler).concurrency(3);
        run_batch(&config).await.unwrap();

        assert!(max_seen.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn fallback_recovers_failed_items() {
        let handler: ItemHandler = Arc::new(|item: Value| {
            Box::pin(async move {
                if item == json!(2) {
                    Err(CoreError::Validation("boom".into()))
                } else {
                    Ok(item)
                }
            })
        });
        let on_error: ErrorHandler = Arc::new(|_item, _err| Some(json!("fallback")));
        let config = BatchConfig::new("safe", vec![json!(1), json!(2), json!(3)], handler)
            .on_error(on_error);

        let results = run_batch(&config).await.unwrap();
        assert_eq!(
            results,
            vec![json!([1, 1]), json!([2, "fallback"]), json!([3, 3])]
        );
    }

    #[tokio::test]
    async fn no_fallback_fails_the_whole_step() {
        let handler: ItemHandler = Arc::new(|item: Value| {
            Box::pin(async move {
                if item == json!(2) {
                    Err(CoreError::Validation("boom".into()))
                } else {
                    Ok(item)
                }
            })
        });
        let config = BatchConfig::new("unsafe", vec![json!(1), json!(2), json!(3)], handler);

        let err = run_batch(&config).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
