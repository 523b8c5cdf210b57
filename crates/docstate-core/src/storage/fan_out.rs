//! Bounded fan-out of independent async operations.

use std::future::Future;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;

/// Run `op` over `items` with at most `limit` futures in flight.
///
/// Results come back in completion order. After the first error no new
/// operation is started; operations already in flight are driven to
/// completion and their results discarded. The first error is returned.
pub async fn fan_out<I, F, Fut, T, E>(items: I, limit: usize, mut op: F) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    F: FnMut(I::Item) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut pending = items.into_iter();
    let mut in_flight = FuturesUnordered::new();
    for item in pending.by_ref().take(limit.max(1)) {
        in_flight.push(op(item));
    }

    let mut results = Vec::new();
    let mut first_error = None;
    while let Some(result) = in_flight.next().await {
        match result {
            Ok(value) => results.push(value),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }
        if first_error.is_none() {
            if let Some(item) = pending.next() {
                in_flight.push(op(item));
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(results),
    }
}
