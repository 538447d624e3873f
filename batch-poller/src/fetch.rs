//! The batch-fetch seam
//!
//! A fetcher returns the current state of every outstanding item in one call.
//! It is never told which keys the poller tracks; matching happens on the
//! poller side once the whole batch has arrived.

use async_trait::async_trait;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::error::FetchError;
use crate::types::PollEvent;

/// Source of batch status updates
#[async_trait]
pub trait BatchFetch<K, M>: Send + Sync {
    /// Fetch the current state of all outstanding items
    async fn fetch(&self) -> Result<Vec<PollEvent<K, M>>, FetchError>;
}

#[async_trait]
impl<K, M, F, Fut> BatchFetch<K, M> for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<Vec<PollEvent<K, M>>, FetchError>> + Send + 'static,
    K: Send + 'static,
    M: Send + 'static,
{
    async fn fetch(&self) -> Result<Vec<PollEvent<K, M>>, FetchError> {
        (self)().await
    }
}

/// Run one fetch, turning a panic inside the fetcher into a `FetchError`
pub(crate) async fn fetch_guarded<K, M>(
    fetcher: &dyn BatchFetch<K, M>,
) -> Result<Vec<PollEvent<K, M>>, FetchError> {
    match AssertUnwindSafe(fetcher.fetch()).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(FetchError::Panicked(panic_message(panic.as_ref()))),
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticFetcher(Vec<PollEvent<u32, String>>);

    #[async_trait]
    impl BatchFetch<u32, String> for StaticFetcher {
        async fn fetch(&self) -> Result<Vec<PollEvent<u32, String>>, FetchError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_struct_fetcher() {
        let fetcher = StaticFetcher(vec![PollEvent::new(1, "steady".to_string())]);
        let events = fetch_guarded::<u32, String>(&fetcher).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_closure_fetcher() {
        let fetcher =
            || async { Ok::<_, FetchError>(vec![PollEvent::new(2u32, "pending".to_string())]) };
        let events = fetch_guarded::<u32, String>(&fetcher).await.unwrap();
        assert_eq!(events[0].key, 2);
    }

    #[tokio::test]
    async fn test_closure_fetcher_error() {
        let fetcher = || async {
            Err::<Vec<PollEvent<u32, String>>, _>(FetchError::Transport("503".to_string()))
        };
        let err = fetch_guarded::<u32, String>(&fetcher).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[tokio::test]
    async fn test_panicking_fetcher_is_caught() {
        let fetcher = || async {
            if true {
                panic!("backend exploded");
            }
            Ok::<Vec<PollEvent<u32, String>>, FetchError>(Vec::new())
        };

        match fetch_guarded::<u32, String>(&fetcher).await {
            Err(FetchError::Panicked(message)) => assert_eq!(message, "backend exploded"),
            other => panic!("Expected Panicked, got {other:?}"),
        }
    }
}
