//! Core types shared by the registry and the scheduler.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

/// Requirements for a key identifying a tracked item.
///
/// Keys are ordered so that one reconciliation pass visits listeners in a
/// deterministic order.
pub trait PollKey: Ord + Clone + Debug + Send + Sync + 'static {}

impl<T> PollKey for T where T: Ord + Clone + Debug + Send + Sync + 'static {}

/// One record returned by a batch fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollEvent<K, M> {
    /// Key of the item this record describes
    pub key: K,

    /// Opaque payload handed to the matching listener
    pub model: M,

    /// Minimum wait before the next cycle, when the backend knows its own ETA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl<K, M> PollEvent<K, M> {
    /// Create an event without a retry hint
    pub fn new(key: K, model: M) -> Self {
        Self {
            key,
            model,
            retry_after: None,
        }
    }

    /// Attach a `retry_after` hint to this event
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = PollEvent::new("k", 1u8);
        assert_eq!(event.retry_after, None);

        let event = event.with_retry_after(Duration::from_secs(3));
        assert_eq!(event.retry_after, Some(Duration::from_secs(3)));
        assert_eq!(event.key, "k");
        assert_eq!(event.model, 1);
    }

    #[test]
    fn test_event_deserializes_without_retry_after() {
        let events: Vec<PollEvent<String, String>> =
            serde_json::from_str(r#"[{"key":"a","model":"pending"},{"key":"b","model":"steady","retry_after":{"secs":2,"nanos":0}}]"#)
                .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].retry_after, None);
        assert_eq!(events[1].retry_after, Some(Duration::from_secs(2)));
    }
}
