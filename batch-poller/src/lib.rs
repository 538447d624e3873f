//! # batch-poller
//!
//! An adaptive batch-polling scheduler for tracking a set of pending items.
//!
//! Instead of one polling timer per item, a [`BatchPoller`] keeps a registry of
//! [`Listener`]s keyed by item, fires a single shared timer, fetches the state of
//! every outstanding item in one [`BatchFetch`] call, and notifies each listener
//! exactly once when its item stops being pending. The delay between fetches
//! doubles while the backend keeps reporting items as busy, and honours an
//! explicit `retry_after` when the backend knows better.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use batch_poller::{BatchPoller, FnListener, PollEvent, PollerConfig};
//!
//! let poller = BatchPoller::new(PollerConfig::default(), || async {
//!     Ok(vec![PollEvent::new("job-1".to_string(), "done".to_string())])
//! })?;
//!
//! poller.add_listener(Arc::new(FnListener::new(
//!     "job-1".to_string(),
//!     |state: &String| state != "done",
//!     |state: String| println!("job-1 finished: {state}"),
//! )));
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod fetch;
pub mod listener;
pub mod logging;
pub mod registry;
pub mod scheduler;
pub mod stats;
pub mod types;

pub use backoff::{Backoff, CycleOutcome};
pub use config::PollerConfig;
pub use error::{BoxError, FetchError, PollerError, PollerResult};
pub use fetch::BatchFetch;
pub use listener::{FnListener, Listener, SharedListener};
pub use registry::ListenerRegistry;
pub use scheduler::{BatchPoller, Phase};
pub use stats::PollerStats;
pub use types::{PollEvent, PollKey};
