//! Basic usage: track three simulated jobs that finish at different times.
//!
//! Run with `BATCH_POLLER_LOG_MODE=debug` to watch every backoff decision.

use batch_poller::logging::init_logging_from_env;
use batch_poller::{BatchPoller, FetchError, FnListener, PollEvent, PollerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging_from_env()?;

    let started = Instant::now();
    let finish_times = [("build", 3u64), ("test", 7), ("deploy", 20)];

    // Pretend backend: a job reports "running" until its finish time passes.
    let fetcher = move || async move {
        let elapsed = started.elapsed();
        let events: Vec<PollEvent<String, String>> = finish_times
            .iter()
            .map(|(job, done_after)| {
                let state = if elapsed >= Duration::from_secs(*done_after) {
                    "done"
                } else {
                    "running"
                };
                PollEvent::new(job.to_string(), state.to_string())
            })
            .collect();
        Ok::<_, FetchError>(events)
    };

    let config = PollerConfig::fast()
        .with_name("jobs")
        .with_jitter(Duration::from_millis(200));
    let poller = BatchPoller::new(config, fetcher)?;

    let (done_tx, mut done_rx) = tokio::sync::mpsc::unbounded_channel();
    for (job, _) in finish_times {
        let done_tx = done_tx.clone();
        poller.add_listener(Arc::new(FnListener::new(
            job.to_string(),
            |state: &String| state == "running",
            move |state: String| {
                let _ = done_tx.send((job, state, started.elapsed()));
            },
        )));
    }
    drop(done_tx);

    while let Some((job, state, at)) = done_rx.recv().await {
        println!("{job}: {state} after {at:?}");
    }

    println!("{}", poller.stats());
    Ok(())
}
