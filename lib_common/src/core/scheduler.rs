//! # Source Scheduler
//!
//! A self-scheduling refresh loop, one tokio task per source.
//!
//! - **Self-Scheduling**: each pass calls `refresh`, then asks `next_delay`
//!   how long to sleep. The delay is re-evaluated every pass.
//! - **Failure Isolation**: a failed refresh is logged and the previous
//!   state is kept; the loop carries on at the normal cadence.
//! - **Cancellation**: the sleep races the shared `CancellationToken`, so a
//!   cancelled source stops within one pending wait.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// # Run Source
///
/// Drives one source until `cancel` fires.
///
/// ## Workflow:
/// 1.  Await `refresh()`.
/// 2.  `Ok(true)` invokes `on_change`; `Ok(false)` does nothing; `Err` is logged.
/// 3.  Sleep for `next_delay()` unless cancelled first.
pub async fn run_source<R, Fut, E, D, C>(
    name: &str,
    mut refresh: R,
    next_delay: D,
    on_change: C,
    cancel: CancellationToken,
) where
    R: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: Display,
    D: Fn() -> Duration,
    C: Fn(),
{
    log::info!("{} source started", name);
    loop {
        // --- Phase 1: Refresh, unless shutting down ---
        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = refresh() => result,
        };

        // --- Phase 2: Report ---
        match result {
            Ok(true) => {
                log::debug!("{} changed", name);
                on_change();
            }
            Ok(false) => {}
            Err(e) => log::warn!("{} refresh failed: {}", name, e),
        }

        // --- Phase 3: Wait for the next pass ---
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(next_delay()) => {}
        }
    }
    log::info!("{} source stopped", name);
}

/// Spawns [`run_source`] on the runtime.
pub fn spawn_source<R, Fut, E, D, C>(
    name: &'static str,
    refresh: R,
    next_delay: D,
    on_change: C,
    cancel: CancellationToken,
) -> JoinHandle<()>
where
    R: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<bool, E>> + Send + 'static,
    E: Display + Send + 'static,
    D: Fn() -> Duration + Send + 'static,
    C: Fn() + Send + 'static,
{
    tokio::spawn(run_source(name, refresh, next_delay, on_change, cancel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn errors_do_not_stop_the_loop_and_changes_notify() {
        let calls = Arc::new(AtomicUsize::new(0));
        let changes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let c = Arc::clone(&calls);
        let n = Arc::clone(&changes);
        let handle = tokio::spawn(run_source(
            "test",
            move || {
                let pass = c.fetch_add(1, Ordering::SeqCst);
                async move {
                    match pass % 3 {
                        0 => Err("boom"),
                        1 => Ok(true),
                        _ => Ok(false),
                    }
                }
            },
            || Duration::from_secs(10),
            move || {
                n.fetch_add(1, Ordering::SeqCst);
            },
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(25)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_long_wait() {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_source(
            "idle",
            || async { Ok::<bool, String>(false) },
            || Duration::from_secs(3600),
            || {},
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_sources_own_their_futures() {
        let changes = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        let shared = Arc::new(AtomicUsize::new(0));

        let n = Arc::clone(&changes);
        let handle = spawn_source(
            "spawned",
            move || {
                let shared = Arc::clone(&shared);
                async move { Ok::<bool, String>(shared.fetch_add(1, Ordering::SeqCst) == 0) }
            },
            || Duration::from_secs(5),
            move || {
                n.fetch_add(1, Ordering::SeqCst);
            },
            cancel.clone(),
        );

        tokio::time::sleep(Duration::from_secs(12)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }
}
