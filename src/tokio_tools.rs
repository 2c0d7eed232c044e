//! Task spawning helpers that tag every engine task with a named span.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::Instrument;

/// Spawns an async task (batch items) inside an `engine_task` span named `name`.
pub fn spawn_named_task<F, S>(name: S, future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
    S: Into<String>,
{
    let span = tracing::info_span!("engine_task", task_name = %name.into());
    tokio::spawn(future.instrument(span))
}

/// Runs CPU-bound work (key generation, proving, verification) on the blocking pool.
pub fn spawn_named_blocking<F, R, S>(name: S, work: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
    S: Into<String>,
{
    let span = tracing::debug_span!("engine_task", task_name = %name.into(), blocking = true);
    tokio::task::spawn_blocking(move || span.in_scope(work))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn named_tasks_return_their_output() {
        let async_out = spawn_named_task("sum", async { 2 + 2 }).await.unwrap();
        let blocking_out = spawn_named_blocking("product", || 6 * 7).await.unwrap();
        assert_eq!((async_out, blocking_out), (4, 42));
    }
}
