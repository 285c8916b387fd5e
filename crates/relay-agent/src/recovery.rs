//! Panic isolation for fire-and-forget tasks.
//!
//! Every asynchronously dispatched business effect runs under this
//! boundary: an unrecovered panic is logged, counted under a scene label,
//! and never reaches the spawning context or the process.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::error;

use crate::observability::AgentMetrics;

/// Spawns `fut` under the recovery boundary.
pub fn spawn_guarded<F>(scene: &'static str, metrics: Arc<AgentMetrics>, fut: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
            error!(
                scene,
                panic = panic_message(payload.as_ref()),
                "recovered panic in background task"
            );
            metrics.panic_total.with_label_values(&[scene]).inc();
        }
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[tokio::test]
    async fn panic_is_caught_and_counted() {
        let exposition = Registry::new();
        let metrics = Arc::new(AgentMetrics::register(&exposition).unwrap());

        let handle = spawn_guarded("test_scene", Arc::clone(&metrics), async {
            panic!("boom");
        });
        handle.await.unwrap();

        assert_eq!(
            metrics.panic_total.with_label_values(&["test_scene"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn normal_completion_counts_nothing() {
        let exposition = Registry::new();
        let metrics = Arc::new(AgentMetrics::register(&exposition).unwrap());

        spawn_guarded("test_scene", Arc::clone(&metrics), async {})
            .await
            .unwrap();

        assert_eq!(
            metrics.panic_total.with_label_values(&["test_scene"]).get(),
            0
        );
    }
}
