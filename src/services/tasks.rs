use std::future::Future;

/// Runs a side effect that must never fail the request that triggered it.
/// Errors are logged and dropped; the caller does not wait for completion.
pub fn spawn_best_effort<F>(task: &'static str, fut: F)
where
    F: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            tracing::warn!(task, error = %e, "best-effort task failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_failure_is_swallowed_and_success_runs() {
        spawn_best_effort("failing", async { anyhow::bail!("boom") });

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let (tx, rx) = tokio::sync::oneshot::channel();
        spawn_best_effort("succeeding", async move {
            flag.store(true, Ordering::SeqCst);
            let _ = tx.send(());
            Ok(())
        });
        rx.await.unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
