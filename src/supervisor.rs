use std::future::Future;

/// Run the task built by `factory`, building and spawning a fresh one each
/// time the previous run panics. Returns once a run finishes normally or is
/// cancelled.
pub async fn supervise<F, Fut>(name: &str, mut factory: F) -> u32
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut restarts = 0;
    loop {
        match tokio::spawn(factory()).await {
            Ok(()) => return restarts,
            Err(e) if e.is_panic() => {
                restarts += 1;
                tracing::error!(task = name, restarts, "task panicked, restarting");
            }
            Err(e) => {
                tracing::debug!(task = name, "task cancelled: {}", e);
                return restarts;
            }
        }
    }
}
