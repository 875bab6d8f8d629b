use crate::bug;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

pub const DEFAULT_WORKERS: usize = 4;

/// Runs every task on the runtime with at most `workers` of them in flight,
/// returning results in completion order. A task that panics is logged and
/// left out; its siblings are unaffected.
pub async fn run_all<T, F, I>(label: &str, workers: usize, tasks: I) -> Vec<T>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let sema = Arc::new(Semaphore::new(workers.max(1)));
    let mut futs = tasks
        .into_iter()
        .map(|task| {
            let sema = sema.clone();
            tokio::spawn(async move {
                let _perm = sema.acquire_owned().await;
                task.await
            })
        })
        .collect::<FuturesUnordered<_>>();

    let n = futs.len();
    let mut r = Vec::with_capacity(n);
    while let Some(res) = futs.next().await {
        match res {
            Ok(v) => r.push(v),
            Err(e) => bug!("{}: uncaught task failure: {}", label, e),
        }
    }
    debug!("{label}: {}/{} tasks finished", r.len(), n);
    r
}
