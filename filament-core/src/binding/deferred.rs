//! Next-turn scheduling.
//!
//! Work that must not run inside the call that produced it (loading a clone
//! while its siblings are still being cloned) is handed to [`DeferredLoads`].
//! Inside a tokio runtime it is spawned; outside one it is queued until
//! [`DeferredLoads::settle`] drives it. Finished spawned work is reaped on
//! every later `spawn`, so nothing accumulates in a long-running app.

use std::future::Future;

use futures_util::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::{JoinError, JoinSet};

#[derive(Default)]
pub struct DeferredLoads {
    queued: Mutex<Vec<BoxFuture<'static, ()>>>,
    spawned: Mutex<JoinSet<()>>,
}

impl DeferredLoads {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match Handle::try_current() {
            Ok(handle) => {
                let mut spawned = self.spawned.lock();
                reap(&mut spawned);
                spawned.spawn_on(work, &handle);
            }
            Err(_) => self.queued.lock().push(work.boxed()),
        }
    }

    /// Work scheduled and not finished yet.
    pub fn pending(&self) -> usize {
        let spawned = {
            let mut spawned = self.spawned.lock();
            reap(&mut spawned);
            spawned.len()
        };
        self.queued.lock().len() + spawned
    }

    /// Drive everything scheduled so far, including work scheduled while
    /// settling, to completion.
    pub async fn settle(&self) {
        loop {
            let queued = std::mem::take(&mut *self.queued.lock());
            let mut spawned = std::mem::take(&mut *self.spawned.lock());
            if queued.is_empty() && spawned.is_empty() {
                return;
            }
            for work in queued {
                work.await;
            }
            while let Some(result) = spawned.join_next().await {
                report(result);
            }
        }
    }
}

fn reap(spawned: &mut JoinSet<()>) {
    while let Some(result) = spawned.try_join_next() {
        report(result);
    }
}

fn report(result: Result<(), JoinError>) {
    if let Err(err) = result {
        tracing::error!(error = %err, "deferred load aborted");
    }
}

impl std::fmt::Debug for DeferredLoads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredLoads")
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn queues_without_a_runtime() {
        let deferred = DeferredLoads::new();
        let ran = Arc::new(AtomicUsize::new(0));
        let r = ran.clone();
        deferred.spawn(async move {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(deferred.pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 0);

        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(deferred.settle());
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(deferred.pending(), 0);
    }

    #[tokio::test]
    async fn settle_waits_for_nested_work() {
        let deferred = Arc::new(DeferredLoads::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let (d, r) = (deferred.clone(), ran.clone());
        deferred.spawn(async move {
            r.fetch_add(1, Ordering::SeqCst);
            let inner = r.clone();
            d.spawn(async move {
                inner.fetch_add(1, Ordering::SeqCst);
            });
        });

        deferred.settle().await;
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn finished_work_is_not_retained() {
        let deferred = DeferredLoads::new();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..500 {
            let r = ran.clone();
            deferred.spawn(async move {
                r.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(deferred.pending(), 500);

        while ran.load(Ordering::SeqCst) < 500 {
            tokio::task::yield_now().await;
        }
        assert_eq!(deferred.pending(), 0);
    }
}
