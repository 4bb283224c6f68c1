//! Runtime abstraction for the async work the engine hands off
//!
//! The engine thread is synchronous; fetches and decodes run on an async
//! runtime behind [`AsyncSpawner`] and report back through channels.

use crate::prelude::{Arc, Future};

pub type BoxFuture = futures::future::BoxFuture<'static, ()>;

/// A trait for spawning async tasks (object-safe version)
pub trait AsyncSpawner: Send + Sync + 'static {
    fn spawn_boxed(&self, future: BoxFuture) -> Box<dyn AsyncHandle>;
}

/// Handle to a spawned async task
pub trait AsyncHandle: Send + Sync {
    fn is_finished(&self) -> bool;

    fn cancel(&self);
}

/// Spawns onto a specific tokio runtime, usable from threads outside it
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
}

impl TokioSpawner {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime of the calling context, if there is one
    pub fn current() -> Option<Self> {
        tokio::runtime::Handle::try_current().ok().map(Self::new)
    }
}

impl AsyncSpawner for TokioSpawner {
    fn spawn_boxed(&self, future: BoxFuture) -> Box<dyn AsyncHandle> {
        Box::new(TokioHandle(self.handle.spawn(future)))
    }
}

struct TokioHandle(tokio::task::JoinHandle<()>);

impl AsyncHandle for TokioHandle {
    fn is_finished(&self) -> bool {
        self.0.is_finished()
    }

    fn cancel(&self) {
        self.0.abort();
    }
}

/// Convenience wrapper for spawning any future through a shared spawner
pub fn spawn<F>(spawner: &Arc<dyn AsyncSpawner>, future: F) -> Box<dyn AsyncHandle>
where
    F: Future<Output = ()> + Send + 'static,
{
    spawner.spawn_boxed(Box::pin(future))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_tokio_spawner() {
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::current().unwrap());
        let handle = spawn(&spawner, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        assert!(!handle.is_finished());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(handle.is_finished());
    }

    #[test]
    fn test_spawn_from_plain_thread() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let spawner: Arc<dyn AsyncSpawner> = Arc::new(TokioSpawner::new(rt.handle().clone()));
        let (tx, rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            spawn(&spawner, async move {
                let _ = tx.send(7);
            });
        })
        .join()
        .unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), 7);
        assert!(TokioSpawner::current().is_none());
    }
}
