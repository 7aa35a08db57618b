use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::AbortHandle;

/// Cancellation handle for one background job.
///
/// Disposing is idempotent and aborts the attached task, if any. A task
/// attached after disposal is aborted immediately.
#[derive(Clone, Default)]
pub struct Disposable {
    inner: Arc<DisposableInner>,
}

#[derive(Default)]
struct DisposableInner {
    disposed: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
}

impl std::fmt::Debug for Disposable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposable")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Disposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub fn attach_task(&self, task: AbortHandle) {
        let mut slot = self.inner.task.lock();
        if self.is_disposed() {
            task.abort();
        } else {
            *slot = Some(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_dispose_aborts_task() {
        let disposable = Disposable::new();
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        disposable.attach_task(handle.abort_handle());

        disposable.dispose();
        disposable.dispose();
        assert!(disposable.is_disposed());
        assert!(handle.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_attach_after_dispose_aborts() {
        let disposable = Disposable::new();
        disposable.dispose();
        let handle = tokio::spawn(tokio::time::sleep(Duration::from_secs(60)));
        disposable.attach_task(handle.abort_handle());
        assert!(handle.await.unwrap_err().is_cancelled());
    }
}
