use once_cell::sync::OnceCell;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

type Job = Box<dyn FnOnce() + Send + 'static>;

static SHARED: OnceCell<MainContext> = OnceCell::new();

/// Single foreground thread that runs posted jobs in FIFO order.
///
/// Everything that touches a consumer runs here. The thread stops once every
/// handle to the context is dropped.
#[derive(Clone)]
pub struct MainContext {
    inner: Arc<Inner>,
}

struct Inner {
    sender: mpsc::UnboundedSender<Job>,
    thread_id: ThreadId,
}

impl std::fmt::Debug for MainContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainContext")
            .field("thread_id", &self.inner.thread_id)
            .finish()
    }
}

impl MainContext {
    /// Spawn a new foreground thread named `name`
    pub fn start(name: &str) -> io::Result<Self> {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Some(job) = receiver.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("foreground job panicked");
                    }
                }
                debug!("foreground context stopped");
            })?;

        Ok(Self {
            inner: Arc::new(Inner {
                sender,
                thread_id: handle.thread().id(),
            }),
        })
    }

    /// Process-wide context, started on first use
    pub fn shared() -> io::Result<Self> {
        SHARED
            .get_or_try_init(|| Self::start("lanbase-main"))
            .map(Clone::clone)
    }

    /// Queue `job`; returns `false` if the thread is gone
    pub fn post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.inner.sender.send(Box::new(job)).is_ok()
    }

    /// Run `job` now when already on the foreground thread, otherwise queue it
    pub fn run_or_post(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.is_current() {
            job();
            true
        } else {
            self.post(job)
        }
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Wait until every job queued before this call has run
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.post(move || {
            let _ = done.send(());
        }) {
            let _ = wait.await;
        }
    }
}
