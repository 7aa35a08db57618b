use crate::core::dispatch::disposable::Disposable;
use crate::core::dispatch::main_context::MainContext;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::warn;

/// Background work with results and ticks delivered on the foreground thread.
///
/// Every scheduled job returns a [`Disposable`]; disposing it aborts the
/// background side and suppresses any delivery still queued.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    runtime: Handle,
    main: MainContext,
}

impl TaskRunner {
    pub fn new(runtime: Handle, main: MainContext) -> Self {
        Self { runtime, main }
    }

    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    /// Run blocking `work` in the background and hand its result to `on_done`
    /// on the foreground thread
    pub fn do_task<T, W, D>(&self, work: W, on_done: D) -> Disposable
    where
        T: Send + 'static,
        W: FnOnce() -> anyhow::Result<T> + Send + 'static,
        D: FnOnce(anyhow::Result<T>) + Send + 'static,
    {
        let disposable = Disposable::new();
        let main = self.main.clone();
        let guard = disposable.clone();

        let task = self.runtime.spawn(async move {
            let result = match tokio::task::spawn_blocking(work).await {
                Ok(result) => result,
                Err(e) => Err(anyhow::anyhow!("background task failed: {}", e)),
            };
            main.post(move || {
                if !guard.is_disposed() {
                    on_done(result);
                }
            });
        });
        disposable.attach_task(task.abort_handle());
        disposable
    }

    /// Fire-and-forget blocking work
    pub fn run<W>(&self, work: W) -> Disposable
    where
        W: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        self.do_task(work, |result| {
            if let Err(e) = result {
                warn!(error = %e, "background work failed");
            }
        })
    }

    /// Run `job` on the foreground thread, immediately when already there
    pub fn run_on_main(&self, job: impl FnOnce() + Send + 'static) -> bool {
        self.main.run_or_post(job)
    }

    /// Run `job` on the foreground thread after `delay`
    pub fn timer<F>(&self, delay: Duration, job: F) -> Disposable
    where
        F: FnOnce() + Send + 'static,
    {
        let disposable = Disposable::new();
        let main = self.main.clone();
        let guard = disposable.clone();

        let task = self.runtime.spawn(async move {
            time::sleep(delay).await;
            main.post(move || {
                if !guard.is_disposed() {
                    job();
                }
            });
        });
        disposable.attach_task(task.abort_handle());
        disposable
    }

    /// Tick `on_tick(n)` every `period`, starting at `n = 0`, until disposed
    pub fn interval<F>(&self, period: Duration, on_tick: F) -> Disposable
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.ticks(0, None, period, period, on_tick)
    }

    /// Tick `count` times with values `start..start + count`
    pub fn interval_range<F>(
        &self,
        start: u64,
        count: u64,
        initial_delay: Duration,
        period: Duration,
        on_tick: F,
    ) -> Disposable
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.ticks(start, Some(count), initial_delay, period, on_tick)
    }

    /// Count down once per second: `on_tick` receives `seconds`, `seconds - 1`, .. `0`
    pub fn count_down<F>(&self, seconds: u64, mut on_tick: F) -> Disposable
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.ticks(
            0,
            Some(seconds + 1),
            Duration::ZERO,
            Duration::from_secs(1),
            move |elapsed| on_tick(seconds - elapsed),
        )
    }

    fn ticks<F>(
        &self,
        start: u64,
        count: Option<u64>,
        initial_delay: Duration,
        period: Duration,
        on_tick: F,
    ) -> Disposable
    where
        F: FnMut(u64) + Send + 'static,
    {
        let disposable = Disposable::new();
        let main = self.main.clone();
        let guard = disposable.clone();
        let on_tick = Arc::new(Mutex::new(on_tick));
        let period = period.max(Duration::from_millis(1));

        let task = self.runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let mut emitted = 0u64;
            while count.map_or(true, |count| emitted < count) {
                ticker.tick().await;
                let value = start + emitted;
                let on_tick = Arc::clone(&on_tick);
                let guard = guard.clone();
                let posted = main.post(move || {
                    if !guard.is_disposed() {
                        let mut tick = on_tick.lock();
                        (*tick)(value);
                    }
                });
                if !posted {
                    return;
                }
                emitted += 1;
            }
        });
        disposable.attach_task(task.abort_handle());
        disposable
    }
}
