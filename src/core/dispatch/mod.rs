//! Delivery of call results to short-lived consumers.
//!
//! A [`Dispatcher`] runs calls on the background runtime and hops every
//! completion onto the [`MainContext`] before touching its consumer. Once the
//! consumer detaches, pending results are dropped without a trace.

pub mod binding;
pub mod disposable;
pub mod main_context;
pub mod tasks;

pub use binding::{BindingToken, ConsumerBinding};
pub use disposable::Disposable;
pub use main_context::MainContext;
pub use tasks::TaskRunner;

use crate::core::errors::{ApiError, HttpError};
use crate::core::traits::{ConsumerView, Envelope};
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Default bound on concurrently running calls per dispatcher
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Receives the outcome of one call, on the foreground thread.
///
/// At most one of `on_success` / `on_error` is invoked, and neither is
/// invoked once the consumer has detached.
pub trait ApiCallback<V: ?Sized, T>: Send + 'static {
    fn on_subscribe(&mut self, _view: &V, _disposable: &Disposable) {}

    fn on_success(&mut self, view: &V, data: T);

    fn on_error(&mut self, view: &V, error: ApiError);
}

/// Closure pair adapted to [`ApiCallback`]
pub struct FnCallback<S, E, V: ?Sized, T> {
    success: S,
    error: E,
    _marker: PhantomData<fn(&V, T)>,
}

pub fn callback<V, T, S, E>(on_success: S, on_error: E) -> FnCallback<S, E, V, T>
where
    V: ?Sized,
    S: FnMut(&V, T) + Send + 'static,
    E: FnMut(&V, ApiError) + Send + 'static,
{
    FnCallback {
        success: on_success,
        error: on_error,
        _marker: PhantomData,
    }
}

impl<V, T, S, E> ApiCallback<V, T> for FnCallback<S, E, V, T>
where
    V: ?Sized + 'static,
    T: 'static,
    S: FnMut(&V, T) + Send + 'static,
    E: FnMut(&V, ApiError) + Send + 'static,
{
    fn on_success(&mut self, view: &V, data: T) {
        (self.success)(view, data);
    }

    fn on_error(&mut self, view: &V, error: ApiError) {
        (self.error)(view, error);
    }
}

/// Dispatcher-wide hook that sees every error first.
///
/// Returning `true` consumes the error and the callback never sees it. The
/// hook also runs for calls whose consumer detached or was dropped.
pub trait ErrorInterceptor: Send + Sync {
    fn intercept_error(&self, error: &ApiError) -> bool;
}

impl<F> ErrorInterceptor for F
where
    F: Fn(&ApiError) -> bool + Send + Sync,
{
    fn intercept_error(&self, error: &ApiError) -> bool {
        self(error)
    }
}

/// Removes a call from the binding when its task ends or is aborted
struct Registration<V: ?Sized> {
    binding: Arc<ConsumerBinding<V>>,
    key: u64,
}

impl<V: ?Sized> Drop for Registration<V> {
    fn drop(&mut self) {
        self.binding.release(self.key);
    }
}

/// Runs calls for one consumer and delivers their outcome to it
pub struct Dispatcher<V: ?Sized> {
    binding: Arc<ConsumerBinding<V>>,
    main: MainContext,
    runtime: Handle,
    permits: Arc<Semaphore>,
    error_interceptor: Option<Arc<dyn ErrorInterceptor>>,
}

impl<V: ConsumerView + ?Sized> Dispatcher<V> {
    pub fn new(main: MainContext, runtime: Handle) -> Self {
        Self {
            binding: Arc::new(ConsumerBinding::new()),
            main,
            runtime,
            permits: Arc::new(Semaphore::new(DEFAULT_MAX_IN_FLIGHT)),
            error_interceptor: None,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
        self
    }

    pub fn with_error_interceptor(mut self, interceptor: impl ErrorInterceptor + 'static) -> Self {
        self.error_interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn attach(&self, view: &Arc<V>) -> BindingToken {
        self.binding.attach(view)
    }

    /// Stop all deliveries to the current consumer. Idempotent.
    pub fn detach(&self) {
        self.binding.detach();
    }

    pub fn binding(&self) -> &ConsumerBinding<V> {
        &self.binding
    }

    pub fn main_context(&self) -> &MainContext {
        &self.main
    }

    /// Calls started and not yet finished
    pub fn in_flight(&self) -> usize {
        self.binding.in_flight()
    }

    /// Run `call` and deliver its unwrapped result to `callback`.
    ///
    /// Returns `None` without running anything when no consumer is attached.
    pub fn send<R, Fut, C>(&self, call: Fut, callback: C) -> Option<Disposable>
    where
        R: Envelope,
        Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
        C: ApiCallback<V, R::Data>,
    {
        self.dispatch(call, None, callback)
    }

    /// Like [`Dispatcher::send`], with the consumer's loading indicator shown
    /// while the call runs
    pub fn send_with_loading<R, Fut, C>(
        &self,
        call: Fut,
        message: impl Into<String>,
        callback: C,
    ) -> Option<Disposable>
    where
        R: Envelope,
        Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
        C: ApiCallback<V, R::Data>,
    {
        self.dispatch(call, Some(message.into()), callback)
    }

    fn dispatch<R, Fut, C>(
        &self,
        call: Fut,
        loading: Option<String>,
        callback: C,
    ) -> Option<Disposable>
    where
        R: Envelope,
        Fut: Future<Output = Result<R, HttpError>> + Send + 'static,
        C: ApiCallback<V, R::Data>,
    {
        let Some(token) = self.binding.token() else {
            debug!("no consumer attached, call dropped");
            return None;
        };
        let disposable = Disposable::new();
        let key = self.binding.register(token, disposable.clone())?;
        let registration = Registration {
            binding: Arc::clone(&self.binding),
            key,
        };
        let slot = Arc::new(Mutex::new(Some(callback)));
        let shows_loading = loading.is_some();

        // Queued before the task starts, so it always runs ahead of delivery
        {
            let binding = Arc::clone(&self.binding);
            let slot = Arc::clone(&slot);
            let disposable = disposable.clone();
            self.main.post(move || {
                if disposable.is_disposed() {
                    return;
                }
                let Some(view) = binding.view_for(token) else {
                    return;
                };
                if let Some(message) = &loading {
                    view.show_loading(message);
                }
                if let Some(callback) = slot.lock().as_mut() {
                    callback.on_subscribe(&view, &disposable);
                }
            });
        }

        let binding = Arc::clone(&self.binding);
        let main = self.main.clone();
        let permits = Arc::clone(&self.permits);
        let interceptor = self.error_interceptor.clone();
        let delivery = disposable.clone();

        let task = self.runtime.spawn(async move {
            let _registration = registration;
            // The semaphore is never closed
            let _permit = permits.acquire_owned().await.ok();

            let outcome = match call.await {
                Ok(envelope) => envelope.into_base().into_result(),
                Err(e) => Err(ApiError::from(&e)),
            };

            main.post(move || {
                // The hook sees errors even when no consumer is left to receive them
                let consumed = match &outcome {
                    Ok(_) => false,
                    Err(error) => {
                        warn!(code = error.code(), error = %error, "request failed");
                        interceptor
                            .as_ref()
                            .is_some_and(|hook| hook.intercept_error(error))
                    }
                };
                if delivery.is_disposed() {
                    return;
                }
                let Some(view) = binding.view_for(token) else {
                    return;
                };
                let Some(mut callback) = slot.lock().take() else {
                    return;
                };
                if shows_loading {
                    view.hide_loading();
                }
                match outcome {
                    Ok(data) => callback.on_success(&view, data),
                    Err(_) if consumed => {}
                    Err(error) => callback.on_error(&view, error),
                }
            });
        });
        disposable.attach_task(task.abort_handle());

        Some(disposable)
    }
}

impl<V: ?Sized> Drop for Dispatcher<V> {
    fn drop(&mut self) {
        self.binding.detach();
    }
}
