use crate::core::dispatch::disposable::Disposable;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Identifies one attachment of a consumer.
///
/// Every attach and every effective detach starts a new epoch, so a token
/// taken before a detach never matches again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingToken {
    epoch: u64,
}

/// Non-owning link between a dispatcher and the consumer it delivers to
pub struct ConsumerBinding<V: ?Sized> {
    state: Mutex<BindingState<V>>,
}

struct BindingState<V: ?Sized> {
    view: Option<Weak<V>>,
    epoch: u64,
    disposables: HashMap<u64, Disposable>,
    next_key: u64,
}

impl<V: ?Sized> Default for ConsumerBinding<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ?Sized> ConsumerBinding<V> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BindingState {
                view: None,
                epoch: 0,
                disposables: HashMap::new(),
                next_key: 0,
            }),
        }
    }

    /// Bind `view`, cancelling whatever was in flight for a previous consumer
    pub fn attach(&self, view: &Arc<V>) -> BindingToken {
        let mut state = self.state.lock();
        for (_, disposable) in state.disposables.drain() {
            disposable.dispose();
        }
        state.epoch += 1;
        state.view = Some(Arc::downgrade(view));
        BindingToken { epoch: state.epoch }
    }

    /// Drop the consumer and cancel everything in flight. Idempotent.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        if state.view.take().is_some() {
            state.epoch += 1;
        }
        let cancelled = state.disposables.len();
        for (_, disposable) in state.disposables.drain() {
            disposable.dispose();
        }
        if cancelled > 0 {
            trace!(cancelled, "consumer detached");
        }
    }

    /// Whether a live consumer is bound
    pub fn is_attached(&self) -> bool {
        self.state
            .lock()
            .view
            .as_ref()
            .is_some_and(|view| view.strong_count() > 0)
    }

    pub fn view(&self) -> Option<Arc<V>> {
        self.state.lock().view.as_ref()?.upgrade()
    }

    /// Token of the current live attachment
    pub fn token(&self) -> Option<BindingToken> {
        let state = self.state.lock();
        let alive = state
            .view
            .as_ref()
            .is_some_and(|view| view.strong_count() > 0);
        alive.then_some(BindingToken { epoch: state.epoch })
    }

    /// The consumer, only if it is still the one `token` was issued for
    pub fn view_for(&self, token: BindingToken) -> Option<Arc<V>> {
        let state = self.state.lock();
        if state.epoch != token.epoch {
            return None;
        }
        state.view.as_ref()?.upgrade()
    }

    /// Track `disposable` under the attachment `token`.
    ///
    /// Returns `None` and leaves the disposable untracked when the attachment
    /// has already ended.
    pub fn register(&self, token: BindingToken, disposable: Disposable) -> Option<u64> {
        let mut state = self.state.lock();
        if state.epoch != token.epoch || state.view.is_none() {
            return None;
        }
        let key = state.next_key;
        state.next_key += 1;
        state.disposables.insert(key, disposable);
        Some(key)
    }

    pub fn release(&self, key: u64) {
        self.state.lock().disposables.remove(&key);
    }

    /// Number of tracked jobs
    pub fn in_flight(&self) -> usize {
        self.state.lock().disposables.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Screen: Send + Sync {}
    struct Page;
    impl Screen for Page {}

    #[test]
    fn test_attach_detach_cycle() {
        let binding: ConsumerBinding<dyn Screen> = ConsumerBinding::new();
        assert!(binding.token().is_none());

        let page: Arc<dyn Screen> = Arc::new(Page);
        let token = binding.attach(&page);
        assert!(binding.is_attached());
        assert!(binding.view_for(token).is_some());

        let disposable = Disposable::new();
        let key = binding.register(token, disposable.clone()).unwrap();
        assert_eq!(binding.in_flight(), 1);

        binding.detach();
        binding.detach();
        assert!(disposable.is_disposed());
        assert_eq!(binding.in_flight(), 0);
        assert!(binding.view_for(token).is_none());
        assert!(binding.register(token, Disposable::new()).is_none());
        binding.release(key);
    }

    #[test]
    fn test_reattach_invalidates_old_token() {
        let binding: ConsumerBinding<dyn Screen> = ConsumerBinding::new();
        let first: Arc<dyn Screen> = Arc::new(Page);
        let old = binding.attach(&first);
        let pending = Disposable::new();
        binding.register(old, pending.clone()).unwrap();

        let second: Arc<dyn Screen> = Arc::new(Page);
        let new = binding.attach(&second);
        assert_ne!(old, new);
        assert!(pending.is_disposed());
        assert!(binding.view_for(old).is_none());
        assert!(binding.view_for(new).is_some());
    }

    #[test]
    fn test_dropped_consumer_is_not_attached() {
        let binding: ConsumerBinding<dyn Screen> = ConsumerBinding::new();
        let page: Arc<dyn Screen> = Arc::new(Page);
        let token = binding.attach(&page);
        drop(page);
        assert!(!binding.is_attached());
        assert!(binding.token().is_none());
        assert!(binding.view_for(token).is_none());
    }
}
