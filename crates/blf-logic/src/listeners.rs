//! Explicit subscriber lists
//!
//! Callbacks run on the notifying thread after the list lock has been
//! released, so a callback may subscribe, unsubscribe or notify again.

use std::sync::{Arc, Mutex, PoisonError, Weak};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

struct ListenerList<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// A list of change callbacks
pub struct Listeners<T> {
    inner: Arc<Mutex<ListenerList<T>>>,
}

impl<T> Listeners<T>
where
    T: Copy + 'static,
{
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ListenerList {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a callback; it stays registered until the returned
    /// [`Subscription`] is dropped
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let id = {
            let mut list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            let id = list.next_id;
            list.next_id += 1;
            list.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<ListenerList<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut list = inner.lock().unwrap_or_else(PoisonError::into_inner);
                    list.entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Invoke every registered callback with `value`
    pub fn notify(&self, value: T) {
        let callbacks: Vec<Callback<T>> = {
            let list = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            list.entries.iter().map(|(_, cb)| Arc::clone(cb)).collect()
        };
        for callback in callbacks {
            callback(value);
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Listeners<T>
where
    T: Copy + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for Listeners<T>
where
    T: Copy + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("count", &self.len())
            .finish()
    }
}

/// Handle keeping a callback registered
///
/// Dropping it removes the callback. A worker that restarts simply drops its
/// old subscriptions along with the rest of its connection state.
#[must_use = "the callback is removed when the subscription is dropped"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}
