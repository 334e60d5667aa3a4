//! Keyed publish/subscribe registry.
//!
//! Subscriptions are stored as `(event name, subscriber id, callback)` in a
//! single list. Dispatch walks the list in registration order, so subscribers
//! to the same event always fire in the order they were added.
//!
//! ## Core Operations
//!
//! | Operation        | Effect                                             |
//! |------------------|----------------------------------------------------|
//! | `set_event`      | register, or replace the `(name, id)` callback     |
//! | `dispatch_event` | call every callback registered for `name`          |
//! | `get_event`      | event names a subscriber id is registered for      |
//! | `delete_event`   | drop every registration of a subscriber id         |
//!
//! Callbacks receive the dispatched argument by reference. They run on the
//! dispatching thread and must not reach back into the bus that calls them.

use std::fmt;

use uuid::Uuid;

/// Subscriber callback.
pub type EventCallback<A> = Box<dyn FnMut(&A) + Send>;

struct Subscription<A> {
    event: String,
    id: String,
    callback: EventCallback<A>,
}

/// Typed observer list keyed by event name and subscriber id.
///
/// # Example
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use kvfacade::events::EventBus;
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
///
/// let mut bus: EventBus<String> = EventBus::new();
/// bus.set_event("set", move |key: &String| sink.lock().unwrap().push(key.clone()), None);
///
/// assert_eq!(bus.dispatch_event("set", &"alpha".to_string()), 1);
/// assert_eq!(bus.dispatch_event("delete", &"alpha".to_string()), 0);
/// assert_eq!(*seen.lock().unwrap(), vec!["alpha".to_string()]);
/// ```
pub struct EventBus<A> {
    subscriptions: Vec<Subscription<A>>,
}

impl<A> EventBus<A> {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Registers `callback` for `event` and returns the subscriber id.
    ///
    /// A fresh UUID is generated when `id` is `None`. Registering the same
    /// `(event, id)` pair again replaces the callback in place.
    pub fn set_event<C>(&mut self, event: &str, callback: C, id: Option<&str>) -> String
    where
        C: FnMut(&A) + Send + 'static,
    {
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let callback: EventCallback<A> = Box::new(callback);

        match self
            .subscriptions
            .iter_mut()
            .find(|sub| sub.event == event && sub.id == id)
        {
            Some(existing) => existing.callback = callback,
            None => self.subscriptions.push(Subscription {
                event: event.to_string(),
                id: id.clone(),
                callback,
            }),
        }
        id
    }

    /// Calls every callback registered for `event`. Returns how many ran.
    pub fn dispatch_event(&mut self, event: &str, arg: &A) -> usize {
        let mut fired = 0;
        for sub in self.subscriptions.iter_mut().filter(|sub| sub.event == event) {
            (sub.callback)(arg);
            fired += 1;
        }
        if fired > 0 {
            tracing::trace!(event, fired, "dispatched event");
        }
        fired
    }

    /// Event names `id` is subscribed to, in registration order.
    pub fn get_event(&self, id: &str) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|sub| sub.id == id)
            .map(|sub| sub.event.clone())
            .collect()
    }

    /// Removes every registration of `id`. Returns how many were removed.
    pub fn delete_event(&mut self, id: &str) -> usize {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|sub| sub.id != id);
        before - self.subscriptions.len()
    }

    /// Registered `(event, id)` pairs, in registration order.
    pub fn events(&self) -> Vec<(String, String)> {
        self.subscriptions
            .iter()
            .map(|sub| (sub.event.clone(), sub.id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    pub fn clear(&mut self) {
        self.subscriptions.clear();
    }
}

impl<A> Default for EventBus<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for EventBus<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriptions", &self.events())
            .finish()
    }
}
