//! Named FIFO message queues over a [`BoundedCache`].
//!
//! ## Layout
//!
//! ```text
//!   _MessageQueue:<name>          { "head": h, "tail": t }   pinned
//!   _MessageQueue:<name>:<h>      oldest message
//!   ...
//!   _MessageQueue:<name>:<t - 1>  newest message
//! ```
//!
//! Queue names are base64url encoded so they can never collide with the key
//! separator or glob characters. Messages are plain cache entries: under
//! memory pressure the oldest are evicted, leaving holes between `head` and
//! `tail` that `pop` and `peek` skip.
//!
//! ## Events
//!
//! Listeners subscribe per queue to a [`QueueEvent`]. `Pushed` and `Popped`
//! receive the message; `Empty` and `Cleared` receive `null`.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::cache::{BoundedCache, EvictionPolicy};
use crate::events::EventBus;

const QUEUE_ROOT: &str = "_MessageQueue";
const EVENT_ROOT: &str = "MQE";

/// Queue lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueEvent {
    Pushed,
    Popped,
    /// The last message was popped.
    Empty,
    Cleared,
}

impl QueueEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueEvent::Pushed => "pushed",
            QueueEvent::Popped => "popped",
            QueueEvent::Empty => "empty",
            QueueEvent::Cleared => "cleared",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Cursor {
    head: u64,
    tail: u64,
}

/// Set of named FIFO queues sharing one byte budget.
///
/// # Example
///
/// ```
/// use kvfacade::cache::EvictionPolicy;
/// use kvfacade::queue::MessageQueue;
/// use serde_json::json;
///
/// let mut queue = MessageQueue::new(0, EvictionPolicy::Fifo);
/// queue.push("jobs", json!({"id": 1}));
/// queue.push("jobs", json!({"id": 2}));
///
/// assert_eq!(queue.queue_size("jobs"), 2);
/// assert_eq!(queue.pop("jobs"), Some(json!({"id": 1})));
/// assert_eq!(queue.peek("jobs"), Some(json!({"id": 2})));
/// ```
pub struct MessageQueue {
    store: BoundedCache<Value>,
    listeners: EventBus<Value>,
}

impl MessageQueue {
    pub fn new(max_bytes: usize, policy: EvictionPolicy) -> Self {
        Self::with_cache(BoundedCache::new(max_bytes, policy))
    }

    pub fn with_cache(store: BoundedCache<Value>) -> Self {
        Self {
            store,
            listeners: EventBus::new(),
        }
    }

    /// Appends `message` and returns the key it is stored under.
    pub fn push(&mut self, queue: &str, message: Value) -> String {
        let mut cursor = self.cursor(queue);
        let key = message_key(queue, cursor.tail);
        self.store.set(key.clone(), message.clone());
        cursor.tail += 1;
        self.save_cursor(queue, cursor);

        self.notify(queue, QueueEvent::Pushed, &message);
        key
    }

    /// Removes and returns the oldest surviving message.
    pub fn pop(&mut self, queue: &str) -> Option<Value> {
        let mut cursor = self.skip_holes(queue);
        if cursor.head >= cursor.tail {
            return None;
        }

        let message = self.store.delete(&message_key(queue, cursor.head)).ok()?;
        cursor.head += 1;
        self.save_cursor(queue, cursor);

        self.notify(queue, QueueEvent::Popped, &message);
        if cursor.head >= cursor.tail {
            self.notify(queue, QueueEvent::Empty, &Value::Null);
        }
        Some(message)
    }

    /// Returns the oldest surviving message without removing it.
    pub fn peek(&mut self, queue: &str) -> Option<Value> {
        let cursor = self.skip_holes(queue);
        if cursor.head >= cursor.tail {
            return None;
        }
        self.store.peek(&message_key(queue, cursor.head)).cloned()
    }

    /// Slots between head and tail, including evicted ones not yet skipped.
    pub fn queue_size(&self, queue: &str) -> u64 {
        let cursor = self.cursor(queue);
        cursor.tail.saturating_sub(cursor.head)
    }

    /// Drops every message and the cursor of `queue`.
    pub fn clear(&mut self, queue: &str) {
        let prefix = format!("{}:", cursor_key(queue));
        for key in self.store.keys(&format!("{prefix}*")) {
            let _ = self.store.delete(&key);
        }

        let meta = cursor_key(queue);
        self.store.unpin(&meta);
        let _ = self.store.delete(&meta);

        self.notify(queue, QueueEvent::Cleared, &Value::Null);
    }

    /// Subscribes `callback` to `event` on `queue`. Returns the listener id.
    pub fn add_listener<C>(
        &mut self,
        queue: &str,
        event: QueueEvent,
        callback: C,
        id: Option<&str>,
    ) -> String
    where
        C: FnMut(&Value) + Send + 'static,
    {
        self.listeners.set_event(&event_name(queue, event), callback, id)
    }

    /// Removes every subscription of `id`. Returns how many were removed.
    pub fn remove_listener(&mut self, id: &str) -> usize {
        self.listeners.delete_event(id)
    }

    pub fn bytes_used(&self) -> usize {
        self.store.bytes_used()
    }

    fn cursor(&self, queue: &str) -> Cursor {
        let Some(meta) = self.store.peek(&cursor_key(queue)) else {
            return Cursor::default();
        };
        Cursor {
            head: meta.get("head").and_then(Value::as_u64).unwrap_or(0),
            tail: meta.get("tail").and_then(Value::as_u64).unwrap_or(0),
        }
    }

    fn save_cursor(&mut self, queue: &str, cursor: Cursor) {
        let key = cursor_key(queue);
        self.store.pin(key.clone());
        self.store
            .set(key, json!({ "head": cursor.head, "tail": cursor.tail }));
    }

    fn skip_holes(&mut self, queue: &str) -> Cursor {
        let mut cursor = self.cursor(queue);
        let start = cursor.head;
        while cursor.head < cursor.tail && !self.store.contains(&message_key(queue, cursor.head)) {
            cursor.head += 1;
        }
        if cursor.head != start {
            tracing::trace!(queue, skipped = cursor.head - start, "skipped evicted messages");
            self.save_cursor(queue, cursor);
        }
        cursor
    }

    fn notify(&mut self, queue: &str, event: QueueEvent, message: &Value) {
        self.listeners.dispatch_event(&event_name(queue, event), message);
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("store", &self.store)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn encode_name(queue: &str) -> String {
    URL_SAFE_NO_PAD.encode(queue.as_bytes())
}

fn cursor_key(queue: &str) -> String {
    format!("{QUEUE_ROOT}:{}", encode_name(queue))
}

fn message_key(queue: &str, index: u64) -> String {
    format!("{QUEUE_ROOT}:{}:{index}", encode_name(queue))
}

fn event_name(queue: &str, event: QueueEvent) -> String {
    format!("{EVENT_ROOT}:{}:{}", encode_name(queue), event.as_str())
}
