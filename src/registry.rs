//! Topic subscription bookkeeping.
//!
//! Subscriptions are a client-side durable intent: the transport forgets
//! them on every disconnect, so the registry replays them each time the
//! connection is re-established. [`SubscriptionRegistry::replay`] only
//! yields topics without an active subscription, which keeps
//! re-subscription idempotent — a topic is never subscribed twice on the
//! same transport, so no event is delivered in duplicate.

use std::collections::{BTreeMap, BTreeSet};

use crate::protocol::InboundEvent;

/// Handler invoked for each event delivered on a registered topic.
pub type TopicHandler = Box<dyn FnMut(InboundEvent) + Send>;

/// Maps logical topic names to handler callbacks and tracks which topics
/// hold an active subscription on the current transport.
#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: BTreeMap<String, TopicHandler>,
    active: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a topic → handler mapping. The subscription itself is issued
    /// by the caller via [`replay`](Self::replay) once connected.
    ///
    /// Registering a topic again replaces its handler.
    pub fn register(&mut self, topic: impl Into<String>, handler: TopicHandler) {
        self.handlers.insert(topic.into(), handler);
    }

    /// Remove a topic mapping. Returns `true` if the topic held an active
    /// subscription the caller should now tear down on the wire.
    pub fn unregister(&mut self, topic: &str) -> bool {
        self.handlers.remove(topic);
        self.active.remove(topic)
    }

    /// Topics that are registered but not yet subscribed on the current
    /// transport. Marks them active; call once per `connected` transition
    /// (and after late registrations) and send one subscribe frame per
    /// returned topic.
    pub fn replay(&mut self) -> Vec<String> {
        let mut due = Vec::new();
        for topic in self.handlers.keys() {
            if self.active.insert(topic.clone()) {
                due.push(topic.clone());
            }
        }
        due
    }

    /// Forget all active subscriptions. Call on every disconnect; the next
    /// [`replay`](Self::replay) re-issues everything.
    pub fn mark_disconnected(&mut self) {
        self.active.clear();
    }

    /// Invoke the handler registered for `topic`. Returns `false` if the
    /// topic is unknown (the event is dropped).
    pub fn dispatch(&mut self, topic: &str, event: InboundEvent) -> bool {
        match self.handlers.get_mut(topic) {
            Some(handler) => {
                handler(event);
                true
            }
            None => false,
        }
    }

    pub fn is_registered(&self, topic: &str) -> bool {
        self.handlers.contains_key(topic)
    }

    pub fn is_active(&self, topic: &str) -> bool {
        self.active.contains(topic)
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("topics", &self.handlers.keys().collect::<Vec<_>>())
            .field("active", &self.active)
            .finish()
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_handler(counter: &Arc<AtomicUsize>) -> TopicHandler {
        let counter = Arc::clone(counter);
        Box::new(move |_event| {
            counter.fetch_add(1, Ordering::Relaxed);
        })
    }

    #[test]
    fn replay_returns_each_registered_topic_once() {
        let mut registry = SubscriptionRegistry::new();
        registry.register("a", Box::new(|_| {}));
        registry.register("b", Box::new(|_| {}));

        assert_eq!(registry.replay(), vec!["a".to_string(), "b".to_string()]);
        // Already active — nothing due.
        assert!(registry.replay().is_empty());
    }

    #[test]
    fn disconnect_then_reconnect_replays_exactly_once_per_topic() {
        let mut registry = SubscriptionRegistry::new();
        registry.register("a", Box::new(|_| {}));
        registry.register("b", Box::new(|_| {}));
        let _ = registry.replay();

        registry.mark_disconnected();
        let due = registry.replay();
        assert_eq!(due.len(), 2);
        assert!(registry.replay().is_empty());
    }

    #[test]
    fn late_registration_becomes_due_on_next_replay() {
        let mut registry = SubscriptionRegistry::new();
        registry.register("a", Box::new(|_| {}));
        let _ = registry.replay();

        registry.register("b", Box::new(|_| {}));
        assert_eq!(registry.replay(), vec!["b".to_string()]);
    }

    #[test]
    fn dispatch_routes_to_the_registered_handler() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut registry = SubscriptionRegistry::new();
        registry.register("a", counting_handler(&counter));

        assert!(registry.dispatch("a", InboundEvent::Pong));
        assert!(registry.dispatch("a", InboundEvent::Pong));
        assert!(!registry.dispatch("missing", InboundEvent::Pong));
        assert_eq!(counter.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn unregister_reports_whether_a_wire_teardown_is_needed() {
        let mut registry = SubscriptionRegistry::new();
        registry.register("a", Box::new(|_| {}));

        // Not yet subscribed on the wire.
        assert!(!registry.unregister("a"));

        registry.register("a", Box::new(|_| {}));
        let _ = registry.replay();
        assert!(registry.unregister("a"));
        assert!(!registry.is_registered("a"));
    }
}
