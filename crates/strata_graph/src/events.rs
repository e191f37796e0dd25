// SPDX-License-Identifier: MIT OR Apache-2.0
//! Notifications emitted by the graph for external observers.

use crate::link::Link;
use crate::node::NodeId;
use std::fmt;

/// Structural or parameter change of a graph
#[derive(Debug, Clone, PartialEq)]
pub enum GraphChange {
    /// Node inserted
    NodeAdded(NodeId),
    /// Node removed together with its links
    NodeRemoved(NodeId),
    /// Link created
    LinkAdded(Link),
    /// Link removed
    LinkRemoved(Link),
    /// Attribute value changed
    AttributeChanged {
        /// Owning node
        node_id: NodeId,
        /// Attribute key
        key: String,
    },
    /// Engine configuration replaced
    ConfigChanged,
    /// Every node removed
    Cleared,
}

/// Event delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum GraphEvent {
    /// A node's compute function is about to run
    ComputeStarted(NodeId),
    /// A node's compute function returned
    ComputeFinished {
        /// Computed node
        node_id: NodeId,
        /// Whether the outputs were written
        success: bool,
    },
    /// An update pass begins
    UpdateStarted,
    /// A node of the current pass was handled
    UpdateProgress {
        /// Last handled node
        node_id: NodeId,
        /// Percentage of the pass done
        progress: f32,
    },
    /// The update pass ended
    UpdateFinished,
    /// Graph structure or parameters changed
    GraphChanged(GraphChange),
}

/// Event delivered by a [`GraphManager`](crate::manager::GraphManager)
#[derive(Debug, Clone, PartialEq)]
pub enum ManagerEvent {
    /// Graph appended to the order
    GraphAdded(String),
    /// Graph removed
    GraphRemoved(String),
    /// A broadcast tag became available to later graphs
    BroadcastTagAdded(String),
    /// A broadcast tag is no longer published
    BroadcastTagRemoved(String),
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback<E> = Box<dyn FnMut(&E)>;

/// Synchronous fan-out of events to callbacks
pub struct EventBus<E = GraphEvent> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<E>)>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
        }
    }
}

impl<E> EventBus<E> {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn subscribe(&mut self, callback: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    /// Remove a callback; returns `false` if it was not registered
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    /// Deliver an event to every subscriber, in subscription order
    pub fn emit(&mut self, event: E) {
        for (_, callback) in &mut self.subscribers {
            callback(&event);
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no callback is registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl<E> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_subscribe_and_unsubscribe() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let sink = Rc::clone(&seen);
        let id = bus.subscribe(move |e: &GraphEvent| sink.borrow_mut().push(e.clone()));
        bus.emit(GraphEvent::UpdateStarted);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(GraphEvent::UpdateFinished);

        assert_eq!(*seen.borrow(), vec![GraphEvent::UpdateStarted]);
        assert!(bus.is_empty());
    }
}
