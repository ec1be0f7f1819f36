//! Typed event sinks with drop-deregistered listener handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use electrum_primitives::plain::{PlainBlockHeader, PlainTransaction};

#[derive(Clone, Debug)]
pub enum AgentEvent {
    Block(PlainBlockHeader),
    TransactionAdded(PlainTransaction),
    TransactionMined(PlainTransaction, PlainBlockHeader),
    Syncing,
    Synced,
    Close(String),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum EventKind {
    Block,
    TransactionAdded,
    TransactionMined,
    Syncing,
    Synced,
    Close,
}

impl AgentEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            AgentEvent::Block(_) => EventKind::Block,
            AgentEvent::TransactionAdded(_) => EventKind::TransactionAdded,
            AgentEvent::TransactionMined(_, _) => EventKind::TransactionMined,
            AgentEvent::Syncing => EventKind::Syncing,
            AgentEvent::Synced => EventKind::Synced,
            AgentEvent::Close(_) => EventKind::Close,
        }
    }
}

type ListenerTable = HashMap<EventKind, HashMap<u64, mpsc::UnboundedSender<AgentEvent>>>;

#[derive(Default)]
pub(crate) struct EventBus {
    listeners: Mutex<ListenerTable>,
    next_id: AtomicU64,
}

impl EventBus {
    pub(crate) fn register(
        self: &Arc<Self>,
        kind: EventKind,
    ) -> (EventHandle, mpsc::UnboundedReceiver<AgentEvent>) {
        let (sink, stream) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = self.listeners.lock().expect("event listeners");
            listeners.entry(kind).or_default().insert(id, sink);
        }
        (
            EventHandle {
                kind,
                id,
                bus: Arc::downgrade(self),
            },
            stream,
        )
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        let kind = event.kind();
        let mut dead = Vec::new();
        {
            let listeners = self.listeners.lock().expect("event listeners");
            let Some(sinks) = listeners.get(&kind) else {
                return;
            };
            for (id, sink) in sinks {
                if sink.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut listeners = self.listeners.lock().expect("event listeners");
            if let Some(sinks) = listeners.get_mut(&kind) {
                for id in dead {
                    sinks.remove(&id);
                }
            }
        }
    }

    fn deregister(&self, kind: EventKind, id: u64) {
        let mut listeners = self.listeners.lock().expect("event listeners");
        if let Some(sinks) = listeners.get_mut(&kind) {
            sinks.remove(&id);
        }
    }
}

/// Keeps the listener registered; dropping (or closing) it removes the
/// listener from the table.
pub struct EventHandle {
    kind: EventKind,
    id: u64,
    bus: Weak<EventBus>,
}

impl EventHandle {
    pub fn close(&self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.deregister(self.kind, self.id);
        }
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        self.close();
    }
}
