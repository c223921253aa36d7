//! Event dispatcher: fans decoded events out to registered listeners.
//!
//! Listeners are invoked synchronously on the publishing thread, against a
//! snapshot of the registry taken when the publish starts. A listener that
//! returns an error or panics is logged and skipped; the others still run.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::message::{BallUpdate, Message, RectangleUpdate};

/// A decoded event delivered to listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkEvent {
    Text(String),
    Ball(BallUpdate),
    Rectangle(RectangleUpdate),
}

impl NetworkEvent {
    /// Map a message to the event it publishes. Heartbeats publish nothing.
    pub fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Heartbeat => None,
            Message::Text(text) => Some(Self::Text(text)),
            Message::Ball(ball) => Some(Self::Ball(ball)),
            Message::Rectangle(rect) => Some(Self::Rectangle(rect)),
        }
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Ball(_) => "ball_update",
            Self::Rectangle(_) => "rectangle_update",
        }
    }
}

/// Receives network events. Every callback defaults to a no-op.
///
/// Callbacks run on the receive task; keep them short.
pub trait NetworkEventHandler: Send + Sync {
    /// A text message arrived.
    fn on_text(&self, _text: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// A remote peer updated a ball.
    fn on_ball_update(&self, _ball: &BallUpdate) -> anyhow::Result<()> {
        Ok(())
    }

    /// A remote peer updated a rectangle.
    fn on_rectangle_update(&self, _rect: &RectangleUpdate) -> anyhow::Result<()> {
        Ok(())
    }

    /// Route an event to the matching callback.
    fn handle(&self, event: &NetworkEvent) -> anyhow::Result<()> {
        match event {
            NetworkEvent::Text(text) => self.on_text(text),
            NetworkEvent::Ball(ball) => self.on_ball_update(ball),
            NetworkEvent::Rectangle(rect) => self.on_rectangle_update(rect),
        }
    }
}

/// Adapts a closure taking every event into a [`NetworkEventHandler`].
pub struct FnHandler<F>(pub F);

impl<F> FnHandler<F>
where
    F: Fn(&NetworkEvent) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> NetworkEventHandler for FnHandler<F>
where
    F: Fn(&NetworkEvent) -> anyhow::Result<()> + Send + Sync,
{
    fn handle(&self, event: &NetworkEvent) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Handle for one registration, unique for the lifetime of its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Outcome of one [`EventDispatcher::publish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Listeners that returned `Ok`.
    pub delivered: usize,
    /// Listeners that returned an error or panicked.
    pub failed: usize,
}

struct Listener {
    id: ListenerId,
    handler: Arc<dyn NetworkEventHandler>,
}

impl Listener {
    /// Same allocation. Only meaningful while the registry holds `handler`.
    fn is(&self, handler: &Arc<dyn NetworkEventHandler>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.handler), Arc::as_ptr(handler))
    }
}

/// Thread-safe listener registry with snapshot publishing.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: RwLock<Vec<Listener>>,
    next_id: AtomicU64,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Registering the same `Arc` again is a no-op.
    pub fn subscribe(&self, handler: Arc<dyn NetworkEventHandler>) -> ListenerId {
        let mut listeners = self.listeners.write();
        if let Some(existing) = listeners.iter().find(|l| l.is(&handler)) {
            return existing.id;
        }
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        listeners.push(Listener { id, handler });
        debug!("Listener subscribed ({} total)", listeners.len());
        id
    }

    /// Remove a listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, handler: &Arc<dyn NetworkEventHandler>) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| !l.is(handler));
        let removed = listeners.len() != before;
        if removed {
            debug!("Listener unsubscribed ({} left)", listeners.len());
        }
        removed
    }

    /// Remove a listener by the id [`subscribe`](Self::subscribe) returned.
    ///
    /// Ids are never reused, so a stale id removes nothing.
    pub fn unsubscribe_id(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if removed {
            debug!("Listener unsubscribed ({} left)", listeners.len());
        }
        removed
    }

    /// Whether `handler` is currently registered.
    pub fn contains(&self, handler: &Arc<dyn NetworkEventHandler>) -> bool {
        self.listeners.read().iter().any(|l| l.is(handler))
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.listeners.write().clear();
    }

    /// Deliver `event` to every listener registered when the call starts.
    ///
    /// The registry lock is released before any listener runs, so listeners
    /// may subscribe or unsubscribe from inside a callback; such changes
    /// apply from the next publish on.
    pub fn publish(&self, event: &NetworkEvent) -> PublishReport {
        let snapshot: Vec<Arc<dyn NetworkEventHandler>> = self
            .listeners
            .read()
            .iter()
            .map(|l| Arc::clone(&l.handler))
            .collect();

        let mut report = PublishReport::default();
        for handler in &snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(event))) {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    report.failed += 1;
                    warn!("Listener failed on {} event: {e:#}", event.name());
                }
                Err(payload) => {
                    report.failed += 1;
                    warn!(
                        "Listener panicked on {} event: {}",
                        event.name(),
                        panic_message(payload.as_ref())
                    );
                }
            }
        }
        report
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
