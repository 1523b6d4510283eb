//! Application Services
//!
//! Event types emitted by the connection supervisor and the callback slots
//! that deliver them to the caller.
//!
//! Each event category has one handler slot. Registering a handler replaces
//! the previous one. Handlers run on the ticker's connection task, one event
//! at a time, so two tick callbacks never overlap. A handler that panics is
//! logged and the stream keeps running.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::order::OrderUpdate;
use crate::domain::streaming::Tick;

// =============================================================================
// Events
// =============================================================================

/// Events emitted by the ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerEvent {
    /// Connection established and subscriptions restored.
    Connected,
    /// Connection closed.
    Closed,
    /// A decoded market tick.
    Tick(Tick),
    /// An order update pushed on the ticker socket.
    OrderUpdate(Box<OrderUpdate>),
    /// A transport or server error.
    Error(String),
    /// A reconnection attempt is starting.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
    },
    /// Reconnection gave up; auto-reconnect is now disabled.
    ReconnectExhausted,
}

impl TickerEvent {
    /// Short name of the event kind, used in logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Tick(_) => "tick",
            Self::OrderUpdate(_) => "order_update",
            Self::Error(_) => "error",
            Self::Reconnecting { .. } => "reconnecting",
            Self::ReconnectExhausted => "reconnect_exhausted",
        }
    }
}

// =============================================================================
// Callbacks
// =============================================================================

type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;
type Notify = Arc<dyn Fn() + Send + Sync>;

/// Handler slots, one per event category.
#[derive(Default)]
pub struct Callbacks {
    on_tick: RwLock<Option<Handler<Tick>>>,
    on_order_update: RwLock<Option<Handler<OrderUpdate>>>,
    on_error: RwLock<Option<Handler<String>>>,
    on_reconnect: RwLock<Option<Handler<u32>>>,
    on_connect: RwLock<Option<Notify>>,
    on_close: RwLock<Option<Notify>>,
    on_no_reconnect: RwLock<Option<Notify>>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_tick", &self.on_tick.read().is_some())
            .field("on_order_update", &self.on_order_update.read().is_some())
            .field("on_error", &self.on_error.read().is_some())
            .field("on_reconnect", &self.on_reconnect.read().is_some())
            .field("on_connect", &self.on_connect.read().is_some())
            .field("on_close", &self.on_close.read().is_some())
            .field("on_no_reconnect", &self.on_no_reconnect.read().is_some())
            .finish()
    }
}

impl Callbacks {
    /// Create empty handler slots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the tick handler.
    pub fn set_on_tick(&self, handler: impl Fn(Tick) + Send + Sync + 'static) {
        *self.on_tick.write() = Some(Arc::new(handler));
    }

    /// Set the order update handler.
    pub fn set_on_order_update(&self, handler: impl Fn(OrderUpdate) + Send + Sync + 'static) {
        *self.on_order_update.write() = Some(Arc::new(handler));
    }

    /// Set the error handler.
    pub fn set_on_error(&self, handler: impl Fn(String) + Send + Sync + 'static) {
        *self.on_error.write() = Some(Arc::new(handler));
    }

    /// Set the reconnecting handler. Receives the attempt number.
    pub fn set_on_reconnect(&self, handler: impl Fn(u32) + Send + Sync + 'static) {
        *self.on_reconnect.write() = Some(Arc::new(handler));
    }

    /// Set the connect handler.
    pub fn set_on_connect(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.on_connect.write() = Some(Arc::new(handler));
    }

    /// Set the close handler.
    pub fn set_on_close(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.on_close.write() = Some(Arc::new(handler));
    }

    /// Set the reconnect-exhausted handler.
    pub fn set_on_no_reconnect(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.on_no_reconnect.write() = Some(Arc::new(handler));
    }

    /// Deliver an event to its handler, if one is registered.
    pub fn dispatch(&self, event: TickerEvent) {
        let kind = event.kind();

        // Handlers are cloned out of their slot so they may re-register.
        let outcome = match event {
            TickerEvent::Tick(tick) => invoke(&self.on_tick, tick),
            TickerEvent::OrderUpdate(order) => invoke(&self.on_order_update, *order),
            TickerEvent::Error(message) => invoke(&self.on_error, message),
            TickerEvent::Reconnecting { attempt } => invoke(&self.on_reconnect, attempt),
            TickerEvent::Connected => notify(&self.on_connect),
            TickerEvent::Closed => notify(&self.on_close),
            TickerEvent::ReconnectExhausted => notify(&self.on_no_reconnect),
        };

        if outcome.is_err() {
            tracing::error!(event = kind, "Ticker callback panicked");
        }
    }
}

fn invoke<T>(slot: &RwLock<Option<Handler<T>>>, value: T) -> std::thread::Result<()> {
    let handler = slot.read().clone();
    handler.map_or(Ok(()), |handler| {
        catch_unwind(AssertUnwindSafe(|| handler(value)))
    })
}

fn notify(slot: &RwLock<Option<Notify>>) -> std::thread::Result<()> {
    let handler = slot.read().clone();
    handler.map_or(Ok(()), |handler| catch_unwind(AssertUnwindSafe(|| handler())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::Mode;

    #[test]
    fn dispatch_routes_to_matching_slot() {
        let callbacks = Callbacks::new();
        let ticks = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let errors = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let sink = Arc::clone(&ticks);
        callbacks.set_on_tick(move |tick| sink.lock().push(tick.instrument_token));
        let sink = Arc::clone(&errors);
        callbacks.set_on_error(move |msg| sink.lock().push(msg));

        callbacks.dispatch(TickerEvent::Tick(Tick::new(Mode::Ltp, 408_065)));
        callbacks.dispatch(TickerEvent::Error("boom".to_string()));
        callbacks.dispatch(TickerEvent::Connected);

        assert_eq!(*ticks.lock(), vec![408_065]);
        assert_eq!(*errors.lock(), vec!["boom".to_string()]);
    }

    #[test]
    fn dispatch_without_handler_is_noop() {
        let callbacks = Callbacks::new();
        callbacks.dispatch(TickerEvent::ReconnectExhausted);
        callbacks.dispatch(TickerEvent::Reconnecting { attempt: 1 });
    }

    #[test]
    fn panicking_handler_is_contained() {
        let callbacks = Callbacks::new();
        callbacks.set_on_connect(|| panic!("handler failure"));
        callbacks.dispatch(TickerEvent::Connected);

        let hits = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let counter = Arc::clone(&hits);
        callbacks.set_on_connect(move || {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        callbacks.dispatch(TickerEvent::Connected);
        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_can_reregister_itself() {
        let callbacks = Arc::new(Callbacks::new());
        let inner = Arc::clone(&callbacks);
        callbacks.set_on_close(move || inner.set_on_close(|| {}));
        callbacks.dispatch(TickerEvent::Closed);
        callbacks.dispatch(TickerEvent::Closed);
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(TickerEvent::Connected.kind(), "connected");
        assert_eq!(
            TickerEvent::Reconnecting { attempt: 3 }.kind(),
            "reconnecting"
        );
    }
}
