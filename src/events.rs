//! Events.
//!
//! An [`Events`] registry is a cheap, clonable handle; every view owns one, and so does every
//! [`Model`](crate::Model). Subscriptions one object makes on *other* objects are tracked by a
//! [`Listening`] so they can all be dropped at once.

use core::fmt;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Name of the wildcard event; its handlers receive every event, name first.
pub const ALL: &str = "all";

/// An event handler.
///
/// Handlers are compared by identity, so keep a clone around if you want to `off` it later.
pub struct EventHandler(Arc<Mutex<dyn FnMut(&[Value]) + Send>>);

impl Clone for EventHandler {
    fn clone(&self) -> Self {
        EventHandler(Arc::clone(&self.0))
    }
}

impl EventHandler {
    pub fn new<F: 'static + FnMut(&[Value]) + Send>(handler: F) -> Self {
        EventHandler(Arc::new(Mutex::new(handler)))
    }

    fn call(&self, args: &[Value]) {
        match self.0.try_lock() {
            Some(mut handler) => (&mut *handler)(args),
            // a handler that (indirectly) triggers itself
            None => warn!("skipping re-entrant event handler"),
        }
    }

    fn is(&self, other: &EventHandler) -> bool {
        Arc::as_ptr(&self.0) as *const u8 == Arc::as_ptr(&other.0) as *const u8
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "EventHandler({:p})", Arc::as_ptr(&self.0) as *const u8)
    }
}

/// Identifies whoever made a subscription, so it can be removed without the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    pub fn new() -> ListenerId {
        ListenerId(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        ListenerId::new()
    }
}

#[derive(Debug)]
struct Subscription {
    name: String,
    handler: EventHandler,
    context: Option<ListenerId>,
    once: bool,
}

/// An event registry.
#[derive(Clone, Default)]
pub struct Events {
    subscriptions: Arc<Mutex<Vec<Subscription>>>,
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Events({} subscriptions)", self.subscriptions.lock().len())
    }
}

impl Events {
    pub fn new() -> Events {
        Events::default()
    }

    /// Subscribes to one or more space-separated event names.
    pub fn on(&self, names: &str, handler: EventHandler) {
        self.subscribe(names, handler, None, false);
    }

    /// Like `on`, but the handler is removed after it fires once.
    pub fn once(&self, names: &str, handler: EventHandler) {
        self.subscribe(names, handler, None, true);
    }

    /// Subscribes on behalf of a listener.
    pub fn on_with_context(&self, names: &str, handler: EventHandler, context: ListenerId) {
        self.subscribe(names, handler, Some(context), false);
    }

    /// Subscribes several `(names, handler)` pairs at once.
    pub fn on_map<'a, I>(&self, map: I)
    where
        I: IntoIterator<Item = (&'a str, EventHandler)>,
    {
        for (names, handler) in map {
            self.on(names, handler);
        }
    }

    fn subscribe(&self, names: &str, handler: EventHandler, context: Option<ListenerId>, once: bool) {
        let mut subscriptions = self.subscriptions.lock();
        for name in names.split_whitespace() {
            subscriptions.push(Subscription {
                name: name.to_string(),
                handler: handler.clone(),
                context,
                once,
            });
        }
    }

    /// Removes every subscription matching all of the given filters.
    ///
    /// `off(None, None, None)` removes everything.
    pub fn off(&self, names: Option<&str>, handler: Option<&EventHandler>, context: Option<ListenerId>) {
        let names: Option<Vec<&str>> = names.map(|names| names.split_whitespace().collect());
        self.subscriptions.lock().retain(|sub| {
            let name_matches = names
                .as_ref()
                .map_or(true, |names| names.iter().any(|n| *n == sub.name));
            let handler_matches = handler.map_or(true, |h| h.is(&sub.handler));
            let context_matches = context.map_or(true, |c| sub.context == Some(c));
            !(name_matches && handler_matches && context_matches)
        });
    }

    /// Triggers an event.
    ///
    /// Handlers for `name` run first, then wildcard handlers with the name prepended to `args`.
    /// Both handler lists are captured before anything runs, so handlers may subscribe or
    /// unsubscribe freely without affecting this dispatch.
    pub fn trigger(&self, name: &str, args: &[Value]) {
        let (exact, wildcard) = {
            let mut subscriptions = self.subscriptions.lock();
            let exact: Vec<EventHandler> = subscriptions
                .iter()
                .filter(|sub| sub.name == name)
                .map(|sub| sub.handler.clone())
                .collect();
            let wildcard: Vec<EventHandler> = if name == ALL {
                Vec::new()
            } else {
                subscriptions
                    .iter()
                    .filter(|sub| sub.name == ALL)
                    .map(|sub| sub.handler.clone())
                    .collect()
            };
            subscriptions.retain(|sub| !(sub.once && (sub.name == name || sub.name == ALL)));
            (exact, wildcard)
        };

        for handler in exact {
            handler.call(args);
        }

        if !wildcard.is_empty() {
            let mut full_args = Vec::with_capacity(args.len() + 1);
            full_args.push(Value::String(name.to_string()));
            full_args.extend_from_slice(args);
            for handler in wildcard {
                handler.call(&full_args);
            }
        }
    }

    pub fn has_subscriptions(&self, name: &str) -> bool {
        self.subscriptions.lock().iter().any(|sub| sub.name == name)
    }

    /// True if both handles refer to the same registry.
    pub fn same(&self, other: &Events) -> bool {
        Arc::ptr_eq(&self.subscriptions, &other.subscriptions)
    }
}

/// Subscriptions made on other registries, so they can be dropped together.
#[derive(Debug, Default)]
pub struct Listening {
    id: ListenerId,
    targets: Vec<Events>,
}

impl Listening {
    pub fn new() -> Listening {
        Listening::default()
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn listen_to(&mut self, target: &Events, names: &str, handler: EventHandler) {
        target.subscribe(names, handler, Some(self.id), false);
        self.remember(target);
    }

    pub fn listen_to_once(&mut self, target: &Events, names: &str, handler: EventHandler) {
        target.subscribe(names, handler, Some(self.id), true);
        self.remember(target);
    }

    fn remember(&mut self, target: &Events) {
        if !self.targets.iter().any(|t| t.same(target)) {
            self.targets.push(target.clone());
        }
    }

    /// Removes subscriptions made through this listener, optionally only on one target and/or
    /// for some event names.
    pub fn stop_listening(&mut self, target: Option<&Events>, names: Option<&str>) {
        let id = self.id;
        for t in &self.targets {
            if target.map_or(true, |target| target.same(t)) {
                t.off(names, None, Some(id));
            }
        }
        if names.is_none() {
            self.targets
                .retain(|t| target.map_or(false, |target| !target.same(t)));
        }
    }
}
