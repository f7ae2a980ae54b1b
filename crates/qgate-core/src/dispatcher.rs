//! Event dispatch.
//!
//! [`EventDispatcher`] receives every dispatch envelope that is not part of
//! the session handshake, applies per-category preprocessing and schedules
//! the registered callback. Callback failures are logged here and never
//! reach the gateway's receive loop.
//!
//! # Preprocessing
//!
//! | category | transformation |
//! |---|---|
//! | `Message` | trim, strip the bot's leading mention, treat (if `message_treat`) |
//! | `DirectMessage` | trim, treat (if `dm_treat`) |
//! | `MessageDelete` | suppressed when the operator is the author (if `filter_self`) |
//! | `Forum` | `thread_info.content`/`title` parsed as JSON when possible |

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::event::{BotIdentity, Event, EventKind, TREATED_KEY};
use crate::handler::{Callback, Scheduler};
use crate::protocol::Envelope;
use crate::treat::{MessageTreater, WhitespaceTreater, strip_leading_mention};

// =============================================================================
// Options
// =============================================================================

/// Switches for the per-category preprocessing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Treat guild messages.
    pub message_treat: bool,
    /// Treat direct messages.
    pub dm_treat: bool,
    /// Drop delete events where the bot recalled its own message.
    pub filter_self: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            message_treat: true,
            dm_treat: true,
            filter_self: true,
        }
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// What happened to one envelope.
#[derive(Debug)]
pub enum Dispatched {
    /// The callback was scheduled.
    Scheduled(JoinHandle<()>),
    /// Suppressed by the self filter.
    Filtered,
    /// Known type without a registered callback.
    NoCallback,
    /// Type missing from the event table.
    Unknown,
}

impl Dispatched {
    /// Returns `true` if a callback was scheduled.
    pub fn is_scheduled(&self) -> bool {
        matches!(self, Self::Scheduled(_))
    }

    /// Waits for the scheduled callback, if any.
    pub async fn join(self) {
        if let Self::Scheduled(handle) = self {
            let _ = handle.await;
        }
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Routes dispatch events to user callbacks.
///
/// One dispatcher is shared by every shard of a bot.
pub struct EventDispatcher {
    callbacks: HashMap<EventKind, Callback<Event>>,
    on_start: Option<Callback<BotIdentity>>,
    started: AtomicBool,
    options: DispatchOptions,
    treater: Arc<dyn MessageTreater>,
    identity: RwLock<Option<BotIdentity>>,
    scheduler: Scheduler,
}

impl EventDispatcher {
    /// Starts building a dispatcher on the given scheduler.
    pub fn builder(scheduler: Scheduler) -> EventDispatcherBuilder {
        EventDispatcherBuilder {
            callbacks: HashMap::new(),
            on_start: None,
            options: DispatchOptions::default(),
            treater: Arc::new(WhitespaceTreater),
            scheduler,
        }
    }

    /// The scheduling context callbacks run on.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Preprocessing switches.
    pub fn options(&self) -> DispatchOptions {
        self.options
    }

    /// Categories that have a registered callback.
    pub fn registered(&self) -> impl Iterator<Item = EventKind> + '_ {
        self.callbacks.keys().copied()
    }

    /// The resolved bot identity, once known.
    pub fn identity(&self) -> Option<BotIdentity> {
        self.identity.read().clone()
    }

    /// Stores the bot identity and runs the startup callback the first time
    /// it is called.
    ///
    /// Every shard reports its identity; only the first report triggers the
    /// callback.
    pub fn notify_ready(&self, identity: BotIdentity) -> Option<JoinHandle<()>> {
        *self.identity.write() = Some(identity.clone());
        if self.started.swap(true, Ordering::SeqCst) {
            return None;
        }
        info!(bot_id = %identity.id, username = %identity.username, "Bot started");
        self.on_start
            .as_ref()
            .map(|cb| self.scheduler.schedule(cb, identity, "on_start"))
    }

    /// Preprocesses an envelope and schedules its callback.
    pub fn dispatch(&self, envelope: Envelope) -> Dispatched {
        let event = Event::from_envelope(envelope);

        let Some(kind) = event.kind() else {
            warn!(event_type = %event.event_type, "Unknown event type");
            return Dispatched::Unknown;
        };

        let Some(callback) = self.callbacks.get(&kind) else {
            trace!(event_type = %event.event_type, "No callback registered");
            return Dispatched::NoCallback;
        };

        let Some(event) = self.preprocess(kind, event) else {
            return Dispatched::Filtered;
        };

        debug!(
            event_type = %event.event_type,
            event_id = ?event.event_id,
            kind = %kind,
            "Dispatching event"
        );
        Dispatched::Scheduled(self.scheduler.schedule(callback, event, kind.as_str()))
    }

    /// Applies the per-category transformation. `None` drops the event.
    fn preprocess(&self, kind: EventKind, mut event: Event) -> Option<Event> {
        match kind {
            EventKind::Message if self.options.message_treat => {
                let mention = self.identity.read().as_ref().map(BotIdentity::mention);
                let content = event.content().unwrap_or_default();
                let text = match &mention {
                    Some(mention) => strip_leading_mention(content, mention),
                    None => content.trim(),
                };
                let treated = self.treater.treat(text);
                attach(&mut event, TREATED_KEY, serde_json::to_value(treated).ok());
            }
            EventKind::DirectMessage if self.options.dm_treat => {
                let treated = self.treater.treat(event.content().unwrap_or_default().trim());
                attach(&mut event, TREATED_KEY, serde_json::to_value(treated).ok());
            }
            EventKind::MessageDelete if self.options.filter_self => {
                let operator = event.pointer("/op_user/id");
                let author = event.pointer("/message/author/id");
                if operator.is_some() && operator == author {
                    return None;
                }
            }
            EventKind::Forum => decode_thread_fields(&mut event.data),
            _ => {}
        }
        Some(event)
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("callbacks", &self.callbacks.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

fn attach(event: &mut Event, key: &str, value: Option<Value>) {
    if let (Some(map), Some(value)) = (event.data.as_object_mut(), value) {
        map.insert(key.to_string(), value);
    }
}

/// Forum text fields are JSON-encoded rich text on most sub-events; leave
/// them untouched when they are not.
fn decode_thread_fields(data: &mut Value) {
    let Some(thread) = data.get_mut("thread_info").and_then(Value::as_object_mut) else {
        return;
    };
    for key in ["content", "title"] {
        let Some(Value::String(raw)) = thread.get(key) else {
            continue;
        };
        if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
            thread.insert(key.to_string(), parsed);
        }
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`EventDispatcher`].
pub struct EventDispatcherBuilder {
    callbacks: HashMap<EventKind, Callback<Event>>,
    on_start: Option<Callback<BotIdentity>>,
    options: DispatchOptions,
    treater: Arc<dyn MessageTreater>,
    scheduler: Scheduler,
}

impl EventDispatcherBuilder {
    /// Registers the callback for one category, replacing any previous one.
    pub fn on(mut self, kind: EventKind, callback: Callback<Event>) -> Self {
        self.callbacks.insert(kind, callback);
        self
    }

    /// Registers the startup callback.
    pub fn on_start(mut self, callback: Callback<BotIdentity>) -> Self {
        self.on_start = Some(callback);
        self
    }

    /// Sets the preprocessing switches.
    pub fn options(mut self, options: DispatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the message treater.
    pub fn treater(mut self, treater: impl MessageTreater + 'static) -> Self {
        self.treater = Arc::new(treater);
        self
    }

    /// Finishes the dispatcher.
    pub fn build(self) -> EventDispatcher {
        EventDispatcher {
            callbacks: self.callbacks,
            on_start: self.on_start,
            started: AtomicBool::new(false),
            options: self.options,
            treater: self.treater,
            identity: RwLock::new(None),
            scheduler: self.scheduler,
        }
    }
}
