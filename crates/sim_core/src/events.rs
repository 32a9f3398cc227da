//! Named event queue with delayed delivery and visibility filtering.
//!
//! Event names form a closed vocabulary declared before play begins; an
//! enqueue under an undeclared name is a programming error and is rejected.
//! Events are never delivered from inside `enqueue` — even a zero-delay
//! event waits for the next delivery pass, which the embedding layer runs
//! once per tick, decoupled from the tick driver itself.

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::item::{ItemId, PlayerId};

/// Unique event identifier. Monotonic per session; 0 is never assigned.
pub type EventId = u32;

/// One named event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Identifier assigned at enqueue time.
    pub id: EventId,
    /// Name from the declared vocabulary.
    pub name: String,
    /// Up to two opaque string parameters.
    pub data1: String,
    /// Second opaque parameter.
    pub data2: String,
    /// Originating player, if any.
    pub player: Option<PlayerId>,
    /// Unit the event concerns, if any.
    pub unit: Option<ItemId>,
    /// World location (cell coordinates), if any. Gates delivery through
    /// each listener's visibility predicate.
    pub location: Option<(i32, i32)>,
    /// Remaining delivery delay in delivery passes.
    pub delay: u32,
}

impl Event {
    /// Create an event with no parameters and no delay.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            id: 0,
            name: name.to_string(),
            data1: String::new(),
            data2: String::new(),
            player: None,
            unit: None,
            location: None,
            delay: 0,
        }
    }

    /// Attach the originating player.
    #[must_use]
    pub fn with_player(mut self, player: PlayerId) -> Self {
        self.player = Some(player);
        self
    }

    /// Attach the unit the event concerns.
    #[must_use]
    pub fn with_unit(mut self, unit: ItemId) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Attach a world location.
    #[must_use]
    pub fn with_location(mut self, x: i32, y: i32) -> Self {
        self.location = Some((x, y));
        self
    }

    /// Set a delivery delay in passes.
    #[must_use]
    pub fn with_delay(mut self, delay: u32) -> Self {
        self.delay = delay;
        self
    }

    /// Set the first string parameter.
    #[must_use]
    pub fn with_data1(mut self, data: &str) -> Self {
        self.data1 = data.to_string();
        self
    }
}

/// Receives delivered events.
pub trait EventListener {
    /// Visibility predicate for located events. Events without a location
    /// are delivered unconditionally.
    fn can_see(&self, location: (i32, i32)) -> bool;

    /// Called once per delivered event.
    fn receive(&mut self, event: &Event);
}

/// The session's event queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueue {
    /// Declared vocabulary, kept sorted for binary search.
    declared: Vec<String>,
    /// Next event ID to assign.
    next_id: EventId,
    /// Held events in enqueue order.
    pending: Vec<Event>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    /// Create an empty queue with an empty vocabulary.
    #[must_use]
    pub fn new() -> Self {
        Self {
            declared: Vec::new(),
            next_id: 1,
            pending: Vec::new(),
        }
    }

    /// Declare an event name. Startup-time only; duplicates are no-ops.
    pub fn declare(&mut self, name: &str) {
        if let Err(slot) = self.declared.binary_search_by(|d| d.as_str().cmp(name)) {
            self.declared.insert(slot, name.to_string());
        }
    }

    /// Whether a name is in the vocabulary.
    #[must_use]
    pub fn is_declared(&self, name: &str) -> bool {
        self.declared
            .binary_search_by(|d| d.as_str().cmp(name))
            .is_ok()
    }

    /// Enqueue an event, assigning its ID.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::UndeclaredEvent`] (and logs) when the event's
    /// name was never declared.
    pub fn enqueue(&mut self, mut event: Event) -> Result<EventId> {
        if !self.is_declared(&event.name) {
            tracing::error!(name = %event.name, "Rejected event with undeclared name");
            return Err(GameError::UndeclaredEvent(event.name));
        }
        let id = self.next_id;
        self.next_id += 1;
        event.id = id;
        self.pending.push(event);
        Ok(id)
    }

    /// Number of held events.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// One delivery pass.
    ///
    /// Decrements every nonzero delay, then delivers all due events in FIFO
    /// order to each listener whose visibility predicate accepts the event's
    /// location. Delivered events are discarded.
    pub fn deliver_pending(&mut self, listeners: &mut [&mut dyn EventListener]) {
        let mut held = Vec::with_capacity(self.pending.len());
        for mut event in self.pending.drain(..) {
            if event.delay > 0 {
                event.delay -= 1;
                if event.delay > 0 {
                    held.push(event);
                    continue;
                }
            }
            for listener in listeners.iter_mut() {
                let visible = match event.location {
                    Some(location) => listener.can_see(location),
                    None => true,
                };
                if visible {
                    listener.receive(&event);
                }
            }
        }
        self.pending = held;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inbox {
        sees_everything: bool,
        received: Vec<Event>,
    }

    impl Inbox {
        fn new(sees_everything: bool) -> Self {
            Self {
                sees_everything,
                received: Vec::new(),
            }
        }
    }

    impl EventListener for Inbox {
        fn can_see(&self, _location: (i32, i32)) -> bool {
            self.sees_everything
        }

        fn receive(&mut self, event: &Event) {
            self.received.push(event.clone());
        }
    }

    fn queue_with(names: &[&str]) -> EventQueue {
        let mut queue = EventQueue::new();
        for name in names {
            queue.declare(name);
        }
        queue
    }

    #[test]
    fn test_undeclared_name_rejected() {
        let mut queue = queue_with(&["UnitDestroyed"]);
        let err = queue.enqueue(Event::new("UnitDestoryed")).unwrap_err();
        assert!(matches!(err, GameError::UndeclaredEvent(_)));
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_event_ids_are_monotonic_from_one() {
        let mut queue = queue_with(&["Advance"]);
        let a = queue.enqueue(Event::new("Advance")).unwrap();
        let b = queue.enqueue(Event::new("Advance")).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[test]
    fn test_never_delivered_synchronously() {
        let mut queue = queue_with(&["Advance"]);
        queue.enqueue(Event::new("Advance")).unwrap();
        // Held until a delivery pass even with zero delay.
        assert_eq!(queue.pending_len(), 1);
    }

    #[test]
    fn test_delayed_delivery_exactly_once_on_third_pass() {
        let mut queue = queue_with(&["Advance"]);
        queue.enqueue(Event::new("Advance").with_delay(3)).unwrap();

        let mut inbox = Inbox::new(true);
        for _ in 0..2 {
            queue.deliver_pending(&mut [&mut inbox]);
            assert!(inbox.received.is_empty());
        }
        queue.deliver_pending(&mut [&mut inbox]);
        assert_eq!(inbox.received.len(), 1);

        // Discarded after delivery.
        queue.deliver_pending(&mut [&mut inbox]);
        assert_eq!(inbox.received.len(), 1);
        assert_eq!(queue.pending_len(), 0);
    }

    #[test]
    fn test_fifo_among_simultaneously_due() {
        let mut queue = queue_with(&["Advance"]);
        queue.enqueue(Event::new("Advance").with_data1("first")).unwrap();
        queue.enqueue(Event::new("Advance").with_data1("second")).unwrap();

        let mut inbox = Inbox::new(true);
        queue.deliver_pending(&mut [&mut inbox]);
        let order: Vec<_> = inbox.received.iter().map(|e| e.data1.as_str()).collect();
        assert_eq!(order, vec!["first", "second"]);
    }

    #[test]
    fn test_location_filtering() {
        let mut queue = queue_with(&["UnitDestroyed", "GameOver"]);
        queue
            .enqueue(Event::new("UnitDestroyed").with_location(4, 4))
            .unwrap();
        queue.enqueue(Event::new("GameOver")).unwrap();

        let mut blind = Inbox::new(false);
        let mut seeing = Inbox::new(true);
        queue.deliver_pending(&mut [&mut blind, &mut seeing]);

        // The located event is filtered; the unlocated one is not.
        assert_eq!(blind.received.len(), 1);
        assert_eq!(blind.received[0].name, "GameOver");
        assert_eq!(seeing.received.len(), 2);
    }
}
