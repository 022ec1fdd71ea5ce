use std::collections::HashMap;

use crate::playable::{Playable, Segment};

/// The full vocabulary of lifecycle events distributed to listeners.  UI
/// controls, trackers and sponsorship logic all subscribe to the same bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Player has completely initialized and holds a usable mechanism.
    PlayerReady,
    /// No suitable playback mechanism remains (final failure).
    PlayerFailure,
    /// Network connection was lost mid-stream.
    ConnectionLost,
    /// A requested resource could not be found.
    MissingFile,
    /// Playback has started or resumed.
    Playing,
    /// Playback is paused.
    Paused,
    /// The current playable finished playing.
    Finished,
    /// The current playable was stopped and released.
    Unloaded,
    /// The play head moved.  Fires on every backend tick.
    PositionUpdate,
    /// New metadata is available for the current playable.
    Metadata,
    /// Volume changed.  Fires even with no playable loaded.
    VolumeUpdated,
    BufferStart,
    BufferEnd,
    /// The playlist cursor moved.  Carries the previous item, if any.
    PlaylistCurrentChange,
    /// The active segment within the current playable changed.
    SegmentChanged,
}

#[derive(Clone, Debug)]
pub enum EventData {
    None,
    Playable(Playable),
    Volume(f64),
    PlaylistChange { previous: Option<Playable> },
    Segment { playable: Playable, segment: Segment },
}

#[derive(Clone, Debug)]
pub struct Event {
    pub kind: EventKind,
    pub data: EventData,
}

impl Event {
    /// Snapshot of the playable this event concerns, if it carries one.
    pub fn playable(&self) -> Option<&Playable> {
        match &self.data {
            EventData::Playable(playable) => Some(playable),
            EventData::Segment { playable, .. } => Some(playable),
            _ => None,
        }
    }
}

type Handler = Box<dyn FnMut(&Event)>;

/// Dispatches named events to listeners in registration order.  Firing an
/// event with no listeners is not an error.
#[derive(Default)]
pub struct EventBus {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn add_listener(&mut self, kind: EventKind, handler: impl FnMut(&Event) + 'static) {
        self.handlers
            .entry(kind)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn fire(&mut self, kind: EventKind, data: EventData) {
        let event = Event { kind, data };
        if let Some(handlers) = self.handlers.get_mut(&kind) {
            for handler in handlers.iter_mut() {
                handler(&event);
            }
        }
    }

    /// Clears out every registered listener.
    pub fn remove_listeners(&mut self) {
        self.handlers.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[test]
    fn fires_listeners_in_registration_order() {
        let mut bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            bus.add_listener(EventKind::Playing, move |_| seen.borrow_mut().push(tag));
        }
        bus.fire(EventKind::Playing, EventData::None);
        assert_eq!(*seen.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn fires_only_matching_kind() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        {
            let count = count.clone();
            bus.add_listener(EventKind::Paused, move |_| *count.borrow_mut() += 1);
        }
        bus.fire(EventKind::Playing, EventData::None);
        bus.fire(EventKind::Paused, EventData::None);
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn firing_without_listeners_is_fine() {
        let mut bus = EventBus::new();
        bus.fire(EventKind::VolumeUpdated, EventData::Volume(0.5));
    }

    #[test]
    fn remove_listeners_drops_everything() {
        let mut bus = EventBus::new();
        let count = Rc::new(RefCell::new(0));
        {
            let count = count.clone();
            bus.add_listener(EventKind::Playing, move |_| *count.borrow_mut() += 1);
        }
        bus.remove_listeners();
        bus.fire(EventKind::Playing, EventData::None);
        assert_eq!(*count.borrow(), 0);
    }
}
