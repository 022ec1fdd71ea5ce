use std::time::Duration;

use crate::{
    event::{EventBus, EventData, EventKind},
    playable::Playable,
};

/// Ordered sequence of playables with a single cursor.  Identifiers are
/// unique within the list; insertion order is preserved.  The cursor is
/// undefined only while the playlist is empty.
pub struct Playlist {
    events: EventBus,
    items: Vec<Playable>,
    current_index: Option<usize>,
}

impl Playlist {
    pub fn new() -> Self {
        Self {
            events: EventBus::new(),
            items: Vec::new(),
            current_index: None,
        }
    }

    /// Bus for playlist events, most notably
    /// [`EventKind::PlaylistCurrentChange`].
    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Appends a playable.  Duplicate identifiers are rejected.  The first
    /// successful add populates the cursor and announces a current change
    /// with no previous item.
    pub fn add(&mut self, playable: Playable) -> bool {
        if self.item(&playable.identifier).is_some() {
            log::warn!(
                "could not add '{}' to playlist, it already exists",
                playable.identifier
            );
            return false;
        }
        log::info!("added '{}' to playlist", playable.identifier);
        self.items.push(playable);
        if self.current_index.is_none() {
            self.current_index = Some(0);
            self.events.fire(
                EventKind::PlaylistCurrentChange,
                EventData::PlaylistChange { previous: None },
            );
        }
        true
    }

    pub fn current(&self) -> Option<&Playable> {
        self.current_index.map(|i| &self.items[i])
    }

    pub fn current_mut(&mut self) -> Option<&mut Playable> {
        self.current_index.map(|i| &mut self.items[i])
    }

    /// Looks a playable up by identifier.
    pub fn item(&self, identifier: &str) -> Option<&Playable> {
        self.items.iter().find(|p| p.identifier == identifier)
    }

    /// Whether at least one more item exists before the end of the list.
    pub fn has_next(&self) -> bool {
        match self.current_index {
            Some(index) => index + 1 < self.items.len(),
            None => false,
        }
    }

    /// Jumps the cursor straight to the given identifier.  Optionally
    /// overrides the item's start position, for restoring playback across
    /// playlist switches.
    pub fn goto(&mut self, identifier: &str, start_position: Option<Duration>) -> bool {
        let Some(index) = self.items.iter().position(|p| p.identifier == identifier) else {
            log::warn!("goto: '{identifier}' is not in the playlist");
            return false;
        };
        let previous = self.current().cloned();
        self.current_index = Some(index);
        if let Some(position) = start_position {
            self.items[index].position = position;
        }
        self.events.fire(
            EventKind::PlaylistCurrentChange,
            EventData::PlaylistChange { previous },
        );
        true
    }

    /// Removes an item by identifier.  The current item may not be removed.
    /// The cursor slides back by one when a preceding item is spliced out.
    pub fn remove(&mut self, identifier: &str) -> bool {
        let Some(index) = self.items.iter().position(|p| p.identifier == identifier) else {
            return false;
        };
        let current = self.current_index.unwrap_or(0);
        if index == current {
            log::warn!("the current playlist item may not be removed");
            return false;
        }
        self.items.remove(index);
        if current > 0 && index <= current {
            self.current_index = Some(current - 1);
        }
        true
    }

    /// Advances the cursor, wrapping to the first item at the end of the
    /// list.  Returns false when the playlist is empty.
    pub fn next(&mut self) -> bool {
        let Some(index) = self.current_index else {
            return false;
        };
        let previous = self.current().cloned();
        self.current_index = Some(if index + 1 < self.items.len() {
            index + 1
        } else {
            0
        });
        self.events.fire(
            EventKind::PlaylistCurrentChange,
            EventData::PlaylistChange { previous },
        );
        true
    }

    /// Retreats the cursor, wrapping to the last item at the beginning of
    /// the list.  Returns false when the playlist is empty.
    pub fn previous(&mut self) -> bool {
        let Some(index) = self.current_index else {
            return false;
        };
        let previous = self.current().cloned();
        self.current_index = Some(if index > 0 {
            index - 1
        } else {
            self.items.len() - 1
        });
        self.events.fire(
            EventKind::PlaylistCurrentChange,
            EventData::PlaylistChange { previous },
        );
        true
    }
}

impl Default for Playlist {
    fn default() -> Self {
        Self::new()
    }
}
