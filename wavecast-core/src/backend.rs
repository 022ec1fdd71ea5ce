use std::time::Duration;

use crossbeam_channel::Sender;

use crate::{error::Error, mechanism::Mechanism, playable::Playable, player::PlayerEvent};

/// Parameters handed to the backend when playback of a loaded sound starts.
#[derive(Clone, Copy, Debug)]
pub struct PlayParams {
    pub position: Duration,
    pub volume: f64,
    pub muted: bool,
}

/// Inbound notification from a backend.  Every notice names the identifier
/// of the sound it concerns so the engine can discard stale reports.
#[derive(Clone, Debug)]
pub enum BackendNotice {
    /// The sound is loaded/connected and ready to be played.
    Ready { identifier: String },
    /// Outcome of a progressive load.  `success: false` means the resource
    /// could not be fetched.
    LoadResult { identifier: String, success: bool },
    /// The streaming session failed.  `connected` tells whether a session
    /// had been established before the failure.
    ConnectFailure { identifier: String, connected: bool },
    /// Playback started.
    Started { identifier: String },
    /// Playback paused.
    Paused { identifier: String },
    /// Playback resumed from a pause.
    Resumed { identifier: String },
    /// The sound played through to its end.
    Finished { identifier: String },
    Buffering { identifier: String, buffering: bool },
    /// Periodic play-head report.
    Tick {
        identifier: String,
        position: Duration,
        duration: Option<Duration>,
        duration_estimate: Option<Duration>,
    },
    /// In-stream title metadata (live streams).
    StreamTitle { identifier: String, title: String },
    /// In-stream ad insertion marker carrying the ad context blob.
    AdMarker {
        identifier: String,
        insertion_type: String,
        context: String,
    },
}

impl BackendNotice {
    pub fn identifier(&self) -> &str {
        match self {
            Self::Ready { identifier }
            | Self::LoadResult { identifier, .. }
            | Self::ConnectFailure { identifier, .. }
            | Self::Started { identifier }
            | Self::Paused { identifier }
            | Self::Resumed { identifier }
            | Self::Finished { identifier }
            | Self::Buffering { identifier, .. }
            | Self::Tick { identifier, .. }
            | Self::StreamTitle { identifier, .. }
            | Self::AdMarker { identifier, .. } => identifier,
        }
    }
}

/// Capability interface over a native sound engine.  The engine owns one
/// backend per mechanism and interacts with sounds exclusively through
/// these operations; backends report back by sending
/// [`PlayerEvent::Backend`] notices into the player's channel.
pub trait AudioBackend {
    fn mechanism(&self) -> Mechanism;

    /// Creates the native sound for the playable and begins loading or
    /// connecting.  Completion is asynchronous and signaled with `Ready`,
    /// `ConnectFailure` or `LoadResult` notices.
    fn load(&mut self, playable: &Playable, notices: Sender<PlayerEvent>) -> Result<(), Error>;

    /// Starts (or restarts) playback of a loaded sound.
    fn play(&mut self, identifier: &str, params: PlayParams) -> Result<(), Error>;

    /// Pauses a playing sound.  Returns false when the sound is unknown.
    fn pause(&mut self, identifier: &str) -> bool;

    /// Resumes a paused sound.  Returns false when the sound is unknown.
    fn resume(&mut self, identifier: &str) -> bool;

    /// Moves the play head.  Returns false when the sound is unknown.
    fn set_position(&mut self, identifier: &str, position: Duration) -> bool;

    fn set_volume(&mut self, identifier: &str, volume: f64);

    fn set_muted(&mut self, identifier: &str, muted: bool);

    /// Stops and destroys the native sound.
    fn unload(&mut self, identifier: &str);
}
