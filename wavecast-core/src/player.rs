use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::{
    backend::{AudioBackend, BackendNotice, PlayParams},
    event::{EventBus, EventData, EventKind},
    mechanism::{Mechanism, MechanismSelector},
    playable::{MediaKind, Playable, PlaybackState, Segment, Variant},
    settings::Settings,
};

#[derive(Debug)]
pub enum PlayerCommand {
    Play { playable: Playable },
    Pause,
    Unload,
    /// Seek to a point expressed as a fraction of the duration, 0.0 to 1.0.
    Seek { percent: f64 },
    SetPosition { position: Duration },
    /// Change playback volume to a value in the 0.0..=1.0 range.
    SetVolume { volume: f64 },
    Mute,
    Unmute,
    Configure { settings: Settings },
    Reset { solutions: Vec<Mechanism> },
}

#[derive(Debug)]
pub enum PlayerEvent {
    Command(PlayerCommand),
    Backend(BackendNotice),
}

/// The playback engine.  Owns the current playable, the playback state and
/// the active backend's native sound, and distributes lifecycle events to
/// listeners on the bus.  Everything is driven through one channel of
/// [`PlayerEvent`]s handled sequentially; listeners must not call back into
/// the player synchronously and instead send commands into the channel.
pub struct Player {
    settings: Settings,
    events: EventBus,
    mechanism: MechanismSelector,
    backends: Vec<Box<dyn AudioBackend>>,
    current: Option<Playable>,
    loaded: bool,
    state: PlaybackState,
    sender: Sender<PlayerEvent>,
    receiver: Receiver<PlayerEvent>,
}

impl Player {
    pub fn new(settings: Settings, backends: Vec<Box<dyn AudioBackend>>) -> Self {
        let (sender, receiver) = unbounded();
        let mut mechanism = MechanismSelector::new();
        if let Some(preferred) = settings.preferred_mechanism {
            mechanism.prefer(preferred);
        }
        Self {
            settings,
            events: EventBus::new(),
            mechanism,
            backends,
            current: None,
            loaded: false,
            state: PlaybackState::Stopped,
            sender,
            receiver,
        }
    }

    /// Announces readiness once a usable mechanism and backend exist, or a
    /// terminal failure when none do.
    pub fn init(&mut self) {
        if self.mechanism.current().is_some() && self.active_backend().is_some() {
            log::info!("player ready, all dependencies loaded");
            self.events.fire(EventKind::PlayerReady, EventData::None);
        } else {
            log::error!("no playback solution exists");
            self.events.fire(EventKind::PlayerFailure, EventData::None);
        }
    }

    /// Replaces the mechanism candidates and re-initializes.
    pub fn reset(&mut self, solutions: Vec<Mechanism>) {
        self.mechanism.set_solutions(solutions);
        self.loaded = false;
        self.init();
    }

    pub fn events(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn sender(&self) -> Sender<PlayerEvent> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<PlayerEvent> {
        self.receiver.clone()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current(&self) -> Option<&Playable> {
        self.current.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn mechanism(&self) -> &MechanismSelector {
        &self.mechanism
    }

    pub fn handle(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::Command(cmd) => self.handle_command(cmd),
            PlayerEvent::Backend(notice) => self.handle_notice(notice),
        }
    }

    /// Drains and handles every pending event on the channel.
    pub fn pump(&mut self) {
        while let Ok(event) = self.receiver.try_recv() {
            self.handle(event);
        }
    }

    fn handle_command(&mut self, cmd: PlayerCommand) {
        match cmd {
            PlayerCommand::Play { playable } => {
                self.play(playable);
            }
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Unload => self.unload(),
            PlayerCommand::Seek { percent } => self.seek(percent),
            PlayerCommand::SetPosition { position } => self.set_position(position),
            PlayerCommand::SetVolume { volume } => self.set_volume(volume),
            PlayerCommand::Mute => self.mute(),
            PlayerCommand::Unmute => self.unmute(),
            PlayerCommand::Configure { settings } => self.configure(settings),
            PlayerCommand::Reset { solutions } => self.reset(solutions),
        }
    }

    /// Loads the playable (unloading any previous one) and plays it once
    /// the backend reports readiness.  If the playable is already current
    /// and not playing, resumes in place.
    pub fn play(&mut self, playable: Playable) -> bool {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|c| c.identifier == playable.identifier);
        if is_current {
            if self.state == PlaybackState::Paused {
                let identifier = playable.identifier.clone();
                let resumed = match self.active_backend() {
                    Some(backend) => backend.resume(&identifier),
                    None => false,
                };
                if !resumed {
                    self.backend_play();
                }
            } else if self.state != PlaybackState::Playing {
                self.backend_play();
            }
            return true;
        }

        if self.mechanism.current().is_none() {
            log::error!("insufficient playback mechanism for platform");
            self.events
                .fire(EventKind::PlayerFailure, EventData::Playable(playable));
            return false;
        }
        if self.current.is_some() {
            self.unload();
        }
        self.current = Some(playable);
        self.load_current();
        true
    }

    /// Pauses on-demand audio.  A live position cannot be resumed from
    /// where it left off, so pausing live audio is a full unload.
    pub fn pause(&mut self) {
        let Some(playable) = self.current.as_ref() else {
            log::warn!("no current playable loaded, nothing to pause");
            return;
        };
        match playable.kind {
            MediaKind::OnDemand => {
                let identifier = playable.identifier.clone();
                let paused = match self.active_backend() {
                    Some(backend) => backend.pause(&identifier),
                    None => false,
                };
                if !paused {
                    log::warn!("could not pause, '{identifier}' is unknown to the backend");
                }
            }
            MediaKind::Live => self.unload(),
        }
    }

    /// Stops and releases the backend sound, resets telemetry, and fires
    /// `Unloaded`.
    pub fn unload(&mut self) {
        let Some(identifier) = self.current.as_ref().map(|c| c.identifier.clone()) else {
            log::info!("no current playable loaded, nothing to unload");
            return;
        };
        if self.loaded {
            log::info!("unloading '{identifier}'");
            if let Some(backend) = self.active_backend() {
                backend.unload(&identifier);
            }
        }
        self.loaded = false;
        if let Some(playable) = self.current.as_mut() {
            playable.reset();
        }
        self.set_state(PlaybackState::Stopped);
        self.fire_with_current(EventKind::Unloaded);
    }

    /// Moves the play head to a fraction of the duration.  Valid only for
    /// on-demand items with a known duration.
    pub fn seek(&mut self, percent: f64) {
        let Some(playable) = self.current.as_ref() else {
            log::info!("no current playable loaded, nothing to seek");
            return;
        };
        match playable.kind {
            MediaKind::Live => {
                log::info!("'{}' is live and not seekable", playable.identifier);
            }
            MediaKind::OnDemand => {
                if playable.duration.is_zero() {
                    log::warn!(
                        "could not seek, duration of '{}' is unknown",
                        playable.identifier
                    );
                    return;
                }
                let fraction = if (0.0..=1.0).contains(&percent) {
                    percent
                } else {
                    log::warn!("seek fraction {percent} out of range, clamping");
                    percent.clamp(0.0, 1.0)
                };
                let target = playable.duration.mul_f64(fraction);
                self.set_position(target);
            }
        }
    }

    /// Moves the play head to an absolute position.  Valid only for
    /// on-demand items.
    pub fn set_position(&mut self, position: Duration) {
        let Some(playable) = self.current.as_ref() else {
            log::info!("no current playable loaded, nothing to position");
            return;
        };
        if playable.kind == MediaKind::Live {
            log::info!("'{}' is live and not positionable", playable.identifier);
            return;
        }
        let identifier = playable.identifier.clone();
        let moved = match self.active_backend() {
            Some(backend) => backend.set_position(&identifier, position),
            None => false,
        };
        if !moved {
            log::warn!("sound '{identifier}' is unknown to the backend");
            return;
        }
        if let Some(playable) = self.current.as_mut() {
            playable.position = position;
            if !playable.duration.is_zero() {
                playable.percent_played =
                    position.as_secs_f64() / playable.duration.as_secs_f64();
            }
            // Seeking past the end of the clip window cancels it, letting
            // playback run to the end of the file.
            if playable.end_time.is_some_and(|end| end <= position) {
                playable.end_time = None;
            }
        }
        self.fire_with_current(EventKind::PositionUpdate);
    }

    /// Clamps to [0, 1] and applies the gain.  Fires `VolumeUpdated` even
    /// with no playable loaded.
    pub fn set_volume(&mut self, volume: f64) {
        let clamped = if volume < 0.0 {
            log::warn!("volume {volume} is below 0, clamping to 0");
            0.0
        } else if volume > 1.0 {
            log::warn!("volume {volume} is above 1, clamping to 1");
            1.0
        } else {
            volume
        };
        if self.loaded {
            if let Some(identifier) = self.current.as_ref().map(|c| c.identifier.clone()) {
                if let Some(backend) = self.active_backend() {
                    backend.set_volume(&identifier, clamped);
                }
            }
        }
        self.settings.volume = clamped;
        self.events
            .fire(EventKind::VolumeUpdated, EventData::Volume(clamped));
    }

    pub fn mute(&mut self) {
        self.settings.muted = true;
        self.apply_muted();
        log::info!("player is now muted");
    }

    pub fn unmute(&mut self) {
        self.settings.muted = false;
        self.apply_muted();
        log::info!("player is now unmuted");
    }

    pub fn configure(&mut self, settings: Settings) {
        if let Some(preferred) = settings.preferred_mechanism {
            self.mechanism.prefer(preferred);
        }
        self.settings = settings;
    }

    fn apply_muted(&mut self) {
        let muted = self.settings.muted;
        if !self.loaded {
            return;
        }
        if let Some(identifier) = self.current.as_ref().map(|c| c.identifier.clone()) {
            if let Some(backend) = self.active_backend() {
                backend.set_muted(&identifier, muted);
            }
        }
    }

    fn handle_notice(&mut self, notice: BackendNotice) {
        let is_current = self
            .current
            .as_ref()
            .is_some_and(|c| c.identifier == notice.identifier());
        if !is_current {
            log::info!("stale backend notice received, ignoring: {notice:?}");
            return;
        }
        match notice {
            BackendNotice::Ready { .. } => self.backend_play(),
            BackendNotice::Started { .. } => self.on_started(),
            BackendNotice::Paused { .. } => {
                // A pause issued while stopping the item reports back after
                // the state was already reset; don't resurrect it.
                if self.state == PlaybackState::Playing {
                    self.set_state(PlaybackState::Paused);
                    self.fire_with_current(EventKind::Paused);
                }
            }
            BackendNotice::Resumed { .. } => {
                self.set_state(PlaybackState::Playing);
                self.fire_with_current(EventKind::Playing);
            }
            BackendNotice::Finished { .. } => self.on_finished(),
            BackendNotice::Buffering { buffering, .. } => {
                let kind = if buffering {
                    EventKind::BufferStart
                } else {
                    EventKind::BufferEnd
                };
                self.fire_with_current(kind);
            }
            BackendNotice::Tick {
                position,
                duration,
                duration_estimate,
                ..
            } => self.on_tick(position, duration, duration_estimate),
            BackendNotice::StreamTitle { title, .. } => {
                log::info!("received stream metadata with title '{title}'");
                if let Some(playable) = self.current.as_mut() {
                    playable.title = title;
                }
                self.fire_with_current(EventKind::Metadata);
            }
            BackendNotice::AdMarker {
                insertion_type,
                context,
                ..
            } => {
                log::info!("received ad marker of insertion type '{insertion_type}'");
                if let Some(playable) = self.current.as_mut() {
                    playable.title = format!("ad_break_{insertion_type}");
                    playable.ad_context = Some(context);
                }
                self.fire_with_current(EventKind::Metadata);
            }
            BackendNotice::LoadResult { success, .. } => {
                if !success {
                    self.on_missing_file();
                }
            }
            BackendNotice::ConnectFailure { connected, .. } => {
                self.on_connect_failure(connected);
            }
        }
    }

    fn on_started(&mut self) {
        if let Some(playable) = self.current.as_mut() {
            if let Variant::Underwriting { has_played, .. } = &mut playable.variant {
                *has_played = true;
            }
        }
        self.set_state(PlaybackState::Playing);
        self.fire_with_current(EventKind::Playing);
        self.fire_with_current(EventKind::Metadata);
    }

    fn on_finished(&mut self) {
        if let Some(playable) = self.current.as_mut() {
            playable.reset();
        }
        self.set_state(PlaybackState::Stopped);
        self.fire_with_current(EventKind::Finished);
    }

    fn on_missing_file(&mut self) {
        if self.mechanism.current() == Some(Mechanism::Progressive) {
            self.set_state(PlaybackState::Stopped);
            self.fire_with_current(EventKind::MissingFile);
            self.fire_with_current(EventKind::Finished);
        } else {
            self.fire_with_current(EventKind::MissingFile);
        }
    }

    /// Triage for a failed backend connection.  A nonzero position means a
    /// mid-stream network loss; an established session with nothing to play
    /// means the file is missing; a session that never connected demotes
    /// the mechanism and retries on the next candidate.
    fn on_connect_failure(&mut self, connected: bool) {
        let position = self
            .current
            .as_ref()
            .map(|c| c.position)
            .unwrap_or_default();
        if position > Duration::ZERO {
            log::info!("network connection has been lost");
            self.set_state(PlaybackState::Stopped);
            self.fire_with_current(EventKind::ConnectionLost);
        } else if connected {
            log::error!("requested file could not be found in stream mode");
            self.set_state(PlaybackState::Stopped);
            self.fire_with_current(EventKind::MissingFile);
            self.fire_with_current(EventKind::Finished);
        } else {
            log::error!("could not connect, falling back to the next mechanism");
            self.set_state(PlaybackState::Stopped);
            self.loaded = false;
            self.mechanism.remove_current();
            if self.mechanism.current().is_some() {
                self.load_current();
            } else {
                let playable = self.current.clone();
                let data = match playable {
                    Some(p) => EventData::Playable(p),
                    None => EventData::None,
                };
                self.events.fire(EventKind::PlayerFailure, data);
            }
        }
    }

    fn on_tick(
        &mut self,
        position: Duration,
        duration: Option<Duration>,
        estimate: Option<Duration>,
    ) {
        let mut fire_position = false;
        let mut reached_end = false;
        let mut changed_segment: Option<Segment> = None;
        {
            let Some(playable) = self.current.as_mut() else {
                return;
            };
            match playable.kind {
                MediaKind::Live => {
                    playable.percent_played = 1.0;
                    playable.duration = Duration::ZERO;
                    playable.position = position;
                    fire_position = true;
                }
                MediaKind::OnDemand => {
                    // Backends report position 0 once after restarting a
                    // piece in the middle; skip it when that happens.
                    if position != Duration::ZERO {
                        playable.position = position;
                    }
                    if let Some(d) = duration {
                        // A growing duration means a progressive download
                        // still filling in.
                        if d > playable.duration {
                            playable.duration = d;
                        }
                        if estimate == Some(d) {
                            playable.duration = d;
                        }
                    }
                    match (duration, estimate) {
                        (Some(d), Some(est)) if est > d && !est.is_zero() => {
                            playable.percent_loaded = d.as_secs_f64() / est.as_secs_f64();
                        }
                        _ => {
                            if playable.percent_loaded > 0.0 && playable.percent_loaded < 1.0 {
                                playable.percent_loaded = 1.0;
                            }
                        }
                    }
                    if !playable.duration.is_zero() {
                        playable.percent_played =
                            playable.position.as_secs_f64() / playable.duration.as_secs_f64();
                    }
                    if playable.is_eof() {
                        // Scrubbing to the very end can starve the terminal
                        // completion callback; fold the tick into completion
                        // and let `Finished` arrive on its own.
                        playable.percent_played = 1.0;
                        playable.position = playable.duration;
                    } else {
                        fire_position = true;
                    }
                    if playable
                        .end_time
                        .is_some_and(|end| !end.is_zero() && playable.position >= end)
                    {
                        reached_end = true;
                    }
                    changed_segment = Self::activate_segment(playable);
                }
            }
        }
        if fire_position && !reached_end {
            self.fire_with_current(EventKind::PositionUpdate);
        }
        if let Some(segment) = changed_segment {
            if let Some(playable) = self.current.clone() {
                self.events
                    .fire(EventKind::SegmentChanged, EventData::Segment { playable, segment });
            }
        }
        if reached_end {
            log::info!("reached end of clip window, stopping");
            self.stop_at_end();
        }
    }

    /// Marks the last segment whose start time has passed as active.
    /// Segments are assumed ordered by start time, ascending.
    fn activate_segment(playable: &mut Playable) -> Option<Segment> {
        let position = playable.position;
        let index = playable
            .segments
            .iter()
            .rposition(|s| s.start_time <= position)?;
        if playable.segments[index].active {
            return None;
        }
        for segment in playable.segments.iter_mut() {
            segment.active = false;
        }
        playable.segments[index].active = true;
        Some(playable.segments[index].clone())
    }

    fn stop_at_end(&mut self) {
        if let Some(identifier) = self.current.as_ref().map(|c| c.identifier.clone()) {
            if let Some(backend) = self.active_backend() {
                backend.pause(&identifier);
            }
        }
        if let Some(playable) = self.current.as_mut() {
            playable.reset();
        }
        self.set_state(PlaybackState::Stopped);
        self.fire_with_current(EventKind::Finished);
    }

    /// Called on backend readiness; issues the actual play call.
    fn backend_play(&mut self) {
        let Some(playable) = self.current.clone() else {
            return;
        };
        if !self.loaded {
            self.load_current();
            return;
        }
        let params = PlayParams {
            position: playable.position,
            volume: self.settings.volume,
            muted: self.settings.muted,
        };
        let result = self
            .active_backend()
            .map(|backend| backend.play(&playable.identifier, params));
        match result {
            Some(Ok(())) => {}
            Some(Err(err)) => log::error!("backend failed to start playback: {err}"),
            None => {
                log::error!("no playback solution exists");
                self.events
                    .fire(EventKind::PlayerFailure, EventData::Playable(playable));
            }
        }
    }

    fn load_current(&mut self) {
        let Some(playable) = self.current.clone() else {
            return;
        };
        if self.mechanism.current().is_none() {
            log::error!("no playback solution exists");
            self.events
                .fire(EventKind::PlayerFailure, EventData::Playable(playable));
            return;
        }
        let notices = self.sender.clone();
        let result = self
            .active_backend()
            .map(|backend| backend.load(&playable, notices));
        match result {
            Some(Ok(())) => {
                self.loaded = true;
            }
            Some(Err(err)) => {
                log::error!("failed to load '{}': {err}", playable.identifier);
            }
            None => {
                log::error!(
                    "no backend registered for mechanism {:?}",
                    self.mechanism.current()
                );
                self.events
                    .fire(EventKind::PlayerFailure, EventData::Playable(playable));
            }
        }
    }

    fn active_backend(&mut self) -> Option<&mut dyn AudioBackend> {
        let mechanism = self.mechanism.current()?;
        self.backends
            .iter_mut()
            .find(|b| b.mechanism() == mechanism)
            .map(|b| -> &mut dyn AudioBackend { b.as_mut() })
    }

    fn set_state(&mut self, state: PlaybackState) {
        self.state = state;
        if let Some(playable) = self.current.as_mut() {
            playable.state = state;
        }
    }

    fn fire_with_current(&mut self, kind: EventKind) {
        let data = match self.current.clone() {
            Some(playable) => EventData::Playable(playable),
            None => EventData::None,
        };
        self.events.fire(kind, data);
    }
}
