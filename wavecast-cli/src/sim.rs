use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use crossbeam_channel::Sender;
use wavecast_core::{
    backend::{AudioBackend, BackendNotice, PlayParams},
    error::Error,
    mechanism::Mechanism,
    playable::{MediaKind, Playable},
    player::PlayerEvent,
};

const TICK: Duration = Duration::from_millis(500);
const SIMULATED_DURATION: Duration = Duration::from_secs(30);

fn tick_loop(
    playing: Arc<AtomicBool>,
    position: Arc<Mutex<Duration>>,
    notices: Sender<PlayerEvent>,
    duration: Option<Duration>,
    identifier: String,
) {
    while playing.load(Ordering::Relaxed) {
        thread::sleep(TICK);
        if !playing.load(Ordering::Relaxed) {
            break;
        }
        let pos = {
            let mut pos = position.lock().unwrap();
            *pos += TICK;
            *pos
        };
        notices
            .send(PlayerEvent::Backend(BackendNotice::Tick {
                identifier: identifier.clone(),
                position: pos,
                duration,
                duration_estimate: duration,
            }))
            .ok();
        if duration.is_some_and(|d| pos >= d) {
            playing.store(false, Ordering::Relaxed);
            notices
                .send(PlayerEvent::Backend(BackendNotice::Finished {
                    identifier: identifier.clone(),
                }))
                .ok();
            break;
        }
    }
}

struct SimSound {
    duration: Option<Duration>,
    position: Arc<Mutex<Duration>>,
    playing: Arc<AtomicBool>,
    notices: Sender<PlayerEvent>,
}

/// Backend that plays silence on a ticking thread.  On-demand sounds run
/// for a fixed simulated duration; live sounds tick until stopped.
#[derive(Default)]
pub struct SimulatedBackend {
    sounds: HashMap<String, SimSound>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self {
            sounds: HashMap::new(),
        }
    }

    fn sound(&self, identifier: &str) -> Result<&SimSound, Error> {
        self.sounds.get(identifier).ok_or_else(|| {
            Error::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("sound '{identifier}' is not loaded"),
            ))
        })
    }
}

impl AudioBackend for SimulatedBackend {
    fn mechanism(&self) -> Mechanism {
        Mechanism::Progressive
    }

    fn load(&mut self, playable: &Playable, notices: Sender<PlayerEvent>) -> Result<(), Error> {
        let duration = match playable.kind {
            MediaKind::OnDemand => Some(SIMULATED_DURATION),
            MediaKind::Live => None,
        };
        log::debug!(
            "simulating '{}' from {}",
            playable.identifier,
            playable.progressive_url
        );
        self.sounds.insert(
            playable.identifier.clone(),
            SimSound {
                duration,
                position: Arc::new(Mutex::new(playable.position)),
                playing: Arc::new(AtomicBool::new(false)),
                notices: notices.clone(),
            },
        );
        notices
            .send(PlayerEvent::Backend(BackendNotice::Ready {
                identifier: playable.identifier.clone(),
            }))
            .ok();
        Ok(())
    }

    fn play(&mut self, identifier: &str, params: PlayParams) -> Result<(), Error> {
        let sound = self.sound(identifier)?;
        *sound.position.lock().unwrap() = params.position;
        sound.playing.store(true, Ordering::Relaxed);
        sound
            .notices
            .send(PlayerEvent::Backend(BackendNotice::Started {
                identifier: identifier.to_owned(),
            }))
            .ok();

        let playing = sound.playing.clone();
        let position = sound.position.clone();
        let notices = sound.notices.clone();
        let duration = sound.duration;
        let identifier = identifier.to_owned();
        thread::spawn(move || tick_loop(playing, position, notices, duration, identifier));
        Ok(())
    }

    fn resume(&mut self, identifier: &str) -> bool {
        let Some(sound) = self.sounds.get(identifier) else {
            return false;
        };
        sound.playing.store(true, Ordering::Relaxed);
        sound
            .notices
            .send(PlayerEvent::Backend(BackendNotice::Resumed {
                identifier: identifier.to_owned(),
            }))
            .ok();

        let playing = sound.playing.clone();
        let position = sound.position.clone();
        let notices = sound.notices.clone();
        let duration = sound.duration;
        let identifier = identifier.to_owned();
        thread::spawn(move || tick_loop(playing, position, notices, duration, identifier));
        true
    }

    fn pause(&mut self, identifier: &str) -> bool {
        let Some(sound) = self.sounds.get(identifier) else {
            return false;
        };
        sound.playing.store(false, Ordering::Relaxed);
        sound
            .notices
            .send(PlayerEvent::Backend(BackendNotice::Paused {
                identifier: identifier.to_owned(),
            }))
            .ok();
        true
    }

    fn set_position(&mut self, identifier: &str, position: Duration) -> bool {
        match self.sounds.get(identifier) {
            Some(sound) => {
                *sound.position.lock().unwrap() = position;
                true
            }
            None => false,
        }
    }

    fn set_volume(&mut self, identifier: &str, volume: f64) {
        log::debug!("'{identifier}' gain set to {volume:.2}");
    }

    fn set_muted(&mut self, identifier: &str, muted: bool) {
        log::debug!("'{identifier}' muted: {muted}");
    }

    fn unload(&mut self, identifier: &str) {
        if let Some(sound) = self.sounds.remove(identifier) {
            sound.playing.store(false, Ordering::Relaxed);
        }
    }
}
