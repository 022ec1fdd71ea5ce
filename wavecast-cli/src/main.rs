mod sim;

use std::{cell::RefCell, env, io, io::BufRead, rc::Rc, thread};

use crossbeam_channel::{select, unbounded};
use sim::SimulatedBackend;
use wavecast_core::{
    analytics::{Beacon, BeaconSink, HttpBeaconSink, Tracker},
    backend::AudioBackend,
    error::Error,
    event::EventKind,
    mechanism::Mechanism,
    playable::{MediaKind, Playable, PlayableAttrs},
    player::{Player, PlayerCommand, PlayerEvent},
    playlist::Playlist,
    scheme::SchemeRegistry,
    settings::{Autoplay, Settings},
};

const SCHEMES: &str = r#"{
    "radio-audio": {
        "kind": "on_demand",
        "stream_server": "rtmp://ondemand.stream.example.org/music",
        "stream_path_prefix": "mp3:ondemand",
        "progressive_prefix": "http://ondemand.stream.example.org"
    },
    "radio-live": {
        "kind": "live",
        "buffer_time": 6.0,
        "aliases": {
            "news": {
                "stream_server": "rtmp://live.stream.example.org/news",
                "stream_path": "news.stream",
                "progressive_url": "http://news.stream.example.org/news.mp3"
            }
        }
    }
}"#;

fn main() {
    env_logger::init();

    let settings = match env::var("WAVECAST_SETTINGS") {
        Ok(json) => Settings::from_json(&json).expect("invalid WAVECAST_SETTINGS"),
        Err(_) => Settings {
            autoplay: Autoplay::On,
            ..Settings::default()
        },
    };

    let mut identifiers: Vec<String> = env::args().skip(1).collect();
    if identifiers.is_empty() {
        identifiers = vec![
            "radio-audio:/shows/morning_report.mp3".into(),
            "radio-audio:/shows/midday_report.mp3".into(),
            "radio-live:/news".into(),
        ];
    }

    start(identifiers, settings).unwrap();
}

fn starts_playback(settings: &Settings) -> bool {
    settings.autoplay != Autoplay::Off
}

/// Deferred autoplay means "play once metadata is in hand", so it implies
/// the up-front fetch even when `fetch_metadata_first` is off.
fn fetch_metadata_up_front(settings: &Settings) -> bool {
    settings.fetch_metadata_first || settings.autoplay == Autoplay::Deferred
}

/// Stand-in for a playlist metadata service: derives a readable title from
/// the identifier path.
fn fetch_metadata(playable: &mut Playable) {
    if !playable.title.is_empty() {
        return;
    }
    let stem = playable
        .identifier
        .rsplit('/')
        .next()
        .unwrap_or(&playable.identifier);
    playable.title = stem.trim_end_matches(".mp3").replace('_', " ");
}

struct LogBeaconSink;

impl BeaconSink for LogBeaconSink {
    fn deliver(&mut self, beacon: &Beacon) {
        log::info!("beacon: {beacon:?}");
    }
}

fn beacon_sink() -> Box<dyn BeaconSink> {
    match env::var("BEACON_URL").ok().and_then(|v| v.parse().ok()) {
        Some(endpoint) => Box::new(HttpBeaconSink::new(endpoint)),
        None => Box::new(LogBeaconSink),
    }
}

fn start(identifiers: Vec<String>, settings: Settings) -> Result<(), Error> {
    let schemes = SchemeRegistry::from_json(SCHEMES)?;

    let mut playlist = Playlist::new();
    for identifier in identifiers {
        let attrs = PlayableAttrs {
            identifier,
            kind: Some(MediaKind::OnDemand),
            ..Default::default()
        };
        playlist.add(Playable::new(attrs, &schemes)?);
    }

    let backends: Vec<Box<dyn AudioBackend>> = vec![Box::new(SimulatedBackend::new())];
    let mut player = Player::new(settings.clone(), backends);
    player.reset(vec![Mechanism::Progressive]);

    player.events().add_listener(EventKind::Playing, |event| {
        if let Some(playable) = event.playable() {
            println!("playing '{}'", playable.identifier);
        }
    });
    player.events().add_listener(EventKind::Paused, |event| {
        if let Some(playable) = event.playable() {
            println!("paused '{}'", playable.identifier);
        }
    });
    player.events().add_listener(EventKind::PositionUpdate, |event| {
        if let Some(playable) = event.playable() {
            println!(
                "position {:>5.1}s / {:.1}s",
                playable.position.as_secs_f64(),
                playable.duration.as_secs_f64()
            );
        }
    });
    player.events().add_listener(EventKind::Metadata, |event| {
        if let Some(playable) = event.playable() {
            if !playable.title.is_empty() {
                println!("now: {}", playable.title);
            }
        }
    });

    let tracker = Rc::new(RefCell::new(Tracker::new(beacon_sink())));
    for kind in [
        EventKind::Playing,
        EventKind::Paused,
        EventKind::Finished,
        EventKind::Unloaded,
        EventKind::PositionUpdate,
    ] {
        let tracker = tracker.clone();
        player
            .events()
            .add_listener(kind, move |event| tracker.borrow_mut().handle(event));
    }

    // Listeners may not call back into the player; the finished flag is
    // picked up by the event loop to chain the next playlist item.
    let finished = Rc::new(RefCell::new(false));
    {
        let finished = finished.clone();
        player.events().add_listener(EventKind::Finished, move |_| {
            *finished.borrow_mut() = true;
        });
    }

    let (lines_tx, lines_rx) = unbounded::<String>();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if lines_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("commands: r play, p pause, s stop, < previous, > next, +/- volume, q quit");

    if fetch_metadata_up_front(&settings) {
        if let Some(item) = playlist.current_mut() {
            fetch_metadata(item);
        }
    }
    if starts_playback(&settings) {
        if let Some(first) = playlist.current().cloned() {
            player.play(first);
        }
    } else {
        println!("autoplay is off, press r to start");
    }

    let receiver = player.receiver();
    let mut volume = player.settings().volume;
    loop {
        select! {
            recv(receiver) -> event => {
                let Ok(event) = event else { break };
                player.handle(event);
                if *finished.borrow() {
                    *finished.borrow_mut() = false;
                    if playlist.has_next() {
                        playlist.next();
                        if let Some(next) = playlist.current().cloned() {
                            player.play(next);
                        }
                    } else {
                        println!("end of playlist");
                        player.unload();
                    }
                }
            }
            recv(lines_rx) -> line => {
                let Ok(line) = line else { break };
                match line.as_str() {
                    "r" => {
                        if let Some(current) = playlist.current().cloned() {
                            player.play(current);
                        }
                    }
                    "p" => player.handle(PlayerEvent::Command(PlayerCommand::Pause)),
                    "s" => player.handle(PlayerEvent::Command(PlayerCommand::Unload)),
                    "<" | ">" => {
                        if line == ">" {
                            playlist.next();
                        } else {
                            playlist.previous();
                        }
                        if let Some(current) = playlist.current().cloned() {
                            player.play(current);
                        }
                    }
                    "+" | "-" => {
                        volume = if line == "+" {
                            (volume + 0.1).min(1.0)
                        } else {
                            (volume - 0.1).max(0.0)
                        };
                        player.set_volume(volume);
                        println!("volume {volume:.1}");
                    }
                    "q" => break,
                    _ => log::warn!("unknown command"),
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with(autoplay: Autoplay, fetch_metadata_first: bool) -> Settings {
        Settings {
            autoplay,
            fetch_metadata_first,
            ..Settings::default()
        }
    }

    #[test]
    fn autoplay_off_waits_for_a_command() {
        assert!(!starts_playback(&settings_with(Autoplay::Off, false)));
        assert!(starts_playback(&settings_with(Autoplay::On, false)));
        assert!(starts_playback(&settings_with(Autoplay::Deferred, false)));
    }

    #[test]
    fn deferred_autoplay_implies_the_metadata_fetch() {
        assert!(fetch_metadata_up_front(&settings_with(Autoplay::Deferred, false)));
        assert!(fetch_metadata_up_front(&settings_with(Autoplay::Off, true)));
        assert!(!fetch_metadata_up_front(&settings_with(Autoplay::On, false)));
    }

    #[test]
    fn metadata_fetch_derives_a_title() {
        let mut playable = Playable::new(
            PlayableAttrs {
                identifier: "radio-audio:/shows/morning_report.mp3".into(),
                kind: Some(MediaKind::OnDemand),
                ..Default::default()
            },
            &SchemeRegistry::new(),
        )
        .unwrap();
        fetch_metadata(&mut playable);
        assert_eq!(playable.title, "morning report");
    }

    #[test]
    fn metadata_fetch_keeps_an_existing_title() {
        let mut playable = Playable::new(
            PlayableAttrs {
                identifier: "radio-audio:/shows/morning_report.mp3".into(),
                kind: Some(MediaKind::OnDemand),
                title: Some("Morning Report".into()),
                ..Default::default()
            },
            &SchemeRegistry::new(),
        )
        .unwrap();
        fetch_metadata(&mut playable);
        assert_eq!(playable.title, "Morning Report");
    }
}
