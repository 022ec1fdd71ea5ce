use std::time::{Duration, Instant};

use serde::Serialize;

use crate::{
    event::{Event, EventKind},
    playable::MediaKind,
};

/// Listening time after which interval beacons slow down.
const INTERVAL_RAMP: Duration = Duration::from_secs(120);
const INTERVAL_FAST: Duration = Duration::from_secs(10);
const INTERVAL_SLOW: Duration = Duration::from_secs(120);

/// Quarter-hour listening credit: at least this much listening inside one
/// measurement window.
const AQH_CREDIT: Duration = Duration::from_secs(5 * 60);
const AQH_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BeaconAction {
    Play,
    Pause,
    Resume,
    Complete,
    Interval,
    Quartile,
    QuarterHour,
}

/// One reportable listening fact, ready to be serialized and delivered.
#[derive(Clone, Debug, Serialize)]
pub struct Beacon {
    pub action: BeaconAction,
    pub identifier: String,
    pub title: String,
    pub seconds_listened: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quartile: Option<u8>,
    /// Reporting weight.  Later quartiles count for more.
    pub weight: u32,
}

/// Delivery channel for beacons.  Implementations must not block for long;
/// the tracker calls them from event listeners.
pub trait BeaconSink {
    fn deliver(&mut self, beacon: &Beacon);
}

/// Posts beacons as JSON to a collection endpoint.
pub struct HttpBeaconSink {
    endpoint: url::Url,
    agent: ureq::Agent,
}

impl HttpBeaconSink {
    pub fn new(endpoint: url::Url) -> Self {
        Self {
            endpoint,
            agent: ureq::Agent::new_with_defaults(),
        }
    }
}

impl BeaconSink for HttpBeaconSink {
    fn deliver(&mut self, beacon: &Beacon) {
        let result = self
            .agent
            .post(self.endpoint.as_str())
            .send_json(beacon);
        if let Err(err) = result {
            log::warn!("failed to deliver beacon: {err}");
        }
    }
}

struct ItemState {
    identifier: String,
    title: String,
    kind: MediaKind,
    underwriting: bool,
    started: bool,
    listening: bool,
    last_tick: Option<Instant>,
    listened: Duration,
    next_interval_at: Duration,
    highest_quartile: u8,
    window_start: Instant,
    window_listened: Duration,
    window_credited: bool,
}

impl ItemState {
    fn new(identifier: String, title: String, kind: MediaKind, underwriting: bool, now: Instant) -> Self {
        Self {
            identifier,
            title,
            kind,
            underwriting,
            started: false,
            listening: false,
            last_tick: None,
            listened: Duration::ZERO,
            next_interval_at: INTERVAL_FAST,
            highest_quartile: 0,
            window_start: now,
            window_listened: Duration::ZERO,
            window_credited: false,
        }
    }
}

/// Passive listening tracker.  Observes lifecycle events from the bus and
/// reports beacons for starts, pauses, completions, live listening
/// intervals, on-demand quartile progress and quarter-hour listening
/// credits.  Underwriting items are never tracked beyond start/stop.
pub struct Tracker {
    sink: Box<dyn BeaconSink>,
    current: Option<ItemState>,
}

impl Tracker {
    pub fn new(sink: Box<dyn BeaconSink>) -> Self {
        Self {
            sink,
            current: None,
        }
    }

    pub fn handle(&mut self, event: &Event) {
        self.handle_at(event, Instant::now());
    }

    /// Event intake with an explicit clock.
    pub fn handle_at(&mut self, event: &Event, now: Instant) {
        match event.kind {
            EventKind::Playing => self.on_playing(event, now),
            EventKind::Paused => self.on_paused(event),
            EventKind::Finished => self.on_finished(event),
            EventKind::Unloaded => self.on_unloaded(),
            EventKind::PositionUpdate => self.on_position(event, now),
            _ => {}
        }
    }

    fn on_playing(&mut self, event: &Event, now: Instant) {
        let Some(playable) = event.playable() else {
            return;
        };
        let is_same = self
            .current
            .as_ref()
            .is_some_and(|s| s.identifier == playable.identifier);
        if !is_same {
            self.current = Some(ItemState::new(
                playable.identifier.clone(),
                playable.title.clone(),
                playable.kind,
                playable.is_underwriting(),
                now,
            ));
        }
        let Some(state) = self.current.as_mut() else {
            return;
        };
        let action = if state.started {
            BeaconAction::Resume
        } else {
            BeaconAction::Play
        };
        state.started = true;
        state.listening = true;
        state.last_tick = Some(now);
        let beacon = Self::beacon(state, action, None, 1);
        self.sink.deliver(&beacon);
    }

    fn on_paused(&mut self, event: &Event) {
        let Some(state) = self.current.as_mut() else {
            return;
        };
        if event
            .playable()
            .is_some_and(|p| p.identifier != state.identifier)
        {
            return;
        }
        state.listening = false;
        state.last_tick = None;
        let beacon = Self::beacon(state, BeaconAction::Pause, None, 1);
        self.sink.deliver(&beacon);
    }

    fn on_finished(&mut self, event: &Event) {
        let Some(state) = self.current.as_mut() else {
            return;
        };
        if event
            .playable()
            .is_some_and(|p| p.identifier != state.identifier)
        {
            return;
        }
        state.listening = false;
        state.last_tick = None;
        let beacon = Self::beacon(state, BeaconAction::Complete, None, 1);
        self.sink.deliver(&beacon);
    }

    fn on_unloaded(&mut self) {
        if let Some(state) = self.current.as_mut() {
            state.listening = false;
            state.last_tick = None;
        }
    }

    fn on_position(&mut self, event: &Event, now: Instant) {
        let Some(playable) = event.playable() else {
            return;
        };
        let mut due = Vec::new();
        {
            let Some(state) = self.current.as_mut() else {
                return;
            };
            if playable.identifier != state.identifier || !state.listening {
                return;
            }
            if let Some(last) = state.last_tick {
                let delta = now.saturating_duration_since(last);
                state.listened += delta;
                state.window_listened += delta;
            }
            state.last_tick = Some(now);

            // Quarter-hour windows roll over regardless of listening.
            if now.saturating_duration_since(state.window_start) >= AQH_WINDOW {
                state.window_start = now;
                state.window_listened = Duration::ZERO;
                state.window_credited = false;
            }
            if !state.window_credited && state.window_listened >= AQH_CREDIT {
                state.window_credited = true;
                due.push(Self::beacon(state, BeaconAction::QuarterHour, None, 1));
            }

            match state.kind {
                MediaKind::Live => {
                    while state.listened >= state.next_interval_at {
                        due.push(Self::beacon(state, BeaconAction::Interval, None, 1));
                        state.next_interval_at += if state.listened < INTERVAL_RAMP {
                            INTERVAL_FAST
                        } else {
                            INTERVAL_SLOW
                        };
                    }
                }
                MediaKind::OnDemand => {
                    if !state.underwriting {
                        if let Some(q) = quartile(playable.percent_played) {
                            if q > state.highest_quartile {
                                state.highest_quartile = q;
                                due.push(Self::beacon(
                                    state,
                                    BeaconAction::Quartile,
                                    Some(q),
                                    quartile_weight(q),
                                ));
                            }
                        }
                    }
                }
            }
        }
        for beacon in &due {
            self.sink.deliver(beacon);
        }
    }

    fn beacon(state: &ItemState, action: BeaconAction, quartile: Option<u8>, weight: u32) -> Beacon {
        Beacon {
            action,
            identifier: state.identifier.clone(),
            title: state.title.clone(),
            seconds_listened: state.listened.as_secs(),
            quartile,
            weight,
        }
    }
}

/// Maps played fraction to a quartile number, 1 to 4.  A nudge is added
/// before truncating so that positions an instant shy of a quarter mark
/// still credit the quartile.  Zero and exactly-one fractions report
/// nothing; start and completion have their own beacons.
fn quartile(percent_played: f64) -> Option<u8> {
    if percent_played <= 0.0 || percent_played == 1.0 {
        return None;
    }
    let q = ((percent_played + 0.02) * 4.0).floor() as u8;
    (1..=4).contains(&q).then_some(q)
}

fn quartile_weight(quartile: u8) -> u32 {
    match quartile {
        1 => 1,
        2 => 3,
        3 => 5,
        4 => 9,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use super::*;
    use crate::{
        event::EventData,
        playable::{MediaKind, Playable, PlayableAttrs},
        scheme::SchemeRegistry,
    };

    #[derive(Clone, Default)]
    struct RecordingSink {
        beacons: Rc<RefCell<Vec<Beacon>>>,
    }

    impl BeaconSink for RecordingSink {
        fn deliver(&mut self, beacon: &Beacon) {
            self.beacons.borrow_mut().push(beacon.clone());
        }
    }

    fn playable(id: &str, kind: MediaKind) -> Playable {
        Playable::new(
            PlayableAttrs {
                identifier: id.into(),
                kind: Some(kind),
                ..Default::default()
            },
            &SchemeRegistry::new(),
        )
        .unwrap()
    }

    fn event(kind: EventKind, playable: &Playable) -> Event {
        Event {
            kind,
            data: EventData::Playable(playable.clone()),
        }
    }

    fn tracker() -> (Tracker, Rc<RefCell<Vec<Beacon>>>) {
        let sink = RecordingSink::default();
        let beacons = sink.beacons.clone();
        (Tracker::new(Box::new(sink)), beacons)
    }

    #[test]
    fn play_then_resume() {
        let (mut tracker, beacons) = tracker();
        let item = playable("episode", MediaKind::OnDemand);
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        tracker.handle_at(&event(EventKind::Paused, &item), t0 + Duration::from_secs(5));
        tracker.handle_at(&event(EventKind::Playing, &item), t0 + Duration::from_secs(9));
        let actions: Vec<_> = beacons.borrow().iter().map(|b| b.action).collect();
        assert_eq!(
            actions,
            vec![BeaconAction::Play, BeaconAction::Pause, BeaconAction::Resume]
        );
    }

    #[test]
    fn quartile_nudge_credits_near_marks() {
        assert_eq!(quartile(0.24), Some(1));
        assert_eq!(quartile(0.25), Some(1));
        assert_eq!(quartile(0.26), Some(1));
        assert_eq!(quartile(0.49), Some(2));
        assert_eq!(quartile(0.74), Some(3));
        assert_eq!(quartile(0.99), Some(4));
        assert_eq!(quartile(0.0), None);
        assert_eq!(quartile(1.0), None);
    }

    #[test]
    fn quartiles_report_once_with_weights() {
        let (mut tracker, beacons) = tracker();
        let mut item = playable("episode", MediaKind::OnDemand);
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        for (i, pp) in [0.3, 0.3, 0.6, 0.8].iter().enumerate() {
            item.percent_played = *pp;
            tracker.handle_at(
                &event(EventKind::PositionUpdate, &item),
                t0 + Duration::from_secs(i as u64 + 1),
            );
        }
        let quartiles: Vec<_> = beacons
            .borrow()
            .iter()
            .filter(|b| b.action == BeaconAction::Quartile)
            .map(|b| (b.quartile.unwrap(), b.weight))
            .collect();
        assert_eq!(quartiles, vec![(1, 1), (2, 3), (3, 5)]);
    }

    #[test]
    fn underwriting_reports_no_quartiles() {
        let (mut tracker, beacons) = tracker();
        let mut item = Playable::underwriting(
            PlayableAttrs {
                identifier: "sponsor".into(),
                kind: Some(MediaKind::OnDemand),
                ..Default::default()
            },
            &SchemeRegistry::new(),
            None,
        )
        .unwrap();
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        item.percent_played = 0.6;
        tracker.handle_at(
            &event(EventKind::PositionUpdate, &item),
            t0 + Duration::from_secs(1),
        );
        assert!(beacons
            .borrow()
            .iter()
            .all(|b| b.action != BeaconAction::Quartile));
    }

    #[test]
    fn live_intervals_slow_down_after_ramp() {
        let (mut tracker, beacons) = tracker();
        let item = playable("station", MediaKind::Live);
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        // Tick once a second for five minutes of listening.
        for s in 1..=300u64 {
            tracker.handle_at(
                &event(EventKind::PositionUpdate, &item),
                t0 + Duration::from_secs(s),
            );
        }
        let intervals = beacons
            .borrow()
            .iter()
            .filter(|b| b.action == BeaconAction::Interval)
            .count();
        // 12 fast beacons over the first two minutes, then one slow beacon
        // at four minutes in.
        assert_eq!(intervals, 13);
    }

    #[test]
    fn quarter_hour_credit_once_per_window() {
        let (mut tracker, beacons) = tracker();
        let item = playable("station", MediaKind::Live);
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        for s in 1..=600u64 {
            tracker.handle_at(
                &event(EventKind::PositionUpdate, &item),
                t0 + Duration::from_secs(s),
            );
        }
        let credits = beacons
            .borrow()
            .iter()
            .filter(|b| b.action == BeaconAction::QuarterHour)
            .count();
        assert_eq!(credits, 1);
    }

    #[test]
    fn paused_time_does_not_count_as_listening() {
        let (mut tracker, beacons) = tracker();
        let item = playable("station", MediaKind::Live);
        let t0 = Instant::now();
        tracker.handle_at(&event(EventKind::Playing, &item), t0);
        tracker.handle_at(&event(EventKind::Paused, &item), t0 + Duration::from_secs(2));
        tracker.handle_at(
            &event(EventKind::Playing, &item),
            t0 + Duration::from_secs(500),
        );
        tracker.handle_at(
            &event(EventKind::PositionUpdate, &item),
            t0 + Duration::from_secs(503),
        );
        let state_listened = beacons.borrow().last().unwrap().seconds_listened;
        assert!(state_listened < 10, "gap while paused was counted");
    }
}
